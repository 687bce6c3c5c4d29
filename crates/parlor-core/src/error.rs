// SPDX-FileCopyrightText: 2026 Parlor Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Parlor chat SDK.
//!
//! The taxonomy distinguishes state errors (wrong lifecycle phase, never
//! retried), association errors (session not fully established), protocol
//! errors (server-reported, surfaced verbatim with code and transaction id),
//! data errors (local bug or contract drift), and transport errors.

use thiserror::Error;

use crate::types::{ChatState, ThreadState};

/// The primary error type used across all Parlor crates.
#[derive(Debug, Error)]
pub enum ParlorError {
    /// An operation was invoked in the wrong chat lifecycle state.
    #[error("illegal chat state: expected {expected}, currently {actual}")]
    IllegalChatState {
        expected: ChatState,
        actual: ChatState,
    },

    /// An operation requiring a live session was invoked while not connected.
    #[error("session is not connected")]
    NotConnected,

    /// A thread operation was invoked in the wrong thread lifecycle state.
    #[error("illegal thread state: expected {expected}, currently {actual}")]
    IllegalThreadState {
        expected: ThreadState,
        actual: ThreadState,
    },

    /// No customer identity is set; every outbound event requires one.
    #[error("no customer identity is associated with the session")]
    MissingCustomerIdentity,

    /// No visitor identity is set.
    #[error("no visitor identity is associated with the session")]
    MissingVisitorIdentity,

    /// Reconnect was attempted without a cached access token.
    #[error("no access token is cached for reconnect")]
    MissingAccessToken,

    /// Thread creation is missing pre-chat survey fields the channel requires.
    #[error("missing required pre-chat custom fields: {}", idents.join(", "))]
    MissingPreChatCustomFields { idents: Vec<String> },

    /// The channel configuration does not permit the requested operation.
    #[error("unsupported channel configuration: {0}")]
    UnsupportedChannelConfig(String),

    /// Pagination was requested but the server reported no further messages.
    #[error("no more messages to load")]
    NoMoreMessages,

    /// Pagination was requested on a thread with no messages to paginate from.
    #[error("thread has no messages, no oldest date to paginate from")]
    InvalidOldestDate,

    /// An attachment upload failed; the whole send is aborted.
    #[error("attachment upload failed for {file_name}: {message}")]
    AttachmentUpload { file_name: String, message: String },

    /// A server-reported operation error, surfaced verbatim.
    #[error("server error {code} (transaction {})", transaction_id.as_deref().unwrap_or("none"))]
    Server {
        code: String,
        transaction_id: Option<String>,
        message: Option<String>,
    },

    /// The server reported an internal failure.
    #[error("internal server error: {0}")]
    InternalServer(String),

    /// An inbound frame or REST body could not be decoded.
    #[error("decode error: {0}")]
    Decode(String),

    /// A required parameter was absent.
    #[error("missing parameter: {0}")]
    MissingParameter(String),

    /// Locally detected invalid data (bug or server contract drift).
    #[error("invalid data: {0}")]
    InvalidData(String),

    /// Socket transport errors (connect failure, send on closed stream).
    #[error("transport error: {message}")]
    Transport {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// HTTP request errors (configuration fetch, uploads, visitor upsert).
    #[error("http error: {message}")]
    Http {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ParlorError {
    /// Builds a transport error from any source error.
    pub fn transport(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Transport {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Builds an HTTP error from any source error.
    pub fn http(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Http {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }
}
