// SPDX-FileCopyrightText: 2026 Parlor Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Parlor chat SDK.
//!
//! This crate provides the error taxonomy, the data model (threads,
//! messages, custom fields, channel configuration), and the shared session
//! context used throughout the Parlor workspace.

pub mod channel_config;
pub mod context;
pub mod error;
pub mod types;

// Re-export key items at crate root for ergonomic imports.
pub use channel_config::{ChannelConfiguration, ChannelSettings, PreChatSurvey};
pub use context::{Environment, SessionConfig, SessionContext};
pub use error::ParlorError;
pub use types::{
    AccessToken, Agent, Attachment, AttachmentUpload, ChatState, CustomField,
    CustomFieldDefinition, CustomerIdentity, DestinationId, Message, MessageContent,
    MessageDirection, MessageId, ThreadId, ThreadState, UserStatistics, VisitorId,
};
