// SPDX-FileCopyrightText: 2026 Parlor Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Common types shared across the Parlor workspace: identifiers, the chat
//! and thread lifecycle state machines, messages, and custom fields.

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Unique identifier for a conversation thread.
///
/// Threads created locally carry a generated UUID until the server
/// acknowledges them; the identifier itself does not change on promotion.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ThreadId(pub String);

/// Unique identifier for a message.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(pub String);

/// Anonymous analytics identity, independent of the customer identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VisitorId(pub String);

/// Identity of a single connection attempt, regenerated on every connect.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DestinationId(pub String);

impl ThreadId {
    /// Generates a fresh local thread identifier.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

impl MessageId {
    /// Generates a fresh local message identifier.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

impl fmt::Display for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// States in the chat session FSM.
///
/// `Initial -> Preparing -> Prepared -> Connecting -> Connected`;
/// `Connected -> Offline` on an unexpected drop, `Connected -> Closed` on an
/// explicit disconnect or sign-out, `Offline -> Connecting` on reconnect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatState {
    /// Nothing has happened yet.
    Initial,
    /// Channel configuration fetch is in flight.
    Preparing,
    /// Configuration fetched, ready to connect.
    Prepared,
    /// Socket connect and authorization in flight.
    Connecting,
    /// Live session; operations requiring connectivity are valid.
    Connected,
    /// Unexpected drop; a reconnect attempt may follow.
    Offline,
    /// Explicitly torn down.
    Closed,
}

impl fmt::Display for ChatState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChatState::Initial => write!(f, "initial"),
            ChatState::Preparing => write!(f, "preparing"),
            ChatState::Prepared => write!(f, "prepared"),
            ChatState::Connecting => write!(f, "connecting"),
            ChatState::Connected => write!(f, "connected"),
            ChatState::Offline => write!(f, "offline"),
            ChatState::Closed => write!(f, "closed"),
        }
    }
}

/// States in the per-thread lifecycle FSM.
///
/// `Pending -> Ready -> Closed`; `Closed` is terminal. A `Pending` thread
/// exists only locally and is promoted to `Ready` after a server round trip.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadState {
    /// Created locally, not yet acknowledged by the server.
    Pending,
    /// Acknowledged by the server, fully usable.
    Ready,
    /// Archived. Terminal.
    Closed,
}

impl fmt::Display for ThreadState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ThreadState::Pending => write!(f, "pending"),
            ThreadState::Ready => write!(f, "ready"),
            ThreadState::Closed => write!(f, "closed"),
        }
    }
}

/// Direction of a message on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageDirection {
    /// Sent by the end user towards the contact center.
    #[serde(rename = "inbound")]
    ToAgent,
    /// Sent by the contact center towards the end user.
    #[serde(rename = "outbound")]
    ToClient,
}

/// Typed message content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageContent {
    /// Plain text.
    Text { text: String },
    /// A rich link card.
    RichLink { title: String, url: String },
    /// A postback reply (e.g. a quick-reply button press).
    Postback { text: String, postback: String },
}

impl MessageContent {
    /// Plain-text representation used for previews and template fallbacks.
    pub fn fallback_text(&self) -> &str {
        match self {
            MessageContent::Text { text } => text,
            MessageContent::RichLink { title, .. } => title,
            MessageContent::Postback { text, .. } => text,
        }
    }
}

/// A server-confirmed attachment reference on a message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    pub url: String,
    pub file_name: String,
    pub mime_type: String,
}

/// A local attachment awaiting upload, content-addressed by the server on
/// successful upload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachmentUpload {
    /// Base64-encoded file content.
    pub content: String,
    pub file_name: String,
    pub mime_type: String,
}

impl AttachmentUpload {
    /// Builds an upload from raw bytes, encoding them as base64.
    pub fn from_bytes(bytes: &[u8], file_name: impl Into<String>, mime_type: impl Into<String>) -> Self {
        use base64::Engine as _;
        Self {
            content: base64::engine::general_purpose::STANDARD.encode(bytes),
            file_name: file_name.into(),
            mime_type: mime_type.into(),
        }
    }
}

/// An agent as reported by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Agent {
    pub id: i64,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub surname: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
}

/// Read/seen statistics attached to a message.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserStatistics {
    #[serde(default)]
    pub seen_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub read_at: Option<DateTime<Utc>>,
}

/// The authenticated (or locally minted anonymous) customer identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerIdentity {
    pub id_on_external_platform: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
}

impl CustomerIdentity {
    /// Mints a new anonymous identity with a generated platform id.
    pub fn anonymous() -> Self {
        Self {
            id_on_external_platform: uuid::Uuid::new_v4().to_string(),
            first_name: None,
            last_name: None,
        }
    }

    /// Full name derived from first and last name, skipping empty parts.
    pub fn full_name(&self) -> String {
        let mut parts = Vec::new();
        if let Some(first) = self.first_name.as_deref()
            && !first.is_empty()
        {
            parts.push(first);
        }
        if let Some(last) = self.last_name.as_deref()
            && !last.is_empty()
        {
            parts.push(last);
        }
        parts.join(" ")
    }
}

/// A chat message within a thread.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    #[serde(rename = "idOnExternalPlatform")]
    pub id: MessageId,
    #[serde(rename = "threadIdOnExternalPlatform")]
    pub thread_id: ThreadId,
    pub message_content: MessageContent,
    pub direction: MessageDirection,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author_user: Option<Agent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author_end_user_identity: Option<CustomerIdentity>,
    #[serde(default)]
    pub user_statistics: UserStatistics,
}

/// A typed custom-field value with its recency stamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomField {
    pub ident: String,
    pub value: String,
    pub updated_at: DateTime<Utc>,
}

impl CustomField {
    /// Builds a field stamped with the current time.
    pub fn new(ident: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            ident: ident.into(),
            value: value.into(),
            updated_at: Utc::now(),
        }
    }
}

/// A custom-field definition from the channel configuration.
///
/// Incoming values whose ident has no definition are dropped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomFieldDefinition {
    pub ident: String,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub is_required: bool,
}

/// An access token with its expiry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

impl AccessToken {
    /// Builds a token from the server's `expiresIn` seconds form.
    pub fn from_expires_in(token: impl Into<String>, expires_in_secs: i64) -> Self {
        Self {
            token: token.into(),
            expires_at: Utc::now() + Duration::seconds(expires_in_secs),
        }
    }

    pub fn is_expired(&self) -> bool {
        self.expires_at <= Utc::now()
    }
}
