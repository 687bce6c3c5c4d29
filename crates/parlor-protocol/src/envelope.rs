// SPDX-FileCopyrightText: 2026 Parlor Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Outbound event-envelope builder.
//!
//! [`build_envelope`] is a pure function of (event type, optional payload,
//! session identity); it has no state and no side effects and is called by
//! every component that sends a socket message.

use serde_json::{json, Value};
use strum::{Display, EnumString};

use parlor_core::{CustomerIdentity, ParlorError, VisitorId};

/// Outbound event types, in their wire form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
pub enum EventType {
    #[strum(serialize = "authorizeCustomer")]
    AuthorizeCustomer,
    #[strum(serialize = "reconnectCustomer")]
    ReconnectCustomer,
    #[strum(serialize = "refreshToken")]
    RefreshToken,
    #[strum(serialize = "sendMessage")]
    SendMessage,
    #[strum(serialize = "recoverThread")]
    RecoverThread,
    #[strum(serialize = "fetchThreadList")]
    FetchThreadList,
    #[strum(serialize = "loadThreadMetadata")]
    LoadThreadMetadata,
    #[strum(serialize = "loadMoreMessages")]
    LoadMoreMessages,
    #[strum(serialize = "archiveThread")]
    ArchiveThread,
    #[strum(serialize = "updateThread")]
    UpdateThread,
    #[strum(serialize = "messageSeenByCustomer")]
    MessageSeenByCustomer,
    #[strum(serialize = "senderTypingStarted")]
    SenderTypingStarted,
    #[strum(serialize = "senderTypingEnded")]
    SenderTypingEnded,
    #[strum(serialize = "setContactCustomFields")]
    SetContactCustomFields,
    #[strum(serialize = "setCustomerCustomFields")]
    SetCustomerCustomFields,
    #[strum(serialize = "executeTrigger")]
    ExecuteTrigger,
}

impl EventType {
    /// Authorization-phase events use the `register` action; everything
    /// else is a generic chat-window event.
    fn action(self) -> &'static str {
        match self {
            EventType::AuthorizeCustomer | EventType::RefreshToken => "register",
            _ => "chatWindowEvent",
        }
    }
}

/// Snapshot of the session identity fields the envelope carries.
#[derive(Debug, Clone)]
pub struct EnvelopeIdentity {
    pub brand_id: i32,
    pub channel_id: String,
    pub customer: Option<CustomerIdentity>,
    pub visitor_id: Option<VisitorId>,
}

/// A serialized outbound envelope plus its generated event id, which the
/// caller uses to correlate server-reported operation errors.
#[derive(Debug, Clone)]
pub struct Envelope {
    pub event_id: String,
    pub frame: String,
}

/// Builds the canonical outbound envelope.
///
/// Fails with [`ParlorError::MissingCustomerIdentity`] when no customer
/// identity is set; every outbound event requires one.
pub fn build_envelope(
    identity: &EnvelopeIdentity,
    event_type: EventType,
    data: Option<Value>,
) -> Result<Envelope, ParlorError> {
    let customer = identity
        .customer
        .as_ref()
        .ok_or(ParlorError::MissingCustomerIdentity)?;

    let event_id = uuid::Uuid::new_v4().to_string();

    let mut payload = json!({
        "brand": {"id": identity.brand_id},
        "channel": {"id": identity.channel_id},
        "consumerIdentity": customer,
        "eventType": event_type.to_string(),
    });

    if let Some(visitor_id) = &identity.visitor_id {
        payload["visitor"] = json!({"id": visitor_id.0});
    }
    if let Some(data) = data {
        payload["data"] = data;
    }

    let envelope = json!({
        "action": event_type.action(),
        "eventId": event_id,
        "payload": payload,
    });

    let frame = serde_json::to_string(&envelope)
        .map_err(|e| ParlorError::Internal(format!("envelope serialization failed: {e}")))?;

    Ok(Envelope { event_id, frame })
}
