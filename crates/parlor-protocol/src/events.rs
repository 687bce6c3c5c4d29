// SPDX-FileCopyrightText: 2026 Parlor Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Inbound event decoding.
//!
//! Each frame is decoded by reading the `eventType` discriminant (or the
//! nested `postback.eventType`) once, then decoding the matching payload
//! shape. Error payloads take precedence over the discriminant. Unknown
//! discriminants decode to [`ServerEvent::Unknown`] so the dispatcher can
//! drop them without failing the stream.

use serde::Deserialize;
use serde_json::Value;

use parlor_core::{Agent, CustomField, CustomerIdentity, Message, ParlorError, ThreadId};

/// Thread reference as it appears in inbound payloads.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreadRef {
    pub id_on_external_platform: ThreadId,
    #[serde(default)]
    pub thread_name: Option<String>,
}

/// Server-side contact record reference.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactRef {
    pub id: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageCreatedData {
    pub thread: ThreadRef,
    pub message: Message,
    #[serde(default)]
    pub contact: Option<ContactRef>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreadRecoveredData {
    pub thread: ThreadRef,
    #[serde(default)]
    pub messages: Vec<Message>,
    #[serde(default)]
    pub messages_scroll_token: Option<String>,
    #[serde(default)]
    pub can_load_more_messages: bool,
    #[serde(default)]
    pub inbox_assignee: Option<Agent>,
    #[serde(default)]
    pub contact: Option<ContactRef>,
    #[serde(default)]
    pub contact_custom_fields: Vec<CustomField>,
    #[serde(default)]
    pub customer_custom_fields: Vec<CustomField>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreadListFetchedData {
    #[serde(default)]
    pub threads: Vec<ThreadRef>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreadMetadataLoadedData {
    #[serde(default)]
    pub last_message: Option<Message>,
    #[serde(default)]
    pub owner_assignee: Option<Agent>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoreMessagesLoadedData {
    #[serde(default)]
    pub messages: Vec<Message>,
    #[serde(default)]
    pub scroll_token: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessTokenPayload {
    pub token: String,
    pub expires_in: i64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerAuthorizedData {
    pub consumer_identity: CustomerIdentity,
    #[serde(default)]
    pub access_token: Option<AccessTokenPayload>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenRefreshedData {
    pub access_token: AccessTokenPayload,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageReadChangedData {
    pub message: Message,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboxAssigneeChangedData {
    pub thread: ThreadRef,
    #[serde(default)]
    pub inbox_assignee: Option<Agent>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreadArchivedData {
    #[serde(default)]
    pub thread: Option<ThreadRef>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreadUpdatedData {
    pub thread: ThreadRef,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypingData {
    pub thread: ThreadRef,
    #[serde(default)]
    pub user: Option<Agent>,
}

/// Proactive action kinds the SDK understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ProactiveActionType {
    WelcomeMessage,
    CustomPopupBox,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProactiveActionData {
    pub action_id: String,
    #[serde(default)]
    pub action_name: Option<String>,
    pub action_type: ProactiveActionType,
    #[serde(default)]
    pub data: Option<ProactiveContent>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProactiveContent {
    pub content: ProactiveBody,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProactiveBody {
    #[serde(default)]
    pub body_text: String,
    #[serde(default)]
    pub headline_text: Option<String>,
}

/// A server-reported operation error.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationErrorDetail {
    pub error_code: String,
    #[serde(default)]
    pub transaction_id: Option<String>,
    #[serde(default)]
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerFault {
    #[serde(default)]
    pub message: String,
}

/// The closed set of inbound event shapes.
#[derive(Debug, Clone)]
pub enum ServerEvent {
    MessageCreated(MessageCreatedData),
    ThreadRecovered(ThreadRecoveredData),
    ThreadListFetched(ThreadListFetchedData),
    ThreadMetadataLoaded(ThreadMetadataLoadedData),
    MoreMessagesLoaded(MoreMessagesLoadedData),
    CustomerAuthorized(CustomerAuthorizedData),
    TokenRefreshed(TokenRefreshedData),
    MessageReadChanged(MessageReadChangedData),
    InboxAssigneeChanged(InboxAssigneeChangedData),
    ThreadArchived(ThreadArchivedData),
    ThreadUpdated(ThreadUpdatedData),
    AgentTypingStarted(TypingData),
    AgentTypingEnded(TypingData),
    FireProactiveAction(ProactiveActionData),
    OperationError(OperationErrorDetail),
    InternalServerError(ServerFault),
    ServerError(ServerFault),
    /// Recognized envelope with an unrecognized discriminant; dropped by
    /// the dispatcher with a warning.
    Unknown { event_type: String },
}

fn data_of(value: &Value) -> Value {
    value.get("data").cloned().unwrap_or(Value::Null)
}

fn decode_data<T: serde::de::DeserializeOwned>(
    value: &Value,
    event_type: &str,
) -> Result<T, ParlorError> {
    serde_json::from_value(data_of(value))
        .map_err(|e| ParlorError::Decode(format!("invalid {event_type} payload: {e}")))
}

/// Decodes one raw inbound frame into a [`ServerEvent`].
///
/// Precedence: an `error` payload wins over any discriminant; then the
/// `eventType` field; then `postback.eventType`.
pub fn decode_event(frame: &str) -> Result<ServerEvent, ParlorError> {
    let value: Value = serde_json::from_str(frame)
        .map_err(|e| ParlorError::Decode(format!("frame is not valid JSON: {e}")))?;

    if let Some(error) = value.get("error") {
        let detail: OperationErrorDetail = serde_json::from_value(error.clone())
            .map_err(|e| ParlorError::Decode(format!("invalid error payload: {e}")))?;
        return Ok(ServerEvent::OperationError(detail));
    }

    let event_type = value
        .get("eventType")
        .or_else(|| value.pointer("/postback/eventType"))
        .and_then(Value::as_str)
        .ok_or_else(|| ParlorError::Decode("frame has no eventType discriminant".into()))?
        .to_string();

    // Proactive actions arrive nested under `postback`.
    let value = if value.get("eventType").is_none() {
        value
            .get("postback")
            .cloned()
            .unwrap_or(Value::Null)
    } else {
        value
    };

    let event = match event_type.as_str() {
        "MessageCreated" => ServerEvent::MessageCreated(decode_data(&value, &event_type)?),
        "ThreadRecovered" => ServerEvent::ThreadRecovered(decode_data(&value, &event_type)?),
        "ThreadListFetched" => ServerEvent::ThreadListFetched(decode_data(&value, &event_type)?),
        "ThreadMetadataLoaded" => {
            ServerEvent::ThreadMetadataLoaded(decode_data(&value, &event_type)?)
        }
        "MoreMessagesLoaded" => ServerEvent::MoreMessagesLoaded(decode_data(&value, &event_type)?),
        "ConsumerAuthorized" => ServerEvent::CustomerAuthorized(decode_data(&value, &event_type)?),
        "TokenRefreshed" => ServerEvent::TokenRefreshed(decode_data(&value, &event_type)?),
        "MessageReadChanged" => ServerEvent::MessageReadChanged(decode_data(&value, &event_type)?),
        "ContactInboxAssigneeChanged" => {
            ServerEvent::InboxAssigneeChanged(decode_data(&value, &event_type)?)
        }
        "ThreadArchived" => ServerEvent::ThreadArchived(decode_data(&value, &event_type)?),
        "ThreadUpdated" => ServerEvent::ThreadUpdated(decode_data(&value, &event_type)?),
        "SenderTypingStarted" => ServerEvent::AgentTypingStarted(decode_data(&value, &event_type)?),
        "SenderTypingEnded" => ServerEvent::AgentTypingEnded(decode_data(&value, &event_type)?),
        "FireProactiveAction" => {
            ServerEvent::FireProactiveAction(decode_data(&value, &event_type)?)
        }
        "InternalServerError" => {
            ServerEvent::InternalServerError(decode_data(&value, &event_type)?)
        }
        "ServerError" => ServerEvent::ServerError(decode_data(&value, &event_type)?),
        _ => ServerEvent::Unknown { event_type },
    };

    Ok(event)
}
