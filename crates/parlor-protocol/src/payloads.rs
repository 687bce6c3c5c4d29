// SPDX-FileCopyrightText: 2026 Parlor Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Outbound event payload shapes (the `data` field of the envelope).

use chrono::{DateTime, Utc};
use serde::Serialize;

use parlor_core::{Attachment, CustomField, CustomerIdentity, MessageContent, MessageId, ThreadId};

/// Thread reference carried by thread-scoped events.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreadRefOut {
    pub id_on_external_platform: ThreadId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thread_name: Option<String>,
}

impl ThreadRefOut {
    pub fn id(id: ThreadId) -> Self {
        Self {
            id_on_external_platform: id,
            thread_name: None,
        }
    }
}

/// `authorizeCustomer` data: the stored authorization code / PKCE verifier.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorizeCustomerData {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authorization_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code_verifier: Option<String>,
}

/// `reconnectCustomer` / `refreshToken` data: the cached access token.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessTokenData {
    pub access_token: TokenRef,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenRef {
    pub token: String,
}

/// `sendMessage` data.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageData {
    pub thread: ThreadRefOut,
    pub id_on_external_platform: MessageId,
    pub message_content: MessageContent,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub contact_custom_fields: Vec<CustomField>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub customer_custom_fields: Vec<CustomField>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_token: Option<String>,
}

/// `recoverThread` data; `thread` is absent when recovering the sole thread
/// of a single-thread channel.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecoverThreadData {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thread: Option<ThreadRefOut>,
}

/// `loadThreadMetadata` / `archiveThread` / `messageSeenByCustomer` /
/// typing events data.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreadOnlyData {
    pub thread: ThreadRefOut,
}

/// `loadMoreMessages` data: pagination cursor plus the timestamp of the
/// oldest locally held message.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadMoreMessagesData {
    pub thread: ThreadRefOut,
    pub scroll_token: String,
    pub oldest_message_datetime: DateTime<Utc>,
}

/// `setContactCustomFields` / `setCustomerCustomFields` data.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SetCustomFieldsData {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thread: Option<ThreadRefOut>,
    pub custom_fields: Vec<CustomField>,
}

/// `executeTrigger` data.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteTriggerData {
    pub trigger: TriggerRef,
    pub destination: DestinationRef,
    pub consumer_identity: CustomerIdentity,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerRef {
    pub id: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DestinationRef {
    pub id: String,
}
