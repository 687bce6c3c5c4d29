// SPDX-FileCopyrightText: 2026 Parlor Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Channel configuration as fetched from the platform.
//!
//! Once fetched, the configuration is immutable until the next successful
//! prepare/connect; nothing in the SDK mutates it in place.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::types::CustomFieldDefinition;

/// Feature and behavior settings for a channel.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelSettings {
    /// Whether the end user may hold multiple open threads at once.
    #[serde(default)]
    pub has_multiple_threads_per_end_user: bool,
    #[serde(default)]
    pub is_proactive_chat_enabled: bool,
    /// Feature flags by name. Unlisted features default to enabled.
    #[serde(default)]
    pub features: HashMap<String, bool>,
}

/// Pre-chat survey: custom fields that must be collected at thread creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreChatSurvey {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub fields: Vec<CustomFieldDefinition>,
}

/// Full channel configuration returned by the configuration endpoint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelConfiguration {
    #[serde(default)]
    pub settings: ChannelSettings,
    #[serde(default)]
    pub is_authorization_enabled: bool,
    #[serde(default)]
    pub pre_chat_survey: Option<PreChatSurvey>,
    /// Definitions for per-thread (contact) custom fields.
    #[serde(default)]
    pub contact_custom_fields: Vec<CustomFieldDefinition>,
    /// Definitions for per-session (customer) custom fields.
    #[serde(default)]
    pub customer_custom_fields: Vec<CustomFieldDefinition>,
}

impl ChannelConfiguration {
    /// Returns whether a named feature is enabled. Unlisted features are
    /// treated as enabled.
    pub fn feature_enabled(&self, name: &str) -> bool {
        self.settings.features.get(name).copied().unwrap_or(true)
    }

    /// Idents of pre-chat survey fields marked required.
    pub fn required_pre_chat_idents(&self) -> Vec<&str> {
        self.pre_chat_survey
            .as_ref()
            .map(|survey| {
                survey
                    .fields
                    .iter()
                    .filter(|f| f.is_required)
                    .map(|f| f.ident.as_str())
                    .collect()
            })
            .unwrap_or_default()
    }
}
