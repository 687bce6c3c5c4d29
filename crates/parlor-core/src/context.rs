// SPDX-FileCopyrightText: 2026 Parlor Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Session context: the single shared mutable record of a chat session.
//!
//! Exactly one [`SessionContext`] exists per session. Every component reads
//! and writes it by reference behind the session's lock; no component keeps
//! its own copy of identity fields.

use serde::{Deserialize, Serialize};

use crate::channel_config::ChannelConfiguration;
use crate::error::ParlorError;
use crate::types::{AccessToken, ChatState, CustomerIdentity, DestinationId, VisitorId};

/// Base URLs of a platform environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Environment {
    /// REST base for channel configuration and attachment upload.
    pub chat_url: String,
    /// WebSocket endpoint.
    pub socket_url: String,
    /// REST base for the visitor (web-analytics) service.
    pub web_analytics_url: String,
}

impl Environment {
    /// North America production region.
    pub fn north_america() -> Self {
        Self {
            chat_url: "https://channels-na1.parlor.chat/chat".into(),
            socket_url: "wss://chat-gateway-na1.parlor.chat".into(),
            web_analytics_url: "https://channels-na1.parlor.chat".into(),
        }
    }

    /// Europe production region.
    pub fn europe() -> Self {
        Self {
            chat_url: "https://channels-eu1.parlor.chat/chat".into(),
            socket_url: "wss://chat-gateway-eu1.parlor.chat".into(),
            web_analytics_url: "https://channels-eu1.parlor.chat".into(),
        }
    }

    /// Custom environment, used for on-prem installs and tests.
    pub fn custom(
        chat_url: impl Into<String>,
        socket_url: impl Into<String>,
        web_analytics_url: impl Into<String>,
    ) -> Self {
        Self {
            chat_url: chat_url.into(),
            socket_url: socket_url.into(),
            web_analytics_url: web_analytics_url.into(),
        }
    }
}

/// Static configuration supplied by the host application.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub environment: Environment,
    pub brand_id: i32,
    pub channel_id: String,
    /// Push/device token, forwarded in the visitor fingerprint.
    pub device_token: Option<String>,
    /// OAuth authorization code for authenticated channels.
    pub authorization_code: Option<String>,
    /// PKCE code verifier paired with the authorization code.
    pub code_verifier: Option<String>,
    /// Application type reported in the socket URL query.
    pub app_type: String,
    /// Operating system reported in the socket URL query.
    pub os: String,
    /// SDK version reported in the socket URL query.
    pub sdk_version: String,
}

impl SessionConfig {
    pub fn new(environment: Environment, brand_id: i32, channel_id: impl Into<String>) -> Self {
        Self {
            environment,
            brand_id,
            channel_id: channel_id.into(),
            device_token: None,
            authorization_code: None,
            code_verifier: None,
            app_type: "native".into(),
            os: std::env::consts::OS.into(),
            sdk_version: env!("CARGO_PKG_VERSION").into(),
        }
    }
}

/// The shared mutable state of one chat session.
#[derive(Debug, Clone)]
pub struct SessionContext {
    pub config: SessionConfig,
    pub customer: Option<CustomerIdentity>,
    pub visitor_id: Option<VisitorId>,
    pub destination_id: Option<DestinationId>,
    /// Server-side contact record correlating the customer with a thread.
    pub contact_id: Option<String>,
    pub channel_config: Option<ChannelConfiguration>,
    pub access_token: Option<AccessToken>,
    /// Welcome-message template delivered via a proactive action.
    pub welcome_template: Option<String>,
    pub chat_state: ChatState,
}

impl SessionContext {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            config,
            customer: None,
            visitor_id: None,
            destination_id: None,
            contact_id: None,
            channel_config: None,
            access_token: None,
            welcome_template: None,
            chat_state: ChatState::Initial,
        }
    }

    /// Fails fast with a state error unless the session is connected.
    pub fn require_connected(&self) -> Result<(), ParlorError> {
        if self.chat_state == ChatState::Connected {
            Ok(())
        } else {
            Err(ParlorError::NotConnected)
        }
    }

    /// Returns the channel configuration, which must have been fetched.
    pub fn channel_config(&self) -> Result<&ChannelConfiguration, ParlorError> {
        self.channel_config
            .as_ref()
            .ok_or_else(|| ParlorError::MissingParameter("channel configuration".into()))
    }

    /// Whether the channel allows multiple open threads per end user.
    pub fn multi_thread(&self) -> Result<bool, ParlorError> {
        Ok(self
            .channel_config()?
            .settings
            .has_multiple_threads_per_end_user)
    }

    /// Clears all session identity. Used on sign-out.
    pub fn clear_identity(&mut self) {
        self.customer = None;
        self.visitor_id = None;
        self.destination_id = None;
        self.contact_id = None;
        self.access_token = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context() -> SessionContext {
        SessionContext::new(SessionConfig::new(Environment::north_america(), 1, "chan-1"))
    }

    #[test]
    fn require_connected_fails_in_every_other_state() {
        let mut ctx = context();
        for state in [
            ChatState::Initial,
            ChatState::Preparing,
            ChatState::Prepared,
            ChatState::Connecting,
            ChatState::Offline,
            ChatState::Closed,
        ] {
            ctx.chat_state = state;
            assert!(matches!(
                ctx.require_connected(),
                Err(ParlorError::NotConnected)
            ));
        }
        ctx.chat_state = ChatState::Connected;
        assert!(ctx.require_connected().is_ok());
    }

    #[test]
    fn channel_config_missing_until_fetched() {
        let mut ctx = context();
        assert!(ctx.channel_config().is_err());
        ctx.channel_config = Some(Default::default());
        assert!(ctx.channel_config().is_ok());
        assert_eq!(ctx.multi_thread().unwrap(), false);
    }

    #[test]
    fn clear_identity_wipes_everything() {
        let mut ctx = context();
        ctx.customer = Some(CustomerIdentity::anonymous());
        ctx.visitor_id = Some(VisitorId("v-1".into()));
        ctx.destination_id = Some(DestinationId("d-1".into()));
        ctx.contact_id = Some("c-1".into());
        ctx.access_token = Some(AccessToken::from_expires_in("tok", 60));

        ctx.clear_identity();
        assert!(ctx.customer.is_none());
        assert!(ctx.visitor_id.is_none());
        assert!(ctx.destination_id.is_none());
        assert!(ctx.contact_id.is_none());
        assert!(ctx.access_token.is_none());
    }
}
