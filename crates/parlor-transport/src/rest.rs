// SPDX-FileCopyrightText: 2026 Parlor Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! REST client for the platform's HTTP endpoints: channel configuration
//! fetch, attachment upload, and visitor upsert.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use parlor_core::{
    AttachmentUpload, ChannelConfiguration, CustomerIdentity, Environment, ParlorError, VisitorId,
};

/// Device fingerprint reported with the visitor record.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceFingerprint {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_token: Option<String>,
    pub application_type: String,
    pub os: String,
    pub sdk_version: String,
}

/// Body of the visitor upsert call.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VisitorUpsert {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer_identity: Option<CustomerIdentity>,
    pub device_fingerprint: DeviceFingerprint,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AttachmentUploadResponse {
    file_url: String,
}

/// HTTP client for platform REST endpoints.
#[derive(Debug, Clone)]
pub struct RestClient {
    client: reqwest::Client,
    environment: Environment,
}

impl RestClient {
    pub fn new(environment: Environment) -> Result<Self, ParlorError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| ParlorError::http("failed to build HTTP client", e))?;

        Ok(Self {
            client,
            environment,
        })
    }

    /// Fetches the channel configuration.
    ///
    /// `GET {chatURL}/1.0/brand/{brandId}/channel/{channelId}`
    pub async fn get_channel_configuration(
        &self,
        brand_id: i32,
        channel_id: &str,
    ) -> Result<ChannelConfiguration, ParlorError> {
        let url = format!(
            "{}/1.0/brand/{}/channel/{}",
            self.environment.chat_url, brand_id, channel_id
        );

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| ParlorError::http("channel configuration request failed", e))?;

        let status = response.status();
        debug!(status = %status, brand_id, channel_id, "channel configuration fetched");

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ParlorError::Http {
                message: format!("channel configuration returned {status}: {body}"),
                source: None,
            });
        }

        response
            .json::<ChannelConfiguration>()
            .await
            .map_err(|e| ParlorError::Decode(format!("invalid channel configuration: {e}")))
    }

    /// Uploads one attachment, returning the server-assigned URL.
    ///
    /// `POST {chatURL}/1.0/brand/{brandId}/channel/{channelId}/attachment`
    pub async fn upload_attachment(
        &self,
        brand_id: i32,
        channel_id: &str,
        upload: &AttachmentUpload,
    ) -> Result<String, ParlorError> {
        let url = format!(
            "{}/1.0/brand/{}/channel/{}/attachment",
            self.environment.chat_url, brand_id, channel_id
        );

        let response = self
            .client
            .post(&url)
            .json(upload)
            .send()
            .await
            .map_err(|e| ParlorError::AttachmentUpload {
                file_name: upload.file_name.clone(),
                message: format!("upload request failed: {e}"),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ParlorError::AttachmentUpload {
                file_name: upload.file_name.clone(),
                message: format!("server returned {status}: {body}"),
            });
        }

        let parsed: AttachmentUploadResponse =
            response
                .json()
                .await
                .map_err(|e| ParlorError::AttachmentUpload {
                    file_name: upload.file_name.clone(),
                    message: format!("invalid upload response: {e}"),
                })?;

        debug!(file_name = %upload.file_name, "attachment uploaded");
        Ok(parsed.file_url)
    }

    /// Creates or updates the visitor record.
    ///
    /// `PUT {webAnalyticsURL}/web-analytics/1.0/tenants/{brandId}/visitors/{visitorId}`
    pub async fn upsert_visitor(
        &self,
        brand_id: i32,
        visitor_id: &VisitorId,
        body: &VisitorUpsert,
    ) -> Result<(), ParlorError> {
        let url = format!(
            "{}/web-analytics/1.0/tenants/{}/visitors/{}",
            self.environment.web_analytics_url, brand_id, visitor_id.0
        );

        let response = self
            .client
            .put(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| ParlorError::http("visitor upsert request failed", e))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(ParlorError::Http {
                message: format!("visitor upsert returned {status}: {text}"),
                source: None,
            });
        }

        debug!(visitor_id = %visitor_id.0, "visitor upserted");
        Ok(())
    }
}
