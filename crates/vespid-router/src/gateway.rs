// SPDX-License-Identifier: MIT OR Apache-2.0
//! Gateway forwarding client.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use uuid::Uuid;

/// Gateway call budget.
const GATEWAY_TIMEOUT: Duration = Duration::from_secs(10);

/// One user message forwarded to the gateway, tagged with the event's
/// position in the session log.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayMessage {
    /// Session the message belongs to.
    pub session_id: Uuid,
    /// The session's sharding key.
    pub session_key: String,
    /// Sequence number of the appended `user_message` event.
    pub seq: i64,
    /// Message payload.
    pub payload: Value,
}

/// Gateway delivery failure; surfaces as 503 to the client while the
/// appended event stays put (at-least-once from the client's view).
#[derive(Debug, thiserror::Error)]
#[error("gateway unavailable: {reason}")]
pub struct GatewayUnavailable {
    /// What the client observed.
    pub reason: String,
}

/// The forwarding contract.
#[async_trait]
pub trait GatewayClient: Send + Sync {
    /// Deliver one user message.
    async fn forward_user_message(&self, message: &GatewayMessage) -> Result<(), GatewayUnavailable>;
}

/// HTTP gateway client.
pub struct HttpGatewayClient {
    http: reqwest::Client,
    base_url: String,
    service_token: Option<String>,
}

impl HttpGatewayClient {
    /// Build a client for `base_url`, authenticating with `service_token`
    /// when present.
    pub fn new(base_url: impl Into<String>, service_token: Option<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
            service_token,
        }
    }
}

#[async_trait]
impl GatewayClient for HttpGatewayClient {
    async fn forward_user_message(
        &self,
        message: &GatewayMessage,
    ) -> Result<(), GatewayUnavailable> {
        let url = format!(
            "{}/internal/v1/sessions/{}/messages",
            self.base_url.trim_end_matches('/'),
            message.session_id,
        );
        let mut request = self.http.post(&url).timeout(GATEWAY_TIMEOUT).json(message);
        if let Some(token) = &self.service_token {
            request = request.header("x-gateway-token", token);
        }
        let response = request.send().await.map_err(|err| GatewayUnavailable {
            reason: err.to_string(),
        })?;
        if !response.status().is_success() {
            return Err(GatewayUnavailable {
                reason: format!("gateway answered {}", response.status()),
            });
        }
        Ok(())
    }
}
