// SPDX-License-Identifier: MIT OR Apache-2.0
//! LLM provider dispatch.
//!
//! One [`ChatCompletion`] contract, four wire dialects (`openai-compatible`,
//! `anthropic-compatible`, `google`, `vertex`), routed by the provider's
//! `api_kind` with org-level `{base_url, api_kind}` overrides applied first.
//! Streaming-delta coalescing lives in [`stream`].
#![deny(unsafe_code)]
#![warn(missing_docs)]

mod client;
pub mod stream;

pub use client::{
    AnthropicCompatibleClient, GoogleClient, OpenAiCompatibleClient, VertexClient,
    VertexCredentials,
};
pub use stream::{CoalesceLimits, StreamCoalescer};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use vespid_core::{LlmOverride, llm_provider};

/// Outbound LLM call budget in seconds.
pub const LLM_TIMEOUT_SEC: u64 = 25;

// ---------------------------------------------------------------------------
// Chat contract
// ---------------------------------------------------------------------------

/// Speaker of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatRole {
    /// System prompt.
    System,
    /// End user.
    User,
    /// The model.
    Assistant,
}

/// One chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Speaker.
    pub role: ChatRole,
    /// Text content.
    pub content: String,
}

impl ChatMessage {
    /// A system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }

    /// A user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    /// An assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

/// A one-shot completion request.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    /// Model name as the provider understands it.
    pub model: String,
    /// Conversation so far.
    pub messages: Vec<ChatMessage>,
    /// Token ceiling for the reply.
    pub max_tokens: Option<u32>,
}

/// A completion reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatResponse {
    /// The assistant's text.
    pub text: String,
}

/// LLM call failures. Both variants surface to clients as 503
/// `LLM_UNAVAILABLE`; the distinction matters only for logs.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    /// The provider was unreachable, timed out, or answered non-2xx.
    #[error("llm unavailable: {reason}")]
    Unavailable {
        /// What the client observed.
        reason: String,
    },

    /// The provider answered 2xx with an unusable body.
    #[error("llm returned an invalid response: {reason}")]
    InvalidResponse {
        /// What was wrong.
        reason: String,
    },
}

/// The completion contract all dialect clients implement.
#[async_trait]
pub trait ChatCompletion: Send + Sync {
    /// Run one completion.
    async fn complete(&self, request: ChatRequest) -> Result<ChatResponse, LlmError>;
}

// ---------------------------------------------------------------------------
// Credentials and dispatch
// ---------------------------------------------------------------------------

/// Credentials for a provider call.
#[derive(Debug, Clone)]
pub enum ProviderCredentials {
    /// Plain API key.
    ApiKey(String),
    /// Vertex OAuth material (stored as a JSON secret).
    Vertex(VertexCredentials),
}

/// Builds dialect clients for provider ids, honoring configured base URLs
/// and org-level overrides.
pub struct ProviderRegistry {
    /// Default base URLs keyed by `api_kind`.
    base_urls: BTreeMap<String, String>,
}

impl ProviderRegistry {
    /// Build a registry from `api_kind → base_url` defaults (usually from
    /// configuration; empty means each dialect's public endpoint).
    pub fn new(base_urls: BTreeMap<String, String>) -> Self {
        Self { base_urls }
    }

    /// Resolve the effective `(api_kind, base_url)` for a provider.
    fn dialect_for(
        &self,
        provider_id: &str,
        org_override: Option<&LlmOverride>,
    ) -> Result<(String, Option<String>), LlmError> {
        let catalog_kind = llm_provider(provider_id)
            .map(|p| p.api_kind.to_owned())
            .ok_or_else(|| LlmError::InvalidResponse {
                reason: format!("unknown provider {provider_id:?}"),
            })?;
        let api_kind = org_override
            .and_then(|o| o.api_kind.clone())
            .unwrap_or(catalog_kind);
        let base_url = org_override
            .and_then(|o| o.base_url.clone())
            .or_else(|| self.base_urls.get(&api_kind).cloned());
        Ok((api_kind, base_url))
    }

    /// Build a completion client for `provider_id`.
    pub fn client(
        &self,
        provider_id: &str,
        credentials: ProviderCredentials,
        org_override: Option<&LlmOverride>,
    ) -> Result<Box<dyn ChatCompletion>, LlmError> {
        let (api_kind, base_url) = self.dialect_for(provider_id, org_override)?;
        match (api_kind.as_str(), credentials) {
            ("openai-compatible", ProviderCredentials::ApiKey(key)) => {
                Ok(Box::new(OpenAiCompatibleClient::new(base_url, key)))
            }
            ("anthropic-compatible", ProviderCredentials::ApiKey(key)) => {
                Ok(Box::new(AnthropicCompatibleClient::new(base_url, key)))
            }
            ("google", ProviderCredentials::ApiKey(key)) => {
                Ok(Box::new(GoogleClient::new(base_url, key)))
            }
            ("vertex", ProviderCredentials::Vertex(creds)) => {
                Ok(Box::new(VertexClient::new(base_url, creds)))
            }
            (kind, _) => Err(LlmError::InvalidResponse {
                reason: format!("credentials do not fit api kind {kind:?}"),
            }),
        }
    }
}
