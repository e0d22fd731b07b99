// SPDX-License-Identifier: MIT OR Apache-2.0
//! Dialect clients. Each speaks one provider wire format and maps transport
//! failures to [`LlmError::Unavailable`] and unusable 2xx bodies to
//! [`LlmError::InvalidResponse`].

use crate::{ChatCompletion, ChatRequest, ChatResponse, ChatRole, LLM_TIMEOUT_SEC, LlmError};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};
use std::time::Duration;

fn timeout() -> Duration {
    Duration::from_secs(LLM_TIMEOUT_SEC)
}

fn unavailable(err: impl std::fmt::Display) -> LlmError {
    LlmError::Unavailable {
        reason: err.to_string(),
    }
}

fn invalid(reason: impl Into<String>) -> LlmError {
    LlmError::InvalidResponse {
        reason: reason.into(),
    }
}

async fn check_status(response: reqwest::Response) -> Result<Value, LlmError> {
    let status = response.status();
    if !status.is_success() {
        return Err(LlmError::Unavailable {
            reason: format!("provider answered {status}"),
        });
    }
    response.json().await.map_err(unavailable)
}

// ---------------------------------------------------------------------------
// openai-compatible
// ---------------------------------------------------------------------------

/// Client for `/chat/completions`-shaped APIs.
pub struct OpenAiCompatibleClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl OpenAiCompatibleClient {
    /// Default public endpoint.
    pub const DEFAULT_BASE_URL: &'static str = "https://api.openai.com/v1";

    /// Build a client; `base_url: None` uses the public endpoint.
    pub fn new(base_url: Option<String>, api_key: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.unwrap_or_else(|| Self::DEFAULT_BASE_URL.to_owned()),
            api_key,
        }
    }
}

#[async_trait]
impl ChatCompletion for OpenAiCompatibleClient {
    async fn complete(&self, request: ChatRequest) -> Result<ChatResponse, LlmError> {
        let messages: Vec<Value> = request
            .messages
            .iter()
            .map(|m| {
                json!({
                    "role": match m.role {
                        ChatRole::System => "system",
                        ChatRole::User => "user",
                        ChatRole::Assistant => "assistant",
                    },
                    "content": m.content,
                })
            })
            .collect();
        let mut body = json!({ "model": request.model, "messages": messages });
        if let Some(max_tokens) = request.max_tokens {
            body["max_tokens"] = json!(max_tokens);
        }
        let response = self
            .http
            .post(format!(
                "{}/chat/completions",
                self.base_url.trim_end_matches('/')
            ))
            .timeout(timeout())
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(unavailable)?;
        let body = check_status(response).await?;
        let text = body["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| invalid("missing choices[0].message.content"))?;
        Ok(ChatResponse { text: text.into() })
    }
}

// ---------------------------------------------------------------------------
// anthropic-compatible
// ---------------------------------------------------------------------------

/// Client for `/v1/messages`-shaped APIs.
pub struct AnthropicCompatibleClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl AnthropicCompatibleClient {
    /// Default public endpoint.
    pub const DEFAULT_BASE_URL: &'static str = "https://api.anthropic.com";
    /// Reply ceiling when the request does not set one; the messages API
    /// requires the field.
    const DEFAULT_MAX_TOKENS: u32 = 1024;

    /// Build a client; `base_url: None` uses the public endpoint.
    pub fn new(base_url: Option<String>, api_key: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.unwrap_or_else(|| Self::DEFAULT_BASE_URL.to_owned()),
            api_key,
        }
    }
}

#[async_trait]
impl ChatCompletion for AnthropicCompatibleClient {
    async fn complete(&self, request: ChatRequest) -> Result<ChatResponse, LlmError> {
        // System prompt travels as a top-level field in this dialect.
        let system: Vec<&str> = request
            .messages
            .iter()
            .filter(|m| m.role == ChatRole::System)
            .map(|m| m.content.as_str())
            .collect();
        let messages: Vec<Value> = request
            .messages
            .iter()
            .filter(|m| m.role != ChatRole::System)
            .map(|m| {
                json!({
                    "role": if m.role == ChatRole::User { "user" } else { "assistant" },
                    "content": m.content,
                })
            })
            .collect();
        let mut body = json!({
            "model": request.model,
            "max_tokens": request.max_tokens.unwrap_or(Self::DEFAULT_MAX_TOKENS),
            "messages": messages,
        });
        if !system.is_empty() {
            body["system"] = json!(system.join("\n\n"));
        }
        let response = self
            .http
            .post(format!("{}/v1/messages", self.base_url.trim_end_matches('/')))
            .timeout(timeout())
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .json(&body)
            .send()
            .await
            .map_err(unavailable)?;
        let body = check_status(response).await?;
        let text = body["content"][0]["text"]
            .as_str()
            .ok_or_else(|| invalid("missing content[0].text"))?;
        Ok(ChatResponse { text: text.into() })
    }
}

// ---------------------------------------------------------------------------
// google
// ---------------------------------------------------------------------------

/// Client for the Gemini `generateContent` API (API-key auth).
pub struct GoogleClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl GoogleClient {
    /// Default public endpoint.
    pub const DEFAULT_BASE_URL: &'static str = "https://generativelanguage.googleapis.com";

    /// Build a client; `base_url: None` uses the public endpoint.
    pub fn new(base_url: Option<String>, api_key: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.unwrap_or_else(|| Self::DEFAULT_BASE_URL.to_owned()),
            api_key,
        }
    }
}

fn gemini_contents(request: &ChatRequest) -> Value {
    let contents: Vec<Value> = request
        .messages
        .iter()
        .filter(|m| m.role != ChatRole::System)
        .map(|m| {
            json!({
                "role": if m.role == ChatRole::User { "user" } else { "model" },
                "parts": [{ "text": m.content }],
            })
        })
        .collect();
    let mut body = json!({ "contents": contents });
    let system: Vec<&str> = request
        .messages
        .iter()
        .filter(|m| m.role == ChatRole::System)
        .map(|m| m.content.as_str())
        .collect();
    if !system.is_empty() {
        body["systemInstruction"] = json!({ "parts": [{ "text": system.join("\n\n") }] });
    }
    if let Some(max_tokens) = request.max_tokens {
        body["generationConfig"] = json!({ "maxOutputTokens": max_tokens });
    }
    body
}

fn gemini_text(body: &Value) -> Result<String, LlmError> {
    let parts = body["candidates"][0]["content"]["parts"]
        .as_array()
        .ok_or_else(|| invalid("missing candidates[0].content.parts"))?;
    let text: String = parts
        .iter()
        .filter_map(|p| p["text"].as_str())
        .collect::<Vec<_>>()
        .join("");
    if text.is_empty() {
        return Err(invalid("candidate contained no text parts"));
    }
    Ok(text)
}

#[async_trait]
impl ChatCompletion for GoogleClient {
    async fn complete(&self, request: ChatRequest) -> Result<ChatResponse, LlmError> {
        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url.trim_end_matches('/'),
            request.model,
        );
        let response = self
            .http
            .post(url)
            .timeout(timeout())
            .query(&[("key", self.api_key.as_str())])
            .json(&gemini_contents(&request))
            .send()
            .await
            .map_err(unavailable)?;
        let body = check_status(response).await?;
        Ok(ChatResponse {
            text: gemini_text(&body)?,
        })
    }
}

// ---------------------------------------------------------------------------
// vertex
// ---------------------------------------------------------------------------

/// The JSON blob stored as a `llm.vertex.oauth` connector secret.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VertexCredentials {
    /// Long-lived OAuth refresh token.
    pub refresh_token: String,
    /// GCP project.
    pub project_id: String,
    /// Vertex region.
    pub location: String,
    /// OAuth client id used for the refresh exchange.
    #[serde(default)]
    pub client_id: Option<String>,
    /// OAuth client secret used for the refresh exchange.
    #[serde(default)]
    pub client_secret: Option<String>,
}

/// Client for Vertex `generateContent` (OAuth refresh-token auth).
pub struct VertexClient {
    http: reqwest::Client,
    base_url: Option<String>,
    credentials: VertexCredentials,
}

impl VertexClient {
    /// Google's OAuth token endpoint.
    pub const TOKEN_URL: &'static str = "https://oauth2.googleapis.com/token";

    /// Build a client; `base_url: None` derives the regional endpoint.
    pub fn new(base_url: Option<String>, credentials: VertexCredentials) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url,
            credentials,
        }
    }

    fn regional_base(&self) -> String {
        match &self.base_url {
            Some(base) => base.trim_end_matches('/').to_owned(),
            None => format!(
                "https://{}-aiplatform.googleapis.com",
                self.credentials.location
            ),
        }
    }

    async fn access_token(&self) -> Result<String, LlmError> {
        let mut form = vec![
            ("grant_type", "refresh_token".to_owned()),
            ("refresh_token", self.credentials.refresh_token.clone()),
        ];
        if let Some(client_id) = &self.credentials.client_id {
            form.push(("client_id", client_id.clone()));
        }
        if let Some(client_secret) = &self.credentials.client_secret {
            form.push(("client_secret", client_secret.clone()));
        }
        let response = self
            .http
            .post(Self::TOKEN_URL)
            .timeout(timeout())
            .form(&form)
            .send()
            .await
            .map_err(unavailable)?;
        let body = check_status(response).await?;
        body["access_token"]
            .as_str()
            .map(str::to_owned)
            .ok_or_else(|| invalid("token exchange returned no access_token"))
    }
}

#[async_trait]
impl ChatCompletion for VertexClient {
    async fn complete(&self, request: ChatRequest) -> Result<ChatResponse, LlmError> {
        let token = self.access_token().await?;
        let url = format!(
            "{}/v1/projects/{}/locations/{}/publishers/google/models/{}:generateContent",
            self.regional_base(),
            self.credentials.project_id,
            self.credentials.location,
            request.model,
        );
        let response = self
            .http
            .post(url)
            .timeout(timeout())
            .bearer_auth(token)
            .json(&gemini_contents(&request))
            .send()
            .await
            .map_err(unavailable)?;
        let body = check_status(response).await?;
        Ok(ChatResponse {
            text: gemini_text(&body)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ChatMessage;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn request() -> ChatRequest {
        ChatRequest {
            model: "test-model".into(),
            messages: vec![
                ChatMessage {
                    role: ChatRole::System,
                    content: "be brief".into(),
                },
                ChatMessage {
                    role: ChatRole::User,
                    content: "hello".into(),
                },
            ],
            max_tokens: Some(64),
        }
    }

    #[tokio::test]
    async fn openai_dialect_round_trips() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .and(body_partial_json(serde_json::json!({ "model": "test-model" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{ "message": { "role": "assistant", "content": "hi there" } }]
            })))
            .mount(&server)
            .await;
        let client = OpenAiCompatibleClient::new(Some(server.uri()), "sk-test".into());
        let reply = client.complete(request()).await.unwrap();
        assert_eq!(reply.text, "hi there");
    }

    #[tokio::test]
    async fn anthropic_dialect_lifts_system_prompt() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .and(header("x-api-key", "sk-ant-test"))
            .and(body_partial_json(serde_json::json!({ "system": "be brief" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "content": [{ "type": "text", "text": "hello back" }]
            })))
            .mount(&server)
            .await;
        let client = AnthropicCompatibleClient::new(Some(server.uri()), "sk-ant-test".into());
        let reply = client.complete(request()).await.unwrap();
        assert_eq!(reply.text, "hello back");
    }

    #[tokio::test]
    async fn google_dialect_joins_text_parts() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1beta/models/test-model:generateContent"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "candidates": [{ "content": { "parts": [
                    { "text": "two " }, { "text": "parts" }
                ] } }]
            })))
            .mount(&server)
            .await;
        let client = GoogleClient::new(Some(server.uri()), "g-key".into());
        let reply = client.complete(request()).await.unwrap();
        assert_eq!(reply.text, "two parts");
    }

    #[tokio::test]
    async fn provider_5xx_maps_to_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(529))
            .mount(&server)
            .await;
        let client = OpenAiCompatibleClient::new(Some(server.uri()), "sk".into());
        assert!(matches!(
            client.complete(request()).await,
            Err(LlmError::Unavailable { .. })
        ));
    }

    #[tokio::test]
    async fn malformed_success_body_is_invalid_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({ "odd": true })),
            )
            .mount(&server)
            .await;
        let client = OpenAiCompatibleClient::new(Some(server.uri()), "sk".into());
        assert!(matches!(
            client.complete(request()).await,
            Err(LlmError::InvalidResponse { .. })
        ));
    }
}
