// SPDX-License-Identifier: MIT OR Apache-2.0
//! Unified error taxonomy with stable error codes for the Vespid control
//! plane.
//!
//! Every API failure carries an [`ErrorCode`] (a machine-readable, stable
//! string tag), the HTTP status it maps to, a human-readable message, and an
//! optional structured `details` object. Handlers build failures with the
//! constructors on [`ApiFailure`]; the dispatcher renders them as
//! `{code, message, details?}`.
//!
//! Codes serialize as `SCREAMING_SNAKE_CASE` strings and are guaranteed not
//! to change across patch releases.
#![deny(unsafe_code)]
#![warn(missing_docs)]

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::fmt;

// ---------------------------------------------------------------------------
// ErrorCategory
// ---------------------------------------------------------------------------

/// Broad family that an [`ErrorCode`] belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Request shape or content failed validation.
    Validation,
    /// The caller could not be authenticated.
    Authentication,
    /// The caller is authenticated but not allowed.
    Authorization,
    /// The addressed resource does not exist (in the caller's tenant).
    NotFound,
    /// The request conflicts with current state or a precondition.
    Conflict,
    /// An external dependency is unavailable or timed out.
    DependencyUnavailable,
    /// An external dependency answered with something unusable.
    DependencyInvalid,
    /// Catch-all for unexpected internal errors.
    Internal,
}

// ---------------------------------------------------------------------------
// ErrorCode
// ---------------------------------------------------------------------------

/// Machine-readable, stable error code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // -- Validation (400) --
    /// Generic request validation failure; `details` names the fields.
    ValidationError,
    /// An org-scoped route was called without `X-Org-Id` (strict mode).
    OrgContextRequired,
    /// `X-Org-Id` was unparseable or disagreed with the route.
    InvalidOrgContext,
    /// A toolset MCP env/header value was not a `${ENV:VAR}` placeholder.
    InvalidMcpPlaceholder,
    /// An agent-skill bundle failed format or path-safety checks.
    InvalidSkillBundle,
    /// A member-role caller must use the organization's default LLM.
    OrgDefaultLlmRequired,

    // -- Authentication (401) --
    /// Missing or unverifiable credentials.
    Unauthorized,
    /// The presented pairing token is unknown, spent, or expired.
    PairingTokenInvalid,
    /// The OAuth nonce attestation did not match the state record.
    OauthInvalidNonce,

    // -- Authorization (403) --
    /// The caller's role does not allow the operation.
    Forbidden,
    /// The caller is not a member of the addressed organization.
    OrgAccessDenied,

    // -- Not found (404) --
    /// Generic missing resource.
    NotFound,
    /// No such connector secret in this organization.
    SecretNotFound,
    /// No such toolset in this organization.
    ToolsetNotFound,
    /// No such toolset-builder session.
    ToolsetBuilderSessionNotFound,
    /// No such agent in this organization.
    AgentNotFound,

    // -- Conflict (409) --
    /// Generic conflict with current state.
    Conflict,
    /// A secret with this `(connector, name)` already exists.
    SecretAlreadyExists,
    /// The requested public slug is already taken.
    PublicSlugConflict,
    /// The toolset-builder session is already finalized.
    ToolsetBuilderSessionFinalized,

    // -- Unprocessable (422) --
    /// The selected LLM provider requires a stored OAuth secret.
    LlmSecretRequired,

    // -- Upstream failures (5xx) --
    /// The channel adapter rejected the delivery.
    ChannelDeliveryFailed,
    /// The job queue refused or timed out on enqueue.
    QueueUnavailable,
    /// The channel adapter is unreachable.
    ChannelDeliveryUnavailable,
    /// No KEK is configured; the secret vault is disabled.
    SecretsNotConfigured,
    /// The LLM provider is unreachable or over capacity.
    LlmUnavailable,
    /// Vertex OAuth client settings are not configured.
    VertexOauthNotConfigured,
    /// Stripe credentials are not configured.
    StripeNotConfigured,
    /// Unexpected internal error.
    InternalError,
}

impl ErrorCode {
    /// The HTTP status this code maps to.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::ValidationError
            | Self::OrgContextRequired
            | Self::InvalidOrgContext
            | Self::InvalidMcpPlaceholder
            | Self::InvalidSkillBundle
            | Self::OrgDefaultLlmRequired => StatusCode::BAD_REQUEST,
            Self::Unauthorized | Self::PairingTokenInvalid | Self::OauthInvalidNonce => {
                StatusCode::UNAUTHORIZED
            }
            Self::Forbidden | Self::OrgAccessDenied => StatusCode::FORBIDDEN,
            Self::NotFound
            | Self::SecretNotFound
            | Self::ToolsetNotFound
            | Self::ToolsetBuilderSessionNotFound
            | Self::AgentNotFound => StatusCode::NOT_FOUND,
            Self::Conflict
            | Self::SecretAlreadyExists
            | Self::PublicSlugConflict
            | Self::ToolsetBuilderSessionFinalized => StatusCode::CONFLICT,
            Self::LlmSecretRequired => StatusCode::UNPROCESSABLE_ENTITY,
            Self::ChannelDeliveryFailed => StatusCode::BAD_GATEWAY,
            Self::QueueUnavailable
            | Self::ChannelDeliveryUnavailable
            | Self::SecretsNotConfigured
            | Self::LlmUnavailable
            | Self::VertexOauthNotConfigured
            | Self::StripeNotConfigured => StatusCode::SERVICE_UNAVAILABLE,
            Self::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// The taxonomy category this code belongs to.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::ValidationError
            | Self::OrgContextRequired
            | Self::InvalidOrgContext
            | Self::InvalidMcpPlaceholder
            | Self::InvalidSkillBundle
            | Self::OrgDefaultLlmRequired => ErrorCategory::Validation,
            Self::Unauthorized | Self::PairingTokenInvalid | Self::OauthInvalidNonce => {
                ErrorCategory::Authentication
            }
            Self::Forbidden | Self::OrgAccessDenied => ErrorCategory::Authorization,
            Self::NotFound
            | Self::SecretNotFound
            | Self::ToolsetNotFound
            | Self::ToolsetBuilderSessionNotFound
            | Self::AgentNotFound => ErrorCategory::NotFound,
            Self::Conflict
            | Self::SecretAlreadyExists
            | Self::PublicSlugConflict
            | Self::ToolsetBuilderSessionFinalized => ErrorCategory::Conflict,
            Self::LlmSecretRequired => ErrorCategory::Validation,
            Self::ChannelDeliveryFailed => ErrorCategory::DependencyInvalid,
            Self::QueueUnavailable
            | Self::ChannelDeliveryUnavailable
            | Self::SecretsNotConfigured
            | Self::LlmUnavailable
            | Self::VertexOauthNotConfigured
            | Self::StripeNotConfigured => ErrorCategory::DependencyUnavailable,
            Self::InternalError => ErrorCategory::Internal,
        }
    }

    /// The wire string for this code (identical to its serde form).
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ValidationError => "VALIDATION_ERROR",
            Self::OrgContextRequired => "ORG_CONTEXT_REQUIRED",
            Self::InvalidOrgContext => "INVALID_ORG_CONTEXT",
            Self::InvalidMcpPlaceholder => "INVALID_MCP_PLACEHOLDER",
            Self::InvalidSkillBundle => "INVALID_SKILL_BUNDLE",
            Self::OrgDefaultLlmRequired => "ORG_DEFAULT_LLM_REQUIRED",
            Self::Unauthorized => "UNAUTHORIZED",
            Self::PairingTokenInvalid => "PAIRING_TOKEN_INVALID",
            Self::OauthInvalidNonce => "OAUTH_INVALID_NONCE",
            Self::Forbidden => "FORBIDDEN",
            Self::OrgAccessDenied => "ORG_ACCESS_DENIED",
            Self::NotFound => "NOT_FOUND",
            Self::SecretNotFound => "SECRET_NOT_FOUND",
            Self::ToolsetNotFound => "TOOLSET_NOT_FOUND",
            Self::ToolsetBuilderSessionNotFound => "TOOLSET_BUILDER_SESSION_NOT_FOUND",
            Self::AgentNotFound => "AGENT_NOT_FOUND",
            Self::Conflict => "CONFLICT",
            Self::SecretAlreadyExists => "SECRET_ALREADY_EXISTS",
            Self::PublicSlugConflict => "PUBLIC_SLUG_CONFLICT",
            Self::ToolsetBuilderSessionFinalized => "TOOLSET_BUILDER_SESSION_FINALIZED",
            Self::LlmSecretRequired => "LLM_SECRET_REQUIRED",
            Self::ChannelDeliveryFailed => "CHANNEL_DELIVERY_FAILED",
            Self::QueueUnavailable => "QUEUE_UNAVAILABLE",
            Self::ChannelDeliveryUnavailable => "CHANNEL_DELIVERY_UNAVAILABLE",
            Self::SecretsNotConfigured => "SECRETS_NOT_CONFIGURED",
            Self::LlmUnavailable => "LLM_UNAVAILABLE",
            Self::VertexOauthNotConfigured => "VERTEX_OAUTH_NOT_CONFIGURED",
            Self::StripeNotConfigured => "STRIPE_NOT_CONFIGURED",
            Self::InternalError => "INTERNAL_ERROR",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// ApiFailure
// ---------------------------------------------------------------------------

/// A typed failure raised by handlers and rendered by the dispatcher.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{code}: {message}")]
pub struct ApiFailure {
    /// Stable machine-readable code.
    pub code: ErrorCode,
    /// Human-readable message. Must not contain secret material.
    pub message: String,
    /// Optional structured detail for validation failures.
    pub details: Option<Value>,
}

impl ApiFailure {
    /// Build a failure for `code` with a custom message.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    /// Attach a structured `details` object.
    #[must_use]
    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    /// HTTP status for this failure.
    pub fn status(&self) -> StatusCode {
        self.code.status()
    }

    /// `true` when this failure maps to a 5xx status.
    pub fn is_server_error(&self) -> bool {
        self.status().is_server_error()
    }

    /// 400 `VALIDATION_ERROR` with a message.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ValidationError, message)
    }

    /// 401 `UNAUTHORIZED`.
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Unauthorized, message)
    }

    /// 403 `FORBIDDEN`.
    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Forbidden, message)
    }

    /// 404 `NOT_FOUND`.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::NotFound, message)
    }

    /// 409 `CONFLICT`.
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Conflict, message)
    }

    /// 500 `INTERNAL_ERROR`. The original cause belongs in the log, not in
    /// the message.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }

    /// The JSON body `{code, message, details?}`.
    pub fn body(&self) -> Value {
        match &self.details {
            Some(details) => json!({
                "code": self.code,
                "message": self.message,
                "details": details,
            }),
            None => json!({
                "code": self.code,
                "message": self.message,
            }),
        }
    }
}

impl IntoResponse for ApiFailure {
    fn into_response(self) -> Response {
        (self.status(), Json(self.body())).into_response()
    }
}

/// Handler result alias used across the daemon.
pub type ApiResult<T> = Result<T, ApiFailure>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_serialize_to_screaming_snake_case() {
        let rendered = serde_json::to_string(&ErrorCode::OrgContextRequired).unwrap();
        assert_eq!(rendered, "\"ORG_CONTEXT_REQUIRED\"");
        let rendered = serde_json::to_string(&ErrorCode::OauthInvalidNonce).unwrap();
        assert_eq!(rendered, "\"OAUTH_INVALID_NONCE\"");
        let rendered = serde_json::to_string(&ErrorCode::LlmSecretRequired).unwrap();
        assert_eq!(rendered, "\"LLM_SECRET_REQUIRED\"");
    }

    #[test]
    fn as_str_matches_serde_form_for_every_code() {
        let all = [
            ErrorCode::ValidationError,
            ErrorCode::OrgContextRequired,
            ErrorCode::InvalidOrgContext,
            ErrorCode::InvalidMcpPlaceholder,
            ErrorCode::InvalidSkillBundle,
            ErrorCode::OrgDefaultLlmRequired,
            ErrorCode::Unauthorized,
            ErrorCode::PairingTokenInvalid,
            ErrorCode::OauthInvalidNonce,
            ErrorCode::Forbidden,
            ErrorCode::OrgAccessDenied,
            ErrorCode::NotFound,
            ErrorCode::SecretNotFound,
            ErrorCode::ToolsetNotFound,
            ErrorCode::ToolsetBuilderSessionNotFound,
            ErrorCode::AgentNotFound,
            ErrorCode::Conflict,
            ErrorCode::SecretAlreadyExists,
            ErrorCode::PublicSlugConflict,
            ErrorCode::ToolsetBuilderSessionFinalized,
            ErrorCode::LlmSecretRequired,
            ErrorCode::ChannelDeliveryFailed,
            ErrorCode::QueueUnavailable,
            ErrorCode::ChannelDeliveryUnavailable,
            ErrorCode::SecretsNotConfigured,
            ErrorCode::LlmUnavailable,
            ErrorCode::VertexOauthNotConfigured,
            ErrorCode::StripeNotConfigured,
            ErrorCode::InternalError,
        ];
        for code in all {
            let serde_form = serde_json::to_value(code).unwrap();
            assert_eq!(serde_form, Value::String(code.as_str().to_owned()));
        }
    }

    #[test]
    fn status_mapping_matches_contract() {
        assert_eq!(ErrorCode::ValidationError.status(), StatusCode::BAD_REQUEST);
        assert_eq!(ErrorCode::Unauthorized.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(ErrorCode::OrgAccessDenied.status(), StatusCode::FORBIDDEN);
        assert_eq!(ErrorCode::SecretNotFound.status(), StatusCode::NOT_FOUND);
        assert_eq!(ErrorCode::Conflict.status(), StatusCode::CONFLICT);
        assert_eq!(
            ErrorCode::LlmSecretRequired.status(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            ErrorCode::ChannelDeliveryFailed.status(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            ErrorCode::QueueUnavailable.status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            ErrorCode::InternalError.status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn body_includes_details_only_when_present() {
        let bare = ApiFailure::conflict("already exists");
        assert_eq!(bare.body().get("details"), None);

        let detailed = ApiFailure::validation("bad input")
            .with_details(json!({"field": "email", "reason": "required"}));
        assert_eq!(
            detailed.body()["details"]["field"],
            Value::String("email".into())
        );
    }
}
