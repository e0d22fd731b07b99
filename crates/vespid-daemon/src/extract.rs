// SPDX-License-Identifier: MIT OR Apache-2.0
//! Handler helpers: auth/org extraction and the error-taxonomy mappings
//! from coordinator errors to [`ApiFailure`].

use crate::middleware::MaybeAuth;
use serde_json::json;
use tracing::error;
use vespid_auth::pairing::PairingError;
use vespid_auth::{AuthContext, AuthError, OrgContext, OrgContextError};
use vespid_core::RoleKey;
use vespid_error::{ApiFailure, ErrorCode};
use vespid_oauth::OAuthError;
use vespid_router::RouterError;
use vespid_runs::RunError;
use vespid_store::StoreError;
use vespid_toolset::{DraftValidationError, ToolsetBuilderError};
use vespid_vault::VaultError;

// ---------------------------------------------------------------------------
// Extraction
// ---------------------------------------------------------------------------

/// Authenticated caller, or 401.
pub fn require_auth(maybe: &MaybeAuth) -> Result<AuthContext, ApiFailure> {
    maybe
        .0
        .clone()
        .ok_or_else(|| ApiFailure::unauthorized("authentication required"))
}

/// Gate a handler on a minimum role.
pub fn require_role(org: &OrgContext, required: RoleKey) -> Result<(), ApiFailure> {
    if org.membership.role_key < required {
        return Err(ApiFailure::new(
            ErrorCode::Forbidden,
            "insufficient role for this operation",
        ));
    }
    Ok(())
}

/// Parse a pagination limit with bounds.
pub fn page_limit(raw: Option<usize>) -> usize {
    raw.unwrap_or(50).clamp(1, 200)
}

// ---------------------------------------------------------------------------
// Error mappings
// ---------------------------------------------------------------------------

/// Store failures outside a more specific coordinator mapping.
pub fn store_failure(err: StoreError) -> ApiFailure {
    match err {
        StoreError::NotFound { entity } => {
            ApiFailure::not_found(format!("{entity} not found"))
        }
        StoreError::Conflict { detail, .. } => ApiFailure::conflict(detail),
        StoreError::TenantViolation => {
            ApiFailure::new(ErrorCode::OrgAccessDenied, "organization access denied")
        }
        StoreError::Precondition { detail } => ApiFailure::conflict(detail),
        StoreError::InvalidTransition { from, to } => {
            ApiFailure::conflict(format!("cannot move run from {from:?} to {to:?}"))
        }
        StoreError::InvalidCursor => ApiFailure::validation("invalid pagination cursor"),
    }
}

/// Authentication failures.
pub fn auth_failure(err: AuthError) -> ApiFailure {
    match err {
        AuthError::InvalidCredentials => ApiFailure::unauthorized("Invalid credentials"),
        AuthError::Unauthorized => ApiFailure::unauthorized("authentication required"),
        AuthError::EmailTaken => ApiFailure::conflict("email already registered"),
        AuthError::Store(err) => store_failure(err),
        AuthError::Crypto(err) => internal("password hashing failed", err),
    }
}

/// Org-context resolution failures.
pub fn org_context_failure(err: OrgContextError) -> ApiFailure {
    match err {
        OrgContextError::ContextRequired => ApiFailure::new(
            ErrorCode::OrgContextRequired,
            "X-Org-Id header is required",
        ),
        OrgContextError::InvalidContext => ApiFailure::new(
            ErrorCode::InvalidOrgContext,
            "X-Org-Id header is invalid for this route",
        ),
        OrgContextError::AccessDenied => ApiFailure::new(
            ErrorCode::OrgAccessDenied,
            "not a member of this organization",
        ),
        OrgContextError::Forbidden => ApiFailure::new(
            ErrorCode::Forbidden,
            "insufficient role for this operation",
        ),
        OrgContextError::Store(err) => store_failure(err),
    }
}

/// Secret-vault failures.
pub fn vault_failure(err: VaultError) -> ApiFailure {
    match err {
        VaultError::NotConfigured => ApiFailure::new(
            ErrorCode::SecretsNotConfigured,
            "secret vault is not configured",
        ),
        VaultError::UnknownConnector { connector_id } => {
            ApiFailure::validation(format!("unknown connector {connector_id:?}"))
                .with_details(json!({ "connectorId": connector_id }))
        }
        VaultError::NotFound => ApiFailure::new(ErrorCode::SecretNotFound, "secret not found"),
        VaultError::AlreadyExists => ApiFailure::new(
            ErrorCode::SecretAlreadyExists,
            "a secret with this name already exists for this connector",
        ),
        VaultError::Crypto(err) => internal("secret envelope failure", err),
        VaultError::Store(err) => store_failure(err),
    }
}

/// Run-coordination failures.
pub fn run_failure(err: RunError) -> ApiFailure {
    match err {
        RunError::WorkflowNotFound => ApiFailure::not_found("workflow not found"),
        RunError::NotPublished => ApiFailure::conflict("workflow is not published"),
        RunError::Queue(err) => {
            ApiFailure::new(ErrorCode::QueueUnavailable, "job queue unavailable")
                .with_details(json!({ "reason": err.reason }))
        }
        RunError::Store(err) => store_failure(err),
    }
}

/// Session-routing failures.
pub fn router_failure(err: RouterError) -> ApiFailure {
    match err {
        RouterError::OrgDefaultLlmRequired => ApiFailure::new(
            ErrorCode::OrgDefaultLlmRequired,
            "the organization default LLM is required for this session",
        ),
        RouterError::InvalidLlm { reason } => ApiFailure::validation(reason),
        RouterError::LlmSecretRequired => ApiFailure::new(
            ErrorCode::LlmSecretRequired,
            "this provider requires a stored OAuth secret",
        ),
        RouterError::SessionNotFound => ApiFailure::not_found("agent session not found"),
        RouterError::Gateway(err) => {
            ApiFailure::new(ErrorCode::QueueUnavailable, "gateway unavailable")
                .with_details(json!({ "reason": err.reason }))
        }
        RouterError::Store(err) => store_failure(err),
    }
}

/// Toolset-builder failures.
pub fn builder_failure(err: ToolsetBuilderError) -> ApiFailure {
    match err {
        ToolsetBuilderError::SessionNotFound => ApiFailure::new(
            ErrorCode::ToolsetBuilderSessionNotFound,
            "toolset builder session not found",
        ),
        ToolsetBuilderError::SessionFinalized => ApiFailure::new(
            ErrorCode::ToolsetBuilderSessionFinalized,
            "toolset builder session is already finalized",
        ),
        ToolsetBuilderError::InvalidLlm { reason } => ApiFailure::validation(reason),
        ToolsetBuilderError::LlmSecretRequired => ApiFailure::new(
            ErrorCode::LlmSecretRequired,
            "this provider requires a stored OAuth secret",
        ),
        ToolsetBuilderError::UnknownComponent { key } => {
            ApiFailure::validation(format!("unknown component {key:?}"))
                .with_details(json!({ "componentKey": key }))
        }
        ToolsetBuilderError::Validation(err) => draft_failure(err),
        ToolsetBuilderError::Llm(err) => {
            ApiFailure::new(ErrorCode::LlmUnavailable, "LLM provider unavailable")
                .with_details(json!({ "reason": err.to_string() }))
        }
        ToolsetBuilderError::Store(err) => store_failure(err),
    }
}

/// Draft-validation failures.
pub fn draft_failure(err: DraftValidationError) -> ApiFailure {
    match &err {
        DraftValidationError::InvalidPlaceholder { server, field } => ApiFailure::new(
            ErrorCode::InvalidMcpPlaceholder,
            "MCP env and header values must be ${ENV:VAR} placeholders",
        )
        .with_details(json!({ "server": server, "field": field })),
        DraftValidationError::ReservedServerName | DraftValidationError::DuplicateServerName { .. } => {
            ApiFailure::validation(err.to_string())
        }
        DraftValidationError::InvalidSkillBundle { bundle, reason } => ApiFailure::new(
            ErrorCode::InvalidSkillBundle,
            "agent-skill bundle failed validation",
        )
        .with_details(json!({ "bundle": bundle, "reason": reason })),
    }
}

/// OAuth failures. `vertex` maps unconfigured clients to its dedicated
/// code; login providers surface 404 (not available on this deployment).
pub fn oauth_failure(err: OAuthError) -> ApiFailure {
    match err {
        OAuthError::Unauthorized => ApiFailure::unauthorized("OAuth state validation failed"),
        OAuthError::InvalidNonce => ApiFailure::new(
            ErrorCode::OauthInvalidNonce,
            "OAuth nonce validation failed",
        ),
        OAuthError::NotConfigured { provider } if provider == "vertex" => ApiFailure::new(
            ErrorCode::VertexOauthNotConfigured,
            "Vertex OAuth is not configured",
        ),
        OAuthError::NotConfigured { provider } => {
            ApiFailure::not_found(format!("OAuth provider {provider:?} is not available"))
        }
        OAuthError::Exchange(err) => {
            ApiFailure::unauthorized("OAuth code exchange failed").with_details(json!({
                "reason": err.to_string(),
            }))
        }
    }
}

/// Pairing failures.
pub fn pairing_failure(err: PairingError) -> ApiFailure {
    match err {
        PairingError::TokenInvalid => ApiFailure::new(
            ErrorCode::PairingTokenInvalid,
            "pairing token is invalid or spent",
        ),
        PairingError::Store(err) => store_failure(err),
    }
}

fn internal(context: &str, err: impl std::fmt::Display) -> ApiFailure {
    // The cause goes to the log; the client sees only the generic message.
    error!(%err, "{context}");
    ApiFailure::internal("internal error")
}
