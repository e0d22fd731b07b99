// SPDX-License-Identifier: MIT OR Apache-2.0
//! Agent-session routing.
//!
//! Session creation resolves which agent should handle the conversation
//! (dimensioned bindings, deterministic ranking), derives the session key,
//! and dedupes against the existing active session for that key. Messaging
//! appends an idempotent `user_message` event and forwards it to the
//! gateway; a gateway failure leaves the event in place, which gives the
//! client at-least-once semantics.
#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod binding;
pub mod gateway;
pub mod key;

pub use binding::{RoutingRequest, binding_matches, resolve_binding};
pub use gateway::{GatewayClient, GatewayMessage, GatewayUnavailable, HttpGatewayClient};
pub use key::{KeyContext, derive_session_key, norm};

use chrono::Utc;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;
use vespid_core::{
    AgentSession, AgentSessionEvent, EventLevel, ExecutorSelector, LlmContext, LlmSelection,
    OrgSettings, PromptSpec, RoleKey, SessionLimits, SessionScope, llm_provider,
};
use vespid_store::{NewAgentSession, NewSessionEvent, Store, StoreError, TenantContext};

/// Engine used when neither the request nor the routed agent names one.
const DEFAULT_ENGINE_ID: &str = "vespid-engine";

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Routing failures.
#[derive(Debug, thiserror::Error)]
pub enum RouterError {
    /// A member-role caller must use the organization's default LLM, and
    /// that default must exist and be session-capable.
    #[error("organization default LLM required")]
    OrgDefaultLlmRequired,

    /// The explicitly requested LLM is unknown or not session-capable.
    #[error("invalid LLM selection: {reason}")]
    InvalidLlm {
        /// What was wrong.
        reason: String,
    },

    /// The provider needs a stored OAuth secret and none was referenced.
    #[error("LLM secret required")]
    LlmSecretRequired,

    /// No such session in this organization.
    #[error("agent session not found")]
    SessionNotFound,

    /// Gateway delivery failed after the event was appended.
    #[error(transparent)]
    Gateway(#[from] GatewayUnavailable),

    /// Store failure.
    #[error(transparent)]
    Store(#[from] StoreError),
}

// ---------------------------------------------------------------------------
// Parameters
// ---------------------------------------------------------------------------

/// Caller-supplied session-creation parameters.
#[derive(Debug, Clone, Default)]
pub struct CreateSessionParams {
    /// Conversation scope; defaults to per-peer.
    pub scope: Option<SessionScope>,
    /// Peer identity.
    pub peer: Option<String>,
    /// Team routing field.
    pub team: Option<String>,
    /// Account routing field.
    pub account: Option<String>,
    /// Channel routing field.
    pub channel: Option<String>,
    /// Engine override.
    pub engine_id: Option<String>,
    /// Toolset to attach.
    pub toolset_id: Option<Uuid>,
    /// LLM selection (ignored for member-role callers).
    pub llm: Option<LlmSelection>,
    /// Prompt configuration.
    pub prompt: PromptSpec,
    /// Tool allow-list.
    pub tools_allow: Vec<String>,
    /// Resource limits.
    pub limits: Option<SessionLimits>,
    /// Executor placement constraints.
    pub executor_selector: ExecutorSelector,
}

/// Outcome of session creation.
#[derive(Debug, Clone)]
pub struct SessionCreation {
    /// The session (new or deduped).
    pub session: AgentSession,
    /// Whether a new row was created.
    pub created: bool,
}

// ---------------------------------------------------------------------------
// SessionRouter
// ---------------------------------------------------------------------------

/// Creates sessions, appends message events, and forwards to the gateway.
pub struct SessionRouter {
    store: Arc<dyn Store>,
    gateway: Arc<dyn GatewayClient>,
}

impl SessionRouter {
    /// Build a router.
    pub fn new(store: Arc<dyn Store>, gateway: Arc<dyn GatewayClient>) -> Self {
        Self { store, gateway }
    }

    /// Pick the LLM for a new session, enforcing the member-role policy.
    fn resolve_llm(
        role: RoleKey,
        requested: Option<LlmSelection>,
        settings: &OrgSettings,
    ) -> Result<LlmSelection, RouterError> {
        let selection = if role == RoleKey::Member {
            let default = settings
                .default_llm
                .clone()
                .ok_or(RouterError::OrgDefaultLlmRequired)?;
            // Members may restate the default but not deviate from it.
            if requested.as_ref().is_some_and(|r| *r != default) {
                return Err(RouterError::OrgDefaultLlmRequired);
            }
            default
        } else {
            requested
                .or_else(|| settings.default_llm.clone())
                .ok_or(RouterError::OrgDefaultLlmRequired)?
        };

        let provider = llm_provider(&selection.provider);
        let session_capable = provider.is_some_and(|p| p.supports(LlmContext::Session));
        if !session_capable {
            // For members this deliberately conflates "no usable default"
            // with "default wrong context"; the public error code is one.
            if role == RoleKey::Member {
                return Err(RouterError::OrgDefaultLlmRequired);
            }
            return Err(RouterError::InvalidLlm {
                reason: format!("provider {:?} is not session-capable", selection.provider),
            });
        }
        if provider.is_some_and(|p| p.requires_oauth) && selection.secret_id.is_none() {
            return Err(RouterError::LlmSecretRequired);
        }
        Ok(selection)
    }

    /// Create (or dedupe into) the session for this routing context.
    pub async fn create_session(
        &self,
        ctx: &TenantContext,
        organization_id: Uuid,
        role: RoleKey,
        settings: &OrgSettings,
        params: CreateSessionParams,
    ) -> Result<SessionCreation, RouterError> {
        let llm = Self::resolve_llm(role, params.llm.clone(), settings)?;
        let scope = params.scope.unwrap_or(SessionScope::PerPeer);

        let bindings = self.store.list_bindings(ctx, organization_id).await?;
        let request = RoutingRequest {
            organization_id,
            role,
            peer: params.peer.as_deref(),
            team: params.team.as_deref(),
            account: params.account.as_deref(),
            channel: params.channel.as_deref(),
        };
        let winner = resolve_binding(&bindings, &request);
        let routed_agent_id = winner.map(|b| b.agent_id);
        let binding_id = winner.map(|b| b.id);

        let session_key = derive_session_key(
            routed_agent_id,
            organization_id,
            scope,
            &KeyContext {
                peer: params.peer.as_deref(),
                channel_id: params.channel.as_deref(),
                account_id: params.account.as_deref(),
                actor_user_id: Some(ctx.actor_user_id),
            },
        );

        if let Some(existing) = self
            .store
            .agent_session_by_key(ctx, organization_id, &session_key)
            .await?
        {
            debug!(session_key, session_id = %existing.id, "deduped into existing session");
            return Ok(SessionCreation {
                session: existing,
                created: false,
            });
        }

        let engine_id = match (&params.engine_id, routed_agent_id) {
            (Some(engine), _) => engine.clone(),
            (None, Some(agent_id)) => self
                .store
                .agent(ctx, organization_id, agent_id)
                .await?
                .map(|a| a.engine_id)
                .unwrap_or_else(|| DEFAULT_ENGINE_ID.to_owned()),
            (None, None) => DEFAULT_ENGINE_ID.to_owned(),
        };

        let limits = params
            .limits
            .or_else(|| settings.session_defaults.clone())
            .unwrap_or_default();
        let session = self
            .store
            .create_agent_session(
                ctx,
                NewAgentSession {
                    organization_id,
                    session_key: session_key.clone(),
                    scope,
                    routed_agent_id,
                    binding_id,
                    engine_id,
                    toolset_id: params.toolset_id,
                    llm,
                    prompt: params.prompt,
                    tools_allow: params.tools_allow,
                    limits,
                    executor_selector: params.executor_selector,
                },
            )
            .await?;
        info!(session_id = %session.id, session_key, "agent session created");
        Ok(SessionCreation {
            session,
            created: true,
        })
    }

    /// Append a `user_message` event (idempotent by key) and forward it to
    /// the gateway. The event survives a gateway failure.
    pub async fn post_message(
        &self,
        ctx: &TenantContext,
        organization_id: Uuid,
        session_id: Uuid,
        payload: Value,
        idempotency_key: Option<String>,
    ) -> Result<(AgentSessionEvent, bool), RouterError> {
        let session = self
            .store
            .agent_session(ctx, organization_id, session_id)
            .await?
            .ok_or(RouterError::SessionNotFound)?;

        let (event, created) = self
            .store
            .append_session_event(
                ctx,
                organization_id,
                session_id,
                NewSessionEvent {
                    event_type: "user_message".into(),
                    level: EventLevel::Info,
                    idempotency_key,
                    payload,
                },
                Utc::now(),
            )
            .await?;

        self.gateway
            .forward_user_message(&GatewayMessage {
                session_id,
                session_key: session.session_key,
                seq: event.seq,
                payload: event.payload.clone(),
            })
            .await?;
        Ok((event, created))
    }

    /// Reset a session: clear the pinned agent (and pinned executor) and
    /// append a `system` event recording the reset.
    pub async fn reset_session(
        &self,
        ctx: &TenantContext,
        organization_id: Uuid,
        session_id: Uuid,
    ) -> Result<AgentSession, RouterError> {
        let now = Utc::now();
        let session = self
            .store
            .clear_session_pin(ctx, organization_id, session_id, now)
            .await
            .map_err(|err| match err {
                StoreError::NotFound { .. } => RouterError::SessionNotFound,
                other => RouterError::Store(other),
            })?;
        self.store
            .append_session_event(
                ctx,
                organization_id,
                session_id,
                NewSessionEvent {
                    event_type: "system".into(),
                    level: EventLevel::Info,
                    idempotency_key: None,
                    payload: serde_json::json!({ "action": "reset" }),
                },
                now,
            )
            .await?;
        Ok(session)
    }
}
