// SPDX-License-Identifier: MIT OR Apache-2.0
//! The toolset-builder engine.
//!
//! A multi-turn state machine (`ACTIVE → FINALIZED`) over user intent,
//! catalog ranking, and LLM completions. MCP servers always come from the
//! component catalog — the model suggests, it never invents — and the
//! final draft must pass [`validate::validate_draft`] before the session
//! can finalize.
#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod ranking;
pub mod redact;
pub mod validate;

pub use ranking::{DEFAULT_LIMIT, rank_components, suggest_components, tokenize};
pub use redact::redact_secrets;
pub use validate::{
    DraftValidationError, RESERVED_SERVER_NAME, SKILL_BUNDLE_FORMAT, is_env_placeholder,
    is_safe_bundle_path, validate_draft,
};

use async_trait::async_trait;
use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;
use vespid_core::{
    AgentSkillBundle, LlmContext, LlmSelection, McpServerSpec, ToolsetBuilderSession,
    ToolsetBuilderStatus, ToolsetDraft, TurnRole, component, llm_provider,
};
use vespid_llm::{ChatMessage, ChatRequest, ChatResponse, LlmError};
use vespid_store::{
    BuilderSessionUpdate, NewBuilderSession, Store, StoreError, TenantContext,
};

/// Assistant turn used when a session starts without an intent.
const CANNED_OPENER: &str =
    "Tell me what this toolset should help with, and I'll suggest components from the catalog.";

/// Transcript window replayed into each assistant turn.
const CONTEXT_TURNS: usize = 12;

/// Suggestions surfaced per assistant turn.
const SUGGESTION_COUNT: usize = 5;

// ---------------------------------------------------------------------------
// Completion backend
// ---------------------------------------------------------------------------

/// How the engine reaches an LLM. The daemon implements this over the
/// provider registry and the secret vault; tests script it.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    /// Run one completion on behalf of an organization.
    async fn complete(
        &self,
        organization_id: Uuid,
        llm: &LlmSelection,
        request: ChatRequest,
    ) -> Result<ChatResponse, LlmError>;
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Builder-engine failures.
#[derive(Debug, thiserror::Error)]
pub enum ToolsetBuilderError {
    /// 404 `TOOLSET_BUILDER_SESSION_NOT_FOUND`.
    #[error("toolset builder session not found")]
    SessionNotFound,

    /// 409 `TOOLSET_BUILDER_SESSION_FINALIZED`.
    #[error("toolset builder session is finalized")]
    SessionFinalized,

    /// 400: the LLM config cannot drive the builder.
    #[error("invalid LLM configuration: {reason}")]
    InvalidLlm {
        /// What was wrong.
        reason: String,
    },

    /// 422 `LLM_SECRET_REQUIRED`.
    #[error("LLM secret required")]
    LlmSecretRequired,

    /// 400: a selected component key is not in the catalog.
    #[error("unknown component {key:?}")]
    UnknownComponent {
        /// The rejected key.
        key: String,
    },

    /// 400: the produced draft failed validation.
    #[error(transparent)]
    Validation(#[from] DraftValidationError),

    /// 503 `LLM_UNAVAILABLE`.
    #[error(transparent)]
    Llm(#[from] LlmError),

    /// Store failure.
    #[error(transparent)]
    Store(#[from] StoreError),
}

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

/// Result of `create_session` and `chat`.
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    /// Session state after the turn.
    pub session: ToolsetBuilderSession,
    /// Component keys suggested by this turn.
    pub suggested_component_keys: Vec<String>,
    /// Assistant text recorded for this turn.
    pub assistant_message: String,
}

/// Result of `finalize`.
#[derive(Debug, Clone)]
pub struct FinalizeOutcome {
    /// The finalized session.
    pub session: ToolsetBuilderSession,
    /// The validated draft.
    pub draft: ToolsetDraft,
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// The builder state machine.
pub struct BuilderEngine {
    store: Arc<dyn Store>,
    backend: Arc<dyn CompletionBackend>,
}

impl BuilderEngine {
    /// Build an engine.
    pub fn new(store: Arc<dyn Store>, backend: Arc<dyn CompletionBackend>) -> Self {
        Self { store, backend }
    }

    /// Validate that `llm` can drive the builder: the provider must support
    /// the builder context, and OAuth providers need a stored secret of the
    /// matching connector.
    async fn check_llm(
        &self,
        ctx: &TenantContext,
        organization_id: Uuid,
        llm: &LlmSelection,
    ) -> Result<(), ToolsetBuilderError> {
        let provider =
            llm_provider(&llm.provider).ok_or_else(|| ToolsetBuilderError::InvalidLlm {
                reason: format!("unknown provider {:?}", llm.provider),
            })?;
        if !provider.supports(LlmContext::ToolsetBuilder) {
            return Err(ToolsetBuilderError::InvalidLlm {
                reason: format!("provider {:?} cannot drive the builder", llm.provider),
            });
        }
        if provider.requires_oauth {
            let secret_id = llm.secret_id.ok_or(ToolsetBuilderError::LlmSecretRequired)?;
            let record = self
                .store
                .secret(ctx, organization_id, secret_id)
                .await?
                .ok_or(ToolsetBuilderError::LlmSecretRequired)?;
            if record.connector_id != provider.oauth_connector_id() {
                return Err(ToolsetBuilderError::LlmSecretRequired);
            }
        }
        Ok(())
    }

    fn system_prompt() -> String {
        let catalog: Vec<String> = vespid_core::component_catalog()
            .iter()
            .map(|c| format!("- {}: {}", c.key, c.description))
            .collect();
        format!(
            "You help an operator assemble a toolset for an AI agent. \
             Available components:\n{}\nSuggest only these components.",
            catalog.join("\n"),
        )
    }

    async fn assistant_turn(
        &self,
        ctx: &TenantContext,
        organization_id: Uuid,
        llm: &LlmSelection,
        session_id: Uuid,
        user_text: &str,
    ) -> Result<(Vec<String>, String), ToolsetBuilderError> {
        let suggested: Vec<String> = suggest_components(user_text, SUGGESTION_COUNT)
            .iter()
            .map(|c| c.key.to_owned())
            .collect();

        let mut messages = vec![ChatMessage::system(Self::system_prompt())];
        for turn in self
            .store
            .recent_builder_turns(ctx, organization_id, session_id, CONTEXT_TURNS)
            .await?
        {
            messages.push(match turn.role {
                TurnRole::User => ChatMessage::user(turn.message_text),
                TurnRole::Assistant => ChatMessage::assistant(turn.message_text),
            });
        }
        messages.push(ChatMessage::user(format!(
            "{user_text}\n\nCatalog matches for this request: {}",
            suggested.join(", "),
        )));

        let response = self
            .backend
            .complete(
                organization_id,
                llm,
                ChatRequest {
                    model: llm.model.clone(),
                    messages,
                    max_tokens: Some(1024),
                },
            )
            .await?;
        Ok((suggested, response.text))
    }

    /// Create a builder session; with a non-empty intent the first
    /// assistant turn runs immediately.
    pub async fn create_session(
        &self,
        ctx: &TenantContext,
        organization_id: Uuid,
        llm: LlmSelection,
        intent: Option<String>,
    ) -> Result<TurnOutcome, ToolsetBuilderError> {
        self.check_llm(ctx, organization_id, &llm).await?;
        let intent = intent.filter(|i| !i.trim().is_empty());
        let session = self
            .store
            .create_builder_session(
                ctx,
                NewBuilderSession {
                    organization_id,
                    created_by: ctx.actor_user_id,
                    llm: llm.clone(),
                    // The transcript and the stored intent both carry the
                    // redacted form only.
                    latest_intent: intent.as_deref().map(redact_secrets),
                },
            )
            .await?;

        let now = Utc::now();
        let (suggested, assistant_message) = match &intent {
            Some(intent_text) => {
                // Run the completion first; the turn pair is persisted only
                // once the provider has answered.
                let redacted = redact_secrets(intent_text);
                let outcome = self
                    .assistant_turn(ctx, organization_id, &llm, session.id, &redacted)
                    .await?;
                self.store
                    .append_builder_turn(
                        ctx,
                        organization_id,
                        session.id,
                        TurnRole::User,
                        redacted,
                        now,
                    )
                    .await?;
                outcome
            }
            None => (Vec::new(), CANNED_OPENER.to_owned()),
        };
        self.store
            .append_builder_turn(
                ctx,
                organization_id,
                session.id,
                TurnRole::Assistant,
                assistant_message.clone(),
                now,
            )
            .await?;
        let session = self
            .store
            .update_builder_session(
                ctx,
                organization_id,
                session.id,
                BuilderSessionUpdate {
                    selected_component_keys: Some(suggested.clone()),
                    ..Default::default()
                },
                now,
            )
            .await?;
        info!(session_id = %session.id, "builder session created");
        Ok(TurnOutcome {
            session,
            suggested_component_keys: suggested,
            assistant_message,
        })
    }

    async fn active_session(
        &self,
        ctx: &TenantContext,
        organization_id: Uuid,
        session_id: Uuid,
    ) -> Result<ToolsetBuilderSession, ToolsetBuilderError> {
        let session = self
            .store
            .builder_session(ctx, organization_id, session_id)
            .await?
            .ok_or(ToolsetBuilderError::SessionNotFound)?;
        if session.status == ToolsetBuilderStatus::Finalized {
            return Err(ToolsetBuilderError::SessionFinalized);
        }
        Ok(session)
    }

    fn check_keys(keys: &[String]) -> Result<(), ToolsetBuilderError> {
        for key in keys {
            if component(key).is_none() {
                return Err(ToolsetBuilderError::UnknownComponent { key: key.clone() });
            }
        }
        Ok(())
    }

    /// One chat turn: redact + record the user message, run the assistant,
    /// persist the union of suggestions and the caller's selection.
    pub async fn chat(
        &self,
        ctx: &TenantContext,
        organization_id: Uuid,
        session_id: Uuid,
        message: &str,
        caller_selection: Vec<String>,
    ) -> Result<TurnOutcome, ToolsetBuilderError> {
        let session = self.active_session(ctx, organization_id, session_id).await?;
        Self::check_keys(&caller_selection)?;

        let redacted = redact_secrets(message);
        let now = Utc::now();
        let (suggested, assistant_message) = self
            .assistant_turn(ctx, organization_id, &session.llm, session_id, &redacted)
            .await?;
        self.store
            .append_builder_turn(
                ctx,
                organization_id,
                session_id,
                TurnRole::User,
                redacted.clone(),
                now,
            )
            .await?;
        self.store
            .append_builder_turn(
                ctx,
                organization_id,
                session_id,
                TurnRole::Assistant,
                assistant_message.clone(),
                now,
            )
            .await?;

        let mut selection = session.selected_component_keys.clone();
        for key in caller_selection.into_iter().chain(suggested.iter().cloned()) {
            if !selection.contains(&key) {
                selection.push(key);
            }
        }
        let session = self
            .store
            .update_builder_session(
                ctx,
                organization_id,
                session_id,
                BuilderSessionUpdate {
                    latest_intent: Some(redacted),
                    selected_component_keys: Some(selection),
                    ..Default::default()
                },
                now,
            )
            .await?;
        Ok(TurnOutcome {
            session,
            suggested_component_keys: suggested,
            assistant_message,
        })
    }

    /// Parse the agent-skills JSON out of a model reply; unusable output
    /// degrades to no skills rather than failing the finalize.
    fn parse_agent_skills(reply: &str) -> Vec<AgentSkillBundle> {
        let Some(start) = reply.find('{') else {
            return Vec::new();
        };
        let Some(end) = reply.rfind('}') else {
            return Vec::new();
        };
        let parsed: Result<serde_json::Value, _> = serde_json::from_str(&reply[start..=end]);
        match parsed {
            Ok(value) => serde_json::from_value(value["agentSkills"].clone()).unwrap_or_default(),
            Err(err) => {
                warn!(%err, "agent-skills reply was not JSON, dropping");
                Vec::new()
            }
        }
    }

    /// Finalize the session: assemble servers from the catalog, run the
    /// final agent-skills completion, validate, and seal the session.
    pub async fn finalize(
        &self,
        ctx: &TenantContext,
        organization_id: Uuid,
        session_id: Uuid,
    ) -> Result<FinalizeOutcome, ToolsetBuilderError> {
        let session = self.active_session(ctx, organization_id, session_id).await?;
        let keys = session.selected_component_keys.clone();
        Self::check_keys(&keys)?;

        // Servers come from the catalog by key; the model cannot invent one.
        let mut servers = BTreeMap::new();
        for key in &keys {
            let item = component(key).expect("keys validated above");
            servers.insert(
                item.key.to_owned(),
                McpServerSpec {
                    command: item.command.to_owned(),
                    args: item.args.iter().map(|s| s.to_string()).collect(),
                    env: item
                        .env
                        .iter()
                        .map(|(k, v)| (k.to_string(), v.to_string()))
                        .collect(),
                    headers: BTreeMap::new(),
                },
            );
        }

        let mut messages = vec![ChatMessage::system(format!(
            "Produce agent skills for a toolset using these components: {}. \
             Reply with JSON: {{\"agentSkills\": [{{\"name\", \"format\": \
             \"{SKILL_BUNDLE_FORMAT}\", \"files\": [\"{}\", ...]}}]}}. \
             Reply with JSON only.",
            keys.join(", "),
            validate::SKILL_MANIFEST,
        ))];
        for turn in self
            .store
            .recent_builder_turns(ctx, organization_id, session_id, CONTEXT_TURNS)
            .await?
        {
            messages.push(match turn.role {
                TurnRole::User => ChatMessage::user(turn.message_text),
                TurnRole::Assistant => ChatMessage::assistant(turn.message_text),
            });
        }
        let reply = self
            .backend
            .complete(
                organization_id,
                &session.llm,
                ChatRequest {
                    model: session.llm.model.clone(),
                    messages,
                    max_tokens: Some(2048),
                },
            )
            .await?;

        let draft = ToolsetDraft {
            mcp_servers: servers,
            agent_skills: Self::parse_agent_skills(&reply.text),
        };
        validate_draft(&draft, &keys)?;

        let now = Utc::now();
        self.store
            .append_builder_turn(
                ctx,
                organization_id,
                session_id,
                TurnRole::Assistant,
                format!("Finalized toolset with components: {}", keys.join(", ")),
                now,
            )
            .await?;
        let session = self
            .store
            .update_builder_session(
                ctx,
                organization_id,
                session_id,
                BuilderSessionUpdate {
                    status: Some(ToolsetBuilderStatus::Finalized),
                    final_draft: Some(draft.clone()),
                    ..Default::default()
                },
                now,
            )
            .await?;
        info!(session_id = %session.id, "builder session finalized");
        Ok(FinalizeOutcome { session, draft })
    }
}
