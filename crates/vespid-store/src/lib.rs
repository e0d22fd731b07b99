// SPDX-License-Identifier: MIT OR Apache-2.0
//! Tenant-scoped persistence interface for the Vespid control plane.
//!
//! Every organization-scoped call carries a [`TenantContext`]; the
//! implementation installs it for the duration of the call and refuses rows
//! outside the context's organization. The pre-auth surface (signup, token
//! verification, invitation acceptance, pairing exchange) is the explicit
//! set of methods that take ids instead of a context.
//!
//! [`memory::InMemoryStore`] is the reference implementation; a durable
//! implementation would hold the same contract over real transactions.
#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use uuid::Uuid;
use vespid_core::{
    AgentBinding, AgentRecord, AgentSession, AgentSessionEvent, AuthSession, BindingDimension,
    ConnectorSecretRecord, CreditLedgerEntry, CreditReason, EventLevel, ExecutorSelector,
    ExecutorTokenRecord, Invitation, InvitationStatus, LlmSelection, Membership, Organization,
    OrganizationCredits, PairingTokenRecord, PromptSpec, RoleKey, RunTrigger, SessionLimits,
    SessionScope, Toolset, ToolsetBuilderSession, ToolsetBuilderStatus, ToolsetBuilderTurn,
    ToolsetDraft, ToolsetVisibility, TurnRole, User, Workflow, WorkflowRun, WorkflowRunEvent,
    WorkflowRunStatus,
};

// ---------------------------------------------------------------------------
// Tenant context
// ---------------------------------------------------------------------------

/// The `(actor, organization?)` pair installed on every store call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TenantContext {
    /// The authenticated user the call acts as.
    pub actor_user_id: Uuid,
    /// The organization scope, when resolved.
    pub organization_id: Option<Uuid>,
}

impl TenantContext {
    /// A user-scoped context without an organization.
    pub fn user(actor_user_id: Uuid) -> Self {
        Self {
            actor_user_id,
            organization_id: None,
        }
    }

    /// An organization-scoped context.
    pub fn org(actor_user_id: Uuid, organization_id: Uuid) -> Self {
        Self {
            actor_user_id,
            organization_id: Some(organization_id),
        }
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Failures surfaced by store implementations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// The addressed row does not exist inside the tenant context.
    #[error("{entity} not found")]
    NotFound {
        /// Entity name for diagnostics.
        entity: &'static str,
    },

    /// A uniqueness constraint was violated.
    #[error("{entity} conflict: {detail}")]
    Conflict {
        /// Entity name for diagnostics.
        entity: &'static str,
        /// Which constraint fired.
        detail: String,
    },

    /// The tenant context does not cover the addressed organization.
    #[error("tenant context violation")]
    TenantViolation,

    /// A state precondition failed (immutable row, spent token, …).
    #[error("precondition failed: {detail}")]
    Precondition {
        /// Human-readable description.
        detail: String,
    },

    /// A run status transition that the lifecycle forbids.
    #[error("invalid run transition {from:?} -> {to:?}")]
    InvalidTransition {
        /// Current status.
        from: WorkflowRunStatus,
        /// Requested status.
        to: WorkflowRunStatus,
    },

    /// The pagination cursor could not be decoded.
    #[error("invalid pagination cursor")]
    InvalidCursor,
}

/// Store result alias.
pub type StoreResult<T> = Result<T, StoreError>;

// ---------------------------------------------------------------------------
// Pagination
// ---------------------------------------------------------------------------

/// One page of a cursored listing.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    /// Rows in page order.
    pub items: Vec<T>,
    /// Cursor for the next page; `None` at the end.
    pub next_cursor: Option<String>,
}

impl<T> Page<T> {
    /// An empty final page.
    pub fn empty() -> Self {
        Self {
            items: Vec::new(),
            next_cursor: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Creation parameter structs
// ---------------------------------------------------------------------------

/// Parameters for [`Store::create_user`].
#[derive(Debug, Clone)]
pub struct NewUser {
    /// Lowercased unique email.
    pub email_lower: String,
    /// Argon2id PHC string.
    pub password_hash: String,
    /// Optional display name.
    pub display_name: Option<String>,
}

/// Parameters for [`Store::create_auth_session`].
#[derive(Debug, Clone)]
pub struct NewAuthSession {
    /// Owning user.
    pub user_id: Uuid,
    /// SHA-256 hex of the refresh blob.
    pub refresh_token_hash: String,
    /// Hard expiry.
    pub expires_at: DateTime<Utc>,
    /// User agent captured at creation.
    pub user_agent: Option<String>,
    /// Client IP captured at creation.
    pub ip: Option<String>,
}

/// Parameters for [`Store::create_organization`].
#[derive(Debug, Clone)]
pub struct NewOrganization {
    /// Unique slug.
    pub slug: String,
    /// Display name.
    pub name: String,
    /// Initial settings document.
    pub settings: Value,
}

/// Parameters for [`Store::create_invitation`].
#[derive(Debug, Clone)]
pub struct NewInvitation {
    /// Target organization.
    pub organization_id: Uuid,
    /// Invitee email, lowercased.
    pub email_lower: String,
    /// Role granted on acceptance.
    pub role_key: RoleKey,
    /// Inviting user.
    pub invited_by_user_id: Uuid,
    /// Acceptance token (`<org>.<uuid>`).
    pub token: String,
    /// Expiry instant.
    pub expires_at: DateTime<Utc>,
}

/// Ciphertext bundle for secret create/rotate.
#[derive(Debug, Clone)]
pub struct SecretCiphertext {
    /// KEK id the DEK is sealed under.
    pub kek_id: String,
    /// Sealed DEK.
    pub dek_ciphertext: Vec<u8>,
    /// DEK nonce.
    pub dek_iv: Vec<u8>,
    /// DEK tag.
    pub dek_tag: Vec<u8>,
    /// Sealed payload.
    pub secret_ciphertext: Vec<u8>,
    /// Payload nonce.
    pub secret_iv: Vec<u8>,
    /// Payload tag.
    pub secret_tag: Vec<u8>,
}

/// Parameters for [`Store::create_secret`].
#[derive(Debug, Clone)]
pub struct NewSecret {
    /// Owning organization.
    pub organization_id: Uuid,
    /// Connector the credential belongs to.
    pub connector_id: String,
    /// Name, unique per `(org, connector)`.
    pub name: String,
    /// Wrapped material.
    pub ciphertext: SecretCiphertext,
    /// Creating user.
    pub created_by: Uuid,
}

/// Parameters for [`Store::create_workflow`].
#[derive(Debug, Clone)]
pub struct NewWorkflow {
    /// Owning organization.
    pub organization_id: Uuid,
    /// Family to extend; `None` starts a new family at revision 1.
    pub family_id: Option<Uuid>,
    /// Revision this draft was taken from.
    pub source_workflow_id: Option<Uuid>,
    /// Display name.
    pub name: String,
    /// DSL document.
    pub dsl: Value,
    /// Editor state.
    pub editor_state: Option<Value>,
    /// Authoring user.
    pub created_by: Uuid,
}

/// Mutable fields of a draft workflow.
#[derive(Debug, Clone, Default)]
pub struct WorkflowDraftUpdate {
    /// New name, when present.
    pub name: Option<String>,
    /// New DSL, when present.
    pub dsl: Option<Value>,
    /// New editor state, when present.
    pub editor_state: Option<Value>,
}

/// Parameters for [`Store::create_run`].
#[derive(Debug, Clone)]
pub struct NewRun {
    /// Owning organization.
    pub organization_id: Uuid,
    /// Workflow revision to execute.
    pub workflow_id: Uuid,
    /// What started the run.
    pub trigger_type: RunTrigger,
    /// Retry budget.
    pub max_attempts: i32,
    /// Trigger input.
    pub input: Value,
}

/// Parameters for [`Store::create_agent`].
#[derive(Debug, Clone)]
pub struct NewAgent {
    /// Owning organization.
    pub organization_id: Uuid,
    /// Display name.
    pub name: String,
    /// Execution engine identifier.
    pub engine_id: String,
    /// Whether this is the org's fallback agent.
    pub is_default: bool,
}

/// Parameters for [`Store::create_binding`].
#[derive(Debug, Clone)]
pub struct NewBinding {
    /// Owning organization.
    pub organization_id: Uuid,
    /// Agent selected when this binding wins.
    pub agent_id: Uuid,
    /// Tie-breaker within a dimension.
    pub priority: i32,
    /// Matching axis.
    pub dimension: BindingDimension,
    /// Dimension-specific match document.
    pub match_spec: Value,
    /// Free-form annotations.
    pub metadata: Option<Value>,
}

/// Parameters for [`Store::create_agent_session`].
#[derive(Debug, Clone)]
pub struct NewAgentSession {
    /// Owning organization.
    pub organization_id: Uuid,
    /// Deterministic conversation key.
    pub session_key: String,
    /// Scope used to derive the key.
    pub scope: SessionScope,
    /// Agent chosen by binding resolution.
    pub routed_agent_id: Option<Uuid>,
    /// Winning binding.
    pub binding_id: Option<Uuid>,
    /// Execution engine identifier.
    pub engine_id: String,
    /// Attached toolset.
    pub toolset_id: Option<Uuid>,
    /// LLM configuration.
    pub llm: LlmSelection,
    /// Prompt configuration.
    pub prompt: PromptSpec,
    /// Tool allow-list.
    pub tools_allow: Vec<String>,
    /// Resource limits.
    pub limits: SessionLimits,
    /// Executor placement constraints.
    pub executor_selector: ExecutorSelector,
}

/// Parameters for [`Store::append_session_event`].
#[derive(Debug, Clone)]
pub struct NewSessionEvent {
    /// Event discriminator.
    pub event_type: String,
    /// Severity.
    pub level: EventLevel,
    /// Client dedupe key; `(session, key)` is unique.
    pub idempotency_key: Option<String>,
    /// Payload.
    pub payload: Value,
}

/// Parameters for [`Store::create_toolset`].
#[derive(Debug, Clone)]
pub struct NewToolset {
    /// Owning organization.
    pub organization_id: Uuid,
    /// Display name.
    pub name: String,
    /// Definition document.
    pub draft: ToolsetDraft,
    /// Initial visibility (never `Public` at creation).
    pub visibility: ToolsetVisibility,
    /// Creating user.
    pub created_by: Uuid,
}

/// Parameters for [`Store::create_builder_session`].
#[derive(Debug, Clone)]
pub struct NewBuilderSession {
    /// Owning organization.
    pub organization_id: Uuid,
    /// Creating user.
    pub created_by: Uuid,
    /// LLM configuration for assistant turns.
    pub llm: LlmSelection,
    /// Initial intent, when non-empty.
    pub latest_intent: Option<String>,
}

/// Mutable fields of a builder session.
#[derive(Debug, Clone, Default)]
pub struct BuilderSessionUpdate {
    /// New latest intent.
    pub latest_intent: Option<String>,
    /// Replacement selected-component set.
    pub selected_component_keys: Option<Vec<String>>,
    /// Status change.
    pub status: Option<ToolsetBuilderStatus>,
    /// Final draft, set at finalize.
    pub final_draft: Option<ToolsetDraft>,
}

/// One credit delta to apply atomically.
#[derive(Debug, Clone)]
pub struct CreditDelta {
    /// Signed credit amount.
    pub delta_credits: i64,
    /// Why.
    pub reason: CreditReason,
    /// Payment-processor event id for at-most-once application.
    pub stripe_event_id: Option<String>,
    /// Consuming run, for debits.
    pub workflow_run_id: Option<Uuid>,
    /// Acting user, when user-initiated.
    pub created_by: Option<Uuid>,
    /// Annotations.
    pub metadata: Value,
}

/// Outcome of [`Store::apply_credit`].
#[derive(Debug, Clone, PartialEq)]
pub enum CreditApplication {
    /// The delta was applied; the new ledger row.
    Applied(CreditLedgerEntry),
    /// The event id was already applied; the original row, untouched.
    Duplicate(CreditLedgerEntry),
}

// ---------------------------------------------------------------------------
// Store trait
// ---------------------------------------------------------------------------

/// The persistence contract.
///
/// Implementations must serialize event appends per session (seq is
/// contiguous from 0) and apply credit deltas atomically with their balance
/// update.
#[async_trait]
pub trait Store: Send + Sync {
    // -- Users and auth sessions (pre-auth surface) --

    /// Create a user; `email_lower` is unique.
    async fn create_user(&self, new: NewUser) -> StoreResult<User>;
    /// Look up a user by lowercased email.
    async fn user_by_email(&self, email_lower: &str) -> StoreResult<Option<User>>;
    /// Look up a user by id.
    async fn user_by_id(&self, id: Uuid) -> StoreResult<Option<User>>;
    /// Create an auth session.
    async fn create_auth_session(&self, new: NewAuthSession) -> StoreResult<AuthSession>;
    /// Load an auth session by id.
    async fn auth_session(&self, id: Uuid) -> StoreResult<Option<AuthSession>>;
    /// Replace the refresh verifier and expiry (rotation).
    async fn rotate_auth_session(
        &self,
        id: Uuid,
        refresh_token_hash: String,
        expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> StoreResult<AuthSession>;
    /// Update `last_used_at`.
    async fn touch_auth_session(&self, id: Uuid, now: DateTime<Utc>) -> StoreResult<()>;
    /// Revoke one session; idempotent.
    async fn revoke_auth_session(&self, id: Uuid, now: DateTime<Utc>) -> StoreResult<()>;
    /// Revoke every active session of a user; returns how many were revoked.
    async fn revoke_all_auth_sessions(
        &self,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> StoreResult<u64>;

    // -- Organizations and memberships --

    /// Create an organization with the actor as owner.
    async fn create_organization(
        &self,
        ctx: &TenantContext,
        new: NewOrganization,
    ) -> StoreResult<(Organization, Membership)>;
    /// Load an organization inside the tenant context.
    async fn organization(&self, ctx: &TenantContext, id: Uuid) -> StoreResult<Organization>;
    /// Organizations the actor is a member of.
    async fn organizations_for_user(&self, ctx: &TenantContext) -> StoreResult<Vec<Organization>>;
    /// Replace the settings document.
    async fn update_org_settings(
        &self,
        ctx: &TenantContext,
        organization_id: Uuid,
        settings: Value,
    ) -> StoreResult<Organization>;
    /// Load one membership. Deliberately user-scoped: this is the lookup the
    /// org-context resolver itself runs, before any org context exists.
    async fn membership(
        &self,
        organization_id: Uuid,
        user_id: Uuid,
    ) -> StoreResult<Option<Membership>>;
    /// Create a membership; `(org, user)` is unique.
    async fn create_membership(
        &self,
        organization_id: Uuid,
        user_id: Uuid,
        role_key: RoleKey,
    ) -> StoreResult<Membership>;
    /// Change a member's role.
    async fn update_membership_role(
        &self,
        ctx: &TenantContext,
        organization_id: Uuid,
        user_id: Uuid,
        role_key: RoleKey,
    ) -> StoreResult<Membership>;
    /// All memberships of an organization.
    async fn memberships_for_org(
        &self,
        ctx: &TenantContext,
        organization_id: Uuid,
    ) -> StoreResult<Vec<Membership>>;

    // -- Invitations --

    /// Create an invitation.
    async fn create_invitation(
        &self,
        ctx: &TenantContext,
        new: NewInvitation,
    ) -> StoreResult<Invitation>;
    /// Find an invitation by its opaque token (pre-membership lookup).
    async fn invitation_by_token(&self, token: &str) -> StoreResult<Option<Invitation>>;
    /// Set an invitation's status.
    async fn update_invitation_status(
        &self,
        id: Uuid,
        status: InvitationStatus,
    ) -> StoreResult<Invitation>;

    // -- Connector secrets --

    /// Persist a wrapped secret; `(org, connector, name)` is unique.
    async fn create_secret(
        &self,
        ctx: &TenantContext,
        new: NewSecret,
    ) -> StoreResult<ConnectorSecretRecord>;
    /// Load a secret by id.
    async fn secret(
        &self,
        ctx: &TenantContext,
        organization_id: Uuid,
        id: Uuid,
    ) -> StoreResult<Option<ConnectorSecretRecord>>;
    /// Load a secret by `(connector, name)`.
    async fn secret_by_name(
        &self,
        ctx: &TenantContext,
        organization_id: Uuid,
        connector_id: &str,
        name: &str,
    ) -> StoreResult<Option<ConnectorSecretRecord>>;
    /// List an organization's secrets (wrapped form; no plaintext).
    async fn list_secrets(
        &self,
        ctx: &TenantContext,
        organization_id: Uuid,
    ) -> StoreResult<Vec<ConnectorSecretRecord>>;
    /// Replace all ciphertext fields (rotation). Identity fields are
    /// invariant.
    async fn rotate_secret(
        &self,
        ctx: &TenantContext,
        organization_id: Uuid,
        id: Uuid,
        ciphertext: SecretCiphertext,
        updated_by: Uuid,
        now: DateTime<Utc>,
    ) -> StoreResult<ConnectorSecretRecord>;
    /// Delete a secret.
    async fn delete_secret(
        &self,
        ctx: &TenantContext,
        organization_id: Uuid,
        id: Uuid,
    ) -> StoreResult<()>;

    // -- Workflows --

    /// Create a workflow draft; assigns the next revision in its family.
    async fn create_workflow(
        &self,
        ctx: &TenantContext,
        new: NewWorkflow,
    ) -> StoreResult<Workflow>;
    /// Load a workflow by id.
    async fn workflow(
        &self,
        ctx: &TenantContext,
        organization_id: Uuid,
        id: Uuid,
    ) -> StoreResult<Option<Workflow>>;
    /// List workflows, newest first.
    async fn list_workflows(
        &self,
        ctx: &TenantContext,
        organization_id: Uuid,
        cursor: Option<String>,
        limit: usize,
    ) -> StoreResult<Page<Workflow>>;
    /// All revisions of a family, ascending.
    async fn list_workflow_revisions(
        &self,
        ctx: &TenantContext,
        organization_id: Uuid,
        family_id: Uuid,
    ) -> StoreResult<Vec<Workflow>>;
    /// Update a draft. Published workflows are immutable (conflict).
    async fn update_workflow_draft(
        &self,
        ctx: &TenantContext,
        organization_id: Uuid,
        id: Uuid,
        update: WorkflowDraftUpdate,
        now: DateTime<Utc>,
    ) -> StoreResult<Workflow>;
    /// Publish a draft. Publishing a published workflow is a conflict.
    async fn publish_workflow(
        &self,
        ctx: &TenantContext,
        organization_id: Uuid,
        id: Uuid,
        now: DateTime<Utc>,
    ) -> StoreResult<Workflow>;

    // -- Workflow runs --

    /// Create a queued run and its `run_created` event.
    async fn create_run(&self, ctx: &TenantContext, new: NewRun) -> StoreResult<WorkflowRun>;
    /// Load a run by id.
    async fn run(
        &self,
        ctx: &TenantContext,
        organization_id: Uuid,
        id: Uuid,
    ) -> StoreResult<Option<WorkflowRun>>;
    /// List runs, newest first, optionally filtered by workflow.
    async fn list_runs(
        &self,
        ctx: &TenantContext,
        organization_id: Uuid,
        workflow_id: Option<Uuid>,
        cursor: Option<String>,
        limit: usize,
    ) -> StoreResult<Page<WorkflowRun>>;
    /// Compensating delete: only while `queued` with zero attempts.
    async fn delete_unstarted_run(
        &self,
        ctx: &TenantContext,
        organization_id: Uuid,
        id: Uuid,
    ) -> StoreResult<()>;
    /// Apply a status transition; invalid transitions are rejected.
    async fn update_run_status(
        &self,
        ctx: &TenantContext,
        organization_id: Uuid,
        id: Uuid,
        status: WorkflowRunStatus,
        output: Option<Value>,
        error: Option<String>,
        now: DateTime<Utc>,
    ) -> StoreResult<WorkflowRun>;
    /// A run's event log, ascending by seq.
    async fn list_run_events(
        &self,
        ctx: &TenantContext,
        organization_id: Uuid,
        run_id: Uuid,
        cursor: Option<String>,
        limit: usize,
    ) -> StoreResult<Page<WorkflowRunEvent>>;

    // -- Agents and bindings --

    /// Register an agent.
    async fn create_agent(&self, ctx: &TenantContext, new: NewAgent) -> StoreResult<AgentRecord>;
    /// Load an agent by id.
    async fn agent(
        &self,
        ctx: &TenantContext,
        organization_id: Uuid,
        id: Uuid,
    ) -> StoreResult<Option<AgentRecord>>;
    /// All agents of an organization.
    async fn list_agents(
        &self,
        ctx: &TenantContext,
        organization_id: Uuid,
    ) -> StoreResult<Vec<AgentRecord>>;
    /// Create a routing binding.
    async fn create_binding(
        &self,
        ctx: &TenantContext,
        new: NewBinding,
    ) -> StoreResult<AgentBinding>;
    /// All bindings of an organization.
    async fn list_bindings(
        &self,
        ctx: &TenantContext,
        organization_id: Uuid,
    ) -> StoreResult<Vec<AgentBinding>>;
    /// Delete a binding.
    async fn delete_binding(
        &self,
        ctx: &TenantContext,
        organization_id: Uuid,
        id: Uuid,
    ) -> StoreResult<()>;

    // -- Agent sessions and events --

    /// Create an agent session.
    async fn create_agent_session(
        &self,
        ctx: &TenantContext,
        new: NewAgentSession,
    ) -> StoreResult<AgentSession>;
    /// Load a session by id.
    async fn agent_session(
        &self,
        ctx: &TenantContext,
        organization_id: Uuid,
        id: Uuid,
    ) -> StoreResult<Option<AgentSession>>;
    /// Load an active session by its deterministic key.
    async fn agent_session_by_key(
        &self,
        ctx: &TenantContext,
        organization_id: Uuid,
        session_key: &str,
    ) -> StoreResult<Option<AgentSession>>;
    /// List sessions, newest first.
    async fn list_agent_sessions(
        &self,
        ctx: &TenantContext,
        organization_id: Uuid,
        cursor: Option<String>,
        limit: usize,
    ) -> StoreResult<Page<AgentSession>>;
    /// Clear pinned agent and pinned executor (session reset).
    async fn clear_session_pin(
        &self,
        ctx: &TenantContext,
        organization_id: Uuid,
        id: Uuid,
        now: DateTime<Utc>,
    ) -> StoreResult<AgentSession>;
    /// Append an event. With an idempotency key, a replay returns the
    /// original row and `false`; appends are serialized per session.
    async fn append_session_event(
        &self,
        ctx: &TenantContext,
        organization_id: Uuid,
        session_id: Uuid,
        new: NewSessionEvent,
        now: DateTime<Utc>,
    ) -> StoreResult<(AgentSessionEvent, bool)>;
    /// A session's event log, ascending by seq.
    async fn list_session_events(
        &self,
        ctx: &TenantContext,
        organization_id: Uuid,
        session_id: Uuid,
        cursor: Option<String>,
        limit: usize,
    ) -> StoreResult<Page<AgentSessionEvent>>;

    // -- Toolsets --

    /// Create a toolset.
    async fn create_toolset(&self, ctx: &TenantContext, new: NewToolset) -> StoreResult<Toolset>;
    /// Load a toolset by id.
    async fn toolset(
        &self,
        ctx: &TenantContext,
        organization_id: Uuid,
        id: Uuid,
    ) -> StoreResult<Option<Toolset>>;
    /// All toolsets of an organization.
    async fn list_toolsets(
        &self,
        ctx: &TenantContext,
        organization_id: Uuid,
    ) -> StoreResult<Vec<Toolset>>;
    /// Update name/draft of a toolset.
    async fn update_toolset(
        &self,
        ctx: &TenantContext,
        organization_id: Uuid,
        id: Uuid,
        name: Option<String>,
        draft: Option<ToolsetDraft>,
        now: DateTime<Utc>,
    ) -> StoreResult<Toolset>;
    /// Make a toolset public under `slug` (globally unique).
    async fn publish_toolset(
        &self,
        ctx: &TenantContext,
        organization_id: Uuid,
        id: Uuid,
        slug: String,
        now: DateTime<Utc>,
    ) -> StoreResult<Toolset>;
    /// Withdraw a toolset from the gallery, restoring `visibility`.
    async fn unpublish_toolset(
        &self,
        ctx: &TenantContext,
        organization_id: Uuid,
        id: Uuid,
        visibility: ToolsetVisibility,
        now: DateTime<Utc>,
    ) -> StoreResult<Toolset>;
    /// Gallery lookup by slug (anonymous).
    async fn toolset_by_public_slug(&self, slug: &str) -> StoreResult<Option<Toolset>>;
    /// Gallery listing, newest first (anonymous).
    async fn list_public_toolsets(
        &self,
        cursor: Option<String>,
        limit: usize,
    ) -> StoreResult<Page<Toolset>>;

    // -- Toolset-builder sessions --

    /// Create a builder session.
    async fn create_builder_session(
        &self,
        ctx: &TenantContext,
        new: NewBuilderSession,
    ) -> StoreResult<ToolsetBuilderSession>;
    /// Load a builder session.
    async fn builder_session(
        &self,
        ctx: &TenantContext,
        organization_id: Uuid,
        id: Uuid,
    ) -> StoreResult<Option<ToolsetBuilderSession>>;
    /// Apply a builder-session update.
    async fn update_builder_session(
        &self,
        ctx: &TenantContext,
        organization_id: Uuid,
        id: Uuid,
        update: BuilderSessionUpdate,
        now: DateTime<Utc>,
    ) -> StoreResult<ToolsetBuilderSession>;
    /// Append a transcript turn.
    async fn append_builder_turn(
        &self,
        ctx: &TenantContext,
        organization_id: Uuid,
        session_id: Uuid,
        role: TurnRole,
        message_text: String,
        now: DateTime<Utc>,
    ) -> StoreResult<ToolsetBuilderTurn>;
    /// The last `limit` turns of a session, oldest first.
    async fn recent_builder_turns(
        &self,
        ctx: &TenantContext,
        organization_id: Uuid,
        session_id: Uuid,
        limit: usize,
    ) -> StoreResult<Vec<ToolsetBuilderTurn>>;

    // -- Credits --

    /// Current balance (zero row if the org never transacted).
    async fn credits(
        &self,
        ctx: &TenantContext,
        organization_id: Uuid,
    ) -> StoreResult<OrganizationCredits>;
    /// Apply one delta atomically with its balance update. A duplicate
    /// `stripe_event_id` returns the original row untouched.
    async fn apply_credit(
        &self,
        ctx: &TenantContext,
        organization_id: Uuid,
        delta: CreditDelta,
        now: DateTime<Utc>,
    ) -> StoreResult<CreditApplication>;
    /// Ledger, newest first.
    async fn list_ledger(
        &self,
        ctx: &TenantContext,
        organization_id: Uuid,
        cursor: Option<String>,
        limit: usize,
    ) -> StoreResult<Page<CreditLedgerEntry>>;

    // -- Executor pairing --

    /// Mint a pairing-token record.
    async fn create_pairing_token(
        &self,
        ctx: &TenantContext,
        organization_id: Uuid,
        token_hash: String,
        expires_at: DateTime<Utc>,
    ) -> StoreResult<PairingTokenRecord>;
    /// Load a pairing token (pre-auth: the worker is exchanging it).
    async fn pairing_token(&self, id: Uuid) -> StoreResult<Option<PairingTokenRecord>>;
    /// One-shot consume; spent or expired tokens are a precondition failure.
    async fn consume_pairing_token(
        &self,
        id: Uuid,
        now: DateTime<Utc>,
    ) -> StoreResult<PairingTokenRecord>;
    /// Issue a long-lived executor token (pairing exchange or internal).
    async fn create_executor_token(
        &self,
        organization_id: Uuid,
        name: String,
        token_hash: String,
    ) -> StoreResult<ExecutorTokenRecord>;
    /// Load an executor token.
    async fn executor_token(
        &self,
        ctx: &TenantContext,
        organization_id: Uuid,
        id: Uuid,
    ) -> StoreResult<Option<ExecutorTokenRecord>>;
    /// Revoke an executor token; idempotent.
    async fn revoke_executor_token(
        &self,
        organization_id: Uuid,
        id: Uuid,
        now: DateTime<Utc>,
    ) -> StoreResult<ExecutorTokenRecord>;
    /// All executor tokens of an organization.
    async fn list_executor_tokens(
        &self,
        ctx: &TenantContext,
        organization_id: Uuid,
    ) -> StoreResult<Vec<ExecutorTokenRecord>>;
}
