// SPDX-License-Identifier: MIT OR Apache-2.0
//! In-memory [`Store`] implementation.
//!
//! One `RwLock` over all tables: the write lock is the serialization point
//! the contract requires for per-session event appends and for the
//! ledger/balance pair. Tenant enforcement mirrors what row-level security
//! does in a durable implementation — every org-scoped read and write is
//! filtered by the context's organization before the row is touched.

use crate::{
    BuilderSessionUpdate, CreditApplication, CreditDelta, NewAgent, NewAgentSession,
    NewAuthSession, NewBinding, NewBuilderSession, NewInvitation, NewOrganization, NewRun,
    NewSecret, NewSessionEvent, NewToolset, NewUser, NewWorkflow, Page, SecretCiphertext, Store,
    StoreError, StoreResult, TenantContext, WorkflowDraftUpdate,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;
use vespid_core::{
    AgentBinding, AgentRecord, AgentSession, AgentSessionEvent, AgentSessionStatus, AuthSession,
    ConnectorSecretRecord, CreditLedgerEntry, Cursor, ExecutorTokenRecord, Invitation,
    InvitationStatus, Membership, Organization, OrganizationCredits, PairingTokenRecord, RoleKey,
    Toolset, ToolsetBuilderSession, ToolsetBuilderStatus, ToolsetBuilderTurn, ToolsetDraft,
    ToolsetVisibility, TurnRole, User, Workflow, WorkflowRun, WorkflowRunEvent, WorkflowRunStatus,
    WorkflowStatus,
};

// ---------------------------------------------------------------------------
// Tables
// ---------------------------------------------------------------------------

#[derive(Default)]
struct Tables {
    users: HashMap<Uuid, User>,
    auth_sessions: HashMap<Uuid, AuthSession>,
    organizations: HashMap<Uuid, Organization>,
    memberships: Vec<Membership>,
    invitations: HashMap<Uuid, Invitation>,
    secrets: HashMap<Uuid, ConnectorSecretRecord>,
    workflows: HashMap<Uuid, Workflow>,
    runs: HashMap<Uuid, WorkflowRun>,
    run_events: Vec<WorkflowRunEvent>,
    agents: HashMap<Uuid, AgentRecord>,
    bindings: HashMap<Uuid, AgentBinding>,
    agent_sessions: HashMap<Uuid, AgentSession>,
    session_events: Vec<AgentSessionEvent>,
    toolsets: HashMap<Uuid, Toolset>,
    builder_sessions: HashMap<Uuid, ToolsetBuilderSession>,
    builder_turns: Vec<ToolsetBuilderTurn>,
    credits: HashMap<Uuid, OrganizationCredits>,
    ledger: Vec<CreditLedgerEntry>,
    pairing_tokens: HashMap<Uuid, PairingTokenRecord>,
    executor_tokens: HashMap<Uuid, ExecutorTokenRecord>,
}

/// The reference in-memory store.
#[derive(Default)]
pub struct InMemoryStore {
    tables: RwLock<Tables>,
}

impl InMemoryStore {
    /// An empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn check_org(ctx: &TenantContext, organization_id: Uuid) -> StoreResult<()> {
    match ctx.organization_id {
        Some(scoped) if scoped == organization_id => Ok(()),
        _ => Err(StoreError::TenantViolation),
    }
}

fn not_found(entity: &'static str) -> StoreError {
    StoreError::NotFound { entity }
}

/// Paginate rows newest-first by `(created_at, id)`.
fn paginate_desc<T: Clone>(
    mut rows: Vec<T>,
    cursor: Option<String>,
    limit: usize,
    key: impl Fn(&T) -> (DateTime<Utc>, Uuid),
) -> StoreResult<Page<T>> {
    rows.sort_by(|a, b| key(b).cmp(&key(a)));
    if let Some(raw) = cursor {
        match Cursor::decode(&raw) {
            Ok(Cursor::CreatedAt { created_at, id }) => {
                rows.retain(|row| key(row) < (created_at, id));
            }
            _ => return Err(StoreError::InvalidCursor),
        }
    }
    let next_cursor = if rows.len() > limit {
        rows.truncate(limit);
        rows.last().map(|row| {
            let (created_at, id) = key(row);
            Cursor::CreatedAt { created_at, id }.encode()
        })
    } else {
        None
    };
    Ok(Page { items: rows, next_cursor })
}

/// Paginate rows ascending by `seq`.
fn paginate_seq<T: Clone>(
    mut rows: Vec<T>,
    cursor: Option<String>,
    limit: usize,
    seq_of: impl Fn(&T) -> i64,
) -> StoreResult<Page<T>> {
    rows.sort_by_key(&seq_of);
    if let Some(raw) = cursor {
        match Cursor::decode(&raw) {
            Ok(Cursor::Seq { seq }) => rows.retain(|row| seq_of(row) > seq),
            _ => return Err(StoreError::InvalidCursor),
        }
    }
    let next_cursor = if rows.len() > limit {
        rows.truncate(limit);
        rows.last()
            .map(|row| Cursor::Seq { seq: seq_of(row) }.encode())
    } else {
        None
    };
    Ok(Page { items: rows, next_cursor })
}

// ---------------------------------------------------------------------------
// Store impl
// ---------------------------------------------------------------------------

#[async_trait]
impl Store for InMemoryStore {
    // -- Users and auth sessions --

    async fn create_user(&self, new: NewUser) -> StoreResult<User> {
        let mut tables = self.tables.write().await;
        if tables
            .users
            .values()
            .any(|u| u.email_lower == new.email_lower)
        {
            return Err(StoreError::Conflict {
                entity: "user",
                detail: "email already registered".into(),
            });
        }
        let user = User {
            id: Uuid::new_v4(),
            email_lower: new.email_lower,
            password_hash: new.password_hash,
            display_name: new.display_name,
            created_at: Utc::now(),
        };
        tables.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn user_by_email(&self, email_lower: &str) -> StoreResult<Option<User>> {
        let tables = self.tables.read().await;
        Ok(tables
            .users
            .values()
            .find(|u| u.email_lower == email_lower)
            .cloned())
    }

    async fn user_by_id(&self, id: Uuid) -> StoreResult<Option<User>> {
        Ok(self.tables.read().await.users.get(&id).cloned())
    }

    async fn create_auth_session(&self, new: NewAuthSession) -> StoreResult<AuthSession> {
        let mut tables = self.tables.write().await;
        let now = Utc::now();
        let session = AuthSession {
            id: Uuid::new_v4(),
            user_id: new.user_id,
            refresh_token_hash: new.refresh_token_hash,
            expires_at: new.expires_at,
            revoked_at: None,
            user_agent: new.user_agent,
            ip: new.ip,
            last_used_at: now,
        };
        tables.auth_sessions.insert(session.id, session.clone());
        Ok(session)
    }

    async fn auth_session(&self, id: Uuid) -> StoreResult<Option<AuthSession>> {
        Ok(self.tables.read().await.auth_sessions.get(&id).cloned())
    }

    async fn rotate_auth_session(
        &self,
        id: Uuid,
        refresh_token_hash: String,
        expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> StoreResult<AuthSession> {
        let mut tables = self.tables.write().await;
        let session = tables
            .auth_sessions
            .get_mut(&id)
            .ok_or_else(|| not_found("auth_session"))?;
        session.refresh_token_hash = refresh_token_hash;
        session.expires_at = expires_at;
        session.last_used_at = now;
        Ok(session.clone())
    }

    async fn touch_auth_session(&self, id: Uuid, now: DateTime<Utc>) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        let session = tables
            .auth_sessions
            .get_mut(&id)
            .ok_or_else(|| not_found("auth_session"))?;
        session.last_used_at = now;
        Ok(())
    }

    async fn revoke_auth_session(&self, id: Uuid, now: DateTime<Utc>) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        let session = tables
            .auth_sessions
            .get_mut(&id)
            .ok_or_else(|| not_found("auth_session"))?;
        if session.revoked_at.is_none() {
            session.revoked_at = Some(now);
        }
        Ok(())
    }

    async fn revoke_all_auth_sessions(
        &self,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> StoreResult<u64> {
        let mut tables = self.tables.write().await;
        let mut revoked = 0;
        for session in tables.auth_sessions.values_mut() {
            if session.user_id == user_id && session.revoked_at.is_none() {
                session.revoked_at = Some(now);
                revoked += 1;
            }
        }
        Ok(revoked)
    }

    // -- Organizations and memberships --

    async fn create_organization(
        &self,
        ctx: &TenantContext,
        new: NewOrganization,
    ) -> StoreResult<(Organization, Membership)> {
        let mut tables = self.tables.write().await;
        if tables.organizations.values().any(|o| o.slug == new.slug) {
            return Err(StoreError::Conflict {
                entity: "organization",
                detail: "slug already taken".into(),
            });
        }
        let now = Utc::now();
        let org = Organization {
            id: Uuid::new_v4(),
            slug: new.slug,
            name: new.name,
            settings: new.settings,
            created_at: now,
        };
        let membership = Membership {
            organization_id: org.id,
            user_id: ctx.actor_user_id,
            role_key: RoleKey::Owner,
            created_at: now,
        };
        tables.organizations.insert(org.id, org.clone());
        tables.memberships.push(membership.clone());
        Ok((org, membership))
    }

    async fn organization(&self, ctx: &TenantContext, id: Uuid) -> StoreResult<Organization> {
        check_org(ctx, id)?;
        self.tables
            .read()
            .await
            .organizations
            .get(&id)
            .cloned()
            .ok_or_else(|| not_found("organization"))
    }

    async fn organizations_for_user(&self, ctx: &TenantContext) -> StoreResult<Vec<Organization>> {
        let tables = self.tables.read().await;
        let mut orgs: Vec<Organization> = tables
            .memberships
            .iter()
            .filter(|m| m.user_id == ctx.actor_user_id)
            .filter_map(|m| tables.organizations.get(&m.organization_id).cloned())
            .collect();
        orgs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(orgs)
    }

    async fn update_org_settings(
        &self,
        ctx: &TenantContext,
        organization_id: Uuid,
        settings: Value,
    ) -> StoreResult<Organization> {
        check_org(ctx, organization_id)?;
        let mut tables = self.tables.write().await;
        let org = tables
            .organizations
            .get_mut(&organization_id)
            .ok_or_else(|| not_found("organization"))?;
        org.settings = settings;
        Ok(org.clone())
    }

    async fn membership(
        &self,
        organization_id: Uuid,
        user_id: Uuid,
    ) -> StoreResult<Option<Membership>> {
        let tables = self.tables.read().await;
        Ok(tables
            .memberships
            .iter()
            .find(|m| m.organization_id == organization_id && m.user_id == user_id)
            .cloned())
    }

    async fn create_membership(
        &self,
        organization_id: Uuid,
        user_id: Uuid,
        role_key: RoleKey,
    ) -> StoreResult<Membership> {
        let mut tables = self.tables.write().await;
        if !tables.organizations.contains_key(&organization_id) {
            return Err(not_found("organization"));
        }
        if tables
            .memberships
            .iter()
            .any(|m| m.organization_id == organization_id && m.user_id == user_id)
        {
            return Err(StoreError::Conflict {
                entity: "membership",
                detail: "already a member".into(),
            });
        }
        let membership = Membership {
            organization_id,
            user_id,
            role_key,
            created_at: Utc::now(),
        };
        tables.memberships.push(membership.clone());
        Ok(membership)
    }

    async fn update_membership_role(
        &self,
        ctx: &TenantContext,
        organization_id: Uuid,
        user_id: Uuid,
        role_key: RoleKey,
    ) -> StoreResult<Membership> {
        check_org(ctx, organization_id)?;
        let mut tables = self.tables.write().await;
        let membership = tables
            .memberships
            .iter_mut()
            .find(|m| m.organization_id == organization_id && m.user_id == user_id)
            .ok_or_else(|| not_found("membership"))?;
        membership.role_key = role_key;
        Ok(membership.clone())
    }

    async fn memberships_for_org(
        &self,
        ctx: &TenantContext,
        organization_id: Uuid,
    ) -> StoreResult<Vec<Membership>> {
        check_org(ctx, organization_id)?;
        let tables = self.tables.read().await;
        let mut rows: Vec<Membership> = tables
            .memberships
            .iter()
            .filter(|m| m.organization_id == organization_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(rows)
    }

    // -- Invitations --

    async fn create_invitation(
        &self,
        ctx: &TenantContext,
        new: NewInvitation,
    ) -> StoreResult<Invitation> {
        check_org(ctx, new.organization_id)?;
        let mut tables = self.tables.write().await;
        let invitation = Invitation {
            id: Uuid::new_v4(),
            organization_id: new.organization_id,
            email_lower: new.email_lower,
            role_key: new.role_key,
            invited_by_user_id: new.invited_by_user_id,
            token: new.token,
            status: InvitationStatus::Pending,
            expires_at: new.expires_at,
            created_at: Utc::now(),
        };
        tables.invitations.insert(invitation.id, invitation.clone());
        Ok(invitation)
    }

    async fn invitation_by_token(&self, token: &str) -> StoreResult<Option<Invitation>> {
        let tables = self.tables.read().await;
        Ok(tables
            .invitations
            .values()
            .find(|i| i.token == token)
            .cloned())
    }

    async fn update_invitation_status(
        &self,
        id: Uuid,
        status: InvitationStatus,
    ) -> StoreResult<Invitation> {
        let mut tables = self.tables.write().await;
        let invitation = tables
            .invitations
            .get_mut(&id)
            .ok_or_else(|| not_found("invitation"))?;
        invitation.status = status;
        Ok(invitation.clone())
    }

    // -- Connector secrets --

    async fn create_secret(
        &self,
        ctx: &TenantContext,
        new: NewSecret,
    ) -> StoreResult<ConnectorSecretRecord> {
        check_org(ctx, new.organization_id)?;
        let mut tables = self.tables.write().await;
        if tables.secrets.values().any(|s| {
            s.organization_id == new.organization_id
                && s.connector_id == new.connector_id
                && s.name == new.name
        }) {
            return Err(StoreError::Conflict {
                entity: "connector_secret",
                detail: "name already in use for this connector".into(),
            });
        }
        let now = Utc::now();
        let c = new.ciphertext;
        let record = ConnectorSecretRecord {
            id: Uuid::new_v4(),
            organization_id: new.organization_id,
            connector_id: new.connector_id,
            name: new.name,
            kek_id: c.kek_id,
            dek_ciphertext: c.dek_ciphertext,
            dek_iv: c.dek_iv,
            dek_tag: c.dek_tag,
            secret_ciphertext: c.secret_ciphertext,
            secret_iv: c.secret_iv,
            secret_tag: c.secret_tag,
            created_by: new.created_by,
            updated_by: new.created_by,
            created_at: now,
            updated_at: now,
        };
        tables.secrets.insert(record.id, record.clone());
        Ok(record)
    }

    async fn secret(
        &self,
        ctx: &TenantContext,
        organization_id: Uuid,
        id: Uuid,
    ) -> StoreResult<Option<ConnectorSecretRecord>> {
        check_org(ctx, organization_id)?;
        let tables = self.tables.read().await;
        Ok(tables
            .secrets
            .get(&id)
            .filter(|s| s.organization_id == organization_id)
            .cloned())
    }

    async fn secret_by_name(
        &self,
        ctx: &TenantContext,
        organization_id: Uuid,
        connector_id: &str,
        name: &str,
    ) -> StoreResult<Option<ConnectorSecretRecord>> {
        check_org(ctx, organization_id)?;
        let tables = self.tables.read().await;
        Ok(tables
            .secrets
            .values()
            .find(|s| {
                s.organization_id == organization_id
                    && s.connector_id == connector_id
                    && s.name == name
            })
            .cloned())
    }

    async fn list_secrets(
        &self,
        ctx: &TenantContext,
        organization_id: Uuid,
    ) -> StoreResult<Vec<ConnectorSecretRecord>> {
        check_org(ctx, organization_id)?;
        let tables = self.tables.read().await;
        let mut rows: Vec<ConnectorSecretRecord> = tables
            .secrets
            .values()
            .filter(|s| s.organization_id == organization_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| (&a.connector_id, &a.name).cmp(&(&b.connector_id, &b.name)));
        Ok(rows)
    }

    async fn rotate_secret(
        &self,
        ctx: &TenantContext,
        organization_id: Uuid,
        id: Uuid,
        ciphertext: SecretCiphertext,
        updated_by: Uuid,
        now: DateTime<Utc>,
    ) -> StoreResult<ConnectorSecretRecord> {
        check_org(ctx, organization_id)?;
        let mut tables = self.tables.write().await;
        let record = tables
            .secrets
            .get_mut(&id)
            .filter(|s| s.organization_id == organization_id)
            .ok_or_else(|| not_found("connector_secret"))?;
        record.kek_id = ciphertext.kek_id;
        record.dek_ciphertext = ciphertext.dek_ciphertext;
        record.dek_iv = ciphertext.dek_iv;
        record.dek_tag = ciphertext.dek_tag;
        record.secret_ciphertext = ciphertext.secret_ciphertext;
        record.secret_iv = ciphertext.secret_iv;
        record.secret_tag = ciphertext.secret_tag;
        record.updated_by = updated_by;
        record.updated_at = now;
        Ok(record.clone())
    }

    async fn delete_secret(
        &self,
        ctx: &TenantContext,
        organization_id: Uuid,
        id: Uuid,
    ) -> StoreResult<()> {
        check_org(ctx, organization_id)?;
        let mut tables = self.tables.write().await;
        let belongs = tables
            .secrets
            .get(&id)
            .is_some_and(|s| s.organization_id == organization_id);
        if !belongs {
            return Err(not_found("connector_secret"));
        }
        tables.secrets.remove(&id);
        Ok(())
    }

    // -- Workflows --

    async fn create_workflow(
        &self,
        ctx: &TenantContext,
        new: NewWorkflow,
    ) -> StoreResult<Workflow> {
        check_org(ctx, new.organization_id)?;
        let mut tables = self.tables.write().await;
        let (family_id, revision) = match new.family_id {
            None => (Uuid::new_v4(), 1),
            Some(family_id) => {
                let latest = tables
                    .workflows
                    .values()
                    .filter(|w| {
                        w.organization_id == new.organization_id && w.family_id == family_id
                    })
                    .map(|w| w.revision)
                    .max()
                    .ok_or_else(|| not_found("workflow_family"))?;
                (family_id, latest + 1)
            }
        };
        let now = Utc::now();
        let workflow = Workflow {
            id: Uuid::new_v4(),
            organization_id: new.organization_id,
            family_id,
            revision,
            source_workflow_id: new.source_workflow_id,
            name: new.name,
            status: WorkflowStatus::Draft,
            version: 1,
            dsl: new.dsl,
            editor_state: new.editor_state,
            created_by: new.created_by,
            published_at: None,
            created_at: now,
            updated_at: now,
        };
        tables.workflows.insert(workflow.id, workflow.clone());
        Ok(workflow)
    }

    async fn workflow(
        &self,
        ctx: &TenantContext,
        organization_id: Uuid,
        id: Uuid,
    ) -> StoreResult<Option<Workflow>> {
        check_org(ctx, organization_id)?;
        let tables = self.tables.read().await;
        Ok(tables
            .workflows
            .get(&id)
            .filter(|w| w.organization_id == organization_id)
            .cloned())
    }

    async fn list_workflows(
        &self,
        ctx: &TenantContext,
        organization_id: Uuid,
        cursor: Option<String>,
        limit: usize,
    ) -> StoreResult<Page<Workflow>> {
        check_org(ctx, organization_id)?;
        let tables = self.tables.read().await;
        let rows: Vec<Workflow> = tables
            .workflows
            .values()
            .filter(|w| w.organization_id == organization_id)
            .cloned()
            .collect();
        paginate_desc(rows, cursor, limit, |w| (w.created_at, w.id))
    }

    async fn list_workflow_revisions(
        &self,
        ctx: &TenantContext,
        organization_id: Uuid,
        family_id: Uuid,
    ) -> StoreResult<Vec<Workflow>> {
        check_org(ctx, organization_id)?;
        let tables = self.tables.read().await;
        let mut rows: Vec<Workflow> = tables
            .workflows
            .values()
            .filter(|w| w.organization_id == organization_id && w.family_id == family_id)
            .cloned()
            .collect();
        rows.sort_by_key(|w| w.revision);
        Ok(rows)
    }

    async fn update_workflow_draft(
        &self,
        ctx: &TenantContext,
        organization_id: Uuid,
        id: Uuid,
        update: WorkflowDraftUpdate,
        now: DateTime<Utc>,
    ) -> StoreResult<Workflow> {
        check_org(ctx, organization_id)?;
        let mut tables = self.tables.write().await;
        let workflow = tables
            .workflows
            .get_mut(&id)
            .filter(|w| w.organization_id == organization_id)
            .ok_or_else(|| not_found("workflow"))?;
        if workflow.status == WorkflowStatus::Published {
            return Err(StoreError::Conflict {
                entity: "workflow",
                detail: "published workflows are immutable".into(),
            });
        }
        if let Some(name) = update.name {
            workflow.name = name;
        }
        if let Some(dsl) = update.dsl {
            workflow.dsl = dsl;
        }
        if let Some(editor_state) = update.editor_state {
            workflow.editor_state = Some(editor_state);
        }
        workflow.version += 1;
        workflow.updated_at = now;
        Ok(workflow.clone())
    }

    async fn publish_workflow(
        &self,
        ctx: &TenantContext,
        organization_id: Uuid,
        id: Uuid,
        now: DateTime<Utc>,
    ) -> StoreResult<Workflow> {
        check_org(ctx, organization_id)?;
        let mut tables = self.tables.write().await;
        let workflow = tables
            .workflows
            .get_mut(&id)
            .filter(|w| w.organization_id == organization_id)
            .ok_or_else(|| not_found("workflow"))?;
        if workflow.status == WorkflowStatus::Published {
            return Err(StoreError::Conflict {
                entity: "workflow",
                detail: "already published".into(),
            });
        }
        workflow.status = WorkflowStatus::Published;
        workflow.published_at = Some(now);
        workflow.updated_at = now;
        Ok(workflow.clone())
    }

    // -- Workflow runs --

    async fn create_run(&self, ctx: &TenantContext, new: NewRun) -> StoreResult<WorkflowRun> {
        check_org(ctx, new.organization_id)?;
        let mut tables = self.tables.write().await;
        if !tables
            .workflows
            .get(&new.workflow_id)
            .is_some_and(|w| w.organization_id == new.organization_id)
        {
            return Err(not_found("workflow"));
        }
        let now = Utc::now();
        let run = WorkflowRun {
            id: Uuid::new_v4(),
            organization_id: new.organization_id,
            workflow_id: new.workflow_id,
            trigger_type: new.trigger_type,
            status: WorkflowRunStatus::Queued,
            attempt_count: 0,
            max_attempts: new.max_attempts,
            input: new.input,
            output: None,
            error: None,
            created_at: now,
            updated_at: now,
        };
        tables.runs.insert(run.id, run.clone());
        tables.run_events.push(WorkflowRunEvent {
            id: Uuid::new_v4(),
            run_id: run.id,
            seq: 0,
            event_type: "run_created".into(),
            payload: serde_json::json!({ "triggerType": run.trigger_type }),
            created_at: now,
        });
        Ok(run)
    }

    async fn run(
        &self,
        ctx: &TenantContext,
        organization_id: Uuid,
        id: Uuid,
    ) -> StoreResult<Option<WorkflowRun>> {
        check_org(ctx, organization_id)?;
        let tables = self.tables.read().await;
        Ok(tables
            .runs
            .get(&id)
            .filter(|r| r.organization_id == organization_id)
            .cloned())
    }

    async fn list_runs(
        &self,
        ctx: &TenantContext,
        organization_id: Uuid,
        workflow_id: Option<Uuid>,
        cursor: Option<String>,
        limit: usize,
    ) -> StoreResult<Page<WorkflowRun>> {
        check_org(ctx, organization_id)?;
        let tables = self.tables.read().await;
        let rows: Vec<WorkflowRun> = tables
            .runs
            .values()
            .filter(|r| r.organization_id == organization_id)
            .filter(|r| workflow_id.is_none_or(|w| r.workflow_id == w))
            .cloned()
            .collect();
        paginate_desc(rows, cursor, limit, |r| (r.created_at, r.id))
    }

    async fn delete_unstarted_run(
        &self,
        ctx: &TenantContext,
        organization_id: Uuid,
        id: Uuid,
    ) -> StoreResult<()> {
        check_org(ctx, organization_id)?;
        let mut tables = self.tables.write().await;
        let run = tables
            .runs
            .get(&id)
            .filter(|r| r.organization_id == organization_id)
            .ok_or_else(|| not_found("workflow_run"))?;
        if run.status != WorkflowRunStatus::Queued || run.attempt_count != 0 {
            return Err(StoreError::Precondition {
                detail: "only unstarted queued runs may be deleted".into(),
            });
        }
        tables.runs.remove(&id);
        tables.run_events.retain(|e| e.run_id != id);
        Ok(())
    }

    async fn update_run_status(
        &self,
        ctx: &TenantContext,
        organization_id: Uuid,
        id: Uuid,
        status: WorkflowRunStatus,
        output: Option<Value>,
        error: Option<String>,
        now: DateTime<Utc>,
    ) -> StoreResult<WorkflowRun> {
        check_org(ctx, organization_id)?;
        let mut tables = self.tables.write().await;
        let run = tables
            .runs
            .get_mut(&id)
            .filter(|r| r.organization_id == organization_id)
            .ok_or_else(|| not_found("workflow_run"))?;
        if !run.status.can_transition_to(status) {
            return Err(StoreError::InvalidTransition {
                from: run.status,
                to: status,
            });
        }
        let from = run.status;
        if status == WorkflowRunStatus::Running {
            run.attempt_count += 1;
        }
        run.status = status;
        run.output = output;
        run.error = error;
        run.updated_at = now;
        let run = run.clone();
        let seq = tables.run_events.iter().filter(|e| e.run_id == id).count() as i64;
        tables.run_events.push(WorkflowRunEvent {
            id: Uuid::new_v4(),
            run_id: id,
            seq,
            event_type: "status_changed".into(),
            payload: serde_json::json!({ "from": from, "to": status }),
            created_at: now,
        });
        Ok(run)
    }

    async fn list_run_events(
        &self,
        ctx: &TenantContext,
        organization_id: Uuid,
        run_id: Uuid,
        cursor: Option<String>,
        limit: usize,
    ) -> StoreResult<Page<WorkflowRunEvent>> {
        check_org(ctx, organization_id)?;
        let tables = self.tables.read().await;
        if !tables
            .runs
            .get(&run_id)
            .is_some_and(|r| r.organization_id == organization_id)
        {
            return Err(not_found("workflow_run"));
        }
        let rows: Vec<WorkflowRunEvent> = tables
            .run_events
            .iter()
            .filter(|e| e.run_id == run_id)
            .cloned()
            .collect();
        paginate_seq(rows, cursor, limit, |e| e.seq)
    }

    // -- Agents and bindings --

    async fn create_agent(&self, ctx: &TenantContext, new: NewAgent) -> StoreResult<AgentRecord> {
        check_org(ctx, new.organization_id)?;
        let mut tables = self.tables.write().await;
        let agent = AgentRecord {
            id: Uuid::new_v4(),
            organization_id: new.organization_id,
            name: new.name,
            engine_id: new.engine_id,
            is_default: new.is_default,
            created_at: Utc::now(),
        };
        tables.agents.insert(agent.id, agent.clone());
        Ok(agent)
    }

    async fn agent(
        &self,
        ctx: &TenantContext,
        organization_id: Uuid,
        id: Uuid,
    ) -> StoreResult<Option<AgentRecord>> {
        check_org(ctx, organization_id)?;
        let tables = self.tables.read().await;
        Ok(tables
            .agents
            .get(&id)
            .filter(|a| a.organization_id == organization_id)
            .cloned())
    }

    async fn list_agents(
        &self,
        ctx: &TenantContext,
        organization_id: Uuid,
    ) -> StoreResult<Vec<AgentRecord>> {
        check_org(ctx, organization_id)?;
        let tables = self.tables.read().await;
        let mut rows: Vec<AgentRecord> = tables
            .agents
            .values()
            .filter(|a| a.organization_id == organization_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(rows)
    }

    async fn create_binding(
        &self,
        ctx: &TenantContext,
        new: NewBinding,
    ) -> StoreResult<AgentBinding> {
        check_org(ctx, new.organization_id)?;
        let mut tables = self.tables.write().await;
        if !tables
            .agents
            .get(&new.agent_id)
            .is_some_and(|a| a.organization_id == new.organization_id)
        {
            return Err(not_found("agent"));
        }
        let binding = AgentBinding {
            id: Uuid::new_v4(),
            organization_id: new.organization_id,
            agent_id: new.agent_id,
            priority: new.priority,
            dimension: new.dimension,
            match_spec: new.match_spec,
            metadata: new.metadata,
            created_at: Utc::now(),
        };
        tables.bindings.insert(binding.id, binding.clone());
        Ok(binding)
    }

    async fn list_bindings(
        &self,
        ctx: &TenantContext,
        organization_id: Uuid,
    ) -> StoreResult<Vec<AgentBinding>> {
        check_org(ctx, organization_id)?;
        let tables = self.tables.read().await;
        let mut rows: Vec<AgentBinding> = tables
            .bindings
            .values()
            .filter(|b| b.organization_id == organization_id)
            .cloned()
            .collect();
        rows.sort_by_key(|b| b.id);
        Ok(rows)
    }

    async fn delete_binding(
        &self,
        ctx: &TenantContext,
        organization_id: Uuid,
        id: Uuid,
    ) -> StoreResult<()> {
        check_org(ctx, organization_id)?;
        let mut tables = self.tables.write().await;
        let belongs = tables
            .bindings
            .get(&id)
            .is_some_and(|b| b.organization_id == organization_id);
        if !belongs {
            return Err(not_found("agent_binding"));
        }
        tables.bindings.remove(&id);
        Ok(())
    }

    // -- Agent sessions and events --

    async fn create_agent_session(
        &self,
        ctx: &TenantContext,
        new: NewAgentSession,
    ) -> StoreResult<AgentSession> {
        check_org(ctx, new.organization_id)?;
        let mut tables = self.tables.write().await;
        let now = Utc::now();
        let session = AgentSession {
            id: Uuid::new_v4(),
            organization_id: new.organization_id,
            session_key: new.session_key,
            scope: new.scope,
            routed_agent_id: new.routed_agent_id,
            binding_id: new.binding_id,
            pinned_agent_id: None,
            engine_id: new.engine_id,
            toolset_id: new.toolset_id,
            llm: new.llm,
            prompt: new.prompt,
            tools_allow: new.tools_allow,
            limits: new.limits,
            executor_selector: new.executor_selector,
            status: AgentSessionStatus::Active,
            created_at: now,
            updated_at: now,
            last_activity_at: now,
        };
        tables.agent_sessions.insert(session.id, session.clone());
        Ok(session)
    }

    async fn agent_session(
        &self,
        ctx: &TenantContext,
        organization_id: Uuid,
        id: Uuid,
    ) -> StoreResult<Option<AgentSession>> {
        check_org(ctx, organization_id)?;
        let tables = self.tables.read().await;
        Ok(tables
            .agent_sessions
            .get(&id)
            .filter(|s| s.organization_id == organization_id)
            .cloned())
    }

    async fn agent_session_by_key(
        &self,
        ctx: &TenantContext,
        organization_id: Uuid,
        session_key: &str,
    ) -> StoreResult<Option<AgentSession>> {
        check_org(ctx, organization_id)?;
        let tables = self.tables.read().await;
        Ok(tables
            .agent_sessions
            .values()
            .find(|s| {
                s.organization_id == organization_id
                    && s.session_key == session_key
                    && s.status == AgentSessionStatus::Active
            })
            .cloned())
    }

    async fn list_agent_sessions(
        &self,
        ctx: &TenantContext,
        organization_id: Uuid,
        cursor: Option<String>,
        limit: usize,
    ) -> StoreResult<Page<AgentSession>> {
        check_org(ctx, organization_id)?;
        let tables = self.tables.read().await;
        let rows: Vec<AgentSession> = tables
            .agent_sessions
            .values()
            .filter(|s| s.organization_id == organization_id)
            .cloned()
            .collect();
        paginate_desc(rows, cursor, limit, |s| (s.created_at, s.id))
    }

    async fn clear_session_pin(
        &self,
        ctx: &TenantContext,
        organization_id: Uuid,
        id: Uuid,
        now: DateTime<Utc>,
    ) -> StoreResult<AgentSession> {
        check_org(ctx, organization_id)?;
        let mut tables = self.tables.write().await;
        let session = tables
            .agent_sessions
            .get_mut(&id)
            .filter(|s| s.organization_id == organization_id)
            .ok_or_else(|| not_found("agent_session"))?;
        session.pinned_agent_id = None;
        session.executor_selector.executor_id = None;
        session.updated_at = now;
        Ok(session.clone())
    }

    async fn append_session_event(
        &self,
        ctx: &TenantContext,
        organization_id: Uuid,
        session_id: Uuid,
        new: NewSessionEvent,
        now: DateTime<Utc>,
    ) -> StoreResult<(AgentSessionEvent, bool)> {
        check_org(ctx, organization_id)?;
        // Write lock held across the dedupe check and the append: this is
        // the per-session serialization point that keeps seq contiguous.
        let mut tables = self.tables.write().await;
        let session = tables
            .agent_sessions
            .get_mut(&session_id)
            .filter(|s| s.organization_id == organization_id)
            .ok_or_else(|| not_found("agent_session"))?;
        session.last_activity_at = now;
        if let Some(key) = &new.idempotency_key {
            if let Some(existing) = tables
                .session_events
                .iter()
                .find(|e| e.session_id == session_id && e.idempotency_key.as_deref() == Some(key))
            {
                return Ok((existing.clone(), false));
            }
        }
        let seq = tables
            .session_events
            .iter()
            .filter(|e| e.session_id == session_id)
            .count() as i64;
        let event = AgentSessionEvent {
            id: Uuid::new_v4(),
            session_id,
            seq,
            event_type: new.event_type,
            level: new.level,
            idempotency_key: new.idempotency_key,
            payload: new.payload,
            created_at: now,
        };
        tables.session_events.push(event.clone());
        Ok((event, true))
    }

    async fn list_session_events(
        &self,
        ctx: &TenantContext,
        organization_id: Uuid,
        session_id: Uuid,
        cursor: Option<String>,
        limit: usize,
    ) -> StoreResult<Page<AgentSessionEvent>> {
        check_org(ctx, organization_id)?;
        let tables = self.tables.read().await;
        if !tables
            .agent_sessions
            .get(&session_id)
            .is_some_and(|s| s.organization_id == organization_id)
        {
            return Err(not_found("agent_session"));
        }
        let rows: Vec<AgentSessionEvent> = tables
            .session_events
            .iter()
            .filter(|e| e.session_id == session_id)
            .cloned()
            .collect();
        paginate_seq(rows, cursor, limit, |e| e.seq)
    }

    // -- Toolsets --

    async fn create_toolset(&self, ctx: &TenantContext, new: NewToolset) -> StoreResult<Toolset> {
        check_org(ctx, new.organization_id)?;
        let mut tables = self.tables.write().await;
        let now = Utc::now();
        let toolset = Toolset {
            id: Uuid::new_v4(),
            organization_id: new.organization_id,
            name: new.name,
            draft: new.draft,
            visibility: new.visibility,
            public_slug: None,
            published_at: None,
            created_by: new.created_by,
            created_at: now,
            updated_at: now,
        };
        tables.toolsets.insert(toolset.id, toolset.clone());
        Ok(toolset)
    }

    async fn toolset(
        &self,
        ctx: &TenantContext,
        organization_id: Uuid,
        id: Uuid,
    ) -> StoreResult<Option<Toolset>> {
        check_org(ctx, organization_id)?;
        let tables = self.tables.read().await;
        Ok(tables
            .toolsets
            .get(&id)
            .filter(|t| t.organization_id == organization_id)
            .cloned())
    }

    async fn list_toolsets(
        &self,
        ctx: &TenantContext,
        organization_id: Uuid,
    ) -> StoreResult<Vec<Toolset>> {
        check_org(ctx, organization_id)?;
        let tables = self.tables.read().await;
        let mut rows: Vec<Toolset> = tables
            .toolsets
            .values()
            .filter(|t| t.organization_id == organization_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(rows)
    }

    async fn update_toolset(
        &self,
        ctx: &TenantContext,
        organization_id: Uuid,
        id: Uuid,
        name: Option<String>,
        draft: Option<ToolsetDraft>,
        now: DateTime<Utc>,
    ) -> StoreResult<Toolset> {
        check_org(ctx, organization_id)?;
        let mut tables = self.tables.write().await;
        let toolset = tables
            .toolsets
            .get_mut(&id)
            .filter(|t| t.organization_id == organization_id)
            .ok_or_else(|| not_found("toolset"))?;
        if let Some(name) = name {
            toolset.name = name;
        }
        if let Some(draft) = draft {
            toolset.draft = draft;
        }
        toolset.updated_at = now;
        Ok(toolset.clone())
    }

    async fn publish_toolset(
        &self,
        ctx: &TenantContext,
        organization_id: Uuid,
        id: Uuid,
        slug: String,
        now: DateTime<Utc>,
    ) -> StoreResult<Toolset> {
        check_org(ctx, organization_id)?;
        let mut tables = self.tables.write().await;
        if tables
            .toolsets
            .values()
            .any(|t| t.id != id && t.public_slug.as_deref() == Some(slug.as_str()))
        {
            return Err(StoreError::Conflict {
                entity: "toolset_slug",
                detail: "public slug already taken".into(),
            });
        }
        let toolset = tables
            .toolsets
            .get_mut(&id)
            .filter(|t| t.organization_id == organization_id)
            .ok_or_else(|| not_found("toolset"))?;
        toolset.visibility = ToolsetVisibility::Public;
        toolset.public_slug = Some(slug);
        toolset.published_at = Some(now);
        toolset.updated_at = now;
        Ok(toolset.clone())
    }

    async fn unpublish_toolset(
        &self,
        ctx: &TenantContext,
        organization_id: Uuid,
        id: Uuid,
        visibility: ToolsetVisibility,
        now: DateTime<Utc>,
    ) -> StoreResult<Toolset> {
        check_org(ctx, organization_id)?;
        let mut tables = self.tables.write().await;
        let toolset = tables
            .toolsets
            .get_mut(&id)
            .filter(|t| t.organization_id == organization_id)
            .ok_or_else(|| not_found("toolset"))?;
        toolset.visibility = visibility;
        toolset.public_slug = None;
        toolset.published_at = None;
        toolset.updated_at = now;
        Ok(toolset.clone())
    }

    async fn toolset_by_public_slug(&self, slug: &str) -> StoreResult<Option<Toolset>> {
        let tables = self.tables.read().await;
        Ok(tables
            .toolsets
            .values()
            .find(|t| {
                t.visibility == ToolsetVisibility::Public
                    && t.public_slug.as_deref() == Some(slug)
            })
            .cloned())
    }

    async fn list_public_toolsets(
        &self,
        cursor: Option<String>,
        limit: usize,
    ) -> StoreResult<Page<Toolset>> {
        let tables = self.tables.read().await;
        let rows: Vec<Toolset> = tables
            .toolsets
            .values()
            .filter(|t| t.visibility == ToolsetVisibility::Public)
            .cloned()
            .collect();
        paginate_desc(rows, cursor, limit, |t| (t.created_at, t.id))
    }

    // -- Toolset-builder sessions --

    async fn create_builder_session(
        &self,
        ctx: &TenantContext,
        new: NewBuilderSession,
    ) -> StoreResult<ToolsetBuilderSession> {
        check_org(ctx, new.organization_id)?;
        let mut tables = self.tables.write().await;
        let now = Utc::now();
        let session = ToolsetBuilderSession {
            id: Uuid::new_v4(),
            organization_id: new.organization_id,
            created_by: new.created_by,
            status: ToolsetBuilderStatus::Active,
            llm: new.llm,
            latest_intent: new.latest_intent,
            selected_component_keys: Vec::new(),
            final_draft: None,
            created_at: now,
            updated_at: now,
        };
        tables.builder_sessions.insert(session.id, session.clone());
        Ok(session)
    }

    async fn builder_session(
        &self,
        ctx: &TenantContext,
        organization_id: Uuid,
        id: Uuid,
    ) -> StoreResult<Option<ToolsetBuilderSession>> {
        check_org(ctx, organization_id)?;
        let tables = self.tables.read().await;
        Ok(tables
            .builder_sessions
            .get(&id)
            .filter(|s| s.organization_id == organization_id)
            .cloned())
    }

    async fn update_builder_session(
        &self,
        ctx: &TenantContext,
        organization_id: Uuid,
        id: Uuid,
        update: BuilderSessionUpdate,
        now: DateTime<Utc>,
    ) -> StoreResult<ToolsetBuilderSession> {
        check_org(ctx, organization_id)?;
        let mut tables = self.tables.write().await;
        let session = tables
            .builder_sessions
            .get_mut(&id)
            .filter(|s| s.organization_id == organization_id)
            .ok_or_else(|| not_found("toolset_builder_session"))?;
        if let Some(latest_intent) = update.latest_intent {
            session.latest_intent = Some(latest_intent);
        }
        if let Some(keys) = update.selected_component_keys {
            session.selected_component_keys = keys;
        }
        if let Some(status) = update.status {
            session.status = status;
        }
        if let Some(final_draft) = update.final_draft {
            session.final_draft = Some(final_draft);
        }
        session.updated_at = now;
        Ok(session.clone())
    }

    async fn append_builder_turn(
        &self,
        ctx: &TenantContext,
        organization_id: Uuid,
        session_id: Uuid,
        role: TurnRole,
        message_text: String,
        now: DateTime<Utc>,
    ) -> StoreResult<ToolsetBuilderTurn> {
        check_org(ctx, organization_id)?;
        let mut tables = self.tables.write().await;
        if !tables
            .builder_sessions
            .get(&session_id)
            .is_some_and(|s| s.organization_id == organization_id)
        {
            return Err(not_found("toolset_builder_session"));
        }
        let turn = ToolsetBuilderTurn {
            id: Uuid::new_v4(),
            session_id,
            role,
            message_text,
            created_at: now,
        };
        tables.builder_turns.push(turn.clone());
        Ok(turn)
    }

    async fn recent_builder_turns(
        &self,
        ctx: &TenantContext,
        organization_id: Uuid,
        session_id: Uuid,
        limit: usize,
    ) -> StoreResult<Vec<ToolsetBuilderTurn>> {
        check_org(ctx, organization_id)?;
        let tables = self.tables.read().await;
        let mut rows: Vec<ToolsetBuilderTurn> = tables
            .builder_turns
            .iter()
            .filter(|t| t.session_id == session_id)
            .cloned()
            .collect();
        // Append order is chronological; keep the most recent `limit`.
        if rows.len() > limit {
            rows.drain(..rows.len() - limit);
        }
        Ok(rows)
    }

    // -- Credits --

    async fn credits(
        &self,
        ctx: &TenantContext,
        organization_id: Uuid,
    ) -> StoreResult<OrganizationCredits> {
        check_org(ctx, organization_id)?;
        let tables = self.tables.read().await;
        Ok(tables
            .credits
            .get(&organization_id)
            .cloned()
            .unwrap_or(OrganizationCredits {
                organization_id,
                balance_credits: 0,
                updated_at: Utc::now(),
            }))
    }

    async fn apply_credit(
        &self,
        ctx: &TenantContext,
        organization_id: Uuid,
        delta: CreditDelta,
        now: DateTime<Utc>,
    ) -> StoreResult<CreditApplication> {
        check_org(ctx, organization_id)?;
        // Write lock held across the dedupe check, the ledger insert, and
        // the balance update: the three are one transaction.
        let mut tables = self.tables.write().await;
        if let Some(event_id) = &delta.stripe_event_id {
            if let Some(existing) = tables
                .ledger
                .iter()
                .find(|e| e.stripe_event_id.as_deref() == Some(event_id.as_str()))
            {
                return Ok(CreditApplication::Duplicate(existing.clone()));
            }
        }
        let balance = tables
            .credits
            .get(&organization_id)
            .map(|c| c.balance_credits)
            .unwrap_or(0);
        let new_balance = balance + delta.delta_credits;
        if new_balance < 0 {
            return Err(StoreError::Precondition {
                detail: "insufficient credits".into(),
            });
        }
        let entry = CreditLedgerEntry {
            id: Uuid::new_v4(),
            organization_id,
            delta_credits: delta.delta_credits,
            reason: delta.reason,
            stripe_event_id: delta.stripe_event_id,
            workflow_run_id: delta.workflow_run_id,
            created_by: delta.created_by,
            metadata: delta.metadata,
            created_at: now,
        };
        tables.ledger.push(entry.clone());
        tables.credits.insert(
            organization_id,
            OrganizationCredits {
                organization_id,
                balance_credits: new_balance,
                updated_at: now,
            },
        );
        Ok(CreditApplication::Applied(entry))
    }

    async fn list_ledger(
        &self,
        ctx: &TenantContext,
        organization_id: Uuid,
        cursor: Option<String>,
        limit: usize,
    ) -> StoreResult<Page<CreditLedgerEntry>> {
        check_org(ctx, organization_id)?;
        let tables = self.tables.read().await;
        let rows: Vec<CreditLedgerEntry> = tables
            .ledger
            .iter()
            .filter(|e| e.organization_id == organization_id)
            .cloned()
            .collect();
        paginate_desc(rows, cursor, limit, |e| (e.created_at, e.id))
    }

    // -- Executor pairing --

    async fn create_pairing_token(
        &self,
        ctx: &TenantContext,
        organization_id: Uuid,
        token_hash: String,
        expires_at: DateTime<Utc>,
    ) -> StoreResult<PairingTokenRecord> {
        check_org(ctx, organization_id)?;
        let mut tables = self.tables.write().await;
        let record = PairingTokenRecord {
            id: Uuid::new_v4(),
            organization_id,
            created_by: ctx.actor_user_id,
            token_hash,
            expires_at,
            consumed_at: None,
            created_at: Utc::now(),
        };
        tables.pairing_tokens.insert(record.id, record.clone());
        Ok(record)
    }

    async fn pairing_token(&self, id: Uuid) -> StoreResult<Option<PairingTokenRecord>> {
        Ok(self.tables.read().await.pairing_tokens.get(&id).cloned())
    }

    async fn consume_pairing_token(
        &self,
        id: Uuid,
        now: DateTime<Utc>,
    ) -> StoreResult<PairingTokenRecord> {
        let mut tables = self.tables.write().await;
        let record = tables
            .pairing_tokens
            .get_mut(&id)
            .ok_or_else(|| not_found("pairing_token"))?;
        if !record.is_exchangeable(now) {
            return Err(StoreError::Precondition {
                detail: "pairing token spent or expired".into(),
            });
        }
        record.consumed_at = Some(now);
        Ok(record.clone())
    }

    async fn create_executor_token(
        &self,
        organization_id: Uuid,
        name: String,
        token_hash: String,
    ) -> StoreResult<ExecutorTokenRecord> {
        let mut tables = self.tables.write().await;
        let record = ExecutorTokenRecord {
            id: Uuid::new_v4(),
            organization_id,
            name,
            token_hash,
            revoked_at: None,
            created_at: Utc::now(),
        };
        tables.executor_tokens.insert(record.id, record.clone());
        Ok(record)
    }

    async fn executor_token(
        &self,
        ctx: &TenantContext,
        organization_id: Uuid,
        id: Uuid,
    ) -> StoreResult<Option<ExecutorTokenRecord>> {
        check_org(ctx, organization_id)?;
        let tables = self.tables.read().await;
        Ok(tables
            .executor_tokens
            .get(&id)
            .filter(|t| t.organization_id == organization_id)
            .cloned())
    }

    async fn revoke_executor_token(
        &self,
        organization_id: Uuid,
        id: Uuid,
        now: DateTime<Utc>,
    ) -> StoreResult<ExecutorTokenRecord> {
        let mut tables = self.tables.write().await;
        let record = tables
            .executor_tokens
            .get_mut(&id)
            .filter(|t| t.organization_id == organization_id)
            .ok_or_else(|| not_found("executor_token"))?;
        if record.revoked_at.is_none() {
            record.revoked_at = Some(now);
        }
        Ok(record.clone())
    }

    async fn list_executor_tokens(
        &self,
        ctx: &TenantContext,
        organization_id: Uuid,
    ) -> StoreResult<Vec<ExecutorTokenRecord>> {
        check_org(ctx, organization_id)?;
        let tables = self.tables.read().await;
        let mut rows: Vec<ExecutorTokenRecord> = tables
            .executor_tokens
            .values()
            .filter(|t| t.organization_id == organization_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(rows)
    }
}
