// SPDX-License-Identifier: MIT OR Apache-2.0
//! Domain model and contract types for the Vespid control plane.
//!
//! Pure data: entities, status enums with their legal transitions, the
//! pagination cursor codec, and the static connector/channel/LLM-provider
//! catalogs. All persistence lives behind the store crate; all behavior
//! lives in the coordinator crates.
//!
//! JSON field names follow the public API contract (camelCase).
#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod agent;
pub mod catalog;
pub mod credits;
pub mod cursor;
pub mod executor;
pub mod identity;
pub mod secret;
pub mod toolset;
pub mod workflow;

pub use agent::{
    AgentBinding, AgentRecord, AgentSession, AgentSessionEvent, AgentSessionStatus,
    BindingDimension, EventLevel, ExecutorSelector, LlmSelection, PromptSpec, SessionLimits,
    SessionScope,
};
pub use catalog::{
    CatalogItem, ChannelDescriptor, ConnectorDescriptor, LlmContext, LlmProviderDescriptor,
    channel_catalog, component, component_catalog, connector_catalog, is_known_connector,
    llm_connector_ids, llm_provider, llm_provider_catalog,
};
pub use credits::{CreditLedgerEntry, CreditReason, OrganizationCredits};
pub use cursor::{Cursor, CursorError};
pub use executor::{ExecutorTokenRecord, PairingTokenRecord};
pub use identity::{
    AuthSession, Invitation, InvitationStatus, LlmOverride, Membership, Organization, OrgSettings,
    RoleKey, User,
};
pub use secret::ConnectorSecretRecord;
pub use toolset::{
    AgentSkillBundle, McpServerSpec, Toolset, ToolsetBuilderSession, ToolsetBuilderStatus,
    ToolsetBuilderTurn, ToolsetDraft, ToolsetVisibility, TurnRole,
};
pub use workflow::{
    RunTrigger, Workflow, WorkflowRun, WorkflowRunEvent, WorkflowRunStatus, WorkflowStatus,
};
