// SPDX-License-Identifier: MIT OR Apache-2.0
//! Agents, agent sessions, session events, and routing bindings.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Agent registry
// ---------------------------------------------------------------------------

/// A routable agent definition owned by an organization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentRecord {
    /// Unique identifier.
    pub id: Uuid,
    /// Owning organization.
    pub organization_id: Uuid,
    /// Display name.
    pub name: String,
    /// Execution engine identifier.
    pub engine_id: String,
    /// Whether this is the org's fallback agent.
    pub is_default: bool,
    /// Creation instant.
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Session configuration
// ---------------------------------------------------------------------------

/// Which LLM a session (or org default) uses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct LlmSelection {
    /// Provider id from the LLM catalog.
    pub provider: String,
    /// Model name as the provider understands it.
    pub model: String,
    /// Connector secret holding credentials, when the provider needs one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_id: Option<Uuid>,
}

/// Prompt configuration for a session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PromptSpec {
    /// Optional system prompt override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    /// Operator instructions appended to every turn.
    #[serde(default)]
    pub instructions: String,
}

/// Resource limits applied to a session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SessionLimits {
    /// Maximum assistant turns before the session refuses new messages.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_turns: Option<u32>,
    /// Token ceiling per assistant turn.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

/// How sessions are grouped into logical conversations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum SessionScope {
    /// One shared conversation per agent and org.
    #[serde(rename = "main")]
    Main,
    /// One conversation per peer.
    #[serde(rename = "per-peer")]
    PerPeer,
    /// One conversation per channel and peer.
    #[serde(rename = "per-channel-peer")]
    PerChannelPeer,
    /// One conversation per account, channel, and peer.
    #[serde(rename = "per-account-channel-peer")]
    PerAccountChannelPeer,
}

/// Executor placement constraints for a session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ExecutorSelector {
    /// Pin to one executor, when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub executor_id: Option<Uuid>,
    /// Require all of these labels on the executor.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub labels: Vec<String>,
}

// ---------------------------------------------------------------------------
// AgentSession
// ---------------------------------------------------------------------------

/// Session lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum AgentSessionStatus {
    /// Accepting messages.
    Active,
    /// Read-only.
    Archived,
}

/// A conversation between a peer and a routed agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentSession {
    /// Unique identifier.
    pub id: Uuid,
    /// Owning organization.
    pub organization_id: Uuid,
    /// Deterministic conversation-grouping key.
    pub session_key: String,
    /// Scope used to derive the session key.
    pub scope: SessionScope,
    /// Agent chosen by binding resolution.
    pub routed_agent_id: Option<Uuid>,
    /// Binding that won the resolution.
    pub binding_id: Option<Uuid>,
    /// Agent pinned by an explicit user action (cleared on reset).
    pub pinned_agent_id: Option<Uuid>,
    /// Execution engine identifier.
    pub engine_id: String,
    /// Toolset attached to the session.
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
    /// Lifecycle status.
    pub status: AgentSessionStatus,
    /// Creation instant.
    pub created_at: DateTime<Utc>,
    /// Last update instant.
    pub updated_at: DateTime<Utc>,
    /// Last event or message instant.
    pub last_activity_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// AgentSessionEvent
// ---------------------------------------------------------------------------

/// Severity of a session event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum EventLevel {
    /// Normal traffic.
    Info,
    /// Degraded but continuing.
    Warn,
    /// Failure.
    Error,
}

/// An append-only event in a session's ordered log.
///
/// `seq` is strictly monotone per session with no gaps;
/// `(session_id, idempotency_key)` is unique when the key is present.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentSessionEvent {
    /// Unique identifier.
    pub id: Uuid,
    /// Owning session.
    pub session_id: Uuid,
    /// Position in the session's log, starting at 0.
    pub seq: i64,
    /// Event discriminator (`user_message`, `agent_delta`, `system`, …).
    pub event_type: String,
    /// Severity.
    pub level: EventLevel,
    /// Client-chosen dedupe key.
    pub idempotency_key: Option<String>,
    /// Event payload.
    pub payload: Value,
    /// Creation instant.
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// AgentBinding
// ---------------------------------------------------------------------------

/// Axis along which a binding matches a session-creation request.
///
/// The declaration order below is the resolution ranking: a matching binding
/// of an earlier dimension always beats any binding of a later one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum BindingDimension {
    /// Exact peer match.
    Peer,
    /// Reserved: parses and ranks, but never matches.
    ParentPeer,
    /// Caller's org role intersects the binding's role list.
    OrgRoles,
    /// Whole-organization binding.
    Organization,
    /// Team field match.
    Team,
    /// Account field match.
    Account,
    /// Channel field match.
    Channel,
    /// Always matches; the fallback.
    Default,
}

impl BindingDimension {
    /// Rank in the resolution order; lower wins.
    pub fn rank(&self) -> usize {
        match self {
            Self::Peer => 0,
            Self::ParentPeer => 1,
            Self::OrgRoles => 2,
            Self::Organization => 3,
            Self::Team => 4,
            Self::Account => 5,
            Self::Channel => 6,
            Self::Default => 7,
        }
    }
}

/// A routing rule mapping request context onto an agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentBinding {
    /// Unique identifier.
    pub id: Uuid,
    /// Owning organization.
    pub organization_id: Uuid,
    /// Agent selected when this binding wins.
    pub agent_id: Uuid,
    /// Tie-breaker within a dimension; higher wins.
    pub priority: i32,
    /// Matching axis.
    pub dimension: BindingDimension,
    /// Dimension-specific match document.
    #[serde(rename = "match")]
    pub match_spec: Value,
    /// Free-form annotations.
    pub metadata: Option<Value>,
    /// Creation instant.
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dimension_ranks_follow_declared_resolution_order() {
        use BindingDimension::*;
        let order = [
            Peer,
            ParentPeer,
            OrgRoles,
            Organization,
            Team,
            Account,
            Channel,
            Default,
        ];
        for (index, dimension) in order.iter().enumerate() {
            assert_eq!(dimension.rank(), index);
        }
    }

    #[test]
    fn scope_serializes_with_kebab_names() {
        assert_eq!(
            serde_json::to_string(&SessionScope::PerChannelPeer).unwrap(),
            "\"per-channel-peer\""
        );
        assert_eq!(
            serde_json::from_str::<SessionScope>("\"main\"").unwrap(),
            SessionScope::Main
        );
    }

    #[test]
    fn binding_match_document_round_trips_under_match_key() {
        let binding = AgentBinding {
            id: Uuid::new_v4(),
            organization_id: Uuid::new_v4(),
            agent_id: Uuid::new_v4(),
            priority: 5,
            dimension: BindingDimension::Peer,
            match_spec: serde_json::json!({"peer": "u1"}),
            metadata: None,
            created_at: Utc::now(),
        };
        let rendered = serde_json::to_value(&binding).unwrap();
        assert_eq!(rendered["match"]["peer"], "u1");
        let parsed: AgentBinding = serde_json::from_value(rendered).unwrap();
        assert_eq!(parsed, binding);
    }
}
