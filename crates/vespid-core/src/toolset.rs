// SPDX-License-Identifier: MIT OR Apache-2.0
//! Toolsets, the toolset-builder session state machine, and draft shapes.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::agent::LlmSelection;

// ---------------------------------------------------------------------------
// Toolset
// ---------------------------------------------------------------------------

/// Who can see a toolset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ToolsetVisibility {
    /// Creator only.
    Private,
    /// Every member of the owning organization.
    Org,
    /// Listed in the public gallery under `public_slug`.
    Public,
}

/// MCP server definition inside a toolset.
///
/// Env and header values may only reference the environment through
/// `${ENV:VAR}` placeholders; literal secrets are rejected at validation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct McpServerSpec {
    /// Launch command.
    pub command: String,
    /// Command arguments.
    #[serde(default)]
    pub args: Vec<String>,
    /// Environment variables (values must be placeholders).
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    /// HTTP headers for remote servers (values must be placeholders).
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

/// An agent-skill bundle inside a toolset draft.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AgentSkillBundle {
    /// Bundle name.
    pub name: String,
    /// Must be `agentskills-v1`.
    pub format: String,
    /// Relative file paths; must include `SKILL.md` and pass path safety.
    pub files: Vec<String>,
}

/// A validated toolset draft: MCP servers plus agent skills.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ToolsetDraft {
    /// MCP servers keyed by server name.
    #[serde(default)]
    pub mcp_servers: BTreeMap<String, McpServerSpec>,
    /// Agent-skill bundles.
    #[serde(default)]
    pub agent_skills: Vec<AgentSkillBundle>,
}

/// A persisted toolset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Toolset {
    /// Unique identifier.
    pub id: Uuid,
    /// Owning organization.
    pub organization_id: Uuid,
    /// Display name.
    pub name: String,
    /// Definition document.
    pub draft: ToolsetDraft,
    /// Visibility.
    pub visibility: ToolsetVisibility,
    /// Gallery slug, present iff public.
    pub public_slug: Option<String>,
    /// When the toolset was made public.
    pub published_at: Option<DateTime<Utc>>,
    /// Creating user.
    pub created_by: Uuid,
    /// Creation instant.
    pub created_at: DateTime<Utc>,
    /// Last update instant.
    pub updated_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Toolset-builder sessions
// ---------------------------------------------------------------------------

/// Builder-session lifecycle. `Finalized` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ToolsetBuilderStatus {
    /// Accepting chat turns.
    Active,
    /// Draft produced; no further turns.
    Finalized,
}

/// Speaker of a builder turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TurnRole {
    /// The human operator.
    User,
    /// The builder LLM.
    Assistant,
}

/// One turn in a builder session's append-only transcript.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolsetBuilderTurn {
    /// Unique identifier.
    pub id: Uuid,
    /// Owning session.
    pub session_id: Uuid,
    /// Speaker.
    pub role: TurnRole,
    /// Message text (user turns are stored redacted).
    pub message_text: String,
    /// Creation instant.
    pub created_at: DateTime<Utc>,
}

/// A multi-turn toolset-builder session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolsetBuilderSession {
    /// Unique identifier.
    pub id: Uuid,
    /// Owning organization.
    pub organization_id: Uuid,
    /// Creating user.
    pub created_by: Uuid,
    /// Lifecycle status.
    pub status: ToolsetBuilderStatus,
    /// LLM configuration for assistant turns.
    pub llm: LlmSelection,
    /// Most recent user intent, if any.
    pub latest_intent: Option<String>,
    /// Catalog component keys selected so far.
    pub selected_component_keys: Vec<String>,
    /// The validated draft, present once finalized.
    pub final_draft: Option<ToolsetDraft>,
    /// Creation instant.
    pub created_at: DateTime<Utc>,
    /// Last update instant.
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_status_uses_screaming_case_on_the_wire() {
        assert_eq!(
            serde_json::to_string(&ToolsetBuilderStatus::Active).unwrap(),
            "\"ACTIVE\""
        );
        assert_eq!(
            serde_json::to_string(&TurnRole::Assistant).unwrap(),
            "\"ASSISTANT\""
        );
    }

    #[test]
    fn draft_round_trips() {
        let mut servers = BTreeMap::new();
        servers.insert(
            "github".to_owned(),
            McpServerSpec {
                command: "npx".into(),
                args: vec!["mcp-github".into()],
                env: BTreeMap::from([("GITHUB_TOKEN".into(), "${ENV:GITHUB_TOKEN}".into())]),
                headers: BTreeMap::new(),
            },
        );
        let draft = ToolsetDraft {
            mcp_servers: servers,
            agent_skills: vec![AgentSkillBundle {
                name: "triage".into(),
                format: "agentskills-v1".into(),
                files: vec!["SKILL.md".into(), "prompts/triage.md".into()],
            }],
        };
        let rendered = serde_json::to_value(&draft).unwrap();
        assert_eq!(rendered["mcpServers"]["github"]["command"], "npx");
        let parsed: ToolsetDraft = serde_json::from_value(rendered).unwrap();
        assert_eq!(parsed, draft);
    }
}
