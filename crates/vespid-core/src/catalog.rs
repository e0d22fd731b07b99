// SPDX-License-Identifier: MIT OR Apache-2.0
//! Static catalogs: connectors, channels, LLM providers, and the MCP
//! component catalog the toolset builder ranks against.
//!
//! These are compile-time tables; the control plane never mutates them.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Connectors
// ---------------------------------------------------------------------------

/// A connector a secret can belong to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ConnectorDescriptor {
    /// Stable connector id.
    pub id: &'static str,
    /// Display name.
    pub name: &'static str,
    /// One-line description.
    pub description: &'static str,
}

/// Connectors with first-party support.
pub fn connector_catalog() -> &'static [ConnectorDescriptor] {
    &[
        ConnectorDescriptor {
            id: "slack",
            name: "Slack",
            description: "Slack workspace bot credentials",
        },
        ConnectorDescriptor {
            id: "github",
            name: "GitHub",
            description: "GitHub app or personal access token",
        },
        ConnectorDescriptor {
            id: "notion",
            name: "Notion",
            description: "Notion integration token",
        },
        ConnectorDescriptor {
            id: "telegram",
            name: "Telegram",
            description: "Telegram bot token",
        },
        ConnectorDescriptor {
            id: "discord",
            name: "Discord",
            description: "Discord bot token",
        },
        ConnectorDescriptor {
            id: "webhook",
            name: "Webhook",
            description: "Signed outbound webhook secret",
        },
    ]
}

/// LLM connector ids recognized by the secret vault, including the OAuth
/// variants the device flow and the Vertex callback write to.
pub fn llm_connector_ids() -> &'static [&'static str] {
    &[
        "llm.openai",
        "llm.anthropic",
        "llm.google",
        "llm.vertex",
        "llm.openai.oauth",
        "llm.anthropic.oauth",
        "llm.google.oauth",
        "llm.vertex.oauth",
    ]
}

/// Whether `connector_id` is in the recognized catalog (connectors plus
/// LLM connector ids). Unknown ids are rejected by the vault.
pub fn is_known_connector(connector_id: &str) -> bool {
    connector_catalog().iter().any(|c| c.id == connector_id)
        || llm_connector_ids().contains(&connector_id)
}

// ---------------------------------------------------------------------------
// Channels
// ---------------------------------------------------------------------------

/// A channel integration the platform can trigger runs from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ChannelDescriptor {
    /// Stable channel id.
    pub id: &'static str,
    /// Display name.
    pub name: &'static str,
    /// One-line description.
    pub description: &'static str,
}

/// Channels with first-party support.
pub fn channel_catalog() -> &'static [ChannelDescriptor] {
    &[
        ChannelDescriptor {
            id: "slack",
            name: "Slack",
            description: "Slack events and slash commands",
        },
        ChannelDescriptor {
            id: "telegram",
            name: "Telegram",
            description: "Telegram bot updates",
        },
        ChannelDescriptor {
            id: "discord",
            name: "Discord",
            description: "Discord gateway events",
        },
        ChannelDescriptor {
            id: "webchat",
            name: "Web chat",
            description: "Embedded browser chat widget",
        },
    ]
}

// ---------------------------------------------------------------------------
// LLM providers
// ---------------------------------------------------------------------------

/// Where an LLM selection is allowed to be used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum LlmContext {
    /// Interactive agent sessions.
    #[serde(rename = "session")]
    Session,
    /// Agent steps inside workflow runs.
    #[serde(rename = "workflowAgentRun")]
    WorkflowAgentRun,
    /// The toolset-builder assistant.
    #[serde(rename = "toolsetBuilder")]
    ToolsetBuilder,
}

/// A supported LLM provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LlmProviderDescriptor {
    /// Stable provider id.
    pub id: &'static str,
    /// Display name.
    pub name: &'static str,
    /// Wire dialect the client speaks (`openai-compatible`, …).
    pub api_kind: &'static str,
    /// Whether credentials come from a stored OAuth secret rather than an
    /// API key.
    pub requires_oauth: bool,
    /// Contexts this provider may be selected in.
    pub contexts: &'static [LlmContext],
    /// Model preselected by the UI.
    pub default_model: &'static str,
}

impl LlmProviderDescriptor {
    /// Whether this provider may be used in `context`.
    pub fn supports(&self, context: LlmContext) -> bool {
        self.contexts.contains(&context)
    }

    /// The LLM connector id a stored OAuth secret must belong to.
    pub fn oauth_connector_id(&self) -> String {
        format!("llm.{}.oauth", self.id)
    }
}

/// Supported LLM providers.
pub fn llm_provider_catalog() -> &'static [LlmProviderDescriptor] {
    use LlmContext::*;
    &[
        LlmProviderDescriptor {
            id: "openai",
            name: "OpenAI",
            api_kind: "openai-compatible",
            requires_oauth: false,
            contexts: &[Session, WorkflowAgentRun, ToolsetBuilder],
            default_model: "gpt-4o-mini",
        },
        LlmProviderDescriptor {
            id: "anthropic",
            name: "Anthropic",
            api_kind: "anthropic-compatible",
            requires_oauth: false,
            contexts: &[Session, WorkflowAgentRun, ToolsetBuilder],
            default_model: "claude-sonnet-4-5",
        },
        LlmProviderDescriptor {
            id: "google",
            name: "Google AI Studio",
            api_kind: "google",
            requires_oauth: false,
            contexts: &[Session, WorkflowAgentRun, ToolsetBuilder],
            default_model: "gemini-2.0-flash",
        },
        LlmProviderDescriptor {
            id: "vertex",
            name: "Google Vertex AI",
            api_kind: "vertex",
            requires_oauth: true,
            contexts: &[Session, WorkflowAgentRun, ToolsetBuilder],
            default_model: "gemini-2.0-flash",
        },
    ]
}

/// Look up a provider by id.
pub fn llm_provider(id: &str) -> Option<&'static LlmProviderDescriptor> {
    llm_provider_catalog().iter().find(|p| p.id == id)
}

// ---------------------------------------------------------------------------
// MCP component catalog (toolset builder)
// ---------------------------------------------------------------------------

/// A rankable MCP component the toolset builder can suggest.
///
/// `env` values are `${ENV:VAR}` placeholders; the builder never emits a
/// literal credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogItem {
    /// Stable component key.
    pub key: &'static str,
    /// Display name.
    pub name: &'static str,
    /// One-line description (ranked together with the name).
    pub description: &'static str,
    /// MCP server launch command.
    pub command: &'static str,
    /// Launch arguments.
    pub args: &'static [&'static str],
    /// Environment placeholders the server needs.
    pub env: &'static [(&'static str, &'static str)],
}

/// The MCP component catalog, in insertion order.
pub fn component_catalog() -> &'static [CatalogItem] {
    &[
        CatalogItem {
            key: "github",
            name: "GitHub",
            description: "Issues, pull requests, and repository search",
            command: "npx",
            args: &["-y", "@modelcontextprotocol/server-github"],
            env: &[("GITHUB_PERSONAL_ACCESS_TOKEN", "${ENV:GITHUB_TOKEN}")],
        },
        CatalogItem {
            key: "slack",
            name: "Slack",
            description: "Post messages and search Slack conversations",
            command: "npx",
            args: &["-y", "@modelcontextprotocol/server-slack"],
            env: &[("SLACK_BOT_TOKEN", "${ENV:SLACK_BOT_TOKEN}")],
        },
        CatalogItem {
            key: "postgres",
            name: "Postgres",
            description: "Read-only SQL queries against a Postgres database",
            command: "npx",
            args: &["-y", "@modelcontextprotocol/server-postgres"],
            env: &[("DATABASE_URL", "${ENV:DATABASE_URL}")],
        },
        CatalogItem {
            key: "filesystem",
            name: "Filesystem",
            description: "Scoped file reads and writes in a workspace",
            command: "npx",
            args: &["-y", "@modelcontextprotocol/server-filesystem"],
            env: &[],
        },
        CatalogItem {
            key: "fetch",
            name: "Fetch",
            description: "Fetch web pages and convert them to markdown",
            command: "npx",
            args: &["-y", "@modelcontextprotocol/server-fetch"],
            env: &[],
        },
        CatalogItem {
            key: "memory",
            name: "Memory",
            description: "Persistent knowledge-graph memory between turns",
            command: "npx",
            args: &["-y", "@modelcontextprotocol/server-memory"],
            env: &[],
        },
        CatalogItem {
            key: "notion",
            name: "Notion",
            description: "Search and edit Notion pages and databases",
            command: "npx",
            args: &["-y", "@notionhq/notion-mcp-server"],
            env: &[("NOTION_TOKEN", "${ENV:NOTION_TOKEN}")],
        },
        CatalogItem {
            key: "browser",
            name: "Browser",
            description: "Headless browser navigation and screenshots",
            command: "npx",
            args: &["-y", "@playwright/mcp"],
            env: &[],
        },
    ]
}

/// Look up a component by key.
pub fn component(key: &str) -> Option<&'static CatalogItem> {
    component_catalog().iter().find(|c| c.key == key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_connectors_include_llm_oauth_variants() {
        assert!(is_known_connector("slack"));
        assert!(is_known_connector("llm.vertex.oauth"));
        assert!(!is_known_connector("fax-machine"));
    }

    #[test]
    fn llm_context_wire_names_are_camel_case() {
        assert_eq!(
            serde_json::to_string(&LlmContext::WorkflowAgentRun).unwrap(),
            "\"workflowAgentRun\""
        );
        assert_eq!(
            serde_json::to_string(&LlmContext::ToolsetBuilder).unwrap(),
            "\"toolsetBuilder\""
        );
    }

    #[test]
    fn vertex_requires_oauth_and_maps_to_its_connector() {
        let vertex = llm_provider("vertex").unwrap();
        assert!(vertex.requires_oauth);
        assert_eq!(vertex.oauth_connector_id(), "llm.vertex.oauth");
        assert!(vertex.supports(LlmContext::ToolsetBuilder));
    }

    #[test]
    fn component_keys_are_unique() {
        let catalog = component_catalog();
        for (i, a) in catalog.iter().enumerate() {
            for b in &catalog[i + 1..] {
                assert_ne!(a.key, b.key);
            }
        }
    }

    #[test]
    fn component_env_values_are_placeholders() {
        for item in component_catalog() {
            for (_, value) in item.env {
                assert!(value.starts_with("${ENV:") && value.ends_with('}'));
            }
        }
    }
}
