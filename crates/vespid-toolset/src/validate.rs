// SPDX-License-Identifier: MIT OR Apache-2.0
//! Final-draft validation.
//!
//! A draft leaves the builder only if every MCP env/header value is an
//! `${ENV:VAR}` placeholder, server names are unique and unreserved, and
//! each agent-skill bundle is a well-formed `agentskills-v1` bundle whose
//! file paths are safe to unpack.

use vespid_core::{AgentSkillBundle, ToolsetDraft};

/// Server name reserved for the platform's built-in tools.
pub const RESERVED_SERVER_NAME: &str = "vespid-tools";

/// Required bundle format tag.
pub const SKILL_BUNDLE_FORMAT: &str = "agentskills-v1";

/// Bundle manifest file every skill must carry.
pub const SKILL_MANIFEST: &str = "SKILL.md";

/// Draft validation failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DraftValidationError {
    /// 400 `INVALID_MCP_PLACEHOLDER`.
    #[error("server {server:?} field {field:?} must be a ${{ENV:VAR}} placeholder")]
    InvalidPlaceholder {
        /// Offending server name.
        server: String,
        /// Offending env/header key.
        field: String,
    },

    /// 400: the reserved server name was used.
    #[error("server name {RESERVED_SERVER_NAME:?} is reserved")]
    ReservedServerName,

    /// 400: two servers share a name.
    #[error("duplicate server name {name:?}")]
    DuplicateServerName {
        /// The repeated name.
        name: String,
    },

    /// 400 `INVALID_SKILL_BUNDLE`.
    #[error("skill bundle {bundle:?} invalid: {reason}")]
    InvalidSkillBundle {
        /// Offending bundle name.
        bundle: String,
        /// What was wrong.
        reason: String,
    },
}

/// Whether `value` is exactly one `${ENV:VAR}` placeholder.
pub fn is_env_placeholder(value: &str) -> bool {
    let Some(var) = value.strip_prefix("${ENV:").and_then(|v| v.strip_suffix('}')) else {
        return false;
    };
    !var.is_empty()
        && var.chars().next().is_some_and(|c| c.is_ascii_uppercase() || c == '_')
        && var.chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_')
}

/// Whether `path` is a safe relative bundle path: no traversal, no
/// absolute or Windows forms, no empty components.
pub fn is_safe_bundle_path(path: &str) -> bool {
    if path.is_empty() || path.starts_with('/') || path.contains('\\') {
        return false;
    }
    // Windows drive or UNC forms.
    if path.len() >= 2 && path.as_bytes()[1] == b':' {
        return false;
    }
    path.split('/').all(|component| {
        !component.is_empty() && component != "." && component != ".."
    })
}

fn validate_bundle(bundle: &AgentSkillBundle) -> Result<(), DraftValidationError> {
    let fail = |reason: String| DraftValidationError::InvalidSkillBundle {
        bundle: bundle.name.clone(),
        reason,
    };
    if bundle.format != SKILL_BUNDLE_FORMAT {
        return Err(fail(format!(
            "format must be {SKILL_BUNDLE_FORMAT:?}, got {:?}",
            bundle.format
        )));
    }
    if !bundle.files.iter().any(|f| f == SKILL_MANIFEST) {
        return Err(fail(format!("missing {SKILL_MANIFEST}")));
    }
    for file in &bundle.files {
        if !is_safe_bundle_path(file) {
            return Err(fail(format!("unsafe path {file:?}")));
        }
    }
    Ok(())
}

/// Validate a complete draft.
///
/// `server_names` is the name list as produced (before map collapse), so
/// duplicates are still observable.
pub fn validate_draft(
    draft: &ToolsetDraft,
    server_names: &[String],
) -> Result<(), DraftValidationError> {
    for (index, name) in server_names.iter().enumerate() {
        if name == RESERVED_SERVER_NAME {
            return Err(DraftValidationError::ReservedServerName);
        }
        if server_names[..index].contains(name) {
            return Err(DraftValidationError::DuplicateServerName { name: name.clone() });
        }
    }
    for (server, spec) in &draft.mcp_servers {
        for (field, value) in spec.env.iter().chain(spec.headers.iter()) {
            if !is_env_placeholder(value) {
                return Err(DraftValidationError::InvalidPlaceholder {
                    server: server.clone(),
                    field: field.clone(),
                });
            }
        }
    }
    for bundle in &draft.agent_skills {
        validate_bundle(bundle)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use vespid_core::McpServerSpec;

    fn draft_with_env(value: &str) -> ToolsetDraft {
        let mut servers = BTreeMap::new();
        servers.insert(
            "github".to_owned(),
            McpServerSpec {
                command: "npx".into(),
                args: vec![],
                env: BTreeMap::from([("TOKEN".to_owned(), value.to_owned())]),
                headers: BTreeMap::new(),
            },
        );
        ToolsetDraft {
            mcp_servers: servers,
            agent_skills: vec![],
        }
    }

    #[test]
    fn placeholder_syntax_is_strict() {
        assert!(is_env_placeholder("${ENV:GITHUB_TOKEN}"));
        assert!(is_env_placeholder("${ENV:_PRIVATE}"));
        assert!(is_env_placeholder("${ENV:A1}"));
        assert!(!is_env_placeholder("${ENV:}"));
        assert!(!is_env_placeholder("${ENV:lower}"));
        assert!(!is_env_placeholder("ghp_secret123"));
        assert!(!is_env_placeholder("prefix ${ENV:VAR}"));
        assert!(!is_env_placeholder("${ENV:VAR} suffix"));
    }

    #[test]
    fn literal_secret_values_are_rejected() {
        let draft = draft_with_env("ghp_notaplaceholder");
        let err = validate_draft(&draft, &["github".into()]).unwrap_err();
        assert!(matches!(
            err,
            DraftValidationError::InvalidPlaceholder { server, field }
                if server == "github" && field == "TOKEN"
        ));
    }

    #[test]
    fn placeholder_values_pass() {
        let draft = draft_with_env("${ENV:GITHUB_TOKEN}");
        assert!(validate_draft(&draft, &["github".into()]).is_ok());
    }

    #[test]
    fn reserved_and_duplicate_server_names_are_rejected() {
        let draft = ToolsetDraft::default();
        assert_eq!(
            validate_draft(&draft, &["vespid-tools".into()]),
            Err(DraftValidationError::ReservedServerName)
        );
        assert!(matches!(
            validate_draft(&draft, &["a".into(), "b".into(), "a".into()]),
            Err(DraftValidationError::DuplicateServerName { name }) if name == "a"
        ));
    }

    #[test]
    fn path_safety_rules() {
        assert!(is_safe_bundle_path("SKILL.md"));
        assert!(is_safe_bundle_path("prompts/triage.md"));
        assert!(!is_safe_bundle_path("../escape.md"));
        assert!(!is_safe_bundle_path("a/../b.md"));
        assert!(!is_safe_bundle_path("/etc/passwd"));
        assert!(!is_safe_bundle_path("C:/windows/system32"));
        assert!(!is_safe_bundle_path("dir\\file.md"));
        assert!(!is_safe_bundle_path("a//b.md"));
        assert!(!is_safe_bundle_path(""));
    }

    #[test]
    fn bundles_require_format_and_manifest() {
        let good = AgentSkillBundle {
            name: "triage".into(),
            format: SKILL_BUNDLE_FORMAT.into(),
            files: vec!["SKILL.md".into(), "prompts/run.md".into()],
        };
        let draft = ToolsetDraft {
            mcp_servers: BTreeMap::new(),
            agent_skills: vec![good.clone()],
        };
        assert!(validate_draft(&draft, &[]).is_ok());

        let wrong_format = AgentSkillBundle {
            format: "agentskills-v2".into(),
            ..good.clone()
        };
        let draft = ToolsetDraft {
            mcp_servers: BTreeMap::new(),
            agent_skills: vec![wrong_format],
        };
        assert!(matches!(
            validate_draft(&draft, &[]),
            Err(DraftValidationError::InvalidSkillBundle { .. })
        ));

        let no_manifest = AgentSkillBundle {
            files: vec!["README.md".into()],
            ..good
        };
        let draft = ToolsetDraft {
            mcp_servers: BTreeMap::new(),
            agent_skills: vec![no_manifest],
        };
        assert!(matches!(
            validate_draft(&draft, &[]),
            Err(DraftValidationError::InvalidSkillBundle { .. })
        ));
    }
}
