// SPDX-License-Identifier: MIT OR Apache-2.0
//! Configuration loading and validation for the Vespid control plane.
//!
//! All runtime settings come from environment variables. [`load_from_env`]
//! reads the process environment; [`ControlPlaneConfig::from_vars`] takes an
//! explicit map so tests never touch global state. Validation distinguishes
//! hard errors (missing signing secrets, unparseable numbers) from advisory
//! [`ConfigWarning`]s (optional integrations left unconfigured).
#![deny(unsafe_code)]
#![warn(missing_docs)]

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors that prevent the control plane from starting.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A required variable is missing or empty.
    #[error("missing required environment variable: {name}")]
    MissingRequired {
        /// Variable name.
        name: String,
    },

    /// A variable could not be parsed.
    #[error("invalid value for {name}: {reason}")]
    InvalidValue {
        /// Variable name.
        name: String,
        /// Human-readable parse error.
        reason: String,
    },
}

// ---------------------------------------------------------------------------
// Warnings
// ---------------------------------------------------------------------------

/// Advisory issues that do not prevent operation but deserve attention.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigWarning {
    /// An optional integration is not configured and its routes will
    /// answer 503.
    IntegrationDisabled {
        /// Integration name (e.g. `stripe`, `secrets-kek`).
        integration: String,
        /// Variables that would enable it.
        variables: Vec<String>,
    },
    /// A TTL is unusually large.
    LargeTtl {
        /// Variable name.
        name: String,
        /// Configured value in seconds.
        secs: u64,
    },
}

impl std::fmt::Display for ConfigWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigWarning::IntegrationDisabled {
                integration,
                variables,
            } => {
                write!(f, "{integration} is disabled (set {})", variables.join(", "))
            }
            ConfigWarning::LargeTtl { name, secs } => {
                write!(f, "{name} is unusually large ({secs}s)")
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Config types
// ---------------------------------------------------------------------------

/// Deployment environment; controls cookie `Secure` flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Environment {
    /// Local development.
    Development,
    /// Production deployment.
    Production,
}

/// Org-context enforcement mode (spec'd header discipline).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum OrgContextEnforcement {
    /// Missing/mismatched `X-Org-Id` is a 400.
    Strict,
    /// Fall back to the route org id and record a warning header.
    Warn,
}

/// OAuth client credentials for one provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct OAuthClientSettings {
    /// OAuth client id.
    pub client_id: String,
    /// OAuth client secret.
    pub client_secret: String,
}

/// Stripe integration settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct StripeSettings {
    /// API secret key.
    pub secret_key: String,
    /// Webhook signing secret.
    pub webhook_secret: String,
    /// JSON document describing purchasable credit packs.
    pub credits_packs_json: Option<String>,
}

/// KEK material for the secret vault.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct KekSettings {
    /// Stable KEK identifier persisted on each wrapped secret.
    pub id: String,
    /// base64url-encoded 32-byte key.
    pub material_b64: String,
}

/// Top-level runtime configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ControlPlaneConfig {
    /// Deployment environment.
    pub environment: Environment,
    /// Listen address for the HTTP server.
    pub listen_addr: String,
    /// Public base URL of this API (OAuth callback redirect URIs).
    pub api_base_url: String,
    /// Public base URL of the web client (OAuth redirects, CORS origin).
    pub web_base_url: String,
    /// Gateway HTTP endpoint for session message forwarding.
    pub gateway_http_url: String,
    /// Gateway websocket endpoint advertised to executors.
    pub gateway_ws_url: String,
    /// Access-token lifetime in seconds.
    pub access_token_ttl_sec: u64,
    /// Refresh-token / auth-session lifetime in seconds.
    pub session_ttl_sec: u64,
    /// OAuth state record lifetime in seconds.
    pub oauth_context_ttl_sec: u64,
    /// Org-context header enforcement mode.
    pub org_context_enforcement: OrgContextEnforcement,
    /// Secret for access-token signing.
    pub auth_token_secret: String,
    /// Secret for refresh-token signing.
    pub refresh_token_secret: String,
    /// Secret for OAuth state/nonce cookie signing.
    pub oauth_state_secret: String,
    /// Token internal services present via `x-service-token`.
    pub internal_api_service_token: Option<String>,
    /// Token the gateway presents via `x-gateway-token`.
    pub gateway_service_token: Option<String>,
    /// Stripe integration, if configured.
    pub stripe: Option<StripeSettings>,
    /// Secret-vault KEK, if configured.
    pub kek: Option<KekSettings>,
    /// Google OAuth client, if configured.
    pub google_oauth: Option<OAuthClientSettings>,
    /// GitHub OAuth client, if configured.
    pub github_oauth: Option<OAuthClientSettings>,
    /// Vertex OAuth client, if configured.
    pub vertex_oauth: Option<OAuthClientSettings>,
    /// Base-URL overrides per LLM API kind (e.g. `openai-compatible`).
    pub llm_base_urls: BTreeMap<String, String>,
}

/// Default TTLs (seconds).
pub mod defaults {
    /// Access tokens: 15 minutes.
    pub const ACCESS_TOKEN_TTL_SEC: u64 = 900;
    /// Sessions / refresh tokens: 7 days.
    pub const SESSION_TTL_SEC: u64 = 604_800;
    /// OAuth state records and cookies: 10 minutes.
    pub const OAUTH_CONTEXT_TTL_SEC: u64 = 600;
    /// Outbound LLM call budget: 25 seconds.
    pub const LLM_TIMEOUT_SEC: u64 = 25;
    /// Outbound gateway call budget: 10 seconds.
    pub const GATEWAY_TIMEOUT_SEC: u64 = 10;
}

impl ControlPlaneConfig {
    /// Build a configuration from an explicit variable map.
    pub fn from_vars(vars: &BTreeMap<String, String>) -> Result<Self, ConfigError> {
        let get = |name: &str| -> Option<String> {
            vars.get(name)
                .map(|v| v.trim().to_owned())
                .filter(|v| !v.is_empty())
        };
        let require = |name: &str| -> Result<String, ConfigError> {
            get(name).ok_or_else(|| ConfigError::MissingRequired { name: name.into() })
        };
        let parse_u64 = |name: &str, default: u64| -> Result<u64, ConfigError> {
            match get(name) {
                None => Ok(default),
                Some(raw) => raw.parse().map_err(|_| ConfigError::InvalidValue {
                    name: name.into(),
                    reason: format!("expected an integer, got {raw:?}"),
                }),
            }
        };

        let environment = match get("VESPID_ENV").as_deref() {
            None | Some("development") => Environment::Development,
            Some("production") => Environment::Production,
            Some(other) => {
                return Err(ConfigError::InvalidValue {
                    name: "VESPID_ENV".into(),
                    reason: format!("expected development|production, got {other:?}"),
                });
            }
        };
        let org_context_enforcement = match get("ORG_CONTEXT_ENFORCEMENT").as_deref() {
            None | Some("strict") => OrgContextEnforcement::Strict,
            Some("warn") => OrgContextEnforcement::Warn,
            Some(other) => {
                return Err(ConfigError::InvalidValue {
                    name: "ORG_CONTEXT_ENFORCEMENT".into(),
                    reason: format!("expected strict|warn, got {other:?}"),
                });
            }
        };

        let pair = |id_var: &str, secret_var: &str| -> Option<OAuthClientSettings> {
            match (get(id_var), get(secret_var)) {
                (Some(client_id), Some(client_secret)) => Some(OAuthClientSettings {
                    client_id,
                    client_secret,
                }),
                _ => None,
            }
        };

        let stripe = match (get("STRIPE_SECRET_KEY"), get("STRIPE_WEBHOOK_SECRET")) {
            (Some(secret_key), Some(webhook_secret)) => Some(StripeSettings {
                secret_key,
                webhook_secret,
                credits_packs_json: get("STRIPE_CREDITS_PACKS_JSON"),
            }),
            _ => None,
        };
        let kek = match (get("SECRETS_KEK_ID"), get("SECRETS_KEK")) {
            (Some(id), Some(material_b64)) => Some(KekSettings { id, material_b64 }),
            _ => None,
        };

        let mut llm_base_urls = BTreeMap::new();
        for (key, value) in vars {
            if let Some(kind) = key.strip_prefix("LLM_BASE_URL_") {
                let kind = kind.to_ascii_lowercase().replace('_', "-");
                llm_base_urls.insert(kind, value.clone());
            }
        }

        Ok(Self {
            environment,
            listen_addr: get("VESPID_LISTEN_ADDR").unwrap_or_else(|| "127.0.0.1:8080".into()),
            api_base_url: get("VESPID_API_BASE_URL")
                .unwrap_or_else(|| "http://127.0.0.1:8080".into()),
            web_base_url: get("WEB_BASE_URL").unwrap_or_else(|| "http://localhost:3000".into()),
            gateway_http_url: get("GATEWAY_HTTP_URL")
                .unwrap_or_else(|| "http://localhost:8081".into()),
            gateway_ws_url: get("GATEWAY_WS_URL").unwrap_or_else(|| "ws://localhost:8081".into()),
            access_token_ttl_sec: parse_u64(
                "ACCESS_TOKEN_TTL_SEC",
                defaults::ACCESS_TOKEN_TTL_SEC,
            )?,
            session_ttl_sec: parse_u64("SESSION_TTL_SEC", defaults::SESSION_TTL_SEC)?,
            oauth_context_ttl_sec: parse_u64(
                "OAUTH_CONTEXT_TTL_SEC",
                defaults::OAUTH_CONTEXT_TTL_SEC,
            )?,
            org_context_enforcement,
            auth_token_secret: require("AUTH_TOKEN_SECRET")?,
            refresh_token_secret: require("REFRESH_TOKEN_SECRET")?,
            oauth_state_secret: require("OAUTH_STATE_SECRET")?,
            internal_api_service_token: get("INTERNAL_API_SERVICE_TOKEN"),
            gateway_service_token: get("GATEWAY_SERVICE_TOKEN"),
            stripe,
            kek,
            google_oauth: pair("GOOGLE_OAUTH_CLIENT_ID", "GOOGLE_OAUTH_CLIENT_SECRET"),
            github_oauth: pair("GITHUB_OAUTH_CLIENT_ID", "GITHUB_OAUTH_CLIENT_SECRET"),
            vertex_oauth: pair("VERTEX_OAUTH_CLIENT_ID", "VERTEX_OAUTH_CLIENT_SECRET"),
            llm_base_urls,
        })
    }

    /// Semantic validation; returns advisory warnings.
    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();
        if self.stripe.is_none() {
            warnings.push(ConfigWarning::IntegrationDisabled {
                integration: "stripe".into(),
                variables: vec!["STRIPE_SECRET_KEY".into(), "STRIPE_WEBHOOK_SECRET".into()],
            });
        }
        if self.kek.is_none() {
            warnings.push(ConfigWarning::IntegrationDisabled {
                integration: "secrets-kek".into(),
                variables: vec!["SECRETS_KEK_ID".into(), "SECRETS_KEK".into()],
            });
        }
        if self.vertex_oauth.is_none() {
            warnings.push(ConfigWarning::IntegrationDisabled {
                integration: "vertex-oauth".into(),
                variables: vec![
                    "VERTEX_OAUTH_CLIENT_ID".into(),
                    "VERTEX_OAUTH_CLIENT_SECRET".into(),
                ],
            });
        }
        // A session TTL past 30 days defeats the point of refresh rotation.
        if self.session_ttl_sec > 30 * 86_400 {
            warnings.push(ConfigWarning::LargeTtl {
                name: "SESSION_TTL_SEC".into(),
                secs: self.session_ttl_sec,
            });
        }
        if self.access_token_ttl_sec > 3_600 {
            warnings.push(ConfigWarning::LargeTtl {
                name: "ACCESS_TOKEN_TTL_SEC".into(),
                secs: self.access_token_ttl_sec,
            });
        }
        warnings
    }
}

/// Load configuration from the process environment.
pub fn load_from_env() -> Result<ControlPlaneConfig, ConfigError> {
    let vars: BTreeMap<String, String> = std::env::vars().collect();
    ControlPlaneConfig::from_vars(&vars)
}
