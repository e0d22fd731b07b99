// SPDX-License-Identifier: MIT OR Apache-2.0
//! OAuth coordination: authorization-code flows (login and Vertex) and the
//! device flow.
//!
//! State lives in two places at once: a short-TTL in-memory record keyed by
//! the opaque `state`, and two signed cookies independently attesting the
//! state and the nonce. The callback must satisfy both, so a lost process
//! map fails closed and a replayed callback fails on the one-shot record.
#![deny(unsafe_code)]
#![warn(missing_docs)]

mod provider;

pub use provider::{
    CodeExchanger, ExchangeError, HttpExchanger, OAuthProfile, OAuthProvider,
};

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;
use vespid_config::OAuthClientSettings;
use vespid_crypto::{b64url_encode, random_token, sha256};
use vespid_token::{sign_opaque_id, verify_opaque_id};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// OAuth flow failures.
#[derive(Debug, thiserror::Error)]
pub enum OAuthError {
    /// 401 `UNAUTHORIZED`: cookie or state validation failed.
    #[error("oauth state validation failed")]
    Unauthorized,

    /// 401 `OAUTH_INVALID_NONCE`: the nonce attestation did not match.
    #[error("oauth nonce mismatch")]
    InvalidNonce,

    /// The provider's client credentials are not configured.
    #[error("oauth provider {provider} not configured")]
    NotConfigured {
        /// Provider name.
        provider: String,
    },

    /// The code exchange failed.
    #[error(transparent)]
    Exchange(#[from] ExchangeError),
}

// ---------------------------------------------------------------------------
// State records
// ---------------------------------------------------------------------------

/// In-memory, short-TTL record for one started flow.
#[derive(Debug, Clone)]
struct StateRecord {
    provider: String,
    code_verifier: String,
    nonce: String,
    expires_at: DateTime<Utc>,
    /// Caller-supplied opaque context carried through the flow (the Vertex
    /// flow stores the org/user/project here; the callback has no headers
    /// to recover them from).
    context: Option<String>,
}

#[derive(Default)]
struct StateMap {
    records: Mutex<HashMap<String, StateRecord>>,
}

impl StateMap {
    async fn insert(&self, state: String, record: StateRecord) {
        let mut records = self.records.lock().await;
        // Opportunistic purge keeps the map bounded without a sweeper task.
        let now = Utc::now();
        records.retain(|_, r| r.expires_at > now);
        records.insert(state, record);
    }

    /// One-shot take; expired records are treated as absent.
    async fn take(&self, state: &str) -> Option<StateRecord> {
        let record = self.records.lock().await.remove(state)?;
        (record.expires_at > Utc::now()).then_some(record)
    }
}

// ---------------------------------------------------------------------------
// Start / callback data
// ---------------------------------------------------------------------------

/// Everything the HTTP layer needs to answer a start request.
#[derive(Debug, Clone)]
pub struct StartOutcome {
    /// Provider authorization URL to redirect (or return) to.
    pub authorize_url: String,
    /// The opaque state (also embedded in the URL).
    pub state: String,
    /// Signed blob for the state cookie.
    pub state_cookie: String,
    /// Signed blob for the nonce cookie.
    pub nonce_cookie: String,
}

/// Callback inputs (query + cookies).
#[derive(Debug, Clone)]
pub struct CallbackInput {
    /// `state` query parameter.
    pub state: String,
    /// `code` query parameter.
    pub code: String,
    /// Value of the state cookie, if present.
    pub state_cookie: Option<String>,
    /// Value of the nonce cookie, if present.
    pub nonce_cookie: Option<String>,
}

// ---------------------------------------------------------------------------
// Coordinator
// ---------------------------------------------------------------------------

/// Runs the authorization-code handshake for login providers and Vertex.
pub struct OAuthCoordinator {
    states: StateMap,
    exchanger: Arc<dyn CodeExchanger>,
    state_secret: String,
    context_ttl: Duration,
    google: Option<OAuthClientSettings>,
    github: Option<OAuthClientSettings>,
    vertex: Option<OAuthClientSettings>,
}

impl OAuthCoordinator {
    /// Build a coordinator.
    pub fn new(
        exchanger: Arc<dyn CodeExchanger>,
        state_secret: String,
        context_ttl_sec: u64,
        google: Option<OAuthClientSettings>,
        github: Option<OAuthClientSettings>,
        vertex: Option<OAuthClientSettings>,
    ) -> Self {
        Self {
            states: StateMap::default(),
            exchanger,
            state_secret,
            context_ttl: Duration::seconds(context_ttl_sec as i64),
            google,
            github,
            vertex,
        }
    }

    fn client_for(&self, provider: &str) -> Result<&OAuthClientSettings, OAuthError> {
        let client = match provider {
            "google" => self.google.as_ref(),
            "github" => self.github.as_ref(),
            "vertex" => self.vertex.as_ref(),
            _ => None,
        };
        client.ok_or_else(|| OAuthError::NotConfigured {
            provider: provider.to_owned(),
        })
    }

    async fn begin(
        &self,
        provider_name: &str,
        authorize_endpoint: &str,
        scopes: &str,
        redirect_uri: &str,
        extra_params: &[(&str, &str)],
        context: Option<String>,
    ) -> Result<StartOutcome, OAuthError> {
        let client = self.client_for(provider_name)?;
        let state = random_token(24);
        let nonce = random_token(24);
        let code_verifier = random_token(32);
        let code_challenge = b64url_encode(&sha256(code_verifier.as_bytes()));
        let expires_at = Utc::now() + self.context_ttl;

        self.states
            .insert(
                state.clone(),
                StateRecord {
                    provider: provider_name.to_owned(),
                    code_verifier,
                    nonce: nonce.clone(),
                    expires_at,
                    context,
                },
            )
            .await;

        let mut params = vec![
            ("response_type", "code"),
            ("client_id", client.client_id.as_str()),
            ("redirect_uri", redirect_uri),
            ("scope", scopes),
            ("state", state.as_str()),
            ("nonce", nonce.as_str()),
            ("code_challenge", code_challenge.as_str()),
            ("code_challenge_method", "S256"),
        ];
        params.extend_from_slice(extra_params);
        let authorize_url = reqwest::Url::parse_with_params(authorize_endpoint, &params)
            .map_err(|_| OAuthError::NotConfigured {
                provider: provider_name.to_owned(),
            })?
            .to_string();

        debug!(provider = provider_name, "oauth flow started");
        Ok(StartOutcome {
            state_cookie: sign_opaque_id(&state, expires_at, self.state_secret.as_bytes()),
            nonce_cookie: sign_opaque_id(&nonce, expires_at, self.state_secret.as_bytes()),
            authorize_url,
            state,
        })
    }

    /// Start a login flow.
    pub async fn start_login(
        &self,
        provider: OAuthProvider,
        redirect_uri: &str,
    ) -> Result<StartOutcome, OAuthError> {
        self.begin(
            provider.as_str(),
            provider.authorize_endpoint(),
            provider.scopes(),
            redirect_uri,
            &[],
            None,
        )
        .await
    }

    /// Start a Vertex credential flow (offline access). `context` travels
    /// through the state record and comes back from the callback.
    pub async fn start_vertex(
        &self,
        redirect_uri: &str,
        context: String,
    ) -> Result<StartOutcome, OAuthError> {
        self.begin(
            "vertex",
            "https://accounts.google.com/o/oauth2/v2/auth",
            "https://www.googleapis.com/auth/cloud-platform",
            redirect_uri,
            &[("access_type", "offline"), ("prompt", "consent")],
            Some(context),
        )
        .await
    }

    /// Validate a callback and hand back the flow's verifier.
    ///
    /// The cookie attestations are checked first, then the in-memory record
    /// is taken (one-shot), then the nonce attestation is matched against
    /// the record.
    async fn validate_callback(
        &self,
        expected_provider: &str,
        input: &CallbackInput,
    ) -> Result<StateRecord, OAuthError> {
        let now = Utc::now();
        let state_blob = input.state_cookie.as_deref().ok_or(OAuthError::Unauthorized)?;
        let nonce_blob = input.nonce_cookie.as_deref().ok_or(OAuthError::Unauthorized)?;
        let attested_state = verify_opaque_id(state_blob, self.state_secret.as_bytes(), now)
            .map_err(|_| OAuthError::Unauthorized)?;
        if attested_state != input.state {
            warn!("oauth state cookie does not match query state");
            return Err(OAuthError::Unauthorized);
        }
        let record = self
            .states
            .take(&input.state)
            .await
            .ok_or(OAuthError::Unauthorized)?;
        if record.provider != expected_provider {
            return Err(OAuthError::Unauthorized);
        }
        let attested_nonce = verify_opaque_id(nonce_blob, self.state_secret.as_bytes(), now)
            .map_err(|_| OAuthError::Unauthorized)?;
        if attested_nonce != record.nonce {
            return Err(OAuthError::InvalidNonce);
        }
        Ok(record)
    }

    /// Complete a login callback: validate, then exchange the code for a
    /// profile.
    pub async fn complete_login(
        &self,
        provider: OAuthProvider,
        input: CallbackInput,
        redirect_uri: &str,
    ) -> Result<OAuthProfile, OAuthError> {
        let record = self.validate_callback(provider.as_str(), &input).await?;
        Ok(self
            .exchanger
            .exchange_profile(provider, &input.code, &record.code_verifier, redirect_uri)
            .await?)
    }

    /// Complete a Vertex callback: validate, then exchange the code for an
    /// offline refresh token. Returns the refresh token and the context the
    /// start call stashed.
    pub async fn complete_vertex(
        &self,
        input: CallbackInput,
        redirect_uri: &str,
    ) -> Result<(String, String), OAuthError> {
        let record = self.validate_callback("vertex", &input).await?;
        let context = record.context.clone().ok_or(OAuthError::Unauthorized)?;
        let refresh_token = self
            .exchanger
            .exchange_vertex_refresh_token(&input.code, &record.code_verifier, redirect_uri)
            .await?;
        Ok((refresh_token, context))
    }
}

// ---------------------------------------------------------------------------
// Device flow
// ---------------------------------------------------------------------------

/// One pending device connection.
#[derive(Debug, Clone)]
pub struct DeviceEntry {
    /// Organization the credential will belong to.
    pub organization_id: Uuid,
    /// User who started the flow.
    pub user_id: Uuid,
    /// LLM provider id.
    pub provider: String,
    /// Secret name to store under.
    pub name: String,
    /// Expiry instant.
    pub expires_at: DateTime<Utc>,
}

/// Short-TTL `device_code → entry` map.
#[derive(Default)]
pub struct DeviceFlow {
    entries: Mutex<HashMap<String, DeviceEntry>>,
}

/// Device-flow TTL.
const DEVICE_TTL_MIN: i64 = 15;

impl DeviceFlow {
    /// An empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a flow; returns the device code.
    pub async fn start(
        &self,
        organization_id: Uuid,
        user_id: Uuid,
        provider: String,
        name: String,
    ) -> String {
        let code = random_token(16);
        let mut entries = self.entries.lock().await;
        let now = Utc::now();
        entries.retain(|_, e| e.expires_at > now);
        entries.insert(
            code.clone(),
            DeviceEntry {
                organization_id,
                user_id,
                provider,
                name,
                expires_at: now + Duration::minutes(DEVICE_TTL_MIN),
            },
        );
        code
    }

    /// Look up a pending flow without consuming it.
    pub async fn peek(&self, device_code: &str) -> Option<DeviceEntry> {
        let entries = self.entries.lock().await;
        entries
            .get(device_code)
            .filter(|e| e.expires_at > Utc::now())
            .cloned()
    }

    /// Consume a flow once its token has been stored.
    pub async fn complete(&self, device_code: &str) -> Option<DeviceEntry> {
        let entry = self.entries.lock().await.remove(device_code)?;
        (entry.expires_at > Utc::now()).then_some(entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct ScriptedExchanger;

    #[async_trait]
    impl CodeExchanger for ScriptedExchanger {
        async fn exchange_profile(
            &self,
            _provider: OAuthProvider,
            code: &str,
            _code_verifier: &str,
            _redirect_uri: &str,
        ) -> Result<OAuthProfile, ExchangeError> {
            if code == "bad-code" {
                return Err(ExchangeError::Failed {
                    reason: "provider rejected the code".into(),
                });
            }
            Ok(OAuthProfile {
                email: "a@b.co".into(),
                display_name: Some("Ada".into()),
            })
        }

        async fn exchange_vertex_refresh_token(
            &self,
            _code: &str,
            _code_verifier: &str,
            _redirect_uri: &str,
        ) -> Result<String, ExchangeError> {
            Ok("rt-vertex".into())
        }
    }

    fn coordinator() -> OAuthCoordinator {
        let settings = OAuthClientSettings {
            client_id: "client-1".into(),
            client_secret: "secret-1".into(),
        };
        OAuthCoordinator::new(
            Arc::new(ScriptedExchanger),
            "oauth-state-secret".into(),
            600,
            Some(settings.clone()),
            Some(settings.clone()),
            Some(settings),
        )
    }

    fn callback_from(start: &StartOutcome, code: &str) -> CallbackInput {
        CallbackInput {
            state: start.state.clone(),
            code: code.into(),
            state_cookie: Some(start.state_cookie.clone()),
            nonce_cookie: Some(start.nonce_cookie.clone()),
        }
    }

    #[tokio::test]
    async fn start_then_callback_round_trips() {
        let oauth = coordinator();
        let start = oauth
            .start_login(OAuthProvider::Google, "https://api/cb")
            .await
            .unwrap();
        assert!(start.authorize_url.contains("code_challenge_method=S256"));
        assert!(start.authorize_url.contains(&format!("state={}", start.state)));

        let profile = oauth
            .complete_login(
                OAuthProvider::Google,
                callback_from(&start, "good-code"),
                "https://api/cb",
            )
            .await
            .unwrap();
        assert_eq!(profile.email, "a@b.co");
    }

    #[tokio::test]
    async fn state_record_is_one_shot() {
        let oauth = coordinator();
        let start = oauth
            .start_login(OAuthProvider::Google, "https://api/cb")
            .await
            .unwrap();
        oauth
            .complete_login(
                OAuthProvider::Google,
                callback_from(&start, "good-code"),
                "https://api/cb",
            )
            .await
            .unwrap();
        assert!(matches!(
            oauth
                .complete_login(
                    OAuthProvider::Google,
                    callback_from(&start, "good-code"),
                    "https://api/cb",
                )
                .await,
            Err(OAuthError::Unauthorized)
        ));
    }

    #[tokio::test]
    async fn missing_or_tampered_state_cookie_is_unauthorized() {
        let oauth = coordinator();
        let start = oauth
            .start_login(OAuthProvider::Google, "https://api/cb")
            .await
            .unwrap();

        let mut no_cookie = callback_from(&start, "good-code");
        no_cookie.state_cookie = None;
        assert!(matches!(
            oauth
                .complete_login(OAuthProvider::Google, no_cookie, "https://api/cb")
                .await,
            Err(OAuthError::Unauthorized)
        ));

        let mut tampered = callback_from(&start, "good-code");
        let blob = tampered.state_cookie.unwrap();
        let flipped = if blob.starts_with('A') {
            format!("B{}", &blob[1..])
        } else {
            format!("A{}", &blob[1..])
        };
        tampered.state_cookie = Some(flipped);
        assert!(matches!(
            oauth
                .complete_login(OAuthProvider::Google, tampered, "https://api/cb")
                .await,
            Err(OAuthError::Unauthorized)
        ));
    }

    #[tokio::test]
    async fn provider_mismatch_is_unauthorized() {
        let oauth = coordinator();
        let start = oauth
            .start_login(OAuthProvider::Google, "https://api/cb")
            .await
            .unwrap();
        assert!(matches!(
            oauth
                .complete_login(
                    OAuthProvider::GitHub,
                    callback_from(&start, "good-code"),
                    "https://api/cb",
                )
                .await,
            Err(OAuthError::Unauthorized)
        ));
    }

    #[tokio::test]
    async fn swapped_nonce_cookie_is_invalid_nonce() {
        let oauth = coordinator();
        let start_a = oauth
            .start_login(OAuthProvider::Google, "https://api/cb")
            .await
            .unwrap();
        let start_b = oauth
            .start_login(OAuthProvider::Google, "https://api/cb")
            .await
            .unwrap();

        // Valid signature, wrong flow: flow A's callback with B's nonce.
        let mut crossed = callback_from(&start_a, "good-code");
        crossed.nonce_cookie = Some(start_b.nonce_cookie.clone());
        assert!(matches!(
            oauth
                .complete_login(OAuthProvider::Google, crossed, "https://api/cb")
                .await,
            Err(OAuthError::InvalidNonce)
        ));
    }

    #[tokio::test]
    async fn vertex_flow_yields_refresh_token_and_context() {
        let oauth = coordinator();
        let start = oauth
            .start_vertex("https://api/vertex/cb", "org-context-blob".into())
            .await
            .unwrap();
        assert!(start.authorize_url.contains("access_type=offline"));
        let (refresh, context) = oauth
            .complete_vertex(callback_from(&start, "code-1"), "https://api/vertex/cb")
            .await
            .unwrap();
        assert_eq!(refresh, "rt-vertex");
        assert_eq!(context, "org-context-blob");
    }

    #[tokio::test]
    async fn unconfigured_provider_refuses_to_start() {
        let oauth = OAuthCoordinator::new(
            Arc::new(ScriptedExchanger),
            "secret".into(),
            600,
            None,
            None,
            None,
        );
        assert!(matches!(
            oauth.start_login(OAuthProvider::Google, "https://cb").await,
            Err(OAuthError::NotConfigured { .. })
        ));
    }

    #[tokio::test]
    async fn device_flow_round_trips_and_is_one_shot() {
        let flow = DeviceFlow::new();
        let org = Uuid::new_v4();
        let user = Uuid::new_v4();
        let code = flow
            .start(org, user, "anthropic".into(), "default".into())
            .await;

        let pending = flow.peek(&code).await.unwrap();
        assert_eq!(pending.organization_id, org);

        let entry = flow.complete(&code).await.unwrap();
        assert_eq!(entry.provider, "anthropic");
        assert!(flow.peek(&code).await.is_none());
        assert!(flow.complete(&code).await.is_none());
    }
}
