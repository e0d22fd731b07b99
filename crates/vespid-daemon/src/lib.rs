// SPDX-License-Identifier: MIT OR Apache-2.0
//! HTTP control-plane daemon for the Vespid platform.
//!
//! [`build_app`] assembles the full Axum router: the auth pre-handler runs
//! before every route, org-scoped routes additionally pass through the
//! org-context middleware (membership check + warn-mode header), and the
//! handlers delegate to the coordinator crates.
#![deny(unsafe_code)]

pub mod cookies;
pub mod extract;
pub mod middleware;
pub mod routes;

use axum::Router;
use axum::routing::{delete, get, post};
use std::sync::Arc;
use vespid_auth::{
    Authenticator, AuthenticatorConfig, OrgContextMode, OrgContextResolver, pairing::PairingService,
};
use vespid_billing::{CreditsCoordinator, PriceCache, StripeClient};
use vespid_config::{ControlPlaneConfig, OrgContextEnforcement};
use vespid_llm::{ProviderRegistry, VertexCredentials};
use vespid_oauth::{DeviceFlow, HttpExchanger, OAuthCoordinator};
use vespid_router::{HttpGatewayClient, SessionRouter};
use vespid_runs::{InMemoryJobQueue, JobQueue, RunCoordinator};
use vespid_store::{Store, TenantContext, memory::InMemoryStore};
use vespid_toolset::{BuilderEngine, CompletionBackend};
use vespid_vault::SecretVault;

// ---------------------------------------------------------------------------
// AppState
// ---------------------------------------------------------------------------

/// Shared state behind every handler.
pub struct AppState {
    /// Runtime configuration.
    pub config: ControlPlaneConfig,
    /// The persistence interface.
    pub store: Arc<dyn Store>,
    /// Credential resolution and session lifecycle.
    pub authenticator: Authenticator,
    /// `X-Org-Id` validation and role gating.
    pub org_resolver: OrgContextResolver,
    /// OAuth authorization-code flows.
    pub oauth: OAuthCoordinator,
    /// LLM OAuth device flow.
    pub device_flow: DeviceFlow,
    /// Envelope-encrypted secret lifecycle.
    pub vault: Arc<SecretVault>,
    /// Workflow-run coordination.
    pub runs: RunCoordinator,
    /// Agent-session routing.
    pub router: SessionRouter,
    /// Toolset-builder engine.
    pub builder: BuilderEngine,
    /// Credit application, when Stripe is configured.
    pub credits: Option<CreditsCoordinator>,
    /// Stripe API client, when configured.
    pub stripe: Option<StripeClient>,
    /// Price cache with inflight dedup.
    pub price_cache: PriceCache,
    /// Executor pairing.
    pub pairing: PairingService,
}

impl AppState {
    /// Assemble production state on the given store and queue.
    pub fn new(
        config: ControlPlaneConfig,
        store: Arc<dyn Store>,
        queue: Arc<dyn JobQueue>,
    ) -> anyhow::Result<Arc<Self>> {
        let authenticator = Authenticator::new(
            store.clone(),
            AuthenticatorConfig {
                auth_token_secret: config.auth_token_secret.clone(),
                refresh_token_secret: config.refresh_token_secret.clone(),
                access_token_ttl_sec: config.access_token_ttl_sec,
                session_ttl_sec: config.session_ttl_sec,
            },
        );
        let mode = match config.org_context_enforcement {
            OrgContextEnforcement::Strict => OrgContextMode::Strict,
            OrgContextEnforcement::Warn => OrgContextMode::Warn,
        };
        let org_resolver = OrgContextResolver::new(store.clone(), mode);
        let exchanger = HttpExchanger::new(
            config.google_oauth.clone(),
            config.github_oauth.clone(),
            config.vertex_oauth.clone(),
        );
        let oauth = OAuthCoordinator::new(
            Arc::new(exchanger),
            config.oauth_state_secret.clone(),
            config.oauth_context_ttl_sec,
            config.google_oauth.clone(),
            config.github_oauth.clone(),
            config.vertex_oauth.clone(),
        );
        let vault = Arc::new(SecretVault::from_settings(
            store.clone(),
            config.kek.as_ref(),
        )?);
        let gateway = Arc::new(HttpGatewayClient::new(
            config.gateway_http_url.clone(),
            config.gateway_service_token.clone(),
        ));
        let registry = ProviderRegistry::new(config.llm_base_urls.clone());
        let backend = Arc::new(VaultCompletionBackend {
            registry,
            vault: vault.clone(),
            store: store.clone(),
        });
        let (credits, stripe) = match &config.stripe {
            Some(settings) => (
                Some(CreditsCoordinator::new(
                    store.clone(),
                    settings.webhook_secret.clone(),
                )),
                Some(StripeClient::new(settings.secret_key.clone(), None)),
            ),
            None => (None, None),
        };
        Ok(Arc::new(Self {
            authenticator,
            org_resolver,
            oauth,
            device_flow: DeviceFlow::new(),
            vault,
            runs: RunCoordinator::new(store.clone(), queue),
            router: SessionRouter::new(store.clone(), gateway),
            builder: BuilderEngine::new(store.clone(), backend),
            credits,
            stripe,
            price_cache: PriceCache::new(),
            pairing: PairingService::new(store.clone()),
            store,
            config,
        }))
    }

    /// State over fresh in-memory store and queue (tests, local runs).
    pub fn in_memory(config: ControlPlaneConfig) -> anyhow::Result<Arc<Self>> {
        Self::new(
            config,
            Arc::new(InMemoryStore::new()),
            Arc::new(InMemoryJobQueue::new()),
        )
    }
}

// ---------------------------------------------------------------------------
// Completion backend (registry + vault glue)
// ---------------------------------------------------------------------------

/// Resolves LLM credentials through the vault and dispatches to the right
/// dialect client.
struct VaultCompletionBackend {
    registry: ProviderRegistry,
    vault: Arc<SecretVault>,
    store: Arc<dyn Store>,
}

#[async_trait::async_trait]
impl CompletionBackend for VaultCompletionBackend {
    async fn complete(
        &self,
        organization_id: uuid::Uuid,
        llm: &vespid_core::LlmSelection,
        request: vespid_llm::ChatRequest,
    ) -> Result<vespid_llm::ChatResponse, vespid_llm::LlmError> {
        let unavailable = |reason: String| vespid_llm::LlmError::Unavailable { reason };
        let secret_id = llm
            .secret_id
            .ok_or_else(|| unavailable("no credential configured for this LLM".into()))?;
        // LLM calls act as the platform on the org's own secret.
        let ctx = TenantContext::org(uuid::Uuid::nil(), organization_id);
        let (_, plaintext) = self
            .vault
            .reveal(&ctx, organization_id, secret_id)
            .await
            .map_err(|err| unavailable(format!("secret unavailable: {err}")))?;

        let provider = vespid_core::llm_provider(&llm.provider)
            .ok_or_else(|| unavailable(format!("unknown provider {:?}", llm.provider)))?;
        let credentials = if provider.api_kind == "vertex" {
            let parsed: VertexCredentials = serde_json::from_slice(&plaintext)
                .map_err(|err| unavailable(format!("vertex secret unparseable: {err}")))?;
            vespid_llm::ProviderCredentials::Vertex(parsed)
        } else {
            let key = String::from_utf8(plaintext)
                .map_err(|_| unavailable("api key is not utf-8".into()))?;
            vespid_llm::ProviderCredentials::ApiKey(key.trim().to_owned())
        };

        let org_override = match self
            .store
            .organization(&ctx, organization_id)
            .await
            .ok()
            .map(|org| serde_json::from_value::<vespid_core::OrgSettings>(org.settings))
        {
            Some(Ok(settings)) => settings.llm_overrides.get(&llm.provider).cloned(),
            _ => None,
        };
        self.registry
            .client(&llm.provider, credentials, org_override.as_ref())?
            .complete(request)
            .await
    }
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

/// Build the Axum router with all control-plane routes.
pub fn build_app(state: Arc<AppState>) -> Router {
    use routes::*;

    let org_scoped = Router::new()
        // Org administration
        .route("/invitations", post(orgs::create_invitation))
        .route("/members", get(orgs::list_members))
        .route("/members/{memberId}/role", post(orgs::update_member_role))
        .route(
            "/settings",
            get(orgs::get_settings).put(orgs::put_settings),
        )
        // Secrets
        .route(
            "/secrets",
            post(secrets::create_secret).get(secrets::list_secrets),
        )
        .route("/secrets/{secretId}", delete(secrets::delete_secret))
        .route("/secrets/{secretId}/rotate", post(secrets::rotate_secret))
        // Vertex OAuth + device flow
        .route("/vertex/oauth/start", get(oauth::vertex_start))
        .route("/llm/oauth/device/start", post(oauth::device_start))
        .route("/llm/oauth/device/poll", post(oauth::device_poll))
        // Workflows and runs
        .route(
            "/workflows",
            post(workflows::create_workflow).get(workflows::list_workflows),
        )
        .route(
            "/workflows/{workflowId}",
            get(workflows::get_workflow).put(workflows::update_workflow),
        )
        .route(
            "/workflows/{workflowId}/revisions",
            get(workflows::list_revisions),
        )
        .route(
            "/workflows/{workflowId}/publish",
            post(workflows::publish_workflow),
        )
        .route(
            "/workflows/{workflowId}/drafts",
            post(workflows::create_draft),
        )
        .route(
            "/workflows/{workflowId}/runs",
            post(workflows::start_run).get(workflows::list_runs),
        )
        .route("/runs/{runId}", get(workflows::get_run))
        .route("/runs/{runId}/events", get(workflows::list_run_events))
        // Agents, bindings, sessions
        .route(
            "/agents",
            post(sessions::create_agent).get(sessions::list_agents),
        )
        .route(
            "/agent-bindings",
            post(sessions::create_binding).get(sessions::list_bindings),
        )
        .route(
            "/agent-bindings/{bindingId}",
            delete(sessions::delete_binding),
        )
        .route(
            "/agent-sessions",
            post(sessions::create_session).get(sessions::list_sessions),
        )
        .route("/agent-sessions/{sessionId}", get(sessions::get_session))
        .route(
            "/agent-sessions/{sessionId}/messages",
            post(sessions::post_message),
        )
        .route(
            "/agent-sessions/{sessionId}/events",
            get(sessions::list_session_events),
        )
        .route(
            "/agent-sessions/{sessionId}/reset",
            post(sessions::reset_session),
        )
        // Toolsets and the builder
        .route(
            "/toolsets",
            post(toolsets::create_toolset).get(toolsets::list_toolsets),
        )
        .route("/toolsets/{toolsetId}", get(toolsets::get_toolset))
        .route(
            "/toolsets/{toolsetId}/publish",
            post(toolsets::publish_toolset),
        )
        .route(
            "/toolsets/{toolsetId}/unpublish",
            post(toolsets::unpublish_toolset),
        )
        .route(
            "/toolset-builder/sessions",
            post(toolsets::builder_create_session),
        )
        .route(
            "/toolset-builder/sessions/{sessionId}/chat",
            post(toolsets::builder_chat),
        )
        .route(
            "/toolset-builder/sessions/{sessionId}/finalize",
            post(toolsets::builder_finalize),
        )
        // Billing
        .route("/billing/credits", get(billing::get_credits))
        .route("/billing/credits/ledger", get(billing::list_ledger))
        .route("/billing/credits/checkout", post(billing::create_checkout))
        // Executors
        .route("/executors", get(executors::list_executors))
        .route("/executors/pair-token", post(executors::mint_pair_token))
        .route(
            "/executors/{executorId}/revoke",
            post(executors::revoke_executor),
        )
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::org_context_middleware,
        ));

    let internal = Router::new()
        .route(
            "/managed-executors/issue",
            post(internal::issue_managed_executor),
        )
        .route(
            "/managed-executors/{executorId}/revoke",
            post(internal::revoke_managed_executor),
        )
        .route("/channels/trigger-run", post(internal::trigger_channel_run))
        .route("/runs/{runId}/status", post(internal::update_run_status))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::service_token_middleware,
        ));

    Router::new()
        .route("/health", get(meta::health))
        // Authentication and self
        .route("/v1/auth/signup", post(auth::signup))
        .route("/v1/auth/login", post(auth::login))
        .route("/v1/auth/refresh", post(auth::refresh))
        .route("/v1/auth/logout", post(auth::logout))
        .route("/v1/auth/logout-all", post(auth::logout_all))
        .route("/v1/me", get(auth::me))
        .route("/v1/auth/oauth/{provider}/start", get(oauth::oauth_start))
        .route(
            "/v1/auth/oauth/{provider}/callback",
            get(oauth::oauth_callback),
        )
        .route("/v1/vertex/oauth/callback", get(oauth::vertex_callback))
        // Meta
        .route("/v1/meta/capabilities", get(meta::capabilities))
        .route("/v1/meta/connectors", get(meta::connectors))
        .route("/v1/meta/channels", get(meta::channels))
        .route("/v1/llm/providers", get(meta::llm_providers))
        // Organizations (non org-scoped surface)
        .route("/v1/orgs", post(orgs::create_org).get(orgs::list_orgs))
        .route("/v1/invitations/{token}/accept", post(orgs::accept_invitation))
        // Public gallery
        .route("/v1/toolsets/public", get(toolsets::list_public))
        .route("/v1/toolsets/public/{slug}", get(toolsets::get_public))
        // Billing (non org-scoped surface)
        .route("/v1/billing/credits/packs", get(billing::list_packs))
        .route("/v1/billing/stripe/webhook", post(billing::stripe_webhook))
        // Executor pairing (worker-facing)
        .route("/v1/executors/pair", post(executors::pair_executor))
        .nest("/v1/orgs/{orgId}", org_scoped)
        .nest("/internal/v1", internal)
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::auth_middleware,
        ))
        .layer(axum::middleware::from_fn(middleware::request_logger))
        .layer(middleware::cors_layer(&state.config))
        .with_state(state)
}
