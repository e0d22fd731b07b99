// SPDX-License-Identifier: MIT OR Apache-2.0
//! Billing routes: packs, balances, ledger, checkout, and the webhook.

use crate::AppState;
use crate::extract::{require_auth, require_role, store_failure};
use crate::middleware::MaybeAuth;
use crate::routes::page_body;
use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::{Extension, Json};
use serde::Deserialize;
use serde_json::{Value, json};
use std::sync::Arc;
use vespid_auth::OrgContext;
use vespid_billing::{BillingError, WebhookOutcome, credit_packs};
use vespid_core::RoleKey;
use vespid_error::{ApiFailure, ApiResult, ErrorCode};

#[derive(Debug, Deserialize)]
pub struct PageQuery {
    pub cursor: Option<String>,
    pub limit: Option<usize>,
}

fn stripe_not_configured() -> ApiFailure {
    ApiFailure::new(ErrorCode::StripeNotConfigured, "Stripe is not configured")
}

/// `GET /v1/billing/credits/packs`
pub async fn list_packs(
    State(state): State<Arc<AppState>>,
    Extension(maybe): Extension<MaybeAuth>,
) -> ApiResult<Json<Value>> {
    require_auth(&maybe)?;
    let packs = credit_packs(
        state
            .config
            .stripe
            .as_ref()
            .and_then(|s| s.credits_packs_json.as_deref()),
    );
    Ok(Json(json!({ "packs": packs })))
}

/// `GET /v1/orgs/{orgId}/billing/credits`
pub async fn get_credits(
    State(state): State<Arc<AppState>>,
    Extension(org): Extension<OrgContext>,
) -> ApiResult<Json<Value>> {
    let credits = state
        .store
        .credits(&org.tenant, org.organization_id)
        .await
        .map_err(store_failure)?;
    Ok(Json(json!({ "credits": credits })))
}

/// `GET /v1/orgs/{orgId}/billing/credits/ledger`
pub async fn list_ledger(
    State(state): State<Arc<AppState>>,
    Extension(org): Extension<OrgContext>,
    Query(query): Query<PageQuery>,
) -> ApiResult<Json<Value>> {
    let page = state
        .store
        .list_ledger(
            &org.tenant,
            org.organization_id,
            query.cursor,
            crate::extract::page_limit(query.limit),
        )
        .await
        .map_err(store_failure)?;
    Ok(Json(page_body(page)))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutRequest {
    pub pack_id: String,
}

/// `POST /v1/orgs/{orgId}/billing/credits/checkout` (admin)
pub async fn create_checkout(
    State(state): State<Arc<AppState>>,
    Extension(org): Extension<OrgContext>,
    Json(body): Json<CheckoutRequest>,
) -> ApiResult<Json<Value>> {
    require_role(&org, RoleKey::Admin)?;
    let stripe = state.stripe.as_ref().ok_or_else(stripe_not_configured)?;
    let packs = credit_packs(
        state
            .config
            .stripe
            .as_ref()
            .and_then(|s| s.credits_packs_json.as_deref()),
    );
    let pack = packs
        .iter()
        .find(|p| p.id == body.pack_id)
        .ok_or_else(|| ApiFailure::not_found("credit pack not found"))?;

    // Current price through the cache; concurrent checkouts for the same
    // pack share one lookup.
    let price = state
        .price_cache
        .get_or_fetch(&pack.stripe_price_id, || stripe.price(&pack.stripe_price_id))
        .await
        .map_err(|err| {
            ApiFailure::new(ErrorCode::StripeNotConfigured, "Stripe is unavailable")
                .with_details(json!({ "reason": err.reason }))
        })?;

    let web = state.config.web_base_url.trim_end_matches('/');
    let session = stripe
        .create_checkout_session(
            &pack.stripe_price_id,
            &format!("{web}/billing?checkout=success"),
            &format!("{web}/billing?checkout=cancelled"),
            &[
                ("organizationId", org.organization_id.to_string()),
                ("credits", pack.credits.to_string()),
                ("packId", pack.id.clone()),
            ],
        )
        .await
        .map_err(|err| {
            ApiFailure::new(ErrorCode::StripeNotConfigured, "Stripe is unavailable")
                .with_details(json!({ "reason": err.reason }))
        })?;
    Ok(Json(json!({
        "checkoutUrl": session.url,
        "sessionId": session.id,
        "unitAmount": price["unit_amount"],
        "currency": price["currency"],
    })))
}

/// `POST /v1/billing/stripe/webhook` — raw body, signature-verified, 200
/// no-op for duplicates and irrelevant events.
pub async fn stripe_webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: axum::body::Bytes,
) -> ApiResult<Json<Value>> {
    let coordinator = state.credits.as_ref().ok_or_else(stripe_not_configured)?;
    let signature = headers
        .get("stripe-signature")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiFailure::validation("Stripe-Signature header is required"))?;
    let outcome = coordinator
        .handle_webhook(&body, signature)
        .await
        .map_err(|err| match err {
            BillingError::Signature(err) => {
                ApiFailure::validation(format!("webhook signature invalid: {err}"))
            }
            BillingError::Store(err) => store_failure(err),
        })?;
    let body = match outcome {
        WebhookOutcome::Applied { organization_id, credits } => json!({
            "received": true,
            "applied": true,
            "organizationId": organization_id,
            "credits": credits,
        }),
        WebhookOutcome::Duplicate => json!({ "received": true, "applied": false }),
        WebhookOutcome::Ignored => json!({ "received": true, "applied": false }),
    };
    Ok(Json(body))
}
