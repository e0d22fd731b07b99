// SPDX-License-Identifier: MIT OR Apache-2.0
//! Payments and credits coordination.
//!
//! Webhook deliveries are signature-verified against the raw body, then
//! credit top-ups are applied at most once per processor event id (the
//! ledger's unique `stripe_event_id` is the guard). Checkout sessions and
//! price lookups go through [`stripe::StripeClient`]; the price cache
//! dedupes concurrent lookups.
#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod stripe;
pub mod webhook;

pub use stripe::{CheckoutSession, PriceCache, StripeCallError, StripeClient};
pub use webhook::{DEFAULT_TOLERANCE_SEC, SignatureError, sign_payload, verify_signature};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;
use vespid_core::CreditReason;
use vespid_store::{CreditApplication, CreditDelta, Store, StoreError, TenantContext};

// ---------------------------------------------------------------------------
// Credit packs
// ---------------------------------------------------------------------------

/// A purchasable credit pack.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreditPack {
    /// Stable pack id.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Credits granted on purchase.
    pub credits: i64,
    /// Price in the smallest currency unit.
    pub amount_cents: i64,
    /// ISO currency code.
    pub currency: String,
    /// Processor price id.
    pub stripe_price_id: String,
}

/// Parse `STRIPE_CREDITS_PACKS_JSON`; `None` or unparseable input falls
/// back to the built-in packs.
pub fn credit_packs(packs_json: Option<&str>) -> Vec<CreditPack> {
    if let Some(raw) = packs_json {
        match serde_json::from_str::<Vec<CreditPack>>(raw) {
            Ok(packs) if !packs.is_empty() => return packs,
            Ok(_) => warn!("STRIPE_CREDITS_PACKS_JSON is empty, using defaults"),
            Err(err) => warn!(%err, "STRIPE_CREDITS_PACKS_JSON unparseable, using defaults"),
        }
    }
    vec![
        CreditPack {
            id: "starter".into(),
            name: "Starter".into(),
            credits: 1_000,
            amount_cents: 900,
            currency: "usd".into(),
            stripe_price_id: "price_starter".into(),
        },
        CreditPack {
            id: "team".into(),
            name: "Team".into(),
            credits: 5_000,
            amount_cents: 3_900,
            currency: "usd".into(),
            stripe_price_id: "price_team".into(),
        },
        CreditPack {
            id: "scale".into(),
            name: "Scale".into(),
            credits: 25_000,
            amount_cents: 14_900,
            currency: "usd".into(),
            stripe_price_id: "price_scale".into(),
        },
    ]
}

// ---------------------------------------------------------------------------
// Webhook handling
// ---------------------------------------------------------------------------

/// What a webhook delivery did.
#[derive(Debug, Clone, PartialEq)]
pub enum WebhookOutcome {
    /// Credits were applied.
    Applied {
        /// The organization credited.
        organization_id: Uuid,
        /// Credits granted.
        credits: i64,
    },
    /// The event id had already been applied; no-op.
    Duplicate,
    /// Not a paid checkout completion (or malformed metadata); acknowledged
    /// without effect.
    Ignored,
}

/// Credit-coordination failures.
#[derive(Debug, thiserror::Error)]
pub enum BillingError {
    /// 400: the webhook signature did not verify.
    #[error(transparent)]
    Signature(#[from] SignatureError),

    /// Store failure.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Applies webhook events to the credit ledger.
pub struct CreditsCoordinator {
    store: Arc<dyn Store>,
    webhook_secret: String,
}

impl CreditsCoordinator {
    /// Build a coordinator.
    pub fn new(store: Arc<dyn Store>, webhook_secret: String) -> Self {
        Self {
            store,
            webhook_secret,
        }
    }

    /// Verify a delivery and apply it. Duplicates and non-paid events are
    /// acknowledged 200 by the caller.
    pub async fn handle_webhook(
        &self,
        raw_body: &[u8],
        signature_header: &str,
    ) -> Result<WebhookOutcome, BillingError> {
        verify_signature(
            raw_body,
            signature_header,
            &self.webhook_secret,
            DEFAULT_TOLERANCE_SEC,
            Utc::now(),
        )?;
        let event: Value = match serde_json::from_slice(raw_body) {
            Ok(event) => event,
            Err(err) => {
                warn!(%err, "webhook body is not JSON, acknowledging");
                return Ok(WebhookOutcome::Ignored);
            }
        };
        self.apply_event(&event).await
    }

    /// Apply an already-verified event document.
    pub async fn apply_event(&self, event: &Value) -> Result<WebhookOutcome, BillingError> {
        if event["type"].as_str() != Some("checkout.session.completed") {
            return Ok(WebhookOutcome::Ignored);
        }
        let object = &event["data"]["object"];
        if object["payment_status"].as_str() != Some("paid") {
            return Ok(WebhookOutcome::Ignored);
        }
        let Some(event_id) = event["id"].as_str() else {
            return Ok(WebhookOutcome::Ignored);
        };
        let metadata = &object["metadata"];
        let organization_id = metadata["organizationId"]
            .as_str()
            .and_then(|raw| Uuid::parse_str(raw).ok());
        let credits = metadata["credits"]
            .as_str()
            .and_then(|raw| raw.parse::<i64>().ok())
            .or_else(|| metadata["credits"].as_i64());
        let (Some(organization_id), Some(credits)) = (organization_id, credits) else {
            warn!(event_id, "checkout completion without usable metadata");
            return Ok(WebhookOutcome::Ignored);
        };
        if credits <= 0 {
            return Ok(WebhookOutcome::Ignored);
        }

        // Webhooks act as the platform, not as a user.
        let ctx = TenantContext::org(Uuid::nil(), organization_id);
        let application = self
            .store
            .apply_credit(
                &ctx,
                organization_id,
                CreditDelta {
                    delta_credits: credits,
                    reason: CreditReason::StripeTopUp,
                    stripe_event_id: Some(event_id.to_owned()),
                    workflow_run_id: None,
                    created_by: None,
                    metadata: serde_json::json!({
                        "checkoutSessionId": object["id"].as_str(),
                    }),
                },
                Utc::now(),
            )
            .await?;
        match application {
            CreditApplication::Applied(_) => {
                info!(%organization_id, credits, event_id, "credits applied");
                Ok(WebhookOutcome::Applied {
                    organization_id,
                    credits,
                })
            }
            CreditApplication::Duplicate(_) => {
                info!(event_id, "duplicate credit event, no-op");
                Ok(WebhookOutcome::Duplicate)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vespid_store::memory::InMemoryStore;
    use vespid_store::{NewOrganization, NewUser};

    const WEBHOOK_SECRET: &str = "whsec_test";

    async fn seeded() -> (Arc<InMemoryStore>, CreditsCoordinator, TenantContext, Uuid) {
        let store = Arc::new(InMemoryStore::new());
        let user = store
            .create_user(NewUser {
                email_lower: "o@x.co".into(),
                password_hash: "h".into(),
                display_name: None,
            })
            .await
            .unwrap();
        let (org, _) = store
            .create_organization(
                &TenantContext::user(user.id),
                NewOrganization {
                    slug: "acme".into(),
                    name: "Acme".into(),
                    settings: serde_json::json!({}),
                },
            )
            .await
            .unwrap();
        let coordinator = CreditsCoordinator::new(store.clone(), WEBHOOK_SECRET.into());
        (store, coordinator, TenantContext::org(user.id, org.id), org.id)
    }

    fn paid_event(event_id: &str, org: Uuid, credits: i64) -> Vec<u8> {
        serde_json::to_vec(&serde_json::json!({
            "id": event_id,
            "type": "checkout.session.completed",
            "data": { "object": {
                "id": "cs_1",
                "payment_status": "paid",
                "metadata": {
                    "organizationId": org.to_string(),
                    "credits": credits.to_string(),
                },
            }},
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn paid_checkout_applies_credits_exactly_once() {
        let (store, coordinator, ctx, org) = seeded().await;
        let body = paid_event("evt_1", org, 500);
        let header = sign_payload(&body, WEBHOOK_SECRET, Utc::now().timestamp());

        let first = coordinator.handle_webhook(&body, &header).await.unwrap();
        assert_eq!(
            first,
            WebhookOutcome::Applied {
                organization_id: org,
                credits: 500
            }
        );
        let second = coordinator.handle_webhook(&body, &header).await.unwrap();
        assert_eq!(second, WebhookOutcome::Duplicate);

        let credits = store.credits(&ctx, org).await.unwrap();
        assert_eq!(credits.balance_credits, 500);
        let ledger = store.list_ledger(&ctx, org, None, 10).await.unwrap();
        assert_eq!(ledger.items.len(), 1);
        assert_eq!(ledger.items[0].stripe_event_id.as_deref(), Some("evt_1"));
    }

    #[tokio::test]
    async fn invalid_signature_is_rejected_before_parsing() {
        let (_store, coordinator, _ctx, org) = seeded().await;
        let body = paid_event("evt_1", org, 500);
        let header = sign_payload(&body, "whsec_wrong", Utc::now().timestamp());
        assert!(matches!(
            coordinator.handle_webhook(&body, &header).await,
            Err(BillingError::Signature(_))
        ));
    }

    #[tokio::test]
    async fn unpaid_and_unknown_events_are_ignored() {
        let (store, coordinator, ctx, org) = seeded().await;

        let unpaid = serde_json::to_vec(&serde_json::json!({
            "id": "evt_2",
            "type": "checkout.session.completed",
            "data": { "object": { "payment_status": "unpaid", "metadata": {
                "organizationId": org.to_string(), "credits": "100",
            }}},
        }))
        .unwrap();
        let header = sign_payload(&unpaid, WEBHOOK_SECRET, Utc::now().timestamp());
        assert_eq!(
            coordinator.handle_webhook(&unpaid, &header).await.unwrap(),
            WebhookOutcome::Ignored
        );

        let unknown = serde_json::to_vec(&serde_json::json!({
            "id": "evt_3", "type": "invoice.created", "data": { "object": {} },
        }))
        .unwrap();
        let header = sign_payload(&unknown, WEBHOOK_SECRET, Utc::now().timestamp());
        assert_eq!(
            coordinator.handle_webhook(&unknown, &header).await.unwrap(),
            WebhookOutcome::Ignored
        );

        assert_eq!(store.credits(&ctx, org).await.unwrap().balance_credits, 0);
    }

    #[tokio::test]
    async fn zero_or_negative_credits_are_ignored() {
        let (_store, coordinator, _ctx, org) = seeded().await;
        let body = paid_event("evt_4", org, 0);
        let header = sign_payload(&body, WEBHOOK_SECRET, Utc::now().timestamp());
        assert_eq!(
            coordinator.handle_webhook(&body, &header).await.unwrap(),
            WebhookOutcome::Ignored
        );
    }

    #[test]
    fn packs_parse_with_fallback() {
        let custom = r#"[{"id":"x","name":"X","credits":10,"amountCents":100,
            "currency":"eur","stripePriceId":"price_x"}]"#;
        let packs = credit_packs(Some(custom));
        assert_eq!(packs.len(), 1);
        assert_eq!(packs[0].currency, "eur");

        let fallback = credit_packs(Some("not json"));
        assert_eq!(fallback.len(), 3);
        assert!(credit_packs(None).iter().any(|p| p.id == "team"));
    }
}
