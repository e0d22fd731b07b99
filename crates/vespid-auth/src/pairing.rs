// SPDX-License-Identifier: MIT OR Apache-2.0
//! Executor pairing: one-shot pairing tokens exchanged for long-lived
//! executor tokens.
//!
//! The worker never authenticates as a user; the pairing token it was handed
//! is the whole proof. Both token kinds are `<uuid>.<opaque>` and only the
//! SHA-256 of the opaque part is stored.

use chrono::{Duration, Utc};
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;
use vespid_core::ExecutorTokenRecord;
use vespid_crypto::{ct_eq, random_token, sha256_hex};
use vespid_store::{Store, StoreError, TenantContext};
use vespid_token::parse_prefixed_token;

/// Pairing tokens are valid for 15 minutes.
const PAIRING_TTL_MIN: i64 = 15;

/// Pairing failures; all token-shaped problems collapse into
/// `PAIRING_TOKEN_INVALID` so the response does not reveal which check
/// failed.
#[derive(Debug, Error)]
pub enum PairingError {
    /// 401 `PAIRING_TOKEN_INVALID`.
    #[error("pairing token invalid")]
    TokenInvalid,
    /// Store failure.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// A freshly minted pairing token, returned to the caller exactly once.
#[derive(Debug, Clone)]
pub struct MintedPairingToken {
    /// Record id (the token's prefix).
    pub id: Uuid,
    /// The full `<id>.<opaque>` token.
    pub token: String,
    /// Expiry instant.
    pub expires_at: chrono::DateTime<Utc>,
}

/// A freshly issued executor credential, returned exactly once.
#[derive(Debug, Clone)]
pub struct IssuedExecutorToken {
    /// The executor token record.
    pub record: ExecutorTokenRecord,
    /// The full `<id>.<opaque>` token.
    pub token: String,
}

/// Mint, exchange, and revoke executor credentials.
pub struct PairingService {
    store: Arc<dyn Store>,
}

impl PairingService {
    /// Build the service.
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Mint a one-shot pairing token for an organization.
    pub async fn mint(
        &self,
        ctx: &TenantContext,
        organization_id: Uuid,
    ) -> Result<MintedPairingToken, PairingError> {
        let opaque = random_token(24);
        let expires_at = Utc::now() + Duration::minutes(PAIRING_TTL_MIN);
        let record = self
            .store
            .create_pairing_token(ctx, organization_id, sha256_hex(opaque.as_bytes()), expires_at)
            .await?;
        Ok(MintedPairingToken {
            id: record.id,
            token: format!("{}.{opaque}", record.id),
            expires_at,
        })
    }

    /// Exchange a pairing token for a long-lived executor token. One-shot:
    /// the pairing record is consumed even though the executor token is
    /// returned only once.
    pub async fn exchange(
        &self,
        token: &str,
        executor_name: &str,
    ) -> Result<IssuedExecutorToken, PairingError> {
        let (id, opaque) = parse_prefixed_token(token).map_err(|_| PairingError::TokenInvalid)?;
        let record = self
            .store
            .pairing_token(id)
            .await?
            .ok_or(PairingError::TokenInvalid)?;
        if !ct_eq(
            sha256_hex(opaque.as_bytes()).as_bytes(),
            record.token_hash.as_bytes(),
        ) {
            return Err(PairingError::TokenInvalid);
        }
        let record = self
            .store
            .consume_pairing_token(id, Utc::now())
            .await
            .map_err(|err| match err {
                StoreError::Precondition { .. } | StoreError::NotFound { .. } => {
                    PairingError::TokenInvalid
                }
                other => PairingError::Store(other),
            })?;

        let executor_opaque = random_token(32);
        let issued = self
            .store
            .create_executor_token(
                record.organization_id,
                executor_name.to_owned(),
                sha256_hex(executor_opaque.as_bytes()),
            )
            .await?;
        Ok(IssuedExecutorToken {
            token: format!("{}.{executor_opaque}", issued.id),
            record: issued,
        })
    }

    /// Idempotently revoke an executor token.
    pub async fn revoke(
        &self,
        organization_id: Uuid,
        executor_token_id: Uuid,
    ) -> Result<ExecutorTokenRecord, PairingError> {
        Ok(self
            .store
            .revoke_executor_token(organization_id, executor_token_id, Utc::now())
            .await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vespid_store::memory::InMemoryStore;
    use vespid_store::{NewOrganization, NewUser};

    async fn seeded() -> (Arc<InMemoryStore>, TenantContext, Uuid) {
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
        (store, TenantContext::org(user.id, org.id), org.id)
    }

    #[tokio::test]
    async fn mint_exchange_round_trips() {
        let (store, ctx, org) = seeded().await;
        let service = PairingService::new(store);
        let minted = service.mint(&ctx, org).await.unwrap();
        assert!(minted.token.starts_with(&minted.id.to_string()));

        let issued = service.exchange(&minted.token, "worker-1").await.unwrap();
        assert_eq!(issued.record.organization_id, org);
        assert_eq!(issued.record.name, "worker-1");
        assert!(issued.record.revoked_at.is_none());
    }

    #[tokio::test]
    async fn exchange_is_one_shot() {
        let (store, ctx, org) = seeded().await;
        let service = PairingService::new(store);
        let minted = service.mint(&ctx, org).await.unwrap();
        service.exchange(&minted.token, "worker-1").await.unwrap();
        assert!(matches!(
            service.exchange(&minted.token, "worker-2").await,
            Err(PairingError::TokenInvalid)
        ));
    }

    #[tokio::test]
    async fn tampered_or_malformed_tokens_are_invalid() {
        let (store, ctx, org) = seeded().await;
        let service = PairingService::new(store);
        let minted = service.mint(&ctx, org).await.unwrap();

        assert!(matches!(
            service.exchange("garbage", "w").await,
            Err(PairingError::TokenInvalid)
        ));
        let wrong_tail = format!("{}.{}", minted.id, random_token(24));
        assert!(matches!(
            service.exchange(&wrong_tail, "w").await,
            Err(PairingError::TokenInvalid)
        ));
    }

    #[tokio::test]
    async fn revoke_is_idempotent() {
        let (store, ctx, org) = seeded().await;
        let service = PairingService::new(store);
        let minted = service.mint(&ctx, org).await.unwrap();
        let issued = service.exchange(&minted.token, "worker-1").await.unwrap();

        let first = service.revoke(org, issued.record.id).await.unwrap();
        let second = service.revoke(org, issued.record.id).await.unwrap();
        assert!(first.revoked_at.is_some());
        assert_eq!(first.revoked_at, second.revoked_at);
    }
}
