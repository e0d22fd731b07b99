// SPDX-License-Identifier: MIT OR Apache-2.0
//! The secret vault: envelope-encrypted connector-secret lifecycle.
//!
//! This crate is the only place plaintext secret material exists in memory,
//! and only for the duration of one call. Everything else in the workspace
//! passes secret *ids*. Each secret is sealed under its own fresh DEK; the
//! DEK is sealed under the process KEK loaded at startup.
#![deny(unsafe_code)]
#![warn(missing_docs)]

use chrono::Utc;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;
use vespid_config::KekSettings;
use vespid_core::{ConnectorSecretRecord, is_known_connector};
use vespid_crypto::{
    CryptoError, EnvelopeKey, SealedBox, WrappedSecret, b64url_decode, envelope_open,
    envelope_seal,
};
use vespid_store::{NewSecret, SecretCiphertext, Store, StoreError, TenantContext};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Vault failures.
#[derive(Debug, thiserror::Error)]
pub enum VaultError {
    /// No KEK is configured; the vault routes answer 503.
    #[error("secret vault is not configured")]
    NotConfigured,

    /// The connector id is not in the recognized catalog.
    #[error("unknown connector: {connector_id}")]
    UnknownConnector {
        /// The rejected id.
        connector_id: String,
    },

    /// No such secret in this organization.
    #[error("secret not found")]
    NotFound,

    /// A secret with this `(connector, name)` already exists.
    #[error("secret already exists")]
    AlreadyExists,

    /// Envelope open/seal failure.
    #[error(transparent)]
    Crypto(#[from] CryptoError),

    /// Store failure.
    #[error(transparent)]
    Store(#[from] StoreError),
}

// ---------------------------------------------------------------------------
// SecretVault
// ---------------------------------------------------------------------------

/// Envelope-encrypts connector secrets against the store.
pub struct SecretVault {
    store: Arc<dyn Store>,
    kek: Option<EnvelopeKey>,
}

impl SecretVault {
    /// Build a vault; `kek: None` disables it (all calls return
    /// [`VaultError::NotConfigured`]).
    pub fn new(store: Arc<dyn Store>, kek: Option<EnvelopeKey>) -> Self {
        Self { store, kek }
    }

    /// Build from configuration: decodes the base64url KEK material.
    pub fn from_settings(
        store: Arc<dyn Store>,
        settings: Option<&KekSettings>,
    ) -> Result<Self, CryptoError> {
        let kek = match settings {
            None => None,
            Some(settings) => {
                let material = b64url_decode(&settings.material_b64)?;
                Some(EnvelopeKey::new(settings.id.clone(), &material)?)
            }
        };
        Ok(Self::new(store, kek))
    }

    fn kek(&self) -> Result<&EnvelopeKey, VaultError> {
        self.kek.as_ref().ok_or(VaultError::NotConfigured)
    }

    fn seal(&self, plaintext: &[u8]) -> Result<SecretCiphertext, VaultError> {
        let wrapped = envelope_seal(self.kek()?, plaintext)?;
        Ok(SecretCiphertext {
            kek_id: wrapped.kek_id,
            dek_ciphertext: wrapped.dek.ciphertext,
            dek_iv: wrapped.dek.iv,
            dek_tag: wrapped.dek.tag,
            secret_ciphertext: wrapped.payload.ciphertext,
            secret_iv: wrapped.payload.iv,
            secret_tag: wrapped.payload.tag,
        })
    }

    fn unseal(&self, record: &ConnectorSecretRecord) -> Result<Vec<u8>, VaultError> {
        let wrapped = WrappedSecret {
            kek_id: record.kek_id.clone(),
            dek: SealedBox {
                ciphertext: record.dek_ciphertext.clone(),
                iv: record.dek_iv.clone(),
                tag: record.dek_tag.clone(),
            },
            payload: SealedBox {
                ciphertext: record.secret_ciphertext.clone(),
                iv: record.secret_iv.clone(),
                tag: record.secret_tag.clone(),
            },
        };
        Ok(envelope_open(self.kek()?, &wrapped)?)
    }

    /// Create a secret. The connector id must be in the recognized catalog.
    pub async fn create(
        &self,
        ctx: &TenantContext,
        organization_id: Uuid,
        connector_id: &str,
        name: &str,
        plaintext: &[u8],
    ) -> Result<ConnectorSecretRecord, VaultError> {
        if !is_known_connector(connector_id) {
            return Err(VaultError::UnknownConnector {
                connector_id: connector_id.to_owned(),
            });
        }
        let ciphertext = self.seal(plaintext)?;
        let record = self
            .store
            .create_secret(
                ctx,
                NewSecret {
                    organization_id,
                    connector_id: connector_id.to_owned(),
                    name: name.to_owned(),
                    ciphertext,
                    created_by: ctx.actor_user_id,
                },
            )
            .await
            .map_err(|err| match err {
                StoreError::Conflict { .. } => VaultError::AlreadyExists,
                other => VaultError::Store(other),
            })?;
        info!(secret_id = %record.id, connector = %record.connector_id, "secret created");
        Ok(record)
    }

    /// Open a secret and return its plaintext to the calling request only.
    pub async fn reveal(
        &self,
        ctx: &TenantContext,
        organization_id: Uuid,
        id: Uuid,
    ) -> Result<(ConnectorSecretRecord, Vec<u8>), VaultError> {
        let record = self
            .store
            .secret(ctx, organization_id, id)
            .await?
            .ok_or(VaultError::NotFound)?;
        let plaintext = self.unseal(&record)?;
        Ok((record, plaintext))
    }

    /// Rotate: reseal a new plaintext under a fresh DEK and the current
    /// KEK. Identity, connector, and name are invariant.
    pub async fn rotate(
        &self,
        ctx: &TenantContext,
        organization_id: Uuid,
        id: Uuid,
        plaintext: &[u8],
    ) -> Result<ConnectorSecretRecord, VaultError> {
        let ciphertext = self.seal(plaintext)?;
        self.store
            .rotate_secret(
                ctx,
                organization_id,
                id,
                ciphertext,
                ctx.actor_user_id,
                Utc::now(),
            )
            .await
            .map_err(|err| match err {
                StoreError::NotFound { .. } => VaultError::NotFound,
                other => VaultError::Store(other),
            })
    }

    /// Delete a secret; operates purely on the wrapped form.
    pub async fn delete(
        &self,
        ctx: &TenantContext,
        organization_id: Uuid,
        id: Uuid,
    ) -> Result<(), VaultError> {
        self.store
            .delete_secret(ctx, organization_id, id)
            .await
            .map_err(|err| match err {
                StoreError::NotFound { .. } => VaultError::NotFound,
                other => VaultError::Store(other),
            })
    }

    /// List wrapped records (no plaintext).
    pub async fn list(
        &self,
        ctx: &TenantContext,
        organization_id: Uuid,
    ) -> Result<Vec<ConnectorSecretRecord>, VaultError> {
        Ok(self.store.list_secrets(ctx, organization_id).await?)
    }

    /// Create `(connector, name)` or, if it already exists, rotate it in
    /// place. Used by the OAuth flows that land refreshed provider
    /// credentials under a well-known name.
    pub async fn upsert(
        &self,
        ctx: &TenantContext,
        organization_id: Uuid,
        connector_id: &str,
        name: &str,
        plaintext: &[u8],
    ) -> Result<ConnectorSecretRecord, VaultError> {
        match self
            .store
            .secret_by_name(ctx, organization_id, connector_id, name)
            .await?
        {
            Some(existing) => {
                self.rotate(ctx, organization_id, existing.id, plaintext)
                    .await
            }
            None => {
                self.create(ctx, organization_id, connector_id, name, plaintext)
                    .await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vespid_store::memory::InMemoryStore;
    use vespid_store::{NewOrganization, NewUser};

    async fn vault_and_org() -> (SecretVault, TenantContext, Uuid) {
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
        let kek = EnvelopeKey::new("kek-1", &[3u8; 32]).unwrap();
        (
            SecretVault::new(store, Some(kek)),
            TenantContext::org(user.id, org.id),
            org.id,
        )
    }

    #[tokio::test]
    async fn create_then_reveal_round_trips() {
        let (vault, ctx, org) = vault_and_org().await;
        let record = vault
            .create(&ctx, org, "slack", "default", b"xoxb-token")
            .await
            .unwrap();
        assert_eq!(record.kek_id, "kek-1");
        assert_ne!(record.secret_ciphertext, b"xoxb-token");

        let (_, plaintext) = vault.reveal(&ctx, org, record.id).await.unwrap();
        assert_eq!(plaintext, b"xoxb-token");
    }

    #[tokio::test]
    async fn unknown_connector_is_rejected() {
        let (vault, ctx, org) = vault_and_org().await;
        assert!(matches!(
            vault.create(&ctx, org, "fax-machine", "default", b"x").await,
            Err(VaultError::UnknownConnector { .. })
        ));
    }

    #[tokio::test]
    async fn duplicate_name_conflicts() {
        let (vault, ctx, org) = vault_and_org().await;
        vault
            .create(&ctx, org, "slack", "default", b"one")
            .await
            .unwrap();
        assert!(matches!(
            vault.create(&ctx, org, "slack", "default", b"two").await,
            Err(VaultError::AlreadyExists)
        ));
    }

    #[tokio::test]
    async fn rotation_replaces_ciphertext_but_not_identity() {
        let (vault, ctx, org) = vault_and_org().await;
        let before = vault
            .create(&ctx, org, "slack", "default", b"old")
            .await
            .unwrap();
        let after = vault.rotate(&ctx, org, before.id, b"new").await.unwrap();
        assert_eq!(after.id, before.id);
        assert_eq!(after.connector_id, before.connector_id);
        assert_eq!(after.name, before.name);
        assert_ne!(after.secret_ciphertext, before.secret_ciphertext);
        assert_ne!(after.dek_ciphertext, before.dek_ciphertext);

        let (_, plaintext) = vault.reveal(&ctx, org, before.id).await.unwrap();
        assert_eq!(plaintext, b"new");
    }

    #[tokio::test]
    async fn upsert_rotates_an_existing_default() {
        let (vault, ctx, org) = vault_and_org().await;
        let first = vault
            .upsert(&ctx, org, "llm.vertex.oauth", "default", b"rt-1")
            .await
            .unwrap();
        let second = vault
            .upsert(&ctx, org, "llm.vertex.oauth", "default", b"rt-2")
            .await
            .unwrap();
        assert_eq!(first.id, second.id);
        let (_, plaintext) = vault.reveal(&ctx, org, first.id).await.unwrap();
        assert_eq!(plaintext, b"rt-2");
        assert_eq!(vault.list(&ctx, org).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn unconfigured_vault_refuses() {
        let store = Arc::new(InMemoryStore::new());
        let vault = SecretVault::new(store, None);
        let ctx = TenantContext::org(Uuid::new_v4(), Uuid::new_v4());
        assert!(matches!(
            vault.create(&ctx, Uuid::new_v4(), "slack", "x", b"v").await,
            Err(VaultError::NotConfigured)
        ));
    }

    #[tokio::test]
    async fn delete_removes_the_wrapped_row() {
        let (vault, ctx, org) = vault_and_org().await;
        let record = vault
            .create(&ctx, org, "github", "ci", b"ghp_x")
            .await
            .unwrap();
        vault.delete(&ctx, org, record.id).await.unwrap();
        assert!(matches!(
            vault.reveal(&ctx, org, record.id).await,
            Err(VaultError::NotFound)
        ));
    }
}
