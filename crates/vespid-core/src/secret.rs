// SPDX-License-Identifier: MIT OR Apache-2.0
//! Connector secrets — the persisted, envelope-encrypted form only.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The wrapped form of a connector secret. Plaintext never appears here;
/// only the vault can open the envelope.
///
/// `(organization_id, connector_id, name)` is unique.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectorSecretRecord {
    /// Unique identifier.
    pub id: Uuid,
    /// Owning organization.
    pub organization_id: Uuid,
    /// Connector this credential belongs to (catalog-validated).
    pub connector_id: String,
    /// Caller-chosen name, unique per `(org, connector)`.
    pub name: String,
    /// KEK the DEK is sealed under.
    pub kek_id: String,
    /// Sealed DEK.
    #[serde(skip)]
    pub dek_ciphertext: Vec<u8>,
    /// DEK seal nonce.
    #[serde(skip)]
    pub dek_iv: Vec<u8>,
    /// DEK seal tag.
    #[serde(skip)]
    pub dek_tag: Vec<u8>,
    /// Sealed payload.
    #[serde(skip)]
    pub secret_ciphertext: Vec<u8>,
    /// Payload seal nonce.
    #[serde(skip)]
    pub secret_iv: Vec<u8>,
    /// Payload seal tag.
    #[serde(skip)]
    pub secret_tag: Vec<u8>,
    /// Creating user.
    pub created_by: Uuid,
    /// Last rotating user.
    pub updated_by: Uuid,
    /// Creation instant.
    pub created_at: DateTime<Utc>,
    /// Last rotation instant.
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ciphertext_fields_never_serialize() {
        let record = ConnectorSecretRecord {
            id: Uuid::new_v4(),
            organization_id: Uuid::new_v4(),
            connector_id: "slack".into(),
            name: "default".into(),
            kek_id: "kek-1".into(),
            dek_ciphertext: vec![1, 2, 3],
            dek_iv: vec![4; 12],
            dek_tag: vec![5; 16],
            secret_ciphertext: vec![6, 7, 8],
            secret_iv: vec![9; 12],
            secret_tag: vec![10; 16],
            created_by: Uuid::new_v4(),
            updated_by: Uuid::new_v4(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let rendered = serde_json::to_value(&record).unwrap();
        assert!(rendered.get("dekCiphertext").is_none());
        assert!(rendered.get("secretCiphertext").is_none());
        assert_eq!(rendered["connectorId"], "slack");
        assert_eq!(rendered["kekId"], "kek-1");
    }
}
