// SPDX-License-Identifier: MIT OR Apache-2.0
//! Organization credit balances and the append-only ledger.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Why a ledger entry exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum CreditReason {
    /// Paid top-up applied from a payment-processor webhook.
    StripeTopUp,
    /// Consumption debited for a workflow run.
    WorkflowRun,
    /// Manual adjustment by an operator.
    Adjustment,
}

/// Current balance for an organization.
///
/// Invariant: `balance_credits` equals the sum of the org's ledger deltas,
/// and never goes negative.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrganizationCredits {
    /// Organization.
    pub organization_id: Uuid,
    /// Current balance.
    pub balance_credits: i64,
    /// Last change instant.
    pub updated_at: DateTime<Utc>,
}

/// One append-only ledger row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreditLedgerEntry {
    /// Unique identifier.
    pub id: Uuid,
    /// Organization.
    pub organization_id: Uuid,
    /// Signed credit delta.
    pub delta_credits: i64,
    /// Why the delta was applied.
    pub reason: CreditReason,
    /// Payment-processor event id; unique when present (at-most-once).
    pub stripe_event_id: Option<String>,
    /// Run that consumed the credits, for debits.
    pub workflow_run_id: Option<Uuid>,
    /// Acting user, when user-initiated.
    pub created_by: Option<Uuid>,
    /// Free-form annotations.
    pub metadata: Value,
    /// Creation instant.
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ledger_entry_serializes_with_camel_case_keys() {
        let entry = CreditLedgerEntry {
            id: Uuid::new_v4(),
            organization_id: Uuid::new_v4(),
            delta_credits: 500,
            reason: CreditReason::StripeTopUp,
            stripe_event_id: Some("evt_1".into()),
            workflow_run_id: None,
            created_by: None,
            metadata: serde_json::json!({}),
            created_at: Utc::now(),
        };
        let rendered = serde_json::to_value(&entry).unwrap();
        assert_eq!(rendered["deltaCredits"], 500);
        assert_eq!(rendered["stripeEventId"], "evt_1");
        assert_eq!(rendered["reason"], "stripe_top_up");
    }
}
