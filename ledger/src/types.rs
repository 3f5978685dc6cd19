use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    /// Markers bought with real money, credited after provider verification
    Purchase,
    /// Markers consumed by a gated action
    Spend,
    /// Promotional grant (signup bonus etc.)
    Bonus,
    /// Support-driven compensation
    Refund,
}

/// One append-only ledger entry. Never updated or deleted; the wallet
/// balance is a materialized projection of these.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: u64,
    pub user_id: String,
    /// Signed marker delta (negative for spends)
    pub amount: i64,
    pub kind: TransactionKind,
    /// Provider transaction id for purchase credits; doubles as the
    /// idempotency key so one payment can credit at most once
    pub external_ref: Option<String>,
    pub description: String,
    /// Raw provider receipt, kept for audit
    pub metadata: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalletSnapshot {
    pub user_id: String,
    pub balance: u32,
    pub updated_at: DateTime<Utc>,
}

/// Result of a successful debit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DebitReceipt {
    pub cost: u32,
    pub new_balance: u32,
}

/// Result of a credit attempt. `credited` is false when the external_ref
/// had already been applied; `new_balance` then reports the balance
/// computed when the credit first landed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreditOutcome {
    pub new_balance: u32,
    pub credited: bool,
}
