use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::error::LedgerError;
use crate::prices::PriceTable;
use crate::types::{CreditOutcome, DebitReceipt, Transaction, TransactionKind, WalletSnapshot};

/// Markers granted when a wallet is first opened.
pub const SIGNUP_BONUS: u32 = 10;

struct WalletAccount {
    balance: u32,
    updated_at: DateTime<Utc>,
    /// Append-only, oldest first
    transactions: Vec<Transaction>,
}

struct StoreInner {
    wallets: HashMap<String, WalletAccount>,
    /// external_ref -> outcome computed when the credit first applied.
    /// A ref present here can never credit again.
    applied_refs: HashMap<String, CreditOutcome>,
    tx_id_counter: u64,
}

/// In-memory authoritative wallet store.
///
/// Every mutation runs under one mutex, so a debit's check-and-decrement
/// and a credit's ref-check-and-increment are each a single atomic step.
/// Concurrent calls against the same wallet serialize instead of racing
/// on a read-then-write.
#[derive(Clone)]
pub struct WalletStore {
    inner: Arc<Mutex<StoreInner>>,
}

impl WalletStore {
    pub fn new() -> Self {
        WalletStore {
            inner: Arc::new(Mutex::new(StoreInner {
                wallets: HashMap::new(),
                applied_refs: HashMap::new(),
                tx_id_counter: 0,
            })),
        }
    }

    /// Get or create the wallet for a user. A new wallet starts with the
    /// signup bonus, recorded as a Bonus transaction.
    pub fn open_wallet(&self, user_id: &str) -> WalletSnapshot {
        let mut inner = self.inner.lock().unwrap();

        if !inner.wallets.contains_key(user_id) {
            let now = Utc::now();
            let tx_id = inner.next_tx_id();
            inner.wallets.insert(
                user_id.to_string(),
                WalletAccount {
                    balance: SIGNUP_BONUS,
                    updated_at: now,
                    transactions: vec![Transaction {
                        id: tx_id,
                        user_id: user_id.to_string(),
                        amount: SIGNUP_BONUS as i64,
                        kind: TransactionKind::Bonus,
                        external_ref: None,
                        description: "signup bonus".to_string(),
                        metadata: None,
                        created_at: now,
                    }],
                },
            );
        }

        let wallet = &inner.wallets[user_id];
        WalletSnapshot {
            user_id: user_id.to_string(),
            balance: wallet.balance,
            updated_at: wallet.updated_at,
        }
    }

    /// Atomically check the balance against the current table price and
    /// decrement if sufficient. The client never supplies the cost.
    pub fn debit(
        &self,
        user_id: &str,
        action_type: &str,
        prices: &PriceTable,
    ) -> Result<DebitReceipt, LedgerError> {
        let cost = prices
            .cost(action_type)
            .ok_or_else(|| LedgerError::InvalidAction(action_type.to_string()))?;

        let mut inner = self.inner.lock().unwrap();
        let tx_id = inner.next_tx_id();
        let wallet = inner
            .wallets
            .get_mut(user_id)
            .ok_or_else(|| LedgerError::WalletNotFound(user_id.to_string()))?;

        if wallet.balance < cost {
            return Err(LedgerError::InsufficientFunds {
                balance: wallet.balance,
                cost,
            });
        }

        let now = Utc::now();
        wallet.balance -= cost;
        wallet.updated_at = now;
        wallet.transactions.push(Transaction {
            id: tx_id,
            user_id: user_id.to_string(),
            amount: -(cost as i64),
            kind: TransactionKind::Spend,
            external_ref: None,
            description: action_type.to_string(),
            metadata: None,
            created_at: now,
        });

        Ok(DebitReceipt {
            cost,
            new_balance: wallet.balance,
        })
    }

    /// Apply a verified purchase credit. Idempotent on `external_ref`:
    /// a duplicate delivery returns the outcome computed when the credit
    /// first landed, with `credited: false`, and mutates nothing.
    pub fn credit(
        &self,
        user_id: &str,
        amount: u32,
        external_ref: &str,
        description: &str,
        metadata: Option<serde_json::Value>,
    ) -> Result<CreditOutcome, LedgerError> {
        let mut inner = self.inner.lock().unwrap();

        if let Some(prev) = inner.applied_refs.get(external_ref) {
            return Ok(CreditOutcome {
                new_balance: prev.new_balance,
                credited: false,
            });
        }

        let tx_id = inner.next_tx_id();
        let wallet = inner
            .wallets
            .get_mut(user_id)
            .ok_or_else(|| LedgerError::WalletNotFound(user_id.to_string()))?;

        let now = Utc::now();
        wallet.balance += amount;
        wallet.updated_at = now;
        wallet.transactions.push(Transaction {
            id: tx_id,
            user_id: user_id.to_string(),
            amount: amount as i64,
            kind: TransactionKind::Purchase,
            external_ref: Some(external_ref.to_string()),
            description: description.to_string(),
            metadata,
            created_at: now,
        });

        let outcome = CreditOutcome {
            new_balance: wallet.balance,
            credited: true,
        };
        inner
            .applied_refs
            .insert(external_ref.to_string(), outcome);
        Ok(outcome)
    }

    /// Support-driven compensation. No idempotency key; callers are
    /// internal tooling, never payment providers.
    pub fn refund(
        &self,
        user_id: &str,
        amount: u32,
        description: &str,
    ) -> Result<u32, LedgerError> {
        let mut inner = self.inner.lock().unwrap();
        let tx_id = inner.next_tx_id();
        let wallet = inner
            .wallets
            .get_mut(user_id)
            .ok_or_else(|| LedgerError::WalletNotFound(user_id.to_string()))?;

        let now = Utc::now();
        wallet.balance += amount;
        wallet.updated_at = now;
        wallet.transactions.push(Transaction {
            id: tx_id,
            user_id: user_id.to_string(),
            amount: amount as i64,
            kind: TransactionKind::Refund,
            external_ref: None,
            description: description.to_string(),
            metadata: None,
            created_at: now,
        });

        Ok(wallet.balance)
    }

    pub fn balance(&self, user_id: &str) -> Result<u32, LedgerError> {
        let inner = self.inner.lock().unwrap();
        inner
            .wallets
            .get(user_id)
            .map(|w| w.balance)
            .ok_or_else(|| LedgerError::WalletNotFound(user_id.to_string()))
    }

    pub fn snapshot(&self, user_id: &str) -> Result<WalletSnapshot, LedgerError> {
        let inner = self.inner.lock().unwrap();
        inner
            .wallets
            .get(user_id)
            .map(|w| WalletSnapshot {
                user_id: user_id.to_string(),
                balance: w.balance,
                updated_at: w.updated_at,
            })
            .ok_or_else(|| LedgerError::WalletNotFound(user_id.to_string()))
    }

    /// Most-recent-first transaction history, bounded by `limit`.
    pub fn recent_transactions(
        &self,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<Transaction>, LedgerError> {
        let inner = self.inner.lock().unwrap();
        let wallet = inner
            .wallets
            .get(user_id)
            .ok_or_else(|| LedgerError::WalletNotFound(user_id.to_string()))?;

        Ok(wallet
            .transactions
            .iter()
            .rev()
            .take(limit)
            .cloned()
            .collect())
    }

    /// Whether a provider transaction id has already credited. Drives the
    /// client's status polling.
    pub fn external_ref_applied(&self, external_ref: &str) -> bool {
        let inner = self.inner.lock().unwrap();
        inner.applied_refs.contains_key(external_ref)
    }
}

impl Default for WalletStore {
    fn default() -> Self {
        WalletStore::new()
    }
}

impl StoreInner {
    fn next_tx_id(&mut self) -> u64 {
        let id = self.tx_id_counter;
        self.tx_id_counter += 1;
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn setup_store() -> (WalletStore, PriceTable) {
        (WalletStore::new(), PriceTable::with_defaults())
    }

    fn ledger_sum(store: &WalletStore, user_id: &str) -> i64 {
        store
            .recent_transactions(user_id, usize::MAX)
            .unwrap()
            .iter()
            .map(|tx| tx.amount)
            .sum()
    }

    #[test]
    fn test_open_wallet_grants_signup_bonus() {
        let (store, _) = setup_store();
        let snapshot = store.open_wallet("user-1");

        assert_eq!(snapshot.balance, SIGNUP_BONUS);

        let txs = store.recent_transactions("user-1", 10).unwrap();
        assert_eq!(txs.len(), 1);
        assert_eq!(txs[0].kind, TransactionKind::Bonus);
        assert_eq!(txs[0].amount, SIGNUP_BONUS as i64);
    }

    #[test]
    fn test_open_wallet_is_idempotent() {
        let (store, _) = setup_store();
        store.open_wallet("user-1");
        let again = store.open_wallet("user-1");

        assert_eq!(again.balance, SIGNUP_BONUS);
        assert_eq!(store.recent_transactions("user-1", 10).unwrap().len(), 1);
    }

    #[test]
    fn test_spend_friend_request() {
        // Scenario: balance 10, friend_request costs 3
        let (store, prices) = setup_store();
        store.open_wallet("user-1");

        let receipt = store.debit("user-1", "friend_request", &prices).unwrap();
        assert_eq!(receipt.cost, 3);
        assert_eq!(receipt.new_balance, 7);

        let txs = store.recent_transactions("user-1", 1).unwrap();
        assert_eq!(txs[0].amount, -3);
        assert_eq!(txs[0].kind, TransactionKind::Spend);
    }

    #[test]
    fn test_debit_unknown_action_fails_before_any_change() {
        let (store, prices) = setup_store();
        store.open_wallet("user-1");

        let err = store.debit("user-1", "teleport", &prices).unwrap_err();
        assert_eq!(err, LedgerError::InvalidAction("teleport".to_string()));
        assert_eq!(store.balance("user-1").unwrap(), SIGNUP_BONUS);
        assert_eq!(store.recent_transactions("user-1", 10).unwrap().len(), 1);
    }

    #[test]
    fn test_debit_insufficient_funds() {
        let (store, mut prices) = setup_store();
        store.open_wallet("user-1");
        prices.set("premium_boost", 50);

        let err = store.debit("user-1", "premium_boost", &prices).unwrap_err();
        assert_eq!(
            err,
            LedgerError::InsufficientFunds {
                balance: SIGNUP_BONUS,
                cost: 50
            }
        );
        assert_eq!(store.balance("user-1").unwrap(), SIGNUP_BONUS);
    }

    #[test]
    fn test_debit_requires_existing_wallet() {
        let (store, prices) = setup_store();
        let err = store.debit("ghost", "friend_request", &prices).unwrap_err();
        assert_eq!(err, LedgerError::WalletNotFound("ghost".to_string()));
    }

    #[test]
    fn test_concurrent_debits_exactly_one_wins() {
        // Scenario: balance 3, two concurrent spends costing 3 each
        let (store, mut prices) = setup_store();
        store.open_wallet("user-1");
        prices.set("drain", 7);
        store.debit("user-1", "drain", &prices).unwrap(); // 10 -> 3

        let prices = Arc::new(prices);
        let mut handles = Vec::new();
        for _ in 0..2 {
            let store = store.clone();
            let prices = Arc::clone(&prices);
            handles.push(thread::spawn(move || {
                store.debit("user-1", "friend_request", &prices)
            }));
        }

        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        let wins = results.iter().filter(|r| r.is_ok()).count();
        assert_eq!(wins, 1);

        let winner = results.iter().find(|r| r.is_ok()).unwrap().as_ref().unwrap();
        assert_eq!(winner.new_balance, 0);

        let loser = results.iter().find(|r| r.is_err()).unwrap();
        assert!(matches!(
            loser,
            Err(LedgerError::InsufficientFunds { .. })
        ));

        assert_eq!(store.balance("user-1").unwrap(), 0);
    }

    #[test]
    fn test_concurrent_debits_never_go_negative() {
        let (store, prices) = setup_store();
        store.open_wallet("user-1"); // 10 markers, friend_request costs 3

        let prices = Arc::new(prices);
        let mut handles = Vec::new();
        for _ in 0..10 {
            let store = store.clone();
            let prices = Arc::clone(&prices);
            handles.push(thread::spawn(move || {
                store.debit("user-1", "friend_request", &prices)
            }));
        }

        let wins = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|r| r.is_ok())
            .count();

        // 10 / 3 = at most 3 successful spends
        assert_eq!(wins, 3);
        assert_eq!(store.balance("user-1").unwrap(), 1);
        assert_eq!(ledger_sum(&store, "user-1"), 1);
    }

    #[test]
    fn test_credit_is_idempotent_on_external_ref() {
        // A 30-marker pack (30 base + 5 bonus) delivered twice credits
        // exactly once
        let (store, _) = setup_store();
        store.open_wallet("user-1");

        let first = store
            .credit("user-1", 35, "txn_abc", "marker30", None)
            .unwrap();
        assert!(first.credited);
        assert_eq!(first.new_balance, SIGNUP_BONUS + 35);

        let second = store
            .credit("user-1", 35, "txn_abc", "marker30", None)
            .unwrap();
        assert!(!second.credited);
        assert_eq!(second.new_balance, SIGNUP_BONUS + 35);

        assert_eq!(store.balance("user-1").unwrap(), SIGNUP_BONUS + 35);
        assert!(store.external_ref_applied("txn_abc"));
        assert!(!store.external_ref_applied("txn_xyz"));
    }

    #[test]
    fn test_concurrent_duplicate_credits_apply_once() {
        let (store, _) = setup_store();
        store.open_wallet("user-1");

        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = store.clone();
            handles.push(thread::spawn(move || {
                store.credit("user-1", 35, "txn_dup", "marker30", None)
            }));
        }

        let credited = handles
            .into_iter()
            .map(|h| h.join().unwrap().unwrap())
            .filter(|o| o.credited)
            .count();

        assert_eq!(credited, 1);
        assert_eq!(store.balance("user-1").unwrap(), SIGNUP_BONUS + 35);
    }

    #[test]
    fn test_balance_equals_transaction_sum() {
        let (store, prices) = setup_store();
        store.open_wallet("user-1");

        store.debit("user-1", "friend_request", &prices).unwrap();
        store
            .credit("user-1", 11, "txn_1", "marker10", None)
            .unwrap();
        store.debit("user-1", "join_application", &prices).unwrap();
        store.refund("user-1", 5, "support comp").unwrap();
        store
            .credit("user-1", 11, "txn_1", "marker10", None)
            .unwrap(); // duplicate, no-op

        let balance = store.balance("user-1").unwrap() as i64;
        assert_eq!(balance, ledger_sum(&store, "user-1"));
        assert_eq!(balance, 10 - 3 + 11 - 5 + 5);
    }

    #[test]
    fn test_debit_always_uses_current_table_price() {
        let (store, mut prices) = setup_store();
        store.open_wallet("user-1");

        let before = store.debit("user-1", "friend_request", &prices).unwrap();
        assert_eq!(before.cost, 3);

        prices.set("friend_request", 4);
        let after = store.debit("user-1", "friend_request", &prices).unwrap();
        assert_eq!(after.cost, 4);
        assert_eq!(after.new_balance, 10 - 3 - 4);
    }

    #[test]
    fn test_recent_transactions_most_recent_first() {
        let (store, prices) = setup_store();
        store.open_wallet("user-1");
        store.debit("user-1", "friend_request", &prices).unwrap();
        store.debit("user-1", "join_application", &prices).unwrap();

        let txs = store.recent_transactions("user-1", 2).unwrap();
        assert_eq!(txs.len(), 2);
        assert_eq!(txs[0].description, "join_application");
        assert_eq!(txs[1].description, "friend_request");
    }

    #[test]
    fn test_refund_appends_refund_transaction() {
        let (store, _) = setup_store();
        store.open_wallet("user-1");

        let new_balance = store.refund("user-1", 5, "lost purchase comp").unwrap();
        assert_eq!(new_balance, SIGNUP_BONUS + 5);

        let txs = store.recent_transactions("user-1", 1).unwrap();
        assert_eq!(txs[0].kind, TransactionKind::Refund);
        assert_eq!(txs[0].amount, 5);
    }

    #[test]
    fn test_credit_requires_existing_wallet() {
        let (store, _) = setup_store();
        let err = store
            .credit("ghost", 35, "txn_1", "marker30", None)
            .unwrap_err();
        assert_eq!(err, LedgerError::WalletNotFound("ghost".to_string()));
        // The failed credit must not burn the ref
        assert!(!store.external_ref_applied("txn_1"));
    }
}
