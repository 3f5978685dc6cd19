use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use ledger::types::Transaction;

use crate::error::ClientError;

/// Most entries kept in the local history mirror.
pub const MAX_CACHED_TRANSACTIONS: usize = 50;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct CacheFile {
    balance: u32,
    transactions: Vec<Transaction>,
}

/// Local mirror of the wallet for display and pre-flight checks. Never
/// authoritative: it is only written from server responses, and any
/// optimistic value is overwritten by the next resync.
pub struct WalletCache {
    balance: u32,
    /// Most recent first
    transactions: Vec<Transaction>,
    path: PathBuf,
}

impl WalletCache {
    /// Load the persisted mirror, or start empty if none exists yet.
    pub fn load(path: &Path) -> Self {
        let state = fs::read(path)
            .ok()
            .and_then(|bytes| serde_json::from_slice::<CacheFile>(&bytes).ok())
            .unwrap_or_default();

        WalletCache {
            balance: state.balance,
            transactions: state.transactions,
            path: path.to_path_buf(),
        }
    }

    pub fn balance(&self) -> u32 {
        self.balance
    }

    pub fn transactions(&self) -> &[Transaction] {
        &self.transactions
    }

    /// Overwrite with the server's authoritative state. Server value
    /// always wins, including over any optimistic credit.
    pub fn apply_resync(
        &mut self,
        balance: u32,
        transactions: Vec<Transaction>,
    ) -> Result<(), ClientError> {
        self.balance = balance;
        self.transactions = transactions;
        self.transactions.truncate(MAX_CACHED_TRANSACTIONS);
        self.persist()
    }

    /// Record the balance returned directly by a spend or credit call.
    pub fn apply_server_balance(&mut self, balance: u32) -> Result<(), ClientError> {
        self.balance = balance;
        self.persist()
    }

    /// Optimistically reflect markers the server has not confirmed yet.
    /// Display-only: no transaction is fabricated, and the next resync
    /// replaces this value.
    pub fn apply_optimistic_credit(&mut self, markers: u32) -> Result<(), ClientError> {
        self.balance += markers;
        self.persist()
    }

    fn persist(&self) -> Result<(), ClientError> {
        let state = CacheFile {
            balance: self.balance,
            transactions: self.transactions.clone(),
        };
        let bytes =
            serde_json::to_vec(&state).map_err(|e| ClientError::Storage(e.to_string()))?;
        fs::write(&self.path, bytes).map_err(|e| ClientError::Storage(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use ledger::types::TransactionKind;

    fn tx(id: u64, amount: i64) -> Transaction {
        Transaction {
            id,
            user_id: "user-1".to_string(),
            amount,
            kind: TransactionKind::Spend,
            external_ref: None,
            description: "friend_request".to_string(),
            metadata: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_cache_survives_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wallet.json");

        let mut cache = WalletCache::load(&path);
        assert_eq!(cache.balance(), 0);
        cache.apply_resync(7, vec![tx(1, -3)]).unwrap();

        let reloaded = WalletCache::load(&path);
        assert_eq!(reloaded.balance(), 7);
        assert_eq!(reloaded.transactions().len(), 1);
    }

    #[test]
    fn test_resync_overwrites_optimistic_value() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wallet.json");

        let mut cache = WalletCache::load(&path);
        cache.apply_resync(10, Vec::new()).unwrap();
        cache.apply_optimistic_credit(35).unwrap();
        assert_eq!(cache.balance(), 45);

        // Server did not actually credit; resync wins
        cache.apply_resync(10, Vec::new()).unwrap();
        assert_eq!(cache.balance(), 10);
    }

    #[test]
    fn test_history_is_bounded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wallet.json");

        let mut cache = WalletCache::load(&path);
        let many: Vec<Transaction> = (0..80).map(|i| tx(i, -1)).collect();
        cache.apply_resync(0, many).unwrap();

        assert_eq!(cache.transactions().len(), MAX_CACHED_TRANSACTIONS);
        // Most recent first ordering is preserved from the server response
        assert_eq!(cache.transactions()[0].id, 0);
    }
}
