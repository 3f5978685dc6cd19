use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::ClientError;

/// Pending purchases older than this are handed to manual support instead
/// of being retried automatically.
pub const PENDING_TTL_HOURS: i64 = 24;

/// Locally persisted bridge between "payment succeeded at the provider"
/// and "ledger confirmed the credit". Written before any server
/// confirmation so a crash mid-purchase is recoverable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingPurchase {
    /// Provider transaction reference; the ledger's idempotency key
    pub external_ref: String,
    pub product_id: u32,
    pub markers_expected: u32,
    pub started_at: DateTime<Utc>,
}

impl PendingPurchase {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now - self.started_at > Duration::hours(PENDING_TTL_HOURS)
    }
}

/// What a load found on disk.
#[derive(Debug, Clone, PartialEq)]
pub enum LoadedPending {
    Empty,
    /// A record existed but was past the TTL; it has been discarded.
    Expired(PendingPurchase),
    Active(PendingPurchase),
}

/// Single-record store backed by one JSON file. At most one purchase is
/// in flight at a time.
pub struct PendingPurchaseStore {
    path: PathBuf,
}

impl PendingPurchaseStore {
    pub fn new(path: &Path) -> Self {
        PendingPurchaseStore {
            path: path.to_path_buf(),
        }
    }

    pub fn save(&self, record: &PendingPurchase) -> Result<(), ClientError> {
        let bytes =
            serde_json::to_vec(record).map_err(|e| ClientError::Storage(e.to_string()))?;
        fs::write(&self.path, bytes).map_err(|e| ClientError::Storage(e.to_string()))
    }

    /// Read the persisted record, discarding it unconditionally if older
    /// than the TTL. An unreadable file is treated as empty.
    pub fn load(&self) -> LoadedPending {
        let Some(record) = fs::read(&self.path)
            .ok()
            .and_then(|bytes| serde_json::from_slice::<PendingPurchase>(&bytes).ok())
        else {
            return LoadedPending::Empty;
        };

        if record.is_expired(Utc::now()) {
            tracing::warn!(
                "discarding expired pending purchase {} (needs manual support)",
                record.external_ref
            );
            self.clear();
            return LoadedPending::Expired(record);
        }

        LoadedPending::Active(record)
    }

    pub fn clear(&self) {
        let _ = fs::remove_file(&self.path);
    }

    /// Remove the persisted record only if it belongs to the given
    /// purchase. A task finishing late for an earlier purchase must not
    /// discard the record of a newer one.
    pub fn clear_matching(&self, external_ref: &str) {
        let matches = fs::read(&self.path)
            .ok()
            .and_then(|bytes| serde_json::from_slice::<PendingPurchase>(&bytes).ok())
            .is_some_and(|record| record.external_ref == external_ref);
        if matches {
            self.clear();
        }
    }
}
