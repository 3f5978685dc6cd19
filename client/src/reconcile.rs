use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep, timeout};

use crate::api::{CreditResult, LedgerApi, PurchaseStatus};
use crate::cache::{MAX_CACHED_TRANSACTIONS, WalletCache};
use crate::error::ClientError;
use crate::pending::{LoadedPending, PendingPurchase, PendingPurchaseStore};

/// Lifecycle of a pending purchase on the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingState {
    Initiated,
    AwaitingVerification,
    Cleared,
    Abandoned,
}

/// What recovery found at session start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryOutcome {
    Nothing,
    /// Record was past the TTL and has been discarded (manual support)
    Abandoned,
    /// Record kept; the credit has not landed server-side yet
    StillPending,
    /// Server had already credited; the record is cleared
    Recovered { markers: u32 },
}

/// Polling parameters for the store (webhook-driven) path.
#[derive(Debug, Clone, Copy)]
pub struct PollPolicy {
    pub base_interval: Duration,
    /// Backoff cap for the interval
    pub max_interval: Duration,
    /// Per-attempt request timeout
    pub attempt_timeout: Duration,
    /// Overall polling ceiling
    pub ceiling: Duration,
    pub max_consecutive_errors: u32,
}

impl Default for PollPolicy {
    fn default() -> Self {
        PollPolicy {
            base_interval: Duration::from_secs(2),
            max_interval: Duration::from_secs(4),
            attempt_timeout: Duration::from_secs(5),
            ceiling: Duration::from_secs(15),
            max_consecutive_errors: 3,
        }
    }
}

/// Awaitable, cancellable handle on a confirmation polling task.
pub struct ConfirmationHandle {
    join: JoinHandle<Result<PendingState, ClientError>>,
}

impl ConfirmationHandle {
    pub fn cancel(&self) {
        self.join.abort();
    }

    /// Resolves to None if the task was cancelled.
    pub async fn wait(self) -> Option<Result<PendingState, ClientError>> {
        self.join.await.ok()
    }
}

/// Bridges the latency between a client-observed payment success and the
/// server-side authoritative credit. Owns the resync and recovery logic;
/// the server's balance always wins over local optimism.
#[derive(Clone)]
pub struct ReconciliationAgent {
    api: Arc<dyn LedgerApi>,
    cache: Arc<Mutex<WalletCache>>,
    pending: Arc<PendingPurchaseStore>,
}

impl ReconciliationAgent {
    pub fn new(
        api: Arc<dyn LedgerApi>,
        cache: Arc<Mutex<WalletCache>>,
        pending: Arc<PendingPurchaseStore>,
    ) -> Self {
        ReconciliationAgent {
            api,
            cache,
            pending,
        }
    }

    /// Full unconditional resync: the cache is overwritten with the
    /// server's balance and history, replacing any optimistic value.
    pub async fn resync(&self) -> Result<u32, ClientError> {
        let balance = self.api.balance().await?;
        let transactions = self
            .api
            .recent_transactions(MAX_CACHED_TRANSACTIONS)
            .await?;

        let mut cache = self.cache.lock().unwrap();
        cache.apply_resync(balance, transactions)?;
        Ok(balance)
    }

    /// Card path: block on the bounded verification call. The pending
    /// record is cleared only once the server confirms the credit; on a
    /// network failure we cannot know whether the credit landed, so the
    /// record stays and the purchase resolves on a later resync.
    pub async fn finish_card_purchase(
        &self,
        record: &PendingPurchase,
        order_id: &str,
    ) -> Result<CreditResult, ClientError> {
        match self
            .api
            .verify_card_payment(&record.external_ref, order_id, record.product_id)
            .await
        {
            Ok(result) => {
                self.pending.clear_matching(&record.external_ref);
                {
                    let mut cache = self.cache.lock().unwrap();
                    cache.apply_server_balance(result.new_balance)?;
                }
                if let Err(err) = self.resync().await {
                    tracing::debug!("post-purchase resync failed: {}", err);
                }
                Ok(result)
            }
            Err(ClientError::Network(msg)) => {
                tracing::warn!("verification unreachable, keeping pending record: {}", msg);
                Err(ClientError::PendingConfirmation)
            }
            // Terminal rejection: no credit. The record stays until the
            // TTL so a wrongly-charged user still has a support trail.
            Err(err) => Err(err),
        }
    }

    /// Store path: poll the status endpoint until the webhook-driven
    /// credit lands or the ceiling is hit. Hitting the ceiling is not a
    /// failure: the expected markers are shown optimistically, the record
    /// stays, and the next resync restores the server's truth.
    pub async fn await_store_confirmation(
        &self,
        record: &PendingPurchase,
        policy: &PollPolicy,
    ) -> Result<PendingState, ClientError> {
        let deadline = Instant::now() + policy.ceiling;
        let mut interval = policy.base_interval;
        let mut consecutive_errors = 0u32;

        loop {
            match timeout(
                policy.attempt_timeout,
                self.api.purchase_status(&record.external_ref),
            )
            .await
            {
                Ok(Ok(PurchaseStatus::Verified)) => {
                    self.pending.clear_matching(&record.external_ref);
                    if let Err(err) = self.resync().await {
                        tracing::debug!("post-confirmation resync failed: {}", err);
                    }
                    return Ok(PendingState::Cleared);
                }
                Ok(Ok(PurchaseStatus::Pending)) => {
                    consecutive_errors = 0;
                }
                Ok(Err(err)) => {
                    consecutive_errors += 1;
                    tracing::debug!("status poll failed: {}", err);
                    if consecutive_errors >= policy.max_consecutive_errors {
                        break;
                    }
                }
                Err(_) => {
                    consecutive_errors += 1;
                    if consecutive_errors >= policy.max_consecutive_errors {
                        break;
                    }
                }
            }

            if Instant::now() + interval >= deadline {
                break;
            }
            sleep(interval).await;
            interval = (interval * 2).min(policy.max_interval);
        }

        // Ceiling reached without confirmation. No transaction is
        // fabricated; this is display-only optimism.
        {
            let mut cache = self.cache.lock().unwrap();
            cache.apply_optimistic_credit(record.markers_expected)?;
        }
        tracing::info!(
            "purchase {} still unconfirmed after polling ceiling",
            record.external_ref
        );
        Ok(PendingState::AwaitingVerification)
    }

    /// Spawn the store-path polling as a cancellable background task.
    pub fn spawn_store_confirmation(
        &self,
        record: PendingPurchase,
        policy: PollPolicy,
    ) -> ConfirmationHandle {
        let agent = self.clone();
        let join =
            tokio::spawn(async move { agent.await_store_confirmation(&record, &policy).await });
        ConfirmationHandle { join }
    }

    /// Session-start recovery: re-read the persisted pending record,
    /// discard it past the TTL, otherwise ask the server whether the
    /// credit already landed. Ends with the unconditional start-of-session
    /// resync either way.
    pub async fn recover_on_start(&self) -> Result<RecoveryOutcome, ClientError> {
        let outcome = match self.pending.load() {
            LoadedPending::Empty => RecoveryOutcome::Nothing,
            LoadedPending::Expired(record) => {
                tracing::warn!(
                    "abandoning pending purchase {} past TTL",
                    record.external_ref
                );
                RecoveryOutcome::Abandoned
            }
            LoadedPending::Active(record) => {
                match self.api.purchase_status(&record.external_ref).await {
                    Ok(PurchaseStatus::Verified) => {
                        self.pending.clear_matching(&record.external_ref);
                        RecoveryOutcome::Recovered {
                            markers: record.markers_expected,
                        }
                    }
                    Ok(PurchaseStatus::Pending) => RecoveryOutcome::StillPending,
                    Err(err) => {
                        tracing::debug!("recovery status check failed: {}", err);
                        RecoveryOutcome::StillPending
                    }
                }
            }
        };

        // Offline start keeps the last persisted cache; the next
        // successful resync overwrites it.
        if let Err(err) = self.resync().await {
            tracing::debug!("session-start resync failed: {}", err);
        }

        Ok(outcome)
    }
}
