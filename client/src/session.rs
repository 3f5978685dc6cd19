use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

use ledger::catalog::Product;
use ledger::types::DebitReceipt;

use crate::api::LedgerApi;
use crate::cache::WalletCache;
use crate::error::ClientError;
use crate::initiator::{PurchaseFlow, PurchasePath, begin_purchase};
use crate::pending::PendingPurchaseStore;
use crate::reconcile::{ConfirmationHandle, PollPolicy, ReconciliationAgent, RecoveryOutcome};

/// How a purchase call resolved from the caller's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PurchaseConclusion {
    /// Ledger confirmed the credit synchronously (card path).
    Completed { new_balance: u32, markers: u32 },
    /// Charge accepted; the credit lands asynchronously (store path, or a
    /// card verification that could not be reached). Confirmation
    /// continues in the background and on the next session start.
    Processing,
}

/// Per-login wallet facade: local mirror for display, pre-flight checks
/// for gated actions, and the purchase entry point. One instance per
/// signed-in user; dropped on logout.
pub struct MarkerSession {
    api: Arc<dyn LedgerApi>,
    agent: ReconciliationAgent,
    cache: Arc<Mutex<WalletCache>>,
    pending: Arc<PendingPurchaseStore>,
    prices: Mutex<HashMap<String, u32>>,
    products: Mutex<Vec<Product>>,
    poll: Mutex<Option<ConfirmationHandle>>,
    poll_policy: PollPolicy,
}

impl MarkerSession {
    /// `data_dir` holds the per-user persisted state (wallet mirror and
    /// pending-purchase record).
    pub fn new(api: Arc<dyn LedgerApi>, data_dir: &Path) -> Self {
        let cache = Arc::new(Mutex::new(WalletCache::load(&data_dir.join("wallet.json"))));
        let pending = Arc::new(PendingPurchaseStore::new(&data_dir.join("pending.json")));
        let agent =
            ReconciliationAgent::new(Arc::clone(&api), Arc::clone(&cache), Arc::clone(&pending));

        MarkerSession {
            api,
            agent,
            cache,
            pending,
            prices: Mutex::new(HashMap::new()),
            products: Mutex::new(Vec::new()),
            poll: Mutex::new(None),
            poll_policy: PollPolicy::default(),
        }
    }

    pub fn with_poll_policy(mut self, policy: PollPolicy) -> Self {
        self.poll_policy = policy;
        self
    }

    /// Session start: recover any interrupted purchase, resync the
    /// mirror, and refresh the price/product catalogs. Offline start is
    /// fine; the persisted mirror keeps serving until the next resync.
    pub async fn start(&self) -> Result<RecoveryOutcome, ClientError> {
        let outcome = self.agent.recover_on_start().await?;

        match self.api.prices().await {
            Ok(entries) => {
                let mut prices = self.prices.lock().unwrap();
                *prices = entries
                    .into_iter()
                    .map(|entry| (entry.action_type, entry.cost))
                    .collect();
            }
            Err(err) => tracing::debug!("price refresh failed: {}", err),
        }
        match self.api.products().await {
            Ok(list) => *self.products.lock().unwrap() = list,
            Err(err) => tracing::debug!("product refresh failed: {}", err),
        }

        Ok(outcome)
    }

    /// Cached balance for display. Never authoritative.
    pub fn balance(&self) -> u32 {
        self.cache.lock().unwrap().balance()
    }

    pub fn get_cost(&self, action_type: &str) -> Option<u32> {
        self.prices.lock().unwrap().get(action_type).copied()
    }

    /// Advisory pre-flight check against the cached balance, for graying
    /// out buttons. The server still enforces on spend.
    pub fn has_enough_markers(&self, action_type: &str) -> bool {
        match self.get_cost(action_type) {
            Some(cost) => self.balance() >= cost,
            None => false,
        }
    }

    pub fn products(&self) -> Vec<Product> {
        self.products.lock().unwrap().clone()
    }

    /// Spend markers on a gated action. The cached balance short-circuits
    /// an obviously-failing call, but the server's check is the real one.
    pub async fn spend(&self, action_type: &str) -> Result<DebitReceipt, ClientError> {
        if let Some(cost) = self.get_cost(action_type) {
            let balance = self.balance();
            if balance < cost {
                return Err(ClientError::InsufficientFunds { balance, cost });
            }
        }

        match self.api.spend(action_type).await {
            Ok(receipt) => {
                let mut cache = self.cache.lock().unwrap();
                cache.apply_server_balance(receipt.new_balance)?;
                Ok(receipt)
            }
            Err(ClientError::InsufficientFunds { balance, cost }) => {
                // Cache was stale; adopt the server's number
                let mut cache = self.cache.lock().unwrap();
                cache.apply_server_balance(balance)?;
                Err(ClientError::InsufficientFunds { balance, cost })
            }
            Err(err) => Err(err),
        }
    }

    /// Buy a marker pack through the given provider flow. Card checkouts
    /// resolve synchronously; store purchases return `Processing` and are
    /// confirmed by a background poll against the status endpoint.
    pub async fn purchase(
        &self,
        flow: &dyn PurchaseFlow,
        product_id: u32,
    ) -> Result<PurchaseConclusion, ClientError> {
        let product = self
            .products
            .lock()
            .unwrap()
            .iter()
            .find(|p| p.id == product_id)
            .cloned()
            .ok_or_else(|| ClientError::VerificationFailed("invalid_product".to_string()))?;

        let initiated = begin_purchase(flow, &product, &self.pending).await?;

        match flow.path() {
            PurchasePath::CardCheckout => {
                match self
                    .agent
                    .finish_card_purchase(&initiated.pending, &initiated.order_id)
                    .await
                {
                    Ok(result) => Ok(PurchaseConclusion::Completed {
                        new_balance: result.new_balance,
                        markers: result.markers,
                    }),
                    // Unreachable verification endpoint: the record is
                    // kept and the next session start resolves it.
                    Err(ClientError::PendingConfirmation) => Ok(PurchaseConclusion::Processing),
                    Err(err) => Err(err),
                }
            }
            PurchasePath::StoreSheet => {
                let handle = self
                    .agent
                    .spawn_store_confirmation(initiated.pending, self.poll_policy);
                // A poll still running for an earlier purchase is stale
                // now that its record has been replaced
                if let Some(previous) = self.poll.lock().unwrap().replace(handle) {
                    previous.cancel();
                }
                Ok(PurchaseConclusion::Processing)
            }
        }
    }

    /// Pull the server's wallet state into the mirror.
    pub async fn resync(&self) -> Result<u32, ClientError> {
        self.agent.resync().await
    }

    /// Stop any in-flight confirmation poll. The pending record stays on
    /// disk, so the purchase resolves on the next start.
    pub fn shutdown(&self) {
        if let Some(handle) = self.poll.lock().unwrap().take() {
            handle.cancel();
        }
    }

    /// Await the background confirmation poll, if one is running.
    pub async fn wait_for_confirmation(&self) -> Option<Result<crate::reconcile::PendingState, ClientError>> {
        let handle = self.poll.lock().unwrap().take();
        match handle {
            Some(handle) => handle.wait().await,
            None => None,
        }
    }
}
