use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use ledger::catalog::{Product, ProductCatalog};
use ledger::error::LedgerError;
use ledger::prices::{PriceEntry, PriceTable};
use ledger::types::{DebitReceipt, Transaction};
use ledger::wallet::WalletStore;

use crate::api::{CreditResult, LedgerApi, PurchaseStatus};
use crate::error::ClientError;

/// In-process stand-in for the ledger server, backed by the real
/// WalletStore so credits/debits behave exactly like production.
pub struct FakeApi {
    pub user_id: String,
    pub wallets: WalletStore,
    pub prices: PriceTable,
    pub catalog: ProductCatalog,
    offline: AtomicBool,
}

impl FakeApi {
    pub fn new() -> Arc<Self> {
        let wallets = WalletStore::new();
        wallets.open_wallet("user-1");
        Arc::new(FakeApi {
            user_id: "user-1".to_string(),
            wallets,
            prices: PriceTable::with_defaults(),
            catalog: ProductCatalog::standard(),
            offline: AtomicBool::new(false),
        })
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Apply the credit the store webhook would have applied server-side.
    pub fn credit_store_purchase(&self, external_ref: &str, store_code: &str) {
        let product = self.catalog.by_store_code(store_code).unwrap();
        self.wallets
            .credit(
                &self.user_id,
                product.total_markers(),
                external_ref,
                store_code,
                None,
            )
            .unwrap();
    }

    fn check_online(&self) -> Result<(), ClientError> {
        if self.offline.load(Ordering::SeqCst) {
            Err(ClientError::Network("offline".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl LedgerApi for FakeApi {
    async fn balance(&self) -> Result<u32, ClientError> {
        self.check_online()?;
        self.wallets
            .balance(&self.user_id)
            .map_err(|e| ClientError::Server(e.to_string()))
    }

    async fn recent_transactions(&self, limit: usize) -> Result<Vec<Transaction>, ClientError> {
        self.check_online()?;
        self.wallets
            .recent_transactions(&self.user_id, limit)
            .map_err(|e| ClientError::Server(e.to_string()))
    }

    async fn spend(&self, action_type: &str) -> Result<DebitReceipt, ClientError> {
        self.check_online()?;
        self.wallets
            .debit(&self.user_id, action_type, &self.prices)
            .map_err(|err| match err {
                LedgerError::InvalidAction(action) => ClientError::InvalidAction(action),
                LedgerError::InsufficientFunds { balance, cost } => {
                    ClientError::InsufficientFunds { balance, cost }
                }
                other => ClientError::Server(other.to_string()),
            })
    }

    async fn verify_card_payment(
        &self,
        payment_id: &str,
        _order_id: &str,
        product_id: u32,
    ) -> Result<CreditResult, ClientError> {
        self.check_online()?;
        let product = self
            .catalog
            .by_id(product_id)
            .ok_or_else(|| ClientError::VerificationFailed("invalid_product".to_string()))?;

        let outcome = self
            .wallets
            .credit(
                &self.user_id,
                product.total_markers(),
                payment_id,
                &product.store_code,
                None,
            )
            .map_err(|e| ClientError::Server(e.to_string()))?;

        Ok(CreditResult {
            new_balance: outcome.new_balance,
            credited: outcome.credited,
            markers: product.total_markers(),
        })
    }

    async fn purchase_status(&self, external_ref: &str) -> Result<PurchaseStatus, ClientError> {
        self.check_online()?;
        Ok(if self.wallets.external_ref_applied(external_ref) {
            PurchaseStatus::Verified
        } else {
            PurchaseStatus::Pending
        })
    }

    async fn products(&self) -> Result<Vec<Product>, ClientError> {
        self.check_online()?;
        Ok(self.catalog.all().to_vec())
    }

    async fn prices(&self) -> Result<Vec<PriceEntry>, ClientError> {
        self.check_online()?;
        Ok(self.prices.entries())
    }
}
