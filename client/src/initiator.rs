use async_trait::async_trait;
use chrono::Utc;
use rand::{Rng, distributions::Alphanumeric};

use ledger::catalog::Product;

use crate::error::ClientError;
use crate::pending::{PendingPurchase, PendingPurchaseStore};

/// Which provider flow a purchase goes through, selected by platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PurchasePath {
    /// Browser: hosted card checkout, verified synchronously afterwards
    CardCheckout,
    /// Native app: system purchase sheet, credited by the store webhook
    StoreSheet,
}

/// Reference handed back by the provider once the charge settles on the
/// client side.
#[derive(Debug, Clone)]
pub struct ProviderReference {
    pub external_ref: String,
}

/// Provider-specific purchase UI flow (checkout redirect or native sheet).
/// Out of scope here beyond the reference it yields.
#[async_trait]
pub trait PurchaseFlow: Send + Sync {
    fn path(&self) -> PurchasePath;

    async fn run(
        &self,
        product: &Product,
        order_id: &str,
    ) -> Result<ProviderReference, ClientError>;
}

#[derive(Debug, Clone)]
pub struct InitiatedPurchase {
    pub pending: PendingPurchase,
    pub order_id: String,
}

/// Unique order id declared to the provider, later cross-checked by the
/// server against the payment record.
pub fn generate_order_id(product_id: u32) -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(6)
        .map(char::from)
        .collect();
    format!(
        "GP_{}_{}_{}",
        Utc::now().timestamp_millis(),
        product_id,
        suffix.to_lowercase()
    )
}

/// Run the provider flow and persist the pending record the moment a
/// transaction reference exists, before any server confirmation. A crash
/// between "charged" and "credited" is then recoverable on next start.
pub async fn begin_purchase(
    flow: &dyn PurchaseFlow,
    product: &Product,
    pending_store: &PendingPurchaseStore,
) -> Result<InitiatedPurchase, ClientError> {
    let order_id = generate_order_id(product.id);
    let reference = flow.run(product, &order_id).await?;

    let record = PendingPurchase {
        external_ref: reference.external_ref,
        product_id: product.id,
        markers_expected: product.total_markers(),
        started_at: Utc::now(),
    };
    pending_store.save(&record)?;

    tracing::debug!(
        "purchase initiated: order={} ref={} markers={}",
        order_id,
        record.external_ref,
        record.markers_expected
    );

    Ok(InitiatedPurchase {
        pending: record,
        order_id,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pending::LoadedPending;
    use ledger::catalog::ProductCatalog;

    struct HappyFlow;

    #[async_trait]
    impl PurchaseFlow for HappyFlow {
        fn path(&self) -> PurchasePath {
            PurchasePath::CardCheckout
        }

        async fn run(
            &self,
            _product: &Product,
            _order_id: &str,
        ) -> Result<ProviderReference, ClientError> {
            Ok(ProviderReference {
                external_ref: "pay_1".to_string(),
            })
        }
    }

    struct CancelledFlow;

    #[async_trait]
    impl PurchaseFlow for CancelledFlow {
        fn path(&self) -> PurchasePath {
            PurchasePath::StoreSheet
        }

        async fn run(
            &self,
            _product: &Product,
            _order_id: &str,
        ) -> Result<ProviderReference, ClientError> {
            Err(ClientError::VerificationFailed("cancelled".to_string()))
        }
    }

    #[tokio::test]
    async fn test_pending_record_saved_before_any_confirmation() {
        let dir = tempfile::tempdir().unwrap();
        let store = PendingPurchaseStore::new(&dir.path().join("pending.json"));
        let catalog = ProductCatalog::standard();
        let product = catalog.by_id(3).unwrap();

        let initiated = begin_purchase(&HappyFlow, product, &store).await.unwrap();

        assert_eq!(initiated.pending.external_ref, "pay_1");
        assert_eq!(initiated.pending.markers_expected, 35);
        assert!(matches!(store.load(), LoadedPending::Active(_)));
    }

    #[tokio::test]
    async fn test_no_record_when_flow_fails() {
        let dir = tempfile::tempdir().unwrap();
        let store = PendingPurchaseStore::new(&dir.path().join("pending.json"));
        let catalog = ProductCatalog::standard();
        let product = catalog.by_id(1).unwrap();

        let result = begin_purchase(&CancelledFlow, product, &store).await;

        assert!(result.is_err());
        assert_eq!(store.load(), LoadedPending::Empty);
    }

    #[test]
    fn test_order_id_carries_product_and_is_unique() {
        let first = generate_order_id(3);
        let second = generate_order_id(3);

        assert!(first.starts_with("GP_"));
        assert!(first.contains("_3_"));
        assert_ne!(first, second);
    }
}
