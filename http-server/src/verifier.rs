use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use thiserror::Error;

use ledger::catalog::ProductCatalog;
use ledger::error::LedgerError;
use ledger::types::CreditOutcome;
use ledger::wallet::WalletStore;

/// Payment record as reported by the card provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CardPayment {
    pub payment_id: String,
    /// Order id the client declared when opening the checkout
    pub order_id: String,
    /// Provider-side status: "paid", "ready", "failed", "cancelled"
    pub status: String,
    /// Amount actually charged, in KRW
    pub amount: u32,
}

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("payment not found")]
    NotFound,
    #[error("provider unavailable: {0}")]
    Unavailable(String),
}

/// Synchronous payment-status lookup at the card provider. The REST
/// implementation talks to the real provider; tests register payments on
/// the static one.
#[async_trait]
pub trait CardProvider: Send + Sync {
    async fn lookup_payment(&self, payment_id: &str) -> Result<CardPayment, ProviderError>;
}

#[derive(Debug, Error)]
pub enum VerifyError {
    #[error("unknown product id {0}")]
    InvalidProduct(u32),

    #[error("payment not found at provider")]
    PaymentNotFound,

    #[error("card provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("payment status is '{0}', expected 'paid'")]
    NotPaid(String),

    #[error("paid amount {paid} does not match product price {expected}")]
    AmountMismatch { paid: u32, expected: u32 },

    #[error("order id does not match the payment")]
    OrderMismatch,

    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

impl VerifyError {
    /// Stable error code surfaced to API clients.
    pub fn code(&self) -> &'static str {
        match self {
            VerifyError::InvalidProduct(_) => "invalid_product",
            VerifyError::PaymentNotFound => "payment_not_found",
            VerifyError::ProviderUnavailable(_) => "server_error",
            VerifyError::NotPaid(_) => "payment_not_paid",
            VerifyError::AmountMismatch { .. } => "amount_mismatch",
            VerifyError::OrderMismatch => "order_mismatch",
            VerifyError::Ledger(_) => "server_error",
        }
    }
}

/// A verified purchase that has been credited to the wallet.
#[derive(Debug, Clone, Copy)]
pub struct VerifiedPurchase {
    pub outcome: CreditOutcome,
    pub markers: u32,
}

/// Confirms an external payment claim against its provider before any
/// credit is authorized. Every gate here is a fraud check: a failed gate
/// rejects, it never credits.
#[derive(Clone)]
pub struct PaymentVerifier {
    provider: Arc<dyn CardProvider>,
    wallets: WalletStore,
    catalog: Arc<ProductCatalog>,
}

impl PaymentVerifier {
    pub fn new(
        provider: Arc<dyn CardProvider>,
        wallets: WalletStore,
        catalog: Arc<ProductCatalog>,
    ) -> Self {
        PaymentVerifier {
            provider,
            wallets,
            catalog,
        }
    }

    /// Card path: look the payment up at the provider and gate on status,
    /// paid amount, and the declared order id. On success the ledger credit
    /// is keyed by the provider payment id, so a re-verify cannot apply
    /// twice.
    pub async fn verify_card_purchase(
        &self,
        user_id: &str,
        payment_id: &str,
        order_id: &str,
        product_id: u32,
    ) -> Result<VerifiedPurchase, VerifyError> {
        let product = self
            .catalog
            .by_id(product_id)
            .ok_or(VerifyError::InvalidProduct(product_id))?;

        let payment = self
            .provider
            .lookup_payment(payment_id)
            .await
            .map_err(|err| match err {
                ProviderError::NotFound => VerifyError::PaymentNotFound,
                ProviderError::Unavailable(msg) => VerifyError::ProviderUnavailable(msg),
            })?;

        if payment.status != "paid" {
            return Err(VerifyError::NotPaid(payment.status));
        }
        if payment.amount != product.price {
            return Err(VerifyError::AmountMismatch {
                paid: payment.amount,
                expected: product.price,
            });
        }
        if payment.order_id != order_id {
            return Err(VerifyError::OrderMismatch);
        }

        let markers = product.total_markers();
        let receipt = serde_json::to_value(&payment).ok();
        let outcome =
            self.wallets
                .credit(user_id, markers, payment_id, &product.store_code, receipt)?;

        tracing::info!(
            "card purchase verified: user={} payment={} markers={} credited={}",
            user_id,
            payment_id,
            markers,
            outcome.credited
        );

        Ok(VerifiedPurchase { outcome, markers })
    }
}

/// reqwest-backed provider client: exchanges API credentials for a token,
/// then fetches the payment record.
pub struct RestCardProvider {
    base_url: String,
    api_key: String,
    api_secret: String,
    http: reqwest::Client,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Deserialize)]
struct PaymentEnvelope {
    code: i32,
    response: Option<CardPayment>,
}

impl RestCardProvider {
    pub fn new(base_url: String, api_key: String, api_secret: String) -> Self {
        RestCardProvider {
            base_url,
            api_key,
            api_secret,
            http: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl CardProvider for RestCardProvider {
    async fn lookup_payment(&self, payment_id: &str) -> Result<CardPayment, ProviderError> {
        let token: TokenResponse = self
            .http
            .post(format!("{}/token", self.base_url))
            .json(&serde_json::json!({
                "api_key": self.api_key,
                "api_secret": self.api_secret,
            }))
            .send()
            .await
            .map_err(|e| ProviderError::Unavailable(e.to_string()))?
            .json()
            .await
            .map_err(|e| ProviderError::Unavailable(e.to_string()))?;

        let response = self
            .http
            .get(format!("{}/payments/{}", self.base_url, payment_id))
            .header("Authorization", token.access_token)
            .send()
            .await
            .map_err(|e| ProviderError::Unavailable(e.to_string()))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(ProviderError::NotFound);
        }

        let envelope: PaymentEnvelope = response
            .json()
            .await
            .map_err(|e| ProviderError::Unavailable(e.to_string()))?;

        match envelope.response {
            Some(payment) if envelope.code == 0 => Ok(payment),
            _ => Err(ProviderError::NotFound),
        }
    }
}

/// In-memory provider for dev mode and tests.
#[derive(Clone)]
pub struct StaticCardProvider {
    payments: Arc<Mutex<HashMap<String, CardPayment>>>,
}

impl StaticCardProvider {
    pub fn new() -> Self {
        StaticCardProvider {
            payments: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn register(&self, payment: CardPayment) {
        let mut payments = self.payments.lock().unwrap();
        payments.insert(payment.payment_id.clone(), payment);
    }
}

#[async_trait]
impl CardProvider for StaticCardProvider {
    async fn lookup_payment(&self, payment_id: &str) -> Result<CardPayment, ProviderError> {
        let payments = self.payments.lock().unwrap();
        payments
            .get(payment_id)
            .cloned()
            .ok_or(ProviderError::NotFound)
    }
}
