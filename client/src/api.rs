use async_trait::async_trait;
use serde::Deserialize;

use ledger::catalog::Product;
use ledger::prices::PriceEntry;
use ledger::types::{DebitReceipt, Transaction};

use crate::error::ClientError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PurchaseStatus {
    Verified,
    Pending,
}

/// Outcome of a server-side credit, as seen by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CreditResult {
    pub new_balance: u32,
    pub credited: bool,
    pub markers: u32,
}

/// Transport seam to the ledger server. The reqwest implementation talks
/// HTTP; tests drive the same trait in-process.
#[async_trait]
pub trait LedgerApi: Send + Sync {
    async fn balance(&self) -> Result<u32, ClientError>;

    async fn recent_transactions(&self, limit: usize) -> Result<Vec<Transaction>, ClientError>;

    async fn spend(&self, action_type: &str) -> Result<DebitReceipt, ClientError>;

    async fn verify_card_payment(
        &self,
        payment_id: &str,
        order_id: &str,
        product_id: u32,
    ) -> Result<CreditResult, ClientError>;

    async fn purchase_status(&self, external_ref: &str) -> Result<PurchaseStatus, ClientError>;

    async fn products(&self) -> Result<Vec<Product>, ClientError>;

    async fn prices(&self) -> Result<Vec<PriceEntry>, ClientError>;
}

// Wire shapes, matching the server's response structs

#[derive(Deserialize)]
struct BalanceWire {
    balance: u32,
}

#[derive(Deserialize)]
struct TransactionsWire {
    transactions: Vec<Transaction>,
}

#[derive(Deserialize)]
struct SpendWire {
    success: bool,
    cost: Option<u32>,
    new_balance: Option<u32>,
    error: Option<String>,
    message: Option<String>,
}

#[derive(Deserialize)]
struct VerifyWire {
    success: bool,
    new_balance: Option<u32>,
    credited: Option<bool>,
    markers: Option<u32>,
    error: Option<String>,
    message: Option<String>,
}

#[derive(Deserialize)]
struct StatusWire {
    status: String,
}

pub struct HttpLedgerApi {
    base_url: String,
    session_token: String,
    http: reqwest::Client,
}

impl HttpLedgerApi {
    pub fn new(base_url: String, session_token: String) -> Self {
        HttpLedgerApi {
            base_url,
            session_token,
            http: reqwest::Client::new(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn bearer(&self) -> String {
        format!("Bearer {}", self.session_token)
    }
}

fn transport_error(err: reqwest::Error) -> ClientError {
    ClientError::Network(err.to_string())
}

#[async_trait]
impl LedgerApi for HttpLedgerApi {
    async fn balance(&self) -> Result<u32, ClientError> {
        let wire: BalanceWire = self
            .http
            .get(self.url("/wallet"))
            .header("Authorization", self.bearer())
            .send()
            .await
            .map_err(transport_error)?
            .json()
            .await
            .map_err(transport_error)?;
        Ok(wire.balance)
    }

    async fn recent_transactions(&self, limit: usize) -> Result<Vec<Transaction>, ClientError> {
        let wire: TransactionsWire = self
            .http
            .get(self.url("/wallet/transactions"))
            .query(&[("limit", limit)])
            .header("Authorization", self.bearer())
            .send()
            .await
            .map_err(transport_error)?
            .json()
            .await
            .map_err(transport_error)?;
        Ok(wire.transactions)
    }

    async fn spend(&self, action_type: &str) -> Result<DebitReceipt, ClientError> {
        let wire: SpendWire = self
            .http
            .post(self.url("/spend"))
            .header("Authorization", self.bearer())
            .json(&serde_json::json!({ "action_type": action_type }))
            .send()
            .await
            .map_err(transport_error)?
            .json()
            .await
            .map_err(transport_error)?;

        if wire.success {
            return Ok(DebitReceipt {
                cost: wire.cost.unwrap_or(0),
                new_balance: wire.new_balance.unwrap_or(0),
            });
        }

        Err(match wire.error.as_deref() {
            Some("insufficient_balance") => ClientError::InsufficientFunds {
                balance: wire.new_balance.unwrap_or(0),
                cost: wire.cost.unwrap_or(0),
            },
            Some("invalid_action") => ClientError::InvalidAction(action_type.to_string()),
            _ => ClientError::Server(wire.message.unwrap_or_else(|| "spend failed".to_string())),
        })
    }

    async fn verify_card_payment(
        &self,
        payment_id: &str,
        order_id: &str,
        product_id: u32,
    ) -> Result<CreditResult, ClientError> {
        let wire: VerifyWire = self
            .http
            .post(self.url("/purchases/verify"))
            .header("Authorization", self.bearer())
            .json(&serde_json::json!({
                "payment_id": payment_id,
                "order_id": order_id,
                "product_id": product_id,
            }))
            .send()
            .await
            .map_err(transport_error)?
            .json()
            .await
            .map_err(transport_error)?;

        if wire.success {
            return Ok(CreditResult {
                new_balance: wire.new_balance.unwrap_or(0),
                credited: wire.credited.unwrap_or(false),
                markers: wire.markers.unwrap_or(0),
            });
        }

        Err(match wire.error.as_deref() {
            Some("server_error") | None => {
                ClientError::Server(wire.message.unwrap_or_else(|| "verify failed".to_string()))
            }
            Some(code) => ClientError::VerificationFailed(code.to_string()),
        })
    }

    async fn purchase_status(&self, external_ref: &str) -> Result<PurchaseStatus, ClientError> {
        let wire: StatusWire = self
            .http
            .get(self.url(&format!("/purchases/{}/status", external_ref)))
            .header("Authorization", self.bearer())
            .send()
            .await
            .map_err(transport_error)?
            .json()
            .await
            .map_err(transport_error)?;

        Ok(if wire.status == "verified" {
            PurchaseStatus::Verified
        } else {
            PurchaseStatus::Pending
        })
    }

    async fn products(&self) -> Result<Vec<Product>, ClientError> {
        self.http
            .get(self.url("/products"))
            .send()
            .await
            .map_err(transport_error)?
            .json()
            .await
            .map_err(transport_error)
    }

    async fn prices(&self) -> Result<Vec<PriceEntry>, ClientError> {
        self.http
            .get(self.url("/prices"))
            .send()
            .await
            .map_err(transport_error)?
            .json()
            .await
            .map_err(transport_error)
    }
}
