use axum::{
    Json,
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use ledger::catalog::ProductCatalog;
use ledger::wallet::WalletStore;

use crate::{AppState, middleware::AuthUser, verifier::VerifyError};

type HmacSha256 = Hmac<Sha256>;

// Store purchase event types that credit markers. Renewals, refunds and
// transfer events are acknowledged but ignored.
const PURCHASE_EVENTS: [&str; 2] = ["INITIAL_PURCHASE", "NON_RENEWING_PURCHASE"];

// Card verification request: the client's claim after checkout completes
#[derive(Deserialize)]
pub struct VerifyPurchaseRequest {
    pub payment_id: String,
    pub order_id: String,
    pub product_id: u32,
}

// Card verification response
#[derive(Serialize)]
pub struct VerifyPurchaseResponse {
    pub success: bool,
    pub new_balance: Option<u32>,
    pub credited: Option<bool>,
    pub markers: Option<u32>,
    pub error: Option<String>,
    pub message: String,
}

// Purchase status response, polled by the client while a store credit is
// in flight
#[derive(Serialize)]
pub struct PurchaseStatusResponse {
    pub external_ref: String,
    pub status: String,
}

// Store webhook payload (provider-pushed)
#[derive(Deserialize)]
pub struct StoreWebhookPayload {
    pub event: Option<StoreEvent>,
}

#[derive(Deserialize)]
pub struct StoreEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    pub app_user_id: Option<String>,
    pub product_id: Option<String>,
    pub transaction_id: Option<String>,
    pub id: Option<String>,
    pub store: Option<String>,
    #[serde(default)]
    pub price_in_purchased_currency: f64,
}

#[derive(Serialize)]
pub struct WebhookResponse {
    pub success: bool,
    pub message: String,
    pub credited: Option<bool>,
    pub new_balance: Option<u32>,
}

// Verify a card payment and credit markers (synchronous flow)
pub async fn verify_card_payment(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Json(payload): Json<VerifyPurchaseRequest>,
) -> (StatusCode, Json<VerifyPurchaseResponse>) {
    state.wallets.open_wallet(&user.user_id);

    match state
        .verifier
        .verify_card_purchase(
            &user.user_id,
            &payload.payment_id,
            &payload.order_id,
            payload.product_id,
        )
        .await
    {
        Ok(verified) => (
            StatusCode::OK,
            Json(VerifyPurchaseResponse {
                success: true,
                new_balance: Some(verified.outcome.new_balance),
                credited: Some(verified.outcome.credited),
                markers: Some(verified.markers),
                error: None,
                message: "Purchase verified".to_string(),
            }),
        ),
        Err(err) => {
            let status = match err {
                VerifyError::ProviderUnavailable(_) => StatusCode::BAD_GATEWAY,
                VerifyError::Ledger(_) => StatusCode::INTERNAL_SERVER_ERROR,
                _ => StatusCode::BAD_REQUEST,
            };
            tracing::warn!(
                "card verification rejected: user={} payment={} err={}",
                user.user_id,
                payload.payment_id,
                err
            );
            (
                status,
                Json(VerifyPurchaseResponse {
                    success: false,
                    new_balance: None,
                    credited: None,
                    markers: None,
                    error: Some(err.code().to_string()),
                    message: err.to_string(),
                }),
            )
        }
    }
}

// Poll the status of a purchase by its provider transaction id. Reads are
// retry-safe; the client polls this while a store webhook is in flight.
pub async fn purchase_status(
    State(state): State<AppState>,
    AuthUser(_user): AuthUser,
    Path(external_ref): Path<String>,
) -> (StatusCode, Json<PurchaseStatusResponse>) {
    let applied = state.wallets.external_ref_applied(&external_ref);

    (
        StatusCode::OK,
        Json(PurchaseStatusResponse {
            external_ref,
            status: status_label(applied).to_string(),
        }),
    )
}

/// Wire status for a purchase credit: `verified` once the external ref has
/// applied, `webhook_pending` while the provider notification is still in
/// flight.
fn status_label(applied: bool) -> &'static str {
    if applied { "verified" } else { "webhook_pending" }
}

// Store webhook endpoint (asynchronous flow). The body is authenticated
// with an HMAC signature before anything in it is trusted.
pub async fn store_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> (StatusCode, Json<WebhookResponse>) {
    let signature = headers
        .get("x-webhook-signature")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    if !verify_webhook_signature(&state.webhook_secret, &body, signature) {
        tracing::warn!("store webhook rejected: bad signature");
        return (
            StatusCode::UNAUTHORIZED,
            Json(WebhookResponse {
                success: false,
                message: "invalid signature".to_string(),
                credited: None,
                new_balance: None,
            }),
        );
    }

    let payload: StoreWebhookPayload = match serde_json::from_slice(&body) {
        Ok(payload) => payload,
        Err(err) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(WebhookResponse {
                    success: false,
                    message: format!("invalid payload: {}", err),
                    credited: None,
                    new_balance: None,
                }),
            );
        }
    };

    apply_store_event(&state.wallets, &state.catalog, payload)
}

/// Constant-time check of the hex HMAC-SHA256 signature over the raw body.
pub fn verify_webhook_signature(secret: &str, body: &[u8], signature_hex: &str) -> bool {
    let Ok(expected) = hex::decode(signature_hex) else {
        return false;
    };
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
    mac.update(body);
    mac.verify_slice(&expected).is_ok()
}

/// Process an authenticated store purchase event. Non-purchase events and
/// unknown products are acknowledged with 200 so the provider stops
/// redelivering; the ledger's idempotency key absorbs duplicate delivery
/// of real purchases.
fn apply_store_event(
    wallets: &WalletStore,
    catalog: &ProductCatalog,
    payload: StoreWebhookPayload,
) -> (StatusCode, Json<WebhookResponse>) {
    let ack = |message: &str| {
        (
            StatusCode::OK,
            Json(WebhookResponse {
                success: true,
                message: message.to_string(),
                credited: None,
                new_balance: None,
            }),
        )
    };

    let Some(event) = payload.event else {
        return ack("no_event");
    };

    if !PURCHASE_EVENTS.contains(&event.event_type.as_str()) {
        tracing::debug!("store webhook ignored: type={}", event.event_type);
        return ack("event_ignored");
    }

    let external_ref = event.transaction_id.clone().or_else(|| event.id.clone());
    let (Some(user_id), Some(product_code), Some(external_ref)) =
        (&event.app_user_id, &event.product_id, external_ref)
    else {
        return (
            StatusCode::BAD_REQUEST,
            Json(WebhookResponse {
                success: false,
                message: "missing_fields".to_string(),
                credited: None,
                new_balance: None,
            }),
        );
    };

    let Some(product) = catalog.by_store_code(product_code) else {
        tracing::warn!("store webhook for unknown product: {}", product_code);
        return ack("unknown_product");
    };

    // The store charged before we ever saw this user; make sure the wallet
    // exists so the credit cannot bounce.
    wallets.open_wallet(user_id);

    let receipt = serde_json::json!({
        "event_type": event.event_type,
        "store": event.store,
        "price_in_purchased_currency": event.price_in_purchased_currency,
    });

    match wallets.credit(
        user_id,
        product.total_markers(),
        &external_ref,
        &product.store_code,
        Some(receipt),
    ) {
        Ok(outcome) => {
            tracing::info!(
                "store purchase credited: user={} ref={} markers={} credited={}",
                user_id,
                external_ref,
                product.total_markers(),
                outcome.credited
            );
            (
                StatusCode::OK,
                Json(WebhookResponse {
                    success: true,
                    message: "credited".to_string(),
                    credited: Some(outcome.credited),
                    new_balance: Some(outcome.new_balance),
                }),
            )
        }
        Err(err) => {
            tracing::error!("store credit failed: user={} err={}", user_id, err);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(WebhookResponse {
                    success: false,
                    message: "credit_failed".to_string(),
                    credited: None,
                    new_balance: None,
                }),
            )
        }
    }
}
