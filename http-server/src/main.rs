use axum::{
    Router,
    routing::{get, post},
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;

use ledger::catalog::ProductCatalog;
use ledger::prices::PriceTable;
use ledger::wallet::WalletStore;

mod middleware;
mod models;
mod routes;
mod verifier;

use models::InMemoryStorage;
use routes::purchases::{purchase_status, store_webhook, verify_card_payment};
use routes::users::{get_profile, login};
use routes::wallet::{get_prices, get_products, get_transactions, get_wallet, spend};
use verifier::{CardProvider, PaymentVerifier, RestCardProvider, StaticCardProvider};

// Application state: account storage plus the authoritative marker ledger
#[derive(Clone)]
pub struct AppState {
    pub storage: InMemoryStorage,
    pub wallets: WalletStore,
    pub prices: Arc<PriceTable>,
    pub catalog: Arc<ProductCatalog>,
    pub verifier: PaymentVerifier,
    pub webhook_secret: Arc<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // initialize tracing
    tracing_subscriber::fmt::init();

    let storage = InMemoryStorage::new();
    let wallets = WalletStore::new();
    let prices = Arc::new(PriceTable::with_defaults());
    let catalog = Arc::new(ProductCatalog::standard());
    tracing::info!("Wallet store initialized");

    // Card provider credentials come from the environment; without them we
    // fall back to a static provider so local runs still work end-to-end.
    let provider: Arc<dyn CardProvider> = match (
        std::env::var("CARD_API_URL"),
        std::env::var("CARD_API_KEY"),
        std::env::var("CARD_API_SECRET"),
    ) {
        (Ok(base_url), Ok(api_key), Ok(api_secret)) => {
            Arc::new(RestCardProvider::new(base_url, api_key, api_secret))
        }
        _ => {
            tracing::warn!("CARD_API_* not set, using static card provider");
            Arc::new(StaticCardProvider::new())
        }
    };

    let webhook_secret = std::env::var("WEBHOOK_SECRET").unwrap_or_else(|_| {
        tracing::warn!("WEBHOOK_SECRET not set, store webhooks use dev secret");
        "dev-webhook-secret".to_string()
    });

    let verifier = PaymentVerifier::new(provider, wallets.clone(), Arc::clone(&catalog));

    let state = AppState {
        storage,
        wallets,
        prices,
        catalog,
        verifier,
        webhook_secret: Arc::new(webhook_secret),
    };

    // build our application with routes
    let app = Router::new()
        .route("/", get(root))
        .route("/login", post(login))
        .route("/profile", get(get_profile))
        .route("/wallet", get(get_wallet))
        .route("/wallet/transactions", get(get_transactions))
        .route("/spend", post(spend))
        .route("/products", get(get_products))
        .route("/prices", get(get_prices))
        .route("/purchases/verify", post(verify_card_payment))
        .route("/purchases/{external_ref}/status", get(purchase_status))
        .route("/webhooks/store", post(store_webhook))
        .route("/health", get(health_check))
        .layer(ServiceBuilder::new().layer(CorsLayer::permissive()))
        .with_state(state);

    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(7100);
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
    tracing::info!("Server running on http://0.0.0.0:{}", port);
    axum::serve(listener, app).await?;

    Ok(())
}

// Health check endpoint
async fn health_check() -> &'static str {
    "OK"
}

// Root endpoint
async fn root() -> &'static str {
    "Marker Ledger API - POST /login to authenticate, POST /spend to use markers, POST /purchases/verify after card checkout"
}
