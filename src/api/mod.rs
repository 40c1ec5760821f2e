pub mod admin;
pub mod callback;
pub mod checkout;
pub mod merchant;

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;

use crate::checkout::CheckoutService;
use crate::config::{FlowConfig, MerchantConfig};
use crate::order::store::OrderStore;
use crate::reconcile::ReconciliationEngine;
use crate::remote::client::RemoteConnector;
use crate::remote::merchant::MerchantAccountClient;

/// Shared handler state wired once at startup.
pub struct AppState {
    pub store: Arc<dyn OrderStore>,
    pub engine: Arc<ReconciliationEngine>,
    pub connector: Arc<RemoteConnector>,
    pub merchant_account: Arc<MerchantAccountClient>,
    pub checkout: Arc<CheckoutService>,
    pub merchant: MerchantConfig,
    pub flow: FlowConfig,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route(
            "/wc-api/:gateway",
            post(callback::handle_callback).get(callback::handle_callback),
        )
        .route("/checkout/:order_id/form", post(checkout::checkout_form))
        .route(
            "/checkout/:order_id/authorize",
            post(checkout::checkout_authorize),
        )
        .route("/admin/order/:order_id/capture", post(admin::capture_order))
        .route("/admin/order/:order_id/refund", post(admin::refund_order))
        .route("/admin/order/:order_id/cancel", post(admin::cancel_order))
        .route(
            "/admin/order/:order_id/refresh",
            post(admin::refresh_order_status),
        )
        .route("/merchant/register", post(merchant::register))
        .route("/merchant/login", post(merchant::login))
        .route("/merchant/myviabill", get(merchant::my_viabill))
        .route("/merchant/notifications", get(merchant::notifications))
        .route("/merchant/countries", get(merchant::supported_countries))
        .route("/health", get(health))
        .with_state(state)
}

async fn health() -> &'static str {
    "OK"
}
