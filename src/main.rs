use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::signal;
use tower::ServiceBuilder;
use tower_http::request_id::{PropagateRequestIdLayer, SetRequestIdLayer};
use tracing::{error, info};

use viabill_gateway::api::{self, AppState};
use viabill_gateway::checkout::CheckoutService;
use viabill_gateway::config::GatewayConfig;
use viabill_gateway::logging::init_tracing;
use viabill_gateway::middleware::logging::{request_logging_middleware, UuidRequestId};
use viabill_gateway::order::store::InMemoryOrderStore;
use viabill_gateway::reconcile::ReconciliationEngine;
use viabill_gateway::remote::client::RemoteConnector;
use viabill_gateway::remote::merchant::MerchantAccountClient;
use viabill_gateway::remote::transport::ReqwestTransport;

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, starting graceful shutdown");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = GatewayConfig::from_env()?;
    config.validate()?;

    init_tracing(&config.logging);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        base_url = %config.merchant.base_url,
        test_mode = config.merchant.test_mode,
        "Starting ViaBill gateway service"
    );

    let transport = Arc::new(ReqwestTransport::new(Duration::from_secs(
        config.merchant.timeout_secs,
    ))?);
    let store = Arc::new(InMemoryOrderStore::new());
    let connector = Arc::new(RemoteConnector::new(
        transport.clone(),
        config.merchant.clone(),
    ));
    let merchant_account = Arc::new(MerchantAccountClient::new(
        transport.clone(),
        config.merchant.clone(),
    ));
    let engine = Arc::new(ReconciliationEngine::new(
        store.clone(),
        connector.clone(),
        config.flow.clone(),
    ));
    let checkout = Arc::new(CheckoutService::new(store.clone(), config.merchant.clone()));

    let state = Arc::new(AppState {
        store,
        engine,
        connector,
        merchant_account,
        checkout,
        merchant: config.merchant.clone(),
        flow: config.flow.clone(),
    });

    let app = api::router(state).layer(
        ServiceBuilder::new()
            .layer(SetRequestIdLayer::x_request_id(UuidRequestId))
            .layer(axum::middleware::from_fn(request_logging_middleware))
            .layer(PropagateRequestIdLayer::x_request_id()),
    );

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await.map_err(|e| {
        error!(address = %addr, error = %e, "Failed to bind listener");
        e
    })?;

    info!(address = %addr, "Server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown complete");

    Ok(())
}
