use std::{net::SocketAddr, sync::Arc};

use anyhow::Context;
use axum::{routing::get, Router};
use http::HeaderValue;
use tokio::signal;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info, warn};

use order_reconciler as app;
use order_reconciler::clients::{
    CarrierGateway, PaymentGateway, PaymentIntentClient, ShipmentClient,
};
use order_reconciler::repositories::{InMemoryOrderStore, OrderStore, SeaOrmOrderStore};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cfg = app::config::load_config()?;
    app::config::init_tracing(cfg.log_level(), cfg.log_json);

    // Order store
    let store: Arc<dyn OrderStore> = if cfg.uses_memory_store() {
        warn!("using the in-process order store; orders are lost on restart");
        Arc::new(InMemoryOrderStore::new())
    } else {
        let db_pool = app::db::establish_connection_from_app_config(&cfg).await?;
        if cfg.auto_migrate {
            app::db::run_migrations(&db_pool).await.map_err(|e| {
                error!("Failed running migrations: {}", e);
                e
            })?;
        }
        Arc::new(SeaOrmOrderStore::new(Arc::new(db_pool)))
    };

    // Outbound clients. Missing credentials disable the integration instead
    // of stopping the service.
    let payments: Option<Arc<dyn PaymentGateway>> = match PaymentIntentClient::from_config(&cfg) {
        Ok(client) => {
            info!(currency = %cfg.payment_currency, "payment gateway configured");
            Some(Arc::new(client))
        }
        Err(e) => {
            warn!(error = %e, "payment gateway disabled");
            None
        }
    };
    let carrier: Option<Arc<dyn CarrierGateway>> = match ShipmentClient::from_config(&cfg) {
        Ok(client) => {
            info!(pickup = %cfg.carrier_pickup_location, "carrier configured");
            Some(Arc::new(client))
        }
        Err(e) => {
            warn!(error = %e, "carrier integration disabled");
            None
        }
    };
    let webhook_auth = app::webhooks::authenticator_from_config(&cfg);

    let app_state = app::AppState::new(cfg.clone(), store, payments, carrier, webhook_auth);

    // Build CORS layer from config
    let configured_origins: Option<Vec<HeaderValue>> = cfg
        .cors_allowed_origins
        .as_ref()
        .map(|raw| {
            raw.split(',')
                .filter_map(|origin| {
                    let trimmed = origin.trim();
                    if trimmed.is_empty() {
                        None
                    } else {
                        HeaderValue::from_str(trimmed).ok()
                    }
                })
                .collect::<Vec<_>>()
        })
        .filter(|origins| !origins.is_empty());

    let cors_layer = if let Some(origins) = configured_origins {
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    } else if cfg.is_production() {
        error!("Missing CORS configuration detected; set APP__CORS_ALLOWED_ORIGINS");
        return Err("Missing CORS configuration: set APP__CORS_ALLOWED_ORIGINS".into());
    } else {
        info!("Using permissive CORS because explicit origins were not configured");
        CorsLayer::permissive()
    };

    let app = Router::<app::AppState>::new()
        .route("/", get(|| async { "order-reconciler up" }))
        .nest("/api/v1", app::api_v1_routes())
        .merge(app::openapi::swagger_ui())
        // HTTP tracing layer for consistent request/response telemetry
        .layer(app::tracing::configure_http_tracing())
        .layer(cors_layer)
        // Ensure every request carries a request id for traceability
        .layer(axum::middleware::from_fn(
            app::middleware_helpers::request_id_middleware,
        ))
        .with_state(app_state);

    let addr: SocketAddr = format!("{}:{}", cfg.host, cfg.port)
        .parse()
        .with_context(|| format!("invalid listen address {}:{}", cfg.host, cfg.port))?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!("order-reconciler listening on http://{}", addr);

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm =
            signal(SignalKind::terminate()).expect("failed to install signal handler");
        sigterm.recv().await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("shutdown signal received");
}
