//! Lodge API composition root.

#![forbid(unsafe_code)]

mod api_config;
mod api_router;
mod api_services;
mod dto;
mod error;
mod gateway;
mod handlers;
mod middleware;
mod state;

use std::time::Duration;

use lodge_application::{run_invalidation_subscriber, run_supervised};
use lodge_core::AppError;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Drain window granted to in-flight requests and sockets on shutdown.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(15);

#[tokio::main]
async fn main() -> Result<(), AppError> {
    dotenvy::dotenv().ok();
    api_config::init_tracing();

    let config = api_config::ApiConfig::load()?;
    let pool = lodge_infrastructure::connect_and_migrate(
        &config.database_url,
        config.database_max_conn,
        config.database_min_conn,
    )
    .await?;

    let app_state = api_services::build_app_state(pool, &config)?;
    let shutdown = CancellationToken::new();

    // Warm the blocklist before taking traffic; failures only log.
    if let Err(error) = app_state.blocklist_service.refresh().await {
        warn!(%error, "initial blocklist refresh failed");
    } else if !app_state.blocklist_service.is_empty() {
        info!(domains = app_state.blocklist_service.len(), "disposable email blocklist loaded");
    }

    // Cross-process permission invalidation.
    {
        let cache = app_state.permission_cache.clone();
        let bus = app_state.permission_bus.clone();
        let token = shutdown.clone();
        tokio::spawn(async move {
            run_supervised("permission-subscriber", token, move |child| {
                run_invalidation_subscriber(cache.clone(), bus.clone(), child)
            })
            .await;
        });
    }

    // Gateway event dispatch to locally connected sessions.
    {
        let dispatch_state = app_state.clone();
        let token = shutdown.clone();
        tokio::spawn(async move {
            run_supervised("gateway-dispatcher", token, move |child| {
                gateway::run_dispatcher(dispatch_state.clone(), child)
            })
            .await;
        });
    }

    let app = api_router::build_router(
        app_state.clone(),
        config.upload_max_bytes,
        &config.cors_origins,
    );
    let address = config.socket_address()?;

    let listener = tokio::net::TcpListener::bind(address)
        .await
        .map_err(|error| AppError::Internal(format!("failed to bind listener: {error}")))?;

    info!(%address, environment = %config.environment, "lodge-api listening");

    let server_shutdown = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            wait_for_signal().await;
            info!("shutdown signal received; draining");
            server_shutdown.cancel();
        })
        .await
        .map_err(|error| AppError::Internal(format!("api server error: {error}")))?;

    // Signal background tasks and connected sockets, then give in-flight
    // work a bounded window to drain.
    shutdown.cancel();
    app_state.gateway.close_all().await;
    tokio::time::timeout(SHUTDOWN_GRACE, async {
        while app_state.gateway.len().await > 0 {
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    })
    .await
    .ok();

    info!("lodge-api stopped");
    Ok(())
}

async fn wait_for_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        let mut terminate = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(signal) => signal,
            Err(error) => {
                warn!(%error, "failed to install SIGTERM handler");
                let _ = ctrl_c.await;
                return;
            }
        };
        tokio::select! {
            _ = ctrl_c => {}
            _ = terminate.recv() => {}
        }
    }

    #[cfg(not(unix))]
    {
        let _ = ctrl_c.await;
    }
}
