//! Balloon telemetry backend: assembles modem telemetry into flights and
//! serves tracking and landing-prediction APIs.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use axum::routing::get;
use tokio::sync::{broadcast, mpsc};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use strato_server::config::Config;
use strato_server::state::AppState;
use strato_server::{api, loops, modems, persistence};

const PERSIST_QUEUE_DEPTH: usize = 1024;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("strato_server=debug".parse()?),
        )
        .init();

    tracing::info!("Starting telemetry server...");

    let config = Config::from_env();
    let port = config.server_port;

    let db = persistence::init_database(&config.database_path, config.database_max_connections)
        .await?;
    let modem_list = modems::load_allow_list(&config.modem_csv_path, &db).await?;

    let flights = persistence::flights::load_all(db.pool(), config.min_satellites).await?;
    tracing::info!("Rebuilt {} flights from database", flights.len());

    let (persist_tx, persist_rx) = mpsc::channel(PERSIST_QUEUE_DEPTH);
    let (shutdown_tx, _) = broadcast::channel(1);

    let state = Arc::new(AppState::new(config, modem_list).with_persistence(persist_tx));
    state.load_flights(flights);

    let persist_handle = tokio::spawn(loops::point_persist_loop::run_point_persist_loop(
        db.clone(),
        persist_rx,
        shutdown_tx.subscribe(),
    ));

    let app = api::routes()
        .route("/health", get(|| async { "OK" }))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if tokio::signal::ctrl_c().await.is_err() {
                tracing::warn!("Shutdown signal handler unavailable");
            }
            // Give the persist loop a chance to run its final flush.
            let _ = shutdown_tx.send(());
        })
        .await?;

    // Wait for the persist loop to drain its final batch before exiting.
    persist_handle.await?;

    Ok(())
}
