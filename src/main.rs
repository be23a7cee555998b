// SPDX-License-Identifier: MIT

//! Trainlink API server.
//!
//! Wires the provider client, token lifecycle, sync orchestrator and
//! sweep scheduler, then serves the HTTP surface (OAuth connection,
//! webhooks, manual sync, activity reads).

use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use trainlink::{
    config::Config,
    db::Db,
    services::{Scheduler, StravaClient, SweepPolicy, SyncOrchestrator, TokenService},
    AppState,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging();

    let config = Config::from_env().expect("Failed to load configuration");
    tracing::info!(port = config.port, "Starting Trainlink API");

    let db = Db::connect(&config.gcp_project_id)
        .await
        .expect("Failed to connect to Firestore");

    let client = StravaClient::new(
        config.strava_client_id.clone(),
        config.strava_client_secret.clone(),
        config.http_timeout,
    );

    // Shared within this instance so concurrent requests serialize their
    // token refreshes per user.
    let refresh_locks = Arc::new(dashmap::DashMap::new());
    let tokens = TokenService::new(client.clone(), db.clone(), refresh_locks);

    let sync = SyncOrchestrator::new(
        client,
        tokens.clone(),
        db.clone(),
        config.list_page_size,
    );

    let scheduler = Arc::new(Scheduler::new(
        db.clone(),
        sync.clone(),
        SweepPolicy {
            interval: config.sweep_interval,
            lookback: config.sweep_lookback,
            jitter: std::time::Duration::from_secs(60),
        },
    ));
    scheduler.spawn();

    let state = Arc::new(AppState {
        config: config.clone(),
        db,
        tokens,
        sync,
    });

    let app = trainlink::routes::create_router(state);

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(address = %addr, "Server listening");

    axum::serve(listener, app).await?;
    Ok(())
}

/// Initialize structured JSON logging.
fn init_logging() {
    let format = tracing_subscriber::fmt::layer()
        .json()
        .with_target(false)
        .with_current_span(true)
        .flatten_event(true);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("trainlink=debug".parse().unwrap())
                .add_directive("info".parse().unwrap()),
        )
        .with(format)
        .init();
}
