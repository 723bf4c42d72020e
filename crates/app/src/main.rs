//! Stack - facilitation host
//!
//! Runs the meeting database, the change relay and housekeeping in one
//! process. `stack watch <meeting-id>` instead connects to a running host
//! as a read-only observer and logs every change.

use std::sync::Arc;
use std::time::Duration;

use stack_app::{housekeeping, AppConfig, AppError, AppState, Result};
use stack_net::{ChangeSource, ConnectionManager, ProbeFuture, RelayClient, RelayServer};
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use uuid::Uuid;

fn main() {
    let config = AppConfig::load();

    // Initialize logging
    let level = config
        .as_ref()
        .map(|c| c.log_level.clone())
        .unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .init();

    let config = match config {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            tracing::error!("Failed to create tokio runtime: {}", e);
            std::process::exit(1);
        }
    };

    let args: Vec<String> = std::env::args().skip(1).collect();
    let result = match args.first().map(String::as_str) {
        Some("watch") => match args.get(1).map(|id| id.parse::<Uuid>()) {
            Some(Ok(meeting_id)) => runtime.block_on(watch(config, meeting_id)),
            _ => Err(AppError::Config("usage: stack watch <meeting-id>".into())),
        },
        None | Some("serve") => runtime.block_on(serve(config)),
        Some(other) => Err(AppError::Config(format!("unknown command: {}", other))),
    };

    if let Err(e) = result {
        tracing::error!("{}", e);
        std::process::exit(1);
    }
}

/// Host mode
async fn serve(config: AppConfig) -> Result<()> {
    tracing::info!("Starting Stack host");

    let backend = config.backend_addr()?;
    let probe_timeout = Duration::from_millis(config.connection.probe_timeout_ms);
    let connection = ConnectionManager::new(config.connection.clone()).with_probe(Arc::new(
        move || Box::pin(async move { stack_net::probe(backend, probe_timeout).await.is_ok() }) as ProbeFuture,
    ));
    connection.on_state_change(|state, error| match error {
        Some(error) => tracing::warn!(%state, error, "Backend connection"),
        None => tracing::info!(%state, "Backend connection"),
    });

    let state = Arc::new(AppState::open(&config.data_dir()?, connection)?);

    let relay = RelayServer::start(
        config.relay_addr()?,
        state.feed.clone(),
        config.api_key.clone(),
    )
    .await?;
    tracing::info!(addr = %relay.addr(), "Relay listening");

    let monitor = state.connection.spawn_health_monitor();
    let housekeeping = housekeeping::spawn(state.clone(), config.housekeeping.clone());

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutting down");

    housekeeping.abort();
    monitor.abort();
    relay.shutdown();
    Ok(())
}

/// Observer mode
async fn watch(config: AppConfig, meeting_id: Uuid) -> Result<()> {
    let addr = config.backend_addr()?;
    let client = RelayClient::connect(addr, Some(meeting_id), config.api_key.clone()).await?;
    tracing::info!(addr = %addr, meeting_id = %meeting_id, "Watching meeting");

    let mut rx = client.subscribe_changes();
    loop {
        tokio::select! {
            event = rx.recv() => match event {
                Ok(event) => tracing::info!(table = ?event.table, kind = ?event.kind, "Change"),
                Err(RecvError::Lagged(missed)) => tracing::warn!(missed, "Watcher fell behind"),
                Err(RecvError::Closed) => {
                    tracing::info!("Relay closed the connection");
                    break;
                }
            },
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    client.disconnect().await;
    Ok(())
}
