use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use timeclock_server::{PushState, ServerConfig, SyncService, push};
use timeclock_storage::{Database, DatabaseConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = ServerConfig::from_env().context("reading configuration")?;
    info!(
        bind = %config.bind,
        database = config.database_path,
        "Starting timeclock server"
    );

    let db = Database::new(DatabaseConfig::new(&config.database_path))
        .await
        .context("opening database")?;

    let service = Arc::new(SyncService::new(&db, &config));
    tokio::spawn(stale_command_reporter(Arc::clone(&service)));

    let app = push::router(PushState::new(&db));
    let listener = tokio::net::TcpListener::bind(config.bind)
        .await
        .with_context(|| format!("binding {}", config.bind))?;
    info!("Listening on {}", config.bind);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving")?;

    info!("Shutting down");
    db.close().await;
    Ok(())
}

/// Periodically surface commands that never got acknowledged. They are
/// reported, not retried; the device may have executed them silently.
async fn stale_command_reporter(service: Arc<SyncService>) {
    let mut interval = tokio::time::interval(Duration::from_secs(3600));
    loop {
        interval.tick().await;
        match service.stale_commands().await {
            Ok(stale) if !stale.is_empty() => {
                for command in stale {
                    warn!(
                        command_id = command.id,
                        device_id = command.device_id,
                        kind = command.kind,
                        state = command.state,
                        "Command unacknowledged past staleness cutoff"
                    );
                }
            }
            Ok(_) => {}
            Err(e) => warn!("Stale command scan failed: {}", e),
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for ctrl-c: {}", e);
    }
}
