use std::time::Duration;

use anyhow::Result;
use tripdesk_core::config::{AppConfig, LoadOptions};
use tripdesk_server::{bootstrap_with_config, health, telemetry};

#[tokio::main]
async fn main() -> Result<()> {
    run().await
}

pub async fn run() -> Result<()> {
    // Logging comes up before bootstrap so its events are captured.
    let config = AppConfig::load(LoadOptions::default())?;
    telemetry::init_logging(&config);

    let app = bootstrap_with_config(config).await?;

    health::spawn(
        &app.config.server.bind_address,
        app.config.server.health_check_port,
        app.db_pool.clone(),
        app.config.pricing.enabled,
    )
    .await?;

    let counts = app.desk.workbench_counts(&app.desk.identity().admin_user()).await?;
    tracing::info!(
        event_name = "system.server.started",
        correlation_id = "bootstrap",
        todo = counts.todo,
        processing = counts.processing,
        finished = counts.finished,
        "tripdesk-server started"
    );

    tokio::signal::ctrl_c().await?;
    tracing::info!(
        event_name = "system.server.stopping",
        correlation_id = "shutdown",
        grace_secs = app.config.server.graceful_shutdown_secs,
        "tripdesk-server stopping"
    );

    let grace = Duration::from_secs(app.config.server.graceful_shutdown_secs);
    if tokio::time::timeout(grace, app.db_pool.close()).await.is_err() {
        tracing::warn!(
            event_name = "system.server.shutdown_timeout",
            correlation_id = "shutdown",
            "database pool did not close within the grace period"
        );
    }

    Ok(())
}
