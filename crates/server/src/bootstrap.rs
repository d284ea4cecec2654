use std::sync::Arc;

use thiserror::Error;
use tracing::info;
use tripdesk_core::config::{AppConfig, ConfigError, LoadOptions};
use tripdesk_core::errors::ApplicationError;
use tripdesk_core::pricing::{DisabledPriceLookup, PriceLookup};
use tripdesk_db::{connect_from_config, migrations, DbPool};

use crate::desk::{Repositories, TravelDesk};
use crate::serpapi::SerpApiPriceLookup;

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub desk: Arc<TravelDesk>,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error("price lookup client could not be built: {0}")]
    Pricing(#[source] reqwest::Error),
    #[error("admin account could not be provisioned: {0}")]
    Admin(#[source] ApplicationError),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );

    let db_pool =
        connect_from_config(&config.database).await.map_err(BootstrapError::DatabaseConnect)?;
    info!(
        event_name = "system.bootstrap.database_connected",
        correlation_id = "bootstrap",
        "database connection established"
    );

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(
        event_name = "system.bootstrap.migrations_applied",
        correlation_id = "bootstrap",
        "database migrations applied"
    );

    let prices = price_lookup(&config)?;
    let desk = TravelDesk::from_config(Repositories::sql(db_pool.clone()), &config)
        .with_price_lookup(prices);
    let admin = desk.ensure_admin().await.map_err(BootstrapError::Admin)?;
    info!(
        event_name = "system.bootstrap.desk_ready",
        correlation_id = "bootstrap",
        admin_id = %admin.id,
        pricing_enabled = config.pricing.enabled,
        "travel desk ready"
    );

    Ok(Application { config, db_pool, desk: Arc::new(desk) })
}

fn price_lookup(config: &AppConfig) -> Result<Arc<dyn PriceLookup>, BootstrapError> {
    match SerpApiPriceLookup::from_config(&config.pricing).map_err(BootstrapError::Pricing)? {
        Some(lookup) => Ok(Arc::new(lookup)),
        None => Ok(Arc::new(DisabledPriceLookup)),
    }
}
