use std::sync::Arc;

use migration::{Migrator, MigratorTrait};
use noraneko_id::AppResources;
use noraneko_id::api::start_webserver;
use noraneko_id::config::load_config;
use sea_orm::Database;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> color_eyre::eyre::Result<()> {
    color_eyre::install()?;
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = Arc::new(load_config()?);

    let db = Arc::new(Database::connect(config.database_url()).await?);
    Migrator::up(db.as_ref(), None).await?;

    let resources = AppResources::new(db, config);
    start_webserver(resources).await?;
    Ok(())
}
