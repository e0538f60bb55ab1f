use anyhow::Result;
use diesel_migrations::{EmbeddedMigrations, embed_migrations};
use freshmarket_service::{
    app_state::AppState,
    bootstrap::{self, bootstrap},
    config, db, routes,
};

/// Migrations embedded into the binary which helps with streamlining image building process
const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

#[tokio::main]
async fn main() -> Result<()> {
    bootstrap::init_tracing();
    bootstrap::init_env();

    let config = config::load()?;
    let pool = db::connect(&config.database).await?;

    tracing::info!("Running migrations...");
    let migrations_count = db::run_migrations_blocking(MIGRATIONS, &config.database.url).await?;
    tracing::info!("Run {} new migrations successfully", migrations_count);

    let state = AppState::new(config, pool)?;
    let app = routes::app(&state);

    tracing::info!("Bootstrapping...");
    bootstrap("FreshMarket", app, state).await?;
    Ok(())
}
