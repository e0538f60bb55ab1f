use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use diesel::{Connection, PgConnection};
use diesel_async::{
    AsyncPgConnection,
    pooled_connection::{AsyncDieselConnectionManager, bb8},
};
use diesel_migrations::{EmbeddedMigrations, MigrationHarness};

use crate::{aliases::DbPool, config::DatabaseConfig};

const CONNECT_ATTEMPTS: u32 = 6;
const INITIAL_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Opens the pool and checks out one connection, retrying with exponential backoff while
/// the database is not reachable yet. bb8 replaces broken connections afterwards.
pub async fn connect(config: &DatabaseConfig) -> Result<DbPool> {
    let mut delay = INITIAL_BACKOFF;
    let mut attempt = 1;

    loop {
        match try_connect(config).await {
            Ok(pool) => {
                tracing::info!(attempt, "Connected to the database");
                return Ok(pool);
            }
            Err(err) if attempt < CONNECT_ATTEMPTS => {
                tracing::warn!(
                    attempt,
                    retry_in = ?delay,
                    error = %err,
                    "Database not reachable yet"
                );
                tokio::time::sleep(delay).await;
                delay = (delay * 2).min(MAX_BACKOFF);
                attempt += 1;
            }
            Err(err) => {
                return Err(err.context(format!(
                    "Could not connect to the database after {CONNECT_ATTEMPTS} attempts"
                )));
            }
        }
    }
}

async fn try_connect(config: &DatabaseConfig) -> Result<DbPool> {
    let manager = AsyncDieselConnectionManager::<AsyncPgConnection>::new(&config.url);
    let pool = bb8::Pool::builder()
        .max_size(config.max_connections)
        .build(manager)
        .await
        .context("Failed to build the DB pool")?;
    pool.get()
        .await
        .context("Failed to obtain a DB connection")?;
    Ok(pool)
}

/// A pool that opens connections on first use. Used where no database may be present.
pub fn build_lazy(url: &str) -> DbPool {
    let manager = AsyncDieselConnectionManager::<AsyncPgConnection>::new(url);
    bb8::Pool::builder()
        .connection_timeout(Duration::from_secs(2))
        .build_unchecked(manager)
}

/// Applies pending migrations on a dedicated blocking connection and returns how many ran.
pub async fn run_migrations_blocking(migrations: EmbeddedMigrations, url: &str) -> Result<usize> {
    let url = url.to_string();
    tokio::task::spawn_blocking(move || {
        let mut conn =
            PgConnection::establish(&url).context("Failed to connect for migrations")?;
        let applied = conn
            .run_pending_migrations(migrations)
            .map_err(|err| anyhow!("Failed to run migrations: {err}"))?;
        Ok(applied.len())
    })
    .await
    .context("Migration task panicked")?
}
