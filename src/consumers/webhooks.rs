use anyhow::{Context, Result};
use tokio::{sync::watch, task::JoinHandle, time};
use tracing::{error, info};

use crate::{app_state::AppState, services::webhooks};

/// Events re-processed per tick.
const BATCH_SIZE: i64 = 20;

/// Re-processes failed webhook events whose backoff has elapsed. Returns how many were
/// picked up.
pub async fn retry_due_events(state: &AppState) -> Result<usize> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;
    let max_attempts = state.config.webhooks.max_attempts;

    let due = webhooks::due_for_retry(conn, max_attempts, BATCH_SIZE).await?;
    for event in &due {
        let status = match webhooks::handle(conn, event, max_attempts).await {
            Ok(status) => status,
            Err(err) => {
                error!(event_id = event.id, error = %err, "Failed to retry webhook event");
                continue;
            }
        };
        info!(
            event_id = event.id,
            attempt = event.attempts + 1,
            status = %status,
            "Retried webhook event"
        );
    }
    Ok(due.len())
}

/// Runs [`retry_due_events`] every `webhooks.retry_interval` until `shutdown` flips.
pub fn spawn_retry_worker(state: AppState, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = time::interval(state.config.webhooks.retry_interval);
        ticker.set_missed_tick_behavior(time::MissedTickBehavior::Delay);
        info!("Webhook retry worker started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(err) = retry_due_events(&state).await {
                        error!(error = ?err, "Webhook retry pass failed");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!("Webhook retry worker stopped");
    })
}
