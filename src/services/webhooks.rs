//! FedaPay webhook inbox.
//!
//! Notifications are stored in `webhook_events` before anything else happens, keyed on
//! `(provider, event_type, transaction_id)`. A redelivered notification hits that key and
//! is acknowledged without being processed twice. Processing failures are kept on the row
//! and picked up again by the retry worker.

use std::sync::LazyLock;

use anyhow::{Context, anyhow};
use chrono::{DateTime, Duration, Utc};
use diesel::{
    BoolExpressionMethods, ExpressionMethods, OptionalExtension, QueryDsl, SelectableHelper,
};
use diesel_async::{AsyncPgConnection, RunQueryDsl};
use hmac::{Hmac, Mac};
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use sha2::Sha256;
use strum::{AsRefStr, Display, EnumString};

use crate::{
    api::fedapay::string_or_number,
    app_error::AppError,
    models::{CreateWebhookEventEntity, WebhookEventEntity},
    schema::{payments, webhook_events},
    services::payments::{ConfirmationOutcome, PaymentLookup, confirm_payment, fail_payment},
};

pub const PROVIDER: &str = "fedapay";
pub const SIGNATURE_HEADER: &str = "x-fedapay-signature";

/// Longest delay between two retries of the same event.
const MAX_BACKOFF_SECS: i64 = 3600;
const STALE_RECEIVED_SECS: i64 = 60;

static ORDER_REFERENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"#(\d+)").expect("order reference pattern is valid"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, AsRefStr, Display, EnumString)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum InboxStatus {
    Received,
    Processed,
    Ignored,
    Failed,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookNotification {
    #[serde(alias = "name")]
    pub event: String,
    #[serde(alias = "entity")]
    pub data: WebhookTransaction,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookTransaction {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub custom_metadata: Option<Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    Approved,
    Declined,
    Other,
}

impl WebhookNotification {
    pub fn kind(&self) -> NotificationKind {
        match self.event.as_str() {
            "transaction.approved" | "transaction.successful" | "transaction.transferred" => {
                NotificationKind::Approved
            }
            "transaction.declined" | "transaction.canceled" | "transaction.cancelled" => {
                NotificationKind::Declined
            }
            _ => NotificationKind::Other,
        }
    }

    /// Order id carried by the transaction: the structured metadata first, then the
    /// `#<id>` marker in the description.
    pub fn order_reference(&self) -> Option<i32> {
        let from_metadata = self
            .data
            .custom_metadata
            .as_ref()
            .and_then(|meta| meta.get("order_id"))
            .and_then(|id| match id {
                Value::Number(n) => n.as_i64().and_then(|n| i32::try_from(n).ok()),
                Value::String(s) => s.trim().parse().ok(),
                _ => None,
            });

        from_metadata.or_else(|| {
            let description = self.data.description.as_deref()?;
            ORDER_REFERENCE
                .captures(description)
                .and_then(|caps| caps.get(1))
                .and_then(|m| m.as_str().parse().ok())
        })
    }
}

/// Checks a `t=<timestamp>,s=<hex hmac>` signature header over `"<timestamp>.<body>"`.
pub fn verify_signature(secret: &str, header: &str, body: &[u8]) -> bool {
    let mut timestamp = None;
    let mut signatures = Vec::new();
    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", value)) => timestamp = Some(value),
            Some(("s", value)) => signatures.push(value),
            _ => {}
        }
    }
    let Some(timestamp) = timestamp else {
        return false;
    };

    signatures.into_iter().any(|signature| {
        let Ok(expected) = hex::decode(signature) else {
            return false;
        };
        let Ok(mut mac) = Hmac::<Sha256>::new_from_slice(secret.as_bytes()) else {
            return false;
        };
        mac.update(timestamp.as_bytes());
        mac.update(b".");
        mac.update(body);
        mac.verify_slice(&expected).is_ok()
    })
}

/// Builds the header [`verify_signature`] accepts.
pub fn sign_payload(secret: &str, timestamp: i64, body: &[u8]) -> anyhow::Result<String> {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
        .map_err(|err| anyhow!("Invalid webhook secret: {err}"))?;
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(body);
    Ok(format!(
        "t={timestamp},s={}",
        hex::encode(mac.finalize().into_bytes())
    ))
}

#[derive(Debug)]
pub enum Recorded {
    New(WebhookEventEntity),
    Duplicate,
}

/// Stores a notification unless the same event for the same transaction is already there.
pub async fn record(
    conn: &mut AsyncPgConnection,
    notification: &WebhookNotification,
    payload: Value,
) -> Result<Recorded, AppError> {
    let inserted: Option<WebhookEventEntity> = diesel::insert_into(webhook_events::table)
        .values(CreateWebhookEventEntity {
            provider: PROVIDER.into(),
            event_type: notification.event.clone(),
            transaction_id: notification.data.id.clone(),
            payload,
            status: InboxStatus::Received.to_string(),
        })
        .on_conflict((
            webhook_events::provider,
            webhook_events::event_type,
            webhook_events::transaction_id,
        ))
        .do_nothing()
        .returning(WebhookEventEntity::as_returning())
        .get_result(conn)
        .await
        .optional()
        .context("Failed to record webhook event")?;

    Ok(match inserted {
        Some(event) => Recorded::New(event),
        None => Recorded::Duplicate,
    })
}

/// Applies a stored notification to its payment. `Ok(InboxStatus::Ignored)` covers events
/// that need no action or reference no known order.
pub async fn process(
    conn: &mut AsyncPgConnection,
    event: &WebhookEventEntity,
) -> Result<InboxStatus, AppError> {
    let notification: WebhookNotification = serde_json::from_value(event.payload.clone())
        .context("Stored webhook payload is not a FedaPay notification")?;

    let kind = notification.kind();
    if kind == NotificationKind::Other {
        tracing::debug!(event = %notification.event, "Ignoring webhook event");
        return Ok(InboxStatus::Ignored);
    }

    let Some(lookup) = resolve(conn, &notification).await? else {
        tracing::warn!(
            event = %notification.event,
            transaction_id = %notification.data.id,
            "Webhook does not reference a known payment"
        );
        return Ok(InboxStatus::Ignored);
    };

    match kind {
        NotificationKind::Approved => {
            let outcome =
                confirm_payment(conn, lookup, Some("Payment confirmed by FedaPay".into())).await?;
            if let ConfirmationOutcome::AlreadyConfirmed = outcome {
                tracing::info!(transaction_id = %notification.data.id, "Webhook replayed a confirmed payment");
            }
        }
        NotificationKind::Declined => {
            fail_payment(conn, lookup, "Declined by the payment provider").await?;
        }
        NotificationKind::Other => {}
    }
    Ok(InboxStatus::Processed)
}

async fn resolve<'a>(
    conn: &mut AsyncPgConnection,
    notification: &'a WebhookNotification,
) -> Result<Option<PaymentLookup<'a>>, AppError> {
    let by_transaction: i64 = payments::table
        .filter(payments::transaction_id.eq(&notification.data.id))
        .count()
        .get_result(conn)
        .await
        .context("Failed to look up payment by transaction")?;
    if by_transaction > 0 {
        return Ok(Some(PaymentLookup::TransactionId(&notification.data.id)));
    }

    let Some(order_id) = notification.order_reference() else {
        return Ok(None);
    };
    let current: Option<Option<String>> = payments::table
        .filter(payments::order_id.eq(order_id))
        .select(payments::transaction_id)
        .first(conn)
        .await
        .optional()
        .context("Failed to look up payment by order")?;

    match current {
        None => Ok(None),
        Some(Some(current)) if current != notification.data.id => {
            // The order was paid again under a newer transaction.
            tracing::warn!(
                order_id,
                transaction_id = %notification.data.id,
                current_transaction_id = %current,
                "Webhook references a replaced transaction"
            );
            Ok(None)
        }
        Some(_) => Ok(Some(PaymentLookup::Order(order_id))),
    }
}

/// Processes a freshly recorded or due event and stores the result on its inbox row.
pub async fn handle(
    conn: &mut AsyncPgConnection,
    event: &WebhookEventEntity,
    max_attempts: i32,
) -> Result<InboxStatus, AppError> {
    match process(conn, event).await {
        Ok(status) => {
            mark_done(conn, event.id, status).await?;
            Ok(status)
        }
        Err(err) => {
            let attempts = event.attempts + 1;
            tracing::error!(
                event_id = event.id,
                attempts,
                error = %err,
                "Webhook processing failed"
            );
            mark_failed(conn, event.id, attempts, &err.to_string()).await?;
            if attempts >= max_attempts {
                tracing::error!(event_id = event.id, "Webhook event gave up after {attempts} attempts");
            }
            Ok(InboxStatus::Failed)
        }
    }
}

async fn mark_done(
    conn: &mut AsyncPgConnection,
    event_id: i32,
    status: InboxStatus,
) -> Result<(), AppError> {
    diesel::update(webhook_events::table.find(event_id))
        .set((
            webhook_events::status.eq(status.to_string()),
            webhook_events::last_error.eq(None::<String>),
            webhook_events::updated_at.eq(diesel::dsl::now),
        ))
        .execute(conn)
        .await
        .context("Failed to update webhook event")?;
    Ok(())
}

async fn mark_failed(
    conn: &mut AsyncPgConnection,
    event_id: i32,
    attempts: i32,
    error: &str,
) -> Result<(), AppError> {
    diesel::update(webhook_events::table.find(event_id))
        .set((
            webhook_events::status.eq(InboxStatus::Failed.to_string()),
            webhook_events::attempts.eq(attempts),
            webhook_events::last_error.eq(error),
            webhook_events::next_attempt_at.eq(next_attempt_at(Utc::now(), attempts)),
            webhook_events::updated_at.eq(diesel::dsl::now),
        ))
        .execute(conn)
        .await
        .context("Failed to update webhook event")?;
    Ok(())
}

/// Exponential backoff: 30s, 60s, 120s ... capped at one hour.
pub fn next_attempt_at(now: DateTime<Utc>, attempts: i32) -> DateTime<Utc> {
    let exponent = attempts.clamp(1, 16) as u32 - 1;
    let delay = 30_i64.saturating_mul(1_i64 << exponent).min(MAX_BACKOFF_SECS);
    now + Duration::seconds(delay)
}

/// Failed events whose next attempt is due, plus events left `RECEIVED` by a request that
/// died before recording an outcome.
pub async fn due_for_retry(
    conn: &mut AsyncPgConnection,
    max_attempts: i32,
    limit: i64,
) -> Result<Vec<WebhookEventEntity>, AppError> {
    let stale_before = Utc::now() - Duration::seconds(STALE_RECEIVED_SECS);

    Ok(webhook_events::table
        .filter(
            webhook_events::status
                .eq(InboxStatus::Failed.to_string())
                .and(webhook_events::next_attempt_at.le(diesel::dsl::now))
                .or(webhook_events::status
                    .eq(InboxStatus::Received.to_string())
                    .and(webhook_events::created_at.le(stale_before))),
        )
        .filter(webhook_events::attempts.lt(max_attempts))
        .order_by(webhook_events::next_attempt_at.asc())
        .limit(limit)
        .select(WebhookEventEntity::as_select())
        .get_results(conn)
        .await
        .context("Failed to get due webhook events")?)
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;

    fn notification(body: &str) -> WebhookNotification {
        serde_json::from_str(body).unwrap()
    }

    #[test]
    fn accepts_both_payload_shapes() {
        let legacy = notification(
            r#"{"event": "transaction.approved", "data": {"id": 77, "description": "Commande Fresh Market #12"}}"#,
        );
        assert_eq!(legacy.kind(), NotificationKind::Approved);
        assert_eq!(legacy.data.id, "77");

        let current = notification(
            r#"{"name": "transaction.declined", "entity": {"id": "78", "custom_metadata": {"order_id": 13}}}"#,
        );
        assert_eq!(current.kind(), NotificationKind::Declined);
        assert_eq!(current.order_reference(), Some(13));
    }

    #[test]
    fn metadata_wins_over_description() {
        let n = notification(
            r##"{"event": "transaction.approved", "data": {"id": 1, "description": "Commande #99", "custom_metadata": {"order_id": "42"}}}"##,
        );
        assert_eq!(n.order_reference(), Some(42));
    }

    #[test]
    fn description_marker_is_the_fallback() {
        let n = notification(
            r#"{"event": "transaction.approved", "data": {"id": 1, "description": "Commande Fresh Market #512"}}"#,
        );
        assert_eq!(n.order_reference(), Some(512));

        let none = notification(
            r#"{"event": "transaction.approved", "data": {"id": 1, "description": "no marker"}}"#,
        );
        assert_eq!(none.order_reference(), None);
    }

    #[test]
    fn unrelated_events_are_other() {
        let n = notification(r#"{"event": "customer.created", "data": {"id": 5}}"#);
        assert_eq!(n.kind(), NotificationKind::Other);
    }

    #[test]
    fn signature_round_trip() {
        let body = br#"{"event":"transaction.approved"}"#;
        let header = sign_payload("whsec", 1_700_000_000, body).unwrap();
        assert!(verify_signature("whsec", &header, body));
        assert!(!verify_signature("other", &header, body));
        assert!(!verify_signature("whsec", &header, b"tampered"));
        assert!(!verify_signature("whsec", "s=deadbeef", body));
        assert!(!verify_signature("whsec", "t=1,s=not-hex", body));
    }

    #[test]
    fn backoff_doubles_and_is_capped() {
        let now = Utc::now();
        assert_eq!(next_attempt_at(now, 1) - now, Duration::seconds(30));
        assert_eq!(next_attempt_at(now, 2) - now, Duration::seconds(60));
        assert_eq!(next_attempt_at(now, 3) - now, Duration::seconds(120));
        assert_eq!(next_attempt_at(now, 12) - now, Duration::seconds(MAX_BACKOFF_SECS));
    }

    #[test]
    fn inbox_status_is_stored_in_upper_case() {
        assert_eq!(InboxStatus::Received.to_string(), "RECEIVED");
        assert_eq!(InboxStatus::from_str("FAILED").unwrap(), InboxStatus::Failed);
    }
}
