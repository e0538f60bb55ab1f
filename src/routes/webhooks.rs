use anyhow::Context;
use axum::{body::Bytes, extract::State, http::HeaderMap, response::IntoResponse};
use serde::Serialize;
use serde_json::Value;
use utoipa::ToSchema;
use utoipa_axum::router::OpenApiRouter;

use crate::{
    app_error::{AppError, StdResponse},
    app_state::AppState,
    services::webhooks::{self, Recorded, SIGNATURE_HEADER, WebhookNotification},
};

pub fn routes_with_openapi() -> OpenApiRouter<AppState> {
    OpenApiRouter::new().nest(
        "/webhooks",
        OpenApiRouter::new().routes(utoipa_axum::routes!(fedapay_webhook)),
    )
}

#[derive(Serialize, ToSchema)]
pub struct WebhookAck {
    pub received: bool,
    pub duplicate: bool,
    /// Outcome recorded in the inbox, absent for duplicates.
    pub status: Option<String>,
}

/// FedaPay transaction notifications.
///
/// Every notification that can be stored is acknowledged with 200, including ones whose
/// processing failed; those are retried from the inbox.
#[utoipa::path(
    post,
    path = "/fedapay",
    tags = ["Webhooks"],
    request_body(content = Object, description = "FedaPay event payload"),
    responses(
        (status = 200, description = "Notification stored", body = StdResponse<WebhookAck, String>),
        (status = 400, description = "Body is not a FedaPay notification"),
        (status = 401, description = "Signature check failed"),
        (status = 500, description = "Notification could not be stored")
    )
)]
async fn fedapay_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, AppError> {
    if let Some(secret) = &state.config.fedapay.webhook_secret {
        let signature = headers
            .get(SIGNATURE_HEADER)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default();
        if !webhooks::verify_signature(secret, signature, &body) {
            tracing::warn!("Rejected webhook with an invalid signature");
            return Err(AppError::Unauthorized("Invalid webhook signature".into()));
        }
    }

    let payload: Value = serde_json::from_slice(&body)
        .map_err(|err| AppError::BadRequest(format!("Invalid webhook body: {err}")))?;
    let notification: WebhookNotification = serde_json::from_value(payload.clone())
        .map_err(|err| AppError::BadRequest(format!("Invalid webhook body: {err}")))?;
    tracing::info!(
        event = %notification.event,
        transaction_id = %notification.data.id,
        "Webhook received"
    );

    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let event = match webhooks::record(conn, &notification, payload).await? {
        Recorded::New(event) => event,
        Recorded::Duplicate => {
            tracing::info!(
                event = %notification.event,
                transaction_id = %notification.data.id,
                "Duplicate webhook ignored"
            );
            return Ok(StdResponse {
                data: Some(WebhookAck {
                    received: true,
                    duplicate: true,
                    status: None,
                }),
                message: Some("Already received"),
            });
        }
    };

    // Stored: from here on the gateway always gets a 200.
    let status = match webhooks::handle(conn, &event, state.config.webhooks.max_attempts).await {
        Ok(status) => status.to_string(),
        Err(err) => {
            tracing::error!(event_id = event.id, error = %err, "Webhook left for the retry worker");
            event.status.clone()
        }
    };

    Ok(StdResponse {
        data: Some(WebhookAck {
            received: true,
            duplicate: false,
            status: Some(status),
        }),
        message: Some("Received"),
    })
}
