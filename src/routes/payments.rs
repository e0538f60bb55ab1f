use axum::{
    Extension, Json,
    extract::{Path, State},
    middleware,
    response::IntoResponse,
};
use serde::Deserialize;
use utoipa::ToSchema;
use utoipa_axum::router::OpenApiRouter;

use crate::{
    app_error::{AppError, StdResponse},
    app_state::AppState,
    middleware::{AuthUser, authorization, buyers_authorization},
    services::payments::{self, PaymentInitiation, PaymentPoll},
    types::PaymentMethod,
};

pub fn routes_with_openapi(state: &AppState) -> OpenApiRouter<AppState> {
    let buyer_routes = OpenApiRouter::new()
        .routes(utoipa_axum::routes!(initiate_payment))
        .route_layer(middleware::from_fn(buyers_authorization));

    OpenApiRouter::new().nest(
        "/payments",
        OpenApiRouter::new()
            .routes(utoipa_axum::routes!(get_payment_status))
            .merge(buyer_routes)
            .route_layer(middleware::from_fn_with_state(state.clone(), authorization)),
    )
}

#[derive(Deserialize, ToSchema)]
pub struct InitiatePaymentReq {
    #[serde(rename = "modePaiement", alias = "method")]
    pub method: PaymentMethod,
    /// Payer's mobile-money number; defaults to the account phone.
    #[serde(rename = "telephone", alias = "phone", default)]
    pub phone: Option<String>,
}

/// Start payment of a pending order. Mobile-money payers get a prompt on their handset.
#[utoipa::path(
    post,
    path = "/initier/{order_id}",
    tags = ["Payments"],
    params(
        ("order_id" = i32, Path, description = "Order ID to pay")
    ),
    request_body = InitiatePaymentReq,
    security(("bearerAuth" = [])),
    responses(
        (status = 200, description = "Payment initiated", body = StdResponse<PaymentInitiation, String>),
        (status = 400, description = "Payment provider refused the transaction"),
        (status = 403, description = "Caller does not own the order"),
        (status = 409, description = "Order is not awaiting payment")
    )
)]
async fn initiate_payment(
    Path(order_id): Path<i32>,
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(body): Json<InitiatePaymentReq>,
) -> Result<impl IntoResponse, AppError> {
    let method = body.method;
    let initiation =
        payments::initiate_payment(&state, order_id, user, method, body.phone).await?;

    let message = if method.is_mobile_money() {
        "Payment initiated, please confirm on your phone"
    } else {
        "Payment initiated"
    };
    Ok(StdResponse {
        data: Some(initiation),
        message: Some(message),
    })
}

/// Check a transaction with the provider and reconcile the order.
#[utoipa::path(
    get,
    path = "/statut/{transaction_id}",
    tags = ["Payments"],
    params(
        ("transaction_id" = String, Path, description = "Provider transaction ID")
    ),
    security(("bearerAuth" = [])),
    responses(
        (status = 200, description = "Current payment status", body = StdResponse<PaymentPoll, String>),
        (status = 404, description = "Unknown transaction")
    )
)]
async fn get_payment_status(
    Path(transaction_id): Path<String>,
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<impl IntoResponse, AppError> {
    let poll = payments::poll_payment_status(&state, &transaction_id, user).await?;
    Ok(StdResponse {
        data: Some(poll),
        message: Some("Get payment status successfully"),
    })
}

