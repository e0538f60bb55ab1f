use anyhow::Context;
use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    middleware,
    response::IntoResponse,
};
use serde::Deserialize;
use utoipa::ToSchema;
use utoipa_axum::router::OpenApiRouter;

use crate::{
    app_error::{AppError, StdResponse},
    app_state::AppState,
    lifecycle::OrderStatus,
    middleware::{AuthUser, authorization, buyers_authorization, suppliers_authorization},
    services::{
        accounts,
        orders::{self, CartLine, DeliveryAddress, OrderDetails},
    },
};

pub fn routes_with_openapi(state: &AppState) -> OpenApiRouter<AppState> {
    let buyer_routes = OpenApiRouter::new()
        .routes(utoipa_axum::routes!(create_order))
        .routes(utoipa_axum::routes!(get_buyer_orders))
        .routes(utoipa_axum::routes!(cancel_order))
        .routes(utoipa_axum::routes!(rate_order))
        .route_layer(middleware::from_fn(buyers_authorization));

    let supplier_routes = OpenApiRouter::new()
        .routes(utoipa_axum::routes!(get_supplier_orders))
        .routes(utoipa_axum::routes!(update_order_status))
        .route_layer(middleware::from_fn(suppliers_authorization));

    OpenApiRouter::new().nest(
        "/orders",
        OpenApiRouter::new()
            .routes(utoipa_axum::routes!(get_order))
            .merge(buyer_routes)
            .merge(supplier_routes)
            .route_layer(middleware::from_fn_with_state(state.clone(), authorization)),
    )
}

#[derive(Deserialize, ToSchema)]
pub struct CreateOrderReq {
    #[serde(rename = "produits", alias = "items")]
    pub items: Vec<CartLine>,
    #[serde(rename = "adresseLivraison", alias = "delivery_address")]
    pub delivery_address: DeliveryAddress,
}

#[derive(Deserialize, ToSchema)]
pub struct UpdateStatusReq {
    #[serde(rename = "statut", alias = "status")]
    pub status: OrderStatus,
    #[serde(rename = "commentaire", alias = "comment", default)]
    pub comment: Option<String>,
}

#[derive(Deserialize, ToSchema, Default)]
pub struct CancelOrderReq {
    #[serde(rename = "commentaire", alias = "comment", default)]
    pub comment: Option<String>,
}

#[derive(Deserialize, ToSchema)]
pub struct RateOrderReq {
    #[serde(rename = "note", alias = "rating")]
    pub rating: i16,
    #[serde(rename = "commentaire", alias = "comment", default)]
    pub comment: Option<String>,
}

/// Place an order from a single-supplier cart.
#[utoipa::path(
    post,
    path = "/",
    tags = ["Orders"],
    request_body = CreateOrderReq,
    security(("bearerAuth" = [])),
    responses(
        (status = 201, description = "Order created", body = StdResponse<OrderDetails, String>),
        (status = 400, description = "Empty cart, mixed suppliers, unavailable product or insufficient stock"),
        (status = 404, description = "Product not found")
    )
)]
async fn create_order(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(body): Json<CreateOrderReq>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let buyer = accounts::find_account(conn, user.id).await?;
    let details = orders::create_order(
        conn,
        &buyer,
        body.items,
        body.delivery_address,
        state.config.orders.delivery_fee,
    )
    .await?;

    Ok((
        StatusCode::CREATED,
        StdResponse {
            data: Some(details),
            message: Some("Order created successfully"),
        },
    ))
}

/// List the authenticated buyer's orders, newest first.
#[utoipa::path(
    get,
    path = "/acheteur",
    tags = ["Orders"],
    security(("bearerAuth" = [])),
    responses(
        (status = 200, description = "List my orders", body = StdResponse<Vec<OrderDetails>, String>)
    )
)]
async fn get_buyer_orders(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<impl IntoResponse, AppError> {
    list_for(&state, user).await
}

/// List the orders addressed to the authenticated supplier, newest first.
#[utoipa::path(
    get,
    path = "/fournisseur",
    tags = ["Orders"],
    security(("bearerAuth" = [])),
    responses(
        (status = 200, description = "List received orders", body = StdResponse<Vec<OrderDetails>, String>)
    )
)]
async fn get_supplier_orders(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<impl IntoResponse, AppError> {
    list_for(&state, user).await
}

async fn list_for(
    state: &AppState,
    user: AuthUser,
) -> Result<StdResponse<Vec<OrderDetails>, &'static str>, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let orders = orders::list_orders_for(conn, user).await?;
    Ok(StdResponse {
        data: Some(orders),
        message: Some("Get orders successfully"),
    })
}

/// Fetch a specific order. Only its buyer and supplier may read it.
#[utoipa::path(
    get,
    path = "/{id}",
    tags = ["Orders"],
    params(
        ("id" = i32, Path, description = "Order ID to fetch")
    ),
    security(("bearerAuth" = [])),
    responses(
        (status = 200, description = "Get order successfully", body = StdResponse<OrderDetails, String>),
        (status = 403, description = "Caller is neither the buyer nor the supplier"),
        (status = 404, description = "Order not found")
    )
)]
async fn get_order(
    Path(id): Path<i32>,
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let details = orders::get_order_for(conn, id, user).await?;
    Ok(StdResponse {
        data: Some(details),
        message: Some("Get order successfully"),
    })
}

/// Move an order along its lifecycle. Supplier only.
#[utoipa::path(
    put,
    path = "/{id}/statut",
    tags = ["Orders"],
    params(
        ("id" = i32, Path, description = "Order ID to update")
    ),
    request_body = UpdateStatusReq,
    security(("bearerAuth" = [])),
    responses(
        (status = 200, description = "Order status updated", body = StdResponse<OrderDetails, String>),
        (status = 409, description = "Transition not allowed from the current status")
    )
)]
async fn update_order_status(
    Path(id): Path<i32>,
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(body): Json<UpdateStatusReq>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let details = orders::update_status(conn, id, user.id, body.status, body.comment).await?;
    Ok(StdResponse {
        data: Some(details),
        message: Some("Order status updated successfully"),
    })
}

/// Cancel a pending or paid order and restore its stock. Buyer only.
#[utoipa::path(
    post,
    path = "/{id}/annuler",
    tags = ["Orders"],
    params(
        ("id" = i32, Path, description = "Order ID to cancel")
    ),
    request_body = CancelOrderReq,
    security(("bearerAuth" = [])),
    responses(
        (status = 200, description = "Order cancelled", body = StdResponse<OrderDetails, String>),
        (status = 409, description = "Order can no longer be cancelled")
    )
)]
async fn cancel_order(
    Path(id): Path<i32>,
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    body: Option<Json<CancelOrderReq>>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let comment = body.and_then(|Json(body)| body.comment);
    let details = orders::cancel_order(conn, id, user, comment).await?;
    Ok(StdResponse {
        data: Some(details),
        message: Some("Order cancelled successfully"),
    })
}

/// Rate a delivered order, once. Buyer only.
#[utoipa::path(
    post,
    path = "/{id}/avis",
    tags = ["Orders"],
    params(
        ("id" = i32, Path, description = "Order ID to review")
    ),
    request_body = RateOrderReq,
    security(("bearerAuth" = [])),
    responses(
        (status = 200, description = "Review recorded", body = StdResponse<OrderDetails, String>),
        (status = 409, description = "Order not delivered or already reviewed")
    )
)]
async fn rate_order(
    Path(id): Path<i32>,
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(body): Json<RateOrderReq>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let details = orders::rate_order(conn, id, user.id, body.rating, body.comment).await?;
    Ok(StdResponse {
        data: Some(details),
        message: Some("Review recorded successfully"),
    })
}
