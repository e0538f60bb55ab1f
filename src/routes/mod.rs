use anyhow::Context;
use axum::{Router, extract::State, response::IntoResponse};
use diesel_async::RunQueryDsl;
use serde::Serialize;
use utoipa::ToSchema;
use utoipa_axum::router::OpenApiRouter;

use crate::{
    app_error::{AppError, StdResponse},
    app_state::AppState,
    swagger,
};

pub mod auth;
pub mod orders;
pub mod payments;
pub mod products;
pub mod webhooks;

/// Every API router, nested under `/api`, plus `/health`.
pub fn routes_with_openapi(state: &AppState) -> OpenApiRouter<AppState> {
    let api = OpenApiRouter::new()
        .merge(auth::routes_with_openapi(state))
        .merge(products::routes_with_openapi(state))
        .merge(orders::routes_with_openapi(state))
        .merge(payments::routes_with_openapi(state))
        .merge(webhooks::routes_with_openapi());

    OpenApiRouter::new()
        .routes(utoipa_axum::routes!(health))
        .nest("/api", api)
}

/// The full application: API routes plus the generated OpenAPI document and Swagger UI.
pub fn app(state: &AppState) -> Router<AppState> {
    let routes = routes_with_openapi(state);

    let mut openapi = routes.get_openapi().clone();
    openapi.info = utoipa::openapi::InfoBuilder::new()
        .title("Fresh Market API")
        .version("1.0.0")
        .build();
    let swagger_ui = swagger::create_swagger_ui(openapi);

    Router::new().merge(routes).merge(swagger_ui)
}

#[derive(Serialize, ToSchema)]
pub struct HealthRes {
    pub status: &'static str,
}

/// Liveness with a database round-trip.
#[utoipa::path(
    get,
    path = "/health",
    tags = ["Health"],
    responses(
        (status = 200, description = "Service and database are up", body = StdResponse<HealthRes, String>),
        (status = 500, description = "Database unreachable")
    )
)]
async fn health(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;
    diesel::sql_query("SELECT 1")
        .execute(conn)
        .await
        .context("Database health check failed")?;

    Ok(StdResponse {
        data: Some(HealthRes { status: "ok" }),
        message: Some("OK"),
    })
}
