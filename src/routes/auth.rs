use anyhow::Context;
use axum::{
    Extension, Json,
    extract::State,
    http::StatusCode,
    middleware,
    response::IntoResponse,
};
use utoipa_axum::router::OpenApiRouter;

use crate::{
    app_error::{AppError, StdResponse},
    app_state::AppState,
    middleware::{AuthUser, authorization},
    models::AccountEntity,
    services::accounts::{self, AuthPayload, LoginReq, RegisterReq},
};

pub fn routes_with_openapi(state: &AppState) -> OpenApiRouter<AppState> {
    let protected = OpenApiRouter::new()
        .routes(utoipa_axum::routes!(me))
        .route_layer(middleware::from_fn_with_state(state.clone(), authorization));

    OpenApiRouter::new().nest(
        "/auth",
        OpenApiRouter::new()
            .routes(utoipa_axum::routes!(register))
            .routes(utoipa_axum::routes!(login))
            .merge(protected),
    )
}

/// Create a buyer or supplier account.
#[utoipa::path(
    post,
    path = "/register",
    tags = ["Auth"],
    request_body = RegisterReq,
    responses(
        (status = 201, description = "Account created", body = StdResponse<AuthPayload, String>),
        (status = 400, description = "Invalid input or email/phone already used")
    )
)]
async fn register(
    State(state): State<AppState>,
    Json(body): Json<RegisterReq>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let payload = accounts::register(conn, body, &state.config.auth).await?;
    Ok((
        StatusCode::CREATED,
        StdResponse {
            data: Some(payload),
            message: Some("Account created successfully"),
        },
    ))
}

/// Exchange credentials for a bearer token.
#[utoipa::path(
    post,
    path = "/login",
    tags = ["Auth"],
    request_body = LoginReq,
    responses(
        (status = 200, description = "Logged in", body = StdResponse<AuthPayload, String>),
        (status = 401, description = "Invalid email or password")
    )
)]
async fn login(
    State(state): State<AppState>,
    Json(body): Json<LoginReq>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let payload = accounts::login(conn, body, &state.config.auth).await?;
    Ok(StdResponse {
        data: Some(payload),
        message: Some("Logged in successfully"),
    })
}

/// The authenticated account.
#[utoipa::path(
    get,
    path = "/me",
    tags = ["Auth"],
    security(("bearerAuth" = [])),
    responses(
        (status = 200, description = "Current account", body = StdResponse<AccountEntity, String>),
        (status = 401, description = "Missing or invalid token")
    )
)]
async fn me(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let account = accounts::find_account(conn, user.id).await?;
    Ok(StdResponse {
        data: Some(account),
        message: Some("Get account successfully"),
    })
}
