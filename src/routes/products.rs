use anyhow::Context;
use axum::{
    Extension, Json,
    extract::{Path, Query, State},
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
    middleware::{AuthUser, authorization, suppliers_authorization},
    models::ProductEntity,
    services::{
        accounts,
        products::{self, CreateProductReq, ProductFilter, UpdateProductReq},
    },
};

pub fn routes_with_openapi(state: &AppState) -> OpenApiRouter<AppState> {
    let supplier_routes = OpenApiRouter::new()
        .routes(utoipa_axum::routes!(create_product))
        .routes(utoipa_axum::routes!(get_my_products))
        .routes(utoipa_axum::routes!(update_product, delete_product))
        .routes(utoipa_axum::routes!(set_availability))
        .route_layer(middleware::from_fn(suppliers_authorization))
        .route_layer(middleware::from_fn_with_state(state.clone(), authorization));

    OpenApiRouter::new().nest(
        "/products",
        OpenApiRouter::new()
            .routes(utoipa_axum::routes!(get_products))
            .routes(utoipa_axum::routes!(get_product))
            .routes(utoipa_axum::routes!(get_supplier_products))
            .merge(supplier_routes),
    )
}

#[derive(Deserialize, ToSchema)]
pub struct AvailabilityReq {
    #[serde(rename = "disponible", alias = "available")]
    pub available: bool,
}

/// List available products, newest first.
#[utoipa::path(
    get,
    path = "/",
    tags = ["Products"],
    params(ProductFilter),
    responses(
        (status = 200, description = "Get products successfully", body = StdResponse<Vec<ProductEntity>, String>)
    )
)]
async fn get_products(
    State(state): State<AppState>,
    Query(filter): Query<ProductFilter>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let products = products::list_products(conn, filter).await?;
    Ok(StdResponse {
        data: Some(products),
        message: Some("Get products successfully"),
    })
}

/// Fetch a single product.
#[utoipa::path(
    get,
    path = "/{id}",
    tags = ["Products"],
    params(
        ("id" = i32, Path, description = "Product ID to fetch")
    ),
    responses(
        (status = 200, description = "Get product successfully", body = StdResponse<ProductEntity, String>),
        (status = 404, description = "Product not found")
    )
)]
async fn get_product(
    Path(id): Path<i32>,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let product = products::get_product(conn, id).await?;
    Ok(StdResponse {
        data: Some(product),
        message: Some("Get product successfully"),
    })
}

/// A supplier's available products.
#[utoipa::path(
    get,
    path = "/fournisseur/{supplier_id}",
    tags = ["Products"],
    params(
        ("supplier_id" = i32, Path, description = "Supplier account ID")
    ),
    responses(
        (status = 200, description = "Get supplier products successfully", body = StdResponse<Vec<ProductEntity>, String>)
    )
)]
async fn get_supplier_products(
    Path(supplier_id): Path<i32>,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let products = products::list_supplier_products(conn, supplier_id, false).await?;
    Ok(StdResponse {
        data: Some(products),
        message: Some("Get supplier products successfully"),
    })
}

/// Publish a product. Its location is taken from the supplier's account.
#[utoipa::path(
    post,
    path = "/",
    tags = ["Products"],
    request_body = CreateProductReq,
    security(("bearerAuth" = [])),
    responses(
        (status = 201, description = "Product created", body = StdResponse<ProductEntity, String>),
        (status = 400, description = "Invalid product")
    )
)]
async fn create_product(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(body): Json<CreateProductReq>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let supplier = accounts::find_account(conn, user.id).await?;
    let product = products::create_product(conn, &supplier, body).await?;
    Ok((
        StatusCode::CREATED,
        StdResponse {
            data: Some(product),
            message: Some("Product created successfully"),
        },
    ))
}

/// The authenticated supplier's products, including unavailable ones.
#[utoipa::path(
    get,
    path = "/mes-produits",
    tags = ["Products"],
    security(("bearerAuth" = [])),
    responses(
        (status = 200, description = "Get my products successfully", body = StdResponse<Vec<ProductEntity>, String>)
    )
)]
async fn get_my_products(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let products = products::list_supplier_products(conn, user.id, true).await?;
    Ok(StdResponse {
        data: Some(products),
        message: Some("Get my products successfully"),
    })
}

/// Edit a product. Owner only; omitted fields are unchanged.
#[utoipa::path(
    put,
    path = "/{id}",
    tags = ["Products"],
    params(
        ("id" = i32, Path, description = "Product ID to update")
    ),
    request_body = UpdateProductReq,
    security(("bearerAuth" = [])),
    responses(
        (status = 200, description = "Product updated", body = StdResponse<ProductEntity, String>),
        (status = 403, description = "Not the owner")
    )
)]
async fn update_product(
    Path(id): Path<i32>,
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(body): Json<UpdateProductReq>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let product = products::update_product(conn, id, user.id, body).await?;
    Ok(StdResponse {
        data: Some(product),
        message: Some("Product updated successfully"),
    })
}

/// Remove a product from the catalog. Past orders keep their line snapshots.
#[utoipa::path(
    delete,
    path = "/{id}",
    tags = ["Products"],
    params(
        ("id" = i32, Path, description = "Product ID to delete")
    ),
    security(("bearerAuth" = [])),
    responses(
        (status = 200, description = "Product deleted"),
        (status = 403, description = "Not the owner")
    )
)]
async fn delete_product(
    Path(id): Path<i32>,
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    products::delete_product(conn, id, user.id).await?;
    Ok(StdResponse::<(), &str> {
        data: None,
        message: Some("Product deleted successfully"),
    })
}

/// Show or hide a product without touching its stock.
#[utoipa::path(
    patch,
    path = "/{id}/disponibilite",
    tags = ["Products"],
    params(
        ("id" = i32, Path, description = "Product ID")
    ),
    request_body = AvailabilityReq,
    security(("bearerAuth" = [])),
    responses(
        (status = 200, description = "Availability updated", body = StdResponse<ProductEntity, String>),
        (status = 403, description = "Not the owner")
    )
)]
async fn set_availability(
    Path(id): Path<i32>,
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(body): Json<AvailabilityReq>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let product = products::set_availability(conn, id, user.id, body.available).await?;
    Ok(StdResponse {
        data: Some(product),
        message: Some("Availability updated successfully"),
    })
}
