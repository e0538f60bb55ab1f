//! Product catalog. Stock is only ever changed by the order transactions; this module
//! covers the supplier-facing listing CRUD.

use anyhow::Context;
use chrono::Utc;
use diesel::{
    BoolExpressionMethods, ExpressionMethods, OptionalExtension, PgTextExpressionMethods,
    QueryDsl, SelectableHelper,
};
use diesel_async::{AsyncPgConnection, RunQueryDsl};
use serde::Deserialize;
use utoipa::{IntoParams, ToSchema};

use crate::{
    app_error::AppError,
    models::{AccountEntity, CreateProductEntity, ProductEntity, UpdateProductEntity},
    schema::products,
    types::{Category, ProductType, Unit},
};

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct CreateProductReq {
    #[serde(rename = "nom", alias = "name")]
    pub name: String,
    #[serde(rename = "categorie", alias = "category")]
    pub category: Category,
    #[serde(rename = "type", alias = "product_type")]
    pub product_type: ProductType,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(rename = "prix", alias = "unit_price")]
    pub unit_price: i64,
    #[serde(rename = "unite", alias = "unit", default)]
    pub unit: Unit,
    #[serde(rename = "quantiteDisponible", alias = "quantity")]
    pub quantity: i32,
}

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct UpdateProductReq {
    #[serde(rename = "nom", alias = "name", default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(rename = "prix", alias = "unit_price", default)]
    pub unit_price: Option<i64>,
    #[serde(rename = "unite", alias = "unit", default)]
    pub unit: Option<Unit>,
    #[serde(rename = "quantiteDisponible", alias = "quantity", default)]
    pub quantity: Option<i32>,
    #[serde(rename = "disponible", alias = "available", default)]
    pub available: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ProductFilter {
    #[serde(rename = "type", default)]
    pub product_type: Option<ProductType>,
    #[serde(rename = "categorie", default)]
    pub category: Option<Category>,
    #[serde(rename = "ville", default)]
    pub city: Option<String>,
    #[serde(rename = "prixMin", default)]
    pub min_price: Option<i64>,
    #[serde(rename = "prixMax", default)]
    pub max_price: Option<i64>,
    /// Case-insensitive match on name or description.
    #[serde(default)]
    pub search: Option<String>,
}

fn validate_new(req: &CreateProductReq) -> Result<(), AppError> {
    if req.name.trim().is_empty() {
        return Err(AppError::BadRequest("Product name is required".into()));
    }
    if req.category.product_type() != req.product_type {
        return Err(AppError::BadRequest(format!(
            "Category {} does not belong to type {}",
            req.category, req.product_type
        )));
    }
    validate_amounts(Some(req.unit_price), Some(req.quantity))
}

fn validate_amounts(unit_price: Option<i64>, quantity: Option<i32>) -> Result<(), AppError> {
    if unit_price.is_some_and(|p| p < 0) {
        return Err(AppError::BadRequest("Price cannot be negative".into()));
    }
    if quantity.is_some_and(|q| q < 0) {
        return Err(AppError::BadRequest("Quantity cannot be negative".into()));
    }
    Ok(())
}

pub async fn create_product(
    conn: &mut AsyncPgConnection,
    supplier: &AccountEntity,
    req: CreateProductReq,
) -> Result<ProductEntity, AppError> {
    validate_new(&req)?;

    let product = diesel::insert_into(products::table)
        .values(CreateProductEntity {
            supplier_id: supplier.id,
            name: req.name.trim().to_string(),
            category: req.category.to_string(),
            product_type: req.product_type.to_string(),
            description: req.description,
            unit_price: req.unit_price,
            unit: req.unit.to_string(),
            quantity: req.quantity,
            available: true,
            city: supplier.city.clone(),
            district: supplier.district.clone(),
        })
        .returning(ProductEntity::as_returning())
        .get_result(conn)
        .await
        .context("Failed to create product")?;

    tracing::info!(product_id = product.id, supplier_id = supplier.id, "Product created");
    Ok(product)
}

/// Public listing: available, non-deleted products, newest first.
pub async fn list_products(
    conn: &mut AsyncPgConnection,
    filter: ProductFilter,
) -> Result<Vec<ProductEntity>, AppError> {
    let mut query = products::table
        .filter(products::deleted_at.is_null())
        .filter(products::available.eq(true))
        .select(ProductEntity::as_select())
        .order_by((products::created_at.desc(), products::id.desc()))
        .into_boxed::<diesel::pg::Pg>();

    if let Some(product_type) = filter.product_type {
        query = query.filter(products::product_type.eq(product_type.to_string()));
    }
    if let Some(category) = filter.category {
        query = query.filter(products::category.eq(category.to_string()));
    }
    if let Some(city) = filter.city.filter(|c| !c.trim().is_empty()) {
        query = query.filter(products::city.ilike(format!("%{}%", city.trim())));
    }
    if let Some(min_price) = filter.min_price {
        query = query.filter(products::unit_price.ge(min_price));
    }
    if let Some(max_price) = filter.max_price {
        query = query.filter(products::unit_price.le(max_price));
    }
    if let Some(search) = filter.search.filter(|s| !s.trim().is_empty()) {
        let pattern = format!("%{}%", search.trim());
        query = query.filter(
            products::name
                .ilike(pattern.clone())
                .or(products::description.ilike(pattern)),
        );
    }

    Ok(query
        .get_results(conn)
        .await
        .context("Failed to get products")?)
}

/// A supplier's listings. The owner also sees unavailable ones.
pub async fn list_supplier_products(
    conn: &mut AsyncPgConnection,
    supplier_id: i32,
    include_unavailable: bool,
) -> Result<Vec<ProductEntity>, AppError> {
    let mut query = products::table
        .filter(products::supplier_id.eq(supplier_id))
        .filter(products::deleted_at.is_null())
        .select(ProductEntity::as_select())
        .order_by((products::created_at.desc(), products::id.desc()))
        .into_boxed::<diesel::pg::Pg>();
    if !include_unavailable {
        query = query.filter(products::available.eq(true));
    }

    Ok(query
        .get_results(conn)
        .await
        .context("Failed to get supplier products")?)
}

pub async fn get_product(
    conn: &mut AsyncPgConnection,
    product_id: i32,
) -> Result<ProductEntity, AppError> {
    products::table
        .find(product_id)
        .filter(products::deleted_at.is_null())
        .select(ProductEntity::as_select())
        .get_result(conn)
        .await
        .optional()
        .context("Failed to get product")?
        .ok_or_else(|| AppError::NotFound("Product not found".into()))
}

async fn owned_product(
    conn: &mut AsyncPgConnection,
    product_id: i32,
    supplier_id: i32,
) -> Result<ProductEntity, AppError> {
    let product = get_product(conn, product_id).await?;
    if product.supplier_id != supplier_id {
        return Err(AppError::ForbiddenResource(
            "You are not allowed to modify this product".into(),
        ));
    }
    Ok(product)
}

pub async fn update_product(
    conn: &mut AsyncPgConnection,
    product_id: i32,
    supplier_id: i32,
    req: UpdateProductReq,
) -> Result<ProductEntity, AppError> {
    validate_amounts(req.unit_price, req.quantity)?;
    if req.name.as_deref().is_some_and(|n| n.trim().is_empty()) {
        return Err(AppError::BadRequest("Product name cannot be empty".into()));
    }
    owned_product(conn, product_id, supplier_id).await?;

    let changes = UpdateProductEntity {
        name: req.name.map(|n| n.trim().to_string()),
        description: req.description,
        unit_price: req.unit_price,
        unit: req.unit.map(|u| u.to_string()),
        quantity: req.quantity,
        available: req.available,
        updated_at: Some(Utc::now()),
    };

    Ok(diesel::update(products::table.find(product_id))
        .set(&changes)
        .returning(ProductEntity::as_returning())
        .get_result(conn)
        .await
        .context("Failed to update product")?)
}

pub async fn set_availability(
    conn: &mut AsyncPgConnection,
    product_id: i32,
    supplier_id: i32,
    available: bool,
) -> Result<ProductEntity, AppError> {
    owned_product(conn, product_id, supplier_id).await?;

    Ok(diesel::update(products::table.find(product_id))
        .set((
            products::available.eq(available),
            products::updated_at.eq(diesel::dsl::now),
        ))
        .returning(ProductEntity::as_returning())
        .get_result(conn)
        .await
        .context("Failed to update product availability")?)
}

/// Soft delete: the row stays so order lines keep resolving.
pub async fn delete_product(
    conn: &mut AsyncPgConnection,
    product_id: i32,
    supplier_id: i32,
) -> Result<(), AppError> {
    owned_product(conn, product_id, supplier_id).await?;

    diesel::update(products::table.find(product_id))
        .set((
            products::deleted_at.eq(diesel::dsl::now),
            products::available.eq(false),
            products::updated_at.eq(diesel::dsl::now),
        ))
        .execute(conn)
        .await
        .context("Failed to delete product")?;

    tracing::info!(product_id, supplier_id, "Product deleted");
    Ok(())
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn category_must_match_type() {
        let req: CreateProductReq = serde_json::from_str(
            r#"{"nom": "Mangue Kent", "categorie": "mangue", "type": "legumes", "prix": 300, "quantiteDisponible": 20}"#,
        )
        .unwrap();
        assert_matches!(validate_new(&req), Err(AppError::BadRequest(_)));
    }

    #[test]
    fn unit_defaults_to_kg() {
        let req: CreateProductReq = serde_json::from_str(
            r#"{"nom": "Tomate", "categorie": "tomate", "type": "legumes", "prix": 500, "quantiteDisponible": 10}"#,
        )
        .unwrap();
        assert_eq!(req.unit, Unit::Kg);
        assert!(validate_new(&req).is_ok());
    }

    #[test]
    fn negative_amounts_are_rejected() {
        assert_matches!(validate_amounts(Some(-1), None), Err(AppError::BadRequest(_)));
        assert_matches!(validate_amounts(None, Some(-5)), Err(AppError::BadRequest(_)));
        assert!(validate_amounts(Some(0), Some(0)).is_ok());
    }

    #[test]
    fn filter_reads_query_names() {
        let filter: ProductFilter = serde_json::from_value(serde_json::json!({
            "type": "fruits",
            "categorie": "ananas",
            "prixMin": 100,
            "search": "pain de sucre"
        }))
        .unwrap();
        assert_eq!(filter.product_type, Some(ProductType::Fruit));
        assert_eq!(filter.category, Some(Category::Pineapple));
        assert_eq!(filter.min_price, Some(100));
    }
}
