//! Order placement and fulfillment.
//!
//! Every function that writes runs in a single database transaction: the order row (and
//! for placement, the product rows) are locked `FOR UPDATE` before any check is made, so
//! concurrent placements, cancellations and payment confirmations serialise per record.

use std::collections::{BTreeSet, HashMap};

use anyhow::Context;
use diesel::{ExpressionMethods, OptionalExtension, QueryDsl, SelectableHelper};
use diesel_async::{AsyncConnection, AsyncPgConnection, RunQueryDsl};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

use crate::{
    app_error::AppError,
    lifecycle::{OrderEvent, OrderStatus, TransitionError},
    middleware::AuthUser,
    models::{
        AccountEntity, CreateOrderEntity, CreateOrderStatusEntryEntity, OrderEntity,
        OrderItemEntity, OrderStatusEntryEntity, PaymentEntity, ProductEntity,
    },
    schema::{order_items, order_status_history, orders, payments, products},
    types::{PaymentMethod, PaymentStatus, Role},
};

#[derive(Debug, Clone, PartialEq, Deserialize, ToSchema)]
pub struct CartLine {
    #[serde(rename = "productId", alias = "product_id")]
    pub product_id: i32,
    #[serde(rename = "quantite", alias = "quantity")]
    pub quantity: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct DeliveryAddress {
    #[serde(rename = "ville", alias = "city")]
    pub city: String,
    #[serde(rename = "quartier", alias = "district")]
    pub district: String,
    #[serde(default)]
    pub instructions: Option<String>,
    /// Contact phone; defaults to the buyer's phone.
    #[serde(rename = "telephone", alias = "phone", default)]
    pub phone: Option<String>,
}

#[derive(Debug, Error, PartialEq)]
pub enum OrderError {
    #[error("An order must contain at least one product")]
    EmptyCart,
    #[error("Quantity for product {product_id} must be at least 1")]
    InvalidQuantity { product_id: i32 },
    #[error("Product {0} not found")]
    ProductNotFound(i32),
    #[error("Product {0} is not available")]
    Unavailable(String),
    #[error("Insufficient stock for {product} (available: {available})")]
    InsufficientStock { product: String, available: i32 },
    #[error("All products must come from the same supplier")]
    MixedSupplier,
    #[error("Quantity for product {product_id} is too large")]
    QuantityOverflow { product_id: i32 },
    #[error("Order amount is too large")]
    AmountOverflow,
    #[error(transparent)]
    Transition(#[from] TransitionError),
}

#[derive(Debug, Clone, PartialEq)]
pub struct PricedLine {
    pub product_id: i32,
    pub name: String,
    pub unit_price: i64,
    pub quantity: i32,
    pub line_total: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PricedCart {
    pub supplier_id: i32,
    pub lines: Vec<PricedLine>,
    pub subtotal: i64,
    pub delivery_fee: i64,
    pub total: i64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OrderDetails {
    pub order: OrderEntity,
    pub items: Vec<OrderItemEntity>,
    pub history: Vec<OrderStatusEntryEntity>,
    pub payment: Option<PaymentEntity>,
}

/// Folds repeated lines for the same product into one, keeping first-seen order.
pub fn merge_lines(lines: &[CartLine]) -> Result<Vec<CartLine>, OrderError> {
    if lines.is_empty() {
        return Err(OrderError::EmptyCart);
    }

    let mut merged: Vec<CartLine> = Vec::with_capacity(lines.len());
    for line in lines {
        if line.quantity < 1 {
            return Err(OrderError::InvalidQuantity {
                product_id: line.product_id,
            });
        }
        match merged.iter_mut().find(|l| l.product_id == line.product_id) {
            Some(existing) => {
                existing.quantity = existing.quantity.checked_add(line.quantity).ok_or(
                    OrderError::QuantityOverflow {
                        product_id: line.product_id,
                    },
                )?;
            }
            None => merged.push(line.clone()),
        }
    }
    Ok(merged)
}

/// Validates a cart against the live catalog and prices it.
///
/// Prices always come from `catalog`, never from the client.
pub fn price_cart(
    lines: &[CartLine],
    catalog: &HashMap<i32, ProductEntity>,
    delivery_fee: i64,
) -> Result<PricedCart, OrderError> {
    let lines = merge_lines(lines)?;

    let mut priced = Vec::with_capacity(lines.len());
    let mut suppliers = BTreeSet::new();
    for line in &lines {
        let product = catalog
            .get(&line.product_id)
            .filter(|p| p.deleted_at.is_none())
            .ok_or(OrderError::ProductNotFound(line.product_id))?;

        if !product.available {
            return Err(OrderError::Unavailable(product.name.clone()));
        }
        if product.quantity < line.quantity {
            return Err(OrderError::InsufficientStock {
                product: product.name.clone(),
                available: product.quantity,
            });
        }

        let line_total = product
            .unit_price
            .checked_mul(i64::from(line.quantity))
            .ok_or(OrderError::AmountOverflow)?;
        suppliers.insert(product.supplier_id);
        priced.push(PricedLine {
            product_id: product.id,
            name: product.name.clone(),
            unit_price: product.unit_price,
            quantity: line.quantity,
            line_total,
        });
    }

    if suppliers.len() > 1 {
        return Err(OrderError::MixedSupplier);
    }
    let supplier_id = suppliers
        .into_iter()
        .next()
        .ok_or(OrderError::EmptyCart)?;

    let mut subtotal: i64 = 0;
    for line in &priced {
        subtotal = subtotal
            .checked_add(line.line_total)
            .ok_or(OrderError::AmountOverflow)?;
    }
    let total = subtotal
        .checked_add(delivery_fee)
        .ok_or(OrderError::AmountOverflow)?;
    Ok(PricedCart {
        supplier_id,
        lines: priced,
        subtotal,
        delivery_fee,
        total,
    })
}

/// Places an order: validates the cart, inserts the order with its line snapshots and
/// reserves stock, all in one transaction.
pub async fn create_order(
    conn: &mut AsyncPgConnection,
    buyer: &AccountEntity,
    lines: Vec<CartLine>,
    mut address: DeliveryAddress,
    delivery_fee: i64,
) -> Result<OrderDetails, AppError> {
    let lines = merge_lines(&lines)?;
    if address.phone.as_deref().is_none_or(|p| p.trim().is_empty()) {
        address.phone = Some(buyer.phone.clone());
    }
    let delivery_address =
        serde_json::to_value(&address).context("Failed to serialize delivery address")?;
    let buyer_id = buyer.id;

    let details = conn
        .transaction(move |conn| {
            Box::pin(async move {
                let mut product_ids: Vec<i32> = lines.iter().map(|l| l.product_id).collect();
                product_ids.sort_unstable();

                // Ascending id order keeps concurrent placements from deadlocking.
                let locked: Vec<ProductEntity> = products::table
                    .filter(products::id.eq_any(&product_ids))
                    .filter(products::deleted_at.is_null())
                    .order_by(products::id.asc())
                    .select(ProductEntity::as_select())
                    .for_update()
                    .get_results(conn)
                    .await
                    .context("Failed to lock products")?;
                let catalog: HashMap<i32, ProductEntity> =
                    locked.into_iter().map(|p| (p.id, p)).collect();

                let cart = price_cart(&lines, &catalog, delivery_fee)?;

                let order = diesel::insert_into(orders::table)
                    .values(CreateOrderEntity {
                        buyer_id,
                        supplier_id: cart.supplier_id,
                        subtotal: cart.subtotal,
                        delivery_fee: cart.delivery_fee,
                        total: cart.total,
                        delivery_address,
                        status: OrderStatus::Pending.to_string(),
                    })
                    .returning(OrderEntity::as_returning())
                    .get_result(conn)
                    .await
                    .context("Failed to create order")?;

                let snapshots: Vec<OrderItemEntity> = cart
                    .lines
                    .iter()
                    .map(|line| OrderItemEntity {
                        order_id: order.id,
                        product_id: line.product_id,
                        name: line.name.clone(),
                        unit_price: line.unit_price,
                        quantity: line.quantity,
                        line_total: line.line_total,
                    })
                    .collect();
                let items = diesel::insert_into(order_items::table)
                    .values(&snapshots)
                    .returning(OrderItemEntity::as_returning())
                    .get_results(conn)
                    .await
                    .context("Failed to create order items")?;

                for line in &cart.lines {
                    let reserved = diesel::update(
                        products::table
                            .find(line.product_id)
                            .filter(products::quantity.ge(line.quantity)),
                    )
                    .set((
                        products::quantity.eq(products::quantity - line.quantity),
                        products::updated_at.eq(diesel::dsl::now),
                    ))
                    .execute(conn)
                    .await
                    .context("Failed to reserve stock")?;

                    if reserved == 0 {
                        return Err(OrderError::InsufficientStock {
                            product: line.name.clone(),
                            available: 0,
                        }
                        .into());
                    }
                }

                let entry = append_history(conn, order.id, OrderStatus::Pending, None).await?;

                Ok::<OrderDetails, AppError>(OrderDetails {
                    order,
                    items,
                    history: vec![entry],
                    payment: None,
                })
            })
        })
        .await?;

    tracing::info!(
        order_id = details.order.id,
        buyer_id,
        supplier_id = details.order.supplier_id,
        total = details.order.total,
        "Order created"
    );
    Ok(details)
}

/// Fetches one order as seen by `user`; only its buyer and supplier may read it.
pub async fn get_order_for(
    conn: &mut AsyncPgConnection,
    order_id: i32,
    user: AuthUser,
) -> Result<OrderDetails, AppError> {
    let order = find_order(conn, order_id).await?;
    if !order.involves(user.id) {
        return Err(AppError::ForbiddenResource(
            "You are not allowed to view this order".into(),
        ));
    }
    load_details(conn, order).await
}

/// Lists the orders of `user` for their role, newest first.
pub async fn list_orders_for(
    conn: &mut AsyncPgConnection,
    user: AuthUser,
) -> Result<Vec<OrderDetails>, AppError> {
    let query = orders::table
        .select(OrderEntity::as_select())
        .order_by((orders::created_at.desc(), orders::id.desc()))
        .into_boxed::<diesel::pg::Pg>();
    let query = match user.role {
        Role::Buyer => query.filter(orders::buyer_id.eq(user.id)),
        Role::Supplier => query.filter(orders::supplier_id.eq(user.id)),
    };
    let orders: Vec<OrderEntity> = query
        .get_results(conn)
        .await
        .context("Failed to get orders")?;

    load_details_many(conn, orders).await
}

/// Cancels an order on behalf of its buyer or supplier and restores the reserved stock.
pub async fn cancel_order(
    conn: &mut AsyncPgConnection,
    order_id: i32,
    actor: AuthUser,
    comment: Option<String>,
) -> Result<OrderDetails, AppError> {
    let order = conn
        .transaction(move |conn| {
            Box::pin(async move {
                let order = lock_order(conn, order_id).await?;
                let owner = match actor.role {
                    Role::Buyer => order.buyer_id,
                    Role::Supplier => order.supplier_id,
                };
                if owner != actor.id {
                    return Err(AppError::ForbiddenResource(
                        "You are not allowed to cancel this order".into(),
                    ));
                }
                cancel_locked(conn, &order, comment).await
            })
        })
        .await?;

    tracing::info!(order_id, actor_id = actor.id, "Order cancelled");
    load_details(conn, order).await
}

/// Supplier-driven status change. The requested status is mapped to the single event
/// leading to it and checked by the state machine.
pub async fn update_status(
    conn: &mut AsyncPgConnection,
    order_id: i32,
    supplier_id: i32,
    target: OrderStatus,
    comment: Option<String>,
) -> Result<OrderDetails, AppError> {
    let order = conn
        .transaction(move |conn| {
            Box::pin(async move {
                let order = lock_order(conn, order_id).await?;
                if order.supplier_id != supplier_id {
                    return Err(AppError::ForbiddenResource(
                        "You are not allowed to update this order".into(),
                    ));
                }

                match target {
                    OrderStatus::Cancelled => cancel_locked(conn, &order, comment).await,
                    OrderStatus::Paid => confirm_cash_payment(conn, &order, comment).await,
                    other => {
                        let event = OrderEvent::leading_to(other).ok_or_else(|| {
                            AppError::Conflict("An order cannot go back to pending".into())
                        })?;
                        transition_locked(conn, &order, event, comment).await
                    }
                }
            })
        })
        .await?;

    tracing::info!(order_id, status = %order.status, "Order status updated by supplier");
    load_details(conn, order).await
}

/// Records the buyer's rating of a delivered order. Allowed once.
pub async fn rate_order(
    conn: &mut AsyncPgConnection,
    order_id: i32,
    buyer_id: i32,
    rating: i16,
    comment: Option<String>,
) -> Result<OrderDetails, AppError> {
    if !(1..=5).contains(&rating) {
        return Err(AppError::BadRequest("Rating must be between 1 and 5".into()));
    }

    let rated: Option<OrderEntity> = diesel::update(
        orders::table
            .find(order_id)
            .filter(orders::buyer_id.eq(buyer_id))
            .filter(orders::status.eq(OrderStatus::Delivered.to_string()))
            .filter(orders::buyer_rating.is_null()),
    )
    .set((
        orders::buyer_rating.eq(rating),
        orders::buyer_comment.eq(comment),
        orders::updated_at.eq(diesel::dsl::now),
    ))
    .returning(OrderEntity::as_returning())
    .get_result(conn)
    .await
    .optional()
    .context("Failed to rate order")?;

    if let Some(order) = rated {
        return load_details(conn, order).await;
    }

    let order = find_order(conn, order_id).await?;
    if order.buyer_id != buyer_id {
        return Err(AppError::ForbiddenResource(
            "You are not allowed to review this order".into(),
        ));
    }
    if order.status()? != OrderStatus::Delivered {
        return Err(AppError::Conflict(
            "Only delivered orders can be reviewed".into(),
        ));
    }
    Err(AppError::Conflict("This order has already been reviewed".into()))
}

/// Applies `event` to a locked order and appends exactly one history entry.
pub(crate) async fn transition_locked(
    conn: &mut AsyncPgConnection,
    order: &OrderEntity,
    event: OrderEvent,
    comment: Option<String>,
) -> Result<OrderEntity, AppError> {
    let next = order.status()?.apply(event)?;

    let updated = diesel::update(
        orders::table
            .find(order.id)
            .filter(orders::status.eq(order.status.as_str())),
    )
    .set((
        orders::status.eq(next.to_string()),
        orders::updated_at.eq(diesel::dsl::now),
    ))
    .returning(OrderEntity::as_returning())
    .get_result(conn)
    .await
    .context("Failed to update order status")?;

    append_history(conn, order.id, next, comment).await?;
    Ok(updated)
}

async fn cancel_locked(
    conn: &mut AsyncPgConnection,
    order: &OrderEntity,
    comment: Option<String>,
) -> Result<OrderEntity, AppError> {
    let cancelled = transition_locked(conn, order, OrderEvent::Cancel, comment).await?;

    let items: Vec<OrderItemEntity> = order_items::table
        .filter(order_items::order_id.eq(order.id))
        .select(OrderItemEntity::as_select())
        .get_results(conn)
        .await
        .context("Failed to get order items")?;

    for item in &items {
        diesel::update(products::table.find(item.product_id))
            .set((
                products::quantity.eq(products::quantity + item.quantity),
                products::updated_at.eq(diesel::dsl::now),
            ))
            .execute(conn)
            .await
            .context("Failed to restore stock")?;
    }

    diesel::update(
        payments::table
            .filter(payments::order_id.eq(order.id))
            .filter(payments::status.eq(PaymentStatus::Pending.to_string())),
    )
    .set((
        payments::status.eq(PaymentStatus::Failed.to_string()),
        payments::failure_reason.eq("Order cancelled"),
        payments::updated_at.eq(diesel::dsl::now),
    ))
    .execute(conn)
    .await
    .context("Failed to close pending payment")?;

    Ok(cancelled)
}

/// Cash is the only payment a supplier may confirm by hand; it goes through the same
/// compare-and-set as gateway confirmations.
async fn confirm_cash_payment(
    conn: &mut AsyncPgConnection,
    order: &OrderEntity,
    comment: Option<String>,
) -> Result<OrderEntity, AppError> {
    let confirmed: Option<PaymentEntity> = diesel::update(
        payments::table
            .filter(payments::order_id.eq(order.id))
            .filter(payments::method.eq(PaymentMethod::Cash.to_string()))
            .filter(payments::status.eq_any([
                PaymentStatus::Pending.to_string(),
                PaymentStatus::Failed.to_string(),
            ])),
    )
    .set((
        payments::status.eq(PaymentStatus::Succeeded.to_string()),
        payments::paid_at.eq(diesel::dsl::now),
        payments::failure_reason.eq(None::<String>),
        payments::updated_at.eq(diesel::dsl::now),
    ))
    .returning(PaymentEntity::as_returning())
    .get_result(conn)
    .await
    .optional()
    .context("Failed to confirm cash payment")?;

    if confirmed.is_none() {
        return Err(AppError::Conflict(
            "Only an open cash payment can be confirmed manually".into(),
        ));
    }

    transition_locked(conn, order, OrderEvent::PaymentConfirmed, comment).await
}

pub(crate) async fn append_history(
    conn: &mut AsyncPgConnection,
    order_id: i32,
    status: OrderStatus,
    comment: Option<String>,
) -> Result<OrderStatusEntryEntity, AppError> {
    let entry = diesel::insert_into(order_status_history::table)
        .values(CreateOrderStatusEntryEntity {
            order_id,
            status: status.to_string(),
            comment,
        })
        .returning(OrderStatusEntryEntity::as_returning())
        .get_result(conn)
        .await
        .context("Failed to append order history")?;
    Ok(entry)
}

pub(crate) async fn find_order(
    conn: &mut AsyncPgConnection,
    order_id: i32,
) -> Result<OrderEntity, AppError> {
    orders::table
        .find(order_id)
        .select(OrderEntity::as_select())
        .get_result(conn)
        .await
        .optional()
        .context("Failed to get order")?
        .ok_or_else(|| AppError::NotFound("Order not found".into()))
}

pub(crate) async fn lock_order(
    conn: &mut AsyncPgConnection,
    order_id: i32,
) -> Result<OrderEntity, AppError> {
    orders::table
        .find(order_id)
        .select(OrderEntity::as_select())
        .for_update()
        .get_result(conn)
        .await
        .optional()
        .context("Failed to lock order")?
        .ok_or_else(|| AppError::NotFound("Order not found".into()))
}

pub(crate) async fn load_details(
    conn: &mut AsyncPgConnection,
    order: OrderEntity,
) -> Result<OrderDetails, AppError> {
    let mut details = load_details_many(conn, vec![order]).await?;
    details
        .pop()
        .ok_or_else(|| AppError::Other(anyhow::anyhow!("Order details went missing")))
}

async fn load_details_many(
    conn: &mut AsyncPgConnection,
    orders: Vec<OrderEntity>,
) -> Result<Vec<OrderDetails>, AppError> {
    let order_ids: Vec<i32> = orders.iter().map(|order| order.id).collect();

    let items: Vec<OrderItemEntity> = order_items::table
        .filter(order_items::order_id.eq_any(&order_ids))
        .select(OrderItemEntity::as_select())
        .get_results(conn)
        .await
        .context("Failed to get order items")?;
    let history: Vec<OrderStatusEntryEntity> = order_status_history::table
        .filter(order_status_history::order_id.eq_any(&order_ids))
        .order_by(order_status_history::id.asc())
        .select(OrderStatusEntryEntity::as_select())
        .get_results(conn)
        .await
        .context("Failed to get order history")?;
    let payments: Vec<PaymentEntity> = payments::table
        .filter(payments::order_id.eq_any(&order_ids))
        .select(PaymentEntity::as_select())
        .get_results(conn)
        .await
        .context("Failed to get payments")?;

    let mut items_by_order: HashMap<i32, Vec<OrderItemEntity>> = HashMap::new();
    for item in items {
        items_by_order.entry(item.order_id).or_default().push(item);
    }
    let mut history_by_order: HashMap<i32, Vec<OrderStatusEntryEntity>> = HashMap::new();
    for entry in history {
        history_by_order.entry(entry.order_id).or_default().push(entry);
    }
    let mut payment_by_order: HashMap<i32, PaymentEntity> = payments
        .into_iter()
        .map(|payment| (payment.order_id, payment))
        .collect();

    Ok(orders
        .into_iter()
        .map(|order| OrderDetails {
            items: items_by_order.remove(&order.id).unwrap_or_default(),
            history: history_by_order.remove(&order.id).unwrap_or_default(),
            payment: payment_by_order.remove(&order.id),
            order,
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use chrono::Utc;

    use super::*;

    fn product(id: i32, supplier_id: i32, unit_price: i64, quantity: i32) -> ProductEntity {
        ProductEntity {
            id,
            supplier_id,
            name: format!("product-{id}"),
            category: "tomate".into(),
            product_type: "vegetable".into(),
            description: None,
            unit_price,
            unit: "kg".into(),
            quantity,
            available: true,
            city: Some("Cotonou".into()),
            district: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            deleted_at: None,
        }
    }

    fn catalog(products: Vec<ProductEntity>) -> HashMap<i32, ProductEntity> {
        products.into_iter().map(|p| (p.id, p)).collect()
    }

    fn line(product_id: i32, quantity: i32) -> CartLine {
        CartLine {
            product_id,
            quantity,
        }
    }

    #[test]
    fn prices_with_catalog_prices_and_flat_fee() {
        let cart = price_cart(&[line(1, 3)], &catalog(vec![product(1, 10, 500, 10)]), 1000)
            .unwrap();
        assert_eq!(cart.supplier_id, 10);
        assert_eq!(cart.subtotal, 1500);
        assert_eq!(cart.total, 2500);
        assert_eq!(cart.lines[0].line_total, 1500);
    }

    #[test]
    fn total_is_sum_of_lines_plus_fee() {
        let products = catalog(vec![
            product(1, 10, 500, 10),
            product(2, 10, 250, 4),
            product(3, 10, 1200, 1),
        ]);
        let cart = price_cart(&[line(1, 2), line(2, 4), line(3, 1)], &products, 1000).unwrap();
        let sum: i64 = cart.lines.iter().map(|l| l.line_total).sum();
        assert_eq!(cart.subtotal, sum);
        assert_eq!(cart.total, sum + 1000);
    }

    #[test]
    fn empty_cart_is_rejected() {
        assert_eq!(
            price_cart(&[], &HashMap::new(), 1000),
            Err(OrderError::EmptyCart)
        );
    }

    #[test]
    fn unknown_product_is_not_found() {
        assert_eq!(
            price_cart(&[line(99, 1)], &catalog(vec![product(1, 10, 500, 10)]), 0),
            Err(OrderError::ProductNotFound(99))
        );
    }

    #[test]
    fn soft_deleted_product_is_not_found() {
        let mut deleted = product(1, 10, 500, 10);
        deleted.deleted_at = Some(Utc::now());
        assert_eq!(
            price_cart(&[line(1, 1)], &catalog(vec![deleted]), 0),
            Err(OrderError::ProductNotFound(1))
        );
    }

    #[test]
    fn unavailable_product_is_rejected() {
        let mut hidden = product(1, 10, 500, 10);
        hidden.available = false;
        assert_matches!(
            price_cart(&[line(1, 1)], &catalog(vec![hidden]), 0),
            Err(OrderError::Unavailable(_))
        );
    }

    #[test]
    fn quantity_above_stock_is_insufficient() {
        assert_eq!(
            price_cart(&[line(1, 11)], &catalog(vec![product(1, 10, 500, 10)]), 0),
            Err(OrderError::InsufficientStock {
                product: "product-1".into(),
                available: 10
            })
        );
    }

    #[test]
    fn duplicate_lines_are_merged_before_the_stock_check() {
        let products = catalog(vec![product(1, 10, 500, 5)]);
        assert_matches!(
            price_cart(&[line(1, 3), line(1, 3)], &products, 0),
            Err(OrderError::InsufficientStock { available: 5, .. })
        );
        let cart = price_cart(&[line(1, 2), line(1, 3)], &products, 0).unwrap();
        assert_eq!(cart.lines.len(), 1);
        assert_eq!(cart.lines[0].quantity, 5);
    }

    #[test]
    fn mixed_suppliers_are_rejected() {
        let products = catalog(vec![product(1, 10, 500, 10), product(2, 11, 500, 10)]);
        assert_eq!(
            price_cart(&[line(1, 1), line(2, 1)], &products, 1000),
            Err(OrderError::MixedSupplier)
        );
    }

    #[test]
    fn non_positive_quantities_are_rejected() {
        assert_eq!(
            merge_lines(&[line(1, 0)]),
            Err(OrderError::InvalidQuantity { product_id: 1 })
        );
        assert_eq!(
            merge_lines(&[line(1, 2), line(2, -1)]),
            Err(OrderError::InvalidQuantity { product_id: 2 })
        );
    }

    #[test]
    fn merged_quantity_overflow_is_rejected() {
        assert_eq!(
            merge_lines(&[line(1, i32::MAX), line(1, 1)]),
            Err(OrderError::QuantityOverflow { product_id: 1 })
        );
        assert_matches!(
            AppError::from(OrderError::QuantityOverflow { product_id: 1 }),
            AppError::BadRequest(_)
        );
    }

    #[test]
    fn oversized_amounts_are_rejected() {
        let products = catalog(vec![product(1, 10, i64::MAX / 2, i32::MAX)]);
        assert_eq!(
            price_cart(&[line(1, 3)], &products, 0).map(|c| c.total),
            Err(OrderError::AmountOverflow)
        );

        let products = catalog(vec![product(1, 10, i64::MAX - 10, 5)]);
        assert_eq!(
            price_cart(&[line(1, 1)], &products, 1000).map(|c| c.total),
            Err(OrderError::AmountOverflow)
        );
    }

    #[test]
    fn cart_lines_accept_the_storefront_field_names() {
        let lines: Vec<CartLine> =
            serde_json::from_str(r#"[{"productId": 4, "quantite": 2}, {"product_id": 5, "quantity": 1}]"#)
                .unwrap();
        assert_eq!(lines[0].product_id, 4);
        assert_eq!(lines[0].quantity, 2);
        assert_eq!(lines[1].product_id, 5);
    }

    #[test]
    fn delivery_address_is_stored_with_storefront_keys() {
        let address: DeliveryAddress = serde_json::from_str(
            r#"{"ville": "Cotonou", "quartier": "Akpakpa", "instructions": "Portail bleu"}"#,
        )
        .unwrap();
        assert_eq!(address.phone, None);
        let stored = serde_json::to_value(&address).unwrap();
        assert_eq!(stored["ville"], "Cotonou");
        assert_eq!(stored["quartier"], "Akpakpa");
    }
}
