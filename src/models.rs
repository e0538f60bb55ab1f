use std::str::FromStr;

use chrono::{DateTime, Utc};
use diesel::{
    Selectable,
    prelude::{AsChangeset, Identifiable, Insertable, Queryable},
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    lifecycle::OrderStatus,
    types::{PaymentMethod, PaymentStatus, Role},
};

// Accounts

#[derive(Queryable, Selectable, Identifiable, Serialize, Debug, Clone, ToSchema)]
#[diesel(table_name = crate::schema::accounts)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct AccountEntity {
    pub id: i32,
    pub name: String,
    pub phone: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub role: String,
    pub city: Option<String>,
    pub district: Option<String>,
    pub product_type: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AccountEntity {
    pub fn role(&self) -> anyhow::Result<Role> {
        Role::from_str(&self.role)
            .map_err(|_| anyhow::anyhow!("Account #{} has an unknown role {}", self.id, self.role))
    }
}

#[derive(Insertable, Debug)]
#[diesel(table_name = crate::schema::accounts)]
pub struct CreateAccountEntity {
    pub name: String,
    pub phone: String,
    pub email: String,
    pub password_hash: String,
    pub role: String,
    pub city: Option<String>,
    pub district: Option<String>,
    pub product_type: Option<String>,
}

// Products

#[derive(Queryable, Selectable, Identifiable, Serialize, Debug, Clone, ToSchema)]
#[diesel(table_name = crate::schema::products)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct ProductEntity {
    pub id: i32,
    pub supplier_id: i32,
    pub name: String,
    pub category: String,
    pub product_type: String,
    pub description: Option<String>,
    pub unit_price: i64,
    pub unit: String,
    pub quantity: i32,
    pub available: bool,
    pub city: Option<String>,
    pub district: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing)]
    pub deleted_at: Option<DateTime<Utc>>,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = crate::schema::products)]
pub struct CreateProductEntity {
    pub supplier_id: i32,
    pub name: String,
    pub category: String,
    pub product_type: String,
    pub description: Option<String>,
    pub unit_price: i64,
    pub unit: String,
    pub quantity: i32,
    pub available: bool,
    pub city: Option<String>,
    pub district: Option<String>,
}

/// Partial edit of a product; `None` fields are left untouched.
#[derive(AsChangeset, Debug, Default)]
#[diesel(table_name = crate::schema::products)]
pub struct UpdateProductEntity {
    pub name: Option<String>,
    pub description: Option<String>,
    pub unit_price: Option<i64>,
    pub unit: Option<String>,
    pub quantity: Option<i32>,
    pub available: Option<bool>,
    pub updated_at: Option<DateTime<Utc>>,
}

// Orders

#[derive(Queryable, Serialize, Selectable, Identifiable, Debug, Clone, ToSchema)]
#[diesel(table_name = crate::schema::orders)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct OrderEntity {
    pub id: i32,
    pub buyer_id: i32,
    pub supplier_id: i32,
    pub subtotal: i64,
    pub delivery_fee: i64,
    pub total: i64,
    pub delivery_address: Value,
    pub status: String,
    pub buyer_rating: Option<i16>,
    pub buyer_comment: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl OrderEntity {
    pub fn status(&self) -> anyhow::Result<OrderStatus> {
        OrderStatus::from_str(&self.status)
            .map_err(|_| anyhow::anyhow!("Order #{} has an unknown status {}", self.id, self.status))
    }

    /// An order is visible to exactly its buyer and its supplier.
    pub fn involves(&self, account_id: i32) -> bool {
        self.buyer_id == account_id || self.supplier_id == account_id
    }
}

#[derive(Insertable, Debug)]
#[diesel(table_name = crate::schema::orders)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct CreateOrderEntity {
    pub buyer_id: i32,
    pub supplier_id: i32,
    pub subtotal: i64,
    pub delivery_fee: i64,
    pub total: i64,
    pub delivery_address: Value,
    pub status: String,
}

/// Snapshot of a product at order time; never rewritten afterwards.
#[derive(Queryable, Selectable, Insertable, Serialize, Debug, Clone, PartialEq, ToSchema)]
#[diesel(table_name = crate::schema::order_items)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct OrderItemEntity {
    pub order_id: i32,
    pub product_id: i32,
    pub name: String,
    pub unit_price: i64,
    pub quantity: i32,
    pub line_total: i64,
}

#[derive(Queryable, Selectable, Serialize, Debug, Clone, ToSchema)]
#[diesel(table_name = crate::schema::order_status_history)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct OrderStatusEntryEntity {
    pub id: i32,
    pub order_id: i32,
    pub status: String,
    pub comment: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = crate::schema::order_status_history)]
pub struct CreateOrderStatusEntryEntity {
    pub order_id: i32,
    pub status: String,
    pub comment: Option<String>,
}

// Payments

#[derive(Queryable, Serialize, Selectable, Debug, Clone, ToSchema)]
#[diesel(table_name = crate::schema::payments)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct PaymentEntity {
    pub id: Uuid,
    pub order_id: i32,
    pub amount: i64,
    pub status: String,
    pub method: String,
    pub provider_ref: Option<String>,
    pub transaction_id: Option<String>,
    pub payer_phone: Option<String>,
    pub payment_url: Option<String>,
    pub failure_reason: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PaymentEntity {
    pub fn status(&self) -> anyhow::Result<PaymentStatus> {
        PaymentStatus::from_str(&self.status).map_err(|_| {
            anyhow::anyhow!("Payment {} has an unknown status {}", self.id, self.status)
        })
    }

    pub fn method(&self) -> anyhow::Result<PaymentMethod> {
        PaymentMethod::from_str(&self.method).map_err(|_| {
            anyhow::anyhow!("Payment {} has an unknown method {}", self.id, self.method)
        })
    }
}

#[derive(Insertable, Serialize, Deserialize, Debug)]
#[diesel(table_name = crate::schema::payments)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct CreatePaymentEntity {
    pub order_id: i32,
    pub amount: i64,
    pub status: String,
    pub method: String,
    pub provider_ref: Option<String>,
    pub transaction_id: Option<String>,
    pub payer_phone: Option<String>,
    pub payment_url: Option<String>,
}

// Webhook inbox

#[derive(Queryable, Selectable, Identifiable, Serialize, Debug, Clone)]
#[diesel(table_name = crate::schema::webhook_events)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct WebhookEventEntity {
    pub id: i32,
    pub provider: String,
    pub event_type: String,
    pub transaction_id: String,
    pub payload: Value,
    pub status: String,
    pub attempts: i32,
    pub last_error: Option<String>,
    pub next_attempt_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = crate::schema::webhook_events)]
pub struct CreateWebhookEventEntity {
    pub provider: String,
    pub event_type: String,
    pub transaction_id: String,
    pub payload: Value,
    pub status: String,
}
