//! Payment initiation and confirmation.
//!
//! Confirmation can arrive from the buyer's status poll, from the gateway webhook or, for
//! cash, from the supplier. All of them end in [`confirm_payment`] (or the cash variant in
//! the orders service), which locks the order row and flips the payment with a
//! compare-and-set so that a confirmation is applied at most once.

use anyhow::Context;
use diesel::{ExpressionMethods, OptionalExtension, QueryDsl, SelectableHelper};
use diesel_async::{AsyncConnection, AsyncPgConnection, RunQueryDsl};
use serde::Serialize;
use utoipa::ToSchema;

use crate::{
    api::fedapay::{CreateTransaction, GatewayStatus},
    app_error::AppError,
    app_state::AppState,
    lifecycle::{OrderEvent, OrderStatus},
    middleware::AuthUser,
    models::{AccountEntity, CreatePaymentEntity, OrderEntity, PaymentEntity},
    schema::{accounts, payments},
    services::orders::{find_order, lock_order, transition_locked},
    types::{PaymentMethod, PaymentStatus},
};

/// How a confirmation identifies the payment it applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentLookup<'a> {
    TransactionId(&'a str),
    Order(i32),
}

#[derive(Debug)]
pub enum ConfirmationOutcome {
    /// This call flipped the payment and moved the order to `paid`.
    Confirmed(OrderEntity),
    /// The payment was already succeeded; nothing was written.
    AlreadyConfirmed,
    /// The payment was recorded but the order could no longer become `paid`.
    OrderNotPayable(OrderEntity),
}

#[derive(Serialize, ToSchema)]
pub struct PaymentInitiation {
    pub payment: PaymentEntity,
    pub payment_url: Option<String>,
}

#[derive(Serialize, ToSchema)]
pub struct PaymentPoll {
    pub gateway_status: GatewayStatus,
    pub payment: PaymentEntity,
    pub order_status: String,
}

async fn find_payment(
    conn: &mut AsyncPgConnection,
    lookup: PaymentLookup<'_>,
) -> Result<Option<PaymentEntity>, AppError> {
    let query = payments::table
        .select(PaymentEntity::as_select())
        .into_boxed::<diesel::pg::Pg>();
    let query = match lookup {
        PaymentLookup::TransactionId(transaction_id) => {
            query.filter(payments::transaction_id.eq(transaction_id.to_string()))
        }
        PaymentLookup::Order(order_id) => query.filter(payments::order_id.eq(order_id)),
    };

    Ok(query
        .first(conn)
        .await
        .optional()
        .context("Failed to get payment")?)
}

/// Marks the payment succeeded and the order paid, exactly once.
///
/// A payment may be confirmed from `pending` or `failed`: an approval means the money
/// arrived, even after an earlier decline of the same transaction.
pub async fn confirm_payment(
    conn: &mut AsyncPgConnection,
    lookup: PaymentLookup<'_>,
    comment: Option<String>,
) -> Result<ConfirmationOutcome, AppError> {
    let payment = find_payment(conn, lookup)
        .await?
        .ok_or_else(|| AppError::NotFound("Payment not found".into()))?;
    let payment_id = payment.id;
    let order_id = payment.order_id;

    let outcome = conn
        .transaction(move |conn| {
            Box::pin(async move {
                // Same lock order as cancellation: order row first, then payment.
                let order = lock_order(conn, order_id).await?;

                let flipped: Option<PaymentEntity> = diesel::update(
                    payments::table.find(payment_id).filter(payments::status.eq_any([
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
                .context("Failed to confirm payment")?;

                if flipped.is_none() {
                    return Ok::<ConfirmationOutcome, AppError>(
                        ConfirmationOutcome::AlreadyConfirmed,
                    );
                }

                if order.status()?.apply(OrderEvent::PaymentConfirmed).is_err() {
                    return Ok(ConfirmationOutcome::OrderNotPayable(order));
                }
                let order =
                    transition_locked(conn, &order, OrderEvent::PaymentConfirmed, comment).await?;
                Ok(ConfirmationOutcome::Confirmed(order))
            })
        })
        .await?;

    match &outcome {
        ConfirmationOutcome::Confirmed(_) => {
            tracing::info!(order_id, payment_id = %payment_id, "Payment confirmed")
        }
        ConfirmationOutcome::AlreadyConfirmed => {
            tracing::info!(order_id, payment_id = %payment_id, "Payment already confirmed")
        }
        ConfirmationOutcome::OrderNotPayable(order) => tracing::warn!(
            order_id,
            payment_id = %payment_id,
            status = %order.status,
            "Payment succeeded for an order that can no longer be paid"
        ),
    }
    Ok(outcome)
}

/// Records a declined payment. Returns whether a pending payment was changed; the order
/// stays `pending` and can be paid again.
pub async fn fail_payment(
    conn: &mut AsyncPgConnection,
    lookup: PaymentLookup<'_>,
    reason: &str,
) -> Result<bool, AppError> {
    let Some(payment) = find_payment(conn, lookup).await? else {
        return Err(AppError::NotFound("Payment not found".into()));
    };

    let failed = diesel::update(
        payments::table
            .find(payment.id)
            .filter(payments::status.eq(PaymentStatus::Pending.to_string())),
    )
    .set((
        payments::status.eq(PaymentStatus::Failed.to_string()),
        payments::failure_reason.eq(reason),
        payments::updated_at.eq(diesel::dsl::now),
    ))
    .execute(conn)
    .await
    .context("Failed to mark payment as failed")?;

    if failed > 0 {
        tracing::info!(order_id = payment.order_id, reason, "Payment failed");
    }
    Ok(failed > 0)
}

/// Starts (or restarts) payment of a pending order by its buyer.
pub async fn initiate_payment(
    state: &AppState,
    order_id: i32,
    buyer: AuthUser,
    method: PaymentMethod,
    phone: Option<String>,
) -> Result<PaymentInitiation, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let order = find_order(conn, order_id).await?;
    ensure_payable(conn, &order, buyer).await?;

    let account: AccountEntity = accounts::table
        .find(buyer.id)
        .select(AccountEntity::as_select())
        .get_result(conn)
        .await
        .context("Failed to get buyer account")?;
    let phone = phone
        .map(|p| p.trim().to_string())
        .filter(|p| !p.is_empty())
        .unwrap_or_else(|| account.phone.clone());

    // The gateway call stays outside the transaction so no row is locked while waiting.
    let created = if method.uses_gateway() {
        Some(
            state
                .fedapay
                .create_transaction(CreateTransaction {
                    amount: order.total,
                    phone: &phone,
                    email: &account.email,
                    customer_name: &account.name,
                    order_id,
                    method,
                })
                .await?,
        )
    } else {
        None
    };

    let new_payment = CreatePaymentEntity {
        order_id,
        amount: order.total,
        status: PaymentStatus::Pending.to_string(),
        method: method.to_string(),
        provider_ref: created.as_ref().and_then(|tx| tx.reference.clone()),
        transaction_id: created.as_ref().map(|tx| tx.transaction_id.clone()),
        payer_phone: Some(phone),
        payment_url: created.as_ref().and_then(|tx| tx.payment_url.clone()),
    };

    let payment = conn
        .transaction(move |conn| {
            Box::pin(async move {
                let order = lock_order(conn, order_id).await?;
                ensure_payable(conn, &order, buyer).await?;

                let payment = diesel::insert_into(payments::table)
                    .values(&new_payment)
                    .on_conflict(payments::order_id)
                    .do_update()
                    .set((
                        payments::amount.eq(new_payment.amount),
                        payments::status.eq(&new_payment.status),
                        payments::method.eq(&new_payment.method),
                        payments::provider_ref.eq(&new_payment.provider_ref),
                        payments::transaction_id.eq(&new_payment.transaction_id),
                        payments::payer_phone.eq(&new_payment.payer_phone),
                        payments::payment_url.eq(&new_payment.payment_url),
                        payments::failure_reason.eq(None::<String>),
                        payments::paid_at.eq(None::<chrono::DateTime<chrono::Utc>>),
                        payments::updated_at.eq(diesel::dsl::now),
                    ))
                    .returning(PaymentEntity::as_returning())
                    .get_result(conn)
                    .await
                    .context("Failed to store payment")?;
                Ok::<PaymentEntity, AppError>(payment)
            })
        })
        .await?;

    tracing::info!(
        order_id,
        method = %method,
        transaction_id = payment.transaction_id.as_deref().unwrap_or("-"),
        "Payment initiated"
    );

    Ok(PaymentInitiation {
        payment_url: payment.payment_url.clone(),
        payment,
    })
}

async fn ensure_payable(
    conn: &mut AsyncPgConnection,
    order: &OrderEntity,
    buyer: AuthUser,
) -> Result<(), AppError> {
    if order.buyer_id != buyer.id {
        return Err(AppError::ForbiddenResource(
            "You are not allowed to pay this order".into(),
        ));
    }
    if order.status()? != OrderStatus::Pending {
        return Err(AppError::Conflict("This order can no longer be paid".into()));
    }
    match find_payment(conn, PaymentLookup::Order(order.id)).await? {
        Some(existing) if existing.status()? == PaymentStatus::Succeeded => {
            Err(AppError::Conflict("This order is already paid".into()))
        }
        _ => Ok(()),
    }
}

/// Asks the gateway for the state of a transaction and reconciles the local payment.
pub async fn poll_payment_status(
    state: &AppState,
    transaction_id: &str,
    user: AuthUser,
) -> Result<PaymentPoll, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let payment = find_payment(conn, PaymentLookup::TransactionId(transaction_id))
        .await?
        .ok_or_else(|| AppError::NotFound("Payment not found".into()))?;
    let order = find_order(conn, payment.order_id).await?;
    if !order.involves(user.id) {
        return Err(AppError::ForbiddenResource(
            "You are not allowed to view this payment".into(),
        ));
    }

    if payment.status()? == PaymentStatus::Succeeded {
        return Ok(PaymentPoll {
            gateway_status: GatewayStatus::Succeeded,
            payment,
            order_status: order.status,
        });
    }

    let gateway_status = state.fedapay.get_transaction_status(transaction_id).await?;
    match gateway_status {
        GatewayStatus::Succeeded => {
            confirm_payment(
                conn,
                PaymentLookup::TransactionId(transaction_id),
                Some("Payment confirmed by status check".into()),
            )
            .await?;
        }
        GatewayStatus::Failed => {
            fail_payment(
                conn,
                PaymentLookup::TransactionId(transaction_id),
                "Declined by the payment provider",
            )
            .await?;
        }
        GatewayStatus::Pending | GatewayStatus::Unknown => {}
    }

    let payment = find_payment(conn, PaymentLookup::TransactionId(transaction_id))
        .await?
        .ok_or_else(|| AppError::NotFound("Payment not found".into()))?;
    let order = find_order(conn, payment.order_id).await?;
    Ok(PaymentPoll {
        gateway_status,
        payment,
        order_status: order.status,
    })
}
