//! Order status state machine.
//!
//! All three writers of an order's status (the supplier's manual update, the buyer's
//! payment poll and the payment webhook) go through [`OrderStatus::apply`]; nothing else
//! writes the `orders.status` column.
//!
//! ```text
//! pending --PaymentConfirmed--> paid --StartPreparation--> preparing --Ship--> shipped --Deliver--> delivered
//!    \                           /
//!     +--------Cancel-----------+--> cancelled
//! ```

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};
use thiserror::Error;
use utoipa::ToSchema;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr, Display, EnumString, ToSchema,
)]
pub enum OrderStatus {
    #[serde(rename = "pending", alias = "en_attente")]
    #[strum(to_string = "pending", serialize = "en_attente")]
    Pending,
    #[serde(rename = "paid", alias = "payee")]
    #[strum(to_string = "paid", serialize = "payee")]
    Paid,
    #[serde(rename = "preparing", alias = "en_preparation")]
    #[strum(to_string = "preparing", serialize = "en_preparation")]
    Preparing,
    #[serde(rename = "shipped", alias = "expediee")]
    #[strum(to_string = "shipped", serialize = "expediee")]
    Shipped,
    #[serde(rename = "delivered", alias = "livree")]
    #[strum(to_string = "delivered", serialize = "livree")]
    Delivered,
    #[serde(rename = "cancelled", alias = "annulee")]
    #[strum(to_string = "cancelled", serialize = "annulee")]
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum OrderEvent {
    PaymentConfirmed,
    StartPreparation,
    Ship,
    Deliver,
    Cancel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("Order is already {0} and can no longer change")]
    Terminal(OrderStatus),
    #[error("Cannot apply {event} to an order that is {from}")]
    Illegal { from: OrderStatus, event: OrderEvent },
}

impl OrderStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, OrderStatus::Delivered | OrderStatus::Cancelled)
    }

    pub fn is_cancellable(self) -> bool {
        matches!(self, OrderStatus::Pending | OrderStatus::Paid)
    }

    /// Returns the status reached by applying `event`, or why the event is rejected.
    pub fn apply(self, event: OrderEvent) -> Result<OrderStatus, TransitionError> {
        use OrderEvent::*;
        use OrderStatus::*;

        if self.is_terminal() {
            return Err(TransitionError::Terminal(self));
        }

        match (self, event) {
            (Pending, PaymentConfirmed) => Ok(Paid),
            (Paid, StartPreparation) => Ok(Preparing),
            (Preparing, Ship) => Ok(Shipped),
            (Shipped, Deliver) => Ok(Delivered),
            (Pending | Paid, Cancel) => Ok(Cancelled),
            (from, event) => Err(TransitionError::Illegal { from, event }),
        }
    }
}

impl OrderEvent {
    /// The single event that can lead to `target`. Used to turn a supplier's requested
    /// status into an event checked by [`OrderStatus::apply`].
    pub fn leading_to(target: OrderStatus) -> Option<OrderEvent> {
        match target {
            OrderStatus::Pending => None,
            OrderStatus::Paid => Some(OrderEvent::PaymentConfirmed),
            OrderStatus::Preparing => Some(OrderEvent::StartPreparation),
            OrderStatus::Shipped => Some(OrderEvent::Ship),
            OrderStatus::Delivered => Some(OrderEvent::Deliver),
            OrderStatus::Cancelled => Some(OrderEvent::Cancel),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn happy_path_walks_every_state() {
        let status = OrderStatus::Pending
            .apply(OrderEvent::PaymentConfirmed)
            .and_then(|s| s.apply(OrderEvent::StartPreparation))
            .and_then(|s| s.apply(OrderEvent::Ship))
            .and_then(|s| s.apply(OrderEvent::Deliver))
            .unwrap();
        assert_eq!(status, OrderStatus::Delivered);
    }

    #[test]
    fn cancel_only_from_pending_or_paid() {
        assert_eq!(
            OrderStatus::Pending.apply(OrderEvent::Cancel),
            Ok(OrderStatus::Cancelled)
        );
        assert_eq!(
            OrderStatus::Paid.apply(OrderEvent::Cancel),
            Ok(OrderStatus::Cancelled)
        );
        assert_matches!(
            OrderStatus::Shipped.apply(OrderEvent::Cancel),
            Err(TransitionError::Illegal {
                from: OrderStatus::Shipped,
                event: OrderEvent::Cancel
            })
        );
        assert_matches!(
            OrderStatus::Preparing.apply(OrderEvent::Cancel),
            Err(TransitionError::Illegal { .. })
        );
    }

    #[test]
    fn skipping_states_is_rejected() {
        assert_matches!(
            OrderStatus::Pending.apply(OrderEvent::Ship),
            Err(TransitionError::Illegal { .. })
        );
        assert_matches!(
            OrderStatus::Paid.apply(OrderEvent::Deliver),
            Err(TransitionError::Illegal { .. })
        );
    }

    #[test]
    fn terminal_states_never_move() {
        for event in [
            OrderEvent::PaymentConfirmed,
            OrderEvent::StartPreparation,
            OrderEvent::Ship,
            OrderEvent::Deliver,
            OrderEvent::Cancel,
        ] {
            assert_eq!(
                OrderStatus::Cancelled.apply(event),
                Err(TransitionError::Terminal(OrderStatus::Cancelled))
            );
            assert_eq!(
                OrderStatus::Delivered.apply(event),
                Err(TransitionError::Terminal(OrderStatus::Delivered))
            );
        }
    }

    #[test]
    fn confirming_payment_twice_is_rejected_by_the_machine() {
        let paid = OrderStatus::Pending
            .apply(OrderEvent::PaymentConfirmed)
            .unwrap();
        assert_matches!(
            paid.apply(OrderEvent::PaymentConfirmed),
            Err(TransitionError::Illegal { .. })
        );
    }

    #[test]
    fn requested_status_maps_to_one_event() {
        assert_eq!(OrderEvent::leading_to(OrderStatus::Pending), None);
        assert_eq!(
            OrderEvent::leading_to(OrderStatus::Shipped),
            Some(OrderEvent::Ship)
        );
    }

    #[test]
    fn parses_french_status_names() {
        assert_eq!(OrderStatus::from_str("expediee").unwrap(), OrderStatus::Shipped);
        assert_eq!(OrderStatus::from_str("cancelled").unwrap(), OrderStatus::Cancelled);
        assert_eq!(OrderStatus::Preparing.as_ref(), "preparing");
    }
}
