use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::entities::order::OrderStatus;

/// Domain events emitted after state changes commit. Consumers hang off the
/// processing loop; senders never block on them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    // Coupon events
    CouponCreated(Uuid),
    CouponValidated {
        coupon_id: Uuid,
        customer_id: Option<Uuid>,
        valid: bool,
    },
    CouponApplied {
        coupon_id: Uuid,
        customer_id: Uuid,
        order_id: Option<Uuid>,
        discount_amount: Decimal,
    },
    CouponDepleted {
        coupon_id: Uuid,
        code: String,
    },
    CouponExpiringSoon {
        coupon_id: Uuid,
        code: String,
        days_left: i64,
    },
    CouponsDeactivated {
        count: u64,
    },

    // Order lifecycle events
    OrderStatusChanged {
        order_id: Uuid,
        old_status: OrderStatus,
        new_status: OrderStatus,
    },
    OrderCancelled(Uuid),
    OrderRefunded(Uuid),
}

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event asynchronously
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }
}

/// Drains the event channel for the lifetime of the process. Handlers are
/// fire-and-forget; a failing handler is logged and never propagates back
/// to the emitting request.
pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        debug!("Received event: {:?}", event);

        match event {
            Event::CouponDepleted { coupon_id, ref code } => {
                handle_coupon_depleted(coupon_id, code).await;
            }
            Event::CouponExpiringSoon {
                coupon_id,
                ref code,
                days_left,
            } => {
                handle_coupon_expiring_soon(coupon_id, code, days_left).await;
            }
            Event::OrderStatusChanged {
                order_id,
                old_status,
                new_status,
            } => {
                handle_order_status_changed(order_id, old_status, new_status).await;
            }
            Event::CouponApplied {
                coupon_id,
                customer_id,
                discount_amount,
                ..
            } => {
                info!(
                    coupon_id = %coupon_id,
                    customer_id = %customer_id,
                    discount_amount = %discount_amount,
                    "Coupon applied"
                );
            }
            Event::CouponValidated {
                coupon_id, valid, ..
            } => {
                debug!(coupon_id = %coupon_id, valid = valid, "Coupon validated");
            }
            Event::CouponCreated(coupon_id) => {
                info!(coupon_id = %coupon_id, "Coupon created");
            }
            Event::CouponsDeactivated { count } => {
                info!(count = count, "Expired coupons deactivated");
            }
            Event::OrderCancelled(order_id) => {
                info!(order_id = %order_id, "Order cancelled");
            }
            Event::OrderRefunded(order_id) => {
                info!(order_id = %order_id, "Order refunded");
            }
        }
    }

    warn!("Event channel closed, stopping event processing loop");
}

// Notification fan-out would hang off these handlers; for now they record
// the fact so operators can trace what fired.

async fn handle_coupon_depleted(coupon_id: Uuid, code: &str) {
    info!(coupon_id = %coupon_id, code = code, "Coupon reached its usage cap");
}

async fn handle_coupon_expiring_soon(coupon_id: Uuid, code: &str, days_left: i64) {
    info!(
        coupon_id = %coupon_id,
        code = code,
        days_left = days_left,
        "Coupon expiring soon"
    );
}

async fn handle_order_status_changed(
    order_id: Uuid,
    old_status: OrderStatus,
    new_status: OrderStatus,
) {
    info!(
        order_id = %order_id,
        old_status = %old_status,
        new_status = %new_status,
        "Order status changed"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn send_delivers_to_the_receiver() {
        let (tx, mut rx) = mpsc::channel(4);
        let sender = EventSender::new(tx);

        sender
            .send(Event::CouponCreated(Uuid::new_v4()))
            .await
            .unwrap();

        assert!(matches!(rx.recv().await, Some(Event::CouponCreated(_))));
    }

    #[tokio::test]
    async fn send_fails_once_the_receiver_is_gone() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let sender = EventSender::new(tx);

        let result = sender.send(Event::CouponsDeactivated { count: 0 }).await;
        assert!(result.is_err());
    }
}
