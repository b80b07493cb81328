use std::sync::Arc;

use chrono::{DateTime, Utc};
use metrics::counter;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder, Set, TransactionTrait,
};
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::{
    clock::SharedClock,
    entities::order::{self, Entity as OrderEntity, Model as OrderModel, OrderStatus, PaymentStatus},
    entities::order_status_history::{
        ActiveModel as HistoryActiveModel, Entity as HistoryEntity, Model as HistoryModel,
    },
    errors::ServiceError,
    events::{Event, EventSender},
};

// A writer that loses the version race revalidates against a fresh read;
// more conflicts than this in a row get surfaced to the caller.
const MAX_TRANSITION_ATTEMPTS: u32 = 3;

/// Drives orders through their lifecycle. Every successful transition is one
/// atomic unit: status column, milestone timestamp and history row commit
/// together or not at all, guarded by an optimistic version check.
#[derive(Clone)]
pub struct OrderStatusService {
    db: Arc<DatabaseConnection>,
    clock: SharedClock,
    event_sender: Option<Arc<EventSender>>,
}

impl OrderStatusService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        clock: SharedClock,
        event_sender: Option<Arc<EventSender>>,
    ) -> Self {
        Self {
            db,
            clock,
            event_sender,
        }
    }

    /// The transition table. Terminal states have no outgoing edges and a
    /// state never transitions to itself.
    pub fn valid_transitions(status: OrderStatus) -> &'static [OrderStatus] {
        use OrderStatus::*;
        match status {
            Pending => &[Processing, Cancelled],
            Processing => &[Preparing, Cancelled],
            Preparing => &[Ready, Cancelled],
            Ready => &[Shipped, Delivered, Cancelled],
            Shipped => &[Delivered, Cancelled],
            Delivered => &[Refunded],
            Cancelled | Refunded => &[],
        }
    }

    #[instrument(skip(self), fields(order_id = %order_id))]
    pub async fn get_order(&self, order_id: Uuid) -> Result<OrderModel, ServiceError> {
        let db = &*self.db;
        OrderEntity::find_by_id(order_id)
            .one(db)
            .await
            .map_err(ServiceError::DatabaseError)?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))
    }

    /// Chronological transition log for an order.
    #[instrument(skip(self), fields(order_id = %order_id))]
    pub async fn status_history(&self, order_id: Uuid) -> Result<Vec<HistoryModel>, ServiceError> {
        // Resolve the order first so an unknown id is a 404, not an empty list.
        self.get_order(order_id).await?;

        let db = &*self.db;
        HistoryEntity::find()
            .filter(crate::entities::order_status_history::Column::OrderId.eq(order_id))
            .order_by_asc(crate::entities::order_status_history::Column::ChangedAt)
            .all(db)
            .await
            .map_err(ServiceError::DatabaseError)
    }

    /// Moves an order to `new_status` if the transition table allows it.
    /// Illegal moves fail with the list of valid next states and leave the
    /// order untouched. A stale snapshot is retried from a fresh read, so
    /// legality is always judged against the status that actually held.
    #[instrument(skip(self, notes), fields(order_id = %order_id, new_status = %new_status))]
    pub async fn change_status(
        &self,
        order_id: Uuid,
        new_status: OrderStatus,
        changed_by: Option<Uuid>,
        notes: Option<String>,
    ) -> Result<OrderModel, ServiceError> {
        for _ in 0..MAX_TRANSITION_ATTEMPTS {
            let order = self.get_order(order_id).await?;
            if let Some(updated) = self
                .transition(order, new_status, changed_by, notes.clone(), None)
                .await?
            {
                return Ok(updated);
            }
        }
        Err(ServiceError::Conflict(format!(
            "Could not change status of order {} after {} attempts",
            order_id, MAX_TRANSITION_ATTEMPTS
        )))
    }

    /// Cancel affordance for callers acting on behalf of the customer.
    /// Stricter than the raw table: once preparation has begun the order can
    /// only be cancelled through staff status changes.
    #[instrument(skip(self, notes), fields(order_id = %order_id))]
    pub async fn cancel_order(
        &self,
        order_id: Uuid,
        changed_by: Option<Uuid>,
        notes: Option<String>,
    ) -> Result<OrderModel, ServiceError> {
        for _ in 0..MAX_TRANSITION_ATTEMPTS {
            let order = self.get_order(order_id).await?;
            if !order.can_cancel() {
                return Err(ServiceError::InvalidOperation(format!(
                    "Order {} can no longer be cancelled (status: {})",
                    order_id, order.status
                )));
            }

            if let Some(updated) = self
                .transition(order, OrderStatus::Cancelled, changed_by, notes.clone(), None)
                .await?
            {
                self.emit(Event::OrderCancelled(order_id)).await;
                return Ok(updated);
            }
        }
        Err(ServiceError::Conflict(format!(
            "Could not cancel order {} after {} attempts",
            order_id, MAX_TRANSITION_ATTEMPTS
        )))
    }

    /// Refunds a delivered, paid order. Flips the payment status together
    /// with the order status so the two never disagree.
    #[instrument(skip(self, notes), fields(order_id = %order_id))]
    pub async fn refund_order(
        &self,
        order_id: Uuid,
        changed_by: Option<Uuid>,
        notes: Option<String>,
    ) -> Result<OrderModel, ServiceError> {
        for _ in 0..MAX_TRANSITION_ATTEMPTS {
            let order = self.get_order(order_id).await?;
            if !order.can_refund() {
                return Err(ServiceError::InvalidOperation(format!(
                    "Order {} cannot be refunded (status: {}, payment: {})",
                    order_id, order.status, order.payment_status
                )));
            }

            if let Some(updated) = self
                .transition(
                    order,
                    OrderStatus::Refunded,
                    changed_by,
                    notes.clone(),
                    Some(PaymentStatus::Refunded),
                )
                .await?
            {
                self.emit(Event::OrderRefunded(order_id)).await;
                return Ok(updated);
            }
        }
        Err(ServiceError::Conflict(format!(
            "Could not refund order {} after {} attempts",
            order_id, MAX_TRANSITION_ATTEMPTS
        )))
    }

    /// One transition attempt against the caller's snapshot of the order.
    /// Returns `Ok(None)` when the version guard finds the snapshot stale;
    /// the caller re-reads and re-validates before trying again.
    async fn transition(
        &self,
        order: OrderModel,
        new_status: OrderStatus,
        changed_by: Option<Uuid>,
        notes: Option<String>,
        payment_status: Option<PaymentStatus>,
    ) -> Result<Option<OrderModel>, ServiceError> {
        let old_status = order.status;
        if !Self::valid_transitions(old_status).contains(&new_status) {
            return Err(ServiceError::invalid_transition(
                old_status.to_string(),
                new_status.to_string(),
                Self::valid_transitions(old_status)
                    .iter()
                    .map(ToString::to_string)
                    .collect(),
            ));
        }

        let now = self.clock.now();
        let db = &*self.db;
        let txn = db.begin().await.map_err(|e| {
            error!(error = %e, "Failed to begin transaction");
            ServiceError::DatabaseError(e)
        })?;

        // The version filter pins the update to the snapshot we validated
        // against; if anything touched the row since, zero rows match.
        let mut update = OrderEntity::update_many()
            .col_expr(order::Column::Status, Expr::value(new_status))
            .col_expr(order::Column::Version, Expr::value(order.version + 1))
            .col_expr(order::Column::UpdatedAt, Expr::value(now))
            .filter(order::Column::Id.eq(order.id))
            .filter(order::Column::Version.eq(order.version));
        if let Some(column) = milestone_column(new_status) {
            update = update.col_expr(column, Expr::value(now));
        }
        if let Some(payment) = payment_status {
            update = update.col_expr(order::Column::PaymentStatus, Expr::value(payment));
        }

        let result = update.exec(&txn).await.map_err(|e| {
            error!(error = %e, order_id = %order.id, "Failed to update order status");
            ServiceError::DatabaseError(e)
        })?;

        if result.rows_affected == 0 {
            txn.rollback().await.map_err(ServiceError::DatabaseError)?;
            warn!(
                order_id = %order.id,
                "Order was modified concurrently, revalidating from a fresh read"
            );
            return Ok(None);
        }

        let entry = HistoryActiveModel {
            id: Set(Uuid::new_v4()),
            order_id: Set(order.id),
            old_status: Set(old_status),
            new_status: Set(new_status),
            changed_by: Set(changed_by),
            changed_at: Set(now),
            notes: Set(notes),
        };
        if let Err(e) = entry.insert(&txn).await {
            txn.rollback().await.map_err(ServiceError::DatabaseError)?;
            error!(error = %e, order_id = %order.id, "Failed to append status history");
            return Err(ServiceError::DatabaseError(e));
        }

        txn.commit().await.map_err(|e| {
            error!(error = %e, order_id = %order.id, "Failed to commit status transition");
            ServiceError::DatabaseError(e)
        })?;

        counter!("orders.status_changes", 1);
        info!(
            order_id = %order.id,
            from = %old_status,
            to = %new_status,
            "Order status changed"
        );
        self.emit(Event::OrderStatusChanged {
            order_id: order.id,
            old_status,
            new_status,
        })
        .await;

        let mut updated = order;
        updated.status = new_status;
        updated.version += 1;
        updated.updated_at = now;
        if let Some(payment) = payment_status {
            updated.payment_status = payment;
        }
        stamp_milestone(&mut updated, new_status, now);
        Ok(Some(updated))
    }

    async fn emit(&self, event: Event) {
        if let Some(sender) = &self.event_sender {
            if let Err(e) = sender.send(event).await {
                warn!(error = %e, "Failed to send order event");
            }
        }
    }
}

fn milestone_column(status: OrderStatus) -> Option<order::Column> {
    match status {
        OrderStatus::Processing => Some(order::Column::ProcessingStartedAt),
        OrderStatus::Ready => Some(order::Column::ReadyAt),
        OrderStatus::Shipped => Some(order::Column::ShippedAt),
        OrderStatus::Delivered => Some(order::Column::DeliveredAt),
        OrderStatus::Cancelled => Some(order::Column::CancelledAt),
        OrderStatus::Refunded => Some(order::Column::RefundedAt),
        OrderStatus::Pending | OrderStatus::Preparing => None,
    }
}

fn stamp_milestone(order: &mut OrderModel, status: OrderStatus, now: DateTime<Utc>) {
    match status {
        OrderStatus::Processing => order.processing_started_at = Some(now),
        OrderStatus::Ready => order.ready_at = Some(now),
        OrderStatus::Shipped => order.shipped_at = Some(now),
        OrderStatus::Delivered => order.delivered_at = Some(now),
        OrderStatus::Cancelled => order.cancelled_at = Some(now),
        OrderStatus::Refunded => order.refunded_at = Some(now),
        OrderStatus::Pending | OrderStatus::Preparing => {}
    }
}
