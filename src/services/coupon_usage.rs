use std::sync::Arc;

use chrono::{DateTime, Utc};
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, Set, TransactionTrait,
};
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::{
    clock::SharedClock,
    entities::coupon::{self, Entity as CouponEntity, Model as CouponModel},
    entities::coupon_usage::{
        self, ActiveModel as UsageActiveModel, Entity as UsageEntity, Model as UsageModel,
    },
    errors::ServiceError,
    events::{Event, EventSender},
};

// Version conflicts under contention resolve within a couple of rereads;
// anything beyond this is surfaced as a conflict.
const MAX_COMMIT_ATTEMPTS: u32 = 3;

/// How often and how recently one customer has redeemed one coupon.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CustomerUsage {
    pub count: u64,
    pub last_used_at: Option<DateTime<Utc>>,
}

/// The redemption ledger. Owns the only code path that increments
/// `current_uses`, so the global cap is enforced in exactly one place.
#[derive(Clone)]
pub struct CouponUsageService {
    db: Arc<DatabaseConnection>,
    clock: SharedClock,
    event_sender: Option<Arc<EventSender>>,
}

impl CouponUsageService {
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

    /// The usage row recorded for one order, if any. Apply replays resolve
    /// through this before re-evaluating the rule chain.
    pub async fn order_usage(
        &self,
        coupon_id: Uuid,
        order_id: Uuid,
    ) -> Result<Option<UsageModel>, ServiceError> {
        let db = &*self.db;
        UsageEntity::find()
            .filter(coupon_usage::Column::CouponId.eq(coupon_id))
            .filter(coupon_usage::Column::OrderId.eq(order_id))
            .one(db)
            .await
            .map_err(ServiceError::DatabaseError)
    }

    /// Usage figures for one customer on one coupon.
    #[instrument(skip(self), fields(coupon_id = %coupon_id, customer_id = %customer_id))]
    pub async fn customer_usage(
        &self,
        coupon_id: Uuid,
        customer_id: Uuid,
    ) -> Result<CustomerUsage, ServiceError> {
        let db = &*self.db;

        let usages = UsageEntity::find()
            .filter(coupon_usage::Column::CouponId.eq(coupon_id))
            .filter(coupon_usage::Column::CustomerId.eq(customer_id))
            .order_by_desc(coupon_usage::Column::UsedAt)
            .all(db)
            .await
            .map_err(ServiceError::DatabaseError)?;

        Ok(CustomerUsage {
            count: usages.len() as u64,
            last_used_at: usages.first().map(|usage| usage.used_at),
        })
    }

    /// Records one redemption: re-reads the coupon inside a transaction,
    /// re-checks the cap, bumps `current_uses` behind the version guard and
    /// appends the usage row. A version conflict rereads and retries; a cap
    /// reached at commit time is a retryable `UsageLimitExceeded`. Replaying
    /// the same `(coupon, order)` pair returns the prior outcome without a
    /// second increment.
    #[instrument(skip(self), fields(coupon_id = %coupon_id, customer_id = %customer_id))]
    pub async fn commit_usage(
        &self,
        coupon_id: Uuid,
        customer_id: Uuid,
        order_id: Option<Uuid>,
    ) -> Result<CouponModel, ServiceError> {
        let db = &*self.db;

        for attempt in 1..=MAX_COMMIT_ATTEMPTS {
            let txn = db.begin().await.map_err(|e| {
                error!(error = %e, "Failed to begin usage commit transaction");
                ServiceError::DatabaseError(e)
            })?;

            let coupon = CouponEntity::find_by_id(coupon_id)
                .one(&txn)
                .await
                .map_err(ServiceError::DatabaseError)?
                .ok_or_else(|| ServiceError::NotFound(format!("Coupon {} not found", coupon_id)))?;

            if let Some(order_id) = order_id {
                let existing = UsageEntity::find()
                    .filter(coupon_usage::Column::CouponId.eq(coupon_id))
                    .filter(coupon_usage::Column::OrderId.eq(order_id))
                    .one(&txn)
                    .await
                    .map_err(ServiceError::DatabaseError)?;
                if existing.is_some() {
                    txn.commit().await.map_err(ServiceError::DatabaseError)?;
                    info!(
                        order_id = %order_id,
                        "Usage already committed for this order, returning prior outcome"
                    );
                    return Ok(coupon);
                }
            }

            if coupon.is_depleted() {
                txn.rollback().await.map_err(ServiceError::DatabaseError)?;
                return Err(ServiceError::UsageLimitExceeded(coupon.code));
            }

            let now = self.clock.now();
            let new_uses = coupon.current_uses + 1;

            let update = CouponEntity::update_many()
                .col_expr(coupon::Column::CurrentUses, Expr::value(new_uses))
                .col_expr(coupon::Column::Version, Expr::value(coupon.version + 1))
                .col_expr(coupon::Column::UpdatedAt, Expr::value(now))
                .filter(coupon::Column::Id.eq(coupon_id))
                .filter(coupon::Column::Version.eq(coupon.version))
                .exec(&txn)
                .await
                .map_err(ServiceError::DatabaseError)?;

            if update.rows_affected == 0 {
                txn.rollback().await.map_err(ServiceError::DatabaseError)?;
                warn!(
                    attempt = attempt,
                    "Version conflict while committing coupon usage, retrying"
                );
                continue;
            }

            let usage = UsageActiveModel {
                id: Set(Uuid::new_v4()),
                coupon_id: Set(coupon_id),
                customer_id: Set(customer_id),
                order_id: Set(order_id),
                used_at: Set(now),
            };

            if let Err(e) = usage.insert(&txn).await {
                txn.rollback().await.map_err(ServiceError::DatabaseError)?;
                // A racer for the same order may have won the unique index.
                if let Some(order_id) = order_id {
                    if self.order_usage(coupon_id, order_id).await?.is_some() {
                        info!(
                            order_id = %order_id,
                            "Concurrent duplicate for this order, returning prior outcome"
                        );
                        return self.fetch_coupon(coupon_id).await;
                    }
                }
                error!(error = %e, "Failed to insert usage record");
                return Err(ServiceError::DatabaseError(e));
            }

            txn.commit().await.map_err(|e| {
                error!(error = %e, "Failed to commit usage transaction");
                ServiceError::DatabaseError(e)
            })?;

            info!(
                uses = new_uses,
                cap = ?coupon.max_uses,
                "Coupon usage committed"
            );

            let mut committed = coupon;
            committed.current_uses = new_uses;
            committed.version += 1;
            committed.updated_at = now;

            if committed.remaining_uses() == Some(0) {
                self.emit(Event::CouponDepleted {
                    coupon_id,
                    code: committed.code.clone(),
                })
                .await;
            }

            return Ok(committed);
        }

        Err(ServiceError::Conflict(format!(
            "Could not commit usage for coupon {} after {} attempts",
            coupon_id, MAX_COMMIT_ATTEMPTS
        )))
    }

    /// Redemptions for one coupon, newest first.
    #[instrument(skip(self), fields(coupon_id = %coupon_id))]
    pub async fn usages_for_coupon(
        &self,
        coupon_id: Uuid,
        page: u64,
        per_page: u64,
    ) -> Result<(Vec<UsageModel>, u64), ServiceError> {
        let db = &*self.db;

        let paginator = UsageEntity::find()
            .filter(coupon_usage::Column::CouponId.eq(coupon_id))
            .order_by_desc(coupon_usage::Column::UsedAt)
            .paginate(db, per_page.max(1));

        let total = paginator
            .num_items()
            .await
            .map_err(ServiceError::DatabaseError)?;
        let usages = paginator
            .fetch_page(page.saturating_sub(1))
            .await
            .map_err(ServiceError::DatabaseError)?;

        Ok((usages, total))
    }

    async fn fetch_coupon(&self, coupon_id: Uuid) -> Result<CouponModel, ServiceError> {
        let db = &*self.db;
        CouponEntity::find_by_id(coupon_id)
            .one(db)
            .await
            .map_err(ServiceError::DatabaseError)?
            .ok_or_else(|| ServiceError::NotFound(format!("Coupon {} not found", coupon_id)))
    }

    async fn emit(&self, event: Event) {
        if let Some(sender) = &self.event_sender {
            if let Err(e) = sender.send(event).await {
                warn!(error = %e, "Failed to send coupon usage event");
            }
        }
    }
}
