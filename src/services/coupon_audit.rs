use std::sync::Arc;

use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, Set,
};
use tracing::{error, instrument};
use uuid::Uuid;

use crate::{
    clock::SharedClock,
    entities::coupon_validation_attempt::{
        self, ActiveModel as AttemptActiveModel, Entity as AttemptEntity, Model as AttemptModel,
    },
    errors::ServiceError,
};

/// Append-only trail of coupon evaluations. One row per evaluation,
/// successful or not.
#[derive(Clone)]
pub struct CouponAuditService {
    db: Arc<DatabaseConnection>,
    clock: SharedClock,
}

impl CouponAuditService {
    pub fn new(db: Arc<DatabaseConnection>, clock: SharedClock) -> Self {
        Self { db, clock }
    }

    #[instrument(skip(self), fields(coupon_id = %coupon_id, is_valid = is_valid))]
    pub async fn record_attempt(
        &self,
        coupon_id: Uuid,
        customer_id: Option<Uuid>,
        is_valid: bool,
        failure_reason: Option<String>,
        cart_value: Decimal,
        cart_item_count: i32,
    ) -> Result<AttemptModel, ServiceError> {
        let db = &*self.db;

        let attempt = AttemptActiveModel {
            id: Set(Uuid::new_v4()),
            coupon_id: Set(coupon_id),
            customer_id: Set(customer_id),
            attempted_at: Set(self.clock.now()),
            is_valid: Set(is_valid),
            failure_reason: Set(failure_reason),
            cart_value: Set(cart_value),
            cart_item_count: Set(cart_item_count),
        };

        attempt.insert(db).await.map_err(|e| {
            error!(error = %e, coupon_id = %coupon_id, "Failed to record validation attempt");
            ServiceError::DatabaseError(e)
        })
    }

    /// Attempts for one coupon, newest first.
    #[instrument(skip(self), fields(coupon_id = %coupon_id))]
    pub async fn attempts_for_coupon(
        &self,
        coupon_id: Uuid,
        page: u64,
        per_page: u64,
    ) -> Result<(Vec<AttemptModel>, u64), ServiceError> {
        let db = &*self.db;

        let paginator = AttemptEntity::find()
            .filter(coupon_validation_attempt::Column::CouponId.eq(coupon_id))
            .order_by_desc(coupon_validation_attempt::Column::AttemptedAt)
            .paginate(db, per_page.max(1));

        let total = paginator
            .num_items()
            .await
            .map_err(ServiceError::DatabaseError)?;
        let attempts = paginator
            .fetch_page(page.saturating_sub(1))
            .await
            .map_err(ServiceError::DatabaseError)?;

        Ok((attempts, total))
    }
}
