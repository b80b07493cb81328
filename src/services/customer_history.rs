use std::sync::Arc;

use async_trait::async_trait;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter};
use tracing::instrument;
use uuid::Uuid;

use crate::{
    entities::coupon::CustomerTier,
    entities::order::{self, Entity as OrderEntity, OrderStatus},
    errors::ServiceError,
};

// Tier thresholds, measured over delivered orders only.
const REGULAR_MIN_ORDERS: u64 = 3;
const REGULAR_MIN_SPENT: Decimal = dec!(100);
const VIP_MIN_ORDERS: u64 = 10;
const VIP_MIN_SPENT: Decimal = dec!(1000);

/// Aggregated purchase history for one customer.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct CustomerStats {
    pub delivered_order_count: u64,
    pub total_spent: Decimal,
}

impl CustomerStats {
    /// Whether this history satisfies a coupon's tier requirement.
    pub fn satisfies_tier(&self, tier: CustomerTier) -> bool {
        match tier {
            CustomerTier::All => true,
            CustomerTier::New => self.delivered_order_count == 0,
            CustomerTier::Regular => {
                self.delivered_order_count >= REGULAR_MIN_ORDERS
                    && self.total_spent >= REGULAR_MIN_SPENT
            }
            CustomerTier::Vip => {
                self.delivered_order_count >= VIP_MIN_ORDERS && self.total_spent >= VIP_MIN_SPENT
            }
        }
    }
}

/// Source of customer purchase history for tier rules. The evaluator never
/// recomputes these figures inline; they always arrive through this seam.
#[async_trait]
pub trait CustomerHistoryProvider: Send + Sync {
    async fn stats(&self, customer_id: Uuid) -> Result<CustomerStats, ServiceError>;
}

pub type SharedCustomerHistory = Arc<dyn CustomerHistoryProvider>;

/// History provider backed by the orders table.
#[derive(Clone)]
pub struct OrderHistoryProvider {
    db: Arc<DatabaseConnection>,
}

impl OrderHistoryProvider {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl CustomerHistoryProvider for OrderHistoryProvider {
    #[instrument(skip(self), fields(customer_id = %customer_id))]
    async fn stats(&self, customer_id: Uuid) -> Result<CustomerStats, ServiceError> {
        let db = &*self.db;

        let delivered = OrderEntity::find()
            .filter(order::Column::CustomerId.eq(customer_id))
            .filter(order::Column::Status.eq(OrderStatus::Delivered))
            .all(db)
            .await
            .map_err(ServiceError::DatabaseError)?;

        let total_spent = delivered.iter().map(|order| order.total).sum();

        Ok(CustomerStats {
            delivered_order_count: delivered.len() as u64,
            total_spent,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stats(orders: u64, spent: Decimal) -> CustomerStats {
        CustomerStats {
            delivered_order_count: orders,
            total_spent: spent,
        }
    }

    #[test]
    fn all_tier_accepts_anyone() {
        assert!(stats(0, Decimal::ZERO).satisfies_tier(CustomerTier::All));
        assert!(stats(50, dec!(9999)).satisfies_tier(CustomerTier::All));
    }

    #[test]
    fn new_tier_means_zero_delivered_orders() {
        assert!(stats(0, Decimal::ZERO).satisfies_tier(CustomerTier::New));
        assert!(!stats(1, dec!(20)).satisfies_tier(CustomerTier::New));
    }

    #[test]
    fn regular_tier_needs_both_orders_and_spend() {
        assert!(stats(3, dec!(100)).satisfies_tier(CustomerTier::Regular));
        assert!(!stats(2, dec!(500)).satisfies_tier(CustomerTier::Regular));
        assert!(!stats(5, dec!(99)).satisfies_tier(CustomerTier::Regular));
    }

    #[test]
    fn heavy_spender_without_enough_orders_is_not_vip() {
        assert!(!stats(5, dec!(2000)).satisfies_tier(CustomerTier::Vip));
        assert!(!stats(12, dec!(900)).satisfies_tier(CustomerTier::Vip));
        assert!(stats(10, dec!(1000)).satisfies_tier(CustomerTier::Vip));
    }
}
