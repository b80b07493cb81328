pub mod coupons;
pub mod orders;

use std::sync::Arc;

use sea_orm::DatabaseConnection;

use crate::clock::SharedClock;
use crate::events::EventSender;
use crate::services::coupon_audit::CouponAuditService;
use crate::services::coupon_usage::CouponUsageService;
use crate::services::coupons::CouponService;
use crate::services::customer_history::{OrderHistoryProvider, SharedCustomerHistory};
use crate::services::order_status::OrderStatusService;

// Re-export AppState so handler modules can import it as crate::handlers::AppState
pub use crate::AppState;

/// Services layer that encapsulates business logic used by HTTP handlers
#[derive(Clone)]
pub struct AppServices {
    pub coupons: Arc<CouponService>,
    pub coupon_usage: Arc<CouponUsageService>,
    pub coupon_audit: Arc<CouponAuditService>,
    pub order_status: Arc<OrderStatusService>,
}

impl AppServices {
    /// Default wiring: customer history is derived from the orders table.
    pub fn new(
        db: Arc<DatabaseConnection>,
        clock: SharedClock,
        event_sender: Option<Arc<EventSender>>,
    ) -> Self {
        let history: SharedCustomerHistory = Arc::new(OrderHistoryProvider::new(db.clone()));
        Self::with_history(db, clock, history, event_sender)
    }

    /// Same graph with a caller-supplied history provider, so tests can
    /// stub customer stats without seeding orders.
    pub fn with_history(
        db: Arc<DatabaseConnection>,
        clock: SharedClock,
        history: SharedCustomerHistory,
        event_sender: Option<Arc<EventSender>>,
    ) -> Self {
        let usage = CouponUsageService::new(db.clone(), clock.clone(), event_sender.clone());
        let audit = CouponAuditService::new(db.clone(), clock.clone());
        let coupons = Arc::new(CouponService::new(
            db.clone(),
            clock.clone(),
            history,
            usage.clone(),
            audit.clone(),
            event_sender.clone(),
        ));
        let order_status = Arc::new(OrderStatusService::new(db, clock, event_sender));

        Self {
            coupons,
            coupon_usage: Arc::new(usage),
            coupon_audit: Arc::new(audit),
            order_status,
        }
    }
}
