pub mod coupon;
pub mod coupon_usage;
pub mod coupon_validation_attempt;
pub mod order;
pub mod order_status_history;
