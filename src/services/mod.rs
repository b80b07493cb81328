// Coupon engine
pub mod coupon_audit;
pub mod coupon_usage;
pub mod coupons;
pub mod discounts;

// Customer data needed by tier rules
pub mod customer_history;

// Order lifecycle
pub mod order_status;
