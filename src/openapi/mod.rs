use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Promo API",
        version = "0.3.0",
        description = r#"
# Promotion & Order Lifecycle API

Coupon validation, discount calculation and order status management.

## Coupons

- **Validation**: evaluate a coupon against a cart without redeeming it; the
  verdict carries the first failing rule's reason
- **Apply**: validate, compute the discount and atomically record the
  redemption against the usage caps
- **Lifecycle**: coupon status (active, scheduled, expired, depleted,
  cancelled) is derived from the stored fields at read time
- **Audit**: every evaluation is recorded and queryable per coupon

## Orders

- **Status machine**: orders move through a fixed transition table; illegal
  moves are rejected with the allowed next states
- **Milestones**: each forward transition stamps its timestamp column
- **History**: every change appends an immutable history row

## Error Handling

Errors use a consistent envelope with appropriate HTTP status codes:

```json
{
  "error": "Unprocessable Entity",
  "message": "Invalid status transition",
  "details": "Valid next states: shipped, delivered, cancelled",
  "timestamp": "2024-01-01T00:00:00Z"
}
```

## Pagination

List endpoints accept `page` (default: 1), `limit` (default: 20) and,
where noted, `search`.
        "#,
        license(
            name = "MIT",
            url = "https://opensource.org/licenses/MIT"
        )
    ),
    servers(
        (url = "http://localhost:8080", description = "Local development")
    ),
    tags(
        (name = "Coupons", description = "Coupon validation, redemption and lifecycle endpoints"),
        (name = "Orders", description = "Order status machine endpoints")
    ),
    paths(
        // Coupons
        crate::handlers::coupons::create_coupon,
        crate::handlers::coupons::list_coupons,
        crate::handlers::coupons::validate_coupon,
        crate::handlers::coupons::apply_coupon,
        crate::handlers::coupons::expiring_coupons,
        crate::handlers::coupons::get_coupon,
        crate::handlers::coupons::get_coupon_by_code,
        crate::handlers::coupons::deactivate_coupon,
        crate::handlers::coupons::coupon_usages,
        crate::handlers::coupons::coupon_attempts,

        // Orders
        crate::handlers::orders::get_order,
        crate::handlers::orders::change_status,
        crate::handlers::orders::valid_transitions,
        crate::handlers::orders::status_history,
        crate::handlers::orders::cancel_order,
        crate::handlers::orders::refund_order,

        // Status and health intentionally omitted from the document
    ),
    components(
        schemas(
            // Common types
            crate::ApiResponse<serde_json::Value>,
            crate::PaginatedResponse<serde_json::Value>,
            crate::ListQuery,

            // Coupon types
            crate::handlers::coupons::ValidateCouponRequest,
            crate::handlers::coupons::ApplyCouponRequest,
            crate::handlers::coupons::CouponResponse,
            crate::handlers::coupons::CouponUsageResponse,
            crate::handlers::coupons::ValidationAttemptResponse,
            crate::services::coupons::CreateCouponRequest,
            crate::services::coupons::Verdict,
            crate::services::coupons::ApplyOutcome,
            crate::services::discounts::CartItem,
            crate::entities::coupon::DiscountType,
            crate::entities::coupon::CouponStatus,
            crate::entities::coupon::CustomerTier,
            crate::entities::coupon::TimeRestrictions,
            crate::entities::coupon::HourRange,
            crate::entities::coupon::SeasonalRestrictions,
            crate::entities::coupon::DiscountTier,
            crate::entities::coupon::TierDiscountKind,

            // Order types
            crate::handlers::orders::ChangeStatusRequest,
            crate::handlers::orders::CancelOrderRequest,
            crate::handlers::orders::RefundOrderRequest,
            crate::handlers::orders::OrderResponse,
            crate::handlers::orders::TransitionsResponse,
            crate::handlers::orders::StatusHistoryResponse,
            crate::entities::order::OrderStatus,
            crate::entities::order::PaymentStatus,

            // Error types
            crate::errors::ErrorResponse
        )
    )
)]
pub struct ApiDocV1;

pub fn swagger_ui() -> SwaggerUi {
    SwaggerUi::new("/swagger-ui")
        .url("/api-docs/openapi.json", ApiDocV1::openapi())
        .config(utoipa_swagger_ui::Config::from("/api-docs/openapi.json").try_it_out_enabled(true))
}
