use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

use crate::entities::coupon::{CouponStatus, CustomerTier, DiscountType, Model as CouponModel};
use crate::entities::coupon_usage::Model as UsageModel;
use crate::entities::coupon_validation_attempt::Model as AttemptModel;
use crate::errors::ServiceError;
use crate::services::coupons::{ApplyOutcome, CouponFilter, CreateCouponRequest, Verdict};
use crate::services::discounts::{CartItem, CartSnapshot};
use crate::{ApiResponse, AppState, ListQuery, PaginatedResponse};

#[derive(Debug, Serialize, Deserialize, Validate, ToSchema)]
#[schema(example = json!({
    "code": "WELCOME10",
    "customer_id": "550e8400-e29b-41d4-a716-446655440000",
    "items": [
        {
            "product_id": "660e8400-e29b-41d4-a716-446655440001",
            "category_id": null,
            "quantity": 2,
            "unit_price": "24.99",
            "is_discounted": false
        }
    ]
}))]
pub struct ValidateCouponRequest {
    /// Coupon code; matching is case-insensitive
    #[validate(length(min = 1, max = 50, message = "code must be between 1 and 50 characters"))]
    pub code: String,
    /// Customer performing the validation; required when the coupon carries
    /// per-customer rules
    pub customer_id: Option<Uuid>,
    /// Cart line items the rule checks run against
    #[validate]
    #[serde(default)]
    pub items: Vec<CartItem>,
    /// Overrides the cart value derived from `items`
    pub cart_value: Option<Decimal>,
    /// Overrides the number of cart lines derived from `items`
    pub cart_item_count: Option<i32>,
}

#[derive(Debug, Serialize, Deserialize, Validate, ToSchema)]
#[schema(example = json!({
    "code": "WELCOME10",
    "customer_id": "550e8400-e29b-41d4-a716-446655440000",
    "order_id": "770e8400-e29b-41d4-a716-446655440002",
    "items": [
        {
            "product_id": "660e8400-e29b-41d4-a716-446655440001",
            "category_id": null,
            "quantity": 2,
            "unit_price": "24.99",
            "is_discounted": false
        }
    ]
}))]
pub struct ApplyCouponRequest {
    /// Coupon code; matching is case-insensitive
    #[validate(length(min = 1, max = 50, message = "code must be between 1 and 50 characters"))]
    pub code: String,
    /// Customer redeeming the coupon
    pub customer_id: Uuid,
    /// Order the redemption belongs to; repeated applies for the same order
    /// return the original result instead of double-charging the cap
    pub order_id: Option<Uuid>,
    /// Cart line items the discount is computed from
    #[validate]
    pub items: Vec<CartItem>,
    /// Overrides the cart value derived from `items`
    pub cart_value: Option<Decimal>,
    /// Overrides the number of cart lines derived from `items`
    pub cart_item_count: Option<i32>,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct CouponFilterQuery {
    /// Filter by derived lifecycle status (active, scheduled, expired, depleted, cancelled)
    pub status: Option<CouponStatus>,
    /// Filter by discount type (percentage, fixed, buy_x_get_y, tiered)
    pub discount_type: Option<DiscountType>,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ExpiringQuery {
    /// Window in days; defaults to the configured notification window
    pub days: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CouponResponse {
    pub id: Uuid,
    pub code: String,
    pub description: Option<String>,
    pub discount_type: DiscountType,
    pub discount_value: Decimal,
    /// Lifecycle status derived at response time
    pub status: CouponStatus,
    pub is_active: bool,
    pub valid_from: DateTime<Utc>,
    pub valid_until: Option<DateTime<Utc>>,
    pub max_uses: Option<i32>,
    pub max_uses_per_customer: i32,
    pub current_uses: i32,
    pub remaining_uses: Option<i32>,
    pub min_order_value: Decimal,
    pub min_order_items: i32,
    pub customer_tier: CustomerTier,
    pub is_one_time_use: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn map_coupon(coupon: &CouponModel, now: DateTime<Utc>) -> CouponResponse {
    CouponResponse {
        id: coupon.id,
        code: coupon.code.clone(),
        description: coupon.description.clone(),
        discount_type: coupon.discount_type,
        discount_value: coupon.discount_value,
        status: coupon.status(now),
        is_active: coupon.is_active,
        valid_from: coupon.valid_from,
        valid_until: coupon.valid_until,
        max_uses: coupon.max_uses,
        max_uses_per_customer: coupon.max_uses_per_customer,
        current_uses: coupon.current_uses,
        remaining_uses: coupon.remaining_uses(),
        min_order_value: coupon.min_order_value,
        min_order_items: coupon.min_order_items,
        customer_tier: coupon.customer_tier,
        is_one_time_use: coupon.is_one_time_use,
        created_at: coupon.created_at,
        updated_at: coupon.updated_at,
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CouponUsageResponse {
    pub id: Uuid,
    pub coupon_id: Uuid,
    pub customer_id: Uuid,
    pub order_id: Option<Uuid>,
    pub used_at: DateTime<Utc>,
}

fn map_usage(usage: &UsageModel) -> CouponUsageResponse {
    CouponUsageResponse {
        id: usage.id,
        coupon_id: usage.coupon_id,
        customer_id: usage.customer_id,
        order_id: usage.order_id,
        used_at: usage.used_at,
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ValidationAttemptResponse {
    pub id: Uuid,
    pub coupon_id: Uuid,
    pub customer_id: Option<Uuid>,
    pub attempted_at: DateTime<Utc>,
    pub is_valid: bool,
    pub failure_reason: Option<String>,
    pub cart_value: Decimal,
    pub cart_item_count: i32,
}

fn map_attempt(attempt: &AttemptModel) -> ValidationAttemptResponse {
    ValidationAttemptResponse {
        id: attempt.id,
        coupon_id: attempt.coupon_id,
        customer_id: attempt.customer_id,
        attempted_at: attempt.attempted_at,
        is_valid: attempt.is_valid,
        failure_reason: attempt.failure_reason.clone(),
        cart_value: attempt.cart_value,
        cart_item_count: attempt.cart_item_count,
    }
}

/// Validate a coupon against a cart without redeeming it
#[utoipa::path(
    post,
    path = "/api/v1/coupons/validate",
    request_body = ValidateCouponRequest,
    responses(
        (status = 200, description = "Evaluation verdict", body = crate::ApiResponse<crate::services::coupons::Verdict>,
            headers(("X-Request-Id" = String, description = "Unique request identifier"))
        ),
        (status = 400, description = "Bad request", body = crate::errors::ErrorResponse),
        (status = 404, description = "Coupon not found", body = crate::errors::ErrorResponse)
    ),
    tag = "Coupons"
)]
pub async fn validate_coupon(
    State(state): State<AppState>,
    Json(request): Json<ValidateCouponRequest>,
) -> Result<Json<ApiResponse<Verdict>>, ServiceError> {
    request.validate()?;

    let cart =
        CartSnapshot::with_overrides(request.items, request.cart_value, request.cart_item_count);
    let verdict = state
        .services
        .coupons
        .validate_coupon(&request.code, request.customer_id, &cart)
        .await?;

    Ok(Json(ApiResponse::success(verdict)))
}

/// Apply a coupon: validate, compute the discount and record the redemption
#[utoipa::path(
    post,
    path = "/api/v1/coupons/apply",
    request_body = ApplyCouponRequest,
    responses(
        (status = 200, description = "Apply outcome; rejections carry the reason", body = crate::ApiResponse<crate::services::coupons::ApplyOutcome>,
            headers(("X-Request-Id" = String, description = "Unique request identifier"))
        ),
        (status = 400, description = "Bad request", body = crate::errors::ErrorResponse),
        (status = 404, description = "Coupon not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Usage cap raced away at commit time", body = crate::errors::ErrorResponse)
    ),
    tag = "Coupons"
)]
pub async fn apply_coupon(
    State(state): State<AppState>,
    Json(request): Json<ApplyCouponRequest>,
) -> Result<Json<ApiResponse<ApplyOutcome>>, ServiceError> {
    request.validate()?;
    if request.items.is_empty() {
        return Err(ServiceError::ValidationError(
            "items cannot be empty".to_string(),
        ));
    }

    let cart =
        CartSnapshot::with_overrides(request.items, request.cart_value, request.cart_item_count);
    let outcome = state
        .services
        .coupons
        .apply_coupon(&request.code, request.customer_id, request.order_id, &cart)
        .await?;

    Ok(Json(ApiResponse::success(outcome)))
}

/// Create a coupon
#[utoipa::path(
    post,
    path = "/api/v1/coupons",
    request_body = CreateCouponRequest,
    responses(
        (status = 201, description = "Coupon created", body = crate::ApiResponse<CouponResponse>,
            headers(("X-Request-Id" = String, description = "Unique request identifier"))
        ),
        (status = 400, description = "Invalid coupon definition", body = crate::errors::ErrorResponse),
        (status = 409, description = "Code already exists", body = crate::errors::ErrorResponse)
    ),
    tag = "Coupons"
)]
pub async fn create_coupon(
    State(state): State<AppState>,
    Json(request): Json<CreateCouponRequest>,
) -> Result<(StatusCode, Json<ApiResponse<CouponResponse>>), ServiceError> {
    let created = state.services.coupons.create_coupon(request).await?;
    let response = map_coupon(&created, state.clock.now());
    Ok((StatusCode::CREATED, Json(ApiResponse::success(response))))
}

/// List coupons with pagination and filtering
#[utoipa::path(
    get,
    path = "/api/v1/coupons",
    params(
        ("page" = Option<u64>, Query, description = "Page number (default: 1)"),
        ("limit" = Option<u64>, Query, description = "Items per page (default: 20)"),
        ("search" = Option<String>, Query, description = "Match against coupon codes"),
        CouponFilterQuery
    ),
    responses(
        (status = 200, description = "Coupons retrieved", body = crate::ApiResponse<crate::PaginatedResponse<CouponResponse>>,
            headers(("X-Request-Id" = String, description = "Unique request identifier"))
        ),
        (status = 400, description = "Invalid query parameters", body = crate::errors::ErrorResponse)
    ),
    tag = "Coupons"
)]
pub async fn list_coupons(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
    Query(filter): Query<CouponFilterQuery>,
) -> Result<Json<ApiResponse<PaginatedResponse<CouponResponse>>>, ServiceError> {
    let limit = query.effective_limit(&state.config);
    let service_filter = CouponFilter {
        status: filter.status,
        discount_type: filter.discount_type,
        search: query.search.clone(),
    };

    let (coupons, total) = state
        .services
        .coupons
        .list_coupons(service_filter, query.page, limit)
        .await?;

    let now = state.clock.now();
    let items: Vec<CouponResponse> = coupons.iter().map(|c| map_coupon(c, now)).collect();
    Ok(Json(ApiResponse::success(PaginatedResponse {
        items,
        total,
        page: query.page,
        limit,
        total_pages: (total + limit - 1) / limit,
    })))
}

/// Active coupons expiring within the notification window
#[utoipa::path(
    get,
    path = "/api/v1/coupons/expiring",
    params(ExpiringQuery),
    responses(
        (status = 200, description = "Coupons expiring soon, soonest first", body = crate::ApiResponse<Vec<CouponResponse>>)
    ),
    tag = "Coupons"
)]
pub async fn expiring_coupons(
    State(state): State<AppState>,
    Query(query): Query<ExpiringQuery>,
) -> Result<Json<ApiResponse<Vec<CouponResponse>>>, ServiceError> {
    let days = query
        .days
        .unwrap_or(state.config.expiring_coupon_window_days);
    let coupons = state.services.coupons.find_expiring_soon(days).await?;

    let now = state.clock.now();
    let items: Vec<CouponResponse> = coupons.iter().map(|c| map_coupon(c, now)).collect();
    Ok(Json(ApiResponse::success(items)))
}

/// Get coupon by ID
#[utoipa::path(
    get,
    path = "/api/v1/coupons/{id}",
    params(("id" = Uuid, Path, description = "Coupon ID")),
    responses(
        (status = 200, description = "Coupon details", body = crate::ApiResponse<CouponResponse>),
        (status = 404, description = "Not found", body = crate::errors::ErrorResponse)
    ),
    tag = "Coupons"
)]
pub async fn get_coupon(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<CouponResponse>>, ServiceError> {
    let coupon = state.services.coupons.get_coupon(id).await?;
    Ok(Json(ApiResponse::success(map_coupon(
        &coupon,
        state.clock.now(),
    ))))
}

/// Get coupon by code
#[utoipa::path(
    get,
    path = "/api/v1/coupons/code/{code}",
    params(("code" = String, Path, description = "Coupon code, case-insensitive")),
    responses(
        (status = 200, description = "Coupon details", body = crate::ApiResponse<CouponResponse>),
        (status = 404, description = "Not found", body = crate::errors::ErrorResponse)
    ),
    tag = "Coupons"
)]
pub async fn get_coupon_by_code(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> Result<Json<ApiResponse<CouponResponse>>, ServiceError> {
    let coupon = state.services.coupons.get_coupon_by_code(&code).await?;
    Ok(Json(ApiResponse::success(map_coupon(
        &coupon,
        state.clock.now(),
    ))))
}

/// Soft-deactivate a coupon
#[utoipa::path(
    post,
    path = "/api/v1/coupons/{id}/deactivate",
    params(("id" = Uuid, Path, description = "Coupon ID")),
    responses(
        (status = 200, description = "Coupon deactivated; idempotent", body = crate::ApiResponse<CouponResponse>),
        (status = 404, description = "Not found", body = crate::errors::ErrorResponse)
    ),
    tag = "Coupons"
)]
pub async fn deactivate_coupon(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<CouponResponse>>, ServiceError> {
    let coupon = state.services.coupons.deactivate_coupon(id).await?;
    Ok(Json(ApiResponse::success(map_coupon(
        &coupon,
        state.clock.now(),
    ))))
}

/// Redemption ledger for a coupon
#[utoipa::path(
    get,
    path = "/api/v1/coupons/{id}/usages",
    params(
        ("id" = Uuid, Path, description = "Coupon ID"),
        ("page" = Option<u64>, Query, description = "Page number (default: 1)"),
        ("limit" = Option<u64>, Query, description = "Items per page (default: 20)"),
    ),
    responses(
        (status = 200, description = "Usage records, newest first", body = crate::ApiResponse<crate::PaginatedResponse<CouponUsageResponse>>),
        (status = 404, description = "Not found", body = crate::errors::ErrorResponse)
    ),
    tag = "Coupons"
)]
pub async fn coupon_usages(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(query): Query<ListQuery>,
) -> Result<Json<ApiResponse<PaginatedResponse<CouponUsageResponse>>>, ServiceError> {
    state.services.coupons.get_coupon(id).await?;

    let limit = query.effective_limit(&state.config);
    let (usages, total) = state
        .services
        .coupon_usage
        .usages_for_coupon(id, query.page, limit)
        .await?;

    let items: Vec<CouponUsageResponse> = usages.iter().map(map_usage).collect();
    Ok(Json(ApiResponse::success(PaginatedResponse {
        items,
        total,
        page: query.page,
        limit,
        total_pages: (total + limit - 1) / limit,
    })))
}

/// Validation audit trail for a coupon
#[utoipa::path(
    get,
    path = "/api/v1/coupons/{id}/attempts",
    params(
        ("id" = Uuid, Path, description = "Coupon ID"),
        ("page" = Option<u64>, Query, description = "Page number (default: 1)"),
        ("limit" = Option<u64>, Query, description = "Items per page (default: 20)"),
    ),
    responses(
        (status = 200, description = "Validation attempts, newest first", body = crate::ApiResponse<crate::PaginatedResponse<ValidationAttemptResponse>>),
        (status = 404, description = "Not found", body = crate::errors::ErrorResponse)
    ),
    tag = "Coupons"
)]
pub async fn coupon_attempts(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(query): Query<ListQuery>,
) -> Result<Json<ApiResponse<PaginatedResponse<ValidationAttemptResponse>>>, ServiceError> {
    state.services.coupons.get_coupon(id).await?;

    let limit = query.effective_limit(&state.config);
    let (attempts, total) = state
        .services
        .coupon_audit
        .attempts_for_coupon(id, query.page, limit)
        .await?;

    let items: Vec<ValidationAttemptResponse> = attempts.iter().map(map_attempt).collect();
    Ok(Json(ApiResponse::success(PaginatedResponse {
        items,
        total,
        page: query.page,
        limit,
        total_pages: (total + limit - 1) / limit,
    })))
}

/// Coupon routes
pub fn coupon_routes() -> Router<AppState> {
    Router::new()
        .route("/", post(create_coupon))
        .route("/", get(list_coupons))
        .route("/validate", post(validate_coupon))
        .route("/apply", post(apply_coupon))
        .route("/expiring", get(expiring_coupons))
        .route("/code/:code", get(get_coupon_by_code))
        .route("/:id", get(get_coupon))
        .route("/:id/deactivate", post(deactivate_coupon))
        .route("/:id/usages", get(coupon_usages))
        .route("/:id/attempts", get(coupon_attempts))
}
