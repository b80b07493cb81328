use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::entities::order::{Model as OrderModel, OrderStatus, PaymentStatus};
use crate::entities::order_status_history::Model as HistoryModel;
use crate::errors::ServiceError;
use crate::services::order_status::OrderStatusService;
use crate::{ApiResponse, AppState};

#[derive(Debug, Serialize, Deserialize, Validate, ToSchema)]
#[serde(deny_unknown_fields)]
#[schema(example = json!({
    "new_status": "processing",
    "changed_by": "550e8400-e29b-41d4-a716-446655440000",
    "notes": "payment confirmed"
}))]
pub struct ChangeStatusRequest {
    /// Target status; must be reachable from the order's current status
    pub new_status: OrderStatus,
    /// Staff member or system actor making the change
    pub changed_by: Option<Uuid>,
    /// Free-form note recorded on the history row
    #[validate(length(max = 500, message = "notes must be at most 500 characters"))]
    pub notes: Option<String>,
}

#[derive(Debug, Default, Serialize, Deserialize, Validate, ToSchema)]
#[serde(deny_unknown_fields)]
#[schema(example = json!({ "reason": "customer changed their mind" }))]
pub struct CancelOrderRequest {
    /// Actor requesting the cancellation
    pub changed_by: Option<Uuid>,
    /// Recorded on the history row
    #[validate(length(max = 500, message = "reason must be at most 500 characters"))]
    pub reason: Option<String>,
}

#[derive(Debug, Default, Serialize, Deserialize, Validate, ToSchema)]
#[serde(deny_unknown_fields)]
#[schema(example = json!({ "reason": "damaged on arrival" }))]
pub struct RefundOrderRequest {
    /// Actor issuing the refund
    pub changed_by: Option<Uuid>,
    /// Recorded on the history row
    #[validate(length(max = 500, message = "reason must be at most 500 characters"))]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct OrderResponse {
    pub id: Uuid,
    pub order_number: String,
    pub customer_id: Uuid,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    pub subtotal: Decimal,
    pub tax: Decimal,
    pub delivery_fee: Decimal,
    pub discount_amount: Decimal,
    pub total: Decimal,
    pub applied_coupon_id: Option<Uuid>,
    pub delivery_method: Option<String>,
    pub delivery_address: Option<String>,
    pub processing_started_at: Option<DateTime<Utc>>,
    pub ready_at: Option<DateTime<Utc>>,
    pub shipped_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub refunded_at: Option<DateTime<Utc>>,
    /// Whether the customer-facing cancel affordance is available
    pub can_cancel: bool,
    /// Whether the refund affordance is available
    pub can_refund: bool,
    /// Statuses reachable from the current one
    pub valid_transitions: Vec<OrderStatus>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn map_order(order: &OrderModel) -> OrderResponse {
    OrderResponse {
        id: order.id,
        order_number: order.order_number.clone(),
        customer_id: order.customer_id,
        status: order.status,
        payment_status: order.payment_status,
        subtotal: order.subtotal,
        tax: order.tax,
        delivery_fee: order.delivery_fee,
        discount_amount: order.discount_amount,
        total: order.total,
        applied_coupon_id: order.applied_coupon_id,
        delivery_method: order.delivery_method.clone(),
        delivery_address: order.delivery_address.clone(),
        processing_started_at: order.processing_started_at,
        ready_at: order.ready_at,
        shipped_at: order.shipped_at,
        delivered_at: order.delivered_at,
        cancelled_at: order.cancelled_at,
        refunded_at: order.refunded_at,
        can_cancel: order.can_cancel(),
        can_refund: order.can_refund(),
        valid_transitions: OrderStatusService::valid_transitions(order.status).to_vec(),
        created_at: order.created_at,
        updated_at: order.updated_at,
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TransitionsResponse {
    pub current_status: OrderStatus,
    pub valid_transitions: Vec<OrderStatus>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct StatusHistoryResponse {
    pub id: Uuid,
    pub old_status: OrderStatus,
    pub new_status: OrderStatus,
    pub changed_by: Option<Uuid>,
    pub changed_at: DateTime<Utc>,
    pub notes: Option<String>,
}

fn map_history(entry: &HistoryModel) -> StatusHistoryResponse {
    StatusHistoryResponse {
        id: entry.id,
        old_status: entry.old_status,
        new_status: entry.new_status,
        changed_by: entry.changed_by,
        changed_at: entry.changed_at,
        notes: entry.notes.clone(),
    }
}

/// Get order by ID
#[utoipa::path(
    get,
    path = "/api/v1/orders/{id}",
    params(("id" = Uuid, Path, description = "Order ID")),
    responses(
        (status = 200, description = "Order details", body = crate::ApiResponse<OrderResponse>,
            headers(("X-Request-Id" = String, description = "Unique request identifier"))
        ),
        (status = 404, description = "Not found", body = crate::errors::ErrorResponse)
    ),
    tag = "Orders"
)]
pub async fn get_order(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<OrderResponse>>, ServiceError> {
    let order = state.services.order_status.get_order(id).await?;
    Ok(Json(ApiResponse::success(map_order(&order))))
}

/// Move an order to a new status
#[utoipa::path(
    post,
    path = "/api/v1/orders/{id}/status",
    params(("id" = Uuid, Path, description = "Order ID")),
    request_body = ChangeStatusRequest,
    responses(
        (status = 200, description = "Order after the transition", body = crate::ApiResponse<OrderResponse>,
            headers(("X-Request-Id" = String, description = "Unique request identifier"))
        ),
        (status = 404, description = "Not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Concurrent modification", body = crate::errors::ErrorResponse),
        (status = 422, description = "Transition not allowed from the current status", body = crate::errors::ErrorResponse)
    ),
    tag = "Orders"
)]
pub async fn change_status(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<ChangeStatusRequest>,
) -> Result<Json<ApiResponse<OrderResponse>>, ServiceError> {
    request.validate()?;
    let order = state
        .services
        .order_status
        .change_status(id, request.new_status, request.changed_by, request.notes)
        .await?;
    Ok(Json(ApiResponse::success(map_order(&order))))
}

/// Statuses reachable from the order's current status
#[utoipa::path(
    get,
    path = "/api/v1/orders/{id}/transitions",
    params(("id" = Uuid, Path, description = "Order ID")),
    responses(
        (status = 200, description = "Current status and its outgoing transitions", body = crate::ApiResponse<TransitionsResponse>),
        (status = 404, description = "Not found", body = crate::errors::ErrorResponse)
    ),
    tag = "Orders"
)]
pub async fn valid_transitions(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<TransitionsResponse>>, ServiceError> {
    let order = state.services.order_status.get_order(id).await?;
    Ok(Json(ApiResponse::success(TransitionsResponse {
        current_status: order.status,
        valid_transitions: OrderStatusService::valid_transitions(order.status).to_vec(),
    })))
}

/// Full status trail for an order, oldest first
#[utoipa::path(
    get,
    path = "/api/v1/orders/{id}/history",
    params(("id" = Uuid, Path, description = "Order ID")),
    responses(
        (status = 200, description = "Status change history", body = crate::ApiResponse<Vec<StatusHistoryResponse>>),
        (status = 404, description = "Not found", body = crate::errors::ErrorResponse)
    ),
    tag = "Orders"
)]
pub async fn status_history(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<Vec<StatusHistoryResponse>>>, ServiceError> {
    let entries = state.services.order_status.status_history(id).await?;
    let items: Vec<StatusHistoryResponse> = entries.iter().map(map_history).collect();
    Ok(Json(ApiResponse::success(items)))
}

/// Cancel an order on the customer's behalf
#[utoipa::path(
    post,
    path = "/api/v1/orders/{id}/cancel",
    params(("id" = Uuid, Path, description = "Order ID")),
    request_body = CancelOrderRequest,
    responses(
        (status = 200, description = "Cancelled order", body = crate::ApiResponse<OrderResponse>,
            headers(("X-Request-Id" = String, description = "Unique request identifier"))
        ),
        (status = 400, description = "Order is past the point of cancellation", body = crate::errors::ErrorResponse),
        (status = 404, description = "Not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Concurrent modification", body = crate::errors::ErrorResponse)
    ),
    tag = "Orders"
)]
pub async fn cancel_order(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<CancelOrderRequest>,
) -> Result<Json<ApiResponse<OrderResponse>>, ServiceError> {
    request.validate()?;
    let order = state
        .services
        .order_status
        .cancel_order(id, request.changed_by, request.reason)
        .await?;
    Ok(Json(ApiResponse::success(map_order(&order))))
}

/// Refund a delivered, paid order
#[utoipa::path(
    post,
    path = "/api/v1/orders/{id}/refund",
    params(("id" = Uuid, Path, description = "Order ID")),
    request_body = RefundOrderRequest,
    responses(
        (status = 200, description = "Refunded order", body = crate::ApiResponse<OrderResponse>,
            headers(("X-Request-Id" = String, description = "Unique request identifier"))
        ),
        (status = 400, description = "Order is not refundable", body = crate::errors::ErrorResponse),
        (status = 404, description = "Not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Concurrent modification", body = crate::errors::ErrorResponse)
    ),
    tag = "Orders"
)]
pub async fn refund_order(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<RefundOrderRequest>,
) -> Result<Json<ApiResponse<OrderResponse>>, ServiceError> {
    request.validate()?;
    let order = state
        .services
        .order_status
        .refund_order(id, request.changed_by, request.reason)
        .await?;
    Ok(Json(ApiResponse::success(map_order(&order))))
}

/// Order routes
pub fn order_routes() -> Router<AppState> {
    Router::new()
        .route("/:id", get(get_order))
        .route("/:id/status", post(change_status))
        .route("/:id/transitions", get(valid_transitions))
        .route("/:id/history", get(status_history))
        .route("/:id/cancel", post(cancel_order))
        .route("/:id/refund", post(refund_order))
}
