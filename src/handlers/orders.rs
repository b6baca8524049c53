use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use uuid::Uuid;

use crate::auth::CurrentUser;
use crate::services::orders::{OrderSummary, OrderView, RequestRefundInput};
use crate::{ApiResponse, ApiResult, AppState, ListQuery, PaginatedResponse};

pub fn order_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_orders))
        .route("/:id", get(get_order))
        .route("/:id/cancel", post(cancel_order))
        .route("/:id/return", post(request_return))
}

/// The current user's orders
#[utoipa::path(
    get,
    path = "/api/v1/orders",
    params(("page" = u64, Query, description = "Page number"), ("limit" = u64, Query, description = "Page size")),
    responses(
        (status = 200, description = "Orders listed", body = crate::ApiResponse<PaginatedResponse<OrderSummary>>)
    ),
    security(("Bearer" = [])),
    tag = "Orders"
)]
pub async fn list_orders(
    user: CurrentUser,
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> ApiResult<PaginatedResponse<OrderSummary>> {
    let page = query.page.max(1);
    let limit = query.capped_limit();
    let (items, total) = state
        .services
        .orders
        .list_orders(user.user_id, page, limit)
        .await?;
    Ok(Json(ApiResponse::success(PaginatedResponse::new(
        items, total, page, limit,
    ))))
}

/// Order detail with items and status history
#[utoipa::path(
    get,
    path = "/api/v1/orders/:id",
    params(("id" = Uuid, Path, description = "Order ID")),
    responses(
        (status = 200, description = "Order retrieved", body = crate::ApiResponse<OrderView>),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "Orders"
)]
pub async fn get_order(
    user: CurrentUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<OrderView> {
    let order = state.services.orders.get_order(user.user_id, id).await?;
    Ok(Json(ApiResponse::success(order)))
}

/// Cancel a pending order
#[utoipa::path(
    post,
    path = "/api/v1/orders/:id/cancel",
    params(("id" = Uuid, Path, description = "Order ID")),
    responses(
        (status = 200, description = "Order cancelled", body = crate::ApiResponse<OrderView>),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Order can no longer be cancelled", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "Orders"
)]
pub async fn cancel_order(
    user: CurrentUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<OrderView> {
    let order = state.services.orders.cancel_order(user.user_id, id).await?;
    Ok(Json(ApiResponse::success(order)))
}

/// Request a return on a delivered order
#[utoipa::path(
    post,
    path = "/api/v1/orders/:id/return",
    params(("id" = Uuid, Path, description = "Order ID")),
    request_body = RequestRefundInput,
    responses(
        (status = 200, description = "Return requested", body = crate::ApiResponse<OrderView>),
        (status = 409, description = "Order is not refundable", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "Orders"
)]
pub async fn request_return(
    user: CurrentUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<RequestRefundInput>,
) -> ApiResult<OrderView> {
    let order = state
        .services
        .orders
        .request_refund(user.user_id, id, payload.reason)
        .await?;
    Ok(Json(ApiResponse::success(order)))
}
