use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    routing::{get, post, put},
    Json, Router,
};
use rust_decimal::Decimal;
use serde::Deserialize;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

use crate::auth::AdminUser;
use crate::entities::order::OrderStatus;
use crate::entities::ticket::TicketStatus;
use crate::errors::ServiceError;
use crate::handlers::{created_response, no_content_response, validate_input};
use crate::services::catalog::{
    CreateProductInput, ProductListQuery, ProductView, UpdateProductInput,
};
use crate::services::orders::{ApproveRefundInput, OrderSummary, OrderView, UpdateOrderStatusInput};
use crate::services::payments::PaymentView;
use crate::services::support::{MessageView, PostMessageInput, TicketSummary, TicketView};
use crate::services::wallet::WalletView;
use crate::{ApiResponse, ApiResult, AppState, PaginatedResponse};

/// Back-office endpoints. Every route requires a token with the admin role;
/// the [`AdminUser`] extractor rejects everything else with 403.
pub fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/products", get(admin_list_products).post(create_product))
        .route(
            "/products/:id",
            get(admin_get_product)
                .put(update_product)
                .delete(deactivate_product),
        )
        .route("/products/:id/sizes/:label", put(set_size_stock))
        .route("/orders", get(admin_list_orders))
        .route("/orders/:id", get(admin_get_order))
        .route("/orders/:id/status", post(update_order_status))
        .route("/orders/:id/refund", post(approve_refund))
        .route("/payments/:order_id/refund", post(refund_payment))
        .route("/wallets/:user_id/credit", post(credit_wallet))
        .route("/tickets", get(admin_list_tickets))
        .route("/tickets/:id", get(admin_get_ticket))
        .route("/tickets/:id/reply", post(reply_to_ticket))
        .route("/tickets/:id/resolve", post(admin_resolve_ticket))
        .route("/tickets/:id/close", post(admin_close_ticket))
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct AdminOrdersQuery {
    #[serde(default = "default_page")]
    pub page: u64,
    #[serde(default = "default_limit")]
    pub limit: u64,
    /// Filter by lifecycle status, e.g. `Pending` or `Out for Delivery`.
    #[param(value_type = Option<String>)]
    pub status: Option<OrderStatus>,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct AdminTicketsQuery {
    #[serde(default = "default_page")]
    pub page: u64,
    #[serde(default = "default_limit")]
    pub limit: u64,
    /// Filter by ticket status: `open`, `pending` or `closed`.
    #[param(value_type = Option<String>)]
    pub status: Option<TicketStatus>,
}

fn default_page() -> u64 {
    1
}
fn default_limit() -> u64 {
    20
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct SetStockRequest {
    #[validate(range(min = 0))]
    pub stock: i32,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreditWalletRequest {
    /// Amount in rupees, must be positive.
    #[schema(value_type = String, example = "150.00")]
    pub amount: Decimal,
    #[validate(length(min = 1, max = 500))]
    pub reason: String,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct RefundPaymentRequest {
    /// Defaults to the full captured amount.
    #[schema(value_type = Option<String>)]
    pub amount: Option<Decimal>,
}

/// Every product, inactive and sold-out included
#[utoipa::path(
    get,
    path = "/api/v1/admin/products",
    params(crate::handlers::products::ProductsQuery),
    responses(
        (status = 200, description = "Products listed", body = crate::ApiResponse<PaginatedResponse<ProductView>>)
    ),
    security(("Bearer" = [])),
    tag = "Admin"
)]
pub async fn admin_list_products(
    _admin: AdminUser,
    State(state): State<AppState>,
    Query(query): Query<crate::handlers::products::ProductsQuery>,
) -> ApiResult<PaginatedResponse<ProductView>> {
    let page = query.page.max(1);
    let limit = query.limit.clamp(1, 100);
    let (items, total) = state
        .services
        .catalog
        .admin_list_products(ProductListQuery {
            page,
            limit,
            category: query.category,
            search: query.search,
        })
        .await?;
    Ok(Json(ApiResponse::success(PaginatedResponse::new(
        items, total, page, limit,
    ))))
}

/// Create a product with its size rows
#[utoipa::path(
    post,
    path = "/api/v1/admin/products",
    request_body = CreateProductInput,
    responses(
        (status = 201, description = "Product created", body = crate::ApiResponse<ProductView>),
        (status = 400, description = "Invalid payload", body = crate::errors::ErrorResponse),
        (status = 409, description = "Slug already in use", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "Admin"
)]
pub async fn create_product(
    _admin: AdminUser,
    State(state): State<AppState>,
    Json(payload): Json<CreateProductInput>,
) -> Result<impl IntoResponse, ServiceError> {
    validate_input(&payload)?;
    let product = state.services.catalog.create_product(payload).await?;
    Ok(created_response(product))
}

/// Product detail including inactive products and zero-stock sizes
#[utoipa::path(
    get,
    path = "/api/v1/admin/products/:id",
    params(("id" = Uuid, Path, description = "Product ID")),
    responses(
        (status = 200, description = "Product retrieved", body = crate::ApiResponse<ProductView>),
        (status = 404, description = "Product not found", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "Admin"
)]
pub async fn admin_get_product(
    _admin: AdminUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<ProductView> {
    let product = state.services.catalog.admin_get_product(id).await?;
    Ok(Json(ApiResponse::success(product)))
}

/// Update product fields; absent fields are left unchanged
#[utoipa::path(
    put,
    path = "/api/v1/admin/products/:id",
    params(("id" = Uuid, Path, description = "Product ID")),
    request_body = UpdateProductInput,
    responses(
        (status = 200, description = "Product updated", body = crate::ApiResponse<ProductView>),
        (status = 404, description = "Product not found", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "Admin"
)]
pub async fn update_product(
    _admin: AdminUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateProductInput>,
) -> ApiResult<ProductView> {
    validate_input(&payload)?;
    let product = state.services.catalog.update_product(id, payload).await?;
    Ok(Json(ApiResponse::success(product)))
}

/// Take a product off the storefront; existing orders keep their snapshots
#[utoipa::path(
    delete,
    path = "/api/v1/admin/products/:id",
    params(("id" = Uuid, Path, description = "Product ID")),
    responses(
        (status = 204, description = "Product deactivated"),
        (status = 404, description = "Product not found", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "Admin"
)]
pub async fn deactivate_product(
    _admin: AdminUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    state.services.catalog.deactivate_product(id).await?;
    Ok(no_content_response())
}

/// Set absolute stock for one size, creating the size row if needed
#[utoipa::path(
    put,
    path = "/api/v1/admin/products/:id/sizes/:label",
    params(
        ("id" = Uuid, Path, description = "Product ID"),
        ("label" = String, Path, description = "Size label, e.g. M or XL")
    ),
    request_body = SetStockRequest,
    responses(
        (status = 200, description = "Stock updated", body = crate::ApiResponse<ProductView>),
        (status = 404, description = "Product not found", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "Admin"
)]
pub async fn set_size_stock(
    _admin: AdminUser,
    State(state): State<AppState>,
    Path((id, label)): Path<(Uuid, String)>,
    Json(payload): Json<SetStockRequest>,
) -> ApiResult<ProductView> {
    validate_input(&payload)?;
    state
        .services
        .catalog
        .set_size_stock(id, &label, payload.stock)
        .await?;
    let product = state.services.catalog.admin_get_product(id).await?;
    Ok(Json(ApiResponse::success(product)))
}

/// All orders across users, optionally filtered by status
#[utoipa::path(
    get,
    path = "/api/v1/admin/orders",
    params(AdminOrdersQuery),
    responses(
        (status = 200, description = "Orders listed", body = crate::ApiResponse<PaginatedResponse<OrderSummary>>)
    ),
    security(("Bearer" = [])),
    tag = "Admin"
)]
pub async fn admin_list_orders(
    _admin: AdminUser,
    State(state): State<AppState>,
    Query(query): Query<AdminOrdersQuery>,
) -> ApiResult<PaginatedResponse<OrderSummary>> {
    let page = query.page.max(1);
    let limit = query.limit.clamp(1, 100);
    let (items, total) = state
        .services
        .orders
        .admin_list_orders(query.status, page, limit)
        .await?;
    Ok(Json(ApiResponse::success(PaginatedResponse::new(
        items, total, page, limit,
    ))))
}

/// Order detail for any user
#[utoipa::path(
    get,
    path = "/api/v1/admin/orders/:id",
    params(("id" = Uuid, Path, description = "Order ID")),
    responses(
        (status = 200, description = "Order retrieved", body = crate::ApiResponse<OrderView>),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "Admin"
)]
pub async fn admin_get_order(
    _admin: AdminUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<OrderView> {
    let order = state.services.orders.admin_get_order(id).await?;
    Ok(Json(ApiResponse::success(order)))
}

/// Move an order along its lifecycle
#[utoipa::path(
    post,
    path = "/api/v1/admin/orders/:id/status",
    params(("id" = Uuid, Path, description = "Order ID")),
    request_body = UpdateOrderStatusInput,
    responses(
        (status = 200, description = "Status updated", body = crate::ApiResponse<OrderView>),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Transition not allowed", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "Admin"
)]
pub async fn update_order_status(
    _admin: AdminUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateOrderStatusInput>,
) -> ApiResult<OrderView> {
    let order = state
        .services
        .orders
        .admin_update_status(id, payload.status, payload.note)
        .await?;
    Ok(Json(ApiResponse::success(order)))
}

/// Approve a requested refund, crediting the customer's wallet
#[utoipa::path(
    post,
    path = "/api/v1/admin/orders/:id/refund",
    params(("id" = Uuid, Path, description = "Order ID")),
    request_body = ApproveRefundInput,
    responses(
        (status = 200, description = "Refund approved", body = crate::ApiResponse<OrderView>),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "No refund requested on this order", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "Admin"
)]
pub async fn approve_refund(
    _admin: AdminUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<ApproveRefundInput>,
) -> ApiResult<OrderView> {
    let order = state
        .services
        .orders
        .approve_refund(id, payload.amount, payload.note)
        .await?;
    Ok(Json(ApiResponse::success(order)))
}

/// Refund a captured gateway payment back to the original method
#[utoipa::path(
    post,
    path = "/api/v1/admin/payments/:order_id/refund",
    params(("order_id" = Uuid, Path, description = "Order ID")),
    request_body = RefundPaymentRequest,
    responses(
        (status = 200, description = "Refund issued", body = crate::ApiResponse<PaymentView>),
        (status = 404, description = "No captured payment for this order", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "Admin"
)]
pub async fn refund_payment(
    _admin: AdminUser,
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
    Json(payload): Json<RefundPaymentRequest>,
) -> ApiResult<PaymentView> {
    let payment = state
        .services
        .payments
        .refund(order_id, payload.amount)
        .await?;
    Ok(Json(ApiResponse::success(payment)))
}

/// Credit a customer's wallet, e.g. a goodwill gesture or manual adjustment
#[utoipa::path(
    post,
    path = "/api/v1/admin/wallets/:user_id/credit",
    params(("user_id" = Uuid, Path, description = "Customer user ID")),
    request_body = CreditWalletRequest,
    responses(
        (status = 200, description = "Wallet credited", body = crate::ApiResponse<WalletView>),
        (status = 400, description = "Invalid amount", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "Admin"
)]
pub async fn credit_wallet(
    _admin: AdminUser,
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Json(payload): Json<CreditWalletRequest>,
) -> ApiResult<WalletView> {
    validate_input(&payload)?;
    let wallet = state
        .services
        .wallet
        .credit(user_id, payload.amount, &payload.reason)
        .await?;
    Ok(Json(ApiResponse::success(wallet)))
}

/// All tickets across users, optionally filtered by status
#[utoipa::path(
    get,
    path = "/api/v1/admin/tickets",
    params(AdminTicketsQuery),
    responses(
        (status = 200, description = "Tickets listed", body = crate::ApiResponse<PaginatedResponse<TicketSummary>>)
    ),
    security(("Bearer" = [])),
    tag = "Admin"
)]
pub async fn admin_list_tickets(
    _admin: AdminUser,
    State(state): State<AppState>,
    Query(query): Query<AdminTicketsQuery>,
) -> ApiResult<PaginatedResponse<TicketSummary>> {
    let page = query.page.max(1);
    let limit = query.limit.clamp(1, 100);
    let (items, total) = state
        .services
        .support
        .admin_list_tickets(query.status, page, limit)
        .await?;
    Ok(Json(ApiResponse::success(PaginatedResponse::new(
        items, total, page, limit,
    ))))
}

/// Ticket detail for any user
#[utoipa::path(
    get,
    path = "/api/v1/admin/tickets/:id",
    params(("id" = Uuid, Path, description = "Ticket ID")),
    responses(
        (status = 200, description = "Ticket retrieved", body = crate::ApiResponse<TicketView>),
        (status = 404, description = "Ticket not found", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "Admin"
)]
pub async fn admin_get_ticket(
    _admin: AdminUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<TicketView> {
    let ticket = state.services.support.admin_get_ticket(id).await?;
    Ok(Json(ApiResponse::success(ticket)))
}

/// Reply to a ticket as a support agent
#[utoipa::path(
    post,
    path = "/api/v1/admin/tickets/:id/reply",
    params(("id" = Uuid, Path, description = "Ticket ID")),
    request_body = PostMessageInput,
    responses(
        (status = 201, description = "Reply posted", body = crate::ApiResponse<MessageView>),
        (status = 404, description = "Ticket not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Ticket is closed", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "Admin"
)]
pub async fn reply_to_ticket(
    _admin: AdminUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<PostMessageInput>,
) -> Result<impl IntoResponse, ServiceError> {
    validate_input(&payload)?;
    let message = state.services.support.admin_reply(id, payload.body).await?;
    Ok(created_response(message))
}

/// Mark a ticket resolved; the next customer message reopens it
#[utoipa::path(
    post,
    path = "/api/v1/admin/tickets/:id/resolve",
    params(("id" = Uuid, Path, description = "Ticket ID")),
    responses(
        (status = 200, description = "Ticket resolved", body = crate::ApiResponse<TicketView>),
        (status = 404, description = "Ticket not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Ticket is closed", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "Admin"
)]
pub async fn admin_resolve_ticket(
    _admin: AdminUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<TicketView> {
    let ticket = state.services.support.admin_resolve_ticket(id).await?;
    Ok(Json(ApiResponse::success(ticket)))
}

/// Close a ticket from the back office
#[utoipa::path(
    post,
    path = "/api/v1/admin/tickets/:id/close",
    params(("id" = Uuid, Path, description = "Ticket ID")),
    responses(
        (status = 200, description = "Ticket closed", body = crate::ApiResponse<TicketView>),
        (status = 404, description = "Ticket not found", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "Admin"
)]
pub async fn admin_close_ticket(
    _admin: AdminUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<TicketView> {
    let ticket = state.services.support.admin_close_ticket(id).await?;
    Ok(Json(ApiResponse::success(ticket)))
}
