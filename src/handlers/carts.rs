use axum::{
    extract::{Path, State},
    routing::{get, patch, post},
    Json, Router,
};
use serde::Deserialize;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::auth::CurrentUser;
use crate::handlers::validate_input;
use crate::services::carts::{AddCartItemInput, CartView, GuestCartLine, MergeOutcome};
use crate::{ApiResponse, ApiResult, AppState};

pub fn cart_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(get_cart).delete(clear_cart))
        .route("/items", post(add_item))
        .route("/items/:item_id", patch(update_item).delete(remove_item))
        .route("/merge", post(merge_guest_cart))
}

/// The current user's cart
#[utoipa::path(
    get,
    path = "/api/v1/cart",
    responses(
        (status = 200, description = "Cart retrieved", body = crate::ApiResponse<CartView>),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "Cart"
)]
pub async fn get_cart(user: CurrentUser, State(state): State<AppState>) -> ApiResult<CartView> {
    let cart = state.services.carts.get_cart(user.user_id).await?;
    Ok(Json(ApiResponse::success(cart)))
}

/// Add a product to the cart
#[utoipa::path(
    post,
    path = "/api/v1/cart/items",
    request_body = AddCartItemInput,
    responses(
        (status = 200, description = "Item added", body = crate::ApiResponse<CartView>),
        (status = 400, description = "Unknown size", body = crate::errors::ErrorResponse),
        (status = 409, description = "Product unavailable", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "Cart"
)]
pub async fn add_item(
    user: CurrentUser,
    State(state): State<AppState>,
    Json(payload): Json<AddCartItemInput>,
) -> ApiResult<CartView> {
    validate_input(&payload)?;
    let cart = state.services.carts.add_item(user.user_id, payload).await?;
    Ok(Json(ApiResponse::success(cart)))
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct UpdateQuantityRequest {
    #[validate(range(min = 1, max = 10))]
    #[schema(example = 2)]
    pub quantity: i32,
}

/// Change the quantity of a cart line
#[utoipa::path(
    patch,
    path = "/api/v1/cart/items/:item_id",
    params(("item_id" = Uuid, Path, description = "Cart item ID")),
    request_body = UpdateQuantityRequest,
    responses(
        (status = 200, description = "Quantity updated", body = crate::ApiResponse<CartView>),
        (status = 404, description = "Cart item not found", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "Cart"
)]
pub async fn update_item(
    user: CurrentUser,
    State(state): State<AppState>,
    Path(item_id): Path<Uuid>,
    Json(payload): Json<UpdateQuantityRequest>,
) -> ApiResult<CartView> {
    validate_input(&payload)?;
    let cart = state
        .services
        .carts
        .update_item(user.user_id, item_id, payload.quantity)
        .await?;
    Ok(Json(ApiResponse::success(cart)))
}

/// Remove a cart line
#[utoipa::path(
    delete,
    path = "/api/v1/cart/items/:item_id",
    params(("item_id" = Uuid, Path, description = "Cart item ID")),
    responses(
        (status = 200, description = "Item removed", body = crate::ApiResponse<CartView>),
        (status = 404, description = "Cart item not found", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "Cart"
)]
pub async fn remove_item(
    user: CurrentUser,
    State(state): State<AppState>,
    Path(item_id): Path<Uuid>,
) -> ApiResult<CartView> {
    let cart = state
        .services
        .carts
        .remove_item(user.user_id, item_id)
        .await?;
    Ok(Json(ApiResponse::success(cart)))
}

/// Empty the cart
#[utoipa::path(
    delete,
    path = "/api/v1/cart",
    responses(
        (status = 200, description = "Cart cleared", body = crate::ApiResponse<CartView>)
    ),
    security(("Bearer" = [])),
    tag = "Cart"
)]
pub async fn clear_cart(user: CurrentUser, State(state): State<AppState>) -> ApiResult<CartView> {
    let cart = state.services.carts.clear_cart(user.user_id).await?;
    Ok(Json(ApiResponse::success(cart)))
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct MergeCartRequest {
    pub lines: Vec<GuestCartLine>,
}

/// Fold a guest cart into the user's cart after login
#[utoipa::path(
    post,
    path = "/api/v1/cart/merge",
    request_body = MergeCartRequest,
    responses(
        (status = 200, description = "Guest cart merged", body = crate::ApiResponse<MergeOutcome>)
    ),
    security(("Bearer" = [])),
    tag = "Cart"
)]
pub async fn merge_guest_cart(
    user: CurrentUser,
    State(state): State<AppState>,
    Json(payload): Json<MergeCartRequest>,
) -> ApiResult<MergeOutcome> {
    let outcome = state
        .services
        .carts
        .merge_guest_cart(user.user_id, payload.lines)
        .await?;
    Ok(Json(ApiResponse::success(outcome)))
}
