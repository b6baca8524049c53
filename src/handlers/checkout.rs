use axum::{extract::State, response::IntoResponse, routing::post, Json, Router};

use crate::auth::CurrentUser;
use crate::errors::ServiceError;
use crate::handlers::created_response;
use crate::services::checkout::PlaceOrderInput;
use crate::AppState;

pub fn checkout_routes() -> Router<AppState> {
    Router::new().route("/place-order", post(place_order))
}

/// Place an order from the cart
#[utoipa::path(
    post,
    path = "/api/v1/checkout/place-order",
    request_body = PlaceOrderInput,
    responses(
        (status = 201, description = "Order placed", body = crate::ApiResponse<crate::services::checkout::CheckoutOutcome>),
        (status = 400, description = "Empty cart or invalid address", body = crate::errors::ErrorResponse),
        (status = 409, description = "Product unavailable or out of stock", body = crate::errors::ErrorResponse),
        (status = 504, description = "Checkout timed out", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "Checkout"
)]
pub async fn place_order(
    user: CurrentUser,
    State(state): State<AppState>,
    Json(payload): Json<PlaceOrderInput>,
) -> Result<impl IntoResponse, ServiceError> {
    let outcome = state
        .services
        .checkout
        .place_order(user.user_id, payload)
        .await?;
    Ok(created_response(outcome))
}
