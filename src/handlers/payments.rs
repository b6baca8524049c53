use axum::{
    body::Bytes,
    extract::{Path, State},
    http::HeaderMap,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::auth::CurrentUser;
use crate::services::payments::{PaymentIntentView, PaymentView, VerifyPaymentInput};
use crate::{ApiResponse, ApiResult, AppState};

/// Signature header the gateway sets on webhook deliveries.
const WEBHOOK_SIGNATURE_HEADER: &str = "x-razorpay-signature";

pub fn payment_routes() -> Router<AppState> {
    Router::new()
        .route("/create", post(create_intent))
        .route("/verify", post(verify_payment))
        .route("/order/:order_id", get(payment_for_order))
}

/// Unauthenticated gateway callbacks, mounted outside `/api/v1`.
pub fn webhook_routes() -> Router<AppState> {
    Router::new().route("/payments", post(payment_webhook))
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateIntentRequest {
    pub order_id: Uuid,
}

/// Start the gateway payment for a prepaid order
#[utoipa::path(
    post,
    path = "/api/v1/payments/create",
    request_body = CreateIntentRequest,
    responses(
        (status = 200, description = "Payment intent ready", body = crate::ApiResponse<PaymentIntentView>),
        (status = 400, description = "Order is not prepaid", body = crate::errors::ErrorResponse),
        (status = 409, description = "Order already paid", body = crate::errors::ErrorResponse),
        (status = 502, description = "Gateway unavailable", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "Payments"
)]
pub async fn create_intent(
    user: CurrentUser,
    State(state): State<AppState>,
    Json(payload): Json<CreateIntentRequest>,
) -> ApiResult<PaymentIntentView> {
    let intent = state
        .services
        .payments
        .create_intent(user.user_id, payload.order_id)
        .await?;
    Ok(Json(ApiResponse::success(intent)))
}

/// Confirm a payment with the signature returned to the client
#[utoipa::path(
    post,
    path = "/api/v1/payments/verify",
    request_body = VerifyPaymentInput,
    responses(
        (status = 200, description = "Payment captured", body = crate::ApiResponse<PaymentView>),
        (status = 400, description = "Signature rejected", body = crate::errors::ErrorResponse),
        (status = 409, description = "Payment not verifiable", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "Payments"
)]
pub async fn verify_payment(
    user: CurrentUser,
    State(state): State<AppState>,
    Json(payload): Json<VerifyPaymentInput>,
) -> ApiResult<PaymentView> {
    let payment = state.services.payments.verify(user.user_id, payload).await?;
    Ok(Json(ApiResponse::success(payment)))
}

/// Latest payment attempt for an order
#[utoipa::path(
    get,
    path = "/api/v1/payments/order/:order_id",
    params(("order_id" = Uuid, Path, description = "Order ID")),
    responses(
        (status = 200, description = "Payment retrieved", body = crate::ApiResponse<Option<PaymentView>>),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "Payments"
)]
pub async fn payment_for_order(
    user: CurrentUser,
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
) -> ApiResult<Option<PaymentView>> {
    let payment = state
        .services
        .payments
        .payment_for_order(user.user_id, order_id)
        .await?;
    Ok(Json(ApiResponse::success(payment)))
}

/// Gateway webhook endpoint.
///
/// Authenticated by the HMAC signature over the raw body, not by a bearer
/// token. Returns 200 for everything the gateway should not retry,
/// including events for orders we do not know.
#[utoipa::path(
    post,
    path = "/webhooks/payments",
    request_body(content = Value, content_type = "application/json"),
    responses(
        (status = 200, description = "Webhook acknowledged"),
        (status = 400, description = "Missing or invalid signature", body = crate::errors::ErrorResponse)
    ),
    tag = "Payments"
)]
pub async fn payment_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Value> {
    let signature = headers
        .get(WEBHOOK_SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok());

    let outcome = state
        .services
        .payments
        .handle_webhook(&body, signature)
        .await?;

    Ok(Json(ApiResponse::success(
        json!({ "status": outcome.as_str() }),
    )))
}
