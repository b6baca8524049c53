use axum::{
    extract::{Path, State},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use uuid::Uuid;

use crate::auth::CurrentUser;
use crate::errors::ServiceError;
use crate::handlers::{created_response, no_content_response, validate_input};
use crate::services::addresses::{AddressInput, AddressView};
use crate::{ApiResponse, ApiResult, AppState};

pub fn address_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_addresses).post(create_address))
        .route(
            "/:id",
            get(get_address).put(update_address).delete(delete_address),
        )
        .route("/:id/default", post(set_default_address))
}

/// The user's address book, default first
#[utoipa::path(
    get,
    path = "/api/v1/addresses",
    responses(
        (status = 200, description = "Addresses listed", body = crate::ApiResponse<Vec<AddressView>>)
    ),
    security(("Bearer" = [])),
    tag = "Addresses"
)]
pub async fn list_addresses(
    user: CurrentUser,
    State(state): State<AppState>,
) -> ApiResult<Vec<AddressView>> {
    let addresses = state.services.addresses.list(user.user_id).await?;
    Ok(Json(ApiResponse::success(addresses)))
}

#[utoipa::path(
    get,
    path = "/api/v1/addresses/:id",
    params(("id" = Uuid, Path, description = "Address ID")),
    responses(
        (status = 200, description = "Address retrieved", body = crate::ApiResponse<AddressView>),
        (status = 404, description = "Address not found", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "Addresses"
)]
pub async fn get_address(
    user: CurrentUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<AddressView> {
    let address = state.services.addresses.get(user.user_id, id).await?;
    Ok(Json(ApiResponse::success(address)))
}

/// Save a delivery address
#[utoipa::path(
    post,
    path = "/api/v1/addresses",
    request_body = AddressInput,
    responses(
        (status = 201, description = "Address created", body = crate::ApiResponse<AddressView>),
        (status = 400, description = "Invalid payload", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "Addresses"
)]
pub async fn create_address(
    user: CurrentUser,
    State(state): State<AppState>,
    Json(payload): Json<AddressInput>,
) -> Result<impl IntoResponse, ServiceError> {
    validate_input(&payload)?;
    let address = state.services.addresses.create(user.user_id, payload).await?;
    Ok(created_response(address))
}

/// Replace a delivery address
#[utoipa::path(
    put,
    path = "/api/v1/addresses/:id",
    params(("id" = Uuid, Path, description = "Address ID")),
    request_body = AddressInput,
    responses(
        (status = 200, description = "Address updated", body = crate::ApiResponse<AddressView>),
        (status = 404, description = "Address not found", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "Addresses"
)]
pub async fn update_address(
    user: CurrentUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<AddressInput>,
) -> ApiResult<AddressView> {
    validate_input(&payload)?;
    let address = state
        .services
        .addresses
        .update(user.user_id, id, payload)
        .await?;
    Ok(Json(ApiResponse::success(address)))
}

/// Make an address the default for future checkouts
#[utoipa::path(
    post,
    path = "/api/v1/addresses/:id/default",
    params(("id" = Uuid, Path, description = "Address ID")),
    responses(
        (status = 200, description = "Default moved", body = crate::ApiResponse<AddressView>),
        (status = 404, description = "Address not found", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "Addresses"
)]
pub async fn set_default_address(
    user: CurrentUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<AddressView> {
    let address = state.services.addresses.set_default(user.user_id, id).await?;
    Ok(Json(ApiResponse::success(address)))
}

/// Remove an address; order snapshots are unaffected
#[utoipa::path(
    delete,
    path = "/api/v1/addresses/:id",
    params(("id" = Uuid, Path, description = "Address ID")),
    responses(
        (status = 204, description = "Address deleted"),
        (status = 404, description = "Address not found", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "Addresses"
)]
pub async fn delete_address(
    user: CurrentUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    state.services.addresses.delete(user.user_id, id).await?;
    Ok(no_content_response())
}
