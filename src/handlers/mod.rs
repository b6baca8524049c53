use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use validator::Validate;

use crate::errors::ServiceError;
use crate::ApiResponse;

pub mod addresses;
pub mod admin;
pub mod carts;
pub mod checkout;
pub mod orders;
pub mod payments;
pub mod products;
pub mod support;
pub mod wallet;

/// 201 with the standard envelope.
pub fn created_response<T: Serialize>(data: T) -> Response {
    (StatusCode::CREATED, Json(ApiResponse::success(data))).into_response()
}

/// 204 for deletions.
pub fn no_content_response() -> Response {
    StatusCode::NO_CONTENT.into_response()
}

/// Validate request input.
pub fn validate_input<T: Validate>(input: &T) -> Result<(), ServiceError> {
    Ok(input.validate()?)
}
