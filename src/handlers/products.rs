use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use utoipa::IntoParams;
use uuid::Uuid;

use crate::services::catalog::{ProductListQuery, ProductView};
use crate::{ApiResponse, ApiResult, AppState, PaginatedResponse};

/// Public catalog endpoints. No authentication; only active products are
/// visible here.
pub fn products_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_products))
        .route("/categories", get(list_categories))
        .route("/:id", get(get_product))
        .route("/slug/:slug", get(get_product_by_slug))
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct ProductsQuery {
    #[serde(default = "default_page")]
    pub page: u64,
    #[serde(default = "default_limit")]
    pub limit: u64,
    pub category: Option<String>,
    pub search: Option<String>,
}

fn default_page() -> u64 {
    1
}
fn default_limit() -> u64 {
    20
}

/// Browse the catalog
#[utoipa::path(
    get,
    path = "/api/v1/products",
    params(ProductsQuery),
    responses(
        (status = 200, description = "Products listed", body = crate::ApiResponse<PaginatedResponse<ProductView>>)
    ),
    tag = "Catalog"
)]
pub async fn list_products(
    State(state): State<AppState>,
    Query(query): Query<ProductsQuery>,
) -> ApiResult<PaginatedResponse<ProductView>> {
    let page = query.page.max(1);
    let limit = query.limit.clamp(1, 100);
    let (items, total) = state
        .services
        .catalog
        .list_products(ProductListQuery {
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

/// Distinct categories for the storefront navigation
#[utoipa::path(
    get,
    path = "/api/v1/products/categories",
    responses(
        (status = 200, description = "Categories listed", body = crate::ApiResponse<Vec<String>>)
    ),
    tag = "Catalog"
)]
pub async fn list_categories(State(state): State<AppState>) -> ApiResult<Vec<String>> {
    let categories = state.services.catalog.list_categories().await?;
    Ok(Json(ApiResponse::success(categories)))
}

/// Product detail
#[utoipa::path(
    get,
    path = "/api/v1/products/:id",
    params(("id" = Uuid, Path, description = "Product ID")),
    responses(
        (status = 200, description = "Product retrieved", body = crate::ApiResponse<ProductView>),
        (status = 404, description = "Product not found", body = crate::errors::ErrorResponse)
    ),
    tag = "Catalog"
)]
pub async fn get_product(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<ProductView> {
    let product = state.services.catalog.get_product(id).await?;
    Ok(Json(ApiResponse::success(product)))
}

/// Product detail by URL slug
#[utoipa::path(
    get,
    path = "/api/v1/products/slug/:slug",
    params(("slug" = String, Path, description = "Product slug")),
    responses(
        (status = 200, description = "Product retrieved", body = crate::ApiResponse<ProductView>),
        (status = 404, description = "Product not found", body = crate::errors::ErrorResponse)
    ),
    tag = "Catalog"
)]
pub async fn get_product_by_slug(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> ApiResult<ProductView> {
    let product = state.services.catalog.get_product_by_slug(&slug).await?;
    Ok(Json(ApiResponse::success(product)))
}
