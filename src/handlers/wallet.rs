use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::auth::CurrentUser;
use crate::entities::wallet_transaction;
use crate::entities::wallet_transaction::WalletDirection;
use crate::{ApiResponse, ApiResult, AppState, ListQuery, PaginatedResponse};

/// Recent ledger entries bundled into the wallet overview.
const OVERVIEW_TRANSACTIONS: u64 = 50;

pub fn wallet_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(get_wallet))
        .route("/transactions", get(list_transactions))
}

/// Store-credit balance with the most recent ledger entries.
#[derive(Debug, Serialize, ToSchema)]
pub struct WalletOverview {
    #[schema(value_type = String, example = "250.00")]
    pub balance: Decimal,
    pub transactions: Vec<WalletTransactionResponse>,
}

/// Current store-credit balance and recent activity
#[utoipa::path(
    get,
    path = "/api/v1/wallet",
    responses(
        (status = 200, description = "Wallet retrieved", body = crate::ApiResponse<WalletOverview>)
    ),
    security(("Bearer" = [])),
    tag = "Wallet"
)]
pub async fn get_wallet(
    user: CurrentUser,
    State(state): State<AppState>,
) -> ApiResult<WalletOverview> {
    let wallet = state.services.wallet.get_wallet(user.user_id).await?;
    let (entries, _) = state
        .services
        .wallet
        .list_transactions(user.user_id, 1, OVERVIEW_TRANSACTIONS)
        .await?;
    Ok(Json(ApiResponse::success(WalletOverview {
        balance: wallet.balance,
        transactions: entries
            .into_iter()
            .map(WalletTransactionResponse::from)
            .collect(),
    })))
}

#[derive(Debug, Serialize, ToSchema)]
pub struct WalletTransactionResponse {
    pub id: Uuid,
    pub direction: WalletDirection,
    #[schema(value_type = String, example = "250.00")]
    pub amount: Decimal,
    #[schema(value_type = String, example = "549.00")]
    pub balance_after: Decimal,
    #[schema(example = "refund for order ORD-1717920000000-A7K2")]
    pub reason: String,
    pub order_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl From<wallet_transaction::Model> for WalletTransactionResponse {
    fn from(t: wallet_transaction::Model) -> Self {
        Self {
            id: t.id,
            direction: t.direction,
            amount: t.amount,
            balance_after: t.balance_after,
            reason: t.reason,
            order_id: t.order_id,
            created_at: t.created_at,
        }
    }
}

/// Ledger of wallet credits and debits, newest first
#[utoipa::path(
    get,
    path = "/api/v1/wallet/transactions",
    params(("page" = u64, Query, description = "Page number"), ("limit" = u64, Query, description = "Page size")),
    responses(
        (status = 200, description = "Transactions listed", body = crate::ApiResponse<PaginatedResponse<WalletTransactionResponse>>)
    ),
    security(("Bearer" = [])),
    tag = "Wallet"
)]
pub async fn list_transactions(
    user: CurrentUser,
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> ApiResult<PaginatedResponse<WalletTransactionResponse>> {
    let page = query.page.max(1);
    let limit = query.capped_limit();
    let (entries, total) = state
        .services
        .wallet
        .list_transactions(user.user_id, page, limit)
        .await?;
    let items = entries
        .into_iter()
        .map(WalletTransactionResponse::from)
        .collect();
    Ok(Json(ApiResponse::success(PaginatedResponse::new(
        items, total, page, limit,
    ))))
}
