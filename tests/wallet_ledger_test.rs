mod common;

use std::sync::Arc;

use axum::http::{Method, StatusCode};
use common::{dec_field, read_json, TestApp};
use proptest::prelude::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use sea_orm::TransactionTrait;
use serde_json::json;
use storefront_api::db::{self, DbConfig};
use storefront_api::entities::wallet_transaction::WalletDirection;
use storefront_api::errors::ServiceError;
use storefront_api::events::EventSender;
use storefront_api::services::wallet::WalletService;
use tokio::sync::mpsc;
use uuid::Uuid;

#[derive(Debug, Clone)]
enum LedgerOp {
    Credit(u32),
    Debit(u32),
}

/// Sequences of credits and debits in whole rupees; debits range higher
/// than credits so overdraw attempts show up regularly.
fn ledger_ops() -> impl Strategy<Value = Vec<LedgerOp>> {
    prop::collection::vec(
        prop_oneof![
            (1u32..=500).prop_map(LedgerOp::Credit),
            (1u32..=600).prop_map(LedgerOp::Debit),
        ],
        1..24,
    )
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    /// The wallet must equal the replayed ledger after any sequence of
    /// operations, no debit may overdraw, and every recorded
    /// `balance_after` must sit on the running chain.
    #[test]
    fn ledger_reconciles_over_any_sequence(ops in ledger_ops()) {
        let rt = tokio::runtime::Runtime::new().expect("runtime");
        rt.block_on(async move {
            let pool = db::establish_connection_with_config(DbConfig {
                url: "sqlite::memory:".to_string(),
                max_connections: 1,
                min_connections: 1,
                ..DbConfig::default()
            })
            .await
            .expect("connect to in-memory database");
            db::run_migrations(&pool).await.expect("run migrations");
            let db = Arc::new(pool);

            let (event_tx, _event_rx) = mpsc::channel(256);
            let service = WalletService::new(db.clone(), Arc::new(EventSender::new(event_tx)));
            let user_id = Uuid::new_v4();

            let mut expected = Decimal::ZERO;
            let mut applied = 0u64;
            for op in ops {
                match op {
                    LedgerOp::Credit(n) => {
                        let amount = Decimal::from(n);
                        service
                            .credit(user_id, amount, "property credit")
                            .await
                            .expect("credit");
                        expected += amount;
                        applied += 1;
                    }
                    LedgerOp::Debit(n) => {
                        let amount = Decimal::from(n);
                        let txn = db.begin().await.expect("begin");
                        let result = service
                            .debit_in_txn(&txn, user_id, amount, "property debit", None)
                            .await;
                        if amount <= expected {
                            result.expect("covered debit");
                            txn.commit().await.expect("commit");
                            expected -= amount;
                            applied += 1;
                        } else {
                            assert!(
                                matches!(result, Err(ServiceError::InsufficientWalletBalance)),
                                "overdraw must be refused"
                            );
                            txn.rollback().await.expect("rollback");
                        }
                    }
                }
            }

            let wallet = service.get_wallet(user_id).await.expect("wallet");
            assert_eq!(wallet.balance, expected);

            let (entries, total) = service
                .list_transactions(user_id, 1, 500)
                .await
                .expect("ledger");
            assert_eq!(total, applied);

            // Entries come newest first; replay oldest first.
            let mut running = Decimal::ZERO;
            for entry in entries.iter().rev() {
                running = match entry.direction {
                    WalletDirection::Credit => running + entry.amount,
                    WalletDirection::Debit => running - entry.amount,
                };
                assert_eq!(entry.balance_after, running);
                assert!(running >= Decimal::ZERO);
            }
            assert_eq!(running, expected);
        });
    }
}

#[tokio::test]
async fn fresh_wallet_is_empty() {
    let app = TestApp::new().await;
    let (_, token) = app.customer();

    let response = app
        .request(Method::GET, "/api/v1/wallet", None, Some(&token))
        .await;
    let (status, body) = read_json(response).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(dec_field(&body["data"], "balance"), dec!(0));
    assert!(body["data"]["transactions"]
        .as_array()
        .expect("transactions")
        .is_empty());
}

#[tokio::test]
async fn goodwill_credit_shows_up_in_the_overview() {
    let app = TestApp::new().await;
    let (_, admin) = app.admin();
    let (user_id, token) = app.customer();

    let response = app
        .request(
            Method::POST,
            &format!("/api/v1/admin/wallets/{user_id}/credit"),
            Some(json!({ "amount": "250", "reason": "late delivery goodwill" })),
            Some(&admin),
        )
        .await;
    let (status, body) = read_json(response).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(dec_field(&body["data"], "balance"), dec!(250));

    let response = app
        .request(Method::GET, "/api/v1/wallet", None, Some(&token))
        .await;
    let (_, body) = read_json(response).await;
    assert_eq!(dec_field(&body["data"], "balance"), dec!(250));
    let entry = &body["data"]["transactions"][0];
    assert_eq!(entry["direction"], "CREDIT");
    assert_eq!(dec_field(entry, "amount"), dec!(250));
    assert_eq!(dec_field(entry, "balance_after"), dec!(250));
    assert_eq!(entry["reason"], "late delivery goodwill");
    assert!(entry["order_id"].is_null());
}

#[tokio::test]
async fn credit_amount_must_be_positive() {
    let app = TestApp::new().await;
    let (_, admin) = app.admin();
    let (user_id, _) = app.customer();

    let response = app
        .request(
            Method::POST,
            &format!("/api/v1/admin/wallets/{user_id}/credit"),
            Some(json!({ "amount": "-5", "reason": "bad actor" })),
            Some(&admin),
        )
        .await;
    let (status, body) = read_json(response).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        body["message"],
        "Validation error: credit amount must be positive"
    );
}

#[tokio::test]
async fn ledger_pages_newest_first() {
    let app = TestApp::new().await;
    let (user_id, token) = app.customer();
    app.credit_wallet(user_id, dec!(10)).await;
    app.credit_wallet(user_id, dec!(20)).await;
    app.credit_wallet(user_id, dec!(30)).await;

    let response = app
        .request(
            Method::GET,
            "/api/v1/wallet/transactions?page=1&limit=2",
            None,
            Some(&token),
        )
        .await;
    let (status, body) = read_json(response).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["total"], 3);
    assert_eq!(body["data"]["total_pages"], 2);
    let items = body["data"]["items"].as_array().expect("items");
    assert_eq!(items.len(), 2);
    assert_eq!(dec_field(&items[0], "amount"), dec!(30));
    assert_eq!(dec_field(&items[1], "amount"), dec!(20));
}

#[tokio::test]
async fn only_admins_hand_out_credit() {
    let app = TestApp::new().await;
    let (user_id, token) = app.customer();

    let response = app
        .request(
            Method::POST,
            &format!("/api/v1/admin/wallets/{user_id}/credit"),
            Some(json!({ "amount": "50", "reason": "self service" })),
            Some(&token),
        )
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}
