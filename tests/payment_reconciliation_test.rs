mod common;

use axum::http::{Method, StatusCode};
use common::{dec_field, read_json, GatewayCall, TestApp};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::{json, Value};

struct PrepaidOrder {
    token: String,
    order_id: String,
    order_number: String,
    total: Decimal,
}

/// Seeds a UPI order above the free-shipping threshold (total 1299).
async fn place_prepaid_order(app: &TestApp, product_name: &str) -> PrepaidOrder {
    let (user_id, token) = app.customer();
    let product = app
        .seed_sized_product(product_name, dec!(1299), &[("M", 3)])
        .await;
    let address = app.seed_address(user_id).await;
    app.add_to_cart(&token, product.id, Some("M"), 1).await;
    let outcome = app.place_order(&token, address.id, "UPI", false).await;
    assert_eq!(outcome["payment_required"], true);

    PrepaidOrder {
        token,
        order_id: outcome["order_id"].as_str().expect("order id").to_string(),
        order_number: outcome["order_number"]
            .as_str()
            .expect("order number")
            .to_string(),
        total: dec_field(&outcome, "total_amount"),
    }
}

async fn create_intent(app: &TestApp, order: &PrepaidOrder) -> Value {
    let response = app
        .request(
            Method::POST,
            "/api/v1/payments/create",
            Some(json!({ "order_id": order.order_id })),
            Some(&order.token),
        )
        .await;
    let (status, body) = read_json(response).await;
    assert_eq!(status, StatusCode::OK, "intent failed: {body}");
    body["data"].clone()
}

/// Builds a signed gateway webhook delivery for the given event.
fn webhook_delivery(app: &TestApp, event: &str, payment_id: &str, gateway_order_id: &str) -> (Vec<u8>, String) {
    let body = serde_json::to_vec(&json!({
        "event": event,
        "payload": {
            "payment": {
                "entity": {
                    "id": payment_id,
                    "order_id": gateway_order_id,
                }
            }
        }
    }))
    .expect("serialize webhook body");
    let signature = app.webhook_signature(&body);
    (body, signature)
}

#[tokio::test]
async fn intent_carries_the_gateway_handshake() {
    let app = TestApp::new().await;
    let order = place_prepaid_order(&app, "Quilted Jacket").await;

    let intent = create_intent(&app, &order).await;
    assert_eq!(intent["order_number"], order.order_number.as_str());
    assert!(intent["gateway_order_id"]
        .as_str()
        .expect("gateway order id")
        .starts_with("order_stub_"));
    assert_eq!(dec_field(&intent, "amount"), dec!(1299));
    assert_eq!(intent["amount_paise"], 129900);
    assert_eq!(intent["currency"], "INR");
    assert_eq!(intent["key_id"], "rzp_test_integration");

    let calls = app.gateway.calls();
    assert_eq!(calls.len(), 1);
    match &calls[0] {
        GatewayCall::CreateOrder { amount, receipt } => {
            assert_eq!(*amount, order.total);
            assert_eq!(receipt, &order.order_number);
        }
        other => panic!("unexpected gateway call {other:?}"),
    }
}

#[tokio::test]
async fn open_intent_is_reused_on_retry() {
    let app = TestApp::new().await;
    let order = place_prepaid_order(&app, "Harrington Jacket").await;

    let first = create_intent(&app, &order).await;
    let second = create_intent(&app, &order).await;
    assert_eq!(first["gateway_order_id"], second["gateway_order_id"]);
    assert_eq!(first["payment_id"], second["payment_id"]);
    // Only one gateway order was ever opened.
    assert_eq!(app.gateway.calls().len(), 1);
}

#[tokio::test]
async fn cod_orders_have_no_payment_intent() {
    let app = TestApp::new().await;
    let (user_id, token) = app.customer();
    let product = app
        .seed_sized_product("Chore Coat", dec!(1499), &[("L", 2)])
        .await;
    let address = app.seed_address(user_id).await;
    app.add_to_cart(&token, product.id, Some("L"), 1).await;
    let outcome = app.place_order(&token, address.id, "COD", false).await;

    let response = app
        .request(
            Method::POST,
            "/api/v1/payments/create",
            Some(json!({ "order_id": outcome["order_id"] })),
            Some(&token),
        )
        .await;
    let (status, body) = read_json(response).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Validation error: order is not prepaid");
}

#[tokio::test]
async fn wallet_covered_orders_have_nothing_to_collect() {
    let app = TestApp::new().await;
    let (user_id, token) = app.customer();
    let product = app
        .seed_sized_product("Twill Overshirt", dec!(1299), &[("M", 2)])
        .await;
    let address = app.seed_address(user_id).await;
    app.credit_wallet(user_id, dec!(2000)).await;
    app.add_to_cart(&token, product.id, Some("M"), 1).await;
    let outcome = app.place_order(&token, address.id, "CARD", true).await;
    assert_eq!(dec_field(&outcome, "total_amount"), dec!(0));

    let response = app
        .request(
            Method::POST,
            "/api/v1/payments/create",
            Some(json!({ "order_id": outcome["order_id"] })),
            Some(&token),
        )
        .await;
    let (status, body) = read_json(response).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        body["message"],
        "Validation error: order has nothing left to collect"
    );
}

#[tokio::test]
async fn valid_signature_captures_and_packs_the_order() {
    let app = TestApp::new().await;
    let order = place_prepaid_order(&app, "Bomber Jacket").await;
    let intent = create_intent(&app, &order).await;
    let gateway_order_id = intent["gateway_order_id"].as_str().expect("gateway order id");

    let signature = app.payment_signature(gateway_order_id, "pay_int_1");
    let response = app
        .request(
            Method::POST,
            "/api/v1/payments/verify",
            Some(json!({
                "gateway_order_id": gateway_order_id,
                "gateway_payment_id": "pay_int_1",
                "signature": signature,
            })),
            Some(&order.token),
        )
        .await;
    let (status, body) = read_json(response).await;
    assert_eq!(status, StatusCode::OK, "verify failed: {body}");
    assert_eq!(body["data"]["state"], "PAID");
    assert_eq!(body["data"]["gateway_payment_id"], "pay_int_1");

    // Payment money packs the order in the same stroke.
    let response = app
        .request(
            Method::GET,
            &format!("/api/v1/orders/{}", order.order_id),
            None,
            Some(&order.token),
        )
        .await;
    let (_, body) = read_json(response).await;
    assert_eq!(body["data"]["status"], "Packed");
    assert_eq!(body["data"]["payment_status"], "Paid");
    let history = body["data"]["history"].as_array().expect("history");
    assert_eq!(
        history.last().expect("capture entry")["note"],
        "payment captured"
    );

    // The client retrying its callback sees the same answer.
    let signature = app.payment_signature(gateway_order_id, "pay_int_1");
    let response = app
        .request(
            Method::POST,
            "/api/v1/payments/verify",
            Some(json!({
                "gateway_order_id": gateway_order_id,
                "gateway_payment_id": "pay_int_1",
                "signature": signature,
            })),
            Some(&order.token),
        )
        .await;
    let (status, body) = read_json(response).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["state"], "PAID");
}

#[tokio::test]
async fn bad_signature_fails_the_attempt_and_allows_a_retry() {
    let app = TestApp::new().await;
    let order = place_prepaid_order(&app, "Coach Jacket").await;
    let intent = create_intent(&app, &order).await;
    let first_gateway_order = intent["gateway_order_id"]
        .as_str()
        .expect("gateway order id")
        .to_string();

    let response = app
        .request(
            Method::POST,
            "/api/v1/payments/verify",
            Some(json!({
                "gateway_order_id": first_gateway_order,
                "gateway_payment_id": "pay_int_1",
                "signature": "forged",
            })),
            Some(&order.token),
        )
        .await;
    let (status, body) = read_json(response).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "invalid signature");

    let response = app
        .request(
            Method::GET,
            &format!("/api/v1/payments/order/{}", order.order_id),
            None,
            Some(&order.token),
        )
        .await;
    let (_, body) = read_json(response).await;
    assert_eq!(body["data"]["state"], "FAILED");

    let response = app
        .request(
            Method::GET,
            &format!("/api/v1/orders/{}", order.order_id),
            None,
            Some(&order.token),
        )
        .await;
    let (_, body) = read_json(response).await;
    assert_eq!(body["data"]["status"], "Pending");
    assert_eq!(body["data"]["payment_status"], "Failed");

    // A failed attempt is not final: a fresh intent opens a new gateway
    // order and a clean capture still pays the order.
    let retry = create_intent(&app, &order).await;
    let second_gateway_order = retry["gateway_order_id"].as_str().expect("gateway order id");
    assert_ne!(second_gateway_order, first_gateway_order);

    let signature = app.payment_signature(second_gateway_order, "pay_int_2");
    let response = app
        .request(
            Method::POST,
            "/api/v1/payments/verify",
            Some(json!({
                "gateway_order_id": second_gateway_order,
                "gateway_payment_id": "pay_int_2",
                "signature": signature,
            })),
            Some(&order.token),
        )
        .await;
    let (status, _) = read_json(response).await;
    assert_eq!(status, StatusCode::OK);

    let response = app
        .request(
            Method::GET,
            &format!("/api/v1/orders/{}", order.order_id),
            None,
            Some(&order.token),
        )
        .await;
    let (_, body) = read_json(response).await;
    assert_eq!(body["data"]["status"], "Packed");
    assert_eq!(body["data"]["payment_status"], "Paid");
}

#[tokio::test]
async fn failed_attempt_cannot_be_verified_again() {
    let app = TestApp::new().await;
    let order = place_prepaid_order(&app, "Puffer Jacket").await;
    let intent = create_intent(&app, &order).await;
    let gateway_order_id = intent["gateway_order_id"].as_str().expect("gateway order id");

    app.request(
        Method::POST,
        "/api/v1/payments/verify",
        Some(json!({
            "gateway_order_id": gateway_order_id,
            "gateway_payment_id": "pay_int_1",
            "signature": "forged",
        })),
        Some(&order.token),
    )
    .await;

    let signature = app.payment_signature(gateway_order_id, "pay_int_1");
    let response = app
        .request(
            Method::POST,
            "/api/v1/payments/verify",
            Some(json!({
                "gateway_order_id": gateway_order_id,
                "gateway_payment_id": "pay_int_1",
                "signature": signature,
            })),
            Some(&order.token),
        )
        .await;
    let (status, body) = read_json(response).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["message"], "Conflict: payment is FAILED");
}

#[tokio::test]
async fn webhook_capture_is_idempotent() {
    let app = TestApp::new().await;
    let order = place_prepaid_order(&app, "Sherpa Jacket").await;
    let intent = create_intent(&app, &order).await;
    let gateway_order_id = intent["gateway_order_id"].as_str().expect("gateway order id");

    let (body, signature) =
        webhook_delivery(&app, "payment.captured", "pay_hook_1", gateway_order_id);
    let response = app
        .request_raw(
            Method::POST,
            "/webhooks/payments",
            body.clone(),
            &[("x-razorpay-signature", signature.as_str())],
        )
        .await;
    let (status, reply) = read_json(response).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(reply["data"]["status"], "processed");

    let response = app
        .request(
            Method::GET,
            &format!("/api/v1/orders/{}", order.order_id),
            None,
            Some(&order.token),
        )
        .await;
    let (_, order_body) = read_json(response).await;
    assert_eq!(order_body["data"]["status"], "Packed");
    assert_eq!(order_body["data"]["payment_status"], "Paid");

    // The gateway redelivers; nothing moves twice.
    let response = app
        .request_raw(
            Method::POST,
            "/webhooks/payments",
            body,
            &[("x-razorpay-signature", signature.as_str())],
        )
        .await;
    let (status, reply) = read_json(response).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(reply["data"]["status"], "already_processed");
}

#[tokio::test]
async fn webhook_requires_an_authentic_signature() {
    let app = TestApp::new().await;
    let order = place_prepaid_order(&app, "Rain Shell").await;
    let intent = create_intent(&app, &order).await;
    let gateway_order_id = intent["gateway_order_id"].as_str().expect("gateway order id");
    let (body, _) = webhook_delivery(&app, "payment.captured", "pay_hook_1", gateway_order_id);

    let response = app
        .request_raw(
            Method::POST,
            "/webhooks/payments",
            body.clone(),
            &[("x-razorpay-signature", "forged")],
        )
        .await;
    let (status, reply) = read_json(response).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(reply["message"], "invalid signature");

    let response = app
        .request_raw(Method::POST, "/webhooks/payments", body, &[])
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // Nothing was applied.
    let response = app
        .request(
            Method::GET,
            &format!("/api/v1/payments/order/{}", order.order_id),
            None,
            Some(&order.token),
        )
        .await;
    let (_, body) = read_json(response).await;
    assert_eq!(body["data"]["state"], "CREATED");
}

#[tokio::test]
async fn webhook_acknowledges_what_it_cannot_use() {
    let app = TestApp::new().await;

    // Authentic delivery for a gateway order we never opened.
    let (body, signature) =
        webhook_delivery(&app, "payment.captured", "pay_hook_1", "order_unknown_1");
    let response = app
        .request_raw(
            Method::POST,
            "/webhooks/payments",
            body,
            &[("x-razorpay-signature", signature.as_str())],
        )
        .await;
    let (status, reply) = read_json(response).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(reply["data"]["status"], "acknowledged");

    // Authentic but unhandled event type.
    let order = place_prepaid_order(&app, "Track Jacket").await;
    let intent = create_intent(&app, &order).await;
    let gateway_order_id = intent["gateway_order_id"].as_str().expect("gateway order id");
    let (body, signature) =
        webhook_delivery(&app, "refund.processed", "pay_hook_2", gateway_order_id);
    let response = app
        .request_raw(
            Method::POST,
            "/webhooks/payments",
            body,
            &[("x-razorpay-signature", signature.as_str())],
        )
        .await;
    let (status, reply) = read_json(response).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(reply["data"]["status"], "acknowledged");
}

#[tokio::test]
async fn webhook_failure_event_marks_the_attempt() {
    let app = TestApp::new().await;
    let order = place_prepaid_order(&app, "Denim Trucker").await;
    let intent = create_intent(&app, &order).await;
    let gateway_order_id = intent["gateway_order_id"].as_str().expect("gateway order id");

    let (body, signature) =
        webhook_delivery(&app, "payment.failed", "pay_hook_1", gateway_order_id);
    let response = app
        .request_raw(
            Method::POST,
            "/webhooks/payments",
            body.clone(),
            &[("x-razorpay-signature", signature.as_str())],
        )
        .await;
    let (status, reply) = read_json(response).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(reply["data"]["status"], "processed");

    let response = app
        .request(
            Method::GET,
            &format!("/api/v1/payments/order/{}", order.order_id),
            None,
            Some(&order.token),
        )
        .await;
    let (_, payment_body) = read_json(response).await;
    assert_eq!(payment_body["data"]["state"], "FAILED");

    let response = app
        .request_raw(
            Method::POST,
            "/webhooks/payments",
            body,
            &[("x-razorpay-signature", signature.as_str())],
        )
        .await;
    let (_, reply) = read_json(response).await;
    assert_eq!(reply["data"]["status"], "already_processed");
}

#[tokio::test]
async fn admin_refund_round_trips_the_gateway() {
    let app = TestApp::new().await;
    let (_, admin) = app.admin();
    let order = place_prepaid_order(&app, "Field Jacket").await;
    let intent = create_intent(&app, &order).await;
    let gateway_order_id = intent["gateway_order_id"].as_str().expect("gateway order id");
    let signature = app.payment_signature(gateway_order_id, "pay_int_1");
    app.request(
        Method::POST,
        "/api/v1/payments/verify",
        Some(json!({
            "gateway_order_id": gateway_order_id,
            "gateway_payment_id": "pay_int_1",
            "signature": signature,
        })),
        Some(&order.token),
    )
    .await;

    let response = app
        .request(
            Method::POST,
            &format!("/api/v1/admin/payments/{}/refund", order.order_id),
            Some(json!({})),
            Some(&admin),
        )
        .await;
    let (status, body) = read_json(response).await;
    assert_eq!(status, StatusCode::OK, "refund failed: {body}");
    assert_eq!(body["data"]["state"], "REFUNDED");
    assert!(body["data"]["gateway_refund_id"]
        .as_str()
        .expect("refund id")
        .starts_with("rfnd_stub_"));

    let refund_call = app
        .gateway
        .calls()
        .into_iter()
        .find_map(|call| match call {
            GatewayCall::Refund {
                gateway_payment_id,
                amount,
            } => Some((gateway_payment_id, amount)),
            _ => None,
        })
        .expect("gateway refund issued");
    assert_eq!(refund_call.0, "pay_int_1");
    assert_eq!(refund_call.1, order.total);

    let response = app
        .request(
            Method::GET,
            &format!("/api/v1/orders/{}", order.order_id),
            None,
            Some(&order.token),
        )
        .await;
    let (_, body) = read_json(response).await;
    assert_eq!(body["data"]["payment_status"], "Refunded");
    assert_eq!(dec_field(&body["data"], "refund_amount"), order.total);

    // Refunded money cannot be refunded again.
    let response = app
        .request(
            Method::POST,
            &format!("/api/v1/admin/payments/{}/refund", order.order_id),
            Some(json!({})),
            Some(&admin),
        )
        .await;
    let (status, body) = read_json(response).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["message"], "Conflict: order payment is Refunded");
}

#[tokio::test]
async fn refunds_require_captured_money() {
    let app = TestApp::new().await;
    let (_, admin) = app.admin();
    let (user_id, token) = app.customer();
    let product = app
        .seed_sized_product("Utility Vest", dec!(899), &[("M", 2)])
        .await;
    let address = app.seed_address(user_id).await;
    app.add_to_cart(&token, product.id, Some("M"), 1).await;
    let outcome = app.place_order(&token, address.id, "COD", false).await;
    let order_id = outcome["order_id"].as_str().expect("order id");

    let response = app
        .request(
            Method::POST,
            &format!("/api/v1/admin/payments/{order_id}/refund"),
            Some(json!({})),
            Some(&admin),
        )
        .await;
    let (status, body) = read_json(response).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["message"], "Conflict: order payment is Pending");
}

#[tokio::test]
async fn gateway_outage_surfaces_as_bad_gateway() {
    let app = TestApp::new().await;
    let order = place_prepaid_order(&app, "Windcheater").await;
    app.gateway.set_unreachable(true);

    let response = app
        .request(
            Method::POST,
            "/api/v1/payments/create",
            Some(json!({ "order_id": order.order_id })),
            Some(&order.token),
        )
        .await;
    let (status, body) = read_json(response).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(
        body["message"],
        "External service error: gateway unreachable"
    );
}
