use rust_decimal_macros::dec;
use serde_json::json;
use storefront_api::errors::ServiceError;
use storefront_api::gateway::{HttpPaymentGateway, PaymentGateway};
use storefront_api::services::support::{HttpReplyGenerator, ReplyGenerator};
use wiremock::matchers::{basic_auth, bearer_token, body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn create_order_posts_rupees_as_paise() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/orders"))
        .and(basic_auth("rzp_test_abc", "key-secret"))
        .and(body_json(json!({
            "amount": 129900,
            "currency": "INR",
            "receipt": "ORD-1717920000000-A7K2",
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "order_live_1",
            "amount": 129900,
            "currency": "INR",
            "receipt": "ORD-1717920000000-A7K2",
            "status": "created",
        })))
        .expect(1)
        .mount(&server)
        .await;

    let gateway =
        HttpPaymentGateway::new(server.uri(), "rzp_test_abc", "key-secret").expect("client");
    let order = gateway
        .create_order(dec!(1299), "INR", "ORD-1717920000000-A7K2")
        .await
        .expect("create order");

    assert_eq!(order.id, "order_live_1");
    assert_eq!(order.amount, 129900);
    assert_eq!(order.currency, "INR");
    assert_eq!(order.receipt.as_deref(), Some("ORD-1717920000000-A7K2"));
    assert_eq!(order.status.as_deref(), Some("created"));
}

#[tokio::test]
async fn gateway_error_status_is_surfaced() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/orders"))
        .respond_with(ResponseTemplate::new(500).set_body_string("upstream exploded"))
        .mount(&server)
        .await;

    let gateway = HttpPaymentGateway::new(server.uri(), "key", "secret").expect("client");
    let err = gateway
        .create_order(dec!(499), "INR", "ORD-X")
        .await
        .expect_err("non-2xx must fail");

    match err {
        ServiceError::ExternalServiceError(msg) => {
            assert!(msg.contains("gateway returned 500"), "got: {msg}")
        }
        other => panic!("unexpected error {other:?}"),
    }
}

#[tokio::test]
async fn malformed_gateway_body_is_an_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/orders"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "ok": true })))
        .mount(&server)
        .await;

    let gateway = HttpPaymentGateway::new(server.uri(), "key", "secret").expect("client");
    let err = gateway
        .create_order(dec!(499), "INR", "ORD-X")
        .await
        .expect_err("unparsable body must fail");

    match err {
        ServiceError::ExternalServiceError(msg) => {
            assert!(msg.starts_with("bad gateway response:"), "got: {msg}")
        }
        other => panic!("unexpected error {other:?}"),
    }
}

#[tokio::test]
async fn refund_hits_the_payment_resource() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/payments/pay_live_9/refund"))
        .and(basic_auth("rzp_test_abc", "key-secret"))
        .and(body_json(json!({ "amount": 50000 })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "rfnd_live_1",
            "payment_id": "pay_live_9",
            "amount": 50000,
            "status": "processed",
        })))
        .expect(1)
        .mount(&server)
        .await;

    let gateway =
        HttpPaymentGateway::new(server.uri(), "rzp_test_abc", "key-secret").expect("client");
    let refund = gateway
        .refund_payment("pay_live_9", dec!(500))
        .await
        .expect("refund");

    assert_eq!(refund.id, "rfnd_live_1");
    assert_eq!(refund.payment_id.as_deref(), Some("pay_live_9"));
    assert_eq!(refund.amount, 50000);
}

#[tokio::test]
async fn unreachable_gateway_is_reported() {
    // Nothing listens on port 1; the connection is refused immediately.
    let gateway = HttpPaymentGateway::new("http://127.0.0.1:1", "key", "secret").expect("client");
    let err = gateway
        .create_order(dec!(499), "INR", "ORD-X")
        .await
        .expect_err("refused connection must fail");

    match err {
        ServiceError::ExternalServiceError(msg) => {
            assert!(msg.starts_with("gateway unreachable:"), "got: {msg}")
        }
        other => panic!("unexpected error {other:?}"),
    }
}

#[tokio::test]
async fn reply_service_round_trip() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/"))
        .and(bearer_token("reply-key"))
        .and(body_json(json!({
            "subject": "Refund status",
            "message": "where is my money",
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "reply": "Your refund is on its way.",
            "model": "support-mini",
        })))
        .expect(1)
        .mount(&server)
        .await;

    let generator = HttpReplyGenerator::new(server.uri(), "reply-key").expect("client");
    let reply = generator
        .first_reply("Refund status", "where is my money")
        .await
        .expect("reply");

    assert_eq!(reply.body, "Your refund is on its way.");
    assert_eq!(reply.model, "support-mini");
}

#[tokio::test]
async fn reply_service_defaults_the_model_name() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "reply": "On it." })),
        )
        .mount(&server)
        .await;

    let generator = HttpReplyGenerator::new(server.uri(), "reply-key").expect("client");
    let reply = generator.first_reply("Hi", "question").await.expect("reply");
    assert_eq!(reply.model, "unknown");
}

#[tokio::test]
async fn reply_service_errors_are_external() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let generator = HttpReplyGenerator::new(server.uri(), "reply-key").expect("client");
    let err = generator
        .first_reply("Hi", "question")
        .await
        .expect_err("5xx must fail");

    match err {
        ServiceError::ExternalServiceError(msg) => {
            assert!(msg.contains("reply service returned 503"), "got: {msg}")
        }
        other => panic!("unexpected error {other:?}"),
    }
}
