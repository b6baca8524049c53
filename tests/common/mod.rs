// Shared harness for the integration suites. Each binary pulls in the
// helpers it needs, so some stay unused in any single compilation.
#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Method, Request, StatusCode},
    Router,
};
use chrono::Utc;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::{json, Value};
use storefront_api::auth::{Claims, ROLE_ADMIN, ROLE_CUSTOMER};
use storefront_api::config::AppConfig;
use storefront_api::db::{self, DbConfig};
use storefront_api::errors::ServiceError;
use storefront_api::events::{self, EventSender};
use storefront_api::gateway::{self, to_paise, GatewayOrder, GatewayRefund, PaymentGateway};
use storefront_api::notifications::LogNotificationService;
use storefront_api::services::addresses::{AddressInput, AddressView};
use storefront_api::services::catalog::{CreateProductInput, ProductView, SizeInput};
use storefront_api::services::support::CannedReplyGenerator;
use storefront_api::services::AppServices;
use storefront_api::{create_app, AppState};
use tempfile::TempDir;
use tokio::sync::mpsc;
use tower::ServiceExt;
use tower_http::cors::CorsLayer;
use uuid::Uuid;

const TEST_JWT_SECRET: &str = "integration-test-secret-0123456789abcdef0123456789abcdef";

fn test_config(database_url: String) -> AppConfig {
    AppConfig {
        database_url,
        port: 0,
        environment: "development".to_string(),
        log_level: "debug".to_string(),
        log_json: false,
        auto_migrate: true,
        cors_allowed_origins: None,
        jwt_secret: TEST_JWT_SECRET.to_string(),
        free_shipping_threshold: dec!(999),
        shipping_fee: dec!(49),
        checkout_timeout_secs: 10,
        razorpay_key_id: "rzp_test_integration".to_string(),
        razorpay_key_secret: "integration-key-secret".to_string(),
        razorpay_webhook_secret: "integration-webhook-secret".to_string(),
        razorpay_base_url: "https://gateway.invalid/v1".to_string(),
        support_autoreply: true,
        reply_api_url: None,
        reply_api_key: None,
    }
}

/// One call the stub gateway served, kept for assertions.
#[derive(Debug, Clone)]
pub enum GatewayCall {
    CreateOrder { amount: Decimal, receipt: String },
    Refund { gateway_payment_id: String, amount: Decimal },
}

/// Deterministic in-process gateway: sequential ids, every call recorded,
/// and an unreachable mode for outage tests.
pub struct StubGateway {
    seq: AtomicU64,
    unreachable: AtomicBool,
    calls: Mutex<Vec<GatewayCall>>,
}

impl StubGateway {
    pub fn new() -> Self {
        Self {
            seq: AtomicU64::new(0),
            unreachable: AtomicBool::new(false),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Makes every following call fail as if the gateway were down.
    pub fn set_unreachable(&self, unreachable: bool) {
        self.unreachable.store(unreachable, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<GatewayCall> {
        self.calls.lock().expect("gateway call log poisoned").clone()
    }

    fn next(&self) -> u64 {
        self.seq.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn record(&self, call: GatewayCall) {
        self.calls.lock().expect("gateway call log poisoned").push(call);
    }
}

#[async_trait]
impl PaymentGateway for StubGateway {
    async fn create_order(
        &self,
        amount: Decimal,
        currency: &str,
        receipt: &str,
    ) -> Result<GatewayOrder, ServiceError> {
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(ServiceError::ExternalServiceError(
                "gateway unreachable".to_string(),
            ));
        }
        self.record(GatewayCall::CreateOrder {
            amount,
            receipt: receipt.to_string(),
        });
        Ok(GatewayOrder {
            id: format!("order_stub_{}", self.next()),
            amount: to_paise(amount)?,
            currency: currency.to_string(),
            receipt: Some(receipt.to_string()),
            status: Some("created".to_string()),
        })
    }

    async fn refund_payment(
        &self,
        gateway_payment_id: &str,
        amount: Decimal,
    ) -> Result<GatewayRefund, ServiceError> {
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(ServiceError::ExternalServiceError(
                "gateway unreachable".to_string(),
            ));
        }
        self.record(GatewayCall::Refund {
            gateway_payment_id: gateway_payment_id.to_string(),
            amount,
        });
        Ok(GatewayRefund {
            id: format!("rfnd_stub_{}", self.next()),
            payment_id: Some(gateway_payment_id.to_string()),
            amount: to_paise(amount)?,
            status: Some("processed".to_string()),
        })
    }
}

/// Harness that spins up the full application over a fresh SQLite file.
///
/// Each instance gets its own database in its own temp directory, a stub
/// payment gateway and the canned ticket auto-responder, so suites can run
/// in parallel without sharing state.
pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub gateway: Arc<StubGateway>,
    _event_task: tokio::task::JoinHandle<()>,
    _db_dir: TempDir,
}

impl TestApp {
    pub async fn new() -> Self {
        let db_dir = TempDir::new().expect("create temp dir for test database");
        let db_path = db_dir.path().join("storefront_test.db");
        let database_url = format!("sqlite://{}?mode=rwc", db_path.display());

        // One connection keeps SQLite's single writer honest under the
        // transactional tests.
        let pool = db::establish_connection_with_config(DbConfig {
            url: database_url.clone(),
            max_connections: 1,
            min_connections: 1,
            ..DbConfig::default()
        })
        .await
        .expect("connect to test database");
        db::run_migrations(&pool).await.expect("run migrations");

        let config = Arc::new(test_config(database_url));
        let db = Arc::new(pool);

        let (event_tx, event_rx) = mpsc::channel(256);
        let event_sender = Arc::new(EventSender::new(event_tx));
        let event_task = tokio::spawn(events::process_events(
            event_rx,
            Arc::new(LogNotificationService),
        ));

        let gateway = Arc::new(StubGateway::new());
        let services = AppServices::build(
            db.clone(),
            &config,
            event_sender.clone(),
            gateway.clone(),
            Some(Arc::new(CannedReplyGenerator)),
        );

        let state = AppState {
            db,
            config,
            event_sender,
            services,
        };
        let router = create_app(state.clone(), CorsLayer::permissive());

        Self {
            router,
            state,
            gateway,
            _event_task: event_task,
            _db_dir: db_dir,
        }
    }

    /// Mints a token for a fresh customer account.
    pub fn customer(&self) -> (Uuid, String) {
        let user_id = Uuid::new_v4();
        let token = self.token_for(user_id, ROLE_CUSTOMER);
        (user_id, token)
    }

    /// Mints a token carrying the admin role.
    pub fn admin(&self) -> (Uuid, String) {
        let user_id = Uuid::new_v4();
        let token = self.token_for(user_id, ROLE_ADMIN);
        (user_id, token)
    }

    pub fn token_for(&self, user_id: Uuid, role: &str) -> String {
        let now = Utc::now();
        let claims = Claims {
            sub: user_id.to_string(),
            name: Some("Asha Verma".to_string()),
            email: Some("asha@example.com".to_string()),
            role: role.to_string(),
            iat: now.timestamp(),
            exp: (now + chrono::Duration::hours(1)).timestamp(),
        };
        jsonwebtoken::encode(
            &jsonwebtoken::Header::default(),
            &claims,
            &jsonwebtoken::EncodingKey::from_secret(self.state.config.jwt_secret.as_bytes()),
        )
        .expect("encode test token")
    }

    /// Sends a request against the router with an optional bearer token.
    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        token: Option<&str>,
    ) -> axum::response::Response {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(tok) = token {
            builder = builder.header("authorization", format!("Bearer {tok}"));
        }

        let body = if let Some(json) = body {
            builder = builder.header("content-type", "application/json");
            Body::from(serde_json::to_vec(&json).expect("serialize json request body"))
        } else {
            Body::empty()
        };

        let request = builder.body(body).expect("build request");
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router error during test request")
    }

    /// Raw-body request for webhook deliveries, where the signature covers
    /// the exact bytes on the wire.
    pub async fn request_raw(
        &self,
        method: Method,
        uri: &str,
        body: Vec<u8>,
        headers: &[(&str, &str)],
    ) -> axum::response::Response {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json");
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }

        let request = builder.body(Body::from(body)).expect("build request");
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router error during test request")
    }

    /// Client-side checkout signature for the verify endpoint.
    pub fn payment_signature(&self, gateway_order_id: &str, gateway_payment_id: &str) -> String {
        gateway::sign(
            &self.state.config.razorpay_key_secret,
            format!("{gateway_order_id}|{gateway_payment_id}").as_bytes(),
        )
    }

    /// Webhook signature over a raw delivery body.
    pub fn webhook_signature(&self, body: &[u8]) -> String {
        gateway::sign(&self.state.config.razorpay_webhook_secret, body)
    }

    /// Seeds a product sold in sizes; aggregate stock is the sum.
    pub async fn seed_sized_product(
        &self,
        name: &str,
        price: Decimal,
        sizes: &[(&str, i32)],
    ) -> ProductView {
        self.state
            .services
            .catalog
            .create_product(CreateProductInput {
                name: name.to_string(),
                slug: slug_of(name),
                description: Some(format!("{name} seeded for integration tests")),
                brand: Some("Andaman".to_string()),
                price,
                original_price: None,
                category: "T-Shirts".to_string(),
                image_urls: vec![format!("https://cdn.example.com/{}.jpg", slug_of(name))],
                stock: None,
                is_active: true,
                sizes: sizes
                    .iter()
                    .map(|(label, stock)| SizeInput {
                        label: (*label).to_string(),
                        stock: *stock,
                    })
                    .collect(),
            })
            .await
            .expect("seed product")
    }

    /// Seeds a size-less product with flat stock.
    pub async fn seed_flat_product(&self, name: &str, price: Decimal, stock: i32) -> ProductView {
        self.state
            .services
            .catalog
            .create_product(CreateProductInput {
                name: name.to_string(),
                slug: slug_of(name),
                description: None,
                brand: None,
                price,
                original_price: None,
                category: "Accessories".to_string(),
                image_urls: vec![format!("https://cdn.example.com/{}.jpg", slug_of(name))],
                stock: Some(stock),
                is_active: true,
                sizes: Vec::new(),
            })
            .await
            .expect("seed product")
    }

    /// Saves a delivery address for the user, returning its id for checkout.
    pub async fn seed_address(&self, user_id: Uuid) -> AddressView {
        self.state
            .services
            .addresses
            .create(
                user_id,
                AddressInput {
                    name: "Asha Verma".to_string(),
                    phone: "+919876543210".to_string(),
                    line1: "14 MG Road".to_string(),
                    line2: None,
                    city: "Bengaluru".to_string(),
                    state: "Karnataka".to_string(),
                    pincode: "560001".to_string(),
                    is_default: true,
                },
            )
            .await
            .expect("seed address")
    }

    pub async fn credit_wallet(&self, user_id: Uuid, amount: Decimal) {
        self.state
            .services
            .wallet
            .credit(user_id, amount, "seeded for tests")
            .await
            .expect("seed wallet credit");
    }

    /// Adds a cart line through the API and asserts it was accepted.
    pub async fn add_to_cart(
        &self,
        token: &str,
        product_id: Uuid,
        size: Option<&str>,
        quantity: i32,
    ) {
        let response = self
            .request(
                Method::POST,
                "/api/v1/cart/items",
                Some(json!({
                    "product_id": product_id,
                    "size": size,
                    "quantity": quantity,
                })),
                Some(token),
            )
            .await;
        assert_eq!(response.status(), StatusCode::OK, "cart add should succeed");
    }

    /// Places an order through the API and returns the checkout outcome.
    pub async fn place_order(
        &self,
        token: &str,
        address_id: Uuid,
        payment_method: &str,
        use_wallet: bool,
    ) -> Value {
        let response = self
            .request(
                Method::POST,
                "/api/v1/checkout/place-order",
                Some(json!({
                    "address_id": address_id,
                    "payment_method": payment_method,
                    "use_wallet": use_wallet,
                })),
                Some(token),
            )
            .await;
        let (status, body) = read_json(response).await;
        assert_eq!(status, StatusCode::CREATED, "checkout failed: {body}");
        body["data"].clone()
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        self._event_task.abort();
    }
}

fn slug_of(name: &str) -> String {
    name.to_lowercase().replace(' ', "-")
}

/// Parses a decimal field that the API serializes as a JSON string.
pub fn dec_field(value: &Value, key: &str) -> Decimal {
    value[key]
        .as_str()
        .unwrap_or_else(|| panic!("expected string decimal at {key}, got {}", value[key]))
        .parse()
        .expect("parse decimal field")
}

/// Reads the response status and JSON body; an empty body becomes `Null`.
pub async fn read_json(response: axum::response::Response) -> (StatusCode, Value) {
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read response body");
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).expect("response body should be json")
    };
    (status, body)
}
