use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Storefront API",
        version = "0.3.0",
        description = r#"
# ShopHub Storefront API

Backend for an apparel storefront: catalog browsing with per-size inventory,
carts, atomic checkout, order lifecycle, a store-credit wallet, payment
reconciliation against an external gateway, and customer support tickets.

## Authentication

Customer and admin endpoints require a JWT bearer token:

```
Authorization: Bearer <your-jwt-token>
```

Catalog reads and the payment webhook are the only unauthenticated routes.
Admin routes additionally require the `admin` role claim.

## Money

All monetary amounts are decimal strings in rupees, e.g. `"749.00"`.
Gateway payloads use integer paise; the `amount_paise` field on a payment
intent is what the gateway checkout widget expects.

## Pagination

List endpoints accept `page` (default 1) and `limit` (default 20, max 100)
query parameters and return a paginated envelope with `total` and
`total_pages`.

## Error Handling

Errors use a consistent envelope with appropriate HTTP status codes:

```json
{
  "success": false,
  "error": "Not Found",
  "message": "Order 4f9d… not found",
  "timestamp": "2025-08-24T00:00:00Z"
}
```
        "#,
        contact(
            name = "ShopHub Engineering",
            email = "engineering@shophub.in",
            url = "https://shophub.in"
        ),
        license(
            name = "MIT",
            url = "https://opensource.org/licenses/MIT"
        )
    ),
    servers(
        (url = "https://api.shophub.in", description = "Production server"),
        (url = "https://staging-api.shophub.in", description = "Staging server"),
        (url = "http://localhost:8080", description = "Local development")
    ),
    tags(
        (name = "Catalog", description = "Public product browsing"),
        (name = "Cart", description = "Shopping cart management"),
        (name = "Checkout", description = "Order placement"),
        (name = "Orders", description = "Order history and lifecycle"),
        (name = "Wallet", description = "Store-credit wallet"),
        (name = "Addresses", description = "Delivery address book"),
        (name = "Payments", description = "Gateway payments and webhooks"),
        (name = "Support", description = "Customer support tickets"),
        (name = "Admin", description = "Back-office endpoints")
    ),
    paths(
        // Catalog
        crate::handlers::products::list_products,
        crate::handlers::products::list_categories,
        crate::handlers::products::get_product,
        crate::handlers::products::get_product_by_slug,

        // Cart
        crate::handlers::carts::get_cart,
        crate::handlers::carts::add_item,
        crate::handlers::carts::update_item,
        crate::handlers::carts::remove_item,
        crate::handlers::carts::clear_cart,
        crate::handlers::carts::merge_guest_cart,

        // Checkout
        crate::handlers::checkout::place_order,

        // Orders
        crate::handlers::orders::list_orders,
        crate::handlers::orders::get_order,
        crate::handlers::orders::cancel_order,
        crate::handlers::orders::request_return,

        // Wallet
        crate::handlers::wallet::get_wallet,
        crate::handlers::wallet::list_transactions,

        // Addresses
        crate::handlers::addresses::list_addresses,
        crate::handlers::addresses::get_address,
        crate::handlers::addresses::create_address,
        crate::handlers::addresses::update_address,
        crate::handlers::addresses::set_default_address,
        crate::handlers::addresses::delete_address,

        // Payments
        crate::handlers::payments::create_intent,
        crate::handlers::payments::verify_payment,
        crate::handlers::payments::payment_for_order,
        crate::handlers::payments::payment_webhook,

        // Support
        crate::handlers::support::open_ticket,
        crate::handlers::support::list_tickets,
        crate::handlers::support::get_ticket,
        crate::handlers::support::post_message,
        crate::handlers::support::stream_ticket,
        crate::handlers::support::close_ticket,

        // Admin
        crate::handlers::admin::admin_list_products,
        crate::handlers::admin::create_product,
        crate::handlers::admin::admin_get_product,
        crate::handlers::admin::update_product,
        crate::handlers::admin::deactivate_product,
        crate::handlers::admin::set_size_stock,
        crate::handlers::admin::admin_list_orders,
        crate::handlers::admin::admin_get_order,
        crate::handlers::admin::update_order_status,
        crate::handlers::admin::approve_refund,
        crate::handlers::admin::refund_payment,
        crate::handlers::admin::credit_wallet,
        crate::handlers::admin::admin_list_tickets,
        crate::handlers::admin::admin_get_ticket,
        crate::handlers::admin::reply_to_ticket,
        crate::handlers::admin::admin_resolve_ticket,
        crate::handlers::admin::admin_close_ticket,
    ),
    components(
        schemas(
            // Common types
            crate::ApiResponse<serde_json::Value>,
            crate::PaginatedResponse<serde_json::Value>,
            crate::ListQuery,

            // Catalog types
            crate::services::catalog::ProductView,
            crate::services::catalog::SizeView,
            crate::services::catalog::CreateProductInput,
            crate::services::catalog::UpdateProductInput,
            crate::services::catalog::SizeInput,

            // Cart types
            crate::services::carts::CartView,
            crate::services::carts::CartLineView,
            crate::services::carts::AddCartItemInput,
            crate::services::carts::GuestCartLine,
            crate::services::carts::MergeOutcome,
            crate::handlers::carts::UpdateQuantityRequest,
            crate::handlers::carts::MergeCartRequest,

            // Checkout types
            crate::services::checkout::PlaceOrderInput,
            crate::services::checkout::CheckoutOutcome,

            // Order types
            crate::services::orders::OrderSummary,
            crate::services::orders::OrderItemView,
            crate::services::orders::StatusHistoryView,
            crate::services::orders::OrderView,
            crate::services::orders::UpdateOrderStatusInput,
            crate::services::orders::RequestRefundInput,
            crate::services::orders::ApproveRefundInput,

            // Wallet types
            crate::services::wallet::WalletView,
            crate::handlers::wallet::WalletOverview,
            crate::handlers::wallet::WalletTransactionResponse,

            // Address types
            crate::services::addresses::AddressInput,
            crate::services::addresses::AddressView,

            // Payment types
            crate::services::payments::PaymentIntentView,
            crate::services::payments::PaymentView,
            crate::services::payments::VerifyPaymentInput,
            crate::handlers::payments::CreateIntentRequest,

            // Support types
            crate::services::support::TicketView,
            crate::services::support::TicketSummary,
            crate::services::support::MessageView,
            crate::services::support::OpenTicketInput,
            crate::services::support::PostMessageInput,

            // Admin request types
            crate::handlers::admin::SetStockRequest,
            crate::handlers::admin::CreditWalletRequest,
            crate::handlers::admin::RefundPaymentRequest,

            // Error types
            crate::errors::ErrorResponse
        )
    )
)]
pub struct ApiDocV1;

pub fn swagger_ui() -> SwaggerUi {
    SwaggerUi::new("/swagger-ui")
        .url("/api-docs/openapi.json", ApiDocV1::openapi())
        .config(utoipa_swagger_ui::Config::from("/api-docs/openapi.json").try_it_out_enabled(true))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn openapi_document_generates() {
        let openapi = ApiDocV1::openapi();
        let json = serde_json::to_string_pretty(&openapi).unwrap();
        assert!(json.contains("Storefront API"));
        assert!(json.contains("/api/v1/products"));
        assert!(json.contains("/api/v1/checkout"));
        assert!(json.contains("/api/v1/admin/orders"));
    }
}
