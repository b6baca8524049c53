//! SeaORM entities for the storefront schema.

pub mod address;
pub mod cart;
pub mod cart_item;
pub mod order;
pub mod order_item;
pub mod order_status_history;
pub mod payment;
pub mod product;
pub mod product_size;
pub mod ticket;
pub mod ticket_message;
pub mod wallet;
pub mod wallet_transaction;

pub mod prelude {
    pub use super::address::Entity as Address;
    pub use super::cart::Entity as Cart;
    pub use super::cart_item::Entity as CartItem;
    pub use super::order::Entity as Order;
    pub use super::order_item::Entity as OrderItem;
    pub use super::order_status_history::Entity as OrderStatusHistory;
    pub use super::payment::Entity as Payment;
    pub use super::product::Entity as Product;
    pub use super::product_size::Entity as ProductSize;
    pub use super::ticket::Entity as Ticket;
    pub use super::ticket_message::Entity as TicketMessage;
    pub use super::wallet::Entity as Wallet;
    pub use super::wallet_transaction::Entity as WalletTransaction;
}
