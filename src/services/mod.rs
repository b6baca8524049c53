use std::sync::Arc;

use sea_orm::DatabaseConnection;

use crate::config::AppConfig;
use crate::events::EventSender;
use crate::gateway::PaymentGateway;

pub mod addresses;
pub mod carts;
pub mod catalog;
pub mod checkout;
pub mod orders;
pub mod payments;
pub mod support;
pub mod wallet;

pub use addresses::AddressService;
pub use carts::CartService;
pub use catalog::CatalogService;
pub use checkout::CheckoutService;
pub use orders::OrderService;
pub use payments::PaymentService;
pub use support::{ReplyGenerator, SupportService};
pub use wallet::WalletService;

/// Every service behind one cloneable handle, wired over the shared
/// connection pool and event channel.
#[derive(Clone)]
pub struct AppServices {
    pub catalog: Arc<CatalogService>,
    pub carts: Arc<CartService>,
    pub checkout: Arc<CheckoutService>,
    pub orders: Arc<OrderService>,
    pub wallet: Arc<WalletService>,
    pub payments: Arc<PaymentService>,
    pub addresses: Arc<AddressService>,
    pub support: Arc<SupportService>,
}

impl AppServices {
    pub fn build(
        db: Arc<DatabaseConnection>,
        config: &AppConfig,
        event_sender: Arc<EventSender>,
        gateway: Arc<dyn PaymentGateway>,
        reply: Option<Arc<dyn ReplyGenerator>>,
    ) -> Self {
        let catalog = Arc::new(CatalogService::new(db.clone()));
        let carts = Arc::new(CartService::new(db.clone()));
        let wallet = Arc::new(WalletService::new(db.clone(), event_sender.clone()));
        let checkout = Arc::new(CheckoutService::new(
            db.clone(),
            carts.clone(),
            wallet.clone(),
            event_sender.clone(),
            config,
        ));
        let orders = Arc::new(OrderService::new(
            db.clone(),
            wallet.clone(),
            event_sender.clone(),
        ));
        let payments = Arc::new(PaymentService::new(
            db.clone(),
            gateway,
            event_sender.clone(),
            config,
        ));
        let addresses = Arc::new(AddressService::new(db.clone()));
        let support = Arc::new(SupportService::new(db, event_sender, reply));

        Self {
            catalog,
            carts,
            checkout,
            orders,
            wallet,
            payments,
            addresses,
            support,
        }
    }
}
