use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::distributions::Alphanumeric;
use rand::Rng;
use rust_decimal::Decimal;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DatabaseTransaction, EntityTrait,
    QueryFilter, QueryOrder, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::config::AppConfig;
use crate::entities::order::{OrderPaymentStatus, OrderStatus, PaymentMethod};
use crate::entities::prelude::{Address, CartItem, Product, ProductSize};
use crate::entities::{
    address, cart_item, order, order_item, order_status_history, product, product_size,
};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::services::carts::CartService;
use crate::services::wallet::WalletService;

/// Turns a cart into an order in one transaction.
#[derive(Clone)]
pub struct CheckoutService {
    db: Arc<DatabaseConnection>,
    carts: Arc<CartService>,
    wallet: Arc<WalletService>,
    event_sender: Arc<EventSender>,
    free_shipping_threshold: Decimal,
    shipping_fee: Decimal,
    timeout: Duration,
}

impl CheckoutService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        carts: Arc<CartService>,
        wallet: Arc<WalletService>,
        event_sender: Arc<EventSender>,
        config: &AppConfig,
    ) -> Self {
        Self {
            db,
            carts,
            wallet,
            event_sender,
            free_shipping_threshold: config.free_shipping_threshold,
            shipping_fee: config.shipping_fee,
            timeout: config.checkout_timeout(),
        }
    }

    /// Places an order from the user's cart.
    ///
    /// Everything happens in one transaction: stock is claimed with guarded
    /// decrements, the order and its snapshots are written, wallet credit is
    /// debited and the cart is emptied. If any step fails, or the whole
    /// attempt outlives the configured deadline, nothing is kept.
    #[instrument(skip(self, input), fields(user_id = %user_id))]
    pub async fn place_order(
        &self,
        user_id: Uuid,
        input: PlaceOrderInput,
    ) -> Result<CheckoutOutcome, ServiceError> {
        let outcome =
            match tokio::time::timeout(self.timeout, self.place_order_in_txn(user_id, &input))
                .await
            {
                Ok(result) => result?,
                Err(_) => {
                    warn!(user_id = %user_id, "checkout deadline exceeded, rolled back");
                    return Err(ServiceError::Timeout);
                }
            };

        self.event_sender.send(Event::OrderPlaced {
            order_id: outcome.order_id,
            user_id,
            order_number: outcome.order_number.clone(),
            total_amount: outcome.total_amount,
        });
        if outcome.wallet_applied > Decimal::ZERO {
            self.event_sender.send(Event::WalletDebited {
                user_id,
                amount: outcome.wallet_applied,
            });
        }

        info!(order_number = %outcome.order_number, total = %outcome.total_amount, "order placed");
        Ok(outcome)
    }

    async fn place_order_in_txn(
        &self,
        user_id: Uuid,
        input: &PlaceOrderInput,
    ) -> Result<CheckoutOutcome, ServiceError> {
        let txn = self.db.begin().await?;

        // Early returns roll the transaction back on drop.
        let cart = self.carts.get_or_create_cart(&txn, user_id).await?;
        let items = CartItem::find()
            .filter(cart_item::Column::CartId.eq(cart.id))
            .order_by_asc(cart_item::Column::CreatedAt)
            .all(&txn)
            .await?;
        if items.is_empty() {
            return Err(ServiceError::CartEmpty);
        }

        let address = Address::find_by_id(input.address_id)
            .filter(address::Column::UserId.eq(user_id))
            .one(&txn)
            .await?
            .ok_or_else(|| {
                ServiceError::ValidationError("invalid delivery address".to_string())
            })?;

        let product_ids: Vec<Uuid> = items.iter().map(|i| i.product_id).collect();
        let products: HashMap<Uuid, product::Model> = Product::find()
            .filter(product::Column::Id.is_in(product_ids.clone()))
            .all(&txn)
            .await?
            .into_iter()
            .map(|p| (p.id, p))
            .collect();
        let sized_products: HashSet<Uuid> = ProductSize::find()
            .filter(product_size::Column::ProductId.is_in(product_ids))
            .all(&txn)
            .await?
            .into_iter()
            .map(|s| s.product_id)
            .collect();

        let mut subtotal = Decimal::ZERO;
        let mut lines = Vec::with_capacity(items.len());
        for item in &items {
            let product = products
                .get(&item.product_id)
                .filter(|p| p.is_active)
                .ok_or_else(|| {
                    let label = products
                        .get(&item.product_id)
                        .map(|p| p.name.clone())
                        .unwrap_or_else(|| item.product_id.to_string());
                    ServiceError::ProductUnavailable(label)
                })?;
            if item.size.is_none() && sized_products.contains(&product.id) {
                return Err(ServiceError::ValidationError(format!(
                    "select a size for {}",
                    product.name
                )));
            }

            self.claim_stock(&txn, product, item).await?;
            subtotal += product.price * Decimal::from(item.quantity);
            lines.push((item, product));
        }

        let wallet_balance = if input.use_wallet {
            self.wallet.locked_balance(&txn, user_id).await?
        } else {
            Decimal::ZERO
        };
        let totals = compute_totals(
            subtotal,
            wallet_balance,
            input.use_wallet,
            self.free_shipping_threshold,
            self.shipping_fee,
        );

        let now = Utc::now();
        let order_number = generate_order_number();
        let order = order::ActiveModel {
            id: Set(Uuid::new_v4()),
            order_number: Set(order_number.clone()),
            user_id: Set(user_id),
            status: Set(OrderStatus::Pending),
            payment_method: Set(input.payment_method),
            payment_status: Set(OrderPaymentStatus::Pending),
            subtotal: Set(totals.subtotal),
            shipping_fee: Set(totals.shipping_fee),
            wallet_applied: Set(totals.wallet_applied),
            total_amount: Set(totals.total),
            refund_amount: Set(None),
            return_reason: Set(None),
            admin_note: Set(None),
            ship_name: Set(address.name.clone()),
            ship_phone: Set(address.phone.clone()),
            ship_line1: Set(address.line1.clone()),
            ship_line2: Set(address.line2.clone()),
            ship_city: Set(address.city.clone()),
            ship_state: Set(address.state.clone()),
            ship_pincode: Set(address.pincode.clone()),
            created_at: Set(now),
            updated_at: Set(now),
        };
        let order = order.insert(&txn).await?;

        for (item, product) in &lines {
            let row = order_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                order_id: Set(order.id),
                product_id: Set(product.id),
                product_name: Set(product.name.clone()),
                size: Set(item.size.clone()),
                quantity: Set(item.quantity),
                unit_price: Set(product.price),
                image_url: Set(product.first_image().map(str::to_string)),
            };
            row.insert(&txn).await?;
        }

        let history = order_status_history::ActiveModel {
            id: Set(Uuid::new_v4()),
            order_id: Set(order.id),
            status: Set(OrderStatus::Pending),
            note: Set(Some("order placed".to_string())),
            created_at: Set(now),
        };
        history.insert(&txn).await?;

        if totals.wallet_applied > Decimal::ZERO {
            self.wallet
                .debit_in_txn(
                    &txn,
                    user_id,
                    totals.wallet_applied,
                    &format!("applied to order {order_number}"),
                    Some(order.id),
                )
                .await?;
        }

        self.carts.clear_items(&txn, cart.id).await?;

        txn.commit().await?;

        let payment_required =
            order.payment_method.is_prepaid() && order.total_amount > Decimal::ZERO;
        Ok(CheckoutOutcome {
            order_id: order.id,
            order_number: order.order_number,
            status: order.status,
            payment_method: order.payment_method,
            payment_status: order.payment_status,
            subtotal: order.subtotal,
            shipping_fee: order.shipping_fee,
            wallet_applied: order.wallet_applied,
            total_amount: order.total_amount,
            payment_required,
            created_at: order.created_at,
        })
    }

    /// Guarded decrements; they only succeed while stock still covers the
    /// quantity, so two racing checkouts cannot both claim the last unit.
    ///
    /// A sized line decrements its size row first and then the product's
    /// aggregate count; a size-less line decrements the aggregate only.
    async fn claim_stock(
        &self,
        txn: &DatabaseTransaction,
        product: &product::Model,
        item: &cart_item::Model,
    ) -> Result<(), ServiceError> {
        if let Some(size) = &item.size {
            let result = ProductSize::update_many()
                .col_expr(
                    product_size::Column::Stock,
                    Expr::col(product_size::Column::Stock).sub(item.quantity),
                )
                .filter(product_size::Column::ProductId.eq(item.product_id))
                .filter(product_size::Column::Label.eq(size.clone()))
                .filter(product_size::Column::Stock.gte(item.quantity))
                .exec(txn)
                .await?;

            if result.rows_affected == 0 {
                // A vanished size row counts as sold out.
                let remaining = ProductSize::find()
                    .filter(product_size::Column::ProductId.eq(item.product_id))
                    .filter(product_size::Column::Label.eq(size.clone()))
                    .one(txn)
                    .await?
                    .map(|s| s.stock)
                    .unwrap_or(0);
                return Err(ServiceError::InsufficientStock {
                    product: product.name.clone(),
                    remaining,
                });
            }
        }

        let result = Product::update_many()
            .col_expr(
                product::Column::Stock,
                Expr::col(product::Column::Stock).sub(item.quantity),
            )
            .filter(product::Column::Id.eq(item.product_id))
            .filter(product::Column::Stock.gte(item.quantity))
            .exec(txn)
            .await?;

        if result.rows_affected == 0 {
            let remaining = Product::find_by_id(item.product_id)
                .one(txn)
                .await?
                .map(|p| p.stock)
                .unwrap_or(0);
            return Err(ServiceError::InsufficientStock {
                product: product.name.clone(),
                remaining,
            });
        }
        Ok(())
    }
}

/// Order money math, kept pure so it is easy to test.
///
/// Shipping is free at or above the threshold. Wallet credit applies to
/// goods plus shipping, capped at the balance; the remainder is what the
/// payment method has to collect.
pub fn compute_totals(
    subtotal: Decimal,
    wallet_balance: Decimal,
    use_wallet: bool,
    free_shipping_threshold: Decimal,
    shipping_fee: Decimal,
) -> OrderTotals {
    let shipping_fee = if subtotal >= free_shipping_threshold {
        Decimal::ZERO
    } else {
        shipping_fee
    };
    let gross = subtotal + shipping_fee;
    let wallet_applied = if use_wallet {
        wallet_balance.min(gross).max(Decimal::ZERO)
    } else {
        Decimal::ZERO
    };

    OrderTotals {
        subtotal,
        shipping_fee,
        wallet_applied,
        total: gross - wallet_applied,
    }
}

fn generate_order_number() -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(4)
        .map(char::from)
        .collect::<String>()
        .to_uppercase();
    format!("ORD-{}-{}", Utc::now().timestamp_millis(), suffix)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderTotals {
    pub subtotal: Decimal,
    pub shipping_fee: Decimal,
    pub wallet_applied: Decimal,
    pub total: Decimal,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct PlaceOrderInput {
    pub address_id: Uuid,
    pub payment_method: PaymentMethod,
    /// Apply available store credit to this order.
    #[serde(default)]
    pub use_wallet: bool,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct CheckoutOutcome {
    pub order_id: Uuid,
    #[schema(example = "ORD-1717920000000-A7K2")]
    pub order_number: String,
    pub status: OrderStatus,
    pub payment_method: PaymentMethod,
    pub payment_status: OrderPaymentStatus,
    #[schema(value_type = String, example = "1498.00")]
    pub subtotal: Decimal,
    #[schema(value_type = String, example = "0.00")]
    pub shipping_fee: Decimal,
    #[schema(value_type = String, example = "250.00")]
    pub wallet_applied: Decimal,
    #[schema(value_type = String, example = "1248.00")]
    pub total_amount: Decimal,
    /// True for prepaid orders with an amount left to collect; the client
    /// should create a payment intent next.
    pub payment_required: bool,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn totals(subtotal: Decimal, balance: Decimal, use_wallet: bool) -> OrderTotals {
        compute_totals(subtotal, balance, use_wallet, dec!(999), dec!(49))
    }

    #[test]
    fn shipping_is_charged_below_the_threshold() {
        let t = totals(dec!(998.99), dec!(0), false);
        assert_eq!(t.shipping_fee, dec!(49));
        assert_eq!(t.total, dec!(1047.99));
    }

    #[test]
    fn shipping_is_free_at_the_threshold() {
        let t = totals(dec!(999), dec!(0), false);
        assert_eq!(t.shipping_fee, dec!(0));
        assert_eq!(t.total, dec!(999));
    }

    #[test]
    fn wallet_covers_part_of_the_order() {
        let t = totals(dec!(500), dec!(200), true);
        assert_eq!(t.shipping_fee, dec!(49));
        assert_eq!(t.wallet_applied, dec!(200));
        assert_eq!(t.total, dec!(349));
    }

    #[test]
    fn wallet_is_capped_at_goods_plus_shipping() {
        let t = totals(dec!(500), dec!(5000), true);
        assert_eq!(t.wallet_applied, dec!(549));
        assert_eq!(t.total, dec!(0));
    }

    #[test]
    fn wallet_is_ignored_unless_requested() {
        let t = totals(dec!(500), dec!(5000), false);
        assert_eq!(t.wallet_applied, dec!(0));
        assert_eq!(t.total, dec!(549));
    }

    #[test]
    fn order_numbers_have_the_expected_shape() {
        let number = generate_order_number();
        let parts: Vec<&str> = number.splitn(3, '-').collect();
        assert_eq!(parts[0], "ORD");
        assert!(parts[1].chars().all(|c| c.is_ascii_digit()));
        assert_eq!(parts[2].len(), 4);
        assert!(parts[2]
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()));
    }
}
