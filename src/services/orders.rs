use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, DatabaseTransaction,
    EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::entities::order::{OrderPaymentStatus, OrderStatus, PaymentMethod};
use crate::entities::prelude::{Order, OrderItem, OrderStatusHistory, Product, ProductSize};
use crate::entities::{order, order_item, order_status_history, product, product_size};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::services::wallet::WalletService;

/// Order reads and lifecycle writes.
///
/// Status changes are validated against the lifecycle, recorded in the
/// append-only history, and applied under a row lock so two agents cannot
/// race an order into conflicting states.
#[derive(Clone)]
pub struct OrderService {
    db: Arc<DatabaseConnection>,
    wallet: Arc<WalletService>,
    event_sender: Arc<EventSender>,
}

impl OrderService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        wallet: Arc<WalletService>,
        event_sender: Arc<EventSender>,
    ) -> Self {
        Self {
            db,
            wallet,
            event_sender,
        }
    }

    /// The user's orders, newest first.
    pub async fn list_orders(
        &self,
        user_id: Uuid,
        page: u64,
        limit: u64,
    ) -> Result<(Vec<OrderSummary>, u64), ServiceError> {
        let paginator = Order::find()
            .filter(order::Column::UserId.eq(user_id))
            .order_by_desc(order::Column::CreatedAt)
            .paginate(&*self.db, limit);
        let total = paginator.num_items().await?;
        let orders = paginator.fetch_page(page.saturating_sub(1)).await?;
        Ok((orders.into_iter().map(OrderSummary::from).collect(), total))
    }

    /// One order with items and status history. Looking up someone else's
    /// order reports not-found rather than forbidden.
    pub async fn get_order(&self, user_id: Uuid, order_id: Uuid) -> Result<OrderView, ServiceError> {
        let order = Order::find_by_id(order_id)
            .filter(order::Column::UserId.eq(user_id))
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("order {order_id}")))?;
        self.load_view(&*self.db, order).await
    }

    /// Customer cancellation, allowed while the order is still pending.
    ///
    /// Restores the claimed stock, returns any applied wallet credit, and
    /// records the transition, all in one transaction.
    #[instrument(skip(self))]
    pub async fn cancel_order(
        &self,
        user_id: Uuid,
        order_id: Uuid,
    ) -> Result<OrderView, ServiceError> {
        let txn = self.db.begin().await?;
        let order = Order::find_by_id(order_id)
            .filter(order::Column::UserId.eq(user_id))
            .lock_exclusive()
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("order {order_id}")))?;

        if !order.status.customer_cancellable() {
            return Err(ServiceError::InvalidStatusTransition {
                from: order.status.to_string(),
                to: OrderStatus::Cancelled.to_string(),
            });
        }

        let order = self
            .apply_cancellation(&txn, order, "cancelled by customer")
            .await?;
        let view = self.load_view(&txn, order).await?;
        txn.commit().await?;

        let credited = view.wallet_applied + view.refund_amount.unwrap_or(Decimal::ZERO);
        self.event_sender.send(Event::OrderCancelled {
            order_id,
            user_id,
            wallet_refund: credited,
        });
        if credited > Decimal::ZERO {
            self.event_sender.send(Event::WalletCredited {
                user_id,
                amount: credited,
            });
        }

        info!(order_number = %view.order_number, "order cancelled");
        Ok(view)
    }

    /// Asks for a refund on a delivered order. Support settles it via
    /// [`approve_refund`](Self::approve_refund).
    #[instrument(skip(self, reason))]
    pub async fn request_refund(
        &self,
        user_id: Uuid,
        order_id: Uuid,
        reason: Option<String>,
    ) -> Result<OrderView, ServiceError> {
        let txn = self.db.begin().await?;
        let order = Order::find_by_id(order_id)
            .filter(order::Column::UserId.eq(user_id))
            .lock_exclusive()
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("order {order_id}")))?;

        let old_status = order.status;
        if !old_status.can_transition(OrderStatus::RefundRequested) {
            return Err(ServiceError::InvalidStatusTransition {
                from: old_status.to_string(),
                to: OrderStatus::RefundRequested.to_string(),
            });
        }

        let note = reason
            .clone()
            .unwrap_or_else(|| "refund requested".to_string());
        let mut active: order::ActiveModel = order.into();
        active.status = Set(OrderStatus::RefundRequested);
        active.return_reason = Set(reason);
        active.updated_at = Set(Utc::now());
        let order = active.update(&txn).await?;
        self.append_history(&txn, order_id, OrderStatus::RefundRequested, note)
            .await?;

        let view = self.load_view(&txn, order).await?;
        txn.commit().await?;

        self.event_sender.send(Event::OrderStatusChanged {
            order_id,
            user_id,
            old_status: old_status.to_string(),
            new_status: OrderStatus::RefundRequested.to_string(),
        });
        Ok(view)
    }

    /// Admin listing across all users, optionally narrowed to one status.
    pub async fn admin_list_orders(
        &self,
        status: Option<OrderStatus>,
        page: u64,
        limit: u64,
    ) -> Result<(Vec<OrderSummary>, u64), ServiceError> {
        let mut select = Order::find();
        if let Some(status) = status {
            select = select.filter(order::Column::Status.eq(status));
        }
        let paginator = select
            .order_by_desc(order::Column::CreatedAt)
            .paginate(&*self.db, limit);
        let total = paginator.num_items().await?;
        let orders = paginator.fetch_page(page.saturating_sub(1)).await?;
        Ok((orders.into_iter().map(OrderSummary::from).collect(), total))
    }

    pub async fn admin_get_order(&self, order_id: Uuid) -> Result<OrderView, ServiceError> {
        let order = Order::find_by_id(order_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("order {order_id}")))?;
        self.load_view(&*self.db, order).await
    }

    /// Moves an order along its lifecycle.
    ///
    /// # Errors
    ///
    /// [`ServiceError::InvalidStatusTransition`] when the step is not legal
    /// from the current status.
    ///
    /// Delivery marks the order paid, which is how cash-on-delivery money is
    /// accounted for. A move to `Cancelled` runs the same restock and wallet
    /// return as a customer cancellation, and a move to `Refunded` is
    /// delegated to [`approve_refund`](Self::approve_refund).
    #[instrument(skip(self, note))]
    pub async fn admin_update_status(
        &self,
        order_id: Uuid,
        new_status: OrderStatus,
        note: Option<String>,
    ) -> Result<OrderView, ServiceError> {
        if new_status == OrderStatus::Refunded {
            return self.approve_refund(order_id, None, note).await;
        }

        let txn = self.db.begin().await?;
        let order = Order::find_by_id(order_id)
            .lock_exclusive()
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("order {order_id}")))?;

        let old_status = order.status;
        if !old_status.can_transition(new_status) {
            return Err(ServiceError::InvalidStatusTransition {
                from: old_status.to_string(),
                to: new_status.to_string(),
            });
        }

        let user_id = order.user_id;
        let order = if new_status == OrderStatus::Cancelled {
            self.apply_cancellation(
                &txn,
                order,
                &note.unwrap_or_else(|| "cancelled by support".to_string()),
            )
            .await?
        } else {
            self.set_status(
                &txn,
                order,
                new_status,
                note.unwrap_or_else(|| format!("moved to {new_status}")),
            )
            .await?
        };
        let view = self.load_view(&txn, order).await?;
        txn.commit().await?;

        if new_status == OrderStatus::Cancelled {
            let credited = view.wallet_applied + view.refund_amount.unwrap_or(Decimal::ZERO);
            self.event_sender.send(Event::OrderCancelled {
                order_id,
                user_id,
                wallet_refund: credited,
            });
            if credited > Decimal::ZERO {
                self.event_sender.send(Event::WalletCredited {
                    user_id,
                    amount: credited,
                });
            }
        } else {
            self.event_sender.send(Event::OrderStatusChanged {
                order_id,
                user_id,
                old_status: old_status.to_string(),
                new_status: new_status.to_string(),
            });
        }

        info!(order_id = %order_id, from = %old_status, to = %new_status, "order status updated");
        Ok(view)
    }

    /// Settles a requested refund by crediting the wallet.
    ///
    /// `amount` defaults to what the customer actually paid; wallet credit
    /// spent on the order was already returned when it was applied, so it is
    /// not part of the default. The settled amount and any back-office note
    /// are kept on the order.
    #[instrument(skip(self, note))]
    pub async fn approve_refund(
        &self,
        order_id: Uuid,
        amount: Option<Decimal>,
        note: Option<String>,
    ) -> Result<OrderView, ServiceError> {
        let txn = self.db.begin().await?;
        let order = Order::find_by_id(order_id)
            .lock_exclusive()
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("order {order_id}")))?;

        let old_status = order.status;
        if old_status != OrderStatus::RefundRequested {
            return Err(ServiceError::InvalidStatusTransition {
                from: old_status.to_string(),
                to: OrderStatus::Refunded.to_string(),
            });
        }

        let amount = amount.unwrap_or(order.total_amount);
        if amount <= Decimal::ZERO || amount > order.total_amount {
            return Err(ServiceError::ValidationError(format!(
                "refund amount must be positive and at most {}",
                order.total_amount
            )));
        }

        let user_id = order.user_id;
        let order_number = order.order_number.clone();
        self.wallet
            .credit_in_txn(
                &txn,
                user_id,
                amount,
                &format!("refund for order {order_number}"),
                Some(order_id),
            )
            .await?;

        let mut active: order::ActiveModel = order.into();
        active.status = Set(OrderStatus::Refunded);
        active.payment_status = Set(OrderPaymentStatus::Refunded);
        active.refund_amount = Set(Some(amount));
        if let Some(note) = note {
            active.admin_note = Set(Some(note));
        }
        active.updated_at = Set(Utc::now());
        let order = active.update(&txn).await?;

        self.append_history(
            &txn,
            order_id,
            OrderStatus::Refunded,
            format!("refund of {amount} credited to wallet"),
        )
        .await?;

        let view = self.load_view(&txn, order).await?;
        txn.commit().await?;

        self.event_sender.send(Event::OrderStatusChanged {
            order_id,
            user_id,
            old_status: old_status.to_string(),
            new_status: OrderStatus::Refunded.to_string(),
        });
        self.event_sender.send(Event::WalletCredited { user_id, amount });

        info!(order_number = %order_number, %amount, "refund approved");
        Ok(view)
    }

    /// Shared cancellation effects: restock, wallet return, status row.
    ///
    /// When a prepaid order was already captured, the captured amount comes
    /// back as store credit too and the order's payment closes as refunded.
    async fn apply_cancellation(
        &self,
        txn: &DatabaseTransaction,
        order: order::Model,
        note: &str,
    ) -> Result<order::Model, ServiceError> {
        self.restore_stock(txn, order.id).await?;

        if order.wallet_applied > Decimal::ZERO {
            self.wallet
                .credit_in_txn(
                    txn,
                    order.user_id,
                    order.wallet_applied,
                    &format!("returned from cancelled order {}", order.order_number),
                    Some(order.id),
                )
                .await?;
        }

        let captured_refund = (order.payment_status == OrderPaymentStatus::Paid
            && order.payment_method.is_prepaid()
            && order.total_amount > Decimal::ZERO)
            .then_some(order.total_amount);
        if let Some(amount) = captured_refund {
            self.wallet
                .credit_in_txn(
                    txn,
                    order.user_id,
                    amount,
                    &format!("payment returned for cancelled order {}", order.order_number),
                    Some(order.id),
                )
                .await?;
        }

        let order_id = order.id;
        let mut active: order::ActiveModel = order.into();
        active.status = Set(OrderStatus::Cancelled);
        if let Some(amount) = captured_refund {
            active.payment_status = Set(OrderPaymentStatus::Refunded);
            active.refund_amount = Set(Some(amount));
        }
        active.updated_at = Set(Utc::now());
        let order = active.update(txn).await?;

        self.append_history(txn, order_id, OrderStatus::Cancelled, note.to_string())
            .await?;
        Ok(order)
    }

    /// Puts the order's units back: the product's aggregate count always,
    /// plus the size row for sized lines. A size row that has been removed
    /// from the catalog since checkout is re-created rather than silently
    /// losing the stock.
    async fn restore_stock(
        &self,
        txn: &DatabaseTransaction,
        order_id: Uuid,
    ) -> Result<(), ServiceError> {
        let items = OrderItem::find()
            .filter(order_item::Column::OrderId.eq(order_id))
            .all(txn)
            .await?;

        for item in items {
            if let Some(size) = &item.size {
                let result = ProductSize::update_many()
                    .col_expr(
                        product_size::Column::Stock,
                        Expr::col(product_size::Column::Stock).add(item.quantity),
                    )
                    .filter(product_size::Column::ProductId.eq(item.product_id))
                    .filter(product_size::Column::Label.eq(size.clone()))
                    .exec(txn)
                    .await?;

                if result.rows_affected == 0 {
                    let row = product_size::ActiveModel {
                        id: Set(Uuid::new_v4()),
                        product_id: Set(item.product_id),
                        label: Set(size.clone()),
                        stock: Set(item.quantity),
                        position: Set(0),
                    };
                    row.insert(txn).await?;
                }
            }

            Product::update_many()
                .col_expr(
                    product::Column::Stock,
                    Expr::col(product::Column::Stock).add(item.quantity),
                )
                .filter(product::Column::Id.eq(item.product_id))
                .exec(txn)
                .await?;
        }
        Ok(())
    }

    async fn set_status(
        &self,
        txn: &DatabaseTransaction,
        order: order::Model,
        status: OrderStatus,
        note: String,
    ) -> Result<order::Model, ServiceError> {
        let order_id = order.id;
        let mut active: order::ActiveModel = order.into();
        active.status = Set(status);
        if status == OrderStatus::Delivered {
            active.payment_status = Set(OrderPaymentStatus::Paid);
        }
        active.updated_at = Set(Utc::now());
        let order = active.update(txn).await?;

        self.append_history(txn, order_id, status, note).await?;
        Ok(order)
    }

    async fn append_history(
        &self,
        txn: &DatabaseTransaction,
        order_id: Uuid,
        status: OrderStatus,
        note: String,
    ) -> Result<(), ServiceError> {
        let row = order_status_history::ActiveModel {
            id: Set(Uuid::new_v4()),
            order_id: Set(order_id),
            status: Set(status),
            note: Set(Some(note)),
            created_at: Set(Utc::now()),
        };
        row.insert(txn).await?;
        Ok(())
    }

    async fn load_view<C: ConnectionTrait>(
        &self,
        conn: &C,
        order: order::Model,
    ) -> Result<OrderView, ServiceError> {
        let items = OrderItem::find()
            .filter(order_item::Column::OrderId.eq(order.id))
            .order_by_asc(order_item::Column::ProductName)
            .all(conn)
            .await?;
        let history = OrderStatusHistory::find()
            .filter(order_status_history::Column::OrderId.eq(order.id))
            .order_by_asc(order_status_history::Column::CreatedAt)
            .all(conn)
            .await?;

        Ok(OrderView {
            id: order.id,
            order_number: order.order_number,
            status: order.status,
            payment_method: order.payment_method,
            payment_status: order.payment_status,
            subtotal: order.subtotal,
            shipping_fee: order.shipping_fee,
            wallet_applied: order.wallet_applied,
            total_amount: order.total_amount,
            refund_amount: order.refund_amount,
            return_reason: order.return_reason,
            admin_note: order.admin_note,
            ship_name: order.ship_name,
            ship_phone: order.ship_phone,
            ship_line1: order.ship_line1,
            ship_line2: order.ship_line2,
            ship_city: order.ship_city,
            ship_state: order.ship_state,
            ship_pincode: order.ship_pincode,
            created_at: order.created_at,
            updated_at: order.updated_at,
            items: items
                .into_iter()
                .map(|i| OrderItemView {
                    id: i.id,
                    line_total: i.line_total(),
                    product_id: i.product_id,
                    product_name: i.product_name,
                    size: i.size,
                    quantity: i.quantity,
                    unit_price: i.unit_price,
                    image_url: i.image_url,
                })
                .collect(),
            history: history
                .into_iter()
                .map(|h| StatusHistoryView {
                    status: h.status,
                    note: h.note,
                    created_at: h.created_at,
                })
                .collect(),
        })
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct OrderSummary {
    pub id: Uuid,
    pub order_number: String,
    pub status: OrderStatus,
    pub payment_method: PaymentMethod,
    pub payment_status: OrderPaymentStatus,
    #[schema(value_type = String, example = "1248.00")]
    pub total_amount: Decimal,
    pub created_at: DateTime<Utc>,
}

impl From<order::Model> for OrderSummary {
    fn from(order: order::Model) -> Self {
        Self {
            id: order.id,
            order_number: order.order_number,
            status: order.status,
            payment_method: order.payment_method,
            payment_status: order.payment_status,
            total_amount: order.total_amount,
            created_at: order.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct OrderItemView {
    pub id: Uuid,
    pub product_id: Uuid,
    pub product_name: String,
    pub size: Option<String>,
    pub quantity: i32,
    #[schema(value_type = String, example = "749.00")]
    pub unit_price: Decimal,
    #[schema(value_type = String, example = "1498.00")]
    pub line_total: Decimal,
    pub image_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct StatusHistoryView {
    pub status: OrderStatus,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct OrderView {
    pub id: Uuid,
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
    /// Amount credited back on refund or paid cancellation.
    #[schema(value_type = Option<String>, example = "1248.00")]
    pub refund_amount: Option<Decimal>,
    pub return_reason: Option<String>,
    pub admin_note: Option<String>,
    pub ship_name: String,
    pub ship_phone: String,
    pub ship_line1: String,
    pub ship_line2: Option<String>,
    pub ship_city: String,
    pub ship_state: String,
    pub ship_pincode: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub items: Vec<OrderItemView>,
    pub history: Vec<StatusHistoryView>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct UpdateOrderStatusInput {
    pub status: OrderStatus,
    pub note: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct RequestRefundInput {
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct ApproveRefundInput {
    /// Defaults to the amount the customer paid for the order.
    #[schema(value_type = Option<String>, example = "1248.00")]
    pub amount: Option<Decimal>,
    /// Back-office note kept on the order.
    pub note: Option<String>,
}
