use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set, TransactionTrait,
};
use sea_orm::ActiveModelTrait;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::config::AppConfig;
use crate::entities::order::{OrderPaymentStatus, OrderStatus};
use crate::entities::payment::PaymentState;
use crate::entities::prelude::{Order, Payment};
use crate::entities::{order, order_status_history, payment};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::gateway::{
    to_paise, verify_payment_signature, verify_webhook_signature, PaymentGateway,
};

const CURRENCY: &str = "INR";

/// Prepaid payment flow against the gateway.
///
/// A payment row mirrors one gateway order. Rows move `CREATED -> PAID ->
/// REFUNDED`, with `CREATED -> FAILED` as the only branch, and every move is
/// a conditional update so the client callback and the webhook can race
/// without double-processing.
#[derive(Clone)]
pub struct PaymentService {
    db: Arc<DatabaseConnection>,
    gateway: Arc<dyn PaymentGateway>,
    event_sender: Arc<EventSender>,
    key_id: String,
    key_secret: String,
    webhook_secret: String,
}

impl PaymentService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        gateway: Arc<dyn PaymentGateway>,
        event_sender: Arc<EventSender>,
        config: &AppConfig,
    ) -> Self {
        Self {
            db,
            gateway,
            event_sender,
            key_id: config.razorpay_key_id.clone(),
            key_secret: config.razorpay_key_secret.clone(),
            webhook_secret: config.razorpay_webhook_secret.clone(),
        }
    }

    /// Creates (or returns the still-open) gateway order for a prepaid
    /// order, giving the client what it needs to start the payment.
    #[instrument(skip(self))]
    pub async fn create_intent(
        &self,
        user_id: Uuid,
        order_id: Uuid,
    ) -> Result<PaymentIntentView, ServiceError> {
        let order = Order::find_by_id(order_id)
            .filter(order::Column::UserId.eq(user_id))
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("order {order_id}")))?;

        if !order.payment_method.is_prepaid() {
            return Err(ServiceError::ValidationError(
                "order is not prepaid".to_string(),
            ));
        }
        // A failed attempt is retryable; paid and refunded are final.
        match order.payment_status {
            OrderPaymentStatus::Pending | OrderPaymentStatus::Failed => {}
            status => {
                return Err(ServiceError::Conflict(format!("order payment is {status}")));
            }
        }
        if order.total_amount <= Decimal::ZERO {
            return Err(ServiceError::ValidationError(
                "order has nothing left to collect".to_string(),
            ));
        }

        let existing = Payment::find()
            .filter(payment::Column::OrderId.eq(order.id))
            .order_by_desc(payment::Column::CreatedAt)
            .all(&*self.db)
            .await?;
        if existing.iter().any(|p| p.state == PaymentState::Paid) {
            return Err(ServiceError::Conflict("order is already paid".to_string()));
        }
        if let Some(open) = existing.into_iter().find(|p| p.state == PaymentState::Created) {
            return self.intent_view(&order, open);
        }

        let gateway_order = self
            .gateway
            .create_order(order.total_amount, CURRENCY, &order.order_number)
            .await?;

        let now = Utc::now();
        let row = payment::ActiveModel {
            id: Set(Uuid::new_v4()),
            order_id: Set(order.id),
            user_id: Set(user_id),
            gateway_order_id: Set(gateway_order.id),
            gateway_payment_id: Set(None),
            gateway_signature: Set(None),
            amount: Set(order.total_amount),
            currency: Set(CURRENCY.to_string()),
            state: Set(PaymentState::Created),
            gateway_refund_id: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        };
        let payment = row.insert(&*self.db).await?;

        info!(order_number = %order.order_number, gateway_order_id = %payment.gateway_order_id, "payment intent created");
        self.intent_view(&order, payment)
    }

    /// Confirms a payment from the signature the client received.
    ///
    /// A valid signature captures the payment; an invalid one fails the
    /// attempt. Verifying an already-captured payment again succeeds, so the
    /// client can retry the callback safely.
    #[instrument(skip(self, input))]
    pub async fn verify(
        &self,
        user_id: Uuid,
        input: VerifyPaymentInput,
    ) -> Result<PaymentView, ServiceError> {
        let payment = self.owned_payment(user_id, &input.gateway_order_id).await?;

        match payment.state {
            PaymentState::Created | PaymentState::Paid => {}
            state => {
                return Err(ServiceError::Conflict(format!("payment is {state}")));
            }
        }

        if !verify_payment_signature(
            &self.key_secret,
            &input.gateway_order_id,
            &input.gateway_payment_id,
            &input.signature,
        ) {
            warn!(gateway_order_id = %input.gateway_order_id, "payment signature rejected");
            self.mark_failed(&payment).await?;
            return Err(ServiceError::InvalidSignature);
        }

        self.mark_captured(&payment, &input.gateway_payment_id, Some(&input.signature))
            .await?;
        self.reload_view(payment.id).await
    }

    /// Applies a gateway webhook delivered to our endpoint.
    ///
    /// The raw body is authenticated first; after that the call never
    /// fails for business reasons, because the gateway treats non-2xx as
    /// "retry later". Unknown orders and unhandled event types are simply
    /// acknowledged.
    #[instrument(skip(self, body, signature))]
    pub async fn handle_webhook(
        &self,
        body: &[u8],
        signature: Option<&str>,
    ) -> Result<WebhookOutcome, ServiceError> {
        let signature = signature.ok_or(ServiceError::InvalidSignature)?;
        if !verify_webhook_signature(&self.webhook_secret, body, signature) {
            return Err(ServiceError::InvalidSignature);
        }

        let event: WebhookEvent = serde_json::from_slice(body)
            .map_err(|e| ServiceError::ValidationError(format!("malformed webhook payload: {e}")))?;
        let Some(entity) = event.payment_entity() else {
            return Ok(WebhookOutcome::Ignored);
        };

        let payment = Payment::find()
            .filter(payment::Column::GatewayOrderId.eq(entity.order_id.clone()))
            .one(&*self.db)
            .await?;
        let Some(payment) = payment else {
            info!(gateway_order_id = %entity.order_id, "webhook for unknown gateway order acknowledged");
            return Ok(WebhookOutcome::Ignored);
        };

        match event.event.as_str() {
            "payment.captured" => match self.mark_captured(&payment, &entity.id, None).await? {
                CaptureOutcome::Captured => Ok(WebhookOutcome::Processed),
                CaptureOutcome::AlreadyCaptured => Ok(WebhookOutcome::AlreadyProcessed),
            },
            "payment.failed" => {
                if self.mark_failed(&payment).await? {
                    Ok(WebhookOutcome::Processed)
                } else {
                    Ok(WebhookOutcome::AlreadyProcessed)
                }
            }
            _ => Ok(WebhookOutcome::Ignored),
        }
    }

    /// Refunds a captured payment through the gateway.
    ///
    /// The gateway call happens first; if it fails the row stays `PAID` and
    /// the refund can be retried. The order's payment closes as refunded in
    /// the same transaction, which also blocks this path once a cancellation
    /// has already returned the money as store credit.
    #[instrument(skip(self))]
    pub async fn refund(
        &self,
        order_id: Uuid,
        amount: Option<Decimal>,
    ) -> Result<PaymentView, ServiceError> {
        let order = Order::find_by_id(order_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("order {order_id}")))?;
        if order.payment_status != OrderPaymentStatus::Paid {
            return Err(ServiceError::Conflict(format!(
                "order payment is {}",
                order.payment_status
            )));
        }

        let payment = Payment::find()
            .filter(payment::Column::OrderId.eq(order_id))
            .filter(payment::Column::State.eq(PaymentState::Paid))
            .one(&*self.db)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("captured payment for order {order_id}"))
            })?;

        let amount = amount.unwrap_or(payment.amount);
        if amount <= Decimal::ZERO || amount > payment.amount {
            return Err(ServiceError::ValidationError(format!(
                "refund amount must be positive and at most {}",
                payment.amount
            )));
        }
        let gateway_payment_id = payment.gateway_payment_id.clone().ok_or_else(|| {
            ServiceError::InternalError("captured payment has no gateway payment id".to_string())
        })?;

        let refund = self
            .gateway
            .refund_payment(&gateway_payment_id, amount)
            .await?;

        let txn = self.db.begin().await?;
        let updated = Payment::update_many()
            .col_expr(payment::Column::State, Expr::value(PaymentState::Refunded))
            .col_expr(
                payment::Column::GatewayRefundId,
                Expr::value(Some(refund.id.clone())),
            )
            .col_expr(payment::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(payment::Column::Id.eq(payment.id))
            .filter(payment::Column::State.eq(PaymentState::Paid))
            .exec(&txn)
            .await?;
        if updated.rows_affected == 0 {
            return Err(ServiceError::Conflict(
                "payment changed state while refunding".to_string(),
            ));
        }

        Order::update_many()
            .col_expr(
                order::Column::PaymentStatus,
                Expr::value(OrderPaymentStatus::Refunded),
            )
            .col_expr(order::Column::RefundAmount, Expr::value(Some(amount)))
            .col_expr(order::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(order::Column::Id.eq(order_id))
            .filter(order::Column::PaymentStatus.eq(OrderPaymentStatus::Paid))
            .exec(&txn)
            .await?;
        txn.commit().await?;

        self.event_sender.send(Event::PaymentRefunded {
            order_id,
            payment_id: payment.id,
        });
        info!(order_id = %order_id, gateway_refund_id = %refund.id, "gateway refund issued");
        self.reload_view(payment.id).await
    }

    /// Latest payment attempt for an order, if any.
    pub async fn payment_for_order(
        &self,
        user_id: Uuid,
        order_id: Uuid,
    ) -> Result<Option<PaymentView>, ServiceError> {
        Order::find_by_id(order_id)
            .filter(order::Column::UserId.eq(user_id))
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("order {order_id}")))?;

        let payment = Payment::find()
            .filter(payment::Column::OrderId.eq(order_id))
            .order_by_desc(payment::Column::CreatedAt)
            .one(&*self.db)
            .await?;
        Ok(payment.map(PaymentView::from))
    }

    /// CREATED -> PAID plus marking the order paid and packing it. Calling
    /// it again after the payment is captured reports that instead of
    /// failing.
    async fn mark_captured(
        &self,
        payment: &payment::Model,
        gateway_payment_id: &str,
        signature: Option<&str>,
    ) -> Result<CaptureOutcome, ServiceError> {
        let txn = self.db.begin().await?;

        let updated = Payment::update_many()
            .col_expr(payment::Column::State, Expr::value(PaymentState::Paid))
            .col_expr(
                payment::Column::GatewayPaymentId,
                Expr::value(Some(gateway_payment_id.to_string())),
            )
            .col_expr(
                payment::Column::GatewaySignature,
                Expr::value(signature.map(str::to_string)),
            )
            .col_expr(payment::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(payment::Column::Id.eq(payment.id))
            .filter(payment::Column::State.eq(PaymentState::Created))
            .exec(&txn)
            .await?;

        if updated.rows_affected == 0 {
            let current = Payment::find_by_id(payment.id)
                .one(&txn)
                .await?
                .ok_or_else(|| ServiceError::NotFound(format!("payment {}", payment.id)))?;
            txn.commit().await?;
            return match current.state {
                PaymentState::Paid => Ok(CaptureOutcome::AlreadyCaptured),
                state => Err(ServiceError::Conflict(format!("payment is {state}"))),
            };
        }

        // A capture after a failed attempt still pays the order.
        Order::update_many()
            .col_expr(
                order::Column::PaymentStatus,
                Expr::value(OrderPaymentStatus::Paid),
            )
            .col_expr(order::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(order::Column::Id.eq(payment.order_id))
            .filter(order::Column::PaymentStatus.is_in([
                OrderPaymentStatus::Pending,
                OrderPaymentStatus::Failed,
            ]))
            .exec(&txn)
            .await?;

        let packed = Order::update_many()
            .col_expr(order::Column::Status, Expr::value(OrderStatus::Packed))
            .col_expr(order::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(order::Column::Id.eq(payment.order_id))
            .filter(order::Column::Status.eq(OrderStatus::Pending))
            .exec(&txn)
            .await?;
        if packed.rows_affected > 0 {
            let row = order_status_history::ActiveModel {
                id: Set(Uuid::new_v4()),
                order_id: Set(payment.order_id),
                status: Set(OrderStatus::Packed),
                note: Set(Some("payment captured".to_string())),
                created_at: Set(Utc::now()),
            };
            row.insert(&txn).await?;
        }

        txn.commit().await?;

        self.event_sender.send(Event::PaymentCaptured {
            order_id: payment.order_id,
            payment_id: payment.id,
        });
        info!(payment_id = %payment.id, "payment captured");
        Ok(CaptureOutcome::Captured)
    }

    /// CREATED -> FAILED, echoed onto the order while it is still unpaid.
    /// Returns whether this call made the change.
    async fn mark_failed(&self, payment: &payment::Model) -> Result<bool, ServiceError> {
        let txn = self.db.begin().await?;

        let updated = Payment::update_many()
            .col_expr(payment::Column::State, Expr::value(PaymentState::Failed))
            .col_expr(payment::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(payment::Column::Id.eq(payment.id))
            .filter(payment::Column::State.eq(PaymentState::Created))
            .exec(&txn)
            .await?;

        if updated.rows_affected == 0 {
            txn.commit().await?;
            return Ok(false);
        }

        Order::update_many()
            .col_expr(
                order::Column::PaymentStatus,
                Expr::value(OrderPaymentStatus::Failed),
            )
            .col_expr(order::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(order::Column::Id.eq(payment.order_id))
            .filter(order::Column::PaymentStatus.eq(OrderPaymentStatus::Pending))
            .exec(&txn)
            .await?;

        txn.commit().await?;

        self.event_sender.send(Event::PaymentFailed {
            order_id: payment.order_id,
            payment_id: payment.id,
        });
        Ok(true)
    }

    async fn owned_payment(
        &self,
        user_id: Uuid,
        gateway_order_id: &str,
    ) -> Result<payment::Model, ServiceError> {
        let payment = Payment::find()
            .filter(payment::Column::GatewayOrderId.eq(gateway_order_id))
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("payment {gateway_order_id}")))?;

        Order::find_by_id(payment.order_id)
            .filter(order::Column::UserId.eq(user_id))
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("payment {gateway_order_id}")))?;

        Ok(payment)
    }

    async fn reload_view(&self, payment_id: Uuid) -> Result<PaymentView, ServiceError> {
        let payment = Payment::find_by_id(payment_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("payment {payment_id}")))?;
        Ok(PaymentView::from(payment))
    }

    fn intent_view(
        &self,
        order: &order::Model,
        payment: payment::Model,
    ) -> Result<PaymentIntentView, ServiceError> {
        Ok(PaymentIntentView {
            payment_id: payment.id,
            order_id: order.id,
            order_number: order.order_number.clone(),
            gateway_order_id: payment.gateway_order_id,
            amount: payment.amount,
            amount_paise: to_paise(payment.amount)?,
            currency: payment.currency,
            key_id: self.key_id.clone(),
        })
    }
}

enum CaptureOutcome {
    Captured,
    AlreadyCaptured,
}

/// What the webhook endpoint reports back to the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum WebhookOutcome {
    Processed,
    AlreadyProcessed,
    /// Authenticated but not actionable: unknown order or event type.
    Ignored,
}

impl WebhookOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            WebhookOutcome::Processed => "processed",
            WebhookOutcome::AlreadyProcessed => "already_processed",
            WebhookOutcome::Ignored => "acknowledged",
        }
    }
}

#[derive(Debug, Deserialize)]
struct WebhookEvent {
    event: String,
    #[serde(default)]
    payload: Option<WebhookPayload>,
}

#[derive(Debug, Deserialize)]
struct WebhookPayload {
    #[serde(default)]
    payment: Option<WebhookPaymentWrapper>,
}

#[derive(Debug, Deserialize)]
struct WebhookPaymentWrapper {
    entity: WebhookPaymentEntity,
}

#[derive(Debug, Deserialize)]
struct WebhookPaymentEntity {
    id: String,
    order_id: String,
}

impl WebhookEvent {
    fn payment_entity(&self) -> Option<&WebhookPaymentEntity> {
        self.payload
            .as_ref()
            .and_then(|p| p.payment.as_ref())
            .map(|w| &w.entity)
    }
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct VerifyPaymentInput {
    #[schema(example = "order_NXhT3y4mZ1")]
    pub gateway_order_id: String,
    #[schema(example = "pay_NXhUiq8DLN")]
    pub gateway_payment_id: String,
    pub signature: String,
}

/// Everything the client needs to launch the gateway's checkout widget.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct PaymentIntentView {
    pub payment_id: Uuid,
    pub order_id: Uuid,
    pub order_number: String,
    pub gateway_order_id: String,
    #[schema(value_type = String, example = "1248.00")]
    pub amount: Decimal,
    /// Integer paise, the unit the gateway widget expects.
    pub amount_paise: i64,
    pub currency: String,
    pub key_id: String,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct PaymentView {
    pub id: Uuid,
    pub order_id: Uuid,
    pub gateway_order_id: String,
    pub gateway_payment_id: Option<String>,
    #[schema(value_type = String, example = "1248.00")]
    pub amount: Decimal,
    pub currency: String,
    pub state: PaymentState,
    pub gateway_refund_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<payment::Model> for PaymentView {
    fn from(p: payment::Model) -> Self {
        Self {
            id: p.id,
            order_id: p.order_id,
            gateway_order_id: p.gateway_order_id,
            gateway_payment_id: p.gateway_payment_id,
            amount: p.amount,
            currency: p.currency,
            state: p.state,
            gateway_refund_id: p.gateway_refund_id,
            created_at: p.created_at,
            updated_at: p.updated_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_captured_webhook() {
        let body = serde_json::json!({
            "event": "payment.captured",
            "payload": {
                "payment": {
                    "entity": {
                        "id": "pay_123",
                        "order_id": "order_456",
                        "amount": 124800
                    }
                }
            }
        });
        let event: WebhookEvent = serde_json::from_value(body).unwrap();
        assert_eq!(event.event, "payment.captured");
        let entity = event.payment_entity().unwrap();
        assert_eq!(entity.id, "pay_123");
        assert_eq!(entity.order_id, "order_456");
    }

    #[test]
    fn tolerates_payloads_without_a_payment() {
        let body = serde_json::json!({ "event": "refund.processed" });
        let event: WebhookEvent = serde_json::from_value(body).unwrap();
        assert!(event.payment_entity().is_none());
    }
}
