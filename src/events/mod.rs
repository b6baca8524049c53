//! Domain events emitted after state changes commit.
//!
//! Producers push onto an mpsc channel and never wait on consumers; a lost
//! event costs a notification, not an order. The processing loop fans events
//! out to the notification service and metrics.

use std::sync::Arc;

use metrics::counter;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::notifications::{Notification, NotificationService};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    OrderPlaced {
        order_id: Uuid,
        user_id: Uuid,
        order_number: String,
        total_amount: Decimal,
    },
    OrderStatusChanged {
        order_id: Uuid,
        user_id: Uuid,
        old_status: String,
        new_status: String,
    },
    OrderCancelled {
        order_id: Uuid,
        user_id: Uuid,
        wallet_refund: Decimal,
    },
    PaymentCaptured {
        order_id: Uuid,
        payment_id: Uuid,
    },
    PaymentFailed {
        order_id: Uuid,
        payment_id: Uuid,
    },
    PaymentRefunded {
        order_id: Uuid,
        payment_id: Uuid,
    },
    WalletCredited {
        user_id: Uuid,
        amount: Decimal,
    },
    WalletDebited {
        user_id: Uuid,
        amount: Decimal,
    },
    TicketOpened {
        ticket_id: Uuid,
        user_id: Uuid,
    },
    TicketReplied {
        ticket_id: Uuid,
        user_id: Uuid,
    },
}

impl Event {
    /// Stable label used for metrics and log lines.
    pub fn name(&self) -> &'static str {
        match self {
            Event::OrderPlaced { .. } => "order_placed",
            Event::OrderStatusChanged { .. } => "order_status_changed",
            Event::OrderCancelled { .. } => "order_cancelled",
            Event::PaymentCaptured { .. } => "payment_captured",
            Event::PaymentFailed { .. } => "payment_failed",
            Event::PaymentRefunded { .. } => "payment_refunded",
            Event::WalletCredited { .. } => "wallet_credited",
            Event::WalletDebited { .. } => "wallet_debited",
            Event::TicketOpened { .. } => "ticket_opened",
            Event::TicketReplied { .. } => "ticket_replied",
        }
    }
}

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Queues an event without waiting. Failures (full or closed channel)
    /// are logged, not surfaced; event delivery must never fail the request
    /// that produced it.
    pub fn send(&self, event: Event) {
        let name = event.name();
        if let Err(e) = self.sender.try_send(event) {
            error!(event = name, error = %e, "failed to queue event");
        }
    }
}

/// Drains the event channel until all senders are dropped, dispatching each
/// event to notifications and metrics.
pub async fn process_events(mut rx: mpsc::Receiver<Event>, notifier: Arc<dyn NotificationService>) {
    info!("starting event processing loop");

    while let Some(event) = rx.recv().await {
        counter!("events_processed_total", 1, "event" => event.name());

        match &event {
            Event::OrderPlaced {
                user_id,
                order_number,
                total_amount,
                ..
            } => {
                dispatch(
                    &notifier,
                    Notification::order_placed(*user_id, order_number, *total_amount),
                )
                .await;
            }
            Event::OrderStatusChanged {
                user_id,
                old_status,
                new_status,
                order_id,
            } => {
                info!(
                    order_id = %order_id,
                    from = %old_status,
                    to = %new_status,
                    "order status changed"
                );
                dispatch(
                    &notifier,
                    Notification::order_status(*user_id, *order_id, new_status),
                )
                .await;
            }
            Event::OrderCancelled {
                order_id,
                user_id,
                wallet_refund,
            } => {
                dispatch(
                    &notifier,
                    Notification::order_cancelled(*user_id, *order_id, *wallet_refund),
                )
                .await;
            }
            Event::PaymentCaptured { order_id, .. } => {
                info!(order_id = %order_id, "payment captured");
            }
            Event::PaymentFailed { order_id, .. } => {
                warn!(order_id = %order_id, "payment failed");
            }
            Event::PaymentRefunded { order_id, .. } => {
                info!(order_id = %order_id, "payment refunded");
            }
            Event::WalletCredited { user_id, amount }
            | Event::WalletDebited { user_id, amount } => {
                info!(user_id = %user_id, amount = %amount, event = event.name(), "wallet updated");
            }
            Event::TicketOpened { ticket_id, .. } => {
                info!(ticket_id = %ticket_id, "support ticket opened");
            }
            Event::TicketReplied { ticket_id, .. } => {
                info!(ticket_id = %ticket_id, "support ticket reply");
            }
        }
    }

    warn!("event processing loop has ended");
}

async fn dispatch(notifier: &Arc<dyn NotificationService>, notification: Notification) {
    if let Err(e) = notifier.notify(notification).await {
        error!(error = %e, "notification delivery failed");
    }
}
