//! Customer-facing notifications, dispatched from the event loop.
//!
//! The trait keeps delivery pluggable; the default sink writes structured
//! log lines, which is all the storefront needs until a push provider is
//! wired in. Tests use [`RecordingNotificationService`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use tracing::info;
use uuid::Uuid;

use crate::errors::ServiceError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    fn new(user_id: Uuid, title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            title: title.into(),
            body: body.into(),
            created_at: Utc::now(),
        }
    }

    pub fn order_placed(user_id: Uuid, order_number: &str, total: Decimal) -> Self {
        Self::new(
            user_id,
            "Order placed",
            format!("Your order {order_number} for ₹{total} has been placed."),
        )
    }

    pub fn order_status(user_id: Uuid, order_id: Uuid, status: &str) -> Self {
        Self::new(
            user_id,
            "Order update",
            format!("Order {order_id} is now {status}."),
        )
    }

    pub fn order_cancelled(user_id: Uuid, order_id: Uuid, wallet_refund: Decimal) -> Self {
        let body = if wallet_refund > Decimal::ZERO {
            format!("Order {order_id} was cancelled. ₹{wallet_refund} was returned to your wallet.")
        } else {
            format!("Order {order_id} was cancelled.")
        };
        Self::new(user_id, "Order cancelled", body)
    }
}

#[async_trait]
pub trait NotificationService: Send + Sync {
    async fn notify(&self, notification: Notification) -> Result<(), ServiceError>;
}

/// Default sink: structured log lines only.
#[derive(Debug, Default)]
pub struct LogNotificationService;

#[async_trait]
impl NotificationService for LogNotificationService {
    async fn notify(&self, notification: Notification) -> Result<(), ServiceError> {
        info!(
            user_id = %notification.user_id,
            title = %notification.title,
            body = %notification.body,
            "notification"
        );
        Ok(())
    }
}

/// Test sink that records everything it is asked to deliver.
#[derive(Debug, Default)]
pub struct RecordingNotificationService {
    sent: Mutex<Vec<Notification>>,
}

impl RecordingNotificationService {
    pub fn sent(&self) -> Vec<Notification> {
        self.sent.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait]
impl NotificationService for RecordingNotificationService {
    async fn notify(&self, notification: Notification) -> Result<(), ServiceError> {
        self.sent
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(notification);
        Ok(())
    }
}
