use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
};
use serde::Serialize;
use tracing::{info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::entities::prelude::{Wallet, WalletTransaction};
use crate::entities::wallet_transaction::WalletDirection;
use crate::entities::{wallet, wallet_transaction};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};

/// Store-credit wallets with an append-only ledger.
///
/// Every balance change goes through [`credit_in_txn`] or [`debit_in_txn`]
/// so the wallet row and its ledger entry always land in the same
/// transaction. The balance never goes negative; a debit that would
/// overdraw fails instead.
///
/// [`credit_in_txn`]: WalletService::credit_in_txn
/// [`debit_in_txn`]: WalletService::debit_in_txn
#[derive(Clone)]
pub struct WalletService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
}

impl WalletService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: Arc<EventSender>) -> Self {
        Self { db, event_sender }
    }

    /// Returns the user's wallet, creating a zero-balance one on first touch.
    pub async fn get_wallet(&self, user_id: Uuid) -> Result<wallet::Model, ServiceError> {
        self.find_or_create(&*self.db, user_id, false).await
    }

    /// Ledger entries, newest first.
    pub async fn list_transactions(
        &self,
        user_id: Uuid,
        page: u64,
        limit: u64,
    ) -> Result<(Vec<wallet_transaction::Model>, u64), ServiceError> {
        let wallet = self.find_or_create(&*self.db, user_id, false).await?;
        let paginator = WalletTransaction::find()
            .filter(wallet_transaction::Column::WalletId.eq(wallet.id))
            .order_by_desc(wallet_transaction::Column::CreatedAt)
            .paginate(&*self.db, limit);
        let total = paginator.num_items().await?;
        let entries = paginator.fetch_page(page.saturating_sub(1)).await?;
        Ok((entries, total))
    }

    /// Admin credit, e.g. a goodwill gesture. Opens its own transaction and
    /// emits [`Event::WalletCredited`] after commit.
    #[instrument(skip(self))]
    pub async fn credit(
        &self,
        user_id: Uuid,
        amount: Decimal,
        reason: &str,
    ) -> Result<WalletView, ServiceError> {
        let txn = self.db.begin().await?;
        let entry = self.credit_in_txn(&txn, user_id, amount, reason, None).await?;
        txn.commit().await?;

        self.event_sender.send(Event::WalletCredited { user_id, amount });

        info!(user_id = %user_id, %amount, reason, "wallet credited");
        Ok(WalletView {
            user_id,
            balance: entry.balance_after,
        })
    }

    /// Adds to the wallet inside the caller's transaction and records the
    /// ledger entry. The caller is responsible for emitting events after it
    /// commits.
    pub async fn credit_in_txn<C: ConnectionTrait>(
        &self,
        conn: &C,
        user_id: Uuid,
        amount: Decimal,
        reason: &str,
        order_id: Option<Uuid>,
    ) -> Result<wallet_transaction::Model, ServiceError> {
        if amount <= Decimal::ZERO {
            return Err(ServiceError::ValidationError(
                "credit amount must be positive".to_string(),
            ));
        }

        let wallet = self.find_or_create(conn, user_id, true).await?;
        let balance_after = wallet.balance + amount;
        self.apply(conn, wallet, balance_after, WalletDirection::Credit, amount, reason, order_id)
            .await
    }

    /// Balance read that keeps the row locked for the rest of the caller's
    /// transaction. Checkout uses this to size the wallet application before
    /// debiting.
    pub async fn locked_balance<C: ConnectionTrait>(
        &self,
        conn: &C,
        user_id: Uuid,
    ) -> Result<Decimal, ServiceError> {
        Ok(self.find_or_create(conn, user_id, true).await?.balance)
    }

    /// Takes from the wallet inside the caller's transaction.
    ///
    /// # Errors
    ///
    /// [`ServiceError::InsufficientWalletBalance`] if the balance does not
    /// cover the amount. The row is locked first, so the check holds until
    /// the transaction resolves.
    pub async fn debit_in_txn<C: ConnectionTrait>(
        &self,
        conn: &C,
        user_id: Uuid,
        amount: Decimal,
        reason: &str,
        order_id: Option<Uuid>,
    ) -> Result<wallet_transaction::Model, ServiceError> {
        if amount <= Decimal::ZERO {
            return Err(ServiceError::ValidationError(
                "debit amount must be positive".to_string(),
            ));
        }

        let wallet = self.find_or_create(conn, user_id, true).await?;
        if wallet.balance < amount {
            return Err(ServiceError::InsufficientWalletBalance);
        }
        let balance_after = wallet.balance - amount;
        self.apply(conn, wallet, balance_after, WalletDirection::Debit, amount, reason, order_id)
            .await
    }

    async fn apply<C: ConnectionTrait>(
        &self,
        conn: &C,
        wallet: wallet::Model,
        balance_after: Decimal,
        direction: WalletDirection,
        amount: Decimal,
        reason: &str,
        order_id: Option<Uuid>,
    ) -> Result<wallet_transaction::Model, ServiceError> {
        let wallet_id = wallet.id;
        let mut active: wallet::ActiveModel = wallet.into();
        active.balance = Set(balance_after);
        active.updated_at = Set(Utc::now());
        active.update(conn).await?;

        let entry = wallet_transaction::ActiveModel {
            id: Set(Uuid::new_v4()),
            wallet_id: Set(wallet_id),
            direction: Set(direction),
            amount: Set(amount),
            balance_after: Set(balance_after),
            reason: Set(reason.to_string()),
            order_id: Set(order_id),
            created_at: Set(Utc::now()),
        };
        Ok(entry.insert(conn).await?)
    }

    /// Looks up the wallet row, optionally with an exclusive lock so
    /// concurrent debits serialize. SQLite ignores row locks; its single
    /// writer gives the same guarantee.
    async fn find_or_create<C: ConnectionTrait>(
        &self,
        conn: &C,
        user_id: Uuid,
        for_update: bool,
    ) -> Result<wallet::Model, ServiceError> {
        let mut query = Wallet::find().filter(wallet::Column::UserId.eq(user_id));
        if for_update {
            query = query.lock_exclusive();
        }
        if let Some(wallet) = query.one(conn).await? {
            return Ok(wallet);
        }

        let now = Utc::now();
        let model = wallet::ActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(user_id),
            balance: Set(Decimal::ZERO),
            created_at: Set(now),
            updated_at: Set(now),
        };
        Ok(model.insert(conn).await?)
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct WalletView {
    pub user_id: Uuid,
    #[schema(value_type = String, example = "250.00")]
    pub balance: Decimal,
}
