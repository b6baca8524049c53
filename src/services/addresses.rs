use std::sync::Arc;

use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, ModelTrait, QueryFilter,
    QueryOrder, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use tracing::instrument;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::{Validate, ValidationError};

use crate::entities::address;
use crate::entities::prelude::Address;
use crate::errors::ServiceError;

/// Saved delivery addresses, with at most one default per user.
#[derive(Clone)]
pub struct AddressService {
    db: Arc<DatabaseConnection>,
}

impl AddressService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// The user's address book, default first.
    pub async fn list(&self, user_id: Uuid) -> Result<Vec<AddressView>, ServiceError> {
        let rows = Address::find()
            .filter(address::Column::UserId.eq(user_id))
            .order_by_desc(address::Column::IsDefault)
            .order_by_desc(address::Column::CreatedAt)
            .all(&*self.db)
            .await?;
        Ok(rows.into_iter().map(AddressView::from).collect())
    }

    pub async fn get(&self, user_id: Uuid, address_id: Uuid) -> Result<AddressView, ServiceError> {
        let row = self.owned(user_id, address_id).await?;
        Ok(AddressView::from(row))
    }

    /// Adds an address. The first address becomes the default automatically.
    #[instrument(skip(self, input))]
    pub async fn create(
        &self,
        user_id: Uuid,
        input: AddressInput,
    ) -> Result<AddressView, ServiceError> {
        input.validate()?;

        let txn = self.db.begin().await?;
        let existing = Address::find()
            .filter(address::Column::UserId.eq(user_id))
            .all(&txn)
            .await?;
        let is_default = input.is_default || existing.is_empty();
        if is_default {
            self.unset_default(&txn, user_id).await?;
        }

        let now = Utc::now();
        let row = address::ActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(user_id),
            name: Set(input.name),
            phone: Set(input.phone),
            line1: Set(input.line1),
            line2: Set(input.line2),
            city: Set(input.city),
            state: Set(input.state),
            pincode: Set(input.pincode),
            is_default: Set(is_default),
            created_at: Set(now),
            updated_at: Set(now),
        };
        let row = row.insert(&txn).await?;
        txn.commit().await?;

        Ok(AddressView::from(row))
    }

    /// Replaces an address. Setting `is_default` moves the default here.
    #[instrument(skip(self, input))]
    pub async fn update(
        &self,
        user_id: Uuid,
        address_id: Uuid,
        input: AddressInput,
    ) -> Result<AddressView, ServiceError> {
        input.validate()?;

        let txn = self.db.begin().await?;
        let row = Address::find_by_id(address_id)
            .filter(address::Column::UserId.eq(user_id))
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("address {address_id}")))?;

        if input.is_default && !row.is_default {
            self.unset_default(&txn, user_id).await?;
        }

        let mut active: address::ActiveModel = row.into();
        active.name = Set(input.name);
        active.phone = Set(input.phone);
        active.line1 = Set(input.line1);
        active.line2 = Set(input.line2);
        active.city = Set(input.city);
        active.state = Set(input.state);
        active.pincode = Set(input.pincode);
        active.is_default = Set(input.is_default);
        active.updated_at = Set(Utc::now());
        let row = active.update(&txn).await?;
        txn.commit().await?;

        Ok(AddressView::from(row))
    }

    /// Makes this address the default, displacing the previous one.
    #[instrument(skip(self))]
    pub async fn set_default(
        &self,
        user_id: Uuid,
        address_id: Uuid,
    ) -> Result<AddressView, ServiceError> {
        let txn = self.db.begin().await?;
        let row = Address::find_by_id(address_id)
            .filter(address::Column::UserId.eq(user_id))
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("address {address_id}")))?;

        if row.is_default {
            txn.commit().await?;
            return Ok(AddressView::from(row));
        }

        self.unset_default(&txn, user_id).await?;
        let mut active: address::ActiveModel = row.into();
        active.is_default = Set(true);
        active.updated_at = Set(Utc::now());
        let row = active.update(&txn).await?;
        txn.commit().await?;

        Ok(AddressView::from(row))
    }

    /// Removes an address. Orders keep their own snapshot, so history is
    /// unaffected.
    #[instrument(skip(self))]
    pub async fn delete(&self, user_id: Uuid, address_id: Uuid) -> Result<(), ServiceError> {
        let row = self.owned(user_id, address_id).await?;
        row.delete(&*self.db).await?;
        Ok(())
    }

    async fn owned(&self, user_id: Uuid, address_id: Uuid) -> Result<address::Model, ServiceError> {
        Address::find_by_id(address_id)
            .filter(address::Column::UserId.eq(user_id))
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("address {address_id}")))
    }

    async fn unset_default<C: sea_orm::ConnectionTrait>(
        &self,
        conn: &C,
        user_id: Uuid,
    ) -> Result<(), ServiceError> {
        Address::update_many()
            .col_expr(address::Column::IsDefault, sea_orm::sea_query::Expr::value(false))
            .filter(address::Column::UserId.eq(user_id))
            .filter(address::Column::IsDefault.eq(true))
            .exec(conn)
            .await?;
        Ok(())
    }
}

fn validate_pincode(value: &str) -> Result<(), ValidationError> {
    if value.len() == 6 && value.chars().all(|c| c.is_ascii_digit()) {
        Ok(())
    } else {
        Err(ValidationError::new("pincode must be 6 digits"))
    }
}

fn validate_phone(value: &str) -> Result<(), ValidationError> {
    let digits = value.strip_prefix('+').unwrap_or(value);
    if (8..=13).contains(&digits.len()) && digits.chars().all(|c| c.is_ascii_digit()) {
        Ok(())
    } else {
        Err(ValidationError::new("phone must be 8 to 13 digits"))
    }
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct AddressInput {
    #[validate(length(min = 1, max = 100))]
    #[schema(example = "Asha Verma")]
    pub name: String,
    #[validate(custom = "validate_phone")]
    #[schema(example = "+919876543210")]
    pub phone: String,
    #[validate(length(min = 1, max = 200))]
    #[schema(example = "14 MG Road")]
    pub line1: String,
    pub line2: Option<String>,
    #[validate(length(min = 1, max = 100))]
    #[schema(example = "Bengaluru")]
    pub city: String,
    #[validate(length(min = 1, max = 100))]
    #[schema(example = "Karnataka")]
    pub state: String,
    #[validate(custom = "validate_pincode")]
    #[schema(example = "560001")]
    pub pincode: String,
    #[serde(default)]
    pub is_default: bool,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct AddressView {
    pub id: Uuid,
    pub name: String,
    pub phone: String,
    pub line1: String,
    pub line2: Option<String>,
    pub city: String,
    pub state: String,
    pub pincode: String,
    pub is_default: bool,
    pub created_at: DateTime<Utc>,
}

impl From<address::Model> for AddressView {
    fn from(a: address::Model) -> Self {
        Self {
            id: a.id,
            name: a.name,
            phone: a.phone,
            line1: a.line1,
            line2: a.line2,
            city: a.city,
            state: a.state,
            pincode: a.pincode,
            is_default: a.is_default,
            created_at: a.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pincode_must_be_six_digits() {
        assert!(validate_pincode("560001").is_ok());
        assert!(validate_pincode("5600").is_err());
        assert!(validate_pincode("56000a").is_err());
        assert!(validate_pincode("5600011").is_err());
    }

    #[test]
    fn phone_accepts_country_prefix() {
        assert!(validate_phone("+919876543210").is_ok());
        assert!(validate_phone("9876543210").is_ok());
        assert!(validate_phone("12345").is_err());
        assert!(validate_phone("98765abc10").is_err());
    }
}
