use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, ModelTrait,
    QueryFilter, QueryOrder, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::entities::prelude::{Cart, CartItem, Product, ProductSize};
use crate::entities::{cart, cart_item, product, product_size};
use crate::errors::ServiceError;

/// Shopping cart management.
///
/// A cart is a per-user scratchpad of `(product, size, quantity)` lines and
/// nothing more: no prices are stored, so the cart can never go stale on a
/// price change. Every read re-prices the lines from the live catalog, and
/// checkout is the only place stock is actually claimed.
#[derive(Clone)]
pub struct CartService {
    db: Arc<DatabaseConnection>,
}

impl CartService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Returns the user's cart, creating an empty one on first touch.
    ///
    /// # Arguments
    ///
    /// * `user_id` - The cart owner.
    ///
    /// # Returns
    ///
    /// A priced [`CartView`] with one line per `(product, size)` pair. Lines
    /// whose product has been deactivated or whose size no longer covers the
    /// requested quantity stay in the view with `available` set to `false`;
    /// checkout is where they become hard errors.
    #[instrument(skip(self))]
    pub async fn get_cart(&self, user_id: Uuid) -> Result<CartView, ServiceError> {
        let cart = self.get_or_create_cart(&*self.db, user_id).await?;
        self.build_view(&cart).await
    }

    /// Adds a line to the cart, merging quantities on `(product, size)`.
    ///
    /// # Arguments
    ///
    /// * `user_id` - The cart owner.
    /// * `input` - Product, optional size label and quantity to add.
    ///
    /// # Errors
    ///
    /// * [`ServiceError::ProductUnavailable`] if the product is missing or inactive.
    /// * [`ServiceError::ValidationError`] if the size label does not exist
    ///   for the product, or no size was given for a product sold in sizes.
    ///
    /// Stock is deliberately not checked here; a cart line is an intent, not
    /// a reservation.
    #[instrument(skip(self, input))]
    pub async fn add_item(
        &self,
        user_id: Uuid,
        input: AddCartItemInput,
    ) -> Result<CartView, ServiceError> {
        input.validate()?;

        let txn = self.db.begin().await?;

        let product = Product::find_by_id(input.product_id)
            .one(&txn)
            .await?
            .filter(|p| p.is_active)
            .ok_or_else(|| ServiceError::ProductUnavailable(input.product_id.to_string()))?;

        let sizes = ProductSize::find()
            .filter(product_size::Column::ProductId.eq(product.id))
            .all(&txn)
            .await?;
        check_size_choice(&product, &sizes, input.size.as_deref())?;

        let cart = self.get_or_create_cart(&txn, user_id).await?;
        self.merge_line(&txn, &cart, product.id, input.size.as_deref(), input.quantity)
            .await?;
        self.touch(&txn, &cart).await?;

        txn.commit().await?;

        info!(user_id = %user_id, product_id = %product.id, size = ?input.size, "cart item added");
        self.build_view(&cart).await
    }

    /// Replaces the quantity of one cart line.
    ///
    /// # Errors
    ///
    /// [`ServiceError::NotFound`] if the line does not belong to this user's
    /// cart.
    #[instrument(skip(self))]
    pub async fn update_item(
        &self,
        user_id: Uuid,
        item_id: Uuid,
        quantity: i32,
    ) -> Result<CartView, ServiceError> {
        if !(1..=MAX_LINE_QUANTITY).contains(&quantity) {
            return Err(ServiceError::ValidationError(format!(
                "quantity must be between 1 and {MAX_LINE_QUANTITY}"
            )));
        }

        let txn = self.db.begin().await?;
        let cart = self.get_or_create_cart(&txn, user_id).await?;

        let item = CartItem::find_by_id(item_id)
            .filter(cart_item::Column::CartId.eq(cart.id))
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("cart item {item_id}")))?;

        let mut active: cart_item::ActiveModel = item.into();
        active.quantity = Set(quantity);
        active.updated_at = Set(Utc::now());
        active.update(&txn).await?;
        self.touch(&txn, &cart).await?;

        txn.commit().await?;
        self.build_view(&cart).await
    }

    /// Removes one line from the cart.
    #[instrument(skip(self))]
    pub async fn remove_item(&self, user_id: Uuid, item_id: Uuid) -> Result<CartView, ServiceError> {
        let txn = self.db.begin().await?;
        let cart = self.get_or_create_cart(&txn, user_id).await?;

        let item = CartItem::find_by_id(item_id)
            .filter(cart_item::Column::CartId.eq(cart.id))
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("cart item {item_id}")))?;

        item.delete(&txn).await?;
        self.touch(&txn, &cart).await?;

        txn.commit().await?;
        self.build_view(&cart).await
    }

    /// Empties the cart.
    #[instrument(skip(self))]
    pub async fn clear_cart(&self, user_id: Uuid) -> Result<CartView, ServiceError> {
        let txn = self.db.begin().await?;
        let cart = self.get_or_create_cart(&txn, user_id).await?;
        self.clear_items(&txn, cart.id).await?;
        self.touch(&txn, &cart).await?;
        txn.commit().await?;
        self.build_view(&cart).await
    }

    /// Folds a guest cart into the user's cart after login.
    ///
    /// Lines for products that no longer exist, are inactive, or name an
    /// unknown size are skipped rather than failing the whole merge; the
    /// outcome reports both counts so the client can tell the user.
    #[instrument(skip(self, lines))]
    pub async fn merge_guest_cart(
        &self,
        user_id: Uuid,
        lines: Vec<GuestCartLine>,
    ) -> Result<MergeOutcome, ServiceError> {
        let txn = self.db.begin().await?;
        let cart = self.get_or_create_cart(&txn, user_id).await?;

        let mut merged = 0usize;
        let mut skipped = 0usize;
        for line in lines {
            if line.quantity < 1 {
                skipped += 1;
                continue;
            }

            let product = Product::find_by_id(line.product_id)
                .one(&txn)
                .await?
                .filter(|p| p.is_active);
            let Some(product) = product else {
                skipped += 1;
                continue;
            };

            let sizes = ProductSize::find()
                .filter(product_size::Column::ProductId.eq(product.id))
                .all(&txn)
                .await?;
            if check_size_choice(&product, &sizes, line.size.as_deref()).is_err() {
                skipped += 1;
                continue;
            }

            self.merge_line(&txn, &cart, product.id, line.size.as_deref(), line.quantity)
                .await?;
            merged += 1;
        }
        self.touch(&txn, &cart).await?;

        txn.commit().await?;

        info!(user_id = %user_id, merged, skipped, "guest cart merged");
        let view = self.build_view(&cart).await?;
        Ok(MergeOutcome {
            merged,
            skipped,
            cart: view,
        })
    }

    /// Finds the user's cart row or inserts an empty one.
    pub async fn get_or_create_cart<C: ConnectionTrait>(
        &self,
        conn: &C,
        user_id: Uuid,
    ) -> Result<cart::Model, ServiceError> {
        let existing = Cart::find()
            .filter(cart::Column::UserId.eq(user_id))
            .one(conn)
            .await?;
        if let Some(cart) = existing {
            return Ok(cart);
        }

        let now = Utc::now();
        let model = cart::ActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(user_id),
            created_at: Set(now),
            updated_at: Set(now),
        };
        Ok(model.insert(conn).await?)
    }

    /// Deletes every line of a cart. Checkout calls this inside its own
    /// transaction, after the order rows are written.
    pub async fn clear_items<C: ConnectionTrait>(
        &self,
        conn: &C,
        cart_id: Uuid,
    ) -> Result<(), ServiceError> {
        CartItem::delete_many()
            .filter(cart_item::Column::CartId.eq(cart_id))
            .exec(conn)
            .await?;
        Ok(())
    }

    async fn merge_line<C: ConnectionTrait>(
        &self,
        conn: &C,
        cart: &cart::Model,
        product_id: Uuid,
        size: Option<&str>,
        quantity: i32,
    ) -> Result<(), ServiceError> {
        let mut query = CartItem::find()
            .filter(cart_item::Column::CartId.eq(cart.id))
            .filter(cart_item::Column::ProductId.eq(product_id));
        // `= NULL` never matches; size-less lines need an IS NULL filter.
        query = match size {
            Some(label) => query.filter(cart_item::Column::Size.eq(label)),
            None => query.filter(cart_item::Column::Size.is_null()),
        };
        let existing = query.one(conn).await?;

        let now = Utc::now();
        match existing {
            Some(item) => {
                let combined = (item.quantity + quantity).min(MAX_LINE_QUANTITY);
                let mut active: cart_item::ActiveModel = item.into();
                active.quantity = Set(combined);
                active.updated_at = Set(now);
                active.update(conn).await?;
            }
            None => {
                let item = cart_item::ActiveModel {
                    id: Set(Uuid::new_v4()),
                    cart_id: Set(cart.id),
                    product_id: Set(product_id),
                    size: Set(size.map(str::to_string)),
                    quantity: Set(quantity.min(MAX_LINE_QUANTITY)),
                    created_at: Set(now),
                    updated_at: Set(now),
                };
                item.insert(conn).await?;
            }
        }
        Ok(())
    }

    async fn touch<C: ConnectionTrait>(
        &self,
        conn: &C,
        cart: &cart::Model,
    ) -> Result<(), ServiceError> {
        let mut active: cart::ActiveModel = cart.clone().into();
        active.updated_at = Set(Utc::now());
        active.update(conn).await?;
        Ok(())
    }

    async fn build_view(&self, cart: &cart::Model) -> Result<CartView, ServiceError> {
        let items = CartItem::find()
            .filter(cart_item::Column::CartId.eq(cart.id))
            .order_by_asc(cart_item::Column::CreatedAt)
            .all(&*self.db)
            .await?;

        let product_ids: Vec<Uuid> = items.iter().map(|i| i.product_id).collect();
        let products: HashMap<Uuid, product::Model> = Product::find()
            .filter(product::Column::Id.is_in(product_ids.clone()))
            .all(&*self.db)
            .await?
            .into_iter()
            .map(|p| (p.id, p))
            .collect();
        let sizes = ProductSize::find()
            .filter(product_size::Column::ProductId.is_in(product_ids))
            .all(&*self.db)
            .await?;
        let stock_by_key: HashMap<(Uuid, String), i32> = sizes
            .into_iter()
            .map(|s| ((s.product_id, s.label), s.stock))
            .collect();

        let mut lines = Vec::with_capacity(items.len());
        let mut subtotal = Decimal::ZERO;
        for item in items {
            let product = products.get(&item.product_id);
            let unit_price = product.map(|p| p.price).unwrap_or(Decimal::ZERO);
            let stock = match &item.size {
                Some(label) => stock_by_key
                    .get(&(item.product_id, label.clone()))
                    .copied()
                    .unwrap_or(0),
                None => product.map(|p| p.stock).unwrap_or(0),
            };
            let available = product.map(|p| p.is_active).unwrap_or(false) && stock >= item.quantity;
            let line_total = unit_price * Decimal::from(item.quantity);
            if available {
                subtotal += line_total;
            }

            lines.push(CartLineView {
                id: item.id,
                product_id: item.product_id,
                name: product.map(|p| p.name.clone()).unwrap_or_default(),
                slug: product.map(|p| p.slug.clone()).unwrap_or_default(),
                image_url: product.and_then(|p| p.first_image().map(str::to_string)),
                size: item.size,
                quantity: item.quantity,
                unit_price,
                line_total,
                available,
            });
        }

        Ok(CartView {
            id: cart.id,
            items: lines,
            subtotal,
        })
    }
}

/// Hard per-line cap; bulk purchases go through support.
pub const MAX_LINE_QUANTITY: i32 = 10;

/// A size label is required exactly when the product is sold in sizes, and
/// it has to be one the product actually offers.
fn check_size_choice(
    product: &product::Model,
    sizes: &[product_size::Model],
    choice: Option<&str>,
) -> Result<(), ServiceError> {
    match choice {
        Some(label) if !sizes.iter().any(|s| s.label == label) => {
            Err(ServiceError::ValidationError(format!(
                "size {} is not offered for {}",
                label, product.name
            )))
        }
        None if !sizes.is_empty() => Err(ServiceError::ValidationError(format!(
            "select a size for {}",
            product.name
        ))),
        _ => Ok(()),
    }
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct AddCartItemInput {
    pub product_id: Uuid,
    /// Omit for products sold without size variants.
    #[validate(length(min = 1, max = 16))]
    #[schema(example = "M")]
    pub size: Option<String>,
    #[validate(range(min = 1, max = 10))]
    #[schema(example = 1)]
    pub quantity: i32,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct GuestCartLine {
    pub product_id: Uuid,
    pub size: Option<String>,
    pub quantity: i32,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct CartLineView {
    pub id: Uuid,
    pub product_id: Uuid,
    pub name: String,
    pub slug: String,
    pub image_url: Option<String>,
    pub size: Option<String>,
    pub quantity: i32,
    #[schema(value_type = String, example = "749.00")]
    pub unit_price: Decimal,
    #[schema(value_type = String, example = "1498.00")]
    pub line_total: Decimal,
    /// False when the product went inactive or the size can no longer cover
    /// the requested quantity. Unavailable lines do not count toward the
    /// subtotal and fail checkout.
    pub available: bool,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct CartView {
    pub id: Uuid,
    pub items: Vec<CartLineView>,
    #[schema(value_type = String, example = "1498.00")]
    pub subtotal: Decimal,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct MergeOutcome {
    pub merged: usize,
    pub skipped: usize,
    pub cart: CartView,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn tee() -> product::Model {
        product::Model {
            id: Uuid::new_v4(),
            name: "Cotton Tee".to_string(),
            slug: "cotton-tee".to_string(),
            description: None,
            brand: None,
            price: dec!(499),
            original_price: dec!(499),
            discount_percent: 0,
            category: "T-Shirts".to_string(),
            image_urls: serde_json::json!([]),
            stock: 5,
            is_active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn size(product_id: Uuid, label: &str) -> product_size::Model {
        product_size::Model {
            id: Uuid::new_v4(),
            product_id,
            label: label.to_string(),
            stock: 3,
            position: 0,
        }
    }

    #[test]
    fn sized_products_require_a_size() {
        let product = tee();
        let sizes = vec![size(product.id, "M"), size(product.id, "L")];

        assert!(check_size_choice(&product, &sizes, Some("M")).is_ok());
        assert!(check_size_choice(&product, &sizes, None).is_err());
        assert!(check_size_choice(&product, &sizes, Some("XS")).is_err());
    }

    #[test]
    fn size_less_products_take_no_size() {
        let product = tee();

        assert!(check_size_choice(&product, &[], None).is_ok());
        assert!(check_size_choice(&product, &[], Some("M")).is_err());
    }
}
