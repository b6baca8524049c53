use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// A catalog product. `stock` is the aggregate unit count; when the product
/// is sold in sizes it equals the sum of its `product_sizes` rows and the
/// two are maintained together. A product is visible to shoppers only while
/// `is_active` is true.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "products")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub name: String,
    #[sea_orm(unique)]
    pub slug: String,
    #[sea_orm(column_type = "Text", nullable)]
    pub description: Option<String>,
    #[sea_orm(nullable)]
    pub brand: Option<String>,
    #[sea_orm(column_type = "Decimal(Some((12, 2)))")]
    pub price: Decimal,
    /// Strike-through price; never below `price`.
    #[sea_orm(column_type = "Decimal(Some((12, 2)))")]
    pub original_price: Decimal,
    /// Whole-percent markdown implied by `original_price`. Stored, and
    /// recomputed by the catalog service on every price write; clients
    /// cannot set it.
    pub discount_percent: i32,
    pub category: String,
    #[sea_orm(column_type = "Json")]
    pub image_urls: Json,
    /// Units across all sizes, or the flat stock for size-less products.
    pub stock: i32,
    pub is_active: bool,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::product_size::Entity")]
    ProductSize,
    #[sea_orm(has_many = "super::cart_item::Entity")]
    CartItem,
}

impl Related<super::product_size::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ProductSize.def()
    }
}

impl Related<super::cart_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::CartItem.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

/// Whole-percent discount for a price pair: `round(100 * (original - price)
/// / original)`, clamped to 0 when there is no markdown.
pub fn discount_percent_for(price: Decimal, original_price: Decimal) -> i32 {
    if original_price <= Decimal::ZERO || price >= original_price {
        return 0;
    }
    let percent = (original_price - price) / original_price * Decimal::from(100);
    percent.round().try_into().unwrap_or(0)
}

impl Model {
    pub fn first_image(&self) -> Option<&str> {
        self.image_urls.as_array()?.first()?.as_str()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn discount_rounds_to_whole_percent() {
        assert_eq!(discount_percent_for(dec!(749), dec!(999)), 25);
        assert_eq!(discount_percent_for(dec!(500), dec!(1000)), 50);
        assert_eq!(discount_percent_for(dec!(666), dec!(999)), 33);
    }

    #[test]
    fn no_markdown_means_zero() {
        assert_eq!(discount_percent_for(dec!(749), dec!(749)), 0);
        assert_eq!(discount_percent_for(dec!(749), dec!(500)), 0);
        assert_eq!(discount_percent_for(dec!(749), dec!(0)), 0);
    }

    #[test]
    fn first_image_reads_json_array() {
        let p = Model {
            id: Uuid::new_v4(),
            name: "Linen Shirt".into(),
            slug: "linen-shirt".into(),
            description: None,
            brand: Some("Andaman".into()),
            price: dec!(749),
            original_price: dec!(999),
            discount_percent: 25,
            category: "shirts".into(),
            image_urls: serde_json::json!(["https://cdn.example.com/a.jpg"]),
            stock: 10,
            is_active: true,
            created_at: chrono::Utc::now(),
            updated_at: chrono::Utc::now(),
        };
        assert_eq!(p.first_image(), Some("https://cdn.example.com/a.jpg"));
    }
}
