use std::collections::HashMap;
use std::sync::Arc;

use base64::Engine;
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, QuerySelect, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::entities::prelude::{Product, ProductSize};
use crate::entities::{product, product_size};
use crate::errors::ServiceError;

/// Catalog reads for shoppers and catalog writes for admins.
///
/// Shopper-facing queries only ever see active products, and size lists are
/// filtered to rows with stock; the rows themselves are kept at zero stock
/// so a restock is an update, never a re-create.
#[derive(Clone)]
pub struct CatalogService {
    db: Arc<DatabaseConnection>,
}

impl CatalogService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Lists active products with their in-stock sizes.
    #[instrument(skip(self))]
    pub async fn list_products(
        &self,
        query: ProductListQuery,
    ) -> Result<(Vec<ProductView>, u64), ServiceError> {
        let mut select = Product::find().filter(product::Column::IsActive.eq(true));

        if let Some(category) = &query.category {
            select = select.filter(product::Column::Category.eq(category.clone()));
        }
        if let Some(search) = &query.search {
            select = select.filter(product::Column::Name.contains(search.clone()));
        }

        let paginator = select
            .order_by_desc(product::Column::CreatedAt)
            .paginate(&*self.db, query.limit);

        let total = paginator.num_items().await?;
        let products = paginator.fetch_page(query.page.saturating_sub(1)).await?;

        let views = self.attach_sizes(products, false).await?;
        Ok((views, total))
    }

    /// Fetches one active product by id.
    pub async fn get_product(&self, id: Uuid) -> Result<ProductView, ServiceError> {
        let model = Product::find_by_id(id)
            .filter(product::Column::IsActive.eq(true))
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("product {id}")))?;

        self.view_of(model, false).await
    }

    /// Fetches one active product by its URL slug.
    pub async fn get_product_by_slug(&self, slug: &str) -> Result<ProductView, ServiceError> {
        let model = Product::find()
            .filter(product::Column::Slug.eq(slug))
            .filter(product::Column::IsActive.eq(true))
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("product {slug}")))?;

        self.view_of(model, false).await
    }

    /// Distinct categories across active products, for the storefront nav.
    pub async fn list_categories(&self) -> Result<Vec<String>, ServiceError> {
        let categories: Vec<String> = Product::find()
            .select_only()
            .column(product::Column::Category)
            .filter(product::Column::IsActive.eq(true))
            .distinct()
            .order_by_asc(product::Column::Category)
            .into_tuple()
            .all(&*self.db)
            .await?;
        Ok(categories)
    }

    /// Admin list, inactive included, with every size row.
    #[instrument(skip(self))]
    pub async fn admin_list_products(
        &self,
        query: ProductListQuery,
    ) -> Result<(Vec<ProductView>, u64), ServiceError> {
        let mut select = Product::find();

        if let Some(category) = &query.category {
            select = select.filter(product::Column::Category.eq(category.clone()));
        }
        if let Some(search) = &query.search {
            select = select.filter(product::Column::Name.contains(search.clone()));
        }

        let paginator = select
            .order_by_desc(product::Column::CreatedAt)
            .paginate(&*self.db, query.limit);

        let total = paginator.num_items().await?;
        let products = paginator.fetch_page(query.page.saturating_sub(1)).await?;

        let views = self.attach_sizes(products, true).await?;
        Ok((views, total))
    }

    /// Admin view of one product, inactive included, with every size row.
    pub async fn admin_get_product(&self, id: Uuid) -> Result<ProductView, ServiceError> {
        let model = Product::find_by_id(id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("product {id}")))?;

        self.view_of(model, true).await
    }

    /// Creates a product with its size rows.
    ///
    /// The strike-through price defaults to the selling price, the discount
    /// percentage is always derived from the two, and the product's stock
    /// count is the sum of its sizes. A product without sizes carries its
    /// stock directly.
    #[instrument(skip(self, input))]
    pub async fn create_product(&self, input: CreateProductInput) -> Result<ProductView, ServiceError> {
        input.validate()?;
        if input.price <= Decimal::ZERO {
            return Err(ServiceError::ValidationError(
                "price must be positive".to_string(),
            ));
        }
        let original_price = input.original_price.unwrap_or(input.price);
        if original_price < input.price {
            return Err(ServiceError::ValidationError(
                "original price cannot be below the selling price".to_string(),
            ));
        }
        check_image_urls(&input.image_urls)?;

        let stock = if input.sizes.is_empty() {
            input.stock.unwrap_or(0)
        } else {
            if input.stock.is_some() {
                return Err(ServiceError::ValidationError(
                    "stock is derived from sizes for sized products".to_string(),
                ));
            }
            input.sizes.iter().map(|s| s.stock).sum()
        };

        let txn = self.db.begin().await?;

        let now = Utc::now();
        let model = product::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(input.name),
            slug: Set(input.slug),
            description: Set(input.description),
            brand: Set(input.brand),
            price: Set(input.price),
            original_price: Set(original_price),
            discount_percent: Set(product::discount_percent_for(input.price, original_price)),
            category: Set(input.category),
            image_urls: Set(serde_json::json!(input.image_urls)),
            stock: Set(stock),
            is_active: Set(input.is_active),
            created_at: Set(now),
            updated_at: Set(now),
        };
        let model = model.insert(&txn).await?;

        for (position, size) in input.sizes.into_iter().enumerate() {
            let row = product_size::ActiveModel {
                id: Set(Uuid::new_v4()),
                product_id: Set(model.id),
                label: Set(size.label),
                stock: Set(size.stock),
                position: Set(position as i32),
            };
            row.insert(&txn).await?;
        }

        txn.commit().await?;

        info!(product_id = %model.id, "product created");
        self.view_of(model, true).await
    }

    /// Applies the provided fields, leaving the rest untouched.
    ///
    /// Any price change re-derives the discount percentage; clients can
    /// never set it directly. Flat stock can only be patched on a product
    /// without size rows.
    #[instrument(skip(self, input))]
    pub async fn update_product(
        &self,
        id: Uuid,
        input: UpdateProductInput,
    ) -> Result<ProductView, ServiceError> {
        input.validate()?;

        let model = Product::find_by_id(id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("product {id}")))?;

        let price = input.price.unwrap_or(model.price);
        if price <= Decimal::ZERO {
            return Err(ServiceError::ValidationError(
                "price must be positive".to_string(),
            ));
        }
        let mut original_price = input.original_price.unwrap_or(model.original_price);
        if original_price < price {
            if input.original_price.is_some() {
                return Err(ServiceError::ValidationError(
                    "original price cannot be below the selling price".to_string(),
                ));
            }
            // A raise past the old strike-through lifts it along.
            original_price = price;
        }

        if input.stock.is_some() {
            let size_rows = ProductSize::find()
                .filter(product_size::Column::ProductId.eq(id))
                .count(&*self.db)
                .await?;
            if size_rows > 0 {
                return Err(ServiceError::ValidationError(
                    "stock is derived from sizes for sized products".to_string(),
                ));
            }
        }

        let mut active: product::ActiveModel = model.into();
        if let Some(name) = input.name {
            active.name = Set(name);
        }
        if let Some(description) = input.description {
            active.description = Set(Some(description));
        }
        if let Some(brand) = input.brand {
            active.brand = Set(Some(brand));
        }
        active.price = Set(price);
        active.original_price = Set(original_price);
        active.discount_percent = Set(product::discount_percent_for(price, original_price));
        if let Some(category) = input.category {
            active.category = Set(category);
        }
        if let Some(image_urls) = input.image_urls {
            check_image_urls(&image_urls)?;
            active.image_urls = Set(serde_json::json!(image_urls));
        }
        if let Some(stock) = input.stock {
            if stock < 0 {
                return Err(ServiceError::ValidationError(
                    "stock cannot be negative".to_string(),
                ));
            }
            active.stock = Set(stock);
        }
        if let Some(is_active) = input.is_active {
            active.is_active = Set(is_active);
        }
        active.updated_at = Set(Utc::now());

        let model = active.update(&*self.db).await?;
        self.view_of(model, true).await
    }

    /// Hides a product from the storefront without deleting its history.
    #[instrument(skip(self))]
    pub async fn deactivate_product(&self, id: Uuid) -> Result<(), ServiceError> {
        let model = Product::find_by_id(id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("product {id}")))?;

        let mut active: product::ActiveModel = model.into();
        active.is_active = Set(false);
        active.updated_at = Set(Utc::now());
        active.update(&*self.db).await?;

        info!(product_id = %id, "product deactivated");
        Ok(())
    }

    /// Sets the stock for a size label, creating the row if it is new, and
    /// moves the product's aggregate count by the same amount.
    #[instrument(skip(self))]
    pub async fn set_size_stock(
        &self,
        product_id: Uuid,
        label: &str,
        stock: i32,
    ) -> Result<(), ServiceError> {
        if stock < 0 {
            return Err(ServiceError::ValidationError(
                "stock cannot be negative".to_string(),
            ));
        }

        let txn = self.db.begin().await?;

        Product::find_by_id(product_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("product {product_id}")))?;

        let existing = ProductSize::find()
            .filter(product_size::Column::ProductId.eq(product_id))
            .filter(product_size::Column::Label.eq(label))
            .one(&txn)
            .await?;

        let delta = match &existing {
            Some(row) => stock - row.stock,
            None => stock,
        };
        match existing {
            Some(row) => {
                let mut active: product_size::ActiveModel = row.into();
                active.stock = Set(stock);
                active.update(&txn).await?;
            }
            None => {
                let position = ProductSize::find()
                    .filter(product_size::Column::ProductId.eq(product_id))
                    .count(&txn)
                    .await? as i32;
                let row = product_size::ActiveModel {
                    id: Set(Uuid::new_v4()),
                    product_id: Set(product_id),
                    label: Set(label.to_string()),
                    stock: Set(stock),
                    position: Set(position),
                };
                row.insert(&txn).await?;
            }
        }

        if delta != 0 {
            Product::update_many()
                .col_expr(
                    product::Column::Stock,
                    Expr::col(product::Column::Stock).add(delta),
                )
                .filter(product::Column::Id.eq(product_id))
                .exec(&txn)
                .await?;
        }

        txn.commit().await?;

        info!(product_id = %product_id, label, stock, "size stock set");
        Ok(())
    }

    async fn view_of(&self, model: product::Model, all_sizes: bool) -> Result<ProductView, ServiceError> {
        let mut views = self.attach_sizes(vec![model], all_sizes).await?;
        // attach_sizes preserves input order and length.
        views
            .pop()
            .ok_or_else(|| ServiceError::InternalError("product view vanished".to_string()))
    }

    async fn attach_sizes(
        &self,
        products: Vec<product::Model>,
        all_sizes: bool,
    ) -> Result<Vec<ProductView>, ServiceError> {
        let ids: Vec<Uuid> = products.iter().map(|p| p.id).collect();
        let size_rows = ProductSize::find()
            .filter(product_size::Column::ProductId.is_in(ids))
            .order_by_asc(product_size::Column::Position)
            .all(&*self.db)
            .await?;

        let mut by_product: HashMap<Uuid, Vec<SizeView>> = HashMap::new();
        for row in size_rows {
            if !all_sizes && row.stock <= 0 {
                continue;
            }
            by_product.entry(row.product_id).or_default().push(SizeView {
                label: row.label,
                stock: row.stock,
                position: row.position,
            });
        }

        Ok(products
            .into_iter()
            .map(|p| {
                let sizes = by_product.remove(&p.id).unwrap_or_default();
                ProductView {
                    id: p.id,
                    name: p.name.clone(),
                    slug: p.slug.clone(),
                    description: p.description.clone(),
                    brand: p.brand.clone(),
                    price: p.price,
                    original_price: p.original_price,
                    discount_percent: p.discount_percent,
                    category: p.category.clone(),
                    image_urls: p.image_urls.clone(),
                    stock: p.stock,
                    is_active: p.is_active,
                    sizes,
                }
            })
            .collect())
    }
}

/// Accepts absolute http(s) URLs and inline `data:` images whose base64
/// payload actually decodes.
fn check_image_urls(urls: &[String]) -> Result<(), ServiceError> {
    for url in urls {
        if url.starts_with("http://") || url.starts_with("https://") {
            continue;
        }
        if let Some(rest) = url.strip_prefix("data:") {
            if let Some((_, payload)) = rest.split_once(";base64,") {
                if base64::engine::general_purpose::STANDARD
                    .decode(payload)
                    .is_ok()
                {
                    continue;
                }
            }
        }
        return Err(ServiceError::ValidationError(format!(
            "image url must be http(s) or a base64 data url: {url}"
        )));
    }
    Ok(())
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProductListQuery {
    pub page: u64,
    pub limit: u64,
    pub category: Option<String>,
    pub search: Option<String>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct SizeView {
    pub label: String,
    pub stock: i32,
    pub position: i32,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ProductView {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    #[schema(example = "Andaman")]
    pub brand: Option<String>,
    #[schema(value_type = String, example = "749.00")]
    pub price: Decimal,
    #[schema(value_type = String, example = "999.00")]
    pub original_price: Decimal,
    #[schema(example = 25)]
    pub discount_percent: i32,
    pub category: String,
    #[schema(value_type = Vec<String>)]
    pub image_urls: serde_json::Value,
    /// Units across all sizes, or the flat count for size-less products.
    pub stock: i32,
    pub is_active: bool,
    pub sizes: Vec<SizeView>,
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct SizeInput {
    #[validate(length(min = 1, max = 16))]
    pub label: String,
    #[validate(range(min = 0))]
    pub stock: i32,
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CreateProductInput {
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    #[validate(length(min = 1, max = 200))]
    pub slug: String,
    pub description: Option<String>,
    #[validate(length(min = 1, max = 100))]
    pub brand: Option<String>,
    #[schema(value_type = String, example = "749.00")]
    pub price: Decimal,
    /// Strike-through price; defaults to `price` when omitted.
    #[schema(value_type = Option<String>, example = "999.00")]
    pub original_price: Option<Decimal>,
    #[validate(length(min = 1, max = 100))]
    pub category: String,
    pub image_urls: Vec<String>,
    /// Flat stock for a product without sizes; sized products derive it.
    #[validate(range(min = 0))]
    pub stock: Option<i32>,
    #[serde(default = "default_active")]
    pub is_active: bool,
    #[serde(default)]
    #[validate]
    pub sizes: Vec<SizeInput>,
}

fn default_active() -> bool {
    true
}

#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
pub struct UpdateProductInput {
    #[validate(length(min = 1, max = 200))]
    pub name: Option<String>,
    pub description: Option<String>,
    #[validate(length(min = 1, max = 100))]
    pub brand: Option<String>,
    #[schema(value_type = Option<String>)]
    pub price: Option<Decimal>,
    #[schema(value_type = Option<String>)]
    pub original_price: Option<Decimal>,
    #[validate(length(min = 1, max = 100))]
    pub category: Option<String>,
    pub image_urls: Option<Vec<String>>,
    /// Only valid for products without size rows.
    pub stock: Option<i32>,
    pub is_active: Option<bool>,
}
