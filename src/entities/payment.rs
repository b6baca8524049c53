use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// A payment intent against the gateway. State moves strictly
/// CREATED -> PAID -> REFUNDED, with CREATED -> FAILED as the only branch;
/// updates are guarded on the current state so webhook retries and
/// verify/webhook races stay idempotent.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "payments")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub order_id: Uuid,
    pub user_id: Uuid,
    /// Gateway-side order reference ("order_..." for Razorpay).
    #[sea_orm(unique)]
    pub gateway_order_id: String,
    #[sea_orm(nullable)]
    pub gateway_payment_id: Option<String>,
    /// Checkout signature kept from a successful client-side verify;
    /// webhook captures leave it empty.
    #[sea_orm(nullable)]
    pub gateway_signature: Option<String>,
    #[sea_orm(column_type = "Decimal(Some((12, 2)))")]
    pub amount: Decimal,
    pub currency: String,
    pub state: PaymentState,
    #[sea_orm(nullable)]
    pub gateway_refund_id: Option<String>,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

#[derive(
    Copy,
    Clone,
    Debug,
    Default,
    PartialEq,
    Eq,
    EnumIter,
    DeriveActiveEnum,
    Serialize,
    Deserialize,
    strum::Display,
    utoipa::ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
pub enum PaymentState {
    #[default]
    #[sea_orm(string_value = "CREATED")]
    #[serde(rename = "CREATED")]
    #[strum(serialize = "CREATED")]
    Created,
    #[sea_orm(string_value = "PAID")]
    #[serde(rename = "PAID")]
    #[strum(serialize = "PAID")]
    Paid,
    #[sea_orm(string_value = "FAILED")]
    #[serde(rename = "FAILED")]
    #[strum(serialize = "FAILED")]
    Failed,
    #[sea_orm(string_value = "REFUNDED")]
    #[serde(rename = "REFUNDED")]
    #[strum(serialize = "REFUNDED")]
    Refunded,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::order::Entity",
        from = "Column::OrderId",
        to = "super::order::Column::Id"
    )]
    Order,
}

impl Related<super::order::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Order.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
