use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// A support conversation. Messages live in `ticket_messages`.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "tickets")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    /// Human-facing reference, e.g. "SH-1717920000000-4821".
    #[sea_orm(unique)]
    pub ticket_number: String,
    pub user_id: Uuid,
    pub subject: String,
    pub issue_type: IssueType,
    pub status: TicketStatus,
    pub priority: TicketPriority,
    /// Optional link to the order the ticket is about.
    #[sea_orm(nullable)]
    pub order_id: Option<Uuid>,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

/// What the ticket is about, chosen by the customer at filing time.
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
pub enum IssueType {
    #[sea_orm(string_value = "order")]
    #[serde(rename = "order")]
    #[strum(serialize = "order")]
    Order,
    #[sea_orm(string_value = "payment")]
    #[serde(rename = "payment")]
    #[strum(serialize = "payment")]
    Payment,
    #[sea_orm(string_value = "delivery")]
    #[serde(rename = "delivery")]
    #[strum(serialize = "delivery")]
    Delivery,
    #[sea_orm(string_value = "product")]
    #[serde(rename = "product")]
    #[strum(serialize = "product")]
    Product,
    #[default]
    #[sea_orm(string_value = "other")]
    #[serde(rename = "other")]
    #[strum(serialize = "other")]
    Other,
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
pub enum TicketStatus {
    #[default]
    #[sea_orm(string_value = "open")]
    #[serde(rename = "open")]
    #[strum(serialize = "open")]
    Open,
    /// Waiting on the customer after an agent reply.
    #[sea_orm(string_value = "pending")]
    #[serde(rename = "pending")]
    #[strum(serialize = "pending")]
    Pending,
    /// Marked done by an agent; a new customer message reopens it.
    #[sea_orm(string_value = "resolved")]
    #[serde(rename = "resolved")]
    #[strum(serialize = "resolved")]
    Resolved,
    #[sea_orm(string_value = "closed")]
    #[serde(rename = "closed")]
    #[strum(serialize = "closed")]
    Closed,
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
pub enum TicketPriority {
    #[sea_orm(string_value = "low")]
    #[serde(rename = "low")]
    #[strum(serialize = "low")]
    Low,
    #[default]
    #[sea_orm(string_value = "normal")]
    #[serde(rename = "normal")]
    #[strum(serialize = "normal")]
    Normal,
    #[sea_orm(string_value = "high")]
    #[serde(rename = "high")]
    #[strum(serialize = "high")]
    High,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::ticket_message::Entity")]
    TicketMessage,
}

impl Related<super::ticket_message::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::TicketMessage.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
