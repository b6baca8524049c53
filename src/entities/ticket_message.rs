use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "ticket_messages")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub ticket_id: Uuid,
    pub sender: MessageSender,
    #[sea_orm(column_type = "Text")]
    pub body: String,
    /// Generation details for AI messages, e.g. `{"model": ..,
    /// "latency_ms": ..}`. Always empty for human senders.
    #[sea_orm(column_type = "Json", nullable)]
    pub ai_meta: Option<Json>,
    pub created_at: DateTimeUtc,
}

#[derive(
    Copy,
    Clone,
    Debug,
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
pub enum MessageSender {
    #[sea_orm(string_value = "user")]
    #[serde(rename = "user")]
    #[strum(serialize = "user")]
    User,
    /// A human support agent.
    #[sea_orm(string_value = "admin")]
    #[serde(rename = "admin")]
    #[strum(serialize = "admin")]
    Admin,
    /// The automatic first-reply generator.
    #[sea_orm(string_value = "ai")]
    #[serde(rename = "ai")]
    #[strum(serialize = "ai")]
    Ai,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::ticket::Entity",
        from = "Column::TicketId",
        to = "super::ticket::Column::Id",
        on_delete = "Cascade"
    )]
    Ticket,
}

impl Related<super::ticket::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Ticket.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
