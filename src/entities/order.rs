use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// A placed order. Item and address details are snapshotted at checkout so
/// later catalog or address-book edits never rewrite history.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "orders")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    /// Human-facing order reference, e.g. "ORD-1717920000000-A7K2".
    #[sea_orm(unique)]
    pub order_number: String,
    pub user_id: Uuid,
    pub status: OrderStatus,
    pub payment_method: PaymentMethod,
    pub payment_status: OrderPaymentStatus,
    #[sea_orm(column_type = "Decimal(Some((12, 2)))")]
    pub subtotal: Decimal,
    #[sea_orm(column_type = "Decimal(Some((12, 2)))")]
    pub shipping_fee: Decimal,
    /// Wallet credit consumed by this order; restored on cancellation.
    #[sea_orm(column_type = "Decimal(Some((12, 2)))")]
    pub wallet_applied: Decimal,
    /// subtotal + shipping_fee - wallet_applied.
    #[sea_orm(column_type = "Decimal(Some((12, 2)))")]
    pub total_amount: Decimal,
    /// Amount credited back when the order is refunded or a paid order is
    /// cancelled.
    #[sea_orm(column_type = "Decimal(Some((12, 2)))", nullable)]
    pub refund_amount: Option<Decimal>,
    /// Customer's stated reason when requesting a return.
    #[sea_orm(nullable)]
    pub return_reason: Option<String>,
    /// Free-text note from the back office, e.g. on refund approval.
    #[sea_orm(nullable)]
    pub admin_note: Option<String>,
    pub ship_name: String,
    pub ship_phone: String,
    pub ship_line1: String,
    #[sea_orm(nullable)]
    pub ship_line2: Option<String>,
    pub ship_city: String,
    pub ship_state: String,
    pub ship_pincode: String,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

/// Fulfilment state. Transitions are linear apart from the two exits:
/// a customer may cancel while `Pending`, and a delivered order may go
/// through the refund pair.
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
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(32))")]
pub enum OrderStatus {
    #[default]
    #[sea_orm(string_value = "Pending")]
    Pending,
    #[sea_orm(string_value = "Packed")]
    Packed,
    #[sea_orm(string_value = "Shipped")]
    Shipped,
    #[sea_orm(string_value = "Out for Delivery")]
    #[serde(rename = "Out for Delivery")]
    #[strum(serialize = "Out for Delivery")]
    OutForDelivery,
    #[sea_orm(string_value = "Delivered")]
    Delivered,
    #[sea_orm(string_value = "Cancelled")]
    Cancelled,
    #[sea_orm(string_value = "Refund Requested")]
    #[serde(rename = "Refund Requested")]
    #[strum(serialize = "Refund Requested")]
    RefundRequested,
    #[sea_orm(string_value = "Refunded")]
    Refunded,
}

impl OrderStatus {
    /// Whether `self -> to` is a legal step of the lifecycle.
    pub fn can_transition(self, to: OrderStatus) -> bool {
        use OrderStatus::*;
        matches!(
            (self, to),
            (Pending, Packed)
                | (Pending, Cancelled)
                | (Packed, Shipped)
                | (Shipped, OutForDelivery)
                | (OutForDelivery, Delivered)
                | (Delivered, RefundRequested)
                | (RefundRequested, Refunded)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, OrderStatus::Cancelled | OrderStatus::Refunded)
    }

    /// Only pending orders may be cancelled by the customer.
    pub fn customer_cancellable(self) -> bool {
        matches!(self, OrderStatus::Pending)
    }
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
pub enum PaymentMethod {
    #[sea_orm(string_value = "COD")]
    #[serde(rename = "COD")]
    #[strum(serialize = "COD")]
    Cod,
    #[sea_orm(string_value = "UPI")]
    #[serde(rename = "UPI")]
    #[strum(serialize = "UPI")]
    Upi,
    #[sea_orm(string_value = "CARD")]
    #[serde(rename = "CARD")]
    #[strum(serialize = "CARD")]
    Card,
    #[sea_orm(string_value = "NETBANKING")]
    #[serde(rename = "NETBANKING")]
    #[strum(serialize = "NETBANKING")]
    Netbanking,
}

impl PaymentMethod {
    /// Everything except cash on delivery settles through the gateway
    /// before fulfilment.
    pub fn is_prepaid(self) -> bool {
        !matches!(self, PaymentMethod::Cod)
    }
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
pub enum OrderPaymentStatus {
    #[default]
    #[sea_orm(string_value = "Pending")]
    Pending,
    #[sea_orm(string_value = "Paid")]
    Paid,
    /// Set by the gateway webhook when an attempt fails; a later
    /// successful attempt moves it to `Paid`.
    #[sea_orm(string_value = "Failed")]
    Failed,
    #[sea_orm(string_value = "Refunded")]
    Refunded,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::order_item::Entity")]
    OrderItem,
    #[sea_orm(has_many = "super::order_status_history::Entity")]
    OrderStatusHistory,
    #[sea_orm(has_many = "super::payment::Entity")]
    Payment,
}

impl Related<super::order_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::OrderItem.def()
    }
}

impl Related<super::order_status_history::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::OrderStatusHistory.def()
    }
}

impl Related<super::payment::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Payment.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

#[cfg(test)]
mod tests {
    use super::OrderStatus::*;

    #[test]
    fn lifecycle_moves_forward() {
        assert!(Pending.can_transition(Packed));
        assert!(Packed.can_transition(Shipped));
        assert!(Shipped.can_transition(OutForDelivery));
        assert!(OutForDelivery.can_transition(Delivered));
        assert!(Delivered.can_transition(RefundRequested));
        assert!(RefundRequested.can_transition(Refunded));
    }

    #[test]
    fn no_skipping_or_rewinding() {
        assert!(!Pending.can_transition(Shipped));
        assert!(!Pending.can_transition(Delivered));
        assert!(!Shipped.can_transition(Packed));
        assert!(!Delivered.can_transition(Pending));
        assert!(!Packed.can_transition(Cancelled));
        assert!(!Shipped.can_transition(Cancelled));
    }

    #[test]
    fn terminal_states_are_dead_ends() {
        for to in [
            Pending,
            Packed,
            Shipped,
            OutForDelivery,
            Delivered,
            Cancelled,
            RefundRequested,
            Refunded,
        ] {
            assert!(!Cancelled.can_transition(to));
            assert!(!Refunded.can_transition(to));
        }
        assert!(Cancelled.is_terminal());
        assert!(Refunded.is_terminal());
        assert!(!Delivered.is_terminal());
    }

    #[test]
    fn display_matches_storefront_labels() {
        assert_eq!(OutForDelivery.to_string(), "Out for Delivery");
        assert_eq!(RefundRequested.to_string(), "Refund Requested");
        assert_eq!(Pending.to_string(), "Pending");
    }

    #[test]
    fn only_cod_is_not_prepaid() {
        use super::PaymentMethod;
        assert!(!PaymentMethod::Cod.is_prepaid());
        assert!(PaymentMethod::Upi.is_prepaid());
        assert!(PaymentMethod::Card.is_prepaid());
        assert!(PaymentMethod::Netbanking.is_prepaid());
    }
}
