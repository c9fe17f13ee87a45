//! Payment entity - A checkout session recorded against a borrowing.
//!
//! At most one payment exists per (`borrowing_id`, `payment_type`). A payment is created
//! `PENDING` and moves once to `PAID` or `CANCELED` when the gateway reports back.

use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Settlement state of a payment
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(8))")]
#[serde(rename_all = "UPPERCASE")]
pub enum PaymentStatus {
    /// Checkout session opened, outcome unknown
    #[sea_orm(string_value = "PENDING")]
    Pending,
    /// Gateway reported success
    #[sea_orm(string_value = "PAID")]
    Paid,
    /// Gateway reported cancellation or failure
    #[sea_orm(string_value = "CANCELED")]
    Canceled,
}

/// What the payment is charging for
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(8))")]
#[serde(rename_all = "UPPERCASE")]
pub enum PaymentType {
    /// Rental fee charged when borrowing
    #[sea_orm(string_value = "PAYMENT")]
    Payment,
    /// Overdue fine charged on a late return
    #[sea_orm(string_value = "FINE")]
    Fine,
}

impl PaymentType {
    /// Upper-case wire name used in callback URLs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Payment => "PAYMENT",
            Self::Fine => "FINE",
        }
    }
}

impl fmt::Display for PaymentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payment database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "payments")]
pub struct Model {
    /// Unique identifier for the payment
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Settlement state
    pub status: PaymentStatus,
    /// Rental fee or fine
    pub payment_type: PaymentType,
    /// Owning borrowing
    pub borrowing_id: i64,
    /// Hosted checkout page the user is redirected to
    pub session_url: String,
    /// Gateway correlation id
    pub session_id: String,
    /// Amount charged in minor currency units (cents)
    pub money_to_pay_cents: i64,
}

impl Model {
    /// Amount charged as a 2-place major-unit amount.
    #[must_use]
    pub fn money_to_pay(&self) -> Decimal {
        Decimal::new(self.money_to_pay_cents, 2)
    }
}

/// Defines relationships between Payment and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// Each payment belongs to one borrowing
    #[sea_orm(
        belongs_to = "super::borrowing::Entity",
        from = "Column::BorrowingId",
        to = "super::borrowing::Column::Id"
    )]
    Borrowing,
}

impl Related<super::borrowing::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Borrowing.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
