//! Book entity - A catalog entry with rentable inventory.
//!
//! The natural key is (`title`, `author`, `cover`): acquiring another copy of an existing
//! entry raises its `inventory` instead of adding a row.

use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Binding of a physical copy
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(4))")]
#[serde(rename_all = "UPPERCASE")]
pub enum Cover {
    /// Hardcover
    #[sea_orm(string_value = "HARD")]
    Hard,
    /// Softcover
    #[sea_orm(string_value = "SOFT")]
    Soft,
}

/// Book database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "books")]
pub struct Model {
    /// Unique identifier for the book
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Title of the book
    pub title: String,
    /// Author of the book
    pub author: String,
    /// Binding
    pub cover: Cover,
    /// Copies currently available to borrow, never negative
    pub inventory: i32,
    /// Rental price per day in minor currency units (cents)
    pub daily_fee_cents: i64,
}

impl Model {
    /// Rental price per day as a 2-place major-unit amount.
    #[must_use]
    pub fn daily_fee(&self) -> Decimal {
        Decimal::new(self.daily_fee_cents, 2)
    }
}

/// Defines relationships between Book and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// One book appears in many borrowing links
    #[sea_orm(has_many = "super::borrowing_book::Entity")]
    BorrowingBooks,
}

impl Related<super::borrowing_book::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::BorrowingBooks.def()
    }
}

impl Related<super::borrowing::Entity> for Entity {
    fn to() -> RelationDef {
        super::borrowing_book::Relation::Borrowing.def()
    }

    fn via() -> Option<RelationDef> {
        Some(super::borrowing_book::Relation::Book.def().rev())
    }
}

impl ActiveModelBehavior for ActiveModel {}
