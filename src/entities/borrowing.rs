//! Borrowing entity - One or more books checked out by a user for a bounded period.
//!
//! A borrowing is active while `actual_return_date` is `None`. Setting it is the only
//! mutation a borrowing ever sees.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Borrowing database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "borrowings")]
pub struct Model {
    /// Unique identifier for the borrowing
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Day the books were checked out
    pub borrow_date: Date,
    /// Day the books are due back, never before `borrow_date`
    pub expected_return_date: Date,
    /// Day the books came back, `None` while active
    pub actual_return_date: Option<Date>,
    /// Owner of the borrowing
    pub user_id: String,
}

impl Model {
    /// Whether the books are still checked out.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        self.actual_return_date.is_none()
    }
}

/// Defines relationships between Borrowing and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// One borrowing links many books
    #[sea_orm(has_many = "super::borrowing_book::Entity")]
    BorrowingBooks,
    /// One borrowing owns at most one payment per type
    #[sea_orm(has_many = "super::payment::Entity")]
    Payments,
}

impl Related<super::borrowing_book::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::BorrowingBooks.def()
    }
}

impl Related<super::payment::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Payments.def()
    }
}

impl Related<super::book::Entity> for Entity {
    fn to() -> RelationDef {
        super::borrowing_book::Relation::Book.def()
    }

    fn via() -> Option<RelationDef> {
        Some(super::borrowing_book::Relation::Borrowing.def().rev())
    }
}

impl ActiveModelBehavior for ActiveModel {}
