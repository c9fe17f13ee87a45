//! Join relation between borrowings and the books they checked out.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Borrowing-to-book link
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "borrowing_books")]
pub struct Model {
    /// Owning borrowing
    #[sea_orm(primary_key, auto_increment = false)]
    pub borrowing_id: i64,
    /// Checked-out book
    #[sea_orm(primary_key, auto_increment = false)]
    pub book_id: i64,
}

/// Defines relationships between the link and both sides
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// Each link belongs to one borrowing
    #[sea_orm(
        belongs_to = "super::borrowing::Entity",
        from = "Column::BorrowingId",
        to = "super::borrowing::Column::Id",
        on_delete = "Cascade"
    )]
    Borrowing,
    /// Each link points at one book
    #[sea_orm(
        belongs_to = "super::book::Entity",
        from = "Column::BookId",
        to = "super::book::Column::Id",
        on_delete = "Cascade"
    )]
    Book,
}

impl Related<super::borrowing::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Borrowing.def()
    }
}

impl Related<super::book::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Book.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
