//! Inventory ledger - Atomic stock changes on a single book row.
//!
//! Both operations are single conditional `UPDATE` statements, so concurrent callers are
//! serialized by the database instead of racing on a read-modify-write:
//! `UPDATE books SET inventory = inventory - 1 WHERE id = ? AND inventory > 0`
//!
//! Callers pass the transaction that also carries the borrowing mutation, so stock and
//! borrowings commit or roll back together.

use crate::{
    entities::{Book, book},
    errors::{Error, Result},
};
use sea_orm::{prelude::*, sea_query::Expr};
use tracing::debug;

/// Takes one copy of a book out of stock.
///
/// # Errors
/// [`Error::OutOfStock`] when no copy is available, [`Error::BookNotFound`] when the book
/// does not exist.
pub async fn decrement<C>(db: &C, book_id: i64) -> Result<book::Model>
where
    C: ConnectionTrait,
{
    let result = Book::update_many()
        .col_expr(
            book::Column::Inventory,
            Expr::col(book::Column::Inventory).sub(1),
        )
        .filter(book::Column::Id.eq(book_id))
        .filter(book::Column::Inventory.gt(0))
        .exec(db)
        .await?;

    if result.rows_affected == 0 {
        // Either the row is missing or its stock is exhausted
        return match Book::find_by_id(book_id).one(db).await? {
            Some(_) => Err(Error::OutOfStock { book_id }),
            None => Err(Error::BookNotFound { book_id }),
        };
    }

    debug!("Decremented inventory of book {}", book_id);
    find_book(db, book_id).await
}

/// Puts one copy of a book back into stock. No upper bound is enforced.
///
/// # Errors
/// [`Error::BookNotFound`] when the book does not exist.
pub async fn increment<C>(db: &C, book_id: i64) -> Result<book::Model>
where
    C: ConnectionTrait,
{
    let result = Book::update_many()
        .col_expr(
            book::Column::Inventory,
            Expr::col(book::Column::Inventory).add(1),
        )
        .filter(book::Column::Id.eq(book_id))
        .exec(db)
        .await?;

    if result.rows_affected == 0 {
        return Err(Error::BookNotFound { book_id });
    }

    debug!("Incremented inventory of book {}", book_id);
    find_book(db, book_id).await
}

async fn find_book<C>(db: &C, book_id: i64) -> Result<book::Model>
where
    C: ConnectionTrait,
{
    Book::find_by_id(book_id)
        .one(db)
        .await?
        .ok_or(Error::BookNotFound { book_id })
}
