//! Catalog business logic - Book records and inventory-safe upserts.
//!
//! A (title, author, cover) triple names at most one catalog row. Acquiring another copy
//! of an existing triple adds to that row's inventory; whether a colliding write merges
//! or is refused is decided by [`DuplicatePolicy`].

use crate::{
    config::DuplicatePolicy,
    core::fees,
    entities::{Book, Borrowing, BorrowingBook, Cover, book, borrowing, borrowing_book},
    errors::{Error, Result},
};
use rust_decimal::Decimal;
use sea_orm::{
    DatabaseTransaction, PaginatorTrait, QueryOrder, Set, SqlErr, TransactionTrait,
    prelude::*,
    sea_query::{Expr, OnConflict},
};
use tracing::{info, instrument};

/// Copies added when a catalog write does not say how many
pub const DEFAULT_INVENTORY: i32 = 1;

/// Incoming catalog write
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookInput {
    /// Title of the book
    pub title: String,
    /// Author of the book
    pub author: String,
    /// Binding
    pub cover: Cover,
    /// Copies acquired (upsert) or the new stock level (update)
    pub inventory: Option<i32>,
    /// Rental price per day, positive with at most two decimal places
    pub daily_fee: Decimal,
}

struct ValidBook {
    title: String,
    author: String,
    cover: Cover,
    daily_fee_cents: i64,
}

fn validate(input: &BookInput) -> Result<ValidBook> {
    let title = input.title.trim();
    if title.is_empty() {
        return Err(Error::validation("Book title cannot be empty"));
    }
    let author = input.author.trim();
    if author.is_empty() {
        return Err(Error::validation("Book author cannot be empty"));
    }
    if input.daily_fee <= Decimal::ZERO {
        return Err(Error::validation(format!(
            "Daily fee must be positive, got {}",
            input.daily_fee
        )));
    }
    let daily_fee_cents = fees::to_minor_units(input.daily_fee)?;

    Ok(ValidBook {
        title: title.to_string(),
        author: author.to_string(),
        cover: input.cover,
        daily_fee_cents,
    })
}

fn duplicate_error(title: &str, author: &str, cover: Cover) -> Error {
    Error::validation(format!(
        "A {cover:?} copy of '{title}' by {author} is already in the catalog"
    ))
}

/// Finds a book by its unique ID.
pub async fn get_book_by_id(db: &DatabaseConnection, book_id: i64) -> Result<Option<book::Model>> {
    Book::find_by_id(book_id).one(db).await.map_err(Into::into)
}

/// Finds the catalog row holding a (title, author, cover) triple.
pub async fn get_book_by_natural_key<C>(
    db: &C,
    title: &str,
    author: &str,
    cover: Cover,
) -> Result<Option<book::Model>>
where
    C: ConnectionTrait,
{
    Book::find()
        .filter(book::Column::Title.eq(title))
        .filter(book::Column::Author.eq(author))
        .filter(book::Column::Cover.eq(cover))
        .one(db)
        .await
        .map_err(Into::into)
}

/// Retrieves the whole catalog ordered by title.
pub async fn list_books(db: &DatabaseConnection) -> Result<Vec<book::Model>> {
    Book::find()
        .order_by_asc(book::Column::Title)
        .order_by_asc(book::Column::Author)
        .all(db)
        .await
        .map_err(Into::into)
}

/// Atomically adds `delta` copies to a row, refusing to go below zero.
async fn add_inventory(txn: &DatabaseTransaction, book_id: i64, delta: i32) -> Result<book::Model> {
    let mut update = Book::update_many()
        .col_expr(
            book::Column::Inventory,
            Expr::col(book::Column::Inventory).add(delta),
        )
        .filter(book::Column::Id.eq(book_id));
    if delta < 0 {
        update = update.filter(book::Column::Inventory.gte(-delta));
    }

    if update.exec(txn).await?.rows_affected == 0 {
        return Err(Error::validation(format!(
            "Inventory of book {book_id} cannot become negative"
        )));
    }

    Book::find_by_id(book_id)
        .one(txn)
        .await?
        .ok_or(Error::BookNotFound { book_id })
}

fn map_insert_error(err: DbErr, valid: &ValidBook) -> Error {
    match err.sql_err() {
        Some(SqlErr::UniqueConstraintViolation(_)) => {
            duplicate_error(&valid.title, &valid.author, valid.cover)
        }
        _ => Error::Database(err),
    }
}

/// Inserts the triple or adds `delta` to the row already holding it, in one statement, so
/// concurrent first acquisitions of the same triple all land on a single row.
async fn stock_acquisition(
    db: &DatabaseConnection,
    valid: &ValidBook,
    delta: i32,
) -> Result<book::Model> {
    let row = book::ActiveModel {
        title: Set(valid.title.clone()),
        author: Set(valid.author.clone()),
        cover: Set(valid.cover),
        inventory: Set(delta),
        daily_fee_cents: Set(valid.daily_fee_cents),
        ..Default::default()
    };
    Book::insert(row)
        .on_conflict(
            OnConflict::columns([book::Column::Title, book::Column::Author, book::Column::Cover])
                .value(
                    book::Column::Inventory,
                    Expr::col((Book, book::Column::Inventory)).add(delta),
                )
                .to_owned(),
        )
        .exec_without_returning(db)
        .await?;

    let book = get_book_by_natural_key(db, &valid.title, &valid.author, valid.cover)
        .await?
        .ok_or_else(|| DbErr::RecordNotFound(format!("book '{}' after stocking", valid.title)))?;
    info!(
        "Stocked {} copies of book {} (inventory now {})",
        delta, book.id, book.inventory
    );
    Ok(book)
}

/// Adds copies of a book to the catalog.
///
/// If the (title, author, cover) triple already exists, the `Merge` policy adds the
/// incoming inventory to that row and keeps its daily fee; the `Reject` policy fails with
/// [`Error::Validation`]. Otherwise a new row is created with the given inventory
/// (default 1) and fee.
#[instrument(skip(db, input), fields(title = %input.title))]
pub async fn upsert_book(
    db: &DatabaseConnection,
    input: BookInput,
    policy: DuplicatePolicy,
) -> Result<book::Model> {
    let valid = validate(&input)?;
    let delta = input.inventory.unwrap_or(DEFAULT_INVENTORY);

    if policy == DuplicatePolicy::Merge && delta >= 0 {
        return stock_acquisition(db, &valid, delta).await;
    }

    let txn = db.begin().await?;

    let existing =
        get_book_by_natural_key(&txn, &valid.title, &valid.author, valid.cover).await?;

    let book = match (existing, policy) {
        (Some(_), DuplicatePolicy::Reject) => {
            return Err(duplicate_error(&valid.title, &valid.author, valid.cover));
        }
        (Some(existing), DuplicatePolicy::Merge) => {
            let merged = add_inventory(&txn, existing.id, delta).await?;
            info!(
                "Merged {} copies into book {} (inventory now {})",
                delta, merged.id, merged.inventory
            );
            merged
        }
        (None, _) => {
            if delta < 0 {
                return Err(Error::validation(format!(
                    "Inventory cannot be negative, got {delta}"
                )));
            }
            let created = book::ActiveModel {
                title: Set(valid.title.clone()),
                author: Set(valid.author.clone()),
                cover: Set(valid.cover),
                inventory: Set(delta),
                daily_fee_cents: Set(valid.daily_fee_cents),
                ..Default::default()
            }
            .insert(&txn)
            .await
            .map_err(|e| map_insert_error(e, &valid))?;
            info!("Added book {} to the catalog", created.id);
            created
        }
    };

    txn.commit().await?;
    Ok(book)
}

/// Whether any not-yet-returned borrowing holds this book.
pub async fn has_active_borrowings<C>(db: &C, book_id: i64) -> Result<bool>
where
    C: ConnectionTrait,
{
    let count = Borrowing::find()
        .inner_join(BorrowingBook)
        .filter(borrowing_book::Column::BookId.eq(book_id))
        .filter(borrowing::Column::ActualReturnDate.is_null())
        .count(db)
        .await?;
    Ok(count > 0)
}

/// Moves the join rows of returned borrowings from `from_book` to `to_book`, so their
/// book lists survive a merge. A borrowing that already lists `to_book` keeps that row.
async fn repoint_links(txn: &DatabaseTransaction, from_book: i64, to_book: i64) -> Result<()> {
    let already_linked: Vec<i64> = BorrowingBook::find()
        .filter(borrowing_book::Column::BookId.eq(to_book))
        .all(txn)
        .await?
        .into_iter()
        .map(|link| link.borrowing_id)
        .collect();
    if !already_linked.is_empty() {
        BorrowingBook::delete_many()
            .filter(borrowing_book::Column::BookId.eq(from_book))
            .filter(borrowing_book::Column::BorrowingId.is_in(already_linked))
            .exec(txn)
            .await?;
    }

    BorrowingBook::update_many()
        .col_expr(borrowing_book::Column::BookId, Expr::value(to_book))
        .filter(borrowing_book::Column::BookId.eq(from_book))
        .exec(txn)
        .await?;
    Ok(())
}

/// Edits a catalog row.
///
/// `input.inventory` is the new stock level (unchanged when `None`). When the edit moves
/// the row onto a triple already held by a different row, the `Merge` policy folds the
/// edited row's inventory into that row and deletes the edited row, returning the
/// surviving row; the `Reject` policy fails with [`Error::Validation`]. A row that active
/// borrowings still hold is never merged away; returned borrowings that listed it list the
/// surviving row instead.
#[instrument(skip(db, input), fields(title = %input.title))]
pub async fn update_book(
    db: &DatabaseConnection,
    book_id: i64,
    input: BookInput,
    policy: DuplicatePolicy,
) -> Result<book::Model> {
    let valid = validate(&input)?;

    let txn = db.begin().await?;

    let edited = Book::find_by_id(book_id)
        .one(&txn)
        .await?
        .ok_or(Error::BookNotFound { book_id })?;

    let inventory = input.inventory.unwrap_or(edited.inventory);
    if inventory < 0 {
        return Err(Error::validation(format!(
            "Inventory cannot be negative, got {inventory}"
        )));
    }

    let colliding = Book::find()
        .filter(book::Column::Title.eq(valid.title.as_str()))
        .filter(book::Column::Author.eq(valid.author.as_str()))
        .filter(book::Column::Cover.eq(valid.cover))
        .filter(book::Column::Id.ne(book_id))
        .one(&txn)
        .await?;

    let book = match (colliding, policy) {
        (Some(_), DuplicatePolicy::Reject) => {
            return Err(duplicate_error(&valid.title, &valid.author, valid.cover));
        }
        (Some(target), DuplicatePolicy::Merge) => {
            if has_active_borrowings(&txn, edited.id).await? {
                return Err(Error::validation(format!(
                    "Book {book_id} is held by active borrowings and cannot be merged into book {}",
                    target.id
                )));
            }
            let merged = add_inventory(&txn, target.id, inventory).await?;
            repoint_links(&txn, edited.id, target.id).await?;
            Book::delete_by_id(edited.id).exec(&txn).await?;
            info!("Merged book {} into book {}", book_id, merged.id);
            merged
        }
        (None, _) => {
            let mut active: book::ActiveModel = edited.into();
            active.title = Set(valid.title);
            active.author = Set(valid.author);
            active.cover = Set(valid.cover);
            active.inventory = Set(inventory);
            active.daily_fee_cents = Set(valid.daily_fee_cents);
            active.update(&txn).await?
        }
    };

    txn.commit().await?;
    Ok(book)
}
