//! Database configuration module.
//!
//! This module handles the `SQLite` connection and table creation using `SeaORM`.
//! Tables are generated from the entity definitions with `Schema::create_table_from_entity`,
//! so the schema always matches the Rust structs. The composite uniqueness rules that the
//! entity macros cannot express (catalog natural key, one payment per borrowing and type)
//! are added as explicit unique indexes.

use crate::entities::{Book, BookColumn, Borrowing, BorrowingBook, Payment, PaymentColumn};
use crate::errors::Result;
use sea_orm::sea_query::Index;
use sea_orm::{ConnectionTrait, Database, DatabaseConnection, Schema};
use tracing::{debug, info};

const DEFAULT_DATABASE_URL: &str = "sqlite://data/library.sqlite?mode=rwc";

/// Gets the database URL from environment variable or returns default `SQLite` path.
#[must_use]
pub fn get_database_url() -> String {
    std::env::var("DATABASE_URL").unwrap_or_else(|_| DEFAULT_DATABASE_URL.to_string())
}

/// Establishes a connection to the database named by `DATABASE_URL`.
///
/// Falls back to a local `SQLite` file if no environment variable is set.
pub async fn create_connection() -> Result<DatabaseConnection> {
    let database_url = get_database_url();
    debug!("Connecting to database at {}", database_url);
    Database::connect(&database_url).await.map_err(Into::into)
}

/// Creates all tables and unique indexes if they do not exist yet.
///
/// Creation order follows the foreign keys: books and borrowings first, then the
/// join relation and payments.
pub async fn create_tables(db: &DatabaseConnection) -> Result<()> {
    let builder = db.get_database_backend();
    let schema = Schema::new(builder);

    let mut book_table = schema.create_table_from_entity(Book);
    let mut borrowing_table = schema.create_table_from_entity(Borrowing);
    let mut borrowing_book_table = schema.create_table_from_entity(BorrowingBook);
    let mut payment_table = schema.create_table_from_entity(Payment);

    for table in [
        &mut book_table,
        &mut borrowing_table,
        &mut borrowing_book_table,
        &mut payment_table,
    ] {
        table.if_not_exists();
        db.execute(builder.build(&*table)).await?;
    }

    let book_natural_key = Index::create()
        .name("idx_books_title_author_cover")
        .table(Book)
        .col(BookColumn::Title)
        .col(BookColumn::Author)
        .col(BookColumn::Cover)
        .unique()
        .if_not_exists()
        .to_owned();
    let payment_per_type = Index::create()
        .name("idx_payments_borrowing_type")
        .table(Payment)
        .col(PaymentColumn::BorrowingId)
        .col(PaymentColumn::PaymentType)
        .unique()
        .if_not_exists()
        .to_owned();

    db.execute(builder.build(&book_natural_key)).await?;
    db.execute(builder.build(&payment_per_type)).await?;

    info!("Database tables ensured (books, borrowings, borrowing_books, payments).");
    Ok(())
}
