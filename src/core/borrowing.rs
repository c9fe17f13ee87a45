//! Borrowing business logic - Checking books out and back in.
//!
//! Stock changes and borrowing mutations always share one database transaction: either a
//! borrowing is created together with a decrement for every book it holds, or nothing is
//! written. Returning a borrowing closes it and puts every copy back in the same way.
//!
//! Notifications and payment initiation happen after commit. Neither can undo the
//! borrowing: a failed notification is only logged, and a failed payment initiation is
//! reported in the receipt so the caller can retry it through
//! [`crate::core::payment::initiate_rental_payment`].

use crate::{
    core::{
        inventory,
        payment::{self, CheckoutHandle, book_titles},
    },
    entities::{Book, Borrowing, BorrowingBook, book, borrowing, borrowing_book},
    errors::{Error, Result},
    library::Library,
    services::notifier::notify_detached,
};
use chrono::NaiveDate;
use sea_orm::{QueryOrder, Set, TransactionTrait, prelude::*, sea_query::Expr};
use std::collections::HashSet;
use tracing::{info, instrument, warn};

/// Outcome of a successful checkout
#[derive(Debug)]
pub struct BorrowingReceipt {
    /// The created borrowing
    pub borrowing: borrowing::Model,
    /// Checked-out books with their inventory after the decrement
    pub books: Vec<book::Model>,
    /// Rental-fee checkout, or why it could not be opened
    pub checkout: Result<CheckoutHandle>,
}

/// Outcome of a successful return
#[derive(Debug)]
pub struct ReturnReceipt {
    /// The closed borrowing
    pub borrowing: borrowing::Model,
    /// Fine checkout for a late return, `None` when returned on time
    pub fine: Option<Result<CheckoutHandle>>,
}

/// Finds a borrowing by its unique ID.
pub async fn get_borrowing_by_id(
    db: &DatabaseConnection,
    borrowing_id: i64,
) -> Result<Option<borrowing::Model>> {
    Borrowing::find_by_id(borrowing_id)
        .one(db)
        .await
        .map_err(Into::into)
}

/// Retrieves the books a borrowing holds, ordered by title.
pub async fn get_books_for_borrowing<C>(db: &C, borrowing_id: i64) -> Result<Vec<book::Model>>
where
    C: ConnectionTrait,
{
    Book::find()
        .inner_join(BorrowingBook)
        .filter(borrowing_book::Column::BorrowingId.eq(borrowing_id))
        .order_by_asc(book::Column::Title)
        .all(db)
        .await
        .map_err(Into::into)
}

/// Retrieves borrowings, newest first, optionally filtered by owner and by whether they
/// are still active.
pub async fn list_borrowings(
    db: &DatabaseConnection,
    user_id: Option<&str>,
    is_active: Option<bool>,
) -> Result<Vec<borrowing::Model>> {
    let mut query = Borrowing::find().order_by_desc(borrowing::Column::Id);
    if let Some(user_id) = user_id {
        query = query.filter(borrowing::Column::UserId.eq(user_id));
    }
    query = match is_active {
        Some(true) => query.filter(borrowing::Column::ActualReturnDate.is_null()),
        Some(false) => query.filter(borrowing::Column::ActualReturnDate.is_not_null()),
        None => query,
    };
    query.all(db).await.map_err(Into::into)
}

fn validate_request(
    user_id: &str,
    expected_return_date: NaiveDate,
    book_ids: &[i64],
    today: NaiveDate,
) -> Result<()> {
    if expected_return_date < today {
        return Err(Error::InvalidDateRange {
            expected_return_date,
            today,
        });
    }
    if user_id.trim().is_empty() {
        return Err(Error::validation("A borrowing needs an owner"));
    }
    if book_ids.is_empty() {
        return Err(Error::validation("A borrowing needs at least one book"));
    }
    let mut seen = HashSet::with_capacity(book_ids.len());
    if let Some(repeated) = book_ids.iter().find(|id| !seen.insert(**id)) {
        return Err(Error::validation(format!(
            "Book {repeated} is listed more than once"
        )));
    }
    Ok(())
}

/// Checks out `book_ids` to `user_id` until `expected_return_date`.
///
/// Every book loses one copy of stock in the same transaction that creates the
/// borrowing. If any book is out of stock the whole request fails with
/// [`Error::OutOfStock`] and no decrement survives. After commit, a "borrowing created"
/// notification is sent in the background and the rental-fee checkout is opened.
///
/// # Errors
/// [`Error::InvalidDateRange`] when `expected_return_date` is before today,
/// [`Error::Validation`] for an empty or repeated book list, [`Error::OutOfStock`] and
/// [`Error::BookNotFound`] from the inventory ledger.
#[instrument(skip(library))]
pub async fn create_borrowing(
    library: &Library,
    user_id: &str,
    expected_return_date: NaiveDate,
    book_ids: &[i64],
) -> Result<BorrowingReceipt> {
    let today = library.today();
    validate_request(user_id, expected_return_date, book_ids, today)?;

    let txn = library.database.begin().await?;

    let mut books = Vec::with_capacity(book_ids.len());
    for &book_id in book_ids {
        // An error here drops `txn`, rolling back earlier decrements
        books.push(inventory::decrement(&txn, book_id).await?);
    }

    let borrowing = borrowing::ActiveModel {
        borrow_date: Set(today),
        expected_return_date: Set(expected_return_date),
        actual_return_date: Set(None),
        user_id: Set(user_id.trim().to_string()),
        ..Default::default()
    }
    .insert(&txn)
    .await?;

    let links = books.iter().map(|book| borrowing_book::ActiveModel {
        borrowing_id: Set(borrowing.id),
        book_id: Set(book.id),
    });
    BorrowingBook::insert_many(links)
        .exec_without_returning(&txn)
        .await?;

    txn.commit().await?;
    info!(
        "Borrowing {} created for {} with {} book(s)",
        borrowing.id,
        borrowing.user_id,
        books.len()
    );

    notify_detached(
        &library.notifier,
        format!(
            "New borrowing created:\nUser: {}\nBooks: {}\nBorrow Date: {}\nExpected Return Date: {}",
            borrowing.user_id,
            book_titles(&books),
            borrowing.borrow_date,
            borrowing.expected_return_date
        ),
    );

    let checkout = payment::initiate_rental_payment(library, borrowing.id).await;
    if let Err(e) = &checkout {
        warn!(
            "Borrowing {} stands without a rental payment: {}",
            borrowing.id, e
        );
    }

    Ok(BorrowingReceipt {
        borrowing,
        books,
        checkout,
    })
}

/// Closes a borrowing on `actual_return_date` and puts its books back in stock.
///
/// When the return is later than the expected return date, the fine checkout is opened
/// after commit.
///
/// # Errors
/// [`Error::BorrowingNotFound`], [`Error::AlreadyReturned`] for a closed borrowing,
/// [`Error::FutureReturnDate`] when `actual_return_date` is after today and
/// [`Error::Validation`] when it is before the borrow date.
#[instrument(skip(library))]
pub async fn return_borrowing(
    library: &Library,
    borrowing_id: i64,
    actual_return_date: NaiveDate,
) -> Result<ReturnReceipt> {
    let db = &library.database;

    let existing = get_borrowing_by_id(db, borrowing_id)
        .await?
        .ok_or(Error::BorrowingNotFound { borrowing_id })?;
    if !existing.is_active() {
        return Err(Error::AlreadyReturned { borrowing_id });
    }

    let today = library.today();
    if actual_return_date > today {
        return Err(Error::FutureReturnDate {
            actual_return_date,
            today,
        });
    }
    if actual_return_date < existing.borrow_date {
        return Err(Error::validation(format!(
            "Return date {actual_return_date} is before the borrow date {}",
            existing.borrow_date
        )));
    }

    let txn = db.begin().await?;

    // Only an active row is closed, so a concurrent second return cannot increment twice
    let closed = Borrowing::update_many()
        .col_expr(
            borrowing::Column::ActualReturnDate,
            Expr::value(actual_return_date),
        )
        .filter(borrowing::Column::Id.eq(borrowing_id))
        .filter(borrowing::Column::ActualReturnDate.is_null())
        .exec(&txn)
        .await?;
    if closed.rows_affected == 0 {
        return Err(Error::AlreadyReturned { borrowing_id });
    }

    let links = BorrowingBook::find()
        .filter(borrowing_book::Column::BorrowingId.eq(borrowing_id))
        .all(&txn)
        .await?;
    for link in &links {
        inventory::increment(&txn, link.book_id).await?;
    }

    txn.commit().await?;

    let borrowing = borrowing::Model {
        actual_return_date: Some(actual_return_date),
        ..existing
    };
    info!(
        "Borrowing {} returned on {} ({} book(s) back in stock)",
        borrowing_id,
        actual_return_date,
        links.len()
    );

    let fine = if actual_return_date > borrowing.expected_return_date {
        let fine = payment::initiate_fine_payment(library, borrowing_id).await;
        if let Err(e) = &fine {
            warn!("Late return {} has no fine payment yet: {}", borrowing_id, e);
        }
        Some(fine)
    } else {
        None
    };

    Ok(ReturnReceipt { borrowing, fine })
}
