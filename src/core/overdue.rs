//! Overdue scan - Reports every active borrowing to the notification sink.
//!
//! Meant to be triggered by an external scheduler once a day. A borrowing counts as
//! overdue from its expected return date onwards, so readers are reminded on the last day.

use crate::{
    core::{borrowing::get_books_for_borrowing, payment::book_titles},
    entities::{Borrowing, borrowing},
    errors::Result,
    library::Library,
};
use chrono::NaiveDate;
use sea_orm::{QueryOrder, prelude::*};
use tracing::{info, instrument, warn};

const NO_ACTIVE_BORROWINGS: &str = "No active borrowings today!";

/// One active borrowing as seen by the scan
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverdueEntry {
    /// The active borrowing
    pub borrowing: borrowing::Model,
    /// Comma-separated titles it holds
    pub titles: String,
    /// Whether its expected return date has been reached
    pub overdue: bool,
}

impl OverdueEntry {
    fn message(&self) -> String {
        let status = if self.overdue { "Overdue" } else { "Not overdue" };
        format!(
            "Overdue borrowing: {} by {}\nStatus: {}",
            self.titles, self.borrowing.user_id, status
        )
    }
}

/// Whether a borrowing due on `expected_return_date` is overdue on `today`.
#[must_use]
pub fn is_overdue(expected_return_date: NaiveDate, today: NaiveDate) -> bool {
    expected_return_date <= today
}

/// Lists all active borrowings, oldest due date first, and sends one notification per
/// borrowing (or a single "no active borrowings" message).
///
/// Notifications are awaited one by one; a failed send is logged and the scan goes on.
#[instrument(skip(library))]
pub async fn check_overdue_borrowings(library: &Library) -> Result<Vec<OverdueEntry>> {
    let db = &library.database;
    let today = library.today();

    let active = Borrowing::find()
        .filter(borrowing::Column::ActualReturnDate.is_null())
        .order_by_asc(borrowing::Column::ExpectedReturnDate)
        .order_by_asc(borrowing::Column::Id)
        .all(db)
        .await?;

    if active.is_empty() {
        let outcome = library.notifier.notify(NO_ACTIVE_BORROWINGS).await;
        if !outcome.success {
            warn!("Overdue scan notification dropped: {}", outcome.message);
        }
        info!("Overdue scan found no active borrowings");
        return Ok(Vec::new());
    }

    let mut entries = Vec::with_capacity(active.len());
    for borrowing in active {
        let books = get_books_for_borrowing(db, borrowing.id).await?;
        let entry = OverdueEntry {
            titles: book_titles(&books),
            overdue: is_overdue(borrowing.expected_return_date, today),
            borrowing,
        };

        let outcome = library.notifier.notify(&entry.message()).await;
        if !outcome.success {
            warn!(
                "Overdue notice for borrowing {} dropped: {}",
                entry.borrowing.id, outcome.message
            );
        }
        entries.push(entry);
    }

    let overdue = entries.iter().filter(|entry| entry.overdue).count();
    info!(
        "Overdue scan checked {} active borrowing(s), {} overdue",
        entries.len(),
        overdue
    );
    Ok(entries)
}
