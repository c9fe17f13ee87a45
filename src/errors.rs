//! Unified error types for the library service.
//!
//! Business-rule failures carry the identifiers needed to report them to the end user.
//! Storage and payment-provider failures wrap their source errors.

use crate::entities::payment::PaymentType;
use chrono::NaiveDate;
use thiserror::Error;

/// Every failure a core operation can surface to its caller.
#[derive(Debug, Error)]
pub enum Error {
    /// Bad input shape or range (empty title, negative inventory, duplicate catalog row, ...)
    #[error("Validation error: {message}")]
    Validation {
        /// Human-readable description of the rejected input
        message: String,
    },

    /// Expected return date lies before the borrow date
    #[error("The expected return date {expected_return_date} cannot be earlier than {today}")]
    InvalidDateRange {
        /// Requested expected return date
        expected_return_date: NaiveDate,
        /// Date the borrowing would start on
        today: NaiveDate,
    },

    /// No copy of the book is available to borrow
    #[error("Book {book_id} is out of stock")]
    OutOfStock {
        /// Exhausted book
        book_id: i64,
    },

    /// The borrowing has already been closed
    #[error("Borrowing {borrowing_id} has already been returned")]
    AlreadyReturned {
        /// Terminal borrowing
        borrowing_id: i64,
    },

    /// The reported return date lies in the future
    #[error("The actual return date {actual_return_date} cannot be after {today}")]
    FutureReturnDate {
        /// Reported return date
        actual_return_date: NaiveDate,
        /// Current date according to the clock
        today: NaiveDate,
    },

    /// A payment of this type already exists for the borrowing
    #[error("A {payment_type} payment already exists for borrowing {borrowing_id}")]
    DuplicatePayment {
        /// Owning borrowing
        borrowing_id: i64,
        /// Payment type that is already recorded
        payment_type: PaymentType,
    },

    /// No payment of this type exists for the borrowing
    #[error("No {payment_type} payment found for borrowing {borrowing_id}")]
    PaymentNotFound {
        /// Owning borrowing
        borrowing_id: i64,
        /// Requested payment type
        payment_type: PaymentType,
    },

    /// Referenced book does not exist
    #[error("Book {book_id} not found")]
    BookNotFound {
        /// Missing book id
        book_id: i64,
    },

    /// Referenced borrowing does not exist
    #[error("Borrowing {borrowing_id} not found")]
    BorrowingNotFound {
        /// Missing borrowing id
        borrowing_id: i64,
    },

    /// The external payment provider failed or timed out
    #[error("Payment gateway error: {0}")]
    Gateway(#[from] GatewayError),

    /// Settings or environment could not be loaded
    #[error("Configuration error: {message}")]
    Config {
        /// What went wrong while loading configuration
        message: String,
    },

    /// Storage failure
    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),
}

/// Failures of the checkout-session round trip.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// The provider did not answer within the configured bound
    #[error("request timed out after {seconds}s")]
    Timeout {
        /// Configured timeout
        seconds: u64,
    },

    /// Network-level failure
    #[error("request failed: {0}")]
    Request(String),

    /// The provider answered with an error status
    #[error("provider rejected the request ({status}): {message}")]
    Rejected {
        /// HTTP status code
        status: u16,
        /// Provider error message
        message: String,
    },

    /// The provider answered with an unexpected body
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

/// Network-level failures. Timeouts are mapped by the gateway, which knows its bound.
impl From<reqwest::Error> for GatewayError {
    fn from(value: reqwest::Error) -> Self {
        Self::Request(value.to_string())
    }
}

impl Error {
    /// Shorthand for a [`Error::Validation`] with the given message.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }
}

/// Convenience `Result` type
pub type Result<T> = std::result::Result<T, Error>;
