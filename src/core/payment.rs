//! Payment business logic - Checkout sessions for rental fees and fines.
//!
//! A payment row is only written after the gateway has opened a checkout session, so a
//! gateway failure leaves nothing behind and the caller can simply retry. Each borrowing
//! holds at most one payment per [`PaymentType`]; the gateway's success or cancel callback
//! settles it exactly once.

use crate::{
    core::{
        borrowing::get_books_for_borrowing,
        fees::{self, Fee},
    },
    entities::{Borrowing, Payment, PaymentStatus, PaymentType, book, borrowing, payment},
    errors::{Error, GatewayError, Result},
    library::Library,
    services::{CheckoutRequest, notifier::notify_detached},
};
use chrono::Duration;
use rust_decimal::Decimal;
use sea_orm::{QueryOrder, Set, SqlErr, prelude::*, sea_query::Expr};
use tracing::{info, instrument, warn};

/// Redirect target handed back to the payer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutHandle {
    /// Recorded payment
    pub payment_id: i64,
    /// Gateway correlation id
    pub session_id: String,
    /// Hosted checkout page
    pub session_url: String,
    /// Amount charged
    pub amount: Decimal,
}

impl From<&payment::Model> for CheckoutHandle {
    fn from(payment: &payment::Model) -> Self {
        Self {
            payment_id: payment.id,
            session_id: payment.session_id.clone(),
            session_url: payment.session_url.clone(),
            amount: payment.money_to_pay(),
        }
    }
}

/// Result reported by the gateway callback
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentOutcome {
    /// The payer completed the checkout
    Success,
    /// The payer abandoned the checkout or it failed
    Cancel,
}

impl PaymentOutcome {
    const fn status(self) -> PaymentStatus {
        match self {
            Self::Success => PaymentStatus::Paid,
            Self::Cancel => PaymentStatus::Canceled,
        }
    }

    const fn headline(self) -> &'static str {
        match self {
            Self::Success => "Success payment",
            Self::Cancel => "Canceled payment",
        }
    }
}

/// Finds the payment of one type for a borrowing.
pub async fn get_payment<C>(
    db: &C,
    borrowing_id: i64,
    payment_type: PaymentType,
) -> Result<Option<payment::Model>>
where
    C: ConnectionTrait,
{
    Payment::find()
        .filter(payment::Column::BorrowingId.eq(borrowing_id))
        .filter(payment::Column::PaymentType.eq(payment_type))
        .one(db)
        .await
        .map_err(Into::into)
}

/// Retrieves every payment recorded against a borrowing.
pub async fn get_payments_for_borrowing(
    db: &DatabaseConnection,
    borrowing_id: i64,
) -> Result<Vec<payment::Model>> {
    Payment::find()
        .filter(payment::Column::BorrowingId.eq(borrowing_id))
        .order_by_asc(payment::Column::Id)
        .all(db)
        .await
        .map_err(Into::into)
}

/// Retrieves payments, optionally only those in one status.
pub async fn list_payments(
    db: &DatabaseConnection,
    status: Option<PaymentStatus>,
) -> Result<Vec<payment::Model>> {
    let mut query = Payment::find().order_by_asc(payment::Column::Id);
    if let Some(status) = status {
        query = query.filter(payment::Column::Status.eq(status));
    }
    query.all(db).await.map_err(Into::into)
}

fn callback_urls(base_url: &str, borrowing_id: i64, payment_type: PaymentType) -> (String, String) {
    let base = base_url.trim_end_matches('/');
    (
        format!("{base}/api/payment/success/{borrowing_id}/?payment_type={payment_type}"),
        format!("{base}/api/payment/cancel/{borrowing_id}/?payment_type={payment_type}"),
    )
}

pub(crate) fn book_titles(books: &[book::Model]) -> String {
    books
        .iter()
        .map(|book| book.title.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

fn daily_fees(books: &[book::Model]) -> Vec<Decimal> {
    books.iter().map(book::Model::daily_fee).collect()
}

async fn find_borrowing(db: &DatabaseConnection, borrowing_id: i64) -> Result<borrowing::Model> {
    Borrowing::find_by_id(borrowing_id)
        .one(db)
        .await?
        .ok_or(Error::BorrowingNotFound { borrowing_id })
}

/// Opens a checkout session for `fee` and records it as a `PENDING` payment.
///
/// # Errors
/// [`Error::DuplicatePayment`] when the borrowing already has a payment of this type,
/// [`Error::Gateway`] when the gateway fails or does not answer within the configured
/// timeout. No payment row is written on failure.
#[instrument(skip(library, fee), fields(amount = fee.minor_units))]
pub async fn initiate_payment(
    library: &Library,
    borrowing_id: i64,
    fee: Fee,
    payment_type: PaymentType,
) -> Result<CheckoutHandle> {
    let db = &library.database;

    if get_payment(db, borrowing_id, payment_type).await?.is_some() {
        return Err(Error::DuplicatePayment {
            borrowing_id,
            payment_type,
        });
    }
    if fee.minor_units <= 0 {
        return Err(Error::validation(format!(
            "Payment amount must be positive, got {}",
            fee.amount()
        )));
    }

    let borrowing = find_borrowing(db, borrowing_id).await?;
    let books = get_books_for_borrowing(db, borrowing.id).await?;
    let (success_url, cancel_url) =
        callback_urls(&library.settings.public_base_url, borrowing.id, payment_type);
    let request = CheckoutRequest {
        amount_minor_units: fee.minor_units,
        currency: library.settings.currency.clone(),
        description: book_titles(&books),
        success_url,
        cancel_url,
    };

    let timeout = library.settings.gateway_timeout();
    let session = tokio::time::timeout(timeout, library.gateway.create_checkout_session(&request))
        .await
        .map_err(|_| GatewayError::Timeout {
            seconds: timeout.as_secs(),
        })??;

    let payment = payment::ActiveModel {
        status: Set(PaymentStatus::Pending),
        payment_type: Set(payment_type),
        borrowing_id: Set(borrowing.id),
        session_url: Set(session.session_url),
        session_id: Set(session.session_id),
        money_to_pay_cents: Set(fee.minor_units),
        ..Default::default()
    }
    .insert(db)
    .await
    .map_err(|e| match e.sql_err() {
        // Lost a race against a concurrent initiation for the same pair
        Some(SqlErr::UniqueConstraintViolation(_)) => Error::DuplicatePayment {
            borrowing_id,
            payment_type,
        },
        _ => Error::Database(e),
    })?;

    info!(
        "Recorded pending {} payment {} of {} for borrowing {}",
        payment_type,
        payment.id,
        payment.money_to_pay(),
        borrowing_id
    );
    Ok(CheckoutHandle::from(&payment))
}

/// Opens the rental-fee checkout for a borrowing.
///
/// The fee covers the days from borrowing to expected return; a same-day borrowing is
/// billed as one day. Also the retry path when initiation failed at borrow time.
pub async fn initiate_rental_payment(library: &Library, borrowing_id: i64) -> Result<CheckoutHandle> {
    let borrowing = find_borrowing(&library.database, borrowing_id).await?;
    let books = get_books_for_borrowing(&library.database, borrowing_id).await?;

    let billed_until = borrowing
        .expected_return_date
        .max(borrowing.borrow_date + Duration::days(1));
    let fee = fees::rental_fee(borrowing.borrow_date, billed_until, &daily_fees(&books))?;

    initiate_payment(library, borrowing_id, fee, PaymentType::Payment).await
}

/// Opens the fine checkout for a borrowing returned after its expected return date.
///
/// # Errors
/// [`Error::Validation`] when the borrowing is still active or was returned on time.
pub async fn initiate_fine_payment(library: &Library, borrowing_id: i64) -> Result<CheckoutHandle> {
    let borrowing = find_borrowing(&library.database, borrowing_id).await?;
    let Some(actual_return_date) = borrowing.actual_return_date else {
        return Err(Error::validation(format!(
            "Borrowing {borrowing_id} has not been returned yet"
        )));
    };
    if actual_return_date <= borrowing.expected_return_date {
        return Err(Error::validation(format!(
            "Borrowing {borrowing_id} was returned on time"
        )));
    }

    let books = get_books_for_borrowing(&library.database, borrowing_id).await?;
    let fee = fees::fine_fee(
        borrowing.expected_return_date,
        actual_return_date,
        &daily_fees(&books),
        library.settings.fine_multiplier,
    )?;

    initiate_payment(library, borrowing_id, fee, PaymentType::Fine).await
}

/// Applies the gateway's verdict to the payment of one type for a borrowing.
///
/// Moves the payment from `PENDING` to `PAID` or `CANCELED` and emits a notification with
/// the new status, owner, titles, type and amount.
///
/// # Errors
/// [`Error::PaymentNotFound`] when no such payment exists, [`Error::Validation`] when the
/// payment has already been settled.
#[instrument(skip(library))]
pub async fn apply_outcome(
    library: &Library,
    borrowing_id: i64,
    payment_type: PaymentType,
    outcome: PaymentOutcome,
) -> Result<payment::Model> {
    let db = &library.database;

    let payment = get_payment(db, borrowing_id, payment_type)
        .await?
        .ok_or(Error::PaymentNotFound {
            borrowing_id,
            payment_type,
        })?;

    let result = Payment::update_many()
        .col_expr(payment::Column::Status, Expr::value(outcome.status()))
        .filter(payment::Column::Id.eq(payment.id))
        .filter(payment::Column::Status.eq(PaymentStatus::Pending))
        .exec(db)
        .await?;
    if result.rows_affected == 0 {
        warn!(
            "Ignoring {:?} for payment {} already settled as {:?}",
            outcome, payment.id, payment.status
        );
        return Err(Error::validation(format!(
            "Payment {} is already {:?}",
            payment.id, payment.status
        )));
    }

    let updated = payment::Model {
        status: outcome.status(),
        ..payment
    };

    let borrowing = find_borrowing(db, borrowing_id).await?;
    let books = get_books_for_borrowing(db, borrowing_id).await?;
    let message = format!(
        "{}:\nUser: {}\nBooks: {}\nPayment type: {}\nAmount: {}$",
        outcome.headline(),
        borrowing.user_id,
        book_titles(&books),
        payment_type,
        updated.money_to_pay()
    );
    notify_detached(&library.notifier, message);

    info!("Payment {} settled as {:?}", updated.id, updated.status);
    Ok(updated)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::core::borrowing::{create_borrowing, return_borrowing};
    use crate::test_utils::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_callback_urls() {
        let (success, cancel) = callback_urls("http://127.0.0.1:8000/", 7, PaymentType::Fine);
        assert_eq!(
            success,
            "http://127.0.0.1:8000/api/payment/success/7/?payment_type=FINE"
        );
        assert_eq!(
            cancel,
            "http://127.0.0.1:8000/api/payment/cancel/7/?payment_type=FINE"
        );
    }

    #[tokio::test]
    async fn test_borrowing_records_pending_payment() -> Result<()> {
        let mut env = setup_library().await?;
        let book = create_test_book(&env.library.database, "Dune").await?;

        let receipt = create_borrowing(&env.library, "reader@example.com", days_from_today(10), &[book.id]).await?;
        let handle = receipt.checkout.unwrap();

        let payment = get_payment(&env.library.database, receipt.borrowing.id, PaymentType::Payment)
            .await?
            .unwrap();
        assert_eq!(payment.id, handle.payment_id);
        assert_eq!(payment.status, PaymentStatus::Pending);
        assert_eq!(payment.money_to_pay(), dec!(20.00));
        assert_eq!(payment.session_url, handle.session_url);

        let request = env.gateway.requests().pop().unwrap();
        assert_eq!(request.amount_minor_units, 2000);
        assert_eq!(request.description, "Dune");
        assert!(request.success_url.ends_with("?payment_type=PAYMENT"));

        let created = env.notifications.recv().await.unwrap();
        assert!(created.starts_with("New borrowing created:"));
        Ok(())
    }

    #[tokio::test]
    async fn test_duplicate_payment_rejected() -> Result<()> {
        let env = setup_library().await?;
        let book = create_test_book(&env.library.database, "Dune").await?;
        let receipt = create_borrowing(&env.library, "reader@example.com", days_from_today(3), &[book.id]).await?;
        assert!(receipt.checkout.is_ok());

        let fee = Fee { days: 3, minor_units: 600 };
        let second = initiate_payment(&env.library, receipt.borrowing.id, fee, PaymentType::Payment).await;

        assert!(matches!(
            second.unwrap_err(),
            Error::DuplicatePayment { payment_type: PaymentType::Payment, .. }
        ));
        assert_eq!(get_payments_for_borrowing(&env.library.database, receipt.borrowing.id).await?.len(), 1);

        Ok(())
    }

    #[tokio::test]
    async fn test_gateway_failure_leaves_no_payment_and_can_retry() -> Result<()> {
        let env = setup_library().await?;
        let book = create_test_book(&env.library.database, "Dune").await?;
        env.gateway.set_mode(GatewayMode::Fail);

        let receipt = create_borrowing(&env.library, "reader@example.com", days_from_today(2), &[book.id]).await?;

        // The borrowing stands even though payment initiation failed
        assert!(matches!(receipt.checkout, Err(Error::Gateway(_))));
        assert!(get_payment(&env.library.database, receipt.borrowing.id, PaymentType::Payment).await?.is_none());

        env.gateway.set_mode(GatewayMode::Succeed);
        let handle = initiate_rental_payment(&env.library, receipt.borrowing.id).await?;
        assert_eq!(handle.amount, dec!(4.00));

        Ok(())
    }

    #[tokio::test]
    async fn test_gateway_timeout_is_bounded() -> Result<()> {
        let env = setup_library_with_timeout(1).await?;
        let book = create_test_book(&env.library.database, "Dune").await?;
        env.gateway.set_mode(GatewayMode::Hang);

        let receipt = create_borrowing(&env.library, "reader@example.com", days_from_today(2), &[book.id]).await?;

        assert!(matches!(
            receipt.checkout,
            Err(Error::Gateway(GatewayError::Timeout { seconds: 1 }))
        ));
        assert!(get_payments_for_borrowing(&env.library.database, receipt.borrowing.id).await?.is_empty());

        Ok(())
    }

    #[tokio::test]
    async fn test_same_day_borrowing_billed_one_day() -> Result<()> {
        let env = setup_library().await?;
        let book = create_test_book(&env.library.database, "Dune").await?;

        let receipt = create_borrowing(&env.library, "reader@example.com", test_today(), &[book.id]).await?;

        assert_eq!(receipt.checkout.unwrap().amount, dec!(2.00));
        Ok(())
    }

    #[tokio::test]
    async fn test_apply_success_marks_paid_and_notifies() -> Result<()> {
        let mut env = setup_library().await?;
        let book = create_test_book(&env.library.database, "Dune").await?;
        let receipt = create_borrowing(&env.library, "reader@example.com", days_from_today(10), &[book.id]).await?;
        env.notifications.recv().await;

        let paid = apply_outcome(&env.library, receipt.borrowing.id, PaymentType::Payment, PaymentOutcome::Success).await?;
        assert_eq!(paid.status, PaymentStatus::Paid);

        let stored = get_payment(&env.library.database, receipt.borrowing.id, PaymentType::Payment)
            .await?
            .unwrap();
        assert_eq!(stored.status, PaymentStatus::Paid);

        let message = env.notifications.recv().await.unwrap();
        assert!(message.starts_with("Success payment:"));
        assert!(message.contains("User: reader@example.com"));
        assert!(message.contains("Books: Dune"));
        assert!(message.contains("Payment type: PAYMENT"));
        assert!(message.contains("Amount: 20.00$"));

        Ok(())
    }

    #[tokio::test]
    async fn test_apply_cancel_and_settle_once() -> Result<()> {
        let env = setup_library().await?;
        let book = create_test_book(&env.library.database, "Dune").await?;
        let receipt = create_borrowing(&env.library, "reader@example.com", days_from_today(1), &[book.id]).await?;

        let canceled = apply_outcome(&env.library, receipt.borrowing.id, PaymentType::Payment, PaymentOutcome::Cancel).await?;
        assert_eq!(canceled.status, PaymentStatus::Canceled);

        let again = apply_outcome(&env.library, receipt.borrowing.id, PaymentType::Payment, PaymentOutcome::Success).await;
        assert!(matches!(again.unwrap_err(), Error::Validation { .. }));

        let stored = get_payment(&env.library.database, receipt.borrowing.id, PaymentType::Payment)
            .await?
            .unwrap();
        assert_eq!(stored.status, PaymentStatus::Canceled);

        Ok(())
    }

    #[tokio::test]
    async fn test_apply_outcome_without_payment() -> Result<()> {
        let env = setup_library().await?;

        let result = apply_outcome(&env.library, 5, PaymentType::Fine, PaymentOutcome::Success).await;
        assert!(matches!(
            result.unwrap_err(),
            Error::PaymentNotFound { borrowing_id: 5, payment_type: PaymentType::Fine }
        ));

        Ok(())
    }

    #[tokio::test]
    async fn test_fine_requires_late_return() -> Result<()> {
        let env = setup_library().await?;
        let book = create_test_book(&env.library.database, "Dune").await?;
        let receipt = create_borrowing(&env.library, "reader@example.com", days_from_today(5), &[book.id]).await?;

        let active = initiate_fine_payment(&env.library, receipt.borrowing.id).await;
        assert!(matches!(active.unwrap_err(), Error::Validation { .. }));

        return_borrowing(&env.library, receipt.borrowing.id, test_today()).await?;
        let on_time = initiate_fine_payment(&env.library, receipt.borrowing.id).await;
        assert!(matches!(on_time.unwrap_err(), Error::Validation { .. }));

        Ok(())
    }

    #[tokio::test]
    async fn test_list_payments_by_status() -> Result<()> {
        let env = setup_library().await?;
        let first = create_test_book(&env.library.database, "Dune").await?;
        let second = create_test_book(&env.library.database, "Emma").await?;
        let a = create_borrowing(&env.library, "a@example.com", days_from_today(1), &[first.id]).await?;
        create_borrowing(&env.library, "b@example.com", days_from_today(1), &[second.id]).await?;

        apply_outcome(&env.library, a.borrowing.id, PaymentType::Payment, PaymentOutcome::Success).await?;

        assert_eq!(list_payments(&env.library.database, None).await?.len(), 2);
        let paid = list_payments(&env.library.database, Some(PaymentStatus::Paid)).await?;
        assert_eq!(paid.len(), 1);
        assert_eq!(paid[0].borrowing_id, a.borrowing.id);

        Ok(())
    }
}
