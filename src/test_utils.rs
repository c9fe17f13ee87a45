//! Shared test utilities for the lending core.
//!
//! This module provides helpers for setting up test databases, creating catalog rows with
//! sensible defaults, and wiring a [`Library`] to in-process fakes for the clock, the
//! notifier and the payment gateway.

#![allow(clippy::unwrap_used)]

use crate::{
    config::LibrarySettings,
    core::{
        catalog::{self, BookInput},
        inventory,
    },
    entities::{BorrowingBook, Cover, book, borrowing, borrowing_book},
    errors::{GatewayError, Result},
    library::Library,
    services::{CheckoutRequest, CheckoutSession, Clock, Notifier, NotifyOutcome, PaymentGateway},
};
use async_trait::async_trait;
use chrono::{Duration, NaiveDate};
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ConnectOptions, DatabaseBackend, DatabaseConnection, EntityTrait,
    MockDatabase, Set,
};
use std::sync::{
    Arc, Mutex,
    atomic::{AtomicU64, Ordering},
};
use tempfile::TempDir;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};

/// Creates an in-memory `SQLite` database with all tables initialized.
/// This is the standard setup for all integration tests.
pub async fn setup_test_db() -> Result<DatabaseConnection> {
    let db = sea_orm::Database::connect("sqlite::memory:").await?;
    crate::config::database::create_tables(&db).await?;
    Ok(db)
}

/// Creates a file-backed `SQLite` database served by a pool of several connections, so
/// concurrent transactions really contend. The directory must outlive the connection.
pub async fn setup_pooled_test_db() -> Result<(DatabaseConnection, TempDir)> {
    let dir = tempfile::tempdir().map_err(|e| crate::errors::Error::Config {
        message: format!("Failed to create temp dir: {e}"),
    })?;
    let url = format!("sqlite://{}?mode=rwc", dir.path().join("library.sqlite").display());
    let mut options = ConnectOptions::new(url);
    options.max_connections(4).min_connections(2);
    let db = sea_orm::Database::connect(options).await?;
    crate::config::database::create_tables(&db).await?;
    Ok((db, dir))
}

/// The date every test library treats as "today".
pub fn test_today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 6, 15).unwrap()
}

/// [`test_today`] shifted by `days` (negative for the past).
pub fn days_from_today(days: i64) -> NaiveDate {
    test_today() + Duration::days(days)
}

/// Creates a test book with sensible defaults.
///
/// # Defaults
/// * author: "Test Author"
/// * cover: Hard
/// * inventory: 1
/// * daily fee: 2.00
pub async fn create_test_book(db: &DatabaseConnection, title: &str) -> Result<book::Model> {
    create_custom_book(db, title, 1).await
}

/// Creates a test book with a specific stock level.
pub async fn create_custom_book(
    db: &DatabaseConnection,
    title: &str,
    inventory: i32,
) -> Result<book::Model> {
    catalog::upsert_book(
        db,
        BookInput {
            title: title.to_string(),
            author: "Test Author".to_string(),
            cover: Cover::Hard,
            inventory: Some(inventory),
            daily_fee: Decimal::new(200, 2),
        },
        crate::config::DuplicatePolicy::Reject,
    )
    .await
}

/// Inserts a borrowing with arbitrary dates, bypassing the "expected date not in the past"
/// check so overdue scenarios can be staged. Stock is taken like a real checkout.
pub async fn insert_borrowing(
    db: &DatabaseConnection,
    user_id: &str,
    borrow_date: NaiveDate,
    expected_return_date: NaiveDate,
    book_ids: &[i64],
) -> Result<borrowing::Model> {
    for book_id in book_ids {
        inventory::decrement(db, *book_id).await?;
    }

    let created = borrowing::ActiveModel {
        borrow_date: Set(borrow_date),
        expected_return_date: Set(expected_return_date),
        actual_return_date: Set(None),
        user_id: Set(user_id.to_string()),
        ..Default::default()
    }
    .insert(db)
    .await?;

    let links = book_ids.iter().map(|book_id| borrowing_book::ActiveModel {
        borrowing_id: Set(created.id),
        book_id: Set(*book_id),
    });
    BorrowingBook::insert_many(links)
        .exec_without_returning(db)
        .await?;

    Ok(created)
}

/// Clock pinned to one date.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub NaiveDate);

impl Clock for FixedClock {
    fn today(&self) -> NaiveDate {
        self.0
    }
}

/// Notifier that forwards every message to a channel the test can read.
#[derive(Debug, Clone)]
pub struct RecordingNotifier {
    sender: UnboundedSender<String>,
    fail: bool,
}

impl RecordingNotifier {
    /// A notifier whose sends succeed.
    pub fn new() -> (Self, UnboundedReceiver<String>) {
        let (sender, receiver) = unbounded_channel();
        (Self { sender, fail: false }, receiver)
    }

    /// A notifier that records the text but reports every send as failed.
    pub fn failing() -> (Self, UnboundedReceiver<String>) {
        let (sender, receiver) = unbounded_channel();
        (Self { sender, fail: true }, receiver)
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, text: &str) -> NotifyOutcome {
        // The receiver may already be dropped by a test that ignores messages
        let _ = self.sender.send(text.to_string());
        if self.fail {
            NotifyOutcome::failed("channel unavailable")
        } else {
            NotifyOutcome::sent()
        }
    }
}

/// How [`FakeGateway`] answers the next requests
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayMode {
    /// Open a session
    Succeed,
    /// Reject the request
    Fail,
    /// Never answer
    Hang,
}

/// In-process checkout provider that records every request.
#[derive(Debug)]
pub struct FakeGateway {
    mode: Mutex<GatewayMode>,
    requests: Mutex<Vec<CheckoutRequest>>,
    next_session: AtomicU64,
}

impl FakeGateway {
    /// A gateway that opens sessions.
    pub fn new() -> Self {
        Self {
            mode: Mutex::new(GatewayMode::Succeed),
            requests: Mutex::new(Vec::new()),
            next_session: AtomicU64::new(1),
        }
    }

    /// Switches how later requests are answered.
    pub fn set_mode(&self, mode: GatewayMode) {
        *self.mode.lock().unwrap() = mode;
    }

    /// Requests received so far, oldest first.
    pub fn requests(&self) -> Vec<CheckoutRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl PaymentGateway for FakeGateway {
    async fn create_checkout_session(
        &self,
        request: &CheckoutRequest,
    ) -> std::result::Result<CheckoutSession, GatewayError> {
        self.requests.lock().unwrap().push(request.clone());
        let mode = *self.mode.lock().unwrap();

        match mode {
            GatewayMode::Succeed => {
                let n = self.next_session.fetch_add(1, Ordering::SeqCst);
                Ok(CheckoutSession {
                    session_id: format!("cs_test_{n}"),
                    session_url: format!("https://checkout.example.com/pay/cs_test_{n}"),
                })
            }
            GatewayMode::Fail => Err(GatewayError::Rejected {
                status: 402,
                message: "card declined".to_string(),
            }),
            GatewayMode::Hang => {
                tokio::time::sleep(std::time::Duration::from_secs(3600)).await;
                Err(GatewayError::Request("hung request finished".to_string()))
            }
        }
    }
}

/// A library wired to fakes, plus handles to inspect them
pub struct TestEnv {
    /// Context under test
    pub library: Library,
    /// Messages sent through the notifier
    pub notifications: UnboundedReceiver<String>,
    /// The fake checkout provider
    pub gateway: Arc<FakeGateway>,
    _db_dir: Option<TempDir>,
}

/// In-memory library pinned to [`test_today`] with default settings.
pub async fn setup_library() -> Result<TestEnv> {
    let db = setup_test_db().await?;
    Ok(setup_library_with(db, None, LibrarySettings::default(), RecordingNotifier::new()))
}

/// Like [`setup_library`] over [`setup_pooled_test_db`].
pub async fn setup_pooled_library() -> Result<TestEnv> {
    let (db, dir) = setup_pooled_test_db().await?;
    Ok(setup_library_with(
        db,
        Some(dir),
        LibrarySettings::default(),
        RecordingNotifier::new(),
    ))
}

/// Like [`setup_library`] with a shorter gateway timeout.
pub async fn setup_library_with_timeout(seconds: u64) -> Result<TestEnv> {
    let settings = LibrarySettings {
        gateway_timeout_secs: seconds,
        ..LibrarySettings::default()
    };
    let db = setup_test_db().await?;
    Ok(setup_library_with(db, None, settings, RecordingNotifier::new()))
}

/// Like [`setup_library`] with a notifier whose sends all fail.
pub async fn setup_library_with_failing_notifier() -> Result<TestEnv> {
    let db = setup_test_db().await?;
    Ok(setup_library_with(db, None, LibrarySettings::default(), RecordingNotifier::failing()))
}

fn setup_library_with(
    db: DatabaseConnection,
    db_dir: Option<TempDir>,
    settings: LibrarySettings,
    (notifier, notifications): (RecordingNotifier, UnboundedReceiver<String>),
) -> TestEnv {
    let gateway = Arc::new(FakeGateway::new());
    let library = Library::new(
        db,
        Arc::new(FixedClock(test_today())),
        Arc::new(notifier),
        Arc::clone(&gateway) as Arc<dyn PaymentGateway>,
        settings,
    );
    TestEnv {
        library,
        notifications,
        gateway,
        _db_dir: db_dir,
    }
}

/// Library over a mock connection with no queued results; any storage access fails.
pub fn mock_library() -> Library {
    let db = MockDatabase::new(DatabaseBackend::Sqlite).into_connection();
    let (notifier, _) = RecordingNotifier::new();
    Library::new(
        db,
        Arc::new(FixedClock(test_today())),
        Arc::new(notifier),
        Arc::new(FakeGateway::new()),
        LibrarySettings::default(),
    )
}

