//! Shared context for the lending core.
//!
//! [`Library`] bundles the database connection, the injected collaborators and the
//! business policy. Operations that only touch storage take a connection directly;
//! operations that also talk to a collaborator take `&Library`.

use crate::config::LibrarySettings;
use crate::services::{Clock, Notifier, PaymentGateway};
use sea_orm::DatabaseConnection;
use std::sync::Arc;

/// Storage, collaborators and policy shared by every core operation.
pub struct Library {
    /// Database connection for all storage operations
    pub database: DatabaseConnection,
    /// Source of "today"
    pub clock: Arc<dyn Clock>,
    /// Best-effort chat sink
    pub notifier: Arc<dyn Notifier>,
    /// Checkout-session provider
    pub gateway: Arc<dyn PaymentGateway>,
    /// Business policy
    pub settings: LibrarySettings,
}

impl Library {
    /// Assembles a context from its parts.
    #[must_use]
    pub fn new(
        database: DatabaseConnection,
        clock: Arc<dyn Clock>,
        notifier: Arc<dyn Notifier>,
        gateway: Arc<dyn PaymentGateway>,
        settings: LibrarySettings,
    ) -> Self {
        Self {
            database,
            clock,
            notifier,
            gateway,
            settings,
        }
    }

    /// Current date according to the injected clock.
    #[must_use]
    pub fn today(&self) -> chrono::NaiveDate {
        self.clock.today()
    }
}
