//! Daily entry point: connects to storage and runs one overdue scan.
//!
//! Scheduling is left to the host (cron, systemd timer); each invocation performs a
//! single scan and exits.

use dotenvy::dotenv;
use library_service::{
    config::{database, settings},
    core::overdue,
    errors::Result,
    library::Library,
    services::{
        DiscordNotifier, DisabledGateway, LogNotifier, Notifier, PaymentGateway, StripeGateway,
        SystemClock,
    },
};
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Initialize tracing (as early as possible)
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // 2. Load .env file, non-fatal since variables can be set externally
    dotenv().ok();
    info!("Attempted to load .env file.");

    // 3. Library policy
    let settings = settings::load_default_settings()
        .inspect_err(|e| error!("Failed to load library settings: {}", e))?;

    // 4. Storage
    let db = database::create_connection()
        .await
        .inspect_err(|e| error!("Failed to connect to database: {}", e))?;
    database::create_tables(&db)
        .await
        .inspect(|_| info!("Database initialized successfully."))
        .inspect_err(|e| error!("Failed to initialize database: {}", e))?;

    // 5. Collaborators
    let notifier: Arc<dyn Notifier> = match DiscordNotifier::from_env()? {
        Some(discord) => Arc::new(discord),
        None => {
            info!("Discord credentials not set, notifications go to the log");
            Arc::new(LogNotifier)
        }
    };
    let gateway: Arc<dyn PaymentGateway> = match StripeGateway::from_env(settings.gateway_timeout())
        .inspect_err(|e| error!("Payment gateway unavailable: {}", e))?
    {
        Some(stripe) => Arc::new(stripe),
        None => {
            warn!("STRIPE_SECRET_KEY not set, payment initiation is disabled");
            Arc::new(DisabledGateway)
        }
    };

    let library = Library::new(
        db,
        Arc::new(SystemClock),
        notifier,
        gateway,
        settings,
    );

    // 6. One overdue scan
    let entries = overdue::check_overdue_borrowings(&library).await?;
    let overdue = entries.iter().filter(|entry| entry.overdue).count();
    info!(
        "Overdue scan finished: {} active, {} overdue",
        entries.len(),
        overdue
    );

    Ok(())
}
