//! External collaborators the lending core depends on.
//!
//! Each collaborator is a trait injected through [`crate::library::Library`], so the core
//! never constructs its own network clients and tests can swap in fakes.

/// Source of the current date
pub mod clock;
/// Checkout-session provider
pub mod gateway;
/// Best-effort chat notifications
pub mod notifier;

pub use clock::{Clock, SystemClock};
pub use gateway::{
    CheckoutRequest, CheckoutSession, DisabledGateway, PaymentGateway, StripeGateway,
};
pub use notifier::{DiscordNotifier, LogNotifier, Notifier, NotifyOutcome};
