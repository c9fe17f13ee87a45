//! Chat notifications.
//!
//! Notifications are best-effort: a failed send is reported through [`NotifyOutcome`] and
//! logged, never turned into an error for the operation that triggered it.

use crate::errors::{Error, Result};
use async_trait::async_trait;
use poise::serenity_prelude as serenity;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Result of one send attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotifyOutcome {
    /// Whether the message was delivered
    pub success: bool,
    /// Delivery detail or failure reason
    pub message: String,
}

impl NotifyOutcome {
    /// Successful delivery.
    #[must_use]
    pub fn sent() -> Self {
        Self {
            success: true,
            message: "Message sent successfully".to_string(),
        }
    }

    /// Failed delivery with a reason.
    #[must_use]
    pub fn failed(reason: impl std::fmt::Display) -> Self {
        Self {
            success: false,
            message: format!("Failed to send message: {reason}"),
        }
    }
}

/// A sink for human-readable event messages.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Delivers `text`, reporting the outcome instead of failing.
    async fn notify(&self, text: &str) -> NotifyOutcome;
}

/// Sends `text` on a background task so the caller never waits on the chat service.
///
/// Failures are logged at `warn`.
pub fn notify_detached(notifier: &Arc<dyn Notifier>, text: String) {
    let notifier = Arc::clone(notifier);
    tokio::spawn(async move {
        let outcome = notifier.notify(&text).await;
        if outcome.success {
            debug!("Notification delivered");
        } else {
            warn!("Notification dropped: {}", outcome.message);
        }
    });
}

/// Posts notifications into a Discord channel.
pub struct DiscordNotifier {
    http: Arc<serenity::Http>,
    channel_id: serenity::ChannelId,
}

impl DiscordNotifier {
    /// Creates a notifier posting to `channel_id` with the given bot token.
    #[must_use]
    pub fn new(token: &str, channel_id: u64) -> Self {
        Self {
            http: Arc::new(serenity::Http::new(token)),
            channel_id: serenity::ChannelId::new(channel_id),
        }
    }

    /// Builds a notifier from `DISCORD_BOT_TOKEN` and `NOTIFICATION_CHANNEL_ID`.
    ///
    /// Returns `Ok(None)` when the token is not configured.
    pub fn from_env() -> Result<Option<Self>> {
        let Ok(token) = std::env::var("DISCORD_BOT_TOKEN") else {
            return Ok(None);
        };
        let channel = std::env::var("NOTIFICATION_CHANNEL_ID").map_err(|e| Error::Config {
            message: format!("NOTIFICATION_CHANNEL_ID not set: {e}"),
        })?;
        let channel_id = channel.trim().parse::<u64>().map_err(|e| Error::Config {
            message: format!("NOTIFICATION_CHANNEL_ID is not a channel id: {e}"),
        })?;
        if channel_id == 0 {
            return Err(Error::Config {
                message: "NOTIFICATION_CHANNEL_ID cannot be 0".to_string(),
            });
        }
        Ok(Some(Self::new(&token, channel_id)))
    }
}

#[async_trait]
impl Notifier for DiscordNotifier {
    async fn notify(&self, text: &str) -> NotifyOutcome {
        match self.channel_id.say(&*self.http, text).await {
            Ok(_) => NotifyOutcome::sent(),
            Err(e) => NotifyOutcome::failed(e),
        }
    }
}

/// Writes notifications to the log, used when no chat channel is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, text: &str) -> NotifyOutcome {
        info!(target: "notifications", "{}", text);
        NotifyOutcome::sent()
    }
}
