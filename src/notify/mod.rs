// src/notify/mod.rs

//! Notification dispatch with retry and rate-limit discipline.
//!
//! The dispatcher fans a filtered delta out to every configured channel:
//! one message per event plus one cycle summary. Delivery failures are
//! retried with bounded exponential backoff; an exhausted message is
//! logged UNDELIVERED and the cycle carries on. Nothing here can touch
//! storage, which has already committed by the time dispatch runs.

mod telegram;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::{ChangeEvent, ChangeKind, Config, CycleSummary, NotifyConfig, TelegramConfig};

pub use telegram::TelegramChannel;

/// Channel delivery failure, split by retryability.
#[derive(Debug, Error)]
pub enum NotifyError {
    /// Worth retrying after a backoff (rate limit, outage, network)
    #[error("transient delivery failure: {0}")]
    Transient(String),

    /// Retrying would not help (bad credentials, malformed request)
    #[error("permanent delivery failure: {0}")]
    Permanent(String),
}

/// A notification channel implementation.
#[async_trait]
pub trait NotifyChannel: Send + Sync {
    fn name(&self) -> &str;

    /// Render one change event as a channel-native message.
    fn format_event(&self, event: &ChangeEvent) -> String;

    /// Render the cycle summary.
    fn format_summary(&self, summary: &CycleSummary) -> String;

    async fn send(&self, text: &str) -> std::result::Result<(), NotifyError>;
}

/// Which event kinds are delivered.
#[derive(Debug, Clone, Copy)]
struct KindFlags {
    new: bool,
    updated: bool,
    removed: bool,
    summary: bool,
}

impl KindFlags {
    fn from_config(config: &TelegramConfig) -> Self {
        Self {
            new: config.notify_new,
            updated: config.notify_updated,
            removed: config.notify_removed,
            summary: config.send_summary,
        }
    }

    fn wants(&self, kind: ChangeKind) -> bool {
        match kind {
            ChangeKind::New => self.new,
            ChangeKind::Updated => self.updated,
            ChangeKind::Removed => self.removed,
        }
    }
}

/// Fans filtered events out to the configured channels.
pub struct Dispatcher {
    channels: Vec<Arc<dyn NotifyChannel>>,
    flags: KindFlags,
    max_attempts: u32,
    backoff_base: Duration,
}

impl Dispatcher {
    pub fn from_config(config: &Config) -> Self {
        let mut channels: Vec<Arc<dyn NotifyChannel>> = Vec::new();
        if config.telegram.is_configured() {
            channels.push(Arc::new(TelegramChannel::new(&config.telegram)));
        } else {
            log::warn!("No notification channels configured (telegram token/chat_id missing)");
        }
        Self::with_channels(channels, &config.telegram, &config.notify)
    }

    /// Build a dispatcher over explicit channels.
    pub fn with_channels(
        channels: Vec<Arc<dyn NotifyChannel>>,
        telegram: &TelegramConfig,
        notify: &NotifyConfig,
    ) -> Self {
        Self {
            channels,
            flags: KindFlags::from_config(telegram),
            max_attempts: notify.max_attempts.max(1),
            backoff_base: Duration::from_millis(notify.backoff_base_ms),
        }
    }

    /// Deliver the filtered events and the cycle summary.
    ///
    /// Updates `summary.undelivered` with the number of messages that
    /// exhausted their retry budget.
    pub async fn dispatch(&self, events: &[ChangeEvent], summary: &mut CycleSummary) {
        if self.channels.is_empty() {
            return;
        }

        let mut undelivered = 0;
        for channel in &self.channels {
            for event in events.iter().filter(|e| self.flags.wants(e.kind)) {
                let text = channel.format_event(event);
                if !self.deliver(channel.as_ref(), &text).await {
                    undelivered += 1;
                    log::error!(
                        "UNDELIVERED on {}: {:?} {}/{}",
                        channel.name(),
                        event.kind,
                        event.source_id,
                        event.subject().external_id
                    );
                }
            }
        }
        summary.undelivered = undelivered;

        if self.flags.summary {
            for channel in &self.channels {
                let text = channel.format_summary(summary);
                if !self.deliver(channel.as_ref(), &text).await {
                    summary.undelivered += 1;
                    log::error!("UNDELIVERED on {}: cycle summary", channel.name());
                }
            }
        }
    }

    /// One message with bounded exponential backoff on transient errors.
    async fn deliver(&self, channel: &dyn NotifyChannel, text: &str) -> bool {
        let mut delay = self.backoff_base;

        for attempt in 1..=self.max_attempts {
            match channel.send(text).await {
                Ok(()) => return true,
                Err(NotifyError::Permanent(message)) => {
                    log::error!("{}: permanent delivery failure: {message}", channel.name());
                    return false;
                }
                Err(NotifyError::Transient(message)) => {
                    log::warn!(
                        "{}: delivery attempt {attempt}/{} failed: {message}",
                        channel.name(),
                        self.max_attempts
                    );
                    if attempt < self.max_attempts {
                        tokio::time::sleep(delay).await;
                        delay *= 2;
                    }
                }
            }
        }
        false
    }
}
