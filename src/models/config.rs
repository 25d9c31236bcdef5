//! Application configuration structures.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

/// Root application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Scan cadence, storage location, log level
    #[serde(default)]
    pub general: GeneralConfig,

    /// HTTP and crawling behavior settings
    #[serde(default)]
    pub crawler: CrawlerConfig,

    /// Notification-worthiness predicate
    #[serde(default)]
    pub filter: FilterConfig,

    /// Telegram channel credentials and enablement flags
    #[serde(default)]
    pub telegram: TelegramConfig,

    /// Delivery retry discipline
    #[serde(default)]
    pub notify: NotifyConfig,

    /// Source id -> enabled flag
    #[serde(default = "defaults::sources")]
    pub sources: BTreeMap<String, bool>,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Load configuration or return default if loading fails.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        Self::load(&path).unwrap_or_else(|e| {
            log::warn!(
                "Config load failed from {:?}: {}. Using defaults.",
                path.as_ref(),
                e
            );
            Self::default()
        })
    }

    /// Source ids enabled for scanning.
    pub fn enabled_sources(&self) -> Vec<String> {
        self.sources
            .iter()
            .filter(|(_, enabled)| **enabled)
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Validate configuration values for basic sanity.
    pub fn validate(&self) -> Result<()> {
        if self.general.scan_interval_minutes == 0 {
            return Err(AppError::validation(
                "general.scan_interval_minutes must be > 0",
            ));
        }
        if self.general.store_dir.trim().is_empty() {
            return Err(AppError::validation("general.store_dir is empty"));
        }
        if self.crawler.user_agent.trim().is_empty() {
            return Err(AppError::validation("crawler.user_agent is empty"));
        }
        if self.crawler.timeout_secs == 0 {
            return Err(AppError::validation("crawler.timeout_secs must be > 0"));
        }
        if self.crawler.source_timeout_secs == 0 {
            return Err(AppError::validation(
                "crawler.source_timeout_secs must be > 0",
            ));
        }
        if self.crawler.max_concurrent == 0 {
            return Err(AppError::validation("crawler.max_concurrent must be > 0"));
        }
        if let Some(max_price) = self.filter.max_price {
            if self.filter.min_price > max_price {
                return Err(AppError::validation(
                    "filter.min_price exceeds filter.max_price",
                ));
            }
        }
        if self.notify.max_attempts == 0 {
            return Err(AppError::validation("notify.max_attempts must be > 0"));
        }
        if self.enabled_sources().is_empty() {
            return Err(AppError::validation("No sources enabled"));
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            general: GeneralConfig::default(),
            crawler: CrawlerConfig::default(),
            filter: FilterConfig::default(),
            telegram: TelegramConfig::default(),
            notify: NotifyConfig::default(),
            sources: defaults::sources(),
        }
    }
}

/// Scan cadence and storage settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Minutes between scan cycles
    #[serde(default = "defaults::scan_interval")]
    pub scan_interval_minutes: u64,

    /// Root directory for the listing store
    #[serde(default = "defaults::store_dir")]
    pub store_dir: String,

    /// Default log level (overridable via RUST_LOG)
    #[serde(default = "defaults::log_level")]
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            scan_interval_minutes: defaults::scan_interval(),
            store_dir: defaults::store_dir(),
            log_level: defaults::log_level(),
        }
    }
}

/// HTTP client and crawling behavior settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlerConfig {
    /// User-Agent header for HTTP requests
    #[serde(default = "defaults::user_agent")]
    pub user_agent: String,

    /// Per-request timeout in seconds
    #[serde(default = "defaults::timeout")]
    pub timeout_secs: u64,

    /// Overall timeout for one source's full scan, in seconds
    #[serde(default = "defaults::source_timeout")]
    pub source_timeout_secs: u64,

    /// Courtesy delay between requests to the same site, in milliseconds
    #[serde(default = "defaults::request_delay")]
    pub request_delay_ms: u64,

    /// Maximum sources scanned concurrently
    #[serde(default = "defaults::max_concurrent")]
    pub max_concurrent: usize,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            user_agent: defaults::user_agent(),
            timeout_secs: defaults::timeout(),
            source_timeout_secs: defaults::source_timeout(),
            request_delay_ms: defaults::request_delay(),
            max_concurrent: defaults::max_concurrent(),
        }
    }
}

/// Which changes are notification-worthy. Storage is unaffected.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterConfig {
    /// Minimum price in whole euros
    #[serde(default = "defaults::min_price")]
    pub min_price: i64,

    /// Maximum price in whole euros; absent means unbounded
    #[serde(default = "defaults::max_price")]
    pub max_price: Option<i64>,

    /// Minimum living area in square meters
    #[serde(default)]
    pub min_area: i64,

    /// Allowed cities (empty = all, case-insensitive)
    #[serde(default)]
    pub cities: Vec<String>,

    /// Allowed property types (empty = all)
    #[serde(default)]
    pub property_types: Vec<String>,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            min_price: defaults::min_price(),
            max_price: defaults::max_price(),
            min_area: 0,
            cities: Vec::new(),
            property_types: Vec::new(),
        }
    }
}

/// Telegram bot credentials and per-kind enablement flags.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    /// Bot API token; empty disables the channel
    #[serde(default)]
    pub bot_token: String,

    /// Destination chat id; empty disables the channel
    #[serde(default)]
    pub chat_id: String,

    #[serde(default = "defaults::enabled")]
    pub notify_new: bool,

    #[serde(default = "defaults::enabled")]
    pub notify_updated: bool,

    #[serde(default = "defaults::enabled")]
    pub notify_removed: bool,

    #[serde(default = "defaults::enabled")]
    pub send_summary: bool,
}

impl TelegramConfig {
    /// Whether credentials are present.
    pub fn is_configured(&self) -> bool {
        !self.bot_token.trim().is_empty() && !self.chat_id.trim().is_empty()
    }
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            bot_token: String::new(),
            chat_id: String::new(),
            notify_new: true,
            notify_updated: true,
            notify_removed: true,
            send_summary: true,
        }
    }
}

/// Delivery retry discipline for notification channels.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifyConfig {
    /// Attempts per message before it is logged UNDELIVERED
    #[serde(default = "defaults::max_attempts")]
    pub max_attempts: u32,

    /// Base backoff delay, doubled per attempt, in milliseconds
    #[serde(default = "defaults::backoff_base")]
    pub backoff_base_ms: u64,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            max_attempts: defaults::max_attempts(),
            backoff_base_ms: defaults::backoff_base(),
        }
    }
}

mod defaults {
    use std::collections::BTreeMap;

    // General defaults
    pub fn scan_interval() -> u64 {
        30
    }
    pub fn store_dir() -> String {
        "data/store".into()
    }
    pub fn log_level() -> String {
        "info".into()
    }

    // Crawler defaults
    pub fn user_agent() -> String {
        "Mozilla/5.0 (compatible; huizenzoeker/0.1)".into()
    }
    pub fn timeout() -> u64 {
        30
    }
    pub fn source_timeout() -> u64 {
        120
    }
    pub fn request_delay() -> u64 {
        1000
    }
    pub fn max_concurrent() -> usize {
        4
    }

    // Filter defaults
    pub fn min_price() -> i64 {
        100_000
    }
    pub fn max_price() -> Option<i64> {
        Some(225_000)
    }

    // Notify defaults
    pub fn enabled() -> bool {
        true
    }
    pub fn max_attempts() -> u32 {
        3
    }
    pub fn backoff_base() -> u64 {
        500
    }

    // Source defaults
    pub fn sources() -> BTreeMap<String, bool> {
        let mut sources = BTreeMap::new();
        for id in ["klipenvw", "bijdevaate", "ooms", "rozenburg"] {
            sources.insert(id.to_string(), true);
        }
        sources
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_default_config_ok() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn validate_rejects_empty_user_agent() {
        let mut config = Config::default();
        config.crawler.user_agent = "  ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_zero_concurrency() {
        let mut config = Config::default();
        config.crawler.max_concurrent = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_inverted_price_bounds() {
        let mut config = Config::default();
        config.filter.min_price = 300_000;
        config.filter.max_price = Some(200_000);
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_all_sources_disabled() {
        let mut config = Config::default();
        for enabled in config.sources.values_mut() {
            *enabled = false;
        }
        assert!(config.validate().is_err());
    }

    #[test]
    fn enabled_sources_respects_flags() {
        let mut config = Config::default();
        config.sources.insert("ooms".to_string(), false);
        let enabled = config.enabled_sources();
        assert!(!enabled.contains(&"ooms".to_string()));
        assert!(enabled.contains(&"klipenvw".to_string()));
    }

    #[test]
    fn config_round_trips_through_toml() {
        let config = Config::default();
        let text = toml::to_string_pretty(&config).unwrap();
        let back: Config = toml::from_str(&text).unwrap();
        assert_eq!(back.general.scan_interval_minutes, 30);
        assert_eq!(back.filter.max_price, Some(225_000));
        assert!(back.sources["ooms"]);
    }

    #[test]
    fn telegram_is_configured_requires_both_fields() {
        let mut tg = TelegramConfig::default();
        assert!(!tg.is_configured());
        tg.bot_token = "123:abc".to_string();
        assert!(!tg.is_configured());
        tg.chat_id = "42".to_string();
        assert!(tg.is_configured());
    }
}
