// src/scrapers/mod.rs

//! Site adapters for the watched listing websites.
//!
//! Each adapter translates one site's markup into raw candidate records.
//! Adapters never decide notification-worthiness; query hints are only a
//! courtesy narrowing of the remote search. An adapter fails its whole
//! call when the listing index cannot be retrieved or recognized, and is
//! required to distinguish "zero listings found" from "could not
//! determine" - a malformed individual card is skipped instead.

mod bijdevaate;
mod common;
mod klipenvw;
mod ooms;
mod rozenburg;

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{Config, FilterConfig};

pub use bijdevaate::BijDeVaateScraper;
pub use klipenvw::KlipEnVwScraper;
pub use ooms::OomsScraper;
pub use rozenburg::RozenburgScraper;

/// Source ids with a registered adapter implementation.
pub const KNOWN_SOURCES: &[&str] = &[
    BijDeVaateScraper::SOURCE_ID,
    KlipEnVwScraper::SOURCE_ID,
    OomsScraper::SOURCE_ID,
    RozenburgScraper::SOURCE_ID,
];

/// Query-side narrowing hints passed to adapters.
///
/// Hints may reduce remote result pages but never replace the filter;
/// whatever an adapter yields is stored regardless of these bounds.
#[derive(Debug, Clone, Default)]
pub struct QueryHints {
    pub min_price: Option<i64>,
    pub max_price: Option<i64>,
    pub city: Option<String>,
}

impl QueryHints {
    pub fn from_filter(filter: &FilterConfig) -> Self {
        Self {
            min_price: (filter.min_price > 0).then_some(filter.min_price),
            max_price: filter.max_price,
            city: filter.cities.first().cloned(),
        }
    }
}

/// A raw candidate record as scraped from a results page.
///
/// Owned by the adapter and discarded after normalization.
#[derive(Debug, Clone, Default)]
pub struct RawListing {
    /// Site-native identifier, when the markup exposes one
    pub external_id: Option<String>,
    /// Absolute URL of the detail page
    pub url: String,
    pub address: Option<String>,
    pub city: Option<String>,
    pub price_text: Option<String>,
    pub area_text: Option<String>,
    pub property_type: Option<String>,
}

/// Capability interface every site adapter implements.
#[async_trait]
pub trait SiteScraper: Send + Sync {
    /// Stable identifier of this source.
    fn source_id(&self) -> &'static str;

    /// Enumerate the complete current listing index of the site.
    ///
    /// Returns `AppError::Fetch` when the index could not be retrieved
    /// (transient) and `AppError::Parse` when the markup was not
    /// recognized. An `Ok(vec![])` means the site genuinely has zero
    /// matching listings.
    async fn fetch_listings(&self, hints: &QueryHints) -> Result<Vec<RawListing>>;
}

/// Build adapter instances for every enabled source.
///
/// Unknown enabled ids are logged and skipped so a stale config entry
/// cannot take the whole process down.
pub fn build_scrapers(config: &Config) -> Result<Vec<Arc<dyn SiteScraper>>> {
    let mut scrapers: Vec<Arc<dyn SiteScraper>> = Vec::new();

    for source_id in config.enabled_sources() {
        match source_id.as_str() {
            BijDeVaateScraper::SOURCE_ID => {
                scrapers.push(Arc::new(BijDeVaateScraper::new(&config.crawler)?));
            }
            KlipEnVwScraper::SOURCE_ID => {
                scrapers.push(Arc::new(KlipEnVwScraper::new(&config.crawler)?));
            }
            OomsScraper::SOURCE_ID => {
                scrapers.push(Arc::new(OomsScraper::new(&config.crawler)?));
            }
            RozenburgScraper::SOURCE_ID => {
                scrapers.push(Arc::new(RozenburgScraper::new(&config.crawler)?));
            }
            unknown => {
                log::warn!("No adapter registered for enabled source '{unknown}', skipping");
            }
        }
    }

    Ok(scrapers)
}
