//! Listing store abstractions.
//!
//! The store owns the durable last-known state of every listing, keyed
//! by `(source_id, external_id)`. Each source commits as one atomic
//! unit: the full set of upserts plus the removal pass, or nothing.
//! Sources never touch each other's rows, so concurrency-correctness
//! reduces to one serialized commit per source per cycle.

pub mod local;
mod state;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::models::{ChangeEvent, Listing, ListingStatus};

// Re-export for convenience
pub use local::LocalStore;
pub use state::{SourceState, Upsert};

/// Query over stored listings, used by the UI-facing interface.
#[derive(Debug, Clone)]
pub struct ListingQuery {
    /// Case-insensitive substring match on the city
    pub city: Option<String>,
    pub min_price: Option<i64>,
    pub max_price: Option<i64>,
    pub min_area: Option<i64>,
    /// Case-insensitive exact match on the property type
    pub property_type: Option<String>,
    /// Include listings already marked removed
    pub include_removed: bool,
    pub offset: usize,
    pub limit: Option<usize>,
}

impl Default for ListingQuery {
    fn default() -> Self {
        Self {
            city: None,
            min_price: None,
            max_price: None,
            min_area: None,
            property_type: None,
            include_removed: false,
            offset: 0,
            limit: Some(50),
        }
    }
}

impl ListingQuery {
    /// Whether a stored listing satisfies this query.
    pub fn matches(&self, listing: &Listing) -> bool {
        if !self.include_removed && listing.status == ListingStatus::Removed {
            return false;
        }
        if self.min_price.is_some() || self.max_price.is_some() {
            match listing.price {
                Some(price) => {
                    if self.min_price.is_some_and(|min| price < min) {
                        return false;
                    }
                    if self.max_price.is_some_and(|max| price > max) {
                        return false;
                    }
                }
                // Price-bounded queries cannot place "price on request"
                None => return false,
            }
        }
        if let Some(min_area) = self.min_area {
            match listing.area_m2 {
                Some(area) if area >= min_area => {}
                _ => return false,
            }
        }
        if let Some(city) = &self.city {
            if !listing.city.to_lowercase().contains(&city.to_lowercase()) {
                return false;
            }
        }
        if let Some(kind) = &self.property_type {
            match &listing.property_type {
                Some(t) if t.eq_ignore_ascii_case(kind) => {}
                _ => return false,
            }
        }
        true
    }
}

/// One page of query results.
#[derive(Debug, Clone)]
pub struct ListingPage {
    /// Matching listings before pagination
    pub total: usize,
    pub listings: Vec<Listing>,
}

/// Durable storage for listings and the change audit log.
#[async_trait]
pub trait ListingStore: Send + Sync {
    /// Load the committed state of one source; empty on cold start.
    ///
    /// The active subset of the returned state is the `previous` input
    /// of change detection.
    async fn load_source(&self, source_id: &str) -> Result<SourceState>;

    /// Atomically replace one source's state and append its events to
    /// the audit log. Either everything commits or nothing does.
    async fn commit_source(&self, state: &SourceState, events: &[ChangeEvent]) -> Result<()>;

    /// Query stored listings across all sources.
    async fn list_listings(&self, query: &ListingQuery) -> Result<ListingPage>;

    /// Change events recorded at or after `since`, oldest first.
    async fn recent_changes(&self, since: DateTime<Utc>) -> Result<Vec<ChangeEvent>>;
}
