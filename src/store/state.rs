//! In-memory working state of one source's listings.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};

use crate::models::{Listing, ListingField, ListingStatus};
use crate::normalize::NormalizedListing;

/// Outcome of applying one normalized candidate to the state.
#[derive(Debug, Clone)]
pub enum Upsert {
    /// First sighting, or a removed listing that reappeared (the current
    /// snapshot carries `relisted` in that case)
    New { current: Listing },
    /// An existing active listing with at least one changed field
    Updated {
        previous: Listing,
        current: Listing,
        changed: Vec<ListingField>,
    },
    /// Nothing to report; only `last_seen_at` advanced
    Unchanged,
}

/// The last-known listings of one source, keyed by external id.
///
/// All mutations for a scan happen on this working copy; nothing is
/// durable until the store commits the whole state in one piece. A
/// dropped state discards the scan, leaving the last commit untouched.
#[derive(Debug, Clone)]
pub struct SourceState {
    source_id: String,
    listings: HashMap<String, Listing>,
}

impl SourceState {
    /// Empty state for a source that has never been committed.
    pub fn empty(source_id: impl Into<String>) -> Self {
        Self {
            source_id: source_id.into(),
            listings: HashMap::new(),
        }
    }

    /// Rebuild state from a committed snapshot.
    pub fn from_listings(source_id: impl Into<String>, listings: Vec<Listing>) -> Self {
        Self {
            source_id: source_id.into(),
            listings: listings
                .into_iter()
                .map(|l| (l.external_id.clone(), l))
                .collect(),
        }
    }

    pub fn source_id(&self) -> &str {
        &self.source_id
    }

    pub fn len(&self) -> usize {
        self.listings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listings.is_empty()
    }

    pub fn get(&self, external_id: &str) -> Option<&Listing> {
        self.listings.get(external_id)
    }

    /// Currently active listings.
    pub fn active(&self) -> impl Iterator<Item = &Listing> {
        self.listings
            .values()
            .filter(|l| l.status == ListingStatus::Active)
    }

    /// All listings, sorted by external id for deterministic snapshots.
    pub fn sorted_listings(&self) -> Vec<Listing> {
        let mut listings: Vec<Listing> = self.listings.values().cloned().collect();
        listings.sort_by(|a, b| a.external_id.cmp(&b.external_id));
        listings
    }

    /// Apply one normalized candidate.
    ///
    /// Timestamps are maintained here: `first_seen_at` is set once and
    /// survives removal and relisting, `last_seen_at` advances on every
    /// sighting. A removed listing that reappears becomes a `New` upsert
    /// with `relisted` set and its original `first_seen_at` preserved.
    pub fn upsert(&mut self, incoming: NormalizedListing, now: DateTime<Utc>) -> Upsert {
        match self.listings.get(&incoming.external_id) {
            None => {
                let current = self.materialize(incoming, now, now, false);
                self.listings
                    .insert(current.external_id.clone(), current.clone());
                Upsert::New { current }
            }
            Some(existing) if existing.status == ListingStatus::Removed => {
                let first_seen_at = existing.first_seen_at;
                let current = self.materialize(incoming, first_seen_at, now, true);
                self.listings
                    .insert(current.external_id.clone(), current.clone());
                Upsert::New { current }
            }
            Some(existing) => {
                let previous = existing.clone();
                let mut current =
                    self.materialize(incoming, previous.first_seen_at, now, previous.relisted);
                let changed = previous.changed_fields(&current);

                if changed.is_empty() {
                    // Still write through: url/city/type corrections and
                    // the fresh last_seen_at are kept without an event.
                    current.relisted = previous.relisted;
                    self.listings.insert(current.external_id.clone(), current);
                    Upsert::Unchanged
                } else {
                    self.listings
                        .insert(current.external_id.clone(), current.clone());
                    Upsert::Updated {
                        previous,
                        current,
                        changed,
                    }
                }
            }
        }
    }

    /// Flip every active listing absent from `still_active` to removed.
    ///
    /// This is the only Active -> Removed path and must run exactly once
    /// per successful full scan, after all upserts for that scan.
    pub fn mark_removed(&mut self, still_active: &HashSet<String>) -> Vec<Listing> {
        let mut removed = Vec::new();
        for listing in self.listings.values_mut() {
            if listing.status == ListingStatus::Active
                && !still_active.contains(&listing.external_id)
            {
                listing.status = ListingStatus::Removed;
                removed.push(listing.clone());
            }
        }
        removed.sort_by(|a, b| a.external_id.cmp(&b.external_id));
        removed
    }

    fn materialize(
        &self,
        incoming: NormalizedListing,
        first_seen_at: DateTime<Utc>,
        now: DateTime<Utc>,
        relisted: bool,
    ) -> Listing {
        Listing {
            source_id: self.source_id.clone(),
            external_id: incoming.external_id,
            address: incoming.address,
            city: incoming.city,
            price: incoming.price,
            area_m2: incoming.area_m2,
            property_type: incoming.property_type,
            url: incoming.url,
            first_seen_at,
            last_seen_at: now,
            status: ListingStatus::Active,
            relisted,
        }
    }
}
