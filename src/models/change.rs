//! Change events and cycle reporting structures.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{Listing, ListingField};

/// Classification of a detected delta.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    New,
    Updated,
    Removed,
}

/// A classified delta for one listing, produced by the change detector.
///
/// `previous` is absent for NEW, `current` is absent for REMOVED. An
/// UPDATED event carries every changed field in one event, never two
/// events for the same listing in the same cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub kind: ChangeKind,
    pub source_id: String,

    /// Snapshot before the change (absent for NEW)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous: Option<Listing>,

    /// Snapshot after the change (absent for REMOVED)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current: Option<Listing>,

    /// Which fields differ (UPDATED only)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub changed: Vec<ListingField>,

    pub occurred_at: DateTime<Utc>,
}

impl ChangeEvent {
    pub fn new_listing(current: Listing, occurred_at: DateTime<Utc>) -> Self {
        Self {
            kind: ChangeKind::New,
            source_id: current.source_id.clone(),
            previous: None,
            current: Some(current),
            changed: Vec::new(),
            occurred_at,
        }
    }

    pub fn updated(
        previous: Listing,
        current: Listing,
        changed: Vec<ListingField>,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        Self {
            kind: ChangeKind::Updated,
            source_id: current.source_id.clone(),
            previous: Some(previous),
            current: Some(current),
            changed,
            occurred_at,
        }
    }

    pub fn removed(previous: Listing, occurred_at: DateTime<Utc>) -> Self {
        Self {
            kind: ChangeKind::Removed,
            source_id: previous.source_id.clone(),
            previous: Some(previous),
            current: None,
            changed: Vec::new(),
            occurred_at,
        }
    }

    /// The snapshot this event should be judged on: the current listing,
    /// or the previous one for REMOVED events.
    pub fn subject(&self) -> &Listing {
        self.current
            .as_ref()
            .or(self.previous.as_ref())
            .expect("change event without any snapshot")
    }
}

/// Per-source outcome of one scan within a cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceReport {
    pub source_id: String,
    pub success: bool,

    /// Error description when the scan failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    pub new: usize,
    pub updated: usize,
    pub removed: usize,

    /// Candidates rejected by the normalizer
    pub rejected: usize,

    pub duration_ms: u64,
}

impl SourceReport {
    pub fn failed(source_id: &str, error: String, duration_ms: u64) -> Self {
        Self {
            source_id: source_id.to_string(),
            success: false,
            error: Some(error),
            new: 0,
            updated: 0,
            removed: 0,
            rejected: 0,
            duration_ms,
        }
    }
}

/// Aggregate result of one full scan cycle across all enabled sources.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CycleSummary {
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,

    pub new: usize,
    pub updated: usize,
    pub removed: usize,

    /// Notifications that exhausted their retry budget
    pub undelivered: usize,

    /// Whether the cycle was cut short by shutdown
    pub cancelled: bool,

    pub sources: Vec<SourceReport>,
}

impl CycleSummary {
    pub fn total_changes(&self) -> usize {
        self.new + self.updated + self.removed
    }

    pub fn failed_sources(&self) -> impl Iterator<Item = &SourceReport> {
        self.sources.iter().filter(|s| !s.success)
    }
}
