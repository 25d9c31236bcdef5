//! Change detection for one source's scan batch.
//!
//! Runs the two-phase algorithm against the source's working state:
//! upsert every normalized candidate (emitting NEW/UPDATED events), then
//! one removal pass over everything the scan did not mention. The
//! removal pass runs only here and only after all upserts, so a
//! paginated fetch can never mark listings removed mid-scan.

use std::collections::HashSet;

use chrono::{DateTime, Utc};

use crate::models::ChangeEvent;
use crate::normalize::NormalizedListing;
use crate::store::{SourceState, Upsert};

/// Diff a normalized batch against the source's last-known state.
///
/// Mutates `state` into the post-scan shape; the caller decides whether
/// that shape ever gets committed. Returns the classified events in
/// batch order, removals last.
pub fn detect_changes(
    state: &mut SourceState,
    batch: Vec<NormalizedListing>,
    now: DateTime<Utc>,
) -> Vec<ChangeEvent> {
    let mut events = Vec::new();
    let mut seen: HashSet<String> = HashSet::with_capacity(batch.len());

    for candidate in batch {
        if !seen.insert(candidate.external_id.clone()) {
            log::debug!(
                "Duplicate candidate '{}' in batch for {}",
                candidate.external_id,
                state.source_id()
            );
            continue;
        }

        match state.upsert(candidate, now) {
            Upsert::New { current } => events.push(ChangeEvent::new_listing(current, now)),
            Upsert::Updated {
                previous,
                current,
                changed,
            } => events.push(ChangeEvent::updated(previous, current, changed, now)),
            Upsert::Unchanged => {}
        }
    }

    for removed in state.mark_removed(&seen) {
        events.push(ChangeEvent::removed(removed, now));
    }

    events
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ChangeKind, ListingField, ListingStatus};
    use crate::normalize::normalize;
    use crate::scrapers::RawListing;

    fn candidate(id: &str, price: Option<i64>) -> NormalizedListing {
        NormalizedListing {
            external_id: id.to_string(),
            url: format!("https://example.nl/aanbod/{id}"),
            address: format!("Straat {id}"),
            city: "Rotterdam".to_string(),
            price,
            area_m2: Some(75),
            property_type: None,
        }
    }

    // Empty store, one scraped candidate with locale-formatted price and
    // area: exactly one NEW event with the parsed integers.
    #[test]
    fn test_new_listing_from_raw_candidate() {
        let raw = RawListing {
            external_id: Some("1".to_string()),
            url: "https://example.nl/aanbod/1".to_string(),
            address: Some("Grachtweg 12".to_string()),
            city: Some("Rotterdam".to_string()),
            price_text: Some("\u{20ac} 150.000".to_string()),
            area_text: Some("75 m\u{b2}".to_string()),
            property_type: None,
        };
        let batch = vec![normalize(&raw).unwrap()];

        let mut state = SourceState::empty("test");
        let events = detect_changes(&mut state, batch, Utc::now());

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, ChangeKind::New);
        let listing = events[0].current.as_ref().unwrap();
        assert_eq!(listing.price, Some(150_000));
        assert_eq!(listing.area_m2, Some(75));
        assert_eq!(listing.city, "Rotterdam");
    }

    #[test]
    fn test_identical_rescan_emits_nothing() {
        let mut state = SourceState::empty("test");
        let now = Utc::now();
        detect_changes(&mut state, vec![candidate("1", Some(150_000))], now);

        let later = now + chrono::Duration::minutes(30);
        let events = detect_changes(&mut state, vec![candidate("1", Some(150_000))], later);
        assert!(events.is_empty());
    }

    #[test]
    fn test_price_drop_emits_single_updated_event() {
        let mut state = SourceState::empty("test");
        let now = Utc::now();
        detect_changes(&mut state, vec![candidate("1", Some(150_000))], now);

        let events = detect_changes(&mut state, vec![candidate("1", Some(140_000))], now);

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, ChangeKind::Updated);
        assert_eq!(events[0].changed, vec![ListingField::Price]);
        assert_eq!(events[0].previous.as_ref().unwrap().price, Some(150_000));
        assert_eq!(events[0].current.as_ref().unwrap().price, Some(140_000));
    }

    #[test]
    fn test_absent_listing_is_removed_exactly_once() {
        let mut state = SourceState::empty("test");
        let now = Utc::now();
        detect_changes(
            &mut state,
            vec![candidate("1", Some(1)), candidate("2", Some(2))],
            now,
        );

        let events = detect_changes(&mut state, vec![candidate("2", Some(2))], now);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, ChangeKind::Removed);
        assert_eq!(events[0].previous.as_ref().unwrap().external_id, "1");
        assert_eq!(state.get("1").unwrap().status, ListingStatus::Removed);

        // The next scan without it stays quiet
        let again = detect_changes(&mut state, vec![candidate("2", Some(2))], now);
        assert!(again.is_empty());
    }

    #[test]
    fn test_empty_batch_removes_everything() {
        let mut state = SourceState::empty("test");
        let now = Utc::now();
        detect_changes(&mut state, vec![candidate("1", Some(1))], now);

        let events = detect_changes(&mut state, Vec::new(), now);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, ChangeKind::Removed);
    }

    #[test]
    fn test_duplicate_candidates_collapse_to_one_event() {
        let mut state = SourceState::empty("test");
        let events = detect_changes(
            &mut state,
            vec![candidate("1", Some(1)), candidate("1", Some(2))],
            Utc::now(),
        );
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, ChangeKind::New);
        // First occurrence wins
        assert_eq!(events[0].current.as_ref().unwrap().price, Some(1));
    }

    #[test]
    fn test_relisting_emits_new_with_flag() {
        let mut state = SourceState::empty("test");
        let t0 = Utc::now();
        detect_changes(&mut state, vec![candidate("1", Some(1))], t0);
        detect_changes(&mut state, Vec::new(), t0);

        let t1 = t0 + chrono::Duration::days(7);
        let events = detect_changes(&mut state, vec![candidate("1", Some(1))], t1);

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, ChangeKind::New);
        let listing = events[0].current.as_ref().unwrap();
        assert!(listing.relisted);
        assert_eq!(listing.first_seen_at, t0);
    }

    #[test]
    fn test_mixed_batch() {
        let mut state = SourceState::empty("test");
        let now = Utc::now();
        detect_changes(
            &mut state,
            vec![candidate("keep", Some(1)), candidate("change", Some(2)), candidate("gone", Some(3))],
            now,
        );

        let events = detect_changes(
            &mut state,
            vec![
                candidate("keep", Some(1)),
                candidate("change", Some(20)),
                candidate("fresh", Some(4)),
            ],
            now,
        );

        let kinds: Vec<ChangeKind> = events.iter().map(|e| e.kind).collect();
        assert_eq!(
            kinds,
            vec![ChangeKind::Updated, ChangeKind::New, ChangeKind::Removed]
        );
    }
}
