// src/filter.rs

//! Notification-worthiness predicate over listings.
//!
//! The filter decides only whether a change is worth telling a
//! subscriber about; storage records every listing regardless.

use crate::models::{ChangeEvent, FilterConfig, Listing};

/// User-configured predicate, applied per change event.
#[derive(Debug, Clone)]
pub struct ListingFilter {
    min_price: i64,
    max_price: Option<i64>,
    min_area: i64,
    cities: Vec<String>,
    property_types: Vec<String>,
}

impl ListingFilter {
    pub fn from_config(config: &FilterConfig) -> Self {
        Self {
            min_price: config.min_price,
            max_price: config.max_price,
            min_area: config.min_area,
            cities: config.cities.iter().map(|c| c.to_lowercase()).collect(),
            property_types: config
                .property_types
                .iter()
                .map(|t| t.to_lowercase())
                .collect(),
        }
    }

    /// Pure predicate; inclusive price bounds.
    ///
    /// A "price on request" listing only passes a price-bounded filter
    /// when no bounds are in effect, and an unknown area only passes
    /// when `min_area` is 0.
    pub fn matches(&self, listing: &Listing) -> bool {
        match listing.price {
            Some(price) => {
                if price < self.min_price {
                    return false;
                }
                if self.max_price.is_some_and(|max| price > max) {
                    return false;
                }
            }
            None => {
                if self.min_price > 0 || self.max_price.is_some() {
                    return false;
                }
            }
        }

        match listing.area_m2 {
            Some(area) => {
                if area < self.min_area {
                    return false;
                }
            }
            None => {
                if self.min_area > 0 {
                    return false;
                }
            }
        }

        if !self.cities.is_empty() {
            let city = listing.city.to_lowercase();
            if !self.cities.iter().any(|c| city.contains(c)) {
                return false;
            }
        }

        if !self.property_types.is_empty() {
            match &listing.property_type {
                Some(t) if self.property_types.contains(&t.to_lowercase()) => {}
                _ => return false,
            }
        }

        true
    }

    /// Judge an event on its current listing; REMOVED events are judged
    /// on the previous snapshot since there is no current one.
    pub fn matches_event(&self, event: &ChangeEvent) -> bool {
        self.matches(event.subject())
    }
}
