//! Canonical listing data structure.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle status of a listing within the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListingStatus {
    /// Present in the most recent successful full scan of its source
    Active,
    /// Absent from a successful full scan after having been active
    Removed,
}

/// Fields that participate in change detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListingField {
    Price,
    AreaM2,
    Address,
    Status,
}

impl ListingField {
    /// Dutch display label, as used in notification messages.
    pub fn label(&self) -> &'static str {
        match self {
            ListingField::Price => "Prijs",
            ListingField::AreaM2 => "Oppervlakte",
            ListingField::Address => "Adres",
            ListingField::Status => "Status",
        }
    }
}

/// A canonical property listing.
///
/// `(source_id, external_id)` identifies the listing across its entire
/// lifetime, even when address, price, or URL change. Timestamps and
/// `status` are maintained by the store, never by adapters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Listing {
    /// Identifier of the originating site adapter
    pub source_id: String,

    /// Adapter-assigned identifier, unique within the source
    pub external_id: String,

    /// Street address
    pub address: String,

    /// City or town
    pub city: String,

    /// Asking price in whole euros; `None` means "price on request"
    #[serde(default)]
    pub price: Option<i64>,

    /// Living area in square meters, if known
    #[serde(default)]
    pub area_m2: Option<i64>,

    /// Free-text property category (e.g. "Eengezinswoning")
    #[serde(default)]
    pub property_type: Option<String>,

    /// Canonical absolute URL of the detail page
    pub url: String,

    /// First time this listing was seen by any scan
    pub first_seen_at: DateTime<Utc>,

    /// Most recent scan that included this listing
    pub last_seen_at: DateTime<Utc>,

    /// Current lifecycle status
    pub status: ListingStatus,

    /// Set when a removed listing reappeared under the same identity
    #[serde(default)]
    pub relisted: bool,
}

impl Listing {
    /// Compare the change-detected fields against a newer snapshot.
    ///
    /// Comparison is exact equality on normalized values; a transition
    /// between a known price and "price on request" counts as a change.
    pub fn changed_fields(&self, newer: &Listing) -> Vec<ListingField> {
        let mut changed = Vec::new();
        if self.price != newer.price {
            changed.push(ListingField::Price);
        }
        if self.status != newer.status {
            changed.push(ListingField::Status);
        }
        if self.area_m2 != newer.area_m2 {
            changed.push(ListingField::AreaM2);
        }
        if self.address != newer.address {
            changed.push(ListingField::Address);
        }
        changed
    }

    /// Display value for one change-detected field.
    pub fn field_value(&self, field: ListingField) -> String {
        match field {
            ListingField::Price => match self.price {
                Some(p) => format_euros(p),
                None => "prijs op aanvraag".to_string(),
            },
            ListingField::AreaM2 => match self.area_m2 {
                Some(a) => format!("{a} m\u{b2}"),
                None => "onbekend".to_string(),
            },
            ListingField::Address => self.address.clone(),
            ListingField::Status => match self.status {
                ListingStatus::Active => "actief".to_string(),
                ListingStatus::Removed => "verwijderd".to_string(),
            },
        }
    }
}

/// Format a whole-euro amount with dot thousand separators ("€ 150.000").
pub fn format_euros(amount: i64) -> String {
    let digits = amount.abs().to_string();
    let mut grouped = String::new();
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push('.');
        }
        grouped.push(c);
    }
    if amount < 0 {
        format!("\u{20ac} -{grouped}")
    } else {
        format!("\u{20ac} {grouped}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_listing() -> Listing {
        Listing {
            source_id: "ooms".to_string(),
            external_id: "huis-aan-de-gracht-12".to_string(),
            address: "Grachtweg 12".to_string(),
            city: "Rotterdam".to_string(),
            price: Some(150_000),
            area_m2: Some(75),
            property_type: Some("Appartement".to_string()),
            url: "https://www.ooms.com/woningaanbod/huis-aan-de-gracht-12".to_string(),
            first_seen_at: Utc::now(),
            last_seen_at: Utc::now(),
            status: ListingStatus::Active,
            relisted: false,
        }
    }

    #[test]
    fn test_changed_fields_price_only() {
        let old = sample_listing();
        let mut new = old.clone();
        new.price = Some(140_000);

        assert_eq!(old.changed_fields(&new), vec![ListingField::Price]);
    }

    #[test]
    fn test_changed_fields_price_to_on_request() {
        let old = sample_listing();
        let mut new = old.clone();
        new.price = None;

        assert_eq!(old.changed_fields(&new), vec![ListingField::Price]);
    }

    #[test]
    fn test_changed_fields_identical() {
        let old = sample_listing();
        let new = old.clone();
        assert!(old.changed_fields(&new).is_empty());
    }

    #[test]
    fn test_changed_fields_multiple_in_one_pass() {
        let old = sample_listing();
        let mut new = old.clone();
        new.price = Some(160_000);
        new.area_m2 = Some(80);

        let changed = old.changed_fields(&new);
        assert!(changed.contains(&ListingField::Price));
        assert!(changed.contains(&ListingField::AreaM2));
        assert_eq!(changed.len(), 2);
    }

    #[test]
    fn test_format_euros() {
        assert_eq!(format_euros(150_000), "\u{20ac} 150.000");
        assert_eq!(format_euros(1_234_567), "\u{20ac} 1.234.567");
        assert_eq!(format_euros(950), "\u{20ac} 950");
        assert_eq!(format_euros(0), "\u{20ac} 0");
    }

    #[test]
    fn test_listing_serde_round_trip() {
        let listing = sample_listing();
        let json = serde_json::to_string(&listing).unwrap();
        let back: Listing = serde_json::from_str(&json).unwrap();
        assert_eq!(listing, back);
    }
}
