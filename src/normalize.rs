// src/normalize.rs

//! Normalization of raw scraped candidates into canonical listings.
//!
//! Everything in this module is pure: raw text in, validated values out.
//! A candidate that cannot be normalized is rejected individually and
//! never aborts the rest of its batch.

use std::fmt;
use std::sync::OnceLock;

use regex::Regex;
use sha2::{Digest, Sha256};

use crate::scrapers::RawListing;

/// A candidate that survived validation, ready for the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedListing {
    pub external_id: String,
    pub url: String,
    pub address: String,
    pub city: String,
    pub price: Option<i64>,
    pub area_m2: Option<i64>,
    pub property_type: Option<String>,
}

/// Why a single candidate was rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reject {
    MissingUrl,
    MissingExternalId { url: String },
    MissingLocation { url: String },
}

impl fmt::Display for Reject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reject::MissingUrl => write!(f, "candidate has no detail URL"),
            Reject::MissingExternalId { url } => {
                write!(f, "no external id could be derived for {url}")
            }
            Reject::MissingLocation { url } => {
                write!(f, "candidate has neither address nor city: {url}")
            }
        }
    }
}

/// Normalize one raw candidate.
///
/// Rejects candidates without a detail URL, without a derivable external
/// id, or with neither address nor city. A missing price parses to `None`
/// ("price on request"), never to 0.
pub fn normalize(raw: &RawListing) -> Result<NormalizedListing, Reject> {
    let url = clean_text(&raw.url);
    if url.is_empty() {
        return Err(Reject::MissingUrl);
    }

    let address = raw.address.as_deref().map(clean_text).unwrap_or_default();
    let city = raw.city.as_deref().map(clean_text).unwrap_or_default();
    if address.is_empty() && city.is_empty() {
        return Err(Reject::MissingLocation { url });
    }

    let external_id = match raw.external_id.as_deref().map(clean_text) {
        Some(id) if !id.is_empty() => id,
        _ => derive_external_id(&url).ok_or_else(|| Reject::MissingExternalId {
            url: url.clone(),
        })?,
    };

    let property_type = raw
        .property_type
        .as_deref()
        .map(clean_text)
        .filter(|t| !t.is_empty());

    Ok(NormalizedListing {
        external_id,
        url,
        // Placeholders keep both fields non-empty when only one was scraped
        address: if address.is_empty() {
            "Onbekend adres".to_string()
        } else {
            address
        },
        city: if city.is_empty() {
            "Onbekende plaats".to_string()
        } else {
            city
        },
        price: raw.price_text.as_deref().and_then(parse_price),
        area_m2: raw.area_text.as_deref().and_then(parse_area),
        property_type,
    })
}

/// Collapse runs of whitespace and trim.
pub fn clean_text(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Parse a price string into whole euros.
///
/// Tolerates `€` prefixes, `k.k.`/`v.o.n.` suffixes, and both `.` and `,`
/// in thousands or decimal position ("€ 150.000", "150,000", "149.500,50").
/// Returns `None` for "prijs op aanvraag" and for unparseable text.
pub fn parse_price(text: &str) -> Option<i64> {
    let lower = text.to_lowercase();
    if lower.contains("aanvraag") || lower.contains("request") || lower.contains("n.o.t.k") {
        return None;
    }
    parse_grouped_number(text)
}

/// Parse an area string ("75 m²", "75m2") into square meters.
pub fn parse_area(text: &str) -> Option<i64> {
    static AREA: OnceLock<Regex> = OnceLock::new();
    let re = AREA.get_or_init(|| {
        Regex::new(r"(?i)(\d[\d.,]*)\s*m[²2]?\b").expect("area pattern is valid")
    });

    if let Some(caps) = re.captures(text) {
        if let Some(value) = parse_grouped_number(caps.get(1)?.as_str()) {
            return Some(value);
        }
    }
    parse_grouped_number(text)
}

/// Parse the first numeric token of a string, resolving `.`/`,` roles.
fn parse_grouped_number(text: &str) -> Option<i64> {
    let token = first_numeric_token(text)?;
    let token = token.trim_matches(|c| c == '.' || c == ',');

    let dot = token.rfind('.');
    let comma = token.rfind(',');

    let decimal_sep = match (dot, comma) {
        // Both present: the later one separates decimals
        (Some(d), Some(c)) => Some(if d > c { '.' } else { ',' }),
        (Some(_), None) => single_separator_as_decimal(token, '.'),
        (None, Some(_)) => single_separator_as_decimal(token, ','),
        (None, None) => None,
    };

    let integer_part = match decimal_sep {
        Some(sep) => &token[..token.rfind(sep)?],
        None => token,
    };

    let digits: String = integer_part.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return None;
    }
    digits.parse().ok()
}

/// With a single separator kind, decide whether it marks decimals.
///
/// Repeated separators are always grouping; a single one followed by
/// exactly three digits is read as grouping ("250.000"), anything else
/// as a decimal point ("2,5").
fn single_separator_as_decimal(token: &str, sep: char) -> Option<char> {
    if token.matches(sep).count() > 1 {
        return None;
    }
    let after = &token[token.rfind(sep)? + sep.len_utf8()..];
    if after.len() == 3 && after.chars().all(|c| c.is_ascii_digit()) {
        None
    } else {
        Some(sep)
    }
}

/// Extract the first contiguous run of digits and separators.
fn first_numeric_token(text: &str) -> Option<&str> {
    let start = text.find(|c: char| c.is_ascii_digit())?;
    let rest = &text[start..];
    let end = rest
        .find(|c: char| !c.is_ascii_digit() && c != '.' && c != ',')
        .unwrap_or(rest.len());
    Some(&rest[..end])
}

/// Derive a stable external id from a detail URL.
///
/// Prefers the last non-empty path segment (sites use stable slugs or
/// numeric ids there); falls back to a short hash of the whole URL.
pub fn derive_external_id(url: &str) -> Option<String> {
    if let Ok(parsed) = url::Url::parse(url) {
        if let Some(segments) = parsed.path_segments() {
            if let Some(slug) = segments.filter(|s| !s.is_empty()).last() {
                let slug = slug.trim();
                if !slug.is_empty() {
                    return Some(slug.to_string());
                }
            }
        }
    }

    let trimmed = url.trim();
    if trimmed.is_empty() {
        return None;
    }
    let digest = Sha256::digest(trimmed.as_bytes());
    Some(hex::encode(&digest[..6]))
}
