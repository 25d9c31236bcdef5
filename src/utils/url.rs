// src/utils/url.rs

//! URL manipulation utilities.

use url::Url;

/// Resolve a potentially relative href against a base URL.
///
/// Falls back to the href as-is when resolution fails, so a malformed
/// candidate link is still visible downstream instead of vanishing.
pub fn resolve_url(base: &str, href: &str) -> String {
    match Url::parse(base) {
        Ok(base) => base
            .join(href)
            .map(|u| u.to_string())
            .unwrap_or_else(|_| href.to_string()),
        Err(_) => href.to_string(),
    }
}

/// Extract the domain from a URL string.
pub fn get_domain(url: &str) -> Option<String> {
    Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(|s| s.to_lowercase()))
}
