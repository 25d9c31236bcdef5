//! Shared plumbing for site adapters.

use std::time::Duration;

use scraper::{ElementRef, Selector};

use crate::error::{AppError, Result};
use crate::models::CrawlerConfig;
use crate::normalize::clean_text;

/// HTTP access for one site, with a courtesy delay between requests.
///
/// The delay is adapter-local: a site that dislikes bursts gets a longer
/// interval without slowing the others down.
pub struct SiteClient {
    source_id: &'static str,
    client: reqwest::Client,
    delay: Duration,
}

impl SiteClient {
    pub fn new(source_id: &'static str, config: &CrawlerConfig, delay_ms: u64) -> Result<Self> {
        Ok(Self {
            source_id,
            client: crate::utils::http::create_client(config)?,
            delay: Duration::from_millis(delay_ms),
        })
    }

    /// Fetch a page body as text.
    ///
    /// Any transport or HTTP-status problem becomes a fetch failure for
    /// this source; the caller treats that as "could not determine".
    pub async fn get_text(&self, url: &str) -> Result<String> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| AppError::fetch(self.source_id, e))?;

        let response = response
            .error_for_status()
            .map_err(|e| AppError::fetch(self.source_id, e))?;

        let text = response
            .text()
            .await
            .map_err(|e| AppError::fetch(self.source_id, e))?;

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        Ok(text)
    }
}

/// Parse a CSS selector, mapping failures to a selector error.
pub fn parse_selector(s: &str) -> Result<Selector> {
    Selector::parse(s).map_err(|e| AppError::selector(s, format!("{e:?}")))
}

/// Collected, whitespace-normalized text of the first match.
pub fn select_text(element: &ElementRef<'_>, selector: &Selector) -> Option<String> {
    element.select(selector).next().map(|el| {
        let text: String = el.text().collect();
        clean_text(&text)
    })
}

/// An attribute of the first match.
pub fn select_attr(element: &ElementRef<'_>, selector: &Selector, attr: &str) -> Option<String> {
    element
        .select(selector)
        .next()
        .and_then(|el| el.value().attr(attr))
        .map(|v| v.trim().to_string())
}

/// Split a combined "street, city" line into its parts.
pub fn split_address(text: &str) -> (Option<String>, Option<String>) {
    match text.split_once(',') {
        Some((street, city)) => {
            let street = clean_text(street);
            let city = clean_text(city);
            (
                (!street.is_empty()).then_some(street),
                (!city.is_empty()).then_some(city),
            )
        }
        None => {
            let street = clean_text(text);
            ((!street.is_empty()).then_some(street), None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scraper::Html;

    #[test]
    fn test_parse_selector_valid() {
        assert!(parse_selector("div.property").is_ok());
        assert!(parse_selector(".price, .object-price").is_ok());
    }

    #[test]
    fn test_parse_selector_invalid() {
        assert!(parse_selector("[[invalid").is_err());
    }

    #[test]
    fn test_select_text_normalizes_whitespace() {
        let html = Html::parse_fragment("<div><span class='a'>  Kerkstraat\n 4 </span></div>");
        let root = html.root_element();
        let sel = parse_selector(".a").unwrap();
        assert_eq!(select_text(&root, &sel), Some("Kerkstraat 4".to_string()));
    }

    #[test]
    fn test_split_address_with_city() {
        let (street, city) = split_address("Kerkstraat 4, Spijkenisse");
        assert_eq!(street.as_deref(), Some("Kerkstraat 4"));
        assert_eq!(city.as_deref(), Some("Spijkenisse"));
    }

    #[test]
    fn test_split_address_without_city() {
        let (street, city) = split_address("Kerkstraat 4");
        assert_eq!(street.as_deref(), Some("Kerkstraat 4"));
        assert_eq!(city, None);
    }
}
