//! Adapter for rozenburgmakelaardij.nl.

use async_trait::async_trait;
use scraper::{ElementRef, Html, Selector};

use crate::error::{AppError, Result};
use crate::models::CrawlerConfig;
use crate::scrapers::common::{self, SiteClient};
use crate::scrapers::{QueryHints, RawListing, SiteScraper};
use crate::utils::resolve_url;

pub struct RozenburgScraper {
    http: SiteClient,
    base_url: String,
    selectors: Selectors,
}

struct Selectors {
    card: Selector,
    results: Selector,
    link: Selector,
    address: Selector,
    city: Selector,
    price: Selector,
    area: Selector,
    kind: Selector,
}

impl RozenburgScraper {
    pub const SOURCE_ID: &'static str = "rozenburg";

    pub fn new(config: &CrawlerConfig) -> Result<Self> {
        Ok(Self {
            http: SiteClient::new(Self::SOURCE_ID, config, config.request_delay_ms)?,
            base_url: "https://www.rozenburgmakelaardij.nl".to_string(),
            selectors: Selectors {
                card: common::parse_selector(".property-item, .object, .woning")?,
                results: common::parse_selector(".aanbod, .objects, .woningen, .no-results")?,
                link: common::parse_selector("a[href]")?,
                address: common::parse_selector(".address, .street")?,
                city: common::parse_selector(".city, .location")?,
                price: common::parse_selector(".price, .object-price")?,
                area: common::parse_selector(".surface, .size")?,
                kind: common::parse_selector(".object-type, .type")?,
            },
        })
    }

    fn parse_index(&self, html: &str) -> Result<Vec<RawListing>> {
        let document = Html::parse_document(html);
        let cards: Vec<_> = document.select(&self.selectors.card).collect();

        if cards.is_empty() && document.select(&self.selectors.results).next().is_none() {
            return Err(AppError::parse(
                Self::SOURCE_ID,
                "no results container recognized in index page",
            ));
        }

        let mut listings = Vec::new();
        for card in &cards {
            match self.parse_card(card) {
                Some(listing) => listings.push(listing),
                None => log::debug!("Skipping malformed card on {}", Self::SOURCE_ID),
            }
        }
        Ok(listings)
    }

    /// The site sometimes renders a dedicated city element and sometimes
    /// a combined "street, city" address line.
    fn parse_card(&self, card: &ElementRef<'_>) -> Option<RawListing> {
        let href = common::select_attr(card, &self.selectors.link, "href")?;

        let address_line = common::select_text(card, &self.selectors.address);
        let city = common::select_text(card, &self.selectors.city);
        let (address, city) = match (address_line, city) {
            (Some(line), None) => common::split_address(&line),
            (address, city) => (address, city),
        };

        Some(RawListing {
            external_id: None,
            url: resolve_url(&self.base_url, &href),
            address,
            city,
            price_text: common::select_text(card, &self.selectors.price),
            area_text: common::select_text(card, &self.selectors.area),
            property_type: common::select_text(card, &self.selectors.kind),
        })
    }
}

#[async_trait]
impl SiteScraper for RozenburgScraper {
    fn source_id(&self) -> &'static str {
        Self::SOURCE_ID
    }

    async fn fetch_listings(&self, _hints: &QueryHints) -> Result<Vec<RawListing>> {
        let url = format!("{}/aanbod", self.base_url);
        let body = self.http.get_text(&url).await?;
        self.parse_index(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scraper() -> RozenburgScraper {
        RozenburgScraper::new(&CrawlerConfig::default()).unwrap()
    }

    #[test]
    fn test_parse_card_with_combined_address() {
        let html = r#"
            <div class="aanbod">
              <div class="woning">
                <a href="/aanbod/molendijk-15">Molendijk 15</a>
                <span class="address">Molendijk 15, Rozenburg</span>
                <span class="price">&euro; 210.000 k.k.</span>
              </div>
            </div>"#;
        let listings = scraper().parse_index(html).unwrap();
        assert_eq!(listings.len(), 1);
        assert_eq!(listings[0].address.as_deref(), Some("Molendijk 15"));
        assert_eq!(listings[0].city.as_deref(), Some("Rozenburg"));
    }

    #[test]
    fn test_parse_card_with_city_element() {
        let html = r#"
            <div class="aanbod">
              <div class="woning">
                <a href="/aanbod/haven-2">Haven 2</a>
                <span class="address">Haven 2</span>
                <span class="city">Rozenburg</span>
              </div>
            </div>"#;
        let listings = scraper().parse_index(html).unwrap();
        assert_eq!(listings[0].address.as_deref(), Some("Haven 2"));
        assert_eq!(listings[0].city.as_deref(), Some("Rozenburg"));
    }
}
