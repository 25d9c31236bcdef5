//! Adapter for bijdevaatemakelaardij.nl.

use async_trait::async_trait;
use scraper::{ElementRef, Html, Selector};

use crate::error::{AppError, Result};
use crate::models::CrawlerConfig;
use crate::scrapers::common::{self, SiteClient};
use crate::scrapers::{QueryHints, RawListing, SiteScraper};
use crate::utils::resolve_url;

pub struct BijDeVaateScraper {
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

impl BijDeVaateScraper {
    pub const SOURCE_ID: &'static str = "bijdevaate";

    pub fn new(config: &CrawlerConfig) -> Result<Self> {
        Ok(Self {
            http: SiteClient::new(Self::SOURCE_ID, config, config.request_delay_ms)?,
            base_url: "https://bijdevaatemakelaardij.nl".to_string(),
            selectors: Selectors {
                card: common::parse_selector(".property-item, .object, .woning")?,
                results: common::parse_selector(".aanbod, .objects, .woningen, .no-results")?,
                link: common::parse_selector("a[href]")?,
                address: common::parse_selector(".street, .address")?,
                city: common::parse_selector(".city, .location")?,
                price: common::parse_selector(".price, .object-price")?,
                area: common::parse_selector(".surface, .object-surface, .size")?,
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

    fn parse_card(&self, card: &ElementRef<'_>) -> Option<RawListing> {
        let href = common::select_attr(card, &self.selectors.link, "href")?;
        Some(RawListing {
            external_id: None,
            url: resolve_url(&self.base_url, &href),
            address: common::select_text(card, &self.selectors.address),
            city: common::select_text(card, &self.selectors.city),
            price_text: common::select_text(card, &self.selectors.price),
            area_text: common::select_text(card, &self.selectors.area),
            property_type: common::select_text(card, &self.selectors.kind),
        })
    }
}

#[async_trait]
impl SiteScraper for BijDeVaateScraper {
    fn source_id(&self) -> &'static str {
        Self::SOURCE_ID
    }

    async fn fetch_listings(&self, _hints: &QueryHints) -> Result<Vec<RawListing>> {
        // The site has no query-side narrowing; the full index is small.
        let url = format!("{}/aanbod", self.base_url);
        let body = self.http.get_text(&url).await?;
        self.parse_index(&body)
    }
}
