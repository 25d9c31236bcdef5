//! Adapter for klipenvw.nl.

use async_trait::async_trait;
use scraper::{ElementRef, Html, Selector};

use crate::error::{AppError, Result};
use crate::models::CrawlerConfig;
use crate::scrapers::common::{self, SiteClient};
use crate::scrapers::{QueryHints, RawListing, SiteScraper};
use crate::utils::resolve_url;

/// Pagination safety cap; the site never has this many result pages.
const MAX_PAGES: usize = 10;

/// Scraper for klipenvw.nl, which paginates its listing index and puts
/// street and city on one address line.
pub struct KlipEnVwScraper {
    http: SiteClient,
    base_url: String,
    selectors: Selectors,
}

struct Selectors {
    card: Selector,
    results: Selector,
    link: Selector,
    address: Selector,
    price: Selector,
    area: Selector,
    kind: Selector,
}

impl KlipEnVwScraper {
    pub const SOURCE_ID: &'static str = "klipenvw";

    /// The site throttles aggressively; never go below this interval.
    const MIN_DELAY_MS: u64 = 1500;

    pub fn new(config: &CrawlerConfig) -> Result<Self> {
        let delay_ms = config.request_delay_ms.max(Self::MIN_DELAY_MS);
        Ok(Self {
            http: SiteClient::new(Self::SOURCE_ID, config, delay_ms)?,
            base_url: "https://www.klipenvw.nl".to_string(),
            selectors: Selectors {
                card: common::parse_selector(".property-item, .property-container")?,
                results: common::parse_selector(".woningaanbod, .properties, .no-results")?,
                link: common::parse_selector(r#"a.property-link, a[href*="woningaanbod"]"#)?,
                address: common::parse_selector(".property-address, .address")?,
                price: common::parse_selector(".property-price, .price")?,
                area: common::parse_selector(".property-size, .size")?,
                kind: common::parse_selector(".property-type, .type")?,
            },
        })
    }

    fn page_url(&self, hints: &QueryHints, page: usize) -> String {
        let mut url = format!("{}/woningaanbod?pagina={page}", self.base_url);
        if let Some(min) = hints.min_price {
            url.push_str(&format!("&prijs-van={min}"));
        }
        if let Some(max) = hints.max_price {
            url.push_str(&format!("&prijs-tot={max}"));
        }
        url
    }

    fn parse_index(&self, html: &str, first_page: bool) -> Result<Vec<RawListing>> {
        let document = Html::parse_document(html);
        let cards: Vec<_> = document.select(&self.selectors.card).collect();

        // Only the first page must prove the markup is still understood;
        // later pages are legitimately empty past the end of the index.
        if first_page
            && cards.is_empty()
            && document.select(&self.selectors.results).next().is_none()
        {
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
        let (address, city) = common::select_text(card, &self.selectors.address)
            .map(|line| common::split_address(&line))
            .unwrap_or((None, None));

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
impl SiteScraper for KlipEnVwScraper {
    fn source_id(&self) -> &'static str {
        Self::SOURCE_ID
    }

    async fn fetch_listings(&self, hints: &QueryHints) -> Result<Vec<RawListing>> {
        let mut all = Vec::new();

        // Any page failure fails the whole call: a truncated index must
        // not be mistaken for a full scan.
        for page in 1..=MAX_PAGES {
            let body = self.http.get_text(&self.page_url(hints, page)).await?;
            let listings = self.parse_index(&body, page == 1)?;
            if listings.is_empty() {
                break;
            }
            all.extend(listings);
        }
        Ok(all)
    }
}
