//! HTTP client for the MTG catalog `/cards` endpoint.
//!
//! Two lookups feed the deck pipeline: an exact-name search for the
//! commander, and a color-filtered page for the companion pool.

use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::Url;

use crate::config;
use crate::error::{DeckforgeError, Result};
use crate::models::{CardsPage, CatalogCard};

/// Source of commander and pool cards.
///
/// [`CatalogClient`] is the network implementation; anything else that can
/// answer these two lookups (a fixture, a local mirror) can stand in for it.
pub trait CardSource: Send + Sync {
    /// Look up a commander by exact name. The first match wins.
    fn fetch_commander(&self, name: &str) -> Result<CatalogCard>;

    /// Fetch up to one page of cards matching any of `colors`, or an
    /// unfiltered page when `colors` is empty.
    fn fetch_pool(&self, colors: &[String]) -> Result<Vec<CatalogCard>>;
}

/// Blocking client for the catalog HTTP API.
pub struct CatalogClient {
    base_url: Url,
    client: Client,
}

impl CatalogClient {
    /// Create a client against `base_url` with a per-request timeout.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let base_url = Url::parse(base_url.trim_end_matches('/')).map_err(|e| {
            DeckforgeError::InvalidArgument(format!("Invalid catalog URL '{}': {}", base_url, e))
        })?;
        let client = Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()?;
        Ok(Self { base_url, client })
    }

    /// Client against the public catalog with the default timeout.
    pub fn public() -> Result<Self> {
        Self::new(config::CATALOG_BASE, config::DEFAULT_TIMEOUT)
    }

    fn cards_endpoint(&self) -> String {
        format!("{}/cards", self.base_url.as_str().trim_end_matches('/'))
    }

    /// URL of the exact-name commander lookup.
    ///
    /// The name is form-encoded, so `Atraxa, Praetors' Voice` is sent as
    /// `name=Atraxa%2C+Praetors%27+Voice`.
    pub fn commander_url(&self, name: &str) -> Result<Url> {
        Url::parse_with_params(&self.cards_endpoint(), &[("name", name)])
            .map_err(|e| DeckforgeError::InvalidArgument(e.to_string()))
    }

    /// URL of the pool lookup for the given commander colors.
    ///
    /// Colors are joined with literal commas in the order given
    /// (`colors=W,U,B,G&pageSize=99`); duplicates are dropped so the filter
    /// reads as a set. Color codes are the catalog's single-letter symbols
    /// and go into the query as-is.
    pub fn pool_url(&self, colors: &[String]) -> Result<Url> {
        let mut url = Url::parse(&self.cards_endpoint())
            .map_err(|e| DeckforgeError::InvalidArgument(e.to_string()))?;
        let page_size = format!("pageSize={}", config::POOL_PAGE_SIZE);
        if colors.is_empty() {
            url.set_query(Some(&page_size));
        } else {
            let mut unique: Vec<&str> = Vec::with_capacity(colors.len());
            for c in colors {
                if !unique.contains(&c.as_str()) {
                    unique.push(c.as_str());
                }
            }
            url.set_query(Some(&format!("colors={}&{}", unique.join(","), page_size)));
        }
        Ok(url)
    }

    fn get_page(&self, url: Url) -> Result<CardsPage> {
        tracing::debug!(%url, "catalog request");
        let resp = self.client.get(url).send()?;
        let status = resp.status();
        if !status.is_success() {
            return Err(DeckforgeError::Upstream(format!(
                "Catalog returned status {}",
                status
            )));
        }
        let body = resp.text()?;
        parse_cards_page(&body)
    }
}

impl CardSource for CatalogClient {
    fn fetch_commander(&self, name: &str) -> Result<CatalogCard> {
        let page = self.get_page(self.commander_url(name)?)?;
        first_match(page, name)
    }

    fn fetch_pool(&self, colors: &[String]) -> Result<Vec<CatalogCard>> {
        let page = self.get_page(self.pool_url(colors)?)?;
        let mut cards = page.cards;
        cards.truncate(config::POOL_PAGE_SIZE);
        Ok(cards)
    }
}

/// Parse a `/cards` response body.
///
/// A body that is not JSON, or has no `cards` array, is an upstream error.
pub fn parse_cards_page(body: &str) -> Result<CardsPage> {
    serde_json::from_str(body)
        .map_err(|e| DeckforgeError::Upstream(format!("Malformed catalog response: {}", e)))
}

/// Pick the commander out of a name lookup.
pub fn first_match(page: CardsPage, name: &str) -> Result<CatalogCard> {
    page.cards
        .into_iter()
        .next()
        .ok_or_else(|| DeckforgeError::NotFound(format!("Comandante não encontrado: {}", name)))
}
