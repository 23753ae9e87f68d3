//! Mock REST adapters: discovery listings and orderbook sources.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::domain::{Book, MarketId, TokenId};
use crate::error::{Error, Result};
use crate::venue::traits::{MarketDescriptor, MarketDiscovery, OrderbookSource};

/// Discovery mock serving a mutable in-memory listing.
pub struct StaticDiscovery {
    markets: Mutex<Vec<MarketDescriptor>>,
    fail_listing: Mutex<bool>,
}

impl StaticDiscovery {
    #[must_use]
    pub fn new(markets: Vec<MarketDescriptor>) -> Self {
        Self {
            markets: Mutex::new(markets),
            fail_listing: Mutex::new(false),
        }
    }

    /// Replace the served listing (e.g. to simulate venue-side resolution).
    pub fn set_markets(&self, markets: Vec<MarketDescriptor>) {
        *self.markets.lock() = markets;
    }

    /// Update one descriptor in place.
    pub fn update_market(&self, condition_id: &str, f: impl FnOnce(&mut MarketDescriptor)) {
        let mut markets = self.markets.lock();
        if let Some(d) = markets.iter_mut().find(|d| d.condition_id == condition_id) {
            f(d);
        }
    }

    /// Make the next `list_active_markets` calls fail.
    pub fn fail_listings(&self, fail: bool) {
        *self.fail_listing.lock() = fail;
    }
}

#[async_trait]
impl MarketDiscovery for StaticDiscovery {
    async fn list_active_markets(&self) -> Result<Vec<MarketDescriptor>> {
        if *self.fail_listing.lock() {
            return Err(Error::Connection("scripted discovery failure".into()));
        }
        Ok(self.markets.lock().clone())
    }

    async fn fetch_market(&self, condition_id: &MarketId) -> Result<Option<MarketDescriptor>> {
        Ok(self
            .markets
            .lock()
            .iter()
            .find(|d| d.condition_id == condition_id.as_str())
            .cloned())
    }

    fn name(&self) -> &'static str {
        "mock-discovery"
    }
}

/// Orderbook mock serving fixed books per token; unknown tokens (or a
/// scripted failure) return errors.
pub struct StaticOrderbooks {
    books: Mutex<HashMap<TokenId, Book>>,
    fail_all: Mutex<bool>,
}

impl StaticOrderbooks {
    #[must_use]
    pub fn new() -> Self {
        Self {
            books: Mutex::new(HashMap::new()),
            fail_all: Mutex::new(false),
        }
    }

    pub fn insert(&self, book: Book) {
        self.books.lock().insert(book.token_id().clone(), book);
    }

    /// Make every orderbook call fail (snapshot null-safety tests).
    pub fn fail_all(&self, fail: bool) {
        *self.fail_all.lock() = fail;
    }
}

impl Default for StaticOrderbooks {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl OrderbookSource for StaticOrderbooks {
    async fn get_orderbook(&self, token_id: &TokenId) -> Result<Book> {
        if *self.fail_all.lock() {
            return Err(Error::Connection("scripted orderbook failure".into()));
        }
        self.books
            .lock()
            .get(token_id)
            .cloned()
            .ok_or_else(|| Error::Venue {
                status: 404,
                message: format!("no book for {token_id}"),
            })
    }

    async fn get_midpoint(&self, token_id: &TokenId) -> Result<Option<f64>> {
        Ok(self.get_orderbook(token_id).await.ok().and_then(|b| b.mid()))
    }

    async fn get_spread(&self, token_id: &TokenId) -> Result<Option<f64>> {
        Ok(self
            .get_orderbook(token_id)
            .await
            .ok()
            .and_then(|b| b.spread()))
    }

    fn name(&self) -> &'static str {
        "mock-orderbooks"
    }
}
