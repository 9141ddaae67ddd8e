//! Shared test fixtures for the deckforge integration tests.
//!
//! Provides a stub catalog that records the lookups made against it, brokers
//! that fail on demand, and helpers to build a [`Deckforge`] on an in-memory
//! or temporary database.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use deckforge::broker::{DeadLetter, DeliveryTag, QueueMessage};
use deckforge::models::{CatalogCard, Deck};
use deckforge::consumer::ImportReport;
use deckforge::{
    Broker, CardSource, Connection, Deckforge, DeckforgeBuilder, DeckforgeError, DeliveryMode,
    DuckDbBroker, ImportHandler, Result,
};

pub const ATRAXA: &str = "Atraxa, Praetors' Voice";
pub const COLORLESS: &str = "Karn, Silver Golem";
pub const NIV: &str = "Niv-Mizzet, Parun";

pub fn card(name: &str, colors: &[&str]) -> CatalogCard {
    CatalogCard {
        name: name.to_string(),
        image_url: Some(format!("https://img.test/{}.png", name.replace(' ', "_"))),
        mana_cost: Some("{2}".to_string()),
        type_field: Some("Creature".to_string()),
        colors: colors.iter().map(|c| c.to_string()).collect(),
    }
}

// ---------------------------------------------------------------------------
// StubCatalog
// ---------------------------------------------------------------------------

#[derive(Default)]
struct StubState {
    commanders: HashMap<String, CatalogCard>,
    pool: Vec<CatalogCard>,
    fail_pool: bool,
    commander_lookups: Vec<String>,
    pool_requests: Vec<Vec<String>>,
}

/// In-process catalog. Clones share state, so a test can keep one handle
/// after boxing another into the builder.
#[derive(Clone, Default)]
pub struct StubCatalog {
    state: Arc<Mutex<StubState>>,
}

impl StubCatalog {
    /// Catalog knowing Atraxa (WUBG), Karn (colorless) and Niv-Mizzet (UR),
    /// with a three-card pool.
    pub fn sample() -> Self {
        let stub = Self::default();
        stub.add_commander(card(ATRAXA, &["W", "U", "B", "G"]));
        stub.add_commander(card(COLORLESS, &[]));
        stub.add_commander(card(NIV, &["U", "R"]));
        stub.set_pool(vec![
            card("Sol Ring", &[]),
            card("Swords to Plowshares", &["W"]),
            card("Counterspell", &["U"]),
        ]);
        stub
    }

    pub fn add_commander(&self, card: CatalogCard) {
        let mut s = self.state.lock().unwrap();
        s.commanders.insert(card.name.clone(), card);
    }

    pub fn set_pool(&self, pool: Vec<CatalogCard>) {
        self.state.lock().unwrap().pool = pool;
    }

    pub fn fail_pool(&self) {
        self.state.lock().unwrap().fail_pool = true;
    }

    pub fn pool_requests(&self) -> Vec<Vec<String>> {
        self.state.lock().unwrap().pool_requests.clone()
    }

    pub fn commander_lookups(&self) -> Vec<String> {
        self.state.lock().unwrap().commander_lookups.clone()
    }
}

impl CardSource for StubCatalog {
    fn fetch_commander(&self, name: &str) -> Result<CatalogCard> {
        let mut s = self.state.lock().unwrap();
        s.commander_lookups.push(name.to_string());
        s.commanders
            .get(name)
            .cloned()
            .ok_or_else(|| DeckforgeError::NotFound(format!("Comandante não encontrado: {}", name)))
    }

    fn fetch_pool(&self, colors: &[String]) -> Result<Vec<CatalogCard>> {
        let mut s = self.state.lock().unwrap();
        s.pool_requests.push(colors.to_vec());
        if s.fail_pool {
            return Err(DeckforgeError::Upstream("Catalog returned status 503".into()));
        }
        Ok(s.pool.clone())
    }
}

// ---------------------------------------------------------------------------
// Brokers
// ---------------------------------------------------------------------------

/// Broker that accepts queue declarations but rejects every publish, as
/// a broker that went away after startup would.
pub struct DownBroker;

impl Broker for DownBroker {
    fn declare_queue(&self, _queue: &str, _durable: bool) -> Result<()> {
        Ok(())
    }

    fn publish(&self, _queue: &str, _body: &[u8], _mode: DeliveryMode) -> Result<()> {
        Err(DeckforgeError::Publish("connection reset by broker".into()))
    }

    fn receive(&self, _queue: &str) -> Result<Option<QueueMessage>> {
        Err(DeckforgeError::QueueUnavailable("broker down".into()))
    }

    fn ack(&self, _tag: DeliveryTag) -> Result<()> {
        Err(DeckforgeError::QueueUnavailable("broker down".into()))
    }

    fn requeue(&self, _tag: DeliveryTag) -> Result<()> {
        Err(DeckforgeError::QueueUnavailable("broker down".into()))
    }

    fn dead_letter(&self, _tag: DeliveryTag, _reason: &str) -> Result<()> {
        Err(DeckforgeError::QueueUnavailable("broker down".into()))
    }

    fn ready_count(&self, _queue: &str) -> Result<usize> {
        Ok(0)
    }

    fn dead_letters(&self, _queue: &str) -> Result<Vec<DeadLetter>> {
        Ok(Vec::new())
    }
}

/// Embedded broker that delivers normally but loses its connection whenever
/// a message is acked or requeued.
pub struct SettleFailsBroker {
    pub inner: DuckDbBroker,
}

impl SettleFailsBroker {
    pub fn new() -> Self {
        Self {
            inner: DuckDbBroker::new(Connection::open_in_memory().unwrap()).unwrap(),
        }
    }
}

impl Broker for SettleFailsBroker {
    fn declare_queue(&self, queue: &str, durable: bool) -> Result<()> {
        self.inner.declare_queue(queue, durable)
    }

    fn publish(&self, queue: &str, body: &[u8], mode: DeliveryMode) -> Result<()> {
        self.inner.publish(queue, body, mode)
    }

    fn receive(&self, queue: &str) -> Result<Option<QueueMessage>> {
        self.inner.receive(queue)
    }

    fn ack(&self, _tag: DeliveryTag) -> Result<()> {
        Err(DeckforgeError::QueueUnavailable("channel closed during ack".into()))
    }

    fn requeue(&self, _tag: DeliveryTag) -> Result<()> {
        Err(DeckforgeError::QueueUnavailable("channel closed during requeue".into()))
    }

    fn dead_letter(&self, tag: DeliveryTag, reason: &str) -> Result<()> {
        self.inner.dead_letter(tag, reason)
    }

    fn ready_count(&self, queue: &str) -> Result<usize> {
        self.inner.ready_count(queue)
    }

    fn dead_letters(&self, queue: &str) -> Result<Vec<DeadLetter>> {
        self.inner.dead_letters(queue)
    }
}

// ---------------------------------------------------------------------------
// Import handlers
// ---------------------------------------------------------------------------

/// Fails the first `failures` calls, then succeeds.
pub struct FlakyImport {
    failures: u32,
    calls: Arc<AtomicU32>,
}

impl FlakyImport {
    pub fn new(failures: u32) -> (Self, Arc<AtomicU32>) {
        let calls = Arc::new(AtomicU32::new(0));
        (
            Self {
                failures,
                calls: calls.clone(),
            },
            calls,
        )
    }
}

impl ImportHandler for FlakyImport {
    fn handle(&self, deck: &Deck) -> Result<ImportReport> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        if n < self.failures {
            return Err(DeckforgeError::Upstream(format!("import backend busy ({})", n + 1)));
        }
        Ok(ImportReport {
            status: "success".to_string(),
            data: deck.clone(),
        })
    }
}

// ---------------------------------------------------------------------------
// Builders
// ---------------------------------------------------------------------------

/// Builder wired to `catalog` and an in-memory database.
pub fn builder(catalog: &StubCatalog) -> DeckforgeBuilder {
    deckforge::logging::init_for_tests();
    Deckforge::builder().catalog(Box::new(catalog.clone()))
}

/// In-memory deckforge over the sample catalog. Returns the catalog handle
/// for inspecting recorded lookups.
pub fn sample_forge() -> (Deckforge, StubCatalog) {
    let catalog = StubCatalog::sample();
    let forge = builder(&catalog).build().unwrap();
    (forge, catalog)
}
