//! Commander deck builder.
//!
//! Looks up a commander in the MTG catalog, fetches a companion pool that
//! shares its colors, stores the resulting deck in DuckDB and queues a
//! snapshot of it for asynchronous import.
//!
//! # Quick start
//!
//! ```no_run
//! use deckforge::Deckforge;
//!
//! let forge = Deckforge::builder().default_database().build().unwrap();
//!
//! // Build and store a deck, queueing it for import
//! let built = forge.build_deck("Atraxa, Praetors' Voice").unwrap();
//!
//! // Process whatever is waiting in the import queue
//! let settled = forge.consumer().unwrap().drain().unwrap();
//! ```

pub mod assembler;
#[cfg(feature = "async")]
pub mod async_client;
pub mod broker;
pub mod catalog;
pub mod config;
pub mod connection;
pub mod consumer;
pub mod error;
pub mod logging;
pub mod models;
pub mod producer;
pub mod store;

#[cfg(feature = "async")]
pub use async_client::AsyncDeckforge;
pub use broker::{Broker, DeliveryMode, DuckDbBroker};
pub use catalog::{CardSource, CatalogClient};
pub use connection::Connection;
pub use consumer::{ImportConsumer, ImportHandler, PassthroughImport, RetryPolicy};
pub use error::{DeckforgeError, Result};
pub use producer::ImportProducer;
pub use store::DeckStore;

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use models::{BuiltDeck, Deck, Delivery};

// ---------------------------------------------------------------------------
// DeckforgeBuilder
// ---------------------------------------------------------------------------

/// Builder for configuring and constructing a [`Deckforge`] instance.
///
/// Use [`Deckforge::builder()`] to obtain a builder, chain configuration
/// methods, and call [`build()`](DeckforgeBuilder::build).
pub struct DeckforgeBuilder {
    database: Option<PathBuf>,
    catalog_url: String,
    timeout: Duration,
    unique_commanders: bool,
    max_import_attempts: u32,
    catalog: Option<Box<dyn CardSource>>,
    broker: Option<Arc<dyn Broker>>,
}

impl Default for DeckforgeBuilder {
    fn default() -> Self {
        Self {
            database: None,
            catalog_url: config::CATALOG_BASE.to_string(),
            timeout: config::DEFAULT_TIMEOUT,
            unique_commanders: false,
            max_import_attempts: config::DEFAULT_MAX_IMPORT_ATTEMPTS,
            catalog: None,
            broker: None,
        }
    }
}

impl DeckforgeBuilder {
    /// Store decks and queued imports in a database file.
    ///
    /// If not set, an in-memory database is used and nothing survives the
    /// process.
    pub fn database<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.database = Some(path.as_ref().to_path_buf());
        self
    }

    /// Store decks in the platform data directory
    /// (e.g. `~/.local/share/deckforge/decks.duckdb` on Linux).
    pub fn default_database(mut self) -> Self {
        self.database = Some(config::default_database_path());
        self
    }

    /// Base URL of the catalog API. Defaults to the public MTG API.
    pub fn catalog_url(mut self, url: &str) -> Self {
        self.catalog_url = url.to_string();
        self
    }

    /// Timeout for each catalog request.
    ///
    /// Defaults to 30 seconds.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Refuse to store a second deck for a commander name already stored.
    ///
    /// Defaults to `false`: several decks may share a commander.
    pub fn unique_commanders(mut self, unique: bool) -> Self {
        self.unique_commanders = unique;
        self
    }

    /// Deliveries allowed for a failing import before it is dead-lettered.
    ///
    /// Defaults to 3.
    pub fn max_import_attempts(mut self, attempts: u32) -> Self {
        self.max_import_attempts = attempts;
        self
    }

    /// Use a custom card source instead of the HTTP catalog client.
    pub fn catalog(mut self, catalog: Box<dyn CardSource>) -> Self {
        self.catalog = Some(catalog);
        self
    }

    /// Use an external broker instead of the embedded DuckDB queue.
    pub fn broker(mut self, broker: Arc<dyn Broker>) -> Self {
        self.broker = Some(broker);
        self
    }

    /// Open the database, prepare the deck store and connect the import
    /// producer.
    ///
    /// With a database file and the embedded broker, messages left unacked
    /// by a previous process are made ready again before the producer
    /// connects. A broker passed to [`broker`](Self::broker) is used as-is.
    ///
    /// A broker that cannot be reached does not fail the build; builds
    /// still store decks and report [`Delivery::Failed`].
    pub fn build(self) -> Result<Deckforge> {
        let conn = match &self.database {
            Some(path) => Connection::open(path)?,
            None => Connection::open_in_memory()?,
        };
        let catalog = match self.catalog {
            Some(catalog) => catalog,
            None => Box::new(CatalogClient::new(&self.catalog_url, self.timeout)?),
        };
        let store = DeckStore::new(conn.try_clone()?, self.unique_commanders)?;

        let broker: Result<Arc<dyn Broker>> = match self.broker {
            Some(broker) => Ok(broker),
            None => conn.try_clone().and_then(DuckDbBroker::new).and_then(|b| {
                // Reopening a file is a broker restart: in-flight messages
                // from the previous process go back to ready.
                if self.database.is_some() {
                    b.recover()?;
                }
                Ok(Arc::new(b) as Arc<dyn Broker>)
            }),
        };
        let shared = broker.as_ref().ok().cloned();
        let producer = ImportProducer::connect(move || broker);

        Ok(Deckforge {
            catalog,
            store,
            broker: shared,
            producer,
            retry: RetryPolicy {
                max_attempts: self.max_import_attempts,
            },
            database: self.database,
        })
    }
}

// ---------------------------------------------------------------------------
// Deckforge
// ---------------------------------------------------------------------------

/// The deck pipeline with its collaborators.
///
/// Owns the catalog source, the deck store, the import producer and the
/// broker handle used to create consumers. Created via
/// [`Deckforge::builder()`].
pub struct Deckforge {
    catalog: Box<dyn CardSource>,
    store: DeckStore,
    broker: Option<Arc<dyn Broker>>,
    producer: ImportProducer,
    retry: RetryPolicy,
    database: Option<PathBuf>,
}

impl Deckforge {
    /// Create a new builder.
    pub fn builder() -> DeckforgeBuilder {
        DeckforgeBuilder::default()
    }

    // -- Pipeline ----------------------------------------------------------

    /// Build, store and queue the deck for a commander.
    ///
    /// A catalog failure aborts before anything is stored, and a store
    /// failure aborts before anything is published. A publish failure does
    /// not undo the stored deck; it is logged and reported through
    /// [`BuiltDeck::delivery`].
    pub fn build_deck(&self, commander: &str) -> Result<BuiltDeck> {
        let deck = self.assemble_for(commander)?;
        let id = self.store.create(&deck)?;
        let delivery = self.dispatch(&deck);
        Ok(BuiltDeck { id, deck, delivery })
    }

    /// Fetch the commander and its pool and assemble the deck, without
    /// storing or publishing anything.
    pub fn assemble_for(&self, commander: &str) -> Result<Deck> {
        let card = self.catalog.fetch_commander(commander)?;
        let pool = self.catalog.fetch_pool(&card.colors)?;
        tracing::debug!(
            commander = %card.name,
            colors = ?card.colors,
            pool = pool.len(),
            "catalog lookups done"
        );
        Ok(assembler::assemble(&card, &pool))
    }

    /// Publish a deck to the import queue, logging instead of failing.
    pub fn dispatch(&self, deck: &Deck) -> Delivery {
        match self.producer.publish(deck) {
            Ok(()) => Delivery::Queued,
            Err(e) => {
                tracing::warn!(commander = deck.name(), error = %e, "deck stored but not queued for import");
                Delivery::Failed(e.to_string())
            }
        }
    }

    // -- Accessors ---------------------------------------------------------

    /// The deck store, for lookups, updates and deletes by commander name.
    pub fn decks(&self) -> &DeckStore {
        &self.store
    }

    /// The import producer, to check availability or close the channel.
    pub fn producer(&self) -> &ImportProducer {
        &self.producer
    }

    /// The broker handle, if the connection at build time succeeded.
    pub fn broker(&self) -> Option<&Arc<dyn Broker>> {
        self.broker.as_ref()
    }

    /// A consumer for the import queue using the pass-through handler.
    pub fn consumer(&self) -> Result<ImportConsumer> {
        self.consumer_with(Box::new(PassthroughImport))
    }

    /// A consumer for the import queue with a custom handler.
    pub fn consumer_with(&self, handler: Box<dyn ImportHandler>) -> Result<ImportConsumer> {
        let broker = self.broker.clone().ok_or_else(|| {
            DeckforgeError::QueueUnavailable("no broker connection was established".into())
        })?;
        Ok(ImportConsumer::new(
            broker,
            self.producer.queue(),
            handler,
            self.retry,
        ))
    }

    /// Release the broker channel and close the database.
    ///
    /// Dropping the instance has the same effect; this makes the shutdown
    /// point explicit.
    pub fn close(self) {
        self.producer.close();
        drop(self);
    }
}

// ---------------------------------------------------------------------------
// Display
// ---------------------------------------------------------------------------

impl fmt::Display for Deckforge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let database = self
            .database
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| ":memory:".to_string());
        write!(
            f,
            "Deckforge(database={}, queue={}, queue_available={})",
            database,
            self.producer.queue(),
            self.producer.is_available()
        )
    }
}
