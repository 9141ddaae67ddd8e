//! Async wrapper around [`Deckforge`] for use in async runtimes (Tokio).
//!
//! Catalog requests and DuckDB statements are blocking, so every operation
//! runs on the blocking thread pool via [`tokio::task::spawn_blocking`].
//! Each `build_deck` call is an independent task; the import publish is
//! handed to its own background task so callers never wait on the broker.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use deckforge::AsyncDeckforge;
//!
//! #[tokio::main]
//! async fn main() {
//!     let forge = AsyncDeckforge::builder().build().await.unwrap();
//!     let worker = forge.spawn_import_worker(Duration::from_millis(500)).unwrap();
//!
//!     let built = forge.build_deck("Atraxa, Praetors' Voice").await.unwrap();
//!     let all = forge.run(|f| f.decks().find_all()).await.unwrap();
//!
//!     worker.shutdown().await.unwrap();
//! }
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::error::{DeckforgeError, Result};
use crate::models::{BuiltDeck, Deck, DeckPatch, Delivery, StoredDeck};
use crate::{config, Broker, CardSource, Deckforge};

fn join_error(e: tokio::task::JoinError) -> DeckforgeError {
    DeckforgeError::InvalidArgument(format!("Task join error: {e}"))
}

// ---------------------------------------------------------------------------
// AsyncDeckforgeBuilder
// ---------------------------------------------------------------------------

/// Builder for configuring and constructing an [`AsyncDeckforge`] instance.
pub struct AsyncDeckforgeBuilder {
    database: Option<PathBuf>,
    catalog_url: String,
    timeout: Duration,
    unique_commanders: bool,
    max_import_attempts: u32,
    catalog: Option<Box<dyn CardSource>>,
    broker: Option<Arc<dyn Broker>>,
}

impl Default for AsyncDeckforgeBuilder {
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

impl AsyncDeckforgeBuilder {
    /// Store decks in a database file instead of memory.
    pub fn database<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.database = Some(path.as_ref().to_path_buf());
        self
    }

    /// Base URL of the catalog API.
    pub fn catalog_url(mut self, url: &str) -> Self {
        self.catalog_url = url.to_string();
        self
    }

    /// Timeout for each catalog request.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Refuse duplicate commander names.
    pub fn unique_commanders(mut self, unique: bool) -> Self {
        self.unique_commanders = unique;
        self
    }

    /// Deliveries allowed for a failing import before it is dead-lettered.
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

    /// Build on the blocking thread pool, since opening the database and
    /// the blocking HTTP client must not happen on the async event loop.
    pub async fn build(self) -> Result<AsyncDeckforge> {
        tokio::task::spawn_blocking(move || {
            let mut builder = Deckforge::builder()
                .catalog_url(&self.catalog_url)
                .timeout(self.timeout)
                .unique_commanders(self.unique_commanders)
                .max_import_attempts(self.max_import_attempts);
            if let Some(path) = self.database {
                builder = builder.database(path);
            }
            if let Some(catalog) = self.catalog {
                builder = builder.catalog(catalog);
            }
            if let Some(broker) = self.broker {
                builder = builder.broker(broker);
            }
            Ok(AsyncDeckforge {
                inner: Arc::new(builder.build()?),
            })
        })
        .await
        .map_err(join_error)?
    }
}

// ---------------------------------------------------------------------------
// AsyncDeckforge
// ---------------------------------------------------------------------------

/// Async wrapper around [`Deckforge`].
///
/// Cloning is cheap and every clone drives the same pipeline; the store
/// and the broker serialize access internally.
#[derive(Clone)]
pub struct AsyncDeckforge {
    inner: Arc<Deckforge>,
}

impl AsyncDeckforge {
    /// Create a new builder.
    pub fn builder() -> AsyncDeckforgeBuilder {
        AsyncDeckforgeBuilder::default()
    }

    /// Run a sync operation on the blocking thread pool.
    pub async fn run<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Deckforge) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let inner = self.inner.clone();
        tokio::task::spawn_blocking(move || f(&inner))
            .await
            .map_err(join_error)?
    }

    /// Build and store the deck for a commander, then publish it in the
    /// background.
    ///
    /// The returned delivery is always [`Delivery::Dispatched`]; publish
    /// failures are logged by the background task.
    pub async fn build_deck(&self, commander: &str) -> Result<BuiltDeck> {
        let commander = commander.to_string();
        let (id, deck) = self
            .run(move |f| {
                let deck = f.assemble_for(&commander)?;
                let id = f.decks().create(&deck)?;
                Ok((id, deck))
            })
            .await?;

        let inner = self.inner.clone();
        let snapshot = deck.clone();
        tokio::task::spawn_blocking(move || {
            inner.dispatch(&snapshot);
        });

        Ok(BuiltDeck {
            id,
            deck,
            delivery: Delivery::Dispatched,
        })
    }

    /// Get the deck for a commander.
    pub async fn find_by_name(&self, name: &str) -> Result<Deck> {
        let name = name.to_string();
        self.run(move |f| f.decks().find_by_name(&name)).await
    }

    /// Merge `patch` into the deck for a commander and return the result.
    pub async fn update_by_name(&self, name: &str, patch: DeckPatch) -> Result<Deck> {
        let name = name.to_string();
        self.run(move |f| f.decks().update_by_name(&name, &patch)).await
    }

    /// Delete the deck for a commander.
    pub async fn delete_by_name(&self, name: &str) -> Result<()> {
        let name = name.to_string();
        self.run(move |f| f.decks().delete_by_name(&name)).await
    }

    /// Every stored deck in insertion order.
    pub async fn find_all(&self) -> Result<Vec<StoredDeck>> {
        self.run(|f| f.decks().find_all()).await
    }

    /// Start a background task that drains the import queue, then sleeps
    /// for `poll_interval` (or until shutdown) before draining again.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn spawn_import_worker(&self, poll_interval: Duration) -> Result<WorkerHandle> {
        let consumer = Arc::new(self.inner.consumer()?);
        let (stop_tx, mut stop_rx) = watch::channel(false);

        let task = tokio::spawn(async move {
            let mut settled = 0usize;
            let mut stopping = false;
            loop {
                let c = consumer.clone();
                match tokio::task::spawn_blocking(move || c.drain()).await {
                    Ok(Ok(batch)) => settled += batch.len(),
                    Ok(Err(e)) => tracing::error!(error = %e, "import worker poll failed"),
                    Err(e) => tracing::error!(error = %e, "import worker task panicked"),
                }
                if stopping {
                    break;
                }
                match tokio::time::timeout(poll_interval, stop_rx.changed()).await {
                    Ok(Ok(())) => stopping = *stop_rx.borrow(),
                    // Sender dropped: nobody can stop us later, so stop now.
                    Ok(Err(_)) => stopping = true,
                    Err(_elapsed) => {}
                }
            }
            tracing::info!(settled, "import worker stopped");
            settled
        });

        Ok(WorkerHandle { stop_tx, task })
    }

    /// Release the broker channel. Other clones can no longer publish; the
    /// database closes when the last clone is dropped.
    pub async fn close(self) -> Result<()> {
        let inner = self.inner;
        tokio::task::spawn_blocking(move || {
            inner.producer().close();
            drop(inner);
        })
        .await
        .map_err(join_error)
    }
}

/// Handle to a running import worker.
pub struct WorkerHandle {
    stop_tx: watch::Sender<bool>,
    task: JoinHandle<usize>,
}

impl WorkerHandle {
    /// Ask the worker to stop after one final drain and wait for it.
    ///
    /// Returns the number of messages the worker settled.
    pub async fn shutdown(self) -> Result<usize> {
        let _ = self.stop_tx.send(true);
        self.task.await.map_err(join_error)
    }
}
