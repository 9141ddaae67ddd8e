//! Publishes built decks to the import queue.

use std::sync::{Arc, RwLock};

use crate::broker::{Broker, DeliveryMode};
use crate::config;
use crate::error::{DeckforgeError, Result};
use crate::models::Deck;

/// Owns the broker channel used to publish import jobs.
///
/// The channel is acquired once, in [`ImportProducer::connect`]. If that
/// fails the producer still starts, and every publish reports
/// [`DeckforgeError::QueueUnavailable`] until a new producer is connected.
pub struct ImportProducer {
    channel: RwLock<Option<Arc<dyn Broker>>>,
    queue: String,
}

impl ImportProducer {
    /// Acquire a channel from `connector` and declare the durable import
    /// queue on it. Failures are logged, not returned.
    pub fn connect<F>(connector: F) -> Self
    where
        F: FnOnce() -> Result<Arc<dyn Broker>>,
    {
        Self::connect_to(config::IMPORT_QUEUE, connector)
    }

    /// Like [`connect`](Self::connect) but for a custom queue name.
    pub fn connect_to<F>(queue: &str, connector: F) -> Self
    where
        F: FnOnce() -> Result<Arc<dyn Broker>>,
    {
        let channel = connector().and_then(|broker| {
            broker.declare_queue(queue, true)?;
            Ok(broker)
        });
        let channel = match channel {
            Ok(broker) => {
                tracing::info!(queue, "import queue ready");
                Some(broker)
            }
            Err(e) => {
                tracing::error!(queue, error = %e, "could not connect to import broker");
                None
            }
        };
        Self {
            channel: RwLock::new(channel),
            queue: queue.to_string(),
        }
    }

    /// Name of the queue this producer publishes to.
    pub fn queue(&self) -> &str {
        &self.queue
    }

    /// Whether a broker channel is currently held.
    pub fn is_available(&self) -> bool {
        self.channel.read().map(|c| c.is_some()).unwrap_or(false)
    }

    /// Publish a deck snapshot as a persistent JSON message.
    ///
    /// Does not wait for the message to be consumed.
    pub fn publish(&self, deck: &Deck) -> Result<()> {
        let broker = self
            .channel
            .read()
            .map_err(|_| DeckforgeError::QueueUnavailable("channel lock poisoned".into()))?
            .clone()
            .ok_or_else(|| {
                DeckforgeError::QueueUnavailable(format!(
                    "no broker channel for queue '{}'",
                    self.queue
                ))
            })?;
        let body = serde_json::to_vec(deck)
            .map_err(|e| DeckforgeError::Publish(format!("Cannot encode deck: {}", e)))?;
        broker.publish(&self.queue, &body, DeliveryMode::Persistent)?;
        tracing::info!(queue = %self.queue, commander = deck.name(), "deck sent to import queue");
        Ok(())
    }

    /// Release the broker channel. Later publishes fail with
    /// [`DeckforgeError::QueueUnavailable`].
    pub fn close(&self) {
        if let Ok(mut channel) = self.channel.write() {
            if channel.take().is_some() {
                tracing::debug!(queue = %self.queue, "import channel closed");
            }
        }
    }
}
