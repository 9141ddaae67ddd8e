//! Worker side of the import queue.
//!
//! Each received message runs through one pass of the state machine
//! `Idle -> Processing -> (Acked | Requeued | DeadLettered)`. A handler
//! failure requeues the message until it has been delivered
//! [`RetryPolicy::max_attempts`] times, after which it is dead-lettered.
//! A body that does not decode as a deck is dead-lettered straight away.

use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

use crate::broker::{Broker, DeliveryTag, QueueMessage};
use crate::config;
use crate::error::Result;
use crate::models::Deck;

/// Where the consumer is in handling the current message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumerState {
    Idle,
    Processing,
    Acked,
    Requeued,
    DeadLettered,
}

/// Outcome of a successful import.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportReport {
    pub status: String,
    pub data: Deck,
}

/// The import work performed for each queued deck.
pub trait ImportHandler: Send + Sync {
    fn handle(&self, deck: &Deck) -> Result<ImportReport>;
}

/// Accepts every deck as-is.
#[derive(Debug, Default, Clone, Copy)]
pub struct PassthroughImport;

impl ImportHandler for PassthroughImport {
    fn handle(&self, deck: &Deck) -> Result<ImportReport> {
        Ok(ImportReport {
            status: "success".to_string(),
            data: deck.clone(),
        })
    }
}

/// How often a failing import is retried before it is dead-lettered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Deliveries allowed before a failing message is dead-lettered.
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: config::DEFAULT_MAX_IMPORT_ATTEMPTS,
        }
    }
}

/// How one message was settled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settlement {
    pub tag: DeliveryTag,
    /// `Acked`, `Requeued` or `DeadLettered`.
    pub state: ConsumerState,
    pub attempts: u32,
    pub report: Option<ImportReport>,
    pub error: Option<String>,
}

/// Receives queued decks, runs them through an [`ImportHandler`] and
/// settles each message with the broker.
///
/// Polling is synchronous; run it on a worker thread or through
/// `AsyncDeckforge::spawn_import_worker`.
pub struct ImportConsumer {
    broker: Arc<dyn Broker>,
    queue: String,
    handler: Box<dyn ImportHandler>,
    policy: RetryPolicy,
    state: Mutex<ConsumerState>,
}

impl ImportConsumer {
    /// Create a consumer for `queue`. The queue must already be declared,
    /// which [`ImportProducer::connect`](crate::ImportProducer::connect)
    /// does.
    pub fn new(
        broker: Arc<dyn Broker>,
        queue: &str,
        handler: Box<dyn ImportHandler>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            broker,
            queue: queue.to_string(),
            handler,
            policy,
            state: Mutex::new(ConsumerState::Idle),
        }
    }

    /// State after the most recent poll.
    pub fn state(&self) -> ConsumerState {
        self.state.lock().map(|s| *s).unwrap_or(ConsumerState::Idle)
    }

    fn transition(&self, next: ConsumerState) {
        if let Ok(mut state) = self.state.lock() {
            tracing::debug!(queue = %self.queue, from = ?*state, to = ?next, "consumer transition");
            *state = next;
        }
    }

    /// Receive and settle at most one message. Returns `None` when the
    /// queue is empty.
    pub fn poll_once(&self) -> Result<Option<Settlement>> {
        self.transition(ConsumerState::Idle);
        let Some(msg) = self.broker.receive(&self.queue)? else {
            return Ok(None);
        };
        self.transition(ConsumerState::Processing);

        let deck: Deck = match serde_json::from_slice(&msg.body) {
            Ok(deck) => deck,
            Err(e) => {
                let reason = format!("undecodable deck payload: {}", e);
                return self.dead_letter(&msg, reason).map(Some);
            }
        };

        let settlement = match self.handler.handle(&deck) {
            Ok(report) => {
                self.settle(&msg, "ack", |b| b.ack(msg.tag))?;
                tracing::info!(commander = deck.name(), attempts = msg.attempts, "deck imported");
                Settlement {
                    tag: msg.tag,
                    state: ConsumerState::Acked,
                    attempts: msg.attempts,
                    report: Some(report),
                    error: None,
                }
            }
            Err(e) if msg.attempts < self.policy.max_attempts => {
                self.settle(&msg, "requeue", |b| b.requeue(msg.tag))?;
                tracing::warn!(
                    commander = deck.name(),
                    attempts = msg.attempts,
                    error = %e,
                    "import failed, requeued"
                );
                Settlement {
                    tag: msg.tag,
                    state: ConsumerState::Requeued,
                    attempts: msg.attempts,
                    report: None,
                    error: Some(e.to_string()),
                }
            }
            Err(e) => return self.dead_letter(&msg, e.to_string()).map(Some),
        };
        self.transition(settlement.state);
        Ok(Some(settlement))
    }

    /// Poll until the queue has no ready messages.
    pub fn drain(&self) -> Result<Vec<Settlement>> {
        let mut settled = Vec::new();
        while let Some(s) = self.poll_once()? {
            settled.push(s);
        }
        Ok(settled)
    }

    /// Run a broker settlement. On failure the consumer goes back to
    /// `Idle` so the next poll starts clean; the message stays unacked
    /// until the broker recovers.
    fn settle<F>(&self, msg: &QueueMessage, action: &str, f: F) -> Result<()>
    where
        F: FnOnce(&dyn Broker) -> Result<()>,
    {
        f(self.broker.as_ref()).map_err(|e| {
            tracing::error!(tag = %msg.tag, action, error = %e, "could not settle import message");
            self.transition(ConsumerState::Idle);
            e
        })
    }

    fn dead_letter(&self, msg: &QueueMessage, reason: String) -> Result<Settlement> {
        self.settle(msg, "dead-letter", |b| b.dead_letter(msg.tag, &reason))?;
        tracing::error!(tag = %msg.tag, attempts = msg.attempts, reason = %reason, "import dead-lettered");
        self.transition(ConsumerState::DeadLettered);
        Ok(Settlement {
            tag: msg.tag,
            state: ConsumerState::DeadLettered,
            attempts: msg.attempts,
            report: None,
            error: Some(reason),
        })
    }
}
