//! Queue contract used by the import producer and consumer, and an embedded
//! durable implementation stored in DuckDB.
//!
//! Messages move through three states: `ready` (waiting for a consumer),
//! `unacked` (handed to a consumer, not yet settled) and `dead` (given up on).
//! Acknowledged messages are deleted.

use std::fmt;

use duckdb::params;

use crate::connection::Connection;
use crate::error::{DeckforgeError, Result};

/// Whether a message must survive a broker restart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryMode {
    Transient,
    Persistent,
}

/// Broker-assigned handle for settling a received message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeliveryTag(pub i64);

impl fmt::Display for DeliveryTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A message handed to a consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueMessage {
    pub tag: DeliveryTag,
    pub body: Vec<u8>,
    /// Number of times this message has been delivered, this one included.
    pub attempts: u32,
}

/// A message that was dead-lettered, with the reason given.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeadLetter {
    pub tag: DeliveryTag,
    pub body: Vec<u8>,
    pub attempts: u32,
    pub reason: String,
}

/// What the import producer and consumer need from a message broker.
///
/// Implementations must serialize concurrent calls internally; a single
/// broker handle is shared by every in-flight publish.
pub trait Broker: Send + Sync {
    /// Declare a queue. Declaring an existing queue is a no-op.
    fn declare_queue(&self, queue: &str, durable: bool) -> Result<()>;

    /// Append a message to a declared queue.
    fn publish(&self, queue: &str, body: &[u8], mode: DeliveryMode) -> Result<()>;

    /// Take the oldest ready message, if any, and mark it unacked.
    fn receive(&self, queue: &str) -> Result<Option<QueueMessage>>;

    /// Settle a message as processed, removing it.
    fn ack(&self, tag: DeliveryTag) -> Result<()>;

    /// Return a message to the queue for redelivery.
    fn requeue(&self, tag: DeliveryTag) -> Result<()>;

    /// Park a message so it is never redelivered.
    fn dead_letter(&self, tag: DeliveryTag, reason: &str) -> Result<()>;

    /// Number of messages waiting for delivery.
    fn ready_count(&self, queue: &str) -> Result<usize>;

    /// Messages that were dead-lettered on `queue`, oldest first.
    fn dead_letters(&self, queue: &str) -> Result<Vec<DeadLetter>>;
}

const SCHEMA: &str = "\
    CREATE SEQUENCE IF NOT EXISTS queue_tag_seq START 1; \
    CREATE TABLE IF NOT EXISTS queues ( \
        name VARCHAR NOT NULL, \
        durable BOOLEAN NOT NULL \
    ); \
    CREATE TABLE IF NOT EXISTS queue_messages ( \
        tag BIGINT NOT NULL DEFAULT nextval('queue_tag_seq'), \
        queue VARCHAR NOT NULL, \
        body BLOB NOT NULL, \
        persistent BOOLEAN NOT NULL, \
        state VARCHAR NOT NULL, \
        attempts BIGINT NOT NULL DEFAULT 0, \
        reason VARCHAR \
    );";

/// Broker whose queues live in DuckDB tables.
///
/// Sharing the deck database means a persistent message is as durable as
/// the deck it describes.
pub struct DuckDbBroker {
    conn: Connection,
}

impl DuckDbBroker {
    /// Create the queue tables on `conn` if they do not exist yet.
    ///
    /// Existing messages are left as they are; call [`recover`](Self::recover)
    /// to apply restart semantics.
    pub fn new(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA)
            .map_err(|e| DeckforgeError::QueueUnavailable(e.to_string()))?;
        Ok(Self { conn })
    }

    /// Apply restart semantics: transient messages and non-durable queues
    /// are discarded, and unacked messages become ready again.
    pub fn recover(&self) -> Result<()> {
        self.conn
            .transaction(|c| {
                c.execute_batch(
                    "DELETE FROM queue_messages WHERE NOT persistent; \
                     DELETE FROM queue_messages WHERE queue IN \
                        (SELECT name FROM queues WHERE NOT durable); \
                     DELETE FROM queues WHERE NOT durable; \
                     UPDATE queue_messages SET state = 'ready' WHERE state = 'unacked';",
                )?;
                Ok(())
            })
            .map_err(unavailable)?;
        tracing::info!("broker recovered");
        Ok(())
    }

    fn settle(&self, tag: DeliveryTag, sql: &str, reason: Option<&str>) -> Result<()> {
        let changed = self.conn.with(|c| {
            let n = match reason {
                Some(r) => c.execute(sql, params![r, tag.0])?,
                None => c.execute(sql, params![tag.0])?,
            };
            Ok(n)
        });
        match changed.map_err(unavailable)? {
            0 => Err(DeckforgeError::InvalidArgument(format!(
                "No unacked message with delivery tag {}",
                tag
            ))),
            _ => Ok(()),
        }
    }
}

impl Broker for DuckDbBroker {
    fn declare_queue(&self, queue: &str, durable: bool) -> Result<()> {
        self.conn
            .with(|c| {
                c.execute(
                    "INSERT INTO queues (name, durable) \
                     SELECT CAST(? AS VARCHAR), CAST(? AS BOOLEAN) \
                     WHERE NOT EXISTS (SELECT 1 FROM queues WHERE name = CAST(? AS VARCHAR))",
                    params![queue, durable, queue],
                )?;
                Ok(())
            })
            .map_err(unavailable)
    }

    fn publish(&self, queue: &str, body: &[u8], mode: DeliveryMode) -> Result<()> {
        let persistent = mode == DeliveryMode::Persistent;
        self.conn
            .with(|c| {
                let mut stmt = c.prepare("SELECT COUNT(*) FROM queues WHERE name = ?")?;
                let mut rows = stmt.query(params![queue])?;
                let declared: i64 = match rows.next()? {
                    Some(row) => row.get(0)?,
                    None => 0,
                };
                drop(rows);
                drop(stmt);
                if declared == 0 {
                    return Err(DeckforgeError::Publish(format!(
                        "Queue '{}' has not been declared",
                        queue
                    )));
                }
                c.execute(
                    "INSERT INTO queue_messages (queue, body, persistent, state) \
                     VALUES (?, ?, ?, 'ready')",
                    params![queue, body.to_vec(), persistent],
                )?;
                Ok(())
            })
            .map_err(|e| match e {
                p @ DeckforgeError::Publish(_) => p,
                other => DeckforgeError::Publish(other.to_string()),
            })
    }

    fn receive(&self, queue: &str) -> Result<Option<QueueMessage>> {
        self.conn
            .transaction(|c| {
                let mut stmt = c.prepare(
                    "SELECT tag, body, attempts FROM queue_messages \
                     WHERE queue = ? AND state = 'ready' ORDER BY tag LIMIT 1",
                )?;
                let mut rows = stmt.query(params![queue])?;
                let next = match rows.next()? {
                    Some(row) => {
                        let tag: i64 = row.get(0)?;
                        let body: Vec<u8> = row.get(1)?;
                        let attempts: i64 = row.get(2)?;
                        Some((tag, body, attempts))
                    }
                    None => None,
                };
                drop(rows);
                drop(stmt);
                let Some((tag, body, attempts)) = next else {
                    return Ok(None);
                };
                c.execute(
                    "UPDATE queue_messages SET state = 'unacked', attempts = attempts + 1 \
                     WHERE tag = ?",
                    params![tag],
                )?;
                Ok(Some(QueueMessage {
                    tag: DeliveryTag(tag),
                    body,
                    attempts: (attempts + 1) as u32,
                }))
            })
            .map_err(unavailable)
    }

    fn ack(&self, tag: DeliveryTag) -> Result<()> {
        self.settle(
            tag,
            "DELETE FROM queue_messages WHERE tag = ? AND state = 'unacked'",
            None,
        )
    }

    fn requeue(&self, tag: DeliveryTag) -> Result<()> {
        self.settle(
            tag,
            "UPDATE queue_messages SET state = 'ready' WHERE tag = ? AND state = 'unacked'",
            None,
        )
    }

    fn dead_letter(&self, tag: DeliveryTag, reason: &str) -> Result<()> {
        self.settle(
            tag,
            "UPDATE queue_messages SET state = 'dead', reason = ? \
             WHERE tag = ? AND state = 'unacked'",
            Some(reason),
        )
    }

    fn ready_count(&self, queue: &str) -> Result<usize> {
        let n = self
            .conn
            .execute_scalar(
                "SELECT COUNT(*) FROM queue_messages WHERE queue = ? AND state = 'ready'",
                &[queue.to_string()],
            )
            .map_err(unavailable)?
            .unwrap_or(0);
        Ok(n as usize)
    }

    fn dead_letters(&self, queue: &str) -> Result<Vec<DeadLetter>> {
        self.conn
            .with(|c| {
                let mut stmt = c.prepare(
                    "SELECT tag, body, attempts, reason FROM queue_messages \
                     WHERE queue = ? AND state = 'dead' ORDER BY tag",
                )?;
                let mut rows = stmt.query(params![queue])?;
                let mut out = Vec::new();
                while let Some(row) = rows.next()? {
                    let tag: i64 = row.get(0)?;
                    let attempts: i64 = row.get(2)?;
                    let reason: Option<String> = row.get(3)?;
                    out.push(DeadLetter {
                        tag: DeliveryTag(tag),
                        body: row.get(1)?,
                        attempts: attempts as u32,
                        reason: reason.unwrap_or_default(),
                    });
                }
                Ok(out)
            })
            .map_err(unavailable)
    }
}

fn unavailable(e: DeckforgeError) -> DeckforgeError {
    match e {
        DeckforgeError::Persistence(msg) => DeckforgeError::QueueUnavailable(msg),
        other => other,
    }
}
