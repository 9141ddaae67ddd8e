//! Deck persistence in DuckDB.
//!
//! Each deck is one row: a generated id, the commander name used as lookup
//! key, and the deck document as JSON. Rows keep their insertion order
//! through a sequence so that "the deck named X" always resolves to the
//! oldest record with that commander.

use duckdb::params;

use crate::connection::Connection;
use crate::error::{DeckforgeError, Result};
use crate::models::{Deck, DeckId, DeckPatch, StoredDeck};

const SCHEMA: &str = "\
    CREATE SEQUENCE IF NOT EXISTS deck_seq START 1; \
    CREATE TABLE IF NOT EXISTS decks ( \
        seq BIGINT NOT NULL DEFAULT nextval('deck_seq'), \
        id VARCHAR NOT NULL, \
        commander_name VARCHAR NOT NULL, \
        payload VARCHAR NOT NULL \
    );";

/// Create, read, update and delete decks keyed by commander name.
pub struct DeckStore {
    conn: Connection,
    unique_commanders: bool,
}

impl DeckStore {
    /// Open the store on `conn`, creating the `decks` table if needed.
    ///
    /// With `unique_commanders`, `create` and renaming updates refuse a
    /// commander name that is already stored.
    pub fn new(conn: Connection, unique_commanders: bool) -> Result<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn,
            unique_commanders,
        })
    }

    /// Insert a deck and return its new id.
    pub fn create(&self, deck: &Deck) -> Result<DeckId> {
        validate_name(deck.name())?;
        let payload = encode(deck)?;
        let id = DeckId::generate();
        self.conn.transaction(|c| {
            if self.unique_commanders && exists(c, deck.name())? {
                return Err(DeckforgeError::Duplicate(format!(
                    "A deck for commander '{}' already exists",
                    deck.name()
                )));
            }
            c.execute(
                "INSERT INTO decks (id, commander_name, payload) VALUES (?, ?, ?)",
                params![id.as_str(), deck.name(), payload],
            )?;
            Ok(())
        })?;
        tracing::info!(deck_id = %id, commander = deck.name(), cards = deck.cards.len(), "deck stored");
        Ok(id)
    }

    /// Get the deck for a commander.
    pub fn find_by_name(&self, name: &str) -> Result<Deck> {
        self.conn
            .with(|c| first_by_name(c, name))?
            .map(|(_, _, deck)| deck)
            .ok_or_else(|| not_found(name))
    }

    /// Merge `patch` into the deck for a commander and return the result.
    pub fn update_by_name(&self, name: &str, patch: &DeckPatch) -> Result<Deck> {
        let updated = self.conn.transaction(|c| {
            let (seq, _, mut deck) = first_by_name(c, name)?.ok_or_else(|| not_found(name))?;
            deck.apply(patch);
            validate_name(deck.name())?;
            if self.unique_commanders && deck.name() != name && exists(c, deck.name())? {
                return Err(DeckforgeError::Duplicate(format!(
                    "A deck for commander '{}' already exists",
                    deck.name()
                )));
            }
            c.execute(
                "UPDATE decks SET commander_name = ?, payload = ? WHERE seq = ?",
                params![deck.name(), encode(&deck)?, seq],
            )?;
            Ok(deck)
        })?;
        tracing::info!(commander = name, "deck updated");
        Ok(updated)
    }

    /// Delete the deck for a commander.
    pub fn delete_by_name(&self, name: &str) -> Result<()> {
        self.conn.transaction(|c| {
            let (seq, _, _) = first_by_name(c, name)?.ok_or_else(|| not_found(name))?;
            c.execute("DELETE FROM decks WHERE seq = ?", params![seq])?;
            Ok(())
        })?;
        tracing::info!(commander = name, "deck deleted");
        Ok(())
    }

    /// Every stored deck in insertion order.
    pub fn find_all(&self) -> Result<Vec<StoredDeck>> {
        self.conn.with(|c| {
            let mut stmt = c.prepare("SELECT id, payload FROM decks ORDER BY seq")?;
            let mut rows = stmt.query([])?;
            let mut out = Vec::new();
            while let Some(row) = rows.next()? {
                let id: String = row.get(0)?;
                let payload: String = row.get(1)?;
                out.push(StoredDeck {
                    id: DeckId::from(id),
                    deck: decode(&payload)?,
                });
            }
            Ok(out)
        })
    }

    /// Number of stored decks.
    pub fn count(&self) -> Result<usize> {
        let n = self
            .conn
            .execute_scalar("SELECT COUNT(*) FROM decks", &[])?
            .unwrap_or(0);
        Ok(n as usize)
    }
}

fn first_by_name(c: &duckdb::Connection, name: &str) -> Result<Option<(i64, DeckId, Deck)>> {
    let mut stmt = c.prepare(
        "SELECT seq, id, payload FROM decks WHERE commander_name = ? ORDER BY seq LIMIT 1",
    )?;
    let mut rows = stmt.query(params![name])?;
    let found = match rows.next()? {
        Some(row) => {
            let seq: i64 = row.get(0)?;
            let id: String = row.get(1)?;
            let payload: String = row.get(2)?;
            Some((seq, DeckId::from(id), decode(&payload)?))
        }
        None => None,
    };
    Ok(found)
}

fn exists(c: &duckdb::Connection, name: &str) -> Result<bool> {
    let mut stmt = c.prepare("SELECT COUNT(*) FROM decks WHERE commander_name = ?")?;
    let mut rows = stmt.query(params![name])?;
    let count: i64 = match rows.next()? {
        Some(row) => row.get(0)?,
        None => 0,
    };
    Ok(count > 0)
}

fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(DeckforgeError::InvalidArgument(
            "commander name must not be empty".into(),
        ));
    }
    Ok(())
}

fn not_found(name: &str) -> DeckforgeError {
    DeckforgeError::NotFound(format!("Deck não encontrado: {}", name))
}

fn encode(deck: &Deck) -> Result<String> {
    serde_json::to_string(deck)
        .map_err(|e| DeckforgeError::Persistence(format!("Cannot encode deck: {}", e)))
}

fn decode(payload: &str) -> Result<Deck> {
    serde_json::from_str(payload)
        .map_err(|e| DeckforgeError::Persistence(format!("Corrupt deck record: {}", e)))
}
