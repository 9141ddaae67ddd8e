use std::fmt;

use rand::Rng;
use serde::{Deserialize, Serialize};

use super::card::{Card, Commander};

// ---------------------------------------------------------------------------
// DeckId — Opaque record identifier
// ---------------------------------------------------------------------------

/// 24 lowercase hex characters, generated at insert time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeckId(String);

impl DeckId {
    /// A fresh random id: 12 bytes rendered as 24 lowercase hex digits.
    pub fn generate() -> Self {
        let bytes: [u8; 12] = rand::thread_rng().gen();
        Self(bytes.iter().map(|b| format!("{:02x}", b)).collect())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for DeckId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl fmt::Display for DeckId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// Deck — Commander plus its companion pool
// ---------------------------------------------------------------------------

/// A commander and the companion cards fetched for it.
///
/// `cards` keeps the order the catalog returned them in and is stored
/// under the `deck` key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deck {
    pub commander: Commander,
    #[serde(rename = "deck", default)]
    pub cards: Vec<Card>,
}

impl Deck {
    /// The lookup key for store operations.
    pub fn name(&self) -> &str {
        &self.commander.name
    }

    /// Merge the fields present in `patch` into this deck.
    pub fn apply(&mut self, patch: &DeckPatch) {
        if let Some(cp) = &patch.commander {
            let c = &mut self.commander;
            if let Some(v) = &cp.name {
                c.name = v.clone();
            }
            if let Some(v) = &cp.image_url {
                c.image_url = Some(v.clone());
            }
            if let Some(v) = &cp.mana_cost {
                c.mana_cost = Some(v.clone());
            }
            if let Some(v) = &cp.type_field {
                c.type_field = Some(v.clone());
            }
            if let Some(v) = &cp.player_id {
                c.player_id = v.clone();
            }
        }
        if let Some(cards) = &patch.cards {
            self.cards = cards.clone();
        }
    }
}

// ---------------------------------------------------------------------------
// DeckPatch — Partial update
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommanderPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mana_cost: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub type_field: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub player_id: Option<String>,
}

/// Fields to merge into an existing deck. `None` leaves a field untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeckPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commander: Option<CommanderPatch>,
    #[serde(rename = "deck", default, skip_serializing_if = "Option::is_none")]
    pub cards: Option<Vec<Card>>,
}

impl DeckPatch {
    /// Patch that assigns the deck to a player.
    pub fn assign_player(player_id: impl Into<String>) -> Self {
        Self {
            commander: Some(CommanderPatch {
                player_id: Some(player_id.into()),
                ..CommanderPatch::default()
            }),
            cards: None,
        }
    }
}

// ---------------------------------------------------------------------------
// StoredDeck — A deck with its record id
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredDeck {
    pub id: DeckId,
    #[serde(flatten)]
    pub deck: Deck,
}

// ---------------------------------------------------------------------------
// BuiltDeck — Result of the build pipeline
// ---------------------------------------------------------------------------

/// What happened to the import message for a freshly stored deck.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    /// Published to the import queue.
    Queued,
    /// Handed to a background task; the outcome is only logged.
    Dispatched,
    /// Publishing failed. The deck itself is stored.
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuiltDeck {
    pub id: DeckId,
    pub deck: Deck,
    pub delivery: Delivery,
}
