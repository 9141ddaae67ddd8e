//! Turns a commander and its companion pool into a [`Deck`].

use crate::models::{Card, CatalogCard, Commander, Deck};

/// Build a deck from a commander card and its pool.
///
/// The commander starts unassigned (`player_id` empty). Pool order is kept
/// as-is and card fields are copied without validation.
pub fn assemble(commander: &CatalogCard, pool: &[CatalogCard]) -> Deck {
    Deck {
        commander: Commander::unassigned(commander),
        cards: pool.iter().map(Card::from).collect(),
    }
}
