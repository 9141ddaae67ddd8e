use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// CatalogCard — A card as returned by the catalog `/cards` endpoint
// ---------------------------------------------------------------------------

/// Catalog wire shape. Only the fields the deck pipeline reads are modeled;
/// everything else in the response is ignored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogCard {
    pub name: String,
    pub image_url: Option<String>,
    pub mana_cost: Option<String>,
    #[serde(rename = "type")]
    pub type_field: Option<String>,
    #[serde(default)]
    pub colors: Vec<String>,
}

/// Envelope of every `/cards` response: `{ "cards": [...] }`.
#[derive(Debug, Clone, Deserialize)]
pub struct CardsPage {
    pub cards: Vec<CatalogCard>,
}

// ---------------------------------------------------------------------------
// Card — The projection stored inside a deck
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Card {
    pub name: String,
    pub image_url: Option<String>,
    pub mana_cost: Option<String>,
    #[serde(rename = "type")]
    pub type_field: Option<String>,
}

impl From<&CatalogCard> for Card {
    fn from(card: &CatalogCard) -> Self {
        Self {
            name: card.name.clone(),
            image_url: card.image_url.clone(),
            mana_cost: card.mana_cost.clone(),
            type_field: card.type_field.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Commander — The lead card, plus the player it is assigned to
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Commander {
    pub name: String,
    pub image_url: Option<String>,
    pub mana_cost: Option<String>,
    #[serde(rename = "type")]
    pub type_field: Option<String>,
    /// Empty until a player claims the deck.
    #[serde(default)]
    pub player_id: String,
}

impl Commander {
    /// Build an unassigned commander from a catalog card.
    pub fn unassigned(card: &CatalogCard) -> Self {
        Self {
            name: card.name.clone(),
            image_url: card.image_url.clone(),
            mana_cost: card.mana_cost.clone(),
            type_field: card.type_field.clone(),
            player_id: String::new(),
        }
    }
}
