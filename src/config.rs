use std::path::PathBuf;
use std::time::Duration;

/// Public MTG catalog API.
pub const CATALOG_BASE: &str = "https://api.magicthegathering.io/v1";

/// Durable queue that receives one message per built deck.
pub const IMPORT_QUEUE: &str = "deck_import_queue";

/// Upper bound on the companion pool, one page of the catalog.
pub const POOL_PAGE_SIZE: usize = 99;

/// Per-request catalog timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

pub const DEFAULT_MAX_IMPORT_ATTEMPTS: u32 = 3;

/// Platform data directory location of the deck database, falling back
/// to `.deckforge/` in the working directory.
pub fn default_database_path() -> PathBuf {
    if let Some(data) = dirs::data_dir() {
        data.join("deckforge").join("decks.duckdb")
    } else {
        PathBuf::from(".deckforge").join("decks.duckdb")
    }
}
