//! Deck store tests: lookups, merges and deletes keyed by commander name.

mod common;

use common::{ATRAXA, COLORLESS, NIV};
use deckforge::models::{Card, CommanderPatch, DeckPatch};
use deckforge::{Connection, DeckStore, DeckforgeError};

fn store() -> DeckStore {
    DeckStore::new(Connection::open_in_memory().unwrap(), false).unwrap()
}

fn sample_deck(name: &str) -> deckforge::models::Deck {
    let catalog = common::StubCatalog::sample();
    let commander = deckforge::CardSource::fetch_commander(&catalog, name).unwrap();
    let pool = deckforge::CardSource::fetch_pool(&catalog, &commander.colors).unwrap();
    deckforge::assembler::assemble(&commander, &pool)
}

// ---------------------------------------------------------------------------
// create / find_by_name
// ---------------------------------------------------------------------------

#[test]
fn created_deck_reads_back_equal() {
    let store = store();
    let deck = sample_deck(ATRAXA);
    store.create(&deck).unwrap();

    let found = store.find_by_name(ATRAXA).unwrap();
    assert_eq!(found, deck);
    assert_eq!(found.commander.player_id, "");
}

#[test]
fn repeated_reads_are_identical() {
    let store = store();
    store.create(&sample_deck(ATRAXA)).unwrap();

    let first = store.find_by_name(ATRAXA).unwrap();
    let second = store.find_by_name(ATRAXA).unwrap();
    assert_eq!(first, second);
}

#[test]
fn create_returns_distinct_ids() {
    let store = store();
    let a = store.create(&sample_deck(ATRAXA)).unwrap();
    let b = store.create(&sample_deck(NIV)).unwrap();
    assert_ne!(a, b);
    assert_eq!(a.as_str().len(), 24);
}

#[test]
fn duplicate_commanders_are_allowed_by_default() {
    let store = store();
    let first = sample_deck(ATRAXA);
    let mut second = first.clone();
    second.cards.truncate(1);

    store.create(&first).unwrap();
    store.create(&second).unwrap();

    assert_eq!(store.count().unwrap(), 2);
    // The oldest record answers name lookups.
    assert_eq!(store.find_by_name(ATRAXA).unwrap(), first);
}

#[test]
fn unique_commanders_rejects_duplicates() {
    let store = DeckStore::new(Connection::open_in_memory().unwrap(), true).unwrap();
    store.create(&sample_deck(ATRAXA)).unwrap();

    let err = store.create(&sample_deck(ATRAXA)).unwrap_err();
    assert!(matches!(err, DeckforgeError::Duplicate(_)));
    assert_eq!(store.count().unwrap(), 1);
}

#[test]
fn empty_commander_name_is_rejected() {
    let store = store();
    let mut deck = sample_deck(ATRAXA);
    deck.commander.name = String::new();

    let err = store.create(&deck).unwrap_err();
    assert!(matches!(err, DeckforgeError::InvalidArgument(_)));
    assert_eq!(store.count().unwrap(), 0);
}

#[test]
fn names_are_stored_verbatim() {
    let store = store();
    let mut deck = sample_deck(ATRAXA);
    deck.commander.name = " ".to_string();

    store.create(&deck).unwrap();

    assert_eq!(store.find_by_name(" ").unwrap(), deck);
    assert!(matches!(
        store.find_by_name(""),
        Err(DeckforgeError::NotFound(_))
    ));
}

// ---------------------------------------------------------------------------
// update_by_name
// ---------------------------------------------------------------------------

#[test]
fn update_changes_only_the_given_field() {
    let store = store();
    let before = sample_deck(ATRAXA);
    store.create(&before).unwrap();

    let after = store
        .update_by_name(ATRAXA, &DeckPatch::assign_player("player-42"))
        .unwrap();

    assert_eq!(after.commander.player_id, "player-42");
    assert_eq!(after.commander.name, before.commander.name);
    assert_eq!(after.commander.image_url, before.commander.image_url);
    assert_eq!(after.commander.mana_cost, before.commander.mana_cost);
    assert_eq!(after.commander.type_field, before.commander.type_field);
    assert_eq!(after.cards, before.cards);
    assert_eq!(store.find_by_name(ATRAXA).unwrap(), after);
}

#[test]
fn update_can_replace_cards() {
    let store = store();
    let before = sample_deck(NIV);
    store.create(&before).unwrap();

    let replacement = vec![Card {
        name: "Brainstorm".to_string(),
        image_url: None,
        mana_cost: Some("{U}".to_string()),
        type_field: Some("Instant".to_string()),
    }];
    let patch = DeckPatch {
        commander: None,
        cards: Some(replacement.clone()),
    };
    let after = store.update_by_name(NIV, &patch).unwrap();

    assert_eq!(after.cards, replacement);
    assert_eq!(after.commander, before.commander);
}

#[test]
fn update_can_rename_the_commander() {
    let store = store();
    store.create(&sample_deck(COLORLESS)).unwrap();

    let patch = DeckPatch {
        commander: Some(CommanderPatch {
            name: Some("Karn, Legacy Reforged".to_string()),
            ..CommanderPatch::default()
        }),
        cards: None,
    };
    store.update_by_name(COLORLESS, &patch).unwrap();

    assert!(store.find_by_name("Karn, Legacy Reforged").is_ok());
    assert!(matches!(
        store.find_by_name(COLORLESS),
        Err(DeckforgeError::NotFound(_))
    ));
}

#[test]
fn update_to_empty_name_is_rejected_and_leaves_record() {
    let store = store();
    let deck = sample_deck(ATRAXA);
    store.create(&deck).unwrap();

    let patch = DeckPatch {
        commander: Some(CommanderPatch {
            name: Some(String::new()),
            ..CommanderPatch::default()
        }),
        cards: None,
    };
    let err = store.update_by_name(ATRAXA, &patch).unwrap_err();
    assert!(matches!(err, DeckforgeError::InvalidArgument(_)));
    assert_eq!(store.find_by_name(ATRAXA).unwrap(), deck);
}

// ---------------------------------------------------------------------------
// delete_by_name / find_all
// ---------------------------------------------------------------------------

#[test]
fn delete_removes_the_deck() {
    let store = store();
    store.create(&sample_deck(ATRAXA)).unwrap();
    store.create(&sample_deck(NIV)).unwrap();

    store.delete_by_name(ATRAXA).unwrap();

    assert!(matches!(
        store.find_by_name(ATRAXA),
        Err(DeckforgeError::NotFound(_))
    ));
    assert_eq!(store.count().unwrap(), 1);
}

#[test]
fn delete_of_nonexistent_is_not_found() {
    let store = store();
    let err = store.delete_by_name("Nonexistent").unwrap_err();
    match err {
        DeckforgeError::NotFound(msg) => assert!(msg.contains("Nonexistent")),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn missing_name_is_not_found_for_every_operation() {
    let store = store();
    store.create(&sample_deck(ATRAXA)).unwrap();

    assert!(matches!(
        store.find_by_name("Ghost"),
        Err(DeckforgeError::NotFound(_))
    ));
    assert!(matches!(
        store.update_by_name("Ghost", &DeckPatch::assign_player("p")),
        Err(DeckforgeError::NotFound(_))
    ));
    assert!(matches!(
        store.delete_by_name("Ghost"),
        Err(DeckforgeError::NotFound(_))
    ));
}

#[test]
fn find_all_returns_every_deck_in_insertion_order() {
    let store = store();
    assert!(store.find_all().unwrap().is_empty());

    let ids = vec![
        store.create(&sample_deck(NIV)).unwrap(),
        store.create(&sample_deck(ATRAXA)).unwrap(),
        store.create(&sample_deck(NIV)).unwrap(),
    ];
    let all = store.find_all().unwrap();

    assert_eq!(all.len(), 3);
    let stored_ids: Vec<_> = all.iter().map(|d| d.id.clone()).collect();
    assert_eq!(stored_ids, ids);
    assert_eq!(all[1].deck.name(), ATRAXA);
}

#[test]
fn decks_survive_reopening_the_database() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("decks.duckdb");
    let deck = sample_deck(ATRAXA);

    {
        let store = DeckStore::new(Connection::open(&path).unwrap(), false).unwrap();
        store.create(&deck).unwrap();
    }

    let store = DeckStore::new(Connection::open(&path).unwrap(), false).unwrap();
    assert_eq!(store.find_by_name(ATRAXA).unwrap(), deck);
}
