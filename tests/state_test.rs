//! Integration tests for persisted monitor state.

use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;

use chrono::{Duration, NaiveDateTime};
use ticketwatch::model::{TIMESTAMP_FORMAT, TicketId};
use ticketwatch::monitor::{ComplianceState, ConnectivityState, UnscheduledState};
use ticketwatch::state::{CooldownCache, Cursor, StateStore};
use uuid::Uuid;

fn ts(raw: &str) -> NaiveDateTime {
    NaiveDateTime::parse_from_str(raw, TIMESTAMP_FORMAT).unwrap()
}

fn temp_dir() -> PathBuf {
    let dir = std::env::temp_dir().join(format!("ticketwatch-state-{}", Uuid::new_v4()));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

#[tokio::test]
async fn missing_file_loads_default() {
    let dir = temp_dir();
    let store: StateStore<ComplianceState> = StateStore::new(dir.join("compliance.json"));

    let state = store.load().await.unwrap();
    assert_eq!(state, ComplianceState::default());
}

#[tokio::test]
async fn save_then_load_restores_state() {
    let dir = temp_dir();
    let store = StateStore::new(dir.join("nested").join("compliance.json"));

    let mut state = ComplianceState::default();
    state.cursor.advance(ts("2024-03-01 10:00:00"));
    state
        .retry
        .insert(TicketId::from("42"), ts("2024-03-01 08:00:00"));
    store.save(&state).await.unwrap();

    let loaded: ComplianceState = store.load().await.unwrap();
    assert_eq!(loaded, state);
    assert!(!store.path().with_extension("tmp").exists());
}

#[tokio::test]
async fn unknown_fields_are_ignored() {
    let dir = temp_dir();
    let path = dir.join("connectivity.json");
    std::fs::write(
        &path,
        r#"{
            "offline_alerts": {
                "1001": {"last_alert": "2024-03-01T10:00:00", "context": {}, "extra": 1}
            },
            "last_online": {"1001": false},
            "written_by": "a newer release"
        }"#,
    )
    .unwrap();

    let state: ConnectivityState = StateStore::new(&path).load().await.unwrap();
    assert_eq!(state.last_online.get("1001"), Some(&false));
    assert!(state.offline_alerts.get("1001").is_some());
}

#[tokio::test]
async fn corrupt_file_is_moved_aside() {
    let dir = temp_dir();
    let path = dir.join("unscheduled.json");
    std::fs::write(&path, "{ not json").unwrap();

    let state: UnscheduledState = StateStore::new(&path).load().await.unwrap();

    assert!(state.cooldowns.is_empty());
    assert!(!path.exists());
    assert!(path.with_extension("corrupt").exists());
}

// ---------------------------------------------------------------------------
// Cursor
// ---------------------------------------------------------------------------

#[test]
fn cursor_serializes_as_plain_timestamp() {
    let cursor = Cursor::at(ts("2024-03-01 10:00:00"));
    assert_eq!(
        serde_json::to_string(&cursor).unwrap(),
        "\"2024-03-01T10:00:00\""
    );
    assert_eq!(serde_json::to_string(&Cursor::default()).unwrap(), "null");
}

#[test]
fn cursor_boundary_resets_on_new_day() {
    let cursor = Cursor::at(ts("2024-03-01 23:50:00"));
    assert_eq!(
        cursor.boundary(ts("2024-03-02 00:10:00")),
        ts("2024-03-02 00:00:00")
    );
    assert_eq!(
        cursor.boundary(ts("2024-03-01 23:55:00")),
        ts("2024-03-01 23:50:00")
    );
}

// ---------------------------------------------------------------------------
// Cool-down
// ---------------------------------------------------------------------------

#[test]
fn cooldown_suppresses_inside_window_only() {
    let mut cache = CooldownCache::new();
    let first = ts("2024-03-01 10:00:00");
    cache.record("E", first, BTreeMap::new());

    let window = Duration::minutes(30);
    assert!(cache.is_suppressed("E", first + Duration::minutes(29), window));
    assert!(!cache.is_suppressed("E", first + Duration::minutes(31), window));
    assert!(!cache.is_suppressed("other", first, window));
}

#[test]
fn cooldown_prunes_entities_no_longer_open() {
    let mut cache = CooldownCache::new();
    let at = ts("2024-03-01 10:00:00");
    cache.record("1", at, BTreeMap::new());
    cache.record("2", at, BTreeMap::new());
    cache.record("3", at, BTreeMap::new());

    let live = HashSet::from(["2".to_string()]);
    assert_eq!(cache.retain_live(&live), 2);
    assert_eq!(cache.len(), 1);
    assert!(cache.get("2").is_some());
}

#[test]
fn clearing_a_cooldown_allows_the_next_alert() {
    let mut cache = CooldownCache::new();
    let at = ts("2024-03-01 10:00:00");
    cache.record("client", at, BTreeMap::from([("login".into(), "c1".into())]));

    let cleared = cache.clear("client").unwrap();
    assert_eq!(cleared.context.get("login").map(String::as_str), Some("c1"));
    assert!(!cache.is_suppressed("client", at, Duration::hours(12)));
}
