use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use viewsync_cache::{EventBridge, ManualScheduler, SyncHub, VersionDebouncer, ViewCacheStore};
use viewsync_core::{
    DiffEvent, EventKind, FilterKind, FilterRule, JsonRow, LifecycleConfig, PageResult, Record,
    ResourceConfig, Status, StatusFilter, SyncConfig, ViewParams,
};

fn users_config() -> ResourceConfig {
    let mut users = ResourceConfig::new("users");
    users.search_fields = vec!["email".into()];
    users
        .search_concat
        .insert("fullName".into(), vec!["firstName".into(), "lastName".into()]);
    let role = FilterRule {
        field: "role".into(),
        kind: FilterKind::Equals,
    };
    users.filters = BTreeMap::from([("role".to_string(), role)]);
    users.lifecycle = LifecycleConfig {
        deleted_marker: Some("deletedAt".into()),
        active_flag: Some("isActive".into()),
    };
    users
}

fn setup() -> (ManualScheduler, EventBridge<JsonRow>) {
    let config = users_config();
    let clock = ManualScheduler::new();
    let debouncer = Arc::new(VersionDebouncer::new(
        Duration::from_millis(150),
        Arc::new(clock.clone()),
    ));
    let bridge = EventBridge::new(config.schema(), Arc::new(ViewCacheStore::new()), debouncer)
        .with_decoder(config.decoder());
    (clock, bridge)
}

fn row(value: Value) -> JsonRow {
    JsonRow::from_value(value).unwrap()
}

fn user(id: &str, first: &str, last: &str) -> JsonRow {
    row(json!({
        "id": id,
        "firstName": first,
        "lastName": last,
        "email": format!("{}@example.com", first.to_lowercase()),
        "role": "member",
        "isActive": true,
        "deletedAt": null
    }))
}

fn ids(result: &PageResult<JsonRow>) -> Vec<&str> {
    result.rows.iter().map(|r| r.id()).collect()
}

#[test]
fn test_remove_from_first_page() {
    let (_, bridge) = setup();
    let view = ViewParams::new(StatusFilter::Active, 1, 2).unwrap();
    bridge.seed_view(
        view.clone(),
        PageResult::new(vec![user("r1", "Ann", "Lee"), user("r2", "Ben", "Ray")], 1, 2, 5),
    ).unwrap();

    bridge.apply(DiffEvent::remove("r2", Status::Active));

    let result = bridge.read_view(&view).unwrap();
    assert_eq!(ids(&result), vec!["r1"]);
    assert_eq!(result.total, 4);
    assert_eq!(result.total_pages, 2);
}

#[test]
fn test_soft_delete_enters_deleted_view() {
    let (_, bridge) = setup();
    let view = ViewParams::new(StatusFilter::Deleted, 1, 10).unwrap();
    bridge.seed_view(view.clone(), PageResult::empty(1, 10)).unwrap();

    let mut r9 = user("r9", "Nia", "Cho").into_value();
    r9["deletedAt"] = json!("2024-03-01T00:00:00Z");
    bridge.apply(DiffEvent::upsert(row(r9), Some(Status::Active), Status::Deleted));

    let result = bridge.read_view(&view).unwrap();
    assert_eq!(ids(&result), vec!["r9"]);
    assert_eq!(result.total, 1);
    assert_eq!(result.total_pages, 1);
}

#[test]
fn test_rename_drops_row_from_search_view() {
    let (_, bridge) = setup();
    let view = ViewParams::new(StatusFilter::Active, 1, 10)
        .unwrap()
        .with_search("smith");
    bridge.seed_view(view.clone(), PageResult::new(vec![user("a1", "Alice", "Smith")], 1, 10, 1)).unwrap();

    bridge.apply(DiffEvent::upsert(
        user("a1", "Bob", "Jones"),
        Some(Status::Active),
        Status::Active,
    ));

    let result = bridge.read_view(&view).unwrap();
    assert!(result.rows.is_empty());
    assert_eq!(result.total, 0);
    assert_eq!(result.total_pages, 0);
}

#[test]
fn test_filter_values_apply_per_view() {
    let (_, bridge) = setup();
    let admins = ViewParams::new(StatusFilter::Active, 1, 10)
        .unwrap()
        .with_filter("role", "admin");
    let members = ViewParams::new(StatusFilter::Active, 1, 10)
        .unwrap()
        .with_filter("role", "member");
    bridge.seed_view(admins.clone(), PageResult::empty(1, 10)).unwrap();
    bridge.seed_view(members.clone(), PageResult::empty(1, 10)).unwrap();

    bridge.apply(DiffEvent::upsert(user("m1", "Max", "Hale"), None, Status::Active));

    assert_eq!(bridge.read_view(&admins).unwrap().total, 0);
    assert_eq!(ids(&bridge.read_view(&members).unwrap()), vec!["m1"]);
}

#[test]
fn test_unknown_filter_key_does_not_reject() {
    let (_, bridge) = setup();
    let view = ViewParams::new(StatusFilter::Active, 1, 10)
        .unwrap()
        .with_filter("department", "science");
    bridge.seed_view(view.clone(), PageResult::empty(1, 10)).unwrap();

    bridge.apply(DiffEvent::upsert(user("u1", "Ida", "Park"), None, Status::Active));
    assert_eq!(bridge.read_view(&view).unwrap().total, 1);
}

#[test]
fn test_malformed_event_does_not_block_later_events() {
    let (clock, bridge) = setup();
    let view = ViewParams::new(StatusFilter::All, 1, 10).unwrap();
    bridge.seed_view(view.clone(), PageResult::empty(1, 10)).unwrap();

    let bad = bridge.apply_raw(EventKind::Upsert, &json!({"user": {"firstName": "no id"}, "newStatus": "active"}));
    assert!(!bad.has_changes());
    let bad = bridge.apply_raw(EventKind::Remove, &json!({"id": "x"}));
    assert!(!bad.has_changes());

    let good = bridge.apply_raw(
        EventKind::Upsert,
        &json!({"user": user("u2", "Lia", "Moss").into_value(), "previousStatus": null, "newStatus": "active"}),
    );
    assert_eq!(good.changed, 1);
    assert_eq!(bridge.read_view(&view).unwrap().total, 1);

    clock.advance(Duration::from_millis(150));
    assert_eq!(bridge.subscribe(), 1);
}

#[test]
fn test_wire_batch_signals_once() {
    let (clock, bridge) = setup();
    let view = ViewParams::new(StatusFilter::Active, 1, 5).unwrap();
    bridge.seed_view(view.clone(), PageResult::empty(1, 5)).unwrap();

    let items: Vec<Value> = (0..12)
        .map(|i| {
            json!({
                "user": user(&format!("b{}", i), "Bulk", "Row").into_value(),
                "previousStatus": null,
                "newStatus": "active"
            })
        })
        .collect();
    let report = bridge.apply_raw(EventKind::BatchUpsert, &json!({ "users": items }));
    assert!(report.signalled);
    assert_eq!(clock.pending(), 1);

    let result = bridge.read_view(&view).unwrap();
    assert_eq!(result.rows.len(), 5);
    assert_eq!(result.total, 12);
    assert_eq!(result.total_pages, 3);
    assert_eq!(result.rows[0].id(), "b11");

    assert_eq!(clock.advance(Duration::from_secs(1)), 1);
    assert_eq!(bridge.subscribe(), 1);
}

#[test]
fn test_event_burst_collapses_to_one_version() {
    let (clock, bridge) = setup();
    let view = ViewParams::new(StatusFilter::All, 1, 50).unwrap();
    bridge.seed_view(view, PageResult::empty(1, 50)).unwrap();

    for i in 0..10 {
        bridge.apply(DiffEvent::upsert(user(&format!("e{}", i), "E", "V"), None, Status::Active));
        clock.advance(Duration::from_millis(20));
    }
    assert_eq!(bridge.subscribe(), 0);
    clock.advance(Duration::from_millis(150));
    assert_eq!(bridge.subscribe(), 1);
}

#[test]
fn test_hub_from_config_round_trip() {
    let config = SyncConfig {
        resources: vec![users_config(), ResourceConfig::new("students")],
        ..SyncConfig::default()
    };
    let clock = ManualScheduler::new();
    let hub = SyncHub::from_config(&config, Arc::new(clock.clone()));

    assert!(ViewParams::new(StatusFilter::All, 0, 10).is_err());

    let view = ViewParams::new(StatusFilter::All, 1, 10).unwrap();
    hub.seed_view("students", view.clone(), PageResult::empty(1, 10)).unwrap();
    hub.dispatch(
        "students",
        EventKind::Upsert,
        &json!({"student": {"id": 3, "name": "Kai"}, "newStatus": "active"}),
    )
    .unwrap();
    assert_eq!(hub.read_view("students", &view).unwrap().unwrap().total, 1);

    clock.advance(Duration::from_millis(150));
    assert_eq!(hub.subscribe("students").unwrap(), 1);
    assert_eq!(hub.subscribe("users").unwrap(), 0);
}
