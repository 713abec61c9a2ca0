/// Transition schedule tests
///
/// Tests for time-versioned properties, schedule persistence and the cached
/// primary-store lookup
/// Run with: cargo test --test transition_schedule_tests

use chrono::{Duration, Utc};
use regshift::core::parse_instant;
use regshift::schedule::ChangeKind;
use regshift::{
    FakeClock, InMemoryStore, MigrationConfig, MigrationError, MigrationRegistry, PrimaryStore,
    START_OF_TIME, ScheduleRepository, TimeVersionedProperty, TimeVersionedPropertyBuilder,
    TransitionId, TransitionSchedule,
};
use std::collections::BTreeMap;
use std::sync::Arc;

#[test]
fn test_property_map_round_trip() {
    let day = parse_instant("2021-03-01T00:00:00Z").unwrap();
    let map = BTreeMap::from([
        (START_OF_TIME, "a"),
        (day, "b"),
        (day + Duration::days(1), "b"),
        (day + Duration::days(2), "c"),
    ]);

    let property = TimeVersionedProperty::from_map(map.clone()).unwrap();
    assert_eq!(property.to_map(), map);
    assert_eq!(property.len(), 4);
}

#[test]
fn test_property_rejects_invalid_maps() {
    let empty: BTreeMap<_, u8> = BTreeMap::new();
    assert!(matches!(
        TimeVersionedProperty::from_map(empty),
        Err(MigrationError::InvalidSchedule(_))
    ));

    let late_start = BTreeMap::from([(Utc::now(), 1u8)]);
    assert!(matches!(
        TimeVersionedProperty::from_map(late_start),
        Err(MigrationError::InvalidSchedule(_))
    ));
}

#[test]
fn test_value_at_uses_greatest_key_not_after_instant() {
    let t1 = parse_instant("2021-01-01T00:00:00Z").unwrap();
    let t2 = parse_instant("2021-06-01T00:00:00Z").unwrap();
    let property = TimeVersionedPropertyBuilder::new()
        .set(t2, 3)
        .set(START_OF_TIME, 1)
        .set(t1, 2)
        .build()
        .unwrap();

    assert_eq!(*property.value_at(START_OF_TIME), 1);
    assert_eq!(*property.value_at(t1 - Duration::nanoseconds(1)), 1);
    assert_eq!(*property.value_at(t1), 2);
    assert_eq!(*property.value_at(t2 - Duration::seconds(1)), 2);
    assert_eq!(*property.value_at(t2), 3);
    assert_eq!(*property.value_at(t2 + Duration::days(10_000)), 3);
}

#[tokio::test]
async fn test_schedule_update_switches_primary_after_transition() {
    let now = Utc::now();
    let day5 = now + Duration::days(5);
    let repository = ScheduleRepository::new(Arc::new(InMemoryStore::new("store_a")));

    let initial = TransitionSchedule::create(
        TransitionId::DomainLabelLists,
        TimeVersionedProperty::constant(PrimaryStore::StoreA),
    )
    .unwrap();
    assert_eq!(repository.save(&initial).await.unwrap().kind, ChangeKind::Created);

    let updated = TransitionSchedule::create(
        TransitionId::DomainLabelLists,
        TimeVersionedProperty::from_map(BTreeMap::from([
            (START_OF_TIME, PrimaryStore::StoreA),
            (day5, PrimaryStore::StoreB),
        ]))
        .unwrap(),
    )
    .unwrap();
    assert_eq!(repository.save(&updated).await.unwrap().kind, ChangeKind::Updated);

    let loaded = repository.load(TransitionId::DomainLabelLists).await.unwrap().unwrap();
    assert_eq!(loaded.primary_store_at(now), PrimaryStore::StoreA);
    assert_eq!(loaded.primary_store_at(day5 - Duration::seconds(1)), PrimaryStore::StoreA);
    assert_eq!(loaded.primary_store_at(day5), PrimaryStore::StoreB);
    assert_eq!(loaded.primary_store_at(day5 + Duration::days(1)), PrimaryStore::StoreB);
}

#[tokio::test]
async fn test_registry_sees_schedule_after_cache_expiry() {
    let clock = Arc::new(FakeClock::new(parse_instant("2021-02-01T00:00:00Z").unwrap()));
    let config = MigrationConfig::default()
        .schedule_cache_ttl(std::time::Duration::from_secs(60))
        .invalidate_cache_on_write(false);
    let registry = MigrationRegistry::new(
        Arc::new(InMemoryStore::new("store_a")),
        Arc::new(InMemoryStore::new("store_b")),
        config,
        clock.clone(),
    )
    .unwrap();

    assert_eq!(
        registry.primary_store(TransitionId::SignedMarkRevocationList).await,
        PrimaryStore::StoreA
    );

    registry
        .schedule_commands()
        .update(
            TransitionId::SignedMarkRevocationList,
            "START_OF_TIME=STORE_A,2021-01-15T00:00:00Z=STORE_B",
        )
        .await
        .unwrap();

    // Served from cache until the TTL runs out
    assert_eq!(
        registry.primary_store(TransitionId::SignedMarkRevocationList).await,
        PrimaryStore::StoreA
    );
    clock.advance_by(Duration::seconds(61));
    assert_eq!(
        registry.primary_store(TransitionId::SignedMarkRevocationList).await,
        PrimaryStore::StoreB
    );
}

#[tokio::test]
async fn test_schedule_store_outage_falls_back_to_default() {
    let store_a = Arc::new(InMemoryStore::new("store_a"));
    let registry = MigrationRegistry::new(
        store_a.clone(),
        Arc::new(InMemoryStore::new("store_b")),
        MigrationConfig::default().default_primary(PrimaryStore::StoreB),
        Arc::new(FakeClock::new(Utc::now())),
    )
    .unwrap();

    store_a.set_available(false);
    assert_eq!(
        registry.primary_store(TransitionId::DomainLabelLists).await,
        PrimaryStore::StoreB
    );
}

#[tokio::test]
async fn test_schedule_text_round_trips_through_commands() {
    let registry = MigrationRegistry::in_memory(MigrationConfig::default()).unwrap();
    let text = "START_OF_TIME=STORE_A,2020-12-02T00:00:00Z=STORE_B,2021-01-01T00:00:00Z=STORE_A";

    let change = registry
        .schedule_commands()
        .update(TransitionId::DomainLabelLists, text)
        .await
        .unwrap();
    assert_eq!(
        change.to_string(),
        format!("Create TransitionSchedule DOMAIN_LABEL_LISTS: {}", text)
    );

    let schedule = registry
        .schedule_commands()
        .get(TransitionId::DomainLabelLists)
        .await
        .unwrap();
    assert_eq!(regshift::schedule::format_transitions(schedule.transitions()), text);
}
