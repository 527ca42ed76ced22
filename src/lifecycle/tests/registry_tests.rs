//! Unit tests for the server registry.

use crate::lifecycle::domain::{ManagedServerRecord, OperationKind, ServerId, ServerState};
use crate::lifecycle::services::ServerRegistry;
use crate::server_type::domain::{ServerAttributeMap, ServerTypeId};
use mockable::DefaultClock;
use rstest::{fixture, rstest};

fn record(id: &str) -> ManagedServerRecord {
    ManagedServerRecord::new(
        ServerId::new(id).expect("valid server id"),
        ServerTypeId::new("echo").expect("valid server type id"),
        ServerAttributeMap::new(),
        &DefaultClock,
    )
}

#[fixture]
fn registry() -> ServerRegistry {
    let registry = ServerRegistry::new();
    assert!(registry.insert(record("s2")));
    assert!(registry.insert(record("s1")));
    registry
}

#[rstest]
fn duplicate_ids_are_refused(registry: ServerRegistry) {
    assert!(!registry.insert(record("s1")));
    assert_eq!(registry.len(), 2);
}

#[rstest]
fn list_is_ordered_by_id(registry: ServerRegistry) {
    let ids: Vec<_> = registry
        .list()
        .into_iter()
        .map(|snapshot| snapshot.id.to_string())
        .collect();

    assert_eq!(ids, ["s1", "s2"]);
}

#[rstest]
fn refused_removal_keeps_the_record(registry: ServerRegistry) {
    let outcome = registry.remove_if("s1", |_| Err("busy"));

    assert_eq!(outcome.map(|result| result.map(|_| ())), Some(Err("busy")));
    assert!(registry.snapshot("s1").is_some());
}

#[rstest]
fn removal_retires_the_record_for_slot_holders(registry: ServerRegistry) {
    let slot = registry.slot("s1").expect("slot for s1");

    let removed = registry
        .remove_if("s1", |_| Ok::<(), ()>(()))
        .expect("record exists")
        .expect("removal allowed");

    assert_eq!(removed.state, ServerState::Stopped);
    assert!(registry.snapshot("s1").is_none());
    assert!(slot.read(ManagedServerRecord::is_retired));
    assert_eq!(registry.len(), 1);
}

#[rstest]
fn unknown_ids_are_not_removed(registry: ServerRegistry) {
    assert!(registry.remove_if("ghost", |_| Ok::<(), ()>(())).is_none());
}

#[rstest]
fn slot_updates_are_visible_in_snapshots(registry: ServerRegistry) {
    let slot = registry.slot("s2").expect("slot for s2");

    slot.update(|record| record.claim(OperationKind::Stop, &DefaultClock))
        .expect("claim should succeed");

    let snapshot = registry.snapshot("s2").expect("snapshot for s2");
    assert_eq!(snapshot.operation, Some(OperationKind::Stop));
}
