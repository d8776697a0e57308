//! Integration tests for spread and take over the standard tree

mod common;

use common::*;
use hierarchy_params::db::bindings;
use hierarchy_params::db::models::{ParameterBinding, Propagation, Status, ValuePayload};
use hierarchy_params::{ParamDb, ParamError, ParameterEvent, Services};

fn binding(db: &ParamDb, node: i64, parameter: i64, property: i64) -> Option<ParameterBinding> {
    db.with_conn(|conn| bindings::find_binding(conn, node, parameter, property)).unwrap()
}

/// Decoded amounts stored under a node's binding, in insertion order
fn amounts(db: &ParamDb, node: i64, parameter: i64, property: i64) -> Vec<String> {
    let Some(binding) = binding(db, node, parameter, property) else {
        return Vec::new();
    };
    db.with_conn(|conn| bindings::list_binding_values(conn, binding.id))
        .unwrap()
        .into_iter()
        .map(|v| ValuePayload::decode(&v.attributes).unwrap().amount.unwrap_or_default())
        .collect()
}

fn bindings_of(db: &ParamDb, node: i64) -> Vec<(i64, i64)> {
    db.with_conn(|conn| bindings::list_bindings(conn, node))
        .unwrap()
        .into_iter()
        .map(|b| (b.parameter_id, b.property_id))
        .collect()
}

// ============================================================================
// Spread
// ============================================================================

#[test]
fn test_spread_reaches_every_applicable_descendant() {
    let db = seeded_db();
    let services = Services::new(db.clone());
    services.bindings.create_value(value_input(100, 8, 2, "5")).unwrap();
    services.bindings.create_value(value_input(100, 8, 3, "0.5")).unwrap();

    let affected = services.propagation.spread(100, None).unwrap();
    assert_eq!(affected, 6);

    for node in [101, 102, 103] {
        assert_eq!(amounts(&db, node, 8, 2), vec!["5"]);
        assert_eq!(amounts(&db, node, 8, 3), vec!["0.5"]);
        let copy = binding(&db, node, 8, 2).unwrap();
        assert_eq!(copy.propagate_to_children, Propagation::NoPropagate);
    }
    // node type 3 is not applicable to parameter 8
    assert!(bindings_of(&db, 104).is_empty());
    // other subtree untouched
    assert!(bindings_of(&db, 201).is_empty());

    assert_eq!(binding(&db, 100, 8, 2).unwrap().propagate_to_children, Propagation::NoPropagate);
    assert_eq!(binding(&db, 100, 8, 3).unwrap().propagate_to_children, Propagation::NoPropagate);
}

#[test]
fn test_spread_parameter_filter() {
    let db = seeded_db();
    let services = Services::new(db.clone());
    services.bindings.create_value(value_input(100, 7, 1, "100")).unwrap();
    services.bindings.create_value(value_input(100, 8, 2, "5")).unwrap();

    let affected = services.propagation.spread(100, Some(8)).unwrap();
    assert_eq!(affected, 3);

    assert!(binding(&db, 101, 7, 1).is_none());
    assert_eq!(amounts(&db, 101, 8, 2), vec!["5"]);
    assert_eq!(binding(&db, 100, 7, 1).unwrap().propagate_to_children, Propagation::Propagate);
    assert_eq!(binding(&db, 100, 8, 2).unwrap().propagate_to_children, Propagation::NoPropagate);
}

#[test]
fn test_spread_without_descendant_targets_is_a_no_op() {
    let db = seeded_db();
    let services = Services::new(db.clone());
    services.bindings.create_value(value_input(102, 8, 2, "5")).unwrap();
    let mut events = services.events.subscribe();

    // 104 is type 3, parameter 8 does not apply
    assert_eq!(services.propagation.spread(102, None).unwrap(), 0);
    assert_eq!(binding(&db, 102, 8, 2).unwrap().propagate_to_children, Propagation::Propagate);
    assert!(events.try_recv().is_err());

    // leaf node
    services.bindings.create_value(value_input(103, 7, 1, "1")).unwrap();
    assert_eq!(services.propagation.spread(103, None).unwrap(), 0);
}

#[test]
fn test_second_spread_finds_nothing_pending() {
    let db = seeded_db();
    let services = Services::new(db.clone());
    services.bindings.create_value(value_input(100, 7, 1, "100")).unwrap();

    assert_eq!(services.propagation.spread(100, None).unwrap(), 2);
    let values_after_first = total_values(&db);

    assert_eq!(services.propagation.spread(100, None).unwrap(), 0);
    assert_eq!(total_values(&db), values_after_first);
    assert_eq!(amounts(&db, 103, 7, 1), vec!["100"]);
}

#[test]
fn test_spread_overwrites_descendant_values() {
    let db = seeded_db();
    let services = Services::new(db.clone());
    services.bindings.create_value(value_input(101, 7, 1, "own-1")).unwrap();
    services.bindings.create_value(value_input(101, 7, 1, "own-2")).unwrap();
    services.bindings.create_value(value_input(101, 8, 2, "kept")).unwrap();
    services.bindings.create_value(value_input(100, 7, 1, "parent")).unwrap();

    services.propagation.spread(100, Some(7)).unwrap();

    assert_eq!(amounts(&db, 101, 7, 1), vec!["parent"]);
    assert_eq!(amounts(&db, 101, 8, 2), vec!["kept"]);
}

#[test]
fn test_spread_keeps_bindings_of_inapplicable_descendants() {
    let db = seeded_db();
    let services = Services::new(db.clone());
    // 102 is type 2, parameter 7 applies to type 1 only
    let foreign = db
        .with_conn(|conn| {
            let binding = bindings::insert_binding(conn, 102, 7, 1, Status::Active, Propagation::NoPropagate)?;
            bindings::insert_value(conn, binding, &payload("42").encode()?, None, Status::Active)?;
            Ok(binding)
        })
        .unwrap();
    services.bindings.create_value(value_input(100, 7, 1, "100")).unwrap();

    assert_eq!(services.propagation.spread(100, Some(7)).unwrap(), 2);

    assert_eq!(binding(&db, 102, 7, 1).unwrap().id, foreign);
    assert_eq!(amounts(&db, 102, 7, 1), vec!["42"]);
    assert_eq!(amounts(&db, 101, 7, 1), vec!["100"]);
    assert_eq!(amounts(&db, 103, 7, 1), vec!["100"]);
}

#[test]
fn test_spread_copies_binding_status() {
    let db = seeded_db();
    let services = Services::new(db.clone());
    services.bindings.set_binding_status(100, 7, 1, Status::Inactive).unwrap();
    services.bindings.create_value(value_input(100, 7, 1, "9")).unwrap();

    assert_eq!(services.propagation.spread(100, None).unwrap(), 2);

    let copy = binding(&db, 101, 7, 1).unwrap();
    assert_eq!(copy.status, Status::Inactive);
    assert_eq!(copy.propagate_to_children, Propagation::NoPropagate);
    assert_eq!(amounts(&db, 103, 7, 1), vec!["9"]);
}

#[test]
fn test_spread_without_values_still_writes_bindings() {
    let db = seeded_db();
    let services = Services::new(db.clone());
    services.bindings.set_binding_status(100, 7, 1, Status::Active).unwrap();

    assert_eq!(services.propagation.spread(100, None).unwrap(), 2);
    assert!(binding(&db, 101, 7, 1).is_some());
    assert!(amounts(&db, 101, 7, 1).is_empty());
}

#[test]
fn test_respread_replaces_copies() {
    let db = seeded_db();
    let services = Services::new(db.clone());
    services.bindings.create_value(value_input(100, 7, 1, "1")).unwrap();
    services.propagation.spread(100, None).unwrap();
    let first = binding(&db, 101, 7, 1).unwrap();

    services.bindings.create_value(value_input(100, 7, 1, "2")).unwrap();
    assert_eq!(binding(&db, 100, 7, 1).unwrap().propagate_to_children, Propagation::Propagate);
    services.propagation.spread(100, None).unwrap();

    let second = binding(&db, 101, 7, 1).unwrap();
    assert_ne!(first.id, second.id);
    assert_eq!(amounts(&db, 101, 7, 1), vec!["1", "2"]);
}

#[test]
fn test_spread_emits_event() {
    let services = Services::new(seeded_db());
    services.bindings.create_value(value_input(100, 7, 1, "1")).unwrap();
    let mut events = services.events.subscribe();

    services.propagation.spread(100, Some(7)).unwrap();
    match events.try_recv().unwrap() {
        ParameterEvent::Spread { hierarchy_id, parameter_id, affected } => {
            assert_eq!(hierarchy_id, 100);
            assert_eq!(parameter_id, Some(7));
            assert_eq!(affected, 2);
        }
        other => panic!("unexpected event {:?}", other),
    }
}

#[test]
fn test_spread_rejects_bad_nodes() {
    let services = Services::new(seeded_db());
    assert!(matches!(services.propagation.spread(0, None), Err(ParamError::InvalidNodeId(0))));
    assert!(matches!(services.propagation.spread(200, None), Err(ParamError::NodeDisabled(200))));
    assert!(matches!(services.propagation.spread(999, None), Err(ParamError::NodeDisabled(999))));
}

// ============================================================================
// Take
// ============================================================================

#[test]
fn test_take_replaces_bindings_with_parents() {
    let db = seeded_db();
    let services = Services::new(db.clone());
    services.bindings.create_value(value_input(101, 8, 2, "own")).unwrap();
    services.bindings.create_value(value_input(100, 7, 1, "100")).unwrap();
    services.bindings.create_value(value_input(100, 8, 3, "0.5")).unwrap();

    let outcome = services.propagation.take(101, None).unwrap();
    assert_eq!(outcome.parent_id, 100);
    assert_eq!(outcome.bindings, 2);
    assert_eq!(outcome.values, 2);

    assert_eq!(bindings_of(&db, 101), vec![(7, 1), (8, 3)]);
    assert_eq!(amounts(&db, 101, 7, 1), vec!["100"]);
    let copy = binding(&db, 101, 8, 3).unwrap();
    assert_eq!(copy.status, Status::Active);
    assert_eq!(copy.propagate_to_children, Propagation::NoPropagate);

    // the parent keeps its own state
    assert_eq!(binding(&db, 100, 7, 1).unwrap().propagate_to_children, Propagation::Propagate);
}

#[test]
fn test_take_filters_by_node_type() {
    let db = seeded_db();
    let services = Services::new(db.clone());
    services.bindings.create_value(value_input(100, 7, 1, "100")).unwrap();
    services.bindings.create_value(value_input(100, 8, 2, "5")).unwrap();

    let outcome = services.propagation.take(102, None).unwrap();
    assert_eq!(outcome.bindings, 1);
    assert_eq!(bindings_of(&db, 102), vec![(8, 2)]);
}

#[test]
fn test_take_skips_inactive_parent_bindings() {
    let db = seeded_db();
    let services = Services::new(db.clone());
    services.bindings.create_value(value_input(100, 7, 1, "100")).unwrap();
    services.bindings.set_binding_status(100, 7, 1, Status::Inactive).unwrap();
    services.bindings.create_value(value_input(100, 8, 2, "5")).unwrap();

    let outcome = services.propagation.take(101, None).unwrap();
    assert_eq!(outcome.bindings, 1);
    assert_eq!(bindings_of(&db, 101), vec![(8, 2)]);
}

#[test]
fn test_take_with_empty_parent_rolls_back() {
    let db = seeded_db();
    let services = Services::new(db.clone());
    services.bindings.create_value(value_input(101, 7, 1, "own")).unwrap();

    let err = services.propagation.take(101, None).unwrap_err();
    assert!(matches!(err, ParamError::TakePropertyFailed(_)));
    assert_eq!(amounts(&db, 101, 7, 1), vec!["own"]);
}

#[test]
fn test_take_with_valueless_parent_rolls_back() {
    let db = seeded_db();
    let services = Services::new(db.clone());
    services.bindings.create_value(value_input(101, 7, 1, "own")).unwrap();
    services.bindings.set_binding_status(100, 7, 1, Status::Active).unwrap();

    let err = services.propagation.take(101, None).unwrap_err();
    assert!(matches!(err, ParamError::TakeParameterFailed(_)));
    assert_eq!(amounts(&db, 101, 7, 1), vec!["own"]);
    assert_eq!(bindings_of(&db, 101), vec![(7, 1)]);
}

#[test]
fn test_take_on_root_fails() {
    let db = seeded_db();
    let services = Services::new(db.clone());
    services.bindings.create_value(value_input(100, 7, 1, "root")).unwrap();

    let err = services.propagation.take(100, None).unwrap_err();
    assert!(matches!(err, ParamError::TakePropertyFailed(_)));
    assert_eq!(amounts(&db, 100, 7, 1), vec!["root"]);
}

#[test]
fn test_take_reads_immediate_parent_only() {
    let db = seeded_db();
    let services = Services::new(db.clone());
    services.bindings.create_value(value_input(100, 7, 1, "grandparent")).unwrap();

    let err = services.propagation.take(103, None).unwrap_err();
    assert!(matches!(err, ParamError::TakePropertyFailed(_)));
}

#[test]
fn test_take_resyncs_whole_node_regardless_of_filter() {
    let db = seeded_db();
    let services = Services::new(db.clone());
    services.bindings.create_value(value_input(101, 8, 3, "own")).unwrap();
    services.bindings.create_value(value_input(100, 7, 1, "100")).unwrap();

    services.propagation.take(101, Some(7)).unwrap();
    assert_eq!(bindings_of(&db, 101), vec![(7, 1)]);
}

#[test]
fn test_take_on_disabled_node() {
    let db = seeded_db();
    let services = Services::new(db.clone());
    let before = total_bindings(&db);

    assert!(matches!(services.propagation.take(200, None), Err(ParamError::NodeDisabled(200))));
    assert_eq!(total_bindings(&db), before);
}

#[test]
fn test_take_emits_event() {
    let services = Services::new(seeded_db());
    services.bindings.create_value(value_input(100, 7, 1, "1")).unwrap();
    let mut events = services.events.subscribe();

    services.propagation.take(101, None).unwrap();
    assert!(matches!(
        events.try_recv().unwrap(),
        ParameterEvent::Taken { hierarchy_id: 101, parent_id: 100, bindings: 1, values: 1 }
    ));
}
