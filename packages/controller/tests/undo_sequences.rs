//! Tests for undo/redo history, batches and atomicity
//!
//! This tests:
//! - Long command sequences undone and redone step by step
//! - Batched commands recorded as one group
//! - Failed groups rolled back completely
//! - History bounds
//! - Re-entrant access from observers
//! - Schema-checked documents

mod common;

use common::*;
use frond_ast::{AstError, PropertyKind, PropertySchema};
use frond_controller::{
    Block, BrowsingIndex, Controller, ControllerConfig, ControllerError, Edit, EventKind,
    InnerPath, InnerRef, InsertionIndex, Node, NodePath, ObserverRegistry, OperationGroup,
    ReflectHelper, ReplicationStatus, Schema, SchemaHelper, SharedController, Slot,
};
use std::cell::RefCell;
use std::rc::Rc;

#[test]
fn test_undo_redo_round_trip() {
    let (mut controller, _log) = controller_with_log(class_doc());
    let root = controller.root();
    let body = InnerRef::new(root, "body");
    let initial_states = controller.state_count();

    let mut snapshots = vec![controller.document().clone()];
    let mut step = |controller: &mut Controller, result: Result<(), ControllerError>| {
        result.unwrap();
        assert!(controller.verify().is_ok());
        snapshots.push(controller.document().clone());
    };

    let r = controller
        .insert(InsertionIndex::list(root, "features", 3, method("rotate")))
        .map(|_| ());
    step(&mut controller, r);
    let r = controller.move_state(&BrowsingIndex::new(root, "features", Slot::List(0)), 1);
    step(&mut controller, r);
    let r = controller.split_block(&body, 0, 1);
    step(&mut controller, r);
    let r = controller.merge_blocks(&body, 0);
    step(&mut controller, r);
    let r = controller.unassign(&BrowsingIndex::new(root, "base", Slot::Optional));
    step(&mut controller, r);
    let r = controller.set_value(root, "name", "Figure");
    step(&mut controller, r);
    let r = controller
        .insert(InsertionIndex::NewBlock {
            parent: root,
            property: "body".into(),
            block: 0,
            replication: ReplicationStatus::Normal,
            pattern: Node::new("Pattern").with_value("text", "p"),
            source: Node::new("Identifier").with_value("text", "ps"),
            node: stmt("p0"),
        })
        .map(|_| ());
    step(&mut controller, r);
    let r = controller.remove(&BrowsingIndex::new(root, "features", Slot::List(1)));
    step(&mut controller, r);
    let r = controller.replace(
        &BrowsingIndex::new(root, "header", Slot::Placeholder),
        Node::new("Header").with_value("text", "class Figure"),
    );
    step(&mut controller, r);
    let r = controller.change_replication(&body, 1, ReplicationStatus::Replicated);
    step(&mut controller, r);

    assert_eq!(controller.history().undo_levels(), 10);

    // Undo walks back through every snapshot
    for expected in snapshots.iter().rev().skip(1) {
        assert!(controller.undo().unwrap());
        assert_eq!(controller.document(), expected);
        assert!(controller.verify().is_ok());
    }
    assert!(!controller.undo().unwrap());
    assert_eq!(controller.state_count(), initial_states);

    // Redo walks forward again
    for expected in snapshots.iter().skip(1) {
        assert!(controller.redo().unwrap());
        assert_eq!(controller.document(), expected);
    }
    assert!(!controller.redo().unwrap());
}

#[test]
fn test_new_edit_clears_redo() {
    let (mut controller, _log) = controller_with_log(class_doc());
    let root = controller.root();

    controller.set_value(root, "name", "A").unwrap();
    controller.undo().unwrap();
    assert!(controller.can_redo());

    controller.set_value(root, "name", "B").unwrap();
    assert!(!controller.can_redo());
    assert!(!controller.redo().unwrap());
    assert_eq!(controller.document().text("name"), Some("B"));
}

#[test]
fn test_max_undo_levels() {
    let config = ControllerConfig {
        max_undo_levels: 2,
        verify_invariants: true,
    };
    let mut controller =
        Controller::with_config(class_doc(), ReflectHelper, ObserverRegistry::new(), config)
            .unwrap();
    let root = controller.root();

    for name in ["A", "B", "C"] {
        controller.set_value(root, "name", name).unwrap();
    }
    assert_eq!(controller.history().undo_levels(), 2);

    assert!(controller.undo().unwrap());
    assert!(controller.undo().unwrap());
    assert!(!controller.undo().unwrap());
    // The oldest edit fell off the stack
    assert_eq!(controller.document().text("name"), Some("A"));
}

#[test]
fn test_batch_records_one_group() {
    let (mut controller, log) = controller_with_log(class_doc());
    let root = controller.root();

    controller
        .begin_batch(Some("Reorder features".into()))
        .unwrap();
    controller
        .move_state(&BrowsingIndex::new(root, "features", Slot::List(0)), 1)
        .unwrap();
    controller
        .move_state(&BrowsingIndex::new(root, "features", Slot::List(2)), -2)
        .unwrap();
    controller.set_batch_refresh(root).unwrap();
    assert_eq!(feature_names(&controller), ["scale", "draw", "area"]);

    assert_eq!(controller.undo(), Err(ControllerError::BatchInProgress));
    assert_eq!(
        controller.begin_batch(None),
        Err(ControllerError::BatchInProgress)
    );
    assert_eq!(log.count(EventKind::StateRefreshed), 0);

    assert!(controller.end_batch().unwrap());
    assert_eq!(log.count(EventKind::StateRefreshed), 1);
    assert_eq!(controller.history().undo_levels(), 1);
    assert_eq!(
        controller.history().undo_description(),
        Some("Reorder features")
    );

    controller.undo().unwrap();
    assert_eq!(feature_names(&controller), ["area", "draw", "scale"]);
    assert_eq!(log.count(EventKind::StateRefreshed), 2);
    assert_eq!(
        controller.history().redo_description(),
        Some("Reorder features")
    );
}

#[test]
fn test_empty_and_missing_batch() {
    let (mut controller, _log) = controller_with_log(class_doc());

    assert_eq!(controller.end_batch(), Err(ControllerError::NoBatch));
    assert_eq!(controller.abort_batch(), Err(ControllerError::NoBatch));
    assert_eq!(
        controller.set_batch_refresh(controller.root()),
        Err(ControllerError::NoBatch)
    );

    controller.begin_batch(None).unwrap();
    assert!(!controller.end_batch().unwrap());
    assert!(!controller.can_undo());
}

#[test]
fn test_abort_batch_reverts() {
    let (mut controller, _log) = controller_with_log(class_doc());
    let root = controller.root();
    let document = controller.document().clone();

    controller.begin_batch(None).unwrap();
    controller
        .insert(InsertionIndex::list(root, "features", 0, method("x")))
        .unwrap();
    controller.set_value(root, "name", "Changed").unwrap();

    assert_eq!(controller.abort_batch().unwrap(), 2);
    assert_eq!(controller.document(), &document);
    assert_eq!(controller.state_count(), 11);
    assert!(!controller.can_undo());
    assert!(controller.verify().is_ok());
}

#[test]
fn test_failed_group_rolls_back() {
    let (mut controller, log) = controller_with_log(class_doc());
    let document = controller.document().clone();
    let features = InnerPath::new(NodePath::root(), "features");

    let group = OperationGroup::new(vec![
        Edit::Insert {
            inner: features.clone(),
            slot: Slot::List(0),
            node: method("x"),
        },
        Edit::Move {
            inner: features,
            slot: Slot::List(0),
            delta: 1,
        },
        Edit::SetValue {
            owner: NodePath::root(),
            property: "name".into(),
            before: "Nope".into(),
            after: "Figure".into(),
        },
    ])
    .unwrap();

    assert!(matches!(
        controller.execute(group),
        Err(ControllerError::InvalidState(_))
    ));
    assert_eq!(controller.document(), &document);
    assert_eq!(controller.state_count(), 11);
    assert!(!controller.can_undo());
    assert!(controller.verify().is_ok());
    assert!(log.is_empty());

    assert_eq!(
        OperationGroup::new(vec![]).unwrap_err(),
        ControllerError::EmptyOperationGroup
    );
}

#[test]
fn test_failed_group_publishes_nothing() {
    let (mut controller, log) = controller_with_log(class_doc());
    let features = InnerPath::new(NodePath::root(), "features");

    let failing = OperationGroup::new(vec![
        Edit::Insert {
            inner: features.clone(),
            slot: Slot::List(0),
            node: method("x"),
        },
        Edit::Remove {
            inner: features.clone(),
            slot: Slot::List(9),
            node: method("x"),
        },
    ])
    .unwrap();
    assert_eq!(
        controller.execute(failing),
        Err(ControllerError::IndexOutOfRange {
            position: 9,
            count: 4
        })
    );
    assert!(log.is_empty());
    assert_eq!(feature_names(&controller), ["area", "draw", "scale"]);

    // A group that succeeds delivers its events in application order
    let group = OperationGroup::new(vec![
        Edit::Insert {
            inner: features.clone(),
            slot: Slot::List(0),
            node: method("x"),
        },
        Edit::Remove {
            inner: features,
            slot: Slot::List(0),
            node: method("x"),
        },
    ])
    .unwrap();
    controller.execute(group).unwrap();
    assert_eq!(
        log.kinds(),
        vec![
            EventKind::NodeStateCreated,
            EventKind::NodeStateInitialized,
            EventKind::StateInserted,
            EventKind::NodeStateRemoved,
            EventKind::StateRemoved,
        ]
    );
    assert_eq!(feature_names(&controller), ["area", "draw", "scale"]);
}

#[test]
fn test_execute_rejected_during_batch() {
    let (mut controller, _log) = controller_with_log(class_doc());
    let group = OperationGroup::single(Edit::SetValue {
        owner: NodePath::root(),
        property: "name".into(),
        before: "Shape".into(),
        after: "Figure".into(),
    });

    controller.begin_batch(None).unwrap();
    assert_eq!(
        controller.execute(group),
        Err(ControllerError::BatchInProgress)
    );
}

#[test]
fn test_reentrant_mutation_is_rejected() {
    let (controller, _log) = controller_with_log(class_doc());
    let root = controller.root();
    let shared = SharedController::new(controller);

    let outcomes = Rc::new(RefCell::new(Vec::new()));
    let recorded = Rc::clone(&outcomes);
    let weak = shared.downgrade();
    shared
        .on(EventKind::StateInserted, move |_| {
            let handle = match weak.upgrade() {
                Some(handle) => handle,
                None => return,
            };
            let write = handle.set_value(root, "name", "Nested");
            let read = handle.read(|controller| controller.state_count());
            recorded.borrow_mut().push((write, read.is_err()));
        })
        .unwrap();

    shared
        .insert(InsertionIndex::list(root, "features", 0, method("x")))
        .unwrap();

    assert_eq!(
        *outcomes.borrow(),
        vec![(Err(ControllerError::ReentrantMutation), true)]
    );
    let name = shared
        .read(|controller| controller.document().text("name").map(str::to_string))
        .unwrap();
    assert_eq!(name.as_deref(), Some("Shape"));
    assert_eq!(shared.read(|controller| controller.state_count()).unwrap(), 12);
    assert!(shared.undo().unwrap());
}

fn class_schema() -> Schema {
    Schema::new()
        .declare(
            "Class",
            vec![
                PropertySchema::new("name", PropertyKind::Value),
                PropertySchema::new("features", PropertyKind::List).accepting(&["Method"]),
                PropertySchema::new("body", PropertyKind::BlockList).accepting(&["Statement"]),
            ],
        )
        .declare(
            "Method",
            vec![PropertySchema::new("name", PropertyKind::Value)],
        )
        .declare(
            "Statement",
            vec![PropertySchema::new("text", PropertyKind::Value)],
        )
}

fn schema_doc() -> Node {
    Node::new("Class")
        .with_value("name", "Shape")
        .with_list("features", vec![method("area")])
        .with_blocks("body", vec![Block::simple(vec![stmt("s0")])])
}

#[test]
fn test_schema_rejects_foreign_child() {
    let mut controller = Controller::new(
        schema_doc(),
        SchemaHelper::new(class_schema()),
        ObserverRegistry::new(),
    )
    .unwrap();
    let root = controller.root();
    let document = controller.document().clone();

    let result = controller.insert(InsertionIndex::list(root, "features", 0, stmt("oops")));
    assert!(matches!(
        result,
        Err(ControllerError::StructuralMismatch(AstError::Rejected { .. }))
    ));
    assert_eq!(controller.document(), &document);
    assert!(!controller.can_undo());

    controller
        .insert(InsertionIndex::existing_block(root, "body", 0, 1, stmt("s1")))
        .unwrap();
    assert!(controller.verify().is_ok());
}

#[test]
fn test_schema_mismatch_at_construction() {
    let helper = SchemaHelper::new(class_schema());

    let unknown = Controller::new(Node::new("Struct"), helper.clone(), ObserverRegistry::new());
    assert!(matches!(
        unknown,
        Err(ControllerError::StructuralMismatch(AstError::UnknownKind(_)))
    ));

    let wrong_kind = Node::new("Class")
        .with_value("name", "Shape")
        .with_value("features", "none")
        .with_blocks("body", vec![]);
    assert!(matches!(
        Controller::new(wrong_kind, helper, ObserverRegistry::new()),
        Err(ControllerError::StructuralMismatch(AstError::UnexpectedKind { .. }))
    ));
}
