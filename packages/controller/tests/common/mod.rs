//! Fixtures shared by the integration tests

#![allow(dead_code)]

use frond_controller::{
    Block, Controller, ControllerConfig, EventLog, Node, ObserverRegistry, ReflectHelper,
};
use frond_ast::Property;

pub fn method(name: &str) -> Node {
    Node::new("Method").with_value("name", name)
}

pub fn stmt(text: &str) -> Node {
    Node::new("Statement").with_value("text", text)
}

/// Class with a header, an assigned base, three features and a body of two
/// blocks (4 members + 1 member)
pub fn class_doc() -> Node {
    Node::new("Class")
        .with_value("name", "Shape")
        .with_child("header", Node::new("Header").with_value("text", "class Shape"))
        .with_optional("base", Some(Node::new("TypeRef").with_value("name", "Object")))
        .with_list("features", vec![method("area"), method("draw"), method("scale")])
        .with_blocks(
            "body",
            vec![
                Block::simple(vec![stmt("s0"), stmt("s1"), stmt("s2"), stmt("s3")]),
                Block::simple(vec![stmt("t0")]),
            ],
        )
}

pub fn strict_config() -> ControllerConfig {
    ControllerConfig {
        max_undo_levels: 100,
        verify_invariants: true,
    }
}

/// Controller over `doc` whose events land in the returned log. The log is
/// cleared after construction.
pub fn controller_with_log(doc: Node) -> (Controller, EventLog) {
    let log = EventLog::new();
    let mut observers = ObserverRegistry::new();
    log.record(&mut observers);

    let controller =
        Controller::with_config(doc, ReflectHelper, observers, strict_config()).unwrap();
    log.clear();
    (controller, log)
}

pub fn feature_names(controller: &Controller) -> Vec<String> {
    match controller.document().property("features") {
        Some(Property::List(items)) => items
            .iter()
            .map(|item| item.text("name").unwrap_or_default().to_string())
            .collect(),
        other => panic!("features is not a list: {:?}", other),
    }
}

pub fn body_shape(controller: &Controller) -> Vec<Vec<String>> {
    match controller.document().property("body") {
        Some(Property::BlockList(blocks)) => blocks
            .iter()
            .map(|block| {
                block
                    .nodes
                    .iter()
                    .map(|node| node.text("text").unwrap_or_default().to_string())
                    .collect()
            })
            .collect(),
        other => panic!("body is not a block list: {:?}", other),
    }
}
