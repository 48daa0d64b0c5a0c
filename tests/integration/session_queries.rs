//! Identifier-based element resolution: three-tier lookup, predicate
//! optimization and result filtering.

mod support;

use std::sync::Arc;

use support::{edge_record, native_graph, node, node_record, relationship, MockExecutor};
use trama::{
    AnyLabelPartition, ElementId, Graph, GraphConfig, NativeIdProvider, Value,
};

fn partitioned_graph(labels: &[&str]) -> Graph {
    Graph::new(
        GraphConfig::new()
            .with_partition(Arc::new(AnyLabelPartition::new(labels.to_vec())))
            .with_vertex_labels([labels[0]]),
        Arc::new(NativeIdProvider),
        Arc::new(NativeIdProvider),
    )
    .expect("graph")
}

#[test]
fn cached_identifiers_are_answered_from_memory() {
    let graph = native_graph();
    let executor = MockExecutor::new();
    let mut session = graph.session(executor.clone());

    executor.push_response(vec![node_record(node(7, &["A"], &[]))]);
    let first = session.vertices(&[ElementId(7)]).expect("vertices");
    assert_eq!(executor.executed_texts().len(), 1);

    let second = session.vertices(&[ElementId(7)]).expect("vertices");
    assert_eq!(first, second);
    assert_eq!(executor.executed_texts().len(), 1, "no second round trip");
}

#[test]
fn single_missing_identifier_uses_equality_predicate() {
    let graph = native_graph();
    let executor = MockExecutor::new();
    let mut session = graph.session(executor.clone());

    executor.push_response(vec![node_record(node(7, &["A"], &[]))]);
    let found = session.vertices(&[ElementId(7)]).expect("vertices");
    assert_eq!(found.len(), 1);

    let statement = &executor.executed()[0];
    assert_eq!(statement.text, "MATCH (n) WHERE ID(n) = $id RETURN n");
    assert_eq!(statement.parameters.get("id"), Some(&Value::Int(7)));
}

#[test]
fn multiple_missing_identifiers_use_in_predicate() {
    let graph = native_graph();
    let executor = MockExecutor::new();
    let mut session = graph.session(executor.clone());

    executor.push_response(vec![
        node_record(node(7, &["A"], &[])),
        node_record(node(8, &["A"], &[])),
    ]);
    let found = session
        .vertices(&[ElementId(7), ElementId(8)])
        .expect("vertices");
    assert_eq!(found.len(), 2);

    let statement = &executor.executed()[0];
    assert_eq!(statement.text, "MATCH (n) WHERE ID(n) IN $ids RETURN n");
    assert_eq!(
        statement.parameters.get("ids"),
        Some(&Value::List(vec![Value::Int(7), Value::Int(8)]))
    );
}

#[test]
fn duplicate_identifiers_collapse_to_one_lookup() {
    let graph = native_graph();
    let executor = MockExecutor::new();
    let mut session = graph.session(executor.clone());

    executor.push_response(vec![node_record(node(7, &["A"], &[]))]);
    let found = session
        .vertices(&[ElementId(7), ElementId(7)])
        .expect("vertices");
    assert_eq!(found.len(), 1);
    assert!(executor.executed()[0].text.contains("= $id"));
}

#[test]
fn empty_identifier_list_loads_the_full_extent_once() {
    let graph = native_graph();
    let executor = MockExecutor::new();
    let mut session = graph.session(executor.clone());

    executor.push_response(vec![
        node_record(node(7, &["A"], &[])),
        node_record(node(8, &["B"], &[])),
    ]);
    assert_eq!(session.vertices(&[]).expect("vertices").len(), 2);
    assert_eq!(executor.executed_texts()[0], "MATCH (n) RETURN n");

    // extent is complete; identifier lookups and full scans stay local
    assert_eq!(session.vertices(&[]).expect("vertices").len(), 2);
    assert_eq!(session.vertices(&[ElementId(7)]).expect("vertices").len(), 1);
    assert_eq!(executor.executed_texts().len(), 1);
}

#[test]
fn tombstoned_rows_are_silently_dropped() {
    let graph = native_graph();
    let executor = MockExecutor::new();
    let mut session = graph.session(executor.clone());

    executor.push_response(vec![node_record(node(7, &["A"], &[]))]);
    let vref = session.vertices(&[ElementId(7)]).expect("vertices")[0];
    session.remove_vertex(vref).expect("remove vertex");

    // a stale query issued before the delete is flushed still returns the
    // row; the tombstone filters it
    executor.push_response(vec![node_record(node(7, &["A"], &[]))]);
    let found = session.vertices(&[ElementId(7)]).expect("vertices");
    assert!(found.is_empty());
}

#[test]
fn single_label_partition_scopes_through_pattern() {
    let graph = partitioned_graph(&["P1"]);
    let executor = MockExecutor::new();
    let mut session = graph.session(executor.clone());

    executor.push_response(vec![node_record(node(7, &["P1", "A"], &[]))]);
    session.vertices(&[ElementId(7)]).expect("vertices");
    assert_eq!(
        executor.executed_texts()[0],
        "MATCH (n:`P1`) WHERE ID(n) = $id RETURN n"
    );
}

#[test]
fn multi_label_partition_scopes_through_predicate() {
    let graph = partitioned_graph(&["P1", "P2"]);
    let executor = MockExecutor::new();
    let mut session = graph.session(executor.clone());

    executor.push_response(vec![node_record(node(7, &["P1", "A"], &[]))]);
    session.vertices(&[ElementId(7)]).expect("vertices");
    assert_eq!(
        executor.executed_texts()[0],
        "MATCH (n) WHERE ID(n) = $id AND (n:`P1` OR n:`P2`) RETURN n"
    );
}

#[test]
fn rows_outside_the_partition_are_dropped() {
    let graph = partitioned_graph(&["P1"]);
    let executor = MockExecutor::new();
    let mut session = graph.session(executor.clone());

    executor.push_response(vec![node_record(node(7, &["Other"], &[]))]);
    let found = session.vertices(&[ElementId(7)]).expect("vertices");
    assert!(found.is_empty());
}

#[test]
fn edge_lookup_hydrates_both_endpoints() {
    let graph = native_graph();
    let executor = MockExecutor::new();
    let mut session = graph.session(executor.clone());

    executor.push_response(vec![edge_record(
        node(1, &["A"], &[]),
        relationship(10, "REL", 1, 2, &[("since", Value::Int(2020))]),
        node(2, &["B"], &[]),
    )]);
    let found = session.edges(&[ElementId(10)]).expect("edges");
    assert_eq!(found.len(), 1);
    assert_eq!(
        executor.executed_texts()[0],
        "MATCH (n)-[r]->(m) WHERE ID(r) = $id RETURN n, r, m"
    );

    let edge = session.edge(found[0]).expect("edge");
    assert_eq!(edge.label(), "REL");
    assert_eq!(edge.property("since"), Some(&Value::Int(2020)));

    // endpoints landed in the cache
    let executed = executor.executed_texts().len();
    assert_eq!(session.vertices(&[ElementId(1)]).expect("vertices").len(), 1);
    assert_eq!(session.vertices(&[ElementId(2)]).expect("vertices").len(), 1);
    assert_eq!(executor.executed_texts().len(), executed);
}

#[test]
fn edge_rows_with_tombstoned_endpoints_are_dropped() {
    let graph = native_graph();
    let executor = MockExecutor::new();
    let mut session = graph.session(executor.clone());

    executor.push_response(vec![node_record(node(1, &["A"], &[]))]);
    let v1 = session.vertices(&[ElementId(1)]).expect("vertices")[0];
    session.remove_vertex(v1).expect("remove vertex");

    executor.push_response(vec![edge_record(
        node(1, &["A"], &[]),
        relationship(10, "REL", 1, 2, &[]),
        node(2, &["B"], &[]),
    )]);
    let found = session.edges(&[ElementId(10)]).expect("edges");
    assert!(found.is_empty());
}
