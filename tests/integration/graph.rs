//! Graph construction validation, readonly enforcement, transaction
//! sequencing and close listeners.

mod support;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use support::{scalar_record, MockExecutor};
use trama::{
    AnyLabelPartition, ElementId, Graph, GraphConfig, GraphError, NativeIdProvider, Value,
};

fn graph_with(config: GraphConfig) -> Result<Graph, GraphError> {
    Graph::new(config, Arc::new(NativeIdProvider), Arc::new(NativeIdProvider))
}

#[test]
fn vertex_labels_outside_the_partition_fail_construction() {
    let config = GraphConfig::new()
        .with_partition(Arc::new(AnyLabelPartition::new(["P1"])))
        .with_vertex_labels(["Other"]);
    match graph_with(config) {
        Err(GraphError::InvalidArgument(_)) => {}
        other => panic!("expected validation error, got {other:?}"),
    }

    // an empty label set cannot satisfy the partition either
    let config = GraphConfig::new().with_partition(Arc::new(AnyLabelPartition::new(["P1"])));
    assert!(graph_with(config).is_err());
}

#[test]
fn vertex_labels_inside_the_partition_construct() {
    let config = GraphConfig::new()
        .with_partition(Arc::new(AnyLabelPartition::new(["P1"])))
        .with_vertex_labels(["P1"]);
    let graph = graph_with(config).expect("graph");
    assert!(graph.vertex_labels().contains("P1"));
}

#[test]
fn created_vertices_carry_graph_labels_invisibly() {
    let config = GraphConfig::new()
        .with_partition(Arc::new(AnyLabelPartition::new(["P1"])))
        .with_vertex_labels(["P1"]);
    let graph = graph_with(config).expect("graph");
    let executor = MockExecutor::new();
    let mut session = graph.session(executor.clone());

    let vref = session.add_vertex(&["Person"]).expect("add vertex");
    let vertex = session.vertex(vref).expect("vertex");
    assert!(vertex.labels().contains("Person"));
    assert!(!vertex.labels().contains("P1"), "graph label is hidden");

    executor.push_response(vec![scalar_record(Value::Int(1))]);
    session.commit().expect("commit");
    let text = &executor.executed_texts()[0];
    assert!(text.contains(":`P1`"), "insert stamps the graph label: {text}");
    assert!(text.contains(":`Person`"));
}

#[test]
fn partition_labels_cannot_be_toggled_by_callers() {
    let config = GraphConfig::new()
        .with_partition(Arc::new(AnyLabelPartition::new(["P1"])))
        .with_vertex_labels(["P1"]);
    let graph = graph_with(config).expect("graph");
    let mut session = graph.session(MockExecutor::new());

    // creating a vertex labeled with the partition label is a contract
    // violation, as is adding the label later
    assert!(session.add_vertex(&["P1"]).is_err());
    let vref = session.add_vertex(&["Person"]).expect("add vertex");
    assert!(matches!(
        session.add_vertex_label(vref, "P1"),
        Err(GraphError::InvalidArgument(_))
    ));
}

#[test]
fn readonly_graphs_reject_mutations() {
    let graph = graph_with(GraphConfig::new().readonly(true)).expect("graph");
    let mut session = graph.session(MockExecutor::new());

    assert!(matches!(session.add_vertex(&["A"]), Err(GraphError::ReadOnly)));
}

#[test]
fn opening_a_second_transaction_is_a_protocol_error() {
    let graph = graph_with(GraphConfig::new()).expect("graph");
    let executor = MockExecutor::new();
    let mut session = graph.session(executor.clone());

    session.begin_transaction().expect("begin");
    match session.begin_transaction() {
        Err(GraphError::TransactionAlreadyOpen) => {}
        other => panic!("expected protocol error, got {other:?}"),
    }
    assert_eq!(executor.begun(), 1);
}

#[test]
fn commit_without_a_transaction_is_a_noop() {
    let graph = graph_with(GraphConfig::new()).expect("graph");
    let executor = MockExecutor::new();
    let mut session = graph.session(executor.clone());

    session.commit().expect("commit");
    assert_eq!(executor.committed(), 0);
}

#[test]
fn close_rolls_back_an_open_transaction() {
    let graph = graph_with(GraphConfig::new()).expect("graph");
    let executor = MockExecutor::new();
    let mut session = graph.session(executor.clone());

    session.begin_transaction().expect("begin");
    session.close().expect("close");
    assert_eq!(executor.rolled_back(), 1);
}

#[test]
fn close_listeners_fire_until_removed() {
    let graph = graph_with(GraphConfig::new()).expect("graph");
    let calls = Arc::new(AtomicUsize::new(0));

    let counter = Arc::clone(&calls);
    let listener = graph.add_close_listener(Box::new(move |_graph| {
        counter.fetch_add(1, Ordering::SeqCst);
    }));

    graph.close();
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    graph.remove_close_listener(listener);
    graph.close();
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn profiling_prefixes_executed_statements() {
    let graph = graph_with(GraphConfig::new().profile_statements(true)).expect("graph");
    let executor = MockExecutor::new();
    let mut session = graph.session(executor.clone());

    session.vertices(&[ElementId(7)]).expect("vertices");
    assert!(executor.executed_texts()[0].starts_with("PROFILE MATCH"));
}

#[test]
fn unsupported_property_values_fail_fast() {
    let graph = graph_with(GraphConfig::new()).expect("graph");
    let executor = MockExecutor::new();
    let mut session = graph.session(executor.clone());

    let vref = session.add_vertex(&["A"]).expect("add vertex");
    match session.vertex_property(vref, "bad", Value::List(vec![Value::Int(1)])) {
        Err(GraphError::UnsupportedType("list")) => {}
        other => panic!("expected unsupported type error, got {other:?}"),
    }
    // nothing was stored and nothing was enqueued
    assert!(session.vertex(vref).expect("vertex").property("bad").expect("property").is_none());
}
