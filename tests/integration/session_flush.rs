//! Commit-time flush behavior: statement ordering, identifier capture and
//! update suppression.

mod support;

use support::{
    edge_record, native_graph, node, node_record, relationship, scalar_record, sequence_graph,
    MockExecutor,
};
use trama::{ElementId, GraphError, Value};

#[test]
fn client_generated_insert_round_trips() {
    let graph = sequence_graph();
    let executor = MockExecutor::new();
    let mut session = graph.session(executor.clone());

    let vref = session.add_vertex(&["Person"]).expect("add vertex");
    session
        .vertex_property(vref, "name", Value::from("alice"))
        .expect("set property");
    let id = session.vertex(vref).expect("vertex").id().expect("client id");

    session.commit().expect("commit");
    assert_eq!(executor.committed(), 1);

    let texts = executor.executed_texts();
    assert_eq!(texts.len(), 1);
    assert_eq!(texts[0], "CREATE (:`Person` $vp)");
    match executor.executed()[0].parameters.get("vp") {
        Some(Value::Map(map)) => {
            assert_eq!(map.get("name"), Some(&Value::from("alice")));
            assert_eq!(map.get("id"), Some(&Value::Int(id.0)));
        }
        other => panic!("expected property map, got {other:?}"),
    }

    // the committed vertex is answered from memory, identical state
    let found = session.vertices(&[id]).expect("vertices");
    assert_eq!(found.len(), 1);
    let vertex = session.vertex(found[0]).expect("vertex");
    assert!(vertex.labels().contains("Person"));
    assert_eq!(
        vertex.property("name").expect("property"),
        Some(&Value::from("alice"))
    );
    assert_eq!(executor.executed_texts().len(), 1);
}

#[test]
fn server_generated_identifier_is_captured() {
    let graph = native_graph();
    let executor = MockExecutor::new();
    let mut session = graph.session(executor.clone());

    let vref = session.add_vertex(&["Person"]).expect("add vertex");
    assert!(session.vertex(vref).expect("vertex").id().is_none());

    executor.push_response(vec![scalar_record(Value::Int(99))]);
    session.commit().expect("commit");

    assert_eq!(
        executor.executed_texts()[0],
        "CREATE (n:`Person` $vp) RETURN ID(n)"
    );
    assert_eq!(
        session.vertex(vref).expect("vertex").id(),
        Some(ElementId(99))
    );

    // the captured identifier is usable immediately
    let found = session.vertices(&[ElementId(99)]).expect("vertices");
    assert_eq!(found, vec![vref]);
    assert_eq!(executor.executed_texts().len(), 1);
}

#[test]
fn flush_executes_queues_in_strict_order() {
    let graph = native_graph();
    let executor = MockExecutor::new();
    let mut session = graph.session(executor.clone());

    // load an existing edge between vertices 1 and 2
    executor.push_response(vec![edge_record(
        node(1, &["A"], &[]),
        relationship(10, "REL", 1, 2, &[]),
        node(2, &["B"], &[]),
    )]);
    let loaded = session.edges(&[ElementId(10)]).expect("edges");
    assert_eq!(loaded.len(), 1);

    // delete the edge, then create a vertex and an edge referencing it, in
    // the opposite order of the flush
    session.remove_edge(loaded[0]).expect("remove edge");
    let v1 = session.add_vertex(&["C"]).expect("add vertex");
    let existing = session.vertices(&[ElementId(1)]).expect("vertices")[0];
    let e2 = session.add_edge("REL2", v1, existing).expect("add edge");

    executor.push_response(vec![]); // delete E1
    executor.push_response(vec![scalar_record(Value::Int(50))]); // create V1
    executor.push_response(vec![scalar_record(Value::Int(51))]); // create E2
    session.commit().expect("commit");

    let texts = executor.executed_texts();
    assert_eq!(texts.len(), 4);
    assert!(texts[1].contains("DELETE r"), "edge delete first: {}", texts[1]);
    assert!(texts[2].starts_with("CREATE (n:`C`"), "vertex create second: {}", texts[2]);
    assert!(
        texts[3].contains("CREATE (o)-[r:`REL2`"),
        "edge create last: {}",
        texts[3]
    );
    // the edge create already sees the captured endpoint identifier
    match executor.executed()[3].parameters.get("oid") {
        Some(Value::Int(50)) => {}
        other => panic!("expected captured endpoint id, got {other:?}"),
    }
    assert_eq!(session.edge(e2).expect("edge").id(), Some(ElementId(51)));
}

#[test]
fn unchanged_elements_flush_no_update() {
    let graph = native_graph();
    let executor = MockExecutor::new();
    let mut session = graph.session(executor.clone());

    executor.push_response(vec![node_record(node(5, &["A"], &[]))]);
    let found = session.vertices(&[ElementId(5)]).expect("vertices");

    // enqueued but not actually changed
    session.dirty_vertex(found[0]);
    session.commit().expect("commit");

    assert_eq!(executor.executed_texts().len(), 1, "no update statement");
    assert_eq!(executor.committed(), 1);
}

#[test]
fn removed_property_is_flushed_as_explicit_null() {
    let graph = native_graph();
    let executor = MockExecutor::new();
    let mut session = graph.session(executor.clone());

    executor.push_response(vec![node_record(node(
        5,
        &["A"],
        &[("key1", Value::from("a"))],
    ))]);
    let vref = session.vertices(&[ElementId(5)]).expect("vertices")[0];

    session
        .remove_vertex_property(vref, "key1")
        .expect("remove property");
    session.commit().expect("commit");

    let statements = executor.executed();
    assert_eq!(statements.len(), 2);
    assert!(statements[1].text.contains("SET v = $vp"));
    match statements[1].parameters.get("vp") {
        Some(Value::Map(map)) => assert_eq!(map.get("key1"), Some(&Value::Null)),
        other => panic!("expected property map, got {other:?}"),
    }
}

#[test]
fn deleted_element_never_flushes_queued_update() {
    let graph = native_graph();
    let executor = MockExecutor::new();
    let mut session = graph.session(executor.clone());

    executor.push_response(vec![node_record(node(5, &["A"], &[]))]);
    let vref = session.vertices(&[ElementId(5)]).expect("vertices")[0];

    session
        .vertex_property(vref, "p", Value::from("x"))
        .expect("set property");
    session.remove_vertex(vref).expect("remove vertex");
    session.commit().expect("commit");

    let texts = executor.executed_texts();
    assert_eq!(texts.len(), 2);
    assert!(texts[1].contains("DETACH DELETE v"));
    assert!(!texts.iter().any(|text| text.contains("SET v")));
}

#[test]
fn execution_failure_aborts_flush_and_propagates() {
    let graph = native_graph();
    let executor = MockExecutor::new();
    let mut session = graph.session(executor.clone());

    session.add_vertex(&["A"]).expect("add vertex");
    executor.fail_next_execute("constraint violation");

    match session.commit() {
        Err(GraphError::Remote(message)) => assert_eq!(message, "constraint violation"),
        other => panic!("expected remote error, got {other:?}"),
    }
    assert_eq!(executor.committed(), 0);
    assert!(session.is_transaction_open(), "caller must roll back");

    session.rollback().expect("rollback");
    assert_eq!(executor.rolled_back(), 1);
}
