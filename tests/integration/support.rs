//! Shared in-memory transport and fixture helpers for integration tests.

#![allow(dead_code)]

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex};

use trama::{
    Field, Graph, GraphConfig, NativeIdProvider, Record, RecordStream, RemoteNode,
    RemoteRelationship, Result, SequenceIdProvider, Statement, StatementExecutor, Value,
};

#[derive(Default)]
struct MockState {
    executed: Vec<Statement>,
    responses: VecDeque<Vec<Record>>,
    begun: usize,
    committed: usize,
    rolled_back: usize,
    fail_next_execute: Option<String>,
}

/// Transport double that records every statement and replays canned record
/// batches in FIFO order. Cloning shares the underlying state, so tests can
/// keep a handle while the session owns the executor.
#[derive(Clone, Default)]
pub struct MockExecutor {
    state: Arc<Mutex<MockState>>,
}

impl MockExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues the record batch returned by the next unanswered execute.
    pub fn push_response(&self, records: Vec<Record>) {
        self.state.lock().expect("mock state").responses.push_back(records);
    }

    /// Makes the next execute fail with a remote error.
    pub fn fail_next_execute(&self, message: &str) {
        self.state.lock().expect("mock state").fail_next_execute = Some(message.to_owned());
    }

    pub fn executed(&self) -> Vec<Statement> {
        self.state.lock().expect("mock state").executed.clone()
    }

    pub fn executed_texts(&self) -> Vec<String> {
        self.state
            .lock()
            .expect("mock state")
            .executed
            .iter()
            .map(|statement| statement.text.clone())
            .collect()
    }

    pub fn begun(&self) -> usize {
        self.state.lock().expect("mock state").begun
    }

    pub fn committed(&self) -> usize {
        self.state.lock().expect("mock state").committed
    }

    pub fn rolled_back(&self) -> usize {
        self.state.lock().expect("mock state").rolled_back
    }
}

impl StatementExecutor for MockExecutor {
    fn begin(&mut self) -> Result<()> {
        self.state.lock().expect("mock state").begun += 1;
        Ok(())
    }

    fn execute(&mut self, statement: &Statement) -> Result<RecordStream> {
        let mut state = self.state.lock().expect("mock state");
        if let Some(message) = state.fail_next_execute.take() {
            return Err(trama::GraphError::Remote(message));
        }
        state.executed.push(statement.clone());
        let records = state.responses.pop_front().unwrap_or_default();
        Ok(RecordStream::from_records(records))
    }

    fn commit(&mut self) -> Result<()> {
        self.state.lock().expect("mock state").committed += 1;
        Ok(())
    }

    fn rollback(&mut self) -> Result<()> {
        self.state.lock().expect("mock state").rolled_back += 1;
        Ok(())
    }
}

/// Graph with store-native identifiers for both element kinds.
pub fn native_graph() -> Graph {
    Graph::new(
        GraphConfig::new(),
        Arc::new(NativeIdProvider),
        Arc::new(NativeIdProvider),
    )
    .expect("graph")
}

/// Graph with client-side sequence identifiers for both element kinds.
pub fn sequence_graph() -> Graph {
    Graph::new(
        GraphConfig::new(),
        Arc::new(SequenceIdProvider::default()),
        Arc::new(SequenceIdProvider::default()),
    )
    .expect("graph")
}

pub fn properties(entries: &[(&str, Value)]) -> BTreeMap<String, Value> {
    entries
        .iter()
        .map(|(key, value)| ((*key).to_owned(), value.clone()))
        .collect()
}

pub fn node(native_id: i64, labels: &[&str], props: &[(&str, Value)]) -> RemoteNode {
    RemoteNode {
        native_id,
        labels: labels.iter().map(|label| (*label).to_owned()).collect(),
        properties: properties(props),
    }
}

pub fn relationship(
    native_id: i64,
    type_name: &str,
    start_id: i64,
    end_id: i64,
    props: &[(&str, Value)],
) -> RemoteRelationship {
    RemoteRelationship {
        native_id,
        type_name: type_name.to_owned(),
        start_id,
        end_id,
        properties: properties(props),
    }
}

pub fn node_record(node: RemoteNode) -> Record {
    Record::new(vec![Field::Node(node)])
}

pub fn edge_record(
    first: RemoteNode,
    relationship: RemoteRelationship,
    second: RemoteNode,
) -> Record {
    Record::new(vec![
        Field::Node(first),
        Field::Relationship(relationship),
        Field::Node(second),
    ])
}

pub fn scalar_record(value: Value) -> Record {
    Record::new(vec![Field::Scalar(value)])
}
