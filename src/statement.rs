//! Statement and result types exchanged with the remote store, plus the
//! transport trait the session drives.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{GraphError, Result};
use crate::value::Value;

/// A single pattern-matching statement with named parameters.
///
/// Parameters are referenced from the text with `$name` placeholders and
/// shipped out of band, so rendered text never embeds property values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Statement {
    /// Statement text.
    pub text: String,
    /// Named parameters.
    pub parameters: BTreeMap<String, Value>,
}

impl Statement {
    /// Creates a statement without parameters.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            parameters: BTreeMap::new(),
        }
    }

    /// Creates a statement with the given parameters.
    pub fn with_parameters(text: impl Into<String>, parameters: BTreeMap<String, Value>) -> Self {
        Self {
            text: text.into(),
            parameters,
        }
    }
}

/// A labeled node as returned by the remote store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteNode {
    /// Store-native identifier of the node.
    pub native_id: i64,
    /// Labels attached to the node.
    pub labels: Vec<String>,
    /// Property values keyed by name.
    pub properties: BTreeMap<String, Value>,
}

/// A typed relationship as returned by the remote store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteRelationship {
    /// Store-native identifier of the relationship.
    pub native_id: i64,
    /// Relationship type.
    pub type_name: String,
    /// Store-native identifier of the start node.
    pub start_id: i64,
    /// Store-native identifier of the end node.
    pub end_id: i64,
    /// Property values keyed by name.
    pub properties: BTreeMap<String, Value>,
}

/// Common view over remote nodes and relationships, used by id providers to
/// extract the canonical identifier regardless of entity kind.
pub trait RemoteEntity {
    /// Store-native identifier.
    fn native_id(&self) -> i64;
    /// Property value by name, if present.
    fn property(&self, name: &str) -> Option<&Value>;
}

impl RemoteEntity for RemoteNode {
    fn native_id(&self) -> i64 {
        self.native_id
    }

    fn property(&self, name: &str) -> Option<&Value> {
        self.properties.get(name)
    }
}

impl RemoteEntity for RemoteRelationship {
    fn native_id(&self) -> i64 {
        self.native_id
    }

    fn property(&self, name: &str) -> Option<&Value> {
        self.properties.get(name)
    }
}

/// One field of a result record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Field {
    /// A node.
    Node(RemoteNode),
    /// A relationship.
    Relationship(RemoteRelationship),
    /// A scalar value (e.g. a returned identifier).
    Scalar(Value),
}

/// One row of a statement result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    fields: Vec<Field>,
}

impl Record {
    /// Creates a record from its fields.
    pub fn new(fields: Vec<Field>) -> Self {
        Self { fields }
    }

    /// Field at `index`, if present.
    pub fn get(&self, index: usize) -> Option<&Field> {
        self.fields.get(index)
    }

    /// Node at `index`.
    pub fn node(&self, index: usize) -> Result<&RemoteNode> {
        match self.fields.get(index) {
            Some(Field::Node(node)) => Ok(node),
            _ => Err(GraphError::NotFound("node field")),
        }
    }

    /// Relationship at `index`.
    pub fn relationship(&self, index: usize) -> Result<&RemoteRelationship> {
        match self.fields.get(index) {
            Some(Field::Relationship(relationship)) => Ok(relationship),
            _ => Err(GraphError::NotFound("relationship field")),
        }
    }

    /// Scalar at `index`.
    pub fn scalar(&self, index: usize) -> Result<&Value> {
        match self.fields.get(index) {
            Some(Field::Scalar(value)) => Ok(value),
            _ => Err(GraphError::NotFound("scalar field")),
        }
    }
}

/// Lazily-consumable stream of result records.
///
/// The session fully consumes or explicitly drains every stream before
/// issuing the next statement on the same transaction, as required by the
/// transport contract.
pub struct RecordStream {
    inner: Box<dyn Iterator<Item = Result<Record>> + Send>,
}

impl RecordStream {
    /// Wraps an arbitrary record iterator.
    pub fn new(inner: Box<dyn Iterator<Item = Result<Record>> + Send>) -> Self {
        Self { inner }
    }

    /// Builds a stream over an in-memory batch of records.
    pub fn from_records(records: Vec<Record>) -> Self {
        Self {
            inner: Box::new(records.into_iter().map(Ok)),
        }
    }

    /// An empty stream.
    pub fn empty() -> Self {
        Self::from_records(Vec::new())
    }

    /// Consumes the remainder of the stream, surfacing any deferred error.
    pub fn drain(mut self) -> Result<()> {
        for record in &mut self.inner {
            record?;
        }
        Ok(())
    }
}

impl Iterator for RecordStream {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }
}

impl std::fmt::Debug for RecordStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordStream").finish_non_exhaustive()
    }
}

/// A rendered statement plus what the flush loop must capture from its
/// result before the statement is considered complete.
#[derive(Debug)]
pub(crate) struct Command {
    pub(crate) statement: Statement,
    pub(crate) capture: Capture,
}

/// Result handling required by a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Capture {
    /// Discard the result.
    Nothing,
    /// The first field of the first record carries the store-generated
    /// identifier; write it back into the element.
    GeneratedId,
}

/// Wire transport executing statements against the remote store.
///
/// Implementations hold at most one remote transaction open at a time; the
/// session enforces the sequencing locally and only calls [`execute`]
/// between [`begin`] and [`commit`]/[`rollback`]. All calls are blocking
/// round trips; cancellation and retry policy belong to the transport.
///
/// [`execute`]: StatementExecutor::execute
/// [`begin`]: StatementExecutor::begin
/// [`commit`]: StatementExecutor::commit
/// [`rollback`]: StatementExecutor::rollback
pub trait StatementExecutor {
    /// Opens a remote transaction.
    fn begin(&mut self) -> Result<()>;

    /// Executes one statement on the open transaction.
    fn execute(&mut self, statement: &Statement) -> Result<RecordStream>;

    /// Commits the open transaction.
    fn commit(&mut self) -> Result<()>;

    /// Rolls back the open transaction.
    fn rollback(&mut self) -> Result<()>;

    /// Releases transport resources. The default implementation does
    /// nothing.
    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}
