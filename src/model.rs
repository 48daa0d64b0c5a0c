//! Shared model types: identifiers, element handles, directions and
//! property cardinalities.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::value::Value;

/// Canonical element identifier.
///
/// Both bundled id providers deal in 64-bit integers, whether the store
/// assigns them natively or the client draws them from a sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ElementId(pub i64);

impl fmt::Display for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for ElementId {
    fn from(value: i64) -> Self {
        ElementId(value)
    }
}

impl From<ElementId> for Value {
    fn from(id: ElementId) -> Self {
        Value::Int(id.0)
    }
}

/// Session-local handle to a vertex.
///
/// Handles are minted by the owning [`Session`](crate::Session) and stay
/// stable for the lifetime of the element within that session, including
/// elements that have no store identifier yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VertexRef(pub(crate) u64);

/// Session-local handle to an edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EdgeRef(pub(crate) u64);

/// Traversal direction relative to a vertex.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Edges leaving the vertex.
    Out,
    /// Edges arriving at the vertex.
    In,
    /// Edges in either direction.
    Both,
}

/// Per-key cardinality of vertex properties.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cardinality {
    /// A single value; setting replaces the previous value.
    Single,
    /// A list of values; setting appends.
    List,
    /// A set of values; setting appends unless an equal value exists.
    Set,
}

impl fmt::Display for Cardinality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cardinality::Single => write!(f, "single"),
            Cardinality::List => write!(f, "list"),
            Cardinality::Set => write!(f, "set"),
        }
    }
}
