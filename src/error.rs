//! Error taxonomy.

use thiserror::Error;

/// Convenience alias for crate results.
pub type Result<T> = std::result::Result<T, GraphError>;

/// Errors surfaced by the graph mapping layer.
///
/// Validation and protocol-sequence errors are raised synchronously at the
/// call site that violated the contract, before any statement reaches the
/// store. Remote execution errors propagate unchanged out of
/// [`commit`](crate::Session::commit); the session never retries a
/// statement.
#[derive(Debug, Error)]
pub enum GraphError {
    /// A caller-supplied argument violated a contract.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    /// A property value outside the closed scalar type set.
    #[error("unsupported property value type: {0}")]
    UnsupportedType(&'static str),
    /// A referenced element or field is unknown to the session.
    #[error("{0} not found")]
    NotFound(&'static str),
    /// A transaction was opened while one is already active.
    #[error("transaction already open")]
    TransactionAlreadyOpen,
    /// A mutation was attempted on a readonly graph.
    #[error("graph is readonly")]
    ReadOnly,
    /// A failure reported by the statement transport.
    #[error("remote execution error: {0}")]
    Remote(String),
}
