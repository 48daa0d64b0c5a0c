//! Trama: a client-side unit-of-work mapper for remote property-graph
//! stores.
//!
//! Vertices and edges are mutable in-memory elements backed by a store that
//! executes pattern-matching statements. Mutations are tracked per element
//! and deferred; nothing reaches the store until [`Session::commit`], which
//! flushes all queued work in a fixed order inside one remote transaction.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use trama::{Graph, GraphConfig, NativeIdProvider, Value};
//! # use trama::{RecordStream, Statement, StatementExecutor};
//! # struct NullTransport;
//! # impl StatementExecutor for NullTransport {
//! #     fn begin(&mut self) -> trama::Result<()> { Ok(()) }
//! #     fn execute(&mut self, _: &Statement) -> trama::Result<RecordStream> {
//! #         Ok(RecordStream::empty())
//! #     }
//! #     fn commit(&mut self) -> trama::Result<()> { Ok(()) }
//! #     fn rollback(&mut self) -> trama::Result<()> { Ok(()) }
//! # }
//!
//! let graph = Graph::new(
//!     GraphConfig::new(),
//!     Arc::new(NativeIdProvider),
//!     Arc::new(NativeIdProvider),
//! )?;
//! let mut session = graph.session(NullTransport);
//!
//! let alice = session.add_vertex(&["Person"])?;
//! let bob = session.add_vertex(&["Person"])?;
//! session.vertex_property(alice, "name", Value::from("alice"))?;
//! session.add_edge("KNOWS", alice, bob)?;
//! session.commit()?;
//! # Ok::<(), trama::GraphError>(())
//! ```

#![warn(missing_docs)]

pub mod config;
pub mod edge;
pub mod error;
pub mod graph;
pub mod ids;
pub mod model;
pub mod partition;
pub mod session;
pub mod statement;
pub mod value;
pub mod vertex;

pub use config::GraphConfig;
pub use edge::Edge;
pub use error::{GraphError, Result};
pub use graph::{Graph, ListenerId};
pub use ids::{IdProvider, NativeIdProvider, SequenceIdProvider};
pub use model::{Cardinality, Direction, EdgeRef, ElementId, VertexRef};
pub use partition::{AllLabelPartition, AnyLabelPartition, NoPartition, ReadPartition};
pub use session::Session;
pub use statement::{
    Field, Record, RecordStream, RemoteEntity, RemoteNode, RemoteRelationship, Statement,
    StatementExecutor,
};
pub use value::Value;
pub use vertex::{PropertyBag, Vertex};
