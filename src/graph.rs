//! The graph handle: validated configuration plus a session factory.
//!
//! A graph is cheap shared state; sessions do the actual work. Create one
//! session per concurrent unit of work and hand each its own transport.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::config::GraphConfig;
use crate::error::{GraphError, Result};
use crate::ids::IdProvider;
use crate::partition::ReadPartition;
use crate::session::Session;
use crate::statement::StatementExecutor;

/// Token identifying a registered close listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListenerId(u64);

type CloseListener = Box<dyn Fn(&Graph) + Send + Sync>;

/// Handle to a logical graph inside a remote store.
///
/// Holds the partition, the labels stamped on created vertices and the
/// identifier policies. The only state shared between threads is the close
/// listener registry, which is lock-guarded; everything else is immutable
/// after construction.
pub struct Graph {
    partition: Arc<dyn ReadPartition>,
    vertex_labels: BTreeSet<String>,
    vertex_id_provider: Arc<dyn IdProvider>,
    edge_id_provider: Arc<dyn IdProvider>,
    readonly: bool,
    profile_statements: bool,
    close_listeners: Mutex<Vec<(ListenerId, CloseListener)>>,
    next_listener_id: AtomicU64,
}

impl Graph {
    /// Creates a graph from its configuration and identifier policies.
    ///
    /// # Errors
    /// `GraphError::InvalidArgument` when the configured vertex labels do
    /// not place created vertices inside the configured partition.
    pub fn new(
        config: GraphConfig,
        vertex_id_provider: Arc<dyn IdProvider>,
        edge_id_provider: Arc<dyn IdProvider>,
    ) -> Result<Self> {
        if !config.partition.contains_vertex(&config.vertex_labels) {
            return Err(GraphError::InvalidArgument(
                "vertices created by the graph will not be part of the given partition".to_owned(),
            ));
        }
        Ok(Self {
            partition: config.partition,
            vertex_labels: config.vertex_labels,
            vertex_id_provider,
            edge_id_provider,
            readonly: config.readonly,
            profile_statements: config.profile_statements,
            close_listeners: Mutex::new(Vec::new()),
            next_listener_id: AtomicU64::new(0),
        })
    }

    /// The active read partition.
    pub fn partition(&self) -> &Arc<dyn ReadPartition> {
        &self.partition
    }

    /// Labels appended to vertices created through this graph.
    pub fn vertex_labels(&self) -> &BTreeSet<String> {
        &self.vertex_labels
    }

    /// Whether the graph refuses mutations.
    pub fn is_readonly(&self) -> bool {
        self.readonly
    }

    /// Opens a session over the given transport.
    pub fn session<E: StatementExecutor>(&self, executor: E) -> Session<E> {
        Session::new(
            executor,
            Arc::clone(&self.partition),
            Arc::clone(&self.vertex_id_provider),
            Arc::clone(&self.edge_id_provider),
            self.vertex_labels.clone(),
            self.readonly,
            self.profile_statements,
        )
    }

    /// Registers a listener invoked when [`close`](Graph::close) runs.
    ///
    /// Listeners may be registered and removed from a different thread than
    /// the one that triggers the close.
    pub fn add_close_listener(&self, listener: CloseListener) -> ListenerId {
        let id = ListenerId(self.next_listener_id.fetch_add(1, Ordering::Relaxed));
        self.close_listeners.lock().push((id, listener));
        id
    }

    /// Removes a previously registered close listener.
    pub fn remove_close_listener(&self, id: ListenerId) {
        self.close_listeners
            .lock()
            .retain(|(listener_id, _)| *listener_id != id);
    }

    /// Notifies all registered close listeners.
    ///
    /// Sessions are owned by their callers and must be closed separately.
    pub fn close(&self) {
        debug!("closing graph");
        let listeners = self.close_listeners.lock();
        for (_, listener) in listeners.iter() {
            listener(self);
        }
    }
}

impl fmt::Debug for Graph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Graph")
            .field("partition", &self.partition)
            .field("vertex_labels", &self.vertex_labels)
            .field("readonly", &self.readonly)
            .field("profile_statements", &self.profile_statements)
            .finish_non_exhaustive()
    }
}
