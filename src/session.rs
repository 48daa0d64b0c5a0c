//! The unit of work: per-transaction element cache, change tracking and the
//! ordered flush against the remote store.

use std::borrow::Cow;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use rustc_hash::{FxHashMap, FxHashSet};
use tracing::{debug, error, info, warn};

use crate::edge::Edge;
use crate::error::{GraphError, Result};
use crate::ids::IdProvider;
use crate::model::{Cardinality, Direction, EdgeRef, ElementId, VertexRef};
use crate::partition::ReadPartition;
use crate::statement::{
    Capture, Command, Record, RecordStream, RemoteNode, Statement, StatementExecutor,
};
use crate::value::Value;
use crate::vertex::{label_fragment, TraversalReturn, Vertex};

/// A session is one logical unit of work against the store.
///
/// The session owns every element it has created or loaded, keyed by
/// session-local handles. Mutations are tracked per element and deferred:
/// nothing reaches the store until [`commit`](Session::commit), which flushes
/// all queued work in a fixed order inside one remote transaction. A session
/// is confined to one logical task at a time; create one session per
/// concurrent unit of work.
pub struct Session<E: StatementExecutor> {
    executor: E,
    partition: Arc<dyn ReadPartition>,
    vertex_id_provider: Arc<dyn IdProvider>,
    edge_id_provider: Arc<dyn IdProvider>,
    vertex_labels: BTreeSet<String>,
    readonly: bool,
    profile_statements: bool,
    next_ref: u64,
    vertices: FxHashMap<VertexRef, Vertex>,
    edges: FxHashMap<EdgeRef, Edge>,
    vertex_index: FxHashMap<ElementId, VertexRef>,
    edge_index: FxHashMap<ElementId, EdgeRef>,
    transient_vertices: FxHashSet<VertexRef>,
    transient_edges: FxHashSet<EdgeRef>,
    transient_vertex_index: FxHashMap<ElementId, VertexRef>,
    transient_edge_index: FxHashMap<ElementId, EdgeRef>,
    vertex_update_queue: FxHashSet<VertexRef>,
    edge_update_queue: FxHashSet<EdgeRef>,
    vertex_delete_queue: FxHashSet<VertexRef>,
    edge_delete_queue: FxHashSet<EdgeRef>,
    cascaded_edges: FxHashSet<EdgeRef>,
    deleted_vertices: FxHashSet<ElementId>,
    deleted_edges: FxHashSet<ElementId>,
    vertices_loaded: bool,
    edges_loaded: bool,
    transaction_open: bool,
}

impl<E: StatementExecutor> Session<E> {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        executor: E,
        partition: Arc<dyn ReadPartition>,
        vertex_id_provider: Arc<dyn IdProvider>,
        edge_id_provider: Arc<dyn IdProvider>,
        vertex_labels: BTreeSet<String>,
        readonly: bool,
        profile_statements: bool,
    ) -> Self {
        debug!("creating session");
        Self {
            executor,
            partition,
            vertex_id_provider,
            edge_id_provider,
            vertex_labels,
            readonly,
            profile_statements,
            next_ref: 0,
            vertices: FxHashMap::default(),
            edges: FxHashMap::default(),
            vertex_index: FxHashMap::default(),
            edge_index: FxHashMap::default(),
            transient_vertices: FxHashSet::default(),
            transient_edges: FxHashSet::default(),
            transient_vertex_index: FxHashMap::default(),
            transient_edge_index: FxHashMap::default(),
            vertex_update_queue: FxHashSet::default(),
            edge_update_queue: FxHashSet::default(),
            vertex_delete_queue: FxHashSet::default(),
            edge_delete_queue: FxHashSet::default(),
            cascaded_edges: FxHashSet::default(),
            deleted_vertices: FxHashSet::default(),
            deleted_edges: FxHashSet::default(),
            vertices_loaded: false,
            edges_loaded: false,
            transaction_open: false,
        }
    }

    // ------------------------------------------------------------------
    // transaction lifecycle
    // ------------------------------------------------------------------

    /// Opens a remote transaction explicitly.
    ///
    /// # Errors
    /// `GraphError::TransactionAlreadyOpen` if one is already active.
    pub fn begin_transaction(&mut self) -> Result<()> {
        if self.transaction_open {
            return Err(GraphError::TransactionAlreadyOpen);
        }
        self.executor.begin()?;
        self.transaction_open = true;
        debug!("transaction started");
        Ok(())
    }

    /// Whether a remote transaction is currently open.
    pub fn is_transaction_open(&self) -> bool {
        self.transaction_open
    }

    fn ensure_transaction(&mut self) -> Result<()> {
        if !self.transaction_open {
            self.begin_transaction()?;
        }
        Ok(())
    }

    /// Commits the unit of work: flushes all queued statements in order,
    /// commits the remote transaction and advances every element snapshot.
    ///
    /// On any statement failure the error propagates unchanged and the rest
    /// of the flush is aborted. Partial remote writes are discarded by the
    /// enclosing remote transaction; the caller must still invoke
    /// [`rollback`](Session::rollback) to restore the local view.
    pub fn commit(&mut self) -> Result<()> {
        if !self.transaction_open {
            return Ok(());
        }
        self.flush()?;
        self.executor.commit()?;
        self.transaction_open = false;

        for vref in &self.transient_vertices {
            if let Some(vertex) = self.vertices.get_mut(vref) {
                vertex.commit();
                if let Some(id) = vertex.id() {
                    self.vertex_index.insert(id, *vref);
                }
            }
        }
        for eref in &self.transient_edges {
            if let Some(edge) = self.edges.get_mut(eref) {
                edge.commit();
                if let Some(id) = edge.id() {
                    self.edge_index.insert(id, *eref);
                }
            }
        }
        for vref in &self.vertex_update_queue {
            if let Some(vertex) = self.vertices.get_mut(vref) {
                vertex.commit();
            }
        }
        for eref in &self.edge_update_queue {
            if let Some(edge) = self.edges.get_mut(eref) {
                edge.commit();
            }
        }
        for vref in &self.vertex_delete_queue {
            self.vertices.remove(vref);
        }
        for eref in self.edge_delete_queue.iter().chain(&self.cascaded_edges) {
            self.edges.remove(eref);
        }
        info!(
            created_vertices = self.transient_vertices.len(),
            created_edges = self.transient_edges.len(),
            updated_vertices = self.vertex_update_queue.len(),
            updated_edges = self.edge_update_queue.len(),
            deleted_vertices = self.vertex_delete_queue.len(),
            deleted_edges = self.edge_delete_queue.len(),
            "transaction committed"
        );
        self.clear_tracking();
        Ok(())
    }

    /// Rolls back the unit of work: discards the remote transaction,
    /// restores every dirty element's snapshot and resurrects locally
    /// deleted elements.
    pub fn rollback(&mut self) -> Result<()> {
        if !self.transaction_open {
            return Ok(());
        }
        self.executor.rollback()?;
        self.transaction_open = false;

        // the remote state the completeness flags vouched for is no longer
        // guaranteed consistent with the discarded local view
        if !self.vertex_update_queue.is_empty() || !self.deleted_vertices.is_empty() {
            self.vertices_loaded = false;
        }
        if !self.edge_update_queue.is_empty() || !self.deleted_edges.is_empty() {
            self.edges_loaded = false;
        }

        for vref in &self.vertex_update_queue {
            if let Some(vertex) = self.vertices.get_mut(vref) {
                vertex.rollback();
            }
        }
        for eref in &self.edge_update_queue {
            if let Some(edge) = self.edges.get_mut(eref) {
                edge.rollback();
            }
        }
        let restored_vertices: Vec<VertexRef> =
            self.vertex_delete_queue.iter().copied().collect();
        for vref in restored_vertices {
            if let Some(vertex) = self.vertices.get_mut(&vref) {
                vertex.rollback();
                if let Some(id) = vertex.id() {
                    self.vertex_index.insert(id, vref);
                }
            }
        }
        let restored_edges: Vec<EdgeRef> = self
            .edge_delete_queue
            .iter()
            .chain(&self.cascaded_edges)
            .copied()
            .collect();
        for eref in restored_edges {
            let endpoints = match self.edges.get_mut(&eref) {
                Some(edge) => {
                    edge.rollback();
                    if let Some(id) = edge.id() {
                        self.edge_index.insert(id, eref);
                    }
                    Some((edge.out_vertex(), edge.in_vertex()))
                }
                None => None,
            };
            // an explicit remove() detached the edge from its endpoints
            // before the rollback was requested
            if let Some((out_vref, in_vref)) = endpoints {
                if let Some(vertex) = self.vertices.get_mut(&out_vref) {
                    vertex.out_edges.insert(eref);
                }
                if let Some(vertex) = self.vertices.get_mut(&in_vref) {
                    vertex.in_edges.insert(eref);
                }
            }
        }
        let discarded_edges: Vec<EdgeRef> = self.transient_edges.iter().copied().collect();
        for eref in discarded_edges {
            if let Some(edge) = self.edges.remove(&eref) {
                if let Some(vertex) = self.vertices.get_mut(&edge.out_vertex()) {
                    vertex.out_edges.remove(&eref);
                }
                if let Some(vertex) = self.vertices.get_mut(&edge.in_vertex()) {
                    vertex.in_edges.remove(&eref);
                }
            }
        }
        for vref in &self.transient_vertices {
            self.vertices.remove(vref);
        }
        warn!("transaction rolled back");
        self.clear_tracking();
        Ok(())
    }

    /// Closes the remote transaction without touching local state.
    ///
    /// Prefer [`rollback`](Session::rollback); this exists for teardown
    /// paths where the local view is about to be dropped anyway.
    pub fn close_transaction(&mut self) -> Result<()> {
        if self.transaction_open {
            debug!("closing open transaction");
            self.executor.rollback()?;
            self.transaction_open = false;
        }
        Ok(())
    }

    /// Closes the session and releases the transport.
    pub fn close(&mut self) -> Result<()> {
        self.close_transaction()?;
        debug!("closing session");
        self.executor.close()
    }

    fn clear_tracking(&mut self) {
        self.deleted_edges.clear();
        self.edge_delete_queue.clear();
        self.cascaded_edges.clear();
        self.deleted_vertices.clear();
        self.vertex_delete_queue.clear();
        self.transient_edges.clear();
        self.transient_vertices.clear();
        self.transient_vertex_index.clear();
        self.transient_edge_index.clear();
        self.vertex_update_queue.clear();
        self.edge_update_queue.clear();
    }

    // ------------------------------------------------------------------
    // element creation and mutation
    // ------------------------------------------------------------------

    fn next_vertex_ref(&mut self) -> VertexRef {
        self.next_ref += 1;
        VertexRef(self.next_ref)
    }

    fn next_edge_ref(&mut self) -> EdgeRef {
        self.next_ref += 1;
        EdgeRef(self.next_ref)
    }

    /// Creates a transient vertex with the given labels.
    ///
    /// The vertex only exists in session memory until the next commit.
    pub fn add_vertex(&mut self, labels: &[&str]) -> Result<VertexRef> {
        if self.readonly {
            return Err(GraphError::ReadOnly);
        }
        for label in labels {
            if !self.partition.validate_label(label) {
                return Err(GraphError::InvalidArgument(format!(
                    "label '{label}' is owned by the graph partition"
                )));
            }
        }
        self.ensure_transaction()?;
        let id = self.vertex_id_provider.generate();
        let vref = self.next_vertex_ref();
        let vertex = Vertex::new_transient(
            vref,
            id,
            labels.iter().map(|label| (*label).to_owned()).collect(),
            self.vertex_labels.clone(),
        );
        self.vertices.insert(vref, vertex);
        self.transient_vertices.insert(vref);
        if let Some(id) = id {
            self.transient_vertex_index.insert(id, vref);
        }
        Ok(vref)
    }

    /// Creates a transient edge between two known vertices.
    pub fn add_edge(
        &mut self,
        label: &str,
        out_vertex: VertexRef,
        in_vertex: VertexRef,
    ) -> Result<EdgeRef> {
        if self.readonly {
            return Err(GraphError::ReadOnly);
        }
        if label.is_empty() {
            return Err(GraphError::InvalidArgument(
                "edge label cannot be empty".to_owned(),
            ));
        }
        if !self.vertices.contains_key(&out_vertex) {
            return Err(GraphError::NotFound("out vertex"));
        }
        if !self.vertices.contains_key(&in_vertex) {
            return Err(GraphError::NotFound("in vertex"));
        }
        self.ensure_transaction()?;
        let id = self.edge_id_provider.generate();
        let eref = self.next_edge_ref();
        let edge = Edge::new_transient(eref, id, label.to_owned(), out_vertex, in_vertex);
        self.edges.insert(eref, edge);
        self.transient_edges.insert(eref);
        if let Some(vertex) = self.vertices.get_mut(&out_vertex) {
            vertex.out_edges.insert(eref);
        }
        if let Some(vertex) = self.vertices.get_mut(&in_vertex) {
            vertex.in_edges.insert(eref);
        }
        if let Some(id) = id {
            self.transient_edge_index.insert(id, eref);
        }
        Ok(eref)
    }

    /// Read access to a vertex.
    pub fn vertex(&self, vref: VertexRef) -> Option<&Vertex> {
        self.vertices.get(&vref)
    }

    /// Read access to an edge.
    pub fn edge(&self, eref: EdgeRef) -> Option<&Edge> {
        self.edges.get(&eref)
    }

    fn require_vertex(&self, vref: VertexRef) -> Result<&Vertex> {
        self.vertices.get(&vref).ok_or(GraphError::NotFound("vertex"))
    }

    fn require_edge(&self, eref: EdgeRef) -> Result<&Edge> {
        self.edges.get(&eref).ok_or(GraphError::NotFound("edge"))
    }

    /// Sets a single-cardinality vertex property.
    pub fn vertex_property(&mut self, vref: VertexRef, name: &str, value: Value) -> Result<()> {
        self.vertex_property_with(vref, Cardinality::Single, name, value)
    }

    /// Sets a vertex property with explicit cardinality.
    pub fn vertex_property_with(
        &mut self,
        vref: VertexRef,
        cardinality: Cardinality,
        name: &str,
        value: Value,
    ) -> Result<()> {
        self.ensure_transaction()?;
        let changed = self
            .vertices
            .get_mut(&vref)
            .ok_or(GraphError::NotFound("vertex"))?
            .set_property(cardinality, name, value)?;
        if changed {
            self.dirty_vertex(vref);
        }
        Ok(())
    }

    /// Clears a vertex property; the removal is sent to the store as an
    /// explicit null on the next commit.
    pub fn remove_vertex_property(&mut self, vref: VertexRef, name: &str) -> Result<()> {
        self.ensure_transaction()?;
        let changed = self
            .vertices
            .get_mut(&vref)
            .ok_or(GraphError::NotFound("vertex"))?
            .remove_property(name);
        if changed {
            self.dirty_vertex(vref);
        }
        Ok(())
    }

    /// Adds a label to a vertex.
    pub fn add_vertex_label(&mut self, vref: VertexRef, label: &str) -> Result<()> {
        self.ensure_transaction()?;
        let partition = Arc::clone(&self.partition);
        let changed = self
            .vertices
            .get_mut(&vref)
            .ok_or(GraphError::NotFound("vertex"))?
            .add_label(label, &*partition)?;
        if changed {
            self.dirty_vertex(vref);
        }
        Ok(())
    }

    /// Removes a label from a vertex.
    pub fn remove_vertex_label(&mut self, vref: VertexRef, label: &str) -> Result<()> {
        self.ensure_transaction()?;
        let partition = Arc::clone(&self.partition);
        let changed = self
            .vertices
            .get_mut(&vref)
            .ok_or(GraphError::NotFound("vertex"))?
            .remove_label(label, &*partition)?;
        if changed {
            self.dirty_vertex(vref);
        }
        Ok(())
    }

    /// Sets an edge property.
    pub fn edge_property(&mut self, eref: EdgeRef, name: &str, value: Value) -> Result<()> {
        self.ensure_transaction()?;
        self.edges
            .get_mut(&eref)
            .ok_or(GraphError::NotFound("edge"))?
            .set_property(name, value)?;
        self.dirty_edge(eref);
        Ok(())
    }

    /// Clears an edge property; sent as an explicit null on the next
    /// commit.
    pub fn remove_edge_property(&mut self, eref: EdgeRef, name: &str) -> Result<()> {
        self.ensure_transaction()?;
        let changed = self
            .edges
            .get_mut(&eref)
            .ok_or(GraphError::NotFound("edge"))?
            .remove_property(name);
        if changed {
            self.dirty_edge(eref);
        }
        Ok(())
    }

    /// Enqueues a vertex for update at the next flush. Transient vertices
    /// are skipped: their pending insert already captures the full state.
    pub fn dirty_vertex(&mut self, vref: VertexRef) {
        if self.vertices.contains_key(&vref) && !self.transient_vertices.contains(&vref) {
            self.vertex_update_queue.insert(vref);
        }
    }

    /// Enqueues an edge for update at the next flush. Transient edges are
    /// skipped: their pending insert already captures the full state.
    pub fn dirty_edge(&mut self, eref: EdgeRef) {
        if self.edges.contains_key(&eref) && !self.transient_edges.contains(&eref) {
            self.edge_update_queue.insert(eref);
        }
    }

    /// Removes a vertex and all its incident edges.
    ///
    /// Incident edges are cascaded locally; the store removes them through
    /// the detach delete in the same flush.
    pub fn remove_vertex(&mut self, vref: VertexRef) -> Result<()> {
        if self.readonly {
            return Err(GraphError::ReadOnly);
        }
        self.ensure_transaction()?;
        let vertex = self.require_vertex(vref)?;
        let incident: Vec<EdgeRef> = vertex
            .out_edges
            .iter()
            .chain(&vertex.in_edges)
            .copied()
            .collect();
        for eref in incident {
            self.remove_edge_internal(eref, false)?;
        }
        if self.transient_vertices.remove(&vref) {
            debug!(?vref, "deleting transient vertex");
            if let Some(vertex) = self.vertices.remove(&vref) {
                if let Some(id) = vertex.id() {
                    self.transient_vertex_index.remove(&id);
                }
            }
            return Ok(());
        }
        debug!(?vref, "deleting vertex");
        if let Some(id) = self.require_vertex(vref)?.id() {
            // tombstone: queries issued before the delete is flushed may
            // still return this row
            self.deleted_vertices.insert(id);
            self.vertex_index.remove(&id);
        }
        self.vertex_delete_queue.insert(vref);
        self.vertex_update_queue.remove(&vref);
        Ok(())
    }

    /// Removes an edge.
    pub fn remove_edge(&mut self, eref: EdgeRef) -> Result<()> {
        if self.readonly {
            return Err(GraphError::ReadOnly);
        }
        self.ensure_transaction()?;
        self.remove_edge_internal(eref, true)
    }

    fn remove_edge_internal(&mut self, eref: EdgeRef, explicit: bool) -> Result<()> {
        let edge = self.require_edge(eref)?;
        let id = edge.id();
        let out_vref = edge.out_vertex();
        let in_vref = edge.in_vertex();
        if self.transient_edges.remove(&eref) {
            debug!(?eref, explicit, "deleting transient edge");
            if explicit {
                self.detach_edge(eref, out_vref, in_vref);
            }
            self.edges.remove(&eref);
            if let Some(id) = id {
                self.transient_edge_index.remove(&id);
            }
            return Ok(());
        }
        debug!(?eref, explicit, "deleting edge");
        if let Some(id) = id {
            self.deleted_edges.insert(id);
            self.edge_index.remove(&id);
        }
        if explicit {
            self.detach_edge(eref, out_vref, in_vref);
            self.edge_delete_queue.insert(eref);
        } else {
            // the detach delete of the owning vertex removes the edge
            // remotely, only local bookkeeping is needed
            self.cascaded_edges.insert(eref);
        }
        // never flush an update for an element deleted in the same
        // transaction
        self.edge_update_queue.remove(&eref);
        Ok(())
    }

    fn detach_edge(&mut self, eref: EdgeRef, out_vref: VertexRef, in_vref: VertexRef) {
        if let Some(vertex) = self.vertices.get_mut(&out_vref) {
            vertex.out_edges.remove(&eref);
        }
        if let Some(vertex) = self.vertices.get_mut(&in_vref) {
            vertex.in_edges.remove(&eref);
        }
    }

    // ------------------------------------------------------------------
    // lookups
    // ------------------------------------------------------------------

    fn vertex_match_pattern(&self, alias: &str) -> String {
        format!(
            "({alias}{})",
            label_fragment(&self.partition.vertex_match_pattern_labels())
        )
    }

    fn resolve_vertices_in_memory(&self, identifiers: &[ElementId]) -> Vec<VertexRef> {
        let mut refs = Vec::new();
        for id in identifiers {
            if let Some(vref) = self.vertex_index.get(id) {
                refs.push(*vref);
            }
        }
        for id in identifiers {
            if let Some(vref) = self.transient_vertex_index.get(id) {
                refs.push(*vref);
            }
        }
        refs
    }

    fn resolve_edges_in_memory(&self, identifiers: &[ElementId]) -> Vec<EdgeRef> {
        let mut refs = Vec::new();
        for id in identifiers {
            if let Some(eref) = self.edge_index.get(id) {
                refs.push(*eref);
            }
        }
        for id in identifiers {
            if let Some(eref) = self.transient_edge_index.get(id) {
                refs.push(*eref);
            }
        }
        refs
    }

    /// Resolves vertices by identifier; an empty slice means all vertices.
    ///
    /// Identifiers already cached or transient are answered from memory;
    /// only the remainder is fetched, with an equality predicate when one
    /// identifier is left and an `IN` predicate otherwise. Once an
    /// unfiltered query has run, the full extent is known and later calls
    /// never touch the store.
    pub fn vertices(&mut self, ids: &[ElementId]) -> Result<Vec<VertexRef>> {
        let mut seen = FxHashSet::default();
        let identifiers: Vec<ElementId> =
            ids.iter().copied().filter(|id| seen.insert(*id)).collect();
        if self.vertices_loaded {
            if !identifiers.is_empty() {
                return Ok(self.resolve_vertices_in_memory(&identifiers));
            }
            let mut refs: Vec<VertexRef> = self.transient_vertices.iter().copied().collect();
            refs.extend(self.vertex_index.values().copied());
            return Ok(refs);
        }
        if !identifiers.is_empty() {
            let missing: Vec<ElementId> = identifiers
                .iter()
                .copied()
                .filter(|id| {
                    !self.vertex_index.contains_key(id)
                        && !self.transient_vertex_index.contains_key(id)
                })
                .collect();
            let mut refs = self.resolve_vertices_in_memory(&identifiers);
            if missing.is_empty() {
                return Ok(refs);
            }
            let operand = self.vertex_id_provider.match_operand("n");
            let scope = self
                .partition
                .vertex_match_predicate("n")
                .map(|predicate| format!(" AND {predicate}"))
                .unwrap_or_default();
            let statement = if missing.len() == 1 {
                let mut parameters = BTreeMap::new();
                parameters.insert("id".to_owned(), missing[0].into());
                Statement::with_parameters(
                    format!(
                        "MATCH {} WHERE {operand} = $id{scope} RETURN n",
                        self.vertex_match_pattern("n")
                    ),
                    parameters,
                )
            } else {
                let mut parameters = BTreeMap::new();
                parameters.insert(
                    "ids".to_owned(),
                    Value::List(missing.iter().map(|id| (*id).into()).collect()),
                );
                Statement::with_parameters(
                    format!(
                        "MATCH {} WHERE {operand} IN $ids{scope} RETURN n",
                        self.vertex_match_pattern("n")
                    ),
                    parameters,
                )
            };
            let stream = self.run(&statement)?;
            refs.extend(self.load_vertex_stream(stream)?);
            return Ok(refs);
        }
        // full extent
        let scope = self
            .partition
            .vertex_match_predicate("n")
            .map(|predicate| format!(" WHERE {predicate}"))
            .unwrap_or_default();
        let statement = Statement::new(format!(
            "MATCH {}{scope} RETURN n",
            self.vertex_match_pattern("n")
        ));
        let stream = self.run(&statement)?;
        let mut refs: Vec<VertexRef> = self.transient_vertices.iter().copied().collect();
        refs.extend(self.load_vertex_stream(stream)?);
        // safe to flip only after the query succeeded
        self.vertices_loaded = true;
        Ok(refs)
    }

    /// Resolves edges by identifier; an empty slice means all edges.
    pub fn edges(&mut self, ids: &[ElementId]) -> Result<Vec<EdgeRef>> {
        let mut seen = FxHashSet::default();
        let identifiers: Vec<ElementId> =
            ids.iter().copied().filter(|id| seen.insert(*id)).collect();
        if self.edges_loaded {
            if !identifiers.is_empty() {
                return Ok(self.resolve_edges_in_memory(&identifiers));
            }
            let mut refs: Vec<EdgeRef> = self.transient_edges.iter().copied().collect();
            refs.extend(self.edge_index.values().copied());
            return Ok(refs);
        }
        let pattern = format!(
            "{}-[r]->{}",
            self.vertex_match_pattern("n"),
            self.vertex_match_pattern("m")
        );
        let scope = if self.partition.uses_match_predicate() {
            match (
                self.partition.vertex_match_predicate("n"),
                self.partition.vertex_match_predicate("m"),
            ) {
                (Some(near), Some(far)) => format!(" AND {near} AND {far}"),
                _ => String::new(),
            }
        } else {
            String::new()
        };
        if !identifiers.is_empty() {
            let missing: Vec<ElementId> = identifiers
                .iter()
                .copied()
                .filter(|id| {
                    !self.edge_index.contains_key(id) && !self.transient_edge_index.contains_key(id)
                })
                .collect();
            let mut refs = self.resolve_edges_in_memory(&identifiers);
            if missing.is_empty() {
                return Ok(refs);
            }
            let operand = self.edge_id_provider.match_operand("r");
            let statement = if missing.len() == 1 {
                let mut parameters = BTreeMap::new();
                parameters.insert("id".to_owned(), missing[0].into());
                Statement::with_parameters(
                    format!("MATCH {pattern} WHERE {operand} = $id{scope} RETURN n, r, m"),
                    parameters,
                )
            } else {
                let mut parameters = BTreeMap::new();
                parameters.insert(
                    "ids".to_owned(),
                    Value::List(missing.iter().map(|id| (*id).into()).collect()),
                );
                Statement::with_parameters(
                    format!("MATCH {pattern} WHERE {operand} IN $ids{scope} RETURN n, r, m"),
                    parameters,
                )
            };
            let stream = self.run(&statement)?;
            refs.extend(self.load_edge_stream(stream)?);
            return Ok(refs);
        }
        let scope = if self.partition.uses_match_predicate() {
            match (
                self.partition.vertex_match_predicate("n"),
                self.partition.vertex_match_predicate("m"),
            ) {
                (Some(near), Some(far)) => format!(" WHERE {near} AND {far}"),
                _ => String::new(),
            }
        } else {
            String::new()
        };
        let statement = Statement::new(format!("MATCH {pattern}{scope} RETURN n, r, m"));
        let stream = self.run(&statement)?;
        let mut refs: Vec<EdgeRef> = self.transient_edges.iter().copied().collect();
        refs.extend(self.load_edge_stream(stream)?);
        self.edges_loaded = true;
        Ok(refs)
    }

    // ------------------------------------------------------------------
    // traversal
    // ------------------------------------------------------------------

    fn adjacency(&self, vref: VertexRef, direction: Direction) -> Result<Vec<EdgeRef>> {
        let vertex = self.require_vertex(vref)?;
        let refs = match direction {
            Direction::Out => vertex.out_edges.iter().copied().collect(),
            Direction::In => vertex.in_edges.iter().copied().collect(),
            Direction::Both => vertex
                .out_edges
                .iter()
                .chain(&vertex.in_edges)
                .copied()
                .collect(),
        };
        Ok(refs)
    }

    fn filter_edges_by_label(&self, refs: Vec<EdgeRef>, filter: &BTreeSet<String>) -> Vec<EdgeRef> {
        refs.into_iter()
            .filter(|eref| match self.edges.get(eref) {
                Some(edge) => filter.is_empty() || filter.contains(edge.label()),
                None => false,
            })
            .collect()
    }

    /// Decides whether a traversal can be answered from memory; returns the
    /// relationship labels that still need a remote query otherwise.
    fn traversal_plan(
        &self,
        vref: VertexRef,
        direction: Direction,
        filter: &BTreeSet<String>,
    ) -> Result<Option<BTreeSet<String>>> {
        let vertex = self.require_vertex(vref)?;
        let plan = match direction {
            Direction::Out => {
                if vertex.out_edges_loaded {
                    None
                } else {
                    let unresolved: BTreeSet<String> = filter
                        .iter()
                        .filter(|label| !vertex.out_edge_labels.contains(*label))
                        .cloned()
                        .collect();
                    if filter.is_empty() || !unresolved.is_empty() {
                        Some(unresolved)
                    } else {
                        None
                    }
                }
            }
            Direction::In => {
                if vertex.in_edges_loaded {
                    None
                } else {
                    let unresolved: BTreeSet<String> = filter
                        .iter()
                        .filter(|label| !vertex.in_edge_labels.contains(*label))
                        .cloned()
                        .collect();
                    if filter.is_empty() || !unresolved.is_empty() {
                        Some(unresolved)
                    } else {
                        None
                    }
                }
            }
            Direction::Both => {
                if vertex.out_edges_loaded && vertex.in_edges_loaded {
                    None
                } else {
                    let out_resolved = filter
                        .iter()
                        .all(|label| vertex.out_edge_labels.contains(label));
                    let in_resolved = filter
                        .iter()
                        .all(|label| vertex.in_edge_labels.contains(label));
                    if filter.is_empty() || !out_resolved || !in_resolved {
                        Some(filter.clone())
                    } else {
                        None
                    }
                }
            }
        };
        Ok(plan)
    }

    fn mark_traversal_resolved(
        &mut self,
        vref: VertexRef,
        direction: Direction,
        filter: &BTreeSet<String>,
    ) {
        if let Some(vertex) = self.vertices.get_mut(&vref) {
            match direction {
                Direction::Out => {
                    vertex.out_edges_loaded |= filter.is_empty();
                    vertex.out_edge_labels.extend(filter.iter().cloned());
                }
                Direction::In => {
                    vertex.in_edges_loaded |= filter.is_empty();
                    vertex.in_edge_labels.extend(filter.iter().cloned());
                }
                Direction::Both => {
                    vertex.out_edges_loaded |= filter.is_empty();
                    vertex.in_edges_loaded |= filter.is_empty();
                    vertex.out_edge_labels.extend(filter.iter().cloned());
                    vertex.in_edge_labels.extend(filter.iter().cloned());
                }
            }
        }
    }

    /// Edges incident to a vertex, optionally filtered by type.
    ///
    /// Adjacency already in memory is returned as a materialized copy (the
    /// graph may be mutated while iterating); remote rows follow, excluded
    /// by identifier from duplicating locally known edges. The resolved
    /// extent is recorded only after the remote call succeeded.
    pub fn vertex_edges(
        &mut self,
        vref: VertexRef,
        direction: Direction,
        labels: &[&str],
    ) -> Result<Vec<EdgeRef>> {
        let filter: BTreeSet<String> = labels.iter().map(|label| (*label).to_owned()).collect();
        let plan = self.traversal_plan(vref, direction, &filter)?;
        let memory = self.filter_edges_by_label(self.adjacency(vref, direction)?, &filter);
        let Some(query_labels) = plan else {
            return Ok(memory);
        };
        let local_ids: Vec<Value> = self
            .adjacency(vref, direction)?
            .iter()
            .filter_map(|eref| self.edges.get(eref).and_then(Edge::id))
            .map(Value::from)
            .collect();
        let statement = {
            let vertex = self.require_vertex(vref)?;
            vertex.traversal_statement(
                direction,
                &query_labels,
                local_ids,
                TraversalReturn::Edges,
                &*self.vertex_id_provider,
                &*self.edge_id_provider,
                &*self.partition,
            )
        };
        let stream = self.run(&statement)?;
        let mut refs = memory;
        refs.extend(self.load_edge_stream(stream)?);
        self.mark_traversal_resolved(vref, direction, &filter);
        Ok(refs)
    }

    /// Vertices adjacent to a vertex through edges of the given types.
    pub fn vertex_neighbors(
        &mut self,
        vref: VertexRef,
        direction: Direction,
        labels: &[&str],
    ) -> Result<Vec<VertexRef>> {
        let filter: BTreeSet<String> = labels.iter().map(|label| (*label).to_owned()).collect();
        let plan = self.traversal_plan(vref, direction, &filter)?;
        let memory = self.neighbors_in_memory(vref, direction, &filter)?;
        let Some(query_labels) = plan else {
            return Ok(memory);
        };
        let local_ids: Vec<Value> = self
            .adjacency(vref, direction)?
            .iter()
            .filter_map(|eref| self.edges.get(eref).and_then(Edge::id))
            .map(Value::from)
            .collect();
        let statement = {
            let vertex = self.require_vertex(vref)?;
            vertex.traversal_statement(
                direction,
                &query_labels,
                local_ids,
                TraversalReturn::FarVertices,
                &*self.vertex_id_provider,
                &*self.edge_id_provider,
                &*self.partition,
            )
        };
        let stream = self.run(&statement)?;
        let mut refs = memory;
        refs.extend(self.load_vertex_stream(stream)?);
        // neighbor queries do not resolve the edge extent, flags stay as
        // they are
        Ok(refs)
    }

    fn neighbors_in_memory(
        &self,
        vref: VertexRef,
        direction: Direction,
        filter: &BTreeSet<String>,
    ) -> Result<Vec<VertexRef>> {
        let vertex = self.require_vertex(vref)?;
        let mut refs = Vec::new();
        let mut push_far = |edges: &FxHashSet<EdgeRef>, outgoing: bool, refs: &mut Vec<VertexRef>| {
            for eref in edges {
                if let Some(edge) = self.edges.get(eref) {
                    if filter.is_empty() || filter.contains(edge.label()) {
                        refs.push(if outgoing {
                            edge.in_vertex()
                        } else {
                            edge.out_vertex()
                        });
                    }
                }
            }
        };
        match direction {
            Direction::Out => push_far(&vertex.out_edges, true, &mut refs),
            Direction::In => push_far(&vertex.in_edges, false, &mut refs),
            Direction::Both => {
                push_far(&vertex.out_edges, true, &mut refs);
                push_far(&vertex.in_edges, false, &mut refs);
            }
        }
        Ok(refs)
    }

    // ------------------------------------------------------------------
    // result loading
    // ------------------------------------------------------------------

    /// Materializes a vertex row into the session, or returns `None` for
    /// rows that are tombstoned or outside the read partition. Dropping
    /// such rows silently is intentional: re-querying a partition boundary
    /// during a live transaction is expected, not exceptional.
    fn load_vertex(&mut self, node: &RemoteNode) -> Result<Option<VertexRef>> {
        let id = self.vertex_id_provider.get(node)?;
        if self.deleted_vertices.contains(&id) {
            return Ok(None);
        }
        if let Some(vref) = self.vertex_index.get(&id) {
            return Ok(Some(*vref));
        }
        let labels: BTreeSet<String> = node.labels.iter().cloned().collect();
        if !self.partition.contains_vertex(&labels) {
            return Ok(None);
        }
        let vref = self.next_vertex_ref();
        let id_field = self.vertex_id_provider.field_name().map(str::to_owned);
        let vertex_labels = self.vertex_labels.clone();
        let partition = Arc::clone(&self.partition);
        let vertex = Vertex::from_remote(vref, id, node, id_field.as_deref(), |label| {
            vertex_labels.contains(label) || !partition.validate_label(label)
        });
        self.vertices.insert(vref, vertex);
        self.vertex_index.insert(id, vref);
        Ok(Some(vref))
    }

    /// Materializes an `n, r, m` row into the session; rows whose edge or
    /// endpoints are tombstoned or outside the partition are dropped.
    fn load_edge(&mut self, record: &Record) -> Result<Option<EdgeRef>> {
        let relationship = record.relationship(1)?;
        let edge_id = self.edge_id_provider.get(relationship)?;
        if self.deleted_edges.contains(&edge_id) {
            return Ok(None);
        }
        if let Some(eref) = self.edge_index.get(&edge_id) {
            return Ok(Some(*eref));
        }
        let first = record.node(0)?;
        let second = record.node(2)?;
        let first_id = self.vertex_id_provider.get(first)?;
        let second_id = self.vertex_id_provider.get(second)?;
        if self.deleted_vertices.contains(&first_id) || self.deleted_vertices.contains(&second_id) {
            return Ok(None);
        }
        let first_labels: BTreeSet<String> = first.labels.iter().cloned().collect();
        let second_labels: BTreeSet<String> = second.labels.iter().cloned().collect();
        if !self.partition.contains_vertex(&first_labels)
            || !self.partition.contains_vertex(&second_labels)
        {
            return Ok(None);
        }
        let Some(first_vref) = self.load_vertex(first)? else {
            return Ok(None);
        };
        let Some(second_vref) = self.load_vertex(second)? else {
            return Ok(None);
        };
        // the undirected traversal form can return the relationship in
        // either orientation
        let (out_vref, in_vref) = if relationship.start_id == first.native_id {
            (first_vref, second_vref)
        } else {
            (second_vref, first_vref)
        };
        let eref = self.next_edge_ref();
        let id_field = self.edge_id_provider.field_name().map(str::to_owned);
        let edge = Edge::from_remote(
            eref,
            edge_id,
            relationship,
            id_field.as_deref(),
            out_vref,
            in_vref,
        );
        self.edges.insert(eref, edge);
        self.edge_index.insert(edge_id, eref);
        if let Some(vertex) = self.vertices.get_mut(&out_vref) {
            vertex.out_edges.insert(eref);
        }
        if let Some(vertex) = self.vertices.get_mut(&in_vref) {
            vertex.in_edges.insert(eref);
        }
        Ok(Some(eref))
    }

    fn load_vertex_stream(&mut self, stream: RecordStream) -> Result<Vec<VertexRef>> {
        let mut refs = Vec::new();
        for record in stream {
            let record = record?;
            if let Some(vref) = self.load_vertex(record.node(0)?)? {
                refs.push(vref);
            }
        }
        Ok(refs)
    }

    fn load_edge_stream(&mut self, stream: RecordStream) -> Result<Vec<EdgeRef>> {
        let mut refs = Vec::new();
        for record in stream {
            let record = record?;
            if let Some(eref) = self.load_edge(&record)? {
                refs.push(eref);
            }
        }
        Ok(refs)
    }

    /// Runs an arbitrary statement and hydrates vertices from its first
    /// column, with the usual tombstone and partition filtering.
    pub fn vertices_by_statement(&mut self, statement: Statement) -> Result<Vec<VertexRef>> {
        let stream = self.run(&statement)?;
        self.load_vertex_stream(stream)
    }

    /// Runs an arbitrary statement returning `n, r, m` columns and hydrates
    /// edges from it.
    pub fn edges_by_statement(&mut self, statement: Statement) -> Result<Vec<EdgeRef>> {
        let stream = self.run(&statement)?;
        self.load_edge_stream(stream)
    }

    /// Executes an arbitrary statement on the session transaction.
    ///
    /// Results are not scoped to the read partition; callers are on their
    /// own.
    pub fn execute_statement(&mut self, statement: Statement) -> Result<RecordStream> {
        self.run(&statement)
    }

    /// Creates a store index over a label/property pair.
    pub fn create_index(&mut self, label: &str, property_name: &str) -> Result<()> {
        let statement = Statement::new(format!("CREATE INDEX ON :`{label}`({property_name})"));
        self.run(&statement)?.drain()
    }

    // ------------------------------------------------------------------
    // flush
    // ------------------------------------------------------------------

    fn run(&mut self, statement: &Statement) -> Result<RecordStream> {
        self.ensure_transaction()?;
        let statement = if self.profile_statements {
            let upper = statement.text.to_uppercase();
            if upper.starts_with("PROFILE") || upper.starts_with("EXPLAIN") {
                Cow::Borrowed(statement)
            } else {
                Cow::Owned(Statement::with_parameters(
                    format!("PROFILE {}", statement.text),
                    statement.parameters.clone(),
                ))
            }
        } else {
            Cow::Borrowed(statement)
        };
        debug!(statement = %statement.text, "executing statement");
        match self.executor.execute(&statement) {
            Ok(stream) => Ok(stream),
            Err(err) => {
                error!(statement = %statement.text, %err, "statement execution failed");
                Err(err)
            }
        }
    }

    fn flush(&mut self) -> Result<()> {
        // edges go first so endpoint rows are never referenced while being
        // deleted; creates precede edge creates so endpoints exist; edge
        // updates precede vertex updates so an edge's endpoint match still
        // sees consistent identifiers
        self.delete_edges()?;
        self.delete_vertices()?;
        self.create_vertices()?;
        self.create_edges()?;
        self.update_edges()?;
        self.update_vertices()?;
        Ok(())
    }

    fn delete_edges(&mut self) -> Result<()> {
        let refs: Vec<EdgeRef> = self.edge_delete_queue.iter().copied().collect();
        for eref in refs {
            let statement = {
                let edge = self.require_edge(eref)?;
                let out_vertex = self.require_vertex(edge.out_vertex())?;
                let in_vertex = self.require_vertex(edge.in_vertex())?;
                edge.delete_command(
                    out_vertex,
                    in_vertex,
                    &*self.edge_id_provider,
                    &*self.vertex_id_provider,
                    &*self.partition,
                )?
            };
            self.run(&statement)?.drain()?;
        }
        Ok(())
    }

    fn delete_vertices(&mut self) -> Result<()> {
        let refs: Vec<VertexRef> = self.vertex_delete_queue.iter().copied().collect();
        for vref in refs {
            let statement = {
                let vertex = self.require_vertex(vref)?;
                vertex.delete_command(&*self.vertex_id_provider, &*self.partition)
            };
            self.run(&statement)?.drain()?;
        }
        Ok(())
    }

    fn create_vertices(&mut self) -> Result<()> {
        let refs: Vec<VertexRef> = self.transient_vertices.iter().copied().collect();
        for vref in refs {
            let command = {
                let vertex = self
                    .vertices
                    .get_mut(&vref)
                    .ok_or(GraphError::NotFound("vertex"))?;
                vertex.insert_command(&*self.vertex_id_provider)
            };
            self.execute_command(command, CaptureTarget::Vertex(vref))?;
        }
        Ok(())
    }

    fn create_edges(&mut self) -> Result<()> {
        let refs: Vec<EdgeRef> = self.transient_edges.iter().copied().collect();
        for eref in refs {
            let command = {
                let edge = self.require_edge(eref)?;
                let out_vertex = self.require_vertex(edge.out_vertex())?;
                let in_vertex = self.require_vertex(edge.in_vertex())?;
                edge.insert_command(
                    out_vertex,
                    in_vertex,
                    &*self.edge_id_provider,
                    &*self.vertex_id_provider,
                    &*self.partition,
                )?
            };
            self.execute_command(command, CaptureTarget::Edge(eref))?;
        }
        Ok(())
    }

    fn update_edges(&mut self) -> Result<()> {
        let refs: Vec<EdgeRef> = self.edge_update_queue.iter().copied().collect();
        for eref in refs {
            let statement = {
                let edge = self.require_edge(eref)?;
                let out_vertex = self.require_vertex(edge.out_vertex())?;
                let in_vertex = self.require_vertex(edge.in_vertex())?;
                edge.update_command(
                    out_vertex,
                    in_vertex,
                    &*self.edge_id_provider,
                    &*self.vertex_id_provider,
                    &*self.partition,
                )?
            };
            if let Some(statement) = statement {
                self.run(&statement)?.drain()?;
            }
        }
        Ok(())
    }

    fn update_vertices(&mut self) -> Result<()> {
        let refs: Vec<VertexRef> = self.vertex_update_queue.iter().copied().collect();
        for vref in refs {
            let statement = {
                let vertex = self.require_vertex(vref)?;
                vertex.update_command(&*self.vertex_id_provider, &*self.partition)
            };
            if let Some(statement) = statement {
                self.run(&statement)?.drain()?;
            }
        }
        Ok(())
    }

    fn execute_command(&mut self, command: Command, target: CaptureTarget) -> Result<()> {
        let mut stream = self.run(&command.statement)?;
        if command.capture == Capture::GeneratedId {
            if let Some(record) = stream.next() {
                let record = record?;
                let value = record.scalar(0)?;
                match target {
                    CaptureTarget::Vertex(vref) => {
                        let id = self.vertex_id_provider.process_identifier(value)?;
                        if let Some(vertex) = self.vertices.get_mut(&vref) {
                            vertex.set_generated_id(id);
                        }
                    }
                    CaptureTarget::Edge(eref) => {
                        let id = self.edge_id_provider.process_identifier(value)?;
                        if let Some(edge) = self.edges.get_mut(&eref) {
                            edge.set_generated_id(id);
                        }
                    }
                }
            }
        }
        stream.drain()
    }
}

/// Which element a captured server-generated identifier belongs to.
#[derive(Debug, Clone, Copy)]
enum CaptureTarget {
    Vertex(VertexRef),
    Edge(EdgeRef),
}
