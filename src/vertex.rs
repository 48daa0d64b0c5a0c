//! The vertex element: label and property change tracking, statement
//! rendering and the per-direction adjacency bookkeeping.

use std::collections::{BTreeMap, BTreeSet};

use rustc_hash::FxHashSet;

use crate::error::{GraphError, Result};
use crate::ids::IdProvider;
use crate::model::{Cardinality, Direction, EdgeRef, ElementId, VertexRef};
use crate::partition::ReadPartition;
use crate::statement::{Capture, Command, RemoteNode, Statement};
use crate::value::{check_property_value, Value};

/// Values stored under one property key, together with their cardinality.
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyBag {
    cardinality: Cardinality,
    values: Vec<Value>,
}

impl PropertyBag {
    fn single(value: Value) -> Self {
        Self {
            cardinality: Cardinality::Single,
            values: vec![value],
        }
    }

    /// Cardinality of the key.
    pub fn cardinality(&self) -> Cardinality {
        self.cardinality
    }

    /// Stored values; a single-cardinality bag holds exactly one.
    pub fn values(&self) -> &[Value] {
        &self.values
    }
}

/// Renders a backtick-quoted label fragment (`:A:B`) for patterns and
/// SET/REMOVE clauses.
pub(crate) fn label_fragment<'a, I>(labels: I) -> String
where
    I: IntoIterator<Item = &'a String>,
{
    labels
        .into_iter()
        .map(|label| format!(":`{label}`"))
        .collect()
}

/// What a traversal statement should return.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TraversalReturn {
    /// The full `n, r, m` triple, for edge hydration.
    Edges,
    /// Only the far endpoint `m`, for neighbor hydration.
    FarVertices,
}

/// A vertex held by a session.
///
/// Carries the element's change-tracking state: current labels/properties,
/// the last-committed snapshot used on rollback, explicit removed-property
/// names (sent as nulls) and the dirty/transient flags. Adjacency is kept
/// as session-local edge handles; per-direction loaded flags and
/// resolved-label sets let repeated traversals skip the store once an
/// extent is known complete.
#[derive(Debug)]
pub struct Vertex {
    vref: VertexRef,
    id: Option<ElementId>,
    generated_id: Option<ElementId>,
    labels: BTreeSet<String>,
    labels_added: BTreeSet<String>,
    labels_removed: BTreeSet<String>,
    original_labels: BTreeSet<String>,
    match_labels: BTreeSet<String>,
    graph_labels: BTreeSet<String>,
    properties: BTreeMap<String, PropertyBag>,
    original_properties: BTreeMap<String, PropertyBag>,
    removed_properties: BTreeSet<String>,
    pub(crate) out_edges: FxHashSet<EdgeRef>,
    pub(crate) in_edges: FxHashSet<EdgeRef>,
    pub(crate) out_edge_labels: BTreeSet<String>,
    pub(crate) in_edge_labels: BTreeSet<String>,
    pub(crate) out_edges_loaded: bool,
    pub(crate) in_edges_loaded: bool,
    dirty: bool,
    transient: bool,
}

impl Vertex {
    /// Creates a transient vertex that only exists in session memory.
    pub(crate) fn new_transient(
        vref: VertexRef,
        id: Option<ElementId>,
        labels: BTreeSet<String>,
        graph_labels: BTreeSet<String>,
    ) -> Self {
        Self {
            vref,
            id,
            generated_id: None,
            labels,
            labels_added: BTreeSet::new(),
            labels_removed: BTreeSet::new(),
            original_labels: BTreeSet::new(),
            match_labels: BTreeSet::new(),
            graph_labels,
            properties: BTreeMap::new(),
            original_properties: BTreeMap::new(),
            removed_properties: BTreeSet::new(),
            out_edges: FxHashSet::default(),
            in_edges: FxHashSet::default(),
            out_edge_labels: BTreeSet::new(),
            in_edge_labels: BTreeSet::new(),
            // nothing exists remotely yet, adjacency is complete by definition
            out_edges_loaded: true,
            in_edges_loaded: true,
            dirty: false,
            transient: true,
        }
    }

    /// Creates a persisted vertex from a remote node row.
    ///
    /// `hidden_labels` receives every node label and decides which ones are
    /// bookkeeping (partition or graph-wide labels) and therefore excluded
    /// from the caller-visible label set. All node labels participate in
    /// match patterns regardless.
    pub(crate) fn from_remote(
        vref: VertexRef,
        id: ElementId,
        node: &RemoteNode,
        id_field: Option<&str>,
        hidden_labels: impl Fn(&str) -> bool,
    ) -> Self {
        let graph_labels: BTreeSet<String> = node
            .labels
            .iter()
            .filter(|label| hidden_labels(label))
            .cloned()
            .collect();
        let labels: BTreeSet<String> = node
            .labels
            .iter()
            .filter(|label| !graph_labels.contains(*label))
            .cloned()
            .collect();
        let match_labels: BTreeSet<String> = node.labels.iter().cloned().collect();
        let mut properties = BTreeMap::new();
        for (key, value) in &node.properties {
            if id_field == Some(key.as_str()) {
                continue;
            }
            let bag = match value {
                Value::List(items) => PropertyBag {
                    cardinality: Cardinality::List,
                    values: items.clone(),
                },
                other => PropertyBag::single(other.clone()),
            };
            properties.insert(key.clone(), bag);
        }
        Self {
            vref,
            id: Some(id),
            generated_id: None,
            original_labels: labels.clone(),
            labels,
            labels_added: BTreeSet::new(),
            labels_removed: BTreeSet::new(),
            match_labels,
            graph_labels,
            original_properties: properties.clone(),
            properties,
            removed_properties: BTreeSet::new(),
            out_edges: FxHashSet::default(),
            in_edges: FxHashSet::default(),
            out_edge_labels: BTreeSet::new(),
            in_edge_labels: BTreeSet::new(),
            out_edges_loaded: false,
            in_edges_loaded: false,
            dirty: false,
            transient: false,
        }
    }

    /// Session-local handle of this vertex.
    pub fn vref(&self) -> VertexRef {
        self.vref
    }

    /// Store identifier, `None` until one is assigned.
    pub fn id(&self) -> Option<ElementId> {
        self.id.or(self.generated_id)
    }

    pub(crate) fn set_generated_id(&mut self, id: ElementId) {
        self.generated_id = Some(id);
    }

    /// Caller-visible labels, excluding partition and graph-wide labels.
    pub fn labels(&self) -> &BTreeSet<String> {
        &self.labels
    }

    /// True if a property or label change is pending flush.
    pub fn is_dirty(&self) -> bool {
        self.dirty || !self.labels_added.is_empty() || !self.labels_removed.is_empty()
    }

    /// True until the vertex has been durably created in the store.
    pub fn is_transient(&self) -> bool {
        self.transient
    }

    /// Single property value for `name`.
    ///
    /// # Errors
    /// `GraphError::InvalidArgument` when the key holds multiple values.
    pub fn property(&self, name: &str) -> Result<Option<&Value>> {
        match self.properties.get(name) {
            None => Ok(None),
            Some(bag) if bag.values.len() == 1 => Ok(bag.values.first()),
            Some(_) => Err(GraphError::InvalidArgument(format!(
                "multiple values exist for property '{name}'"
            ))),
        }
    }

    /// All values stored under `name`.
    pub fn property_values(&self, name: &str) -> &[Value] {
        self.properties
            .get(name)
            .map(|bag| bag.values.as_slice())
            .unwrap_or(&[])
    }

    /// All property bags keyed by name.
    pub fn properties(&self) -> &BTreeMap<String, PropertyBag> {
        &self.properties
    }

    /// Stores a property value, returning whether the vertex changed and
    /// the session must enqueue an update.
    pub(crate) fn set_property(
        &mut self,
        cardinality: Cardinality,
        name: &str,
        value: Value,
    ) -> Result<bool> {
        check_property_value(&value)?;
        if let Some(existing) = self.properties.get(name) {
            if existing.cardinality != cardinality {
                return Err(GraphError::InvalidArgument(format!(
                    "property '{name}' has been defined with {} cardinality",
                    existing.cardinality
                )));
            }
        }
        match cardinality {
            Cardinality::Single => {
                self.properties.insert(name.to_owned(), PropertyBag::single(value));
            }
            Cardinality::List => {
                let bag = self.properties.entry(name.to_owned()).or_insert(PropertyBag {
                    cardinality: Cardinality::List,
                    values: Vec::new(),
                });
                bag.values.push(value);
            }
            Cardinality::Set => {
                let bag = self.properties.entry(name.to_owned()).or_insert(PropertyBag {
                    cardinality: Cardinality::Set,
                    values: Vec::new(),
                });
                if bag.values.contains(&value) {
                    return Ok(false);
                }
                bag.values.push(value);
            }
        }
        self.dirty = true;
        Ok(true)
    }

    /// Clears a property, recording it for an explicit null on the next
    /// update. Returns whether anything changed.
    pub(crate) fn remove_property(&mut self, name: &str) -> bool {
        if self.properties.remove(name).is_none() {
            return false;
        }
        self.removed_properties.insert(name.to_owned());
        self.dirty = true;
        true
    }

    /// Adds a caller-visible label. Returns whether the label set changed.
    ///
    /// # Errors
    /// `GraphError::InvalidArgument` when the label belongs to the active
    /// partition.
    pub(crate) fn add_label(&mut self, label: &str, partition: &dyn ReadPartition) -> Result<bool> {
        if !partition.validate_label(label) {
            return Err(GraphError::InvalidArgument(format!(
                "label '{label}' is owned by the graph partition"
            )));
        }
        if !self.labels.insert(label.to_owned()) {
            return Ok(false);
        }
        // a remove followed by an add nets out to the original state
        if !self.labels_removed.remove(label) {
            self.labels_added.insert(label.to_owned());
        }
        Ok(true)
    }

    /// Removes a caller-visible label. Returns whether the label set
    /// changed and the session must enqueue an update.
    pub(crate) fn remove_label(
        &mut self,
        label: &str,
        partition: &dyn ReadPartition,
    ) -> Result<bool> {
        if !partition.validate_label(label) {
            return Err(GraphError::InvalidArgument(format!(
                "label '{label}' is owned by the graph partition and cannot be removed"
            )));
        }
        if self.graph_labels.contains(label) {
            return Err(GraphError::InvalidArgument(format!(
                "label '{label}' is applied to all vertices of this graph and cannot be removed"
            )));
        }
        if !self.labels.remove(label) {
            return Ok(false);
        }
        if self.labels_added.remove(label) {
            // the label only ever existed locally, nothing to flush for it
            return Ok(false);
        }
        self.labels_removed.insert(label.to_owned());
        Ok(true)
    }

    /// Renders the match pattern for this vertex, e.g. `(v:A:B)` with
    /// backtick-quoted labels.
    pub fn match_pattern(&self, alias: &str) -> String {
        format!("({alias}{})", label_fragment(&self.match_labels))
    }

    /// Renders the identifier predicate for this vertex, e.g.
    /// `ID(v) = $id AND (v:P1 OR v:P2)`.
    pub fn match_predicate(
        &self,
        alias: &str,
        id_parameter: &str,
        provider: &dyn IdProvider,
        partition: &dyn ReadPartition,
    ) -> String {
        let mut predicate = format!("{} = ${id_parameter}", provider.match_operand(alias));
        if partition.uses_match_predicate() {
            if let Some(scope) = partition.vertex_match_predicate(alias) {
                predicate.push_str(" AND ");
                predicate.push_str(&scope);
            }
        }
        predicate
    }

    /// Renders the full match clause locating this vertex.
    pub fn match_statement(
        &self,
        alias: &str,
        id_parameter: &str,
        provider: &dyn IdProvider,
        partition: &dyn ReadPartition,
    ) -> String {
        format!(
            "MATCH {} WHERE {}",
            self.match_pattern(alias),
            self.match_predicate(alias, id_parameter, provider, partition)
        )
    }

    /// Full current property set as statement parameters, with explicit
    /// nulls for removed properties and the identifier field appended when
    /// the provider stores identifiers in a property.
    pub(crate) fn statement_parameters(&self, provider: &dyn IdProvider) -> BTreeMap<String, Value> {
        let mut parameters = BTreeMap::new();
        for (key, bag) in &self.properties {
            let value = match bag.cardinality {
                Cardinality::Single => bag.values.first().cloned().unwrap_or(Value::Null),
                _ => Value::List(bag.values.clone()),
            };
            parameters.insert(key.clone(), value);
        }
        for name in &self.removed_properties {
            parameters.insert(name.clone(), Value::Null);
        }
        if let (Some(id), Some(field)) = (self.id, provider.field_name()) {
            parameters.insert(field.to_owned(), id.into());
        }
        parameters
    }

    /// Renders the creation statement for this vertex.
    ///
    /// With store-side id generation the statement returns the assigned
    /// identifier and the flush loop captures it; otherwise the
    /// client-generated identifier travels in the parameters.
    pub(crate) fn insert_command(&mut self, provider: &dyn IdProvider) -> Command {
        let insert_labels: BTreeSet<String> =
            self.labels.union(&self.graph_labels).cloned().collect();
        let mut parameters = BTreeMap::new();
        parameters.insert(
            "vp".to_owned(),
            Value::Map(self.statement_parameters(provider)),
        );
        let fragment = label_fragment(&insert_labels);
        let command = if self.id.is_none() {
            Command {
                statement: Statement::with_parameters(
                    format!("CREATE (n{fragment} $vp) RETURN {}", provider.match_operand("n")),
                    parameters,
                ),
                capture: Capture::GeneratedId,
            }
        } else {
            Command {
                statement: Statement::with_parameters(format!("CREATE ({fragment} $vp)"), parameters),
                capture: Capture::Nothing,
            }
        };
        // from now on the vertex is located in the store by these labels
        self.match_labels = insert_labels;
        command
    }

    /// Renders the update statement, or `None` when nothing is dirty and no
    /// round trip is needed.
    pub(crate) fn update_command(
        &self,
        provider: &dyn IdProvider,
        partition: &dyn ReadPartition,
    ) -> Option<Statement> {
        if !self.is_dirty() {
            return None;
        }
        let mut text = format!(
            "MATCH {} WHERE {}",
            self.match_pattern("v"),
            self.match_predicate("v", "id", provider, partition)
        );
        let mut parameters = BTreeMap::new();
        if let Some(id) = self.id() {
            parameters.insert("id".to_owned(), id.into());
        }
        if self.dirty {
            text.push_str(" SET v = $vp");
            parameters.insert(
                "vp".to_owned(),
                Value::Map(self.statement_parameters(provider)),
            );
        }
        if !self.labels_added.is_empty() {
            text.push_str(if self.dirty { ", v" } else { " SET v" });
            text.push_str(&label_fragment(&self.labels_added));
        }
        if !self.labels_removed.is_empty() {
            text.push_str(" REMOVE v");
            text.push_str(&label_fragment(&self.labels_removed));
        }
        Some(Statement::with_parameters(text, parameters))
    }

    /// Renders the delete statement; incident edges are removed store-side
    /// by the detach delete.
    pub(crate) fn delete_command(
        &self,
        provider: &dyn IdProvider,
        partition: &dyn ReadPartition,
    ) -> Statement {
        let text = format!(
            "{} DETACH DELETE v",
            self.match_statement("v", "id", provider, partition)
        );
        let mut parameters = BTreeMap::new();
        if let Some(id) = self.id() {
            parameters.insert("id".to_owned(), id.into());
        }
        Statement::with_parameters(text, parameters)
    }

    /// Renders the statement fetching edges or far endpoints adjacent to
    /// this vertex.
    ///
    /// The statement is scoped to the vertex's own identity, the still
    /// unresolved relationship labels, a `NOT ... IN $ids` exclusion over
    /// edges already held locally (so remote rows never duplicate known
    /// edges) and the partition boundary on the far endpoint.
    pub(crate) fn traversal_statement(
        &self,
        direction: Direction,
        relationship_labels: &BTreeSet<String>,
        local_edge_ids: Vec<Value>,
        returns: TraversalReturn,
        vertex_provider: &dyn IdProvider,
        edge_provider: &dyn IdProvider,
        partition: &dyn ReadPartition,
    ) -> Statement {
        let relationship_fragment = if relationship_labels.is_empty() {
            String::new()
        } else {
            let mut fragment = String::from(":");
            let mut first = true;
            for label in relationship_labels {
                if !first {
                    fragment.push('|');
                }
                fragment.push_str(&format!("`{label}`"));
                first = false;
            }
            fragment
        };
        let far_fragment = label_fragment(&partition.vertex_match_pattern_labels());
        let pattern = match direction {
            Direction::Out => format!(
                "{}-[r{relationship_fragment}]->(m{far_fragment})",
                self.match_pattern("n")
            ),
            Direction::In => format!(
                "{}<-[r{relationship_fragment}]-(m{far_fragment})",
                self.match_pattern("n")
            ),
            Direction::Both => format!(
                "{}-[r{relationship_fragment}]-(m{far_fragment})",
                self.match_pattern("n")
            ),
        };
        let mut text = format!(
            "MATCH {pattern} WHERE {} = $id",
            vertex_provider.match_operand("n")
        );
        let mut parameters = BTreeMap::new();
        if let Some(id) = self.id() {
            parameters.insert("id".to_owned(), id.into());
        }
        if !local_edge_ids.is_empty() {
            text.push_str(&format!(
                " AND NOT {} IN $ids",
                edge_provider.match_operand("r")
            ));
            parameters.insert("ids".to_owned(), Value::List(local_edge_ids));
        }
        if let Some(scope) = partition.vertex_match_predicate("m") {
            text.push_str(" AND ");
            text.push_str(&scope);
        }
        match returns {
            TraversalReturn::Edges => text.push_str(" RETURN n, r, m"),
            TraversalReturn::FarVertices => text.push_str(" RETURN m"),
        }
        Statement::with_parameters(text, parameters)
    }

    /// Moves the current state into the snapshot after a successful flush.
    pub(crate) fn commit(&mut self) {
        self.labels_added.clear();
        self.labels_removed.clear();
        self.original_labels = self.labels.clone();
        self.match_labels = self.labels.union(&self.graph_labels).cloned().collect();
        self.original_properties = self.properties.clone();
        self.removed_properties.clear();
        self.dirty = false;
        self.transient = false;
    }

    /// Restores the snapshot, discarding uncommitted changes. Adjacency
    /// completeness is no longer trustworthy afterwards.
    pub(crate) fn rollback(&mut self) {
        self.labels_added.clear();
        self.labels_removed.clear();
        self.labels = self.original_labels.clone();
        self.match_labels = self.labels.union(&self.graph_labels).cloned().collect();
        self.properties = self.original_properties.clone();
        self.removed_properties.clear();
        self.out_edges_loaded = false;
        self.in_edges_loaded = false;
        self.dirty = false;
    }
}
