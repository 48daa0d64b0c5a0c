//! The edge element: property change tracking and statement rendering
//! through both endpoint vertices.

use std::collections::{BTreeMap, BTreeSet};

use crate::error::{GraphError, Result};
use crate::ids::IdProvider;
use crate::model::{EdgeRef, ElementId, VertexRef};
use crate::partition::ReadPartition;
use crate::statement::{Capture, Command, RemoteRelationship, Statement};
use crate::value::{check_property_value, Value};
use crate::vertex::Vertex;

/// An edge held by a session.
///
/// Endpoints are stored as session-local vertex handles; the edge does not
/// own its vertices. Statements locating the edge go through both
/// endpoints' match statements, so the edge remains addressable even when
/// identifiers are stored as properties.
#[derive(Debug)]
pub struct Edge {
    eref: EdgeRef,
    id: Option<ElementId>,
    generated_id: Option<ElementId>,
    label: String,
    out_vertex: VertexRef,
    in_vertex: VertexRef,
    properties: BTreeMap<String, Value>,
    original_properties: BTreeMap<String, Value>,
    removed_properties: BTreeSet<String>,
    dirty: bool,
    transient: bool,
}

impl Edge {
    pub(crate) fn new_transient(
        eref: EdgeRef,
        id: Option<ElementId>,
        label: String,
        out_vertex: VertexRef,
        in_vertex: VertexRef,
    ) -> Self {
        Self {
            eref,
            id,
            generated_id: None,
            label,
            out_vertex,
            in_vertex,
            properties: BTreeMap::new(),
            original_properties: BTreeMap::new(),
            removed_properties: BTreeSet::new(),
            dirty: false,
            transient: true,
        }
    }

    pub(crate) fn from_remote(
        eref: EdgeRef,
        id: ElementId,
        relationship: &RemoteRelationship,
        id_field: Option<&str>,
        out_vertex: VertexRef,
        in_vertex: VertexRef,
    ) -> Self {
        let properties: BTreeMap<String, Value> = relationship
            .properties
            .iter()
            .filter(|(key, _)| id_field != Some(key.as_str()))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        Self {
            eref,
            id: Some(id),
            generated_id: None,
            label: relationship.type_name.clone(),
            out_vertex,
            in_vertex,
            original_properties: properties.clone(),
            properties,
            removed_properties: BTreeSet::new(),
            dirty: false,
            transient: false,
        }
    }

    /// Session-local handle of this edge.
    pub fn eref(&self) -> EdgeRef {
        self.eref
    }

    /// Store identifier, `None` until one is assigned.
    pub fn id(&self) -> Option<ElementId> {
        self.id.or(self.generated_id)
    }

    pub(crate) fn set_generated_id(&mut self, id: ElementId) {
        self.generated_id = Some(id);
    }

    /// Edge type.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Tail endpoint (the edge points away from it).
    pub fn out_vertex(&self) -> VertexRef {
        self.out_vertex
    }

    /// Head endpoint (the edge points at it).
    pub fn in_vertex(&self) -> VertexRef {
        self.in_vertex
    }

    /// True if a property change is pending flush.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// True until the edge has been durably created in the store.
    pub fn is_transient(&self) -> bool {
        self.transient
    }

    /// Property value by name.
    pub fn property(&self, name: &str) -> Option<&Value> {
        self.properties.get(name)
    }

    /// All properties keyed by name.
    pub fn properties(&self) -> &BTreeMap<String, Value> {
        &self.properties
    }

    pub(crate) fn set_property(&mut self, name: &str, value: Value) -> Result<()> {
        check_property_value(&value)?;
        self.properties.insert(name.to_owned(), value);
        self.dirty = true;
        Ok(())
    }

    pub(crate) fn remove_property(&mut self, name: &str) -> bool {
        if self.properties.remove(name).is_none() {
            return false;
        }
        self.removed_properties.insert(name.to_owned());
        self.dirty = true;
        true
    }

    fn statement_parameters(&self, provider: &dyn IdProvider) -> BTreeMap<String, Value> {
        let mut parameters = self.properties.clone();
        for name in &self.removed_properties {
            parameters.insert(name.clone(), Value::Null);
        }
        if let (Some(id), Some(field)) = (self.id, provider.field_name()) {
            parameters.insert(field.to_owned(), id.into());
        }
        parameters
    }

    fn endpoint_parameters(out_vertex: &Vertex, in_vertex: &Vertex) -> Result<(Value, Value)> {
        let out_id = out_vertex
            .id()
            .ok_or(GraphError::NotFound("out vertex identifier"))?;
        let in_id = in_vertex
            .id()
            .ok_or(GraphError::NotFound("in vertex identifier"))?;
        Ok((out_id.into(), in_id.into()))
    }

    /// Renders the creation statement; both endpoints must already exist in
    /// the store, which the flush ordering guarantees.
    pub(crate) fn insert_command(
        &self,
        out_vertex: &Vertex,
        in_vertex: &Vertex,
        edge_provider: &dyn IdProvider,
        vertex_provider: &dyn IdProvider,
        partition: &dyn ReadPartition,
    ) -> Result<Command> {
        let (out_id, in_id) = Self::endpoint_parameters(out_vertex, in_vertex)?;
        let mut parameters = BTreeMap::new();
        parameters.insert("oid".to_owned(), out_id);
        parameters.insert("iid".to_owned(), in_id);
        parameters.insert(
            "ep".to_owned(),
            Value::Map(self.statement_parameters(edge_provider)),
        );
        let matches = format!(
            "{} {}",
            out_vertex.match_statement("o", "oid", vertex_provider, partition),
            in_vertex.match_statement("i", "iid", vertex_provider, partition)
        );
        if self.id.is_none() {
            return Ok(Command {
                statement: Statement::with_parameters(
                    format!(
                        "{matches} CREATE (o)-[r:`{}` $ep]->(i) RETURN {}",
                        self.label,
                        edge_provider.match_operand("r")
                    ),
                    parameters,
                ),
                capture: Capture::GeneratedId,
            });
        }
        Ok(Command {
            statement: Statement::with_parameters(
                format!("{matches} CREATE (o)-[:`{}` $ep]->(i)", self.label),
                parameters,
            ),
            capture: Capture::Nothing,
        })
    }

    /// Renders the update statement, or `None` when nothing is dirty.
    pub(crate) fn update_command(
        &self,
        out_vertex: &Vertex,
        in_vertex: &Vertex,
        edge_provider: &dyn IdProvider,
        vertex_provider: &dyn IdProvider,
        partition: &dyn ReadPartition,
    ) -> Result<Option<Statement>> {
        if !self.dirty {
            return Ok(None);
        }
        let (out_id, in_id) = Self::endpoint_parameters(out_vertex, in_vertex)?;
        let mut parameters = BTreeMap::new();
        parameters.insert("oid".to_owned(), out_id);
        parameters.insert("iid".to_owned(), in_id);
        if let Some(id) = self.id() {
            parameters.insert("id".to_owned(), id.into());
        }
        parameters.insert(
            "rp".to_owned(),
            Value::Map(self.statement_parameters(edge_provider)),
        );
        let text = format!(
            "{} {} MATCH (o)-[r:`{}`]->(i) WHERE {} = $id SET r = $rp",
            out_vertex.match_statement("o", "oid", vertex_provider, partition),
            in_vertex.match_statement("i", "iid", vertex_provider, partition),
            self.label,
            edge_provider.match_operand("r")
        );
        Ok(Some(Statement::with_parameters(text, parameters)))
    }

    /// Renders the delete statement.
    pub(crate) fn delete_command(
        &self,
        out_vertex: &Vertex,
        in_vertex: &Vertex,
        edge_provider: &dyn IdProvider,
        vertex_provider: &dyn IdProvider,
        partition: &dyn ReadPartition,
    ) -> Result<Statement> {
        let (out_id, in_id) = Self::endpoint_parameters(out_vertex, in_vertex)?;
        let mut parameters = BTreeMap::new();
        parameters.insert("oid".to_owned(), out_id);
        parameters.insert("iid".to_owned(), in_id);
        if let Some(id) = self.id() {
            parameters.insert("id".to_owned(), id.into());
        }
        let text = format!(
            "{} {} MATCH (o)-[r:`{}`]->(i) WHERE {} = $id DELETE r",
            out_vertex.match_statement("o", "oid", vertex_provider, partition),
            in_vertex.match_statement("i", "iid", vertex_provider, partition),
            self.label,
            edge_provider.match_operand("r")
        );
        Ok(Statement::with_parameters(text, parameters))
    }

    pub(crate) fn commit(&mut self) {
        self.original_properties = self.properties.clone();
        self.removed_properties.clear();
        self.dirty = false;
        self.transient = false;
    }

    pub(crate) fn rollback(&mut self) {
        self.properties = self.original_properties.clone();
        self.removed_properties.clear();
        self.dirty = false;
    }
}
