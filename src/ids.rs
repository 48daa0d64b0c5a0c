//! Identifier policy: generation, extraction and predicate rendering.

use std::sync::atomic::{AtomicI64, Ordering};

use crate::error::{GraphError, Result};
use crate::model::ElementId;
use crate::statement::RemoteEntity;
use crate::value::Value;

/// Identifier policy for one element kind (vertices or edges).
///
/// A provider decides where identifiers come from (client sequence or the
/// store itself), where they live on the remote entity (a property or the
/// store-native id) and how a statement matches an element by identifier.
pub trait IdProvider: Send + Sync + std::fmt::Debug {
    /// Generates a new identifier, or `None` when generation happens on the
    /// store side and the insert statement must return the assigned id.
    fn generate(&self) -> Option<ElementId>;

    /// Property name carrying the identifier, or `None` when the identifier
    /// is a store-native concept rather than a property.
    fn field_name(&self) -> Option<&str>;

    /// Extracts the identifier from a remote entity.
    fn get(&self, entity: &dyn RemoteEntity) -> Result<ElementId>;

    /// Converts an arbitrary identifier value to the canonical type.
    ///
    /// # Errors
    /// `GraphError::InvalidArgument` if the value is not convertible.
    fn process_identifier(&self, raw: &Value) -> Result<ElementId>;

    /// Renders the operand used to match an element by identifier in a
    /// predicate, e.g. `ID(n)` or `n.id`.
    fn match_operand(&self, alias: &str) -> String;
}

fn convert_identifier(raw: &Value) -> Result<ElementId> {
    match raw {
        Value::Int(id) => Ok(ElementId(*id)),
        Value::Float(id) => Ok(ElementId(*id as i64)),
        Value::String(id) => id.parse::<i64>().map(ElementId).map_err(|_| {
            GraphError::InvalidArgument(format!("identifier '{id}' is not convertible to an id"))
        }),
        other => Err(GraphError::InvalidArgument(format!(
            "expected an identifier convertible to an id, received {}",
            other.type_name()
        ))),
    }
}

/// Identifier policy backed by the store's native entity ids.
///
/// Identifiers are assigned by the store at insert time; insert statements
/// return the generated id and the session captures it before the statement
/// is considered complete.
#[derive(Debug, Default)]
pub struct NativeIdProvider;

impl IdProvider for NativeIdProvider {
    fn generate(&self) -> Option<ElementId> {
        // store-side generation
        None
    }

    fn field_name(&self) -> Option<&str> {
        None
    }

    fn get(&self, entity: &dyn RemoteEntity) -> Result<ElementId> {
        Ok(ElementId(entity.native_id()))
    }

    fn process_identifier(&self, raw: &Value) -> Result<ElementId> {
        convert_identifier(raw)
    }

    fn match_operand(&self, alias: &str) -> String {
        format!("ID({alias})")
    }
}

/// Identifier policy drawing from a process-local sequence, storing the
/// identifier in a regular property on the entity.
#[derive(Debug)]
pub struct SequenceIdProvider {
    field_name: String,
    next: AtomicI64,
}

impl SequenceIdProvider {
    /// Default name of the identifier property.
    pub const DEFAULT_FIELD_NAME: &'static str = "id";

    /// Creates a provider storing identifiers in the given property.
    pub fn new(field_name: impl Into<String>) -> Self {
        Self {
            field_name: field_name.into(),
            next: AtomicI64::new(1),
        }
    }
}

impl Default for SequenceIdProvider {
    fn default() -> Self {
        Self::new(Self::DEFAULT_FIELD_NAME)
    }
}

impl IdProvider for SequenceIdProvider {
    fn generate(&self) -> Option<ElementId> {
        Some(ElementId(self.next.fetch_add(1, Ordering::Relaxed)))
    }

    fn field_name(&self) -> Option<&str> {
        Some(&self.field_name)
    }

    fn get(&self, entity: &dyn RemoteEntity) -> Result<ElementId> {
        let value = entity
            .property(&self.field_name)
            .ok_or(GraphError::NotFound("identifier property"))?;
        convert_identifier(value)
    }

    fn process_identifier(&self, raw: &Value) -> Result<ElementId> {
        convert_identifier(raw)
    }

    fn match_operand(&self, alias: &str) -> String {
        format!("{alias}.{}", self.field_name)
    }
}
