/// Update operators for stored documents
///
/// An `Update` is an ordered list of field operations applied to one
/// document at a time. Backends apply the same operations, so the semantics
/// of `pull` and `add_to_set` do not depend on the storage engine.

use super::query::{Document, ID_FIELD};
use super::StoreError;
use serde_json::Value;

/// A single field operation
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateOp {
    /// Replace the field value
    Set(String, Value),

    /// Remove every occurrence of a value from an array field
    Pull(String, Value),

    /// Remove every occurrence of any of the values from an array field
    PullAll(String, Vec<Value>),

    /// Append the value to an array field unless already present
    AddToSet(String, Value),
}

/// Ordered set of operations applied to a document
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Update {
    pub ops: Vec<UpdateOp>,
}

impl Update {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets every key of an object (replacing whole values)
    pub fn set_all(fields: Document) -> Self {
        Self {
            ops: fields
                .into_iter()
                .map(|(field, value)| UpdateOp::Set(field, value))
                .collect(),
        }
    }

    pub fn set(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.ops.push(UpdateOp::Set(field.to_string(), value.into()));
        self
    }

    pub fn pull(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.ops.push(UpdateOp::Pull(field.to_string(), value.into()));
        self
    }

    pub fn pull_all<I, V>(mut self, field: &str, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.ops.push(UpdateOp::PullAll(
            field.to_string(),
            values.into_iter().map(Into::into).collect(),
        ));
        self
    }

    pub fn add_to_set(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.ops.push(UpdateOp::AddToSet(field.to_string(), value.into()));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Applies the operations in order
    ///
    /// # Errors
    ///
    /// - `StoreError::Validation` if an operation targets `_id` or an array
    ///   operator targets a non-array field
    pub fn apply(&self, doc: &mut Document) -> Result<(), StoreError> {
        for op in &self.ops {
            match op {
                UpdateOp::Set(field, value) => {
                    if field == ID_FIELD {
                        if doc.get(ID_FIELD) == Some(value) {
                            continue;
                        }
                        return Err(StoreError::Validation("_id is immutable".to_string()));
                    }
                    doc.insert(field.clone(), value.clone());
                }
                UpdateOp::Pull(field, value) => {
                    if let Some(items) = array_field(doc, field)? {
                        items.retain(|item| item != value);
                    }
                }
                UpdateOp::PullAll(field, values) => {
                    if let Some(items) = array_field(doc, field)? {
                        items.retain(|item| !values.contains(item));
                    }
                }
                UpdateOp::AddToSet(field, value) => {
                    let entry = doc
                        .entry(field.clone())
                        .or_insert_with(|| Value::Array(Vec::new()));
                    if entry.is_null() {
                        *entry = Value::Array(Vec::new());
                    }
                    match entry {
                        Value::Array(items) => {
                            if !items.contains(value) {
                                items.push(value.clone());
                            }
                        }
                        _ => {
                            return Err(StoreError::Validation(format!(
                                "{} is not an array",
                                field
                            )))
                        }
                    }
                }
            }
        }
        Ok(())
    }
}

/// Mutable access to an array field; missing or null fields are a no-op
fn array_field<'a>(
    doc: &'a mut Document,
    field: &str,
) -> Result<Option<&'a mut Vec<Value>>, StoreError> {
    match doc.get_mut(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Array(items)) => Ok(Some(items)),
        Some(_) => Err(StoreError::Validation(format!("{} is not an array", field))),
    }
}
