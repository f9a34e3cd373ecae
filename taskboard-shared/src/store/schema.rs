/// Collection schemas
///
/// Each collection declares its fields, their types, defaults and which
/// fields carry a unique constraint. Backends call [`Schema::prepare_insert`]
/// before inserting and [`Schema::validate`] after applying an update with
/// validation enabled. Unknown fields are dropped.

use super::query::{Document, ID_FIELD};
use super::StoreError;
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::Value;
use uuid::Uuid;

/// Type of a document field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    String,
    Boolean,
    /// RFC 3339 timestamp
    DateTime,
    /// UUID string
    Id,
    /// Array of UUID strings
    IdList,
}

/// Value used when a field is absent at insert
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldDefault {
    None,
    Null,
    Bool(bool),
    Str(&'static str),
    EmptyList,
    Now,
}

impl FieldDefault {
    fn value(&self) -> Option<Value> {
        match self {
            FieldDefault::None => None,
            FieldDefault::Null => Some(Value::Null),
            FieldDefault::Bool(b) => Some(Value::Bool(*b)),
            FieldDefault::Str(s) => Some(Value::String((*s).to_string())),
            FieldDefault::EmptyList => Some(Value::Array(Vec::new())),
            FieldDefault::Now => Some(Value::String(
                Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            )),
        }
    }
}

/// Declaration of one field
#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    pub name: &'static str,
    pub ty: FieldType,
    pub required: bool,
    pub nullable: bool,
    pub default: FieldDefault,
}

impl FieldSpec {
    pub const fn required(name: &'static str, ty: FieldType) -> Self {
        Self {
            name,
            ty,
            required: true,
            nullable: false,
            default: FieldDefault::None,
        }
    }

    pub const fn optional(name: &'static str, ty: FieldType, default: FieldDefault) -> Self {
        Self {
            name,
            ty,
            required: false,
            nullable: false,
            default,
        }
    }

    pub const fn nullable(name: &'static str, ty: FieldType) -> Self {
        Self {
            name,
            ty,
            required: false,
            nullable: true,
            default: FieldDefault::Null,
        }
    }
}

/// Schema of a collection
#[derive(Debug, Clone, Copy)]
pub struct Schema {
    pub fields: &'static [FieldSpec],
    pub unique: &'static [&'static str],
}

/// A named collection and its schema
#[derive(Debug, Clone, Copy)]
pub struct Collection {
    pub name: &'static str,
    pub schema: Schema,
}

impl Schema {
    fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Drops keys the schema does not declare
    pub fn strip_unknown(&self, doc: &mut Document) {
        doc.retain(|key, _| key == ID_FIELD || self.field(key).is_some());
    }

    /// Assigns an `_id` if missing, applies defaults, strips unknown fields
    /// and validates
    pub fn prepare_insert(&self, mut doc: Document) -> Result<(Uuid, Document), StoreError> {
        let id = match doc.get(ID_FIELD) {
            None | Some(Value::Null) => Uuid::new_v4(),
            Some(Value::String(s)) => Uuid::parse_str(s)
                .map_err(|_| StoreError::Validation(format!("_id is not a valid id: {}", s)))?,
            Some(other) => {
                return Err(StoreError::Validation(format!(
                    "_id is not a valid id: {}",
                    other
                )))
            }
        };
        doc.insert(ID_FIELD.to_string(), Value::String(id.to_string()));

        self.strip_unknown(&mut doc);
        for field in self.fields {
            if !doc.contains_key(field.name) {
                if let Some(value) = field.default.value() {
                    doc.insert(field.name.to_string(), value);
                }
            }
        }

        self.validate(&doc)?;
        Ok((id, doc))
    }

    /// Checks required fields and field types
    ///
    /// Required string fields must be non-empty.
    pub fn validate(&self, doc: &Document) -> Result<(), StoreError> {
        let mut problems = Vec::new();

        for field in self.fields {
            match doc.get(field.name) {
                None | Some(Value::Null) if field.required => {
                    problems.push(format!("{} is required", field.name));
                }
                None => {}
                Some(Value::Null) if field.nullable => {}
                Some(Value::String(s)) if field.required && s.is_empty() => {
                    problems.push(format!("{} is required", field.name));
                }
                Some(value) => {
                    if !type_matches(field.ty, value) {
                        problems.push(format!("{} has an invalid value", field.name));
                    }
                }
            }
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(StoreError::Validation(problems.join(", ")))
        }
    }

    /// Values of the unique fields present in a document
    pub fn unique_values<'a>(&self, doc: &'a Document) -> Vec<(&'static str, &'a Value)> {
        self.unique
            .iter()
            .filter_map(|field| doc.get(*field).map(|value| (*field, value)))
            .filter(|(_, value)| !value.is_null())
            .collect()
    }
}

fn type_matches(ty: FieldType, value: &Value) -> bool {
    match (ty, value) {
        (FieldType::String, Value::String(_)) => true,
        (FieldType::Boolean, Value::Bool(_)) => true,
        (FieldType::DateTime, Value::String(s)) => DateTime::parse_from_rfc3339(s).is_ok(),
        (FieldType::Id, Value::String(s)) => Uuid::parse_str(s).is_ok(),
        (FieldType::IdList, Value::Array(items)) => items
            .iter()
            .all(|item| item.as_str().map(|s| Uuid::parse_str(s).is_ok()).unwrap_or(false)),
        _ => false,
    }
}
