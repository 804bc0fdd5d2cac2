use crate::schema::parse_flag;
use crate::{Result, SyncError};
use serde::de::{self, Deserializer};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A server-owned row the client holds a replaceable copy of.
///
/// Rows are compared with `PartialEq` so that replacing a cached copy with an
/// identical payload is recognised as a no-op.
pub trait Record: Clone + PartialEq + Send + Sync + 'static {
    /// Stable identity of the row across every view.
    fn id(&self) -> &str;
}

/// Normalise a JSON id (string or integer) into its string form.
pub fn id_from_value(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Row backed by a JSON object, for resources declared at runtime.
#[derive(Debug, Clone, PartialEq)]
pub struct JsonRow {
    id: String,
    fields: Map<String, Value>,
}

impl JsonRow {
    pub fn from_value(value: Value) -> Result<Self> {
        let Value::Object(fields) = value else {
            return Err(SyncError::malformed("row must be a JSON object"));
        };
        let id = fields
            .get("id")
            .and_then(id_from_value)
            .ok_or_else(|| SyncError::malformed("row has no usable 'id' field"))?;
        Ok(Self { id, fields })
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    /// Resolve a dot-separated path into nested objects.
    pub fn get_path(&self, path: &str) -> Option<&Value> {
        let mut parts = path.split('.');
        let mut current = self.fields.get(parts.next()?)?;
        for part in parts {
            current = current.as_object()?.get(part)?;
        }
        Some(current)
    }

    /// Scalar value at `path` rendered as text; `null`, arrays and objects yield `None`.
    pub fn text_at(&self, path: &str) -> Option<String> {
        match self.get_path(path)? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }

    /// Value at `path` read as a boolean flag. Numbers are truthy when non-zero,
    /// strings go through [`parse_flag`].
    pub fn flag_at(&self, path: &str) -> Option<bool> {
        match self.get_path(path)? {
            Value::Bool(b) => Some(*b),
            Value::Number(n) => n.as_f64().map(|f| f != 0.0),
            Value::String(s) => parse_flag(s),
            _ => None,
        }
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.fields)
    }
}

impl Record for JsonRow {
    fn id(&self) -> &str {
        &self.id
    }
}

impl Serialize for JsonRow {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.fields.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for JsonRow {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        JsonRow::from_value(value).map_err(de::Error::custom)
    }
}
