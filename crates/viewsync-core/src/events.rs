//! Diff events pushed by the server and their wire decoding.

use crate::record::id_from_value;
use crate::{Result, Status, SyncError};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// A row was created (`previous_status == None`) or changed.
#[derive(Debug, Clone, PartialEq)]
pub struct UpsertEvent<R> {
    pub row: R,
    pub previous_status: Option<Status>,
    pub new_status: Status,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DiffEvent<R> {
    Upsert(UpsertEvent<R>),
    /// Row permanently gone.
    Remove { id: String, previous_status: Status },
    /// Several upserts applied together with a single change notification.
    BatchUpsert(Vec<UpsertEvent<R>>),
}

impl<R> DiffEvent<R> {
    pub fn upsert(row: R, previous_status: Option<Status>, new_status: Status) -> Self {
        DiffEvent::Upsert(UpsertEvent {
            row,
            previous_status,
            new_status,
        })
    }

    pub fn remove(id: impl Into<String>, previous_status: Status) -> Self {
        DiffEvent::Remove {
            id: id.into(),
            previous_status,
        }
    }

    pub fn kind(&self) -> EventKind {
        match self {
            DiffEvent::Upsert(_) => EventKind::Upsert,
            DiffEvent::Remove { .. } => EventKind::Remove,
            DiffEvent::BatchUpsert(_) => EventKind::BatchUpsert,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EventKind {
    #[serde(alias = "created", alias = "updated")]
    Upsert,
    #[serde(alias = "deleted")]
    Remove,
    #[serde(alias = "batch")]
    BatchUpsert,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            EventKind::Upsert => "upsert",
            EventKind::Remove => "remove",
            EventKind::BatchUpsert => "batch-upsert",
        })
    }
}

impl FromStr for EventKind {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "upsert" | "created" | "updated" => Ok(EventKind::Upsert),
            "remove" | "deleted" => Ok(EventKind::Remove),
            "batch-upsert" | "batch_upsert" | "batch" => Ok(EventKind::BatchUpsert),
            other => Err(SyncError::malformed(format!("unknown event kind '{}'", other))),
        }
    }
}

/// Decodes wire payloads for one resource. Upserts carry the row under the
/// singular resource name, batches carry a list under the plural name.
#[derive(Debug, Clone)]
pub struct EventDecoder {
    singular: String,
    plural: String,
}

impl EventDecoder {
    pub fn new(singular: impl Into<String>, plural: impl Into<String>) -> Self {
        Self {
            singular: singular.into(),
            plural: plural.into(),
        }
    }

    /// Derive payload keys from a plural namespace: `users` -> `user` / `users`.
    pub fn for_namespace(namespace: &str) -> Self {
        let singular = namespace
            .strip_suffix('s')
            .filter(|s| !s.is_empty())
            .unwrap_or(namespace);
        Self::new(singular, namespace)
    }

    pub fn singular(&self) -> &str {
        &self.singular
    }

    pub fn plural(&self) -> &str {
        &self.plural
    }

    pub fn decode<R: DeserializeOwned>(
        &self,
        kind: EventKind,
        payload: &Value,
    ) -> Result<DiffEvent<R>> {
        match kind {
            EventKind::Upsert => self.decode_upsert(payload).map(DiffEvent::Upsert),
            EventKind::Remove => self.decode_remove(payload),
            EventKind::BatchUpsert => self.decode_batch(payload).map(DiffEvent::BatchUpsert),
        }
    }

    fn decode_upsert<R: DeserializeOwned>(&self, payload: &Value) -> Result<UpsertEvent<R>> {
        let obj = payload
            .as_object()
            .ok_or_else(|| SyncError::malformed("upsert payload must be an object"))?;

        let raw_row = obj
            .get(&self.singular)
            .ok_or_else(|| SyncError::malformed(format!("upsert is missing '{}'", self.singular)))?;
        let row = R::deserialize(raw_row).map_err(|e| {
            SyncError::malformed(format!("invalid '{}' row: {}", self.singular, e))
        })?;

        let previous_status = match obj.get("previousStatus") {
            None | Some(Value::Null) => None,
            Some(v) => Some(parse_status(v, "previousStatus")?),
        };
        let new_status = obj
            .get("newStatus")
            .ok_or_else(|| SyncError::malformed("upsert is missing 'newStatus'"))
            .and_then(|v| parse_status(v, "newStatus"))?;

        Ok(UpsertEvent {
            row,
            previous_status,
            new_status,
        })
    }

    fn decode_remove<R>(&self, payload: &Value) -> Result<DiffEvent<R>> {
        let id = payload
            .get("id")
            .and_then(id_from_value)
            .ok_or_else(|| SyncError::malformed("remove is missing a usable 'id'"))?;
        let previous_status = payload
            .get("previousStatus")
            .ok_or_else(|| SyncError::malformed("remove is missing 'previousStatus'"))
            .and_then(|v| parse_status(v, "previousStatus"))?;
        Ok(DiffEvent::Remove {
            id,
            previous_status,
        })
    }

    fn decode_batch<R: DeserializeOwned>(&self, payload: &Value) -> Result<Vec<UpsertEvent<R>>> {
        let items = payload
            .get(&self.plural)
            .and_then(Value::as_array)
            .ok_or_else(|| {
                SyncError::malformed(format!("batch is missing '{}' array", self.plural))
            })?;

        items
            .iter()
            .enumerate()
            .map(|(i, item)| {
                self.decode_upsert(item).map_err(|e| {
                    SyncError::malformed(format!("batch item {}: {}", i, e))
                })
            })
            .collect()
    }
}

fn parse_status(value: &Value, field: &str) -> Result<Status> {
    value
        .as_str()
        .ok_or_else(|| SyncError::malformed(format!("'{}' must be a string", field)))?
        .parse()
}
