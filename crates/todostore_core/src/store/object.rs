//! Live handles to stored objects.
//!
//! # Invariants
//! - A handle never caches field values; every read hits the table, so all
//!   handles to one object observe the latest committed or in-transaction
//!   state.
//! - Reads on a deleted (or rolled back) object fail with
//!   `StoreError::ObjectInvalidated`.

use super::ObjectStore;
use crate::db::value::{Fields, ObjectId, Value};
use crate::db::{StoreError, StoreResult};
use crate::schema::{ModelSchema, Property, PropertyKind};
use log::warn;
use std::fmt::{Debug, Formatter};

/// Managed reference to one object of one model.
#[derive(Clone, Copy)]
pub struct ManagedObject<'db> {
    store: &'db ObjectStore,
    schema: &'static ModelSchema,
    id: ObjectId,
}

impl<'db> ManagedObject<'db> {
    pub(crate) fn new(store: &'db ObjectStore, schema: &'static ModelSchema, id: ObjectId) -> Self {
        Self { store, schema, id }
    }

    pub fn id(&self) -> ObjectId {
        self.id
    }

    pub fn model_name(&self) -> &'static str {
        self.schema.name
    }

    pub fn schema(&self) -> &'static ModelSchema {
        self.schema
    }

    /// Whether the backing row still exists. Engine failures count as
    /// invalid and are logged.
    pub fn is_valid(&self) -> bool {
        match self.store.object_exists(self.schema, self.id) {
            Ok(exists) => exists,
            Err(err) => {
                warn!(
                    "event=object_check module=store status=error model={} object_id={} error={}",
                    self.schema.name, self.id, err
                );
                false
            }
        }
    }

    /// Reads one property.
    pub fn get(&self, name: &str) -> StoreResult<Value> {
        let property = self.property(name)?;
        self.store.read_property(self.schema, self.id, property)
    }

    pub fn get_string(&self, name: &str) -> StoreResult<String> {
        match self.get(name)? {
            Value::String(text) => Ok(text),
            other => Err(self.mismatch(name, "string", &other)),
        }
    }

    pub fn get_optional_string(&self, name: &str) -> StoreResult<Option<String>> {
        match self.get(name)? {
            Value::String(text) => Ok(Some(text)),
            Value::Null => Ok(None),
            other => Err(self.mismatch(name, "string?", &other)),
        }
    }

    pub fn get_bool(&self, name: &str) -> StoreResult<bool> {
        match self.get(name)? {
            Value::Bool(flag) => Ok(flag),
            other => Err(self.mismatch(name, "bool", &other)),
        }
    }

    pub fn get_i64(&self, name: &str) -> StoreResult<i64> {
        match self.get(name)? {
            Value::Int(number) => Ok(number),
            other => Err(self.mismatch(name, "int", &other)),
        }
    }

    /// Reads a `date` property as epoch milliseconds.
    pub fn get_date(&self, name: &str) -> StoreResult<i64> {
        match self.get(name)? {
            Value::Date(millis) => Ok(millis),
            other => Err(self.mismatch(name, "date", &other)),
        }
    }

    /// Overwrites one property. Requires an open write transaction.
    pub fn set(&self, name: &str, value: impl Into<Value>) -> StoreResult<()> {
        let property = self.property(name)?;
        self.store
            .write_property(self.schema, self.id, property, value.into())
    }

    /// Follows an `object<T>` property.
    pub fn linked(&self, name: &str) -> StoreResult<Option<ManagedObject<'db>>> {
        let property = self.property(name)?;
        let PropertyKind::Object(target) = property.kind else {
            return Err(self.mismatch(name, "object", &Value::Null));
        };
        match self.store.read_property(self.schema, self.id, property)? {
            Value::Object(id) => self.store.object(target, id),
            _ => Ok(None),
        }
    }

    /// Follows a `list<T>` property, skipping entries that no longer exist.
    pub fn linked_list(&self, name: &str) -> StoreResult<Vec<ManagedObject<'db>>> {
        let property = self.property(name)?;
        let PropertyKind::List(target) = property.kind else {
            return Err(self.mismatch(name, "list", &Value::Null));
        };
        let Value::List(ids) = self.store.read_property(self.schema, self.id, property)? else {
            return Ok(Vec::new());
        };
        let mut linked = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(object) = self.store.object(target, id)? {
                linked.push(object);
            }
        }
        Ok(linked)
    }

    /// Copies every property into a detached field map.
    pub fn to_fields(&self) -> StoreResult<Fields> {
        let mut fields = Fields::new();
        for property in self.schema.properties {
            let value = self.store.read_property(self.schema, self.id, property)?;
            fields.insert(property.name.to_string(), value);
        }
        Ok(fields)
    }

    /// Debug dump following links up to `max_depth` levels.
    ///
    /// Links past the limit render as `"Model"` / `"Model[]"` placeholders.
    pub fn to_json(&self, max_depth: usize) -> StoreResult<serde_json::Value> {
        self.to_json_at(0, max_depth)
    }

    fn to_json_at(&self, depth: usize, max_depth: usize) -> StoreResult<serde_json::Value> {
        let mut map = serde_json::Map::new();
        for property in self.schema.properties {
            let value = self.store.read_property(self.schema, self.id, property)?;
            let rendered = match (property.kind, value) {
                (PropertyKind::Object(target), Value::Object(_)) if depth >= max_depth => {
                    serde_json::Value::String(target.to_string())
                }
                (PropertyKind::List(target), Value::List(_)) if depth >= max_depth => {
                    serde_json::Value::String(format!("{target}[]"))
                }
                (PropertyKind::Object(_), Value::Object(_)) => match self.linked(property.name)? {
                    Some(object) => object.to_json_at(depth + 1, max_depth)?,
                    None => serde_json::Value::Null,
                },
                (PropertyKind::List(_), Value::List(_)) => {
                    let mut items = Vec::new();
                    for object in self.linked_list(property.name)? {
                        items.push(object.to_json_at(depth + 1, max_depth)?);
                    }
                    serde_json::Value::Array(items)
                }
                (_, other) => other.to_json(),
            };
            map.insert(property.name.to_string(), rendered);
        }
        Ok(serde_json::Value::Object(map))
    }

    fn property(&self, name: &str) -> StoreResult<&'static Property> {
        self.schema
            .property(name)
            .ok_or_else(|| StoreError::UnknownProperty {
                model: self.schema.name,
                property: name.to_string(),
            })
    }

    fn mismatch(&self, name: &str, expected: &str, found: &Value) -> StoreError {
        match self.schema.property(name) {
            Some(property) => StoreError::TypeMismatch {
                model: self.schema.name,
                property: property.name,
                expected: expected.to_string(),
                found: found.type_name(),
            },
            None => StoreError::UnknownProperty {
                model: self.schema.name,
                property: name.to_string(),
            },
        }
    }
}

impl Debug for ManagedObject<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManagedObject")
            .field("model", &self.schema.name)
            .field("id", &self.id)
            .finish()
    }
}

impl PartialEq for ManagedObject<'_> {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self.store, other.store)
            && self.schema.name == other.schema.name
            && self.id == other.id
    }
}

impl Eq for ManagedObject<'_> {}
