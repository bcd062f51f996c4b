//! To-do domain model.
//!
//! # Responsibility
//! - Declare the `Todo` descriptor and the default schema set.
//! - Provide a typed live handle (`Todo`), a detached record (`TodoRecord`)
//!   and the untyped input shape (`TodoDraft`).
//!
//! # Invariants
//! - `key` is the primary key and never changes after creation.
//! - `creation_date` is Unix epoch milliseconds.
//! - `completed` defaults to `false`.

use crate::db::value::{Fields, Value};
use crate::db::{StoreError, StoreResult};
use crate::schema::{DefaultValue, ModelSchema, Property};
use crate::store::ManagedObject;
use serde::{Deserialize, Serialize};

/// Collection name of to-do items.
pub const TODO_MODEL: &str = "Todo";

pub static TODO_SCHEMA: ModelSchema = ModelSchema::new(
    TODO_MODEL,
    &[
        Property::string("key"),
        Property::string("title"),
        Property::string("description").optional(),
        Property::date("creation_date"),
        Property::bool("completed")
            .optional()
            .with_default(DefaultValue::Bool(false)),
    ],
)
.with_primary_key("key");

/// Default schema set of the to-do store.
pub static TODO_MODELS: &[&ModelSchema] = &[&TODO_SCHEMA];

/// Subset selector for list views.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TodoFilter {
    #[default]
    All,
    Complete,
    Incomplete,
}

/// Caller input for `create_or_update`; every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TodoDraft {
    #[serde(alias = "UUID")]
    pub key: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    /// Unix epoch milliseconds.
    #[serde(alias = "creationDate")]
    pub creation_date: Option<i64>,
    pub completed: Option<bool>,
}

impl TodoDraft {
    pub fn with_key(key: impl Into<String>) -> Self {
        Self {
            key: Some(key.into()),
            ..Self::default()
        }
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn completed(mut self, completed: bool) -> Self {
        self.completed = Some(completed);
        self
    }

    /// Parses loosely typed input (e.g. from a UI bridge).
    ///
    /// `null` counts as absent and unknown fields are ignored.
    ///
    /// # Errors
    /// - `InvalidArgument` when `input` is not an object.
    /// - `TypeMismatch` naming the first wrongly typed field.
    pub fn from_json(input: &serde_json::Value) -> StoreResult<Self> {
        let object = match input {
            serde_json::Value::Object(object) => object,
            serde_json::Value::Null => return Ok(Self::default()),
            other => {
                return Err(StoreError::InvalidArgument(format!(
                    "todo fields must be an object, got {}",
                    json_type(other)
                )));
            }
        };

        let field = |names: &[&str]| {
            names
                .iter()
                .find_map(|name| object.get(*name))
                .filter(|value| !value.is_null())
        };

        let mut draft = Self::default();
        if let Some(value) = field(&["key", "UUID"]) {
            draft.key = Some(expect_string("key", value)?);
        }
        if let Some(value) = field(&["title"]) {
            draft.title = Some(expect_string("title", value)?);
        }
        if let Some(value) = field(&["description"]) {
            draft.description = Some(expect_string("description", value)?);
        }
        if let Some(value) = field(&["creation_date", "creationDate"]) {
            draft.creation_date = Some(value.as_i64().ok_or_else(|| {
                mismatch("creation_date", "date", value)
            })?);
        }
        if let Some(value) = field(&["completed"]) {
            draft.completed = Some(value.as_bool().ok_or_else(|| {
                mismatch("completed", "bool", value)
            })?);
        }
        Ok(draft)
    }
}

/// Detached copy of one to-do item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TodoRecord {
    pub key: String,
    pub title: String,
    pub description: Option<String>,
    /// Unix epoch milliseconds.
    pub creation_date: i64,
    pub completed: bool,
}

impl TodoRecord {
    pub(crate) fn into_fields(self) -> Fields {
        let mut fields = Fields::new();
        fields.insert("key".to_string(), Value::String(self.key));
        fields.insert("title".to_string(), Value::String(self.title));
        if let Some(description) = self.description {
            fields.insert("description".to_string(), Value::String(description));
        }
        fields.insert("creation_date".to_string(), Value::Date(self.creation_date));
        fields.insert("completed".to_string(), Value::Bool(self.completed));
        fields
    }
}

/// Typed live handle over one stored to-do item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Todo<'db> {
    object: ManagedObject<'db>,
}

impl<'db> Todo<'db> {
    /// Wraps a managed object of the `Todo` model.
    pub fn from_object(object: ManagedObject<'db>) -> StoreResult<Self> {
        if object.model_name() != TODO_MODEL {
            return Err(StoreError::InvalidArgument(format!(
                "expected a {TODO_MODEL} object, got {}",
                object.model_name()
            )));
        }
        Ok(Self { object })
    }

    pub fn object(&self) -> ManagedObject<'db> {
        self.object
    }

    pub fn key(&self) -> StoreResult<String> {
        self.object.get_string("key")
    }

    pub fn title(&self) -> StoreResult<String> {
        self.object.get_string("title")
    }

    pub fn description(&self) -> StoreResult<Option<String>> {
        self.object.get_optional_string("description")
    }

    pub fn creation_date(&self) -> StoreResult<i64> {
        self.object.get_date("creation_date")
    }

    /// Stored `NULL` reads as not completed.
    pub fn completed(&self) -> StoreResult<bool> {
        match self.object.get("completed")? {
            Value::Bool(flag) => Ok(flag),
            _ => Ok(false),
        }
    }

    pub fn is_valid(&self) -> bool {
        self.object.is_valid()
    }

    /// Reads every field into a detached record.
    pub fn snapshot(&self) -> StoreResult<TodoRecord> {
        Ok(TodoRecord {
            key: self.key()?,
            title: self.title()?,
            description: self.description()?,
            creation_date: self.creation_date()?,
            completed: self.completed()?,
        })
    }
}

fn expect_string(property: &'static str, value: &serde_json::Value) -> StoreResult<String> {
    value
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| mismatch(property, "string", value))
}

fn mismatch(property: &'static str, expected: &str, found: &serde_json::Value) -> StoreError {
    StoreError::TypeMismatch {
        model: TODO_MODEL,
        property,
        expected: expected.to_string(),
        found: json_type(found),
    }
}

fn json_type(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "bool",
        serde_json::Value::Number(number) if number.is_f64() => "double",
        serde_json::Value::Number(_) => "int",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "list",
        serde_json::Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::{TodoDraft, TODO_SCHEMA};
    use crate::db::StoreError;
    use serde_json::json;

    #[test]
    fn schema_declares_key_as_primary_key() {
        assert_eq!(TODO_SCHEMA.primary_key, Some("key"));
        assert!(TODO_SCHEMA.property("description").unwrap().optional);
        assert!(!TODO_SCHEMA.property("completed").unwrap().is_required());
    }

    #[test]
    fn from_json_accepts_camel_case_aliases_and_nulls() {
        let draft = TodoDraft::from_json(&json!({
            "UUID": "abcd-efgh-ijkl-mnop",
            "title": "Buy milk",
            "description": null,
            "creationDate": 1_700_000_000_000_i64,
            "unknown": [1, 2],
        }))
        .unwrap();
        assert_eq!(draft.key.as_deref(), Some("abcd-efgh-ijkl-mnop"));
        assert_eq!(draft.title.as_deref(), Some("Buy milk"));
        assert_eq!(draft.description, None);
        assert_eq!(draft.creation_date, Some(1_700_000_000_000));
        assert_eq!(draft.completed, None);

        assert_eq!(TodoDraft::from_json(&json!(null)).unwrap(), TodoDraft::default());
    }

    #[test]
    fn from_json_reports_type_mismatch() {
        let err = TodoDraft::from_json(&json!({ "title": 42 })).unwrap_err();
        assert!(matches!(
            err,
            StoreError::TypeMismatch { model: "Todo", property: "title", found: "int", .. }
        ));

        let err = TodoDraft::from_json(&json!({ "key": true })).unwrap_err();
        assert!(matches!(err, StoreError::TypeMismatch { property: "key", .. }));

        let err = TodoDraft::from_json(&json!("nope")).unwrap_err();
        assert!(matches!(err, StoreError::InvalidArgument(_)));
    }
}
