//! To-do store on top of `ObjectStore`.
//!
//! # Responsibility
//! - Open the store with the to-do schema, version 0 and the
//!   recreate-on-incompatible-schema policy.
//! - Provide key-based read/upsert/delete/complete operations.
//!
//! # Invariants
//! - `create_or_update` always writes `title`, `completed` and
//!   `creation_date`, filling `"Untitled"`, `false` and now when absent.
//! - Delete/complete on a missing key is a no-op reported as `false`.
//! - Each mutating call is exactly one committed transaction.
//!
//! # See also
//! - `repo::key_gen` for generated keys.

use crate::db::{MigrationPolicy, StoreConfig, StoreError, StoreResult};
use crate::model::todo::{Todo, TodoDraft, TodoFilter, TodoRecord, TODO_MODEL};
use crate::repo::key_gen::generate_key;
use crate::schema::ModelSchema;
use crate::store::{ObjectStore, Predicate, Results, SubscriptionId};
use log::debug;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

/// Schema version the to-do store is opened with.
pub const TODO_SCHEMA_VERSION: u32 = 0;

const UNTITLED: &str = "Untitled";

/// Explicitly owned to-do store instance.
pub struct TodoDatabase {
    store: ObjectStore,
}

impl TodoDatabase {
    /// Opens (or creates) a file-backed to-do store.
    ///
    /// # Errors
    /// - `Initialization` when `schema` lacks the `Todo` model.
    pub fn open(schema: &[&'static ModelSchema], path: impl AsRef<Path>) -> StoreResult<Self> {
        Self::with_config(base_config(schema).path(path))
    }

    /// Opens a private in-memory to-do store.
    pub fn open_in_memory(schema: &[&'static ModelSchema]) -> StoreResult<Self> {
        Self::with_config(base_config(schema))
    }

    fn with_config(config: StoreConfig) -> StoreResult<Self> {
        let has_todo = config
            .schema
            .as_deref()
            .is_some_and(|models| models.iter().any(|model| model.name == TODO_MODEL));
        if !has_todo {
            return Err(StoreError::Initialization(format!(
                "schema must declare the `{TODO_MODEL}` model"
            )));
        }
        Ok(Self {
            store: ObjectStore::open(config)?,
        })
    }

    /// Generic store operations (cascade deletes, transactions, ...).
    pub fn store(&self) -> &ObjectStore {
        &self.store
    }

    /// Live result set over every to-do item.
    pub fn get_all(&self) -> StoreResult<Results<'_>> {
        self.store.objects(TODO_MODEL)
    }

    /// Looks up one item; `None` and `""` return `Ok(None)`.
    pub fn get_by_key(&self, key: Option<&str>) -> StoreResult<Option<Todo<'_>>> {
        let Some(key) = key.filter(|key| !key.is_empty()) else {
            return Ok(None);
        };
        self.store
            .object_for_primary_key(TODO_MODEL, key)?
            .map(Todo::from_object)
            .transpose()
    }

    pub fn get_filtered(&self, filter: TodoFilter) -> StoreResult<Results<'_>> {
        let all = self.get_all()?;
        match filter {
            TodoFilter::All => Ok(all),
            TodoFilter::Complete => all.filtered(&Predicate::equals("completed", true)),
            TodoFilter::Incomplete => all.filtered(&Predicate::equals("completed", false)),
        }
    }

    pub fn get_complete(&self) -> StoreResult<Results<'_>> {
        self.get_filtered(TodoFilter::Complete)
    }

    pub fn get_incomplete(&self) -> StoreResult<Results<'_>> {
        self.get_filtered(TodoFilter::Incomplete)
    }

    /// Detached records for list views, in creation order.
    pub fn list(&self, filter: TodoFilter) -> StoreResult<Vec<TodoRecord>> {
        self.get_filtered(filter)?
            .objects()?
            .into_iter()
            .map(|object| Todo::from_object(object)?.snapshot())
            .collect()
    }

    /// Creates an item, or overwrites the item with the same key in place.
    ///
    /// Absent or empty `key` gets a generated key; other handles to an
    /// existing item observe the new values immediately.
    pub fn create_or_update(&self, draft: TodoDraft) -> StoreResult<Todo<'_>> {
        let record = TodoRecord {
            key: draft
                .key
                .filter(|key| !key.is_empty())
                .unwrap_or_else(generate_key),
            title: draft
                .title
                .filter(|title| !title.is_empty())
                .unwrap_or_else(|| UNTITLED.to_string()),
            description: draft.description,
            creation_date: draft.creation_date.unwrap_or_else(now_epoch_ms),
            completed: draft.completed.unwrap_or(false),
        };

        let object = self
            .store
            .write(|| self.store.create(TODO_MODEL, record.into_fields(), true))?;
        debug!(
            "event=todo_upsert module=repo status=ok object_id={}",
            object.id()
        );
        Todo::from_object(object)
    }

    /// Same as `create_or_update` for loosely typed input.
    pub fn create_or_update_json(&self, fields: &serde_json::Value) -> StoreResult<Todo<'_>> {
        self.create_or_update(TodoDraft::from_json(fields)?)
    }

    /// Deletes the item with `key`; returns whether one existed.
    pub fn delete_by_key(&self, key: &str) -> StoreResult<bool> {
        let Some(todo) = self.get_by_key(Some(key))? else {
            return Ok(false);
        };
        self.store.write(|| self.store.delete(&todo.object()))?;
        Ok(true)
    }

    /// Sets `completed = true` on the item with `key`; returns whether one
    /// existed.
    pub fn mark_complete_by_key(&self, key: &str) -> StoreResult<bool> {
        let Some(todo) = self.get_by_key(Some(key))? else {
            return Ok(false);
        };
        self.store.write(|| todo.object().set("completed", true))?;
        Ok(true)
    }

    /// Registers `callback` for commits that changed to-do items.
    pub fn subscribe(&self, callback: impl Fn() + 'static) -> StoreResult<SubscriptionId> {
        self.store.subscribe(TODO_MODEL, callback)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.store.unsubscribe(id)
    }
}

fn base_config(schema: &[&'static ModelSchema]) -> StoreConfig {
    StoreConfig::new()
        .schema(schema)
        .schema_version(TODO_SCHEMA_VERSION)
        .migration(MigrationPolicy::DeleteIfMigrationNeeded)
}

fn now_epoch_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX))
        .unwrap_or_default()
}
