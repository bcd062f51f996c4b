//! Generic transactional object store.
//!
//! # Responsibility
//! - Own one engine connection and its transaction state.
//! - Run every mutation inside an explicit all-or-nothing transaction.
//! - Provide schema-aware cascade deletion over the declared child graph.
//!
//! # Invariants
//! - Transaction state is exactly `Idle` or `InTransaction`; begin, commit
//!   and cancel are idempotent in the state they would leave.
//! - Only the outermost `write` opens, commits or cancels a transaction.
//! - A failed outermost `write` leaves the store as it was before the call.
//! - Change listeners fire after commit only, once per touched collection.
//! - Object ids are never reused within one store instance, even across a
//!   cancelled transaction, so a rolled-back handle cannot alias a later
//!   object.
//!
//! # Concurrency
//! - Single-threaded: the store is `!Sync` and handles borrow it. Nested
//!   `write` calls from the same call stack are supported; concurrent use
//!   needs an external owner per thread.

mod listeners;
pub mod object;
pub mod results;

pub use listeners::SubscriptionId;
pub use object::ManagedObject;
pub use results::{Predicate, Results};

use crate::db::ddl::OBJECT_ID_COLUMN;
use crate::db::value::{check_value, decode, encode, implicit_value, Fields, ObjectId, Value};
use crate::db::{open_db, quote_ident, StoreConfig, StoreError, StoreResult};
use crate::schema::registry::SchemaRegistry;
use crate::schema::{ModelSchema, Property, PropertyKind};
use listeners::ListenerRegistry;
use log::{debug, error, info, warn};
use rusqlite::types::Value as SqlValue;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::rc::Rc;

/// Transactional wrapper over one embedded database connection.
pub struct ObjectStore {
    conn: Connection,
    registry: SchemaRegistry,
    path: Option<PathBuf>,
    schema_version: u32,
    touched: RefCell<BTreeSet<&'static str>>,
    // Highest id handed out per model; survives ROLLBACK.
    id_floor: RefCell<BTreeMap<&'static str, ObjectId>>,
    listeners: ListenerRegistry,
}

impl ObjectStore {
    /// Opens or creates the store described by `config`.
    ///
    /// # Errors
    /// - `Initialization` when `config.schema` is unset or invalid.
    /// - `UnsupportedSchemaVersion` / `MigrationRequired` from schema sync.
    pub fn open(config: StoreConfig) -> StoreResult<Self> {
        let StoreConfig {
            schema,
            path,
            schema_version,
            migration,
        } = config;
        let schema = schema.ok_or_else(|| {
            StoreError::Initialization(
                "a model schema is required; pass an empty schema for a store without models"
                    .to_string(),
            )
        })?;
        let registry = SchemaRegistry::new(&schema)?;
        let conn = open_db(path.as_deref(), &registry, schema_version, migration)?;

        Ok(Self {
            conn,
            registry,
            path,
            schema_version,
            touched: RefCell::new(BTreeSet::new()),
            id_floor: RefCell::new(BTreeMap::new()),
            listeners: ListenerRegistry::default(),
        })
    }

    /// Backing file location; `None` for in-memory stores.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn schema_version(&self) -> u32 {
        self.schema_version
    }

    pub fn schema(&self) -> &SchemaRegistry {
        &self.registry
    }

    pub fn model_names(&self) -> Vec<&'static str> {
        self.registry.model_names()
    }

    pub fn is_in_transaction(&self) -> bool {
        !self.conn.is_autocommit()
    }

    /// Opens a transaction; no-op when one is already open.
    pub fn begin_transaction(&self) -> StoreResult<()> {
        if self.is_in_transaction() {
            return Ok(());
        }
        self.conn.execute_batch("BEGIN IMMEDIATE;")?;
        debug!("event=tx_begin module=store status=ok");
        Ok(())
    }

    /// Discards every mutation since `begin_transaction`; no-op when idle.
    pub fn cancel_transaction(&self) -> StoreResult<()> {
        if !self.is_in_transaction() {
            return Ok(());
        }
        self.conn.execute_batch("ROLLBACK;")?;
        self.touched.borrow_mut().clear();
        debug!("event=tx_cancel module=store status=ok");
        Ok(())
    }

    /// Persists every mutation since `begin_transaction`; no-op when idle.
    ///
    /// Listeners of touched collections run after the commit succeeded.
    pub fn commit_transaction(&self) -> StoreResult<()> {
        if !self.is_in_transaction() {
            return Ok(());
        }
        self.conn.execute_batch("COMMIT;")?;
        let touched = std::mem::take(&mut *self.touched.borrow_mut());
        let notified = self.listeners.notify(&touched);
        debug!(
            "event=tx_commit module=store status=ok collections={} listeners={}",
            touched.len(),
            notified
        );
        Ok(())
    }

    /// Runs `unit_of_work` inside a transaction and returns its value.
    ///
    /// Nested calls join the already open transaction and leave its boundary
    /// to the outermost caller. When this call opened the transaction, a
    /// failing (or panicking) unit of work cancels it.
    ///
    /// # Errors
    /// - `Transaction(cause)` when `unit_of_work` fails; `cause` is the
    ///   original error (see `StoreError::root_cause`).
    /// - Engine errors from begin/commit, unwrapped.
    pub fn write<T, F>(&self, unit_of_work: F) -> StoreResult<T>
    where
        F: FnOnce() -> StoreResult<T>,
    {
        if self.is_in_transaction() {
            return unit_of_work().map_err(StoreError::into_transaction);
        }

        let guard = WriteGuard::begin(self)?;
        match unit_of_work() {
            Ok(value) => {
                guard.commit()?;
                Ok(value)
            }
            Err(err) => {
                drop(guard);
                warn!(
                    "event=write_failed module=store status=cancelled error={}",
                    err.root_cause()
                );
                Err(err.into_transaction())
            }
        }
    }

    /// Registers `callback` for commits that changed `model`.
    pub fn subscribe(&self, model: &str, callback: impl Fn() + 'static) -> StoreResult<SubscriptionId> {
        let schema = self.registry.require(model)?;
        Ok(self.listeners.add(schema.name, Rc::new(callback)))
    }

    /// Removes one subscription; returns whether it was registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.listeners.remove(id)
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    /// Live result set over every object of `model`.
    pub fn objects(&self, model: &str) -> StoreResult<Results<'_>> {
        let schema = self.registry.require(model)?;
        Ok(Results::new(self, schema))
    }

    /// Looks up one object by declared primary key.
    ///
    /// # Errors
    /// - `InvalidArgument` when `model` has no primary key.
    /// - `TypeMismatch` when `key` does not match the key type.
    pub fn object_for_primary_key(
        &self,
        model: &str,
        key: impl Into<Value>,
    ) -> StoreResult<Option<ManagedObject<'_>>> {
        let schema = self.registry.require(model)?;
        let key = key.into();
        let id = self.find_by_primary_key(schema, &key)?;
        Ok(id.map(|id| ManagedObject::new(self, schema, id)))
    }

    /// Looks up one object by its internal id.
    pub fn object(&self, model: &str, id: ObjectId) -> StoreResult<Option<ManagedObject<'_>>> {
        let schema = self.registry.require(model)?;
        if self.object_exists(schema, id)? {
            Ok(Some(ManagedObject::new(self, schema, id)))
        } else {
            Ok(None)
        }
    }

    /// Creates one object, or updates it in place when `upsert` is set and
    /// the primary key already exists. Unknown field names are ignored.
    ///
    /// # Errors
    /// - `NotInTransaction` outside of a write.
    /// - `TypeMismatch` for wrongly typed fields.
    /// - `InvalidArgument` for missing required fields or dangling links.
    /// - `DuplicatePrimaryKey` when the key exists and `upsert` is false.
    pub fn create(&self, model: &str, fields: Fields, upsert: bool) -> StoreResult<ManagedObject<'_>> {
        let schema = self.registry.require(model)?;
        self.ensure_writable()?;

        let mut supplied: Vec<(&'static Property, Value)> = Vec::new();
        for (name, value) in fields {
            match schema.property(&name) {
                Some(property) => {
                    check_value(schema, property, &value)?;
                    self.check_links(schema, property, &value)?;
                    supplied.push((property, value));
                }
                None => debug!(
                    "event=create_ignored_field module=store model={} field={}",
                    schema.name, name
                ),
            }
        }

        let existing = match schema.primary_key_property() {
            Some(key_property) => {
                let key = supplied
                    .iter()
                    .find(|(property, _)| property.name == key_property.name)
                    .map(|(_, value)| value.clone())
                    .ok_or_else(|| {
                        StoreError::InvalidArgument(format!(
                            "missing value for primary key `{}.{}`",
                            schema.name, key_property.name
                        ))
                    })?;
                self.find_by_primary_key(schema, &key)?
                    .map(|id| (id, key))
            }
            None => None,
        };

        let id = match existing {
            Some((id, _)) if upsert => {
                self.update_row(schema, id, &supplied)?;
                id
            }
            Some((_, key)) => {
                return Err(StoreError::DuplicatePrimaryKey {
                    model: schema.name,
                    key: display_key(&key),
                });
            }
            None => self.insert_row(schema, supplied)?,
        };

        self.touched.borrow_mut().insert(schema.name);
        Ok(ManagedObject::new(self, schema, id))
    }

    /// Deletes one object; no-op when it is already gone.
    pub fn delete(&self, object: &ManagedObject<'_>) -> StoreResult<()> {
        self.ensure_writable()?;
        let schema = object.schema();
        let changed = self.conn.execute(
            &format!(
                "DELETE FROM {} WHERE {} = ?1;",
                quote_ident(schema.name),
                quote_ident(OBJECT_ID_COLUMN)
            ),
            [object.id()],
        )?;
        if changed > 0 {
            self.touched.borrow_mut().insert(schema.name);
            self.unlink(schema, Some(object.id()))?;
        }
        Ok(())
    }

    /// Deletes every object currently matched by `results`.
    pub fn delete_results(&self, results: &Results<'_>) -> StoreResult<usize> {
        self.ensure_writable()?;
        let objects = results.objects()?;
        for object in &objects {
            self.delete(object)?;
        }
        Ok(objects.len())
    }

    /// Deletes every object of every model in the schema.
    pub fn empty_database(&self) -> StoreResult<()> {
        self.write(|| {
            for &schema in self.registry.models() {
                self.delete_collection(schema)?;
            }
            Ok(())
        })
    }

    /// Deletes the named collections and, first, their declared children.
    ///
    /// Runs as one transaction. Each collection is emptied at most once per
    /// call. Names outside the schema are skipped with a warning.
    pub fn delete_all(&self, models: &[&str]) -> StoreResult<()> {
        if models.is_empty() {
            return Ok(());
        }

        self.write(|| {
            let mut emptied = BTreeSet::new();
            for &name in models {
                let Some(order) = self.registry.cascade_order(name) else {
                    warn!(
                        "event=delete_all_skip module=store status=skipped model={} reason=unknown_model",
                        name
                    );
                    continue;
                };
                for &schema in order {
                    if emptied.insert(schema.name) {
                        let removed = self.delete_collection(schema)?;
                        debug!(
                            "event=cascade_delete module=store root={} model={} removed={}",
                            name, schema.name, removed
                        );
                    }
                }
            }
            Ok(())
        })
    }

    /// Deletes every collection not named in `keep`.
    ///
    /// An empty `keep` empties the whole database. A kept model that is a
    /// declared child of a deleted one is still emptied by the cascade.
    pub fn delete_all_except(&self, keep: &[&str]) -> StoreResult<()> {
        if keep.is_empty() {
            return self.empty_database();
        }

        let targets: Vec<&str> = self
            .registry
            .model_names()
            .into_iter()
            .filter(|name| !keep.contains(name))
            .collect();
        info!(
            "event=delete_all_except module=store kept={} deleting={}",
            keep.len(),
            targets.len()
        );
        self.delete_all(&targets)
    }

    pub(crate) fn read_property(
        &self,
        schema: &'static ModelSchema,
        id: ObjectId,
        property: &'static Property,
    ) -> StoreResult<Value> {
        let raw: Option<SqlValue> = self
            .conn
            .query_row(
                &format!(
                    "SELECT {} FROM {} WHERE {} = ?1;",
                    quote_ident(property.name),
                    quote_ident(schema.name),
                    quote_ident(OBJECT_ID_COLUMN)
                ),
                [id],
                |row| row.get(0),
            )
            .optional()?;
        match raw {
            Some(raw) => decode(schema, property, raw),
            None => Err(StoreError::ObjectInvalidated { model: schema.name }),
        }
    }

    pub(crate) fn write_property(
        &self,
        schema: &'static ModelSchema,
        id: ObjectId,
        property: &'static Property,
        value: Value,
    ) -> StoreResult<()> {
        self.ensure_writable()?;
        if schema.primary_key == Some(property.name) {
            return Err(StoreError::InvalidArgument(format!(
                "primary key `{}.{}` cannot be changed",
                schema.name, property.name
            )));
        }
        check_value(schema, property, &value)?;
        self.check_links(schema, property, &value)?;

        let changed = self.conn.execute(
            &format!(
                "UPDATE {} SET {} = ?1 WHERE {} = ?2;",
                quote_ident(schema.name),
                quote_ident(property.name),
                quote_ident(OBJECT_ID_COLUMN)
            ),
            params![encode(property, &value)?, id],
        )?;
        if changed == 0 {
            return Err(StoreError::ObjectInvalidated { model: schema.name });
        }
        self.touched.borrow_mut().insert(schema.name);
        Ok(())
    }

    pub(crate) fn object_exists(&self, schema: &ModelSchema, id: ObjectId) -> StoreResult<bool> {
        let exists: i64 = self.conn.query_row(
            &format!(
                "SELECT EXISTS(SELECT 1 FROM {} WHERE {} = ?1);",
                quote_ident(schema.name),
                quote_ident(OBJECT_ID_COLUMN)
            ),
            [id],
            |row| row.get(0),
        )?;
        Ok(exists == 1)
    }

    pub(crate) fn connection(&self) -> &Connection {
        &self.conn
    }

    fn ensure_writable(&self) -> StoreResult<()> {
        if self.is_in_transaction() {
            Ok(())
        } else {
            Err(StoreError::NotInTransaction)
        }
    }

    fn find_by_primary_key(&self, schema: &'static ModelSchema, key: &Value) -> StoreResult<Option<ObjectId>> {
        let key_property = schema.primary_key_property().ok_or_else(|| {
            StoreError::InvalidArgument(format!("model `{}` has no primary key", schema.name))
        })?;
        check_value(schema, key_property, key)?;

        let id = self
            .conn
            .query_row(
                &format!(
                    "SELECT {} FROM {} WHERE {} = ?1;",
                    quote_ident(OBJECT_ID_COLUMN),
                    quote_ident(schema.name),
                    quote_ident(key_property.name)
                ),
                [encode(key_property, key)?],
                |row| row.get::<_, ObjectId>(0),
            )
            .optional()?;
        Ok(id)
    }

    fn check_links(&self, schema: &ModelSchema, property: &Property, value: &Value) -> StoreResult<()> {
        let Some(target) = property.kind.target_model() else {
            return Ok(());
        };
        let target_schema = self.registry.require(target)?;
        let ids: &[ObjectId] = match value {
            Value::Object(id) => std::slice::from_ref(id),
            Value::List(ids) => ids,
            _ => return Ok(()),
        };
        for &id in ids {
            if !self.object_exists(target_schema, id)? {
                return Err(StoreError::InvalidArgument(format!(
                    "{}.{} references missing {} object {}",
                    schema.name, property.name, target, id
                )));
            }
        }
        Ok(())
    }

    fn insert_row(
        &self,
        schema: &'static ModelSchema,
        mut supplied: Vec<(&'static Property, Value)>,
    ) -> StoreResult<ObjectId> {
        for property in schema.properties {
            if supplied.iter().any(|(known, _)| known.name == property.name) {
                continue;
            }
            match implicit_value(property) {
                Some(value) => supplied.push((property, value)),
                None => {
                    return Err(StoreError::InvalidArgument(format!(
                        "missing value for property `{}.{}`",
                        schema.name, property.name
                    )));
                }
            }
        }

        let id = self.next_object_id(schema)?;
        let mut columns = Vec::with_capacity(supplied.len() + 1);
        let mut values = Vec::with_capacity(supplied.len() + 1);
        columns.push(quote_ident(OBJECT_ID_COLUMN));
        values.push(SqlValue::Integer(id));
        for (property, value) in &supplied {
            columns.push(quote_ident(property.name));
            values.push(encode(property, value)?);
        }

        let placeholders = (1..=columns.len())
            .map(|index| format!("?{index}"))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({placeholders});",
            quote_ident(schema.name),
            columns.join(", ")
        );
        self.conn.execute(&sql, params_from_iter(values))?;
        self.id_floor.borrow_mut().insert(schema.name, id);
        Ok(id)
    }

    /// Next id for `schema`: above every stored id, the persisted sequence
    /// and every id this instance handed out before a rollback.
    fn next_object_id(&self, schema: &'static ModelSchema) -> StoreResult<ObjectId> {
        let stored: ObjectId = self.conn.query_row(
            &format!(
                "SELECT MAX(
                    COALESCE((SELECT seq FROM sqlite_sequence WHERE name = ?1), 0),
                    COALESCE((SELECT MAX({}) FROM {}), 0)
                 );",
                quote_ident(OBJECT_ID_COLUMN),
                quote_ident(schema.name)
            ),
            [schema.name],
            |row| row.get(0),
        )?;
        let floor = self
            .id_floor
            .borrow()
            .get(schema.name)
            .copied()
            .unwrap_or(0);
        Ok(stored.max(floor) + 1)
    }

    fn update_row(
        &self,
        schema: &'static ModelSchema,
        id: ObjectId,
        supplied: &[(&'static Property, Value)],
    ) -> StoreResult<()> {
        let mut assignments = Vec::new();
        let mut values = Vec::new();
        for (property, value) in supplied {
            if schema.primary_key == Some(property.name) {
                continue;
            }
            values.push(encode(property, value)?);
            assignments.push(format!("{} = ?{}", quote_ident(property.name), values.len()));
        }
        if assignments.is_empty() {
            return Ok(());
        }

        values.push(SqlValue::Integer(id));
        let sql = format!(
            "UPDATE {} SET {} WHERE {} = ?{};",
            quote_ident(schema.name),
            assignments.join(", "),
            quote_ident(OBJECT_ID_COLUMN),
            values.len()
        );
        self.conn.execute(&sql, params_from_iter(values))?;
        Ok(())
    }

    fn delete_collection(&self, schema: &'static ModelSchema) -> StoreResult<usize> {
        self.ensure_writable()?;
        let removed = self
            .conn
            .execute(&format!("DELETE FROM {};", quote_ident(schema.name)), [])?;
        if removed > 0 {
            self.touched.borrow_mut().insert(schema.name);
            self.unlink(schema, None)?;
        }
        Ok(removed)
    }

    /// Clears references to deleted `target` objects (`None` = all of them).
    fn unlink(&self, target: &ModelSchema, id: Option<ObjectId>) -> StoreResult<()> {
        for model in self.registry.models() {
            for property in model.properties {
                let changed = match (property.kind, id) {
                    (PropertyKind::Object(name), Some(id)) if name == target.name => {
                        self.conn.execute(
                            &format!(
                                "UPDATE {table} SET {column} = NULL WHERE {column} = ?1;",
                                table = quote_ident(model.name),
                                column = quote_ident(property.name)
                            ),
                            [id],
                        )?
                    }
                    (PropertyKind::Object(name), None) if name == target.name => {
                        self.conn.execute(
                            &format!(
                                "UPDATE {table} SET {column} = NULL WHERE {column} IS NOT NULL;",
                                table = quote_ident(model.name),
                                column = quote_ident(property.name)
                            ),
                            [],
                        )?
                    }
                    (PropertyKind::List(name), Some(id)) if name == target.name => {
                        self.conn.execute(
                            &format!(
                                "UPDATE {table}
                                 SET {column} = (
                                    SELECT json_group_array(value)
                                    FROM json_each({table}.{column})
                                    WHERE value != ?1
                                 )
                                 WHERE EXISTS (
                                    SELECT 1 FROM json_each({table}.{column}) WHERE value = ?1
                                 );",
                                table = quote_ident(model.name),
                                column = quote_ident(property.name)
                            ),
                            [id],
                        )?
                    }
                    (PropertyKind::List(name), None) if name == target.name => {
                        self.conn.execute(
                            &format!(
                                "UPDATE {table} SET {column} = '[]' WHERE {column} != '[]';",
                                table = quote_ident(model.name),
                                column = quote_ident(property.name)
                            ),
                            [],
                        )?
                    }
                    _ => 0,
                };
                if changed > 0 {
                    self.touched.borrow_mut().insert(model.name);
                }
            }
        }
        Ok(())
    }
}

/// Cancels the transaction it opened unless committed first.
struct WriteGuard<'s> {
    store: &'s ObjectStore,
    committed: bool,
}

impl<'s> WriteGuard<'s> {
    fn begin(store: &'s ObjectStore) -> StoreResult<Self> {
        store.begin_transaction()?;
        Ok(Self {
            store,
            committed: false,
        })
    }

    fn commit(mut self) -> StoreResult<()> {
        self.store.commit_transaction()?;
        self.committed = true;
        Ok(())
    }
}

impl Drop for WriteGuard<'_> {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        if let Err(err) = self.store.cancel_transaction() {
            error!(
                "event=tx_cancel module=store status=error error_code=rollback_failed error={}",
                err
            );
        }
    }
}

fn display_key(key: &Value) -> String {
    match key {
        Value::String(text) => text.clone(),
        Value::Int(number) => number.to_string(),
        other => format!("{other:?}"),
    }
}
