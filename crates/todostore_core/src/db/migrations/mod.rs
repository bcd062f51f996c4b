//! Schema sync between declared models and stored tables.
//!
//! # Responsibility
//! - Create model tables for fresh databases.
//! - Detect schema changes via stored per-model definitions.
//! - Apply the configured `MigrationPolicy` atomically.
//!
//! # Invariants
//! - Applied schema version is mirrored to `PRAGMA user_version`.
//! - A stored version newer than the declared one is never opened.
//! - All reshaping happens in a single immediate transaction.

use crate::db::ddl::{create_table_sql, OBJECT_ID_COLUMN};
use crate::db::{quote_ident, MigrationPolicy, StoreError, StoreResult};
use crate::schema::registry::SchemaRegistry;
use crate::schema::ModelSchema;
use rusqlite::{params, Connection, TransactionBehavior};
use std::collections::BTreeMap;

/// Metadata table holding one JSON definition per stored model.
pub const SCHEMA_TABLE: &str = "__model_schemas";

const MIGRATING_PREFIX: &str = "__migrating_";

/// Outcome of `sync_schema`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaSync {
    /// Fresh database; every model table was created.
    Created,
    /// Stored schema and version match the declared ones.
    Unchanged,
    /// Same definitions, higher declared version.
    Upgraded,
    /// Stored tables were dropped and recreated.
    Recreated,
    /// Tables were reshaped and the migration hook ran.
    Migrated,
}

impl SchemaSync {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Unchanged => "unchanged",
            Self::Upgraded => "upgraded",
            Self::Recreated => "recreated",
            Self::Migrated => "migrated",
        }
    }
}

/// Returns the stored schema version of an open connection.
pub fn stored_version(conn: &Connection) -> StoreResult<u32> {
    let version = conn.query_row("PRAGMA user_version;", [], |row| row.get::<_, u32>(0))?;
    Ok(version)
}

/// Brings stored tables in line with `registry` at `version`.
///
/// # Errors
/// - `UnsupportedSchemaVersion` when the stored version is newer.
/// - `MigrationRequired` when definitions differ and `policy` forbids it.
pub fn sync_schema(
    conn: &mut Connection,
    registry: &SchemaRegistry,
    version: u32,
    policy: MigrationPolicy,
) -> StoreResult<SchemaSync> {
    let declared = declared_definitions(registry)?;
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let current_version = stored_version(&tx)?;
    if current_version > version {
        return Err(StoreError::UnsupportedSchemaVersion {
            db_version: current_version,
            latest_supported: version,
        });
    }

    let outcome = if !table_exists(&tx, SCHEMA_TABLE)? {
        tx.execute_batch(&format!(
            "CREATE TABLE {} (
                name TEXT PRIMARY KEY NOT NULL,
                definition TEXT NOT NULL
            );",
            quote_ident(SCHEMA_TABLE)
        ))?;
        create_tables(&tx, registry.models())?;
        SchemaSync::Created
    } else {
        let stored = stored_definitions(&tx)?;
        if stored == declared {
            if current_version == version {
                SchemaSync::Unchanged
            } else {
                if let MigrationPolicy::Migrate(hook) = policy {
                    hook(&tx, current_version, version)?;
                }
                SchemaSync::Upgraded
            }
        } else {
            match policy {
                MigrationPolicy::Reject => {
                    return Err(StoreError::MigrationRequired(describe_changes(
                        &stored, &declared,
                    )));
                }
                MigrationPolicy::DeleteIfMigrationNeeded => {
                    for name in stored.keys() {
                        tx.execute_batch(&format!("DROP TABLE IF EXISTS {};", quote_ident(name)))?;
                    }
                    create_tables(&tx, registry.models())?;
                    SchemaSync::Recreated
                }
                MigrationPolicy::Migrate(hook) => {
                    if current_version == version {
                        return Err(StoreError::MigrationRequired(format!(
                            "{}; bump the schema version past {version}",
                            describe_changes(&stored, &declared)
                        )));
                    }
                    reshape_tables(&tx, registry, &stored, &declared)?;
                    hook(&tx, current_version, version)?;
                    SchemaSync::Migrated
                }
            }
        }
    };

    write_definitions(&tx, &declared)?;
    tx.execute_batch(&format!("PRAGMA user_version = {version};"))?;
    tx.commit()?;
    Ok(outcome)
}

fn declared_definitions(registry: &SchemaRegistry) -> StoreResult<BTreeMap<String, String>> {
    registry
        .models()
        .iter()
        .map(|model| Ok((model.name.to_string(), serde_json::to_string(model)?)))
        .collect()
}

fn stored_definitions(conn: &Connection) -> StoreResult<BTreeMap<String, String>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT name, definition FROM {};",
        quote_ident(SCHEMA_TABLE)
    ))?;
    let mut rows = stmt.query([])?;
    let mut definitions = BTreeMap::new();
    while let Some(row) = rows.next()? {
        definitions.insert(row.get::<_, String>(0)?, row.get::<_, String>(1)?);
    }
    Ok(definitions)
}

fn write_definitions(conn: &Connection, declared: &BTreeMap<String, String>) -> StoreResult<()> {
    conn.execute(&format!("DELETE FROM {};", quote_ident(SCHEMA_TABLE)), [])?;
    for (name, definition) in declared {
        conn.execute(
            &format!(
                "INSERT INTO {} (name, definition) VALUES (?1, ?2);",
                quote_ident(SCHEMA_TABLE)
            ),
            params![name, definition],
        )?;
    }
    Ok(())
}

fn create_tables(conn: &Connection, models: &[&'static ModelSchema]) -> StoreResult<()> {
    for model in models {
        conn.execute_batch(&create_table_sql(model))?;
    }
    Ok(())
}

/// Rebuilds changed tables keeping same-named columns and object ids.
fn reshape_tables(
    conn: &Connection,
    registry: &SchemaRegistry,
    stored: &BTreeMap<String, String>,
    declared: &BTreeMap<String, String>,
) -> StoreResult<()> {
    for name in stored.keys() {
        if !declared.contains_key(name) {
            conn.execute_batch(&format!("DROP TABLE IF EXISTS {};", quote_ident(name)))?;
        }
    }

    for model in registry.models() {
        match stored.get(model.name) {
            None => conn.execute_batch(&create_table_sql(model))?,
            Some(definition) if Some(definition) == declared.get(model.name) => {}
            Some(_) => rebuild_table(conn, model)?,
        }
    }
    Ok(())
}

fn rebuild_table(conn: &Connection, model: &ModelSchema) -> StoreResult<()> {
    let staging = format!("{MIGRATING_PREFIX}{}", model.name);
    conn.execute_batch(&format!(
        "ALTER TABLE {} RENAME TO {};",
        quote_ident(model.name),
        quote_ident(&staging)
    ))?;
    conn.execute_batch(&create_table_sql(model))?;

    let old_columns = table_columns(conn, &staging)?;
    let mut shared = vec![quote_ident(OBJECT_ID_COLUMN)];
    shared.extend(
        model
            .properties
            .iter()
            .filter(|property| old_columns.iter().any(|column| column == property.name))
            .map(|property| quote_ident(property.name)),
    );
    let column_list = shared.join(", ");
    conn.execute_batch(&format!(
        "INSERT INTO {} ({column_list}) SELECT {column_list} FROM {};
         DROP TABLE {};",
        quote_ident(model.name),
        quote_ident(&staging),
        quote_ident(&staging)
    ))?;
    Ok(())
}

fn describe_changes(stored: &BTreeMap<String, String>, declared: &BTreeMap<String, String>) -> String {
    let mut changes = Vec::new();
    for name in declared.keys() {
        match stored.get(name) {
            None => changes.push(format!("model `{name}` added")),
            Some(definition) if Some(definition) != declared.get(name) => {
                changes.push(format!("model `{name}` changed"))
            }
            Some(_) => {}
        }
    }
    for name in stored.keys() {
        if !declared.contains_key(name) {
            changes.push(format!("model `{name}` removed"));
        }
    }
    changes.join(", ")
}

pub(crate) fn table_exists(conn: &Connection, table: &str) -> StoreResult<bool> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(
            SELECT 1
            FROM sqlite_master
            WHERE type = 'table' AND name = ?1
        );",
        [table],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}

fn table_columns(conn: &Connection, table: &str) -> StoreResult<Vec<String>> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({});", quote_ident(table)))?;
    let mut rows = stmt.query([])?;
    let mut columns = Vec::new();
    while let Some(row) = rows.next()? {
        columns.push(row.get::<_, String>(1)?);
    }
    Ok(columns)
}
