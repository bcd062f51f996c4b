use rusqlite::{Connection, Transaction};
use std::path::Path;
use todostore_core::db::migrations::SCHEMA_TABLE;
use todostore_core::{
    DefaultValue, Fields, MigrationPolicy, ModelSchema, ObjectStore, Property, StoreConfig,
    StoreError, Value,
};

static BOOK_V0: ModelSchema =
    ModelSchema::new("Book", &[Property::string("title")]).with_primary_key("title");

static BOOK_V1: ModelSchema = ModelSchema::new(
    "Book",
    &[
        Property::string("title"),
        Property::int("pages").with_default(DefaultValue::Int(0)),
    ],
)
.with_primary_key("title");

static SHELF: ModelSchema = ModelSchema::new("Shelf", &[Property::string("label")]);

fn open_store(path: &Path, model: &'static ModelSchema, version: u32, policy: MigrationPolicy) -> Result<ObjectStore, StoreError> {
    ObjectStore::open(
        StoreConfig::new()
            .schema(&[model])
            .path(path)
            .schema_version(version)
            .migration(policy),
    )
}

fn add_book(store: &ObjectStore, title: &str) {
    let mut fields = Fields::new();
    fields.insert("title".to_string(), Value::from(title));
    store.write(|| store.create("Book", fields, false)).unwrap();
}

fn book_count(store: &ObjectStore) -> usize {
    store.objects("Book").unwrap().len().unwrap()
}

fn fill_pages(tx: &Transaction<'_>, from: u32, to: u32) -> rusqlite::Result<()> {
    assert_eq!((from, to), (0, 1));
    tx.execute("UPDATE \"Book\" SET \"pages\" = 42;", [])?;
    Ok(())
}

fn schema_version(path: &Path) -> u32 {
    let conn = Connection::open(path).unwrap();
    conn.query_row("PRAGMA user_version;", [], |row| row.get(0))
        .unwrap()
}

fn assert_table_exists(path: &Path, table_name: &str) {
    let conn = Connection::open(path).unwrap();
    let exists: i64 = conn
        .query_row(
            "SELECT EXISTS(
                SELECT 1
                FROM sqlite_master
                WHERE type = 'table' AND name = ?1
            );",
            [table_name],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(exists, 1, "table {table_name} does not exist");
}

#[test]
fn opening_creates_model_and_metadata_tables() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("store.db");

    let store = open_store(&path, &BOOK_V0, 3, MigrationPolicy::Reject).unwrap();
    assert_eq!(store.path(), Some(path.as_path()));
    assert_eq!(store.schema_version(), 3);
    drop(store);

    assert_eq!(schema_version(&path), 3);
    assert_table_exists(&path, "Book");
    assert_table_exists(&path, SCHEMA_TABLE);
}

#[test]
fn reopening_keeps_data() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("store.db");

    let store = open_store(&path, &BOOK_V0, 0, MigrationPolicy::Reject).unwrap();
    add_book(&store, "Dune");
    drop(store);

    let store = open_store(&path, &BOOK_V0, 0, MigrationPolicy::Reject).unwrap();
    assert_eq!(book_count(&store), 1);
}

#[test]
fn newer_stored_version_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("future.db");

    let conn = Connection::open(&path).unwrap();
    conn.execute_batch("PRAGMA user_version = 999;").unwrap();
    drop(conn);

    let err = open_store(&path, &BOOK_V0, 1, MigrationPolicy::DeleteIfMigrationNeeded)
        .err()
        .unwrap();
    match err {
        StoreError::UnsupportedSchemaVersion {
            db_version,
            latest_supported,
        } => {
            assert_eq!(db_version, 999);
            assert_eq!(latest_supported, 1);
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn changed_schema_is_rejected_by_default() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("store.db");

    drop(open_store(&path, &BOOK_V0, 0, MigrationPolicy::Reject).unwrap());
    let err = open_store(&path, &BOOK_V1, 1, MigrationPolicy::Reject)
        .err()
        .unwrap();
    assert!(matches!(err, StoreError::MigrationRequired(message) if message.contains("Book")));
}

#[test]
fn delete_if_migration_needed_recreates_tables() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("store.db");

    let store = open_store(&path, &BOOK_V0, 0, MigrationPolicy::DeleteIfMigrationNeeded).unwrap();
    add_book(&store, "Dune");
    drop(store);

    let store = open_store(&path, &BOOK_V1, 0, MigrationPolicy::DeleteIfMigrationNeeded).unwrap();
    assert_eq!(book_count(&store), 0);
    add_book(&store, "Emma");
    let emma = store.object_for_primary_key("Book", "Emma").unwrap().unwrap();
    assert_eq!(emma.get_i64("pages").unwrap(), 0);
}

#[test]
fn migrate_keeps_rows_and_runs_the_hook() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("store.db");

    let store = open_store(&path, &BOOK_V0, 0, MigrationPolicy::Reject).unwrap();
    add_book(&store, "Dune");
    let old_id = store
        .object_for_primary_key("Book", "Dune")
        .unwrap()
        .unwrap()
        .id();
    drop(store);

    let store = open_store(&path, &BOOK_V1, 1, MigrationPolicy::Migrate(fill_pages)).unwrap();
    let dune = store.object_for_primary_key("Book", "Dune").unwrap().unwrap();
    assert_eq!(dune.id(), old_id);
    assert_eq!(dune.get_i64("pages").unwrap(), 42);
    drop(store);
    assert_eq!(schema_version(&path), 1);
}

#[test]
fn migrate_requires_a_version_bump() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("store.db");

    drop(open_store(&path, &BOOK_V0, 0, MigrationPolicy::Reject).unwrap());
    let err = open_store(&path, &BOOK_V1, 0, MigrationPolicy::Migrate(fill_pages))
        .err()
        .unwrap();
    assert!(matches!(err, StoreError::MigrationRequired(_)));

    let store = open_store(&path, &BOOK_V0, 0, MigrationPolicy::Reject).unwrap();
    assert_eq!(book_count(&store), 0);
}

#[test]
fn version_bump_without_schema_change_is_recorded() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("store.db");

    let store = open_store(&path, &BOOK_V0, 0, MigrationPolicy::Reject).unwrap();
    add_book(&store, "Dune");
    drop(store);

    let store = open_store(&path, &BOOK_V0, 2, MigrationPolicy::Reject).unwrap();
    assert_eq!(book_count(&store), 1);
    drop(store);
    assert_eq!(schema_version(&path), 2);
}

#[test]
fn migrate_creates_added_and_drops_removed_models() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("store.db");

    drop(open_store(&path, &BOOK_V0, 0, MigrationPolicy::Reject).unwrap());

    fn no_op(_tx: &Transaction<'_>, _from: u32, _to: u32) -> rusqlite::Result<()> {
        Ok(())
    }
    let store = open_store(&path, &SHELF, 1, MigrationPolicy::Migrate(no_op)).unwrap();
    assert_eq!(store.model_names(), vec!["Shelf"]);
    drop(store);

    assert_table_exists(&path, "Shelf");
    let conn = Connection::open(&path).unwrap();
    let book_tables: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'Book';",
            [],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(book_tables, 0);
}
