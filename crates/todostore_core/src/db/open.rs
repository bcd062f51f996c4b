//! Connection bootstrap for the object store.
//!
//! # Responsibility
//! - Open file-backed or in-memory SQLite connections.
//! - Configure connection pragmas required by store behavior.
//! - Run schema sync before returning a usable connection.
//!
//! # Invariants
//! - Returned connections are in autocommit mode (no open transaction).
//! - Returned connections have the declared schema fully applied.

use super::migrations::sync_schema;
use super::{MigrationPolicy, StoreResult};
use crate::schema::registry::SchemaRegistry;
use log::{error, info};
use rusqlite::Connection;
use std::path::Path;
use std::time::{Duration, Instant};

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Opens (or creates) the store database and syncs it with `registry`.
///
/// `path = None` opens a private in-memory database.
///
/// # Side effects
/// - Creates the backing file when missing.
/// - Emits `store_open` and `schema_sync` events with duration and status.
pub(crate) fn open_db(
    path: Option<&Path>,
    registry: &SchemaRegistry,
    schema_version: u32,
    policy: MigrationPolicy,
) -> StoreResult<Connection> {
    let started_at = Instant::now();
    let mode = if path.is_some() { "file" } else { "memory" };
    info!(
        "event=store_open module=db status=start mode={} models={} schema_version={}",
        mode,
        registry.len(),
        schema_version
    );

    let opened = match path {
        Some(path) => Connection::open(path),
        None => Connection::open_in_memory(),
    };
    let mut conn = match opened {
        Ok(conn) => conn,
        Err(err) => {
            error!(
                "event=store_open module=db status=error mode={} duration_ms={} error_code=db_open_failed error={}",
                mode,
                started_at.elapsed().as_millis(),
                err
            );
            return Err(err.into());
        }
    };

    match bootstrap_connection(&mut conn, registry, schema_version, policy) {
        Ok(()) => {
            info!(
                "event=store_open module=db status=ok mode={} duration_ms={}",
                mode,
                started_at.elapsed().as_millis()
            );
            Ok(conn)
        }
        Err(err) => {
            error!(
                "event=store_open module=db status=error mode={} duration_ms={} error_code=schema_sync_failed error={}",
                mode,
                started_at.elapsed().as_millis(),
                err
            );
            Err(err)
        }
    }
}

fn bootstrap_connection(
    conn: &mut Connection,
    registry: &SchemaRegistry,
    schema_version: u32,
    policy: MigrationPolicy,
) -> StoreResult<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.busy_timeout(BUSY_TIMEOUT)?;
    let outcome = sync_schema(conn, registry, schema_version, policy)?;
    info!(
        "event=schema_sync module=db status=ok outcome={} policy={:?}",
        outcome.as_str(),
        policy
    );
    Ok(())
}
