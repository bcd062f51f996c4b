//! SQLite binding for the embedded object engine.
//!
//! # Responsibility
//! - Open and configure SQLite connections for the object store.
//! - Keep stored tables in sync with the declared model set.
//! - Define the error taxonomy shared by every store layer.
//!
//! # Invariants
//! - Schema version is tracked via `PRAGMA user_version`.
//! - No model data is read or written before schema sync succeeds.

use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod config;
pub(crate) mod ddl;
pub mod migrations;
mod open;
pub mod value;

pub use config::{MigrationFn, MigrationPolicy, StoreConfig};
pub use migrations::SchemaSync;
pub(crate) use ddl::quote_ident;
pub(crate) use open::open_db;

pub type StoreResult<T> = Result<T, StoreError>;

/// Errors surfaced by the object store and the domain stores built on it.
#[derive(Debug)]
pub enum StoreError {
    /// Underlying SQLite failure.
    Sqlite(rusqlite::Error),
    /// Missing or invalid construction parameters (schema, descriptors).
    Initialization(String),
    /// A required argument is missing or malformed.
    InvalidArgument(String),
    /// A value disagrees with the declared property type.
    TypeMismatch {
        model: &'static str,
        property: &'static str,
        expected: String,
        found: &'static str,
    },
    /// A unit of work passed to `write` failed; its transaction was cancelled.
    Transaction(Box<StoreError>),
    /// Stored schema version is newer than the declared one.
    UnsupportedSchemaVersion {
        db_version: u32,
        latest_supported: u32,
    },
    /// Stored schema differs and the migration policy does not allow it.
    MigrationRequired(String),
    UnknownModel(String),
    UnknownProperty {
        model: &'static str,
        property: String,
    },
    DuplicatePrimaryKey {
        model: &'static str,
        key: String,
    },
    /// Mutation attempted outside of a write transaction.
    NotInTransaction,
    /// Managed object was deleted (or never committed).
    ObjectInvalidated { model: &'static str },
    /// Persisted data cannot be decoded into the declared type.
    InvalidData(String),
}

impl StoreError {
    /// Returns the error raised inside the innermost failed unit of work.
    pub fn root_cause(&self) -> &StoreError {
        match self {
            Self::Transaction(inner) => inner.root_cause(),
            other => other,
        }
    }

    /// Wraps a unit-of-work failure once; nested writes are not re-wrapped.
    pub(crate) fn into_transaction(self) -> Self {
        match self {
            Self::Transaction(_) => self,
            other => Self::Transaction(Box::new(other)),
        }
    }
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sqlite(err) => write!(f, "{err}"),
            Self::Initialization(message) => write!(f, "store initialization failed: {message}"),
            Self::InvalidArgument(message) => write!(f, "invalid argument: {message}"),
            Self::TypeMismatch {
                model,
                property,
                expected,
                found,
            } => write!(
                f,
                "{model}.{property} must be of type '{expected}', got '{found}'"
            ),
            Self::Transaction(inner) => write!(f, "transaction cancelled: {inner}"),
            Self::UnsupportedSchemaVersion {
                db_version,
                latest_supported,
            } => write!(
                f,
                "database schema version {db_version} is newer than supported {latest_supported}"
            ),
            Self::MigrationRequired(message) => write!(f, "migration required: {message}"),
            Self::UnknownModel(name) => write!(f, "model `{name}` is not part of the schema"),
            Self::UnknownProperty { model, property } => {
                write!(f, "model `{model}` has no property `{property}`")
            }
            Self::DuplicatePrimaryKey { model, key } => write!(
                f,
                "attempting to create an object of type '{model}' with an existing primary key value '{key}'"
            ),
            Self::NotInTransaction => {
                write!(f, "cannot modify managed objects outside of a write transaction")
            }
            Self::ObjectInvalidated { model } => write!(
                f,
                "Accessing object of type {model} which has been invalidated or deleted"
            ),
            Self::InvalidData(message) => write!(f, "invalid persisted data: {message}"),
        }
    }
}

impl Error for StoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Sqlite(err) => Some(err),
            Self::Transaction(inner) => Some(inner.as_ref()),
            _ => None,
        }
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sqlite(value)
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(value: serde_json::Error) -> Self {
        Self::InvalidData(value.to_string())
    }
}
