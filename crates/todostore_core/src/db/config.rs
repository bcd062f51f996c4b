//! Store construction parameters.

use crate::schema::ModelSchema;
use std::fmt::{Debug, Formatter};
use std::path::{Path, PathBuf};

/// Custom migration hook: `(transaction, stored_version, declared_version)`.
///
/// Runs inside the schema-sync transaction after tables were reshaped.
pub type MigrationFn = fn(&rusqlite::Transaction<'_>, u32, u32) -> rusqlite::Result<()>;

/// What to do when the stored schema differs from the declared one.
#[derive(Clone, Copy, Default)]
pub enum MigrationPolicy {
    /// Fail with `StoreError::MigrationRequired`.
    #[default]
    Reject,
    /// Drop every stored model table and recreate from the declared schema.
    ///
    /// Only suitable for development builds: all data is lost.
    DeleteIfMigrationNeeded,
    /// Reshape tables (requires a schema version bump), then run the hook.
    Migrate(MigrationFn),
}

impl Debug for MigrationPolicy {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Reject => write!(f, "Reject"),
            Self::DeleteIfMigrationNeeded => write!(f, "DeleteIfMigrationNeeded"),
            Self::Migrate(_) => write!(f, "Migrate(..)"),
        }
    }
}

/// Builder for `ObjectStore::open`.
///
/// `schema` is mandatory: an unset schema fails construction, while an
/// empty one yields a store with zero models.
#[derive(Debug, Clone, Default)]
pub struct StoreConfig {
    pub schema: Option<Vec<&'static ModelSchema>>,
    /// `None` opens an in-memory database.
    pub path: Option<PathBuf>,
    pub schema_version: u32,
    pub migration: MigrationPolicy,
}

impl StoreConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schema(mut self, models: &[&'static ModelSchema]) -> Self {
        self.schema = Some(models.to_vec());
        self
    }

    pub fn path(mut self, path: impl AsRef<Path>) -> Self {
        self.path = Some(path.as_ref().to_path_buf());
        self
    }

    pub fn schema_version(mut self, version: u32) -> Self {
        self.schema_version = version;
        self
    }

    pub fn migration(mut self, policy: MigrationPolicy) -> Self {
        self.migration = policy;
        self
    }

    pub fn is_in_memory(&self) -> bool {
        self.path.is_none()
    }
}
