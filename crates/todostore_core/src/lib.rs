//! Transactional object store over embedded SQLite, plus the to-do store
//! built on it.

pub mod db;
pub mod logging;
pub mod model;
pub mod repo;
pub mod schema;
pub mod store;

pub use db::value::{Fields, ObjectId, Value};
pub use db::{MigrationFn, MigrationPolicy, SchemaSync, StoreConfig, StoreError, StoreResult};
pub use logging::{default_log_level, init_logging, logging_status, LoggingError};
pub use model::todo::{
    Todo, TodoDraft, TodoFilter, TodoRecord, TODO_MODEL, TODO_MODELS, TODO_SCHEMA,
};
pub use repo::key_gen::{generate_key, is_generated_key, random_string};
pub use repo::todo_repo::{TodoDatabase, TODO_SCHEMA_VERSION};
pub use schema::registry::SchemaRegistry;
pub use schema::{DefaultValue, ModelSchema, Property, PropertyKind};
pub use store::{ManagedObject, ObjectStore, Predicate, Results, SubscriptionId};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
