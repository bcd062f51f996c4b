//! Domain stores built on the generic object store.
//!
//! # Responsibility
//! - Compose `ObjectStore` with one fixed schema per domain.
//! - Expose domain operations built only from store primitives.
//!
//! # Invariants
//! - Every domain mutation runs inside exactly one `ObjectStore::write`.
//! - Domain stores are explicit instances; there is no process-wide store.
//!
//! # See also
//! - `store` for transaction and cascade semantics.

pub mod key_gen;
pub mod todo_repo;
