//! Domain models stored through the object store.
//!
//! # Responsibility
//! - Declare the static model descriptors of each domain collection.
//! - Provide typed views over managed objects and plain records for callers.
//!
//! # Invariants
//! - Descriptors here are the only source of table shape; the store derives
//!   DDL and schema fingerprints from them.
//!
//! # See also
//! - `schema` for descriptor types.

pub mod todo;
