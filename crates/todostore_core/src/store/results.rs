//! Live result sets over one model.
//!
//! A `Results` value holds the query, not the rows: `len`, `get` and
//! `objects` re-run it on every call, ordered by object id.

use super::{ManagedObject, ObjectStore, SubscriptionId};
use crate::db::ddl::OBJECT_ID_COLUMN;
use crate::db::value::ObjectId;
use crate::db::{quote_ident, StoreError, StoreResult};
use crate::schema::{ModelSchema, Property, PropertyKind};
use once_cell::sync::Lazy;
use regex::Regex;
use rusqlite::types::Value as SqlValue;
use rusqlite::{params_from_iter, OptionalExtension};

static PREDICATE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*([A-Za-z][A-Za-z0-9_]*)\s*==\s*(true|false|TRUE|FALSE)\s*$")
        .expect("valid predicate regex")
});

/// Boolean equality filter, e.g. `completed == true`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Predicate {
    pub property: String,
    pub value: bool,
}

impl Predicate {
    pub fn equals(property: impl Into<String>, value: bool) -> Self {
        Self {
            property: property.into(),
            value,
        }
    }

    /// Parses `<property> == true|false`.
    pub fn parse(text: &str) -> StoreResult<Self> {
        let captures = PREDICATE_RE.captures(text).ok_or_else(|| {
            StoreError::InvalidArgument(format!("unsupported predicate `{text}`"))
        })?;
        Ok(Self {
            property: captures[1].to_string(),
            value: captures[2].eq_ignore_ascii_case("true"),
        })
    }
}

/// Query over the objects of one model, optionally filtered.
#[derive(Clone)]
pub struct Results<'db> {
    store: &'db ObjectStore,
    schema: &'static ModelSchema,
    filters: Vec<(&'static Property, bool)>,
}

impl<'db> Results<'db> {
    pub(crate) fn new(store: &'db ObjectStore, schema: &'static ModelSchema) -> Self {
        Self {
            store,
            schema,
            filters: Vec::new(),
        }
    }

    pub fn model_name(&self) -> &'static str {
        self.schema.name
    }

    /// Narrows the result set; filters combine with AND.
    ///
    /// # Errors
    /// - `UnknownProperty` when the predicate names no property.
    /// - `InvalidArgument` when the property is not a `bool`.
    pub fn filtered(&self, predicate: &Predicate) -> StoreResult<Results<'db>> {
        let property = self.schema.property(&predicate.property).ok_or_else(|| {
            StoreError::UnknownProperty {
                model: self.schema.name,
                property: predicate.property.clone(),
            }
        })?;
        if property.kind != PropertyKind::Bool {
            return Err(StoreError::InvalidArgument(format!(
                "predicate on `{}.{}` requires a bool property, found {}",
                self.schema.name, property.name, property.kind
            )));
        }
        let mut narrowed = self.clone();
        narrowed.filters.push((property, predicate.value));
        Ok(narrowed)
    }

    pub fn len(&self) -> StoreResult<usize> {
        let (clause, values) = self.where_clause();
        let count: i64 = self.store.connection().query_row(
            &format!("SELECT COUNT(*) FROM {}{clause};", quote_ident(self.schema.name)),
            params_from_iter(values),
            |row| row.get(0),
        )?;
        Ok(usize::try_from(count).unwrap_or_default())
    }

    pub fn is_empty(&self) -> StoreResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Returns the object at `index`, or `None` past the end.
    pub fn get(&self, index: usize) -> StoreResult<Option<ManagedObject<'db>>> {
        let (clause, mut values) = self.where_clause();
        values.push(SqlValue::Integer(i64::try_from(index).unwrap_or(i64::MAX)));
        let id = self
            .store
            .connection()
            .query_row(
                &format!(
                    "SELECT {id} FROM {table}{clause} ORDER BY {id} LIMIT 1 OFFSET ?{};",
                    values.len(),
                    id = quote_ident(OBJECT_ID_COLUMN),
                    table = quote_ident(self.schema.name),
                ),
                params_from_iter(values),
                |row| row.get::<_, ObjectId>(0),
            )
            .optional()?;
        Ok(id.map(|id| ManagedObject::new(self.store, self.schema, id)))
    }

    /// Snapshot of the matching handles at call time.
    pub fn objects(&self) -> StoreResult<Vec<ManagedObject<'db>>> {
        let (clause, values) = self.where_clause();
        let mut stmt = self.store.connection().prepare(&format!(
            "SELECT {id} FROM {table}{clause} ORDER BY {id};",
            id = quote_ident(OBJECT_ID_COLUMN),
            table = quote_ident(self.schema.name),
        ))?;
        let ids = stmt
            .query_map(params_from_iter(values), |row| row.get::<_, ObjectId>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ids
            .into_iter()
            .map(|id| ManagedObject::new(self.store, self.schema, id))
            .collect())
    }

    /// Subscribes to commits that changed this model.
    pub fn add_listener(&self, callback: impl Fn() + 'static) -> StoreResult<SubscriptionId> {
        self.store.subscribe(self.schema.name, callback)
    }

    pub fn remove_listener(&self, id: SubscriptionId) -> bool {
        self.store.unsubscribe(id)
    }

    fn where_clause(&self) -> (String, Vec<SqlValue>) {
        if self.filters.is_empty() {
            return (String::new(), Vec::new());
        }
        let mut conditions = Vec::with_capacity(self.filters.len());
        let mut values = Vec::with_capacity(self.filters.len());
        for (property, expected) in &self.filters {
            values.push(SqlValue::Integer(i64::from(*expected)));
            conditions.push(format!("{} = ?{}", quote_ident(property.name), values.len()));
        }
        (format!(" WHERE {}", conditions.join(" AND ")), values)
    }
}

#[cfg(test)]
mod tests {
    use super::Predicate;
    use crate::db::StoreError;

    #[test]
    fn parse_accepts_boolean_equality() {
        assert_eq!(
            Predicate::parse("completed == true").unwrap(),
            Predicate::equals("completed", true)
        );
        assert_eq!(
            Predicate::parse("  done==FALSE ").unwrap(),
            Predicate::equals("done", false)
        );
    }

    #[test]
    fn parse_rejects_other_forms() {
        for text in ["completed = true", "completed == 1", "title CONTAINS 'x'", ""] {
            assert!(matches!(
                Predicate::parse(text),
                Err(StoreError::InvalidArgument(_))
            ));
        }
    }
}
