//! Table DDL derived from model descriptors.

use crate::schema::{DefaultValue, ModelSchema, Property, PropertyKind};

/// Name of the hidden object identity column present in every model table.
pub(crate) const OBJECT_ID_COLUMN: &str = "_oid";

/// Quotes one SQL identifier. Names are pre-validated by the registry.
pub(crate) fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

pub(crate) fn create_table_sql(model: &ModelSchema) -> String {
    let mut columns = vec![format!(
        "{} INTEGER PRIMARY KEY AUTOINCREMENT",
        quote_ident(OBJECT_ID_COLUMN)
    )];
    for property in model.properties {
        columns.push(column_sql(model, property));
    }
    format!(
        "CREATE TABLE {} (\n    {}\n);",
        quote_ident(model.name),
        columns.join(",\n    ")
    )
}

fn column_sql(model: &ModelSchema, property: &Property) -> String {
    let mut sql = format!("{} {}", quote_ident(property.name), property.kind.column_type());
    if model.primary_key == Some(property.name) {
        sql.push_str(" NOT NULL UNIQUE");
        return sql;
    }
    if !property.is_nullable() {
        sql.push_str(" NOT NULL");
    }
    // Column defaults let table rebuilds fill properties the old table lacked.
    if let Some(default) = default_literal(property) {
        sql.push_str(" DEFAULT ");
        sql.push_str(&default);
    }
    sql
}

fn default_literal(property: &Property) -> Option<String> {
    if let Some(default) = property.default {
        return Some(match default {
            DefaultValue::Bool(value) => i64::from(value).to_string(),
            DefaultValue::Int(value) => value.to_string(),
            DefaultValue::Double(value) => format!("{value:?}"),
            DefaultValue::Str(value) => quote_literal(value),
        });
    }
    match property.kind {
        PropertyKind::List(_) => Some("'[]'".to_string()),
        _ if property.is_nullable() => None,
        PropertyKind::String => Some("''".to_string()),
        PropertyKind::Double => Some("0.0".to_string()),
        _ => Some("0".to_string()),
    }
}

fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}
