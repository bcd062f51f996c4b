//! Static model descriptors for the object store.
//!
//! # Responsibility
//! - Declare collections (models), their typed properties, primary keys and
//!   cascade children in `const`/`static` form.
//! - Provide the serializable shape used to detect schema changes on open.
//!
//! # Invariants
//! - Descriptors are immutable and live for the whole process (`&'static`).
//! - `child_models` is a deletion relation only; storage never enforces it.
//! - `object<T>` properties are always nullable; `list<T>` properties default
//!   to the empty list.
//!
//! # See also
//! - `schema::registry` for construction-time validation.

pub mod registry;

use serde::Serialize;
use std::fmt::{Display, Formatter};

/// Type tag of one model property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "target", rename_all = "snake_case")]
pub enum PropertyKind {
    String,
    Int,
    Double,
    Bool,
    /// Unix epoch milliseconds.
    Date,
    /// Reference to one object of the named model.
    Object(&'static str),
    /// Ordered references to objects of the named model.
    List(&'static str),
}

impl PropertyKind {
    /// Returns the referenced model for link kinds.
    pub fn target_model(self) -> Option<&'static str> {
        match self {
            Self::Object(target) | Self::List(target) => Some(target),
            _ => None,
        }
    }

    /// SQLite column affinity used for this kind.
    pub(crate) fn column_type(self) -> &'static str {
        match self {
            Self::String | Self::List(_) => "TEXT",
            Self::Double => "REAL",
            Self::Int | Self::Bool | Self::Date | Self::Object(_) => "INTEGER",
        }
    }
}

impl Display for PropertyKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::String => write!(f, "string"),
            Self::Int => write!(f, "int"),
            Self::Double => write!(f, "double"),
            Self::Bool => write!(f, "bool"),
            Self::Date => write!(f, "date"),
            Self::Object(target) => write!(f, "object<{target}>"),
            Self::List(target) => write!(f, "list<{target}>"),
        }
    }
}

/// Declared default for a scalar property.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(untagged)]
pub enum DefaultValue {
    Bool(bool),
    Int(i64),
    Double(f64),
    Str(&'static str),
}

impl DefaultValue {
    pub(crate) fn matches(self, kind: PropertyKind) -> bool {
        matches!(
            (self, kind),
            (Self::Bool(_), PropertyKind::Bool)
                | (Self::Int(_), PropertyKind::Int)
                | (Self::Int(_), PropertyKind::Date)
                | (Self::Double(_), PropertyKind::Double)
                | (Self::Str(_), PropertyKind::String)
        )
    }
}

/// One typed field of a model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Property {
    pub name: &'static str,
    pub kind: PropertyKind,
    pub optional: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<DefaultValue>,
}

impl Property {
    pub const fn new(name: &'static str, kind: PropertyKind) -> Self {
        Self {
            name,
            kind,
            optional: false,
            default: None,
        }
    }

    pub const fn string(name: &'static str) -> Self {
        Self::new(name, PropertyKind::String)
    }

    pub const fn int(name: &'static str) -> Self {
        Self::new(name, PropertyKind::Int)
    }

    pub const fn double(name: &'static str) -> Self {
        Self::new(name, PropertyKind::Double)
    }

    pub const fn bool(name: &'static str) -> Self {
        Self::new(name, PropertyKind::Bool)
    }

    pub const fn date(name: &'static str) -> Self {
        Self::new(name, PropertyKind::Date)
    }

    pub const fn object(name: &'static str, target: &'static str) -> Self {
        Self::new(name, PropertyKind::Object(target))
    }

    pub const fn list(name: &'static str, target: &'static str) -> Self {
        Self::new(name, PropertyKind::List(target))
    }

    /// Marks the property as nullable (`string?` style).
    pub const fn optional(self) -> Self {
        Self {
            optional: true,
            ..self
        }
    }

    pub const fn with_default(self, value: DefaultValue) -> Self {
        Self {
            default: Some(value),
            ..self
        }
    }

    /// Whether `Value::Null` is accepted for this property.
    pub fn is_nullable(&self) -> bool {
        self.optional || matches!(self.kind, PropertyKind::Object(_))
    }

    /// Whether a create call must supply this property explicitly.
    pub fn is_required(&self) -> bool {
        !self.is_nullable() && self.default.is_none() && !matches!(self.kind, PropertyKind::List(_))
    }
}

/// Static descriptor of one collection.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ModelSchema {
    pub name: &'static str,
    pub primary_key: Option<&'static str>,
    pub properties: &'static [Property],
    /// Collections deleted together with this one by `delete_all`.
    #[serde(skip)]
    pub child_models: &'static [&'static str],
}

impl ModelSchema {
    pub const fn new(name: &'static str, properties: &'static [Property]) -> Self {
        Self {
            name,
            primary_key: None,
            properties,
            child_models: &[],
        }
    }

    pub const fn with_primary_key(self, property: &'static str) -> Self {
        Self {
            primary_key: Some(property),
            ..self
        }
    }

    pub const fn with_child_models(self, children: &'static [&'static str]) -> Self {
        Self {
            child_models: children,
            ..self
        }
    }

    /// Looks up one property by name.
    pub fn property(&self, name: &str) -> Option<&'static Property> {
        let properties: &'static [Property] = self.properties;
        properties.iter().find(|property| property.name == name)
    }

    pub fn primary_key_property(&self) -> Option<&'static Property> {
        self.primary_key.and_then(|name| self.property(name))
    }
}

#[cfg(test)]
mod tests {
    use super::{DefaultValue, ModelSchema, Property, PropertyKind};

    static NOTE: ModelSchema = ModelSchema::new(
        "Note",
        &[
            Property::string("id"),
            Property::string("body").optional(),
            Property::bool("pinned").with_default(DefaultValue::Bool(false)),
            Property::list("tags", "Tag"),
            Property::object("folder", "Folder"),
        ],
    )
    .with_primary_key("id")
    .with_child_models(&["Tag"]);

    #[test]
    fn required_flags_follow_kind_and_defaults() {
        assert!(NOTE.property("id").unwrap().is_required());
        assert!(!NOTE.property("body").unwrap().is_required());
        assert!(!NOTE.property("pinned").unwrap().is_required());
        assert!(!NOTE.property("tags").unwrap().is_required());
        assert!(NOTE.property("folder").unwrap().is_nullable());
    }

    #[test]
    fn kind_display_uses_engine_type_tags() {
        assert_eq!(PropertyKind::List("Tag").to_string(), "list<Tag>");
        assert_eq!(PropertyKind::Object("Folder").to_string(), "object<Folder>");
        assert_eq!(PropertyKind::Date.to_string(), "date");
    }

    #[test]
    fn serialized_definition_omits_child_models() {
        let json = serde_json::to_value(NOTE).unwrap();
        assert_eq!(json["name"], "Note");
        assert_eq!(json["primary_key"], "id");
        assert!(json.get("child_models").is_none());
        assert_eq!(json["properties"][3]["kind"]["type"], "list");
        assert_eq!(json["properties"][3]["kind"]["target"], "Tag");
    }
}
