//! Schema registry built once per store.
//!
//! # Responsibility
//! - Validate a model set eagerly at store construction.
//! - Resolve model names and precompute cascade deletion order.
//!
//! # Invariants
//! - Every `child_models`, `object<T>` and `list<T>` target resolves.
//! - The `child_models` relation is acyclic, so cascades always terminate.
//! - Cascade order lists children bottom-up before their parent, each
//!   collection at most once.

use crate::db::{StoreError, StoreResult};
use crate::schema::{ModelSchema, PropertyKind};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet};

static IDENTIFIER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z][A-Za-z0-9_]*$").expect("valid identifier regex"));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum VisitState {
    Unvisited,
    OnPath,
    Done,
}

/// Validated, name-indexed model set.
#[derive(Debug, Clone)]
pub struct SchemaRegistry {
    models: Vec<&'static ModelSchema>,
    by_name: BTreeMap<&'static str, usize>,
    cascade_orders: Vec<Vec<&'static ModelSchema>>,
}

impl SchemaRegistry {
    /// Validates `models` and builds the registry.
    ///
    /// # Errors
    /// - `StoreError::Initialization` for invalid identifiers, duplicate
    ///   names, unresolved references, bad primary keys, mismatched defaults
    ///   or a `child_models` cycle.
    pub fn new(models: &[&'static ModelSchema]) -> StoreResult<Self> {
        let mut by_name = BTreeMap::new();
        for (index, model) in models.iter().enumerate() {
            ensure_identifier("model", model.name)?;
            if by_name.insert(model.name, index).is_some() {
                return Err(StoreError::Initialization(format!(
                    "model `{}` is declared more than once",
                    model.name
                )));
            }
        }

        for model in models {
            validate_model(model, &by_name)?;
        }

        let children: Vec<Vec<usize>> = models
            .iter()
            .map(|model| {
                model
                    .child_models
                    .iter()
                    .filter_map(|child| by_name.get(child).copied())
                    .collect()
            })
            .collect();

        let mut states = vec![VisitState::Unvisited; models.len()];
        let mut path = Vec::new();
        for index in 0..models.len() {
            if let Some(cycle) = find_cycle(index, &children, &mut states, &mut path) {
                let names = cycle
                    .iter()
                    .map(|&i| models[i].name)
                    .collect::<Vec<_>>()
                    .join(" -> ");
                return Err(StoreError::Initialization(format!(
                    "child_models cycle detected: {names}"
                )));
            }
        }

        let cascade_orders = (0..models.len())
            .map(|index| {
                let mut visited = vec![false; models.len()];
                let mut order = Vec::new();
                collect_cascade(index, &children, &mut visited, &mut order);
                order.into_iter().map(|i| models[i]).collect()
            })
            .collect();

        Ok(Self {
            models: models.to_vec(),
            by_name,
            cascade_orders,
        })
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    /// Models in declaration order.
    pub fn models(&self) -> &[&'static ModelSchema] {
        &self.models
    }

    /// Model names in declaration order.
    pub fn model_names(&self) -> Vec<&'static str> {
        self.models.iter().map(|model| model.name).collect()
    }

    pub fn get(&self, name: &str) -> Option<&'static ModelSchema> {
        self.by_name.get(name).map(|&index| self.models[index])
    }

    /// Like `get`, but unknown names are an error.
    pub fn require(&self, name: &str) -> StoreResult<&'static ModelSchema> {
        self.get(name)
            .ok_or_else(|| StoreError::UnknownModel(name.to_string()))
    }

    /// Collections emptied by deleting `name`: descendants first, then `name`.
    pub fn cascade_order(&self, name: &str) -> Option<&[&'static ModelSchema]> {
        self.by_name
            .get(name)
            .map(|&index| self.cascade_orders[index].as_slice())
    }
}

fn ensure_identifier(what: &str, value: &str) -> StoreResult<()> {
    if IDENTIFIER_RE.is_match(value) {
        Ok(())
    } else {
        Err(StoreError::Initialization(format!(
            "invalid {what} name `{value}`; expected [A-Za-z][A-Za-z0-9_]*"
        )))
    }
}

fn validate_model(model: &ModelSchema, known: &BTreeMap<&'static str, usize>) -> StoreResult<()> {
    let mut seen = BTreeSet::new();
    for property in model.properties {
        ensure_identifier("property", property.name)?;
        if !seen.insert(property.name) {
            return Err(StoreError::Initialization(format!(
                "property `{}` is declared more than once in model `{}`",
                property.name, model.name
            )));
        }
        if let Some(target) = property.kind.target_model() {
            if !known.contains_key(target) {
                return Err(StoreError::Initialization(format!(
                    "property `{}.{}` references unknown model `{target}`",
                    model.name, property.name
                )));
            }
        }
        if let Some(default) = property.default {
            if !default.matches(property.kind) {
                return Err(StoreError::Initialization(format!(
                    "default of `{}.{}` does not match type {}",
                    model.name, property.name, property.kind
                )));
            }
        }
    }

    if let Some(key) = model.primary_key {
        let property = model.property(key).ok_or_else(|| {
            StoreError::Initialization(format!(
                "primary key `{key}` is not a property of model `{}`",
                model.name
            ))
        })?;
        if !matches!(property.kind, PropertyKind::String | PropertyKind::Int) || property.optional {
            return Err(StoreError::Initialization(format!(
                "primary key `{}.{key}` must be a non-optional string or int",
                model.name
            )));
        }
    }

    for child in model.child_models {
        if !known.contains_key(child) {
            return Err(StoreError::Initialization(format!(
                "model `{}` lists unknown child model `{child}`",
                model.name
            )));
        }
    }

    Ok(())
}

fn find_cycle(
    index: usize,
    children: &[Vec<usize>],
    states: &mut [VisitState],
    path: &mut Vec<usize>,
) -> Option<Vec<usize>> {
    match states[index] {
        VisitState::Done => return None,
        VisitState::OnPath => {
            let start = path.iter().position(|&i| i == index).unwrap_or(0);
            let mut cycle = path[start..].to_vec();
            cycle.push(index);
            return Some(cycle);
        }
        VisitState::Unvisited => {}
    }

    states[index] = VisitState::OnPath;
    path.push(index);
    for &child in &children[index] {
        if let Some(cycle) = find_cycle(child, children, states, path) {
            return Some(cycle);
        }
    }
    path.pop();
    states[index] = VisitState::Done;
    None
}

fn collect_cascade(index: usize, children: &[Vec<usize>], visited: &mut [bool], order: &mut Vec<usize>) {
    if visited[index] {
        return;
    }
    visited[index] = true;
    for &child in &children[index] {
        collect_cascade(child, children, visited, order);
    }
    order.push(index);
}
