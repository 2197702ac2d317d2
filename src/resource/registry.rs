//! Predicate Registry - existence predicates keyed by resource type
//!
//! The built-in table is embedded from `resources/predicates.json` at
//! compile time, so adding a resource type that fits one of the generic
//! predicate kinds needs no code changes.

use super::predicate::{ExistencePredicate, NamedEntryPredicate, RestGetPredicate};
use crate::error::{Error, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Embedded predicate definitions (compiled into the binary)
const PREDICATE_FILE: &str = include_str!("../resources/predicates.json");

/// Predicate definition from JSON
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PredicateDef {
    /// GET the resource itself
    RestGet {
        url: String,
        /// Send the billing project header
        #[serde(default = "default_user_project")]
        user_project: bool,
    },
    /// Look the resource up by name inside a parent's collection
    NamedEntry {
        parent_url: String,
        /// Dotted path from the parent body to the collection
        collection_path: String,
        #[serde(default = "default_name_attribute")]
        name_attribute: String,
        #[serde(default = "default_user_project")]
        user_project: bool,
    },
}

fn default_name_attribute() -> String {
    "name".to_string()
}

fn default_user_project() -> bool {
    true
}

impl PredicateDef {
    fn build(&self, resource_type: &str) -> Arc<dyn ExistencePredicate> {
        match self {
            PredicateDef::RestGet { url, user_project } => {
                let predicate = RestGetPredicate::new(resource_type, url);
                if *user_project {
                    Arc::new(predicate)
                } else {
                    Arc::new(predicate.without_user_project())
                }
            }
            PredicateDef::NamedEntry {
                parent_url,
                collection_path,
                name_attribute,
                user_project,
            } => {
                let path: Vec<&str> = collection_path.split('.').collect();
                let predicate =
                    NamedEntryPredicate::new(resource_type, parent_url, &path, name_attribute);
                if *user_project {
                    Arc::new(predicate)
                } else {
                    Arc::new(predicate.without_user_project())
                }
            }
        }
    }
}

/// Root structure of resources/predicates.json
#[derive(Debug, Clone, Deserialize)]
struct PredicateFile {
    #[serde(default)]
    predicates: BTreeMap<String, PredicateDef>,
}

/// Lookup table from resource type to predicate
#[derive(Clone, Default)]
pub struct PredicateRegistry {
    predicates: BTreeMap<String, Arc<dyn ExistencePredicate>>,
}

impl PredicateRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every embedded definition
    pub fn builtin() -> Result<Self> {
        Self::from_json(PREDICATE_FILE)
    }

    /// Parse a predicate table in the embedded format
    pub fn from_json(content: &str) -> Result<Self> {
        let file: PredicateFile = serde_json::from_str(content)
            .map_err(|e| Error::Config(format!("invalid predicate definitions: {e}")))?;
        let mut registry = Self::new();
        for (resource_type, def) in &file.predicates {
            registry.register(def.build(resource_type));
        }
        Ok(registry)
    }

    /// Add or replace the predicate for its resource type
    pub fn register(&mut self, predicate: Arc<dyn ExistencePredicate>) {
        self.predicates
            .insert(predicate.resource_type().to_string(), predicate);
    }

    pub fn get(&self, resource_type: &str) -> Option<Arc<dyn ExistencePredicate>> {
        self.predicates.get(resource_type).cloned()
    }

    /// All registered resource types, sorted
    pub fn resource_types(&self) -> Vec<&str> {
        self.predicates.keys().map(String::as_str).collect()
    }
}
