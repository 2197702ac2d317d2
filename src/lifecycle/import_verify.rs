//! Import fidelity
//!
//! Both attribute maps are flattened to dotted keys (`cdn_policy.0.x`) and
//! compared key by key. Keys in the ignore set, and anything below them,
//! are skipped, as is `timeouts`, which is configuration-only and never
//! read back.

use crate::error::{Error, Result};
use crate::gcp::json::scalar_to_string;
use crate::resource::ResourceInstance;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

const NEVER_IMPORTED: &[&str] = &["timeouts"];

/// One attribute that differs between applied and imported state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeDiff {
    pub key: String,
    pub applied: Option<String>,
    pub imported: Option<String>,
}

impl fmt::Display for AttributeDiff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let show = |v: &Option<String>| v.clone().unwrap_or_else(|| "<unset>".to_string());
        write!(
            f,
            "{}: applied={} imported={}",
            self.key,
            show(&self.applied),
            show(&self.imported)
        )
    }
}

/// Flatten nested attributes into dotted keys; nulls are dropped
pub fn flatten(attributes: &Map<String, Value>) -> BTreeMap<String, String> {
    let mut out = BTreeMap::new();
    for (key, value) in attributes {
        flatten_into(key, value, &mut out);
    }
    out
}

fn flatten_into(prefix: &str, value: &Value, out: &mut BTreeMap<String, String>) {
    match value {
        Value::Null => {}
        Value::Object(map) => {
            for (key, child) in map {
                flatten_into(&format!("{prefix}.{key}"), child, out);
            }
        }
        Value::Array(items) => {
            for (index, child) in items.iter().enumerate() {
                flatten_into(&format!("{prefix}.{index}"), child, out);
            }
        }
        scalar => {
            if let Some(s) = scalar_to_string(scalar) {
                out.insert(prefix.to_string(), s);
            }
        }
    }
}

/// True if `key` is an ignored key or lies below one
pub fn is_ignored(key: &str, ignore: &[String]) -> bool {
    let covered = |root: &str| {
        key == root
            || key
                .strip_prefix(root)
                .is_some_and(|rest| rest.starts_with('.'))
    };
    ignore.iter().any(|i| covered(i.as_str())) || NEVER_IMPORTED.iter().any(|i| covered(*i))
}

/// Every non-ignored key whose value differs
pub fn diff(
    applied: &ResourceInstance,
    imported: &ResourceInstance,
    ignore: &[String],
) -> Vec<AttributeDiff> {
    let applied = flatten(&applied.attributes);
    let imported = flatten(&imported.attributes);

    let mut keys: Vec<&String> = applied.keys().chain(imported.keys()).collect();
    keys.sort();
    keys.dedup();

    keys.into_iter()
        .filter(|key| !is_ignored(key, ignore))
        .filter_map(|key| {
            let a = applied.get(key);
            let b = imported.get(key);
            (a != b).then(|| AttributeDiff {
                key: key.clone(),
                applied: a.cloned(),
                imported: b.cloned(),
            })
        })
        .collect()
}

/// Fail with a [`Error::LifecycleAssertion`] listing every difference
pub fn verify_import(
    address: &str,
    applied: &ResourceInstance,
    imported: &ResourceInstance,
    ignore: &[String],
) -> Result<()> {
    let diffs = diff(applied, imported, ignore);
    if diffs.is_empty() {
        return Ok(());
    }
    let listed: Vec<String> = diffs.iter().map(ToString::to_string).collect();
    Err(Error::LifecycleAssertion {
        resource: address.to_string(),
        expected: "imported attributes to match applied state".to_string(),
        actual: format!("{} differences:\n  {}", diffs.len(), listed.join("\n  ")),
    })
}
