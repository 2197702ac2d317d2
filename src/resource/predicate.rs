//! Existence predicates
//!
//! A predicate answers "does any instance of this resource type in the
//! state still exist remotely?" with one GET per instance. A 404 means
//! absent. Every other error propagates, and so does a success response
//! of unexpected shape: ambiguity never reads as "destroyed".
//!
//! Predicates do not poll. Retry on transient failures is the REST
//! client's job.

use super::resolver::{resolve, ResolveContext};
use super::state::{ResourceInstance, State};
use crate::context::RunContext;
use crate::error::{Error, Result};
use crate::gcp::json::ValueExt;
use async_trait::async_trait;
use serde_json::Value;

/// Decides whether instances of one resource type exist remotely
#[async_trait]
pub trait ExistencePredicate: Send + Sync {
    fn resource_type(&self) -> &str;

    /// True if at least one managed instance of the type is still found
    async fn exists(&self, ctx: &RunContext, state: &State) -> Result<bool>;
}

/// GET the resource's own URL; 2xx means it exists
#[derive(Debug, Clone)]
pub struct RestGetPredicate {
    pub resource_type: String,
    pub url_template: String,
    /// Bill the GET to the provider's billing project
    pub user_project: bool,
}

impl RestGetPredicate {
    pub fn new(resource_type: &str, url_template: &str) -> Self {
        Self {
            resource_type: resource_type.to_string(),
            url_template: url_template.to_string(),
            user_project: true,
        }
    }

    pub fn without_user_project(mut self) -> Self {
        self.user_project = false;
        self
    }
}

/// GET with the billing header only when the predicate asks for it
async fn get(ctx: &RunContext, url: &str, user_project: bool) -> Result<Value> {
    let provider = ctx.provider_config();
    let billing_project = if user_project {
        provider.billing_project.as_str()
    } else {
        ""
    };
    ctx.client()
        .get(billing_project, url, &provider.user_agent)
        .await
}

#[async_trait]
impl ExistencePredicate for RestGetPredicate {
    fn resource_type(&self) -> &str {
        &self.resource_type
    }

    async fn exists(&self, ctx: &RunContext, state: &State) -> Result<bool> {
        for (address, instance) in state.instances_of(&self.resource_type) {
            let resolve_ctx = ResolveContext::new(ctx.provider_config())
                .with_instance(instance)
                .with_state(state);
            let url = resolve(&self.url_template, &resolve_ctx)?;

            match get(ctx, &url, self.user_project).await {
                Ok(body) => {
                    body.expect_object(&address.to_string())?;
                    tracing::debug!("{} still exists at {}", address, url);
                    return Ok(true);
                }
                Err(e) if e.is_api_error_with_code(404) => {
                    tracing::debug!("{} not found at {}", address, url);
                }
                Err(e) => return Err(e),
            }
        }
        Ok(false)
    }
}

/// Outcome of looking for a named entry inside a parent object
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryLookup {
    /// The collection holds an entry equal to the name
    Found,
    /// The collection exists but has no such entry
    NotInCollection,
    /// The collection (or a field on the way to it) is absent. GCP omits
    /// empty repeated fields, so this is read as "no entries".
    CollectionAbsent,
}

impl EntryLookup {
    pub fn exists(self) -> bool {
        self == EntryLookup::Found
    }
}

/// Existence of an entry embedded in a parent resource, such as a signed
/// URL key listed in a backend bucket's `cdnPolicy.signedUrlKeyNames`
#[derive(Debug, Clone)]
pub struct NamedEntryPredicate {
    pub resource_type: String,
    pub parent_url_template: String,
    /// Path of object keys from the parent body to the collection
    pub collection_path: Vec<String>,
    /// Instance attribute holding the entry's name
    pub name_attribute: String,
    /// Bill the parent GET to the provider's billing project
    pub user_project: bool,
}

impl NamedEntryPredicate {
    pub fn new(
        resource_type: &str,
        parent_url_template: &str,
        collection_path: &[&str],
        name_attribute: &str,
    ) -> Self {
        Self {
            resource_type: resource_type.to_string(),
            parent_url_template: parent_url_template.to_string(),
            collection_path: collection_path.iter().map(|s| s.to_string()).collect(),
            name_attribute: name_attribute.to_string(),
            user_project: true,
        }
    }

    pub fn without_user_project(mut self) -> Self {
        self.user_project = false;
        self
    }

    /// Find `name` in the parent's collection by exact string match
    pub fn lookup(&self, parent: &Value, name: &str) -> Result<EntryLookup> {
        let context = self.collection_path.join(".");
        parent.expect_object(&self.resource_type)?;
        let path: Vec<&str> = self.collection_path.iter().map(String::as_str).collect();

        let items = match parent.lookup_path(&path)? {
            None => return Ok(EntryLookup::CollectionAbsent),
            Some(Value::Array(items)) => items,
            Some(other) => return Err(Error::shape(context, "array", other)),
        };

        for item in items {
            match item {
                Value::String(entry) if entry == name => return Ok(EntryLookup::Found),
                Value::String(_) => {}
                other => return Err(Error::shape(format!("{context}[]"), "string", other)),
            }
        }
        Ok(EntryLookup::NotInCollection)
    }

    fn entry_name(&self, instance: &ResourceInstance) -> Result<String> {
        instance
            .string_attribute(&self.name_attribute)
            .ok_or_else(|| Error::UnresolvedReference {
                template: self.name_attribute.clone(),
                placeholder: self.name_attribute.clone(),
            })
    }
}

#[async_trait]
impl ExistencePredicate for NamedEntryPredicate {
    fn resource_type(&self) -> &str {
        &self.resource_type
    }

    async fn exists(&self, ctx: &RunContext, state: &State) -> Result<bool> {
        for (address, instance) in state.instances_of(&self.resource_type) {
            let resolve_ctx = ResolveContext::new(ctx.provider_config())
                .with_instance(instance)
                .with_state(state);
            let url = resolve(&self.parent_url_template, &resolve_ctx)?;
            let name = self.entry_name(instance)?;

            let parent = match get(ctx, &url, self.user_project).await {
                Ok(parent) => parent,
                Err(e) if e.is_api_error_with_code(404) => {
                    tracing::debug!("{}: parent {} not found", address, url);
                    continue;
                }
                Err(e) => return Err(e),
            };

            let outcome = self.lookup(&parent, &name)?;
            tracing::debug!("{}: entry {:?} lookup -> {:?}", address, name, outcome);
            if outcome.exists() {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn signed_url_key() -> NamedEntryPredicate {
        NamedEntryPredicate::new(
            "google_compute_backend_bucket_signed_url_key",
            "{{ComputeBasePath}}projects/{{project}}/global/backendBuckets/{{backend_bucket}}",
            &["cdnPolicy", "signedUrlKeyNames"],
            "name",
        )
    }

    #[test]
    fn test_exact_match_found() {
        let parent = json!({"cdnPolicy": {"signedUrlKeyNames": ["test-key-abc"]}});
        let p = signed_url_key();
        assert_eq!(p.lookup(&parent, "test-key-abc").unwrap(), EntryLookup::Found);
        assert_eq!(
            p.lookup(&parent, "test-key-xyz").unwrap(),
            EntryLookup::NotInCollection
        );
    }

    #[test]
    fn test_prefix_is_not_a_match() {
        let parent = json!({"cdnPolicy": {"signedUrlKeyNames": ["test-key-abcdef"]}});
        assert!(!signed_url_key().lookup(&parent, "test-key-abc").unwrap().exists());
    }

    #[test]
    fn test_missing_collection_is_absent() {
        let p = signed_url_key();
        assert_eq!(
            p.lookup(&json!({"name": "b"}), "k").unwrap(),
            EntryLookup::CollectionAbsent
        );
        assert_eq!(
            p.lookup(&json!({"cdnPolicy": {}}), "k").unwrap(),
            EntryLookup::CollectionAbsent
        );
    }

    #[test]
    fn test_wrong_shape_is_error() {
        let p = signed_url_key();
        assert!(p.lookup(&json!({"cdnPolicy": "x"}), "k").is_err());
        assert!(p
            .lookup(&json!({"cdnPolicy": {"signedUrlKeyNames": "k"}}), "k")
            .is_err());
        assert!(p
            .lookup(&json!({"cdnPolicy": {"signedUrlKeyNames": [1]}}), "k")
            .is_err());
        assert!(p.lookup(&json!([]), "k").is_err());
    }

    #[test]
    fn test_entry_name_required() {
        let p = signed_url_key();
        let instance = ResourceInstance::from_value(json!({"backend_bucket": "b"})).unwrap();
        assert!(matches!(
            p.entry_name(&instance),
            Err(Error::UnresolvedReference { .. })
        ));
    }
}
