//! URL Resolver
//!
//! Expands `{{placeholder}}` templates such as
//! `{{ComputeBasePath}}projects/{{project}}/global/backendBuckets/{{name}}`
//! into concrete URLs. Resolution is pure: it reads the provider config,
//! one resource instance and the state graph, and never touches the
//! network. A placeholder without a value is an
//! [`Error::UnresolvedReference`]; a partially expanded URL is never
//! returned.
//!
//! Grammar:
//! - `{{name}}` - override, then instance attribute, then provider value
//! - `{{%name}}` - same lookup, value path-escaped
//! - `{{type.name.attr}}` / `{{data.type.name.attr}}` - attribute of another
//!   resource in the state

use super::state::{ResourceInstance, State};
use crate::config::ProviderConfig;
use crate::error::{Error, Result};
use crate::gcp::json::scalar_to_string;
use std::collections::BTreeMap;

/// Everything a template may draw values from
#[derive(Debug, Clone)]
pub struct ResolveContext<'a> {
    pub provider: &'a ProviderConfig,
    pub instance: Option<&'a ResourceInstance>,
    pub state: Option<&'a State>,
    pub overrides: BTreeMap<String, String>,
}

impl<'a> ResolveContext<'a> {
    pub fn new(provider: &'a ProviderConfig) -> Self {
        Self {
            provider,
            instance: None,
            state: None,
            overrides: BTreeMap::new(),
        }
    }

    pub fn with_instance(mut self, instance: &'a ResourceInstance) -> Self {
        self.instance = Some(instance);
        self
    }

    pub fn with_state(mut self, state: &'a State) -> Self {
        self.state = Some(state);
        self
    }

    pub fn with_override(mut self, name: &str, value: &str) -> Self {
        self.overrides.insert(name.to_string(), value.to_string());
        self
    }

    fn instance_attribute(&self, name: &str) -> Option<String> {
        self.instance.and_then(|i| i.string_attribute(name))
    }

    fn lookup(&self, name: &str) -> Option<String> {
        if let Some(value) = self.overrides.get(name).filter(|v| !v.is_empty()) {
            return Some(value.clone());
        }

        match name {
            "project" => self
                .instance_attribute("project")
                .or_else(|| self.provider.field("project").map(str::to_string)),
            // Regions and zones are often stored as self-links
            "region" | "zone" => self
                .instance_attribute(name)
                .map(|v| last_segment(&v).to_string())
                .filter(|v| !v.is_empty())
                .or_else(|| self.provider.field(name).map(str::to_string)),
            _ => {
                if name.contains('.') {
                    let reference = self
                        .state
                        .and_then(|state| state.lookup(name))
                        .and_then(scalar_to_string)
                        .filter(|v| !v.is_empty());
                    if reference.is_some() {
                        return reference;
                    }
                }
                self.instance_attribute(name)
                    .or_else(|| self.provider.field(name).map(str::to_string))
            }
        }
    }
}

fn last_segment(value: &str) -> &str {
    value.rsplit('/').next().unwrap_or(value)
}

/// Expand every `{{...}}` placeholder in `template`
pub fn resolve(template: &str, ctx: &ResolveContext<'_>) -> Result<String> {
    let unresolved = |placeholder: &str| Error::UnresolvedReference {
        template: template.to_string(),
        placeholder: placeholder.to_string(),
    };

    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let end = after.find("}}").ok_or_else(|| unresolved(after))?;
        let raw = after[..end].trim();
        let (escape, name) = match raw.strip_prefix('%') {
            Some(name) => (true, name.trim()),
            None => (false, raw),
        };
        if name.is_empty() {
            return Err(unresolved(raw));
        }
        let value = ctx.lookup(name).ok_or_else(|| unresolved(name))?;
        if escape {
            out.push_str(&urlencoding::encode(&value));
        } else {
            out.push_str(&value);
        }
        rest = &after[end + 2..];
    }
    out.push_str(rest);
    Ok(out)
}

/// Substitute `%{name}` variables in a test configuration.
///
/// Only identifiers (`[A-Za-z_][A-Za-z0-9_]*`) are variables, and an
/// unknown one is an error. Everything else is left as written: `%%{` is
/// HCL's escape for a literal `%{`, and `%{ if ... }` is a template
/// directive the provider evaluates.
pub fn expand_config(template: &str, vars: &BTreeMap<String, String>) -> Result<String> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find('%') {
        out.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        if let Some(tail) = after.strip_prefix('%') {
            out.push_str("%%");
            rest = tail;
        } else if let Some((name, tail)) = config_variable(after) {
            let value = vars.get(name).ok_or_else(|| Error::UnresolvedReference {
                template: template.to_string(),
                placeholder: name.to_string(),
            })?;
            out.push_str(value);
            rest = tail;
        } else {
            out.push('%');
            rest = after;
        }
    }
    out.push_str(rest);
    Ok(out)
}

/// Split `{ident}rest` into `(ident, rest)`
fn config_variable(s: &str) -> Option<(&str, &str)> {
    let body = s.strip_prefix('{')?;
    let end = body.find('}')?;
    let name = &body[..end];
    let mut chars = name.chars();
    let first = chars.next()?;
    let is_ident = (first.is_ascii_alphabetic() || first == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
    is_ident.then(|| (name, &body[end + 1..]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HarnessConfig;
    use crate::resource::state::ResourceAddress;
    use serde_json::json;

    fn provider() -> ProviderConfig {
        HarnessConfig {
            project: Some("my-project-1".to_string()),
            region: Some("us-central1".to_string()),
            zone: Some("us-central1-b".to_string()),
            ..Default::default()
        }
        .provider_config()
    }

    fn instance(value: serde_json::Value) -> ResourceInstance {
        ResourceInstance::from_value(value).unwrap()
    }

    #[test]
    fn test_signed_url_key_parent_url() {
        let provider = provider();
        let key = instance(json!({"name": "test-key-abc", "backend_bucket": "test-bucket-1"}));
        let ctx = ResolveContext::new(&provider).with_instance(&key);
        let url = resolve(
            "{{ComputeBasePath}}projects/{{project}}/global/backendBuckets/{{backend_bucket}}",
            &ctx,
        )
        .unwrap();
        assert_eq!(
            url,
            "https://compute.googleapis.com/compute/v1/projects/my-project-1/global/backendBuckets/test-bucket-1"
        );
    }

    #[test]
    fn test_instance_project_wins_over_provider() {
        let provider = provider();
        let policy = instance(json!({"project": "other-project", "location": "us-east1", "policy_id": "p"}));
        let ctx = ResolveContext::new(&provider).with_instance(&policy);
        let url = resolve(
            "{{DataprocBasePath}}projects/{{project}}/locations/{{location}}/autoscalingPolicies/{{policy_id}}",
            &ctx,
        )
        .unwrap();
        assert!(url.ends_with("projects/other-project/locations/us-east1/autoscalingPolicies/p"));
    }

    #[test]
    fn test_zone_self_link_shortened_and_defaulted() {
        let provider = provider();
        let node = instance(json!({
            "name": "tpu-1",
            "zone": "https://www.googleapis.com/compute/v1/projects/p/zones/us-central1-c"
        }));
        let ctx = ResolveContext::new(&provider).with_instance(&node);
        assert_eq!(resolve("{{zone}}", &ctx).unwrap(), "us-central1-c");

        let bare = instance(json!({"name": "tpu-1"}));
        let ctx = ResolveContext::new(&provider).with_instance(&bare);
        assert_eq!(resolve("{{zone}}", &ctx).unwrap(), "us-central1-b");
    }

    #[test]
    fn test_unresolved_placeholder_is_error() {
        let provider = provider();
        let ctx = ResolveContext::new(&provider);
        let err = resolve("{{ComputeBasePath}}projects/{{project}}/x/{{name}}", &ctx).unwrap_err();
        match err {
            Error::UnresolvedReference { placeholder, .. } => assert_eq!(placeholder, "name"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_empty_attribute_is_unresolved() {
        let provider = provider();
        let i = instance(json!({"name": ""}));
        let ctx = ResolveContext::new(&provider).with_instance(&i);
        assert!(resolve("{{name}}", &ctx).is_err());
    }

    #[test]
    fn test_unterminated_placeholder_is_error() {
        let provider = provider();
        let ctx = ResolveContext::new(&provider);
        assert!(matches!(
            resolve("{{project", &ctx),
            Err(Error::UnresolvedReference { .. })
        ));
    }

    #[test]
    fn test_escaped_placeholder() {
        let provider = provider();
        let i = instance(json!({"name": "a/b c"}));
        let ctx = ResolveContext::new(&provider).with_instance(&i);
        assert_eq!(resolve("o/{{%name}}", &ctx).unwrap(), "o/a%2Fb%20c");
        assert_eq!(resolve("o/{{name}}", &ctx).unwrap(), "o/a/b c");
    }

    #[test]
    fn test_cross_resource_reference() {
        let provider = provider();
        let mut state = State::new();
        state.insert(
            ResourceAddress::managed("google_compute_backend_bucket", "test_backend_bucket"),
            instance(json!({"name": "test-bucket-xyz"})),
        );
        let ctx = ResolveContext::new(&provider).with_state(&state);
        let url = resolve(
            "backendBuckets/{{google_compute_backend_bucket.test_backend_bucket.name}}",
            &ctx,
        )
        .unwrap();
        assert_eq!(url, "backendBuckets/test-bucket-xyz");
    }

    #[test]
    fn test_override_wins() {
        let provider = provider();
        let i = instance(json!({"name": "from-state"}));
        let ctx = ResolveContext::new(&provider)
            .with_instance(&i)
            .with_override("name", "explicit");
        assert_eq!(resolve("{{name}}", &ctx).unwrap(), "explicit");
    }

    #[test]
    fn test_expand_config() {
        let vars: BTreeMap<String, String> =
            [("random_suffix".to_string(), "abc123".to_string())].into();
        let config = r#"resource "google_storage_bucket" "b" { name = "tf-test-%{random_suffix}" }"#;
        assert_eq!(
            expand_config(config, &vars).unwrap(),
            r#"resource "google_storage_bucket" "b" { name = "tf-test-abc123" }"#
        );
        assert!(expand_config("%{unknown}", &vars).is_err());
        assert_eq!(expand_config("50% off", &vars).unwrap(), "50% off");
    }

    #[test]
    fn test_expand_config_leaves_hcl_templates() {
        let vars: BTreeMap<String, String> =
            [("random_suffix".to_string(), "abc123".to_string())].into();
        assert_eq!(
            expand_config(r#"lit = "%%{literal}""#, &vars).unwrap(),
            r#"lit = "%%{literal}""#
        );
        assert_eq!(
            expand_config("%{ if true }on%{ endif }-%{random_suffix}", &vars).unwrap(),
            "%{ if true }on%{ endif }-abc123"
        );
        assert_eq!(expand_config("100%%", &vars).unwrap(), "100%%");
        assert_eq!(expand_config("%{unterminated", &vars).unwrap(), "%{unterminated");
    }
}
