//! Request signatures
//!
//! A signature is what replay matches on: the method, the URL with volatile
//! query parameters dropped and the rest sorted, and the body in canonical
//! JSON form (object keys sorted, volatile fields removed). Two requests that
//! differ only in key order or request IDs have equal signatures.

use super::redact::{redact_body, redact_url};
use serde_json::Value;
use std::fmt;

/// Query parameters that change between otherwise identical calls
pub const VOLATILE_QUERY_PARAMS: &[&str] = &[
    "requestId",
    "alt",
    "prettyPrint",
    "quotaUser",
    "key",
    "access_token",
];

/// Body fields that change between otherwise identical calls
pub const VOLATILE_BODY_FIELDS: &[&str] = &["requestId"];

/// Normalized identity of a request
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestSignature {
    pub method: String,
    pub url: String,
    pub body: Option<String>,
}

impl RequestSignature {
    /// Signature of a request, after the same redaction applied on record
    pub fn of(method: &str, url: &str, body: Option<&str>) -> Self {
        let url = redact_url(url);
        let body = body.map(redact_body);
        Self {
            method: method.trim().to_ascii_uppercase(),
            url: normalize_url(&url),
            body: body.and_then(|b| canonical_body(&b)),
        }
    }

    /// URL without its query string, for finding near misses
    pub fn path(&self) -> &str {
        self.url.split('?').next().unwrap_or(&self.url)
    }
}

impl fmt::Display for RequestSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.url)?;
        if let Some(body) = &self.body {
            write!(f, "\n    body: {}", body)?;
        }
        Ok(())
    }
}

/// Drop volatile query params, sort the rest, strip the fragment
pub fn normalize_url(raw: &str) -> String {
    let Ok(mut parsed) = url::Url::parse(raw.trim()) else {
        return raw.trim().to_string();
    };
    parsed.set_fragment(None);

    let mut pairs: Vec<(String, String)> = parsed
        .query_pairs()
        .filter(|(k, _)| !VOLATILE_QUERY_PARAMS.contains(&&**k))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    pairs.sort();

    if pairs.is_empty() {
        parsed.set_query(None);
    } else {
        parsed.query_pairs_mut().clear().extend_pairs(pairs);
    }
    parsed.to_string()
}

/// Canonical form of a body; `None` for empty bodies
pub fn canonical_body(body: &str) -> Option<String> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return None;
    }
    match serde_json::from_str::<Value>(trimmed) {
        Ok(mut value) => {
            strip_volatile(&mut value);
            Some(canonical_json(&value))
        }
        Err(_) => Some(trimmed.to_string()),
    }
}

fn strip_volatile(value: &mut Value) {
    match value {
        Value::Object(map) => {
            map.retain(|k, _| !VOLATILE_BODY_FIELDS.contains(&k.as_str()));
            map.values_mut().for_each(strip_volatile);
        }
        Value::Array(items) => items.iter_mut().for_each(strip_volatile),
        _ => {}
    }
}

/// Serialize with object keys sorted at every level, independent of how
/// `serde_json::Map` orders its entries
pub fn canonical_json(value: &Value) -> String {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let fields: Vec<String> = keys
                .into_iter()
                .map(|k| format!("{}:{}", Value::String(k.clone()), canonical_json(&map[k])))
                .collect();
            format!("{{{}}}", fields.join(","))
        }
        Value::Array(items) => {
            let items: Vec<String> = items.iter().map(canonical_json).collect();
            format!("[{}]", items.join(","))
        }
        scalar => scalar.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_order_does_not_matter() {
        let a = RequestSignature::of("post", "https://x/v1/a", Some(r#"{"b":1,"a":{"d":2,"c":3}}"#));
        let b = RequestSignature::of("POST", "https://x/v1/a", Some(r#"{"a":{"c":3,"d":2},"b":1}"#));
        assert_eq!(a, b);
    }

    #[test]
    fn test_array_order_matters() {
        let a = RequestSignature::of("POST", "https://x/v1/a", Some(r#"{"k":[1,2]}"#));
        let b = RequestSignature::of("POST", "https://x/v1/a", Some(r#"{"k":[2,1]}"#));
        assert_ne!(a, b);
    }

    #[test]
    fn test_volatile_query_params_dropped_and_sorted() {
        assert_eq!(
            normalize_url("https://x/v1/a?requestId=123&b=2&a=1&alt=json"),
            "https://x/v1/a?a=1&b=2"
        );
        assert_eq!(normalize_url("https://x/v1/a?alt=json"), "https://x/v1/a");
    }

    #[test]
    fn test_volatile_body_fields_dropped() {
        let a = RequestSignature::of("POST", "https://x/a", Some(r#"{"name":"n","requestId":"1"}"#));
        let b = RequestSignature::of("POST", "https://x/a", Some(r#"{"name":"n","requestId":"2"}"#));
        assert_eq!(a, b);
    }

    #[test]
    fn test_secrets_redacted_before_matching() {
        let live = RequestSignature::of("POST", "https://x/a", Some(r#"{"keyValue":"real-secret"}"#));
        let stored = RequestSignature::of("POST", "https://x/a", Some(r#"{"keyValue":"<REDACTED>"}"#));
        assert_eq!(live, stored);
        assert!(!live.to_string().contains("real-secret"));
    }

    #[test]
    fn test_empty_body_is_none() {
        assert_eq!(RequestSignature::of("GET", "https://x/a", Some("  ")).body, None);
    }

    #[test]
    fn test_non_json_body_kept_verbatim() {
        assert_eq!(canonical_body(" plain text "), Some("plain text".to_string()));
    }

    #[test]
    fn test_canonical_json_escapes_keys() {
        let v: Value = serde_json::from_str(r#"{"a\"b":"c"}"#).unwrap();
        assert_eq!(canonical_json(&v), r#"{"a\"b":"c"}"#);
    }
}
