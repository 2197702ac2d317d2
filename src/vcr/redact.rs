//! Secret scrubbing for stored interactions
//!
//! Sensitive values are replaced by a fixed placeholder before a cassette is
//! written. Replayed requests go through the same scrubbing before their
//! signature is computed, so a request carrying a real key still matches the
//! stored placeholder.

use serde_json::Value;
use std::borrow::Cow;

/// Placeholder written in place of secrets
pub const REDACTED: &str = "<REDACTED>";

/// JSON fields whose values never reach disk
pub const SENSITIVE_FIELDS: &[&str] = &[
    "keyValue",
    "key_value",
    "password",
    "secret",
    "privateKey",
    "private_key",
    "privateKeyData",
    "accessToken",
    "access_token",
    "refreshToken",
    "refresh_token",
    "token",
    "clientSecret",
    "client_secret",
];

/// Query parameters whose values never reach disk
pub const SENSITIVE_QUERY_PARAMS: &[&str] = &["key", "access_token", "token"];

/// Request headers kept in a cassette; everything else (notably
/// `authorization`) is dropped
pub const RECORDED_REQUEST_HEADERS: &[&str] = &["content-type", "x-goog-user-project"];

/// Response headers kept in a cassette
pub const RECORDED_RESPONSE_HEADERS: &[&str] = &["content-type"];

fn is_sensitive_field(key: &str) -> bool {
    SENSITIVE_FIELDS.iter().any(|f| f.eq_ignore_ascii_case(key))
}

/// Replace sensitive values in place; returns true if anything changed
pub fn redact_json(value: &mut Value) -> bool {
    match value {
        Value::Object(map) => {
            let mut changed = false;
            for (key, v) in map.iter_mut() {
                if is_sensitive_field(key) && !v.is_null() {
                    if v.as_str() != Some(REDACTED) {
                        *v = Value::String(REDACTED.to_string());
                        changed = true;
                    }
                } else {
                    changed |= redact_json(v);
                }
            }
            changed
        }
        Value::Array(items) => items.iter_mut().fold(false, |acc, v| redact_json(v) | acc),
        _ => false,
    }
}

/// Redact a request or response body.
///
/// Bodies are returned untouched unless a secret was found, so stored
/// interactions stay byte-for-byte what the API sent.
pub fn redact_body(body: &str) -> Cow<'_, str> {
    let Ok(mut value) = serde_json::from_str::<Value>(body) else {
        return Cow::Borrowed(body);
    };
    if redact_json(&mut value) {
        Cow::Owned(value.to_string())
    } else {
        Cow::Borrowed(body)
    }
}

/// Redact sensitive query parameter values
pub fn redact_url(raw: &str) -> Cow<'_, str> {
    let Ok(mut parsed) = url::Url::parse(raw) else {
        return Cow::Borrowed(raw);
    };
    let pairs: Vec<(String, String)> = parsed
        .query_pairs()
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    let needs_redaction = pairs
        .iter()
        .any(|(k, v)| SENSITIVE_QUERY_PARAMS.contains(&k.as_str()) && v != REDACTED);
    if !needs_redaction {
        return Cow::Borrowed(raw);
    }

    parsed.query_pairs_mut().clear().extend_pairs(pairs.iter().map(|(k, v)| {
        if SENSITIVE_QUERY_PARAMS.contains(&k.as_str()) {
            (k.as_str(), REDACTED)
        } else {
            (k.as_str(), v.as_str())
        }
    }));
    Cow::Owned(parsed.to_string())
}

/// Keep only the allow-listed headers, lowercased and sorted
pub fn filter_headers<'a, I>(headers: I, allowed: &[&str]) -> std::collections::BTreeMap<String, String>
where
    I: IntoIterator<Item = &'a (String, String)>,
{
    headers
        .into_iter()
        .filter(|(k, _)| allowed.iter().any(|a| a.eq_ignore_ascii_case(k)))
        .map(|(k, v)| (k.to_ascii_lowercase(), v.clone()))
        .collect()
}

/// Paths (dotted) of sensitive fields that still carry a real value
pub fn find_unredacted(body: &str) -> Vec<String> {
    fn walk(value: &Value, path: &str, out: &mut Vec<String>) {
        match value {
            Value::Object(map) => {
                for (key, v) in map {
                    let child = if path.is_empty() {
                        key.clone()
                    } else {
                        format!("{}.{}", path, key)
                    };
                    if is_sensitive_field(key) && !v.is_null() && v.as_str() != Some(REDACTED) {
                        out.push(child);
                    } else {
                        walk(v, &child, out);
                    }
                }
            }
            Value::Array(items) => {
                for (i, v) in items.iter().enumerate() {
                    walk(v, &format!("{}.{}", path, i), out);
                }
            }
            _ => {}
        }
    }

    let mut found = Vec::new();
    if let Ok(value) = serde_json::from_str::<Value>(body) {
        walk(&value, "", &mut found);
    }
    found
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_redacts_nested_secrets() {
        let mut v = json!({
            "name": "test-key-abc",
            "keyValue": "iAmAFakeKeyRandomBytes==",
            "nested": [{"password": "hunter2", "user": "bob"}]
        });
        assert!(redact_json(&mut v));
        assert_eq!(v["keyValue"], REDACTED);
        assert_eq!(v["nested"][0]["password"], REDACTED);
        assert_eq!(v["nested"][0]["user"], "bob");
        assert_eq!(v["name"], "test-key-abc");
    }

    #[test]
    fn test_redaction_is_idempotent() {
        let mut v = json!({"keyValue": "secret"});
        redact_json(&mut v);
        let once = v.clone();
        assert!(!redact_json(&mut v));
        assert_eq!(v, once);
    }

    #[test]
    fn test_body_without_secrets_is_untouched() {
        let body = "{ \"name\" : \"x\" }";
        assert!(matches!(redact_body(body), Cow::Borrowed(_)));
        assert!(matches!(redact_body("not json"), Cow::Borrowed(_)));
    }

    #[test]
    fn test_redact_url_query() {
        let url = "https://example.com/v1/x?key=AIzaSecret&alt=json";
        let redacted = redact_url(url);
        assert!(!redacted.contains("AIzaSecret"));
        assert!(redacted.contains("alt=json"));
        assert!(matches!(
            redact_url("https://example.com/v1/x?alt=json"),
            Cow::Borrowed(_)
        ));
    }

    #[test]
    fn test_filter_headers_drops_authorization() {
        let headers = vec![
            ("Authorization".to_string(), "Bearer t".to_string()),
            ("Content-Type".to_string(), "application/json".to_string()),
        ];
        let kept = filter_headers(&headers, RECORDED_REQUEST_HEADERS);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept["content-type"], "application/json");
    }

    #[test]
    fn test_find_unredacted() {
        let body = r#"{"a":{"keyValue":"real"},"b":[{"token":"<REDACTED>"}]}"#;
        assert_eq!(find_unredacted(body), vec!["a.keyValue".to_string()]);
    }
}
