//! Fallible accessors over decoded JSON responses
//!
//! Responses stay as [`serde_json::Value`]. These helpers distinguish a
//! field that is absent from one that is present with the wrong type, so a
//! changed API shape surfaces as [`Error::Shape`] instead of being read as
//! "missing".

use crate::error::{Error, Result};
use serde_json::{Map, Value};

/// Name of a JSON value's type, for error messages
pub fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Typed, fallible field access on a JSON value
pub trait ValueExt {
    /// The value as an object, or a shape error naming `context`
    fn expect_object(&self, context: &str) -> Result<&Map<String, Value>>;

    /// Field `key` of an object; `Ok(None)` if absent or null
    fn field(&self, key: &str) -> Result<Option<&Value>>;

    /// Field `key` as a string; absent is `Ok(None)`, non-string is an error
    fn str_field(&self, key: &str) -> Result<Option<&str>>;

    /// Field `key` as an object; absent is `Ok(None)`, non-object is an error
    fn object_field(&self, key: &str) -> Result<Option<&Map<String, Value>>>;

    /// Field `key` as an array; absent is `Ok(None)`, non-array is an error
    fn array_field(&self, key: &str) -> Result<Option<&Vec<Value>>>;

    /// Walk a dotted path of object keys; `Ok(None)` at the first absent key
    fn lookup_path(&self, path: &[&str]) -> Result<Option<&Value>>;
}

impl ValueExt for Value {
    fn expect_object(&self, context: &str) -> Result<&Map<String, Value>> {
        self.as_object()
            .ok_or_else(|| Error::shape(context, "object", self))
    }

    fn field(&self, key: &str) -> Result<Option<&Value>> {
        let map = self.expect_object(key)?;
        Ok(map.get(key).filter(|v| !v.is_null()))
    }

    fn str_field(&self, key: &str) -> Result<Option<&str>> {
        match self.field(key)? {
            None => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.as_str())),
            Some(other) => Err(Error::shape(key, "string", other)),
        }
    }

    fn object_field(&self, key: &str) -> Result<Option<&Map<String, Value>>> {
        match self.field(key)? {
            None => Ok(None),
            Some(Value::Object(m)) => Ok(Some(m)),
            Some(other) => Err(Error::shape(key, "object", other)),
        }
    }

    fn array_field(&self, key: &str) -> Result<Option<&Vec<Value>>> {
        match self.field(key)? {
            None => Ok(None),
            Some(Value::Array(a)) => Ok(Some(a)),
            Some(other) => Err(Error::shape(key, "array", other)),
        }
    }

    fn lookup_path(&self, path: &[&str]) -> Result<Option<&Value>> {
        let mut current = self;
        for (depth, part) in path.iter().enumerate() {
            let Value::Object(map) = current else {
                return Err(Error::shape(path[..depth].join("."), "object", current));
            };
            match map.get(*part).filter(|v| !v.is_null()) {
                Some(v) => current = v,
                None => return Ok(None),
            }
        }
        Ok(Some(current))
    }
}

/// Render a scalar JSON value the way state attributes store it
pub fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}
