//! Typed access to the host-supplied configuration map.

use serde_json::Value;

use crate::error::{DatabaseError, DatabaseResult};
use crate::requests::ConfigMap;

/// Key of the username template option.
pub const USERNAME_TEMPLATE: &str = "username_template";

/// Read-only typed view over a [`ConfigMap`].
#[derive(Debug, Clone, Copy)]
pub struct ConfigReader<'a> {
    map: &'a ConfigMap,
}

impl<'a> ConfigReader<'a> {
    /// Wrap a configuration map.
    #[must_use]
    pub const fn new(map: &'a ConfigMap) -> Self {
        Self { map }
    }

    /// String option. Absent or `null` yields `None`.
    ///
    /// # Errors
    ///
    /// Returns [`DatabaseError::Configuration`] if the value is not a string.
    pub fn string(&self, key: &str) -> DatabaseResult<Option<&'a str>> {
        match self.map.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.as_str())),
            Some(other) => Err(DatabaseError::configuration(format!(
                "failed to retrieve {key}: expected a string, got {}",
                type_name(other)
            ))),
        }
    }

    /// Non-empty string option.
    ///
    /// # Errors
    ///
    /// Returns [`DatabaseError::Configuration`] if the value is not a string.
    pub fn non_empty_string(&self, key: &str) -> DatabaseResult<Option<&'a str>> {
        Ok(self.string(key)?.filter(|s| !s.is_empty()))
    }

    /// Unsigned integer option, given as a JSON number or a numeric string.
    ///
    /// # Errors
    ///
    /// Returns [`DatabaseError::Configuration`] for anything else.
    pub fn u64(&self, key: &str) -> DatabaseResult<Option<u64>> {
        let invalid = || DatabaseError::configuration(format!("{key} must be a non-negative integer"));
        match self.map.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Number(n)) => n.as_u64().map(Some).ok_or_else(invalid),
            Some(Value::String(s)) if s.is_empty() => Ok(None),
            Some(Value::String(s)) => s.trim().parse().map(Some).map_err(|_| invalid()),
            Some(_) => Err(invalid()),
        }
    }
}

const fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
