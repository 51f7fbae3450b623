use axum::http::HeaderMap;
use serde_json::{Map, Value};
use std::collections::HashSet;

use crate::config::LoggingConfig;

pub const REDACTED: &str = "[REDACTED]";

/// Masks values whose key names look sensitive before they reach the logs.
///
/// A key is sensitive when its lower-cased name contains any deny-list entry,
/// unless the exact (case-insensitive) name is on the allow list.
#[derive(Debug, Clone, Default)]
pub struct Redactor {
    deny: Vec<String>,
    allow: HashSet<String>,
}

impl Redactor {
    pub fn new<D, A, S>(deny: D, allow: A) -> Self
    where
        D: IntoIterator<Item = S>,
        A: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            deny: deny
                .into_iter()
                .map(|s| s.as_ref().trim().to_lowercase())
                .filter(|s| !s.is_empty())
                .collect(),
            allow: allow
                .into_iter()
                .map(|s| s.as_ref().trim().to_lowercase())
                .collect(),
        }
    }

    pub fn from_config(config: &LoggingConfig) -> Self {
        Self::new(&config.redact_fields, &config.allow_fields)
    }

    pub fn is_sensitive(&self, key: &str) -> bool {
        let key = key.to_lowercase();
        if self.allow.contains(&key) {
            return false;
        }
        self.deny.iter().any(|field| key.contains(field.as_str()))
    }

    /// Recursively redacts object members; arrays are walked element by element
    pub fn redact_value(&self, value: &Value) -> Value {
        match value {
            Value::Object(map) => Value::Object(
                map.iter()
                    .map(|(key, value)| {
                        let value = if self.is_sensitive(key) {
                            Value::String(REDACTED.to_string())
                        } else {
                            self.redact_value(value)
                        };
                        (key.clone(), value)
                    })
                    .collect(),
            ),
            Value::Array(items) => Value::Array(items.iter().map(|v| self.redact_value(v)).collect()),
            other => other.clone(),
        }
    }

    pub fn redact_pairs<I>(&self, pairs: I) -> Map<String, Value>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        pairs
            .into_iter()
            .map(|(key, value)| {
                let value = if self.is_sensitive(&key) {
                    REDACTED.to_string()
                } else {
                    value
                };
                (key, Value::String(value))
            })
            .collect()
    }

    /// Header map as JSON; repeated headers become arrays
    pub fn redact_headers(&self, headers: &HeaderMap) -> Map<String, Value> {
        let mut out = Map::new();
        for name in headers.keys() {
            let values: Vec<Value> = headers
                .get_all(name)
                .iter()
                .map(|v| {
                    if self.is_sensitive(name.as_str()) {
                        Value::String(REDACTED.to_string())
                    } else {
                        Value::String(v.to_str().unwrap_or("<invalid-utf8>").to_string())
                    }
                })
                .collect();

            let value = match <[Value; 1]>::try_from(values) {
                Ok([single]) => single,
                Err(many) => Value::Array(many),
            };
            out.insert(name.as_str().to_string(), value);
        }
        out
    }
}
