//! Flattened status documents.
//!
//! The management API answers with nested JSON. Collectors address values by
//! dotted path (`message_stats.ack_details.rate`), so documents are flattened
//! once on arrival and discarded after a single collection.

use std::collections::HashMap;

use serde_json::Value;
use tracing::trace;

/// A leaf of a flattened document.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    /// A numeric value.
    Number(f64),
    /// A scalar that cannot be read as a number, kept as raw text.
    Malformed(String),
}

/// Mapping from dotted path to leaf value for one fetch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FlattenedDocument {
    fields: HashMap<String, FieldValue>,
}

impl FlattenedDocument {
    /// Create an empty document.
    pub fn new() -> Self {
        Self::default()
    }

    /// Flatten a JSON value.
    ///
    /// Nested objects are joined with `.`. Numbers are kept, finite numeric
    /// strings are parsed, other strings (including `"NaN"` and `"inf"`) and
    /// booleans become [`FieldValue::Malformed`].
    /// `null` leaves are dropped so they read as absent. Arrays are not
    /// descended into. A non-object root yields an empty document.
    pub fn from_json(value: &Value) -> Self {
        let mut doc = Self::new();
        if let Value::Object(map) = value {
            for (key, child) in map {
                doc.flatten_into(key.clone(), child);
            }
        }
        doc
    }

    fn flatten_into(&mut self, path: String, value: &Value) {
        match value {
            Value::Object(map) => {
                for (key, child) in map {
                    self.flatten_into(format!("{}.{}", path, key), child);
                }
            }
            Value::Number(n) => match n.as_f64() {
                Some(v) => self.insert_number(path, v),
                None => self.insert_malformed(path, n.to_string()),
            },
            Value::String(s) => match s.trim().parse::<f64>() {
                Ok(v) if v.is_finite() => self.insert_number(path, v),
                _ => self.insert_malformed(path, s.clone()),
            },
            Value::Bool(b) => self.insert_malformed(path, b.to_string()),
            Value::Array(items) => {
                trace!(path = %path, len = items.len(), "Skipping array field");
            }
            Value::Null => {}
        }
    }

    /// Insert or replace a numeric field.
    pub fn insert_number(&mut self, path: impl Into<String>, value: f64) {
        self.fields.insert(path.into(), FieldValue::Number(value));
    }

    /// Insert or replace a field that is present but not numeric.
    pub fn insert_malformed(&mut self, path: impl Into<String>, raw: impl Into<String>) {
        self.fields
            .insert(path.into(), FieldValue::Malformed(raw.into()));
    }

    /// Look up a field by dotted path.
    pub fn get(&self, path: &str) -> Option<&FieldValue> {
        self.fields.get(path)
    }

    /// Look up a numeric field, ignoring malformed entries.
    pub fn number(&self, path: &str) -> Option<f64> {
        match self.fields.get(path) {
            Some(FieldValue::Number(v)) => Some(*v),
            _ => None,
        }
    }

    /// Number of fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether the document has no fields.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl<K: Into<String>> FromIterator<(K, f64)> for FlattenedDocument {
    fn from_iter<I: IntoIterator<Item = (K, f64)>>(iter: I) -> Self {
        let mut doc = Self::new();
        for (path, value) in iter {
            doc.insert_number(path, value);
        }
        doc
    }
}
