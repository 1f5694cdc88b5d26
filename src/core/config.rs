// Flat configuration tree built from the host's nested config records.
// Keys are dotted paths ("electrodes.model"); values are always strings.
use std::collections::BTreeMap;

use tracing::trace;

use crate::core::value::{Fields, Value};

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ParamTree {
    entries: BTreeMap<String, String>,
}

impl ParamTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Flatten a nested host record into dotted keys.
    ///
    /// Permissive policy: string leaves are stored, nested records recurse,
    /// every other value class is skipped. Create-time configs embed raw mesh
    /// arrays next to string parameters, so skipping is the only workable
    /// policy here; marshaling of those arrays happens separately.
    pub fn from_struct(fields: &Fields) -> Self {
        let mut tree = Self::new();
        tree.absorb(fields, "");
        tree
    }

    fn absorb(&mut self, fields: &Fields, prefix: &str) {
        for (name, value) in fields.iter() {
            let key = if prefix.is_empty() {
                name.to_string()
            } else {
                format!("{prefix}.{name}")
            };
            match value {
                Value::Str(text) => {
                    self.entries.insert(key, text.clone());
                }
                Value::Struct(sub) => {
                    self.absorb(sub, &key);
                }
                other => {
                    trace!(key = %key, class = other.class_name(), "skipping non-string config leaf");
                }
            }
        }
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    pub fn get_or<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        self.get(key).unwrap_or(default)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .map(|(key, value)| (key.as_str(), value.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
