//! Configuration entries
//!
//! A [`ConfigEntry`] is an owned key/value mapping belonging to exactly one
//! [`crate::ConfigScope`]. Cloning produces an independent copy, so handing
//! an entry out never exposes the stored one to mutation.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// String-to-string configuration mapping for one scope
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConfigEntry(BTreeMap<String, String>);

impl ConfigEntry {
    /// Create an empty entry
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// Insert or overwrite a key, returning the previous value
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) -> Option<String> {
        self.0.insert(key.into(), value.into())
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.0.remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate entries in key order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn into_inner(self) -> BTreeMap<String, String> {
        self.0
    }
}

impl From<BTreeMap<String, String>> for ConfigEntry {
    fn from(map: BTreeMap<String, String>) -> Self {
        Self(map)
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for ConfigEntry {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_and_get_single_key() {
        let mut entry: ConfigEntry = [("ip", "10.0.0.1"), ("port", "9000")].into_iter().collect();
        assert_eq!(entry.set("port", "9100"), Some("9000".to_string()));
        assert_eq!(entry.get("port"), Some("9100"));
        assert_eq!(entry.get("ip"), Some("10.0.0.1"));
        assert_eq!(entry.len(), 2);
    }

    #[test]
    fn test_wire_shape_is_flat_object() {
        let entry: ConfigEntry = [("host", "149.201.88.75"), ("start", "1")].into_iter().collect();
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json, serde_json::json!({ "host": "149.201.88.75", "start": "1" }));

        let back: ConfigEntry = serde_json::from_value(json).unwrap();
        assert_eq!(back, entry);
    }

    #[test]
    fn test_clone_is_independent() {
        let original: ConfigEntry = [("ip", "10.0.0.1")].into_iter().collect();
        let mut copy = original.clone();
        copy.set("ip", "10.0.0.9");
        assert_eq!(original.get("ip"), Some("10.0.0.1"));
    }
}
