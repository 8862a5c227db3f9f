//! Insertion-ordered claim mapping
//!
//! Claims keep document order through every stage, and the aggregator slices
//! flat result lists by walking claims in that order. A `HashMap` would lose
//! it, so this is a small ordered map keyed by claim text. It serializes as a
//! JSON object whose keys appear in insertion order.

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::marker::PhantomData;

#[derive(Debug, Clone, PartialEq)]
pub struct ClaimMap<V> {
    entries: Vec<(String, V)>,
}

impl<V> Default for ClaimMap<V> {
    fn default() -> Self {
        Self { entries: Vec::new() }
    }
}

impl<V> ClaimMap<V> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
        }
    }

    /// Insert a claim. A repeated claim keeps its original position and
    /// takes the new value.
    pub fn insert(&mut self, claim: impl Into<String>, value: V) -> Option<V> {
        let claim = claim.into();
        match self.entries.iter_mut().find(|(k, _)| *k == claim) {
            Some((_, existing)) => Some(std::mem::replace(existing, value)),
            None => {
                self.entries.push((claim, value));
                None
            }
        }
    }

    pub fn get(&self, claim: &str) -> Option<&V> {
        self.entries.iter().find(|(k, _)| k == claim).map(|(_, v)| v)
    }

    pub fn get_mut(&mut self, claim: &str) -> Option<&mut V> {
        self.entries
            .iter_mut()
            .find(|(k, _)| k == claim)
            .map(|(_, v)| v)
    }

    pub fn contains(&self, claim: &str) -> bool {
        self.get(claim).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn values(&self) -> impl Iterator<Item = &V> {
        self.entries.iter().map(|(_, v)| v)
    }

    pub fn values_mut(&mut self) -> impl Iterator<Item = &mut V> {
        self.entries.iter_mut().map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &V)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Build a map with the same claims in the same order
    pub fn map_values<U>(self, mut f: impl FnMut(&str, V) -> U) -> ClaimMap<U> {
        ClaimMap {
            entries: self
                .entries
                .into_iter()
                .map(|(k, v)| {
                    let mapped = f(&k, v);
                    (k, mapped)
                })
                .collect(),
        }
    }
}

impl<V> IntoIterator for ClaimMap<V> {
    type Item = (String, V);
    type IntoIter = std::vec::IntoIter<(String, V)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl<K: Into<String>, V> FromIterator<(K, V)> for ClaimMap<V> {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut map = ClaimMap::new();
        for (k, v) in iter {
            map.insert(k, v);
        }
        map
    }
}

impl<V: Serialize> Serialize for ClaimMap<V> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (k, v) in &self.entries {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

impl<'de, V: Deserialize<'de>> Deserialize<'de> for ClaimMap<V> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct ClaimMapVisitor<V>(PhantomData<V>);

        impl<'de, V: Deserialize<'de>> Visitor<'de> for ClaimMapVisitor<V> {
            type Value = ClaimMap<V>;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map keyed by claim text")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut map = ClaimMap::with_capacity(access.size_hint().unwrap_or(0));
                while let Some((k, v)) = access.next_entry::<String, V>()? {
                    map.insert(k, v);
                }
                Ok(map)
            }
        }

        deserializer.deserialize_map(ClaimMapVisitor(PhantomData))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insertion_order_kept() {
        let mut map = ClaimMap::new();
        map.insert("zeta", 1);
        map.insert("alpha", 2);
        map.insert("mid", 3);
        assert_eq!(map.keys().collect::<Vec<_>>(), vec!["zeta", "alpha", "mid"]);
    }

    #[test]
    fn test_duplicate_claim_replaces_in_place() {
        let mut map = ClaimMap::new();
        map.insert("a", 1);
        map.insert("b", 2);
        assert_eq!(map.insert("a", 9), Some(1));
        assert_eq!(map.len(), 2);
        assert_eq!(map.keys().next(), Some("a"));
        assert_eq!(map.get("a"), Some(&9));
    }

    #[test]
    fn test_json_object_keeps_order() {
        let json = r#"{"second claim": ["q2"], "first claim": ["q1", "q1b"]}"#;
        let map: ClaimMap<Vec<String>> = serde_json::from_str(json).unwrap();
        assert_eq!(map.keys().collect::<Vec<_>>(), vec!["second claim", "first claim"]);

        let out = serde_json::to_string(&map).unwrap();
        assert_eq!(out, r#"{"second claim":["q2"],"first claim":["q1","q1b"]}"#);
    }
}
