//! Ordered result container (§3.3). Response serialization must preserve
//! selection order regardless of the concurrency model (§5) that produced
//! the values, so insertion order — not sorted or hashed order — is the
//! contract.

use indexmap::IndexMap;

use crate::error::FieldError;

/// A `{key -> value}` map that remembers insertion order and rejects
/// duplicate keys at the same level, matching §3.3's invariant.
#[derive(Debug, Clone, Default)]
pub struct OrderedMap {
    inner: IndexMap<String, serde_json::Value>,
}

impl OrderedMap {
    pub fn new() -> Self {
        Self {
            inner: IndexMap::new(),
        }
    }

    pub fn with_capacity(cap: usize) -> Self {
        Self {
            inner: IndexMap::with_capacity(cap),
        }
    }

    /// Inserts `key -> value`, failing if `key` was already present at this
    /// level (a duplicate alias, per §4.5 "Dispatch per selection").
    pub fn insert(&mut self, key: String, value: serde_json::Value) -> Result<(), FieldError> {
        if self.inner.contains_key(&key) {
            return Err(FieldError::DuplicateKey(key));
        }
        self.inner.insert(key, value);
        Ok(())
    }

    /// Merges another map's entries in order, used when flattening inline
    /// fragments and fragment spreads into the enclosing selection (§4.5).
    pub fn merge(&mut self, other: OrderedMap) -> Result<(), FieldError> {
        for (k, v) in other.inner {
            self.insert(k, v)?;
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn into_json(self) -> serde_json::Value {
        serde_json::Value::Object(self.inner.into_iter().collect())
    }

    /// Drains this map into its `(key, value)` pairs in insertion order, for
    /// a caller that wants to merge them into an enclosing selection rather
    /// than serialize them on their own (fragment/inline-fragment flattening,
    /// §4.5).
    pub fn into_pairs(self) -> Vec<(String, serde_json::Value)> {
        self.inner.into_iter().collect()
    }
}
