//! Search index: an auxiliary ordered map from column values to object
//! keys, used to accelerate equality lookups.
//!
//! The per-value key lists are kept sorted by key so the query engine can
//! walk them as a monotone cursor against advancing cluster ranges.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use lodestore_types::{ObjKey, Value};

/// Wrapper giving `Value` the `Ord` instance of its total order.
///
/// An index only ever holds values of its column's type (plus null), so
/// the cross-type panic in `Value::total_cmp` cannot trigger here.
#[derive(Debug, Clone)]
struct IndexKey(Value);

impl PartialEq for IndexKey {
    fn eq(&self, other: &Self) -> bool {
        self.0.total_cmp(&other.0) == Ordering::Equal
    }
}

impl Eq for IndexKey {}

impl PartialOrd for IndexKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for IndexKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

#[derive(Debug, Default)]
pub struct SearchIndex {
    map: BTreeMap<IndexKey, Vec<ObjKey>>,
}

impl SearchIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn insert(&mut self, value: Value, key: ObjKey) {
        let keys = self.map.entry(IndexKey(value)).or_default();
        let pos = keys.partition_point(|&k| k < key);
        keys.insert(pos, key);
    }

    pub(crate) fn remove(&mut self, value: &Value, key: ObjKey) {
        if let Some(keys) = self.map.get_mut(&IndexKey(value.clone())) {
            if let Ok(pos) = keys.binary_search(&key) {
                keys.remove(pos);
            }
            if keys.is_empty() {
                self.map.remove(&IndexKey(value.clone()));
            }
        }
    }

    /// Re-key an object from `old` to `new`.
    pub(crate) fn set(&mut self, key: ObjKey, old: &Value, new: Value) {
        self.remove(old, key);
        self.insert(new, key);
    }

    /// All object keys holding `value`, sorted ascending.
    pub fn find_all(&self, value: &Value) -> &[ObjKey] {
        self.map
            .get(&IndexKey(value.clone()))
            .map_or(&[], Vec::as_slice)
    }

    pub fn len(&self) -> usize {
        self.map.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_keeps_keys_sorted() {
        let mut ix = SearchIndex::new();
        let v = Value::String("bob".into());
        ix.insert(v.clone(), ObjKey::new(5));
        ix.insert(v.clone(), ObjKey::new(1));
        ix.insert(v.clone(), ObjKey::new(3));
        assert_eq!(
            ix.find_all(&v),
            &[ObjKey::new(1), ObjKey::new(3), ObjKey::new(5)]
        );
    }

    #[test]
    fn set_moves_between_values() {
        let mut ix = SearchIndex::new();
        ix.insert(Value::String("a".into()), ObjKey::new(1));
        ix.set(
            ObjKey::new(1),
            &Value::String("a".into()),
            Value::String("b".into()),
        );
        assert!(ix.find_all(&Value::String("a".into())).is_empty());
        assert_eq!(ix.find_all(&Value::String("b".into())), &[ObjKey::new(1)]);
    }

    #[test]
    fn remove_drops_empty_entries() {
        let mut ix = SearchIndex::new();
        ix.insert(Value::Int(9), ObjKey::new(2));
        ix.remove(&Value::Int(9), ObjKey::new(2));
        assert!(ix.is_empty());
    }

    #[test]
    fn null_values_are_indexable() {
        let mut ix = SearchIndex::new();
        ix.insert(Value::Null, ObjKey::new(4));
        assert_eq!(ix.find_all(&Value::Null), &[ObjKey::new(4)]);
    }
}
