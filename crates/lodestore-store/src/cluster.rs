//! Clusters: physically contiguous chunks of object rows.
//!
//! A cluster holds a sorted key array plus one [`ColumnData`] per column.
//! Keys are assigned monotonically by the owning table, so appending keeps
//! the key array sorted and the concatenation of a table's clusters is the
//! full key order. The cluster is the unit the query engine scans within.

use lodestore_types::ObjKey;

use crate::column::ColumnData;

#[derive(Debug, Clone)]
pub struct Cluster {
    pub(crate) keys: Vec<i64>,
    pub(crate) columns: Vec<ColumnData>,
}

impl Cluster {
    pub(crate) fn new(columns: Vec<ColumnData>) -> Self {
        Self {
            keys: Vec::new(),
            columns,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    #[inline]
    pub fn key_at(&self, row: usize) -> ObjKey {
        ObjKey::new(self.keys[row])
    }

    pub fn first_key(&self) -> Option<ObjKey> {
        self.keys.first().map(|&k| ObjKey::new(k))
    }

    pub fn last_key(&self) -> Option<ObjKey> {
        self.keys.last().map(|&k| ObjKey::new(k))
    }

    /// Index of the first row whose key is `>= key`.
    pub fn lower_bound(&self, key: ObjKey) -> usize {
        self.keys.partition_point(|&k| k < key.value())
    }

    /// Row index of an exact key match.
    pub fn find(&self, key: ObjKey) -> Option<usize> {
        self.keys.binary_search(&key.value()).ok()
    }

    #[inline]
    pub fn column(&self, idx: usize) -> &ColumnData {
        &self.columns[idx]
    }

    #[inline]
    pub(crate) fn column_mut(&mut self, idx: usize) -> &mut ColumnData {
        &mut self.columns[idx]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lodestore_types::ColumnType;

    fn cluster_with_keys(keys: &[i64]) -> Cluster {
        let mut c = Cluster::new(vec![ColumnData::new_for(
            ColumnType::Int,
            false,
            ColumnType::Int,
        )]);
        for &k in keys {
            c.keys.push(k);
            c.columns[0].push_default(false, ColumnType::Int);
        }
        c
    }

    #[test]
    fn lower_bound_and_find() {
        let c = cluster_with_keys(&[2, 5, 9]);
        assert_eq!(c.lower_bound(ObjKey::new(1)), 0);
        assert_eq!(c.lower_bound(ObjKey::new(5)), 1);
        assert_eq!(c.lower_bound(ObjKey::new(6)), 2);
        assert_eq!(c.lower_bound(ObjKey::new(10)), 3);
        assert_eq!(c.find(ObjKey::new(5)), Some(1));
        assert_eq!(c.find(ObjKey::new(4)), None);
    }

    #[test]
    fn boundary_keys() {
        let c = cluster_with_keys(&[3, 7]);
        assert_eq!(c.first_key(), Some(ObjKey::new(3)));
        assert_eq!(c.last_key(), Some(ObjKey::new(7)));
        assert_eq!(c.key_at(1), ObjKey::new(7));
    }
}
