//! Tables: schema, cluster ownership and the public table handle.

use std::collections::HashMap;

use lodestore_error::Result;
use lodestore_types::{ColKey, ColumnType, LinkStrength, ObjKey, TableKey};
use tracing::debug;

use crate::cluster::Cluster;
use crate::column::ColumnData;
use crate::group::{self, Group};
use crate::index::SearchIndex;
use crate::obj::Obj;

/// Where a link or backlink column points.
///
/// For a forward link column, `other_table`/`other_col` name the paired
/// backlink column on the target table. For a backlink column they name
/// the origin table and its forward link column. `strength` is the origin
/// column's ownership semantics in both cases.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkInfo {
    pub other_table: TableKey,
    pub other_col: u16,
    pub strength: LinkStrength,
}

#[derive(Debug, Clone)]
pub struct ColumnSpec {
    pub(crate) key: ColKey,
    pub(crate) name: String,
    pub(crate) link: Option<LinkInfo>,
}

impl ColumnSpec {
    #[inline]
    pub fn key(&self) -> ColKey {
        self.key
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn link(&self) -> Option<LinkInfo> {
        self.link
    }
}

#[derive(Debug)]
pub struct TableData {
    pub(crate) key: TableKey,
    pub(crate) name: String,
    pub(crate) columns: Vec<ColumnSpec>,
    pub(crate) clusters: Vec<Cluster>,
    pub(crate) next_key: i64,
    pub(crate) indexes: HashMap<u16, SearchIndex>,
    pub(crate) size: usize,
}

impl TableData {
    pub(crate) fn new(key: TableKey, name: &str) -> Self {
        Self {
            key,
            name: name.to_owned(),
            columns: Vec::new(),
            clusters: Vec::new(),
            next_key: 0,
            indexes: HashMap::new(),
            size: 0,
        }
    }

    #[inline]
    pub fn key(&self) -> TableKey {
        self.key
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn columns(&self) -> &[ColumnSpec] {
        &self.columns
    }

    /// The spec for a column key, validating that the key actually belongs
    /// to this table's schema.
    pub fn spec(&self, col: ColKey) -> &ColumnSpec {
        let spec = self
            .columns
            .get(col.index())
            .unwrap_or_else(|| panic!("column key out of range for table {}", self.name));
        assert!(spec.key == col, "stale or foreign column key");
        spec
    }

    pub fn column_key(&self, name: &str) -> Option<ColKey> {
        self.columns.iter().find(|c| c.name == name).map(|c| c.key)
    }

    #[inline]
    pub fn cluster_count(&self) -> usize {
        self.clusters.len()
    }

    #[inline]
    pub fn cluster(&self, ndx: usize) -> &Cluster {
        &self.clusters[ndx]
    }

    pub fn clusters(&self) -> &[Cluster] {
        &self.clusters
    }

    /// Resolve a key to its physical (cluster, row) position.
    pub fn locate(&self, key: ObjKey) -> Option<(usize, usize)> {
        let ci = self
            .clusters
            .partition_point(|c| c.last_key().is_some_and(|k| k < key));
        let cluster = self.clusters.get(ci)?;
        cluster.find(key).map(|row| (ci, row))
    }

    pub fn is_valid(&self, key: ObjKey) -> bool {
        self.locate(key).is_some()
    }

    pub fn search_index(&self, col: ColKey) -> Option<&SearchIndex> {
        self.spec(col);
        self.indexes.get(&(col.index() as u16))
    }

    pub fn has_search_index(&self, col: ColKey) -> bool {
        self.search_index(col).is_some()
    }

    pub fn object_keys(&self) -> Vec<ObjKey> {
        self.clusters
            .iter()
            .flat_map(|c| c.keys.iter().map(|&k| ObjKey::new(k)))
            .collect()
    }

    /// Column keys of this table's backlink columns.
    pub fn backlink_columns(&self) -> impl Iterator<Item = ColKey> + '_ {
        self.columns
            .iter()
            .filter(|s| s.key.column_type() == ColumnType::Backlink)
            .map(|s| s.key)
    }

    /// The backlink column on this table that mirrors `origin_col` on
    /// `origin_table`.
    pub fn opposite_column(&self, origin_table: TableKey, origin_col: ColKey) -> Option<ColKey> {
        self.columns
            .iter()
            .find(|s| {
                s.key.column_type() == ColumnType::Backlink
                    && s.link.is_some_and(|l| {
                        l.other_table == origin_table && l.other_col as usize == origin_col.index()
                    })
            })
            .map(|s| s.key)
    }

    pub(crate) fn push_empty_cluster(&mut self) {
        let columns = self
            .columns
            .iter()
            .map(|s| {
                ColumnData::new_for(s.key.column_type(), s.key.is_list(), s.key.column_type())
            })
            .collect();
        self.clusters.push(Cluster::new(columns));
    }

    fn push_column(&mut self, spec: ColumnSpec) -> ColKey {
        let key = spec.key;
        // Backfill existing clusters with default slots.
        for cluster in &mut self.clusters {
            let mut data = ColumnData::new_for(key.column_type(), key.is_list(), key.column_type());
            for _ in 0..cluster.len() {
                data.push_default(key.is_nullable(), key.column_type());
            }
            cluster.columns.push(data);
        }
        self.columns.push(spec);
        key
    }
}

/// Public handle to one table.
#[derive(Clone)]
pub struct Table {
    pub(crate) group: Group,
    pub(crate) key: TableKey,
}

impl Table {
    #[inline]
    pub fn key(&self) -> TableKey {
        self.key
    }

    pub fn group(&self) -> &Group {
        &self.group
    }

    pub fn name(&self) -> String {
        self.group.read().table(self.key).name().to_owned()
    }

    /// Add a scalar column. Link columns go through
    /// [`Self::add_link_column`] / [`Self::add_link_list_column`].
    pub fn add_column(&self, name: &str, ty: ColumnType, nullable: bool) -> ColKey {
        assert!(ty.is_scalar(), "use the link column constructors for links");
        let mut g = self.group.write();
        let t = g.table_mut(self.key);
        let idx = t.columns.len() as u16;
        let key = ColKey::new(idx, ty, nullable, false);
        t.push_column(ColumnSpec {
            key,
            name: name.to_owned(),
            link: None,
        });
        g.bump_storage_version();
        key
    }

    /// Add a column holding an ordered list of scalar elements.
    pub fn add_list_column(&self, name: &str, elem: ColumnType, nullable: bool) -> ColKey {
        assert!(elem.is_scalar(), "use add_link_list_column for link lists");
        let mut g = self.group.write();
        let t = g.table_mut(self.key);
        let idx = t.columns.len() as u16;
        let key = ColKey::new(idx, elem, nullable, true);
        t.push_column(ColumnSpec {
            key,
            name: name.to_owned(),
            link: None,
        });
        g.bump_storage_version();
        key
    }

    /// Add a single-link column pointing at `target`, together with its
    /// paired backlink column on the target table.
    pub fn add_link_column(&self, name: &str, target: &Table, strength: LinkStrength) -> ColKey {
        self.add_link_column_inner(name, target, strength, false)
    }

    /// Add a link-list column pointing at `target`, together with its
    /// paired backlink column on the target table.
    pub fn add_link_list_column(
        &self,
        name: &str,
        target: &Table,
        strength: LinkStrength,
    ) -> ColKey {
        self.add_link_column_inner(name, target, strength, true)
    }

    fn add_link_column_inner(
        &self,
        name: &str,
        target: &Table,
        strength: LinkStrength,
        is_list: bool,
    ) -> ColKey {
        let mut g = self.group.write();

        let fwd_idx = g.table(self.key).columns.len() as u16;
        let bl_idx = if target.key == self.key {
            fwd_idx + 1
        } else {
            g.table(target.key).columns.len() as u16
        };
        let ty = if is_list {
            ColumnType::LinkList
        } else {
            ColumnType::Link
        };
        let fwd_key = ColKey::new(fwd_idx, ty, false, is_list);
        let origin_name = g.table(self.key).name().to_owned();

        g.table_mut(self.key).push_column(ColumnSpec {
            key: fwd_key,
            name: name.to_owned(),
            link: Some(LinkInfo {
                other_table: target.key,
                other_col: bl_idx,
                strength,
            }),
        });
        g.table_mut(target.key).push_column(ColumnSpec {
            key: ColKey::new(bl_idx, ColumnType::Backlink, false, false),
            name: format!("{origin_name}.{name}"),
            link: Some(LinkInfo {
                other_table: self.key,
                other_col: fwd_idx,
                strength,
            }),
        });
        g.bump_storage_version();
        fwd_key
    }

    /// Build a search index over an existing scalar column.
    pub fn add_search_index(&self, col: ColKey) {
        assert!(
            col.column_type().is_scalar() && !col.is_list(),
            "search indexes cover scalar columns only"
        );
        let mut g = self.group.write();
        let t = g.table_mut(self.key);
        t.spec(col);
        let mut index = SearchIndex::new();
        let mut entries = 0usize;
        for cluster in &t.clusters {
            for row in 0..cluster.len() {
                index.insert(cluster.column(col.index()).value_at(row), cluster.key_at(row));
                entries += 1;
            }
        }
        debug!(table = %t.name, col = col.index(), entries, "search index populated");
        t.indexes.insert(col.index() as u16, index);
    }

    pub fn column(&self, name: &str) -> Option<ColKey> {
        self.group.read().table(self.key).column_key(name)
    }

    /// The backlink column on this table mirroring `origin_col` of
    /// `origin`.
    pub fn backlink_column(&self, origin: &Table, origin_col: ColKey) -> Option<ColKey> {
        self.group
            .read()
            .table(self.key)
            .opposite_column(origin.key, origin_col)
    }

    pub fn create_object(&self) -> Result<Obj> {
        let key = {
            let mut g = self.group.write();
            group::create_object(&mut g, self.key)?
        };
        Ok(Obj::new(self.group.clone(), self.key, key))
    }

    pub fn object(&self, key: ObjKey) -> Result<Obj> {
        if !self.group.read().table(self.key).is_valid(key) {
            return Err(lodestore_error::StoreError::InvalidKey { key: key.value() });
        }
        Ok(Obj::new(self.group.clone(), self.key, key))
    }

    pub fn object_count(&self) -> usize {
        self.group.read().table(self.key).size()
    }

    pub fn object_keys(&self) -> Vec<ObjKey> {
        self.group.read().table(self.key).object_keys()
    }

    pub fn is_valid(&self, key: ObjKey) -> bool {
        self.group.read().table(self.key).is_valid(key)
    }

    pub fn remove_object(&self, key: ObjKey) -> Result<()> {
        let mut g = self.group.write();
        group::remove_object(&mut g, self.key, key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_and_locate() {
        let group = Group::with_cluster_capacity(2);
        let t = group.add_table("items");
        let col = t.add_column("count", ColumnType::Int, false);
        assert_eq!(t.column("count"), Some(col));

        let a = t.create_object().unwrap();
        let b = t.create_object().unwrap();
        let c = t.create_object().unwrap();
        assert_eq!(t.object_count(), 3);

        let g = group.read();
        let td = g.table(t.key());
        // Capacity 2 forces a second cluster for the third object.
        assert_eq!(td.cluster_count(), 2);
        assert_eq!(td.locate(a.key()), Some((0, 0)));
        assert_eq!(td.locate(b.key()), Some((0, 1)));
        assert_eq!(td.locate(c.key()), Some((1, 0)));
    }

    #[test]
    fn link_column_creates_backlink_column() {
        let group = Group::new();
        let person = group.add_table("person");
        let dog = group.add_table("dog");
        let owner_col = dog.add_link_column("owner", &person, LinkStrength::Weak);

        let bl = person.backlink_column(&dog, owner_col).unwrap();
        assert_eq!(bl.column_type(), ColumnType::Backlink);
        let g = group.read();
        assert_eq!(g.table(person.key()).spec(bl).name(), "dog.owner");
    }

    #[test]
    fn self_link_column() {
        let group = Group::new();
        let node = group.add_table("node");
        let parent = node.add_link_column("parent", &node, LinkStrength::Weak);
        let bl = node.backlink_column(&node, parent).unwrap();
        assert_ne!(parent.index(), bl.index());
    }

    #[test]
    #[should_panic(expected = "use the link column constructors")]
    fn scalar_constructor_rejects_links() {
        let group = Group::new();
        let t = group.add_table("t");
        t.add_column("bad", ColumnType::Link, false);
    }
}
