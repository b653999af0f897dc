//! Object accessor.
//!
//! An [`Obj`] is a lightweight handle: (table, key) plus a cached physical
//! position stamped with the storage version it was resolved under. Every
//! public method polls the group's current storage version first and
//! re-resolves the position if anything structural happened since: the
//! lazy revalidation that keeps handles created before a write usable
//! afterwards. Once an object is observed dead its handle stays invalid
//! forever.

use std::cell::Cell;
use std::cmp::Ordering;
use std::collections::HashMap;

use lodestore_error::{Result, StoreError};
use lodestore_types::{ColKey, ColumnType, ObjKey, TableKey, Value};

use crate::cascade::CascadeState;
use crate::column::ScalarValue;
use crate::group::{self, Group, GroupData};
use crate::json;
use crate::list::{LinkList, List};
use crate::table::Table;

#[derive(Debug, Clone, Copy)]
struct ObjCache {
    version: u64,
    cluster: u32,
    row: u32,
}

#[derive(Clone)]
pub struct Obj {
    group: Group,
    table: TableKey,
    key: ObjKey,
    cache: Cell<ObjCache>,
    valid: Cell<bool>,
}

impl Obj {
    pub(crate) fn new(group: Group, table: TableKey, key: ObjKey) -> Self {
        Self {
            group,
            table,
            key,
            cache: Cell::new(ObjCache {
                version: 0,
                cluster: 0,
                row: 0,
            }),
            valid: Cell::new(true),
        }
    }

    #[inline]
    pub fn key(&self) -> ObjKey {
        self.key
    }

    #[inline]
    pub fn table_key(&self) -> TableKey {
        self.table
    }

    pub fn group(&self) -> &Group {
        &self.group
    }

    pub fn table(&self) -> Table {
        self.group.table_by_key(self.table)
    }

    /// Whether the object is still alive. The state is cached: once a
    /// handle has seen its object dead it never reports alive again.
    pub fn is_valid(&self) -> bool {
        if self.valid.get() {
            let g = self.group.read();
            let alive = g.storage_version() == self.cache.get().version
                || g.table(self.table).is_valid(self.key);
            self.valid.set(alive);
        }
        self.valid.get()
    }

    /// Resolve the cached physical position, re-locating the row if the
    /// storage version moved since the last access.
    fn resolve(&self, g: &GroupData) -> Result<(usize, usize)> {
        if !self.valid.get() {
            return Err(StoreError::ObjectNotAlive);
        }
        let cached = self.cache.get();
        if cached.version == g.storage_version() {
            return Ok((cached.cluster as usize, cached.row as usize));
        }
        match g.table(self.table).locate(self.key) {
            Some((ci, row)) => {
                self.cache.set(ObjCache {
                    version: g.storage_version(),
                    cluster: ci as u32,
                    row: row as u32,
                });
                Ok((ci, row))
            }
            None => {
                self.valid.set(false);
                Err(StoreError::ObjectNotAlive)
            }
        }
    }

    /// Resolve against an already-borrowed group; used by the list
    /// accessors that share this object's lifetime.
    pub(crate) fn position(&self, g: &GroupData) -> Result<(usize, usize)> {
        self.resolve(g)
    }

    /* -------------------------------------------------------------- */
    /* Reads                                                           */
    /* -------------------------------------------------------------- */

    /// Typed read. The requested type must match the column's declared
    /// type; a mismatch is a schema-contract violation and panics. A null
    /// slot surfaces as `UnexpectedNull`; use [`Self::get_opt`] for
    /// nullable columns.
    pub fn get<T: ScalarValue>(&self, col: ColKey) -> Result<T> {
        self.get_opt(col)?.ok_or(StoreError::UnexpectedNull)
    }

    pub fn get_opt<T: ScalarValue>(&self, col: ColKey) -> Result<Option<T>> {
        let g = self.group.read();
        g.table(self.table).spec(col);
        assert_eq!(
            col.column_type(),
            T::COLUMN_TYPE,
            "requested type does not match column type"
        );
        assert!(!col.is_list(), "column is a list; use a list accessor");
        let (ci, row) = self.resolve(&g)?;
        Ok(T::read(g.table(self.table).cluster(ci).column(col.index()), row))
    }

    pub fn is_null(&self, col: ColKey) -> Result<bool> {
        let g = self.group.read();
        g.table(self.table).spec(col);
        let (ci, row) = self.resolve(&g)?;
        if col.is_list() {
            return Ok(false);
        }
        Ok(g.table(self.table).cluster(ci).column(col.index()).is_null(row))
    }

    /// Type-erased read of a scalar or link column.
    pub fn get_any(&self, col: ColKey) -> Result<Value> {
        let g = self.group.read();
        g.table(self.table).spec(col);
        assert!(
            !col.is_list() && col.column_type() != ColumnType::Backlink,
            "get_any reads scalar and link columns only"
        );
        let (ci, row) = self.resolve(&g)?;
        Ok(g.table(self.table).cluster(ci).column(col.index()).value_at(row))
    }

    pub fn get_link(&self, col: ColKey) -> Result<Option<ObjKey>> {
        let g = self.group.read();
        g.table(self.table).spec(col);
        assert_eq!(col.column_type(), ColumnType::Link);
        assert!(!col.is_list());
        let (ci, row) = self.resolve(&g)?;
        Ok(g.table(self.table).cluster(ci).column(col.index()).link_at(row))
    }

    /// The object a single-link column points at, if any.
    pub fn get_linked_object(&self, col: ColKey) -> Result<Option<Obj>> {
        let target_table = {
            let g = self.group.read();
            let link = g
                .table(self.table)
                .spec(col)
                .link()
                .expect("link column carries link info");
            let bl_spec = &g.table(link.other_table).columns()[link.other_col as usize];
            debug_assert_eq!(bl_spec.key().column_type(), ColumnType::Backlink);
            link.other_table
        };
        Ok(self
            .get_link(col)?
            .map(|k| Obj::new(self.group.clone(), target_table, k)))
    }

    /// Number of elements in a link-list column.
    pub fn link_count(&self, col: ColKey) -> Result<usize> {
        let g = self.group.read();
        g.table(self.table).spec(col);
        assert_eq!(col.column_type(), ColumnType::LinkList);
        let (ci, row) = self.resolve(&g)?;
        Ok(g.table(self.table)
            .cluster(ci)
            .column(col.index())
            .list_at(row)
            .len())
    }

    /* -------------------------------------------------------------- */
    /* Writes                                                          */
    /* -------------------------------------------------------------- */

    /// Typed write. See [`Self::set_with_default`] for the replication
    /// default marker.
    pub fn set<T: ScalarValue>(&self, col: ColKey, value: T) -> Result<()> {
        self.set_with_default(col, value, false)
    }

    pub fn set_with_default<T: ScalarValue>(
        &self,
        col: ColKey,
        value: T,
        is_default: bool,
    ) -> Result<()> {
        assert_ne!(
            T::COLUMN_TYPE,
            ColumnType::Link,
            "links are set through set_link"
        );
        let mut g = self.group.write();
        let (ci, row) = self.resolve(&g)?;
        g.table(self.table).spec(col);
        if col.column_type() != T::COLUMN_TYPE || col.is_list() {
            return Err(StoreError::IllegalType);
        }
        value.check_range()?;

        let repl_value = value.clone().into_value();
        // The index is updated before the physical write so that index and
        // storage are never observed inconsistent after this call returns.
        if g.table(self.table).has_search_index(col) {
            let old = g.table(self.table).cluster(ci).column(col.index()).value_at(row);
            g.table_mut(self.table)
                .indexes
                .get_mut(&(col.index() as u16))
                .unwrap()
                .set(self.key, &old, repl_value.clone());
        }
        T::write(
            g.table_mut(self.table).clusters[ci].column_mut(col.index()),
            row,
            Some(value),
        );
        g.bump_content_version();
        if let Some(r) = g.repl() {
            r.borrow_mut()
                .set_value(self.table, col, self.key, repl_value, is_default)?;
        }
        Ok(())
    }

    /// Write null. For link columns this is equivalent to
    /// `set_link(col, None)`; for scalars the column must be nullable.
    pub fn set_null(&self, col: ColKey) -> Result<()> {
        self.set_null_with_default(col, false)
    }

    pub fn set_null_with_default(&self, col: ColKey, is_default: bool) -> Result<()> {
        if col.column_type() == ColumnType::Link && !col.is_list() {
            return self.set_link_with_default(col, None, is_default);
        }
        let mut g = self.group.write();
        let (ci, row) = self.resolve(&g)?;
        g.table(self.table).spec(col);
        if col.is_list() {
            return Err(StoreError::IllegalType);
        }
        if !col.is_nullable() {
            return Err(StoreError::ColumnNotNullable);
        }
        if g.table(self.table).has_search_index(col) {
            let old = g.table(self.table).cluster(ci).column(col.index()).value_at(row);
            g.table_mut(self.table)
                .indexes
                .get_mut(&(col.index() as u16))
                .unwrap()
                .set(self.key, &old, Value::Null);
        }
        g.table_mut(self.table).clusters[ci]
            .column_mut(col.index())
            .set_null_at(row);
        g.bump_content_version();
        if let Some(r) = g.repl() {
            r.borrow_mut()
                .set_value(self.table, col, self.key, Value::Null, is_default)?;
        }
        Ok(())
    }

    /// Type-erased write, dispatching on the column's declared type.
    pub fn set_any(&self, col: ColKey, value: Value) -> Result<()> {
        match value {
            Value::Null => self.set_null(col),
            Value::Int(v) => self.set(col, v),
            Value::Bool(v) => self.set(col, v),
            Value::Float(v) => self.set(col, v),
            Value::Double(v) => self.set(col, v),
            Value::String(v) => self.set(col, v),
            Value::Binary(v) => self.set(col, v),
            Value::Timestamp(v) => self.set(col, v),
            Value::Link(k) => self.set_link(col, Some(k)),
        }
    }

    /// Point a single-link column at `target`.
    ///
    /// Changing the link away from a strong target may orphan it; the
    /// recursive delete runs strictly after the new link value has been
    /// written and replicated.
    pub fn set_link(&self, col: ColKey, target: Option<ObjKey>) -> Result<()> {
        self.set_link_with_default(col, target, false)
    }

    pub fn set_link_with_default(
        &self,
        col: ColKey,
        target: Option<ObjKey>,
        is_default: bool,
    ) -> Result<()> {
        let mut g = self.group.write();
        let (ci, row) = self.resolve(&g)?;
        let link = g.table(self.table).spec(col).link();
        if col.column_type() != ColumnType::Link || col.is_list() {
            return Err(StoreError::IllegalType);
        }
        let link = link.expect("link column carries link info");
        if let Some(t) = target {
            if !g.table(link.other_table).is_valid(t) {
                return Err(StoreError::TargetRowMissing { key: t.value() });
            }
        }

        let old = g.table(self.table).cluster(ci).column(col.index()).link_at(row);
        if old == target {
            return Ok(());
        }

        let mut state = CascadeState::new();
        let recurse = group::replace_backlink_entry(
            &mut g,
            self.table,
            col.index() as u16,
            self.key,
            old,
            target,
            &mut state,
        )?;

        g.table_mut(self.table).clusters[ci]
            .column_mut(col.index())
            .set_link_at(row, target);
        g.bump_content_version();
        if let Some(r) = g.repl() {
            let v = target.map_or(Value::Null, Value::Link);
            r.borrow_mut()
                .set_value(self.table, col, self.key, v, is_default)?;
        }
        if recurse {
            group::remove_recursive(&mut g, state)?;
        }
        Ok(())
    }

    /// Atomic read-modify-write addition with two's-complement wrapping.
    ///
    /// Overflow wraps, never saturates or traps; downstream consumers of
    /// the replicated delta depend on the exact wrapped value. Adding to a
    /// null nullable integer has no defined result and fails.
    pub fn add_int(&self, col: ColKey, delta: i64) -> Result<()> {
        let mut g = self.group.write();
        let (ci, row) = self.resolve(&g)?;
        g.table(self.table).spec(col);
        if col.column_type() != ColumnType::Int || col.is_list() {
            return Err(StoreError::IllegalType);
        }
        let old = i64::read(g.table(self.table).cluster(ci).column(col.index()), row)
            .ok_or(StoreError::IllegalCombination("add_int on null value"))?;
        let new = old.wrapping_add(delta);

        if g.table(self.table).has_search_index(col) {
            g.table_mut(self.table)
                .indexes
                .get_mut(&(col.index() as u16))
                .unwrap()
                .set(self.key, &Value::Int(old), Value::Int(new));
        }
        i64::write(
            g.table_mut(self.table).clusters[ci].column_mut(col.index()),
            row,
            Some(new),
        );
        g.bump_content_version();
        if let Some(r) = g.repl() {
            r.borrow_mut().add_int(self.table, col, self.key, delta)?;
        }
        Ok(())
    }

    /// Remove this object from its table, cascading as needed.
    pub fn remove(&self) -> Result<()> {
        let mut g = self.group.write();
        self.resolve(&g)?;
        group::remove_object(&mut g, self.table, self.key)
    }

    /* -------------------------------------------------------------- */
    /* Backlinks                                                       */
    /* -------------------------------------------------------------- */

    /// Number of live references to this object through one origin column.
    pub fn backlink_count(&self, origin: &Table, origin_col: ColKey) -> Result<usize> {
        let g = self.group.read();
        let (ci, row) = self.resolve(&g)?;
        let Some(bl) = g.table(self.table).opposite_column(origin.key(), origin_col) else {
            return Ok(0);
        };
        Ok(g.table(self.table)
            .cluster(ci)
            .column(bl.index())
            .backlinks_at(row)
            .len())
    }

    /// Total number of live references through every origin column,
    /// optionally restricted to strong origins.
    pub fn backlink_count_total(&self, only_strong: bool) -> Result<usize> {
        let g = self.group.read();
        let (ci, row) = self.resolve(&g)?;
        let t = g.table(self.table);
        let mut cnt = 0;
        for spec in t.columns() {
            if spec.key().column_type() != ColumnType::Backlink {
                continue;
            }
            let link = spec.link().expect("backlink column carries link info");
            if only_strong && link.strength != lodestore_types::LinkStrength::Strong {
                continue;
            }
            cnt += t.cluster(ci).column(spec.key().index()).backlinks_at(row).len();
        }
        Ok(cnt)
    }

    pub fn has_backlinks(&self, only_strong: bool) -> Result<bool> {
        Ok(self.backlink_count_total(only_strong)? > 0)
    }

    /// All origin keys referencing this object through one backlink column.
    pub fn all_backlinks(&self, backlink_col: ColKey) -> Result<Vec<ObjKey>> {
        let g = self.group.read();
        g.table(self.table).spec(backlink_col);
        assert_eq!(backlink_col.column_type(), ColumnType::Backlink);
        let (ci, row) = self.resolve(&g)?;
        Ok(g.table(self.table)
            .cluster(ci)
            .column(backlink_col.index())
            .backlinks_at(row)
            .to_vec())
    }

    /// The `ndx`-th origin referencing this object through `origin_col` of
    /// `origin`.
    pub fn backlink(&self, origin: &Table, origin_col: ColKey, ndx: usize) -> Result<ObjKey> {
        let g = self.group.read();
        let (ci, row) = self.resolve(&g)?;
        let bl = g
            .table(self.table)
            .opposite_column(origin.key(), origin_col)
            .expect("no backlink column for origin");
        Ok(g.table(self.table)
            .cluster(ci)
            .column(bl.index())
            .backlinks_at(row)[ndx])
    }

    /* -------------------------------------------------------------- */
    /* Lists                                                           */
    /* -------------------------------------------------------------- */

    pub fn list<T: ScalarValue>(&self, col: ColKey) -> Result<List<T>> {
        List::new(self.clone(), col)
    }

    pub fn link_list(&self, col: ColKey) -> Result<LinkList> {
        LinkList::new(self.clone(), col)
    }

    /* -------------------------------------------------------------- */
    /* Whole-object operations                                         */
    /* -------------------------------------------------------------- */

    /// Per-column three-way comparison against another object of the same
    /// table. List columns have no comparison and panic.
    pub fn compare_on(&self, col: ColKey, other: &Obj) -> Result<Ordering> {
        assert_eq!(self.table, other.table, "objects must share a table");
        assert!(!col.is_list(), "list columns have no comparison");
        let a = self.get_any(col)?;
        let b = other.get_any(col)?;
        Ok(a.total_cmp(&b))
    }

    /// True when every public scalar/link property compares equal.
    pub fn same_content(&self, other: &Obj) -> Result<bool> {
        let cols: Vec<ColKey> = {
            let g = self.group.read();
            g.table(self.table)
                .columns()
                .iter()
                .map(|s| s.key())
                .filter(|k| k.column_type() != ColumnType::Backlink)
                .collect()
        };
        for col in cols {
            if self.compare_on(col, other)? != Ordering::Equal {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Deep-copy every property of `other` into this object, then rewire
    /// every incoming link that pointed at `other` to point here instead.
    pub fn assign(&self, other: &Obj) -> Result<()> {
        assert_eq!(self.table, other.table, "objects must share a table");

        let cols: Vec<ColKey> = {
            let g = self.group.read();
            g.table(self.table)
                .columns()
                .iter()
                .map(|s| s.key())
                .filter(|k| k.column_type() != ColumnType::Backlink)
                .collect()
        };

        for col in cols {
            if col.is_list() {
                if col.column_type() == ColumnType::LinkList {
                    let src = other.link_list(col)?;
                    let dst = self.link_list(col)?;
                    dst.clear()?;
                    for i in 0..src.size()? {
                        dst.insert(i, src.get(i)?)?;
                    }
                } else {
                    self.assign_scalar_list(col, other)?;
                }
            } else if col.column_type() == ColumnType::Link {
                self.set_link(col, other.get_link(col)?)?;
            } else {
                // Values are owned copies, so source and destination may
                // share a cluster without aliasing trouble.
                let val = other.get_any(col)?;
                if val.is_null() {
                    self.set_null(col)?;
                } else {
                    self.set_any(col, val)?;
                }
            }
        }

        // Rewire incoming links.
        let backlink_cols: Vec<(ColKey, TableKey, u16)> = {
            let g = self.group.read();
            g.table(self.table)
                .columns()
                .iter()
                .filter(|s| s.key().column_type() == ColumnType::Backlink)
                .map(|s| {
                    let link = s.link().expect("backlink column carries link info");
                    (s.key(), link.other_table, link.other_col)
                })
                .collect()
        };
        for (bl_col, origin_table, origin_col_idx) in backlink_cols {
            let origins = other.all_backlinks(bl_col)?;
            for origin_key in origins {
                let origin = Obj::new(self.group.clone(), origin_table, origin_key);
                let origin_col = {
                    let g = self.group.read();
                    g.table(origin_table).columns()[origin_col_idx as usize].key()
                };
                if origin_col.column_type() == ColumnType::Link && !origin_col.is_list() {
                    debug_assert_eq!(origin.get_link(origin_col)?, Some(other.key()));
                    origin.set_link(origin_col, Some(self.key))?;
                } else {
                    let list = origin.link_list(origin_col)?;
                    let ndx = list
                        .find_first(other.key())?
                        .expect("backlink refers to a link that is not in the list");
                    list.set(ndx, self.key)?;
                }
            }
        }
        Ok(())
    }

    fn assign_scalar_list(&self, col: ColKey, other: &Obj) -> Result<()> {
        macro_rules! copy_list {
            ($t:ty) => {{
                let src = other.list::<$t>(col)?;
                let dst = self.list::<$t>(col)?;
                dst.clear()?;
                for i in 0..src.size()? {
                    dst.insert(i, src.get(i)?)?;
                }
                Ok(())
            }};
        }
        match col.column_type() {
            ColumnType::Int => copy_list!(i64),
            ColumnType::Bool => copy_list!(bool),
            ColumnType::Float => copy_list!(f32),
            ColumnType::Double => copy_list!(f64),
            ColumnType::String => copy_list!(String),
            ColumnType::Binary => copy_list!(Vec<u8>),
            ColumnType::Timestamp => copy_list!(lodestore_types::Timestamp),
            _ => unreachable!("not a scalar list column"),
        }
    }

    /* -------------------------------------------------------------- */
    /* JSON projection                                                 */
    /* -------------------------------------------------------------- */

    /// Render this object as JSON.
    ///
    /// `link_depth` bounds link traversal: 0 renders links as reference
    /// stubs, N follows N hops, [`json::UNBOUNDED_LINK_DEPTH`] follows
    /// links indefinitely while collapsing already-visited link columns
    /// into stubs to break cycles.
    pub fn to_json(
        &self,
        link_depth: usize,
        renames: &HashMap<String, String>,
    ) -> Result<serde_json::Value> {
        let g = self.group.read();
        self.resolve(&g)?;
        let mut followed = Vec::new();
        json::object_to_json(&g, self.table, self.key, link_depth, renames, &mut followed)
    }
}

impl std::fmt::Debug for Obj {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Obj")
            .field("table", &self.table)
            .field("key", &self.key)
            .finish()
    }
}
