//! Group: the top-level container owning all tables, the version counters
//! and the replication sink.
//!
//! The core assumes the single-writer / snapshot-reader model of the
//! enclosing transaction system, so the group carries no internal locking;
//! handles share the group through `Rc<RefCell<_>>` and every public
//! accessor method borrows it exactly once for the duration of the call.
//!
//! Two version counters drive accessor staleness:
//! - `content_version` is bumped on every value mutation,
//! - `storage_version` is bumped on structural change (object insert or
//!   erase, column addition), which is the signal that cached row positions
//!   may have moved.

use std::cell::{Ref, RefCell, RefMut};
use std::rc::Rc;

use lodestore_error::{Result, StoreError};
use lodestore_types::{ColumnType, LinkStrength, ObjKey, TableKey};
use tracing::debug;

use crate::cascade::CascadeState;
use crate::replication::Replication;
use crate::table::{Table, TableData};

pub struct GroupData {
    pub(crate) tables: Vec<TableData>,
    pub(crate) storage_version: u64,
    pub(crate) content_version: u64,
    pub(crate) cluster_capacity: usize,
    pub(crate) replication: Option<Rc<RefCell<dyn Replication>>>,
}

impl GroupData {
    pub fn table(&self, key: TableKey) -> &TableData {
        &self.tables[key.as_usize()]
    }

    pub(crate) fn table_mut(&mut self, key: TableKey) -> &mut TableData {
        &mut self.tables[key.as_usize()]
    }

    #[inline]
    pub fn storage_version(&self) -> u64 {
        self.storage_version
    }

    #[inline]
    pub fn content_version(&self) -> u64 {
        self.content_version
    }

    #[inline]
    pub(crate) fn bump_content_version(&mut self) {
        self.content_version += 1;
    }

    #[inline]
    pub(crate) fn bump_storage_version(&mut self) {
        self.content_version += 1;
        self.storage_version += 1;
    }

    pub(crate) fn repl(&self) -> Option<Rc<RefCell<dyn Replication>>> {
        self.replication.clone()
    }
}

/// Shared handle to a group of tables.
#[derive(Clone)]
pub struct Group {
    inner: Rc<RefCell<GroupData>>,
}

impl Default for Group {
    fn default() -> Self {
        Self::new()
    }
}

impl Group {
    pub fn new() -> Self {
        Self::with_cluster_capacity(256)
    }

    /// A group whose clusters hold at most `capacity` rows. Query results
    /// never depend on the capacity; it only controls scan granularity.
    pub fn with_cluster_capacity(capacity: usize) -> Self {
        assert!(capacity > 0, "cluster capacity must be positive");
        Self {
            inner: Rc::new(RefCell::new(GroupData {
                tables: Vec::new(),
                storage_version: 1,
                content_version: 1,
                cluster_capacity: capacity,
                replication: None,
            })),
        }
    }

    pub fn set_replication(&self, sink: Rc<RefCell<dyn Replication>>) {
        self.inner.borrow_mut().replication = Some(sink);
    }

    pub fn add_table(&self, name: &str) -> Table {
        let mut g = self.inner.borrow_mut();
        assert!(
            g.tables.iter().all(|t| t.name() != name),
            "table {name:?} already exists"
        );
        let key = TableKey::new(g.tables.len() as u32);
        g.tables.push(TableData::new(key, name));
        g.bump_storage_version();
        Table {
            group: self.clone(),
            key,
        }
    }

    pub fn table(&self, name: &str) -> Option<Table> {
        let g = self.inner.borrow();
        g.tables.iter().find(|t| t.name() == name).map(|t| Table {
            group: self.clone(),
            key: t.key(),
        })
    }

    pub fn table_by_key(&self, key: TableKey) -> Table {
        assert!(key.as_usize() < self.inner.borrow().tables.len());
        Table {
            group: self.clone(),
            key,
        }
    }

    pub fn table_count(&self) -> usize {
        self.inner.borrow().tables.len()
    }

    pub fn storage_version(&self) -> u64 {
        self.inner.borrow().storage_version
    }

    pub fn content_version(&self) -> u64 {
        self.inner.borrow().content_version
    }

    /// Borrow the underlying data for read access. Used by the query
    /// engine; the borrow must not be held across mutating calls.
    pub fn read(&self) -> Ref<'_, GroupData> {
        self.inner.borrow()
    }

    pub(crate) fn write(&self) -> RefMut<'_, GroupData> {
        self.inner.borrow_mut()
    }
}

/* ------------------------------------------------------------------ */
/* Object lifecycle                                                    */
/* ------------------------------------------------------------------ */

pub(crate) fn create_object(g: &mut GroupData, table: TableKey) -> Result<ObjKey> {
    let capacity = g.cluster_capacity;
    let t = g.table_mut(table);
    let key = ObjKey::new(t.next_key);
    t.next_key += 1;

    if t.clusters.last().map_or(true, |c| c.len() >= capacity) {
        t.push_empty_cluster();
    }
    let ci = t.clusters.len() - 1;
    let specs: Vec<_> = t
        .columns
        .iter()
        .map(|s| (s.key().is_nullable(), s.key().column_type()))
        .collect();
    let cluster = &mut t.clusters[ci];
    cluster.keys.push(key.value());
    let row = cluster.keys.len() - 1;
    for (i, (nullable, elem)) in specs.iter().enumerate() {
        cluster.columns[i].push_default(*nullable, *elem);
    }
    let index_inserts: Vec<_> = t
        .indexes
        .keys()
        .map(|&idx| (idx, t.clusters[ci].column(idx as usize).value_at(row)))
        .collect();
    for (idx, val) in index_inserts {
        t.indexes.get_mut(&idx).unwrap().insert(val, key);
    }
    t.size += 1;

    g.bump_storage_version();
    if let Some(r) = g.repl() {
        r.borrow_mut().insert_object(table, key)?;
    }
    Ok(key)
}

pub(crate) fn remove_object(g: &mut GroupData, table: TableKey, key: ObjKey) -> Result<()> {
    if !g.table(table).is_valid(key) {
        return Err(StoreError::InvalidKey { key: key.value() });
    }
    let mut state = CascadeState::new();
    state.enqueue(table, key);
    remove_recursive(g, state)
}

/// Drain a deletion work list, one batch at a time.
///
/// For every batch, incoming links to all queued objects are nullified
/// first, then the rows are erased. Erasing a row removes the backlinks for
/// its own forward links, which may enqueue further strong orphans; the
/// loop continues until the transitive closure is deleted.
pub(crate) fn remove_recursive(g: &mut GroupData, mut state: CascadeState) -> Result<()> {
    while !state.is_empty() {
        let batch = std::mem::take(&mut state.to_be_deleted);
        for &(t, k) in &batch {
            if g.table(t).is_valid(k) {
                nullify_incoming_links(g, t, k)?;
            }
        }
        for (t, k) in batch {
            if g.table(t).is_valid(k) {
                erase_row(g, t, k, &mut state)?;
            }
        }
    }
    Ok(())
}

/// Null out every forward link pointing at `key` before the row dies.
///
/// Single links on the origin become null; link-list elements are erased.
/// The matching replication instructions (`nullify_link`,
/// `link_list_nullify`) must precede the `remove_object` instruction.
fn nullify_incoming_links(g: &mut GroupData, table: TableKey, key: ObjKey) -> Result<()> {
    let (ci, row) = g
        .table(table)
        .locate(key)
        .ok_or(StoreError::InvalidKey { key: key.value() })?;

    let mut jobs: Vec<(TableKey, u16, ObjKey)> = Vec::new();
    {
        let t = g.table(table);
        let cluster = &t.clusters[ci];
        for spec in t.columns.iter() {
            if spec.key().column_type() != ColumnType::Backlink {
                continue;
            }
            let link = spec.link().expect("backlink column carries link info");
            for &origin in cluster.column(spec.key().index()).backlinks_at(row) {
                jobs.push((link.other_table, link.other_col, origin));
            }
        }
    }
    for (origin_table, origin_col, origin_key) in jobs {
        nullify_forward_link(g, origin_table, origin_col, origin_key, key)?;
    }
    Ok(())
}

/// Remove one forward reference from `origin` to the dying `target`.
fn nullify_forward_link(
    g: &mut GroupData,
    origin_table: TableKey,
    origin_col: u16,
    origin_key: ObjKey,
    target: ObjKey,
) -> Result<()> {
    let col_key = g.table(origin_table).columns[origin_col as usize].key();
    let (ci, row) = g
        .table(origin_table)
        .locate(origin_key)
        .ok_or(StoreError::InvalidKey {
            key: origin_key.value(),
        })?;

    if col_key.is_list() {
        let ndx = g.table(origin_table).clusters[ci]
            .column(col_key.index())
            .list_at(row)
            .links()
            .iter()
            .position(|&k| k == target)
            .expect("backlink refers to a link that is not in the list");
        if let Some(r) = g.repl() {
            r.borrow_mut()
                .link_list_nullify(origin_table, col_key, origin_key, ndx)?;
        }
        g.table_mut(origin_table).clusters[ci]
            .column_mut(col_key.index())
            .list_at_mut(row)
            .links_mut()
            .remove(ndx);
    } else {
        let current = g.table(origin_table).clusters[ci]
            .column(col_key.index())
            .link_at(row);
        assert_eq!(current, Some(target), "backlink out of sync with link");
        g.table_mut(origin_table).clusters[ci]
            .column_mut(col_key.index())
            .set_link_at(row, None);
        if let Some(r) = g.repl() {
            r.borrow_mut()
                .nullify_link(origin_table, col_key, origin_key)?;
        }
    }
    g.bump_content_version();
    Ok(())
}

/// Erase one row: drop its index entries, replicate the removal, remove the
/// backlinks for its forward links (possibly enqueueing strong orphans),
/// then take the row out of the cluster.
fn erase_row(
    g: &mut GroupData,
    table: TableKey,
    key: ObjKey,
    state: &mut CascadeState,
) -> Result<()> {
    let (ci, row) = g
        .table(table)
        .locate(key)
        .ok_or(StoreError::InvalidKey { key: key.value() })?;

    let index_removals: Vec<_> = {
        let t = g.table(table);
        t.indexes
            .keys()
            .map(|&idx| (idx, t.clusters[ci].column(idx as usize).value_at(row)))
            .collect()
    };
    for (idx, val) in index_removals {
        g.table_mut(table)
            .indexes
            .get_mut(&idx)
            .unwrap()
            .remove(&val, key);
    }

    if let Some(r) = g.repl() {
        r.borrow_mut().remove_object(table, key)?;
    }

    let mut link_jobs: Vec<(u16, ObjKey)> = Vec::new();
    {
        let t = g.table(table);
        let cluster = &t.clusters[ci];
        for spec in t.columns.iter() {
            let ck = spec.key();
            match ck.column_type() {
                ColumnType::Link => {
                    if let Some(target) = cluster.column(ck.index()).link_at(row) {
                        link_jobs.push((ck.index() as u16, target));
                    }
                }
                ColumnType::LinkList => {
                    for &target in cluster.column(ck.index()).list_at(row).links() {
                        link_jobs.push((ck.index() as u16, target));
                    }
                }
                _ => {}
            }
        }
    }
    for (col_idx, target) in link_jobs {
        remove_backlink_entry(g, table, col_idx, key, target, state)?;
    }

    let t = g.table_mut(table);
    let cluster = &mut t.clusters[ci];
    cluster.keys.remove(row);
    for col in &mut cluster.columns {
        col.remove_row(row);
    }
    if cluster.is_empty() {
        t.clusters.remove(ci);
    }
    t.size -= 1;
    g.bump_storage_version();
    Ok(())
}

/* ------------------------------------------------------------------ */
/* Backlink bookkeeping                                                */
/* ------------------------------------------------------------------ */

/// Record a new forward reference on the target's backlink column.
pub(crate) fn add_backlink_entry(
    g: &mut GroupData,
    origin_table: TableKey,
    origin_col: u16,
    origin_key: ObjKey,
    target: ObjKey,
) -> Result<()> {
    let link = g.table(origin_table).columns[origin_col as usize]
        .link()
        .expect("link column carries link info");
    let (ci, row) = g
        .table(link.other_table)
        .locate(target)
        .ok_or(StoreError::TargetRowMissing {
            key: target.value(),
        })?;
    g.table_mut(link.other_table).clusters[ci]
        .column_mut(link.other_col as usize)
        .backlinks_at_mut(row)
        .push(origin_key);
    Ok(())
}

/// Drop one forward reference from the target's backlink column.
///
/// Returns true when the removal orphaned the target: the origin column is
/// strong, this was the target's last backlink through it, and no strong
/// backlink remains through any other column. The target has then been
/// queued on `state` and the caller must run the recursive delete once its
/// own write is durable.
pub(crate) fn remove_backlink_entry(
    g: &mut GroupData,
    origin_table: TableKey,
    origin_col: u16,
    origin_key: ObjKey,
    target: ObjKey,
    state: &mut CascadeState,
) -> Result<bool> {
    let link = g.table(origin_table).columns[origin_col as usize]
        .link()
        .expect("link column carries link info");
    let Some((ci, row)) = g.table(link.other_table).locate(target) else {
        return Ok(false);
    };

    let backlinks = g.table_mut(link.other_table).clusters[ci]
        .column_mut(link.other_col as usize)
        .backlinks_at_mut(row);
    let pos = backlinks
        .iter()
        .position(|&k| k == origin_key)
        .expect("backlink bookkeeping out of sync");
    backlinks.remove(pos);
    let last_removed = backlinks.is_empty();

    if link.strength == LinkStrength::Strong
        && last_removed
        && !has_strong_backlinks(g, link.other_table, ci, row)
    {
        debug!(
            table = link.other_table.value(),
            key = target.value(),
            "last strong backlink removed, queueing cascade delete"
        );
        state.enqueue(link.other_table, target);
        return Ok(true);
    }
    Ok(false)
}

/// Replace a forward reference: drop the old backlink, add the new one.
pub(crate) fn replace_backlink_entry(
    g: &mut GroupData,
    origin_table: TableKey,
    origin_col: u16,
    origin_key: ObjKey,
    old: Option<ObjKey>,
    new: Option<ObjKey>,
    state: &mut CascadeState,
) -> Result<bool> {
    let recurse = match old {
        Some(old_key) => remove_backlink_entry(g, origin_table, origin_col, origin_key, old_key, state)?,
        None => false,
    };
    if let Some(new_key) = new {
        add_backlink_entry(g, origin_table, origin_col, origin_key, new_key)?;
    }
    Ok(recurse)
}

/// Does this object still have a backlink through any strong origin column?
pub(crate) fn has_strong_backlinks(
    g: &GroupData,
    table: TableKey,
    cluster: usize,
    row: usize,
) -> bool {
    let t = g.table(table);
    t.columns.iter().any(|spec| {
        spec.key().column_type() == ColumnType::Backlink
            && spec.link().is_some_and(|l| l.strength == LinkStrength::Strong)
            && !t.clusters[cluster]
                .column(spec.key().index())
                .backlinks_at(row)
                .is_empty()
    })
}
