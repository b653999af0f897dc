//! List accessors.
//!
//! [`List<T>`] is a handle onto one (object, column) ordered sequence of
//! scalar elements. [`LinkList`] is the link-valued variant; its mutators
//! maintain backlinks on the target objects and evaluate cascading
//! deletion for elements actually removed.
//!
//! A list accessor is only as alive as its owning object: once the object
//! dies, every list operation fails the same way object access does.

use std::cmp::Ordering;
use std::marker::PhantomData;

use lodestore_error::{Result, StoreError};
use lodestore_types::{ColKey, ColumnType, LinkStrength, ObjKey, TableKey, Value};

use crate::cascade::CascadeState;
use crate::column::{ListData, ScalarValue};
use crate::group::{self, GroupData};
use crate::obj::Obj;

/// Accessor for a scalar-element list column.
pub struct List<T: ScalarValue> {
    obj: Obj,
    col: ColKey,
    _marker: PhantomData<T>,
}

impl<T: ScalarValue> List<T> {
    pub(crate) fn new(obj: Obj, col: ColKey) -> Result<Self> {
        {
            let g = obj.group().read();
            g.table(obj.table_key()).spec(col);
        }
        if !col.is_list() {
            return Err(StoreError::ListTypeMismatch);
        }
        assert_eq!(
            col.column_type(),
            T::COLUMN_TYPE,
            "requested element type does not match column type"
        );
        Ok(Self {
            obj,
            col,
            _marker: PhantomData,
        })
    }

    pub fn obj(&self) -> &Obj {
        &self.obj
    }

    pub fn col(&self) -> ColKey {
        self.col
    }

    pub fn size(&self) -> Result<usize> {
        let g = self.obj.group().read();
        let (ci, row) = self.obj.position(&g)?;
        Ok(self.data(&g, ci, row).len())
    }

    pub fn is_attached(&self) -> bool {
        self.obj.is_valid()
    }

    pub fn get(&self, ndx: usize) -> Result<Option<T>> {
        let g = self.obj.group().read();
        let (ci, row) = self.obj.position(&g)?;
        let list = self.data(&g, ci, row);
        assert!(ndx < list.len(), "list index out of range");
        Ok(T::list_read(list, ndx))
    }

    pub fn set(&self, ndx: usize, value: Option<T>) -> Result<()> {
        let mut g = self.obj.group().write();
        let (ci, row) = self.obj.position(&g)?;
        let len = self.data(&g, ci, row).len();
        assert!(ndx < len, "list index out of range");
        self.check_value(&value)?;

        let repl_value = value.clone().map_or(Value::Null, T::into_value);
        if let Some(r) = g.repl() {
            r.borrow_mut()
                .list_set(self.obj.table_key(), self.col, self.obj.key(), ndx, repl_value)?;
        }
        T::list_write(self.data_mut(&mut g, ci, row), ndx, value);
        g.bump_content_version();
        Ok(())
    }

    pub fn insert(&self, ndx: usize, value: Option<T>) -> Result<()> {
        let mut g = self.obj.group().write();
        let (ci, row) = self.obj.position(&g)?;
        let len = self.data(&g, ci, row).len();
        assert!(ndx <= len, "list index out of range");
        self.check_value(&value)?;

        let repl_value = value.clone().map_or(Value::Null, T::into_value);
        if let Some(r) = g.repl() {
            r.borrow_mut().list_insert(
                self.obj.table_key(),
                self.col,
                self.obj.key(),
                ndx,
                repl_value,
            )?;
        }
        T::list_insert(self.data_mut(&mut g, ci, row), ndx, value);
        g.bump_content_version();
        Ok(())
    }

    /// Append at the end.
    pub fn add(&self, value: Option<T>) -> Result<()> {
        self.insert(self.size()?, value)
    }

    pub fn erase(&self, ndx: usize) -> Result<()> {
        let mut g = self.obj.group().write();
        let (ci, row) = self.obj.position(&g)?;
        let len = self.data(&g, ci, row).len();
        assert!(ndx < len, "list index out of range");

        if let Some(r) = g.repl() {
            r.borrow_mut()
                .list_erase(self.obj.table_key(), self.col, self.obj.key(), ndx)?;
        }
        self.data_mut(&mut g, ci, row).remove(ndx);
        g.bump_content_version();
        Ok(())
    }

    pub fn clear(&self) -> Result<()> {
        let mut g = self.obj.group().write();
        let (ci, row) = self.obj.position(&g)?;
        if let Some(r) = g.repl() {
            r.borrow_mut()
                .list_clear(self.obj.table_key(), self.col, self.obj.key())?;
        }
        self.data_mut(&mut g, ci, row).clear();
        g.bump_content_version();
        Ok(())
    }

    pub fn move_item(&self, from: usize, to: usize) -> Result<()> {
        if from == to {
            return Ok(());
        }
        let mut g = self.obj.group().write();
        let (ci, row) = self.obj.position(&g)?;
        let len = self.data(&g, ci, row).len();
        assert!(from < len && to < len, "list index out of range");

        if let Some(r) = g.repl() {
            r.borrow_mut()
                .list_move(self.obj.table_key(), self.col, self.obj.key(), from, to)?;
        }
        self.data_mut(&mut g, ci, row).move_item(from, to);
        g.bump_content_version();
        Ok(())
    }

    pub fn swap_items(&self, a: usize, b: usize) -> Result<()> {
        if a == b {
            return Ok(());
        }
        let mut g = self.obj.group().write();
        let (ci, row) = self.obj.position(&g)?;
        let len = self.data(&g, ci, row).len();
        assert!(a < len && b < len, "list index out of range");

        if let Some(r) = g.repl() {
            r.borrow_mut()
                .list_swap(self.obj.table_key(), self.col, self.obj.key(), a, b)?;
        }
        self.data_mut(&mut g, ci, row).swap_items(a, b);
        g.bump_content_version();
        Ok(())
    }

    pub fn find_first(&self, needle: &Option<T>) -> Result<Option<usize>> {
        let g = self.obj.group().read();
        let (ci, row) = self.obj.position(&g)?;
        let list = self.data(&g, ci, row);
        Ok((0..list.len()).find(|&i| T::list_read(list, i) == *needle))
    }

    /// Minimum element and its index. Non-aggregable element types yield
    /// `(Null, None)` silently.
    pub fn min(&self) -> Result<(Value, Option<usize>)> {
        let g = self.obj.group().read();
        let (ci, row) = self.obj.position(&g)?;
        Ok(list_min(self.data(&g, ci, row)))
    }

    /// Maximum element and its index.
    pub fn max(&self) -> Result<(Value, Option<usize>)> {
        let g = self.obj.group().read();
        let (ci, row) = self.obj.position(&g)?;
        Ok(list_max(self.data(&g, ci, row)))
    }

    /// Sum of the non-null elements plus their count. Non-aggregable
    /// element types yield `(Null, 0)`.
    pub fn sum(&self) -> Result<(Value, usize)> {
        let g = self.obj.group().read();
        let (ci, row) = self.obj.position(&g)?;
        Ok(list_sum(self.data(&g, ci, row)))
    }

    /// Average of the non-null elements plus their count.
    pub fn avg(&self) -> Result<(Value, usize)> {
        let g = self.obj.group().read();
        let (ci, row) = self.obj.position(&g)?;
        Ok(list_avg(self.data(&g, ci, row)))
    }

    /// Produce an index permutation sorting the list.
    ///
    /// The permutation is built incrementally: indices already present in
    /// `indices` are kept and only indices for newly grown elements are
    /// appended; if the list shrank since the last call, the cache is
    /// discarded and rebuilt.
    pub fn sort(&self, indices: &mut Vec<usize>, ascending: bool) -> Result<()> {
        let g = self.obj.group().read();
        let (ci, row) = self.obj.position(&g)?;
        let list = self.data(&g, ci, row);

        let sz = list.len();
        let mut have = indices.len();
        if sz < have {
            indices.clear();
            have = 0;
        }
        indices.extend(have..sz);
        indices.sort_by(|&a, &b| {
            let ord = opt_cmp::<T>(&T::list_read(list, a), &T::list_read(list, b));
            if ascending {
                ord
            } else {
                ord.reverse()
            }
        });
        Ok(())
    }

    /// Indices of the first occurrence of each distinct value.
    ///
    /// With an explicit sort order the indices come out in that value
    /// order; without one they are re-sorted back into original position
    /// order, preserving the relative order of first occurrences.
    pub fn distinct(&self, indices: &mut Vec<usize>, sort_order: Option<bool>) -> Result<()> {
        indices.clear();
        self.sort(indices, sort_order.unwrap_or(true))?;

        let g = self.obj.group().read();
        let (ci, row) = self.obj.position(&g)?;
        let list = self.data(&g, ci, row);
        indices.dedup_by(|a, b| {
            opt_cmp::<T>(&T::list_read(list, *a), &T::list_read(list, *b)) == Ordering::Equal
        });
        if sort_order.is_none() {
            indices.sort_unstable();
        }
        Ok(())
    }

    fn check_value(&self, value: &Option<T>) -> Result<()> {
        match value {
            None if !self.col.is_nullable() => Err(StoreError::ColumnNotNullable),
            Some(v) => v.check_range(),
            None => Ok(()),
        }
    }

    fn data<'a>(&self, g: &'a GroupData, ci: usize, row: usize) -> &'a ListData {
        g.table(self.obj.table_key())
            .cluster(ci)
            .column(self.col.index())
            .list_at(row)
    }

    fn data_mut<'a>(&self, g: &'a mut GroupData, ci: usize, row: usize) -> &'a mut ListData {
        g.table_mut(self.obj.table_key()).clusters[ci]
            .column_mut(self.col.index())
            .list_at_mut(row)
    }
}

/// `None` ranks below every element value, mirroring the null order of the
/// value layer.
fn opt_cmp<T: ScalarValue>(a: &Option<T>, b: &Option<T>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(x), Some(y)) => T::scalar_cmp(x, y),
    }
}

/* ------------------------------------------------------------------ */
/* List aggregates                                                     */
/* ------------------------------------------------------------------ */

fn fold_extreme<T, C, V>(v: &[Option<T>], cmp: C, into: V, want: Ordering) -> (Value, Option<usize>)
where
    T: Copy,
    C: Fn(&T, &T) -> Ordering,
    V: Fn(T) -> Value,
{
    let mut best: Option<(usize, T)> = None;
    for (i, slot) in v.iter().enumerate() {
        if let Some(x) = slot {
            match &best {
                None => best = Some((i, *x)),
                Some((_, b)) if cmp(x, b) == want => best = Some((i, *x)),
                _ => {}
            }
        }
    }
    match best {
        Some((i, x)) => (into(x), Some(i)),
        None => (Value::Null, None),
    }
}

/// Minimum element of a list and its index; `(Null, None)` for empty or
/// non-aggregable lists.
pub fn list_min(list: &ListData) -> (Value, Option<usize>) {
    match list {
        ListData::Int(v) => fold_extreme(v, |a, b| a.cmp(b), Value::Int, Ordering::Less),
        ListData::Float(v) => fold_extreme(
            v,
            |a, b| lodestore_types::value::compare_f32(*a, *b),
            Value::Float,
            Ordering::Less,
        ),
        ListData::Double(v) => fold_extreme(
            v,
            |a, b| lodestore_types::value::compare_f64(*a, *b),
            Value::Double,
            Ordering::Less,
        ),
        ListData::Timestamp(v) => {
            fold_extreme(v, |a, b| a.cmp(b), Value::Timestamp, Ordering::Less)
        }
        _ => (Value::Null, None),
    }
}

pub fn list_max(list: &ListData) -> (Value, Option<usize>) {
    match list {
        ListData::Int(v) => fold_extreme(v, |a, b| a.cmp(b), Value::Int, Ordering::Greater),
        ListData::Float(v) => fold_extreme(
            v,
            |a, b| lodestore_types::value::compare_f32(*a, *b),
            Value::Float,
            Ordering::Greater,
        ),
        ListData::Double(v) => fold_extreme(
            v,
            |a, b| lodestore_types::value::compare_f64(*a, *b),
            Value::Double,
            Ordering::Greater,
        ),
        ListData::Timestamp(v) => {
            fold_extreme(v, |a, b| a.cmp(b), Value::Timestamp, Ordering::Greater)
        }
        _ => (Value::Null, None),
    }
}

pub fn list_sum(list: &ListData) -> (Value, usize) {
    match list {
        ListData::Int(v) => {
            let mut sum = 0i64;
            let mut cnt = 0;
            for x in v.iter().flatten() {
                sum = sum.wrapping_add(*x);
                cnt += 1;
            }
            (Value::Int(sum), cnt)
        }
        ListData::Float(v) => {
            let mut sum = 0.0f64;
            let mut cnt = 0;
            for x in v.iter().flatten() {
                sum += f64::from(*x);
                cnt += 1;
            }
            (Value::Double(sum), cnt)
        }
        ListData::Double(v) => {
            let mut sum = 0.0f64;
            let mut cnt = 0;
            for x in v.iter().flatten() {
                sum += *x;
                cnt += 1;
            }
            (Value::Double(sum), cnt)
        }
        _ => (Value::Null, 0),
    }
}

pub fn list_avg(list: &ListData) -> (Value, usize) {
    let (sum, cnt) = list_sum(list);
    if cnt == 0 {
        return (Value::Null, 0);
    }
    let total = match sum {
        Value::Int(i) => i as f64,
        Value::Double(d) => d,
        _ => return (Value::Null, 0),
    };
    (Value::Double(total / cnt as f64), cnt)
}

/* ------------------------------------------------------------------ */
/* LinkList                                                            */
/* ------------------------------------------------------------------ */

/// Accessor for a link-list column.
///
/// Invariant: for every element key K, the target object at K carries
/// exactly one backlink entry for the owning (object, column) pair. All
/// mutators below maintain it.
pub struct LinkList {
    obj: Obj,
    col: ColKey,
}

impl LinkList {
    pub(crate) fn new(obj: Obj, col: ColKey) -> Result<Self> {
        {
            let g = obj.group().read();
            g.table(obj.table_key()).spec(col);
        }
        if !col.is_list() {
            return Err(StoreError::ListTypeMismatch);
        }
        assert_eq!(
            col.column_type(),
            ColumnType::LinkList,
            "column is not a link list"
        );
        Ok(Self { obj, col })
    }

    pub fn obj(&self) -> &Obj {
        &self.obj
    }

    pub fn is_attached(&self) -> bool {
        self.obj.is_valid()
    }

    pub fn size(&self) -> Result<usize> {
        let g = self.obj.group().read();
        let (ci, row) = self.obj.position(&g)?;
        Ok(self.links(&g, ci, row).len())
    }

    pub fn get(&self, ndx: usize) -> Result<ObjKey> {
        let g = self.obj.group().read();
        let (ci, row) = self.obj.position(&g)?;
        let links = self.links(&g, ci, row);
        assert!(ndx < links.len(), "list index out of range");
        Ok(links[ndx])
    }

    /// The target object at `ndx`.
    pub fn get_object(&self, ndx: usize) -> Result<Obj> {
        let key = self.get(ndx)?;
        let target = self.target_table();
        Ok(Obj::new(self.obj.group().clone(), target, key))
    }

    pub fn find_first(&self, key: ObjKey) -> Result<Option<usize>> {
        let g = self.obj.group().read();
        let (ci, row) = self.obj.position(&g)?;
        Ok(self.links(&g, ci, row).iter().position(|&k| k == key))
    }

    pub fn set(&self, ndx: usize, target: ObjKey) -> Result<()> {
        let mut g = self.obj.group().write();
        let (ci, row) = self.obj.position(&g)?;
        let links = self.links(&g, ci, row);
        assert!(ndx < links.len(), "list index out of range");
        let old = links[ndx];
        self.check_target(&g, target)?;

        if let Some(r) = g.repl() {
            r.borrow_mut().list_set(
                self.obj.table_key(),
                self.col,
                self.obj.key(),
                ndx,
                Value::Link(target),
            )?;
        }
        if old == target {
            return Ok(());
        }
        let mut state = CascadeState::new();
        let recurse = group::replace_backlink_entry(
            &mut g,
            self.obj.table_key(),
            self.col.index() as u16,
            self.obj.key(),
            Some(old),
            Some(target),
            &mut state,
        )?;
        self.links_mut(&mut g, ci, row)[ndx] = target;
        g.bump_content_version();
        if recurse {
            group::remove_recursive(&mut g, state)?;
        }
        Ok(())
    }

    pub fn insert(&self, ndx: usize, target: ObjKey) -> Result<()> {
        let mut g = self.obj.group().write();
        let (ci, row) = self.obj.position(&g)?;
        let len = self.links(&g, ci, row).len();
        assert!(ndx <= len, "list index out of range");
        self.check_target(&g, target)?;

        if let Some(r) = g.repl() {
            r.borrow_mut().list_insert(
                self.obj.table_key(),
                self.col,
                self.obj.key(),
                ndx,
                Value::Link(target),
            )?;
        }
        group::add_backlink_entry(
            &mut g,
            self.obj.table_key(),
            self.col.index() as u16,
            self.obj.key(),
            target,
        )?;
        self.links_mut(&mut g, ci, row).insert(ndx, target);
        g.bump_content_version();
        Ok(())
    }

    pub fn add(&self, target: ObjKey) -> Result<()> {
        self.insert(self.size()?, target)
    }

    pub fn erase(&self, ndx: usize) -> Result<()> {
        let mut g = self.obj.group().write();
        let (ci, row) = self.obj.position(&g)?;
        let links = self.links(&g, ci, row);
        assert!(ndx < links.len(), "list index out of range");
        let old = links[ndx];

        if let Some(r) = g.repl() {
            r.borrow_mut()
                .list_erase(self.obj.table_key(), self.col, self.obj.key(), ndx)?;
        }
        let mut state = CascadeState::new();
        let recurse = group::remove_backlink_entry(
            &mut g,
            self.obj.table_key(),
            self.col.index() as u16,
            self.obj.key(),
            old,
            &mut state,
        )?;
        self.links_mut(&mut g, ci, row).remove(ndx);
        g.bump_content_version();
        if recurse {
            group::remove_recursive(&mut g, state)?;
        }
        Ok(())
    }

    /// Empty the list.
    ///
    /// On a strong-link list the whole to-be-deleted set is computed up
    /// front, the list is cleared in one step, and a single recursive
    /// delete pass runs afterwards, so the list is never observable in a
    /// half-cleared state. On a weak-link list the elements are unlinked
    /// one at a time and no target is deleted.
    pub fn clear(&self) -> Result<()> {
        let mut g = self.obj.group().write();
        let (ci, row) = self.obj.position(&g)?;
        if self.links(&g, ci, row).is_empty() {
            return Ok(());
        }

        if let Some(r) = g.repl() {
            r.borrow_mut()
                .list_clear(self.obj.table_key(), self.col, self.obj.key())?;
        }

        let origin_table = self.obj.table_key();
        let link = g.table(origin_table).spec(self.col).link().unwrap();

        if link.strength != LinkStrength::Strong {
            let mut state = CascadeState::new();
            for ndx in (0..self.links(&g, ci, row).len()).rev() {
                let old = self.links(&g, ci, row)[ndx];
                group::remove_backlink_entry(
                    &mut g,
                    origin_table,
                    self.col.index() as u16,
                    self.obj.key(),
                    old,
                    &mut state,
                )?;
                self.links_mut(&mut g, ci, row).remove(ndx);
            }
            g.bump_content_version();
            return Ok(());
        }

        let targets: Vec<ObjKey> = self.links(&g, ci, row).to_vec();
        let mut state = CascadeState::new();
        for target in targets {
            if let Some((tci, trow)) = g.table(link.other_table).locate(target) {
                let backlinks = g.table_mut(link.other_table).clusters[tci]
                    .column_mut(link.other_col as usize)
                    .backlinks_at_mut(trow);
                let pos = backlinks
                    .iter()
                    .position(|&k| k == self.obj.key())
                    .expect("backlink bookkeeping out of sync");
                backlinks.remove(pos);
                if backlinks.is_empty() {
                    state.enqueue(link.other_table, target);
                }
            }
        }
        self.links_mut(&mut g, ci, row).clear();
        g.bump_storage_version();
        group::remove_recursive(&mut g, state)
    }

    /// Delete the target object the element at `ndx` points at. The
    /// deletion cascades through the shared removal path, which also
    /// shrinks this list.
    pub fn remove_target_row(&self, ndx: usize) -> Result<()> {
        let key = self.get(ndx)?;
        let target = self.target_table();
        let mut g = self.obj.group().write();
        group::remove_object(&mut g, target, key)
    }

    /// Delete every object currently referenced by this list.
    pub fn remove_all_target_rows(&self) -> Result<()> {
        let targets: Vec<ObjKey> = {
            let g = self.obj.group().read();
            let (ci, row) = self.obj.position(&g)?;
            self.links(&g, ci, row).to_vec()
        };
        let target_table = self.target_table();
        let mut g = self.obj.group().write();
        let mut state = CascadeState::new();
        for key in targets {
            if g.table(target_table).is_valid(key) {
                state.enqueue(target_table, key);
            }
        }
        group::remove_recursive(&mut g, state)
    }

    /// Element keys ordered by a column of the target table.
    pub fn sorted_keys(&self, target_col: ColKey, ascending: bool) -> Result<Vec<ObjKey>> {
        let g = self.obj.group().read();
        let (ci, row) = self.obj.position(&g)?;
        let target = self.target_table();
        let mut pairs: Vec<(ObjKey, Value)> = self
            .links(&g, ci, row)
            .iter()
            .map(|&k| {
                let (tci, trow) = g.table(target).locate(k).expect("dangling link");
                (k, g.table(target).cluster(tci).column(target_col.index()).value_at(trow))
            })
            .collect();
        pairs.sort_by(|a, b| {
            let ord = a.1.total_cmp(&b.1);
            if ascending {
                ord
            } else {
                ord.reverse()
            }
        });
        Ok(pairs.into_iter().map(|(k, _)| k).collect())
    }

    /// The (table, content version) pairs this list's validity depends on,
    /// for view staleness checks.
    pub fn get_dependencies(&self) -> Vec<(TableKey, u64)> {
        if !self.is_attached() {
            return Vec::new();
        }
        let g = self.obj.group().read();
        vec![(self.target_table(), g.content_version())]
    }

    pub fn target_table(&self) -> TableKey {
        let g = self.obj.group().read();
        g.table(self.obj.table_key())
            .spec(self.col)
            .link()
            .expect("link column carries link info")
            .other_table
    }

    fn check_target(&self, g: &GroupData, target: ObjKey) -> Result<()> {
        let link = g.table(self.obj.table_key()).spec(self.col).link().unwrap();
        if !g.table(link.other_table).is_valid(target) {
            return Err(StoreError::TargetRowMissing {
                key: target.value(),
            });
        }
        Ok(())
    }

    fn links<'a>(&self, g: &'a GroupData, ci: usize, row: usize) -> &'a [ObjKey] {
        g.table(self.obj.table_key())
            .cluster(ci)
            .column(self.col.index())
            .list_at(row)
            .links()
    }

    fn links_mut<'a>(&self, g: &'a mut GroupData, ci: usize, row: usize) -> &'a mut Vec<ObjKey> {
        g.table_mut(self.obj.table_key()).clusters[ci]
            .column_mut(self.col.index())
            .list_at_mut(row)
            .links_mut()
    }
}
