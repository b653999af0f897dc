//! Predicate nodes and the intersection-scan driver.
//!
//! A query compiles to a tree of [`QueryNode`]s evaluated over row ranges
//! within the current cluster. Each node only knows its own condition;
//! conjunction is driven from outside by [`find_first_in`], a round-robin
//! constraint-intersection scan over a homogeneous slice of children,
//! the equivalent of merge-intersecting the per-child match streams
//! without materializing them.

use std::cmp::Ordering;

use lodestore_store::cluster::Cluster;
use lodestore_store::column::ScalarValue;
use lodestore_store::{GroupData, TableData};
use lodestore_types::{ColKey, ColumnType, ObjKey, TableKey};

/// Evaluation context for one cluster of the queried table.
pub struct EvalCtx<'a> {
    pub group: &'a GroupData,
    pub table: &'a TableData,
    pub cluster: &'a Cluster,
    pub cluster_index: usize,
}

/// A composable predicate node.
pub trait QueryNode {
    /// Compile per-table state (index lookups, path compilation). Called
    /// once before evaluation starts.
    fn init(&mut self, g: &GroupData, table: TableKey);

    /// The driver moved to a different cluster; drop any per-cluster
    /// cached state.
    fn cluster_changed(&mut self) {}

    /// Scan this node's own condition within `[start, end)` of the current
    /// cluster, returning the first matching row.
    fn find_first_local(&mut self, ctx: &EvalCtx<'_>, start: usize, end: usize) -> Option<usize>;

    /// Static estimate of the per-row evaluation cost.
    fn dt(&self) -> f64 {
        1.0
    }

    fn describe(&self, g: &GroupData, table: TableKey) -> String;

    /// If this node is a plain string-equality condition, its parts:
    /// the hook that lets OR groups collapse into one multi-needle node.
    fn string_equal_parts(&self) -> Option<(ColKey, Option<String>)> {
        None
    }

    /// Try to absorb `other`'s condition into this node. Returns true on
    /// success, in which case `other` is discarded by the caller.
    fn consume_condition(&mut self, other: &dyn QueryNode) -> bool {
        let _ = other;
        false
    }
}

/// Round-robin constraint intersection across sibling conditions.
///
/// Ask a child for its first match at or after the cursor; whenever a
/// child advances the cursor, all other children become unverified again.
/// A row is a match only once every child agrees on it without moving the
/// cursor. An empty child list accepts every row.
pub fn find_first_in(
    children: &mut [Box<dyn QueryNode>],
    ctx: &EvalCtx<'_>,
    mut start: usize,
    end: usize,
) -> Option<usize> {
    let sz = children.len();
    if sz == 0 {
        return (start < end).then_some(start);
    }
    let mut current = 0;
    let mut to_test = sz;

    while start < end {
        let m = children[current].find_first_local(ctx, start, end)?;
        if m != start {
            // The cursor advanced; every other condition must re-verify.
            to_test = sz;
            start = m;
        }
        to_test -= 1;
        if to_test == 0 {
            return Some(start);
        }
        current += 1;
        if current == sz {
            current = 0;
        }
    }
    None
}

/* ------------------------------------------------------------------ */
/* Composite nodes                                                     */
/* ------------------------------------------------------------------ */

/// Conjunction of child conditions.
pub struct AndNode {
    children: Vec<Box<dyn QueryNode>>,
}

impl AndNode {
    pub fn new(children: Vec<Box<dyn QueryNode>>) -> Self {
        Self { children }
    }
}

impl QueryNode for AndNode {
    fn init(&mut self, g: &GroupData, table: TableKey) {
        for c in &mut self.children {
            c.init(g, table);
        }
    }

    fn cluster_changed(&mut self) {
        for c in &mut self.children {
            c.cluster_changed();
        }
    }

    fn find_first_local(&mut self, ctx: &EvalCtx<'_>, start: usize, end: usize) -> Option<usize> {
        find_first_in(&mut self.children, ctx, start, end)
    }

    fn dt(&self) -> f64 {
        self.children.iter().map(|c| c.dt()).sum()
    }

    fn describe(&self, g: &GroupData, table: TableKey) -> String {
        let parts: Vec<String> = self.children.iter().map(|c| c.describe(g, table)).collect();
        format!("({})", parts.join(" and "))
    }
}

/// Disjunction of child conditions.
///
/// Per-child positive results are memoized so that a child whose cached
/// match is still ahead of the cursor is not re-scanned, the common case
/// when the driver advances monotonically.
pub struct OrNode {
    children: Vec<Box<dyn QueryNode>>,
    cached: Vec<Option<usize>>,
}

impl OrNode {
    pub fn new(children: Vec<Box<dyn QueryNode>>) -> Self {
        let cached = vec![None; children.len()];
        Self { children, cached }
    }
}

impl QueryNode for OrNode {
    fn init(&mut self, g: &GroupData, table: TableKey) {
        for c in &mut self.children {
            c.init(g, table);
        }
        self.cached.iter_mut().for_each(|c| *c = None);
    }

    fn cluster_changed(&mut self) {
        for c in &mut self.children {
            c.cluster_changed();
        }
        self.cached.iter_mut().for_each(|c| *c = None);
    }

    fn find_first_local(&mut self, ctx: &EvalCtx<'_>, start: usize, end: usize) -> Option<usize> {
        if start >= end {
            return None;
        }
        let mut best: Option<usize> = None;
        for (c, child) in self.children.iter_mut().enumerate() {
            let hit = match self.cached[c] {
                Some(m) if m >= start && m < end => Some(m),
                _ => {
                    let m = child.find_first_local(ctx, start, end);
                    if m.is_some() {
                        self.cached[c] = m;
                    }
                    m
                }
            };
            if let Some(m) = hit {
                best = Some(best.map_or(m, |b: usize| b.min(m)));
                if m == start {
                    break;
                }
            }
        }
        best
    }

    fn dt(&self) -> f64 {
        self.children.iter().map(|c| c.dt()).sum()
    }

    fn describe(&self, g: &GroupData, table: TableKey) -> String {
        let parts: Vec<String> = self.children.iter().map(|c| c.describe(g, table)).collect();
        format!("({})", parts.join(" or "))
    }
}

/* ------------------------------------------------------------------ */
/* Leaf conditions                                                     */
/* ------------------------------------------------------------------ */

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Equal,
    NotEqual,
    Greater,
    GreaterEqual,
    Less,
    LessEqual,
}

impl CmpOp {
    pub(crate) fn symbol(self) -> &'static str {
        match self {
            Self::Equal => "==",
            Self::NotEqual => "!=",
            Self::Greater => ">",
            Self::GreaterEqual => ">=",
            Self::Less => "<",
            Self::LessEqual => "<=",
        }
    }

    pub(crate) fn matches(self, ord: Ordering) -> bool {
        match self {
            Self::Equal => ord == Ordering::Equal,
            Self::NotEqual => ord != Ordering::Equal,
            Self::Greater => ord == Ordering::Greater,
            Self::GreaterEqual => ord != Ordering::Less,
            Self::Less => ord == Ordering::Less,
            Self::LessEqual => ord != Ordering::Greater,
        }
    }
}

/// Per-column-type comparison leaf. The element-type dispatch is resolved
/// once, at node construction, through the `ScalarValue` impl.
pub struct ScalarNode<T: ScalarValue> {
    col: ColKey,
    op: CmpOp,
    value: T,
}

impl<T: ScalarValue> ScalarNode<T> {
    pub fn new(col: ColKey, op: CmpOp, value: T) -> Self {
        assert_eq!(
            col.column_type(),
            T::COLUMN_TYPE,
            "condition value type does not match column type"
        );
        assert!(!col.is_list(), "scalar conditions apply to scalar columns");
        Self { col, op, value }
    }
}

impl<T: ScalarValue> QueryNode for ScalarNode<T> {
    fn init(&mut self, _g: &GroupData, _table: TableKey) {}

    fn find_first_local(&mut self, ctx: &EvalCtx<'_>, start: usize, end: usize) -> Option<usize> {
        let col = ctx.cluster.column(self.col.index());
        (start..end).find(|&row| match T::read(col, row) {
            // Null never matches a non-null needle, except through
            // inequality.
            None => self.op == CmpOp::NotEqual,
            Some(v) => self.op.matches(T::scalar_cmp(&v, &self.value)),
        })
    }

    fn describe(&self, g: &GroupData, table: TableKey) -> String {
        format!(
            "{} {} {}",
            g.table(table).columns()[self.col.index()].name(),
            self.op.symbol(),
            self.value.clone().into_value()
        )
    }
}

/// Matches rows whose (scalar or link) slot is null.
pub struct NullNode {
    col: ColKey,
    negated: bool,
}

impl NullNode {
    pub fn new(col: ColKey, negated: bool) -> Self {
        assert!(!col.is_list(), "null conditions apply to scalar columns");
        Self { col, negated }
    }
}

impl QueryNode for NullNode {
    fn init(&mut self, _g: &GroupData, _table: TableKey) {}

    fn find_first_local(&mut self, ctx: &EvalCtx<'_>, start: usize, end: usize) -> Option<usize> {
        let col = ctx.cluster.column(self.col.index());
        (start..end).find(|&row| col.is_null(row) != self.negated)
    }

    fn describe(&self, g: &GroupData, table: TableKey) -> String {
        let name = g.table(table).columns()[self.col.index()].name();
        if self.negated {
            format!("{name} != NULL")
        } else {
            format!("{name} == NULL")
        }
    }
}

/// Matches rows whose link column points at a given object: directly for
/// single links, by containment for link lists.
pub struct LinksToNode {
    col: ColKey,
    target: ObjKey,
}

impl LinksToNode {
    pub fn new(col: ColKey, target: ObjKey) -> Self {
        assert!(
            col.column_type().is_link_type(),
            "links-to conditions apply to link columns"
        );
        Self { col, target }
    }
}

impl QueryNode for LinksToNode {
    fn init(&mut self, _g: &GroupData, _table: TableKey) {}

    fn find_first_local(&mut self, ctx: &EvalCtx<'_>, start: usize, end: usize) -> Option<usize> {
        let col = ctx.cluster.column(self.col.index());
        if self.col.column_type() == ColumnType::LinkList {
            (start..end).find(|&row| col.list_at(row).links().contains(&self.target))
        } else {
            (start..end).find(|&row| col.link_at(row) == Some(self.target))
        }
    }

    fn describe(&self, g: &GroupData, table: TableKey) -> String {
        format!(
            "{} links to O{}",
            g.table(table).columns()[self.col.index()].name(),
            self.target
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lodestore_store::Group;
    use lodestore_types::ColumnType;

    fn int_table() -> (Group, lodestore_store::Table, ColKey) {
        let group = Group::new();
        let t = group.add_table("t");
        let col = t.add_column("v", ColumnType::Int, false);
        for v in [5i64, 2, 9, 2, 7] {
            let o = t.create_object().unwrap();
            o.set(col, v).unwrap();
        }
        (group, t, col)
    }

    #[test]
    fn scalar_node_scans_range() {
        let (group, t, col) = int_table();
        let g = group.read();
        let table = g.table(t.key());
        let ctx = EvalCtx {
            group: &g,
            table,
            cluster: table.cluster(0),
            cluster_index: 0,
        };
        let mut node = ScalarNode::new(col, CmpOp::Equal, 2i64);
        assert_eq!(node.find_first_local(&ctx, 0, 5), Some(1));
        assert_eq!(node.find_first_local(&ctx, 2, 5), Some(3));
        assert_eq!(node.find_first_local(&ctx, 4, 5), None);
    }

    #[test]
    fn intersection_driver_requires_all_children() {
        let (group, t, col) = int_table();
        let g = group.read();
        let table = g.table(t.key());
        let ctx = EvalCtx {
            group: &g,
            table,
            cluster: table.cluster(0),
            cluster_index: 0,
        };
        // v > 2 and v < 9 -> rows 0 (5) and 4 (7)
        let mut children: Vec<Box<dyn QueryNode>> = vec![
            Box::new(ScalarNode::new(col, CmpOp::Greater, 2i64)),
            Box::new(ScalarNode::new(col, CmpOp::Less, 9i64)),
        ];
        assert_eq!(find_first_in(&mut children, &ctx, 0, 5), Some(0));
        assert_eq!(find_first_in(&mut children, &ctx, 1, 5), Some(4));
        assert_eq!(find_first_in(&mut children, &ctx, 5, 5), None);
    }

    #[test]
    fn empty_child_list_matches_everything() {
        let (group, t, _col) = int_table();
        let g = group.read();
        let table = g.table(t.key());
        let ctx = EvalCtx {
            group: &g,
            table,
            cluster: table.cluster(0),
            cluster_index: 0,
        };
        let mut children: Vec<Box<dyn QueryNode>> = Vec::new();
        assert_eq!(find_first_in(&mut children, &ctx, 3, 5), Some(3));
    }

    #[test]
    fn or_node_takes_minimum_match() {
        let (group, t, col) = int_table();
        let g = group.read();
        let table = g.table(t.key());
        let ctx = EvalCtx {
            group: &g,
            table,
            cluster: table.cluster(0),
            cluster_index: 0,
        };
        let mut node = OrNode::new(vec![
            Box::new(ScalarNode::new(col, CmpOp::Equal, 9i64)),
            Box::new(ScalarNode::new(col, CmpOp::Equal, 2i64)),
        ]);
        assert_eq!(node.find_first_local(&ctx, 0, 5), Some(1));
        assert_eq!(node.find_first_local(&ctx, 2, 5), Some(2));
        assert_eq!(node.find_first_local(&ctx, 4, 5), None);
    }
}
