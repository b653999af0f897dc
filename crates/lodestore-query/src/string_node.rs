//! String condition nodes.
//!
//! Equality is the interesting case: with a search index present the node
//! walks a cached window of matching keys alongside the driver's advancing
//! cursor instead of probing the index per row; the window scan restarts
//! from the top only when the cursor is seen to regress. Once an equality
//! node has absorbed sibling OR conditions on the same column it becomes a
//! multi-needle membership test evaluated in fixed-width batches.

use lodestore_store::column::ScalarValue;
use lodestore_store::GroupData;
use lodestore_types::{ColKey, ColumnType, ObjKey, TableKey, Value};
use tracing::debug;

use crate::nodes::{EvalCtx, QueryNode};

/// Needles are compared against in batches of this many per row.
const NEEDLE_BATCH: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StringOp {
    Equal,
    NotEqual,
    Contains,
    BeginsWith,
    EndsWith,
}

impl StringOp {
    fn symbol(self) -> &'static str {
        match self {
            Self::Equal => "==",
            Self::NotEqual => "!=",
            Self::Contains => "CONTAINS",
            Self::BeginsWith => "BEGINSWITH",
            Self::EndsWith => "ENDSWITH",
        }
    }

    fn matches(self, haystack: Option<&str>, needle: Option<&str>) -> bool {
        match (self, haystack, needle) {
            (Self::Equal, h, n) => h == n,
            (Self::NotEqual, h, n) => h != n,
            (Self::Contains, Some(h), Some(n)) => h.contains(n),
            (Self::BeginsWith, Some(h), Some(n)) => h.starts_with(n),
            (Self::EndsWith, Some(h), Some(n)) => h.ends_with(n),
            _ => false,
        }
    }
}

pub struct StringNode {
    col: ColKey,
    op: StringOp,
    value: Option<String>,
    /// Extra equality needles absorbed from OR siblings.
    needles: Vec<String>,
    needles_hold_null: bool,

    /// Sorted matching keys from the search index, valid when `has_index`.
    index_keys: Vec<ObjKey>,
    has_index: bool,
    results_start: usize,
    results_end: usize,
    results_ndx: usize,
    actual_key: Option<ObjKey>,
    last_start_key: Option<ObjKey>,
}

impl StringNode {
    pub fn new(col: ColKey, op: StringOp, value: Option<String>) -> Self {
        assert_eq!(
            col.column_type(),
            ColumnType::String,
            "string conditions apply to string columns"
        );
        assert!(!col.is_list());
        Self {
            col,
            op,
            value,
            needles: Vec::new(),
            needles_hold_null: false,
            index_keys: Vec::new(),
            has_index: false,
            results_start: 0,
            results_end: 0,
            results_ndx: 0,
            actual_key: None,
            last_start_key: None,
        }
    }

    fn uses_needles(&self) -> bool {
        !self.needles.is_empty() || self.needles_hold_null
    }

    fn search_index_init(&mut self, g: &GroupData, table: TableKey) {
        let index = g
            .table(table)
            .search_index(self.col)
            .expect("index presence checked by caller");
        let needle = self
            .value
            .clone()
            .map_or(Value::Null, Value::String);
        self.index_keys = index.find_all(&needle).to_vec();
        self.results_start = 0;
        self.results_end = self.index_keys.len();
        self.results_ndx = 0;
        self.actual_key = self.index_keys.first().copied();
        self.last_start_key = None;
    }

    /// Walk the cached index-match window against the advancing cursor.
    fn find_first_indexed(&mut self, ctx: &EvalCtx<'_>, start: usize, end: usize) -> Option<usize> {
        if start >= end {
            return None;
        }
        let first_key = ctx.cluster.key_at(start);
        if let Some(last) = self.last_start_key {
            if first_key < last {
                // The cursor regressed; we no longer know where we are, so
                // restart the window scan from the top.
                self.results_ndx = self.results_start;
                self.actual_key = (self.results_start != self.results_end)
                    .then(|| self.index_keys[self.results_start]);
            }
        }
        self.last_start_key = Some(first_key);

        if self.results_ndx >= self.results_end {
            return None;
        }
        // Advance to the first candidate key at or beyond the cursor.
        let mut actual = self.actual_key?;
        while first_key > actual {
            self.results_ndx += 1;
            if self.results_ndx == self.results_end {
                return None;
            }
            actual = self.index_keys[self.results_ndx];
            self.actual_key = Some(actual);
        }
        // A candidate beyond this cluster's last key is not in this leaf.
        let last_key = ctx.cluster.key_at(end - 1);
        if actual > last_key {
            return None;
        }
        Some(ctx.cluster.lower_bound(actual))
    }

    fn find_first_scan(&self, ctx: &EvalCtx<'_>, start: usize, end: usize) -> Option<usize> {
        let col = ctx.cluster.column(self.col.index());
        if !self.uses_needles() {
            let needle = self.value.as_deref();
            return (start..end).find(|&row| {
                let hay = String::read(col, row);
                self.op.matches(hay.as_deref(), needle)
            });
        }
        // Multi-needle membership, batched at a fixed width.
        (start..end).find(|&row| {
            let hay = String::read(col, row);
            match &hay {
                None => self.needles_hold_null,
                Some(h) => self
                    .needles
                    .chunks(NEEDLE_BATCH)
                    .any(|batch| batch.iter().any(|n| n == h)),
            }
        })
    }
}

impl QueryNode for StringNode {
    fn init(&mut self, g: &GroupData, table: TableKey) {
        self.has_index = self.op == StringOp::Equal
            && !self.uses_needles()
            && g.table(table).has_search_index(self.col);
        if self.has_index {
            self.search_index_init(g, table);
        }
    }

    fn cluster_changed(&mut self) {
        // The window cursor carries across clusters on purpose: cluster
        // keys advance monotonically during a forward scan.
    }

    fn find_first_local(&mut self, ctx: &EvalCtx<'_>, start: usize, end: usize) -> Option<usize> {
        if self.has_index {
            self.find_first_indexed(ctx, start, end)
        } else {
            self.find_first_scan(ctx, start, end)
        }
    }

    fn dt(&self) -> f64 {
        if self.has_index {
            0.0
        } else {
            10.0
        }
    }

    fn describe(&self, g: &GroupData, table: TableKey) -> String {
        let name = g.table(table).columns()[self.col.index()].name();
        if !self.uses_needles() {
            let v = self
                .value
                .clone()
                .map_or(Value::Null, Value::String);
            return format!("{name} {} {v}", self.op.symbol());
        }
        let mut parts: Vec<String> = Vec::new();
        if self.needles_hold_null {
            parts.push(format!("{name} == NULL"));
        }
        for n in &self.needles {
            parts.push(format!("{name} == \"{n}\""));
        }
        format!("({})", parts.join(" or "))
    }

    fn string_equal_parts(&self) -> Option<(ColKey, Option<String>)> {
        (self.op == StringOp::Equal && !self.uses_needles())
            .then(|| (self.col, self.value.clone()))
    }

    fn consume_condition(&mut self, other: &dyn QueryNode) -> bool {
        if self.op != StringOp::Equal {
            return false;
        }
        let Some((col, value)) = other.string_equal_parts() else {
            return false;
        };
        if col != self.col {
            return false;
        }
        // A consolidated needle set beats the index in this shape.
        self.has_index = false;
        if !self.uses_needles() {
            match self.value.take() {
                Some(v) => self.needles.push(v),
                None => self.needles_hold_null = true,
            }
        }
        match value {
            Some(v) => self.needles.push(v),
            None => self.needles_hold_null = true,
        }
        debug!(needles = self.needles.len(), "consolidated string equality into needle set");
        true
    }
}
