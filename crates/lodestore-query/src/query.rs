//! Query front end and the outer evaluation driver.
//!
//! A query is an implicit conjunction of predicate nodes over one table.
//! Execution walks the table cluster by cluster; within each cluster the
//! cheapest child (by the running `dD * dT` score) leads a span of the
//! scan while the others verify its candidates, and the leader is
//! re-picked between spans.

use std::ops::ControlFlow;

use lodestore_store::column::ScalarValue;
use lodestore_store::{Group, Obj, Table};
use lodestore_types::{ColKey, ColumnType, ObjKey, TableKey, Value};

use crate::expression::{Compare, ExpressionNode};
use crate::nodes::{find_first_in, CmpOp, EvalCtx, LinksToNode, NullNode, QueryNode, ScalarNode};
use crate::not_node::NotNode;
use crate::state::{prepare_action, AggregateOp, AggregateState, LeafAction};
use crate::string_node::{StringNode, StringOp};

/// Matches found per `aggregate_local` span before the leader is
/// re-evaluated.
const FIND_LOCALS: usize = 64;

pub struct Query {
    group: Group,
    table: TableKey,
    children: Vec<Box<dyn QueryNode>>,
    scores: Vec<f64>,
}

impl Query {
    pub fn new(table: &Table) -> Self {
        Self {
            group: table.group().clone(),
            table: table.key(),
            children: Vec::new(),
            scores: Vec::new(),
        }
    }

    pub fn table_key(&self) -> TableKey {
        self.table
    }

    /// Add a condition (conjunction).
    pub fn and(mut self, node: Box<dyn QueryNode>) -> Self {
        self.children.push(node);
        self
    }

    pub fn push(&mut self, node: Box<dyn QueryNode>) {
        self.children.push(node);
    }

    /* ------------------------- builder sugar ------------------------ */

    pub fn cmp<T: ScalarValue + 'static>(self, col: ColKey, op: CmpOp, value: T) -> Self {
        self.and(Box::new(ScalarNode::new(col, op, value)))
    }

    pub fn equal<T: ScalarValue + 'static>(self, col: ColKey, value: T) -> Self {
        self.cmp(col, CmpOp::Equal, value)
    }

    pub fn not_equal<T: ScalarValue + 'static>(self, col: ColKey, value: T) -> Self {
        self.cmp(col, CmpOp::NotEqual, value)
    }

    pub fn greater<T: ScalarValue + 'static>(self, col: ColKey, value: T) -> Self {
        self.cmp(col, CmpOp::Greater, value)
    }

    pub fn less<T: ScalarValue + 'static>(self, col: ColKey, value: T) -> Self {
        self.cmp(col, CmpOp::Less, value)
    }

    pub fn string(self, col: ColKey, op: StringOp, value: &str) -> Self {
        self.and(Box::new(StringNode::new(col, op, Some(value.to_owned()))))
    }

    pub fn string_equal(self, col: ColKey, value: &str) -> Self {
        self.string(col, StringOp::Equal, value)
    }

    pub fn is_null(self, col: ColKey) -> Self {
        self.and(Box::new(NullNode::new(col, false)))
    }

    pub fn not_null(self, col: ColKey) -> Self {
        self.and(Box::new(NullNode::new(col, true)))
    }

    pub fn links_to(self, col: ColKey, target: ObjKey) -> Self {
        self.and(Box::new(LinksToNode::new(col, target)))
    }

    pub fn not(self, inner: Box<dyn QueryNode>) -> Self {
        self.and(Box::new(NotNode::new(inner)))
    }

    /// Add a disjunction group, consolidating same-column string
    /// equalities into one multi-needle membership node.
    pub fn any_of(self, alternatives: Vec<Box<dyn QueryNode>>) -> Self {
        self.and(or_node(alternatives))
    }

    pub fn expression(self, cmp: Compare) -> Self {
        self.and(Box::new(ExpressionNode::new(cmp)))
    }

    /* --------------------------- execution -------------------------- */

    pub fn find_first(&mut self) -> Option<ObjKey> {
        let group = self.group.clone();
        let g = group.read();
        let table = g.table(self.table);
        for c in &mut self.children {
            c.init(&g, self.table);
        }
        for (ci, cluster) in table.clusters().iter().enumerate() {
            for c in &mut self.children {
                c.cluster_changed();
            }
            let ctx = EvalCtx {
                group: &g,
                table,
                cluster,
                cluster_index: ci,
            };
            if let Some(row) = find_first_in(&mut self.children, &ctx, 0, cluster.len()) {
                return Some(cluster.key_at(row));
            }
        }
        None
    }

    pub fn find_all(&mut self) -> Vec<ObjKey> {
        let mut st = AggregateState::new(None);
        self.aggregate_internal(AggregateOp::FindAll, &mut st);
        st.results
    }

    pub fn count(&mut self) -> usize {
        let mut st = AggregateState::new(None);
        self.aggregate_internal(AggregateOp::Count, &mut st);
        st.matches
    }

    /// Visit every match; the callback returns false to stop early.
    pub fn for_each(&mut self, cb: &mut dyn FnMut(ObjKey) -> bool) {
        let mut st = AggregateState::with_callback(cb);
        self.aggregate_internal(AggregateOp::Callback, &mut st);
    }

    /// Sum over a numeric column: `Int` for integer columns, `Double` for
    /// float/double columns.
    pub fn sum(&mut self, col: ColKey) -> Value {
        let mut st = AggregateState::new(Some(col));
        self.aggregate_internal(AggregateOp::Sum, &mut st);
        match col.column_type() {
            ColumnType::Int => Value::Int(st.sum_int),
            _ => Value::Double(st.sum_double),
        }
    }

    /// Minimum over a numeric or timestamp column; `Null` with no matches.
    pub fn min(&mut self, col: ColKey) -> Value {
        let mut st = AggregateState::new(Some(col));
        self.aggregate_internal(AggregateOp::Min, &mut st);
        st.min_value
    }

    pub fn max(&mut self, col: ColKey) -> Value {
        let mut st = AggregateState::new(Some(col));
        self.aggregate_internal(AggregateOp::Max, &mut st);
        st.max_value
    }

    /// Average over a numeric column; `None` when no non-null values
    /// matched.
    pub fn average(&mut self, col: ColKey) -> Option<f64> {
        let mut st = AggregateState::new(Some(col));
        self.aggregate_internal(AggregateOp::Average, &mut st);
        if st.nonnull == 0 {
            return None;
        }
        let total = match col.column_type() {
            ColumnType::Int => st.sum_int as f64,
            _ => st.sum_double,
        };
        Some(total / st.nonnull as f64)
    }

    /// Single-object entry point: does `obj` satisfy this query?
    pub fn matches(&mut self, obj: &Obj) -> bool {
        let group = self.group.clone();
        let g = group.read();
        let table = g.table(self.table);
        let Some((ci, row)) = table.locate(obj.key()) else {
            return false;
        };
        for c in &mut self.children {
            c.init(&g, self.table);
            c.cluster_changed();
        }
        let ctx = EvalCtx {
            group: &g,
            table,
            cluster: table.cluster(ci),
            cluster_index: ci,
        };
        find_first_in(&mut self.children, &ctx, row, row + 1) == Some(row)
    }

    /// Textual form of the predicate tree, for diagnostics.
    pub fn describe(&mut self) -> String {
        let group = self.group.clone();
        let g = group.read();
        for c in &mut self.children {
            c.init(&g, self.table);
        }
        if self.children.is_empty() {
            return "TRUEPREDICATE".to_owned();
        }
        let parts: Vec<String> = self
            .children
            .iter()
            .map(|c| c.describe(&g, self.table))
            .collect();
        parts.join(" and ")
    }

    fn aggregate_internal(&mut self, op: AggregateOp, st: &mut AggregateState<'_>) {
        let action = prepare_action(op, st.col);
        let group = self.group.clone();
        let g = group.read();
        let table = g.table(self.table);

        for c in &mut self.children {
            c.init(&g, self.table);
        }
        self.scores = vec![100.0; self.children.len()];

        'clusters: for (ci, cluster) in table.clusters().iter().enumerate() {
            for c in &mut self.children {
                c.cluster_changed();
            }
            let ctx = EvalCtx {
                group: &g,
                table,
                cluster,
                cluster_index: ci,
            };
            let end = cluster.len();

            if self.children.is_empty() {
                for row in 0..end {
                    if !action(st, &ctx, row) {
                        break 'clusters;
                    }
                }
                continue;
            }

            let mut start = 0;
            while start < end {
                let leader = self.best_child();
                match aggregate_local(
                    &mut self.children,
                    leader,
                    &ctx,
                    st,
                    action,
                    start,
                    end,
                    FIND_LOCALS,
                    &mut self.scores[leader],
                ) {
                    ControlFlow::Break(()) => break 'clusters,
                    ControlFlow::Continue(next) => start = next,
                }
            }
        }
    }

    /// Index of the cheapest child by the running distance estimate times
    /// the per-row cost.
    fn best_child(&self) -> usize {
        let mut best = 0;
        let mut best_score = f64::MAX;
        for (i, c) in self.children.iter().enumerate() {
            let score = self.scores[i] * c.dt();
            if score < best_score {
                best_score = score;
                best = i;
            }
        }
        best
    }
}

/// Drive the intersection scan with `leader` finding candidates and the
/// remaining children verifying them, for at most `local_limit` matches.
///
/// Returns the next row to continue from, or `Break` when the action
/// requested a stop. Updates `score` with the observed rows-per-match
/// distance so the outer driver can re-pick the leader.
#[allow(clippy::too_many_arguments)]
fn aggregate_local(
    children: &mut [Box<dyn QueryNode>],
    leader: usize,
    ctx: &EvalCtx<'_>,
    st: &mut AggregateState<'_>,
    action: LeafAction,
    start: usize,
    end: usize,
    local_limit: usize,
    score: &mut f64,
) -> ControlFlow<(), usize> {
    let mut local_matches = 0usize;
    let mut pos = start;
    loop {
        if local_matches == local_limit {
            *score = (pos - start) as f64 / (local_matches as f64 + 1.1);
            return ControlFlow::Continue(pos);
        }
        let Some(r) = children[leader].find_first_local(ctx, pos, end) else {
            *score = (pos - start) as f64 / (local_matches as f64 + 1.1);
            return ControlFlow::Continue(end);
        };
        local_matches += 1;

        let mut all_agree = true;
        for c in 0..children.len() {
            if c == leader {
                continue;
            }
            if children[c].find_first_local(ctx, r, r + 1) != Some(r) {
                all_agree = false;
                break;
            }
        }
        if all_agree && !action(st, ctx, r) {
            return ControlFlow::Break(());
        }
        pos = r + 1;
    }
}

/// Build a disjunction node, consolidating adjacent string equalities on
/// the same column into a single multi-needle node.
pub fn or_node(children: Vec<Box<dyn QueryNode>>) -> Box<dyn QueryNode> {
    let mut merged: Vec<Box<dyn QueryNode>> = Vec::new();
    for node in children {
        if let Some(head) = merged.first_mut() {
            if head.consume_condition(node.as_ref()) {
                continue;
            }
        }
        merged.push(node);
    }
    if merged.len() == 1 {
        return merged.pop().unwrap();
    }
    Box::new(crate::nodes::OrNode::new(merged))
}
