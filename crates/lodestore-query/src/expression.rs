//! Compiled expressions: comparisons whose operands reach across link
//! paths, count links, aggregate list properties or count subquery
//! matches.
//!
//! Operand evaluation produces a set of values per source row (one per
//! reached target); comparison is ANY-match over the operand sets.

use lodestore_store::list::{list_avg, list_max, list_min, list_sum};
use lodestore_store::GroupData;
use lodestore_types::{ColKey, TableKey, Value};
use smallvec::SmallVec;

use crate::link_path::LinkPath;
use crate::nodes::{find_first_in, CmpOp, EvalCtx, QueryNode};

type Values = SmallVec<[Value; 2]>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggrKind {
    Min,
    Max,
    Sum,
    Avg,
}

impl AggrKind {
    fn suffix(self) -> &'static str {
        match self {
            Self::Min => "@min",
            Self::Max => "@max",
            Self::Sum => "@sum",
            Self::Avg => "@avg",
        }
    }
}

/// One side of a comparison.
pub enum Operand {
    /// A constant value.
    Const(Value),
    /// A scalar or link property, reached through a (possibly empty) link
    /// path.
    Prop { path: LinkPath, col: ColKey },
    /// Number of targets reached by the path.
    LinkCount { path: LinkPath },
    /// Aggregate over a list property of the reached targets.
    ListAggregate {
        path: LinkPath,
        col: ColKey,
        op: AggrKind,
    },
    /// Number of reached targets satisfying a predicate tree.
    SubQueryCount {
        path: LinkPath,
        predicate: Vec<Box<dyn QueryNode>>,
    },
}

impl Operand {
    pub fn constant(v: impl Into<Value>) -> Self {
        Self::Const(v.into())
    }

    pub fn prop(path: LinkPath, col: ColKey) -> Self {
        assert!(!col.is_list(), "list properties aggregate via ListAggregate");
        Self::Prop { path, col }
    }

    fn init(&mut self, g: &GroupData, table: TableKey) {
        match self {
            Self::Const(_) => {}
            Self::Prop { path, .. } | Self::LinkCount { path } | Self::ListAggregate { path, .. } => {
                path.set_base_table(g, table);
            }
            Self::SubQueryCount { path, predicate } => {
                path.set_base_table(g, table);
                let target = path.target_table();
                for node in predicate.iter_mut() {
                    node.init(g, target);
                }
            }
        }
    }

    fn evaluate(&mut self, ctx: &EvalCtx<'_>, row: usize) -> Values {
        match self {
            Self::Const(v) => {
                let mut out = Values::new();
                out.push(v.clone());
                out
            }
            Self::Prop { path, col } => {
                if !path.has_links() {
                    let mut out = Values::new();
                    out.push(ctx.cluster.column(col.index()).value_at(row));
                    return out;
                }
                let source = ctx.cluster.key_at(row);
                let target_table = path.target_table();
                let mut out = Values::new();
                for key in path.get_links(ctx.group, source) {
                    if let Some((ci, trow)) = ctx.group.table(target_table).locate(key) {
                        out.push(
                            ctx.group
                                .table(target_table)
                                .cluster(ci)
                                .column(col.index())
                                .value_at(trow),
                        );
                    }
                }
                out
            }
            Self::LinkCount { path } => {
                let source = ctx.cluster.key_at(row);
                let count = path.get_links(ctx.group, source).len();
                let mut out = Values::new();
                out.push(Value::Int(count as i64));
                out
            }
            Self::ListAggregate { path, col, op } => {
                let source = ctx.cluster.key_at(row);
                let target_table = path.target_table();
                let targets = if path.has_links() {
                    path.get_links(ctx.group, source)
                } else {
                    let mut s = SmallVec::new();
                    s.push(source);
                    s
                };

                let mut best = Value::Null;
                let mut sum_int = 0i64;
                let mut sum_double = 0.0f64;
                let mut count = 0usize;
                // The sum's value type follows the column's element type,
                // even when no target contributed.
                let summed_int = col.column_type() == lodestore_types::ColumnType::Int;
                for key in targets {
                    let Some((ci, trow)) = ctx.group.table(target_table).locate(key) else {
                        continue;
                    };
                    let list = ctx
                        .group
                        .table(target_table)
                        .cluster(ci)
                        .column(col.index())
                        .list_at(trow);
                    match op {
                        AggrKind::Min => {
                            let (v, _) = list_min(list);
                            if !v.is_null()
                                && (best.is_null() || v.total_cmp(&best) == std::cmp::Ordering::Less)
                            {
                                best = v;
                            }
                        }
                        AggrKind::Max => {
                            let (v, _) = list_max(list);
                            if !v.is_null()
                                && (best.is_null()
                                    || v.total_cmp(&best) == std::cmp::Ordering::Greater)
                            {
                                best = v;
                            }
                        }
                        AggrKind::Sum | AggrKind::Avg => {
                            let (v, c) = list_sum(list);
                            match v {
                                Value::Int(i) => sum_int = sum_int.wrapping_add(i),
                                Value::Double(d) => sum_double += d,
                                _ => {}
                            }
                            count += c;
                        }
                    }
                }
                let result = match op {
                    AggrKind::Min | AggrKind::Max => best,
                    AggrKind::Sum => {
                        if summed_int {
                            Value::Int(sum_int)
                        } else {
                            Value::Double(sum_double)
                        }
                    }
                    AggrKind::Avg => {
                        if count == 0 {
                            Value::Null
                        } else {
                            let total = if summed_int {
                                sum_int as f64
                            } else {
                                sum_double
                            };
                            Value::Double(total / count as f64)
                        }
                    }
                };
                let mut out = Values::new();
                out.push(result);
                out
            }
            Self::SubQueryCount { path, predicate } => {
                let source = ctx.cluster.key_at(row);
                let target_table_key = path.target_table();
                let target_table = ctx.group.table(target_table_key);
                let mut count = 0i64;
                for key in path.get_links(ctx.group, source) {
                    let Some((ci, trow)) = target_table.locate(key) else {
                        continue;
                    };
                    let sub_ctx = EvalCtx {
                        group: ctx.group,
                        table: target_table,
                        cluster: target_table.cluster(ci),
                        cluster_index: ci,
                    };
                    for node in predicate.iter_mut() {
                        node.cluster_changed();
                    }
                    if find_first_in(predicate, &sub_ctx, trow, trow + 1).is_some() {
                        count += 1;
                    }
                }
                let mut out = Values::new();
                out.push(Value::Int(count));
                out
            }
        }
    }

    fn describe(&self, g: &GroupData, table: TableKey) -> String {
        match self {
            Self::Const(v) => v.to_string(),
            Self::Prop { path, col } => {
                let col_name = g.table(path.target_table_or(table)).columns()[col.index()]
                    .name()
                    .to_owned();
                if path.has_links() {
                    format!("{}.{col_name}", path.describe(g))
                } else {
                    col_name
                }
            }
            Self::LinkCount { path } => format!("{}.@count", path.describe(g)),
            Self::ListAggregate { path, col, op } => {
                let col_name = g.table(path.target_table_or(table)).columns()[col.index()]
                    .name()
                    .to_owned();
                if path.has_links() {
                    format!("{}.{col_name}.{}", path.describe(g), op.suffix())
                } else {
                    format!("{col_name}.{}", op.suffix())
                }
            }
            Self::SubQueryCount { path, predicate } => {
                let inner: Vec<String> = predicate
                    .iter()
                    .map(|n| n.describe(g, path.target_table_or(table)))
                    .collect();
                format!(
                    "SUBQUERY({}, {}).@count",
                    path.describe(g),
                    inner.join(" and ")
                )
            }
        }
    }
}

/// A comparison between two operands.
pub struct Compare {
    pub op: CmpOp,
    lhs: Operand,
    rhs: Operand,
}

impl Compare {
    pub fn new(lhs: Operand, op: CmpOp, rhs: Operand) -> Self {
        Self { op, lhs, rhs }
    }

    fn init(&mut self, g: &GroupData, table: TableKey) {
        self.lhs.init(g, table);
        self.rhs.init(g, table);
    }

    fn matches(&mut self, ctx: &EvalCtx<'_>, row: usize) -> bool {
        let lhs = self.lhs.evaluate(ctx, row);
        let rhs = self.rhs.evaluate(ctx, row);
        lhs.iter()
            .any(|a| rhs.iter().any(|b| query_cmp(self.op, a, b)))
    }
}

/// Comparison semantics at evaluation time: equality treats two nulls as
/// equal and a lone null as unequal; ordering operators never match null
/// operands; cross-type pairs never match.
fn query_cmp(op: CmpOp, a: &Value, b: &Value) -> bool {
    match (a.is_null(), b.is_null()) {
        (true, true) => matches!(op, CmpOp::Equal | CmpOp::GreaterEqual | CmpOp::LessEqual),
        (true, false) | (false, true) => op == CmpOp::NotEqual,
        (false, false) => match a.try_cmp(b) {
            Some(ord) => op.matches(ord),
            None => false,
        },
    }
}

/// Predicate node wrapping a compiled expression.
pub struct ExpressionNode {
    cmp: Compare,
}

impl ExpressionNode {
    pub fn new(cmp: Compare) -> Self {
        Self { cmp }
    }
}

impl QueryNode for ExpressionNode {
    fn init(&mut self, g: &GroupData, table: TableKey) {
        self.cmp.init(g, table);
    }

    fn find_first_local(&mut self, ctx: &EvalCtx<'_>, start: usize, end: usize) -> Option<usize> {
        (start..end).find(|&row| self.cmp.matches(ctx, row))
    }

    fn dt(&self) -> f64 {
        50.0
    }

    fn describe(&self, g: &GroupData, table: TableKey) -> String {
        format!(
            "{} {} {}",
            self.cmp.lhs.describe(g, table),
            self.cmp.op.symbol(),
            self.cmp.rhs.describe(g, table)
        )
    }
}
