//! Aggregate actions.
//!
//! The action invoked per matching row is chosen once, at prepare time,
//! from the (aggregate kind x column type) combination: a function
//! pointer looked up before the scan starts, not a dispatch per row.

use lodestore_store::column::ScalarValue;
use lodestore_types::{ColKey, ColumnType, ObjKey, Timestamp, Value};

use crate::nodes::EvalCtx;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateOp {
    Count,
    FindAll,
    First,
    Sum,
    Min,
    Max,
    Average,
    Callback,
}

/// Mutable state threaded through one aggregate run.
pub struct AggregateState<'a> {
    pub col: Option<ColKey>,
    /// Rows that matched the predicate tree.
    pub matches: usize,
    /// Matching rows whose aggregated column slot was non-null.
    pub nonnull: usize,
    pub sum_int: i64,
    pub sum_double: f64,
    pub min_value: Value,
    pub max_value: Value,
    pub first: Option<ObjKey>,
    pub results: Vec<ObjKey>,
    pub callback: Option<&'a mut dyn FnMut(ObjKey) -> bool>,
}

impl<'a> AggregateState<'a> {
    pub fn new(col: Option<ColKey>) -> Self {
        Self {
            col,
            matches: 0,
            nonnull: 0,
            sum_int: 0,
            sum_double: 0.0,
            min_value: Value::Null,
            max_value: Value::Null,
            first: None,
            results: Vec::new(),
            callback: None,
        }
    }

    pub fn with_callback(cb: &'a mut dyn FnMut(ObjKey) -> bool) -> Self {
        let mut st = Self::new(None);
        st.callback = Some(cb);
        st
    }
}

/// Per-match action; returns false to stop the scan.
pub type LeafAction = for<'a, 'b> fn(&mut AggregateState<'a>, &EvalCtx<'b>, usize) -> bool;

/// Resolve the action for an aggregate kind over a column.
///
/// Unsupported combinations (sum over strings, average over timestamps)
/// are contract violations by the query builder and panic.
pub fn prepare_action(op: AggregateOp, col: Option<ColKey>) -> LeafAction {
    let ty = col.map(ColKey::column_type);
    match (op, ty) {
        (AggregateOp::Count, _) => act_count,
        (AggregateOp::FindAll, _) => act_find_all,
        (AggregateOp::First, _) => act_first,
        (AggregateOp::Callback, _) => act_callback,
        (AggregateOp::Sum | AggregateOp::Average, Some(ColumnType::Int)) => act_sum_int,
        (AggregateOp::Sum | AggregateOp::Average, Some(ColumnType::Float)) => act_sum_float,
        (AggregateOp::Sum | AggregateOp::Average, Some(ColumnType::Double)) => act_sum_double,
        (AggregateOp::Min, Some(ColumnType::Int)) => act_min::<i64>,
        (AggregateOp::Min, Some(ColumnType::Float)) => act_min::<f32>,
        (AggregateOp::Min, Some(ColumnType::Double)) => act_min::<f64>,
        (AggregateOp::Min, Some(ColumnType::Timestamp)) => act_min::<Timestamp>,
        (AggregateOp::Max, Some(ColumnType::Int)) => act_max::<i64>,
        (AggregateOp::Max, Some(ColumnType::Float)) => act_max::<f32>,
        (AggregateOp::Max, Some(ColumnType::Double)) => act_max::<f64>,
        (AggregateOp::Max, Some(ColumnType::Timestamp)) => act_max::<Timestamp>,
        _ => panic!("aggregate {op:?} is not defined over {ty:?}"),
    }
}

fn act_count(st: &mut AggregateState<'_>, _ctx: &EvalCtx<'_>, _row: usize) -> bool {
    st.matches += 1;
    true
}

fn act_find_all(st: &mut AggregateState<'_>, ctx: &EvalCtx<'_>, row: usize) -> bool {
    st.matches += 1;
    st.results.push(ctx.cluster.key_at(row));
    true
}

fn act_first(st: &mut AggregateState<'_>, ctx: &EvalCtx<'_>, row: usize) -> bool {
    st.matches += 1;
    st.first = Some(ctx.cluster.key_at(row));
    false
}

fn act_callback(st: &mut AggregateState<'_>, ctx: &EvalCtx<'_>, row: usize) -> bool {
    st.matches += 1;
    let key = ctx.cluster.key_at(row);
    match st.callback.as_mut() {
        Some(cb) => cb(key),
        None => true,
    }
}

fn act_sum_int(st: &mut AggregateState<'_>, ctx: &EvalCtx<'_>, row: usize) -> bool {
    st.matches += 1;
    let col = st.col.expect("sum requires a column");
    if let Some(v) = i64::read(ctx.cluster.column(col.index()), row) {
        st.sum_int = st.sum_int.wrapping_add(v);
        st.nonnull += 1;
    }
    true
}

fn act_sum_float(st: &mut AggregateState<'_>, ctx: &EvalCtx<'_>, row: usize) -> bool {
    st.matches += 1;
    let col = st.col.expect("sum requires a column");
    if let Some(v) = f32::read(ctx.cluster.column(col.index()), row) {
        st.sum_double += f64::from(v);
        st.nonnull += 1;
    }
    true
}

fn act_sum_double(st: &mut AggregateState<'_>, ctx: &EvalCtx<'_>, row: usize) -> bool {
    st.matches += 1;
    let col = st.col.expect("sum requires a column");
    if let Some(v) = f64::read(ctx.cluster.column(col.index()), row) {
        st.sum_double += v;
        st.nonnull += 1;
    }
    true
}

fn act_min<T: ScalarValue>(st: &mut AggregateState<'_>, ctx: &EvalCtx<'_>, row: usize) -> bool {
    st.matches += 1;
    let col = st.col.expect("min requires a column");
    if let Some(v) = T::read(ctx.cluster.column(col.index()), row) {
        let v = v.into_value();
        st.nonnull += 1;
        if st.min_value.is_null() || v.total_cmp(&st.min_value) == std::cmp::Ordering::Less {
            st.min_value = v;
        }
    }
    true
}

fn act_max<T: ScalarValue>(st: &mut AggregateState<'_>, ctx: &EvalCtx<'_>, row: usize) -> bool {
    st.matches += 1;
    let col = st.col.expect("max requires a column");
    if let Some(v) = T::read(ctx.cluster.column(col.index()), row) {
        let v = v.into_value();
        st.nonnull += 1;
        if st.max_value.is_null() || v.total_cmp(&st.max_value) == std::cmp::Ordering::Greater {
            st.max_value = v;
        }
    }
    true
}
