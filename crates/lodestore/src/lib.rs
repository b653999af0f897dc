//! lodestore: an embedded persistent object store.
//!
//! Typed, schema-defined objects with links and backlinks are mapped onto
//! a compact cluster-based columnar representation, with a query engine
//! supporting predicate evaluation, sorting, aggregation and traversal
//! across links (including reverse traversal via backlinks).
//!
//! The crate is a facade over the workspace members:
//! - `lodestore-types`: keys, column types and the [`Value`] union,
//! - `lodestore-error`: the [`StoreError`] taxonomy,
//! - `lodestore-store`: storage plus the [`Obj`]/[`List`]/[`LinkList`]
//!   accessors,
//! - `lodestore-query`: the [`Query`] engine.

pub use lodestore_error::{Result, StoreError};
pub use lodestore_types::{
    ColKey, ColumnType, LinkStrength, ObjKey, TableKey, Timestamp, Value,
};

pub use lodestore_store::{
    CascadeState, Group, InstructionLog, Instruction, LinkList, List, Obj, Replication,
    ScalarValue, Table, MAX_BINARY_SIZE, MAX_STRING_SIZE, UNBOUNDED_LINK_DEPTH,
};

pub use lodestore_query::{
    or_node, AggrKind, AggregateOp, CmpOp, Compare, ExpressionNode, LinkPath, LinksToNode,
    NotNode, NullNode, Operand, OrNode, Query, QueryNode, ScalarNode, StringNode, StringOp,
};
