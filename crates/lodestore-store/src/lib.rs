//! Storage and accessor layer of the lodestore object store.
//!
//! A [`Group`] owns tables; a table owns clusters of rows with one typed
//! column storage per column. On top of that sit the accessor handles:
//! [`Obj`] for objects, [`List`]/[`LinkList`] for list-valued properties.
//! Accessors are cheap handles carrying lazily revalidated positions, so
//! they stay usable across unrelated mutations.

pub mod cascade;
pub mod cluster;
pub mod column;
pub mod group;
pub mod index;
pub mod json;
pub mod list;
pub mod obj;
pub mod replication;
pub mod table;

pub use cascade::CascadeState;
pub use cluster::Cluster;
pub use column::{ColumnData, ListData, ScalarValue, MAX_BINARY_SIZE, MAX_STRING_SIZE};
pub use group::{Group, GroupData};
pub use index::SearchIndex;
pub use json::UNBOUNDED_LINK_DEPTH;
pub use list::{LinkList, List};
pub use obj::Obj;
pub use replication::{Instruction, InstructionLog, Replication};
pub use table::{ColumnSpec, LinkInfo, Table, TableData};
