//! Cascading-delete work list.
//!
//! Deletion sets are accumulated here before any deletion executes, then
//! drained in a second pass. The explicit queue keeps the recursion depth
//! bounded and makes the "compute the full deletion set first" atomicity
//! property directly observable.

use lodestore_types::{ObjKey, TableKey};

#[derive(Debug, Default)]
pub struct CascadeState {
    pub(crate) to_be_deleted: Vec<(TableKey, ObjKey)>,
}

impl CascadeState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue an object for recursive deletion, ignoring duplicates.
    pub(crate) fn enqueue(&mut self, table: TableKey, key: ObjKey) {
        if !self.to_be_deleted.contains(&(table, key)) {
            self.to_be_deleted.push((table, key));
        }
    }

    pub fn is_empty(&self) -> bool {
        self.to_be_deleted.is_empty()
    }

    pub fn len(&self) -> usize {
        self.to_be_deleted.len()
    }
}
