//! Replication sink: a write-ahead intent log of logical mutations.
//!
//! Every logical mutation performed through the accessor layer is forwarded
//! to the sink as one typed call. The store does not interpret any state of
//! the sink; a sink either records the instruction or returns an error,
//! which aborts the remaining steps of the mutation and propagates to the
//! caller.

use lodestore_error::Result;
use lodestore_types::{ColKey, ObjKey, TableKey, Value};

pub trait Replication {
    fn insert_object(&mut self, table: TableKey, key: ObjKey) -> Result<()>;
    fn remove_object(&mut self, table: TableKey, key: ObjKey) -> Result<()>;

    /// Scalar or link write. `is_default` distinguishes "user set this"
    /// from "schema default materialized".
    fn set_value(
        &mut self,
        table: TableKey,
        col: ColKey,
        key: ObjKey,
        value: Value,
        is_default: bool,
    ) -> Result<()>;

    fn add_int(&mut self, table: TableKey, col: ColKey, key: ObjKey, delta: i64) -> Result<()>;

    /// A forward link was nulled out because its target is being deleted.
    fn nullify_link(&mut self, table: TableKey, col: ColKey, key: ObjKey) -> Result<()>;

    fn list_insert(
        &mut self,
        table: TableKey,
        col: ColKey,
        key: ObjKey,
        ndx: usize,
        value: Value,
    ) -> Result<()>;

    fn list_set(
        &mut self,
        table: TableKey,
        col: ColKey,
        key: ObjKey,
        ndx: usize,
        value: Value,
    ) -> Result<()>;

    fn list_erase(&mut self, table: TableKey, col: ColKey, key: ObjKey, ndx: usize) -> Result<()>;

    fn list_move(
        &mut self,
        table: TableKey,
        col: ColKey,
        key: ObjKey,
        from: usize,
        to: usize,
    ) -> Result<()>;

    fn list_swap(
        &mut self,
        table: TableKey,
        col: ColKey,
        key: ObjKey,
        a: usize,
        b: usize,
    ) -> Result<()>;

    fn list_clear(&mut self, table: TableKey, col: ColKey, key: ObjKey) -> Result<()>;

    /// A link-list element was dropped because its target is being deleted.
    fn link_list_nullify(
        &mut self,
        table: TableKey,
        col: ColKey,
        key: ObjKey,
        ndx: usize,
    ) -> Result<()>;
}

/// One recorded logical mutation.
#[derive(Debug, Clone, PartialEq)]
pub enum Instruction {
    InsertObject {
        table: TableKey,
        key: ObjKey,
    },
    RemoveObject {
        table: TableKey,
        key: ObjKey,
    },
    Set {
        table: TableKey,
        col: ColKey,
        key: ObjKey,
        value: Value,
        is_default: bool,
    },
    AddInt {
        table: TableKey,
        col: ColKey,
        key: ObjKey,
        delta: i64,
    },
    NullifyLink {
        table: TableKey,
        col: ColKey,
        key: ObjKey,
    },
    ListInsert {
        table: TableKey,
        col: ColKey,
        key: ObjKey,
        ndx: usize,
        value: Value,
    },
    ListSet {
        table: TableKey,
        col: ColKey,
        key: ObjKey,
        ndx: usize,
        value: Value,
    },
    ListErase {
        table: TableKey,
        col: ColKey,
        key: ObjKey,
        ndx: usize,
    },
    ListMove {
        table: TableKey,
        col: ColKey,
        key: ObjKey,
        from: usize,
        to: usize,
    },
    ListSwap {
        table: TableKey,
        col: ColKey,
        key: ObjKey,
        a: usize,
        b: usize,
    },
    ListClear {
        table: TableKey,
        col: ColKey,
        key: ObjKey,
    },
    LinkListNullify {
        table: TableKey,
        col: ColKey,
        key: ObjKey,
        ndx: usize,
    },
}

/// A sink that records every instruction in order. Used by tests to assert
/// on the mutation stream.
#[derive(Debug, Default)]
pub struct InstructionLog {
    instructions: Vec<Instruction>,
}

impl InstructionLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    pub fn clear(&mut self) {
        self.instructions.clear();
    }
}

impl Replication for InstructionLog {
    fn insert_object(&mut self, table: TableKey, key: ObjKey) -> Result<()> {
        self.instructions.push(Instruction::InsertObject { table, key });
        Ok(())
    }

    fn remove_object(&mut self, table: TableKey, key: ObjKey) -> Result<()> {
        self.instructions.push(Instruction::RemoveObject { table, key });
        Ok(())
    }

    fn set_value(
        &mut self,
        table: TableKey,
        col: ColKey,
        key: ObjKey,
        value: Value,
        is_default: bool,
    ) -> Result<()> {
        self.instructions.push(Instruction::Set {
            table,
            col,
            key,
            value,
            is_default,
        });
        Ok(())
    }

    fn add_int(&mut self, table: TableKey, col: ColKey, key: ObjKey, delta: i64) -> Result<()> {
        self.instructions.push(Instruction::AddInt {
            table,
            col,
            key,
            delta,
        });
        Ok(())
    }

    fn nullify_link(&mut self, table: TableKey, col: ColKey, key: ObjKey) -> Result<()> {
        self.instructions
            .push(Instruction::NullifyLink { table, col, key });
        Ok(())
    }

    fn list_insert(
        &mut self,
        table: TableKey,
        col: ColKey,
        key: ObjKey,
        ndx: usize,
        value: Value,
    ) -> Result<()> {
        self.instructions.push(Instruction::ListInsert {
            table,
            col,
            key,
            ndx,
            value,
        });
        Ok(())
    }

    fn list_set(
        &mut self,
        table: TableKey,
        col: ColKey,
        key: ObjKey,
        ndx: usize,
        value: Value,
    ) -> Result<()> {
        self.instructions.push(Instruction::ListSet {
            table,
            col,
            key,
            ndx,
            value,
        });
        Ok(())
    }

    fn list_erase(&mut self, table: TableKey, col: ColKey, key: ObjKey, ndx: usize) -> Result<()> {
        self.instructions.push(Instruction::ListErase {
            table,
            col,
            key,
            ndx,
        });
        Ok(())
    }

    fn list_move(
        &mut self,
        table: TableKey,
        col: ColKey,
        key: ObjKey,
        from: usize,
        to: usize,
    ) -> Result<()> {
        self.instructions.push(Instruction::ListMove {
            table,
            col,
            key,
            from,
            to,
        });
        Ok(())
    }

    fn list_swap(
        &mut self,
        table: TableKey,
        col: ColKey,
        key: ObjKey,
        a: usize,
        b: usize,
    ) -> Result<()> {
        self.instructions.push(Instruction::ListSwap {
            table,
            col,
            key,
            a,
            b,
        });
        Ok(())
    }

    fn list_clear(&mut self, table: TableKey, col: ColKey, key: ObjKey) -> Result<()> {
        self.instructions
            .push(Instruction::ListClear { table, col, key });
        Ok(())
    }

    fn link_list_nullify(
        &mut self,
        table: TableKey,
        col: ColKey,
        key: ObjKey,
        ndx: usize,
    ) -> Result<()> {
        self.instructions.push(Instruction::LinkListNullify {
            table,
            col,
            key,
            ndx,
        });
        Ok(())
    }
}
