//! Typed column storage.
//!
//! The original design point here is a closed tagged union with one variant
//! per element type, dispatched through the [`ScalarValue`] trait. The
//! dispatch is resolved once per accessor construction (the trait impl is
//! chosen by the caller's type parameter), not per call.
//!
//! Scalar slots are stored as `Option<T>`; columns without the nullable
//! attribute never contain `None`; that invariant is enforced by the write
//! paths, not by the storage representation.

use std::cmp::Ordering;

use lodestore_error::{Result, StoreError};
use lodestore_types::{ColumnType, ObjKey, Timestamp, Value};

/// Storage size ceiling for string values.
pub const MAX_STRING_SIZE: usize = (1 << 24) - 1;
/// Storage size ceiling for binary values.
pub const MAX_BINARY_SIZE: usize = (1 << 24) - 1;

/// Per-cluster storage for one column.
#[derive(Debug, Clone)]
pub enum ColumnData {
    Int(Vec<Option<i64>>),
    Bool(Vec<Option<bool>>),
    Float(Vec<Option<f32>>),
    Double(Vec<Option<f64>>),
    String(Vec<Option<String>>),
    Binary(Vec<Option<Vec<u8>>>),
    Timestamp(Vec<Option<Timestamp>>),
    Link(Vec<Option<ObjKey>>),
    Backlink(Vec<Vec<ObjKey>>),
    List(Vec<ListData>),
}

impl ColumnData {
    /// Create empty storage for a column of the given type. `elem` is the
    /// element type for list columns and ignored otherwise.
    pub(crate) fn new_for(ty: ColumnType, is_list: bool, elem: ColumnType) -> Self {
        if is_list {
            let _ = elem;
            return Self::List(Vec::new());
        }
        match ty {
            ColumnType::Int => Self::Int(Vec::new()),
            ColumnType::Bool => Self::Bool(Vec::new()),
            ColumnType::Float => Self::Float(Vec::new()),
            ColumnType::Double => Self::Double(Vec::new()),
            ColumnType::String => Self::String(Vec::new()),
            ColumnType::Binary => Self::Binary(Vec::new()),
            ColumnType::Timestamp => Self::Timestamp(Vec::new()),
            ColumnType::Link => Self::Link(Vec::new()),
            ColumnType::Backlink => Self::Backlink(Vec::new()),
            ColumnType::LinkList => Self::List(Vec::new()),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::Int(v) => v.len(),
            Self::Bool(v) => v.len(),
            Self::Float(v) => v.len(),
            Self::Double(v) => v.len(),
            Self::String(v) => v.len(),
            Self::Binary(v) => v.len(),
            Self::Timestamp(v) => v.len(),
            Self::Link(v) => v.len(),
            Self::Backlink(v) => v.len(),
            Self::List(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Append the default slot for a newly inserted row.
    ///
    /// Non-nullable scalars get the type's zero value, nullable slots start
    /// as null, links start unset, lists start empty.
    pub(crate) fn push_default(&mut self, nullable: bool, elem: ColumnType) {
        match self {
            Self::Int(v) => v.push(if nullable { None } else { Some(0) }),
            Self::Bool(v) => v.push(if nullable { None } else { Some(false) }),
            Self::Float(v) => v.push(if nullable { None } else { Some(0.0) }),
            Self::Double(v) => v.push(if nullable { None } else { Some(0.0) }),
            Self::String(v) => v.push(if nullable { None } else { Some(String::new()) }),
            Self::Binary(v) => v.push(if nullable { None } else { Some(Vec::new()) }),
            Self::Timestamp(v) => v.push(if nullable { None } else { Some(Timestamp::default()) }),
            Self::Link(v) => v.push(None),
            Self::Backlink(v) => v.push(Vec::new()),
            Self::List(v) => v.push(ListData::new(elem)),
        }
    }

    /// Remove the slot for an erased row.
    pub(crate) fn remove_row(&mut self, row: usize) {
        match self {
            Self::Int(v) => {
                v.remove(row);
            }
            Self::Bool(v) => {
                v.remove(row);
            }
            Self::Float(v) => {
                v.remove(row);
            }
            Self::Double(v) => {
                v.remove(row);
            }
            Self::String(v) => {
                v.remove(row);
            }
            Self::Binary(v) => {
                v.remove(row);
            }
            Self::Timestamp(v) => {
                v.remove(row);
            }
            Self::Link(v) => {
                v.remove(row);
            }
            Self::Backlink(v) => {
                v.remove(row);
            }
            Self::List(v) => {
                v.remove(row);
            }
        }
    }

    /// Type-erased read of a scalar or link slot.
    ///
    /// Backlink and list columns have no single-value representation and
    /// panic here; use [`Self::backlinks_at`] / [`Self::list_at`].
    pub fn value_at(&self, row: usize) -> Value {
        match self {
            Self::Int(v) => v[row].map_or(Value::Null, Value::Int),
            Self::Bool(v) => v[row].map_or(Value::Null, Value::Bool),
            Self::Float(v) => v[row].map_or(Value::Null, Value::Float),
            Self::Double(v) => v[row].map_or(Value::Null, Value::Double),
            Self::String(v) => v[row].clone().map_or(Value::Null, Value::String),
            Self::Binary(v) => v[row].clone().map_or(Value::Null, Value::Binary),
            Self::Timestamp(v) => v[row].map_or(Value::Null, Value::Timestamp),
            Self::Link(v) => v[row].map_or(Value::Null, Value::Link),
            Self::Backlink(_) | Self::List(_) => {
                panic!("value_at is not defined for backlink or list columns")
            }
        }
    }

    pub fn is_null(&self, row: usize) -> bool {
        match self {
            Self::Int(v) => v[row].is_none(),
            Self::Bool(v) => v[row].is_none(),
            Self::Float(v) => v[row].is_none(),
            Self::Double(v) => v[row].is_none(),
            Self::String(v) => v[row].is_none(),
            Self::Binary(v) => v[row].is_none(),
            Self::Timestamp(v) => v[row].is_none(),
            Self::Link(v) => v[row].is_none(),
            Self::Backlink(_) | Self::List(_) => false,
        }
    }

    /// Null out a scalar or link slot.
    pub(crate) fn set_null_at(&mut self, row: usize) {
        match self {
            Self::Int(v) => v[row] = None,
            Self::Bool(v) => v[row] = None,
            Self::Float(v) => v[row] = None,
            Self::Double(v) => v[row] = None,
            Self::String(v) => v[row] = None,
            Self::Binary(v) => v[row] = None,
            Self::Timestamp(v) => v[row] = None,
            Self::Link(v) => v[row] = None,
            Self::Backlink(_) | Self::List(_) => {
                panic!("set_null_at is not defined for backlink or list columns")
            }
        }
    }

    /// The backlink multiset for a row of a backlink column.
    pub fn backlinks_at(&self, row: usize) -> &[ObjKey] {
        match self {
            Self::Backlink(v) => &v[row],
            _ => panic!("not a backlink column"),
        }
    }

    pub(crate) fn backlinks_at_mut(&mut self, row: usize) -> &mut Vec<ObjKey> {
        match self {
            Self::Backlink(v) => &mut v[row],
            _ => panic!("not a backlink column"),
        }
    }

    /// The list payload for a row of a list column.
    pub fn list_at(&self, row: usize) -> &ListData {
        match self {
            Self::List(v) => &v[row],
            _ => panic!("not a list column"),
        }
    }

    pub(crate) fn list_at_mut(&mut self, row: usize) -> &mut ListData {
        match self {
            Self::List(v) => &mut v[row],
            _ => panic!("not a list column"),
        }
    }

    /// The link slot for a row of a single-link column.
    pub fn link_at(&self, row: usize) -> Option<ObjKey> {
        match self {
            Self::Link(v) => v[row],
            _ => panic!("not a link column"),
        }
    }

    pub(crate) fn set_link_at(&mut self, row: usize, key: Option<ObjKey>) {
        match self {
            Self::Link(v) => v[row] = key,
            _ => panic!("not a link column"),
        }
    }
}

/// Per-row storage of a list column, typed by element.
///
/// Link lists hold no nulls: absence of a target means removal, never a
/// null element.
#[derive(Debug, Clone)]
pub enum ListData {
    Int(Vec<Option<i64>>),
    Bool(Vec<Option<bool>>),
    Float(Vec<Option<f32>>),
    Double(Vec<Option<f64>>),
    String(Vec<Option<String>>),
    Binary(Vec<Option<Vec<u8>>>),
    Timestamp(Vec<Option<Timestamp>>),
    Link(Vec<ObjKey>),
}

impl ListData {
    pub(crate) fn new(elem: ColumnType) -> Self {
        match elem {
            ColumnType::Int => Self::Int(Vec::new()),
            ColumnType::Bool => Self::Bool(Vec::new()),
            ColumnType::Float => Self::Float(Vec::new()),
            ColumnType::Double => Self::Double(Vec::new()),
            ColumnType::String => Self::String(Vec::new()),
            ColumnType::Binary => Self::Binary(Vec::new()),
            ColumnType::Timestamp => Self::Timestamp(Vec::new()),
            ColumnType::Link | ColumnType::LinkList => Self::Link(Vec::new()),
            ColumnType::Backlink => panic!("backlink is not a list element type"),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::Int(v) => v.len(),
            Self::Bool(v) => v.len(),
            Self::Float(v) => v.len(),
            Self::Double(v) => v.len(),
            Self::String(v) => v.len(),
            Self::Binary(v) => v.len(),
            Self::Timestamp(v) => v.len(),
            Self::Link(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Type-erased element read.
    pub fn value_at(&self, ndx: usize) -> Value {
        match self {
            Self::Int(v) => v[ndx].map_or(Value::Null, Value::Int),
            Self::Bool(v) => v[ndx].map_or(Value::Null, Value::Bool),
            Self::Float(v) => v[ndx].map_or(Value::Null, Value::Float),
            Self::Double(v) => v[ndx].map_or(Value::Null, Value::Double),
            Self::String(v) => v[ndx].clone().map_or(Value::Null, Value::String),
            Self::Binary(v) => v[ndx].clone().map_or(Value::Null, Value::Binary),
            Self::Timestamp(v) => v[ndx].map_or(Value::Null, Value::Timestamp),
            Self::Link(v) => Value::Link(v[ndx]),
        }
    }

    /// Element keys of a link list.
    pub fn links(&self) -> &[ObjKey] {
        match self {
            Self::Link(v) => v,
            _ => panic!("not a link list"),
        }
    }

    pub(crate) fn links_mut(&mut self) -> &mut Vec<ObjKey> {
        match self {
            Self::Link(v) => v,
            _ => panic!("not a link list"),
        }
    }

    pub(crate) fn remove(&mut self, ndx: usize) {
        match self {
            Self::Int(v) => {
                v.remove(ndx);
            }
            Self::Bool(v) => {
                v.remove(ndx);
            }
            Self::Float(v) => {
                v.remove(ndx);
            }
            Self::Double(v) => {
                v.remove(ndx);
            }
            Self::String(v) => {
                v.remove(ndx);
            }
            Self::Binary(v) => {
                v.remove(ndx);
            }
            Self::Timestamp(v) => {
                v.remove(ndx);
            }
            Self::Link(v) => {
                v.remove(ndx);
            }
        }
    }

    pub(crate) fn move_item(&mut self, from: usize, to: usize) {
        fn mv<T>(v: &mut Vec<T>, from: usize, to: usize) {
            let item = v.remove(from);
            v.insert(to, item);
        }
        match self {
            Self::Int(v) => mv(v, from, to),
            Self::Bool(v) => mv(v, from, to),
            Self::Float(v) => mv(v, from, to),
            Self::Double(v) => mv(v, from, to),
            Self::String(v) => mv(v, from, to),
            Self::Binary(v) => mv(v, from, to),
            Self::Timestamp(v) => mv(v, from, to),
            Self::Link(v) => mv(v, from, to),
        }
    }

    pub(crate) fn swap_items(&mut self, a: usize, b: usize) {
        match self {
            Self::Int(v) => v.swap(a, b),
            Self::Bool(v) => v.swap(a, b),
            Self::Float(v) => v.swap(a, b),
            Self::Double(v) => v.swap(a, b),
            Self::String(v) => v.swap(a, b),
            Self::Binary(v) => v.swap(a, b),
            Self::Timestamp(v) => v.swap(a, b),
            Self::Link(v) => v.swap(a, b),
        }
    }

    pub(crate) fn clear(&mut self) {
        match self {
            Self::Int(v) => v.clear(),
            Self::Bool(v) => v.clear(),
            Self::Float(v) => v.clear(),
            Self::Double(v) => v.clear(),
            Self::String(v) => v.clear(),
            Self::Binary(v) => v.clear(),
            Self::Timestamp(v) => v.clear(),
            Self::Link(v) => v.clear(),
        }
    }
}

/// Element types that can live in a scalar column or list.
///
/// One impl per supported type; the impl carries the column-type tag, the
/// storage accessors and the element order. This replaces per-type template
/// specialization with a closed trait dispatch resolved at accessor
/// construction.
pub trait ScalarValue: Clone + PartialEq + Sized {
    const COLUMN_TYPE: ColumnType;

    fn read(col: &ColumnData, row: usize) -> Option<Self>;
    fn write(col: &mut ColumnData, row: usize, v: Option<Self>);
    fn list_read(list: &ListData, ndx: usize) -> Option<Self>;
    fn list_write(list: &mut ListData, ndx: usize, v: Option<Self>);
    fn list_insert(list: &mut ListData, ndx: usize, v: Option<Self>);
    fn into_value(self) -> Value;
    fn from_value(v: &Value) -> Option<Self>;
    fn scalar_cmp(a: &Self, b: &Self) -> Ordering;

    /// Storage-limit check, a no-op except for strings and binaries.
    fn check_range(&self) -> Result<()> {
        Ok(())
    }
}

macro_rules! impl_scalar {
    ($t:ty, $variant:ident, $col_ty:expr, |$a:ident, $b:ident| $cmp:expr) => {
        impl ScalarValue for $t {
            const COLUMN_TYPE: ColumnType = $col_ty;

            fn read(col: &ColumnData, row: usize) -> Option<Self> {
                match col {
                    ColumnData::$variant(v) => v[row].clone(),
                    _ => panic!("column storage does not hold {}", stringify!($t)),
                }
            }

            fn write(col: &mut ColumnData, row: usize, val: Option<Self>) {
                match col {
                    ColumnData::$variant(v) => v[row] = val,
                    _ => panic!("column storage does not hold {}", stringify!($t)),
                }
            }

            fn list_read(list: &ListData, ndx: usize) -> Option<Self> {
                match list {
                    ListData::$variant(v) => v[ndx].clone(),
                    _ => panic!("list storage does not hold {}", stringify!($t)),
                }
            }

            fn list_write(list: &mut ListData, ndx: usize, val: Option<Self>) {
                match list {
                    ListData::$variant(v) => v[ndx] = val,
                    _ => panic!("list storage does not hold {}", stringify!($t)),
                }
            }

            fn list_insert(list: &mut ListData, ndx: usize, val: Option<Self>) {
                match list {
                    ListData::$variant(v) => v.insert(ndx, val),
                    _ => panic!("list storage does not hold {}", stringify!($t)),
                }
            }

            fn into_value(self) -> Value {
                Value::$variant(self)
            }

            fn from_value(v: &Value) -> Option<Self> {
                match v {
                    Value::$variant(x) => Some(x.clone()),
                    _ => None,
                }
            }

            fn scalar_cmp($a: &Self, $b: &Self) -> Ordering {
                $cmp
            }
        }
    };
}

impl_scalar!(i64, Int, ColumnType::Int, |a, b| a.cmp(b));
impl_scalar!(bool, Bool, ColumnType::Bool, |a, b| a.cmp(b));
impl_scalar!(f32, Float, ColumnType::Float, |a, b| {
    lodestore_types::value::compare_f32(*a, *b)
});
impl_scalar!(f64, Double, ColumnType::Double, |a, b| {
    lodestore_types::value::compare_f64(*a, *b)
});
impl_scalar!(Timestamp, Timestamp, ColumnType::Timestamp, |a, b| a.cmp(b));

impl ScalarValue for String {
    const COLUMN_TYPE: ColumnType = ColumnType::String;

    fn read(col: &ColumnData, row: usize) -> Option<Self> {
        match col {
            ColumnData::String(v) => v[row].clone(),
            _ => panic!("column storage does not hold String"),
        }
    }

    fn write(col: &mut ColumnData, row: usize, val: Option<Self>) {
        match col {
            ColumnData::String(v) => v[row] = val,
            _ => panic!("column storage does not hold String"),
        }
    }

    fn list_read(list: &ListData, ndx: usize) -> Option<Self> {
        match list {
            ListData::String(v) => v[ndx].clone(),
            _ => panic!("list storage does not hold String"),
        }
    }

    fn list_write(list: &mut ListData, ndx: usize, val: Option<Self>) {
        match list {
            ListData::String(v) => v[ndx] = val,
            _ => panic!("list storage does not hold String"),
        }
    }

    fn list_insert(list: &mut ListData, ndx: usize, val: Option<Self>) {
        match list {
            ListData::String(v) => v.insert(ndx, val),
            _ => panic!("list storage does not hold String"),
        }
    }

    fn into_value(self) -> Value {
        Value::String(self)
    }

    fn from_value(v: &Value) -> Option<Self> {
        v.as_string().map(str::to_owned)
    }

    fn scalar_cmp(a: &Self, b: &Self) -> Ordering {
        a.cmp(b)
    }

    fn check_range(&self) -> Result<()> {
        if self.len() > MAX_STRING_SIZE {
            return Err(StoreError::StringTooBig {
                size: self.len(),
                max: MAX_STRING_SIZE,
            });
        }
        Ok(())
    }
}

impl ScalarValue for Vec<u8> {
    const COLUMN_TYPE: ColumnType = ColumnType::Binary;

    fn read(col: &ColumnData, row: usize) -> Option<Self> {
        match col {
            ColumnData::Binary(v) => v[row].clone(),
            _ => panic!("column storage does not hold binary"),
        }
    }

    fn write(col: &mut ColumnData, row: usize, val: Option<Self>) {
        match col {
            ColumnData::Binary(v) => v[row] = val,
            _ => panic!("column storage does not hold binary"),
        }
    }

    fn list_read(list: &ListData, ndx: usize) -> Option<Self> {
        match list {
            ListData::Binary(v) => v[ndx].clone(),
            _ => panic!("list storage does not hold binary"),
        }
    }

    fn list_write(list: &mut ListData, ndx: usize, val: Option<Self>) {
        match list {
            ListData::Binary(v) => v[ndx] = val,
            _ => panic!("list storage does not hold binary"),
        }
    }

    fn list_insert(list: &mut ListData, ndx: usize, val: Option<Self>) {
        match list {
            ListData::Binary(v) => v.insert(ndx, val),
            _ => panic!("list storage does not hold binary"),
        }
    }

    fn into_value(self) -> Value {
        Value::Binary(self)
    }

    fn from_value(v: &Value) -> Option<Self> {
        v.as_binary().map(<[u8]>::to_vec)
    }

    fn scalar_cmp(a: &Self, b: &Self) -> Ordering {
        a.cmp(b)
    }

    fn check_range(&self) -> Result<()> {
        if self.len() > MAX_BINARY_SIZE {
            return Err(StoreError::BinaryTooBig {
                size: self.len(),
                max: MAX_BINARY_SIZE,
            });
        }
        Ok(())
    }
}

impl ScalarValue for ObjKey {
    const COLUMN_TYPE: ColumnType = ColumnType::Link;

    fn read(col: &ColumnData, row: usize) -> Option<Self> {
        col.link_at(row)
    }

    fn write(col: &mut ColumnData, row: usize, val: Option<Self>) {
        col.set_link_at(row, val);
    }

    fn list_read(list: &ListData, ndx: usize) -> Option<Self> {
        Some(list.links()[ndx])
    }

    fn list_write(list: &mut ListData, ndx: usize, val: Option<Self>) {
        let key = val.expect("link lists hold no nulls");
        list.links_mut()[ndx] = key;
    }

    fn list_insert(list: &mut ListData, ndx: usize, val: Option<Self>) {
        let key = val.expect("link lists hold no nulls");
        list.links_mut().insert(ndx, key);
    }

    fn into_value(self) -> Value {
        Value::Link(self)
    }

    fn from_value(v: &Value) -> Option<Self> {
        v.as_link()
    }

    fn scalar_cmp(a: &Self, b: &Self) -> Ordering {
        a.cmp(b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_default_respects_nullability() {
        let mut col = ColumnData::new_for(ColumnType::Int, false, ColumnType::Int);
        col.push_default(false, ColumnType::Int);
        assert_eq!(col.value_at(0), Value::Int(0));

        let mut col = ColumnData::new_for(ColumnType::Int, false, ColumnType::Int);
        col.push_default(true, ColumnType::Int);
        assert!(col.is_null(0));
    }

    #[test]
    fn scalar_round_trip() {
        let mut col = ColumnData::new_for(ColumnType::String, false, ColumnType::String);
        col.push_default(false, ColumnType::String);
        String::write(&mut col, 0, Some("abc".to_owned()));
        assert_eq!(String::read(&col, 0).as_deref(), Some("abc"));
        assert_eq!(col.value_at(0), Value::String("abc".into()));
    }

    #[test]
    fn string_range_check() {
        let ok = "x".repeat(10);
        assert!(ok.check_range().is_ok());
        let big = "x".repeat(MAX_STRING_SIZE + 1);
        assert!(matches!(
            big.check_range(),
            Err(StoreError::StringTooBig { .. })
        ));
    }

    #[test]
    #[should_panic(expected = "link lists hold no nulls")]
    fn link_list_rejects_null_elements() {
        let mut list = ListData::new(ColumnType::Link);
        ObjKey::list_insert(&mut list, 0, None);
    }

    #[test]
    fn list_move_and_swap() {
        let mut list = ListData::new(ColumnType::Int);
        for i in 0..4 {
            i64::list_insert(&mut list, i as usize, Some(i));
        }
        list.move_item(0, 3);
        let vals: Vec<_> = (0..4).map(|i| i64::list_read(&list, i).unwrap()).collect();
        assert_eq!(vals, vec![1, 2, 3, 0]);
        list.swap_items(0, 1);
        let vals: Vec<_> = (0..4).map(|i| i64::list_read(&list, i).unwrap()).collect();
        assert_eq!(vals, vec![2, 1, 3, 0]);
    }
}
