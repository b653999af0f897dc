use std::cmp::Ordering;
use std::fmt;

use crate::{ColumnType, ObjKey, Timestamp};

/// A type-erased, totally-ordered value.
///
/// Used by the generic accessor paths (`get_any`, JSON projection, list
/// aggregates) and by the query engine wherever heterogeneous columns meet.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum Value {
    Null,
    Int(i64),
    Bool(bool),
    Float(f32),
    Double(f64),
    String(String),
    Binary(Vec<u8>),
    Timestamp(Timestamp),
    Link(ObjKey),
}

impl Value {
    #[inline]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// The column type this value would be stored under, `None` for null.
    pub const fn column_type(&self) -> Option<ColumnType> {
        match self {
            Self::Null => None,
            Self::Int(_) => Some(ColumnType::Int),
            Self::Bool(_) => Some(ColumnType::Bool),
            Self::Float(_) => Some(ColumnType::Float),
            Self::Double(_) => Some(ColumnType::Double),
            Self::String(_) => Some(ColumnType::String),
            Self::Binary(_) => Some(ColumnType::Binary),
            Self::Timestamp(_) => Some(ColumnType::Timestamp),
            Self::Link(_) => Some(ColumnType::Link),
        }
    }

    pub const fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub const fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub const fn as_float(&self) -> Option<f32> {
        match self {
            Self::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub const fn as_double(&self) -> Option<f64> {
        match self {
            Self::Double(d) => Some(*d),
            _ => None,
        }
    }

    pub fn as_string(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_binary(&self) -> Option<&[u8]> {
        match self {
            Self::Binary(b) => Some(b),
            _ => None,
        }
    }

    pub const fn as_timestamp(&self) -> Option<Timestamp> {
        match self {
            Self::Timestamp(t) => Some(*t),
            _ => None,
        }
    }

    pub const fn as_link(&self) -> Option<ObjKey> {
        match self {
            Self::Link(k) => Some(*k),
            _ => None,
        }
    }

    /// Three-way comparison under the store's total order.
    ///
    /// Null ranks below every non-null value. Non-null values must share a
    /// declared type; comparing across types is a programming error and
    /// panics. Floating-point comparison deviates from IEEE 754 on purpose:
    /// NaN orders below all non-NaN values, and two NaNs compare by their
    /// raw bit patterns, so the order is reflexive, antisymmetric and
    /// transitive even over NaN payloads. Required for stable sorting.
    pub fn total_cmp(&self, other: &Self) -> Ordering {
        match self.try_cmp(other) {
            Some(ord) => ord,
            None => panic!(
                "cannot compare values of different types: {:?} vs {:?}",
                self.column_type(),
                other.column_type()
            ),
        }
    }

    /// Like [`Self::total_cmp`] but returns `None` for cross-type pairs
    /// instead of panicking. Null vs null is `Equal`; null orders below
    /// every non-null value of any type.
    pub fn try_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Self::Null, Self::Null) => Some(Ordering::Equal),
            (Self::Null, _) => Some(Ordering::Less),
            (_, Self::Null) => Some(Ordering::Greater),
            (Self::Int(a), Self::Int(b)) => Some(a.cmp(b)),
            (Self::Bool(a), Self::Bool(b)) => Some(a.cmp(b)),
            (Self::Float(a), Self::Float(b)) => Some(compare_f32(*a, *b)),
            (Self::Double(a), Self::Double(b)) => Some(compare_f64(*a, *b)),
            (Self::String(a), Self::String(b)) => Some(a.cmp(b)),
            (Self::Binary(a), Self::Binary(b)) => Some(a.cmp(b)),
            (Self::Timestamp(a), Self::Timestamp(b)) => Some(a.cmp(b)),
            (Self::Link(a), Self::Link(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }
}

/// Total order over `f32`, treating NaN specially.
///
/// Non-NaN pairs compare as IEEE floats. A NaN orders below every non-NaN
/// value; two NaNs compare by their raw bits as unsigned integers, so NaNs
/// with distinct payloads are distinct under this order.
pub fn compare_f32(a: f32, b: f32) -> Ordering {
    match (a.is_nan(), b.is_nan()) {
        (false, false) => {
            if a == b {
                Ordering::Equal
            } else if a < b {
                Ordering::Less
            } else {
                Ordering::Greater
            }
        }
        (true, true) => a.to_bits().cmp(&b.to_bits()),
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
    }
}

/// Total order over `f64`. See [`compare_f32`].
pub fn compare_f64(a: f64, b: f64) -> Ordering {
    match (a.is_nan(), b.is_nan()) {
        (false, false) => {
            if a == b {
                Ordering::Equal
            } else if a < b {
                Ordering::Less
            } else {
                Ordering::Greater
            }
        }
        (true, true) => a.to_bits().cmp(&b.to_bits()),
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("NULL"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Bool(b) => f.write_str(if *b { "true" } else { "false" }),
            Self::Float(v) => write!(f, "{v}"),
            Self::Double(v) => write!(f, "{v}"),
            Self::String(s) => write!(f, "\"{s}\""),
            Self::Binary(b) => {
                f.write_str("B'")?;
                for byte in b {
                    write!(f, "{byte:02X}")?;
                }
                f.write_str("'")
            }
            Self::Timestamp(t) => write!(f, "{t}"),
            Self::Link(k) => write!(f, "O{k}"),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Self::Float(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Double(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::String(v.to_owned())
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Self::Binary(v)
    }
}

impl From<Timestamp> for Value {
    fn from(v: Timestamp) -> Self {
        Self::Timestamp(v)
    }
}

impl From<ObjKey> for Value {
    fn from(v: ObjKey) -> Self {
        Self::Link(v)
    }
}

impl<T: Into<Self>> From<Option<T>> for Value {
    fn from(opt: Option<T>) -> Self {
        match opt {
            Some(v) => v.into(),
            None => Self::Null,
        }
    }
}

#[cfg(test)]
#[allow(clippy::float_cmp)]
mod tests {
    use super::*;

    #[test]
    fn null_orders_below_everything() {
        let null = Value::Null;
        for v in [
            Value::Int(i64::MIN),
            Value::Bool(false),
            Value::Float(f32::NEG_INFINITY),
            Value::Double(f64::NAN),
            Value::String(String::new()),
            Value::Binary(vec![]),
            Value::Timestamp(Timestamp::new(i64::MIN, 0)),
            Value::Link(ObjKey::new(i64::MIN)),
        ] {
            assert_eq!(null.total_cmp(&v), Ordering::Less);
            assert_eq!(v.total_cmp(&null), Ordering::Greater);
        }
        assert_eq!(null.total_cmp(&Value::Null), Ordering::Equal);
    }

    #[test]
    fn spec_null_vs_int() {
        assert_eq!(Value::Null.total_cmp(&Value::Int(5)), Ordering::Less);
        assert_eq!(Value::Int(5).total_cmp(&Value::Null), Ordering::Greater);
    }

    #[test]
    fn nan_orders_below_non_nan() {
        let nan = Value::Double(f64::NAN);
        let neg_inf = Value::Double(f64::NEG_INFINITY);
        assert_eq!(nan.total_cmp(&neg_inf), Ordering::Less);
        assert_eq!(neg_inf.total_cmp(&nan), Ordering::Greater);
    }

    #[test]
    fn nan_payloads_compare_by_bits() {
        let a = f64::from_bits(0x7ff8_0000_0000_0001);
        let b = f64::from_bits(0x7ff8_0000_0000_0002);
        assert!(a.is_nan() && b.is_nan());
        assert_eq!(compare_f64(a, a), Ordering::Equal);
        assert_eq!(compare_f64(a, b), Ordering::Less);
        assert_eq!(compare_f64(b, a), Ordering::Greater);
    }

    #[test]
    fn comparison_is_antisymmetric_and_transitive() {
        let vals = [
            Value::Double(f64::NAN),
            Value::Double(-1.0),
            Value::Double(0.0),
            Value::Double(f64::from_bits(0x7ff8_0000_0000_0009)),
            Value::Double(f64::INFINITY),
            Value::Null,
        ];
        for a in &vals {
            for b in &vals {
                assert_eq!(a.total_cmp(b), b.total_cmp(a).reverse());
                for c in &vals {
                    if a.total_cmp(b) == Ordering::Less && b.total_cmp(c) == Ordering::Less {
                        assert_eq!(a.total_cmp(c), Ordering::Less);
                    }
                }
            }
        }
    }

    #[test]
    #[should_panic(expected = "cannot compare values of different types")]
    fn cross_type_comparison_panics() {
        let _ = Value::Int(1).total_cmp(&Value::String("1".into()));
    }

    #[test]
    fn try_cmp_cross_type_is_none() {
        assert!(Value::Int(1).try_cmp(&Value::Double(1.0)).is_none());
        assert_eq!(
            Value::Int(1).try_cmp(&Value::Int(1)),
            Some(Ordering::Equal)
        );
    }

    #[test]
    fn display_forms() {
        assert_eq!(Value::Null.to_string(), "NULL");
        assert_eq!(Value::Int(-3).to_string(), "-3");
        assert_eq!(Value::String("hi".into()).to_string(), "\"hi\"");
        assert_eq!(Value::Binary(vec![0xCA, 0xFE]).to_string(), "B'CAFE'");
        assert_eq!(Value::Bool(true).to_string(), "true");
    }

    #[test]
    fn from_conversions() {
        assert_eq!(Value::from(7i64).as_int(), Some(7));
        assert_eq!(Value::from("x").as_string(), Some("x"));
        assert!(Value::from(None::<i64>).is_null());
        assert_eq!(Value::from(Some(2i64)).as_int(), Some(2));
    }
}
