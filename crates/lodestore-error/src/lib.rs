//! Error taxonomy for lodestore.
//!
//! Only data-dependent, recoverable failures are represented here. Contract
//! violations against a known schema (requesting a typed accessor for a
//! column of a different type, indexing a list out of bounds, evaluating an
//! unreachable column-type combination) are bugs in the caller and panic
//! instead of returning an error.

use thiserror::Error;

/// Primary error type for lodestore operations.
///
/// Every variant is distinguishable by kind so that bindings layers can map
/// them to language-idiomatic error types.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// A list accessor was constructed against a non-list column.
    #[error("property is not a list")]
    ListTypeMismatch,

    /// A null value was written to a column without the nullable attribute.
    #[error("column is not nullable")]
    ColumnNotNullable,

    /// A string value exceeds the storage size ceiling.
    #[error("string too big: {size} bytes exceeds limit of {max}")]
    StringTooBig { size: usize, max: usize },

    /// A binary value exceeds the storage size ceiling.
    #[error("binary too big: {size} bytes exceeds limit of {max}")]
    BinaryTooBig { size: usize, max: usize },

    /// A typed write targeted a column of a different declared type.
    #[error("illegal type for column")]
    IllegalType,

    /// The operation is not defined for the current state of the value,
    /// e.g. `add_int` on a nullable integer that is currently null.
    #[error("illegal combination: {0}")]
    IllegalCombination(&'static str),

    /// A link was set to a key that does not refer to a live object in the
    /// target table.
    #[error("target object {key} does not exist")]
    TargetRowMissing { key: i64 },

    /// The accessed object has been deleted.
    #[error("object not alive")]
    ObjectNotAlive,

    /// A non-optional getter was used on a column whose value is null.
    #[error("cannot return null value")]
    UnexpectedNull,

    /// An object key did not resolve to a row.
    #[error("invalid key {key}")]
    InvalidKey { key: i64 },

    /// The replication sink rejected an instruction.
    #[error("replication rejected instruction: {0}")]
    ReplicationFailed(String),
}

/// Convenient result alias used throughout the workspace.
pub type Result<T, E = StoreError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_messages() {
        assert_eq!(StoreError::ObjectNotAlive.to_string(), "object not alive");
        assert_eq!(
            StoreError::StringTooBig {
                size: 20,
                max: 10
            }
            .to_string(),
            "string too big: 20 bytes exceeds limit of 10"
        );
        assert_eq!(
            StoreError::TargetRowMissing { key: 7 }.to_string(),
            "target object 7 does not exist"
        );
    }

    #[test]
    fn errors_are_distinguishable() {
        let a = StoreError::ColumnNotNullable;
        let b = StoreError::ListTypeMismatch;
        assert_ne!(a, b);
        assert_eq!(a, StoreError::ColumnNotNullable);
    }
}
