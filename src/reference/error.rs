use std::fmt;

/// Error type for reference dispatch.
///
/// These indicate caller or schema bugs, not runtime conditions: they are
/// raised synchronously and are not retried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReferenceError {
    /// The operation cannot dispatch on this reference kind.
    Unsupported {
        operation: &'static str,
        kind: &'static str,
    },
    /// The supplied value's shape does not match the reference kind.
    ValueMismatch {
        expected: &'static str,
        kind: &'static str,
    },
    /// A partitioned reference nested inside another partitioned reference.
    NestedPartition,
}

impl fmt::Display for ReferenceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReferenceError::Unsupported { operation, kind } => {
                write!(f, "unsupported reference kind {} for {}", kind, operation)
            }
            ReferenceError::ValueMismatch { expected, kind } => write!(
                f,
                "value for {} reference must be {}",
                kind, expected
            ),
            ReferenceError::NestedPartition => {
                write!(f, "partitioned reference cannot nest another partition")
            }
        }
    }
}

impl std::error::Error for ReferenceError {}
