use std::fmt;

/// Error type for stream operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamError {
    /// The stream has been disposed; no further writes or subscriptions
    /// are accepted. Subscribers see normal completion, not this error.
    Disposed,
    /// A bounded mailbox was full and the overflow policy is `Reject`.
    QueueFull,
    /// Waiting on a receipt timed out. The write may still commit -
    /// treat this as an unknown outcome, not a failure.
    Timeout,
    /// An admission lock was poisoned by a panicking thread.
    LockPoisoned(&'static str),
}

impl fmt::Display for StreamError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamError::Disposed => write!(f, "stream is disposed"),
            StreamError::QueueFull => write!(f, "mutation mailbox is full"),
            StreamError::Timeout => write!(f, "timed out waiting for commit (outcome unknown)"),
            StreamError::LockPoisoned(what) => write!(f, "stream lock poisoned during {}", what),
        }
    }
}

impl std::error::Error for StreamError {}
