/// What to do when a bounded mailbox is full at admission time.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OverflowPolicy {
    /// Suspend the producer until a slot frees up.
    #[default]
    Block,
    /// Fail the call immediately with `StreamError::QueueFull`.
    Reject,
}

/// Admission-queue policy for a stream's mutation mailbox.
///
/// The unbounded/bounded trade-off is an explicit configuration, not a
/// hidden default: `Unbounded` never suspends a producer but risks
/// unbounded memory growth under sustained overload; `Bounded` applies
/// backpressure per its [`OverflowPolicy`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum QueuePolicy {
    Unbounded,
    Bounded {
        capacity: usize,
        on_full: OverflowPolicy,
    },
}

impl Default for QueuePolicy {
    fn default() -> Self {
        QueuePolicy::Unbounded
    }
}

/// Configuration for a [`SyncStream`](super::SyncStream).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StreamConfig {
    pub queue: QueuePolicy,
}

impl StreamConfig {
    /// A bounded mailbox that suspends producers when full.
    pub fn bounded(capacity: usize) -> Self {
        StreamConfig {
            queue: QueuePolicy::Bounded {
                capacity,
                on_full: OverflowPolicy::Block,
            },
        }
    }

    /// A bounded mailbox that rejects admissions when full.
    pub fn bounded_reject(capacity: usize) -> Self {
        StreamConfig {
            queue: QueuePolicy::Bounded {
                capacity,
                on_full: OverflowPolicy::Reject,
            },
        }
    }
}
