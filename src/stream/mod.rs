//! Synchronization streams - the serialized, versioned change engine.
//!
//! A [`SyncStream`] is the single authoritative holder of one snapshot's
//! evolution. Any number of producers submit pure mutation functions; one
//! dedicated consumer thread applies them strictly in admission order,
//! bumps the version by exactly one per accepted write, computes the patch
//! against the previous published value, and fans the resulting
//! [`ChangeItem`] out to subscribers.
//!
//! ## Architecture
//!
//! ```text
//! producers                 mutation loop (one thread)        subscribers
//! ─────────                 ──────────────────────────        ───────────
//! update(f) ──┐
//! update(g) ──┼─► mailbox ─► apply / version / diff ─► fan-out ─► channel per
//! update(h) ──┘   (FIFO)         one at a time                    subscriber
//! ```
//!
//! Because the current snapshot is touched only by the loop, and snapshots
//! are immutable values, readers of already-published snapshots never take
//! a lock that a writer holds for the duration of a mutation.
//!
//! ## Example
//!
//! ```
//! use workspace_sync::{StreamConfig, SyncStream, WorkspaceSnapshot};
//! use serde_json::json;
//!
//! let stream = SyncStream::new(WorkspaceSnapshot::new(), StreamConfig::default());
//! let subscription = stream.subscribe().unwrap();
//!
//! // a new subscriber immediately receives the current item (version 0)
//! assert_eq!(subscription.recv().unwrap().version, 0);
//!
//! let version = stream
//!     .update_wait(|snapshot| {
//!         let todos = snapshot.collection("todos").insert("t-1", json!({"done": false}));
//!         snapshot.with_collection("todos", todos)
//!     })
//!     .unwrap();
//! assert_eq!(version, 1);
//! assert_eq!(subscription.recv().unwrap().version, 1);
//!
//! stream.dispose();
//! assert!(subscription.recv().is_none()); // completed, not an error
//! ```

mod change;
mod config;
mod error;
mod stream;

pub use change::ChangeItem;
pub use config::{OverflowPolicy, QueuePolicy, StreamConfig};
pub use error::StreamError;
pub use stream::{Subscription, SyncStream, UpdateReceipt};
