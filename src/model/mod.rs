//! Workspace data model - immutable collections and snapshots.
//!
//! The model is built from two pure value types:
//!
//! - [`NamedCollection`] - a keyed bag of instances of one entity type.
//!   Instances are opaque `serde_json::Value` payloads; keys are extracted
//!   by the caller's policy and stay stable for an instance's identity.
//! - [`WorkspaceSnapshot`] - the whole-state value at one point in time,
//!   a mapping from collection name to collection.
//!
//! Both are never mutated in place: every write produces a new value while
//! the old one stays valid for any reader still holding it. Collections and
//! instance payloads are held behind `Arc`, so a write clones only the
//! containers it actually touches and shares everything else with the
//! previous snapshot.
//!
//! ## Example
//!
//! ```
//! use workspace_sync::{NamedCollection, WorkspaceSnapshot};
//! use serde_json::json;
//!
//! let orders = NamedCollection::new()
//!     .upsert(vec![json!({"id": "o-1", "qty": 10})], |v| {
//!         v["id"].as_str().unwrap_or_default().to_string()
//!     });
//!
//! let snapshot = WorkspaceSnapshot::new().with_collection("orders", orders);
//! assert_eq!(snapshot.collection("orders").len(), 1);
//! // Absent collections read as empty, never as an error.
//! assert!(snapshot.collection("fills").is_empty());
//! ```

mod collection;
mod snapshot;

use std::fmt;

/// Error type for model conversions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelError {
    /// Typed decode of an instance payload failed.
    Deserialize(String),
    /// A wire value did not have the expected shape (e.g. not a JSON object).
    Shape(String),
}

impl fmt::Display for ModelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelError::Deserialize(msg) => write!(f, "failed to decode instance: {}", msg),
            ModelError::Shape(msg) => write!(f, "unexpected value shape: {}", msg),
        }
    }
}

impl std::error::Error for ModelError {}

pub use collection::NamedCollection;
pub use snapshot::WorkspaceSnapshot;
