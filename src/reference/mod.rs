//! State references - addressing values for reads and writes.
//!
//! A [`StateReference`] describes a navigable location inside a workspace
//! snapshot: a singleton instance, a keyed entity, a whole collection, an
//! ordered set of collections, a partitioned inner reference, or a raw
//! JSON pointer. It is a closed sum type with exhaustive dispatch - adding
//! a reference kind is a compile-time-visible change, and an operation
//! that cannot handle a kind fails fast with
//! [`ReferenceError::Unsupported`] rather than silently misrouting.
//!
//! The algebra over references lives in [`reduce`], [`update`] and
//! [`merge`]: pure functions from `(snapshot, reference)` to a projected
//! [`StateValue`], or from `(snapshot, reference, value)` to a new
//! snapshot. `update` replaces the addressed target wholesale; `merge`
//! upserts key by key. The outer write API selects between them with
//! [`UpdateOptions`].
//!
//! ## Example
//!
//! ```
//! use workspace_sync::{reduce, StateReference, WorkspaceSnapshot, NamedCollection};
//! use serde_json::json;
//!
//! let snapshot = WorkspaceSnapshot::from_collections([
//!     ("orders", NamedCollection::from_items([("o-1".to_string(), json!({"qty": 5}))])),
//! ]);
//!
//! let reference = StateReference::entity("orders", "o-1");
//! let value = reduce(&snapshot, &reference).unwrap();
//! assert_eq!(value.to_value(), json!({"qty": 5}));
//! ```

mod algebra;
mod error;

use serde::{Deserialize, Serialize};

pub use algebra::{merge, reduce, update, StateValue};
pub use error::ReferenceError;

/// A navigable location inside a workspace snapshot.
///
/// Equality for [`Collections`](StateReference::Collections) is
/// order-sensitive: two references naming the same collections in a
/// different order are different subscriptions.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StateReference {
    /// A singleton instance: the value stored in collection `name` under
    /// key `name`.
    Instance { name: String },
    /// One keyed instance inside a named collection.
    Entity { collection: String, key: String },
    /// A whole named collection.
    Collection { name: String },
    /// An ordered set of named collections.
    Collections { names: Vec<String> },
    /// An inner reference routed to a partition's own stream. The
    /// partition chooses *which* physical stream to operate on, not a
    /// sub-structure within one snapshot.
    Partitioned {
        partition: String,
        reference: Box<StateReference>,
    },
    /// A raw JSON pointer into the snapshot's wire projection. Read-only.
    JsonPointer { path: String },
}

impl StateReference {
    pub fn instance(name: impl Into<String>) -> Self {
        StateReference::Instance { name: name.into() }
    }

    pub fn entity(collection: impl Into<String>, key: impl Into<String>) -> Self {
        StateReference::Entity {
            collection: collection.into(),
            key: key.into(),
        }
    }

    pub fn collection(name: impl Into<String>) -> Self {
        StateReference::Collection { name: name.into() }
    }

    pub fn collections<I, N>(names: I) -> Self
    where
        I: IntoIterator<Item = N>,
        N: Into<String>,
    {
        StateReference::Collections {
            names: names.into_iter().map(Into::into).collect(),
        }
    }

    pub fn partitioned(partition: impl Into<String>, reference: StateReference) -> Self {
        StateReference::Partitioned {
            partition: partition.into(),
            reference: Box::new(reference),
        }
    }

    pub fn json_pointer(path: impl Into<String>) -> Self {
        StateReference::JsonPointer { path: path.into() }
    }

    /// The reference kind, for diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            StateReference::Instance { .. } => "instance",
            StateReference::Entity { .. } => "entity",
            StateReference::Collection { .. } => "collection",
            StateReference::Collections { .. } => "collections",
            StateReference::Partitioned { .. } => "partitioned",
            StateReference::JsonPointer { .. } => "json_pointer",
        }
    }
}

/// Write-mode flag carried by data-change calls.
///
/// `snapshot: true` replaces the addressed target wholesale; `false` (the
/// default) merges key by key - an upsert with no implicit delete.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateOptions {
    #[serde(default)]
    pub snapshot: bool,
}

impl UpdateOptions {
    /// Options for a wholesale snapshot replace.
    pub fn snapshot_replace() -> Self {
        UpdateOptions { snapshot: true }
    }
}
