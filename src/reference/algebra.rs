use std::sync::Arc;

use serde_json::Value;

use crate::model::{NamedCollection, WorkspaceSnapshot};

use super::{ReferenceError, StateReference};

/// A value projected out of (or written into) a snapshot through a
/// reference.
#[derive(Clone, Debug, PartialEq)]
pub enum StateValue {
    /// A single instance; `None` when the addressed instance is absent.
    Instance(Option<Arc<Value>>),
    /// A whole collection.
    Collection(Arc<NamedCollection>),
    /// A snapshot-shaped set of collections.
    Collections(WorkspaceSnapshot),
    /// A raw JSON value (pointer reads).
    Raw(Value),
}

impl StateValue {
    /// Wrap a single instance payload.
    pub fn instance(value: Value) -> Self {
        StateValue::Instance(Some(Arc::new(value)))
    }

    /// Wrap a collection.
    pub fn collection(collection: NamedCollection) -> Self {
        StateValue::Collection(Arc::new(collection))
    }

    /// Wrap a snapshot-shaped collection set.
    pub fn collections(snapshot: WorkspaceSnapshot) -> Self {
        StateValue::Collections(snapshot)
    }

    /// The wire projection of this value. Absent instances project to
    /// `null`.
    pub fn to_value(&self) -> Value {
        match self {
            StateValue::Instance(Some(value)) => value.as_ref().clone(),
            StateValue::Instance(None) => Value::Null,
            StateValue::Collection(coll) => coll.to_value(),
            StateValue::Collections(snapshot) => snapshot.to_value(),
            StateValue::Raw(value) => value.clone(),
        }
    }

    fn shape(&self) -> &'static str {
        match self {
            StateValue::Instance(_) => "instance",
            StateValue::Collection(_) => "collection",
            StateValue::Collections(_) => "collections",
            StateValue::Raw(_) => "raw",
        }
    }
}

/// Read the projection a reference addresses.
///
/// Absence - a missing instance, collection, or pointer target - is never
/// an error; it resolves to an empty or null value.
pub fn reduce(
    snapshot: &WorkspaceSnapshot,
    reference: &StateReference,
) -> Result<StateValue, ReferenceError> {
    match reference {
        StateReference::Instance { name } => Ok(StateValue::Instance(
            snapshot.collection(name).get(name),
        )),
        StateReference::Entity { collection, key } => Ok(StateValue::Instance(
            snapshot.collection(collection).get(key),
        )),
        StateReference::Collection { name } => {
            Ok(StateValue::Collection(snapshot.collection(name)))
        }
        StateReference::Collections { names } => {
            Ok(StateValue::Collections(snapshot.project(names)))
        }
        // Partition selection happens before the snapshot is reached; by
        // the time the algebra runs, only the inner reference matters.
        StateReference::Partitioned { reference, .. } => reduce(snapshot, reference),
        StateReference::JsonPointer { path } => Ok(StateValue::Raw(
            snapshot
                .to_value()
                .pointer(path)
                .cloned()
                .unwrap_or(Value::Null),
        )),
    }
}

/// Write `value` at the addressed location, replacing the target
/// wholesale, and return the new snapshot.
///
/// - `Instance`/`Entity`: upsert the instance; every other collection is
///   structurally shared with the base snapshot.
/// - `Collection`: replace the named collection.
/// - `Collections`: collection-level replace - every collection named in
///   `value` fully replaces its counterpart; base collections absent from
///   `value` are retained unchanged. Never a per-key deep merge.
pub fn update(
    snapshot: &WorkspaceSnapshot,
    reference: &StateReference,
    value: StateValue,
) -> Result<WorkspaceSnapshot, ReferenceError> {
    match reference {
        StateReference::Instance { name } => {
            let instance = expect_instance(value, reference)?;
            let coll = snapshot.collection(name).insert(name.clone(), instance);
            Ok(snapshot.with_collection(name.clone(), coll))
        }
        StateReference::Entity { collection, key } => {
            let instance = expect_instance(value, reference)?;
            let coll = snapshot.collection(collection).insert(key.clone(), instance);
            Ok(snapshot.with_collection(collection.clone(), coll))
        }
        StateReference::Collection { name } => match value {
            StateValue::Collection(coll) => Ok(snapshot.with_collection_arc(name.clone(), coll)),
            other => Err(ReferenceError::ValueMismatch {
                expected: "a collection",
                kind: other.shape(),
            }),
        },
        StateReference::Collections { .. } => match value {
            StateValue::Collections(incoming) => {
                let mut next = snapshot.clone();
                for (name, coll) in incoming.collections() {
                    next = next.with_collection_arc(name.to_string(), Arc::clone(coll));
                }
                Ok(next)
            }
            other => Err(ReferenceError::ValueMismatch {
                expected: "a set of collections",
                kind: other.shape(),
            }),
        },
        StateReference::Partitioned { reference, .. } => update(snapshot, reference, value),
        StateReference::JsonPointer { .. } => Err(ReferenceError::Unsupported {
            operation: "update",
            kind: reference.kind(),
        }),
    }
}

/// Write `value` at the addressed location with per-key upsert semantics
/// and return the new snapshot.
///
/// This is the `UpdateOptions { snapshot: false }` path: incoming keys win,
/// keys absent from the incoming value are retained, nothing is implicitly
/// deleted. A single instance has no finer grain, so `Instance`/`Entity`
/// behave exactly like [`update`].
pub fn merge(
    snapshot: &WorkspaceSnapshot,
    reference: &StateReference,
    value: StateValue,
) -> Result<WorkspaceSnapshot, ReferenceError> {
    match reference {
        StateReference::Instance { .. } | StateReference::Entity { .. } => {
            update(snapshot, reference, value)
        }
        StateReference::Collection { name } => match value {
            StateValue::Collection(incoming) => {
                let merged = snapshot.collection(name).merge(&incoming);
                Ok(snapshot.with_collection(name.clone(), merged))
            }
            other => Err(ReferenceError::ValueMismatch {
                expected: "a collection",
                kind: other.shape(),
            }),
        },
        StateReference::Collections { .. } => match value {
            StateValue::Collections(incoming) => {
                let mut next = snapshot.clone();
                for (name, coll) in incoming.collections() {
                    let merged = next.collection(name).merge(coll);
                    next = next.with_collection(name.to_string(), merged);
                }
                Ok(next)
            }
            other => Err(ReferenceError::ValueMismatch {
                expected: "a set of collections",
                kind: other.shape(),
            }),
        },
        StateReference::Partitioned { reference, .. } => merge(snapshot, reference, value),
        StateReference::JsonPointer { .. } => Err(ReferenceError::Unsupported {
            operation: "merge",
            kind: reference.kind(),
        }),
    }
}

fn expect_instance(
    value: StateValue,
    reference: &StateReference,
) -> Result<Value, ReferenceError> {
    match value {
        StateValue::Instance(Some(instance)) => Ok(instance.as_ref().clone()),
        StateValue::Raw(raw) => Ok(raw),
        other => Err(ReferenceError::ValueMismatch {
            expected: "an instance",
            kind: match other {
                StateValue::Instance(None) => "an absent instance",
                _ => other.shape(),
            },
        }),
    }
}
