//! Structural diffs between published values.
//!
//! A [`Patch`] is the incremental half of the wire contract: subscribers
//! receive one full-state event and then a patch per version, and applying
//! each patch in order reproduces the host's projected value exactly.
//!
//! Ops address locations with RFC 6901 JSON pointers. Objects diff
//! recursively; arrays and scalars are replaced wholesale. [`diff`] walks
//! two arbitrary JSON values; [`snapshot_diff`] walks two snapshots and
//! uses `Arc` pointer equality to skip untouched collections and
//! instances, so per-write diff cost stays proportional to the data a
//! mutation actually touched.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::model::WorkspaceSnapshot;

/// A structural diff between two consecutive published values.
///
/// Applying a patch to the value it was diffed from reproduces the target
/// value exactly. An empty patch means the values were equal.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Patch {
    pub ops: Vec<PatchOp>,
}

impl Patch {
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }
}

/// One patch operation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum PatchOp {
    /// Set the value at `path`, creating intermediate objects as needed.
    /// An empty path replaces the whole document.
    Set { path: String, value: Value },
    /// Remove the value at `path`. Removing an absent path is a no-op.
    Remove { path: String },
}

/// Error type for patch application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatchError {
    /// A pointer was malformed or descended into a non-object value.
    InvalidPath(String),
}

impl fmt::Display for PatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PatchError::InvalidPath(path) => write!(f, "invalid patch path: {:?}", path),
        }
    }
}

impl std::error::Error for PatchError {}

/// Diff two JSON values.
///
/// Objects are compared key by key; removed keys become `Remove` ops,
/// added or changed values become `Set` ops. Anything that is not an
/// object on both sides is replaced wholesale when unequal.
pub fn diff(base: &Value, target: &Value) -> Patch {
    let mut ops = Vec::new();
    diff_at(String::new(), base, target, &mut ops);
    Patch { ops }
}

fn diff_at(path: String, base: &Value, target: &Value, ops: &mut Vec<PatchOp>) {
    match (base, target) {
        (Value::Object(b), Value::Object(t)) => {
            for key in b.keys() {
                if !t.contains_key(key) {
                    ops.push(PatchOp::Remove {
                        path: format!("{}/{}", path, escape(key)),
                    });
                }
            }
            for (key, target_value) in t {
                let child = format!("{}/{}", path, escape(key));
                match b.get(key) {
                    Some(base_value) => diff_at(child, base_value, target_value, ops),
                    None => ops.push(PatchOp::Set {
                        path: child,
                        value: target_value.clone(),
                    }),
                }
            }
        }
        _ if base == target => {}
        _ => ops.push(PatchOp::Set {
            path,
            value: target.clone(),
        }),
    }
}

/// Diff two snapshots at collection/instance granularity.
///
/// Collections (and instances within a changed collection) that are
/// pointer-identical between the two snapshots are skipped without
/// inspecting their contents.
pub fn snapshot_diff(prev: &WorkspaceSnapshot, next: &WorkspaceSnapshot) -> Patch {
    let mut ops = Vec::new();

    for name in prev.collection_names() {
        if !next.contains_collection(name) {
            ops.push(PatchOp::Remove {
                path: format!("/{}", escape(name)),
            });
        }
    }

    for (name, coll) in next.collections() {
        if prev.same_collection(next, name) {
            continue;
        }
        match prev.get_collection(name) {
            None => ops.push(PatchOp::Set {
                path: format!("/{}", escape(name)),
                value: coll.to_value(),
            }),
            Some(prev_coll) => {
                for key in prev_coll.keys() {
                    if !coll.contains(key) {
                        ops.push(PatchOp::Remove {
                            path: format!("/{}/{}", escape(name), escape(key)),
                        });
                    }
                }
                for (key, value) in coll.items() {
                    if prev_coll.same_instance(coll, key) {
                        continue;
                    }
                    if prev_coll.get(key).as_deref() == Some(value.as_ref()) {
                        continue;
                    }
                    ops.push(PatchOp::Set {
                        path: format!("/{}/{}", escape(name), escape(key)),
                        value: value.as_ref().clone(),
                    });
                }
            }
        }
    }

    Patch { ops }
}

/// Apply a patch, returning the patched value.
pub fn apply(base: &Value, patch: &Patch) -> Result<Value, PatchError> {
    let mut doc = base.clone();
    for op in &patch.ops {
        match op {
            PatchOp::Set { path, value } => set_at(&mut doc, path, value.clone())?,
            PatchOp::Remove { path } => remove_at(&mut doc, path)?,
        }
    }
    Ok(doc)
}

fn set_at(doc: &mut Value, path: &str, value: Value) -> Result<(), PatchError> {
    if path.is_empty() {
        *doc = value;
        return Ok(());
    }
    let tokens = split(path)?;
    let mut current = doc;
    for token in &tokens[..tokens.len() - 1] {
        let map = as_object(current, path)?;
        current = map
            .entry(token.clone())
            .or_insert_with(|| Value::Object(Map::new()));
    }
    let map = as_object(current, path)?;
    map.insert(tokens[tokens.len() - 1].clone(), value);
    Ok(())
}

fn remove_at(doc: &mut Value, path: &str) -> Result<(), PatchError> {
    if path.is_empty() {
        return Err(PatchError::InvalidPath(path.to_string()));
    }
    let tokens = split(path)?;
    let mut current = doc;
    for token in &tokens[..tokens.len() - 1] {
        match current {
            Value::Object(map) => match map.get_mut(token) {
                Some(next) => current = next,
                // missing intermediate: nothing to remove
                None => return Ok(()),
            },
            _ => return Err(PatchError::InvalidPath(path.to_string())),
        }
    }
    let map = as_object(current, path)?;
    map.remove(&tokens[tokens.len() - 1]);
    Ok(())
}

fn as_object<'a>(value: &'a mut Value, path: &str) -> Result<&'a mut Map<String, Value>, PatchError> {
    match value {
        Value::Object(map) => Ok(map),
        _ => Err(PatchError::InvalidPath(path.to_string())),
    }
}

fn split(path: &str) -> Result<Vec<String>, PatchError> {
    match path.strip_prefix('/') {
        Some(rest) => Ok(rest.split('/').map(unescape).collect()),
        None => Err(PatchError::InvalidPath(path.to_string())),
    }
}

fn escape(token: &str) -> String {
    token.replace('~', "~0").replace('/', "~1")
}

fn unescape(token: &str) -> String {
    token.replace("~1", "/").replace("~0", "~")
}
