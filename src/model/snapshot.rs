use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::{Map, Value};

use super::{ModelError, NamedCollection};

/// Immutable whole-state value at one point in time.
///
/// Maps collection name to [`NamedCollection`]. An absent collection reads
/// as empty, never as an error. Collections are held behind `Arc`, so a
/// snapshot produced by a write shares every untouched collection with its
/// predecessor, and superseded snapshots stay valid for readers that still
/// hold them.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct WorkspaceSnapshot {
    collections: BTreeMap<String, Arc<NamedCollection>>,
}

impl WorkspaceSnapshot {
    /// Create an empty snapshot.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a snapshot from `(name, collection)` pairs.
    pub fn from_collections<I, N>(collections: I) -> Self
    where
        I: IntoIterator<Item = (N, NamedCollection)>,
        N: Into<String>,
    {
        Self {
            collections: collections
                .into_iter()
                .map(|(name, coll)| (name.into(), Arc::new(coll)))
                .collect(),
        }
    }

    /// The named collection, or an empty one if it does not exist.
    pub fn collection(&self, name: &str) -> Arc<NamedCollection> {
        self.collections
            .get(name)
            .cloned()
            .unwrap_or_else(|| Arc::new(NamedCollection::new()))
    }

    /// The named collection, if present.
    pub fn get_collection(&self, name: &str) -> Option<&Arc<NamedCollection>> {
        self.collections.get(name)
    }

    /// Collection names, in order.
    pub fn collection_names(&self) -> impl Iterator<Item = &str> {
        self.collections.keys().map(String::as_str)
    }

    /// `(name, collection)` pairs, in name order.
    pub fn collections(&self) -> impl Iterator<Item = (&str, &Arc<NamedCollection>)> {
        self.collections
            .iter()
            .map(|(name, coll)| (name.as_str(), coll))
    }

    pub fn contains_collection(&self, name: &str) -> bool {
        self.collections.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.collections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.collections.is_empty()
    }

    /// Return a copy with the named collection replaced wholesale.
    pub fn with_collection(&self, name: impl Into<String>, collection: NamedCollection) -> Self {
        self.with_collection_arc(name, Arc::new(collection))
    }

    /// Replace a collection with an already-shared value, avoiding a copy.
    pub(crate) fn with_collection_arc(
        &self,
        name: impl Into<String>,
        collection: Arc<NamedCollection>,
    ) -> Self {
        let mut collections = self.collections.clone();
        collections.insert(name.into(), collection);
        Self { collections }
    }

    /// Project this snapshot onto the named collections.
    ///
    /// Names that do not exist in the source are silently dropped - callers
    /// never need a pre-existence check.
    pub fn project<N: AsRef<str>>(&self, names: &[N]) -> Self {
        let mut collections = BTreeMap::new();
        for name in names {
            if let Some(coll) = self.collections.get(name.as_ref()) {
                collections.insert(name.as_ref().to_string(), Arc::clone(coll));
            }
        }
        Self { collections }
    }

    /// Pointer-level equality of the named collection in two snapshots.
    ///
    /// Used by the snapshot differ to skip untouched collections.
    pub(crate) fn same_collection(&self, other: &WorkspaceSnapshot, name: &str) -> bool {
        match (self.collections.get(name), other.collections.get(name)) {
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// The wire projection: a JSON object mapping collection name to that
    /// collection's own wire projection.
    pub fn to_value(&self) -> Value {
        let mut map = Map::new();
        for (name, coll) in &self.collections {
            map.insert(name.clone(), coll.to_value());
        }
        Value::Object(map)
    }

    /// Rebuild a snapshot from its wire projection.
    pub fn from_value(value: Value) -> Result<Self, ModelError> {
        match value {
            Value::Object(map) => {
                let mut collections = BTreeMap::new();
                for (name, coll_value) in map {
                    let coll = NamedCollection::from_value(coll_value)?;
                    collections.insert(name, Arc::new(coll));
                }
                Ok(Self { collections })
            }
            _ => Err(ModelError::Shape(
                "snapshot value must be an object of collections".to_string(),
            )),
        }
    }
}
