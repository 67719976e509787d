use std::collections::BTreeMap;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use super::ModelError;

/// Immutable keyed bag of instances of one logical entity type.
///
/// Keys are unique within the collection. Instance payloads are opaque
/// JSON values held behind `Arc`, so cloning a collection (or producing a
/// modified copy) shares every untouched payload with the original.
///
/// All mutating operations take `&self` and return a new collection.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct NamedCollection {
    items: BTreeMap<String, Arc<Value>>,
}

impl NamedCollection {
    /// Create an empty collection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a collection from `(key, instance)` pairs.
    ///
    /// Later pairs win on duplicate keys.
    pub fn from_items<I, K>(items: I) -> Self
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        Self {
            items: items
                .into_iter()
                .map(|(key, value)| (key.into(), Arc::new(value)))
                .collect(),
        }
    }

    /// Get the instance stored under `key`. Absence is not an error.
    pub fn get(&self, key: &str) -> Option<Arc<Value>> {
        self.items.get(key).cloned()
    }

    /// Get the instance stored under `key`, decoded into `T`.
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, ModelError> {
        match self.items.get(key) {
            Some(value) => serde_json::from_value(value.as_ref().clone())
                .map(Some)
                .map_err(|e| ModelError::Deserialize(e.to_string())),
            None => Ok(None),
        }
    }

    /// Every instance, in key order.
    pub fn values(&self) -> impl Iterator<Item = &Arc<Value>> {
        self.items.values()
    }

    /// Every instance decoded into `T`, in key order.
    pub fn all_as<T: DeserializeOwned>(&self) -> Result<Vec<T>, ModelError> {
        self.items
            .values()
            .map(|value| {
                serde_json::from_value(value.as_ref().clone())
                    .map_err(|e| ModelError::Deserialize(e.to_string()))
            })
            .collect()
    }

    /// Every key, in order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.items.keys().map(String::as_str)
    }

    /// `(key, instance)` pairs, in key order.
    pub fn items(&self) -> impl Iterator<Item = (&str, &Arc<Value>)> {
        self.items.iter().map(|(key, value)| (key.as_str(), value))
    }

    pub fn contains(&self, key: &str) -> bool {
        self.items.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Return a copy with `value` stored under `key`.
    pub fn insert(&self, key: impl Into<String>, value: Value) -> Self {
        let mut items = self.items.clone();
        items.insert(key.into(), Arc::new(value));
        Self { items }
    }

    /// Return a copy with the incoming batch upserted.
    ///
    /// Each item is keyed by the supplied extractor; the last occurrence
    /// wins on duplicate keys within the batch. Keys not named by the batch
    /// are left untouched.
    pub fn upsert<F>(&self, batch: Vec<Value>, key_fn: F) -> Self
    where
        F: Fn(&Value) -> String,
    {
        let mut items = self.items.clone();
        for value in batch {
            let key = key_fn(&value);
            items.insert(key, Arc::new(value));
        }
        Self { items }
    }

    /// Return a copy with the given keys removed.
    ///
    /// Removing an absent key is a no-op.
    pub fn delete<I, K>(&self, keys: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: AsRef<str>,
    {
        let mut items = self.items.clone();
        for key in keys {
            items.remove(key.as_ref());
        }
        Self { items }
    }

    /// Merge `incoming` into this collection.
    ///
    /// Per key, the incoming value wins; keys present only in the base are
    /// retained. Last-writer-wins at value granularity, as opposed to the
    /// whole-collection replacement a snapshot write performs.
    pub fn merge(&self, incoming: &NamedCollection) -> Self {
        let mut items = self.items.clone();
        for (key, value) in &incoming.items {
            items.insert(key.clone(), Arc::clone(value));
        }
        Self { items }
    }

    /// Pointer-level equality of the instance stored under `key`.
    ///
    /// Used by the snapshot differ to skip untouched instances without
    /// comparing payload contents.
    pub(crate) fn same_instance(&self, other: &NamedCollection, key: &str) -> bool {
        match (self.items.get(key), other.items.get(key)) {
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// The wire projection: a JSON object keyed by instance key.
    pub fn to_value(&self) -> Value {
        let mut map = Map::new();
        for (key, value) in &self.items {
            map.insert(key.clone(), value.as_ref().clone());
        }
        Value::Object(map)
    }

    /// Rebuild a collection from its wire projection.
    pub fn from_value(value: Value) -> Result<Self, ModelError> {
        match value {
            Value::Object(map) => Ok(Self::from_items(map)),
            other => Err(ModelError::Shape(format!(
                "collection value must be an object, got {}",
                kind_of(&other)
            ))),
        }
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    fn by_id(value: &Value) -> String {
        value["id"].as_str().unwrap_or_default().to_string()
    }

    #[test]
    fn upsert_sets_batch_keys_and_leaves_others() {
        let base = NamedCollection::from_items([
            ("a".to_string(), json!({"id": "a", "n": 1})),
            ("b".to_string(), json!({"id": "b", "n": 2})),
        ]);

        let next = base.upsert(vec![json!({"id": "b", "n": 20}), json!({"id": "c", "n": 3})], by_id);

        assert_eq!(next.len(), 3);
        assert_eq!(next.get("a").unwrap()["n"], 1);
        assert_eq!(next.get("b").unwrap()["n"], 20);
        assert_eq!(next.get("c").unwrap()["n"], 3);
        // base untouched
        assert_eq!(base.len(), 2);
        assert_eq!(base.get("b").unwrap()["n"], 2);
    }

    #[test]
    fn upsert_last_occurrence_wins_within_batch() {
        let next = NamedCollection::new().upsert(
            vec![json!({"id": "x", "n": 1}), json!({"id": "x", "n": 2})],
            by_id,
        );

        assert_eq!(next.len(), 1);
        assert_eq!(next.get("x").unwrap()["n"], 2);
    }

    #[test]
    fn delete_absent_key_is_noop() {
        let base = NamedCollection::from_items([("a".to_string(), json!(1))]);
        let next = base.delete(["a", "missing"]);

        assert!(next.is_empty());
        assert_eq!(base.len(), 1);
    }

    #[test]
    fn merge_incoming_wins_base_only_retained() {
        let base = NamedCollection::from_items([
            ("k1".to_string(), json!("v1")),
            ("k2".to_string(), json!("v2")),
        ]);
        let incoming = NamedCollection::from_items([
            ("k2".to_string(), json!("v2'")),
            ("k3".to_string(), json!("v3")),
        ]);

        let merged = base.merge(&incoming);

        assert_eq!(merged.len(), 3);
        assert_eq!(*merged.get("k1").unwrap(), json!("v1"));
        assert_eq!(*merged.get("k2").unwrap(), json!("v2'"));
        assert_eq!(*merged.get("k3").unwrap(), json!("v3"));
    }

    #[test]
    fn merge_shares_untouched_payloads() {
        let base = NamedCollection::from_items([("a".to_string(), json!({"big": true}))]);
        let merged = base.merge(&NamedCollection::from_items([("b".to_string(), json!(2))]));

        assert!(base.same_instance(&merged, "a"));
    }

    #[test]
    fn typed_decode() {
        #[derive(Deserialize, Debug, PartialEq)]
        struct Order {
            id: String,
            qty: u32,
        }

        let coll = NamedCollection::from_items([(
            "o-1".to_string(),
            json!({"id": "o-1", "qty": 10}),
        )]);

        let order: Option<Order> = coll.get_as("o-1").unwrap();
        assert_eq!(
            order,
            Some(Order {
                id: "o-1".to_string(),
                qty: 10
            })
        );
        assert_eq!(coll.get_as::<Order>("missing").unwrap(), None);
        assert!(coll.get_as::<u32>("o-1").is_err());
    }

    #[test]
    fn wire_round_trip() {
        let coll = NamedCollection::from_items([
            ("a".to_string(), json!({"id": "a"})),
            ("b".to_string(), json!({"id": "b"})),
        ]);

        let value = coll.to_value();
        let back = NamedCollection::from_value(value).unwrap();
        assert_eq!(coll, back);

        assert!(NamedCollection::from_value(json!([1, 2])).is_err());
    }
}
