//! SyncStore - the outer write/read API over one or more streams.
//!
//! A [`SyncStore`] owns the default [`SyncStream`] plus one stream per
//! partition, all sharing one [`StreamConfig`]. It resolves
//! [`StateReference`] values to the owning stream (a partitioned
//! reference picks *which* stream, then its inner reference addresses
//! state within that stream's snapshot), and turns
//! `(reference, value, options)` triples into pure mutation functions for
//! the stream to serialize.
//!
//! Independent streams are fully independent: they run their own mutation
//! loops in parallel and there is no ordering guarantee across them.
//!
//! ## Example
//!
//! ```
//! use workspace_sync::{
//!     StateReference, StateValue, StreamConfig, SyncStore, UpdateOptions,
//! };
//! use serde_json::json;
//!
//! let store = SyncStore::new(StreamConfig::default());
//!
//! store
//!     .update(
//!         &StateReference::entity("orders", "o-1"),
//!         StateValue::instance(json!({"id": "o-1", "qty": 10})),
//!         UpdateOptions::default(),
//!     )
//!     .unwrap()
//!     .wait()
//!     .unwrap();
//!
//! let value = store.reduce(&StateReference::entity("orders", "o-1")).unwrap();
//! assert_eq!(value.to_value(), json!({"id": "o-1", "qty": 10}));
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};

use tracing::debug;

use crate::model::WorkspaceSnapshot;
use crate::reference::{self, ReferenceError, StateReference, StateValue, UpdateOptions};
use crate::stream::{StreamConfig, StreamError, Subscription, SyncStream, UpdateReceipt};

/// Error type for store operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Reference dispatch failed (caller/schema bug).
    Reference(ReferenceError),
    /// The owning stream rejected the call.
    Stream(StreamError),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::Reference(e) => write!(f, "reference error: {}", e),
            StoreError::Stream(e) => write!(f, "stream error: {}", e),
        }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StoreError::Reference(e) => Some(e),
            StoreError::Stream(e) => Some(e),
        }
    }
}

impl From<ReferenceError> for StoreError {
    fn from(err: ReferenceError) -> Self {
        StoreError::Reference(err)
    }
}

impl From<StreamError> for StoreError {
    fn from(err: StreamError) -> Self {
        StoreError::Stream(err)
    }
}

/// Owns the default stream and one stream per partition; routes
/// references to the owning stream and builds mutation functions from
/// write calls.
pub struct SyncStore {
    config: StreamConfig,
    default_stream: Arc<SyncStream>,
    partitions: RwLock<HashMap<String, Arc<SyncStream>>>,
}

impl SyncStore {
    /// Create a store whose default stream starts from an empty snapshot.
    pub fn new(config: StreamConfig) -> Self {
        Self::with_initial(WorkspaceSnapshot::new(), config)
    }

    /// Create a store whose default stream starts from `initial`.
    pub fn with_initial(initial: WorkspaceSnapshot, config: StreamConfig) -> Self {
        SyncStore {
            config,
            default_stream: Arc::new(SyncStream::new(initial, config)),
            partitions: RwLock::new(HashMap::new()),
        }
    }

    /// The default (unpartitioned) stream.
    pub fn default_stream(&self) -> Arc<SyncStream> {
        Arc::clone(&self.default_stream)
    }

    /// The stream owning `partition`, created empty on first use.
    pub fn partition(&self, partition: &str) -> Arc<SyncStream> {
        {
            let partitions = match self.partitions.read() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            if let Some(stream) = partitions.get(partition) {
                return Arc::clone(stream);
            }
        }

        let mut partitions = match self.partitions.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let stream = partitions.entry(partition.to_string()).or_insert_with(|| {
            debug!(partition, "creating partition stream");
            Arc::new(SyncStream::new(WorkspaceSnapshot::new(), self.config))
        });
        Arc::clone(stream)
    }

    /// Resolve a reference to its owning stream and the reference to use
    /// against that stream's snapshot.
    pub fn resolve(
        &self,
        reference: &StateReference,
    ) -> Result<(Arc<SyncStream>, StateReference), ReferenceError> {
        match reference {
            StateReference::Partitioned {
                partition,
                reference,
            } => {
                if matches!(**reference, StateReference::Partitioned { .. }) {
                    return Err(ReferenceError::NestedPartition);
                }
                Ok((self.partition(partition), (**reference).clone()))
            }
            other => Ok((self.default_stream(), other.clone())),
        }
    }

    /// One-shot read of the addressed projection.
    pub fn reduce(&self, reference: &StateReference) -> Result<StateValue, ReferenceError> {
        let (stream, inner) = self.resolve(reference)?;
        stream.reduce(&inner)
    }

    /// Subscribe to the stream owning the addressed state.
    ///
    /// The subscription carries whole-stream change items; callers needing
    /// the addressed sub-projection reduce each item's snapshot with the
    /// inner reference (that is what the remote host does per subscriber).
    pub fn subscribe(&self, reference: &StateReference) -> Result<Subscription, StoreError> {
        let (stream, _) = self.resolve(reference)?;
        Ok(stream.subscribe()?)
    }

    /// Write `value` at the addressed location.
    ///
    /// `options.snapshot` selects wholesale replace; the default merges
    /// key by key (upsert, no implicit delete). Reference/value mismatches
    /// fail fast before admission; once admitted, the write is applied in
    /// admission order by the owning stream.
    pub fn update(
        &self,
        reference: &StateReference,
        value: StateValue,
        options: UpdateOptions,
    ) -> Result<UpdateReceipt, StoreError> {
        let (stream, inner) = self.resolve(reference)?;

        // Dispatch and shape errors do not depend on snapshot contents, so
        // probing against an empty snapshot surfaces them synchronously.
        let probe = WorkspaceSnapshot::new();
        if options.snapshot {
            reference::update(&probe, &inner, value.clone())?;
        } else {
            reference::merge(&probe, &inner, value.clone())?;
        }

        let receipt = stream.update(move |snapshot| {
            let applied = if options.snapshot {
                reference::update(snapshot, &inner, value.clone())
            } else {
                reference::merge(snapshot, &inner, value.clone())
            };
            // validated before admission; an error here cannot happen
            applied.unwrap_or_else(|_| snapshot.clone())
        })?;
        Ok(receipt)
    }

    /// Write and wait for the committed version.
    pub fn update_wait(
        &self,
        reference: &StateReference,
        value: StateValue,
        options: UpdateOptions,
    ) -> Result<u64, StoreError> {
        Ok(self.update(reference, value, options)?.wait()?)
    }

    /// Remove keys from the addressed location.
    ///
    /// `Collection` references remove the given keys from the collection;
    /// `Instance`/`Entity` references remove the addressed instance itself
    /// (`keys` is ignored). Removing absent keys is a no-op that still
    /// commits a version.
    pub fn delete(
        &self,
        reference: &StateReference,
        keys: Vec<String>,
    ) -> Result<UpdateReceipt, StoreError> {
        let (stream, inner) = self.resolve(reference)?;

        let receipt = match inner {
            StateReference::Collection { name } => stream.update(move |snapshot| {
                let coll = snapshot.collection(&name).delete(&keys);
                snapshot.with_collection(name.clone(), coll)
            })?,
            StateReference::Instance { name } => stream.update(move |snapshot| {
                let coll = snapshot.collection(&name).delete([name.as_str()]);
                snapshot.with_collection(name.clone(), coll)
            })?,
            StateReference::Entity { collection, key } => stream.update(move |snapshot| {
                let coll = snapshot.collection(&collection).delete([key.as_str()]);
                snapshot.with_collection(collection.clone(), coll)
            })?,
            other => {
                return Err(StoreError::Reference(ReferenceError::Unsupported {
                    operation: "delete",
                    kind: other.kind(),
                }))
            }
        };
        Ok(receipt)
    }

    /// Submit a compound mutation against the stream owning `reference`.
    ///
    /// The reference only routes to a partition here; the mutation itself
    /// sees the whole snapshot.
    pub fn update_with<F>(
        &self,
        reference: &StateReference,
        mutate: F,
    ) -> Result<UpdateReceipt, StoreError>
    where
        F: FnOnce(&WorkspaceSnapshot) -> WorkspaceSnapshot + Send + 'static,
    {
        let (stream, _) = self.resolve(reference)?;
        Ok(stream.update(mutate)?)
    }

    /// Dispose every owned stream.
    pub fn dispose(&self) {
        self.default_stream.dispose();
        let partitions = match self.partitions.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        for stream in partitions.values() {
            stream.dispose();
        }
    }
}
