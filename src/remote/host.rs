//! Host endpoint of the remote synchronization protocol.
//!
//! A [`SyncHost`] sits between a [`SyncStore`] and the transport
//! collaborator. Remote subscribers get a full-state event followed by a
//! structural diff per version, each computed over *their* reference's
//! projection by a dedicated forwarder thread - a slow endpoint is its
//! own problem, never the mutation loop's. Remote writes are translated
//! through the injected key-extraction policy and enqueued exactly like
//! local writes, so "last admitted into the queue" stays the only
//! precedence rule; failures are captured into the response, and a bad
//! write never takes the stream down.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use serde_json::Value;
use tracing::{debug, warn};

use crate::model::{NamedCollection, WorkspaceSnapshot};
use crate::patch;
use crate::reference::{reduce, StateReference, StateValue};
use crate::store::{StoreError, SyncStore};
use crate::stream::Subscription;

use super::{
    ChangeAction, ChangeBody, DataChangeRequest, DataChangeResponse, DataChangedEvent,
    EndpointSender, SubscribeRequest, TransportError, UnsubscribeRequest, WireMessage,
};

const FORWARD_POLL: Duration = Duration::from_millis(25);

/// Error type for host request handling.
///
/// Only subscribe/unsubscribe surface errors to the transport layer;
/// write failures are always captured into a [`DataChangeResponse`].
#[derive(Debug)]
pub enum HostError {
    Store(StoreError),
    Transport(TransportError),
}

impl fmt::Display for HostError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostError::Store(e) => write!(f, "store error: {}", e),
            HostError::Transport(e) => write!(f, "transport error: {}", e),
        }
    }
}

impl std::error::Error for HostError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            HostError::Store(e) => Some(e),
            HostError::Transport(e) => Some(e),
        }
    }
}

impl From<StoreError> for HostError {
    fn from(err: StoreError) -> Self {
        HostError::Store(err)
    }
}

impl From<TransportError> for HostError {
    fn from(err: TransportError) -> Self {
        HostError::Transport(err)
    }
}

/// Key-extraction policy for incoming instance payloads.
///
/// Supplied by the application's schema layer; the host never guesses
/// identity on its own.
pub trait KeySelector: Send + Sync {
    /// The stable identity key for an instance of `collection`, or `None`
    /// if the element carries no usable key.
    fn key(&self, collection: &str, element: &Value) -> Option<String>;
}

/// Extracts keys from a fixed field of each element, for every
/// collection. String and number values are accepted.
pub struct FieldKeySelector {
    field: String,
}

impl FieldKeySelector {
    pub fn new(field: impl Into<String>) -> Self {
        FieldKeySelector {
            field: field.into(),
        }
    }

    /// The common `"id"` field convention.
    pub fn id() -> Self {
        Self::new("id")
    }
}

impl KeySelector for FieldKeySelector {
    fn key(&self, _collection: &str, element: &Value) -> Option<String> {
        match element.get(&self.field) {
            Some(Value::String(key)) => Some(key.clone()),
            Some(Value::Number(key)) => Some(key.to_string()),
            _ => None,
        }
    }
}

struct RemoteSubscription {
    endpoint: String,
    reference: StateReference,
    stop: Arc<AtomicBool>,
    forwarder: JoinHandle<()>,
}

/// Serves remote subscribers and writers over a [`SyncStore`].
pub struct SyncHost {
    store: Arc<SyncStore>,
    transport: Arc<dyn EndpointSender>,
    keys: Arc<dyn KeySelector>,
    subscriptions: Mutex<Vec<RemoteSubscription>>,
}

impl SyncHost {
    pub fn new(
        store: Arc<SyncStore>,
        transport: Arc<dyn EndpointSender>,
        keys: Arc<dyn KeySelector>,
    ) -> Self {
        SyncHost {
            store,
            transport,
            keys,
            subscriptions: Mutex::new(Vec::new()),
        }
    }

    /// The underlying store.
    pub fn store(&self) -> &Arc<SyncStore> {
        &self.store
    }

    /// Route an incoming wire message to its handler.
    pub fn dispatch(&self, endpoint: &str, message: WireMessage) -> Result<(), HostError> {
        match message {
            WireMessage::Subscribe(request) => self.handle_subscribe(endpoint, request),
            WireMessage::Unsubscribe(request) => self.handle_unsubscribe(endpoint, request),
            WireMessage::DataChange(request) => {
                self.handle_data_change(endpoint, request);
                Ok(())
            }
            other => {
                warn!(endpoint, message = ?other, "unexpected message on host");
                Ok(())
            }
        }
    }

    /// Attach a remote subscriber.
    ///
    /// Replies with a full-state event carrying the current projected
    /// value and version, then streams a patch event per subsequent
    /// version (an unchanged projection yields an empty patch, keeping
    /// client version tracking gapless) until unsubscribed, disconnected,
    /// or the stream completes.
    pub fn handle_subscribe(
        &self,
        endpoint: &str,
        request: SubscribeRequest,
    ) -> Result<(), HostError> {
        let (stream, inner) = self.store.resolve(&request.reference).map_err(StoreError::from)?;
        // validate the projection once so a bad reference fails the
        // request instead of the forwarder
        reduce(&stream.snapshot(), &inner).map_err(StoreError::from)?;
        let subscription = stream.subscribe().map_err(StoreError::from)?;

        let stop = Arc::new(AtomicBool::new(false));
        let forwarder = {
            let transport = Arc::clone(&self.transport);
            let endpoint = endpoint.to_string();
            let reference = inner;
            let stop = Arc::clone(&stop);
            thread::spawn(move || forward(subscription, reference, endpoint, transport, stop))
        };

        let mut subscriptions = match self.subscriptions.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        subscriptions.push(RemoteSubscription {
            endpoint: endpoint.to_string(),
            reference: request.reference,
            stop,
            forwarder,
        });
        debug!(endpoint, "remote subscriber attached");
        Ok(())
    }

    /// Detach a remote subscriber and ack.
    pub fn handle_unsubscribe(
        &self,
        endpoint: &str,
        request: UnsubscribeRequest,
    ) -> Result<(), HostError> {
        self.remove_subscriptions(|sub| {
            sub.endpoint == endpoint && sub.reference == request.reference
        });
        debug!(endpoint, "remote subscriber detached");
        self.transport.send(
            endpoint,
            WireMessage::UnsubscribeAck {
                reference: request.reference,
            },
        )?;
        Ok(())
    }

    /// Apply a remote write and respond.
    ///
    /// The response (also sent to `endpoint` as a `DataChangeAck`)
    /// carries the resulting version, a commit/fail status, and a
    /// diagnostic log. A failed write commits nothing and leaves the
    /// stream healthy.
    pub fn handle_data_change(
        &self,
        endpoint: &str,
        request: DataChangeRequest,
    ) -> DataChangeResponse {
        let response = self.apply_data_change(&request);
        if !response.is_committed() {
            warn!(endpoint, action = %request.action, log = ?response.log, "remote write failed");
        }
        if let Err(e) = self
            .transport
            .send(endpoint, WireMessage::DataChangeAck(response.clone()))
        {
            warn!(endpoint, error = %e, "failed to deliver data change response");
        }
        response
    }

    /// Drop every subscription held by a departed endpoint.
    pub fn disconnect(&self, endpoint: &str) {
        self.remove_subscriptions(|sub| sub.endpoint == endpoint);
        debug!(endpoint, "endpoint disconnected");
    }

    fn apply_data_change(&self, request: &DataChangeRequest) -> DataChangeResponse {
        let mut log = Vec::new();

        let receipt = match request.action {
            ChangeAction::Create | ChangeAction::Update => {
                match self.build_write_value(request, &mut log) {
                    Some(value) => self
                        .store
                        .update(&request.reference, value, request.options)
                        .map_err(|e| log.push(e.to_string())),
                    None => Err(()),
                }
            }
            ChangeAction::Delete => match self.build_delete_keys(request, &mut log) {
                Some(keys) => self
                    .store
                    .delete(&request.reference, keys)
                    .map_err(|e| log.push(e.to_string())),
                None => Err(()),
            },
        };

        match receipt {
            Ok(receipt) => match receipt.wait() {
                Ok(version) => {
                    log.push(format!(
                        "{} committed {} element(s)",
                        request.action,
                        request.elements.len()
                    ));
                    DataChangeResponse::committed(version, log)
                }
                Err(e) => {
                    log.push(e.to_string());
                    DataChangeResponse::failed(self.version_of(&request.reference), log)
                }
            },
            Err(()) => DataChangeResponse::failed(self.version_of(&request.reference), log),
        }
    }

    /// Build the state value a Create/Update request writes, or log why
    /// it cannot be built.
    fn build_write_value(
        &self,
        request: &DataChangeRequest,
        log: &mut Vec<String>,
    ) -> Option<StateValue> {
        match inner_reference(&request.reference) {
            StateReference::Instance { .. } | StateReference::Entity { .. } => {
                if request.elements.len() == 1 {
                    Some(StateValue::instance(request.elements[0].clone()))
                } else {
                    log.push(format!(
                        "instance write requires exactly 1 element, got {}",
                        request.elements.len()
                    ));
                    None
                }
            }
            StateReference::Collection { name } => self
                .collect_items(name, &request.elements, log)
                .map(StateValue::collection),
            StateReference::Collections { .. } => {
                let mut snapshot = WorkspaceSnapshot::new();
                for (index, element) in request.elements.iter().enumerate() {
                    let object = match element.as_object() {
                        Some(object) => object,
                        None => {
                            log.push(format!(
                                "element {} must map collection names to instance arrays",
                                index
                            ));
                            return None;
                        }
                    };
                    for (name, payload) in object {
                        let instances = match payload.as_array() {
                            Some(instances) => instances,
                            None => {
                                log.push(format!(
                                    "collection {} in element {} must be an array",
                                    name, index
                                ));
                                return None;
                            }
                        };
                        let coll = self.collect_items(name, instances, log)?;
                        snapshot = snapshot.with_collection(name.clone(), coll);
                    }
                }
                Some(StateValue::collections(snapshot))
            }
            other => {
                log.push(format!(
                    "writes through a {} reference are unsupported",
                    other.kind()
                ));
                None
            }
        }
    }

    /// Extract the keys a Delete request removes.
    fn build_delete_keys(
        &self,
        request: &DataChangeRequest,
        log: &mut Vec<String>,
    ) -> Option<Vec<String>> {
        let collection = match inner_reference(&request.reference) {
            StateReference::Collection { name } => name.as_str(),
            // the reference itself addresses the instance to remove
            StateReference::Instance { .. } | StateReference::Entity { .. } => {
                return Some(Vec::new())
            }
            other => {
                log.push(format!(
                    "deletes through a {} reference are unsupported",
                    other.kind()
                ));
                return None;
            }
        };

        let mut keys = Vec::with_capacity(request.elements.len());
        let mut complete = true;
        for (index, element) in request.elements.iter().enumerate() {
            match element {
                Value::String(key) => keys.push(key.clone()),
                other => match self.keys.key(collection, other) {
                    Some(key) => keys.push(key),
                    None => {
                        log.push(format!(
                            "element {} has no extractable key for collection {}",
                            index, collection
                        ));
                        complete = false;
                    }
                },
            }
        }
        complete.then_some(keys)
    }

    fn collect_items(
        &self,
        collection: &str,
        elements: &[Value],
        log: &mut Vec<String>,
    ) -> Option<NamedCollection> {
        let mut items = Vec::with_capacity(elements.len());
        let mut complete = true;
        for (index, element) in elements.iter().enumerate() {
            match self.keys.key(collection, element) {
                Some(key) => items.push((key, element.clone())),
                None => {
                    log.push(format!(
                        "element {} has no extractable key for collection {}",
                        index, collection
                    ));
                    complete = false;
                }
            }
        }
        complete.then(|| NamedCollection::from_items(items))
    }

    fn version_of(&self, reference: &StateReference) -> u64 {
        self.store
            .resolve(reference)
            .map(|(stream, _)| stream.version())
            .unwrap_or(0)
    }

    fn remove_subscriptions<F>(&self, matches: F)
    where
        F: Fn(&RemoteSubscription) -> bool,
    {
        let removed = {
            let mut subscriptions = match self.subscriptions.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            let mut removed = Vec::new();
            let mut index = 0;
            while index < subscriptions.len() {
                if matches(&subscriptions[index]) {
                    removed.push(subscriptions.swap_remove(index));
                } else {
                    index += 1;
                }
            }
            removed
        };

        for subscription in removed {
            subscription.stop.store(true, Ordering::SeqCst);
            let _ = subscription.forwarder.join();
        }
    }
}

impl Drop for SyncHost {
    fn drop(&mut self) {
        self.remove_subscriptions(|_| true);
    }
}

fn forward(
    subscription: Subscription,
    reference: StateReference,
    endpoint: String,
    transport: Arc<dyn EndpointSender>,
    stop: Arc<AtomicBool>,
) {
    // the current item arrives immediately: project it and open with full
    // state
    let first = match subscription.recv() {
        Some(item) => item,
        None => return,
    };
    let mut previous = match project(&first.snapshot, &reference, &endpoint) {
        Some(value) => value,
        None => return,
    };
    let opening = DataChangedEvent {
        version: first.version,
        body: ChangeBody::FullState(previous.clone()),
    };
    if transport
        .send(&endpoint, WireMessage::DataChanged(opening))
        .is_err()
    {
        warn!(endpoint = %endpoint, "endpoint unreachable at subscribe");
        return;
    }

    loop {
        if stop.load(Ordering::SeqCst) {
            return;
        }
        let item = match subscription.poll(FORWARD_POLL) {
            Ok(Some(item)) => item,
            Ok(None) => continue,
            // stream completed; the subscriber simply stops hearing from us
            Err(_) => return,
        };

        let projected = match project(&item.snapshot, &reference, &endpoint) {
            Some(value) => value,
            None => return,
        };
        // every version is forwarded, even when the projection is
        // untouched, so the client's version tracking stays gapless
        let event = DataChangedEvent {
            version: item.version,
            body: ChangeBody::Patch(patch::diff(&previous, &projected)),
        };
        if let Err(e) = transport.send(&endpoint, WireMessage::DataChanged(event)) {
            warn!(endpoint = %endpoint, error = %e, "dropping remote subscriber");
            return;
        }
        previous = projected;
    }
}

fn project(
    snapshot: &WorkspaceSnapshot,
    reference: &StateReference,
    endpoint: &str,
) -> Option<Value> {
    match reduce(snapshot, reference) {
        Ok(value) => Some(value.to_value()),
        Err(e) => {
            warn!(endpoint = %endpoint, error = %e, "projection failed, stopping forwarder");
            None
        }
    }
}

fn inner_reference(reference: &StateReference) -> &StateReference {
    match reference {
        StateReference::Partitioned { reference, .. } => reference,
        other => other,
    }
}
