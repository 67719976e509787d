//! Client endpoint of the remote synchronization protocol.

use std::fmt;

use serde_json::Value;
use tracing::{debug, warn};

use crate::patch::{self, PatchError};
use crate::reference::{StateReference, UpdateOptions};

use super::{
    ChangeAction, ChangeBody, DataChangeRequest, DataChangedEvent, SubscribeRequest,
    UnsubscribeRequest, WireMessage,
};

/// Error type for client-side event application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientError {
    /// A patch arrived before any full-state event.
    NotSynced,
    /// A patch's version does not follow the locally tracked one. The
    /// local value is stale; recover by resubscribing for a fresh full
    /// state.
    VersionGap { expected: u64, got: u64 },
    /// The patch could not be applied to the local value.
    Patch(PatchError),
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClientError::NotSynced => write!(f, "patch received before full state"),
            ClientError::VersionGap { expected, got } => {
                write!(f, "version gap: expected {}, got {}", expected, got)
            }
            ClientError::Patch(e) => write!(f, "patch application failed: {}", e),
        }
    }
}

impl std::error::Error for ClientError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ClientError::Patch(e) => Some(e),
            _ => None,
        }
    }
}

impl From<PatchError> for ClientError {
    fn from(err: PatchError) -> Self {
        ClientError::Patch(err)
    }
}

/// Tracks one subscription's projected value on the client side.
///
/// Feed it every [`DataChangedEvent`] for its reference, in arrival
/// order: a full-state event (re)synchronizes wholesale, a patch event
/// must carry the next consecutive version and is applied exactly. Any
/// gap surfaces as [`ClientError::VersionGap`]; the caller resubscribes
/// and the next full-state event makes the client whole again.
///
/// ## Example
///
/// ```
/// use workspace_sync::{ChangeBody, DataChangedEvent, StateReference, SyncClient};
/// use serde_json::json;
///
/// let mut client = SyncClient::new(StateReference::collection("orders"));
///
/// client.apply(&DataChangedEvent {
///     version: 3,
///     body: ChangeBody::FullState(json!({"o-1": {"qty": 5}})),
/// }).unwrap();
///
/// assert_eq!(client.version(), 3);
/// assert_eq!(client.value(), &json!({"o-1": {"qty": 5}}));
/// ```
pub struct SyncClient {
    reference: StateReference,
    version: u64,
    value: Value,
    synced: bool,
}

impl SyncClient {
    pub fn new(reference: StateReference) -> Self {
        SyncClient {
            reference,
            version: 0,
            value: Value::Null,
            synced: false,
        }
    }

    /// The wire message that opens this subscription.
    pub fn subscribe_request(&self) -> WireMessage {
        WireMessage::Subscribe(SubscribeRequest {
            reference: self.reference.clone(),
        })
    }

    /// The wire message that closes this subscription.
    pub fn unsubscribe_request(&self) -> WireMessage {
        WireMessage::Unsubscribe(UnsubscribeRequest {
            reference: self.reference.clone(),
        })
    }

    /// A write request against this subscription's reference.
    pub fn change_request(
        &self,
        action: ChangeAction,
        elements: Vec<Value>,
        options: UpdateOptions,
    ) -> WireMessage {
        WireMessage::DataChange(DataChangeRequest {
            action,
            reference: self.reference.clone(),
            elements,
            options,
        })
    }

    /// Apply one data event and return the updated local value.
    pub fn apply(&mut self, event: &DataChangedEvent) -> Result<&Value, ClientError> {
        match &event.body {
            ChangeBody::FullState(value) => {
                self.value = value.clone();
                self.version = event.version;
                self.synced = true;
                debug!(version = event.version, "synchronized full state");
                Ok(&self.value)
            }
            ChangeBody::Patch(patch) => {
                if !self.synced {
                    return Err(ClientError::NotSynced);
                }
                let expected = self.version + 1;
                if event.version != expected {
                    warn!(
                        expected,
                        got = event.version,
                        "version gap detected, resync required"
                    );
                    return Err(ClientError::VersionGap {
                        expected,
                        got: event.version,
                    });
                }
                self.value = patch::apply(&self.value, patch)?;
                self.version = event.version;
                Ok(&self.value)
            }
        }
    }

    /// Mark the local value stale, e.g. after a transport reconnect.
    /// The next event must be a full state.
    pub fn invalidate(&mut self) {
        self.synced = false;
    }

    pub fn reference(&self) -> &StateReference {
        &self.reference
    }

    /// The version of the last applied event.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// The current projected value (`Null` before the first full state).
    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn is_synced(&self) -> bool {
        self.synced
    }
}
