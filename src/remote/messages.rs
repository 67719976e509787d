//! Wire message shapes for the remote synchronization protocol.
//!
//! These are transport-agnostic: actual delivery between named endpoints
//! is the message-routing collaborator's responsibility (see
//! [`EndpointSender`](super::EndpointSender)). Messages serialize as
//! self-describing JSON because they embed opaque instance payloads.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::patch::Patch;
use crate::reference::{StateReference, UpdateOptions};

/// Ask the host to stream the projection a reference addresses.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SubscribeRequest {
    pub reference: StateReference,
}

/// Stop a previously requested subscription.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UnsubscribeRequest {
    pub reference: StateReference,
}

/// One host-to-client data event: a full projected value on subscribe,
/// then a structural diff per subsequent version.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DataChangedEvent {
    pub version: u64,
    pub body: ChangeBody,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ChangeBody {
    FullState(Value),
    Patch(Patch),
}

/// The write verb carried by a data-change request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeAction {
    Create,
    Update,
    Delete,
}

impl std::fmt::Display for ChangeAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChangeAction::Create => write!(f, "create"),
            ChangeAction::Update => write!(f, "update"),
            ChangeAction::Delete => write!(f, "delete"),
        }
    }
}

/// A client-to-host write request.
///
/// For `Create`/`Update`, `elements` carries instance payloads (or, for a
/// collection-set reference, objects mapping collection name to an array
/// of payloads). For `Delete`, `elements` carries keys or payloads to
/// extract keys from.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DataChangeRequest {
    pub action: ChangeAction,
    pub reference: StateReference,
    pub elements: Vec<Value>,
    #[serde(default)]
    pub options: UpdateOptions,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeStatus {
    Committed,
    Failed,
}

/// The host's verdict on a write request.
///
/// A timeout waiting for this response is an unknown outcome, not a
/// failure: the response, if it arrives, reflects what actually happened.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DataChangeResponse {
    pub version: u64,
    pub status: ChangeStatus,
    pub log: Vec<String>,
}

impl DataChangeResponse {
    pub fn committed(version: u64, log: Vec<String>) -> Self {
        DataChangeResponse {
            version,
            status: ChangeStatus::Committed,
            log,
        }
    }

    pub fn failed(version: u64, log: Vec<String>) -> Self {
        DataChangeResponse {
            version,
            status: ChangeStatus::Failed,
            log,
        }
    }

    pub fn is_committed(&self) -> bool {
        self.status == ChangeStatus::Committed
    }
}

/// Envelope for everything that crosses the transport.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "message", rename_all = "snake_case")]
pub enum WireMessage {
    Subscribe(SubscribeRequest),
    Unsubscribe(UnsubscribeRequest),
    UnsubscribeAck { reference: StateReference },
    DataChanged(DataChangedEvent),
    DataChange(DataChangeRequest),
    DataChangeAck(DataChangeResponse),
}

impl WireMessage {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}
