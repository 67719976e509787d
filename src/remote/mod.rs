//! Remote synchronization protocol - snapshots and patches over a wire.
//!
//! Translates stream events to and from wire messages for subscribers and
//! writers on other processes. The handshake: a remote endpoint sends a
//! [`SubscribeRequest`] naming a [`StateReference`](crate::StateReference);
//! the host answers with a full-state event carrying the current projected
//! value and version, then streams a patch event per subsequent version
//! until the endpoint unsubscribes or disconnects. Remote writes
//! ([`DataChangeRequest`]) are enqueued on the owning stream exactly like
//! local writes - admission order is the only precedence rule - and
//! answered with a [`DataChangeResponse`].
//!
//! ## Architecture
//!
//! ```text
//! client process                      host process
//! ──────────────                      ────────────
//! SyncClient ──Subscribe────────────► SyncHost ──► SyncStore/SyncStream
//!     ▲                                  │
//!     ├──◄─ DataChanged(FullState) ──────┤  (forwarder thread per
//!     ├──◄─ DataChanged(Patch) ──────────┤   subscriber: project,
//!     │                                  │   diff, send)
//!     └──DataChange(Create/Update/..)──► │
//!         ◄──────── DataChangeAck ───────┘
//! ```
//!
//! Delivery itself rides on the external message-routing collaborator
//! behind the [`EndpointSender`] seam; [`InMemoryHub`] is the in-process
//! implementation.

mod client;
mod host;
mod messages;
mod transport;

pub use client::{ClientError, SyncClient};
pub use host::{FieldKeySelector, HostError, KeySelector, SyncHost};
pub use messages::{
    ChangeAction, ChangeBody, ChangeStatus, DataChangeRequest, DataChangeResponse,
    DataChangedEvent, SubscribeRequest, UnsubscribeRequest, WireMessage,
};
pub use transport::{EndpointSender, InMemoryHub, Mailbox, TransportError};
