//! Distributed, reactive state synchronization.
//!
//! A host process owns authoritative, immutable snapshots of application
//! state. Writers - local callers and remote endpoints alike - are
//! serialized into a single, monotonically versioned stream of changes;
//! subscribers receive an initial full value followed by incremental
//! diffs, locally as [`ChangeItem`]s and remotely as full-state/patch
//! wire events.
//!
//! The layers, leaves first:
//!
//! - [`model`]: [`NamedCollection`] and [`WorkspaceSnapshot`], the pure
//!   copy-on-write data model.
//! - [`reference`]: [`StateReference`] and the pure read/write algebra
//!   ([`reduce`]/[`update`]/[`merge`]) over snapshots.
//! - [`patch`]: structural diffs with exact application.
//! - [`stream`]: [`SyncStream`], the single-consumer mutation mailbox
//!   that serializes concurrent writers and fans out versioned changes.
//! - [`store`]: [`SyncStore`], the outer API routing references to the
//!   default or a partition's stream.
//! - [`remote`]: the wire protocol - [`SyncHost`], [`SyncClient`], and
//!   the [`EndpointSender`] transport seam.

pub mod model;
pub mod patch;
pub mod reference;
pub mod remote;
pub mod store;
pub mod stream;

pub use model::{ModelError, NamedCollection, WorkspaceSnapshot};
pub use patch::{Patch, PatchError, PatchOp};
pub use reference::{
    merge, reduce, update, ReferenceError, StateReference, StateValue, UpdateOptions,
};
pub use remote::{
    ChangeAction, ChangeBody, ChangeStatus, ClientError, DataChangeRequest, DataChangeResponse,
    DataChangedEvent, EndpointSender, FieldKeySelector, HostError, InMemoryHub, KeySelector,
    Mailbox, SubscribeRequest, SyncClient, SyncHost, TransportError, UnsubscribeRequest,
    WireMessage,
};
pub use store::{StoreError, SyncStore};
pub use stream::{
    ChangeItem, OverflowPolicy, QueuePolicy, StreamConfig, StreamError, Subscription, SyncStream,
    UpdateReceipt,
};
