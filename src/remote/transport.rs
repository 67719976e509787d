//! Transport seam - delivery of wire messages between named endpoints.
//!
//! The real message-routing layer (addressing, retries, hub lifecycle) is
//! an external collaborator. This crate only needs one capability from
//! it: send a [`WireMessage`] to a named endpoint. [`InMemoryHub`] is the
//! in-process implementation used by tests and single-process wiring.

use std::collections::{HashMap, VecDeque};
use std::error::Error;
use std::fmt;
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};

use super::WireMessage;

/// Error type for transport sends.
#[derive(Debug)]
pub enum TransportError {
    /// No endpoint with this name is registered/reachable.
    UnknownEndpoint(String),
    /// The endpoint exists but can no longer accept messages.
    Closed(String),
    /// Other transport-level error.
    Other(Box<dyn Error + Send + Sync>),
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportError::UnknownEndpoint(endpoint) => {
                write!(f, "unknown endpoint: {}", endpoint)
            }
            TransportError::Closed(endpoint) => write!(f, "endpoint closed: {}", endpoint),
            TransportError::Other(e) => write!(f, "transport error: {}", e),
        }
    }
}

impl Error for TransportError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            TransportError::Other(e) => Some(e.as_ref()),
            _ => None,
        }
    }
}

/// Send half of the transport collaborator.
///
/// Implementations must preserve per-endpoint send order; everything else
/// (retries, buffering, wire encoding) is theirs to decide.
pub trait EndpointSender: Send + Sync {
    fn send(&self, endpoint: &str, message: WireMessage) -> Result<(), TransportError>;
}

type Inbox = Arc<Mutex<VecDeque<WireMessage>>>;

/// In-process transport for tests and single-process scenarios.
///
/// Each registered endpoint gets its own FIFO inbox; `send` targets an
/// endpoint by name and [`Mailbox::poll`] consumes in send order.
///
/// ## Example
///
/// ```
/// use workspace_sync::{InMemoryHub, EndpointSender, WireMessage, SubscribeRequest, StateReference};
///
/// let hub = InMemoryHub::new();
/// let mailbox = hub.register("client-1");
///
/// hub.send("client-1", WireMessage::Subscribe(SubscribeRequest {
///     reference: StateReference::collection("orders"),
/// })).unwrap();
///
/// assert!(mailbox.poll(100).is_some());
/// ```
#[derive(Clone, Default)]
pub struct InMemoryHub {
    inboxes: Arc<RwLock<HashMap<String, Inbox>>>,
}

impl InMemoryHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an endpoint and hand back its mailbox.
    ///
    /// Re-registering a name returns a fresh, empty mailbox and drops the
    /// old one.
    pub fn register(&self, endpoint: &str) -> Mailbox {
        let inbox: Inbox = Arc::new(Mutex::new(VecDeque::new()));
        self.inboxes
            .write()
            .unwrap()
            .insert(endpoint.to_string(), Arc::clone(&inbox));
        Mailbox { inbox }
    }

    /// Remove an endpoint; subsequent sends to it fail.
    pub fn unregister(&self, endpoint: &str) {
        self.inboxes.write().unwrap().remove(endpoint);
    }
}

impl EndpointSender for InMemoryHub {
    fn send(&self, endpoint: &str, message: WireMessage) -> Result<(), TransportError> {
        let inboxes = self.inboxes.read().unwrap();
        match inboxes.get(endpoint) {
            Some(inbox) => {
                inbox.lock().unwrap().push_back(message);
                Ok(())
            }
            None => Err(TransportError::UnknownEndpoint(endpoint.to_string())),
        }
    }
}

/// Receive half of an [`InMemoryHub`] endpoint.
pub struct Mailbox {
    inbox: Inbox,
}

impl Mailbox {
    /// Poll for the next message, blocking until one is available or the
    /// timeout elapses.
    pub fn poll(&self, timeout_ms: u64) -> Option<WireMessage> {
        let deadline = Instant::now() + Duration::from_millis(timeout_ms);

        loop {
            if let Some(message) = self.inbox.lock().unwrap().pop_front() {
                return Some(message);
            }
            if Instant::now() >= deadline {
                return None;
            }
            // small sleep to avoid busy-waiting
            std::thread::sleep(Duration::from_millis(1));
        }
    }

    /// The next message if one is already queued.
    pub fn try_next(&self) -> Option<WireMessage> {
        self.inbox.lock().unwrap().pop_front()
    }

    /// Drain everything currently queued.
    pub fn drain(&self) -> Vec<WireMessage> {
        self.inbox.lock().unwrap().drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.inbox.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inbox.lock().unwrap().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reference::StateReference;
    use crate::remote::SubscribeRequest;

    fn subscribe(name: &str) -> WireMessage {
        WireMessage::Subscribe(SubscribeRequest {
            reference: StateReference::collection(name),
        })
    }

    #[test]
    fn delivers_in_send_order() {
        let hub = InMemoryHub::new();
        let mailbox = hub.register("a");

        hub.send("a", subscribe("first")).unwrap();
        hub.send("a", subscribe("second")).unwrap();

        assert_eq!(mailbox.poll(10), Some(subscribe("first")));
        assert_eq!(mailbox.poll(10), Some(subscribe("second")));
        assert_eq!(mailbox.poll(10), None);
    }

    #[test]
    fn unknown_endpoint_errors() {
        let hub = InMemoryHub::new();
        assert!(matches!(
            hub.send("ghost", subscribe("x")),
            Err(TransportError::UnknownEndpoint(_))
        ));
    }

    #[test]
    fn endpoints_are_isolated() {
        let hub = InMemoryHub::new();
        let a = hub.register("a");
        let b = hub.register("b");

        hub.send("a", subscribe("for-a")).unwrap();

        assert_eq!(a.poll(10), Some(subscribe("for-a")));
        assert!(b.try_next().is_none());
    }

    #[test]
    fn unregister_stops_delivery() {
        let hub = InMemoryHub::new();
        let _mailbox = hub.register("a");
        hub.unregister("a");

        assert!(hub.send("a", subscribe("x")).is_err());
    }
}
