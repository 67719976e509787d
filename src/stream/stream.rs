use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, SyncSender, TrySendError};
use std::sync::{Arc, Mutex, RwLock};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::debug;

use crate::model::WorkspaceSnapshot;
use crate::patch;
use crate::reference::{ReferenceError, StateReference, StateValue};

use super::{ChangeItem, OverflowPolicy, QueuePolicy, StreamConfig, StreamError};

type Mutation = Box<dyn FnOnce(&WorkspaceSnapshot) -> WorkspaceSnapshot + Send>;

enum Command {
    Apply { mutate: Mutation, done: Sender<u64> },
    Subscribe { reply: Sender<Receiver<ChangeItem>> },
    Dispose,
}

#[derive(Debug)]
enum Mailbox {
    Unbounded(Sender<Command>),
    Bounded {
        tx: SyncSender<Command>,
        on_full: OverflowPolicy,
    },
}

impl Mailbox {
    fn admit(&self, command: Command) -> Result<(), StreamError> {
        match self {
            Mailbox::Unbounded(tx) => tx.send(command).map_err(|_| StreamError::Disposed),
            Mailbox::Bounded {
                tx,
                on_full: OverflowPolicy::Block,
            } => tx.send(command).map_err(|_| StreamError::Disposed),
            Mailbox::Bounded {
                tx,
                on_full: OverflowPolicy::Reject,
            } => match tx.try_send(command) {
                Ok(()) => Ok(()),
                Err(TrySendError::Full(_)) => Err(StreamError::QueueFull),
                Err(TrySendError::Disconnected(_)) => Err(StreamError::Disposed),
            },
        }
    }

    /// Blocking send regardless of overflow policy. The `Dispose` marker
    /// must reach the loop even when a `Reject` mailbox is full.
    fn send_blocking(&self, command: Command) -> Result<(), StreamError> {
        match self {
            Mailbox::Unbounded(tx) => tx.send(command).map_err(|_| StreamError::Disposed),
            Mailbox::Bounded { tx, .. } => tx.send(command).map_err(|_| StreamError::Disposed),
        }
    }
}

/// The serialized, subscribable, versioned owner of one snapshot's
/// evolution.
///
/// See the [module docs](super) for the architecture. All methods take
/// `&self`; the stream is shared behind an `Arc` across producer threads.
#[derive(Debug)]
pub struct SyncStream {
    mailbox: Mailbox,
    /// `true` once disposed. Admission takes the read side, disposal the
    /// write side, so disposal waits out in-flight admissions and no
    /// producer can slip a write past the flag.
    admission: RwLock<bool>,
    published: Arc<RwLock<ChangeItem>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl SyncStream {
    /// Create a stream owning `initial` as version 0 and spawn its
    /// mutation loop.
    pub fn new(initial: WorkspaceSnapshot, config: StreamConfig) -> Self {
        let published = Arc::new(RwLock::new(ChangeItem::initial(initial)));
        let (mailbox, commands) = match config.queue {
            QueuePolicy::Unbounded => {
                let (tx, rx) = mpsc::channel();
                (Mailbox::Unbounded(tx), rx)
            }
            QueuePolicy::Bounded { capacity, on_full } => {
                let (tx, rx) = mpsc::sync_channel(capacity);
                (Mailbox::Bounded { tx, on_full }, rx)
            }
        };

        let loop_published = Arc::clone(&published);
        let worker = thread::spawn(move || mutation_loop(commands, loop_published));

        SyncStream {
            mailbox,
            admission: RwLock::new(false),
            published,
            worker: Mutex::new(Some(worker)),
        }
    }

    /// Submit a pure mutation function.
    ///
    /// At most one mutation is ever evaluated at a time; accepted
    /// mutations apply strictly in admission order, each producing exactly
    /// one change item with the version bumped by 1. The call returns as
    /// soon as the mutation is admitted (subject to the configured
    /// [`QueuePolicy`]); the receipt resolves to the committed version.
    pub fn update<F>(&self, mutate: F) -> Result<UpdateReceipt, StreamError>
    where
        F: FnOnce(&WorkspaceSnapshot) -> WorkspaceSnapshot + Send + 'static,
    {
        let (done, committed) = mpsc::channel();
        self.admit(Command::Apply {
            mutate: Box::new(mutate),
            done,
        })?;
        Ok(UpdateReceipt { committed })
    }

    /// Submit a mutation and wait for its committed version.
    pub fn update_wait<F>(&self, mutate: F) -> Result<u64, StreamError>
    where
        F: FnOnce(&WorkspaceSnapshot) -> WorkspaceSnapshot + Send + 'static,
    {
        self.update(mutate)?.wait()
    }

    /// Attach a subscriber.
    ///
    /// The subscription immediately carries the *current* change item -
    /// a late subscriber never sees version 0 after writes have happened,
    /// and never sees a replay of superseded versions - followed by every
    /// subsequent item in version order. Delivery goes through a
    /// per-subscriber channel, so a slow subscriber never stalls the
    /// mutation loop. Dropping the subscription unsubscribes.
    pub fn subscribe(&self) -> Result<Subscription, StreamError> {
        let (reply, handed) = mpsc::channel();
        self.admit(Command::Subscribe { reply })?;
        let items = handed.recv().map_err(|_| StreamError::Disposed)?;
        Ok(Subscription { items })
    }

    /// One-shot read of the latest snapshot's projection, without
    /// subscribing.
    pub fn reduce(&self, reference: &StateReference) -> Result<StateValue, ReferenceError> {
        crate::reference::reduce(&self.snapshot(), reference)
    }

    /// The latest published change item.
    pub fn current(&self) -> ChangeItem {
        match self.published.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// The latest published snapshot.
    pub fn snapshot(&self) -> WorkspaceSnapshot {
        self.current().snapshot
    }

    /// The latest published version.
    pub fn version(&self) -> u64 {
        self.current().version
    }

    /// Dispose the stream. Idempotent.
    ///
    /// Stops admissions (subsequent `update`/`subscribe` calls fail with
    /// [`StreamError::Disposed`]), lets every already-admitted mutation
    /// finish and publish, then completes all subscriptions. Returns once
    /// the mutation loop has exited.
    pub fn dispose(&self) {
        {
            let mut disposed = match self.admission.write() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            if *disposed {
                return;
            }
            *disposed = true;
            let _ = self.mailbox.send_blocking(Command::Dispose);
        }

        let worker = match self.worker.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(worker) = worker {
            let _ = worker.join();
        }
    }

    fn admit(&self, command: Command) -> Result<(), StreamError> {
        let disposed = self
            .admission
            .read()
            .map_err(|_| StreamError::LockPoisoned("admission"))?;
        if *disposed {
            return Err(StreamError::Disposed);
        }
        self.mailbox.admit(command)
    }
}

impl Drop for SyncStream {
    fn drop(&mut self) {
        self.dispose();
    }
}

/// Resolves to the committed version of an admitted mutation.
#[derive(Debug)]
pub struct UpdateReceipt {
    committed: Receiver<u64>,
}

impl UpdateReceipt {
    /// Wait for the mutation to commit.
    pub fn wait(self) -> Result<u64, StreamError> {
        self.committed.recv().map_err(|_| StreamError::Disposed)
    }

    /// Wait for the mutation to commit, up to `timeout`.
    ///
    /// A timeout means the outcome is unknown: the write is still queued
    /// and may commit after this call returns.
    pub fn wait_timeout(self, timeout: Duration) -> Result<u64, StreamError> {
        self.committed.recv_timeout(timeout).map_err(|e| match e {
            RecvTimeoutError::Timeout => StreamError::Timeout,
            RecvTimeoutError::Disconnected => StreamError::Disposed,
        })
    }
}

/// A push sequence of [`ChangeItem`]s from one stream.
///
/// `recv` returns `None` once the stream is disposed - completion, not an
/// error.
#[derive(Debug)]
pub struct Subscription {
    items: Receiver<ChangeItem>,
}

impl Subscription {
    /// Block until the next change item, or `None` on completion.
    pub fn recv(&self) -> Option<ChangeItem> {
        self.items.recv().ok()
    }

    /// The next change item if one is already queued.
    pub fn try_recv(&self) -> Option<ChangeItem> {
        self.items.try_recv().ok()
    }

    /// Block up to `timeout` for the next change item.
    pub fn recv_timeout(&self, timeout: Duration) -> Option<ChangeItem> {
        self.items.recv_timeout(timeout).ok()
    }

    /// Like `recv_timeout`, but distinguishes an elapsed timeout
    /// (`Ok(None)`) from stream completion (`Err(Disposed)`).
    pub fn poll(&self, timeout: Duration) -> Result<Option<ChangeItem>, StreamError> {
        match self.items.recv_timeout(timeout) {
            Ok(item) => Ok(Some(item)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(StreamError::Disposed),
        }
    }

    /// Blocking iterator over change items until completion.
    pub fn iter(&self) -> impl Iterator<Item = ChangeItem> + '_ {
        self.items.iter()
    }
}

impl IntoIterator for Subscription {
    type Item = ChangeItem;
    type IntoIter = mpsc::IntoIter<ChangeItem>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}

fn mutation_loop(commands: Receiver<Command>, published: Arc<RwLock<ChangeItem>>) {
    let mut current = match published.read() {
        Ok(guard) => guard.clone(),
        Err(poisoned) => poisoned.into_inner().clone(),
    };
    let mut subscribers: Vec<Sender<ChangeItem>> = Vec::new();

    while let Ok(command) = commands.recv() {
        match command {
            Command::Apply { mutate, done } => {
                apply(&mut current, &mut subscribers, &published, mutate, done);
            }
            Command::Subscribe { reply } => {
                let (tx, rx) = mpsc::channel();
                // current item first - no missed history for late joiners
                let _ = tx.send(current.clone());
                subscribers.push(tx);
                let _ = reply.send(rx);
                debug!(
                    version = current.version,
                    subscribers = subscribers.len(),
                    "subscriber attached"
                );
            }
            Command::Dispose => {
                // Admissions are fenced off by now; drain what was already
                // accepted so no admitted write is ever lost.
                while let Ok(command) = commands.try_recv() {
                    if let Command::Apply { mutate, done } = command {
                        apply(&mut current, &mut subscribers, &published, mutate, done);
                    }
                }
                break;
            }
        }
    }
    // dropping the senders completes every subscription
    debug!(version = current.version, "mutation loop stopped");
}

fn apply(
    current: &mut ChangeItem,
    subscribers: &mut Vec<Sender<ChangeItem>>,
    published: &RwLock<ChangeItem>,
    mutate: Mutation,
    done: Sender<u64>,
) {
    let next_snapshot = mutate(&current.snapshot);
    let item = ChangeItem {
        version: current.version + 1,
        patch: Some(patch::snapshot_diff(&current.snapshot, &next_snapshot)),
        snapshot: next_snapshot,
    };

    *current = item.clone();
    match published.write() {
        Ok(mut guard) => *guard = item.clone(),
        Err(poisoned) => *poisoned.into_inner() = item.clone(),
    }

    let before = subscribers.len();
    subscribers.retain(|tx| tx.send(item.clone()).is_ok());
    if subscribers.len() < before {
        debug!(
            dropped = before - subscribers.len(),
            "pruned disconnected subscribers"
        );
    }

    let _ = done.send(item.version);
}
