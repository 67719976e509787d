mod support;

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use serde_json::json;
use workspace_sync::{
    patch, NamedCollection, StateReference, StreamConfig, StreamError, SyncStream,
    WorkspaceSnapshot,
};

fn counter_snapshot() -> WorkspaceSnapshot {
    WorkspaceSnapshot::new().with_collection(
        "counters",
        NamedCollection::from_items([("c".to_string(), json!({"value": 0}))]),
    )
}

fn increment(snapshot: &WorkspaceSnapshot) -> WorkspaceSnapshot {
    let counters = snapshot.collection("counters");
    let value = counters
        .get("c")
        .map(|v| v["value"].as_i64().unwrap_or(0))
        .unwrap_or(0);
    snapshot.with_collection("counters", counters.insert("c", json!({"value": value + 1})))
}

#[test]
fn concurrent_writers_lose_nothing_and_stay_ordered() {
    support::init_tracing();

    const WRITERS: usize = 8;
    const WRITES_PER_WRITER: usize = 25;
    let total = (WRITERS * WRITES_PER_WRITER) as i64;

    let stream = Arc::new(SyncStream::new(counter_snapshot(), StreamConfig::default()));
    let subscription = stream.subscribe().unwrap();
    assert_eq!(subscription.recv().unwrap().version, 0);

    let mut writers = Vec::new();
    for _ in 0..WRITERS {
        let stream = Arc::clone(&stream);
        writers.push(thread::spawn(move || {
            for _ in 0..WRITES_PER_WRITER {
                stream.update_wait(increment).unwrap();
            }
        }));
    }
    for writer in writers {
        writer.join().unwrap();
    }

    // every update landed: the counter equals the number of accepted calls
    let final_value = stream
        .reduce(&StateReference::entity("counters", "c"))
        .unwrap()
        .to_value();
    assert_eq!(final_value, json!({"value": total}));
    assert_eq!(stream.version(), total as u64);

    // the subscriber observed versions 1..=N strictly in order, and the
    // counter sequence 1,2,...,N - serialized, no interleaving, no loss
    for expected in 1..=total {
        let item = subscription.recv().unwrap();
        assert_eq!(item.version as i64, expected);
        let observed = item.snapshot.collection("counters").get("c").unwrap()["value"]
            .as_i64()
            .unwrap();
        assert_eq!(observed, expected);
    }

    stream.dispose();
    assert!(subscription.recv().is_none());
}

#[test]
fn patches_replay_the_full_history_exactly() {
    support::init_tracing();

    let stream = SyncStream::new(counter_snapshot(), StreamConfig::default());
    let subscription = stream.subscribe().unwrap();
    let mut replayed = subscription.recv().unwrap().snapshot.to_value();

    for _ in 0..10 {
        stream.update_wait(increment).unwrap();
    }
    stream
        .update_wait(|snapshot| {
            let counters = snapshot.collection("counters").delete(["c"]);
            snapshot.with_collection("counters", counters)
        })
        .unwrap();

    for _ in 0..11 {
        let item = subscription.recv().unwrap();
        replayed = patch::apply(&replayed, &item.patch.unwrap()).unwrap();
        assert_eq!(replayed, item.snapshot.to_value());
    }

    stream.dispose();
}

#[test]
fn admitted_writes_finish_before_disposal_completes() {
    support::init_tracing();

    let stream = SyncStream::new(counter_snapshot(), StreamConfig::default());

    const QUEUED: usize = 50;
    let mut receipts = Vec::new();
    for _ in 0..QUEUED {
        receipts.push(stream.update(increment).unwrap());
    }

    // dispose returns only after the loop has drained every admitted write
    stream.dispose();

    assert_eq!(stream.version(), QUEUED as u64);
    for receipt in receipts {
        assert!(receipt.wait().is_ok());
    }
    assert_eq!(
        stream.update(increment).unwrap_err(),
        StreamError::Disposed
    );
}

#[test]
fn disposal_completes_subscribers_without_extra_items() {
    support::init_tracing();

    let stream = SyncStream::new(counter_snapshot(), StreamConfig::default());
    let subscription = stream.subscribe().unwrap();
    assert_eq!(subscription.recv().unwrap().version, 0);

    stream.update_wait(increment).unwrap();
    stream.dispose();

    // exactly one more item (version 1), then completion - never an error
    assert_eq!(subscription.recv().unwrap().version, 1);
    assert!(subscription.recv().is_none());
    assert!(stream.subscribe().is_err());
}

#[test]
fn independent_streams_run_in_parallel() {
    support::init_tracing();

    let left = Arc::new(SyncStream::new(counter_snapshot(), StreamConfig::default()));
    let right = Arc::new(SyncStream::new(counter_snapshot(), StreamConfig::default()));

    let l = Arc::clone(&left);
    let r = Arc::clone(&right);
    let lh = thread::spawn(move || {
        for _ in 0..20 {
            l.update_wait(increment).unwrap();
        }
    });
    let rh = thread::spawn(move || {
        for _ in 0..30 {
            r.update_wait(increment).unwrap();
        }
    });
    lh.join().unwrap();
    rh.join().unwrap();

    assert_eq!(left.version(), 20);
    assert_eq!(right.version(), 30);

    left.dispose();
    right.dispose();
}

#[test]
fn bounded_blocking_queue_applies_backpressure_without_loss() {
    support::init_tracing();

    let stream = Arc::new(SyncStream::new(
        counter_snapshot(),
        StreamConfig::bounded(2),
    ));

    let mut writers = Vec::new();
    for _ in 0..4 {
        let stream = Arc::clone(&stream);
        writers.push(thread::spawn(move || {
            for _ in 0..10 {
                // may suspend at admission; never fails, never loses a write
                stream
                    .update(|snapshot| {
                        thread::sleep(Duration::from_millis(1));
                        increment(snapshot)
                    })
                    .unwrap();
            }
        }));
    }
    for writer in writers {
        writer.join().unwrap();
    }

    // wait out the tail of the queue
    let last = stream.update(increment).unwrap().wait().unwrap();
    assert_eq!(last, 41);

    stream.dispose();
}
