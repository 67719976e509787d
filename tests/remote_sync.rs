mod support;

use std::sync::Arc;

use serde_json::json;
use workspace_sync::{
    ChangeAction, ChangeStatus, ClientError, DataChangeRequest, DataChangedEvent,
    FieldKeySelector, InMemoryHub, Mailbox, StateReference, StreamConfig, SubscribeRequest,
    SyncClient, SyncHost, SyncStore, UnsubscribeRequest, UpdateOptions, WireMessage,
};

fn setup() -> (InMemoryHub, Arc<SyncStore>, SyncHost) {
    support::init_tracing();
    let hub = InMemoryHub::new();
    let store = Arc::new(SyncStore::new(StreamConfig::default()));
    let host = SyncHost::new(
        Arc::clone(&store),
        Arc::new(hub.clone()),
        Arc::new(FieldKeySelector::id()),
    );
    (hub, store, host)
}

/// Wait for the next data event on a mailbox, skipping anything else.
fn next_data_changed(mailbox: &Mailbox) -> DataChangedEvent {
    loop {
        match mailbox.poll(2000) {
            Some(WireMessage::DataChanged(event)) => return event,
            Some(_) => continue,
            None => panic!("timed out waiting for a data event"),
        }
    }
}

fn update_request(reference: StateReference, elements: Vec<serde_json::Value>) -> DataChangeRequest {
    DataChangeRequest {
        action: ChangeAction::Update,
        reference,
        elements,
        options: UpdateOptions::default(),
    }
}

#[test]
fn full_state_then_patches_reproduce_the_host_projection() {
    let (hub, store, host) = setup();
    let client_box = hub.register("client-1");
    let _writer_box = hub.register("writer-1");

    let reference = StateReference::collections(["orders", "fills"]);
    host.handle_subscribe(
        "client-1",
        SubscribeRequest {
            reference: reference.clone(),
        },
    )
    .unwrap();

    let mut client = SyncClient::new(reference.clone());

    // handshake: full state at the current version
    let opening = next_data_changed(&client_box);
    client.apply(&opening).unwrap();
    assert_eq!(client.version(), 0);
    assert_eq!(client.value(), &json!({}));

    // a remote write lands on the host and comes back as a patch
    let response = host.handle_data_change(
        "writer-1",
        update_request(
            StateReference::collection("orders"),
            vec![
                support::order("o-1", "ACME", 10),
                support::order("o-2", "INIT", 4),
            ],
        ),
    );
    assert_eq!(response.status, ChangeStatus::Committed);
    assert_eq!(response.version, 1);

    client.apply(&next_data_changed(&client_box)).unwrap();
    assert_eq!(client.version(), 1);
    assert_eq!(
        client.value(),
        &store.reduce(&reference).unwrap().to_value()
    );

    // a write to a projected sibling collection
    host.handle_data_change(
        "writer-1",
        update_request(
            StateReference::collection("fills"),
            vec![support::fill("f-1", "o-1", 99.5)],
        ),
    );
    client.apply(&next_data_changed(&client_box)).unwrap();
    assert_eq!(client.version(), 2);
    assert_eq!(
        client.value(),
        &store.reduce(&reference).unwrap().to_value()
    );

    // a write outside the projection still arrives, as an empty patch,
    // so version tracking stays gapless
    host.handle_data_change(
        "writer-1",
        update_request(
            StateReference::collection("positions"),
            vec![json!({"id": "p-1"})],
        ),
    );
    let outside = next_data_changed(&client_box);
    client.apply(&outside).unwrap();
    assert_eq!(client.version(), 3);
    assert_eq!(
        client.value(),
        &store.reduce(&reference).unwrap().to_value()
    );

    store.dispose();
}

#[test]
fn entity_subscription_replicates_a_single_instance() {
    let (hub, store, host) = setup();
    let client_box = hub.register("client-1");
    let _writer_box = hub.register("writer-1");

    let reference = StateReference::entity("orders", "o-1");
    host.handle_subscribe(
        "client-1",
        SubscribeRequest {
            reference: reference.clone(),
        },
    )
    .unwrap();

    let mut client = SyncClient::new(reference.clone());
    client.apply(&next_data_changed(&client_box)).unwrap();
    // absent instance projects to null
    assert_eq!(client.value(), &json!(null));

    host.handle_data_change(
        "writer-1",
        update_request(reference.clone(), vec![support::order("o-1", "ACME", 1)]),
    );
    client.apply(&next_data_changed(&client_box)).unwrap();
    assert_eq!(client.value(), &support::order("o-1", "ACME", 1));

    store.dispose();
}

#[test]
fn failed_write_commits_nothing_and_reports_a_log() {
    let (hub, store, host) = setup();
    let _writer_box = hub.register("writer-1");

    let response = host.handle_data_change(
        "writer-1",
        update_request(
            StateReference::collection("orders"),
            // second element has no extractable key
            vec![support::order("o-1", "ACME", 1), json!({"qty": 2})],
        ),
    );

    assert_eq!(response.status, ChangeStatus::Failed);
    assert_eq!(response.version, 0);
    assert!(!response.log.is_empty());

    // the stream is untouched and healthy
    assert_eq!(store.default_stream().version(), 0);
    let retry = host.handle_data_change(
        "writer-1",
        update_request(
            StateReference::collection("orders"),
            vec![support::order("o-1", "ACME", 1)],
        ),
    );
    assert_eq!(retry.status, ChangeStatus::Committed);
    assert_eq!(retry.version, 1);

    store.dispose();
}

#[test]
fn deleting_an_absent_key_commits_a_noop_version() {
    let (hub, store, host) = setup();
    let _writer_box = hub.register("writer-1");

    let response = host.handle_data_change(
        "writer-1",
        DataChangeRequest {
            action: ChangeAction::Delete,
            reference: StateReference::collection("orders"),
            elements: vec![json!("never-existed")],
            options: UpdateOptions::default(),
        },
    );

    assert_eq!(response.status, ChangeStatus::Committed);
    assert_eq!(response.version, 1);
    assert!(store.default_stream().snapshot().collection("orders").is_empty());

    store.dispose();
}

#[test]
fn snapshot_option_replaces_wholesale_over_the_wire() {
    let (hub, store, host) = setup();
    let _writer_box = hub.register("writer-1");
    let orders = StateReference::collection("orders");

    host.handle_data_change(
        "writer-1",
        update_request(
            orders.clone(),
            vec![
                support::order("o-1", "ACME", 1),
                support::order("o-2", "INIT", 2),
            ],
        ),
    );

    host.handle_data_change(
        "writer-1",
        DataChangeRequest {
            action: ChangeAction::Update,
            reference: orders.clone(),
            elements: vec![support::order("o-3", "NEWCO", 3)],
            options: UpdateOptions::snapshot_replace(),
        },
    );

    let remaining = store.default_stream().snapshot().collection("orders");
    assert_eq!(remaining.keys().collect::<Vec<_>>(), vec!["o-3"]);

    store.dispose();
}

#[test]
fn unsubscribe_acks_and_stops_the_event_flow() {
    let (hub, store, host) = setup();
    let client_box = hub.register("client-1");
    let _writer_box = hub.register("writer-1");

    let reference = StateReference::collection("orders");
    host.handle_subscribe(
        "client-1",
        SubscribeRequest {
            reference: reference.clone(),
        },
    )
    .unwrap();
    let _ = next_data_changed(&client_box); // consume the full state

    host.handle_unsubscribe(
        "client-1",
        UnsubscribeRequest {
            reference: reference.clone(),
        },
    )
    .unwrap();

    host.handle_data_change(
        "writer-1",
        update_request(reference, vec![support::order("o-1", "ACME", 1)]),
    );

    // the ack is the last thing the client hears
    match client_box.poll(500) {
        Some(WireMessage::UnsubscribeAck { .. }) => {}
        other => panic!("expected unsubscribe ack, got {:?}", other),
    }
    assert!(client_box.poll(200).is_none());

    store.dispose();
}

#[test]
fn version_gap_forces_a_full_resync() {
    let (hub, store, host) = setup();
    let client_box = hub.register("client-1");
    let _writer_box = hub.register("writer-1");

    let reference = StateReference::collection("orders");
    host.handle_subscribe(
        "client-1",
        SubscribeRequest {
            reference: reference.clone(),
        },
    )
    .unwrap();

    let mut client = SyncClient::new(reference.clone());
    client.apply(&next_data_changed(&client_box)).unwrap();

    host.handle_data_change(
        "writer-1",
        update_request(reference.clone(), vec![support::order("o-1", "ACME", 1)]),
    );
    host.handle_data_change(
        "writer-1",
        update_request(reference.clone(), vec![support::order("o-2", "INIT", 2)]),
    );

    // drop the first patch on the floor; applying the second one exposes
    // the gap instead of silently corrupting local state
    let _lost = next_data_changed(&client_box);
    let gapped = next_data_changed(&client_box);
    assert_eq!(
        client.apply(&gapped).unwrap_err(),
        ClientError::VersionGap {
            expected: 1,
            got: 2
        }
    );

    // recovery: resubscribe for a fresh full state
    host.handle_unsubscribe(
        "client-1",
        UnsubscribeRequest {
            reference: reference.clone(),
        },
    )
    .unwrap();
    host.handle_subscribe(
        "client-1",
        SubscribeRequest {
            reference: reference.clone(),
        },
    )
    .unwrap();

    loop {
        let event = next_data_changed(&client_box);
        if matches!(event.body, workspace_sync::ChangeBody::FullState(_)) {
            client.apply(&event).unwrap();
            break;
        }
    }
    assert_eq!(client.version(), 2);
    assert_eq!(
        client.value(),
        &store.reduce(&reference).unwrap().to_value()
    );

    store.dispose();
}

#[test]
fn partitioned_subscriptions_track_their_own_stream() {
    let (hub, store, host) = setup();
    let client_box = hub.register("client-1");
    let _writer_box = hub.register("writer-1");

    let emea_orders =
        StateReference::partitioned("emea", StateReference::collection("orders"));
    host.handle_subscribe(
        "client-1",
        SubscribeRequest {
            reference: emea_orders.clone(),
        },
    )
    .unwrap();

    let mut client = SyncClient::new(emea_orders.clone());
    client.apply(&next_data_changed(&client_box)).unwrap();

    // a write to the default stream is invisible to the partition
    host.handle_data_change(
        "writer-1",
        update_request(
            StateReference::collection("orders"),
            vec![support::order("o-default", "ACME", 1)],
        ),
    );
    assert!(client_box.poll(200).is_none());

    // a write to the partition flows through
    let response = host.handle_data_change(
        "writer-1",
        update_request(emea_orders.clone(), vec![support::order("o-emea", "ACME", 2)]),
    );
    assert_eq!(response.version, 1);

    client.apply(&next_data_changed(&client_box)).unwrap();
    assert_eq!(client.version(), 1);
    assert_eq!(
        client.value(),
        &store.reduce(&emea_orders).unwrap().to_value()
    );

    store.dispose();
}

#[test]
fn two_subscribers_get_their_own_projections() {
    let (hub, store, host) = setup();
    let orders_box = hub.register("orders-client");
    let all_box = hub.register("all-client");
    let _writer_box = hub.register("writer-1");

    let orders_ref = StateReference::collection("orders");
    let all_ref = StateReference::collections(["orders", "fills"]);

    host.handle_subscribe(
        "orders-client",
        SubscribeRequest {
            reference: orders_ref.clone(),
        },
    )
    .unwrap();
    host.handle_subscribe(
        "all-client",
        SubscribeRequest {
            reference: all_ref.clone(),
        },
    )
    .unwrap();

    let mut orders_client = SyncClient::new(orders_ref.clone());
    let mut all_client = SyncClient::new(all_ref.clone());
    orders_client
        .apply(&next_data_changed(&orders_box))
        .unwrap();
    all_client.apply(&next_data_changed(&all_box)).unwrap();

    host.handle_data_change(
        "writer-1",
        update_request(orders_ref.clone(), vec![support::order("o-1", "ACME", 1)]),
    );

    orders_client
        .apply(&next_data_changed(&orders_box))
        .unwrap();
    all_client.apply(&next_data_changed(&all_box)).unwrap();

    assert_eq!(
        orders_client.value(),
        &store.reduce(&orders_ref).unwrap().to_value()
    );
    assert_eq!(
        all_client.value(),
        &store.reduce(&all_ref).unwrap().to_value()
    );
    assert_ne!(orders_client.value(), all_client.value());

    store.dispose();
}
