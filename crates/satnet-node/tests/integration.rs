//! Node behavior over mock transports

use std::sync::Arc;
use std::time::Duration;

use satnet_core::{
    Bundle, BundleError, BundleLimits, MockTransport, MockTransportBuilder, Neighbor, NeighborId,
    NeighborUpdate, Priority, Transport, decode, encode,
};
use satnet_node::{ChannelContactFeed, DtnNode, IngressOutcome, NodeConfig, NodeError};
use satnet_routing::{ContactGraphRouter, StaticRouter};
use satnet_storage::{BundleFilter, BundleStatus, RedbBundleStore, RedbStoreConfig};
use tokio_test::{assert_err, assert_ok};

const TTL: Duration = Duration::from_secs(3600);

fn neighbor(id: &str, eid: &str) -> NeighborUpdate {
    NeighborUpdate::from(&Neighbor::new(id, eid))
}

/// Earth ground station wired to `relays`, routing with the contact-graph router
fn earth_node(relays: &[&str]) -> (DtnNode, Arc<MockTransport>, Vec<Arc<MockTransport>>) {
    satnet_logging::init_testing();

    let earth = Arc::new(MockTransport::new("earth-gs"));
    let peers: Vec<_> = relays
        .iter()
        .map(|id| {
            let peer = Arc::new(MockTransport::new(*id));
            earth.connect_to(NeighborId::new(*id), peer.inbox_sender());
            peer.connect_to(NeighborId::new("earth-gs"), earth.inbox_sender());
            peer
        })
        .collect();

    let node = DtnNode::with_memory_store(
        NodeConfig::testing("earth-gs", "dtn://earth/gs"),
        Arc::new(ContactGraphRouter::new()),
        earth.clone(),
    );
    (node, earth, peers)
}

#[tokio::test]
async fn test_mars_earth_scenario() {
    let (node, _earth, relays) = earth_node(&["relay-1", "relay-2"]);
    node.update_neighbor(NeighborUpdate::from(
        &Neighbor::new("relay-1", "dtn://mars")
            .with_link_quality(0.9)
            .with_bandwidth(1_000_000)
            .with_battery(0.8),
    ));
    node.update_neighbor(NeighborUpdate::from(
        &Neighbor::new("relay-2", "dtn://venus")
            .with_link_quality(0.5)
            .with_latency(Duration::from_secs(10)),
    ));

    let id = node
        .submit("dtn://mars/rover", b"drive 10m".to_vec(), Priority::Expedited, TTL)
        .await
        .unwrap();

    let report = node.run_egress_cycle().await.unwrap();
    assert_eq!(report.forwarded, vec![(id, NeighborId::new("relay-1"))]);

    let (from, data) = relays[0].recv().await.unwrap();
    assert_eq!(from.as_str(), "earth-gs");
    let received = decode(&data).unwrap();
    assert_eq!(received.id, id);
    assert_eq!(received.hop_count, 1);
    assert_eq!(received.previous_node.unwrap().as_str(), "dtn://earth/gs");
    assert_eq!(relays[1].sent_count(), 0);

    let record = node.store().get(&id).await.unwrap();
    assert_eq!(record.status, BundleStatus::Delivered);
    assert_eq!(record.bundle.hop_count, 0);
}

#[tokio::test]
async fn test_one_cycle_routes_mars_bound_and_holds_earth_bound() {
    let (node, earth, relays) = earth_node(&["relay-1"]);
    node.update_neighbor(NeighborUpdate::from(
        &Neighbor::new("relay-1", "dtn://mars")
            .with_link_quality(0.9)
            .with_battery(0.5),
    ));

    let a = node
        .submit("dtn://mars/rover", b"drive 10m".to_vec(), Priority::Expedited, TTL)
        .await
        .unwrap();
    let b = node
        .submit("dtn://earth/jpl", b"soil sample".to_vec(), Priority::Bulk, TTL)
        .await
        .unwrap();

    let report = node.run_egress_cycle().await.unwrap();
    assert_eq!(report.forwarded, vec![(a, NeighborId::new("relay-1"))]);
    assert_eq!(report.no_route, vec![b]);

    let (_, data) = relays[0].recv().await.unwrap();
    assert_eq!(decode(&data).unwrap().id, a);
    assert_eq!(earth.sent_count(), 1);

    assert_eq!(node.store().get(&a).await.unwrap().status, BundleStatus::Delivered);
    assert_eq!(node.store().get(&b).await.unwrap().status, BundleStatus::Pending);
}

#[tokio::test]
async fn test_bundle_for_local_eid_is_delivered() {
    let (node, _earth, _relays) = earth_node(&[]);
    let mut deliveries = node.subscribe_deliveries();

    let bundle = Bundle::new("dtn://mars/rover", "dtn://earth/gs", b"image".to_vec(), Priority::Normal, TTL);
    let bytes = encode(&bundle).unwrap();
    let from = NeighborId::new("relay-1");

    assert_eq!(node.ingest(&from, &bytes).await, IngressOutcome::DeliveredLocally);
    let delivered = deliveries.recv().await.unwrap();
    assert_eq!(delivered.id, bundle.id);
    assert_eq!(delivered.payload, b"image");

    assert_eq!(node.ingest(&from, &bytes).await, IngressOutcome::Duplicate);

    let stats = node.stats().await.unwrap();
    assert_eq!(stats.delivered, 1);
    assert_eq!(stats.counters.received, 2);
    assert_eq!(stats.counters.delivered_locally, 1);
    assert_eq!(stats.counters.duplicates, 1);
}

#[tokio::test]
async fn test_malformed_and_invalid_bundles_are_dropped() {
    satnet_logging::init_testing();
    let transport = Arc::new(MockTransport::new("earth-gs"));
    let config = NodeConfig::testing("earth-gs", "dtn://earth/gs")
        .with_limits(BundleLimits::default().with_max_payload_size(8));
    let node = DtnNode::with_memory_store(config, Arc::new(ContactGraphRouter::new()), transport);
    let from = NeighborId::new("relay-1");

    let outcome = node.ingest(&from, b"not a bundle").await;
    assert!(matches!(outcome, IngressOutcome::Malformed(_)));

    let oversized = Bundle::new("dtn://mars", "dtn://earth/jpl", vec![0u8; 64], Priority::Bulk, TTL);
    let outcome = node.ingest(&from, &encode(&oversized).unwrap()).await;
    assert_eq!(
        outcome,
        IngressOutcome::Rejected(BundleError::SizeExceedsMax { size: 64, max: 8 })
    );

    let stats = node.stats().await.unwrap();
    assert_eq!(stats.pending, 0);
    assert_eq!(stats.counters.dropped_malformed, 1);
    assert_eq!(stats.counters.rejected_invalid, 1);
}

#[tokio::test]
async fn test_submit_rejects_invalid_bundle() {
    let (node, _earth, _relays) = earth_node(&[]);
    let result = node.submit("", b"x".to_vec(), Priority::Normal, TTL).await;
    assert!(matches!(result, Err(NodeError::Bundle(BundleError::EmptyDestination))));
}

#[tokio::test]
async fn test_send_failure_keeps_bundle_pending() {
    let (node, earth, _relays) = earth_node(&["relay-1"]);
    node.update_neighbor(neighbor("relay-1", "dtn://mars"));
    earth.fail_sends_to(NeighborId::new("relay-1"));

    let id = node
        .submit("dtn://mars/rover", b"ping".to_vec(), Priority::Normal, TTL)
        .await
        .unwrap();

    let report = node.run_egress_cycle().await.unwrap();
    assert_eq!(report.send_failures, vec![id]);
    assert_eq!(node.store().get(&id).await.unwrap().status, BundleStatus::Pending);

    earth.clear_failures(&NeighborId::new("relay-1"));
    let report = node.run_egress_cycle().await.unwrap();
    assert_eq!(report.forwarded.len(), 1);
    assert_eq!(node.store().get(&id).await.unwrap().status, BundleStatus::Delivered);

    let counters = node.stats().await.unwrap().counters;
    assert_eq!(counters.send_failures, 1);
    assert_eq!(counters.forwarded, 1);
}

#[tokio::test]
async fn test_send_timeout_keeps_bundle_pending() {
    satnet_logging::init_testing();
    let (earth, relay) = MockTransportBuilder::new()
        .send_delay(Duration::from_millis(500))
        .create_connected_pair(NeighborId::new("earth-gs"), NeighborId::new("relay-1"));
    let earth = Arc::new(earth);
    let config = NodeConfig::testing("earth-gs", "dtn://earth/gs")
        .with_send_timeout(Duration::from_millis(20));
    let node = DtnNode::with_memory_store(config, Arc::new(ContactGraphRouter::new()), earth.clone());
    node.update_neighbor(neighbor("relay-1", "dtn://mars"));

    let id = node
        .submit("dtn://mars/rover", b"ping".to_vec(), Priority::Normal, TTL)
        .await
        .unwrap();

    let report = node.run_egress_cycle().await.unwrap();
    assert_eq!(report.send_failures, vec![id]);
    assert!(report.forwarded.is_empty());
    assert_eq!(node.store().get(&id).await.unwrap().status, BundleStatus::Pending);
    assert_eq!(earth.sent_count(), 0);
    assert_eq!(node.stats().await.unwrap().counters.send_failures, 1);

    earth.set_send_delay(Duration::ZERO);
    let report = node.run_egress_cycle().await.unwrap();
    assert_eq!(report.forwarded, vec![(id, NeighborId::new("relay-1"))]);
    let (_, data) = relay.recv().await.unwrap();
    assert_eq!(decode(&data).unwrap().id, id);
}

#[tokio::test]
async fn test_bundle_at_hop_limit_is_failed() {
    let (node, earth, _relays) = earth_node(&["relay-1"]);
    node.update_neighbor(neighbor("relay-1", "dtn://mars"));

    let mut bundle = Bundle::new("dtn://venus", "dtn://mars/rover", b"old".to_vec(), Priority::Normal, TTL);
    bundle.hop_count = 255;
    let outcome = node
        .ingest(&NeighborId::new("relay-1"), &encode(&bundle).unwrap())
        .await;
    assert_eq!(outcome, IngressOutcome::Stored);

    let report = node.run_egress_cycle().await.unwrap();
    assert_eq!(report.failed, vec![bundle.id]);
    assert_eq!(earth.sent_count(), 0);

    let stats = node.stats().await.unwrap();
    assert_eq!(stats.failed, 1);
    assert_eq!(stats.counters.hop_limit_failures, 1);
}

#[tokio::test]
async fn test_no_neighbors_leaves_bundle_pending() {
    let (node, earth, _relays) = earth_node(&[]);
    let id = node
        .submit("dtn://mars/rover", b"wait".to_vec(), Priority::Bulk, TTL)
        .await
        .unwrap();

    let report = node.run_egress_cycle().await.unwrap();
    assert_eq!(report.no_route, vec![id]);
    assert_eq!(earth.sent_count(), 0);

    let pending = node.store().list(&BundleFilter::pending()).await.unwrap();
    assert_eq!(pending.len(), 1);
}

#[tokio::test]
async fn test_expedited_forwarded_first() {
    let (node, _earth, _relays) = earth_node(&["relay-1"]);
    node.update_neighbor(neighbor("relay-1", "dtn://mars"));

    let bulk = node.submit("dtn://mars/a", vec![1], Priority::Bulk, TTL).await.unwrap();
    let normal = node.submit("dtn://mars/b", vec![2], Priority::Normal, TTL).await.unwrap();
    let urgent = node.submit("dtn://mars/c", vec![3], Priority::Expedited, TTL).await.unwrap();

    let report = node.run_egress_cycle().await.unwrap();
    let order: Vec<_> = report.forwarded.iter().map(|(id, _)| *id).collect();
    assert_eq!(order, vec![urgent, normal, bulk]);
}

#[tokio::test]
async fn test_expired_bundle_is_purged() {
    let (node, _earth, _relays) = earth_node(&[]);
    node.submit("dtn://mars/rover", vec![0], Priority::Normal, Duration::from_millis(20))
        .await
        .unwrap();
    node.submit("dtn://mars/rover", vec![1], Priority::Normal, TTL)
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(60)).await;

    assert_eq!(node.purge_expired().await.unwrap(), 1);
    let stats = node.stats().await.unwrap();
    assert_eq!(stats.pending, 1);
    assert_eq!(stats.counters.expired_purged, 1);
}

#[tokio::test]
async fn test_liveness_sweep_marks_quiet_neighbor_inactive() {
    satnet_logging::init_testing();
    let transport = Arc::new(MockTransport::new("earth-gs"));
    let config =
        NodeConfig::testing("earth-gs", "dtn://earth/gs").with_liveness_timeout(Duration::from_millis(10));
    let node = DtnNode::with_memory_store(config, Arc::new(ContactGraphRouter::new()), transport);

    node.update_neighbor(neighbor("relay-1", "dtn://mars"));
    assert_eq!(node.neighbors().active().count(), 1);

    tokio::time::sleep(Duration::from_millis(40)).await;
    assert_eq!(node.sweep_liveness(), 1);

    let snapshot = node.neighbors();
    assert_eq!(snapshot.len(), 1);
    assert_eq!(snapshot.active().count(), 0);

    let stats = node.stats().await.unwrap();
    assert_eq!(stats.neighbor_count, 1);
    assert_eq!(stats.active_neighbor_count, 0);
}

#[tokio::test]
async fn test_start_stop_lifecycle() {
    let (node, _earth, _relays) = earth_node(&[]);
    assert!(!node.is_started());

    assert_ok!(node.start().await);
    assert!(node.is_started());
    let err = assert_err!(node.start().await);
    assert!(matches!(err, NodeError::AlreadyStarted));

    assert_ok!(node.stop().await);
    assert!(!node.is_started());
    assert_ok!(node.stop().await);
}

#[tokio::test]
async fn test_invalid_config_refuses_to_start() {
    satnet_logging::init_testing();
    let transport = Arc::new(MockTransport::new("n"));
    let config = NodeConfig::testing("n", "");
    let node = DtnNode::with_memory_store(config, Arc::new(ContactGraphRouter::new()), transport);

    assert!(matches!(node.start().await, Err(NodeError::Config(_))));
    assert!(!node.is_started());
}

#[tokio::test]
async fn test_end_to_end_between_two_nodes() {
    satnet_logging::init_testing();
    let (t_earth, t_mars) = MockTransportBuilder::new()
        .create_connected_pair(NeighborId::new("earth-gs"), NeighborId::new("mars-gw"));

    let earth = DtnNode::with_memory_store(
        NodeConfig::testing("earth-gs", "dtn://earth/gs"),
        Arc::new(StaticRouter::new().with_route("dtn://mars", "mars-gw")),
        Arc::new(t_earth),
    );
    let mars = DtnNode::with_memory_store(
        NodeConfig::testing("mars-gw", "dtn://mars/rover"),
        Arc::new(StaticRouter::new()),
        Arc::new(t_mars),
    );

    let (feed_tx, feed) = ChannelContactFeed::channel(8);
    let earth = earth.with_contact_feed(Box::new(feed));
    let mut deliveries = mars.subscribe_deliveries();

    earth.start().await.unwrap();
    mars.start().await.unwrap();

    let id = earth
        .submit("dtn://mars/rover", b"hello mars".to_vec(), Priority::Expedited, TTL)
        .await
        .unwrap();

    // Bundle waits until the contact opens
    feed_tx.send(neighbor("mars-gw", "dtn://mars")).await.unwrap();

    let delivered = tokio::time::timeout(Duration::from_secs(5), deliveries.recv())
        .await
        .expect("delivery timed out")
        .unwrap();
    assert_eq!(delivered.id, id);
    assert_eq!(delivered.payload, b"hello mars");
    assert_eq!(delivered.hop_count, 1);

    earth.stop().await.unwrap();
    mars.stop().await.unwrap();

    assert_eq!(earth.stats().await.unwrap().counters.forwarded, 1);
    assert_eq!(mars.stats().await.unwrap().counters.delivered_locally, 1);
}

#[tokio::test]
async fn test_ingress_worker_drains_transport() {
    satnet_logging::init_testing();
    let (t_relay, t_earth) = MockTransportBuilder::new()
        .create_connected_pair(NeighborId::new("relay-1"), NeighborId::new("earth-gs"));
    let node = DtnNode::with_memory_store(
        NodeConfig::testing("earth-gs", "dtn://earth/gs"),
        Arc::new(ContactGraphRouter::new()),
        Arc::new(t_earth),
    );
    let mut deliveries = node.subscribe_deliveries();
    node.start().await.unwrap();

    for i in 0..3u8 {
        let bundle = Bundle::new("dtn://mars", "dtn://earth/gs", vec![i], Priority::Normal, TTL);
        t_relay
            .send(&NeighborId::new("earth-gs"), encode(&bundle).unwrap().to_vec())
            .await
            .unwrap();
    }

    for _ in 0..3 {
        tokio::time::timeout(Duration::from_secs(5), deliveries.recv())
            .await
            .expect("delivery timed out")
            .unwrap();
    }

    node.stop().await.unwrap();
    assert_eq!(node.stats().await.unwrap().delivered, 3);
}

#[tokio::test]
async fn test_pending_bundles_survive_restart_with_redb() {
    satnet_logging::init_testing();
    let dir = tempfile::TempDir::new().unwrap();
    let db_path = dir.path().join("bundles.redb");

    let id = {
        let store = Arc::new(RedbBundleStore::open(RedbStoreConfig::at(&db_path)).unwrap());
        let node = DtnNode::new(
            NodeConfig::testing("earth-gs", "dtn://earth/gs"),
            store,
            Arc::new(ContactGraphRouter::new()),
            Arc::new(MockTransport::new("earth-gs")),
        );
        node.submit("dtn://mars/rover", b"persist".to_vec(), Priority::Normal, TTL)
            .await
            .unwrap()
    };

    let (node, _earth, relays) = {
        let earth = Arc::new(MockTransport::new("earth-gs"));
        let relay = Arc::new(MockTransport::new("relay-1"));
        earth.connect_to(NeighborId::new("relay-1"), relay.inbox_sender());
        let store = Arc::new(RedbBundleStore::open(RedbStoreConfig::at(&db_path)).unwrap());
        let node = DtnNode::new(
            NodeConfig::testing("earth-gs", "dtn://earth/gs"),
            store,
            Arc::new(ContactGraphRouter::new()),
            earth.clone(),
        );
        (node, earth, vec![relay])
    };
    assert_eq!(node.stats().await.unwrap().pending, 1);

    node.update_neighbor(neighbor("relay-1", "dtn://mars"));
    let report = node.run_egress_cycle().await.unwrap();
    assert_eq!(report.forwarded, vec![(id, NeighborId::new("relay-1"))]);

    let (_, data) = relays[0].recv().await.unwrap();
    assert_eq!(decode(&data).unwrap().payload, b"persist");
}
