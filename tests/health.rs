//! Health prober behavior observed through the registry.

mod common;

use std::time::Duration;

use common::{nodes_for, three_node_config, wait_for, MockConnector};
use db_router::registry::{EndpointId, HealthStatus};
use db_router::router::Router;
use db_router::Shutdown;

#[tokio::test]
async fn endpoint_recovers_after_flapping() {
    // K consecutive failures take the endpoint out; consecutive successes
    // bring it back. A single good probe in between must not.
    let connector = MockConnector::new();
    let config = three_node_config();
    let nodes = nodes_for(&connector, &config);
    let r1 = &nodes[1];

    let router = Router::new(config, connector.clone()).unwrap();
    let shutdown = Shutdown::new();
    router.start(&shutdown);
    let registry = router.registry().clone();
    let id = EndpointId::from("r1");

    assert!(
        wait_for(Duration::from_secs(2), || {
            registry.snapshot().get(&id).unwrap().status == HealthStatus::Healthy
        })
        .await
    );

    r1.set_reachable(false);
    assert!(
        wait_for(Duration::from_secs(2), || {
            registry.snapshot().get(&id).unwrap().status == HealthStatus::Unreachable
        })
        .await,
        "three failed probes must mark the replica unreachable"
    );

    r1.set_reachable(true);
    assert!(
        wait_for(Duration::from_secs(2), || {
            registry.snapshot().get(&id).unwrap().status == HealthStatus::Healthy
        })
        .await,
        "consecutive good probes must readmit the replica"
    );

    shutdown.trigger();
}

#[tokio::test]
async fn lagging_replica_becomes_degraded_then_recovers() {
    let connector = MockConnector::new();
    let config = three_node_config(); // lag threshold: 100ms
    let nodes = nodes_for(&connector, &config);
    let r2 = &nodes[2];

    let router = Router::new(config, connector.clone()).unwrap();
    let shutdown = Shutdown::new();
    router.start(&shutdown);
    let registry = router.registry().clone();
    let id = EndpointId::from("r2");

    assert!(
        wait_for(Duration::from_secs(2), || {
            registry.snapshot().get(&id).unwrap().status == HealthStatus::Healthy
        })
        .await
    );

    r2.set_lag(Duration::from_millis(500));
    assert!(
        wait_for(Duration::from_secs(2), || {
            registry.snapshot().get(&id).unwrap().status == HealthStatus::Degraded
        })
        .await,
        "lag past threshold must degrade the replica"
    );

    r2.set_lag(Duration::ZERO);
    assert!(
        wait_for(Duration::from_secs(2), || {
            registry.snapshot().get(&id).unwrap().status == HealthStatus::Healthy
        })
        .await
    );

    shutdown.trigger();
}

#[tokio::test]
async fn prober_tracks_replication_positions() {
    let connector = MockConnector::new();
    let config = three_node_config();
    let nodes = nodes_for(&connector, &config);
    nodes[1].set_position(42);

    let router = Router::new(config, connector.clone()).unwrap();
    let shutdown = Shutdown::new();
    router.start(&shutdown);
    let registry = router.registry().clone();

    assert!(
        wait_for(Duration::from_secs(2), || {
            registry
                .snapshot()
                .get(&EndpointId::from("r1"))
                .unwrap()
                .position
                == 42
        })
        .await
    );

    shutdown.trigger();
}
