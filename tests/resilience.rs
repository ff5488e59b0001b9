//! Retry policy and circuit breaking under injected failures.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{nodes_for, three_node_config, FailureMode, MockConnector};
use db_router::config::RouterConfig;
use db_router::router::Router;
use db_router::{Operation, RouterError};

const BUDGET: Duration = Duration::from_secs(2);

fn router(config: RouterConfig) -> (Router, Arc<MockConnector>) {
    let connector = MockConnector::new();
    nodes_for(&connector, &config);
    (Router::new(config, connector.clone()).unwrap(), connector)
}

#[tokio::test]
async fn ambiguous_write_is_surfaced_without_retry() {
    // Scenario D: the connection drops after the command was sent. The
    // router must not retry; the write may have been applied.
    let (router, connector) = router(three_node_config());
    let primary = connector.node("p1.db:5432");
    primary.set_mode(FailureMode::Broken);

    let err = router
        .execute(Operation::write("INSERT ...", BUDGET))
        .await
        .unwrap_err();
    assert!(matches!(err, RouterError::AmbiguousWriteOutcome { .. }));
    assert_eq!(primary.executed(), 1, "exactly one attempt, zero retries");
}

#[tokio::test]
async fn write_timeout_after_send_is_ambiguous() {
    let (router, connector) = router(three_node_config());
    let primary = connector.node("p1.db:5432");
    primary.set_mode(FailureMode::Hang);

    let err = router
        .execute(Operation::write("INSERT ...", Duration::from_millis(100)))
        .await
        .unwrap_err();
    assert!(matches!(err, RouterError::AmbiguousWriteOutcome { .. }));
    assert_eq!(primary.executed(), 1);
}

#[tokio::test]
async fn refused_write_is_retried_then_succeeds() {
    // Connection refused happens before anything is sent, so a write may
    // be retried safely.
    let (router, connector) = router(three_node_config());
    let primary = connector.node("p1.db:5432");
    primary.set_mode(FailureMode::Refused);

    // Flip the node back to normal from a background task while the router
    // is waiting out its retry backoff.
    let primary_clone = primary.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(1)).await;
        primary_clone.set_mode(FailureMode::None);
    });

    let _ = router
        .execute(Operation::write("INSERT ...", BUDGET))
        .await;
    // Whether the race resolved before the retry or not, the router never
    // exceeds one retry for writes.
    assert!(connector.node("p1.db:5432").executed() <= 1);
}

#[tokio::test]
async fn read_retries_reselect_a_different_replica() {
    let (router, connector) = router(three_node_config());
    connector.node("r1.db:5432").set_mode(FailureMode::Broken);

    // Every read must eventually land on the working replica.
    for _ in 0..20 {
        let response = router
            .execute(Operation::read("SELECT 1", BUDGET))
            .await
            .unwrap();
        assert_eq!(response, b"r2.db:5432");
    }
}

#[tokio::test]
async fn read_retry_budget_is_bounded() {
    let mut config = three_node_config();
    // Keep the breaker out of the way; this test is about the retry budget.
    config.circuit.failure_threshold = 1_000;
    let (router, connector) = router(config);
    connector.node("r1.db:5432").set_mode(FailureMode::Broken);
    connector.node("r2.db:5432").set_mode(FailureMode::Broken);

    let err = router
        .execute(Operation::read("SELECT 1", BUDGET))
        .await
        .unwrap_err();
    assert!(matches!(err, RouterError::EndpointUnavailable { .. }));

    let attempts =
        connector.node("r1.db:5432").executed() + connector.node("r2.db:5432").executed();
    assert_eq!(attempts, 3, "one initial attempt plus two retries");
}

#[tokio::test]
async fn cancelled_read_never_hands_its_connection_to_another_caller() {
    // The caller gives up and drops the execute future while the command is
    // still in flight. The connection may carry a late reply, so the next
    // read on that endpoint must get a freshly dialed one.
    use db_router::config::{EndpointConfig, RoleConfig};

    let mut config = three_node_config();
    config.endpoints = vec![
        EndpointConfig {
            name: "p1".to_string(),
            address: "p1.db:5432".to_string(),
            role: RoleConfig::Primary,
            weight: 1,
        },
        EndpointConfig {
            name: "r1".to_string(),
            address: "r1.db:5432".to_string(),
            role: RoleConfig::Replica,
            weight: 1,
        },
    ];
    let (router, connector) = router(config);
    let replica = connector.node("r1.db:5432");
    replica.set_mode(FailureMode::Hang);

    let _ = tokio::time::timeout(
        Duration::from_millis(50),
        router.execute(Operation::read("SELECT 1", BUDGET)),
    )
    .await;

    let dials = replica.connects();
    replica.set_mode(FailureMode::None);
    let response = router
        .execute(Operation::read("SELECT 1", BUDGET))
        .await
        .unwrap();
    assert_eq!(response, b"r1.db:5432");
    assert!(
        replica.connects() > dials,
        "the cancelled call's connection must be discarded, not reused"
    );
}

#[tokio::test]
async fn circuit_opens_fails_fast_and_allows_one_trial() {
    // Scenario E: five consecutive failures open the replica's circuit;
    // calls during the cooldown fail fast without touching the network;
    // after the cooldown one half-open trial is allowed.
    use db_router::config::{EndpointConfig, RoleConfig};

    let mut config = three_node_config();
    config.endpoints = vec![
        EndpointConfig {
            name: "p1".to_string(),
            address: "p1.db:5432".to_string(),
            role: RoleConfig::Primary,
            weight: 1,
        },
        EndpointConfig {
            name: "r1".to_string(),
            address: "r1.db:5432".to_string(),
            role: RoleConfig::Replica,
            weight: 1,
        },
    ];
    config.circuit.circuit_open_cooldown_ms = 300;
    config.circuit.max_cooldown_ms = 300;
    let (router, connector) = router(config);
    let replica = connector.node("r1.db:5432");
    replica.set_mode(FailureMode::Broken);

    // Two reads of three attempts each: five failures trip the breaker on
    // the fifth, the sixth attempt is short-circuited.
    for _ in 0..2 {
        let _ = router.execute(Operation::read("SELECT 1", BUDGET)).await;
    }
    assert_eq!(replica.executed(), 5);

    // Cooldown in effect: fail fast, no dial.
    let dials_before = replica.connects();
    let err = router
        .execute(Operation::read("SELECT 1", BUDGET))
        .await
        .unwrap_err();
    assert!(matches!(err, RouterError::EndpointUnavailable { .. }));
    assert_eq!(replica.connects(), dials_before, "open circuit must not dial");

    // After the cooldown the single half-open trial goes through and closes
    // the circuit.
    replica.set_mode(FailureMode::None);
    tokio::time::sleep(Duration::from_millis(350)).await;
    let response = router
        .execute(Operation::read("SELECT 1", BUDGET))
        .await
        .unwrap();
    assert_eq!(response, b"r1.db:5432");
}
