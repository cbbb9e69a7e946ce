//! Unit tests for the single-node refresh protocol.
//!
//! Each test scripts the mock cluster into one failure mode and checks
//! both the outcome and, through the mock's call journals, that gates
//! short-circuit before any disruptive call is made.

use crate::refresh::{NodeRefreshOrchestrator, RefreshOutcome};
use crate::test_utils::{cluster_with_workers, pod, worker_spec};
use cluster_client::{ClusterOps, MockClusterClient};
use std::sync::Arc;

fn orchestrator(cluster: &MockClusterClient) -> NodeRefreshOrchestrator<MockClusterClient> {
    NodeRefreshOrchestrator::new(Arc::new(cluster.clone()))
}

fn failure_reason(outcome: RefreshOutcome) -> String {
    match outcome {
        RefreshOutcome::Failed { reason } => reason,
        RefreshOutcome::Refreshed => panic!("expected the refresh to fail"),
    }
}

#[tokio::test]
async fn test_unready_node_fails_without_touching_pods() {
    let cluster = cluster_with_workers(&["w1"]);
    cluster.add_pod("w1", pod("default", "web-0", "w1"));
    // Cordoned nodes are not eligible for refresh
    cluster.cordon_node("w1").await;

    let outcome = orchestrator(&cluster)
        .refresh_node(&worker_spec(1), "w1")
        .await;

    assert_eq!(failure_reason(outcome), "not ready for refresh");
    assert!(cluster.eviction_calls().is_empty());
    assert!(cluster.drain_calls().is_empty());
}

#[tokio::test]
async fn test_empty_node_is_a_trivial_success() {
    let cluster = cluster_with_workers(&["w1"]);

    let outcome = orchestrator(&cluster)
        .refresh_node(&worker_spec(1), "w1")
        .await;

    assert_eq!(outcome, RefreshOutcome::Refreshed);
    // Nothing to migrate means nothing was cordoned or drained
    assert!(cluster.cordon_calls().is_empty());
    assert!(cluster.drain_calls().is_empty());
}

#[tokio::test]
async fn test_pdb_violation_aborts_before_any_eviction() {
    let cluster = cluster_with_workers(&["w1"]);
    cluster.add_pod("w1", pod("default", "web-0", "w1"));
    cluster.add_pod("w1", pod("default", "web-1", "w1"));
    cluster.set_pdb_violation(true);

    let outcome = orchestrator(&cluster)
        .refresh_node(&worker_spec(1), "w1")
        .await;

    assert_eq!(failure_reason(outcome), "disruption budget would be violated");
    assert!(cluster.eviction_calls().is_empty());
}

#[tokio::test]
async fn test_provisioning_failure_aborts_before_any_eviction() {
    let cluster = cluster_with_workers(&["w1"]);
    cluster.add_pod("w1", pod("default", "web-0", "w1"));
    cluster.fail_provision_for("w1");

    let outcome = orchestrator(&cluster)
        .refresh_node(&worker_spec(1), "w1")
        .await;

    assert_eq!(
        failure_reason(outcome),
        "failed to provision replacement node"
    );
    assert!(cluster.eviction_calls().is_empty());
}

#[tokio::test]
async fn test_successful_refresh_migrates_then_drains() {
    let cluster = cluster_with_workers(&["w1", "w2"]);
    cluster.add_pod("w1", pod("default", "web-0", "w1"));
    cluster.add_pod("w1", pod("default", "web-1", "w1"));

    let outcome = orchestrator(&cluster)
        .refresh_node(&worker_spec(1), "w1")
        .await;

    assert_eq!(outcome, RefreshOutcome::Refreshed);
    assert_eq!(cluster.eviction_calls(), vec!["default/web-0", "default/web-1"]);
    assert_eq!(cluster.drain_calls(), vec!["w1"]);
    // The source node is cordoned before each eviction
    assert!(cluster.cordon_calls().contains(&"w1".to_string()));
}

#[tokio::test]
async fn test_migration_cap_leaves_excess_pods_in_place() {
    let cluster = cluster_with_workers(&["w1", "w2"]);
    for i in 0..5 {
        cluster.add_pod("w1", pod("default", &format!("web-{i}"), "w1"));
    }
    let spec = worker_spec(1); // maxPodsToMove defaults to 3

    let outcome = orchestrator(&cluster).refresh_node(&spec, "w1").await;

    assert_eq!(outcome, RefreshOutcome::Refreshed);
    assert_eq!(cluster.eviction_calls().len(), 3);
}

#[tokio::test]
async fn test_migration_failures_over_threshold_abort_without_drain() {
    let cluster = cluster_with_workers(&["w1", "w2"]);
    for i in 0..3 {
        cluster.add_pod("w1", pod("default", &format!("web-{i}"), "w1"));
    }
    // minHealthyPods defaults to 2, so the threshold is 3 - 2 = 1 failure
    cluster.mark_pod_never_ready("default", "web-0");
    cluster.mark_pod_never_ready("default", "web-1");

    let outcome = orchestrator(&cluster)
        .refresh_node(&worker_spec(1), "w1")
        .await;

    assert_eq!(failure_reason(outcome), "too many pod migration failures");
    assert!(cluster.drain_calls().is_empty());
}

#[tokio::test]
async fn test_eviction_failure_counts_toward_threshold() {
    let cluster = cluster_with_workers(&["w1", "w2"]);
    cluster.add_pod("w1", pod("default", "web-0", "w1"));
    cluster.add_pod("w1", pod("default", "web-1", "w1"));
    cluster.fail_eviction_for("default", "web-0");

    let outcome = orchestrator(&cluster)
        .refresh_node(&worker_spec(1), "w1")
        .await;

    // 2 pods with minHealthyPods 2 allows zero failures
    assert_eq!(failure_reason(outcome), "too many pod migration failures");
    assert!(cluster.drain_calls().is_empty());
}

#[tokio::test]
async fn test_too_few_migrations_skip_the_drain() {
    let cluster = cluster_with_workers(&["w1", "w2"]);
    cluster.add_pod("w1", pod("default", "web-0", "w1"));

    let outcome = orchestrator(&cluster)
        .refresh_node(&worker_spec(1), "w1")
        .await;

    // One successful migration is below the minHealthyPods floor of 2
    assert_eq!(
        failure_reason(outcome),
        "insufficient successful pod migrations"
    );
    assert!(cluster.drain_calls().is_empty());
}

#[tokio::test]
async fn test_drain_failure_fails_the_node_after_migration() {
    let cluster = cluster_with_workers(&["w1", "w2"]);
    cluster.add_pod("w1", pod("default", "web-0", "w1"));
    cluster.add_pod("w1", pod("default", "web-1", "w1"));
    cluster.fail_drain_for("w1");

    let outcome = orchestrator(&cluster)
        .refresh_node(&worker_spec(1), "w1")
        .await;

    assert_eq!(failure_reason(outcome), "node drain failed");
    assert_eq!(cluster.eviction_calls().len(), 2);
    assert_eq!(cluster.drain_calls(), vec!["w1"]);
}
