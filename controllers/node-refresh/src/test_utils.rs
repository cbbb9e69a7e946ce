//! Test utilities for unit testing the refresh state machine.
//!
//! Helpers for building campaign specs, statuses, and mock clusters, plus
//! an invariant check applied after every simulated reconciliation pass.

use cluster_client::{MockClusterClient, MockNode, PodSummary};
use crds::{NodeRefreshSpec, NodeRefreshStatus, RefreshPhase, TargetNodes};
use std::collections::{BTreeMap, HashSet};

/// The selector every test campaign uses.
pub fn worker_selector() -> BTreeMap<String, String> {
    BTreeMap::from([("role".to_string(), "worker".to_string())])
}

/// A campaign spec targeting `role=worker` nodes with defaulted
/// pod-management, schedule, and health-check sections.
pub fn worker_spec(max_concurrent: u32) -> NodeRefreshSpec {
    NodeRefreshSpec {
        target_nodes: TargetNodes {
            selector: worker_selector(),
            max_concurrent_nodes: max_concurrent,
        },
        pod_management: Default::default(),
        schedule: Default::default(),
        health_checks: Default::default(),
    }
}

/// A mock cluster holding ready `role=worker` nodes with no pods.
pub fn cluster_with_workers(names: &[&str]) -> MockClusterClient {
    let cluster = MockClusterClient::new();
    for name in names {
        cluster.add_node(MockNode::ready(name, &[("role", "worker")]));
    }
    cluster
}

/// A Running pod bound to the given node.
pub fn pod(namespace: &str, name: &str, node: &str) -> PodSummary {
    PodSummary {
        name: name.to_string(),
        namespace: namespace.to_string(),
        labels: BTreeMap::new(),
        node_name: Some(node.to_string()),
        phase: Some("Running".to_string()),
    }
}

/// A Running status mid-campaign.
pub fn running_status(current: &[&str], processed: &[&str]) -> NodeRefreshStatus {
    NodeRefreshStatus {
        phase: RefreshPhase::Running,
        current_nodes: current.iter().map(|s| s.to_string()).collect(),
        processed_nodes: processed.iter().map(|s| s.to_string()).collect(),
        failed_nodes: Vec::new(),
        start_time: Some("2024-01-01T00:00:00Z".to_string()),
        completion_time: None,
        message: None,
    }
}

/// Structural invariants that must hold after every reconciliation pass:
/// the batch never exceeds the concurrency bound, a node appears in at
/// most one progress list, and completionTime tracks terminal phases.
pub fn assert_status_invariants(status: &NodeRefreshStatus, max_concurrent: usize) {
    assert!(
        status.current_nodes.len() <= max_concurrent,
        "currentNodes {:?} exceeds maxConcurrentNodes {}",
        status.current_nodes,
        max_concurrent
    );

    let mut seen = HashSet::new();
    let failed_names = status.failed_nodes.iter().map(|f| f.node_name.as_str());
    for node in status
        .current_nodes
        .iter()
        .map(String::as_str)
        .chain(status.processed_nodes.iter().map(String::as_str))
        .chain(failed_names)
    {
        assert!(seen.insert(node), "node {node} appears in more than one list");
    }

    let terminal = matches!(
        status.phase,
        RefreshPhase::Completed | RefreshPhase::Failed
    );
    assert_eq!(
        status.completion_time.is_some(),
        terminal,
        "completionTime must be set exactly in terminal phases (phase {:?})",
        status.phase
    );
}
