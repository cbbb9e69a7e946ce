//! ClusterOps trait for mocking
//!
//! Abstracts the cluster capability operations so reconciliation logic can
//! be unit-tested against a mock. The concrete `ClusterClient` implements
//! this trait against a live Kubernetes API.
//!
//! Methods report failure as `bool`/`Option`/empty collections rather than
//! errors: the refresh protocol treats each operation as a gate with an
//! outcome, and the implementation is responsible for logging whatever
//! went wrong underneath.

use crate::models::PodSummary;
use std::collections::BTreeMap;

/// Trait for cluster capability operations
///
/// All async methods must be `Send` to work with Tokio's work-stealing runtime.
#[async_trait::async_trait]
pub trait ClusterOps: Send + Sync {
    /// Names of nodes matching the given label selector, in discovery order.
    /// Lookup failure yields an empty list.
    async fn find_nodes_by_selector(&self, selector: &BTreeMap<String, String>) -> Vec<String>;

    /// Whether a node reports Ready and is not already cordoned.
    async fn is_node_ready_for_refresh(&self, node_name: &str) -> bool;

    /// Obtains a destination node for workloads leaving `original_node`:
    /// an idle ready node if one exists, otherwise a provisioned one.
    /// `None` means no replacement could be obtained.
    async fn provision_replacement_node(&self, original_node: &str) -> Option<String>;

    /// Marks a node unschedulable.
    async fn cordon_node(&self, node_name: &str) -> bool;

    /// Marks a node schedulable again.
    async fn uncordon_node(&self, node_name: &str) -> bool;

    /// Cordons a node and polls until no pods remain bound to it, bounded
    /// by `timeout_secs`.
    async fn safely_drain_node(&self, node_name: &str, timeout_secs: u64) -> bool;

    /// Pods currently bound to a node. Lookup failure yields an empty list.
    async fn get_pods_on_node(&self, node_name: &str) -> Vec<PodSummary>;

    /// Whether evicting each of the given pods would keep every matching
    /// disruption budget satisfied.
    async fn check_pdb_compliance(&self, pods: &[PodSummary]) -> bool;

    /// Gracefully evicts a pod through the eviction API.
    async fn evict_pod(&self, name: &str, namespace: &str) -> bool;

    /// Polls until the named pod reports Ready, observing pod failure as
    /// an immediate `false` and absence as "keep waiting", bounded by
    /// `timeout_secs`.
    async fn wait_for_pod_ready(&self, name: &str, namespace: &str, timeout_secs: u64) -> bool;
}
