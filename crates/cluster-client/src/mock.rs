//! Mock cluster client for unit testing
//!
//! In-memory implementation of `ClusterOps` that can be scripted to fail
//! specific operations. Besides the node/pod state it keeps journals of
//! cordon, eviction, and drain calls so tests can assert what the refresh
//! protocol actually touched.

use crate::cluster_trait::ClusterOps;
use crate::models::PodSummary;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex};

/// A node as the mock cluster sees it.
#[derive(Debug, Clone)]
pub struct MockNode {
    /// Node name
    pub name: String,
    /// Node labels, matched against campaign selectors
    pub labels: BTreeMap<String, String>,
    /// Whether the node reports a Ready condition
    pub ready: bool,
    /// Whether the node is cordoned
    pub unschedulable: bool,
}

impl MockNode {
    /// A ready, schedulable node with the given labels.
    pub fn ready(name: &str, labels: &[(&str, &str)]) -> Self {
        Self {
            name: name.to_string(),
            labels: labels
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            ready: true,
            unschedulable: false,
        }
    }
}

/// Mock cluster for testing
///
/// Stores nodes and pods in memory; individual operations can be made to
/// fail per node or per pod to drive the protocol's failure paths.
#[derive(Clone, Default)]
pub struct MockClusterClient {
    nodes: Arc<Mutex<Vec<MockNode>>>,
    pods: Arc<Mutex<HashMap<String, Vec<PodSummary>>>>,
    pdb_violation: Arc<Mutex<bool>>,
    fail_provision: Arc<Mutex<HashSet<String>>>,
    fail_evictions: Arc<Mutex<HashSet<String>>>,
    never_ready_pods: Arc<Mutex<HashSet<String>>>,
    fail_drains: Arc<Mutex<HashSet<String>>>,
    cordon_journal: Arc<Mutex<Vec<String>>>,
    eviction_journal: Arc<Mutex<Vec<String>>>,
    drain_journal: Arc<Mutex<Vec<String>>>,
}

fn pod_key(namespace: &str, name: &str) -> String {
    format!("{namespace}/{name}")
}

impl MockClusterClient {
    /// Create an empty mock cluster
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node to the mock cluster (for test setup)
    pub fn add_node(&self, node: MockNode) {
        self.nodes.lock().expect("mock state poisoned").push(node);
    }

    /// Bind a pod to a node (for test setup)
    pub fn add_pod(&self, node_name: &str, pod: PodSummary) {
        self.pods
            .lock()
            .expect("mock state poisoned")
            .entry(node_name.to_string())
            .or_default()
            .push(pod);
    }

    /// Make every disruption-budget check report a violation
    pub fn set_pdb_violation(&self, violated: bool) {
        *self.pdb_violation.lock().expect("mock state poisoned") = violated;
    }

    /// Make replacement provisioning fail for a node
    pub fn fail_provision_for(&self, node_name: &str) {
        self.fail_provision
            .lock()
            .expect("mock state poisoned")
            .insert(node_name.to_string());
    }

    /// Make eviction fail for a pod
    pub fn fail_eviction_for(&self, namespace: &str, name: &str) {
        self.fail_evictions
            .lock()
            .expect("mock state poisoned")
            .insert(pod_key(namespace, name));
    }

    /// Make a pod never reach Ready after eviction
    pub fn mark_pod_never_ready(&self, namespace: &str, name: &str) {
        self.never_ready_pods
            .lock()
            .expect("mock state poisoned")
            .insert(pod_key(namespace, name));
    }

    /// Make draining fail for a node
    pub fn fail_drain_for(&self, node_name: &str) {
        self.fail_drains
            .lock()
            .expect("mock state poisoned")
            .insert(node_name.to_string());
    }

    /// Nodes cordoned so far, in call order
    pub fn cordon_calls(&self) -> Vec<String> {
        self.cordon_journal.lock().expect("mock state poisoned").clone()
    }

    /// Pods evicted so far (`namespace/name`), in call order
    pub fn eviction_calls(&self) -> Vec<String> {
        self.eviction_journal
            .lock()
            .expect("mock state poisoned")
            .clone()
    }

    /// Nodes drained so far, in call order
    pub fn drain_calls(&self) -> Vec<String> {
        self.drain_journal.lock().expect("mock state poisoned").clone()
    }
}

#[async_trait::async_trait]
impl ClusterOps for MockClusterClient {
    async fn find_nodes_by_selector(&self, selector: &BTreeMap<String, String>) -> Vec<String> {
        self.nodes
            .lock()
            .expect("mock state poisoned")
            .iter()
            .filter(|node| {
                selector
                    .iter()
                    .all(|(key, value)| node.labels.get(key) == Some(value))
            })
            .map(|node| node.name.clone())
            .collect()
    }

    async fn is_node_ready_for_refresh(&self, node_name: &str) -> bool {
        self.nodes
            .lock()
            .expect("mock state poisoned")
            .iter()
            .find(|node| node.name == node_name)
            .is_some_and(|node| node.ready && !node.unschedulable)
    }

    async fn provision_replacement_node(&self, original_node: &str) -> Option<String> {
        if self
            .fail_provision
            .lock()
            .expect("mock state poisoned")
            .contains(original_node)
        {
            return None;
        }
        let nodes = self.nodes.lock().expect("mock state poisoned");
        let candidate = nodes
            .iter()
            .find(|node| node.name != original_node && node.ready && !node.unschedulable);
        match candidate {
            Some(node) => Some(node.name.clone()),
            None => Some(format!("replacement-for-{original_node}")),
        }
    }

    async fn cordon_node(&self, node_name: &str) -> bool {
        self.cordon_journal
            .lock()
            .expect("mock state poisoned")
            .push(node_name.to_string());
        if let Some(node) = self
            .nodes
            .lock()
            .expect("mock state poisoned")
            .iter_mut()
            .find(|node| node.name == node_name)
        {
            node.unschedulable = true;
        }
        true
    }

    async fn uncordon_node(&self, node_name: &str) -> bool {
        if let Some(node) = self
            .nodes
            .lock()
            .expect("mock state poisoned")
            .iter_mut()
            .find(|node| node.name == node_name)
        {
            node.unschedulable = false;
        }
        true
    }

    async fn safely_drain_node(&self, node_name: &str, _timeout_secs: u64) -> bool {
        self.drain_journal
            .lock()
            .expect("mock state poisoned")
            .push(node_name.to_string());
        if self
            .fail_drains
            .lock()
            .expect("mock state poisoned")
            .contains(node_name)
        {
            return false;
        }
        self.pods.lock().expect("mock state poisoned").remove(node_name);
        true
    }

    async fn get_pods_on_node(&self, node_name: &str) -> Vec<PodSummary> {
        self.pods
            .lock()
            .expect("mock state poisoned")
            .get(node_name)
            .cloned()
            .unwrap_or_default()
    }

    async fn check_pdb_compliance(&self, _pods: &[PodSummary]) -> bool {
        !*self.pdb_violation.lock().expect("mock state poisoned")
    }

    async fn evict_pod(&self, name: &str, namespace: &str) -> bool {
        let key = pod_key(namespace, name);
        self.eviction_journal
            .lock()
            .expect("mock state poisoned")
            .push(key.clone());
        if self
            .fail_evictions
            .lock()
            .expect("mock state poisoned")
            .contains(&key)
        {
            return false;
        }
        let mut pods = self.pods.lock().expect("mock state poisoned");
        for bound in pods.values_mut() {
            bound.retain(|pod| !(pod.namespace == namespace && pod.name == name));
        }
        true
    }

    async fn wait_for_pod_ready(&self, name: &str, namespace: &str, _timeout_secs: u64) -> bool {
        !self
            .never_ready_pods
            .lock()
            .expect("mock state poisoned")
            .contains(&pod_key(namespace, name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pod(namespace: &str, name: &str, node: &str) -> PodSummary {
        PodSummary {
            name: name.to_string(),
            namespace: namespace.to_string(),
            labels: BTreeMap::new(),
            node_name: Some(node.to_string()),
            phase: Some("Running".to_string()),
        }
    }

    #[tokio::test]
    async fn test_selector_filters_nodes_in_insertion_order() {
        let cluster = MockClusterClient::new();
        cluster.add_node(MockNode::ready("worker-1", &[("role", "worker")]));
        cluster.add_node(MockNode::ready("infra-1", &[("role", "infra")]));
        cluster.add_node(MockNode::ready("worker-2", &[("role", "worker")]));

        let selector = BTreeMap::from([("role".to_string(), "worker".to_string())]);
        let found = cluster.find_nodes_by_selector(&selector).await;
        assert_eq!(found, vec!["worker-1", "worker-2"]);
    }

    #[tokio::test]
    async fn test_eviction_removes_pod_and_records_call() {
        let cluster = MockClusterClient::new();
        cluster.add_node(MockNode::ready("worker-1", &[]));
        cluster.add_pod("worker-1", pod("default", "web-0", "worker-1"));

        assert!(cluster.evict_pod("web-0", "default").await);
        assert!(cluster.get_pods_on_node("worker-1").await.is_empty());
        assert_eq!(cluster.eviction_calls(), vec!["default/web-0"]);
    }

    #[tokio::test]
    async fn test_cordon_marks_node_unschedulable() {
        let cluster = MockClusterClient::new();
        cluster.add_node(MockNode::ready("worker-1", &[]));

        assert!(cluster.is_node_ready_for_refresh("worker-1").await);
        assert!(cluster.cordon_node("worker-1").await);
        assert!(!cluster.is_node_ready_for_refresh("worker-1").await);
        assert_eq!(cluster.cordon_calls(), vec!["worker-1"]);
    }
}
