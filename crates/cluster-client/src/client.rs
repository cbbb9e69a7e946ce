//! Kubernetes-backed implementation of the cluster capability operations.
//!
//! Each `ClusterOps` method wraps one or more Kubernetes API calls and
//! converts their errors into the trait's outcome values at this boundary,
//! logging the underlying cause. Readiness and drain waits are fixed-interval
//! polls bounded by the caller-supplied timeout.

use crate::cluster_trait::ClusterOps;
use crate::error::ClusterError;
use crate::models::PodSummary;
use k8s_openapi::api::core::v1::{Node, Pod};
use k8s_openapi::api::policy::v1::PodDisruptionBudget;
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::api::{Api, EvictParams, ListParams, Patch, PatchParams};
use kube::{Client, ResourceExt};
use serde_json::json;
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::time::{Instant, sleep};
use tracing::{debug, error, info, warn};

/// Poll cadence while waiting for a node to finish draining.
const DRAIN_POLL_INTERVAL: Duration = Duration::from_secs(30);

/// Poll cadence while waiting for an evicted pod's replacement.
const POD_READY_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Cluster capability client backed by the Kubernetes API.
#[derive(Clone)]
pub struct ClusterClient {
    client: Client,
}

impl ClusterClient {
    /// Creates a client on top of an established Kubernetes connection.
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn nodes(&self) -> Api<Node> {
        Api::all(self.client.clone())
    }

    fn all_pods(&self) -> Api<Pod> {
        Api::all(self.client.clone())
    }

    fn pods(&self, namespace: &str) -> Api<Pod> {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn pdbs(&self, namespace: &str) -> Api<PodDisruptionBudget> {
        Api::namespaced(self.client.clone(), namespace)
    }

    async fn list_pods_on_node(&self, node_name: &str) -> Result<Vec<Pod>, ClusterError> {
        let lp = ListParams::default().fields(&format!("spec.nodeName={node_name}"));
        Ok(self.all_pods().list(&lp).await?.items)
    }

    async fn set_unschedulable(&self, node_name: &str, value: bool) -> Result<(), ClusterError> {
        let patch = json!({ "spec": { "unschedulable": value } });
        self.nodes()
            .patch(node_name, &PatchParams::default(), &Patch::Merge(&patch))
            .await?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl ClusterOps for ClusterClient {
    async fn find_nodes_by_selector(&self, selector: &BTreeMap<String, String>) -> Vec<String> {
        let lp = if selector.is_empty() {
            ListParams::default()
        } else {
            ListParams::default().labels(&label_selector_string(selector))
        };
        match self.nodes().list(&lp).await {
            Ok(nodes) => nodes.items.iter().map(ResourceExt::name_any).collect(),
            Err(e) => {
                error!("Failed to find nodes with selector {:?}: {}", selector, e);
                Vec::new()
            }
        }
    }

    async fn is_node_ready_for_refresh(&self, node_name: &str) -> bool {
        let node = match self.nodes().get(node_name).await {
            Ok(node) => node,
            Err(e) => {
                error!("Failed to check node {}: {}", node_name, e);
                return false;
            }
        };
        if !node_is_ready(&node) {
            warn!("Node {} is not ready", node_name);
            return false;
        }
        if node_is_unschedulable(&node) {
            warn!("Node {} is already cordoned", node_name);
            return false;
        }
        true
    }

    async fn provision_replacement_node(&self, original_node: &str) -> Option<String> {
        info!(
            "Simulating provisioning of replacement node for {}",
            original_node
        );
        let nodes = match self.nodes().list(&ListParams::default()).await {
            Ok(list) => list.items,
            Err(e) => {
                error!("Failed to provision replacement node: {}", e);
                return None;
            }
        };

        // Prefer an existing ready, schedulable node over provisioning.
        let candidate = nodes.iter().find(|node| {
            node.name_any() != original_node
                && !node_is_unschedulable(node)
                && node_is_ready(node)
        });
        if let Some(node) = candidate {
            return Some(node.name_any());
        }

        // No candidate: a real integration would call the cloud provider
        // here. The stand-in name keeps the rest of the protocol honest.
        let simulated = format!("replacement-for-{original_node}");
        info!("Would provision new node: {}", simulated);
        Some(simulated)
    }

    async fn cordon_node(&self, node_name: &str) -> bool {
        match self.set_unschedulable(node_name, true).await {
            Ok(()) => {
                info!("Successfully cordoned node {}", node_name);
                true
            }
            Err(e) => {
                error!("Failed to cordon node {}: {}", node_name, e);
                false
            }
        }
    }

    async fn uncordon_node(&self, node_name: &str) -> bool {
        match self.set_unschedulable(node_name, false).await {
            Ok(()) => {
                info!("Successfully uncordoned node {}", node_name);
                true
            }
            Err(e) => {
                error!("Failed to uncordon node {}: {}", node_name, e);
                false
            }
        }
    }

    async fn safely_drain_node(&self, node_name: &str, timeout_secs: u64) -> bool {
        if !self.cordon_node(node_name).await {
            return false;
        }

        let start = Instant::now();
        while start.elapsed() < Duration::from_secs(timeout_secs) {
            match self.list_pods_on_node(node_name).await {
                Ok(pods) if pods.is_empty() => {
                    info!("All pods evacuated from node {}", node_name);
                    return true;
                }
                Ok(pods) => {
                    info!(
                        "Waiting for {} pods to be evacuated from {}",
                        pods.len(),
                        node_name
                    );
                }
                Err(e) => {
                    error!("Failed to drain node {}: {}", node_name, e);
                    return false;
                }
            }
            sleep(DRAIN_POLL_INTERVAL).await;
        }

        error!("Timeout waiting for pods to evacuate from {}", node_name);
        false
    }

    async fn get_pods_on_node(&self, node_name: &str) -> Vec<PodSummary> {
        match self.list_pods_on_node(node_name).await {
            Ok(pods) => pods.iter().map(PodSummary::from_pod).collect(),
            Err(e) => {
                error!("Failed to get pods on node {}: {}", node_name, e);
                Vec::new()
            }
        }
    }

    async fn check_pdb_compliance(&self, pods: &[PodSummary]) -> bool {
        for pod in pods {
            let pdbs = match self.pdbs(&pod.namespace).list(&ListParams::default()).await {
                Ok(list) => list.items,
                Err(e) => {
                    error!("Failed to check PDB compliance: {}", e);
                    return false;
                }
            };
            for pdb in &pdbs {
                let match_labels = pdb
                    .spec
                    .as_ref()
                    .and_then(|spec| spec.selector.as_ref())
                    .and_then(|selector| selector.match_labels.as_ref());
                let Some(match_labels) = match_labels else {
                    continue;
                };
                if pod_matches_labels(&pod.labels, match_labels) && eviction_would_violate(pdb) {
                    warn!(
                        "PDB violation: evicting pod {}/{} would breach budget {}",
                        pod.namespace,
                        pod.name,
                        pdb.name_any()
                    );
                    return false;
                }
            }
        }
        true
    }

    async fn evict_pod(&self, name: &str, namespace: &str) -> bool {
        match self.pods(namespace).evict(name, &EvictParams::default()).await {
            Ok(_) => {
                info!("Successfully evicted pod {}/{}", namespace, name);
                true
            }
            Err(e) => {
                error!("Failed to evict pod {}/{}: {}", namespace, name, e);
                false
            }
        }
    }

    async fn wait_for_pod_ready(&self, name: &str, namespace: &str, timeout_secs: u64) -> bool {
        let start = Instant::now();
        while start.elapsed() < Duration::from_secs(timeout_secs) {
            match self.pods(namespace).get(name).await {
                Ok(pod) => {
                    if pod_is_ready(&pod) {
                        info!("Pod {}/{} is ready", namespace, name);
                        return true;
                    }
                    if pod_phase(&pod) == Some("Failed") {
                        error!("Pod {}/{} failed", namespace, name);
                        return false;
                    }
                    debug!("Waiting for pod {}/{} to be ready...", namespace, name);
                }
                // Not rescheduled yet: keep waiting
                Err(kube::Error::Api(ae)) if ae.code == 404 => {
                    debug!("Pod {}/{} not found yet, waiting...", namespace, name);
                }
                Err(e) => {
                    error!("Error checking pod {}/{}: {}", namespace, name, e);
                    return false;
                }
            }
            sleep(POD_READY_POLL_INTERVAL).await;
        }

        error!("Timeout waiting for pod {}/{} to be ready", namespace, name);
        false
    }
}

fn label_selector_string(selector: &BTreeMap<String, String>) -> String {
    selector
        .iter()
        .map(|(key, value)| format!("{key}={value}"))
        .collect::<Vec<_>>()
        .join(",")
}

fn node_is_ready(node: &Node) -> bool {
    node.status
        .as_ref()
        .and_then(|status| status.conditions.as_ref())
        .is_some_and(|conditions| {
            conditions
                .iter()
                .any(|c| c.type_ == "Ready" && c.status == "True")
        })
}

fn node_is_unschedulable(node: &Node) -> bool {
    node.spec
        .as_ref()
        .and_then(|spec| spec.unschedulable)
        .unwrap_or(false)
}

fn pod_phase(pod: &Pod) -> Option<&str> {
    pod.status.as_ref().and_then(|status| status.phase.as_deref())
}

fn pod_is_ready(pod: &Pod) -> bool {
    if pod_phase(pod) != Some("Running") {
        return false;
    }
    pod.status
        .as_ref()
        .and_then(|status| status.conditions.as_ref())
        .is_some_and(|conditions| {
            conditions
                .iter()
                .any(|c| c.type_ == "Ready" && c.status == "True")
        })
}

fn pod_matches_labels(
    labels: &BTreeMap<String, String>,
    match_labels: &BTreeMap<String, String>,
) -> bool {
    match_labels
        .iter()
        .all(|(key, value)| labels.get(key) == Some(value))
}

/// Whether evicting one more pod covered by this budget would breach it.
///
/// Only integer budget values are evaluated; percentage values need the
/// workload's scale, which this check does not have, and never block.
fn eviction_would_violate(pdb: &PodDisruptionBudget) -> bool {
    let Some(status) = pdb.status.as_ref() else {
        return false;
    };
    let current_healthy = status.current_healthy;
    let desired_healthy = status.desired_healthy;
    let spec = pdb.spec.as_ref();

    if let Some(IntOrString::Int(min_available)) = spec.and_then(|s| s.min_available.as_ref())
        && current_healthy - 1 < *min_available
    {
        return true;
    }

    if let Some(IntOrString::Int(max_unavailable)) = spec.and_then(|s| s.max_unavailable.as_ref()) {
        let current_unavailable = desired_healthy - current_healthy;
        if current_unavailable + 1 > *max_unavailable {
            return true;
        }
    }

    false
}
