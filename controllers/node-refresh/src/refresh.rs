//! Single-node refresh orchestration.
//!
//! Runs the replacement protocol for one node: readiness gate, pod
//! inventory, disruption-budget precheck, replacement provisioning, bounded
//! pod migration, and the final drain. Every step is a hard gate; the first
//! failure short-circuits the refresh and reports why, so a node can never
//! leave its campaign stuck.

use cluster_client::{ClusterOps, PodSummary};
use crds::NodeRefreshSpec;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Result of a single node refresh.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// The node was fully refreshed (migrated and drained, or had no pods)
    Refreshed,
    /// The refresh was aborted; `reason` lands in the campaign's failedNodes
    Failed {
        /// Why the refresh was aborted
        reason: String,
    },
}

impl RefreshOutcome {
    fn failed(reason: &str) -> Self {
        Self::Failed {
            reason: reason.to_string(),
        }
    }
}

/// Executes the per-node replacement protocol against the cluster.
pub struct NodeRefreshOrchestrator<C> {
    cluster: Arc<C>,
}

impl<C: ClusterOps> NodeRefreshOrchestrator<C> {
    /// Creates an orchestrator over the given cluster capabilities.
    pub fn new(cluster: Arc<C>) -> Self {
        Self { cluster }
    }

    /// Refreshes a single node with zero downtime.
    ///
    /// The disruption-budget check is all-or-nothing: it runs against the
    /// full pod inventory before any pod is touched. The migration loop is
    /// capped at `maxPodsToMove`; pods beyond the cap stay in place until
    /// the node is visited again. The drain only runs once at least
    /// `minHealthyPods` migrations have succeeded.
    pub async fn refresh_node(&self, spec: &NodeRefreshSpec, node_name: &str) -> RefreshOutcome {
        info!("Refreshing node {}", node_name);

        let max_pods_to_move = spec.pod_management.max_pods_to_move as usize;
        let min_healthy_pods = spec.pod_management.min_healthy_pods as usize;
        let drain_timeout = spec.pod_management.drain_timeout;
        let readiness_timeout = spec.health_checks.readiness_timeout;

        // Step 1: the node must be Ready and not already cordoned
        if !self.cluster.is_node_ready_for_refresh(node_name).await {
            warn!("Node {} is not ready for refresh", node_name);
            return RefreshOutcome::failed("not ready for refresh");
        }

        // Step 2: nothing bound to the node means nothing to migrate
        let pods_on_node = self.cluster.get_pods_on_node(node_name).await;
        if pods_on_node.is_empty() {
            info!("No pods found on node {}, skipping", node_name);
            return RefreshOutcome::Refreshed;
        }

        // Step 3: simulate the evictions against every matching budget
        // before touching any pod
        if !self.cluster.check_pdb_compliance(&pods_on_node).await {
            warn!("PDB check failed for node {}", node_name);
            return RefreshOutcome::failed("disruption budget would be violated");
        }

        // Step 4: secure a destination before any disruption
        let Some(replacement_node) = self.cluster.provision_replacement_node(node_name).await
        else {
            error!("Failed to provision replacement node for {}", node_name);
            return RefreshOutcome::failed("failed to provision replacement node");
        };
        info!("Replacement node {} provisioned", replacement_node);

        // Step 5: migrate pods, aborting once failures could leave fewer
        // than minHealthyPods healthy. The threshold counts the full
        // inventory, not just the pods under the migration cap.
        let mut successful_migrations = 0usize;
        let mut failed_migrations = 0usize;
        let abort_threshold = pods_on_node.len().saturating_sub(min_healthy_pods);

        for pod in pods_on_node.iter().take(max_pods_to_move) {
            if self
                .migrate_pod(pod, node_name, &replacement_node, readiness_timeout)
                .await
            {
                successful_migrations += 1;
            } else {
                failed_migrations += 1;
                if failed_migrations > abort_threshold {
                    error!("Too many pod migration failures on node {}", node_name);
                    self.rollback_migrations(&pods_on_node, node_name).await;
                    return RefreshOutcome::failed("too many pod migration failures");
                }
            }
        }

        // Step 6: a node is not refreshed until it is drained
        if successful_migrations >= min_healthy_pods {
            if self.cluster.safely_drain_node(node_name, drain_timeout).await {
                info!("Successfully refreshed node {}", node_name);
                return RefreshOutcome::Refreshed;
            }
            error!("Failed to drain node {}", node_name);
            return RefreshOutcome::failed("node drain failed");
        }

        RefreshOutcome::failed("insufficient successful pod migrations")
    }

    /// Migrates a single pod off the node: cordon the source, evict, then
    /// wait for the replacement to become Ready. A failed cordon is logged
    /// by the client but does not stop the eviction.
    async fn migrate_pod(
        &self,
        pod: &PodSummary,
        source_node: &str,
        target_node: &str,
        readiness_timeout: u64,
    ) -> bool {
        info!(
            "Migrating pod {}/{} from {} to {}",
            pod.namespace, pod.name, source_node, target_node
        );

        let _ = self.cluster.cordon_node(source_node).await;

        // Placement onto the target is the workload controllers' job; the
        // eviction plus readiness wait observes it happening.
        if self.cluster.evict_pod(&pod.name, &pod.namespace).await {
            return self
                .cluster
                .wait_for_pod_ready(&pod.name, &pod.namespace, readiness_timeout)
                .await;
        }

        false
    }

    /// Best-effort rollback after aborting a migration.
    ///
    /// Rescheduling evicted pods back needs their pre-eviction specs and
    /// cooperation from the workload controllers, so this only records the
    /// intent for each pod.
    async fn rollback_migrations(&self, pods: &[PodSummary], original_node: &str) {
        warn!("Rolling back pod migrations to node {}", original_node);

        for pod in pods {
            info!(
                "Would roll back pod {}/{} to {}",
                pod.namespace, pod.name, original_node
            );
        }
    }
}
