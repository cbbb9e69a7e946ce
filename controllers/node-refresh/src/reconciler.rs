//! Reconciliation logic for NodeRefresh campaigns.
//!
//! `StateMachine` owns the phase lifecycle of one campaign: it computes the
//! next status from the current spec, the persisted status, and live
//! cluster state, performing the node-level work for Running campaigns
//! synchronously before returning. `Reconciler` wraps it with status
//! write-back. All campaign state lives in the persisted resource; nothing
//! is cached across passes, which is what lets the controller crash and
//! resume mid-campaign.

use crate::batch;
use crate::error::ControllerError;
use crate::refresh::{NodeRefreshOrchestrator, RefreshOutcome};
use chrono::{DateTime, Duration, SecondsFormat, Utc};
use cluster_client::ClusterOps;
use crds::{FailedNode, NodeRefresh, NodeRefreshSpec, NodeRefreshStatus, RefreshPhase};
use kube::api::PostParams;
use kube::{Api, Client};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// How long a Failed campaign waits before it is retried.
const RETRY_COOLDOWN_HOURS: i64 = 1;

/// Bounded retries for conflicting status writes.
const STATUS_UPDATE_ATTEMPTS: usize = 3;

/// Computes campaign status transitions.
pub struct StateMachine<C> {
    cluster: Arc<C>,
    orchestrator: NodeRefreshOrchestrator<C>,
}

impl<C: ClusterOps> StateMachine<C> {
    /// Creates a state machine over the given cluster capabilities.
    pub fn new(cluster: Arc<C>) -> Self {
        Self {
            orchestrator: NodeRefreshOrchestrator::new(cluster.clone()),
            cluster,
        }
    }

    /// Computes the next persisted status for one campaign, or `None` when
    /// the pass is a no-op. Running campaigns have their current batch
    /// refreshed before this returns.
    pub async fn next_status(
        &self,
        spec: &NodeRefreshSpec,
        status: &NodeRefreshStatus,
        now: DateTime<Utc>,
    ) -> Option<NodeRefreshStatus> {
        match status.phase {
            RefreshPhase::Completed => {
                if !restart_due(spec, status, now) {
                    return None;
                }
                Some(NodeRefreshStatus {
                    phase: RefreshPhase::Pending,
                    current_nodes: Vec::new(),
                    processed_nodes: Vec::new(),
                    failed_nodes: Vec::new(),
                    start_time: Some(format_timestamp(now)),
                    completion_time: None,
                    message: Some("Starting new refresh cycle".to_string()),
                })
            }
            RefreshPhase::Failed => {
                if !retry_due(status, now) {
                    return None;
                }
                let mut next = status.clone();
                next.phase = RefreshPhase::Pending;
                next.message = Some("Retrying failed operation".to_string());
                // completionTime marks terminal phases only
                next.completion_time = None;
                Some(next)
            }
            RefreshPhase::Pending => Some(self.start_refresh(spec, status, now).await),
            RefreshPhase::Running => Some(self.continue_refresh(spec, status, now).await),
        }
    }

    /// Pending: resolve the target set and seed the first batch, or fail
    /// the campaign outright when the selector matches nothing.
    async fn start_refresh(
        &self,
        spec: &NodeRefreshSpec,
        status: &NodeRefreshStatus,
        now: DateTime<Utc>,
    ) -> NodeRefreshStatus {
        let target_nodes = self
            .cluster
            .find_nodes_by_selector(&spec.target_nodes.selector)
            .await;

        let mut next = status.clone();
        if target_nodes.is_empty() {
            next.phase = RefreshPhase::Failed;
            next.message = Some("No nodes found matching selector".to_string());
            next.completion_time = Some(format_timestamp(now));
            return next;
        }

        let max_concurrent = spec.target_nodes.max_concurrent_nodes as usize;
        let mut current_nodes = Vec::new();
        let mut backlog = target_nodes.clone();
        batch::admit_from_backlog(&mut current_nodes, &mut backlog, max_concurrent);

        next.phase = RefreshPhase::Running;
        next.current_nodes = current_nodes;
        next.processed_nodes = Vec::new();
        next.failed_nodes = Vec::new();
        next.start_time = Some(format_timestamp(now));
        next.completion_time = None;
        next.message = Some(format!("Starting refresh of {} nodes", target_nodes.len()));
        next
    }

    /// Running: refresh the current batch, fold the outcomes into the
    /// progress lists, refill the batch from the recomputed backlog, and
    /// complete once both the batch and the backlog are empty.
    async fn continue_refresh(
        &self,
        spec: &NodeRefreshSpec,
        status: &NodeRefreshStatus,
        now: DateTime<Utc>,
    ) -> NodeRefreshStatus {
        let max_concurrent = spec.target_nodes.max_concurrent_nodes as usize;

        let batch_nodes = status.current_nodes.clone();
        let mut processed_nodes = status.processed_nodes.clone();
        let mut failed_nodes = status.failed_nodes.clone();
        let mut batch_successes = 0usize;

        for node_name in &batch_nodes {
            match self.orchestrator.refresh_node(spec, node_name).await {
                RefreshOutcome::Refreshed => {
                    processed_nodes.push(node_name.clone());
                    batch_successes += 1;
                }
                RefreshOutcome::Failed { reason } => {
                    failed_nodes.push(FailedNode {
                        node_name: node_name.clone(),
                        reason,
                        timestamp: format_timestamp(now),
                    });
                }
            }
        }

        // Re-resolve targets every pass: nodes labeled into the cluster
        // mid-campaign join the backlog, vanished ones are never re-added.
        let target_nodes = self
            .cluster
            .find_nodes_by_selector(&spec.target_nodes.selector)
            .await;
        let mut backlog = batch::remaining_backlog(&target_nodes, &processed_nodes, &failed_nodes);

        // A batch that failed wholesale does not refill within the same
        // pass; the next pass re-observes the backlog and picks it up.
        let batch_all_failed = !batch_nodes.is_empty() && batch_successes == 0;
        let mut current_nodes = Vec::new();
        if !batch_all_failed {
            batch::admit_from_backlog(&mut current_nodes, &mut backlog, max_concurrent);
        }

        let mut next = status.clone();
        next.current_nodes = current_nodes;
        next.processed_nodes = processed_nodes;
        next.failed_nodes = failed_nodes;

        if next.current_nodes.is_empty() && backlog.is_empty() {
            next.phase = RefreshPhase::Completed;
            next.completion_time = Some(format_timestamp(now));
            next.message = Some(format!(
                "Refresh completed. Processed: {}, Failed: {}",
                next.processed_nodes.len(),
                next.failed_nodes.len()
            ));
        } else {
            next.message = Some(format!(
                "Processing {} nodes, {} remaining",
                next.current_nodes.len(),
                backlog.len()
            ));
        }
        next
    }
}

/// Reconciles NodeRefresh resources against the cluster and persists the
/// resulting status.
pub struct Reconciler<C> {
    machine: StateMachine<C>,
    client: Client,
}

impl<C: ClusterOps> Reconciler<C> {
    /// Creates a new reconciler instance.
    pub fn new(cluster: Arc<C>, client: Client) -> Self {
        Self {
            machine: StateMachine::new(cluster),
            client,
        }
    }

    /// Reconciles a single NodeRefresh resource.
    ///
    /// Reads the persisted status, advances the state machine one pass,
    /// and writes the next status back. A pass that changes nothing writes
    /// nothing.
    pub async fn reconcile(&self, noderefresh: &NodeRefresh) -> Result<(), ControllerError> {
        let name = noderefresh.metadata.name.as_deref().ok_or_else(|| {
            ControllerError::InvalidResource("NodeRefresh missing name".to_string())
        })?;
        let namespace = noderefresh.metadata.namespace.as_deref().unwrap_or("default");

        info!("Reconciling NodeRefresh {}/{}", namespace, name);

        if let Err(reason) = noderefresh.spec.validate() {
            return Err(ControllerError::InvalidResource(format!(
                "NodeRefresh {namespace}/{name}: {reason}"
            )));
        }

        let status = noderefresh.status.clone().unwrap_or_default();
        if let Some(next) = self
            .machine
            .next_status(&noderefresh.spec, &status, Utc::now())
            .await
        {
            self.update_status(name, namespace, &next).await?;
        }
        Ok(())
    }

    /// Read-modify-write of the status subresource. The write carries the
    /// freshly read resourceVersion, so a concurrent editor surfaces as a
    /// 409 and the update is retried against the newer object.
    async fn update_status(
        &self,
        name: &str,
        namespace: &str,
        next: &NodeRefreshStatus,
    ) -> Result<(), ControllerError> {
        let api: Api<NodeRefresh> = Api::namespaced(self.client.clone(), namespace);

        for attempt in 1..=STATUS_UPDATE_ATTEMPTS {
            let mut latest = api.get(name).await?;
            latest.status = Some(next.clone());
            let data = serde_json::to_vec(&latest)?;

            match api.replace_status(name, &PostParams::default(), data).await {
                Ok(_) => {
                    debug!("Updated status for {}/{}", namespace, name);
                    return Ok(());
                }
                Err(kube::Error::Api(ae)) if ae.code == 409 => {
                    warn!(
                        "Conflicting status write for NodeRefresh {}/{} (attempt {}), retrying",
                        namespace, name, attempt
                    );
                }
                Err(e) => return Err(ControllerError::Kube(e)),
            }
        }

        Err(ControllerError::StatusConflict(format!("{namespace}/{name}")))
    }
}

/// Whether a Completed campaign with scheduling enabled is due to restart.
/// A missing or unparseable completion time restarts immediately.
fn restart_due(spec: &NodeRefreshSpec, status: &NodeRefreshStatus, now: DateTime<Utc>) -> bool {
    if !spec.schedule.enabled {
        return false;
    }
    let Some(completed_at) = status.completion_time.as_deref().and_then(parse_timestamp) else {
        return true;
    };
    now >= completed_at + Duration::days(i64::from(spec.schedule.interval_days))
}

/// Whether a Failed campaign has cooled down enough to retry.
/// A missing or unparseable failure time retries immediately.
fn retry_due(status: &NodeRefreshStatus, now: DateTime<Utc>) -> bool {
    let Some(failed_at) = status.completion_time.as_deref().and_then(parse_timestamp) else {
        return true;
    };
    now >= failed_at + Duration::hours(RETRY_COOLDOWN_HOURS)
}

pub(crate) fn format_timestamp(instant: DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|parsed| parsed.with_timezone(&Utc))
}
