//! NodeRefresh CRD
//!
//! Declares a rolling node-replacement campaign: which nodes to refresh,
//! how many may be in flight at once, and the pod-safety limits that the
//! refresh must honor.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "operations.example.com",
    version = "v1alpha1",
    kind = "NodeRefresh",
    namespaced,
    status = "NodeRefreshStatus",
    shortname = "nr"
)]
#[serde(rename_all = "camelCase")]
pub struct NodeRefreshSpec {
    /// Which nodes to refresh and how many at once
    pub target_nodes: TargetNodes,

    /// Pod-safety limits applied while a node is refreshed
    #[serde(default)]
    pub pod_management: PodManagement,

    /// Optional recurring schedule
    #[serde(default)]
    pub schedule: Schedule,

    /// Health-check tuning for migrated pods
    #[serde(default)]
    pub health_checks: HealthChecks,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TargetNodes {
    /// Label constraints a node must satisfy to be targeted
    pub selector: BTreeMap<String, String>,

    /// Upper bound on nodes being refreshed concurrently
    #[serde(default = "default_max_concurrent_nodes")]
    #[schemars(range(min = 1, max = 10))]
    pub max_concurrent_nodes: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct PodManagement {
    /// Maximum pods actively migrated off a node per refresh
    #[schemars(range(min = 1))]
    pub max_pods_to_move: u32,

    /// Minimum pods that must migrate successfully before the node drains
    #[schemars(range(min = 1))]
    pub min_healthy_pods: u32,

    /// Seconds to wait for a node to finish draining
    #[schemars(range(min = 60))]
    pub drain_timeout: u64,
}

impl Default for PodManagement {
    fn default() -> Self {
        Self {
            max_pods_to_move: 3,
            min_healthy_pods: 2,
            drain_timeout: 600,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct Schedule {
    /// Whether completed campaigns restart automatically
    pub enabled: bool,

    /// Days between refresh cycles
    #[schemars(range(min = 1))]
    pub interval_days: u32,
}

impl Default for Schedule {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_days: 3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct HealthChecks {
    /// Seconds to wait for an evicted pod's replacement to become Ready
    #[schemars(range(min = 10))]
    pub readiness_timeout: u64,

    /// Whether liveness probing is expected for migrated workloads
    pub liveness_checks: bool,
}

impl Default for HealthChecks {
    fn default() -> Self {
        Self {
            readiness_timeout: 300,
            liveness_checks: true,
        }
    }
}

impl NodeRefreshSpec {
    /// Boundary validation for resources read back from the cluster.
    ///
    /// The CRD schema enforces these bounds at admission; this re-check
    /// covers resources that predate the schema or were written around it.
    pub fn validate(&self) -> Result<(), String> {
        let max = self.target_nodes.max_concurrent_nodes;
        if !(1..=10).contains(&max) {
            return Err(format!("maxConcurrentNodes must be in 1..=10, got {max}"));
        }
        if self.pod_management.max_pods_to_move < 1 {
            return Err("maxPodsToMove must be at least 1".to_string());
        }
        if self.pod_management.min_healthy_pods < 1 {
            return Err("minHealthyPods must be at least 1".to_string());
        }
        if self.pod_management.drain_timeout < 60 {
            return Err("drainTimeout must be at least 60 seconds".to_string());
        }
        if self.schedule.interval_days < 1 {
            return Err("intervalDays must be at least 1".to_string());
        }
        if self.health_checks.readiness_timeout < 10 {
            return Err("readinessTimeout must be at least 10 seconds".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct NodeRefreshStatus {
    /// Campaign phase
    #[serde(default)]
    pub phase: RefreshPhase,

    /// Nodes currently being refreshed, bounded by maxConcurrentNodes
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub current_nodes: Vec<String>,

    /// Nodes refreshed successfully during this cycle
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub processed_nodes: Vec<String>,

    /// Nodes whose refresh failed, with reason and timestamp
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failed_nodes: Vec<FailedNode>,

    /// When the current cycle started (RFC 3339)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<String>,

    /// When the campaign reached a terminal phase (RFC 3339)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completion_time: Option<String>,

    /// Human-readable progress summary
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FailedNode {
    /// Name of the node that failed to refresh
    pub node_name: String,

    /// Why the refresh failed
    pub reason: String,

    /// When the failure was recorded (RFC 3339)
    pub timestamp: String,
}

fn default_max_concurrent_nodes() -> u32 {
    1
}

/// Campaign phase
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "PascalCase")]
pub enum RefreshPhase {
    /// Waiting to start (or reset for a new cycle)
    #[default]
    Pending,

    /// Actively refreshing nodes
    Running,

    /// All target nodes accounted for
    Completed,

    /// Campaign could not start
    Failed,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_spec_defaults_from_minimal_json() {
        let spec: NodeRefreshSpec = serde_json::from_value(json!({
            "targetNodes": { "selector": { "role": "worker" } }
        }))
        .expect("minimal spec should deserialize");

        assert_eq!(spec.target_nodes.max_concurrent_nodes, 1);
        assert_eq!(spec.pod_management.max_pods_to_move, 3);
        assert_eq!(spec.pod_management.min_healthy_pods, 2);
        assert_eq!(spec.pod_management.drain_timeout, 600);
        assert!(!spec.schedule.enabled);
        assert_eq!(spec.schedule.interval_days, 3);
        assert_eq!(spec.health_checks.readiness_timeout, 300);
        assert!(spec.health_checks.liveness_checks);
    }

    #[test]
    fn test_partial_pod_management_fills_missing_fields() {
        let spec: NodeRefreshSpec = serde_json::from_value(json!({
            "targetNodes": { "selector": { "role": "worker" } },
            "podManagement": { "maxPodsToMove": 5 }
        }))
        .expect("partial spec should deserialize");

        assert_eq!(spec.pod_management.max_pods_to_move, 5);
        assert_eq!(spec.pod_management.min_healthy_pods, 2);
        assert_eq!(spec.pod_management.drain_timeout, 600);
    }

    #[test]
    fn test_phase_serializes_pascal_case() {
        assert_eq!(
            serde_json::to_value(RefreshPhase::Running).expect("serialize"),
            json!("Running")
        );
        let phase: RefreshPhase =
            serde_json::from_value(json!("Completed")).expect("deserialize");
        assert_eq!(phase, RefreshPhase::Completed);
    }

    #[test]
    fn test_status_defaults_to_pending() {
        let status = NodeRefreshStatus::default();
        assert_eq!(status.phase, RefreshPhase::Pending);
        assert!(status.current_nodes.is_empty());
        assert!(status.completion_time.is_none());
    }

    #[test]
    fn test_validate_rejects_out_of_range_concurrency() {
        let mut spec: NodeRefreshSpec = serde_json::from_value(json!({
            "targetNodes": { "selector": { "role": "worker" } }
        }))
        .expect("minimal spec should deserialize");

        spec.target_nodes.max_concurrent_nodes = 0;
        assert!(spec.validate().is_err());
        spec.target_nodes.max_concurrent_nodes = 11;
        assert!(spec.validate().is_err());
        spec.target_nodes.max_concurrent_nodes = 10;
        assert!(spec.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_short_drain_timeout() {
        let mut spec: NodeRefreshSpec = serde_json::from_value(json!({
            "targetNodes": { "selector": { "role": "worker" } }
        }))
        .expect("minimal spec should deserialize");

        spec.pod_management.drain_timeout = 30;
        assert!(spec.validate().is_err());
    }

    #[test]
    fn test_failed_node_uses_camel_case_keys() {
        let failed = FailedNode {
            node_name: "worker-1".to_string(),
            reason: "not ready for refresh".to_string(),
            timestamp: "2024-01-01T00:00:00Z".to_string(),
        };
        let value = serde_json::to_value(&failed).expect("serialize");
        assert_eq!(value["nodeName"], "worker-1");
        assert_eq!(value["reason"], "not ready for refresh");
    }
}
