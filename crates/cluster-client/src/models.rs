//! Typed views of live cluster objects.

use k8s_openapi::api::core::v1::Pod;
use kube::ResourceExt;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The slice of a pod the refresh protocol needs: identity, labels for
/// disruption-budget matching, placement, and phase.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PodSummary {
    /// Pod name
    pub name: String,

    /// Pod namespace
    pub namespace: String,

    /// Pod labels (used for disruption-budget selector matching)
    #[serde(default)]
    pub labels: BTreeMap<String, String>,

    /// Node the pod is bound to, if scheduled
    pub node_name: Option<String>,

    /// Pod phase as reported by the cluster
    pub phase: Option<String>,
}

impl PodSummary {
    /// Projects a live pod object down to the fields the refresh uses.
    pub fn from_pod(pod: &Pod) -> Self {
        Self {
            name: pod.name_any(),
            namespace: pod.namespace().unwrap_or_else(|| "default".to_string()),
            labels: pod.metadata.labels.clone().unwrap_or_default(),
            node_name: pod.spec.as_ref().and_then(|s| s.node_name.clone()),
            phase: pod.status.as_ref().and_then(|s| s.phase.clone()),
        }
    }
}
