//! Cluster client errors
//!
//! Internal error type for the Kubernetes-backed client. These never cross
//! the `ClusterOps` boundary; they are converted to `bool`/`Option`
//! outcomes and logged at the call site.

use thiserror::Error;

/// Errors raised by the underlying Kubernetes API calls
#[derive(Debug, Error)]
pub enum ClusterError {
    /// Kubernetes API error
    #[error("Kubernetes error: {0}")]
    Kube(#[from] kube::Error),
}
