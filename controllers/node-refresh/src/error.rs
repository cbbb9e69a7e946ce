//! Controller-specific error types.
//!
//! This module defines error types specific to the Node Refresh Controller
//! that are not covered by upstream library errors.

use kube::Error as KubeError;
use thiserror::Error;

/// Errors that can occur in the Node Refresh Controller.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// Kubernetes API error
    #[error("Kubernetes error: {0}")]
    Kube(#[from] KubeError),

    /// Resource serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Resource failed boundary validation
    #[error("Invalid resource: {0}")]
    InvalidResource(String),

    /// Status write kept conflicting with a concurrent editor
    #[error("Status update conflict for {0}")]
    StatusConflict(String),
}
