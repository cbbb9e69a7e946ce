//! NodeRefresh CRD Definitions
//!
//! Kubernetes Custom Resource Definitions for the node refresh operator.

pub mod node_refresh;

pub use node_refresh::*;
