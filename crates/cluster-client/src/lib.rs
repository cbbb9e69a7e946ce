//! Kubernetes Cluster Capability Client
//!
//! The leaf operations the node refresh operator performs against a live
//! cluster: node lookup and cordoning, pod inventory and eviction,
//! disruption-budget checks, and readiness/drain polling.
//!
//! Every operation reports failure as a `bool`/`Option` outcome instead of
//! an error type. Callers sequence outcomes; the client owns the logging
//! and the conversion of API errors into those outcomes.
//!
//! # Example
//!
//! ```no_run
//! use cluster_client::{ClusterClient, ClusterOps};
//! use std::collections::BTreeMap;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let kube_client = kube::Client::try_default().await?;
//! let cluster = ClusterClient::new(kube_client);
//!
//! let selector = BTreeMap::from([("role".to_string(), "worker".to_string())]);
//! let nodes = cluster.find_nodes_by_selector(&selector).await;
//!
//! for node in &nodes {
//!     if cluster.is_node_ready_for_refresh(node).await {
//!         let pods = cluster.get_pods_on_node(node).await;
//!         println!("{node}: {} pods", pods.len());
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod error;
pub mod models;
#[path = "trait.rs"]
pub mod cluster_trait;
#[cfg(any(test, feature = "test-util"))]
pub mod mock;

pub use client::ClusterClient;
pub use cluster_trait::ClusterOps;
pub use error::ClusterError;
pub use models::PodSummary;
#[cfg(any(test, feature = "test-util"))]
pub use mock::{MockClusterClient, MockNode};
