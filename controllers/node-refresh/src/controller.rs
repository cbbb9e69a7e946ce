//! Main controller implementation.
//!
//! This module contains the `Controller` struct that runs the polling
//! reconciliation loop for the Node Refresh Controller: list every
//! NodeRefresh resource, reconcile each one in isolation, sleep, repeat.
//! A failure in one campaign never stops the others; a failure to list at
//! all makes the loop wait longer before the next pass.

use crate::error::ControllerError;
use crate::reconciler::Reconciler;
use cluster_client::ClusterOps;
use crds::NodeRefresh;
use kube::api::ListParams;
use kube::{Api, Client, ResourceExt};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info, warn};

/// Delay between reconciliation passes.
const RECONCILE_INTERVAL: Duration = Duration::from_secs(30);

/// Delay after a pass-level error (e.g. listing campaigns failed).
const ERROR_BACKOFF: Duration = Duration::from_secs(60);

/// Polling controller for NodeRefresh campaigns.
pub struct Controller<C> {
    api: Api<NodeRefresh>,
    reconciler: Reconciler<C>,
    in_flight: SingleFlight,
}

impl<C: ClusterOps> Controller<C> {
    /// Creates a new controller instance. `namespace` limits which
    /// campaigns are watched; `None` means cluster-wide.
    pub fn new(kube_client: Client, cluster: Arc<C>, namespace: Option<String>) -> Self {
        let api: Api<NodeRefresh> = match namespace.as_deref() {
            Some(ns) => Api::namespaced(kube_client.clone(), ns),
            None => Api::all(kube_client.clone()),
        };
        Self {
            api,
            reconciler: Reconciler::new(cluster, kube_client),
            in_flight: SingleFlight::new(),
        }
    }

    /// Runs the reconciliation loop until shutdown is signalled.
    ///
    /// Shutdown is cooperative: the flag is checked between passes, so a
    /// pass already refreshing nodes finishes before the loop exits.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!("Node Refresh Controller running");

        loop {
            if *shutdown.borrow() {
                break;
            }

            let delay = match self.reconcile_all().await {
                Ok(()) => RECONCILE_INTERVAL,
                Err(e) => {
                    error!("Error in reconciliation loop: {}", e);
                    ERROR_BACKOFF
                }
            };

            tokio::select! {
                () = tokio::time::sleep(delay) => {}
                _ = shutdown.changed() => {}
            }
        }

        info!("Node Refresh Controller stopped gracefully");
    }

    /// Reconciles every NodeRefresh resource once, isolating per-campaign
    /// failures so one broken campaign cannot halt the rest.
    async fn reconcile_all(&self) -> Result<(), ControllerError> {
        let campaigns = self.api.list(&ListParams::default()).await?;

        for noderefresh in campaigns.items {
            let namespace = noderefresh
                .namespace()
                .unwrap_or_else(|| "default".to_string());
            let key = format!("{}/{}", namespace, noderefresh.name_any());

            let Some(_guard) = self.in_flight.acquire(&key) else {
                warn!("NodeRefresh {} is already being reconciled, skipping", key);
                continue;
            };

            if let Err(e) = self.reconciler.reconcile(&noderefresh).await {
                error!("Failed to reconcile NodeRefresh {}: {}", key, e);
            }
        }

        Ok(())
    }
}

/// Guard against overlapping reconciliation of the same campaign, keyed by
/// `namespace/name` and held for the duration of one pass over it.
#[derive(Clone, Default)]
pub(crate) struct SingleFlight {
    keys: Arc<Mutex<HashSet<String>>>,
}

impl SingleFlight {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Claims a key, returning `None` if it is already held. The claim is
    /// released when the returned guard drops.
    pub(crate) fn acquire(&self, key: &str) -> Option<SingleFlightGuard> {
        let mut keys = self.keys.lock().expect("single-flight lock poisoned");
        if !keys.insert(key.to_string()) {
            return None;
        }
        Some(SingleFlightGuard {
            keys: self.keys.clone(),
            key: key.to_string(),
        })
    }
}

/// RAII release for a claimed single-flight key.
pub(crate) struct SingleFlightGuard {
    keys: Arc<Mutex<HashSet<String>>>,
    key: String,
}

impl Drop for SingleFlightGuard {
    fn drop(&mut self) {
        if let Ok(mut keys) = self.keys.lock() {
            keys.remove(&self.key);
        }
    }
}
