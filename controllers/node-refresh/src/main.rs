//! Node Refresh Operator
//!
//! Rolls nodes in a compute cluster without service disruption.
//!
//! This controller reconciles `NodeRefresh` CRDs: it resolves target nodes
//! by selector, refreshes them in concurrency-bounded batches (readiness
//! check, disruption-budget precheck, replacement provisioning, pod
//! migration, drain), and tracks the campaign's progress in persisted
//! status so a controller restart resumes where it left off.

mod batch;
mod controller;
mod crd;
mod error;
mod reconciler;
mod refresh;
#[cfg(test)]
mod refresh_test;
#[cfg(test)]
mod test_utils;

use crate::controller::Controller;
use crate::error::ControllerError;
use cluster_client::ClusterClient;
use kube::Client;
use std::env;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<(), ControllerError> {
    tracing_subscriber::fmt::init();

    info!("Starting Node Refresh Operator");

    // Load configuration from environment variables
    let namespace = env::var("WATCH_NAMESPACE").ok();

    info!("Configuration:");
    info!(
        "  Namespace: {}",
        namespace.as_deref().unwrap_or("all namespaces")
    );

    // Create Kubernetes client
    let kube_client = Client::try_default().await?;

    // Ensure the CRD exists before reconciling anything
    crd::ensure_crd_exists(kube_client.clone()).await?;
    info!("CRD verified/created successfully");

    let cluster = Arc::new(ClusterClient::new(kube_client.clone()));
    let controller = Controller::new(kube_client, cluster, namespace);

    // Termination signals flip a flag observed between reconcile passes
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("Received shutdown signal, gracefully shutting down...");
        let _ = shutdown_tx.send(true);
    });

    controller.run(shutdown_rx).await;

    Ok(())
}

async fn shutdown_signal() {
    let interrupt = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to install SIGINT handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = interrupt => {}
        () = terminate => {}
    }
}
