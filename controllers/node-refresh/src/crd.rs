//! CRD bootstrap.
//!
//! Idempotent one-time setup of the NodeRefresh resource schema at
//! startup: look the CRD up by name, create it if the cluster has never
//! seen it, and propagate anything else as a startup failure.

use crate::error::ControllerError;
use crds::NodeRefresh;
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::api::PostParams;
use kube::{Api, Client, CustomResourceExt, ResourceExt};
use tracing::info;

/// Ensures the NodeRefresh CRD exists in the cluster.
pub async fn ensure_crd_exists(client: Client) -> Result<(), ControllerError> {
    let api: Api<CustomResourceDefinition> = Api::all(client);
    let crd = NodeRefresh::crd();
    let crd_name = crd.name_any();

    match api.get(&crd_name).await {
        Ok(_) => {
            info!("NodeRefresh CRD already exists");
            Ok(())
        }
        Err(kube::Error::Api(ae)) if ae.code == 404 => {
            api.create(&PostParams::default(), &crd).await?;
            info!("Successfully created NodeRefresh CRD");
            Ok(())
        }
        Err(e) => Err(ControllerError::Kube(e)),
    }
}
