//! Mesh API definition registration
//!
//! Component reconcilers create and watch custom resources (the identity
//! component creates the default [`crate::crd::MeshPolicy`]; traffic and
//! gateway components consume user-authored policies). Their definitions must
//! be registered cluster-wide before any component runs, so registration is a
//! prerequisite gate evaluated once per pass - structurally separate from the
//! ordered pipeline rather than being its first step. A registration failure
//! aborts the pass before any component work starts.
//!
//! The operation is server-side apply of the full definition set, so it is
//! idempotent and safe to run on every pass.

use async_trait::async_trait;
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::api::{Api, Patch, PatchParams};
use kube::{Client, CustomResourceExt};
use tracing::debug;

#[cfg(test)]
use mockall::automock;

use crate::crd::{GatewayRoute, Mesh, MeshPolicy, TrafficPolicy};
use crate::{Error, FIELD_MANAGER};

/// Prerequisite gate ensuring the mesh API definitions exist
#[cfg_attr(test, automock)]
#[async_trait]
pub trait SchemaInitializer: Send + Sync {
    /// Ensure every definition the pipeline depends on is registered
    async fn ensure(&self, mesh: &Mesh) -> Result<(), Error>;
}

/// Real initializer applying the definitions through the Kubernetes API
pub struct CrdInstaller {
    client: Client,
}

impl CrdInstaller {
    /// Create a new installer wrapping the given kube Client
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// The closed set of definitions the component pipeline depends on
    pub fn required_crds() -> Vec<CustomResourceDefinition> {
        vec![MeshPolicy::crd(), TrafficPolicy::crd(), GatewayRoute::crd()]
    }
}

#[async_trait]
impl SchemaInitializer for CrdInstaller {
    async fn ensure(&self, _mesh: &Mesh) -> Result<(), Error> {
        let api: Api<CustomResourceDefinition> = Api::all(self.client.clone());
        let params = PatchParams::apply(FIELD_MANAGER).force();

        for crd in Self::required_crds() {
            let name = crd
                .metadata
                .name
                .clone()
                .ok_or_else(|| Error::crd_registration("definition is missing a name"))?;

            api.patch(&name, &params, &Patch::Apply(&crd))
                .await
                .map_err(|e| Error::crd_registration(format!("failed to apply {name}: {e}")))?;

            debug!(crd = %name, "mesh API definition applied");
        }

        Ok(())
    }
}
