//! Configuration distribution
//!
//! Deploys the service that validates mesh API objects and distributes them
//! to the rest of the control plane.

use std::sync::Arc;

use async_trait::async_trait;

use crate::apply::Applier;
use crate::components::{mesh_namespace, ComponentReconciler};
use crate::crd::Mesh;
use crate::resources::{manifest, Deployment, Service};
use crate::Error;

const DISTRIBUTION_NAME: &str = "weft-distribution";
const GRPC_MCP_PORT: u16 = 9901;

/// Configuration for the distribution component
#[derive(Clone, Debug, PartialEq)]
pub struct DistributionConfig {
    /// Namespace the control plane is installed into
    pub namespace: String,
    /// Distribution service image
    pub image: String,
}

impl DistributionConfig {
    /// Derive the configuration from a Mesh snapshot
    pub fn derive(mesh: &Mesh) -> Self {
        Self {
            namespace: mesh_namespace(mesh),
            image: mesh.spec.image("distribution"),
        }
    }
}

/// Reconciler for the configuration-distribution service
pub struct Distribution {
    config: DistributionConfig,
    applier: Arc<dyn Applier>,
}

impl Distribution {
    /// Create the component with its immutable configuration
    pub fn new(config: DistributionConfig, applier: Arc<dyn Applier>) -> Self {
        Self { config, applier }
    }
}

#[async_trait]
impl ComponentReconciler for Distribution {
    fn name(&self) -> &'static str {
        "distribution"
    }

    async fn reconcile(&self) -> Result<(), Error> {
        let ns = &self.config.namespace;

        let deployment = Deployment::control_plane(
            DISTRIBUTION_NAME,
            ns,
            &self.config.image,
            &[("grpc-mcp", GRPC_MCP_PORT)],
        );
        self.applier.apply(&manifest(&deployment)?).await?;

        let service =
            Service::for_component(DISTRIBUTION_NAME, ns, &[("grpc-mcp", GRPC_MCP_PORT)]);
        self.applier.apply(&manifest(&service)?).await?;

        Ok(())
    }
}
