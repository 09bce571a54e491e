//! Traffic management
//!
//! Deploys the discovery service that programs sidecars and gateways from
//! user-authored `TrafficPolicy` objects. Gateways and injected sidecars
//! both connect to its xDS endpoint, so it reconciles before either of them.

use std::sync::Arc;

use async_trait::async_trait;

use crate::apply::Applier;
use crate::components::{mesh_namespace, ComponentReconciler};
use crate::crd::Mesh;
use crate::resources::{manifest, Deployment, Service};
use crate::Error;

const DISCOVERY_NAME: &str = "weft-discovery";
const GRPC_XDS_PORT: u16 = 15010;
const HTTP_DEBUG_PORT: u16 = 15014;

/// Configuration for the traffic-management component
#[derive(Clone, Debug, PartialEq)]
pub struct TrafficConfig {
    /// Namespace the control plane is installed into
    pub namespace: String,
    /// Discovery service image
    pub image: String,
}

impl TrafficConfig {
    /// Derive the configuration from a Mesh snapshot
    pub fn derive(mesh: &Mesh) -> Self {
        Self {
            namespace: mesh_namespace(mesh),
            image: mesh.spec.image("discovery"),
        }
    }
}

/// Reconciler for the traffic-management discovery service
pub struct Traffic {
    config: TrafficConfig,
    applier: Arc<dyn Applier>,
}

impl Traffic {
    /// Create the component with its immutable configuration
    pub fn new(config: TrafficConfig, applier: Arc<dyn Applier>) -> Self {
        Self { config, applier }
    }
}

#[async_trait]
impl ComponentReconciler for Traffic {
    fn name(&self) -> &'static str {
        "traffic"
    }

    async fn reconcile(&self) -> Result<(), Error> {
        let ns = &self.config.namespace;
        let ports = [("grpc-xds", GRPC_XDS_PORT), ("http-debug", HTTP_DEBUG_PORT)];

        let deployment =
            Deployment::control_plane(DISCOVERY_NAME, ns, &self.config.image, &ports);
        self.applier.apply(&manifest(&deployment)?).await?;

        let service = Service::for_component(DISCOVERY_NAME, ns, &ports);
        self.applier.apply(&manifest(&service)?).await?;

        Ok(())
    }
}
