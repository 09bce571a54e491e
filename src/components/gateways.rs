//! Ingress and egress gateways
//!
//! Deploys the gateway proxies carrying traffic into and out of the mesh.
//! Gateway pods fetch their certificates from the identity issuer and their
//! routes from the discovery service, so this step runs after both.

use std::sync::Arc;

use async_trait::async_trait;

use crate::apply::Applier;
use crate::components::{mesh_namespace, ComponentReconciler};
use crate::crd::Mesh;
use crate::resources::{manifest, Deployment, Service};
use crate::Error;

const INGRESS_NAME: &str = "weft-ingressgateway";
const EGRESS_NAME: &str = "weft-egressgateway";
const GATEWAY_PORTS: [(&str, u16); 2] = [("http2", 80), ("https", 443)];

/// Configuration for the gateway component
#[derive(Clone, Debug, PartialEq)]
pub struct GatewayConfig {
    /// Namespace the control plane is installed into
    pub namespace: String,
    /// Gateway proxy image
    pub image: String,
}

impl GatewayConfig {
    /// Derive the configuration from a Mesh snapshot
    pub fn derive(mesh: &Mesh) -> Self {
        Self {
            namespace: mesh_namespace(mesh),
            image: mesh.spec.image("proxy"),
        }
    }
}

/// Reconciler for the ingress and egress gateway proxies
pub struct Gateways {
    config: GatewayConfig,
    applier: Arc<dyn Applier>,
}

impl Gateways {
    /// Create the component with its immutable configuration
    pub fn new(config: GatewayConfig, applier: Arc<dyn Applier>) -> Self {
        Self { config, applier }
    }

    async fn reconcile_gateway(&self, name: &str) -> Result<(), Error> {
        let ns = &self.config.namespace;

        let deployment =
            Deployment::control_plane(name, ns, &self.config.image, &GATEWAY_PORTS);
        self.applier.apply(&manifest(&deployment)?).await?;

        let service = Service::for_component(name, ns, &GATEWAY_PORTS);
        self.applier.apply(&manifest(&service)?).await?;

        Ok(())
    }
}

#[async_trait]
impl ComponentReconciler for Gateways {
    fn name(&self) -> &'static str {
        "gateways"
    }

    async fn reconcile(&self) -> Result<(), Error> {
        self.reconcile_gateway(INGRESS_NAME).await?;
        self.reconcile_gateway(EGRESS_NAME).await?;
        Ok(())
    }
}
