//! Policy and telemetry
//!
//! Deploys the service that evaluates request policies and aggregates
//! telemetry reported by sidecars.

use std::sync::Arc;

use async_trait::async_trait;

use crate::apply::Applier;
use crate::components::{mesh_namespace, ComponentReconciler};
use crate::crd::Mesh;
use crate::resources::{manifest, Deployment, Service};
use crate::Error;

const TELEMETRY_NAME: &str = "weft-telemetry";
const GRPC_REPORT_PORT: u16 = 9091;

/// Configuration for the policy/telemetry component
#[derive(Clone, Debug, PartialEq)]
pub struct TelemetryConfig {
    /// Namespace the control plane is installed into
    pub namespace: String,
    /// Telemetry service image
    pub image: String,
}

impl TelemetryConfig {
    /// Derive the configuration from a Mesh snapshot
    pub fn derive(mesh: &Mesh) -> Self {
        Self {
            namespace: mesh_namespace(mesh),
            image: mesh.spec.image("telemetry"),
        }
    }
}

/// Reconciler for the policy/telemetry service
pub struct Telemetry {
    config: TelemetryConfig,
    applier: Arc<dyn Applier>,
}

impl Telemetry {
    /// Create the component with its immutable configuration
    pub fn new(config: TelemetryConfig, applier: Arc<dyn Applier>) -> Self {
        Self { config, applier }
    }
}

#[async_trait]
impl ComponentReconciler for Telemetry {
    fn name(&self) -> &'static str {
        "telemetry"
    }

    async fn reconcile(&self) -> Result<(), Error> {
        let ns = &self.config.namespace;

        let deployment = Deployment::control_plane(
            TELEMETRY_NAME,
            ns,
            &self.config.image,
            &[("grpc-report", GRPC_REPORT_PORT)],
        );
        self.applier.apply(&manifest(&deployment)?).await?;

        let service =
            Service::for_component(TELEMETRY_NAME, ns, &[("grpc-report", GRPC_REPORT_PORT)]);
        self.applier.apply(&manifest(&service)?).await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::apply::testing::RecordingApplier;

    #[tokio::test]
    async fn test_creates_deployment_and_service() {
        let applier = Arc::new(RecordingApplier::new());
        let component = Telemetry::new(
            TelemetryConfig {
                namespace: "mesh-system".to_string(),
                image: "ghcr.io/weft-mesh/telemetry:1.4.0".to_string(),
            },
            applier.clone(),
        );

        component.reconcile().await.expect("reconcile succeeds");

        assert_eq!(applier.kinds(), vec!["Deployment", "Service"]);
    }
}
