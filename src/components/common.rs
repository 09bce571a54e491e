//! Foundational shared resources
//!
//! Runs first: every later component schedules workloads under the shared
//! control-plane service account and reads the mesh-wide config map.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::apply::Applier;
use crate::components::{mesh_namespace, ComponentReconciler};
use crate::crd::Mesh;
use crate::resources::{manifest, ConfigMap, ServiceAccount, CONTROL_PLANE_SERVICE_ACCOUNT};
use crate::Error;

/// Name of the mesh-wide configuration map
pub const MESH_CONFIG_MAP: &str = "weft-mesh-config";

/// Configuration for the common component
#[derive(Clone, Debug, PartialEq)]
pub struct CommonConfig {
    /// Namespace the control plane is installed into
    pub namespace: String,
    /// Control-plane version recorded in the mesh config map
    pub version: String,
}

impl CommonConfig {
    /// Derive the configuration from a Mesh snapshot
    pub fn derive(mesh: &Mesh) -> Self {
        Self {
            namespace: mesh_namespace(mesh),
            version: mesh.spec.version.clone(),
        }
    }
}

/// Reconciler for foundational shared resources
pub struct Common {
    config: CommonConfig,
    applier: Arc<dyn Applier>,
}

impl Common {
    /// Create the component with its immutable configuration
    pub fn new(config: CommonConfig, applier: Arc<dyn Applier>) -> Self {
        Self { config, applier }
    }
}

#[async_trait]
impl ComponentReconciler for Common {
    fn name(&self) -> &'static str {
        "common"
    }

    async fn reconcile(&self) -> Result<(), Error> {
        let ns = &self.config.namespace;

        let account = ServiceAccount::new(CONTROL_PLANE_SERVICE_ACCOUNT, ns);
        self.applier.apply(&manifest(&account)?).await?;

        let mut data = BTreeMap::new();
        data.insert("meshVersion".to_string(), self.config.version.clone());
        data.insert("trustDomain".to_string(), "cluster.local".to_string());
        let config_map = ConfigMap::new(MESH_CONFIG_MAP, ns, data);
        self.applier.apply(&manifest(&config_map)?).await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::apply::testing::RecordingApplier;

    #[tokio::test]
    async fn test_creates_service_account_and_mesh_config() {
        let applier = Arc::new(RecordingApplier::new());
        let component = Common::new(
            CommonConfig {
                namespace: "mesh-system".to_string(),
                version: "1.4.0".to_string(),
            },
            applier.clone(),
        );

        component.reconcile().await.expect("reconcile succeeds");

        assert_eq!(applier.kinds(), vec!["ServiceAccount", "ConfigMap"]);
        let config_map = &applier.manifests()[1];
        assert_eq!(
            config_map.pointer("/data/meshVersion"),
            Some(&"1.4.0".into())
        );
    }
}
