//! Identity and trust-root material
//!
//! Deploys the certificate authority issuing workload identities and, when
//! the mesh requires mutual TLS, creates the default mesh-wide policy.
//! Everything after this step may depend on issued credentials, which is why
//! identity reconciles second, directly after the shared resources.

use std::sync::Arc;

use async_trait::async_trait;

use crate::apply::Applier;
use crate::components::{mesh_namespace, ComponentReconciler};
use crate::crd::{Mesh, MeshPolicy, MeshPolicySpec, MtlsMode, MtlsSettings};
use crate::resources::{manifest, Deployment, Service};
use crate::Error;

const IDENTITY_NAME: &str = "weft-identity";
const GRPC_CA_PORT: u16 = 8060;

/// Configuration for the identity component
#[derive(Clone, Debug, PartialEq)]
pub struct IdentityConfig {
    /// Namespace the control plane is installed into
    pub namespace: String,
    /// Identity issuer image
    pub image: String,
    /// Whether to create the default mesh-wide mTLS policy
    pub deploy_mesh_policy: bool,
    /// Whether the issuer generates its own self-signed root
    pub self_signed_ca: bool,
}

impl IdentityConfig {
    /// Derive the configuration from a Mesh snapshot
    pub fn derive(mesh: &Mesh) -> Self {
        Self {
            namespace: mesh_namespace(mesh),
            image: mesh.spec.image("identity"),
            deploy_mesh_policy: mesh.spec.mtls,
            self_signed_ca: true,
        }
    }
}

/// Reconciler for the identity issuer and trust-root material
pub struct Identity {
    config: IdentityConfig,
    applier: Arc<dyn Applier>,
}

impl Identity {
    /// Create the component with its immutable configuration
    pub fn new(config: IdentityConfig, applier: Arc<dyn Applier>) -> Self {
        Self { config, applier }
    }

    fn default_mesh_policy() -> MeshPolicy {
        MeshPolicy::new(
            "default",
            MeshPolicySpec {
                mtls: MtlsSettings {
                    mode: MtlsMode::Strict,
                },
            },
        )
    }
}

#[async_trait]
impl ComponentReconciler for Identity {
    fn name(&self) -> &'static str {
        "identity"
    }

    async fn reconcile(&self) -> Result<(), Error> {
        let ns = &self.config.namespace;

        let mut deployment = Deployment::control_plane(
            IDENTITY_NAME,
            ns,
            &self.config.image,
            &[("grpc-ca", GRPC_CA_PORT)],
        );
        if self.config.self_signed_ca {
            if let Some(issuer) = deployment.spec.template.spec.containers.first_mut() {
                issuer.args = Some(vec!["--self-signed-ca".to_string()]);
            }
        }
        self.applier.apply(&manifest(&deployment)?).await?;

        let service = Service::for_component(IDENTITY_NAME, ns, &[("grpc-ca", GRPC_CA_PORT)]);
        self.applier.apply(&manifest(&service)?).await?;

        if self.config.deploy_mesh_policy {
            self.applier
                .apply(&manifest(&Self::default_mesh_policy())?)
                .await?;
        }

        Ok(())
    }
}
