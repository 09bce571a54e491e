//! Sidecar injection webhook
//!
//! Deploys the mutating admission webhook that injects sidecar proxies into
//! workload pods, together with its configuration map carrying the traffic
//! interception ranges from the Mesh spec. Runs last: an injected sidecar is
//! only useful once every other control-plane subsystem it talks to exists.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::apply::Applier;
use crate::components::{mesh_namespace, ComponentReconciler};
use crate::crd::Mesh;
use crate::resources::{
    manifest, ConfigMap, Deployment, MutatingWebhook, MutatingWebhookConfiguration,
    NamespaceSelector, ObjectMeta, RuleWithOperations, Service, ServiceReference,
    WebhookClientConfig,
};
use crate::Error;

const INJECTOR_NAME: &str = "weft-injector";
const INJECTOR_CONFIG_MAP: &str = "weft-injector-config";
const WEBHOOK_CONFIG_NAME: &str = "weft-sidecar-injector";
const WEBHOOK_PORT: u16 = 443;
const WEBHOOK_TARGET_PORT: u16 = 9443;

/// Label a namespace must carry for its pods to receive sidecars
pub const INJECTION_LABEL: &str = "weft.dev/injection";

/// Configuration for the sidecar-injection component
///
/// The two range lists are the projection of the Mesh spec's
/// `includeIPRanges`/`excludeIPRanges` fields - the only component
/// configuration that depends on them.
#[derive(Clone, Debug, PartialEq)]
pub struct InjectorConfig {
    /// Namespace the control plane is installed into
    pub namespace: String,
    /// Injector webhook image
    pub image: String,
    /// Address ranges captured by sidecar traffic interception
    pub include_ip_ranges: Vec<String>,
    /// Address ranges excluded from sidecar traffic interception
    pub exclude_ip_ranges: Vec<String>,
}

impl InjectorConfig {
    /// Derive the configuration from a Mesh snapshot
    pub fn derive(mesh: &Mesh) -> Self {
        Self {
            namespace: mesh_namespace(mesh),
            image: mesh.spec.image("injector"),
            include_ip_ranges: mesh.spec.include_ip_ranges.clone(),
            exclude_ip_ranges: mesh.spec.exclude_ip_ranges.clone(),
        }
    }
}

/// Reconciler for the sidecar-injection webhook
pub struct Injector {
    config: InjectorConfig,
    applier: Arc<dyn Applier>,
}

impl Injector {
    /// Create the component with its immutable configuration
    pub fn new(config: InjectorConfig, applier: Arc<dyn Applier>) -> Self {
        Self { config, applier }
    }

    fn injection_config_map(&self) -> ConfigMap {
        let mut data = BTreeMap::new();
        data.insert(
            "includeIPRanges".to_string(),
            self.config.include_ip_ranges.join(","),
        );
        data.insert(
            "excludeIPRanges".to_string(),
            self.config.exclude_ip_ranges.join(","),
        );
        ConfigMap::new(INJECTOR_CONFIG_MAP, &self.config.namespace, data)
    }

    fn webhook_configuration(&self) -> MutatingWebhookConfiguration {
        let mut namespace_labels = BTreeMap::new();
        namespace_labels.insert(INJECTION_LABEL.to_string(), "enabled".to_string());

        MutatingWebhookConfiguration {
            api_version: "admissionregistration.k8s.io/v1".to_string(),
            kind: "MutatingWebhookConfiguration".to_string(),
            metadata: ObjectMeta::cluster_scoped(WEBHOOK_CONFIG_NAME),
            webhooks: vec![MutatingWebhook {
                name: "inject.weft.dev".to_string(),
                admission_review_versions: vec!["v1".to_string()],
                side_effects: "None".to_string(),
                failure_policy: "Fail".to_string(),
                client_config: WebhookClientConfig {
                    service: ServiceReference {
                        name: INJECTOR_NAME.to_string(),
                        namespace: self.config.namespace.clone(),
                        path: "/inject".to_string(),
                        port: WEBHOOK_PORT,
                    },
                },
                rules: vec![RuleWithOperations {
                    operations: vec!["CREATE".to_string()],
                    api_groups: vec![String::new()],
                    api_versions: vec!["v1".to_string()],
                    resources: vec!["pods".to_string()],
                }],
                namespace_selector: Some(NamespaceSelector {
                    match_labels: namespace_labels,
                }),
            }],
        }
    }
}

#[async_trait]
impl ComponentReconciler for Injector {
    fn name(&self) -> &'static str {
        "injector"
    }

    async fn reconcile(&self) -> Result<(), Error> {
        let ns = &self.config.namespace;

        self.applier
            .apply(&manifest(&self.injection_config_map())?)
            .await?;

        let deployment = Deployment::control_plane(
            INJECTOR_NAME,
            ns,
            &self.config.image,
            &[("https-webhook", WEBHOOK_TARGET_PORT)],
        );
        self.applier.apply(&manifest(&deployment)?).await?;

        let mut service =
            Service::for_component(INJECTOR_NAME, ns, &[("https-webhook", WEBHOOK_PORT)]);
        if let Some(port) = service.spec.ports.first_mut() {
            port.target_port = Some(WEBHOOK_TARGET_PORT);
        }
        self.applier.apply(&manifest(&service)?).await?;

        self.applier
            .apply(&manifest(&self.webhook_configuration())?)
            .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::apply::testing::RecordingApplier;

    fn config() -> InjectorConfig {
        InjectorConfig {
            namespace: "mesh-system".to_string(),
            image: "ghcr.io/weft-mesh/injector:1.4.0".to_string(),
            include_ip_ranges: vec!["10.0.0.0/8".to_string(), "172.16.0.0/12".to_string()],
            exclude_ip_ranges: vec!["10.96.0.0/16".to_string()],
        }
    }

    #[tokio::test]
    async fn test_applies_full_webhook_stack_in_order() {
        let applier = Arc::new(RecordingApplier::new());
        let component = Injector::new(config(), applier.clone());

        component.reconcile().await.expect("reconcile succeeds");

        assert_eq!(
            applier.kinds(),
            vec![
                "ConfigMap",
                "Deployment",
                "Service",
                "MutatingWebhookConfiguration",
            ]
        );
    }

    #[tokio::test]
    async fn test_ip_ranges_land_in_the_injection_config() {
        let applier = Arc::new(RecordingApplier::new());
        let component = Injector::new(config(), applier.clone());

        component.reconcile().await.expect("reconcile succeeds");

        let config_map = &applier.manifests()[0];
        assert_eq!(
            config_map.pointer("/data/includeIPRanges"),
            Some(&"10.0.0.0/8,172.16.0.0/12".into())
        );
        assert_eq!(
            config_map.pointer("/data/excludeIPRanges"),
            Some(&"10.96.0.0/16".into())
        );
    }

    #[tokio::test]
    async fn test_webhook_only_intercepts_labeled_namespaces() {
        let applier = Arc::new(RecordingApplier::new());
        let component = Injector::new(config(), applier.clone());

        component.reconcile().await.expect("reconcile succeeds");

        let webhook = &applier.manifests()[3];
        assert_eq!(
            webhook.pointer(&format!(
                "/webhooks/0/namespaceSelector/matchLabels/{}",
                INJECTION_LABEL.replace('/', "~1")
            )),
            Some(&"enabled".into())
        );
        assert_eq!(
            webhook.pointer("/webhooks/0/clientConfig/service/path"),
            Some(&"/inject".into())
        );
    }
}
