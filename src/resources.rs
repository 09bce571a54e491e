//! Kubernetes resource builders for component manifests
//!
//! Plain serde types covering only the fields the component reconcilers set.
//! Components build these, serialize them with [`manifest`], and hand the
//! result to the [`crate::apply::Applier`]. Keeping the types local (rather
//! than pulling in the full generated API surface) keeps the emitted
//! manifests small and the tests readable.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;

use crate::Error;

/// Service account shared by all control-plane workloads
pub const CONTROL_PLANE_SERVICE_ACCOUNT: &str = "weft-control-plane";

/// Serialize a resource into the JSON form the applier consumes
pub fn manifest<T: Serialize>(resource: &T) -> Result<Value, Error> {
    serde_json::to_value(resource).map_err(|e| Error::serialization(e.to_string()))
}

/// Standard Kubernetes ObjectMeta, restricted to what components emit
#[derive(Clone, Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
    /// Resource name
    pub name: String,
    /// Resource namespace; absent for cluster-scoped resources
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    /// Labels
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
}

impl ObjectMeta {
    /// Metadata for a namespaced resource with standard Weft labels
    pub fn namespaced(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            labels: standard_labels(&name),
            name,
            namespace: Some(namespace.into()),
        }
    }

    /// Metadata for a cluster-scoped resource with standard Weft labels
    pub fn cluster_scoped(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            labels: standard_labels(&name),
            name,
            namespace: None,
        }
    }

    /// Add a label
    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }
}

fn standard_labels(name: &str) -> BTreeMap<String, String> {
    let mut labels = BTreeMap::new();
    labels.insert("app.kubernetes.io/name".to_string(), name.to_string());
    labels.insert(
        "app.kubernetes.io/managed-by".to_string(),
        "weft".to_string(),
    );
    labels
}

// =============================================================================
// Deployment
// =============================================================================

/// Kubernetes Deployment
#[derive(Clone, Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Deployment {
    /// API version
    pub api_version: String,
    /// Kind
    pub kind: String,
    /// Metadata
    pub metadata: ObjectMeta,
    /// Spec
    pub spec: DeploymentSpec,
}

impl Deployment {
    /// A single-container control-plane deployment running under the shared
    /// control-plane service account
    pub fn control_plane(
        name: &str,
        namespace: &str,
        image: &str,
        ports: &[(&str, u16)],
    ) -> Self {
        let mut selector = BTreeMap::new();
        selector.insert("app.kubernetes.io/name".to_string(), name.to_string());

        Self {
            api_version: "apps/v1".to_string(),
            kind: "Deployment".to_string(),
            metadata: ObjectMeta::namespaced(name, namespace),
            spec: DeploymentSpec {
                replicas: 1,
                selector: LabelSelector {
                    match_labels: selector,
                },
                template: PodTemplateSpec {
                    metadata: PodMeta {
                        labels: standard_labels(name),
                    },
                    spec: PodSpec {
                        service_account_name: CONTROL_PLANE_SERVICE_ACCOUNT.to_string(),
                        containers: vec![Container {
                            name: name.to_string(),
                            image: image.to_string(),
                            args: None,
                            ports: ports
                                .iter()
                                .map(|(port_name, port)| ContainerPort {
                                    name: Some((*port_name).to_string()),
                                    container_port: *port,
                                })
                                .collect(),
                        }],
                    },
                },
            },
        }
    }
}

/// Deployment spec
#[derive(Clone, Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentSpec {
    /// Number of replicas
    pub replicas: u32,
    /// Label selector
    pub selector: LabelSelector,
    /// Pod template
    pub template: PodTemplateSpec,
}

/// Label selector
#[derive(Clone, Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LabelSelector {
    /// Match labels
    pub match_labels: BTreeMap<String, String>,
}

/// Pod template spec
#[derive(Clone, Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PodTemplateSpec {
    /// Pod metadata
    pub metadata: PodMeta,
    /// Pod spec
    pub spec: PodSpec,
}

/// Pod metadata
#[derive(Clone, Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PodMeta {
    /// Labels
    pub labels: BTreeMap<String, String>,
}

/// Pod spec
#[derive(Clone, Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PodSpec {
    /// Service account name
    pub service_account_name: String,
    /// Containers
    pub containers: Vec<Container>,
}

/// Container spec
#[derive(Clone, Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Container {
    /// Container name
    pub name: String,
    /// Image
    pub image: String,
    /// Args
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub args: Option<Vec<String>>,
    /// Ports
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ports: Vec<ContainerPort>,
}

/// Container port
#[derive(Clone, Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ContainerPort {
    /// Port name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Port number
    pub container_port: u16,
}

// =============================================================================
// Service
// =============================================================================

/// Kubernetes Service
#[derive(Clone, Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Service {
    /// API version
    pub api_version: String,
    /// Kind
    pub kind: String,
    /// Metadata
    pub metadata: ObjectMeta,
    /// Spec
    pub spec: ServiceSpec,
}

impl Service {
    /// A ClusterIP service selecting the component's deployment pods
    pub fn for_component(name: &str, namespace: &str, ports: &[(&str, u16)]) -> Self {
        let mut selector = BTreeMap::new();
        selector.insert("app.kubernetes.io/name".to_string(), name.to_string());

        Self {
            api_version: "v1".to_string(),
            kind: "Service".to_string(),
            metadata: ObjectMeta::namespaced(name, namespace),
            spec: ServiceSpec {
                selector,
                ports: ports
                    .iter()
                    .map(|(port_name, port)| ServicePort {
                        name: Some((*port_name).to_string()),
                        port: *port,
                        target_port: None,
                    })
                    .collect(),
            },
        }
    }
}

/// Service spec
#[derive(Clone, Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ServiceSpec {
    /// Selector
    pub selector: BTreeMap<String, String>,
    /// Ports
    pub ports: Vec<ServicePort>,
}

/// Service port
#[derive(Clone, Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ServicePort {
    /// Port name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Port number
    pub port: u16,
    /// Target port, when it differs from the exposed port
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_port: Option<u16>,
}

// =============================================================================
// ServiceAccount / ConfigMap
// =============================================================================

/// Kubernetes ServiceAccount
#[derive(Clone, Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ServiceAccount {
    /// API version
    pub api_version: String,
    /// Kind
    pub kind: String,
    /// Metadata
    pub metadata: ObjectMeta,
}

impl ServiceAccount {
    /// Create a namespaced service account
    pub fn new(name: &str, namespace: &str) -> Self {
        Self {
            api_version: "v1".to_string(),
            kind: "ServiceAccount".to_string(),
            metadata: ObjectMeta::namespaced(name, namespace),
        }
    }
}

/// Kubernetes ConfigMap
#[derive(Clone, Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ConfigMap {
    /// API version
    pub api_version: String,
    /// Kind
    pub kind: String,
    /// Metadata
    pub metadata: ObjectMeta,
    /// Data
    pub data: BTreeMap<String, String>,
}

impl ConfigMap {
    /// Create a namespaced config map with the given data
    pub fn new(name: &str, namespace: &str, data: BTreeMap<String, String>) -> Self {
        Self {
            api_version: "v1".to_string(),
            kind: "ConfigMap".to_string(),
            metadata: ObjectMeta::namespaced(name, namespace),
            data,
        }
    }
}

// =============================================================================
// MutatingWebhookConfiguration
// =============================================================================

/// Kubernetes MutatingWebhookConfiguration
#[derive(Clone, Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MutatingWebhookConfiguration {
    /// API version
    pub api_version: String,
    /// Kind
    pub kind: String,
    /// Metadata
    pub metadata: ObjectMeta,
    /// Webhooks
    pub webhooks: Vec<MutatingWebhook>,
}

/// A single mutating webhook entry
#[derive(Clone, Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MutatingWebhook {
    /// Webhook name
    pub name: String,
    /// Supported AdmissionReview versions
    pub admission_review_versions: Vec<String>,
    /// Side effect class
    pub side_effects: String,
    /// What happens when the webhook is unreachable
    pub failure_policy: String,
    /// Client configuration pointing at the in-cluster service
    pub client_config: WebhookClientConfig,
    /// Rules selecting intercepted operations
    pub rules: Vec<RuleWithOperations>,
    /// Namespace selector limiting interception
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace_selector: Option<NamespaceSelector>,
}

/// Webhook client configuration
#[derive(Clone, Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WebhookClientConfig {
    /// In-cluster service serving the webhook
    pub service: ServiceReference,
}

/// Reference to the service backing a webhook
#[derive(Clone, Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ServiceReference {
    /// Service name
    pub name: String,
    /// Service namespace
    pub namespace: String,
    /// HTTP path on the service
    pub path: String,
    /// Service port
    pub port: u16,
}

/// Admission rule selecting resources and operations
#[derive(Clone, Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RuleWithOperations {
    /// Operations (CREATE, UPDATE, ...)
    pub operations: Vec<String>,
    /// API groups
    pub api_groups: Vec<String>,
    /// API versions
    pub api_versions: Vec<String>,
    /// Resource plurals
    pub resources: Vec<String>,
}

/// Namespace selector matching labeled namespaces
#[derive(Clone, Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NamespaceSelector {
    /// Labels a namespace must carry to be selected
    pub match_labels: BTreeMap<String, String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_control_plane_deployment_shape() {
        let dep = Deployment::control_plane(
            "weft-discovery",
            "mesh-system",
            "ghcr.io/weft-mesh/discovery:1.4.0",
            &[("grpc-xds", 15010)],
        );

        assert_eq!(dep.spec.template.spec.containers.len(), 1);
        assert_eq!(
            dep.spec.template.spec.service_account_name,
            CONTROL_PLANE_SERVICE_ACCOUNT
        );
        assert_eq!(
            dep.spec.selector.match_labels.get("app.kubernetes.io/name"),
            Some(&"weft-discovery".to_string())
        );
    }

    #[test]
    fn test_manifest_serialization_is_camel_case() {
        let dep = Deployment::control_plane("weft-identity", "mesh-system", "img:1", &[]);
        let value = manifest(&dep).expect("serializes");

        assert_eq!(value.pointer("/apiVersion"), Some(&"apps/v1".into()));
        assert!(value.pointer("/spec/template/spec/serviceAccountName").is_some());
    }

    #[test]
    fn test_cluster_scoped_metadata_omits_namespace() {
        let meta = ObjectMeta::cluster_scoped("weft-sidecar-injector");
        let value = serde_json::to_value(&meta).expect("serializes");
        assert!(value.get("namespace").is_none());
    }

    #[test]
    fn test_standard_labels_mark_weft_management() {
        let svc = Service::for_component("weft-telemetry", "mesh-system", &[("http", 9091)]);
        assert_eq!(
            svc.metadata.labels.get("app.kubernetes.io/managed-by"),
            Some(&"weft".to_string())
        );
    }
}
