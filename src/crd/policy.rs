//! Mesh API kinds
//!
//! The closed set of custom resource kinds the control plane serves. Their
//! definitions are registered by the schema gate before any component
//! reconciler runs, because components create or watch instances of them:
//! the identity component creates the default `MeshPolicy`, while
//! `TrafficPolicy` and `GatewayRoute` are authored by users and consumed by
//! the traffic-management and gateway components.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Cluster-wide mutual TLS policy
///
/// A single `default` MeshPolicy is created by the identity component when
/// the mesh has mTLS enabled.
#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "weft.dev",
    version = "v1alpha1",
    kind = "MeshPolicy",
    plural = "meshpolicies"
)]
#[serde(rename_all = "camelCase")]
pub struct MeshPolicySpec {
    /// Mutual TLS settings applied mesh-wide
    pub mtls: MtlsSettings,
}

/// Mutual TLS settings
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MtlsSettings {
    /// Enforcement mode
    #[serde(default)]
    pub mode: MtlsMode,
}

/// Mutual TLS enforcement mode
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
#[non_exhaustive]
pub enum MtlsMode {
    /// Only mutual TLS connections are accepted
    #[default]
    Strict,
    /// Both plaintext and mutual TLS connections are accepted
    Permissive,
}

/// Routing rules for a mesh-internal host, consumed by the
/// traffic-management component
#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "weft.dev",
    version = "v1alpha1",
    kind = "TrafficPolicy",
    plural = "trafficpolicies",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct TrafficPolicySpec {
    /// Destination host the policy applies to
    pub host: String,

    /// Number of retries for failed requests
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retries: Option<u32>,

    /// Per-request timeout in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<u64>,
}

/// Binding of external hosts to a gateway, consumed by the gateway component
#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "weft.dev",
    version = "v1alpha1",
    kind = "GatewayRoute",
    plural = "gatewayroutes",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct GatewayRouteSpec {
    /// External hostnames served by the gateway
    pub hosts: Vec<String>,

    /// Gateway port the hosts are exposed on
    pub port: u16,

    /// Protocol served on the port
    #[serde(default)]
    pub protocol: RouteProtocol,
}

/// Protocol for a gateway route
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
#[non_exhaustive]
pub enum RouteProtocol {
    /// Plain HTTP
    #[default]
    Http,
    /// TLS-terminated HTTPS
    Https,
    /// Raw TCP passthrough
    Tcp,
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube::CustomResourceExt;

    #[test]
    fn test_mtls_mode_defaults_to_strict() {
        let settings: MtlsSettings = serde_json::from_value(serde_json::json!({}))
            .expect("empty settings should deserialize");
        assert_eq!(settings.mode, MtlsMode::Strict);
    }

    #[test]
    fn test_mtls_mode_wire_format_is_uppercase() {
        let json = serde_json::to_value(MtlsMode::Permissive).expect("serialize");
        assert_eq!(json, serde_json::json!("PERMISSIVE"));
    }

    /// The mesh API group owns every kind the schema gate registers
    #[test]
    fn test_mesh_api_kinds_share_the_group() {
        for crd in [MeshPolicy::crd(), TrafficPolicy::crd(), GatewayRoute::crd()] {
            assert_eq!(crd.spec.group, "weft.dev");
        }
    }

    /// MeshPolicy is cluster-scoped; the policy applies to the whole mesh
    #[test]
    fn test_mesh_policy_is_cluster_scoped() {
        assert_eq!(MeshPolicy::crd().spec.scope, "Cluster");
        assert_eq!(TrafficPolicy::crd().spec.scope, "Namespaced");
    }
}
