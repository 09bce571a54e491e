//! Mesh Custom Resource Definition
//!
//! The Mesh CRD is the single desired-state object describing one control-plane
//! installation. Component reconcilers never read the cluster to decide what to
//! build - everything is derived from this spec.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Specification for a Mesh control-plane installation
///
/// One Mesh per namespace describes the full control plane deployed there.
/// The two IP range lists are consumed by the sidecar-injection component;
/// the remaining fields feed every component's image selection and the
/// identity component's mTLS behavior.
#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "weft.dev",
    version = "v1alpha1",
    kind = "Mesh",
    plural = "meshes",
    shortname = "wm",
    namespaced,
    printcolumn = r#"{"name":"Version","type":"string","jsonPath":".spec.version"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct MeshSpec {
    /// Control-plane version; all component images are pinned to it
    pub version: String,

    /// Image registry for control-plane components
    #[serde(default = "default_hub")]
    pub hub: String,

    /// Whether workload-to-workload traffic requires mutual TLS
    #[serde(default = "default_mtls")]
    pub mtls: bool,

    /// Address ranges captured by sidecar traffic interception.
    /// `*` means all outbound traffic.
    #[serde(
        rename = "includeIPRanges",
        default,
        skip_serializing_if = "Vec::is_empty"
    )]
    pub include_ip_ranges: Vec<String>,

    /// Address ranges excluded from sidecar traffic interception
    #[serde(
        rename = "excludeIPRanges",
        default,
        skip_serializing_if = "Vec::is_empty"
    )]
    pub exclude_ip_ranges: Vec<String>,
}

fn default_hub() -> String {
    crate::DEFAULT_HUB.to_string()
}

fn default_mtls() -> bool {
    true
}

impl MeshSpec {
    /// Validate the mesh specification
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.version.trim().is_empty() {
            return Err(crate::Error::validation("spec.version must not be empty"));
        }
        validate_ranges("includeIPRanges", &self.include_ip_ranges, true)?;
        validate_ranges("excludeIPRanges", &self.exclude_ip_ranges, false)?;
        Ok(())
    }

    /// Fully qualified image reference for a control-plane component
    pub fn image(&self, component: &str) -> String {
        format!("{}/{}:{}", self.hub, component, self.version)
    }
}

/// Check that every entry is a CIDR block (`address/prefix`). The include
/// list additionally accepts the `*` wildcard for "all outbound traffic".
fn validate_ranges(field: &str, ranges: &[String], allow_wildcard: bool) -> Result<(), crate::Error> {
    for (i, range) in ranges.iter().enumerate() {
        if allow_wildcard && range == "*" {
            continue;
        }
        if !is_cidr(range) {
            return Err(crate::Error::validation(format!(
                "{field}[{i}] '{range}' is not a CIDR block"
            )));
        }
    }
    Ok(())
}

fn is_cidr(s: &str) -> bool {
    let Some((addr, prefix)) = s.split_once('/') else {
        return false;
    };
    let Ok(addr) = addr.parse::<std::net::IpAddr>() else {
        return false;
    };
    let Ok(prefix) = prefix.parse::<u8>() else {
        return false;
    };
    match addr {
        std::net::IpAddr::V4(_) => prefix <= 32,
        std::net::IpAddr::V6(_) => prefix <= 128,
    }
}
