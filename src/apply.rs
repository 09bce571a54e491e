//! Server-side apply of component manifests
//!
//! Every component reconciler receives an [`Applier`] at construction time.
//! It is the only path by which the pipeline mutates the cluster, which keeps
//! the capability explicit and lets tests observe exactly what a component
//! would create. Server-side apply makes each call idempotent: applying a
//! manifest that already matches the live object is a no-op.

use async_trait::async_trait;
use kube::api::{Api, DynamicObject, GroupVersionKind, Patch, PatchParams};
use kube::discovery::ApiResource;
use kube::Client;
use serde_json::Value;
use tracing::debug;

#[cfg(test)]
use mockall::automock;

use crate::{Error, FIELD_MANAGER};

/// Shared cluster-mutation capability threaded through every component
#[cfg_attr(test, automock)]
#[async_trait]
pub trait Applier: Send + Sync {
    /// Apply a manifest, creating the object or updating it in place
    async fn apply(&self, manifest: &Value) -> Result<(), Error>;
}

/// Real applier performing server-side apply through the Kubernetes API
pub struct ServerSideApplier {
    client: Client,
}

impl ServerSideApplier {
    /// Create a new applier wrapping the given kube Client
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Applier for ServerSideApplier {
    async fn apply(&self, manifest: &Value) -> Result<(), Error> {
        let target = ApplyTarget::from_manifest(manifest)?;

        let (group, version) = split_api_version(&target.api_version);
        let gvk = GroupVersionKind {
            group: group.to_string(),
            version: version.to_string(),
            kind: target.kind.clone(),
        };
        let ar = ApiResource::from_gvk(&gvk);

        let api: Api<DynamicObject> = match &target.namespace {
            Some(ns) => Api::namespaced_with(self.client.clone(), ns, &ar),
            None => Api::all_with(self.client.clone(), &ar),
        };

        let params = PatchParams::apply(FIELD_MANAGER).force();
        api.patch(&target.name, &params, &Patch::Apply(manifest))
            .await?;

        debug!(kind = %target.kind, name = %target.name, "applied manifest");
        Ok(())
    }
}

/// Addressing fields extracted from a manifest
#[derive(Debug)]
struct ApplyTarget {
    kind: String,
    api_version: String,
    name: String,
    namespace: Option<String>,
}

impl ApplyTarget {
    fn from_manifest(manifest: &Value) -> Result<Self, Error> {
        let kind = required_str(manifest, "/kind")?;
        let api_version = required_str(manifest, "/apiVersion")?;
        let name = required_str(manifest, "/metadata/name")?;
        let namespace = manifest
            .pointer("/metadata/namespace")
            .and_then(Value::as_str)
            .map(String::from);

        Ok(Self {
            kind,
            api_version,
            name,
            namespace,
        })
    }
}

fn required_str(manifest: &Value, pointer: &str) -> Result<String, Error> {
    manifest
        .pointer(pointer)
        .and_then(Value::as_str)
        .map(String::from)
        .ok_or_else(|| Error::serialization(format!("manifest missing {pointer}")))
}

/// Split an apiVersion into group and version components.
/// Core API resources ("v1") have an empty group.
fn split_api_version(api_version: &str) -> (&str, &str) {
    match api_version.rsplit_once('/') {
        Some((group, version)) => (group, version),
        None => ("", api_version),
    }
}
