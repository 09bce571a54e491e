//! Mesh controller implementation
//!
//! One reconciliation pass per invocation: fetch the `Mesh` object fresh,
//! register prerequisite mesh API definitions, build the ordered component
//! pipeline from the spec, and execute it sequentially with fail-fast
//! semantics. The pass holds no state across invocations - a retried pass
//! restarts from the fetch, re-running every prerequisite and component.
//! That trade keeps recovery trivial and is paid for by requiring every
//! component to be idempotent.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use kube::runtime::controller::Action;
use kube::{Api, Client, ResourceExt};
use tracing::{debug, error, info, instrument};

#[cfg(test)]
use mockall::automock;

use crate::apply::{Applier, ServerSideApplier};
use crate::components::{build_pipeline, execute_pipeline};
use crate::crd::Mesh;
use crate::schema::{CrdInstaller, SchemaInitializer};
use crate::Error;

/// Requeue delay handed to the controller runtime after a failed pass.
/// Backoff shaping and retry limits belong to the runtime, not to this loop;
/// every failure is retried until the spec converges or changes.
const RETRY_DELAY: Duration = Duration::from_secs(5);

/// Key addressing at most one Mesh object
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MeshKey {
    /// Namespace of the Mesh object
    pub namespace: String,
    /// Name of the Mesh object
    pub name: String,
}

impl MeshKey {
    /// Create a key from namespace and name
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Key addressing the given Mesh object
    pub fn from_mesh(mesh: &Mesh) -> Self {
        Self {
            namespace: mesh.namespace().unwrap_or_else(|| "default".to_string()),
            name: mesh.name_any(),
        }
    }
}

impl fmt::Display for MeshKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Key-addressed read access to Mesh objects
///
/// A missing object is a distinguished outcome (`Ok(None)`), never an error:
/// deletion is a normal terminal state for a pass.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait MeshSource: Send + Sync {
    /// Fetch the Mesh for a key, or `None` if it does not exist
    async fn get(&self, key: &MeshKey) -> Result<Option<Mesh>, Error>;
}

/// Real Mesh accessor reading through the Kubernetes API
pub struct MeshApi {
    client: Client,
}

impl MeshApi {
    /// Create a new accessor wrapping the given kube Client
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl MeshSource for MeshApi {
    async fn get(&self, key: &MeshKey) -> Result<Option<Mesh>, Error> {
        let api: Api<Mesh> = Api::namespaced(self.client.clone(), &key.namespace);
        Ok(api.get_opt(&key.name).await?)
    }
}

/// Controller context holding the collaborators of one pass
///
/// Shared across all reconciliation calls; each pass takes its own fresh
/// `Mesh` snapshot through [`MeshSource`], so no mutable state lives here.
///
/// Use [`ContextBuilder`] to construct instances:
///
/// ```ignore
/// let ctx = Context::builder(client).build();
/// ```
pub struct Context {
    /// Desired-state accessor (trait object for testability)
    pub meshes: Arc<dyn MeshSource>,
    /// Prerequisite schema gate
    pub schema: Arc<dyn SchemaInitializer>,
    /// Cluster-mutation capability threaded into every component
    pub applier: Arc<dyn Applier>,
}

impl Context {
    /// Create a builder for constructing a Context
    pub fn builder(client: Client) -> ContextBuilder {
        ContextBuilder::new(client)
    }

    /// Create a context for testing with custom collaborators
    #[cfg(test)]
    pub fn for_testing(
        meshes: Arc<dyn MeshSource>,
        schema: Arc<dyn SchemaInitializer>,
        applier: Arc<dyn Applier>,
    ) -> Self {
        Self {
            meshes,
            schema,
            applier,
        }
    }
}

/// Builder for constructing [`Context`] instances
///
/// Defaults to the real Kubernetes-backed collaborators; each can be
/// overridden individually (primarily for tests).
pub struct ContextBuilder {
    client: Client,
    meshes: Option<Arc<dyn MeshSource>>,
    schema: Option<Arc<dyn SchemaInitializer>>,
    applier: Option<Arc<dyn Applier>>,
}

impl ContextBuilder {
    fn new(client: Client) -> Self {
        Self {
            client,
            meshes: None,
            schema: None,
            applier: None,
        }
    }

    /// Override the desired-state accessor
    pub fn mesh_source(mut self, meshes: Arc<dyn MeshSource>) -> Self {
        self.meshes = Some(meshes);
        self
    }

    /// Override the schema initializer
    pub fn schema_initializer(mut self, schema: Arc<dyn SchemaInitializer>) -> Self {
        self.schema = Some(schema);
        self
    }

    /// Override the cluster-mutation capability
    pub fn applier(mut self, applier: Arc<dyn Applier>) -> Self {
        self.applier = Some(applier);
        self
    }

    /// Build the Context
    pub fn build(self) -> Context {
        Context {
            meshes: self
                .meshes
                .unwrap_or_else(|| Arc::new(MeshApi::new(self.client.clone()))),
            schema: self
                .schema
                .unwrap_or_else(|| Arc::new(CrdInstaller::new(self.client.clone()))),
            applier: self
                .applier
                .unwrap_or_else(|| Arc::new(ServerSideApplier::new(self.client.clone()))),
        }
    }
}

/// Run one reconciliation pass for the Mesh addressed by `key`.
///
/// The pass is synchronous and sequential:
/// 1. Fetch the Mesh. Absent means deleted - a normal terminal state, done.
/// 2. Register the mesh API definitions (prerequisite gate). A failure here
///    aborts the pass before any component runs.
/// 3. Build the ordered component pipeline from the spec and execute it
///    strictly in order, stopping at the first error.
///
/// Every error is surfaced to the controller runtime for retry; nothing is
/// treated as permanently fatal here.
#[instrument(skip_all, fields(namespace = %key.namespace, name = %key.name))]
pub async fn reconcile_mesh(key: &MeshKey, ctx: &Context) -> Result<Action, Error> {
    info!("reconciling mesh");

    let Some(mesh) = ctx.meshes.get(key).await? else {
        // Created resources are garbage-collected with the owner; deletion
        // needs no work from this loop.
        debug!("mesh not found, nothing to reconcile");
        return Ok(Action::await_change());
    };

    mesh.spec.validate()?;

    debug!("registering mesh API definitions");
    ctx.schema.ensure(&mesh).await?;

    let pipeline = build_pipeline(&mesh, &ctx.applier);
    execute_pipeline(&pipeline).await?;

    info!("mesh reconciled");
    Ok(Action::await_change())
}

/// Reconcile entry point for the controller runtime.
///
/// The watched object only identifies the key; the pass re-fetches the Mesh
/// fresh so no snapshot is ever reused across passes.
pub async fn reconcile(mesh: Arc<Mesh>, ctx: Arc<Context>) -> Result<Action, Error> {
    let key = MeshKey::from_mesh(&mesh);
    reconcile_mesh(&key, &ctx).await
}

/// Error policy for the controller
///
/// Logs the failure with pass-identifying context and asks the runtime to
/// retry the full pass. The core imposes no retry limit; convergence is the
/// runtime's responsibility.
pub fn error_policy(mesh: Arc<Mesh>, error: &Error, _ctx: Arc<Context>) -> Action {
    error!(
        ?error,
        mesh = %MeshKey::from_mesh(&mesh),
        "reconciliation failed"
    );
    Action::requeue(RETRY_DELAY)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::apply::testing::RecordingApplier;
    use crate::apply::MockApplier;
    use crate::crd::MeshSpec;
    use crate::schema::MockSchemaInitializer;

    fn sample_mesh(name: &str, namespace: &str) -> Mesh {
        let mut mesh = Mesh::new(
            name,
            MeshSpec {
                version: "1.4.0".to_string(),
                hub: crate::DEFAULT_HUB.to_string(),
                mtls: true,
                include_ip_ranges: vec!["10.0.0.0/8".to_string()],
                exclude_ip_ranges: vec![],
            },
        );
        mesh.metadata.namespace = Some(namespace.to_string());
        mesh
    }

    fn invalid_mesh(name: &str, namespace: &str) -> Mesh {
        let mut mesh = sample_mesh(name, namespace);
        mesh.spec.include_ip_ranges = vec!["not-a-cidr".to_string()];
        mesh
    }

    fn source_returning(mesh: Option<Mesh>) -> Arc<MockMeshSource> {
        let mut source = MockMeshSource::new();
        source.expect_get().returning(move |_| Ok(mesh.clone()));
        Arc::new(source)
    }

    fn schema_ok() -> Arc<MockSchemaInitializer> {
        let mut schema = MockSchemaInitializer::new();
        schema.expect_ensure().returning(|_| Ok(()));
        Arc::new(schema)
    }

    fn schema_never_called() -> Arc<MockSchemaInitializer> {
        let mut schema = MockSchemaInitializer::new();
        schema.expect_ensure().times(0);
        Arc::new(schema)
    }

    // =========================================================================
    // Pass Outcome Stories
    // =========================================================================

    /// Story: a deleted (absent) Mesh is a normal terminal state. The pass
    /// succeeds without invoking the schema gate or any component.
    #[tokio::test]
    async fn story_absent_mesh_is_terminal_success() {
        let applier = Arc::new(RecordingApplier::new());
        let ctx = Context::for_testing(source_returning(None), schema_never_called(), applier.clone());

        let action = reconcile_mesh(&MeshKey::new("mesh-system", "gone"), &ctx)
            .await
            .expect("absence is not an error");

        assert_eq!(action, Action::await_change());
        assert!(applier.is_empty(), "no component should have run");
    }

    /// Story: a full pass over a valid Mesh registers schemas, runs every
    /// component in order, and finishes with no requeue - the next pass comes
    /// from a watch event, not a timer.
    #[tokio::test]
    async fn story_full_pass_converges_the_mesh() {
        let applier = Arc::new(RecordingApplier::new());
        let ctx = Context::for_testing(
            source_returning(Some(sample_mesh("mesh", "mesh-system"))),
            schema_ok(),
            applier.clone(),
        );

        let action = reconcile_mesh(&MeshKey::new("mesh-system", "mesh"), &ctx)
            .await
            .expect("pass should succeed");

        assert_eq!(action, Action::await_change());

        // Foundational resources go first, the injection webhook goes last
        let kinds = applier.kinds();
        assert_eq!(kinds.first().map(String::as_str), Some("ServiceAccount"));
        assert_eq!(
            kinds.last().map(String::as_str),
            Some("MutatingWebhookConfiguration")
        );
    }

    /// Story: when the schema gate fails, zero components run regardless of
    /// what the Mesh spec contains.
    #[tokio::test]
    async fn story_schema_gate_failure_blocks_all_components() {
        let mut schema = MockSchemaInitializer::new();
        schema
            .expect_ensure()
            .returning(|_| Err(Error::crd_registration("api server unavailable")));

        let applier = Arc::new(RecordingApplier::new());
        let ctx = Context::for_testing(
            source_returning(Some(sample_mesh("mesh", "mesh-system"))),
            Arc::new(schema),
            applier.clone(),
        );

        let err = reconcile_mesh(&MeshKey::new("mesh-system", "mesh"), &ctx)
            .await
            .expect_err("gate failure fails the pass");

        assert!(err.to_string().contains("crd registration"));
        assert!(applier.is_empty(), "no component may run after a gate failure");
    }

    /// Story: transient fetch errors propagate so the runtime can retry with
    /// its own backoff.
    #[tokio::test]
    async fn story_fetch_error_propagates_for_retry() {
        let mut source = MockMeshSource::new();
        source.expect_get().returning(|_| {
            Err(Error::Kube(kube::Error::Api(kube::error::ErrorResponse {
                status: "Failure".to_string(),
                message: "etcdserver: request timed out".to_string(),
                reason: "InternalError".to_string(),
                code: 500,
            })))
        });

        let applier = Arc::new(RecordingApplier::new());
        let ctx = Context::for_testing(Arc::new(source), schema_never_called(), applier.clone());

        let err = reconcile_mesh(&MeshKey::new("mesh-system", "mesh"), &ctx)
            .await
            .expect_err("fetch failure fails the pass");

        assert!(err.to_string().contains("request timed out"));
        assert!(applier.is_empty());
    }

    /// Story: an invalid spec is rejected before the schema gate and before
    /// any component runs. The error is still retryable - a spec update
    /// triggers the next pass.
    #[tokio::test]
    async fn story_invalid_spec_fails_before_the_gate() {
        let applier = Arc::new(RecordingApplier::new());
        let ctx = Context::for_testing(
            source_returning(Some(invalid_mesh("mesh", "mesh-system"))),
            schema_never_called(),
            applier.clone(),
        );

        let err = reconcile_mesh(&MeshKey::new("mesh-system", "mesh"), &ctx)
            .await
            .expect_err("invalid spec fails the pass");

        assert!(matches!(err, Error::Validation(_)));
        assert!(applier.is_empty());
    }

    /// Story: a component failure surfaces as an error naming the step; the
    /// runtime retries the whole pass from the top.
    #[tokio::test]
    async fn story_component_failure_fails_the_pass() {
        // First apply (common's service account) fails
        let mut applier = MockApplier::new();
        applier
            .expect_apply()
            .returning(|_| Err(Error::serialization("conversion webhook refused manifest")));

        let ctx = Context::for_testing(
            source_returning(Some(sample_mesh("mesh", "mesh-system"))),
            schema_ok(),
            Arc::new(applier),
        );

        let err = reconcile_mesh(&MeshKey::new("mesh-system", "mesh"), &ctx)
            .await
            .expect_err("component failure fails the pass");

        match err {
            Error::Component {
                component, step, ..
            } => {
                assert_eq!(component, "common");
                assert_eq!(step, 0);
            }
            other => panic!("expected Component error, got {other:?}"),
        }
    }

    /// Story: two consecutive passes with no external change both succeed.
    /// Server-side apply makes every component a no-op the second time, so
    /// re-reconciling a converged mesh is safe.
    #[tokio::test]
    async fn story_repeated_passes_are_idempotent() {
        let applier = Arc::new(RecordingApplier::new());
        let ctx = Context::for_testing(
            source_returning(Some(sample_mesh("mesh", "mesh-system"))),
            schema_ok(),
            applier.clone(),
        );
        let key = MeshKey::new("mesh-system", "mesh");

        let first = reconcile_mesh(&key, &ctx).await.expect("first pass");
        let applied_once = applier.len();
        let second = reconcile_mesh(&key, &ctx).await.expect("second pass");

        assert_eq!(first, Action::await_change());
        assert_eq!(second, Action::await_change());
        // The second pass re-applies the same manifests - full restart, no
        // checkpointing or caching between passes.
        assert_eq!(applier.len(), applied_once * 2);
    }

    // =========================================================================
    // Entry Point and Error Policy
    // =========================================================================

    /// Story: the runtime entry point addresses the pass by key and
    /// re-fetches, so a stale watch event reconciles current state.
    #[tokio::test]
    async fn story_entry_point_refetches_by_key() {
        let mut stale = sample_mesh("mesh", "mesh-system");
        stale.spec.version = "0.9.0".to_string();

        // The accessor returns the current object regardless of the event
        let applier = Arc::new(RecordingApplier::new());
        let ctx = Arc::new(Context::for_testing(
            source_returning(Some(sample_mesh("mesh", "mesh-system"))),
            schema_ok(),
            applier.clone(),
        ));

        reconcile(Arc::new(stale), ctx).await.expect("pass succeeds");

        let manifests = applier.manifests();
        let config_map = manifests
            .iter()
            .find(|m| m.pointer("/kind") == Some(&"ConfigMap".into()))
            .expect("mesh config map applied");
        assert_eq!(
            config_map.pointer("/data/meshVersion"),
            Some(&"1.4.0".into()),
            "fresh fetch wins over the stale event payload"
        );
    }

    #[test]
    fn test_error_policy_requeues_with_default_delay() {
        let source = Arc::new(MockMeshSource::new());
        let schema = Arc::new(MockSchemaInitializer::new());
        let applier = Arc::new(RecordingApplier::new());
        let ctx = Arc::new(Context::for_testing(source, schema, applier));

        let action = error_policy(
            Arc::new(sample_mesh("mesh", "mesh-system")),
            &Error::validation("anything"),
            ctx,
        );

        assert_eq!(action, Action::requeue(RETRY_DELAY));
    }

    #[test]
    fn test_mesh_key_display() {
        let key = MeshKey::new("mesh-system", "prod");
        assert_eq!(key.to_string(), "mesh-system/prod");
    }

    #[test]
    fn test_mesh_key_defaults_namespace() {
        let mesh = Mesh::new(
            "bare",
            MeshSpec {
                version: "1.4.0".to_string(),
                hub: crate::DEFAULT_HUB.to_string(),
                mtls: true,
                include_ip_ranges: vec![],
                exclude_ip_ranges: vec![],
            },
        );
        assert_eq!(MeshKey::from_mesh(&mesh).namespace, "default");
    }
}
