//! Component reconcilers and the ordered reconciliation pipeline
//!
//! Each component converges one control-plane subsystem toward the `Mesh`
//! spec. The pipeline order is data - a literal list produced by
//! [`build_pipeline`] - because later components depend on resources earlier
//! ones create: shared resources first, then identity and trust-root
//! material, configuration distribution, traffic management, gateways,
//! policy/telemetry, and finally the sidecar-injection webhook.
//!
//! Execution is strictly sequential and fails fast: the first error aborts
//! the remaining steps and the whole pass is retried from the top by the
//! controller runtime. That retry model works because every component is
//! idempotent - reconciling already-correct state is a no-op.

pub mod common;
pub mod distribution;
pub mod gateways;
pub mod identity;
pub mod injector;
pub mod telemetry;
pub mod traffic;

use std::sync::Arc;

use async_trait::async_trait;
use kube::ResourceExt;
use tracing::{debug, error};

use crate::apply::Applier;
use crate::crd::Mesh;
use crate::Error;

use common::{Common, CommonConfig};
use distribution::{Distribution, DistributionConfig};
use gateways::{GatewayConfig, Gateways};
use identity::{Identity, IdentityConfig};
use injector::{Injector, InjectorConfig};
use telemetry::{Telemetry, TelemetryConfig};
use traffic::{Traffic, TrafficConfig};

/// One control-plane subsystem reconciler
///
/// Implementations receive their immutable configuration and the cluster
/// mutation capability at construction time, and MUST be idempotent: when
/// live state already matches the configuration, reconciling is a no-op.
#[async_trait]
pub trait ComponentReconciler: Send + Sync {
    /// Stable component name used in ordering assertions and error context
    fn name(&self) -> &'static str;

    /// Converge the subsystem's live state toward the configuration snapshot
    async fn reconcile(&self) -> Result<(), Error>;
}

/// One component bound to its fixed position in the execution order
pub struct PipelineStep {
    step: usize,
    component: Box<dyn ComponentReconciler>,
}

impl PipelineStep {
    /// Bind a component to a pipeline position
    pub fn new(step: usize, component: Box<dyn ComponentReconciler>) -> Self {
        Self { step, component }
    }

    /// Zero-based position in the pipeline
    pub fn position(&self) -> usize {
        self.step
    }

    /// Name of the bound component
    pub fn name(&self) -> &'static str {
        self.component.name()
    }

    async fn run(&self) -> Result<(), Error> {
        self.component
            .reconcile()
            .await
            .map_err(|e| Error::component(self.step, self.component.name(), e))
    }
}

/// Build the ordered component pipeline for one pass.
///
/// Pure function of the `Mesh` snapshot: each component's configuration is a
/// field-by-field projection of the spec, computed here and never mutated
/// afterwards. The returned order is the dependency order and must not be
/// rearranged.
pub fn build_pipeline(mesh: &Mesh, applier: &Arc<dyn Applier>) -> Vec<PipelineStep> {
    let components: Vec<Box<dyn ComponentReconciler>> = vec![
        Box::new(Common::new(CommonConfig::derive(mesh), applier.clone())),
        Box::new(Identity::new(IdentityConfig::derive(mesh), applier.clone())),
        Box::new(Distribution::new(
            DistributionConfig::derive(mesh),
            applier.clone(),
        )),
        Box::new(Traffic::new(TrafficConfig::derive(mesh), applier.clone())),
        Box::new(Gateways::new(GatewayConfig::derive(mesh), applier.clone())),
        Box::new(Telemetry::new(TelemetryConfig::derive(mesh), applier.clone())),
        Box::new(Injector::new(InjectorConfig::derive(mesh), applier.clone())),
    ];

    components
        .into_iter()
        .enumerate()
        .map(|(step, component)| PipelineStep::new(step, component))
        .collect()
}

/// Execute the pipeline strictly in order, stopping at the first error.
///
/// There is no checkpointing: a retried pass rebuilds and re-executes the
/// whole pipeline from step zero.
pub async fn execute_pipeline(steps: &[PipelineStep]) -> Result<(), Error> {
    for step in steps {
        debug!(step = step.position(), component = step.name(), "reconciling component");
        if let Err(e) = step.run().await {
            error!(
                step = step.position(),
                component = step.name(),
                error = %e,
                "component reconciliation failed, aborting pass"
            );
            return Err(e);
        }
    }
    Ok(())
}

/// Namespace the control plane is installed into, taken from the Mesh object
pub(crate) fn mesh_namespace(mesh: &Mesh) -> String {
    mesh.namespace().unwrap_or_else(|| "default".to_string())
}
