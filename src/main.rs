//! Weft Operator - service-mesh control-plane lifecycle management

use std::sync::Arc;

use clap::{Parser, Subcommand};
use futures::StreamExt;
use kube::runtime::watcher::Config as WatcherConfig;
use kube::runtime::Controller;
use kube::{Api, Client, CustomResourceExt};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use weft::controller::{error_policy, reconcile, Context};
use weft::crd::Mesh;
use weft::schema::CrdInstaller;

/// Weft - CRD-driven Kubernetes operator for a service-mesh control plane
#[derive(Parser, Debug)]
#[command(name = "weft", version, about, long_about = None)]
struct Cli {
    /// Generate CRD manifests and exit
    #[arg(long)]
    crd: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run as controller (default mode)
    ///
    /// Watches Mesh objects and reconciles the control plane they describe.
    Controller,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    if cli.crd {
        print_crds()?;
        return Ok(());
    }

    match cli.command {
        Some(Commands::Controller) | None => run_controller().await,
    }
}

/// Print every CRD the operator owns as multi-document YAML
fn print_crds() -> anyhow::Result<()> {
    let mut crds = vec![Mesh::crd()];
    crds.extend(CrdInstaller::required_crds());

    for crd in crds {
        let yaml = serde_yaml::to_string(&crd)
            .map_err(|e| anyhow::anyhow!("Failed to serialize CRD: {}", e))?;
        println!("---");
        print!("{yaml}");
    }
    Ok(())
}

/// Ensure the Mesh CRD is installed
///
/// The operator installs its own CRD on startup using server-side apply, so
/// the definition always matches the operator version. The mesh API kinds
/// the components depend on are registered per pass by the schema gate, not
/// here.
async fn ensure_mesh_crd(client: &Client) -> anyhow::Result<()> {
    use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
    use kube::api::{Patch, PatchParams};

    let crds: Api<CustomResourceDefinition> = Api::all(client.clone());
    let params = PatchParams::apply(weft::FIELD_MANAGER).force();

    tracing::info!("Installing Mesh CRD...");
    crds.patch("meshes.weft.dev", &params, &Patch::Apply(&Mesh::crd()))
        .await
        .map_err(|e| anyhow::anyhow!("Failed to install Mesh CRD: {}", e))?;

    Ok(())
}

/// Run in controller mode - watches Mesh objects and reconciles them
async fn run_controller() -> anyhow::Result<()> {
    tracing::info!("Weft controller starting...");

    // Create Kubernetes client
    let client = Client::try_default()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to create Kubernetes client: {}", e))?;

    // Operator installs its own CRD on startup
    ensure_mesh_crd(&client).await?;

    let ctx = Arc::new(Context::builder(client.clone()).build());
    let meshes: Api<Mesh> = Api::all(client);

    // The single watch registration for this process. Scheduling, per-key
    // serialization, and retry backoff all belong to the controller runtime.
    tracing::info!("Starting Mesh controller...");
    Controller::new(meshes, WatcherConfig::default())
        .shutdown_on_signal()
        .run(reconcile, error_policy, ctx)
        .for_each(|result| async move {
            match result {
                Ok((obj, action)) => {
                    tracing::debug!(name = %obj.name, ?action, "Mesh reconciliation completed");
                }
                Err(e) => {
                    tracing::error!(error = ?e, "Mesh reconciliation error");
                }
            }
        })
        .await;

    tracing::info!("Weft controller shutting down");
    Ok(())
}
