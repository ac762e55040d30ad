//! Strata operator - Kubernetes operator for Strata storage-and-compute clusters

mod controller;

use std::sync::Arc;

use clap::{Parser, Subcommand};
use futures::StreamExt;
use kube::api::{Patch, PatchParams};
use kube::runtime::watcher::Config as WatcherConfig;
use kube::runtime::Controller;
use kube::{Api, Client, CustomResourceExt};

use strata_common::crd::StrataCluster;
use strata_common::telemetry::{init_telemetry, TelemetryConfig};
use strata_common::FIELD_MANAGER;

use controller::{error_policy, reconcile, Context};

/// Watcher timeout (seconds) - kept below the client read timeout so the
/// API server closes idle watches before the client gives up on them.
const WATCH_TIMEOUT_SECS: u32 = 25;

/// Strata - CRD-driven operator for Strata storage-and-compute clusters
#[derive(Parser, Debug)]
#[command(name = "strata-operator", version, about, long_about = None)]
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
    Controller,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if cli.crd {
        // CRD generation must work without a cluster or telemetry endpoint
        let crd = serde_yaml::to_string(&StrataCluster::crd())
            .map_err(|e| anyhow::anyhow!("failed to serialize CRD: {e}"))?;
        println!("{crd}");
        return Ok(());
    }

    init_telemetry(TelemetryConfig::default())
        .map_err(|e| anyhow::anyhow!("telemetry init failed: {e}"))?;

    match cli.command {
        Some(Commands::Controller) | None => run_controller().await,
    }
}

/// Install the StrataCluster CRD via server-side apply.
///
/// The operator owns its CRD: installing on startup keeps the stored
/// version in lockstep with the operator build.
async fn ensure_crd_installed(client: &Client) -> anyhow::Result<()> {
    use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;

    let crds: Api<CustomResourceDefinition> = Api::all(client.clone());
    let params = PatchParams::apply(FIELD_MANAGER).force();

    tracing::info!("installing StrataCluster CRD");
    crds.patch(
        "strataclusters.strata.io",
        &params,
        &Patch::Apply(&StrataCluster::crd()),
    )
    .await?;

    Ok(())
}

async fn run_controller() -> anyhow::Result<()> {
    let client = Client::try_default().await?;

    ensure_crd_installed(&client).await?;

    let ctx = Arc::new(Context::new(client.clone()));
    let clusters: Api<StrataCluster> = Api::all(client);

    tracing::info!("starting StrataCluster controller");

    Controller::new(
        clusters,
        WatcherConfig::default().timeout(WATCH_TIMEOUT_SECS),
    )
    .shutdown_on_signal()
    .run(reconcile, error_policy, ctx)
    .for_each(|result| {
        match result {
            Ok(action) => tracing::debug!(?action, "cluster reconciliation completed"),
            Err(e) => tracing::error!(error = ?e, "cluster reconciliation error"),
        }
        std::future::ready(())
    })
    .await;

    tracing::info!("controller shut down");
    Ok(())
}
