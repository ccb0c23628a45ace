//! # Initialization
//!
//! Controller start-up: rustls, tracing, metrics, probe server, Kubernetes client and
//! the reconciler context.

use crate::config::ControllerConfig;
use crate::controller::reconciler::Reconciler;
use crate::controller::server::{start_server, ServerState};
use crate::crd::{Application, ApplicationSet};
use crate::observability;
use anyhow::{anyhow, Context, Result};
use kube::api::{Api, ListParams};
use kube::Client;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// Everything the watch loop needs
pub struct InitializationResult {
    pub client: Client,
    /// ApplicationSets in all namespaces
    pub appsets: Api<ApplicationSet>,
    /// Applications in all namespaces, watched for owner changes
    pub applications: Api<Application>,
    pub reconciler: Arc<Reconciler>,
    /// Shared with the probe server
    pub server_state: Arc<ServerState>,
}

impl std::fmt::Debug for InitializationResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InitializationResult")
            .field("server_ready", &self.server_state.is_ready())
            .field("reconciler", &self.reconciler)
            .finish_non_exhaustive()
    }
}

/// Initialize the controller runtime
///
/// # Errors
///
/// Tracing or metrics cannot be installed, the probe server does not come up, or no
/// Kubernetes client configuration is available.
pub async fn initialize() -> Result<InitializationResult> {
    // Must run before anything opens a TLS connection
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        return Err(anyhow!("Failed to install rustls crypto provider"));
    }

    let config = ControllerConfig::from_env();
    observability::logging::init_tracing(config.log_format)?;

    info!("Starting ApplicationSet controller");
    info!(
        "Build info: timestamp={}, datetime={}, git_hash={}",
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_DATETIME"),
        env!("BUILD_GIT_HASH")
    );
    info!(config = ?config, "Loaded configuration");

    observability::metrics::register_metrics()?;

    let server_state = Arc::new(ServerState::default());
    let server_port = config.metrics_port;
    let server_task_state = Arc::clone(&server_state);
    let server_handle = tokio::spawn(async move {
        if let Err(e) = start_server(server_port, server_task_state).await {
            error!("HTTP server error: {}", e);
        }
    });
    wait_for_server_ready(&server_state, &server_handle, &config).await?;

    let client = Client::try_default()
        .await
        .context("Failed to create Kubernetes client")?;
    let appsets: Api<ApplicationSet> = Api::all(client.clone());
    let applications: Api<Application> = Api::all(client.clone());

    check_crds_queryable(&appsets, &applications).await;

    let reconciler = Arc::new(Reconciler::new(client.clone(), config));

    info!("Controller initialized, starting watch loop...");
    Ok(InitializationResult {
        client,
        appsets,
        applications,
        reconciler,
        server_state,
    })
}

async fn wait_for_server_ready(
    server_state: &ServerState,
    server_handle: &JoinHandle<()>,
    config: &ControllerConfig,
) -> Result<()> {
    let startup_timeout = Duration::from_secs(config.server_startup_timeout_secs);
    let poll_interval = Duration::from_millis(config.server_poll_interval_ms);
    let start = Instant::now();

    loop {
        if server_handle.is_finished() {
            return Err(anyhow!("HTTP server failed to start"));
        }
        if server_state.is_ready() {
            info!("HTTP server is ready and accepting connections");
            return Ok(());
        }
        if start.elapsed() > startup_timeout {
            return Err(anyhow!(
                "HTTP server failed to become ready within {} seconds",
                startup_timeout.as_secs()
            ));
        }
        tokio::time::sleep(poll_interval).await;
    }
}

/// Log whether both CRDs answer a list call
///
/// Existing ApplicationSets are picked up by the watch's initial list, so nothing is
/// reconciled here. A missing CRD is not fatal; the watch retries.
async fn check_crds_queryable(appsets: &Api<ApplicationSet>, applications: &Api<Application>) {
    match appsets.list(&ListParams::default()).await {
        Ok(list) if list.items.is_empty() => {
            info!("No existing ApplicationSets found, watch will pick up new resources");
        }
        Ok(list) => info!(
            "Found {} existing ApplicationSets, the watch will reconcile them",
            list.items.len()
        ),
        Err(e) => {
            error!("ApplicationSet CRD is not queryable; {:?}. Is the CRD installed?", e);
            error!("Installation: crdgen | kubectl apply -f -");
            warn!("Continuing despite CRD check failure - controller will retry");
        }
    }

    if let Err(e) = applications.list(&ListParams::default().limit(1)).await {
        error!("Application CRD is not queryable; {:?}. Is Argo CD installed?", e);
        warn!("Continuing despite CRD check failure - controller will retry");
    }
}
