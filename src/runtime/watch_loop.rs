//! # Watch Loop
//!
//! Runs the kube-runtime controller over ApplicationSets. Owned Applications are watched
//! too, so a hand-edited or deleted Application triggers a pass on its owner.

use crate::controller::reconciler::{reconcile, Reconciler, ReconcilerError};
use crate::controller::server::ServerState;
use crate::crd::{Application, ApplicationSet};
use crate::runtime::error_policy::{handle_reconciliation_error, handle_watch_stream_error};
use futures::StreamExt;
use kube::api::Api;
use kube::ResourceExt;
use kube_runtime::controller::{self, Action};
use kube_runtime::{watcher, Controller};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, warn, Instrument};

/// Run the controller until a shutdown signal arrives
///
/// The controller is rebuilt whenever its stream ends; in-flight passes finish before
/// the function returns.
///
/// # Errors
///
/// Currently never; kept fallible for the caller's `?` chain.
pub async fn run_watch_loop(
    appsets: Api<ApplicationSet>,
    applications: Api<Application>,
    reconciler: Arc<Reconciler>,
    server_state: Arc<ServerState>,
) -> Result<(), anyhow::Error> {
    let config = reconciler.config.clone();
    let backoff_ms = Arc::new(AtomicU64::new(config.backoff_start_ms));

    let shutdown_state = Arc::clone(&server_state);
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for shutdown signal: {}", e);
            return;
        }
        info!("Received shutdown signal, initiating graceful shutdown...");
        shutdown_state.set_ready(false);
        info!("Marked server as not ready, waiting for in-flight reconciliations to complete...");
    });

    loop {
        if !server_state.is_ready() {
            info!("Shutdown requested, exiting watch loop");
            break;
        }

        let backoff = Arc::clone(&backoff_ms);
        let start_ms = config.backoff_start_ms;
        let max_ms = config.backoff_max_ms;
        let restart_delay = config.watch_restart_delay_secs;
        let watch_span = tracing::info_span!("controller.watch", operation = "watch_loop");

        info!(
            concurrency = config.max_concurrent_reconciliations,
            "Starting ApplicationSet watch"
        );
        Controller::new(appsets.clone(), watcher::Config::default().any_semantic())
            .owns(applications.clone(), watcher::Config::default())
            .with_config(
                controller::Config::default().concurrency(config.max_concurrent_reconciliations),
            )
            .shutdown_on_signal()
            .run(reconcile_logged, handle_reconciliation_error, Arc::clone(&reconciler))
            .filter_map(move |event| {
                let backoff = Arc::clone(&backoff);
                async move {
                    match &event {
                        Ok((object, _)) => {
                            backoff.store(start_ms, Ordering::Relaxed);
                            debug!(applicationset = %object, "watch.event.success");
                            Some(event)
                        }
                        Err(e) => {
                            let error = format!("{e:?}");
                            handle_watch_stream_error(&error, &backoff, max_ms, restart_delay)
                                .await
                                .map(|()| event)
                        }
                    }
                }
            })
            .for_each(|_| futures::future::ready(()))
            .instrument(watch_span)
            .await;

        if !server_state.is_ready() {
            info!("Shutdown requested, exiting watch loop");
            break;
        }

        let delay = config.watch_restart_delay_after_end_duration();
        warn!(
            "Controller watch stream ended, restarting in {} seconds...",
            delay.as_secs()
        );
        tokio::time::sleep(delay).await;
    }

    info!("Controller stopped gracefully");
    Ok(())
}

async fn reconcile_logged(
    appset: Arc<ApplicationSet>,
    ctx: Arc<Reconciler>,
) -> Result<Action, ReconcilerError> {
    let name = appset.name_any();
    debug!(
        applicationset = name.as_str(),
        generation = appset.metadata.generation.unwrap_or(0),
        "watch.event.received"
    );

    let result = reconcile(appset, ctx).await;
    match &result {
        Ok(action) => debug!(applicationset = name.as_str(), action = ?action, "watch.event.reconciled"),
        Err(e) => debug!(applicationset = name.as_str(), error = %e, "watch.event.reconciliation_failed"),
    }
    result
}
