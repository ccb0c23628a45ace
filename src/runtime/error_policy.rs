//! # Error Policy
//!
//! Requeue decisions for failed reconciliations and classification of watch stream errors.
//!
//! Configuration errors wait for the ApplicationSet to change: retrying an invalid regex or
//! a template that renders an invalid name cannot succeed. Everything else is retried with
//! per-ApplicationSet Fibonacci backoff.

use crate::controller::reconciler::{BackoffState, Reconciler, ReconcilerError};
use crate::crd::ApplicationSet;
use crate::observability::metrics;
use kube::ResourceExt;
use kube_runtime::controller::Action;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{error, info, warn};

/// Advance the backoff for `resource_key`; returns the delay in seconds and the error count
pub fn next_backoff(
    states: &Mutex<HashMap<String, BackoffState>>,
    resource_key: &str,
    min_minutes: u64,
    max_minutes: u64,
) -> (u64, u32) {
    match states.lock() {
        Ok(mut states) => {
            let state = states
                .entry(resource_key.to_string())
                .or_insert_with(|| BackoffState::new(min_minutes, max_minutes));
            state.increment_error();
            (state.backoff.next_backoff_seconds(), state.error_count)
        }
        Err(e) => {
            warn!("Failed to lock backoff states: {}, using minimum backoff", e);
            (min_minutes * 60, 0)
        }
    }
}

/// Decide how to requeue an ApplicationSet whose pass failed
pub fn handle_reconciliation_error(
    appset: Arc<ApplicationSet>,
    error: &ReconcilerError,
    ctx: Arc<Reconciler>,
) -> Action {
    let name = appset.name_any();
    let namespace = appset.namespace().unwrap_or_default();

    let error_span = tracing::error_span!(
        "controller.watch.reconciliation_error",
        resource.name = name.as_str(),
        resource.namespace = namespace.as_str(),
        reason = error.reason(),
    );
    let _guard = error_span.enter();

    if error.is_configuration() {
        error!(error = %error, "ApplicationSet is misconfigured; waiting for it to change");
        metrics::increment_reconciliation_errors("configuration");
        return Action::await_change();
    }

    error!(error = %error, "Reconciliation failed");
    metrics::increment_reconciliation_errors("transient");

    let (backoff_seconds, error_count) = next_backoff(
        &ctx.backoff_states,
        &format!("{namespace}/{name}"),
        ctx.config.backoff_min_minutes,
        ctx.config.backoff_max_minutes,
    );
    let next_attempt = chrono::Utc::now()
        + chrono::Duration::seconds(i64::try_from(backoff_seconds).unwrap_or(i64::MAX));
    info!(
        backoff_seconds,
        error_count,
        next_attempt = next_attempt.to_rfc3339().as_str(),
        "Retrying with Fibonacci backoff"
    );

    metrics::increment_requeues(if matches!(error, ReconcilerError::Timeout(_)) {
        "timeout"
    } else {
        "backoff"
    });
    Action::requeue(Duration::from_secs(backoff_seconds))
}

/// Watch stream failures, by how the loop reacts to them
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchErrorKind {
    /// 401: credentials or RBAC were revoked
    Unauthorized,
    /// 410: resource version expired, the watch relists
    Expired,
    /// 429: the API server is throttling or reinitializing storage
    Throttled,
    /// 404: CRD missing or object gone
    NotFound,
    Other,
}

/// Classify a stringified watch error
///
/// 404 is checked before 401 since a plain-text 404 body surfaces as a decode error that
/// mentions the failed watch.
#[must_use]
pub fn classify_watch_error(error: &str) -> WatchErrorKind {
    let not_found =
        error.contains("ObjectNotFound") || error.contains("404") || error.contains("not found");
    if (error.contains("401") || error.contains("Unauthorized")) && !not_found {
        WatchErrorKind::Unauthorized
    } else if error.contains("410")
        || error.contains("too old resource version")
        || error.contains("Expired")
        || error.contains("Gone")
    {
        WatchErrorKind::Expired
    } else if error.contains("429")
        || error.contains("storage is (re)initializing")
        || error.contains("TooManyRequests")
    {
        WatchErrorKind::Throttled
    } else if not_found {
        WatchErrorKind::NotFound
    } else {
        WatchErrorKind::Other
    }
}

/// React to a watch stream error
///
/// Returns `None` to drop the event so the stream can restart, `Some(())` to keep going.
pub async fn handle_watch_stream_error(
    error: &str,
    backoff_ms: &Arc<AtomicU64>,
    max_backoff_ms: u64,
    watch_restart_delay_secs: u64,
) -> Option<()> {
    let error_span = tracing::warn_span!("controller.watch.error", error = error);
    let _guard = error_span.enter();

    match classify_watch_error(error) {
        WatchErrorKind::Unauthorized => {
            error!("Watch authentication failed (401 Unauthorized)");
            error!("Check that the controller ServiceAccount can still list and watch applicationsets and applications:");
            error!("  kubectl auth can-i watch applicationsets.argoproj.io --as=system:serviceaccount:<namespace>:applicationset-controller --all-namespaces");
            warn!("Waiting {}s before retrying watch", watch_restart_delay_secs);
            tokio::time::sleep(Duration::from_secs(watch_restart_delay_secs)).await;
            None
        }
        WatchErrorKind::Expired => {
            warn!("Watch resource version expired (410), watch will restart");
            None
        }
        WatchErrorKind::Throttled => {
            let current = backoff_ms.load(Ordering::Relaxed);
            warn!("API server throttling the watch (429), backing off for {}ms", current);
            tokio::time::sleep(Duration::from_millis(current)).await;
            backoff_ms.store(current.saturating_mul(2).min(max_backoff_ms), Ordering::Relaxed);
            None
        }
        WatchErrorKind::NotFound => {
            let resource = if error.contains("ApplicationSet") {
                "ApplicationSet"
            } else if error.contains("Application") {
                "Application"
            } else {
                "Resource"
            };
            warn!("{} not found (404); is the CRD installed? Error: {}", resource, error);
            Some(())
        }
        WatchErrorKind::Other => {
            error!("Controller stream error: {}", error);
            tokio::time::sleep(Duration::from_secs(watch_restart_delay_secs)).await;
            None
        }
    }
}
