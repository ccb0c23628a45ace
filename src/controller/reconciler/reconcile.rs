//! # Reconcile
//!
//! One pass per trigger (ApplicationSet change, owned Application change, poll interval):
//!
//! 1. Run the generators and render the desired Applications
//! 2. List the owned Applications from the API server
//! 3. Plan one action per name
//! 4. Apply the plan, isolating failures per Application
//! 5. Patch status if it changed
//!
//! Steps 1-3 finish before the first write, so a generator failure or a timeout before the
//! apply step leaves every Application untouched.

use crate::constants::REFRESH_ANNOTATION;
use crate::controller::reconciler::apply::{apply_plan, ApplyOutcome};
use crate::controller::reconciler::desired::{
    compile_generators, generate_param_sets, needs_polling, render_desired,
};
use crate::controller::reconciler::diff::{plan, PlanPolicy};
use crate::controller::reconciler::status::{build_status, update_status};
use crate::controller::reconciler::store::{ApplicationStore, KubeApplicationStore};
use crate::controller::reconciler::types::{Reconciler, ReconcilerError};
use crate::crd::{ApplicationSet, ApplicationSetSpec};
use crate::generators::GeneratorServices;
use crate::observability::metrics;
use kube::api::{Api, Patch, PatchParams};
use kube::ResourceExt;
use kube_runtime::controller::Action;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn, Instrument};

/// What one pass computed and did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassReport {
    /// Parameter sets after deduplication
    pub parameter_sets: usize,
    /// Applications in the desired set
    pub desired: usize,
    pub needs_polling: bool,
    pub outcome: ApplyOutcome,
}

/// Compute desired and live state, then converge live onto desired through `store`
///
/// Individual write failures are reported in the outcome, not as an error.
///
/// # Errors
///
/// Configuration, generator, render and collision errors, or a failure listing the live
/// Applications. None of these leave partial writes behind.
pub async fn run_pass(
    appset: &ApplicationSet,
    services: &GeneratorServices,
    store: &dyn ApplicationStore,
) -> Result<PassReport, ReconcilerError> {
    let owner_uid = appset
        .uid()
        .ok_or(ReconcilerError::MissingObjectKey("metadata.uid"))?;
    let owner_name = appset.name_any();

    let generators = compile_generators(&appset.spec)?;
    let sets = generate_param_sets(&generators, services).await?;
    let desired = render_desired(appset, &sets)?;

    let live = store
        .list_owned(&owner_name, &owner_uid)
        .await
        .map_err(ReconcilerError::LiveState)?;

    let actions = plan(&desired, &live, PlanPolicy::from_spec(&appset.spec));
    info!(
        parameter_sets = sets.len(),
        desired = desired.len(),
        live = live.len(),
        writes = actions.iter().filter(|a| a.is_write()).count(),
        "Planned reconciliation"
    );
    let outcome = apply_plan(store, &actions).await;

    Ok(PassReport {
        parameter_sets: sets.len(),
        desired: desired.len(),
        needs_polling: needs_polling(&generators),
        outcome,
    })
}

/// Requeue policy after a successful pass
///
/// Generators backed by unwatched sources (clusters, git, SCM) are polled; a list-only
/// ApplicationSet waits for the next change.
#[must_use]
pub fn requeue_action(spec: &ApplicationSetSpec, polling: bool, default_after: Duration) -> Action {
    if !polling {
        return Action::await_change();
    }
    Action::requeue(spec.requeue_after_seconds.map_or(default_after, Duration::from_secs))
}

async fn clear_refresh_annotation(
    api: &Api<ApplicationSet>,
    appset: &ApplicationSet,
) -> Result<(), kube::Error> {
    if !appset.annotations().contains_key(REFRESH_ANNOTATION) {
        return Ok(());
    }
    let mut annotations = serde_json::Map::new();
    annotations.insert(REFRESH_ANNOTATION.to_string(), serde_json::Value::Null);
    let patch = serde_json::json!({ "metadata": { "annotations": annotations } });
    api.patch(&appset.name_any(), &PatchParams::default(), &Patch::Merge(&patch))
        .await?;
    debug!("Cleared refresh annotation");
    Ok(())
}

/// Controller entry point for one ApplicationSet
///
/// # Errors
///
/// Any pass error, a partial apply, or a failed status write.
pub async fn reconcile(
    appset: Arc<ApplicationSet>,
    ctx: Arc<Reconciler>,
) -> Result<Action, ReconcilerError> {
    let name = appset.name_any();
    let namespace = appset
        .namespace()
        .ok_or(ReconcilerError::MissingObjectKey("metadata.namespace"))?;
    let span = tracing::info_span!(
        "applicationset.reconcile",
        resource.name = name.as_str(),
        resource.namespace = namespace.as_str(),
        resource.generation = appset.metadata.generation.unwrap_or(0),
    );

    async move {
        metrics::increment_reconciliations();

        if appset.metadata.deletion_timestamp.is_some() {
            info!("ApplicationSet is being deleted; owned Applications are garbage collected");
            metrics::remove_generated_applications(&namespace, &name);
            return Ok(Action::await_change());
        }

        let start = Instant::now();
        let store = KubeApplicationStore::new(ctx.client.clone(), &namespace);
        let timeout = ctx.config.reconcile_timeout();
        let result = tokio::time::timeout(timeout, run_pass(&appset, &ctx.services, &store))
            .await
            .unwrap_or(Err(ReconcilerError::Timeout(timeout)));
        metrics::observe_reconciliation_duration(start.elapsed().as_secs_f64());

        let api: Api<ApplicationSet> = Api::namespaced(ctx.client.clone(), &namespace);
        let now = chrono::Utc::now().to_rfc3339();
        let status = build_status(appset.status.as_ref(), appset.metadata.generation, &result, &now);
        match update_status(&api, &appset, status, &now).await {
            Ok(written) => debug!(written, "Status reconciled"),
            // The pass error is the more useful one to surface
            Err(e) if result.is_err() => warn!(error = %e, "Failed to update status"),
            Err(e) => return Err(e.into()),
        }
        if let Err(e) = clear_refresh_annotation(&api, &appset).await {
            warn!(error = %e, "Failed to clear refresh annotation");
        }

        let report = result?;
        if report.outcome.failed > 0 {
            return Err(ReconcilerError::PartialApply {
                failed: report.outcome.failed,
                total: report.outcome.writes(),
            });
        }

        metrics::set_generated_applications(&namespace, &name, report.desired);
        ctx.reset_backoff(&format!("{namespace}/{name}"));
        info!(
            desired = report.desired,
            created = report.outcome.created,
            updated = report.outcome.updated,
            deleted = report.outcome.deleted,
            "Reconciliation complete"
        );

        let action = requeue_action(
            &appset.spec,
            report.needs_polling,
            ctx.config.default_requeue_after(),
        );
        if report.needs_polling {
            metrics::increment_requeues("poll");
        }
        Ok(action)
    }
    .instrument(span)
    .await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(requeue_after_seconds: Option<u64>) -> ApplicationSetSpec {
        serde_json::from_value(serde_json::json!({
            "generators": [],
            "template": {"metadata": {"name": "x"}, "spec": {}},
            "requeueAfterSeconds": requeue_after_seconds,
        }))
        .unwrap()
    }

    #[test]
    fn test_requeue_only_when_polling() {
        let default_after = Duration::from_secs(180);
        assert_eq!(
            requeue_action(&spec(None), false, default_after),
            Action::await_change()
        );
        assert_eq!(
            requeue_action(&spec(None), true, default_after),
            Action::requeue(default_after)
        );
        assert_eq!(
            requeue_action(&spec(Some(30)), true, default_after),
            Action::requeue(Duration::from_secs(30))
        );
    }
}
