//! # Status
//!
//! Builds `ApplicationSetStatus` from the outcome of a pass and patches it only when it
//! changed. Timestamps are ignored when comparing, so a steady-state pass writes nothing.

use crate::controller::reconciler::apply::state;
use crate::controller::reconciler::reconcile::PassReport;
use crate::controller::reconciler::types::ReconcilerError;
use crate::crd::{ApplicationSet, ApplicationSetStatus, Condition};
use kube::api::{Api, Patch, PatchParams};
use kube::ResourceExt;
use tracing::debug;

pub mod phase {
    /// Every planned write succeeded
    pub const READY: &str = "Ready";
    /// Desired state was computed but some Application writes failed
    pub const DEGRADED: &str = "Degraded";
    /// The pass aborted before any write
    pub const FAILED: &str = "Failed";
}

pub mod condition {
    pub const ERROR_OCCURRED: &str = "ErrorOccurred";
    pub const PARAMETERS_GENERATED: &str = "ParametersGenerated";
    pub const RESOURCES_UP_TO_DATE: &str = "ResourcesUpToDate";
}

fn condition(kind: &str, status: bool, reason: &str, message: String) -> Condition {
    Condition {
        r#type: kind.to_string(),
        status: if status { "True" } else { "False" }.to_string(),
        last_transition_time: None,
        reason: Some(reason.to_string()),
        message: Some(message),
    }
}

/// Keep the previous transition time of a condition whose status did not flip
fn stamp_transitions(conditions: &mut [Condition], previous: &[Condition], now: &str) {
    for condition in conditions {
        let carried = previous
            .iter()
            .find(|old| old.r#type == condition.r#type && old.status == condition.status)
            .and_then(|old| old.last_transition_time.clone());
        condition.last_transition_time = Some(carried.unwrap_or_else(|| now.to_string()));
    }
}

/// Status after a pass
///
/// A failed pass keeps the previous Application count and per-Application results,
/// since nothing was written.
#[must_use]
pub fn build_status(
    previous: Option<&ApplicationSetStatus>,
    generation: Option<i64>,
    result: &Result<PassReport, ReconcilerError>,
    now: &str,
) -> ApplicationSetStatus {
    let previous_conditions = previous.map(|s| s.conditions.as_slice()).unwrap_or_default();

    let mut status = match result {
        Ok(report) => {
            let outcome = &report.outcome;
            let deleting = outcome
                .resources
                .iter()
                .filter(|r| r.state == state::DELETING)
                .count();
            let generated = condition(
                condition::PARAMETERS_GENERATED,
                true,
                "ParametersGenerated",
                format!("Generated {} parameter sets", report.parameter_sets),
            );

            let (phase, description, conditions) = if outcome.failed > 0 {
                let message = format!(
                    "{} of {} Application operations failed",
                    outcome.failed,
                    outcome.writes()
                );
                (
                    phase::DEGRADED,
                    message.clone(),
                    vec![
                        condition(condition::ERROR_OCCURRED, true, "ApplyFailed", message.clone()),
                        generated,
                        condition(condition::RESOURCES_UP_TO_DATE, false, "ApplyFailed", message),
                    ],
                )
            } else {
                let up_to_date = if deleting > 0 {
                    condition(
                        condition::RESOURCES_UP_TO_DATE,
                        false,
                        "WaitingForDeletion",
                        format!("{deleting} Applications are still being deleted"),
                    )
                } else {
                    condition(
                        condition::RESOURCES_UP_TO_DATE,
                        true,
                        "ApplicationSetUpToDate",
                        "All Applications are up to date".to_string(),
                    )
                };
                (
                    phase::READY,
                    format!("{} Applications up to date", report.desired),
                    vec![
                        condition(
                            condition::ERROR_OCCURRED,
                            false,
                            "NoErrors",
                            "Last reconciliation succeeded".to_string(),
                        ),
                        generated,
                        up_to_date,
                    ],
                )
            };

            ApplicationSetStatus {
                phase: Some(phase.to_string()),
                description: Some(description),
                conditions,
                observed_generation: generation,
                last_reconcile_time: previous.and_then(|s| s.last_reconcile_time.clone()),
                application_count: i32::try_from(report.desired).ok(),
                resources: outcome.resources.clone(),
            }
        }
        Err(error) => {
            let message = error.to_string();
            let generated = if matches!(error, ReconcilerError::Generator(_)) {
                condition(
                    condition::PARAMETERS_GENERATED,
                    false,
                    error.reason(),
                    message.clone(),
                )
            } else {
                previous_conditions
                    .iter()
                    .find(|c| c.r#type == condition::PARAMETERS_GENERATED)
                    .cloned()
                    .unwrap_or_else(|| Condition {
                        r#type: condition::PARAMETERS_GENERATED.to_string(),
                        status: "Unknown".to_string(),
                        last_transition_time: None,
                        reason: None,
                        message: None,
                    })
            };

            ApplicationSetStatus {
                phase: Some(phase::FAILED.to_string()),
                description: Some(message.clone()),
                conditions: vec![
                    condition(condition::ERROR_OCCURRED, true, error.reason(), message.clone()),
                    generated,
                    condition(condition::RESOURCES_UP_TO_DATE, false, error.reason(), message),
                ],
                observed_generation: generation,
                last_reconcile_time: previous.and_then(|s| s.last_reconcile_time.clone()),
                application_count: previous.and_then(|s| s.application_count),
                resources: previous.map(|s| s.resources.clone()).unwrap_or_default(),
            }
        }
    };

    stamp_transitions(&mut status.conditions, previous_conditions, now);
    status
}

fn without_timestamps(status: &ApplicationSetStatus) -> ApplicationSetStatus {
    let mut stripped = status.clone();
    stripped.last_reconcile_time = None;
    for condition in &mut stripped.conditions {
        condition.last_transition_time = None;
    }
    stripped
}

/// Whether `next` differs from `previous` in anything but timestamps
#[must_use]
pub fn status_changed(previous: Option<&ApplicationSetStatus>, next: &ApplicationSetStatus) -> bool {
    previous.is_none_or(|previous| without_timestamps(previous) != without_timestamps(next))
}

/// Patch the status subresource when it changed; returns whether a write happened
///
/// # Errors
///
/// The status patch failed.
pub async fn update_status(
    api: &Api<ApplicationSet>,
    appset: &ApplicationSet,
    mut status: ApplicationSetStatus,
    now: &str,
) -> Result<bool, kube::Error> {
    if !status_changed(appset.status.as_ref(), &status) {
        debug!(
            applicationset = appset.name_any().as_str(),
            "Skipping status update - status unchanged"
        );
        return Ok(false);
    }

    status.last_reconcile_time = Some(now.to_string());
    let patch = serde_json::json!({ "status": status });
    api.patch_status(&appset.name_any(), &PatchParams::default(), &Patch::Merge(&patch))
        .await?;
    Ok(true)
}
