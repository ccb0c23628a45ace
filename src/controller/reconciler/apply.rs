//! # Apply
//!
//! Issues the planned writes. Each Application is handled on its own: a failed write is
//! recorded against that Application and the remaining actions still run.

use crate::controller::reconciler::diff::PlannedAction;
use crate::controller::reconciler::store::ApplicationStore;
use crate::crd::ResourceStatus;
use crate::observability::metrics;
use tracing::{debug, info, warn};

/// Per-Application state names written to `status.resources`
pub mod state {
    pub const CREATED: &str = "Created";
    pub const UPDATED: &str = "Updated";
    pub const UNCHANGED: &str = "Unchanged";
    pub const DELETING: &str = "Deleting";
    pub const DELETED: &str = "Deleted";
    pub const SKIPPED: &str = "Skipped";
    pub const FAILED: &str = "Failed";
}

/// Result of applying one plan
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplyOutcome {
    pub resources: Vec<ResourceStatus>,
    pub created: usize,
    pub updated: usize,
    pub deleted: usize,
    pub failed: usize,
}

impl ApplyOutcome {
    /// Number of writes attempted
    #[must_use]
    pub fn writes(&self) -> usize {
        self.created + self.updated + self.deleted + self.failed
    }

    fn record(&mut self, name: &str, state: &str, message: Option<String>) {
        self.resources.push(ResourceStatus {
            name: name.to_string(),
            state: state.to_string(),
            message,
        });
    }

    fn record_failure(&mut self, name: &str, operation: &str, error: &anyhow::Error) {
        warn!(application = name, operation, error = %format!("{error:#}"), "Application write failed");
        metrics::record_application_operation(operation, false);
        self.failed += 1;
        self.record(name, state::FAILED, Some(format!("{operation} failed: {error:#}")));
    }
}

async fn delete(
    store: &dyn ApplicationStore,
    name: &str,
    release_finalizers: Option<&Vec<String>>,
) -> anyhow::Result<()> {
    if let Some(remaining) = release_finalizers {
        let finalizers = if remaining.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::Value::from(remaining.clone())
        };
        store
            .patch(name, &serde_json::json!({"metadata": {"finalizers": finalizers}}))
            .await?;
    }
    store.delete(name).await
}

/// Apply every action in order, isolating failures per Application
pub async fn apply_plan(store: &dyn ApplicationStore, actions: &[PlannedAction]) -> ApplyOutcome {
    let mut outcome = ApplyOutcome::default();

    for action in actions {
        let name = action.name();
        match action {
            PlannedAction::Create(app) => match store.create(app).await {
                Ok(()) => {
                    info!(application = name, "Created Application");
                    metrics::record_application_operation("create", true);
                    outcome.created += 1;
                    outcome.record(name, state::CREATED, None);
                }
                Err(e) => outcome.record_failure(name, "create", &e),
            },
            PlannedAction::Update { patch, .. } => match store.patch(name, patch).await {
                Ok(()) => {
                    info!(application = name, "Updated Application");
                    metrics::record_application_operation("update", true);
                    outcome.updated += 1;
                    outcome.record(name, state::UPDATED, None);
                }
                Err(e) => outcome.record_failure(name, "update", &e),
            },
            PlannedAction::Delete {
                release_finalizers, ..
            } => match delete(store, name, release_finalizers.as_ref()).await {
                Ok(()) => {
                    info!(
                        application = name,
                        preserve_resources = release_finalizers.is_some(),
                        "Deleted Application"
                    );
                    metrics::record_application_operation("delete", true);
                    outcome.deleted += 1;
                    outcome.record(name, state::DELETED, None);
                }
                Err(e) => outcome.record_failure(name, "delete", &e),
            },
            PlannedAction::AwaitDeletion { .. } => {
                debug!(application = name, "Waiting for deletion to finish");
                outcome.record(name, state::DELETING, None);
            }
            PlannedAction::Unchanged { .. } => {
                outcome.record(name, state::UNCHANGED, None);
            }
            PlannedAction::Skipped { reason, .. } => {
                debug!(application = name, reason, "Skipped Application change");
                outcome.record(name, state::SKIPPED, Some((*reason).to_string()));
            }
        }
    }

    outcome
}
