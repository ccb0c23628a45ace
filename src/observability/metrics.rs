//! # Metrics
//!
//! Prometheus metrics for monitoring the controller.
//!
//! ## Metrics Exposed
//!
//! - `applicationset_reconciliations_total` - Total number of reconciliations
//! - `applicationset_reconciliation_errors_total` - Reconciliation errors by kind
//! - `applicationset_reconciliation_duration_seconds` - Duration of reconcile passes
//! - `applicationset_generated_applications` - Desired Applications in the last pass, per ApplicationSet
//! - `applicationset_application_operations_total` - Create/update/delete calls by outcome
//! - `applicationset_generator_duration_seconds` - Parameter generation time by generator
//! - `applicationset_scm_requests_total` - SCM provider API calls by provider and operation
//! - `applicationset_scm_request_errors_total` - Failed SCM provider API calls
//! - `applicationset_scm_request_duration_seconds` - SCM provider API latency
//! - `applicationset_git_clone_total` - Git clones performed by the git generator
//! - `applicationset_git_clone_duration_seconds` - Duration of git clones
//! - `applicationset_git_clone_errors_total` - Failed git clones
//! - `applicationset_requeues_total` - Requeues scheduled by reason

use anyhow::Result;
use prometheus::{Histogram, HistogramVec, IntCounter, IntCounterVec, IntGaugeVec, Registry};
use std::sync::LazyLock;

// Metrics
pub(crate) static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

static RECONCILIATIONS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "applicationset_reconciliations_total",
        "Total number of reconciliations",
    )
    .expect("Failed to create RECONCILIATIONS_TOTAL metric - this should never happen")
});

static RECONCILIATION_ERRORS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "applicationset_reconciliation_errors_total",
            "Total number of reconciliation errors by kind",
        ),
        &["kind"],
    )
    .expect("Failed to create RECONCILIATION_ERRORS_TOTAL metric - this should never happen")
});

static RECONCILIATION_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    Histogram::with_opts(
        prometheus::HistogramOpts::new(
            "applicationset_reconciliation_duration_seconds",
            "Duration of reconciliation in seconds",
        )
        .buckets(vec![0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0, 60.0]),
    )
    .expect("Failed to create RECONCILIATION_DURATION metric - this should never happen")
});

static GENERATED_APPLICATIONS: LazyLock<IntGaugeVec> = LazyLock::new(|| {
    IntGaugeVec::new(
        prometheus::Opts::new(
            "applicationset_generated_applications",
            "Number of desired Applications produced by the most recent pass",
        ),
        &["namespace", "name"],
    )
    .expect("Failed to create GENERATED_APPLICATIONS metric - this should never happen")
});

static APPLICATION_OPERATIONS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "applicationset_application_operations_total",
            "Total number of Application writes by operation and outcome",
        ),
        &["operation", "outcome"],
    )
    .expect("Failed to create APPLICATION_OPERATIONS_TOTAL metric - this should never happen")
});

static GENERATOR_DURATION: LazyLock<HistogramVec> = LazyLock::new(|| {
    HistogramVec::new(
        prometheus::HistogramOpts::new(
            "applicationset_generator_duration_seconds",
            "Duration of parameter generation in seconds by generator type",
        )
        .buckets(vec![0.01, 0.1, 0.5, 1.0, 5.0, 10.0, 30.0]),
        &["generator"],
    )
    .expect("Failed to create GENERATOR_DURATION metric - this should never happen")
});

static SCM_REQUESTS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "applicationset_scm_requests_total",
            "Total number of SCM provider API requests",
        ),
        &["provider", "operation"],
    )
    .expect("Failed to create SCM_REQUESTS_TOTAL metric - this should never happen")
});

static SCM_REQUEST_ERRORS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "applicationset_scm_request_errors_total",
            "Total number of failed SCM provider API requests",
        ),
        &["provider"],
    )
    .expect("Failed to create SCM_REQUEST_ERRORS_TOTAL metric - this should never happen")
});

static SCM_REQUEST_DURATION: LazyLock<HistogramVec> = LazyLock::new(|| {
    HistogramVec::new(
        prometheus::HistogramOpts::new(
            "applicationset_scm_request_duration_seconds",
            "Duration of SCM provider API requests in seconds",
        )
        .buckets(vec![0.1, 0.5, 1.0, 2.0, 5.0, 10.0]),
        &["provider"],
    )
    .expect("Failed to create SCM_REQUEST_DURATION metric - this should never happen")
});

static GIT_CLONE_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "applicationset_git_clone_total",
        "Total number of git clone operations",
    )
    .expect("Failed to create GIT_CLONE_TOTAL metric - this should never happen")
});

static GIT_CLONE_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    Histogram::with_opts(
        prometheus::HistogramOpts::new(
            "applicationset_git_clone_duration_seconds",
            "Duration of git clone operations in seconds",
        )
        .buckets(vec![1.0, 2.0, 5.0, 10.0, 30.0, 60.0]),
    )
    .expect("Failed to create GIT_CLONE_DURATION metric - this should never happen")
});

static GIT_CLONE_ERRORS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "applicationset_git_clone_errors_total",
        "Total number of git clone errors",
    )
    .expect("Failed to create GIT_CLONE_ERRORS_TOTAL metric - this should never happen")
});

static REQUEUES_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "applicationset_requeues_total",
            "Total number of requeues scheduled by reason",
        ),
        &["reason"],
    )
    .expect("Failed to create REQUEUES_TOTAL metric - this should never happen")
});

fn register(collector: Box<dyn prometheus::core::Collector>) -> Result<()> {
    match REGISTRY.register(collector) {
        Ok(()) | Err(prometheus::Error::AlreadyReg) => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Register every controller metric; calling it again is a no-op
///
/// # Errors
///
/// A metric conflicts with one already registered under a different descriptor.
pub fn register_metrics() -> Result<()> {
    register(Box::new(RECONCILIATIONS_TOTAL.clone()))?;
    register(Box::new(RECONCILIATION_ERRORS_TOTAL.clone()))?;
    register(Box::new(RECONCILIATION_DURATION.clone()))?;
    register(Box::new(GENERATED_APPLICATIONS.clone()))?;
    register(Box::new(APPLICATION_OPERATIONS_TOTAL.clone()))?;
    register(Box::new(GENERATOR_DURATION.clone()))?;
    register(Box::new(SCM_REQUESTS_TOTAL.clone()))?;
    register(Box::new(SCM_REQUEST_ERRORS_TOTAL.clone()))?;
    register(Box::new(SCM_REQUEST_DURATION.clone()))?;
    register(Box::new(GIT_CLONE_TOTAL.clone()))?;
    register(Box::new(GIT_CLONE_DURATION.clone()))?;
    register(Box::new(GIT_CLONE_ERRORS_TOTAL.clone()))?;
    register(Box::new(REQUEUES_TOTAL.clone()))?;

    Ok(())
}

pub fn increment_reconciliations() {
    RECONCILIATIONS_TOTAL.inc();
}

/// `kind` is `configuration` or `transient`
pub fn increment_reconciliation_errors(kind: &str) {
    RECONCILIATION_ERRORS_TOTAL.with_label_values(&[kind]).inc();
}

pub fn observe_reconciliation_duration(duration: f64) {
    RECONCILIATION_DURATION.observe(duration);
}

pub fn set_generated_applications(namespace: &str, name: &str, count: usize) {
    GENERATED_APPLICATIONS
        .with_label_values(&[namespace, name])
        .set(i64::try_from(count).unwrap_or(i64::MAX));
}

/// Drop the series of a deleted ApplicationSet
pub fn remove_generated_applications(namespace: &str, name: &str) {
    // Absent when the ApplicationSet never completed a pass
    let _ = GENERATED_APPLICATIONS.remove_label_values(&[namespace, name]);
}

pub fn record_application_operation(operation: &str, success: bool) {
    let outcome = if success { "success" } else { "error" };
    APPLICATION_OPERATIONS_TOTAL
        .with_label_values(&[operation, outcome])
        .inc();
}

pub fn observe_generator_duration(generator: &str, duration: f64) {
    GENERATOR_DURATION
        .with_label_values(&[generator])
        .observe(duration);
}

pub fn record_scm_request(provider: &str, operation: &str, duration: f64) {
    SCM_REQUESTS_TOTAL
        .with_label_values(&[provider, operation])
        .inc();
    SCM_REQUEST_DURATION
        .with_label_values(&[provider])
        .observe(duration);
}

pub fn increment_scm_request_errors(provider: &str) {
    SCM_REQUEST_ERRORS_TOTAL.with_label_values(&[provider]).inc();
}

pub fn increment_git_clone_total() {
    GIT_CLONE_TOTAL.inc();
}

pub fn observe_git_clone_duration(duration: f64) {
    GIT_CLONE_DURATION.observe(duration);
}

pub fn increment_git_clone_errors_total() {
    GIT_CLONE_ERRORS_TOTAL.inc();
}

/// `reason` is `poll`, `backoff` or `timeout`
pub fn increment_requeues(reason: &str) {
    REQUEUES_TOTAL.with_label_values(&[reason]).inc();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_metrics_is_idempotent() {
        assert!(register_metrics().is_ok());
        assert!(register_metrics().is_ok());
        assert!(REGISTRY
            .gather()
            .iter()
            .any(|family| family.get_name() == "applicationset_reconciliations_total"));
    }

    #[test]
    fn test_increment_reconciliations() {
        let before = RECONCILIATIONS_TOTAL.get();
        increment_reconciliations();
        assert_eq!(RECONCILIATIONS_TOTAL.get(), before + 1u64);
    }

    #[test]
    fn test_reconciliation_errors_by_kind() {
        let before = RECONCILIATION_ERRORS_TOTAL
            .with_label_values(&["configuration"])
            .get();
        increment_reconciliation_errors("configuration");
        let after = RECONCILIATION_ERRORS_TOTAL
            .with_label_values(&["configuration"])
            .get();
        assert_eq!(after, before + 1u64);
    }

    #[test]
    fn test_application_operation_outcomes_are_separate() {
        let ok = || {
            APPLICATION_OPERATIONS_TOTAL
                .with_label_values(&["create", "success"])
                .get()
        };
        let failed = || {
            APPLICATION_OPERATIONS_TOTAL
                .with_label_values(&["create", "error"])
                .get()
        };
        let (ok_before, failed_before) = (ok(), failed());

        record_application_operation("create", true);
        record_application_operation("create", true);
        record_application_operation("create", false);

        assert_eq!(ok(), ok_before + 2);
        assert_eq!(failed(), failed_before + 1);
    }

    #[test]
    fn test_generated_applications_per_applicationset() {
        let gauge = |name| {
            GENERATED_APPLICATIONS
                .with_label_values(&["argocd", name])
                .get()
        };
        set_generated_applications("argocd", "guestbook", 10);
        set_generated_applications("argocd", "monitoring", 3);
        assert_eq!(gauge("guestbook"), 10);
        assert_eq!(gauge("monitoring"), 3);

        remove_generated_applications("argocd", "monitoring");
        remove_generated_applications("argocd", "never-reconciled");
        assert!(GENERATED_APPLICATIONS
            .remove_label_values(&["argocd", "monitoring"])
            .is_err());
        assert_eq!(gauge("guestbook"), 10);
    }

    #[test]
    fn test_record_scm_request() {
        let before = SCM_REQUESTS_TOTAL
            .with_label_values(&["github", "list_repos"])
            .get();
        record_scm_request("github", "list_repos", 0.2);
        let after = SCM_REQUESTS_TOTAL
            .with_label_values(&["github", "list_repos"])
            .get();
        assert_eq!(after, before + 1u64);
    }
}
