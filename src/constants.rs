//! # Constants
//!
//! Shared constants used throughout the controller.
//!
//! These values represent reasonable defaults and can be overridden via
//! configuration or environment variables where applicable.

/// Default HTTP server port for metrics and health probes
pub const DEFAULT_METRICS_PORT: u16 = 5000;

/// Default HTTP server startup timeout (how long to wait for server to be ready)
pub const DEFAULT_SERVER_STARTUP_TIMEOUT_SECS: u64 = 10;

/// Default HTTP server readiness poll interval
pub const DEFAULT_SERVER_POLL_INTERVAL_MS: u64 = 50;

/// Namespace the controller runs in when POD_NAMESPACE is unset
pub const DEFAULT_CONTROLLER_NAMESPACE: &str = "argocd";

/// Deadline for one reconcile pass, generation and apply included (seconds)
pub const DEFAULT_RECONCILE_TIMEOUT_SECS: u64 = 120;

/// Poll interval for ApplicationSets whose generators read external sources (seconds)
pub const DEFAULT_REQUEUE_AFTER_SECS: u64 = 180;

/// Default maximum number of ApplicationSets reconciled at once
pub const DEFAULT_MAX_CONCURRENT_RECONCILIATIONS: u16 = 10;

/// Default exponential backoff starting value (milliseconds)
pub const DEFAULT_BACKOFF_START_MS: u64 = 1000;

/// Default exponential backoff maximum value (milliseconds)
pub const DEFAULT_BACKOFF_MAX_MS: u64 = 30_000;

/// Fibonacci backoff floor for failed reconciliations (minutes)
pub const DEFAULT_BACKOFF_MIN_MINUTES: u64 = 1;

/// Fibonacci backoff ceiling for failed reconciliations (minutes)
pub const DEFAULT_BACKOFF_MAX_MINUTES: u64 = 10;

/// Default delay before restarting watch stream after unknown errors (seconds)
pub const DEFAULT_WATCH_RESTART_DELAY_SECS: u64 = 5;

/// Default delay before restarting watch stream after it ends (seconds)
pub const DEFAULT_WATCH_RESTART_DELAY_AFTER_END_SECS: u64 = 1;

/// Label selecting cluster registration Secrets
pub const CLUSTER_SECRET_TYPE_LABEL: &str = "argocd.argoproj.io/secret-type";

/// Value of `CLUSTER_SECRET_TYPE_LABEL` on cluster registration Secrets
pub const CLUSTER_SECRET_TYPE: &str = "cluster";

/// Name of the always-available local cluster
pub const IN_CLUSTER_NAME: &str = "in-cluster";

/// API server URL of the local cluster
pub const IN_CLUSTER_SERVER: &str = "https://kubernetes.default.svc";

/// Label carried by every Application an ApplicationSet owns
pub const APPLICATION_SET_NAME_LABEL: &str = "argoproj.io/application-set-name";

/// Annotation that requests an immediate reconcile pass
pub const REFRESH_ANNOTATION: &str = "argoproj.io/refresh";

/// Finalizer that makes Application deletion cascade to deployed resources
pub const RESOURCES_FINALIZER: &str = "resources-finalizer.argocd.argoproj.io";

/// Public GitHub REST endpoint
pub const DEFAULT_GITHUB_API: &str = "https://api.github.com";

/// Page size requested from paginated SCM APIs
pub const SCM_PAGE_SIZE: u32 = 100;

/// Provider calls in flight per pipeline stage
pub const SCM_MAX_CONCURRENT_REQUESTS: usize = 8;

/// Field manager name used for writes
pub const FIELD_MANAGER: &str = "applicationset-controller";
