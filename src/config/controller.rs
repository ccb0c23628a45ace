//! # Controller Configuration
//!
//! Controller-level settings loaded from environment variables.

use std::time::Duration;

/// Log output flavour
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "text" | "pretty" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown log format {other:?}")),
        }
    }
}

/// Controller-level configuration
///
/// All settings have sensible defaults and can be overridden via environment variables.
#[derive(Clone)]
pub struct ControllerConfig {
    /// Port of the metrics/probe server
    pub metrics_port: u16,
    /// HTTP server startup timeout (seconds)
    pub server_startup_timeout_secs: u64,
    /// HTTP server readiness poll interval (milliseconds)
    pub server_poll_interval_ms: u64,
    /// Namespace the controller runs in; cluster registration Secrets are read from here
    pub controller_namespace: String,
    /// Deadline for one reconcile pass (seconds)
    pub reconcile_timeout_secs: u64,
    /// Poll interval for ApplicationSets without `requeueAfterSeconds` (seconds)
    pub default_requeue_after_secs: u64,
    /// Maximum concurrent reconciliations
    pub max_concurrent_reconciliations: u16,
    /// Log format (json, text)
    pub log_format: LogFormat,
    /// Token for GitHub API calls; anonymous when unset
    pub github_token: Option<String>,
    /// Fibonacci backoff floor (minutes)
    pub backoff_min_minutes: u64,
    /// Fibonacci backoff ceiling (minutes)
    pub backoff_max_minutes: u64,
    /// Initial backoff after the API server throttles the watch (milliseconds)
    pub backoff_start_ms: u64,
    /// Ceiling for the watch throttling backoff (milliseconds)
    pub backoff_max_ms: u64,
    /// Watch stream restart delay after unknown errors (seconds)
    pub watch_restart_delay_secs: u64,
    /// Watch stream restart delay after stream ends (seconds)
    pub watch_restart_delay_after_end_secs: u64,
}

impl std::fmt::Debug for ControllerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControllerConfig")
            .field("metrics_port", &self.metrics_port)
            .field("controller_namespace", &self.controller_namespace)
            .field("reconcile_timeout_secs", &self.reconcile_timeout_secs)
            .field("default_requeue_after_secs", &self.default_requeue_after_secs)
            .field(
                "max_concurrent_reconciliations",
                &self.max_concurrent_reconciliations,
            )
            .field("log_format", &self.log_format)
            .field("github_token", &self.github_token.as_ref().map(|_| "***"))
            .finish_non_exhaustive()
    }
}

impl Default for ControllerConfig {
    fn default() -> Self {
        use crate::constants::*;
        Self {
            metrics_port: DEFAULT_METRICS_PORT,
            server_startup_timeout_secs: DEFAULT_SERVER_STARTUP_TIMEOUT_SECS,
            server_poll_interval_ms: DEFAULT_SERVER_POLL_INTERVAL_MS,
            controller_namespace: DEFAULT_CONTROLLER_NAMESPACE.to_string(),
            reconcile_timeout_secs: DEFAULT_RECONCILE_TIMEOUT_SECS,
            default_requeue_after_secs: DEFAULT_REQUEUE_AFTER_SECS,
            max_concurrent_reconciliations: DEFAULT_MAX_CONCURRENT_RECONCILIATIONS,
            log_format: LogFormat::default(),
            github_token: None,
            backoff_min_minutes: DEFAULT_BACKOFF_MIN_MINUTES,
            backoff_max_minutes: DEFAULT_BACKOFF_MAX_MINUTES,
            backoff_start_ms: DEFAULT_BACKOFF_START_MS,
            backoff_max_ms: DEFAULT_BACKOFF_MAX_MS,
            watch_restart_delay_secs: DEFAULT_WATCH_RESTART_DELAY_SECS,
            watch_restart_delay_after_end_secs: DEFAULT_WATCH_RESTART_DELAY_AFTER_END_SECS,
        }
    }
}

impl ControllerConfig {
    /// Load configuration from environment variables with defaults
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        use crate::constants::*;
        let lookup = &lookup;
        Self {
            metrics_port: var_or_default(lookup, "METRICS_PORT", DEFAULT_METRICS_PORT),
            server_startup_timeout_secs: var_or_default(
                lookup,
                "SERVER_STARTUP_TIMEOUT_SECS",
                DEFAULT_SERVER_STARTUP_TIMEOUT_SECS,
            ),
            server_poll_interval_ms: var_or_default(
                lookup,
                "SERVER_POLL_INTERVAL_MS",
                DEFAULT_SERVER_POLL_INTERVAL_MS,
            ),
            controller_namespace: lookup("POD_NAMESPACE")
                .filter(|ns| !ns.is_empty())
                .unwrap_or_else(|| DEFAULT_CONTROLLER_NAMESPACE.to_string()),
            reconcile_timeout_secs: var_or_default(
                lookup,
                "RECONCILE_TIMEOUT_SECS",
                DEFAULT_RECONCILE_TIMEOUT_SECS,
            ),
            default_requeue_after_secs: var_or_default(
                lookup,
                "DEFAULT_REQUEUE_AFTER_SECS",
                DEFAULT_REQUEUE_AFTER_SECS,
            ),
            max_concurrent_reconciliations: var_or_default(
                lookup,
                "MAX_CONCURRENT_RECONCILIATIONS",
                DEFAULT_MAX_CONCURRENT_RECONCILIATIONS,
            ),
            log_format: var_or_default(lookup, "LOG_FORMAT", LogFormat::default()),
            github_token: lookup("GITHUB_TOKEN").filter(|token| !token.is_empty()),
            backoff_min_minutes: var_or_default(
                lookup,
                "BACKOFF_MIN_MINUTES",
                DEFAULT_BACKOFF_MIN_MINUTES,
            ),
            backoff_max_minutes: var_or_default(
                lookup,
                "BACKOFF_MAX_MINUTES",
                DEFAULT_BACKOFF_MAX_MINUTES,
            ),
            backoff_start_ms: var_or_default(lookup, "BACKOFF_START_MS", DEFAULT_BACKOFF_START_MS),
            backoff_max_ms: var_or_default(lookup, "BACKOFF_MAX_MS", DEFAULT_BACKOFF_MAX_MS),
            watch_restart_delay_secs: var_or_default(
                lookup,
                "WATCH_RESTART_DELAY_SECS",
                DEFAULT_WATCH_RESTART_DELAY_SECS,
            ),
            watch_restart_delay_after_end_secs: var_or_default(
                lookup,
                "WATCH_RESTART_DELAY_AFTER_END_SECS",
                DEFAULT_WATCH_RESTART_DELAY_AFTER_END_SECS,
            ),
        }
    }

    /// Get reconcile pass deadline
    pub fn reconcile_timeout(&self) -> Duration {
        Duration::from_secs(self.reconcile_timeout_secs)
    }

    /// Get default poll interval
    pub fn default_requeue_after(&self) -> Duration {
        Duration::from_secs(self.default_requeue_after_secs)
    }

    /// Get watch restart delay duration
    pub fn watch_restart_delay_duration(&self) -> Duration {
        Duration::from_secs(self.watch_restart_delay_secs)
    }

    /// Get watch restart delay after end duration
    pub fn watch_restart_delay_after_end_duration(&self) -> Duration {
        Duration::from_secs(self.watch_restart_delay_after_end_secs)
    }
}

/// Read a variable or return the default when it is unset or does not parse
fn var_or_default<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> T {
    lookup(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}
