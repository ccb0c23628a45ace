//! # Types
//!
//! Core types for the reconciler.

use crate::config::ControllerConfig;
use crate::controller::backoff::FibonacciBackoff;
use crate::generators::{
    GeneratorError, GeneratorServices, GitCliTreeService, SecretClusterSource,
};
use crate::scm_provider::DefaultScmProviderFactory;
use crate::template::RenderError;
use kube::Client;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReconcilerError {
    #[error(transparent)]
    Generator(#[from] GeneratorError),
    #[error(transparent)]
    Render(#[from] RenderError),
    #[error("Applications {name:?} rendered twice, from parameter sets {first:?} and {second:?}")]
    Collision {
        name: String,
        first: String,
        second: String,
    },
    #[error("ApplicationSet is missing {0}")]
    MissingObjectKey(&'static str),
    #[error("Failed to read owned Applications: {0:#}")]
    LiveState(#[source] anyhow::Error),
    #[error("{failed} of {total} Application operations failed")]
    PartialApply { failed: usize, total: usize },
    #[error("Reconciliation did not finish within {0:?}")]
    Timeout(Duration),
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),
}

impl ReconcilerError {
    /// Configuration errors persist until the ApplicationSet spec changes
    #[must_use]
    pub fn is_configuration(&self) -> bool {
        match self {
            ReconcilerError::Generator(e) => e.is_configuration(),
            ReconcilerError::Render(_)
            | ReconcilerError::Collision { .. }
            | ReconcilerError::MissingObjectKey(_) => true,
            ReconcilerError::LiveState(_)
            | ReconcilerError::PartialApply { .. }
            | ReconcilerError::Timeout(_)
            | ReconcilerError::Kube(_) => false,
        }
    }

    /// Short machine-readable reason, used for condition reasons and metric labels
    #[must_use]
    pub fn reason(&self) -> &'static str {
        match self {
            ReconcilerError::Generator(e) if e.is_configuration() => "InvalidGenerator",
            ReconcilerError::Generator(_) => "GeneratorFailed",
            ReconcilerError::Render(_) => "RenderFailed",
            ReconcilerError::Collision { .. } => "NameCollision",
            ReconcilerError::MissingObjectKey(_) => "MissingObjectKey",
            ReconcilerError::LiveState(_) => "LiveStateUnavailable",
            ReconcilerError::PartialApply { .. } => "ApplyFailed",
            ReconcilerError::Timeout(_) => "Timeout",
            ReconcilerError::Kube(_) => "KubeError",
        }
    }
}

/// Backoff state for a specific resource
/// Tracks error count and backoff calculator for progressive retries
#[derive(Debug, Clone)]
pub struct BackoffState {
    pub backoff: FibonacciBackoff,
    pub error_count: u32,
}

impl BackoffState {
    #[must_use]
    pub fn new(min_minutes: u64, max_minutes: u64) -> Self {
        Self {
            backoff: FibonacciBackoff::new(min_minutes, max_minutes),
            error_count: 0,
        }
    }

    pub fn increment_error(&mut self) {
        self.error_count += 1;
    }
}

#[derive(Clone)]
pub struct Reconciler {
    pub client: Client,
    pub config: ControllerConfig,
    pub services: GeneratorServices,
    // Backoff state per ApplicationSet (namespace/name), owned by the error policy
    pub backoff_states: Arc<Mutex<HashMap<String, BackoffState>>>,
}

impl std::fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Reconciler {
    /// Wire the production generator services: cluster Secrets in the controller namespace,
    /// the `git` CLI and the GitHub REST API
    #[must_use]
    pub fn new(client: Client, config: ControllerConfig) -> Self {
        let services = GeneratorServices {
            clusters: Arc::new(SecretClusterSource::new(
                client.clone(),
                &config.controller_namespace,
            )),
            repo_trees: Arc::new(GitCliTreeService),
            scm_providers: Arc::new(DefaultScmProviderFactory::new(config.github_token.clone())),
        };
        Self::with_services(client, config, services)
    }

    #[must_use]
    pub fn with_services(
        client: Client,
        config: ControllerConfig,
        services: GeneratorServices,
    ) -> Self {
        Self {
            client,
            config,
            services,
            backoff_states: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Forget accumulated backoff after a successful pass
    pub fn reset_backoff(&self, resource_key: &str) {
        if let Ok(mut states) = self.backoff_states.lock() {
            states.remove(resource_key);
        }
    }
}
