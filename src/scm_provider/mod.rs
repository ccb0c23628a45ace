//! # SCM Provider
//!
//! Source-control candidates, the capability every provider adapter implements, and the
//! filter pipeline that narrows candidates before they become generator parameters.
//!
//! - `filter.rs` - Filter compilation and single-candidate matching
//! - `pipeline.rs` - Listing, repo-level filtering, branch/PR expansion
//! - `github.rs` - GitHub REST adapter
//! - `mock.rs` - In-memory provider for tests and offline rendering

use crate::crd::{PullRequestGenerator, ScmProviderGenerator};
use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

pub mod filter;
pub mod github;
pub mod mock;
pub mod pipeline;

pub use crate::crd::CloneProtocol;
pub use filter::{compile_filters, match_filter, Filter, FilterError, FilterType};
pub use pipeline::{get_applicable_filters, list_repos, FilterBuckets};

/// Pull request metadata carried by a PR-derived candidate
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PullRequest {
    pub number: u64,
    pub title: String,
    /// Source (head) branch
    pub branch: String,
    pub target_branch: String,
    pub head_sha: String,
    pub labels: Vec<String>,
}

/// One candidate the pipeline can produce
///
/// A plain repository after listing, narrowed to one branch after branch expansion, or to
/// one pull request after PR expansion (then `branch` holds the PR source branch).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Repository {
    pub organization: String,
    pub repository: String,
    /// Clone URL in the requested protocol
    pub url: String,
    pub branch: String,
    pub sha: String,
    pub labels: Vec<String>,
    pub clone_protocol: CloneProtocol,
    pub pull_request: Option<PullRequest>,
}

impl Repository {
    /// `organization/repository`
    #[must_use]
    pub fn full_name(&self) -> String {
        format!("{}/{}", self.organization, self.repository)
    }
}

/// Capability implemented by every source-control adapter
///
/// Cancellation: dropping the returned future abandons the call.
#[async_trait]
pub trait ScmProviderService: Send + Sync {
    /// List repositories visible to the provider, with clone URLs in `clone_protocol`
    async fn list_repos(&self, clone_protocol: CloneProtocol) -> Result<Vec<Repository>>;

    /// Expand a repository into one candidate per branch
    async fn get_branches(&self, repo: &Repository) -> Result<Vec<Repository>>;

    /// Expand a repository into one candidate per open pull request
    async fn get_pull_requests(&self, repo: &Repository) -> Result<Vec<Repository>>;

    /// Whether `path` exists in the candidate's branch
    async fn repo_has_path(&self, repo: &Repository, path: &str) -> Result<bool>;
}

#[derive(Debug, Error)]
pub enum ScmError {
    #[error(transparent)]
    InvalidFilter(#[from] FilterError),
    #[error("unsupported SCM provider configuration: {0}")]
    Unsupported(String),
    #[error("SCM provider {operation} failed: {source:#}")]
    Provider {
        operation: &'static str,
        #[source]
        source: anyhow::Error,
    },
}

impl ScmError {
    pub(crate) fn provider(operation: &'static str) -> impl FnOnce(anyhow::Error) -> Self {
        move |source| ScmError::Provider { operation, source }
    }

    /// Configuration errors will not go away on retry
    #[must_use]
    pub fn is_configuration(&self) -> bool {
        matches!(self, ScmError::InvalidFilter(_) | ScmError::Unsupported(_))
    }
}

/// Builds provider adapters from generator configuration
pub trait ScmProviderFactory: Send + Sync {
    fn for_scm_generator(
        &self,
        spec: &ScmProviderGenerator,
    ) -> Result<Arc<dyn ScmProviderService>, ScmError>;

    fn for_pull_request_generator(
        &self,
        spec: &PullRequestGenerator,
    ) -> Result<Arc<dyn ScmProviderService>, ScmError>;
}

/// Factory for the adapters shipped with the controller
#[derive(Debug, Clone)]
pub struct DefaultScmProviderFactory {
    http: reqwest::Client,
    github_token: Option<String>,
}

impl DefaultScmProviderFactory {
    #[must_use]
    pub fn new(github_token: Option<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            github_token,
        }
    }
}

impl ScmProviderFactory for DefaultScmProviderFactory {
    fn for_scm_generator(
        &self,
        spec: &ScmProviderGenerator,
    ) -> Result<Arc<dyn ScmProviderService>, ScmError> {
        let github = spec.github.as_ref().ok_or_else(|| {
            ScmError::Unsupported("scmProvider generator needs a provider block (github)".into())
        })?;

        Ok(Arc::new(github::GithubProvider::new(
            self.http.clone(),
            github.api.as_deref(),
            &github.organization,
            self.github_token.clone(),
            github.all_branches,
            github.pull_requests,
        )))
    }

    fn for_pull_request_generator(
        &self,
        spec: &PullRequestGenerator,
    ) -> Result<Arc<dyn ScmProviderService>, ScmError> {
        let github = spec.github.as_ref().ok_or_else(|| {
            ScmError::Unsupported("pullRequest generator needs a provider block (github)".into())
        })?;

        Ok(Arc::new(github::GithubProvider::new(
            self.http.clone(),
            github.api.as_deref(),
            &github.owner,
            self.github_token.clone(),
            false,
            true,
        )))
    }
}
