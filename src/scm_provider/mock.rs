//! In-memory SCM provider
//!
//! `list_repos` returns one entry per repository name, `get_branches` returns every
//! configured entry sharing that name, and `repo_has_path(repo, path)` is true when
//! `path` equals the repository name.

use crate::crd::{PullRequestGenerator, ScmProviderGenerator};
use crate::scm_provider::{
    CloneProtocol, PullRequest, Repository, ScmError, ScmProviderFactory, ScmProviderService,
};
use anyhow::{bail, Result};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

#[derive(Debug, Clone, Default)]
pub struct MockProvider {
    pub repos: Vec<Repository>,
    pub pull_requests: BTreeMap<String, Vec<PullRequest>>,
    failing_operation: Option<&'static str>,
}

impl MockProvider {
    #[must_use]
    pub fn new(repos: Vec<Repository>) -> Self {
        Self {
            repos,
            ..Default::default()
        }
    }

    /// Open pull requests for the repository named `repository`
    #[must_use]
    pub fn with_pull_requests(mut self, repository: &str, prs: Vec<PullRequest>) -> Self {
        self.pull_requests.insert(repository.to_string(), prs);
        self
    }

    /// Make one operation (`list_repos`, `get_branches`, `get_pull_requests`,
    /// `repo_has_path`) return an error
    #[must_use]
    pub fn failing_on(mut self, operation: &'static str) -> Self {
        self.failing_operation = Some(operation);
        self
    }

    fn check(&self, operation: &'static str) -> Result<()> {
        if self.failing_operation == Some(operation) {
            bail!("mock provider: {operation} unavailable");
        }
        Ok(())
    }
}

#[async_trait]
impl ScmProviderService for MockProvider {
    async fn list_repos(&self, clone_protocol: CloneProtocol) -> Result<Vec<Repository>> {
        self.check("list_repos")?;

        let mut seen = HashSet::new();
        Ok(self
            .repos
            .iter()
            .filter(|repo| seen.insert(repo.repository.as_str()))
            .map(|repo| Repository {
                clone_protocol,
                ..repo.clone()
            })
            .collect())
    }

    async fn get_branches(&self, repo: &Repository) -> Result<Vec<Repository>> {
        self.check("get_branches")?;

        Ok(self
            .repos
            .iter()
            .filter(|candidate| candidate.repository == repo.repository)
            .map(|candidate| Repository {
                clone_protocol: repo.clone_protocol,
                ..candidate.clone()
            })
            .collect())
    }

    async fn get_pull_requests(&self, repo: &Repository) -> Result<Vec<Repository>> {
        self.check("get_pull_requests")?;

        Ok(self
            .pull_requests
            .get(&repo.repository)
            .into_iter()
            .flatten()
            .map(|pr| Repository {
                branch: pr.branch.clone(),
                sha: pr.head_sha.clone(),
                pull_request: Some(pr.clone()),
                ..repo.clone()
            })
            .collect())
    }

    async fn repo_has_path(&self, repo: &Repository, path: &str) -> Result<bool> {
        self.check("repo_has_path")?;
        Ok(path == repo.repository)
    }
}

/// Hands out the same provider for every generator
#[derive(Debug, Clone, Default)]
pub struct MockProviderFactory {
    pub provider: Arc<MockProvider>,
}

impl MockProviderFactory {
    #[must_use]
    pub fn new(provider: MockProvider) -> Self {
        Self {
            provider: Arc::new(provider),
        }
    }
}

impl ScmProviderFactory for MockProviderFactory {
    fn for_scm_generator(
        &self,
        _spec: &ScmProviderGenerator,
    ) -> Result<Arc<dyn ScmProviderService>, ScmError> {
        Ok(self.provider.clone())
    }

    fn for_pull_request_generator(
        &self,
        _spec: &PullRequestGenerator,
    ) -> Result<Arc<dyn ScmProviderService>, ScmError> {
        Ok(self.provider.clone())
    }
}
