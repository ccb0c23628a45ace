//! # GitHub Provider
//!
//! `ScmProviderService` over the GitHub REST API v3, using reqwest with rustls.
//!
//! - Repositories: `GET /orgs/{org}/repos`
//! - Branches: `GET /repos/{org}/{repo}/branches` (or only the default branch)
//! - Pull requests: `GET /repos/{org}/{repo}/pulls?state=open`
//! - Paths: `GET /repos/{org}/{repo}/contents/{path}?ref={branch}`, 404 means absent
//!
//! Listing endpoints are paginated with `per_page`/`page` until a short page is returned.

use crate::constants::{DEFAULT_GITHUB_API, SCM_PAGE_SIZE};
use crate::observability::metrics;
use crate::scm_provider::{CloneProtocol, PullRequest, Repository, ScmProviderService};
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Instant;
use tracing::{debug, warn};

const PROVIDER: &str = "github";

#[derive(Debug, Deserialize)]
struct ApiRepository {
    name: String,
    clone_url: String,
    ssh_url: String,
    #[serde(default)]
    default_branch: Option<String>,
    #[serde(default)]
    topics: Vec<String>,
    #[serde(default)]
    archived: bool,
}

#[derive(Debug, Deserialize)]
struct ApiCommitRef {
    sha: String,
}

#[derive(Debug, Deserialize)]
struct ApiBranch {
    name: String,
    commit: ApiCommitRef,
}

#[derive(Debug, Deserialize)]
struct ApiLabel {
    name: String,
}

#[derive(Debug, Deserialize)]
struct ApiPullRequestRef {
    #[serde(rename = "ref")]
    git_ref: String,
    sha: String,
}

#[derive(Debug, Deserialize)]
struct ApiPullRequest {
    number: u64,
    #[serde(default)]
    title: String,
    head: ApiPullRequestRef,
    base: ApiPullRequestRef,
    #[serde(default)]
    labels: Vec<ApiLabel>,
}

/// GitHub adapter for one organization (or user)
#[derive(Debug, Clone)]
pub struct GithubProvider {
    http: Client,
    api: String,
    organization: String,
    token: Option<String>,
    all_branches: bool,
    pull_requests: bool,
}

impl GithubProvider {
    #[must_use]
    pub fn new(
        http: Client,
        api: Option<&str>,
        organization: &str,
        token: Option<String>,
        all_branches: bool,
        pull_requests: bool,
    ) -> Self {
        Self {
            http,
            api: api
                .unwrap_or(DEFAULT_GITHUB_API)
                .trim_end_matches('/')
                .to_string(),
            organization: organization.to_string(),
            token,
            all_branches,
            pull_requests,
        }
    }

    /// API URL from raw path segments; each segment is percent-encoded
    fn api_url<'a>(&self, segments: impl IntoIterator<Item = &'a str>) -> Result<Url> {
        let mut url = Url::parse(&self.api)
            .with_context(|| format!("Invalid GitHub API URL {}", self.api))?;
        url.path_segments_mut()
            .map_err(|()| anyhow::anyhow!("GitHub API URL {} cannot be a base", self.api))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn repo_url<'a>(
        &self,
        repo: &'a Repository,
        suffix: impl IntoIterator<Item = &'a str>,
    ) -> Result<Url> {
        self.api_url(
            ["repos", repo.organization.as_str(), repo.repository.as_str()]
                .into_iter()
                .chain(suffix),
        )
    }

    /// Contents API URL for `path` at the repository's branch
    fn contents_url(&self, repo: &Repository, path: &str) -> Result<Url> {
        let mut url = self.repo_url(
            repo,
            std::iter::once("contents").chain(
                path.split('/').filter(|segment| !segment.is_empty()),
            ),
        )?;
        url.query_pairs_mut().append_pair("ref", &repo.branch);
        Ok(url)
    }

    async fn get(&self, operation: &'static str, url: &Url) -> Result<reqwest::Response> {
        let mut request = self
            .http
            .get(url.clone())
            .header("Accept", "application/vnd.github+json")
            .header("User-Agent", concat!("applicationset-controller/", env!("CARGO_PKG_VERSION")));
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let start = Instant::now();
        let result = request.send().await;
        metrics::record_scm_request(PROVIDER, operation, start.elapsed().as_secs_f64());

        result
            .with_context(|| format!("GitHub {operation} request to {url} failed"))
            .inspect_err(|_| metrics::increment_scm_request_errors(PROVIDER))
    }

    async fn get_json<T: DeserializeOwned>(&self, operation: &'static str, url: &Url) -> Result<T> {
        let response = self.get(operation, url).await?;
        let status = response.status();
        if !status.is_success() {
            metrics::increment_scm_request_errors(PROVIDER);
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("GitHub {operation} returned HTTP {}: {}", status.as_u16(), body);
        }
        response
            .json::<T>()
            .await
            .with_context(|| format!("GitHub {operation} returned an unexpected body"))
    }

    async fn paginate<T: DeserializeOwned>(
        &self,
        operation: &'static str,
        base_url: Url,
    ) -> Result<Vec<T>> {
        let mut items = Vec::new();
        for page in 1.. {
            let mut url = base_url.clone();
            url.query_pairs_mut()
                .append_pair("per_page", &SCM_PAGE_SIZE.to_string())
                .append_pair("page", &page.to_string());
            let batch: Vec<T> = self.get_json(operation, &url).await?;
            let done = is_last_page(batch.len());
            items.extend(batch);
            if done {
                break;
            }
        }
        Ok(items)
    }
}

fn is_last_page(len: usize) -> bool {
    len < SCM_PAGE_SIZE as usize
}

fn to_repository(
    organization: &str,
    api_repo: ApiRepository,
    clone_protocol: CloneProtocol,
) -> Repository {
    let url = match clone_protocol {
        CloneProtocol::Https => api_repo.clone_url,
        CloneProtocol::Ssh => api_repo.ssh_url,
    };
    Repository {
        organization: organization.to_string(),
        repository: api_repo.name,
        url,
        branch: api_repo.default_branch.unwrap_or_default(),
        sha: String::new(),
        labels: api_repo.topics,
        clone_protocol,
        pull_request: None,
    }
}

fn to_pull_request_candidate(repo: &Repository, pr: ApiPullRequest) -> Repository {
    Repository {
        branch: pr.head.git_ref.clone(),
        sha: pr.head.sha.clone(),
        pull_request: Some(PullRequest {
            number: pr.number,
            title: pr.title,
            branch: pr.head.git_ref,
            target_branch: pr.base.git_ref,
            head_sha: pr.head.sha,
            labels: pr.labels.into_iter().map(|label| label.name).collect(),
        }),
        ..repo.clone()
    }
}

#[async_trait]
impl ScmProviderService for GithubProvider {
    async fn list_repos(&self, clone_protocol: CloneProtocol) -> Result<Vec<Repository>> {
        let url = self.api_url(["orgs", self.organization.as_str(), "repos"])?;
        let repos: Vec<ApiRepository> = self.paginate("list_repos", url).await?;
        debug!(organization = %self.organization, count = repos.len(), "Listed GitHub repositories");

        Ok(repos
            .into_iter()
            .filter(|repo| !repo.archived)
            .map(|repo| to_repository(&self.organization, repo, clone_protocol))
            .collect())
    }

    async fn get_branches(&self, repo: &Repository) -> Result<Vec<Repository>> {
        let branches: Vec<ApiBranch> = if self.all_branches {
            self.paginate("get_branches", self.repo_url(repo, ["branches"])?)
                .await?
        } else if repo.branch.is_empty() {
            // Empty repositories have no default branch
            warn!(repository = %repo.full_name(), "Repository has no default branch, skipping");
            Vec::new()
        } else {
            let url = self.repo_url(repo, ["branches", repo.branch.as_str()])?;
            vec![self.get_json("get_branches", &url).await?]
        };

        Ok(branches
            .into_iter()
            .map(|branch| Repository {
                branch: branch.name,
                sha: branch.commit.sha,
                ..repo.clone()
            })
            .collect())
    }

    async fn get_pull_requests(&self, repo: &Repository) -> Result<Vec<Repository>> {
        if !self.pull_requests {
            return Ok(Vec::new());
        }

        let mut url = self.repo_url(repo, ["pulls"])?;
        url.query_pairs_mut().append_pair("state", "open");
        let prs: Vec<ApiPullRequest> = self.paginate("get_pull_requests", url).await?;

        Ok(prs
            .into_iter()
            .map(|pr| to_pull_request_candidate(repo, pr))
            .collect())
    }

    async fn repo_has_path(&self, repo: &Repository, path: &str) -> Result<bool> {
        let url = self.contents_url(repo, path)?;
        let response = self.get("repo_has_path", &url).await?;

        match response.status() {
            status if status.is_success() => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            status => {
                metrics::increment_scm_request_errors(PROVIDER);
                anyhow::bail!(
                    "GitHub repo_has_path for {} returned HTTP {}",
                    repo.full_name(),
                    status.as_u16()
                )
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn api_repo() -> ApiRepository {
        serde_json::from_value(serde_json::json!({
            "name": "argo-cd",
            "clone_url": "https://github.com/argoproj/argo-cd.git",
            "ssh_url": "git@github.com:argoproj/argo-cd.git",
            "default_branch": "master",
            "topics": ["gitops", "kubernetes"]
        }))
        .unwrap()
    }

    #[test]
    fn test_clone_protocol_selects_url() {
        let https = to_repository("argoproj", api_repo(), CloneProtocol::Https);
        assert_eq!(https.url, "https://github.com/argoproj/argo-cd.git");
        assert_eq!(https.branch, "master");
        assert_eq!(https.labels, vec!["gitops", "kubernetes"]);

        let ssh = to_repository("argoproj", api_repo(), CloneProtocol::Ssh);
        assert_eq!(ssh.url, "git@github.com:argoproj/argo-cd.git");
        assert_eq!(ssh.clone_protocol, CloneProtocol::Ssh);
    }

    #[test]
    fn test_pull_request_candidate_uses_head() {
        let repo = to_repository("argoproj", api_repo(), CloneProtocol::Https);
        let pr: ApiPullRequest = serde_json::from_value(serde_json::json!({
            "number": 42,
            "title": "Add feature",
            "head": {"ref": "feature/x", "sha": "0123456789abcdef"},
            "base": {"ref": "master", "sha": "fedcba9876543210"},
            "labels": [{"name": "preview"}]
        }))
        .unwrap();

        let candidate = to_pull_request_candidate(&repo, pr);
        assert_eq!(candidate.branch, "feature/x");
        assert_eq!(candidate.sha, "0123456789abcdef");
        let pr = candidate.pull_request.unwrap();
        assert_eq!(pr.number, 42);
        assert_eq!(pr.target_branch, "master");
        assert_eq!(pr.labels, vec!["preview"]);
    }

    #[test]
    fn test_api_base_is_normalized() {
        let provider = GithubProvider::new(
            Client::new(),
            Some("https://ghe.example.com/api/v3/"),
            "platform",
            None,
            false,
            false,
        );
        let repo = Repository {
            organization: "platform".to_string(),
            repository: "charts".to_string(),
            ..Default::default()
        };
        assert_eq!(
            provider.repo_url(&repo, ["branches"]).unwrap().as_str(),
            "https://ghe.example.com/api/v3/repos/platform/charts/branches"
        );
    }

    #[test]
    fn test_branch_names_are_encoded() {
        let provider = GithubProvider::new(Client::new(), None, "platform", None, false, false);
        for (branch, segment) in [
            ("fix#12", "fix%2312"),
            ("feat+x", "feat+x"),
            ("a&b=c", "a&b=c"),
            ("100%", "100%25"),
        ] {
            let repo = Repository {
                organization: "platform".to_string(),
                repository: "charts".to_string(),
                branch: branch.to_string(),
                ..Default::default()
            };

            let url = provider.contents_url(&repo, "/charts/Chart.yaml").unwrap();
            assert_eq!(url.fragment(), None);
            assert_eq!(url.path(), "/repos/platform/charts/contents/charts/Chart.yaml");
            let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
            assert_eq!(pairs, vec![("ref".to_string(), branch.to_string())]);

            let url = provider
                .repo_url(&repo, ["branches", repo.branch.as_str()])
                .unwrap();
            assert_eq!(url.fragment(), None);
            assert_eq!(url.query(), None);
            assert_eq!(url.path(), format!("/repos/platform/charts/branches/{segment}"));
        }
    }

    #[test]
    fn test_short_page_ends_pagination() {
        assert!(is_last_page(0));
        assert!(is_last_page(99));
        assert!(!is_last_page(100));
    }
}
