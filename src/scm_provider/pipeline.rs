//! # Filter Pipeline
//!
//! Turns a provider plus a list of filter specs into the final candidate list:
//!
//! ```text
//! compile -> list repos -> repo filters -> expand branches -> branch filters -> ┐
//!                                       └-> expand PRs      -> PR filters     -> ┴ concat
//! ```
//!
//! Within a bucket, filters are OR-ed: a candidate survives if any filter of the bucket
//! matches it. An empty bucket passes everything through. The output is always the
//! branch candidates followed by the pull request candidates, each in provider order.
//!
//! Provider calls for different candidates run concurrently, at most
//! `SCM_MAX_CONCURRENT_REQUESTS` at a time per stage. Results are joined in input order
//! before filtering, and the first provider error aborts the whole pipeline.

use crate::constants::SCM_MAX_CONCURRENT_REQUESTS;
use crate::crd::ScmProviderGeneratorFilter;
use crate::scm_provider::filter::{compile_filters, match_filter, Filter, FilterType};
use crate::scm_provider::{CloneProtocol, Repository, ScmError, ScmProviderService};
use futures::stream::{self, StreamExt, TryStreamExt};
use std::future::Future;
use tracing::debug;

/// Await `calls` with bounded concurrency, keeping input order
async fn bounded<T, F>(calls: impl IntoIterator<Item = F>) -> anyhow::Result<Vec<T>>
where
    F: Future<Output = anyhow::Result<T>>,
{
    stream::iter(calls)
        .buffered(SCM_MAX_CONCURRENT_REQUESTS)
        .try_collect()
        .await
}

/// Compiled filters partitioned by the stage they apply to
#[derive(Debug, Default)]
pub struct FilterBuckets<'a> {
    pub repo: Vec<&'a Filter>,
    pub branch: Vec<&'a Filter>,
    pub pull_request: Vec<&'a Filter>,
}

/// Partition filters by `FilterType`, preserving order. `Unset` filters are dropped.
#[must_use]
pub fn get_applicable_filters(filters: &[Filter]) -> FilterBuckets<'_> {
    let mut buckets = FilterBuckets::default();
    for filter in filters {
        match filter.filter_type {
            FilterType::Repo => buckets.repo.push(filter),
            FilterType::Branch => buckets.branch.push(filter),
            FilterType::PullRequest => buckets.pull_request.push(filter),
            FilterType::Unset => {}
        }
    }
    buckets
}

/// Keep the candidates that match at least one of `filters`
async fn retain_matching(
    provider: &dyn ScmProviderService,
    candidates: Vec<Repository>,
    filters: &[&Filter],
) -> Result<Vec<Repository>, ScmError> {
    if filters.is_empty() {
        return Ok(candidates);
    }

    let verdicts = bounded(
        candidates
            .iter()
            .map(|candidate| async move {
                for filter in filters {
                    if match_filter(provider, candidate, filter).await? {
                        return Ok::<_, anyhow::Error>(true);
                    }
                }
                Ok(false)
            })
            .collect::<Vec<_>>(),
    )
    .await
    .map_err(ScmError::provider("repo_has_path"))?;

    Ok(candidates
        .into_iter()
        .zip(verdicts)
        .filter_map(|(candidate, keep)| keep.then_some(candidate))
        .collect())
}

async fn get_branches(
    provider: &dyn ScmProviderService,
    repos: &[Repository],
    filters: &[&Filter],
) -> Result<Vec<Repository>, ScmError> {
    let expanded = bounded(
        repos
            .iter()
            .map(|repo| provider.get_branches(repo))
            .collect::<Vec<_>>(),
    )
    .await
    .map_err(ScmError::provider("get_branches"))?;

    retain_matching(provider, expanded.into_iter().flatten().collect(), filters).await
}

async fn get_pull_requests(
    provider: &dyn ScmProviderService,
    repos: &[Repository],
    filters: &[&Filter],
) -> Result<Vec<Repository>, ScmError> {
    let expanded = bounded(
        repos
            .iter()
            .map(|repo| provider.get_pull_requests(repo))
            .collect::<Vec<_>>(),
    )
    .await
    .map_err(ScmError::provider("get_pull_requests"))?;

    retain_matching(provider, expanded.into_iter().flatten().collect(), filters).await
}

/// Run the full pipeline
///
/// # Errors
///
/// - `ScmError::InvalidFilter` if any pattern fails to compile; the provider is not called
/// - `ScmError::Provider` on the first failing provider call
pub async fn list_repos(
    provider: &dyn ScmProviderService,
    filter_specs: &[ScmProviderGeneratorFilter],
    clone_protocol: CloneProtocol,
) -> Result<Vec<Repository>, ScmError> {
    let compiled = compile_filters(filter_specs)?;
    let buckets = get_applicable_filters(&compiled);

    let repos = provider
        .list_repos(clone_protocol)
        .await
        .map_err(ScmError::provider("list_repos"))?;
    let listed = repos.len();

    let repos = retain_matching(provider, repos, &buckets.repo).await?;
    debug!(
        listed,
        kept = repos.len(),
        repo_filters = buckets.repo.len(),
        "Applied repository filters"
    );

    let (mut branches, pull_requests) = futures::try_join!(
        get_branches(provider, &repos, &buckets.branch),
        get_pull_requests(provider, &repos, &buckets.pull_request),
    )?;
    debug!(
        branches = branches.len(),
        pull_requests = pull_requests.len(),
        "Expanded candidates"
    );

    branches.extend(pull_requests);
    Ok(branches)
}
