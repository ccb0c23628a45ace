//! # Filters
//!
//! Compiles declarative filter groups into `Filter` predicates and evaluates one
//! candidate against one filter.
//!
//! ## Classification
//!
//! A filter is bucketed by the last populated field in this checklist:
//!
//! 1. `repositoryMatch` -> Repo
//! 2. `labelMatch` -> Repo
//! 3. `pathsExist` -> Repo
//! 4. `branchMatch` -> Branch
//! 5. `pullRequestBranchMatch` -> PullRequest
//! 6. `pullRequestLabelMatch` -> PullRequest
//!
//! So a group with both `repositoryMatch` and `branchMatch` is a Branch filter and is
//! evaluated against branch candidates only. A group with nothing populated is `Unset`
//! and lands in no bucket.

use crate::crd::ScmProviderGeneratorFilter;
use crate::scm_provider::{Repository, ScmProviderService};
use anyhow::Result;
use regex::Regex;
use thiserror::Error;

/// Which stage of the pipeline a filter applies to
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum FilterType {
    #[default]
    Unset,
    Repo,
    Branch,
    PullRequest,
}

/// One compiled filter group
#[derive(Debug, Clone, Default)]
pub struct Filter {
    pub repository_match: Option<Regex>,
    pub label_match: Option<Regex>,
    pub paths_exist: Vec<String>,
    pub branch_match: Option<Regex>,
    pub pull_request_branch_match: Option<Regex>,
    pub pull_request_label_match: Option<Regex>,
    pub filter_type: FilterType,
}

#[derive(Debug, Error)]
pub enum FilterError {
    #[error("error compiling {field} regexp {pattern:?}: {source}")]
    InvalidPattern {
        field: &'static str,
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

fn compile_pattern(field: &'static str, pattern: &str) -> Result<Regex, FilterError> {
    Regex::new(pattern).map_err(|source| FilterError::InvalidPattern {
        field,
        pattern: pattern.to_string(),
        source,
    })
}

fn compile_filter(spec: &ScmProviderGeneratorFilter) -> Result<Filter, FilterError> {
    let mut filter = Filter::default();

    if let Some(pattern) = &spec.repository_match {
        filter.repository_match = Some(compile_pattern("repositoryMatch", pattern)?);
        filter.filter_type = FilterType::Repo;
    }
    if let Some(pattern) = &spec.label_match {
        filter.label_match = Some(compile_pattern("labelMatch", pattern)?);
        filter.filter_type = FilterType::Repo;
    }
    if let Some(paths) = &spec.paths_exist {
        filter.paths_exist.clone_from(paths);
        filter.filter_type = FilterType::Repo;
    }
    if let Some(pattern) = &spec.branch_match {
        filter.branch_match = Some(compile_pattern("branchMatch", pattern)?);
        filter.filter_type = FilterType::Branch;
    }
    if let Some(pattern) = &spec.pull_request_branch_match {
        filter.pull_request_branch_match =
            Some(compile_pattern("pullRequestBranchMatch", pattern)?);
        filter.filter_type = FilterType::PullRequest;
    }
    if let Some(pattern) = &spec.pull_request_label_match {
        filter.pull_request_label_match = Some(compile_pattern("pullRequestLabelMatch", pattern)?);
        filter.filter_type = FilterType::PullRequest;
    }

    Ok(filter)
}

/// Compile every filter group, preserving order. The first invalid pattern fails the
/// whole list.
pub fn compile_filters(specs: &[ScmProviderGeneratorFilter]) -> Result<Vec<Filter>, FilterError> {
    specs.iter().map(compile_filter).collect()
}

/// Evaluate one candidate against one filter
///
/// Every populated matcher must hold; evaluation stops at the first one that does not.
/// Path checks call the provider and run last so they are skipped when a cheaper matcher
/// already rejected the candidate.
pub async fn match_filter(
    provider: &dyn ScmProviderService,
    repo: &Repository,
    filter: &Filter,
) -> Result<bool> {
    if let Some(re) = &filter.repository_match {
        if !re.is_match(&repo.repository) {
            return Ok(false);
        }
    }

    // Both branch regexes test the candidate branch; for PR candidates that is the
    // PR source branch.
    if let Some(re) = &filter.branch_match {
        if !re.is_match(&repo.branch) {
            return Ok(false);
        }
    }
    if let Some(re) = &filter.pull_request_branch_match {
        if !re.is_match(&repo.branch) {
            return Ok(false);
        }
    }

    if let Some(re) = &filter.pull_request_label_match {
        let pr_labels = repo
            .pull_request
            .as_ref()
            .map(|pr| pr.labels.as_slice())
            .unwrap_or_default();
        if !pr_labels.iter().any(|label| re.is_match(label)) {
            return Ok(false);
        }
    }

    if let Some(re) = &filter.label_match {
        if !repo.labels.iter().any(|label| re.is_match(label)) {
            return Ok(false);
        }
    }

    for path in &filter.paths_exist {
        if !provider.repo_has_path(repo, path).await? {
            return Ok(false);
        }
    }

    Ok(true)
}
