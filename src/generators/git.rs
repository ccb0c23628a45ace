//! # Git Directory Generator
//!
//! One parameter set per directory of a repository that matches at least one include
//! rule and no exclude rule. Rules use glob syntax where `*` does not cross `/`.
//!
//! ## Parameters
//!
//! - `path` - directory relative to the repository root
//! - `path.basename`, `path.basenameNormalized`
//! - `path[N]` - Nth path segment

use crate::crd::{GitDirectoryGeneratorItem, GitGenerator};
use crate::generators::{normalize_name, GeneratorError, ParamSet, Params};
use crate::observability::metrics;
use anyhow::{Context, Result};
use async_trait::async_trait;
use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Instant;
use tracing::{debug, info};

/// Lists the directories of a repository at a revision
#[async_trait]
pub trait RepoTreeService: Send + Sync {
    /// Every directory (not file), `/`-separated and relative to the root, in sorted order
    async fn list_directories(&self, repo_url: &str, revision: &str) -> Result<Vec<String>>;
}

/// Shallow-clones with the `git` CLI into a temporary directory
#[derive(Debug, Clone, Default)]
pub struct GitCliTreeService;

fn collect_directories(root: &Path) -> Result<Vec<String>> {
    let mut directories = Vec::new();
    let walker = walkdir::WalkDir::new(root)
        .min_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| entry.file_name() != ".git");

    for entry in walker {
        let entry = entry.context("Failed to walk repository checkout")?;
        if !entry.file_type().is_dir() {
            continue;
        }
        let relative = entry
            .path()
            .strip_prefix(root)
            .context("Walked outside repository checkout")?;
        let segments: Vec<String> = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        directories.push(segments.join("/"));
    }
    Ok(directories)
}

#[async_trait]
impl RepoTreeService for GitCliTreeService {
    async fn list_directories(&self, repo_url: &str, revision: &str) -> Result<Vec<String>> {
        let checkout = tempfile::tempdir().context("Failed to create checkout directory")?;

        let mut clone_cmd = tokio::process::Command::new("git");
        clone_cmd
            .arg("clone")
            .arg("--quiet")
            .arg("--depth")
            .arg("1");
        if !revision.is_empty() && revision != "HEAD" {
            clone_cmd.arg("--branch").arg(revision);
        }
        clone_cmd
            .arg(repo_url)
            .arg(checkout.path())
            .env("GIT_TERMINAL_PROMPT", "0");

        info!("Cloning {} at {}", repo_url, revision);
        metrics::increment_git_clone_total();
        let start = Instant::now();
        let output = clone_cmd
            .output()
            .await
            .context("Failed to execute git clone")?;
        metrics::observe_git_clone_duration(start.elapsed().as_secs_f64());

        if !output.status.success() {
            metrics::increment_git_clone_errors_total();
            anyhow::bail!(
                "git clone of {} at {} failed: {}",
                repo_url,
                revision,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }

        // The checkout is dropped (and removed) once the walk finishes
        tokio::task::spawn_blocking(move || collect_directories(checkout.path()))
            .await
            .context("Directory walk task panicked")?
    }
}

/// Fixed directory listing per repository URL, used offline and in tests
#[derive(Debug, Clone, Default)]
pub struct StaticRepoTree {
    pub trees: BTreeMap<String, Vec<String>>,
}

#[async_trait]
impl RepoTreeService for StaticRepoTree {
    async fn list_directories(&self, repo_url: &str, _revision: &str) -> Result<Vec<String>> {
        self.trees
            .get(repo_url)
            .cloned()
            .with_context(|| format!("repository {repo_url} not found"))
    }
}

fn build_globset<'a>(
    items: impl Iterator<Item = &'a GitDirectoryGeneratorItem>,
) -> Result<GlobSet, GeneratorError> {
    let mut builder = GlobSetBuilder::new();
    for item in items {
        let glob = GlobBuilder::new(item.path.trim_matches('/'))
            .literal_separator(true)
            .build()
            .map_err(|source| GeneratorError::InvalidGlob {
                pattern: item.path.clone(),
                source,
            })?;
        builder.add(glob);
    }
    builder.build().map_err(|source| GeneratorError::InvalidGlob {
        pattern: String::new(),
        source,
    })
}

/// Keep directories matching an include rule and no exclude rule, preserving order
pub(super) fn select_directories(
    directories: &[String],
    rules: &[GitDirectoryGeneratorItem],
) -> Result<Vec<String>, GeneratorError> {
    let include = build_globset(rules.iter().filter(|r| !r.exclude))?;
    let exclude = build_globset(rules.iter().filter(|r| r.exclude))?;

    Ok(directories
        .iter()
        .filter(|dir| include.is_match(dir.as_str()) && !exclude.is_match(dir.as_str()))
        .cloned()
        .collect())
}

fn directory_params(path: &str) -> Params {
    let mut params = Params::new();
    let basename = path.rsplit('/').next().unwrap_or(path);
    params.insert("path".to_string(), path.to_string());
    params.insert("path.basename".to_string(), basename.to_string());
    params.insert(
        "path.basenameNormalized".to_string(),
        normalize_name(basename),
    );
    for (index, segment) in path.split('/').enumerate() {
        params.insert(format!("path[{index}]"), segment.to_string());
    }
    params
}

pub(super) async fn generate(
    spec: &GitGenerator,
    trees: &dyn RepoTreeService,
) -> Result<Vec<ParamSet>, GeneratorError> {
    if spec.directories.iter().all(|d| d.exclude) {
        return Err(GeneratorError::InvalidConfig(
            "git generator needs at least one include directory rule".to_string(),
        ));
    }

    let directories = trees
        .list_directories(&spec.repo_url, &spec.revision)
        .await
        .map_err(GeneratorError::from_source("git"))?;
    let selected = select_directories(&directories, &spec.directories)?;
    debug!(
        repo = %spec.repo_url,
        total = directories.len(),
        selected = selected.len(),
        "Selected repository directories"
    );

    Ok(selected
        .iter()
        .map(|path| ParamSet {
            key: format!("git:{}@{}:{}", spec.repo_url, spec.revision, path),
            params: directory_params(path),
        })
        .collect())
}
