//! # Parameter Generators
//!
//! Each generator kind turns its configuration into an ordered list of parameter sets.
//! A parameter set is a flat `name -> string` map plus an identity key used to correlate
//! and deduplicate bindings.
//!
//! - `list.rs` - Literal elements
//! - `cluster.rs` - Registered clusters (`ClusterSource`)
//! - `git.rs` - Directories of a Git repository (`RepoTreeService`)
//! - `matrix.rs` - Cartesian product of nested generators
//! - `scm_provider.rs` - Repositories, branches and PRs from the SCM filter pipeline
//! - `pull_request.rs` - Open PRs of one repository
//!
//! `generate` is restartable: calling it again re-reads every source.

use crate::crd::ApplicationSetGenerator;
use crate::observability::metrics;
use crate::scm_provider::{ScmError, ScmProviderFactory};
use futures::future::{try_join_all, BoxFuture};
use futures::FutureExt;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::debug;

pub mod cluster;
pub mod git;
pub mod list;
pub mod matrix;
pub mod pull_request;
pub mod scm_provider;

pub use cluster::{ClusterInfo, ClusterSource, SecretClusterSource, StaticClusterSource};
pub use git::{GitCliTreeService, RepoTreeService, StaticRepoTree};

/// One binding: parameter name to value
pub type Params = BTreeMap<String, String>;

/// A binding plus the identity used to correlate it across passes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamSet {
    pub key: String,
    pub params: Params,
}

#[derive(Debug, Error)]
pub enum GeneratorError {
    #[error("invalid generator configuration: {0}")]
    InvalidConfig(String),
    #[error(transparent)]
    Scm(#[from] ScmError),
    #[error("invalid directory pattern {pattern:?}: {source}")]
    InvalidGlob {
        pattern: String,
        #[source]
        source: globset::Error,
    },
    #[error("{generator} generator failed: {source:#}")]
    Source {
        generator: &'static str,
        #[source]
        source: anyhow::Error,
    },
}

impl GeneratorError {
    pub(crate) fn from_source(generator: &'static str) -> impl FnOnce(anyhow::Error) -> Self {
        move |source| GeneratorError::Source { generator, source }
    }

    /// Configuration errors will not go away on retry
    #[must_use]
    pub fn is_configuration(&self) -> bool {
        match self {
            GeneratorError::InvalidConfig(_) | GeneratorError::InvalidGlob { .. } => true,
            GeneratorError::Scm(e) => e.is_configuration(),
            GeneratorError::Source { .. } => false,
        }
    }
}

/// External capabilities generators read from
#[derive(Clone)]
pub struct GeneratorServices {
    pub clusters: Arc<dyn ClusterSource>,
    pub repo_trees: Arc<dyn RepoTreeService>,
    pub scm_providers: Arc<dyn ScmProviderFactory>,
}

impl std::fmt::Debug for GeneratorServices {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeneratorServices").finish_non_exhaustive()
    }
}

/// Validated generator, exactly one kind
#[derive(Debug, Clone)]
pub enum Generator {
    List(crate::crd::ListGenerator),
    Clusters(crate::crd::ClusterGenerator),
    Git(crate::crd::GitGenerator),
    Matrix(Vec<Generator>),
    ScmProvider(crate::crd::ScmProviderGenerator),
    PullRequest(crate::crd::PullRequestGenerator),
}

impl TryFrom<&ApplicationSetGenerator> for Generator {
    type Error = GeneratorError;

    fn try_from(spec: &ApplicationSetGenerator) -> Result<Self, Self::Error> {
        let mut kinds = Vec::new();
        if let Some(list) = &spec.list {
            kinds.push(Generator::List(list.clone()));
        }
        if let Some(clusters) = &spec.clusters {
            kinds.push(Generator::Clusters(clusters.clone()));
        }
        if let Some(git) = &spec.git {
            kinds.push(Generator::Git(git.clone()));
        }
        if let Some(matrix) = &spec.matrix {
            if matrix.generators.len() < 2 {
                return Err(GeneratorError::InvalidConfig(format!(
                    "matrix generator needs at least 2 nested generators, got {}",
                    matrix.generators.len()
                )));
            }
            let children = matrix
                .generators
                .iter()
                .map(Generator::try_from)
                .collect::<Result<Vec<_>, _>>()?;
            kinds.push(Generator::Matrix(children));
        }
        if let Some(scm) = &spec.scm_provider {
            kinds.push(Generator::ScmProvider(scm.clone()));
        }
        if let Some(pr) = &spec.pull_request {
            kinds.push(Generator::PullRequest(pr.clone()));
        }

        match kinds.len() {
            1 => Ok(kinds.remove(0)),
            0 => Err(GeneratorError::InvalidConfig(
                "generator has no kind set (expected one of list, clusters, git, matrix, scmProvider, pullRequest)"
                    .to_string(),
            )),
            n => Err(GeneratorError::InvalidConfig(format!(
                "generator sets {n} kinds ({}); exactly one is allowed",
                kinds.iter().map(Generator::kind).collect::<Vec<_>>().join(", ")
            ))),
        }
    }
}

impl Generator {
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Generator::List(_) => "list",
            Generator::Clusters(_) => "clusters",
            Generator::Git(_) => "git",
            Generator::Matrix(_) => "matrix",
            Generator::ScmProvider(_) => "scmProvider",
            Generator::PullRequest(_) => "pullRequest",
        }
    }

    /// Whether the output depends on sources the controller does not watch
    #[must_use]
    pub fn needs_polling(&self) -> bool {
        match self {
            Generator::List(_) => false,
            Generator::Matrix(children) => children.iter().any(Generator::needs_polling),
            _ => true,
        }
    }

    /// Produce this generator's parameter sets, deduplicated by key
    pub fn generate<'a>(
        &'a self,
        services: &'a GeneratorServices,
    ) -> BoxFuture<'a, Result<Vec<ParamSet>, GeneratorError>> {
        async move {
            let start = Instant::now();
            let sets = match self {
                Generator::List(spec) => list::generate(spec),
                Generator::Clusters(spec) => {
                    cluster::generate(spec, services.clusters.as_ref()).await?
                }
                Generator::Git(spec) => git::generate(spec, services.repo_trees.as_ref()).await?,
                Generator::Matrix(children) => {
                    let outputs =
                        try_join_all(children.iter().map(|child| child.generate(services)))
                            .await?;
                    matrix::product(&outputs)
                }
                Generator::ScmProvider(spec) => {
                    scm_provider::generate(spec, services.scm_providers.as_ref()).await?
                }
                Generator::PullRequest(spec) => {
                    pull_request::generate(spec, services.scm_providers.as_ref()).await?
                }
            };
            metrics::observe_generator_duration(self.kind(), start.elapsed().as_secs_f64());

            let sets = dedup(sets);
            debug!(generator = self.kind(), count = sets.len(), "Generated parameter sets");
            Ok(sets)
        }
        .boxed()
    }
}

/// Drop later parameter sets whose key was already seen
#[must_use]
pub fn dedup(sets: Vec<ParamSet>) -> Vec<ParamSet> {
    let mut seen = HashSet::new();
    sets.into_iter()
        .filter(|set| seen.insert(set.key.clone()))
        .collect()
}

/// Lowercase and replace everything outside `[a-z0-9-.]` with `-`
#[must_use]
pub fn normalize_name(value: &str) -> String {
    value
        .to_lowercase()
        .chars()
        .map(|c| {
            if c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '.' {
                c
            } else {
                '-'
            }
        })
        .collect()
}

/// URL-safe slug: lowercase alphanumerics joined by single `-`, at most `max_len` chars
#[must_use]
pub fn slugify(value: &str, max_len: usize) -> String {
    let mut slug = String::with_capacity(value.len());
    for c in value.to_lowercase().chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c);
        } else if !slug.is_empty() && !slug.ends_with('-') {
            slug.push('-');
        }
    }
    slug.truncate(max_len);
    slug.trim_end_matches('-').to_string()
}

/// First `len` characters of a commit SHA
#[must_use]
pub fn short_sha(sha: &str, len: usize) -> String {
    sha.chars().take(len).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::{ListGenerator, MatrixGenerator};
    use crate::scm_provider::mock::MockProviderFactory;

    fn list_spec(elements: serde_json::Value) -> ApplicationSetGenerator {
        ApplicationSetGenerator {
            list: Some(serde_json::from_value(serde_json::json!({ "elements": elements })).unwrap()),
            ..Default::default()
        }
    }

    pub(crate) fn services() -> GeneratorServices {
        GeneratorServices {
            clusters: Arc::new(StaticClusterSource::default()),
            repo_trees: Arc::new(StaticRepoTree::default()),
            scm_providers: Arc::new(MockProviderFactory::default()),
        }
    }

    #[test]
    fn test_exactly_one_kind_required() {
        let empty = ApplicationSetGenerator::default();
        let err = Generator::try_from(&empty).unwrap_err();
        assert!(err.is_configuration());

        let both = ApplicationSetGenerator {
            list: Some(ListGenerator::default()),
            clusters: Some(Default::default()),
            ..Default::default()
        };
        let err = Generator::try_from(&both).unwrap_err();
        assert!(err.to_string().contains("list, clusters"), "{err}");
    }

    #[test]
    fn test_matrix_needs_two_children() {
        let single = ApplicationSetGenerator {
            matrix: Some(MatrixGenerator {
                generators: vec![list_spec(serde_json::json!([{"a": "1"}]))],
            }),
            ..Default::default()
        };
        assert!(matches!(
            Generator::try_from(&single),
            Err(GeneratorError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_needs_polling() {
        let list = Generator::try_from(&list_spec(serde_json::json!([]))).unwrap();
        assert!(!list.needs_polling());

        let matrix = Generator::Matrix(vec![list, Generator::Clusters(Default::default())]);
        assert!(matrix.needs_polling());
    }

    #[tokio::test]
    async fn test_generate_dedups_by_key() {
        let generator = Generator::try_from(&list_spec(serde_json::json!([
            {"cluster": "a"},
            {"cluster": "b"},
            {"cluster": "a"}
        ])))
        .unwrap();

        let sets = generator.generate(&services()).await.unwrap();
        let clusters: Vec<&str> = sets.iter().map(|s| s.params["cluster"].as_str()).collect();
        assert_eq!(clusters, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_nested_matrix_composes() {
        let inner = ApplicationSetGenerator {
            matrix: Some(MatrixGenerator {
                generators: vec![
                    list_spec(serde_json::json!([{"x": "1"}, {"x": "2"}])),
                    list_spec(serde_json::json!([{"y": "a"}])),
                ],
            }),
            ..Default::default()
        };
        let outer = ApplicationSetGenerator {
            matrix: Some(MatrixGenerator {
                generators: vec![inner, list_spec(serde_json::json!([{"z": "k"}, {"z": "l"}]))],
            }),
            ..Default::default()
        };

        let sets = Generator::try_from(&outer)
            .unwrap()
            .generate(&services())
            .await
            .unwrap();
        assert_eq!(sets.len(), 4);
        assert!(sets
            .iter()
            .all(|s| s.params.contains_key("x") && s.params["y"] == "a"));
    }

    #[test]
    fn test_normalize_and_slug() {
        assert_eq!(normalize_name("Prod_Cluster.EU"), "prod-cluster.eu");
        assert_eq!(slugify("Feature/Add_Login!!", 50), "feature-add-login");
        assert_eq!(slugify("--x--", 50), "x");
        assert_eq!(slugify(&"ab".repeat(40), 50).len(), 50);
        assert_eq!(short_sha("0123456789abcdef", 8), "01234567");
        assert_eq!(short_sha("abc", 8), "abc");
    }
}
