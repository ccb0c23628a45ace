//! # Generator Configuration
//!
//! Declarative generator specs as they appear in an `ApplicationSet`.
//!
//! Each `ApplicationSetGenerator` must populate exactly one variant field. The
//! runtime representation (a tagged union) lives in `crate::generators`; these types
//! only describe the wire format.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One entry of `spec.generators`
#[derive(Debug, Clone, Default, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationSetGenerator {
    /// Fixed list of parameter sets
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub list: Option<ListGenerator>,
    /// One parameter set per registered cluster
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clusters: Option<ClusterGenerator>,
    /// One parameter set per matching directory of a Git repository
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub git: Option<GitGenerator>,
    /// Cartesian product of nested generators
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matrix: Option<MatrixGenerator>,
    /// Repositories and branches discovered through an SCM provider
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scm_provider: Option<ScmProviderGenerator>,
    /// Open pull requests of a single repository
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pull_request: Option<PullRequestGenerator>,
}

/// List generator
///
/// ```yaml
/// list:
///   elements:
///     - cluster: engineering-dev
///       url: https://1.2.3.4
/// ```
#[derive(Debug, Clone, Default, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ListGenerator {
    /// Literal parameter sets; scalar values are stringified
    #[serde(default)]
    #[schemars(schema_with = "crate::crd::schema::preserve_unknown_object_array")]
    pub elements: Vec<BTreeMap<String, serde_json::Value>>,
}

/// Cluster generator
#[derive(Debug, Clone, Default, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ClusterGenerator {
    /// Restricts the clusters by their registration labels. Empty selects every cluster,
    /// including the local one.
    #[serde(default)]
    pub selector: LabelSelector,
    /// Extra parameters exposed as `values.<key>`; values may reference cluster parameters
    #[serde(default)]
    pub values: BTreeMap<String, String>,
}

/// Label selector with the semantics of `metav1.LabelSelector`
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct LabelSelector {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub match_labels: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub match_expressions: Vec<LabelSelectorRequirement>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct LabelSelectorRequirement {
    pub key: String,
    pub operator: LabelSelectorOperator,
    #[serde(default)]
    pub values: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, schemars::JsonSchema)]
pub enum LabelSelectorOperator {
    In,
    NotIn,
    Exists,
    DoesNotExist,
}

impl LabelSelector {
    /// Whether the selector selects nothing in particular (matches everything)
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.match_labels.is_empty() && self.match_expressions.is_empty()
    }

    /// Evaluate the selector against a label set. All terms must hold.
    #[must_use]
    pub fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        let labels_match = self
            .match_labels
            .iter()
            .all(|(key, value)| labels.get(key) == Some(value));

        labels_match
            && self.match_expressions.iter().all(|requirement| {
                let current = labels.get(&requirement.key);
                match requirement.operator {
                    LabelSelectorOperator::In => {
                        current.is_some_and(|value| requirement.values.contains(value))
                    }
                    LabelSelectorOperator::NotIn => {
                        current.is_none_or(|value| !requirement.values.contains(value))
                    }
                    LabelSelectorOperator::Exists => current.is_some(),
                    LabelSelectorOperator::DoesNotExist => current.is_none(),
                }
            })
    }
}

/// Git directory generator
#[derive(Debug, Clone, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GitGenerator {
    #[serde(rename = "repoURL")]
    pub repo_url: String,
    /// Branch, tag or `HEAD`
    #[serde(default = "crate::crd::default_git_revision")]
    pub revision: String,
    /// Include and exclude rules, glob syntax relative to the repository root
    #[serde(default)]
    pub directories: Vec<GitDirectoryGeneratorItem>,
}

#[derive(Debug, Clone, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GitDirectoryGeneratorItem {
    pub path: String,
    #[serde(default)]
    pub exclude: bool,
}

/// Matrix generator: every combination of the nested generators' parameter sets
#[derive(Debug, Clone, Default, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct MatrixGenerator {
    #[schemars(schema_with = "crate::crd::schema::preserve_unknown_object_array")]
    pub generators: Vec<ApplicationSetGenerator>,
}

/// Clone URL flavour requested from the SCM provider
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Deserialize, Serialize, schemars::JsonSchema,
)]
#[serde(rename_all = "lowercase")]
pub enum CloneProtocol {
    #[default]
    Https,
    Ssh,
}

impl CloneProtocol {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            CloneProtocol::Https => "https",
            CloneProtocol::Ssh => "ssh",
        }
    }
}

/// SCM provider generator
#[derive(Debug, Clone, Default, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ScmProviderGenerator {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub github: Option<ScmProviderGeneratorGithub>,
    /// Filter groups: a candidate is kept when any group matches it
    #[serde(default)]
    pub filters: Vec<ScmProviderGeneratorFilter>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clone_protocol: Option<CloneProtocol>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ScmProviderGeneratorGithub {
    /// Organization (or user) to scan
    pub organization: String,
    /// API base URL, defaults to the public GitHub API
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api: Option<String>,
    /// Enumerate every branch instead of only the default branch
    #[serde(default)]
    pub all_branches: bool,
    /// Also produce one candidate per open pull request
    #[serde(default)]
    pub pull_requests: bool,
}

/// One filter group. Every populated field must match (AND); regexes are not anchored.
#[derive(Debug, Clone, Default, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ScmProviderGeneratorFilter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repository_match: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label_match: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paths_exist: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch_match: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pull_request_branch_match: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pull_request_label_match: Option<String>,
}

/// Pull request generator
#[derive(Debug, Clone, Default, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PullRequestGenerator {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub github: Option<PullRequestGeneratorGithub>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PullRequestGeneratorGithub {
    pub owner: String,
    pub repo: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api: Option<String>,
    /// Only pull requests carrying every one of these labels are kept
    #[serde(default)]
    pub labels: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn test_empty_selector_matches_everything() {
        let selector = LabelSelector::default();
        assert!(selector.is_empty());
        assert!(selector.matches(&BTreeMap::new()));
        assert!(selector.matches(&labels(&[("env", "prod")])));
    }

    #[test]
    fn test_match_labels_and_expressions_are_conjunctive() {
        let selector = LabelSelector {
            match_labels: labels(&[("argocd.argoproj.io/secret-type", "cluster")]),
            match_expressions: vec![LabelSelectorRequirement {
                key: "env".to_string(),
                operator: LabelSelectorOperator::In,
                values: vec!["staging".to_string(), "prod".to_string()],
            }],
        };

        assert!(selector.matches(&labels(&[
            ("argocd.argoproj.io/secret-type", "cluster"),
            ("env", "prod"),
        ])));
        assert!(!selector.matches(&labels(&[("argocd.argoproj.io/secret-type", "cluster")])));
        assert!(!selector.matches(&labels(&[("env", "prod")])));
    }

    #[test]
    fn test_not_in_and_existence_operators() {
        let requirement = |operator, values: &[&str]| LabelSelector {
            match_labels: BTreeMap::new(),
            match_expressions: vec![LabelSelectorRequirement {
                key: "tier".to_string(),
                operator,
                values: values.iter().map(ToString::to_string).collect(),
            }],
        };

        let not_in = requirement(LabelSelectorOperator::NotIn, &["edge"]);
        assert!(not_in.matches(&BTreeMap::new()));
        assert!(not_in.matches(&labels(&[("tier", "core")])));
        assert!(!not_in.matches(&labels(&[("tier", "edge")])));

        let exists = requirement(LabelSelectorOperator::Exists, &[]);
        assert!(exists.matches(&labels(&[("tier", "")])));
        assert!(!exists.matches(&BTreeMap::new()));

        let absent = requirement(LabelSelectorOperator::DoesNotExist, &[]);
        assert!(absent.matches(&BTreeMap::new()));
        assert!(!absent.matches(&labels(&[("tier", "core")])));
    }

    #[test]
    fn test_generator_yaml_shape() {
        let generator: ApplicationSetGenerator = serde_yaml::from_str(
            r"
scmProvider:
  github:
    organization: argoproj
    allBranches: true
  cloneProtocol: ssh
  filters:
    - repositoryMatch: ^argo
      pathsExist: [kubernetes/kustomization.yaml]
",
        )
        .unwrap();

        let scm = generator.scm_provider.unwrap();
        assert_eq!(scm.clone_protocol, Some(CloneProtocol::Ssh));
        assert!(scm.github.unwrap().all_branches);
        assert_eq!(scm.filters[0].repository_match.as_deref(), Some("^argo"));
        assert_eq!(
            scm.filters[0].paths_exist.as_deref(),
            Some(&["kubernetes/kustomization.yaml".to_string()][..])
        );
    }
}
