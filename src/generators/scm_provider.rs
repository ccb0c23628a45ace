//! SCM provider generator: one parameter set per candidate surviving the filter pipeline.
//!
//! Parameters: `organization`, `repository`, `url`, `branch`, `branchNormalized`, `sha`,
//! `short_sha`, `labels` (comma-joined). Pull request candidates add `number`,
//! `target_branch`, `head_sha`, `head_short_sha` and `pull_request_labels`.

use crate::crd::ScmProviderGenerator;
use crate::generators::{normalize_name, short_sha, GeneratorError, ParamSet, Params};
use crate::scm_provider::{list_repos, Repository, ScmProviderFactory};

const SHORT_SHA_LEN: usize = 8;

pub(super) fn candidate_params(repo: &Repository) -> Params {
    let mut params = Params::from([
        ("organization".to_string(), repo.organization.clone()),
        ("repository".to_string(), repo.repository.clone()),
        ("url".to_string(), repo.url.clone()),
        ("branch".to_string(), repo.branch.clone()),
        ("branchNormalized".to_string(), normalize_name(&repo.branch)),
        ("sha".to_string(), repo.sha.clone()),
        ("short_sha".to_string(), short_sha(&repo.sha, SHORT_SHA_LEN)),
        ("labels".to_string(), repo.labels.join(",")),
    ]);

    if let Some(pr) = &repo.pull_request {
        params.insert("number".to_string(), pr.number.to_string());
        params.insert("target_branch".to_string(), pr.target_branch.clone());
        params.insert("head_sha".to_string(), pr.head_sha.clone());
        params.insert(
            "head_short_sha".to_string(),
            short_sha(&pr.head_sha, SHORT_SHA_LEN),
        );
        params.insert("pull_request_labels".to_string(), pr.labels.join(","));
    }
    params
}

fn candidate_key(repo: &Repository) -> String {
    match &repo.pull_request {
        Some(pr) => format!("scm:{}#{}", repo.full_name(), pr.number),
        None => format!("scm:{}@{}", repo.full_name(), repo.branch),
    }
}

pub(super) async fn generate(
    spec: &ScmProviderGenerator,
    factory: &dyn ScmProviderFactory,
) -> Result<Vec<ParamSet>, GeneratorError> {
    let provider = factory.for_scm_generator(spec)?;
    let candidates = list_repos(
        provider.as_ref(),
        &spec.filters,
        spec.clone_protocol.unwrap_or_default(),
    )
    .await?;

    Ok(candidates
        .iter()
        .map(|repo| ParamSet {
            key: candidate_key(repo),
            params: candidate_params(repo),
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::ScmProviderGeneratorFilter;
    use crate::scm_provider::mock::{MockProvider, MockProviderFactory};
    use crate::scm_provider::PullRequest;

    fn repo(name: &str, branch: &str) -> Repository {
        Repository {
            organization: "argoproj".to_string(),
            repository: name.to_string(),
            url: format!("https://github.com/argoproj/{name}.git"),
            branch: branch.to_string(),
            sha: "0123456789abcdef0123456789abcdef01234567".to_string(),
            labels: vec!["gitops".to_string(), "k8s".to_string()],
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_branch_candidate_params() {
        let factory = MockProviderFactory::new(MockProvider::new(vec![
            repo("argo-cd", "Release/2.0"),
            repo("applicationset", "master"),
        ]));
        let spec = ScmProviderGenerator {
            filters: vec![ScmProviderGeneratorFilter {
                repository_match: Some("^argo".to_string()),
                ..Default::default()
            }],
            ..Default::default()
        };

        let sets = generate(&spec, &factory).await.unwrap();
        assert_eq!(sets.len(), 1);
        let params = &sets[0].params;
        assert_eq!(params["repository"], "argo-cd");
        assert_eq!(params["branchNormalized"], "release-2.0");
        assert_eq!(params["short_sha"], "01234567");
        assert_eq!(params["labels"], "gitops,k8s");
        assert!(!params.contains_key("number"));
        assert_eq!(sets[0].key, "scm:argoproj/argo-cd@Release/2.0");
    }

    #[tokio::test]
    async fn test_pull_request_candidate_params() {
        let provider = MockProvider::new(vec![repo("argo-cd", "master")]).with_pull_requests(
            "argo-cd",
            vec![PullRequest {
                number: 12,
                branch: "feature/x".to_string(),
                target_branch: "master".to_string(),
                head_sha: "fedcba9876543210".to_string(),
                labels: vec!["preview".to_string()],
                ..Default::default()
            }],
        );

        let sets = generate(&ScmProviderGenerator::default(), &MockProviderFactory::new(provider))
            .await
            .unwrap();

        assert_eq!(sets.len(), 2);
        let pr = &sets[1].params;
        assert_eq!(pr["number"], "12");
        assert_eq!(pr["branch"], "feature/x");
        assert_eq!(pr["head_short_sha"], "fedcba98");
        assert_eq!(pr["pull_request_labels"], "preview");
        assert_eq!(sets[1].key, "scm:argoproj/argo-cd#12");
    }

    #[tokio::test]
    async fn test_invalid_filter_is_a_configuration_error() {
        let spec = ScmProviderGenerator {
            filters: vec![ScmProviderGeneratorFilter {
                label_match: Some("(".to_string()),
                ..Default::default()
            }],
            ..Default::default()
        };

        let err = generate(&spec, &MockProviderFactory::default())
            .await
            .unwrap_err();
        assert!(err.is_configuration());
    }
}
