//! Pull request generator: one parameter set per open PR of a single repository.
//!
//! Parameters: `number`, `branch`, `branch_slug`, `target_branch`, `head_sha`,
//! `head_short_sha`, `labels` (comma-joined).

use crate::crd::PullRequestGenerator;
use crate::generators::{short_sha, slugify, GeneratorError, ParamSet, Params};
use crate::scm_provider::{Repository, ScmError, ScmProviderFactory};

const BRANCH_SLUG_MAX_LEN: usize = 50;
const SHORT_SHA_LEN: usize = 8;

pub(super) async fn generate(
    spec: &PullRequestGenerator,
    factory: &dyn ScmProviderFactory,
) -> Result<Vec<ParamSet>, GeneratorError> {
    let github = spec.github.as_ref().ok_or_else(|| {
        ScmError::Unsupported("pullRequest generator needs a provider block (github)".into())
    })?;
    let provider = factory.for_pull_request_generator(spec)?;

    let repo = Repository {
        organization: github.owner.clone(),
        repository: github.repo.clone(),
        ..Default::default()
    };
    let candidates = provider
        .get_pull_requests(&repo)
        .await
        .map_err(ScmError::provider("get_pull_requests"))?;

    Ok(candidates
        .into_iter()
        .filter_map(|candidate| candidate.pull_request)
        .filter(|pr| github.labels.iter().all(|wanted| pr.labels.contains(wanted)))
        .map(|pr| {
            let params = Params::from([
                ("number".to_string(), pr.number.to_string()),
                ("branch".to_string(), pr.branch.clone()),
                (
                    "branch_slug".to_string(),
                    slugify(&pr.branch, BRANCH_SLUG_MAX_LEN),
                ),
                ("target_branch".to_string(), pr.target_branch.clone()),
                ("head_sha".to_string(), pr.head_sha.clone()),
                (
                    "head_short_sha".to_string(),
                    short_sha(&pr.head_sha, SHORT_SHA_LEN),
                ),
                ("labels".to_string(), pr.labels.join(",")),
            ]);
            ParamSet {
                key: format!("pr:{}/{}#{}", github.owner, github.repo, pr.number),
                params,
            }
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::PullRequestGeneratorGithub;
    use crate::scm_provider::mock::{MockProvider, MockProviderFactory};
    use crate::scm_provider::PullRequest;

    fn pr(number: u64, branch: &str, labels: &[&str]) -> PullRequest {
        PullRequest {
            number,
            branch: branch.to_string(),
            target_branch: "main".to_string(),
            head_sha: "89abcdef0123456789abcdef".to_string(),
            labels: labels.iter().map(ToString::to_string).collect(),
            ..Default::default()
        }
    }

    fn spec(labels: &[&str]) -> PullRequestGenerator {
        PullRequestGenerator {
            github: Some(PullRequestGeneratorGithub {
                owner: "myorg".to_string(),
                repo: "myrepo".to_string(),
                api: None,
                labels: labels.iter().map(ToString::to_string).collect(),
            }),
        }
    }

    fn factory() -> MockProviderFactory {
        MockProviderFactory::new(MockProvider::default().with_pull_requests(
            "myrepo",
            vec![
                pr(1, "Feature/New_UI", &["preview", "ui"]),
                pr(2, "fix/crash", &["bug"]),
                pr(3, "feature/api", &["preview"]),
            ],
        ))
    }

    #[tokio::test]
    async fn test_all_open_pull_requests_without_label_filter() {
        let sets = generate(&spec(&[]), &factory()).await.unwrap();
        assert_eq!(sets.len(), 3);

        let first = &sets[0].params;
        assert_eq!(first["number"], "1");
        assert_eq!(first["branch_slug"], "feature-new-ui");
        assert_eq!(first["head_short_sha"], "89abcdef");
        assert_eq!(first["labels"], "preview,ui");
        assert_eq!(sets[0].key, "pr:myorg/myrepo#1");
    }

    #[tokio::test]
    async fn test_every_label_must_be_present() {
        let numbers = |sets: Vec<ParamSet>| -> Vec<String> {
            sets.into_iter().map(|s| s.params["number"].clone()).collect()
        };

        let preview = generate(&spec(&["preview"]), &factory()).await.unwrap();
        assert_eq!(numbers(preview), vec!["1", "3"]);

        let preview_ui = generate(&spec(&["preview", "ui"]), &factory())
            .await
            .unwrap();
        assert_eq!(numbers(preview_ui), vec!["1"]);
    }

    #[tokio::test]
    async fn test_missing_provider_block_is_a_configuration_error() {
        let err = generate(&PullRequestGenerator::default(), &factory())
            .await
            .unwrap_err();
        assert!(err.is_configuration());
    }

    #[tokio::test]
    async fn test_provider_failure_is_transient() {
        let factory =
            MockProviderFactory::new(MockProvider::default().failing_on("get_pull_requests"));
        let err = generate(&spec(&[]), &factory).await.unwrap_err();
        assert!(!err.is_configuration());
    }
}
