//! # Render Command
//!
//! Runs the generators and the template renderer against a manifest without touching
//! the cluster.

use anyhow::{Context, Result};
use applicationset_controller::controller::reconciler::desired::{
    compile_generators, generate_param_sets, render_desired,
};
use applicationset_controller::crd::ApplicationSet;
use applicationset_controller::generators::{
    GeneratorServices, GitCliTreeService, StaticClusterSource,
};
use applicationset_controller::scm_provider::DefaultScmProviderFactory;
use kube::ResourceExt;
use std::path::Path;
use std::sync::Arc;

/// Namespace used when neither the manifest nor `--namespace` sets one
const FALLBACK_NAMESPACE: &str = "argocd";

fn offline_services() -> GeneratorServices {
    GeneratorServices {
        clusters: Arc::new(StaticClusterSource::default()),
        repo_trees: Arc::new(GitCliTreeService),
        scm_providers: Arc::new(DefaultScmProviderFactory::new(
            std::env::var("GITHUB_TOKEN").ok().filter(|t| !t.is_empty()),
        )),
    }
}

/// Parse a manifest; `namespace` overrides the manifest's own
pub fn parse_manifest(contents: &str, namespace: Option<&str>) -> Result<ApplicationSet> {
    let mut appset: ApplicationSet =
        serde_yaml::from_str(contents).context("Failed to parse ApplicationSet manifest")?;
    if let Some(namespace) = namespace {
        appset.metadata.namespace = Some(namespace.to_string());
    } else if appset.namespace().is_none() {
        appset.metadata.namespace = Some(FALLBACK_NAMESPACE.to_string());
    }
    Ok(appset)
}

/// Desired Applications as a YAML stream, one document per Application
pub async fn render_appset(appset: &ApplicationSet, services: &GeneratorServices) -> Result<String> {
    let generators = compile_generators(&appset.spec)?;
    let sets = generate_param_sets(&generators, services).await?;
    let applications = render_desired(appset, &sets)?;

    let mut out = String::new();
    for application in &applications {
        out.push_str("---\n");
        out.push_str(&serde_yaml::to_string(application)?);
    }
    Ok(out)
}

pub async fn render_command(file: &Path, namespace: Option<&str>) -> Result<String> {
    let contents = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let appset = parse_manifest(&contents, namespace)?;
    render_appset(&appset, &offline_services()).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use applicationset_controller::generators::StaticRepoTree;
    use applicationset_controller::scm_provider::mock::MockProviderFactory;

    const MANIFEST: &str = r#"
apiVersion: argoproj.io/v1alpha1
kind: ApplicationSet
metadata:
  name: guestbook
spec:
  generators:
    - matrix:
        generators:
          - list:
              elements:
                - env: dev
                - env: prod
          - clusters: {}
  template:
    metadata:
      name: '{{env}}-{{name}}'
    spec:
      project: default
      destination:
        server: '{{server}}'
        namespace: '{{env}}'
"#;

    fn services() -> GeneratorServices {
        GeneratorServices {
            clusters: Arc::new(StaticClusterSource::default()),
            repo_trees: Arc::new(StaticRepoTree::default()),
            scm_providers: Arc::new(MockProviderFactory::default()),
        }
    }

    #[test]
    fn test_namespace_fallback_and_override() {
        assert_eq!(
            parse_manifest(MANIFEST, None).unwrap().namespace().as_deref(),
            Some("argocd")
        );
        assert_eq!(
            parse_manifest(MANIFEST, Some("team-a"))
                .unwrap()
                .namespace()
                .as_deref(),
            Some("team-a")
        );
    }

    #[tokio::test]
    async fn test_render_matrix_against_local_cluster() {
        let appset = parse_manifest(MANIFEST, None).unwrap();
        let yaml = render_appset(&appset, &services()).await.unwrap();

        assert_eq!(yaml.matches("---\n").count(), 2);
        assert!(yaml.contains("name: dev-in-cluster"));
        assert!(yaml.contains("name: prod-in-cluster"));
        assert!(yaml.contains("kubernetes.default.svc"));
        assert!(yaml.contains("argoproj.io/application-set-name: guestbook"));
    }
}
