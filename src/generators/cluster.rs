//! # Cluster Generator
//!
//! One parameter set per registered cluster matching the selector.
//!
//! Clusters are registered as Secrets labelled `argocd.argoproj.io/secret-type=cluster`
//! with `name` and `server` data keys. The local cluster (`in-cluster`) is always present
//! unless a Secret already registers its server. It has no labels, so any non-empty
//! selector excludes it.
//!
//! ## Parameters
//!
//! - `name`, `nameNormalized`, `server`
//! - `metadata.labels.<key>`, `metadata.annotations.<key>`
//! - `values.<key>` from the generator's `values`, rendered with the parameters above

use crate::constants::{
    CLUSTER_SECRET_TYPE, CLUSTER_SECRET_TYPE_LABEL, IN_CLUSTER_NAME, IN_CLUSTER_SERVER,
};
use crate::crd::ClusterGenerator;
use crate::generators::{normalize_name, GeneratorError, ParamSet, Params};
use crate::template::render_string;
use anyhow::{Context, Result};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use kube::api::{Api, ListParams};
use kube::Client;
use std::collections::BTreeMap;
use tracing::warn;

/// A registered cluster
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClusterInfo {
    pub name: String,
    pub server: String,
    pub labels: BTreeMap<String, String>,
    pub annotations: BTreeMap<String, String>,
}

impl ClusterInfo {
    #[must_use]
    pub fn local() -> Self {
        Self {
            name: IN_CLUSTER_NAME.to_string(),
            server: IN_CLUSTER_SERVER.to_string(),
            ..Default::default()
        }
    }
}

/// Where registered clusters are read from
#[async_trait]
pub trait ClusterSource: Send + Sync {
    /// Registered clusters, excluding the implicit local cluster
    async fn list_clusters(&self) -> Result<Vec<ClusterInfo>>;
}

/// Reads cluster registration Secrets from the controller namespace
#[derive(Clone)]
pub struct SecretClusterSource {
    secrets: Api<Secret>,
}

impl SecretClusterSource {
    #[must_use]
    pub fn new(client: Client, namespace: &str) -> Self {
        Self {
            secrets: Api::namespaced(client, namespace),
        }
    }
}

fn secret_string(secret: &Secret, key: &str) -> Option<String> {
    secret
        .data
        .as_ref()?
        .get(key)
        .map(|bytes| String::from_utf8_lossy(&bytes.0).trim().to_string())
        .filter(|value| !value.is_empty())
}

fn cluster_from_secret(secret: &Secret) -> Option<ClusterInfo> {
    let secret_name = secret.metadata.name.as_deref().unwrap_or("<unnamed>");
    let Some(server) = secret_string(secret, "server") else {
        warn!(secret = secret_name, "Cluster secret has no server, skipping");
        return None;
    };

    Some(ClusterInfo {
        name: secret_string(secret, "name").unwrap_or_else(|| server.clone()),
        server,
        labels: secret.metadata.labels.clone().unwrap_or_default(),
        annotations: secret.metadata.annotations.clone().unwrap_or_default(),
    })
}

#[async_trait]
impl ClusterSource for SecretClusterSource {
    async fn list_clusters(&self) -> Result<Vec<ClusterInfo>> {
        let params =
            ListParams::default().labels(&format!("{CLUSTER_SECRET_TYPE_LABEL}={CLUSTER_SECRET_TYPE}"));
        let secrets = self
            .secrets
            .list(&params)
            .await
            .context("Failed to list cluster secrets")?;

        Ok(secrets.items.iter().filter_map(cluster_from_secret).collect())
    }
}

/// Fixed cluster list, used offline and in tests
#[derive(Debug, Clone, Default)]
pub struct StaticClusterSource {
    pub clusters: Vec<ClusterInfo>,
}

#[async_trait]
impl ClusterSource for StaticClusterSource {
    async fn list_clusters(&self) -> Result<Vec<ClusterInfo>> {
        Ok(self.clusters.clone())
    }
}

fn cluster_params(cluster: &ClusterInfo, values: &BTreeMap<String, String>) -> Params {
    let mut params = Params::new();
    params.insert("name".to_string(), cluster.name.clone());
    params.insert("nameNormalized".to_string(), normalize_name(&cluster.name));
    params.insert("server".to_string(), cluster.server.clone());
    for (key, value) in &cluster.labels {
        params.insert(format!("metadata.labels.{key}"), value.clone());
    }
    for (key, value) in &cluster.annotations {
        params.insert(format!("metadata.annotations.{key}"), value.clone());
    }

    let rendered: Vec<(String, String)> = values
        .iter()
        .map(|(key, value)| (format!("values.{key}"), render_string(value, &params)))
        .collect();
    params.extend(rendered);
    params
}

pub(super) async fn generate(
    spec: &ClusterGenerator,
    source: &dyn ClusterSource,
) -> Result<Vec<ParamSet>, GeneratorError> {
    let registered = source
        .list_clusters()
        .await
        .map_err(GeneratorError::from_source("clusters"))?;

    let mut clusters = Vec::with_capacity(registered.len() + 1);
    if !registered.iter().any(|c| c.server == IN_CLUSTER_SERVER) {
        clusters.push(ClusterInfo::local());
    }
    clusters.extend(registered);

    Ok(clusters
        .iter()
        .filter(|cluster| spec.selector.matches(&cluster.labels))
        .map(|cluster| ParamSet {
            key: format!("cluster:{}", cluster.server),
            params: cluster_params(cluster, &spec.values),
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::LabelSelector;
    use k8s_openapi::ByteString;

    fn labels(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    fn remote(name: &str, env: &str) -> ClusterInfo {
        ClusterInfo {
            name: name.to_string(),
            server: format!("https://{name}.example.com"),
            labels: labels(&[("argocd.argoproj.io/secret-type", "cluster"), ("env", env)]),
            annotations: labels(&[("team", "platform")]),
        }
    }

    #[tokio::test]
    async fn test_empty_selector_includes_local_cluster() {
        let source = StaticClusterSource {
            clusters: vec![remote("cluster1", "dev")],
        };

        let sets = generate(&ClusterGenerator::default(), &source).await.unwrap();
        let names: Vec<&str> = sets.iter().map(|s| s.params["name"].as_str()).collect();
        assert_eq!(names, vec!["in-cluster", "cluster1"]);
        assert_eq!(sets[0].params["server"], "https://kubernetes.default.svc");
    }

    #[tokio::test]
    async fn test_selector_excludes_unlabelled_local_cluster() {
        let source = StaticClusterSource {
            clusters: vec![remote("dev-eu", "dev"), remote("prod-eu", "prod")],
        };
        let spec = ClusterGenerator {
            selector: LabelSelector {
                match_labels: labels(&[("env", "prod")]),
                ..Default::default()
            },
            values: BTreeMap::new(),
        };

        let sets = generate(&spec, &source).await.unwrap();
        assert_eq!(sets.len(), 1);
        assert_eq!(sets[0].params["name"], "prod-eu");
        assert_eq!(sets[0].params["metadata.labels.env"], "prod");
        assert_eq!(sets[0].params["metadata.annotations.team"], "platform");
    }

    #[tokio::test]
    async fn test_registered_local_server_replaces_implicit_entry() {
        let source = StaticClusterSource {
            clusters: vec![ClusterInfo {
                name: "local".to_string(),
                server: IN_CLUSTER_SERVER.to_string(),
                ..Default::default()
            }],
        };

        let sets = generate(&ClusterGenerator::default(), &source).await.unwrap();
        assert_eq!(sets.len(), 1);
        assert_eq!(sets[0].params["name"], "local");
    }

    #[tokio::test]
    async fn test_values_are_rendered_with_cluster_params() {
        let source = StaticClusterSource {
            clusters: vec![remote("Prod_EU", "prod")],
        };
        let spec = ClusterGenerator {
            selector: LabelSelector {
                match_labels: labels(&[("env", "prod")]),
                ..Default::default()
            },
            values: labels(&[("revision", "{{metadata.labels.env}}-stable")]),
        };

        let sets = generate(&spec, &source).await.unwrap();
        assert_eq!(sets[0].params["values.revision"], "prod-stable");
        assert_eq!(sets[0].params["nameNormalized"], "prod-eu");
    }

    #[test]
    fn test_cluster_from_secret() {
        let mut secret = Secret::default();
        secret.metadata.name = Some("cluster-dev".to_string());
        secret.metadata.labels = Some(labels(&[("env", "dev")]));
        secret.data = Some(
            [
                ("name".to_string(), ByteString(b"dev".to_vec())),
                (
                    "server".to_string(),
                    ByteString(b"https://dev.example.com\n".to_vec()),
                ),
            ]
            .into(),
        );

        let cluster = cluster_from_secret(&secret).unwrap();
        assert_eq!(cluster.name, "dev");
        assert_eq!(cluster.server, "https://dev.example.com");
        assert_eq!(cluster.labels["env"], "dev");

        secret.data = Some(BTreeMap::new());
        assert!(cluster_from_secret(&secret).is_none());
    }

    #[tokio::test]
    async fn test_source_error_is_transient() {
        struct Failing;

        #[async_trait]
        impl ClusterSource for Failing {
            async fn list_clusters(&self) -> Result<Vec<ClusterInfo>> {
                anyhow::bail!("connection refused")
            }
        }

        let err = generate(&ClusterGenerator::default(), &Failing)
            .await
            .unwrap_err();
        assert!(!err.is_configuration());
    }
}
