//! # Application
//!
//! The deployable-application resource the controller creates, updates and deletes.
//!
//! Only the fields the controller substitutes into are typed. Everything else in the
//! spec is carried through untouched in `extra`, so templates can use any field the
//! Application CRD supports without this crate knowing about it.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Application Custom Resource
///
/// The schema is owned by the Application CRD installation, so no schema is derived here.
#[derive(kube::CustomResource, Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[kube(
    kind = "Application",
    group = "argoproj.io",
    version = "v1alpha1",
    namespaced,
    schema = "disabled",
    derive = "PartialEq",
    derive = "Default"
)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationSpec {
    /// Project the Application belongs to
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub project: String,
    /// Where the manifests come from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<ApplicationSource>,
    /// Where the manifests are deployed
    #[serde(default)]
    pub destination: ApplicationDestination,
    /// Remaining spec fields, preserved verbatim
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationSource {
    #[serde(rename = "repoURL")]
    pub repo_url: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub target_revision: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub path: String,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// Target cluster and namespace. Either `server` or `name` identifies the cluster.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationDestination {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub server: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub namespace: String,
}
