//! # ApplicationSet Spec
//!
//! Main CRD specification types and default values.

use crate::crd::{ApplicationSetGenerator, ApplicationSpec};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// ApplicationSet Custom Resource Definition
///
/// Renders `template` once per parameter set produced by `generators` and keeps the
/// resulting Applications in sync with that set.
///
/// # Example
///
/// ```yaml
/// apiVersion: argoproj.io/v1alpha1
/// kind: ApplicationSet
/// metadata:
///   name: guestbook
///   namespace: argocd
/// spec:
///   generators:
///     - clusters:
///         selector:
///           matchLabels:
///             argocd.argoproj.io/secret-type: cluster
///   template:
///     metadata:
///       name: '{{name}}-guestbook'
///     spec:
///       project: default
///       source:
///         repoURL: https://github.com/argoproj/argocd-example-apps.git
///         targetRevision: HEAD
///         path: guestbook
///       destination:
///         name: '{{name}}'
///         namespace: guestbook
/// ```
#[derive(kube::CustomResource, Debug, Clone, Deserialize, Serialize, schemars::JsonSchema)]
#[kube(
    kind = "ApplicationSet",
    group = "argoproj.io",
    version = "v1alpha1",
    namespaced,
    status = "crate::crd::ApplicationSetStatus",
    shortname = "appset",
    printcolumn = r#"{"name":"Phase", "type":"string", "jsonPath":".status.phase"}, {"name":"Applications", "type":"integer", "jsonPath":".status.applicationCount"}, {"name":"Ready", "type":"string", "jsonPath":".status.conditions[?(@.type==\"ResourcesUpToDate\")].status"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationSetSpec {
    /// Parameter sources. Their outputs are concatenated in order.
    pub generators: Vec<ApplicationSetGenerator>,
    /// Application template; `{{param}}` tokens are substituted per parameter set
    pub template: ApplicationSetTemplate,
    /// Controls which changes the controller is allowed to make to owned Applications
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sync_policy: Option<ApplicationSetSyncPolicy>,
    /// Poll interval for generators backed by external sources
    /// Defaults to the controller-wide DEFAULT_REQUEUE_AFTER_SECS
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requeue_after_seconds: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationSetTemplate {
    #[serde(default)]
    pub metadata: ApplicationSetTemplateMeta,
    #[schemars(schema_with = "crate::crd::schema::preserve_unknown_object")]
    pub spec: ApplicationSpec,
}

/// Template metadata. Applications are always created in the ApplicationSet's namespace.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationSetTemplateMeta {
    pub name: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
    /// e.g. `resources-finalizer.argocd.argoproj.io` for cascading deletion
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub finalizers: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationSetSyncPolicy {
    /// Strip the cascade finalizer before deleting an Application so its deployed
    /// resources are left in place
    #[serde(default)]
    pub preserve_resources_on_deletion: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub applications_sync: Option<ApplicationsSyncPolicy>,
}

/// Which write operations are allowed on owned Applications
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize, schemars::JsonSchema,
)]
#[serde(rename_all = "kebab-case")]
pub enum ApplicationsSyncPolicy {
    CreateOnly,
    CreateUpdate,
    CreateDelete,
    #[default]
    Sync,
}

impl ApplicationsSyncPolicy {
    #[must_use]
    pub fn allows_update(self) -> bool {
        matches!(self, Self::CreateUpdate | Self::Sync)
    }

    #[must_use]
    pub fn allows_delete(self) -> bool {
        matches!(self, Self::CreateDelete | Self::Sync)
    }
}

impl ApplicationSetSpec {
    #[must_use]
    pub fn applications_sync(&self) -> ApplicationsSyncPolicy {
        self.sync_policy
            .as_ref()
            .and_then(|policy| policy.applications_sync)
            .unwrap_or_default()
    }

    #[must_use]
    pub fn preserve_resources_on_deletion(&self) -> bool {
        self.sync_policy
            .as_ref()
            .is_some_and(|policy| policy.preserve_resources_on_deletion)
    }
}

/// Default revision for the git generator
pub fn default_git_revision() -> String {
    "HEAD".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sync_policy_defaults_to_full_sync() {
        let spec: ApplicationSetSpec = serde_yaml::from_str(
            r"
generators: []
template:
  metadata:
    name: '{{name}}-guestbook'
  spec:
    project: default
",
        )
        .unwrap();

        assert_eq!(spec.applications_sync(), ApplicationsSyncPolicy::Sync);
        assert!(!spec.preserve_resources_on_deletion());
        assert_eq!(spec.template.metadata.name, "{{name}}-guestbook");
    }

    #[test]
    fn test_sync_policy_kebab_case() {
        let policy: ApplicationSetSyncPolicy = serde_yaml::from_str(
            r"
preserveResourcesOnDeletion: true
applicationsSync: create-only
",
        )
        .unwrap();

        assert!(policy.preserve_resources_on_deletion);
        let sync = policy.applications_sync.unwrap();
        assert!(!sync.allows_update());
        assert!(!sync.allows_delete());
        assert!(ApplicationsSyncPolicy::CreateUpdate.allows_update());
        assert!(ApplicationsSyncPolicy::CreateDelete.allows_delete());
    }
}
