//! # Application Store
//!
//! The target-system client the reconciler writes through. The Kubernetes implementation
//! reads the API server directly on every pass (no informer cache) so each diff runs
//! against an authoritative snapshot.
//!
//! `InMemoryApplicationStore` models the parts of API server behaviour the reconciler
//! relies on: merge patches, and two-phase deletion when finalizers are present.

use crate::constants::{APPLICATION_SET_NAME_LABEL, FIELD_MANAGER};
use crate::controller::reconciler::desired::owner_label_value;
use crate::controller::reconciler::diff::apply_merge_patch;
use crate::crd::Application;
use anyhow::{Context, Result};
use async_trait::async_trait;
use kube::api::{Api, DeleteParams, ListParams, Patch, PatchParams, PostParams};
use kube::{Client, ResourceExt};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, PoisonError};
use tracing::debug;

/// Create, patch, delete and list Applications in one namespace
#[async_trait]
pub trait ApplicationStore: Send + Sync {
    /// Applications carrying the owner label for `owner_name` whose owner reference
    /// carries `owner_uid`
    async fn list_owned(&self, owner_name: &str, owner_uid: &str) -> Result<Vec<Application>>;

    async fn create(&self, app: &Application) -> Result<()>;

    /// Apply a JSON merge patch; fields absent from the patch are left alone
    async fn patch(&self, name: &str, patch: &Value) -> Result<()>;

    /// Request deletion. With finalizers present the object lingers until they are removed.
    async fn delete(&self, name: &str) -> Result<()>;
}

fn is_owned_by(app: &Application, owner_uid: &str) -> bool {
    app.owner_references()
        .iter()
        .any(|reference| reference.uid == owner_uid)
}

/// Applications in the API server
#[derive(Clone)]
pub struct KubeApplicationStore {
    api: Api<Application>,
}

impl std::fmt::Debug for KubeApplicationStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeApplicationStore").finish_non_exhaustive()
    }
}

impl KubeApplicationStore {
    #[must_use]
    pub fn new(client: Client, namespace: &str) -> Self {
        Self {
            api: Api::namespaced(client, namespace),
        }
    }
}

#[async_trait]
impl ApplicationStore for KubeApplicationStore {
    async fn list_owned(&self, owner_name: &str, owner_uid: &str) -> Result<Vec<Application>> {
        let params = ListParams::default().labels(&format!(
            "{APPLICATION_SET_NAME_LABEL}={}",
            owner_label_value(owner_name)
        ));
        let apps = self
            .api
            .list(&params)
            .await
            .with_context(|| format!("Failed to list Applications owned by {owner_name}"))?;

        Ok(apps
            .items
            .into_iter()
            .filter(|app| is_owned_by(app, owner_uid))
            .collect())
    }

    async fn create(&self, app: &Application) -> Result<()> {
        let params = PostParams {
            field_manager: Some(FIELD_MANAGER.to_string()),
            ..Default::default()
        };
        self.api
            .create(&params, app)
            .await
            .with_context(|| format!("Failed to create Application {}", app.name_any()))?;
        Ok(())
    }

    async fn patch(&self, name: &str, patch: &Value) -> Result<()> {
        let params = PatchParams {
            field_manager: Some(FIELD_MANAGER.to_string()),
            ..Default::default()
        };
        self.api
            .patch(name, &params, &Patch::Merge(patch))
            .await
            .with_context(|| format!("Failed to patch Application {name}"))?;
        Ok(())
    }

    async fn delete(&self, name: &str) -> Result<()> {
        match self.api.delete(name, &DeleteParams::default()).await {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(e)) if e.code == 404 => {
                debug!("Application {} already gone", name);
                Ok(())
            }
            Err(e) => Err(e).with_context(|| format!("Failed to delete Application {name}")),
        }
    }
}

/// One write issued against an `InMemoryApplicationStore`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreOperation {
    Create(String),
    Patch(String),
    Delete(String),
}

/// In-process store used by tests and offline tooling
#[derive(Debug, Default)]
pub struct InMemoryApplicationStore {
    apps: Mutex<BTreeMap<String, Application>>,
    operations: Mutex<Vec<StoreOperation>>,
    failing: Mutex<BTreeSet<String>>,
}

impl InMemoryApplicationStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an object without recording an operation
    pub fn insert(&self, app: Application) {
        self.apps
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(app.name_any(), app);
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<Application> {
        self.apps
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.apps
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }

    /// Writes recorded since the last `take_operations`
    pub fn take_operations(&self) -> Vec<StoreOperation> {
        std::mem::take(&mut *self.operations.lock().unwrap_or_else(PoisonError::into_inner))
    }

    /// Make every write to `name` fail until `recover` is called
    pub fn fail_writes_to(&self, name: &str) {
        self.failing
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.to_string());
    }

    pub fn recover(&self, name: &str) {
        self.failing
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name);
    }

    /// Act as the finalizer owner: drop all finalizers of a deleting object so it disappears
    pub fn complete_finalization(&self, name: &str) -> bool {
        let mut apps = self.apps.lock().unwrap_or_else(PoisonError::into_inner);
        let deleting = apps
            .get(name)
            .is_some_and(|app| app.metadata.deletion_timestamp.is_some());
        if deleting {
            apps.remove(name);
        }
        deleting
    }

    fn record(&self, operation: StoreOperation) -> Result<()> {
        let name = match &operation {
            StoreOperation::Create(name)
            | StoreOperation::Patch(name)
            | StoreOperation::Delete(name) => name.clone(),
        };
        if self
            .failing
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&name)
        {
            anyhow::bail!("injected failure writing Application {name}");
        }
        self.operations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(operation);
        Ok(())
    }
}

fn patched(app: &Application, patch: &Value) -> Result<Application> {
    let mut raw = serde_json::to_value(app).context("Failed to serialize Application")?;
    apply_merge_patch(&mut raw, patch);
    serde_json::from_value(raw).context("Patched Application is no longer valid")
}

fn has_finalizers(app: &Application) -> bool {
    app.metadata
        .finalizers
        .as_ref()
        .is_some_and(|finalizers| !finalizers.is_empty())
}

#[async_trait]
impl ApplicationStore for InMemoryApplicationStore {
    async fn list_owned(&self, owner_name: &str, owner_uid: &str) -> Result<Vec<Application>> {
        let label = owner_label_value(owner_name);
        let apps = self.apps.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(apps
            .values()
            .filter(|app| app.labels().get(APPLICATION_SET_NAME_LABEL) == Some(&label))
            .filter(|app| is_owned_by(app, owner_uid))
            .cloned()
            .collect())
    }

    async fn create(&self, app: &Application) -> Result<()> {
        let name = app.name_any();
        self.record(StoreOperation::Create(name.clone()))?;
        let mut apps = self.apps.lock().unwrap_or_else(PoisonError::into_inner);
        if apps.contains_key(&name) {
            anyhow::bail!("Application {name} already exists");
        }
        apps.insert(name, app.clone());
        Ok(())
    }

    async fn patch(&self, name: &str, patch: &Value) -> Result<()> {
        self.record(StoreOperation::Patch(name.to_string()))?;
        let mut apps = self.apps.lock().unwrap_or_else(PoisonError::into_inner);
        let current = apps
            .get(name)
            .with_context(|| format!("Application {name} not found"))?;
        let updated = patched(current, patch)?;

        // Removing the last finalizer of a deleting object completes its deletion
        if updated.metadata.deletion_timestamp.is_some() && !has_finalizers(&updated) {
            apps.remove(name);
        } else {
            apps.insert(name.to_string(), updated);
        }
        Ok(())
    }

    async fn delete(&self, name: &str) -> Result<()> {
        self.record(StoreOperation::Delete(name.to_string()))?;
        let mut apps = self.apps.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(current) = apps.get(name) else {
            return Ok(());
        };

        if has_finalizers(current) {
            if current.metadata.deletion_timestamp.is_none() {
                let now = chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true);
                let marked = patched(
                    current,
                    &serde_json::json!({"metadata": {"deletionTimestamp": now}}),
                )?;
                apps.insert(name.to_string(), marked);
            }
        } else {
            apps.remove(name);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::RESOURCES_FINALIZER;
    use crate::crd::ApplicationSpec;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;

    fn owned_app(name: &str, owner: &str, uid: &str, finalizers: &[&str]) -> Application {
        let mut app = Application::new(name, ApplicationSpec::default());
        app.metadata.labels = Some(
            [(APPLICATION_SET_NAME_LABEL.to_string(), owner.to_string())].into(),
        );
        app.metadata.owner_references = Some(vec![OwnerReference {
            api_version: "argoproj.io/v1alpha1".to_string(),
            kind: "ApplicationSet".to_string(),
            name: owner.to_string(),
            uid: uid.to_string(),
            controller: Some(true),
            block_owner_deletion: Some(true),
        }]);
        if !finalizers.is_empty() {
            app.metadata.finalizers = Some(finalizers.iter().map(ToString::to_string).collect());
        }
        app
    }

    #[tokio::test]
    async fn test_list_owned_requires_label_and_uid() {
        let store = InMemoryApplicationStore::new();
        store.insert(owned_app("a", "guestbook", "uid-1", &[]));
        // Same name, recreated ApplicationSet: stale uid
        store.insert(owned_app("b", "guestbook", "uid-0", &[]));
        store.insert(owned_app("c", "other", "uid-1", &[]));

        let owned = store.list_owned("guestbook", "uid-1").await.unwrap();
        let names: Vec<String> = owned.iter().map(ResourceExt::name_any).collect();
        assert_eq!(names, vec!["a"]);
    }

    #[tokio::test]
    async fn test_list_owned_with_long_owner_name() {
        let owner = format!("team-{}", "x".repeat(70));
        let store = InMemoryApplicationStore::new();
        let mut app = owned_app("a", &owner, "uid-1", &[]);
        app.labels_mut()
            .insert(APPLICATION_SET_NAME_LABEL.to_string(), owner_label_value(&owner));
        store.insert(app);

        let owned = store.list_owned(&owner, "uid-1").await.unwrap();
        assert_eq!(owned.len(), 1);
    }

    #[tokio::test]
    async fn test_delete_with_finalizer_is_two_phase() {
        let store = InMemoryApplicationStore::new();
        store.insert(owned_app("a", "guestbook", "uid-1", &[RESOURCES_FINALIZER]));

        store.delete("a").await.unwrap();
        let lingering = store.get("a").unwrap();
        assert!(lingering.metadata.deletion_timestamp.is_some());

        // A second delete request does not restart deletion
        store.delete("a").await.unwrap();
        assert!(store.get("a").is_some());

        assert!(store.complete_finalization("a"));
        assert!(store.get("a").is_none());
        assert_eq!(
            store.take_operations(),
            vec![
                StoreOperation::Delete("a".into()),
                StoreOperation::Delete("a".into())
            ]
        );
    }

    #[tokio::test]
    async fn test_removing_last_finalizer_of_deleting_object_removes_it() {
        let store = InMemoryApplicationStore::new();
        store.insert(owned_app("a", "guestbook", "uid-1", &[RESOURCES_FINALIZER]));
        store.delete("a").await.unwrap();

        store
            .patch("a", &serde_json::json!({"metadata": {"finalizers": null}}))
            .await
            .unwrap();
        assert!(store.get("a").is_none());
    }

    #[tokio::test]
    async fn test_injected_failure_records_nothing() {
        let store = InMemoryApplicationStore::new();
        store.fail_writes_to("a");
        let err = store
            .create(&owned_app("a", "guestbook", "uid-1", &[]))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("injected failure"));
        assert!(store.take_operations().is_empty());
        assert!(store.get("a").is_none());

        store.recover("a");
        store
            .create(&owned_app("a", "guestbook", "uid-1", &[]))
            .await
            .unwrap();
        assert_eq!(store.names(), vec!["a"]);
    }
}
