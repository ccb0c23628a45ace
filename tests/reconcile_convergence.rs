//! # Reconcile Convergence Tests
//!
//! Full passes (generate, render, diff, apply) against the in-memory Application store:
//! - A second pass over unchanged inputs writes nothing
//! - Adding or removing one parameter set creates or deletes exactly one Application
//! - Cluster registrations appearing or disappearing do the same
//! - Finalizer-guarded deletion completes over two passes
//! - A failed write is isolated and retried on the next pass

use applicationset_controller::constants::{APPLICATION_SET_NAME_LABEL, RESOURCES_FINALIZER};
use applicationset_controller::controller::reconciler::{
    run_pass, InMemoryApplicationStore, StoreOperation,
};
use applicationset_controller::crd::{
    ApplicationSet, ApplicationSetGenerator, ApplicationSetSpec, ApplicationSetSyncPolicy,
    ApplicationSetTemplate, ApplicationSetTemplateMeta, ApplicationSpec,
};
use applicationset_controller::generators::{
    ClusterInfo, GeneratorServices, StaticClusterSource, StaticRepoTree,
};
use applicationset_controller::scm_provider::mock::MockProviderFactory;
use std::sync::Arc;

fn services() -> GeneratorServices {
    GeneratorServices {
        clusters: Arc::new(StaticClusterSource::default()),
        repo_trees: Arc::new(StaticRepoTree::default()),
        scm_providers: Arc::new(MockProviderFactory::default()),
    }
}

fn services_with_clusters(clusters: &[&str]) -> GeneratorServices {
    let clusters = clusters
        .iter()
        .map(|name| ClusterInfo {
            name: (*name).to_string(),
            server: format!("https://{name}.example.com"),
            ..Default::default()
        })
        .collect();
    GeneratorServices {
        clusters: Arc::new(StaticClusterSource { clusters }),
        ..services()
    }
}

fn appset(envs: &[&str], finalizers: &[&str]) -> ApplicationSet {
    let elements: Vec<serde_json::Value> = envs
        .iter()
        .map(|env| serde_json::json!({ "env": env }))
        .collect();
    let generator: ApplicationSetGenerator =
        serde_json::from_value(serde_json::json!({ "list": { "elements": elements } })).unwrap();
    let template_spec: ApplicationSpec = serde_json::from_value(serde_json::json!({
        "project": "default",
        "source": {
            "repoURL": "https://github.com/argoproj/argocd-example-apps.git",
            "path": "guestbook",
            "targetRevision": "HEAD"
        },
        "destination": { "server": "https://kubernetes.default.svc", "namespace": "{{env}}" },
        "syncPolicy": { "automated": { "prune": true } }
    }))
    .unwrap();

    let mut appset = ApplicationSet::new(
        "guestbook",
        ApplicationSetSpec {
            generators: vec![generator],
            template: ApplicationSetTemplate {
                metadata: ApplicationSetTemplateMeta {
                    name: "guestbook-{{env}}".to_string(),
                    finalizers: finalizers.iter().map(ToString::to_string).collect(),
                    ..Default::default()
                },
                spec: template_spec,
            },
            sync_policy: None,
            requeue_after_seconds: None,
        },
    );
    appset.metadata.namespace = Some("argocd".to_string());
    appset.metadata.uid = Some("6f1c9d1e-3a2b-4c5d-8e9f-0a1b2c3d4e5f".to_string());
    appset
}

/// One Application per registered cluster, local cluster included
fn cluster_appset() -> ApplicationSet {
    let mut appset = appset(&[], &[]);
    appset.spec.generators =
        vec![serde_json::from_value(serde_json::json!({ "clusters": {} })).unwrap()];
    appset.spec.template.metadata.name = "guestbook-{{name}}".to_string();
    appset.spec.template.spec.destination.namespace = "guestbook".to_string();
    appset
}

fn creates(ops: &[StoreOperation]) -> usize {
    ops.iter().filter(|op| matches!(op, StoreOperation::Create(_))).count()
}

fn deletes(ops: &[StoreOperation]) -> usize {
    ops.iter().filter(|op| matches!(op, StoreOperation::Delete(_))).count()
}

#[tokio::test]
async fn test_second_pass_is_a_no_op() {
    let store = InMemoryApplicationStore::new();
    let appset = appset(&["dev", "staging", "prod"], &[RESOURCES_FINALIZER]);

    let first = run_pass(&appset, &services(), &store).await.unwrap();
    assert_eq!(first.desired, 3);
    assert_eq!(first.outcome.created, 3);
    assert_eq!(creates(&store.take_operations()), 3);

    let second = run_pass(&appset, &services(), &store).await.unwrap();
    assert_eq!(second.outcome.writes(), 0);
    assert!(store.take_operations().is_empty());
}

#[tokio::test]
async fn test_created_applications_are_owned_and_rendered() {
    let store = InMemoryApplicationStore::new();
    let appset = appset(&["dev"], &[]);
    run_pass(&appset, &services(), &store).await.unwrap();

    let app = store.get("guestbook-dev").unwrap();
    assert_eq!(app.metadata.namespace.as_deref(), Some("argocd"));
    assert_eq!(
        app.metadata
            .labels
            .as_ref()
            .and_then(|labels| labels.get(APPLICATION_SET_NAME_LABEL))
            .map(String::as_str),
        Some("guestbook")
    );
    let owner = &app.metadata.owner_references.as_ref().unwrap()[0];
    assert_eq!(owner.kind, "ApplicationSet");
    assert_eq!(owner.controller, Some(true));
    assert_eq!(app.spec.destination.namespace, "dev");
    // Fields the controller does not model pass through untouched
    assert!(app.spec.extra.contains_key("syncPolicy"));
}

#[tokio::test]
async fn test_adding_one_parameter_set_creates_exactly_one() {
    let store = InMemoryApplicationStore::new();
    run_pass(&appset(&["dev", "prod"], &[]), &services(), &store)
        .await
        .unwrap();
    store.take_operations();

    run_pass(&appset(&["dev", "prod", "qa"], &[]), &services(), &store)
        .await
        .unwrap();
    let ops = store.take_operations();
    assert_eq!(ops, vec![StoreOperation::Create("guestbook-qa".to_string())]);
    assert_eq!(deletes(&ops), 0);
}

#[tokio::test]
async fn test_removing_one_parameter_set_deletes_exactly_one() {
    let store = InMemoryApplicationStore::new();
    run_pass(&appset(&["dev", "prod", "qa"], &[]), &services(), &store)
        .await
        .unwrap();
    store.take_operations();

    run_pass(&appset(&["dev", "prod"], &[]), &services(), &store)
        .await
        .unwrap();
    let ops = store.take_operations();
    assert_eq!(ops, vec![StoreOperation::Delete("guestbook-qa".to_string())]);
    assert_eq!(creates(&ops), 0);
    assert_eq!(store.names(), vec!["guestbook-dev", "guestbook-prod"]);
}

#[tokio::test]
async fn test_finalized_deletion_completes_over_two_passes() {
    let store = InMemoryApplicationStore::new();
    run_pass(&appset(&["dev", "qa"], &[RESOURCES_FINALIZER]), &services(), &store)
        .await
        .unwrap();
    store.take_operations();

    let shrunk = appset(&["dev"], &[RESOURCES_FINALIZER]);
    let report = run_pass(&shrunk, &services(), &store).await.unwrap();
    assert_eq!(report.outcome.deleted, 1);
    // The finalizer holds the object until its owner releases it
    let pending = store.get("guestbook-qa").unwrap();
    assert!(pending.metadata.deletion_timestamp.is_some());

    // While deletion is pending the pass waits instead of deleting again
    store.take_operations();
    run_pass(&shrunk, &services(), &store).await.unwrap();
    assert!(store.take_operations().is_empty());

    assert!(store.complete_finalization("guestbook-qa"));
    run_pass(&shrunk, &services(), &store).await.unwrap();
    assert!(store.take_operations().is_empty());
    assert_eq!(store.names(), vec!["guestbook-dev"]);
}

#[tokio::test]
async fn test_preserve_resources_strips_finalizer_before_delete() {
    let store = InMemoryApplicationStore::new();
    run_pass(&appset(&["dev", "qa"], &[RESOURCES_FINALIZER]), &services(), &store)
        .await
        .unwrap();
    store.take_operations();

    let mut shrunk = appset(&["dev"], &[RESOURCES_FINALIZER]);
    shrunk.spec.sync_policy = Some(ApplicationSetSyncPolicy {
        preserve_resources_on_deletion: true,
        ..Default::default()
    });
    run_pass(&shrunk, &services(), &store).await.unwrap();

    assert_eq!(
        store.take_operations(),
        vec![
            StoreOperation::Patch("guestbook-qa".to_string()),
            StoreOperation::Delete("guestbook-qa".to_string()),
        ]
    );
    assert!(store.get("guestbook-qa").is_none());
}

#[tokio::test]
async fn test_failed_write_is_isolated_and_retried() {
    let store = InMemoryApplicationStore::new();
    store.fail_writes_to("guestbook-staging");
    let appset = appset(&["dev", "staging", "prod"], &[]);

    let report = run_pass(&appset, &services(), &store).await.unwrap();
    assert_eq!(report.outcome.created, 2);
    assert_eq!(report.outcome.failed, 1);
    assert_eq!(store.names(), vec!["guestbook-dev", "guestbook-prod"]);

    store.recover("guestbook-staging");
    store.take_operations();
    let report = run_pass(&appset, &services(), &store).await.unwrap();
    assert_eq!(report.outcome.failed, 0);
    assert_eq!(
        store.take_operations(),
        vec![StoreOperation::Create("guestbook-staging".to_string())]
    );
}

#[tokio::test]
async fn test_hand_edit_is_reverted_by_one_update() {
    let store = InMemoryApplicationStore::new();
    let appset = appset(&["dev"], &[]);
    run_pass(&appset, &services(), &store).await.unwrap();

    let mut edited = store.get("guestbook-dev").unwrap();
    edited.spec.destination.namespace = "somewhere-else".to_string();
    store.insert(edited);
    store.take_operations();

    let report = run_pass(&appset, &services(), &store).await.unwrap();
    assert_eq!(report.outcome.updated, 1);
    assert_eq!(store.get("guestbook-dev").unwrap().spec.destination.namespace, "dev");
}

#[tokio::test]
async fn test_name_collision_fails_before_any_write() {
    let store = InMemoryApplicationStore::new();
    let mut appset = appset(&["dev", "prod"], &[]);
    appset.spec.template.metadata.name = "guestbook".to_string();

    let error = run_pass(&appset, &services(), &store).await.unwrap_err();
    assert!(error.is_configuration());
    assert!(store.take_operations().is_empty());
}

#[tokio::test]
async fn test_cluster_registration_changes_converge() {
    let store = InMemoryApplicationStore::new();
    let appset = cluster_appset();

    let report = run_pass(&appset, &services_with_clusters(&["staging-eu"]), &store)
        .await
        .unwrap();
    assert_eq!(report.desired, 2);
    assert_eq!(creates(&store.take_operations()), 2);

    run_pass(&appset, &services_with_clusters(&["staging-eu", "prod-eu"]), &store)
        .await
        .unwrap();
    assert_eq!(
        store.take_operations(),
        vec![StoreOperation::Create("guestbook-prod-eu".to_string())]
    );

    run_pass(&appset, &services_with_clusters(&["prod-eu"]), &store)
        .await
        .unwrap();
    assert_eq!(
        store.take_operations(),
        vec![StoreOperation::Delete("guestbook-staging-eu".to_string())]
    );
    assert!(store.get("guestbook-staging-eu").is_none());
    assert!(store.get("guestbook-in-cluster").is_some());
}
