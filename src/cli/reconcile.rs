//! # Reconcile Command
//!
//! Sets the refresh annotation; the controller runs a pass and removes it.

use anyhow::{Context, Result};
use applicationset_controller::constants::REFRESH_ANNOTATION;
use applicationset_controller::crd::ApplicationSet;
use kube::api::{Api, Patch, PatchParams};
use kube::Client;
use serde_json::json;

pub async fn reconcile_command(client: Client, name: &str, namespace: Option<String>) -> Result<()> {
    let ns = namespace.unwrap_or_else(|| client.default_namespace().to_string());
    let api: Api<ApplicationSet> = Api::namespaced(client, &ns);

    api.get(name)
        .await
        .with_context(|| format!("Failed to get ApplicationSet '{ns}/{name}'"))?;

    let patch = json!({
        "metadata": {
            "annotations": { REFRESH_ANNOTATION: "true" }
        }
    });
    api.patch(name, &PatchParams::default(), &Patch::Merge(&patch))
        .await
        .with_context(|| format!("Failed to trigger reconciliation for ApplicationSet '{ns}/{name}'"))?;

    println!("Reconciliation triggered for ApplicationSet '{ns}/{name}'");
    println!("The controller clears {REFRESH_ANNOTATION} once the pass completes.");
    Ok(())
}
