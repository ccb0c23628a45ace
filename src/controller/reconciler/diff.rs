//! # Diff and Plan
//!
//! Pure planning: compares the desired Applications with the live owned ones and decides
//! one action per name. No I/O happens here.
//!
//! Template-controlled fields are `spec` (owned entirely), the label and annotation keys
//! the template defines, and the finalizers it lists (presence only). Everything else on
//! a live object (status, foreign labels and annotations, extra finalizers) is left alone.
//!
//! Per-resource lifecycle:
//!
//! ```text
//! absent ──Create──▶ present ──Update──▶ converged
//! present ──Delete──▶ deleting (finalizers pending) ──▶ absent
//! ```
//!
//! An object already being deleted is never written to; it is re-observed on a later pass
//! and recreated once it is gone if it is still desired.

use crate::constants::RESOURCES_FINALIZER;
use crate::crd::{Application, ApplicationSetSpec, ApplicationsSyncPolicy};
use kube::ResourceExt;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashSet};

/// What the apply step should do for one Application
#[derive(Debug, Clone, PartialEq)]
pub enum PlannedAction {
    Create(Application),
    /// JSON merge patch over the template-controlled fields
    Update { name: String, patch: Value },
    /// `release_finalizers` is the finalizer list to write before deleting, set when
    /// deployed resources must survive the deletion
    Delete {
        name: String,
        release_finalizers: Option<Vec<String>>,
    },
    /// Deletion is in progress; wait for it to finish
    AwaitDeletion { name: String },
    Unchanged { name: String },
    /// A change was needed but the sync policy forbids it
    Skipped { name: String, reason: &'static str },
}

impl PlannedAction {
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            PlannedAction::Create(app) => app.metadata.name.as_deref().unwrap_or_default(),
            PlannedAction::Update { name, .. }
            | PlannedAction::Delete { name, .. }
            | PlannedAction::AwaitDeletion { name }
            | PlannedAction::Unchanged { name }
            | PlannedAction::Skipped { name, .. } => name,
        }
    }

    /// Whether applying this action issues a write
    #[must_use]
    pub fn is_write(&self) -> bool {
        matches!(
            self,
            PlannedAction::Create(_) | PlannedAction::Update { .. } | PlannedAction::Delete { .. }
        )
    }
}

/// The parts of the ApplicationSet spec that shape the plan
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlanPolicy {
    pub applications_sync: ApplicationsSyncPolicy,
    pub preserve_resources_on_deletion: bool,
}

impl PlanPolicy {
    #[must_use]
    pub fn from_spec(spec: &ApplicationSetSpec) -> Self {
        Self {
            applications_sync: spec.applications_sync(),
            preserve_resources_on_deletion: spec.preserve_resources_on_deletion(),
        }
    }
}

/// Plan one action per Application name
///
/// Desired Applications come first, in desired order, followed by live-only Applications
/// sorted by name.
#[must_use]
pub fn plan(desired: &[Application], live: &[Application], policy: PlanPolicy) -> Vec<PlannedAction> {
    let live_by_name: BTreeMap<String, &Application> =
        live.iter().map(|app| (app.name_any(), app)).collect();
    let mut desired_names = HashSet::with_capacity(desired.len());
    let mut actions = Vec::with_capacity(desired.len() + live.len());

    for app in desired {
        let name = app.name_any();
        desired_names.insert(name.clone());

        let action = match live_by_name.get(&name) {
            None => PlannedAction::Create(app.clone()),
            Some(current) if current.metadata.deletion_timestamp.is_some() => {
                PlannedAction::AwaitDeletion { name }
            }
            Some(current) => match update_patch(app, current) {
                None => PlannedAction::Unchanged { name },
                Some(_) if !policy.applications_sync.allows_update() => PlannedAction::Skipped {
                    name,
                    reason: "applicationsSync policy does not allow updates",
                },
                Some(patch) => PlannedAction::Update { name, patch },
            },
        };
        actions.push(action);
    }

    for (name, current) in &live_by_name {
        if desired_names.contains(name) {
            continue;
        }
        let name = name.clone();
        let action = if current.metadata.deletion_timestamp.is_some() {
            PlannedAction::AwaitDeletion { name }
        } else if !policy.applications_sync.allows_delete() {
            PlannedAction::Skipped {
                name,
                reason: "applicationsSync policy does not allow deletes",
            }
        } else {
            PlannedAction::Delete {
                name,
                release_finalizers: released_finalizers(current, policy),
            }
        };
        actions.push(action);
    }

    actions
}

fn released_finalizers(current: &Application, policy: PlanPolicy) -> Option<Vec<String>> {
    let finalizers = current.finalizers();
    if !policy.preserve_resources_on_deletion
        || !finalizers.iter().any(|f| f == RESOURCES_FINALIZER)
    {
        return None;
    }
    Some(
        finalizers
            .iter()
            .filter(|f| *f != RESOURCES_FINALIZER)
            .cloned()
            .collect(),
    )
}

fn string_map_diff(
    desired: &BTreeMap<String, String>,
    current: &BTreeMap<String, String>,
) -> Option<Value> {
    let patch: Map<String, Value> = desired
        .iter()
        .filter(|(key, value)| current.get(*key) != Some(*value))
        .map(|(key, value)| (key.clone(), Value::String(value.clone())))
        .collect();
    (!patch.is_empty()).then_some(Value::Object(patch))
}

/// Merge patch bringing `current`'s template-controlled fields to `desired`, or `None`
#[must_use]
pub fn update_patch(desired: &Application, current: &Application) -> Option<Value> {
    let mut metadata = Map::new();
    if let Some(labels) = string_map_diff(desired.labels(), current.labels()) {
        metadata.insert("labels".to_string(), labels);
    }
    if let Some(annotations) = string_map_diff(desired.annotations(), current.annotations()) {
        metadata.insert("annotations".to_string(), annotations);
    }

    let current_finalizers = current.finalizers();
    let missing: Vec<&String> = desired
        .finalizers()
        .iter()
        .filter(|f| !current_finalizers.contains(*f))
        .collect();
    if !missing.is_empty() {
        let mut finalizers = current_finalizers.to_vec();
        finalizers.extend(missing.into_iter().cloned());
        metadata.insert("finalizers".to_string(), Value::from(finalizers));
    }

    let mut patch = Map::new();
    if !metadata.is_empty() {
        patch.insert("metadata".to_string(), Value::Object(metadata));
    }
    let current_spec = serde_json::to_value(&current.spec).unwrap_or_default();
    let desired_spec = serde_json::to_value(&desired.spec).unwrap_or_default();
    if let Some(spec) = merge_diff(&current_spec, &desired_spec) {
        patch.insert("spec".to_string(), spec);
    }

    (!patch.is_empty()).then_some(Value::Object(patch))
}

/// Recursive JSON merge patch turning `current` into `desired`
///
/// Object keys missing from `desired` are nulled; arrays and scalars are replaced
/// wholesale. Returns `None` when the two are equal.
#[must_use]
pub fn merge_diff(current: &Value, desired: &Value) -> Option<Value> {
    match (current, desired) {
        (Value::Object(current), Value::Object(desired)) => {
            let mut patch = Map::new();
            for (key, wanted) in desired {
                match current.get(key) {
                    Some(existing) => {
                        if let Some(nested) = merge_diff(existing, wanted) {
                            patch.insert(key.clone(), nested);
                        }
                    }
                    // A null would delete a key that is already absent
                    None if wanted.is_null() => {}
                    None => {
                        patch.insert(key.clone(), wanted.clone());
                    }
                }
            }
            for key in current.keys() {
                if !desired.contains_key(key) {
                    patch.insert(key.clone(), Value::Null);
                }
            }
            (!patch.is_empty()).then_some(Value::Object(patch))
        }
        _ if current == desired => None,
        _ => Some(desired.clone()),
    }
}

/// Apply a JSON merge patch (RFC 7386) in place
pub fn apply_merge_patch(target: &mut Value, patch: &Value) {
    let Value::Object(patch) = patch else {
        *target = patch.clone();
        return;
    };
    if !target.is_object() {
        *target = Value::Object(Map::new());
    }
    if let Value::Object(target) = target {
        for (key, value) in patch {
            if value.is_null() {
                target.remove(key);
            } else {
                apply_merge_patch(target.entry(key.clone()).or_insert(Value::Null), value);
            }
        }
    }
}
