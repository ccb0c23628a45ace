//! # Desired State
//!
//! Runs the ApplicationSet's generators and renders one owned Application per parameter
//! set. Everything here completes before the first write of a pass.

use crate::constants::APPLICATION_SET_NAME_LABEL;
use crate::controller::reconciler::types::ReconcilerError;
use crate::crd::{Application, ApplicationSet, ApplicationSetSpec};
use crate::generators::{dedup, Generator, GeneratorError, GeneratorServices, ParamSet};
use crate::template::{render_application, validate_name};
use futures::future::try_join_all;
use kube::{Resource, ResourceExt};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use tracing::debug;

/// Kubernetes limit on label values
const MAX_LABEL_VALUE_LEN: usize = 63;
/// Hex digits of the name digest kept in a shortened label value
const LABEL_HASH_LEN: usize = 10;

/// Value of the owner label for an ApplicationSet name
///
/// Names that fit a label value are used as-is. Longer names keep a prefix followed by
/// `-` and a digest of the full name. The owner reference uid still decides ownership,
/// so a prefix clash only widens the list query.
#[must_use]
pub fn owner_label_value(owner_name: &str) -> String {
    if owner_name.len() <= MAX_LABEL_VALUE_LEN {
        return owner_name.to_string();
    }
    let digest = format!("{:x}", Sha256::digest(owner_name.as_bytes()));
    // Object names are ASCII, so byte slicing stays on char boundaries
    let prefix = owner_name[..MAX_LABEL_VALUE_LEN - LABEL_HASH_LEN - 1]
        .trim_end_matches(|c: char| !c.is_ascii_alphanumeric());
    format!("{prefix}-{}", &digest[..LABEL_HASH_LEN])
}

/// Validate every top-level generator of an ApplicationSet
///
/// # Errors
///
/// The first generator that sets zero or several kinds, or a malformed matrix.
pub fn compile_generators(spec: &ApplicationSetSpec) -> Result<Vec<Generator>, GeneratorError> {
    spec.generators.iter().map(Generator::try_from).collect()
}

/// Whether any generator reads a source the controller does not watch
#[must_use]
pub fn needs_polling(generators: &[Generator]) -> bool {
    generators.iter().any(Generator::needs_polling)
}

/// Run all generators and concatenate their outputs in declaration order
///
/// Generators run concurrently; the call returns once every one has finished, and the
/// first failure fails the whole call.
///
/// # Errors
///
/// Any generator error.
pub async fn generate_param_sets(
    generators: &[Generator],
    services: &GeneratorServices,
) -> Result<Vec<ParamSet>, GeneratorError> {
    let outputs = try_join_all(generators.iter().map(|g| g.generate(services))).await?;
    Ok(dedup(outputs.into_iter().flatten().collect()))
}

/// Render the desired Applications, in parameter-set order
///
/// Each Application gets the owner label and, when the ApplicationSet has a uid, a
/// controller owner reference.
///
/// # Errors
///
/// A render or name-validation failure, or two parameter sets rendering the same name.
pub fn render_desired(
    appset: &ApplicationSet,
    sets: &[ParamSet],
) -> Result<Vec<Application>, ReconcilerError> {
    let namespace = appset
        .namespace()
        .ok_or(ReconcilerError::MissingObjectKey("metadata.namespace"))?;
    let owner_name = appset.name_any();
    let owner_label = owner_label_value(&owner_name);
    let owner_reference = appset.controller_owner_ref(&());

    let mut rendered_by: BTreeMap<String, &str> = BTreeMap::new();
    let mut desired = Vec::with_capacity(sets.len());

    for set in sets {
        let mut app = render_application(&appset.spec.template, &set.params, &namespace)?;
        let name = app.name_any();
        validate_name(&name)?;

        if let Some(first) = rendered_by.insert(name.clone(), &set.key) {
            return Err(ReconcilerError::Collision {
                name,
                first: first.to_string(),
                second: set.key.clone(),
            });
        }

        app.labels_mut()
            .insert(APPLICATION_SET_NAME_LABEL.to_string(), owner_label.clone());
        if let Some(reference) = &owner_reference {
            app.owner_references_mut().push(reference.clone());
        }
        desired.push(app);
    }

    debug!(
        applicationset = owner_name.as_str(),
        count = desired.len(),
        "Rendered desired Applications"
    );
    Ok(desired)
}
