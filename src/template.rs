//! # Template Renderer
//!
//! Substitutes `{{param}}` tokens in an Application template.
//!
//! Every string in the template is rendered: metadata name, label and annotation keys and
//! values, finalizers, and every string (and object key) anywhere under `spec`. Whitespace
//! inside the braces is ignored, so `{{ name }}` and `{{name}}` are the same token.
//!
//! A token whose parameter is missing is left in place verbatim. Rendering never fails on
//! missing parameters; `validate_name` is the post-render check the reconciler applies.

use crate::crd::{Application, ApplicationSetTemplate, ApplicationSpec};
use crate::generators::Params;
use regex::{Captures, Regex};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::LazyLock;
use thiserror::Error;

static TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{\s*([^{}]*?)\s*\}\}")
        .expect("Failed to compile template token regex - this should never happen")
});

static DNS1123_SUBDOMAIN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z0-9]([-a-z0-9]*[a-z0-9])?(\.[a-z0-9]([-a-z0-9]*[a-z0-9])?)*$")
        .expect("Failed to compile DNS-1123 regex - this should never happen")
});

const DNS1123_SUBDOMAIN_MAX_LEN: usize = 253;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("failed to serialize template spec: {0}")]
    Serialize(#[source] serde_json::Error),
    #[error("rendered spec for {name:?} is not a valid Application spec: {source}")]
    InvalidSpec {
        name: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("rendered name {name:?} still contains an unresolved parameter")]
    UnresolvedName { name: String },
    #[error("rendered name {name:?} is not a valid DNS-1123 subdomain")]
    InvalidName { name: String },
}

/// Replace every resolvable token in `input`
#[must_use]
pub fn render_string(input: &str, params: &Params) -> String {
    if !input.contains("{{") {
        return input.to_string();
    }
    TOKEN
        .replace_all(input, |caps: &Captures<'_>| match params.get(&caps[1]) {
            Some(value) => value.clone(),
            None => caps[0].to_string(),
        })
        .into_owned()
}

/// Render every string and object key in a JSON value
#[must_use]
pub fn render_value(value: &Value, params: &Params) -> Value {
    match value {
        Value::String(s) => Value::String(render_string(s, params)),
        Value::Array(items) => Value::Array(items.iter().map(|v| render_value(v, params)).collect()),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (render_string(k, params), render_value(v, params)))
                .collect::<Map<String, Value>>(),
        ),
        other => other.clone(),
    }
}

fn render_map(map: &BTreeMap<String, String>, params: &Params) -> BTreeMap<String, String> {
    map.iter()
        .map(|(k, v)| (render_string(k, params), render_string(v, params)))
        .collect()
}

/// Render one Application from the template, placed in `namespace`
///
/// Ownership metadata is not added here.
///
/// # Errors
///
/// Fails only when the rendered spec no longer deserializes as an Application spec.
pub fn render_application(
    template: &ApplicationSetTemplate,
    params: &Params,
    namespace: &str,
) -> Result<Application, RenderError> {
    let name = render_string(&template.metadata.name, params);

    let raw_spec = serde_json::to_value(&template.spec).map_err(RenderError::Serialize)?;
    let spec: ApplicationSpec = serde_json::from_value(render_value(&raw_spec, params))
        .map_err(|source| RenderError::InvalidSpec {
            name: name.clone(),
            source,
        })?;

    let mut app = Application::new(&name, spec);
    app.metadata.namespace = Some(namespace.to_string());

    let labels = render_map(&template.metadata.labels, params);
    if !labels.is_empty() {
        app.metadata.labels = Some(labels);
    }
    let annotations = render_map(&template.metadata.annotations, params);
    if !annotations.is_empty() {
        app.metadata.annotations = Some(annotations);
    }
    if !template.metadata.finalizers.is_empty() {
        app.metadata.finalizers = Some(
            template
                .metadata
                .finalizers
                .iter()
                .map(|f| render_string(f, params))
                .collect(),
        );
    }

    Ok(app)
}

/// Post-render check for an Application name
///
/// # Errors
///
/// `UnresolvedName` if a token survived rendering, `InvalidName` if the name is not a
/// DNS-1123 subdomain.
pub fn validate_name(name: &str) -> Result<(), RenderError> {
    if TOKEN.is_match(name) || name.contains("{{") {
        return Err(RenderError::UnresolvedName {
            name: name.to_string(),
        });
    }
    if name.len() > DNS1123_SUBDOMAIN_MAX_LEN || !DNS1123_SUBDOMAIN.is_match(name) {
        return Err(RenderError::InvalidName {
            name: name.to_string(),
        });
    }
    Ok(())
}
