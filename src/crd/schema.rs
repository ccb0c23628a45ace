//! # Schema Helpers
//!
//! Kubernetes structural schemas for fields whose Rust types are either recursive
//! (matrix generators) or intentionally open (Application spec, list elements).
//! The derived schemars output for those would be rejected by the API server.

use schemars::{json_schema, Schema, SchemaGenerator};

/// Object whose fields are preserved verbatim by the API server
pub(crate) fn preserve_unknown_object(_gen: &mut SchemaGenerator) -> Schema {
    json_schema!({
        "type": "object",
        "x-kubernetes-preserve-unknown-fields": true
    })
}

/// Array of objects whose fields are preserved verbatim by the API server
pub(crate) fn preserve_unknown_object_array(_gen: &mut SchemaGenerator) -> Schema {
    json_schema!({
        "type": "array",
        "items": {
            "type": "object",
            "x-kubernetes-preserve-unknown-fields": true
        }
    })
}
