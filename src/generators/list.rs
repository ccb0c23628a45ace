//! List generator: one parameter set per literal element.
//!
//! Strings are used as-is, other scalars are stringified and `null` becomes an empty
//! string. Nested objects are flattened with dotted keys (`{"a": {"b": 1}}` gives
//! `a.b = 1`); arrays are kept as JSON text.

use crate::crd::ListGenerator;
use crate::generators::{ParamSet, Params};
use serde_json::Value;

fn flatten_into(prefix: &str, value: &Value, out: &mut Params) {
    match value {
        Value::Object(map) => {
            for (key, nested) in map {
                flatten_into(&format!("{prefix}.{key}"), nested, out);
            }
        }
        Value::String(s) => {
            out.insert(prefix.to_string(), s.clone());
        }
        Value::Null => {
            out.insert(prefix.to_string(), String::new());
        }
        other => {
            out.insert(prefix.to_string(), other.to_string());
        }
    }
}

pub(super) fn generate(spec: &ListGenerator) -> Vec<ParamSet> {
    spec.elements
        .iter()
        .map(|element| {
            let mut params = Params::new();
            for (key, value) in element {
                flatten_into(key, value, &mut params);
            }
            // BTreeMap serializes in key order, so equal elements give equal keys
            let key = format!(
                "list:{}",
                serde_json::to_string(&params).unwrap_or_default()
            );
            ParamSet { key, params }
        })
        .collect()
}
