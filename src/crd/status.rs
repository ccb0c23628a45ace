//! # ApplicationSet Status
//!
//! Status types for tracking reconciliation state and conditions.

use serde::{Deserialize, Serialize};

/// Status of the ApplicationSet resource
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationSetStatus {
    /// Current phase of reconciliation
    /// Values: Pending, Generating, Applying, Ready, Failed
    #[serde(default)]
    pub phase: Option<String>,
    /// Human-readable description of current state
    #[serde(default)]
    pub description: Option<String>,
    /// Conditions: ErrorOccurred, ParametersGenerated, ResourcesUpToDate
    #[serde(default)]
    pub conditions: Vec<Condition>,
    /// Observed generation
    #[serde(default)]
    pub observed_generation: Option<i64>,
    /// Last time the status content changed (RFC3339)
    #[serde(default)]
    pub last_reconcile_time: Option<String>,
    /// Number of Applications in the desired set
    #[serde(default)]
    pub application_count: Option<i32>,
    /// Per-Application outcome of the last pass
    #[serde(default)]
    pub resources: Vec<ResourceStatus>,
}

/// Outcome for one owned Application
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ResourceStatus {
    pub name: String,
    /// Created, Updated, Unchanged, Deleting, Deleted, Skipped, Failed
    pub state: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Condition represents a condition of a resource
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Type of condition
    pub r#type: String,
    /// Status of the condition (True, False, Unknown)
    pub status: String,
    /// Last transition time
    #[serde(default)]
    pub last_transition_time: Option<String>,
    /// Reason for the condition
    #[serde(default)]
    pub reason: Option<String>,
    /// Message describing the condition
    #[serde(default)]
    pub message: Option<String>,
}
