//! # Custom Resource Definitions
//!
//! CRD types for the ApplicationSet controller.
//!
//! ## Module Structure
//!
//! - `spec.rs` - `ApplicationSet` specification, template and sync policy
//! - `generators.rs` - Declarative generator configuration (list, clusters, git, matrix, SCM, pull requests)
//! - `application.rs` - The `Application` resource the controller fans out
//! - `status.rs` - Status types for tracking reconciliation state
//! - `schema.rs` - Hand-written schemas for fields the derive cannot express structurally

mod application;
mod generators;
mod schema;
mod spec;
mod status;

// Re-export all public types
pub use application::{
    Application, ApplicationDestination, ApplicationSource, ApplicationSpec,
};
pub use generators::{
    ApplicationSetGenerator, CloneProtocol, ClusterGenerator, GitDirectoryGeneratorItem,
    GitGenerator, LabelSelector, LabelSelectorOperator, LabelSelectorRequirement, ListGenerator,
    MatrixGenerator, PullRequestGenerator, PullRequestGeneratorGithub, ScmProviderGenerator,
    ScmProviderGeneratorFilter, ScmProviderGeneratorGithub,
};
pub use spec::{
    default_git_revision, ApplicationSet, ApplicationSetSpec, ApplicationSetSyncPolicy,
    ApplicationSetTemplate, ApplicationSetTemplateMeta, ApplicationsSyncPolicy,
};
pub use status::{ApplicationSetStatus, Condition, ResourceStatus};
