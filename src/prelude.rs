//! # Prelude
//!
//! Re-exports commonly used types and traits.
//!
//! ```rust
//! use applicationset_controller::prelude::*;
//! ```

// CRD types
pub use crate::crd::*;

// Generators and their data sources
pub use crate::generators::{
    ClusterInfo, ClusterSource, Generator, GeneratorError, GeneratorServices, ParamSet, Params,
    RepoTreeService,
};

// SCM provider capability
pub use crate::scm_provider::{
    list_repos, PullRequest, Repository, ScmError, ScmProviderFactory, ScmProviderService,
};

// Reconciler types
pub use crate::controller::reconciler::{
    reconcile, run_pass, ApplicationStore, PassReport, Reconciler, ReconcilerError,
};

pub use crate::config::{ControllerConfig, LogFormat};
pub use crate::template::RenderError;
