//! ApplicationSet Controller Library
//!
//! Fans one templated `Application` out across clusters, repositories, branches and
//! pull requests, and keeps the generated set in sync as those sources change.
//!
//! ## Quick Start
//!
//! ```rust
//! use applicationset_controller::prelude::*;
//! ```
//!
//! ## Layout
//!
//! - `scm_provider`: Repository discovery, filters and the GitHub adapter
//! - `generators`: Parameter-set generators
//! - `template`: `{{param}}` substitution into the Application template
//! - `controller`: Reconciler, backoff and the probe server
//! - `runtime`: Process start-up and the watch loop

pub mod config;
pub mod constants;
pub mod controller;
pub mod crd;
pub mod generators;
pub mod observability;
pub mod prelude;
pub mod runtime;
pub mod scm_provider;
pub mod template;
