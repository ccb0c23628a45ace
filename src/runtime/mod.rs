//! # Runtime
//!
//! Process wiring around the reconciler.
//!
//! - `initialization`: rustls, tracing, metrics, probe server, client and startup passes
//! - `watch_loop`: The kube-runtime controller and its restart loop
//! - `error_policy`: Requeue decisions for failed passes and watch stream errors

pub mod error_policy;
pub mod initialization;
pub mod watch_loop;
