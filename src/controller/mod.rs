//! # Controller
//!
//! - `backoff`: Fibonacci backoff for failed reconciliations
//! - `reconciler`: Generate, diff and apply Applications for one ApplicationSet
//! - `server`: HTTP server for metrics and health checks

pub mod backoff;
pub mod reconciler;
pub mod server;
