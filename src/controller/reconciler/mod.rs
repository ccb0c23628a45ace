//! # Reconciler
//!
//! Core reconciliation logic for `ApplicationSet` resources.
//!
//! The reconciler:
//! - Runs the ApplicationSet's generators to get parameter sets
//! - Renders one Application per parameter set and rejects name collisions
//! - Diffs the desired Applications against the owned live ones
//! - Creates, updates and deletes Applications, one failure never aborting the rest
//! - Updates resource status with reconciliation results
//!
//! ## Modules
//!
//! - `desired.rs` - Generators and rendering (no writes)
//! - `diff.rs` - Pure planner and JSON merge-patch helpers
//! - `store.rs` - `ApplicationStore` (Kubernetes and in-memory)
//! - `apply.rs` - Executes a plan
//! - `status.rs` - Status and conditions
//! - `reconcile.rs` - The pass and the controller entry point
//! - `types.rs` - Context, errors, backoff state

pub mod apply;
pub mod desired;
pub mod diff;
pub mod reconcile;
pub mod status;
pub mod store;
pub mod types;

// Re-export public API
pub use apply::{apply_plan, ApplyOutcome};
pub use diff::{plan, PlanPolicy, PlannedAction};
pub use reconcile::{reconcile, run_pass, PassReport};
pub use store::{ApplicationStore, InMemoryApplicationStore, KubeApplicationStore, StoreOperation};
pub use types::{BackoffState, Reconciler, ReconcilerError};
