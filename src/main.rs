//! # ApplicationSet Controller
//!
//! Watches `ApplicationSet` resources in all namespaces and keeps their generated
//! `Application`s in sync.
//!
//! Configuration comes from environment variables, see `config::ControllerConfig`.

use anyhow::Result;
use applicationset_controller::runtime::{initialization::initialize, watch_loop::run_watch_loop};

#[tokio::main]
async fn main() -> Result<()> {
    let init = initialize().await?;

    run_watch_loop(
        init.appsets,
        init.applications,
        init.reconciler,
        init.server_state,
    )
    .await
}
