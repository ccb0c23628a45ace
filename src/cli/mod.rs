//! # appsetctl
//!
//! Command-line companion to the ApplicationSet controller.
//!
//! ```bash
//! # Preview the Applications an ApplicationSet manifest would generate
//! appsetctl render guestbook-appset.yaml
//!
//! # Ask the controller for an immediate pass
//! appsetctl reconcile guestbook --namespace argocd
//! ```

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod reconcile;
mod render;

/// ApplicationSet controller CLI
#[derive(Parser)]
#[command(name = "appsetctl", about = "ApplicationSet controller CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Kubernetes namespace (defaults to the current context namespace)
    #[arg(short, long, global = true)]
    namespace: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Render the Applications an ApplicationSet manifest would generate, as YAML
    ///
    /// Runs offline: the cluster generator only sees the local cluster, git generators
    /// clone with the local `git` binary and SCM generators use GITHUB_TOKEN if set.
    Render {
        /// ApplicationSet manifest
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
    /// Trigger an immediate reconcile pass by setting the refresh annotation
    Reconcile {
        /// Name of the ApplicationSet
        #[arg(value_name = "NAME")]
        name: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        return Err(anyhow!("Failed to install rustls crypto provider"));
    }

    // Logs go to stderr so rendered YAML can be piped
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "appsetctl=info,applicationset_controller=warn".into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Render { file } => {
            let yaml = render::render_command(&file, cli.namespace.as_deref()).await?;
            print!("{yaml}");
            Ok(())
        }
        Commands::Reconcile { name } => {
            let client = kube::Client::try_default()
                .await
                .context("Failed to create Kubernetes client. Ensure kubeconfig is configured.")?;
            reconcile::reconcile_command(client, &name, cli.namespace).await
        }
    }
}
