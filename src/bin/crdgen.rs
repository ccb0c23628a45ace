//! # CRD Generator
//!
//! Prints the `ApplicationSet` CustomResourceDefinition as YAML.
//!
//! ```bash
//! cargo run --bin crdgen > config/crd/applicationset.yaml
//! cargo run --bin crdgen | kubectl apply -f -
//! ```
//!
//! The `Application` CRD is owned by the Argo CD installation and is not generated here.

use applicationset_controller::crd::ApplicationSet;
use kube::CustomResourceExt;

fn main() -> anyhow::Result<()> {
    print!("{}", serde_yaml::to_string(&ApplicationSet::crd())?);
    Ok(())
}
