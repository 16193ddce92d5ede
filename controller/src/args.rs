//! Command line arguments for the task execution controller

use clap::Parser;

/// The command line args the controller is started with
#[derive(Parser, Debug, Clone)]
#[clap(version, author)]
pub struct Args {
    /// The path to load the config file from
    #[clap(short, long, default_value = "controller.yml")]
    pub config: String,
    /// The kubeconfig context to use instead of the in-cluster service account
    #[clap(long)]
    pub context_name: Option<String>,
    /// Reconcile and log what would happen without touching the cluster
    #[clap(long, default_value_t)]
    pub dry_run: bool,
}
