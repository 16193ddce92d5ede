//! The task execution controller binary

use clap::Parser;
use task_controller::args::Args;
use task_controller::Controller;
use tracing::{event, Level};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .json()
        .init();

    let conf = store::Conf::new(&args.config)?;

    if args.dry_run {
        event!(Level::INFO, "starting in dry run mode");
    }

    let mut controller = Controller::connect(conf, args.context_name.as_deref()).await?;
    controller.run().await?;
    Ok(())
}
