mod cli;
mod commands;

use clap::Parser;
use tracing_subscriber::{fmt, EnvFilter};
use zks_bridge::config::Config;
use zks_bridge::errors::SdkError;

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .with_line_number(true)
        .with_writer(std::io::stderr)
        .compact()
        .init();
}

async fn run() -> anyhow::Result<()> {
    let cli = cli::Cli::parse();
    let config = Config::load(cli.config_path.as_deref())?;
    tracing::debug!(path = %config.path.display(), chains = config.chains.len(), "config loaded");
    cli.run(config).await
}

#[tokio::main]
async fn main() {
    init_logging();

    if let Err(err) = run().await {
        match err.downcast_ref::<SdkError>() {
            Some(sdk) => eprintln!("{}", sdk.pretty()),
            None => eprintln!("error: {err:#}"),
        }
        std::process::exit(1);
    }
}
