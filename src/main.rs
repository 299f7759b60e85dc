use anyhow::Result;
use bizfinder::cli;
use clap::Parser;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // Diagnostics only; user-facing progress flows through status events.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = cli::Cli::parse();
    cli::run(args).await
}
