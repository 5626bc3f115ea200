use clap::Parser;
use tracing_subscriber::EnvFilter;

use mailferry::cli::Cli;
use mailferry::commands;

#[tokio::main]
async fn main() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| "mailferry=info".into());
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    if let Err(e) = commands::run(cli).await {
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}
