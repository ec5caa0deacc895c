use clap::Parser;
use helm_cli::Cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();
    helm_cli::commands::run(cli).await
}
