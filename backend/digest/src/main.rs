use clap::Parser;
use server::config::Config;
use tracing_subscriber::{EnvFilter, fmt};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Skip users who already have a suggestion
    #[arg(long)]
    only_missing: bool,

    #[arg(long)]
    limit: Option<usize>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let args = Args::parse();
    let config = Config::load()?;

    let summary = digest::run(&config, args.only_missing, args.limit).await?;

    println!("\nUpdated: {}", summary.updated);
    println!("Failed: {}", summary.failed);
    println!("Skipped: {}", summary.skipped);

    Ok(())
}
