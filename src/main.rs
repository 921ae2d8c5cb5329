use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use clipscout::app::AppContext;
use clipscout::cli::{commands, Cli, Commands};
use clipscout::config::Config;
use clipscout::domain::ResolveHints;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr; stdout carries the JSON output
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = match cli.config {
        Some(ref path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    let workers = cli.workers.unwrap_or(config.pipeline.workers);

    match cli.command {
        Commands::Resolve {
            target,
            platform,
            max_items,
            no_analysis,
        } => {
            let ctx = AppContext::with_workers(config, workers, !no_analysis)?;
            let hints = ResolveHints {
                max_items,
                platform_hint: platform,
            };
            commands::resolve(&ctx, &target, &hints).await?;
        }
        Commands::Classify { target, platform } => {
            commands::classify(&target, platform)?;
        }
        Commands::Batch {
            path,
            platform,
            no_analysis,
        } => {
            let ctx = AppContext::with_workers(config, workers, !no_analysis)?;
            let hints = ResolveHints {
                max_items: None,
                platform_hint: platform,
            };
            commands::batch(&ctx, &path, &hints).await?;
        }
        Commands::Chains => {
            commands::chains(&config)?;
        }
    }

    Ok(())
}
