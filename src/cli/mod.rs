pub mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::domain::Platform;

#[derive(Parser)]
#[command(name = "clipscout")]
#[command(about = "Resolve short-form video metadata across social platforms", long_about = None)]
pub struct Cli {
    /// Number of targets resolved in parallel (default: from config)
    #[arg(short, long, global = true)]
    pub workers: Option<usize>,

    /// Config file to use instead of ~/.config/clipscout/config.toml
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Resolve one URL or handle and print the canonical record
    Resolve {
        /// URL, or @handle / #hashtag together with --platform
        target: String,

        /// Platform for bare handles and hashtags
        #[arg(short, long)]
        platform: Option<Platform>,

        /// Items an actor run may collect
        #[arg(long)]
        max_items: Option<usize>,

        /// Skip text analysis
        #[arg(long)]
        no_analysis: bool,
    },
    /// Show how a URL or handle is classified, without fetching anything
    Classify {
        target: String,

        #[arg(short, long)]
        platform: Option<Platform>,
    },
    /// Resolve every target in a file, one per line
    Batch {
        /// File with one URL or handle per line; blank lines and # comments are ignored
        path: PathBuf,

        #[arg(short, long)]
        platform: Option<Platform>,

        #[arg(long)]
        no_analysis: bool,
    },
    /// Print the strategy chain of every platform
    Chains,
}
