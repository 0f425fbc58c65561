use std::path::PathBuf;

use clap::{Parser, Subcommand};

use syncs3::config::DEFAULT_CONFIG_FILE;

/// Mirror local files into an S3-compatible bucket.
///
/// syncs3 watches the configured paths and uploads created or modified files,
/// deleting objects whose files were removed. Changes are batched: a batch is
/// sent when it fills up or when the watched paths have been quiet for the
/// idle timeout.
#[derive(Parser, Debug)]
#[command(
    name = "syncs3",
    version,
    about,
    long_about = None,
    propagate_version = true,
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Watch the configured paths and mirror changes until interrupted.
    Watch {
        /// Path to the configuration file.
        #[arg(short, long, default_value = DEFAULT_CONFIG_FILE)]
        config: PathBuf,

        /// Keep everything in memory instead of talking to the bucket.
        #[arg(long)]
        dry_run: bool,
    },

    /// Validate the configuration and print the resolved watch plan.
    Check {
        /// Path to the configuration file.
        #[arg(short, long, default_value = DEFAULT_CONFIG_FILE)]
        config: PathBuf,

        /// Output the plan as JSON instead of human-readable text.
        #[arg(long)]
        json: bool,
    },
}
