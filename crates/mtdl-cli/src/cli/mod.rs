//! CLI for the mtdl segmented downloader.

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use mtdl_core::config;
use std::path::PathBuf;

use commands::{run_config, run_get, GetOptions};

/// Top-level CLI for mtdl.
#[derive(Debug, Parser)]
#[command(name = "mtdl")]
#[command(about = "mtdl: concurrent segmented HTTP downloader", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Download one or more URLs and wait until all are done.
    Get {
        /// Direct HTTP/HTTPS URLs to download.
        #[arg(required = true)]
        urls: Vec<String>,
        /// Downloads running at once (overrides download.max_downloads).
        #[arg(long, value_name = "N")]
        max_downloads: Option<usize>,
        /// Range workers across all downloads (overrides download.max_threads).
        #[arg(long, value_name = "N")]
        max_threads: Option<usize>,
        /// Segments per download (overrides download.split_num).
        #[arg(long, value_name = "N")]
        split: Option<usize>,
        /// Directory to save into (overrides download.download_path).
        #[arg(long, value_name = "PATH")]
        dir: Option<PathBuf>,
    },

    /// Read or change the config file.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Debug, Subcommand)]
pub enum ConfigAction {
    /// Print the value of `<section> <key>`.
    Get { section: String, key: String },
    /// Set `<section> <key>` to `<value>` and save the file.
    Set {
        section: String,
        key: String,
        value: String,
    },
    /// Print the config file location.
    Path,
}

impl CliCommand {
    pub fn run_from_args() -> Result<()> {
        let cli = Cli::parse();

        match cli.command {
            CliCommand::Get {
                urls,
                max_downloads,
                max_threads,
                split,
                dir,
            } => {
                let cfg = config::load_or_init()?;
                tracing::debug!("loaded config: {:?}", cfg);
                run_get(
                    &cfg,
                    GetOptions {
                        urls,
                        max_downloads,
                        max_threads,
                        split,
                        dir,
                    },
                )?
            }
            CliCommand::Config { action } => run_config(action)?,
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests;
