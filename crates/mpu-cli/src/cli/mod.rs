//! CLI for the MPU multipart uploader.

mod commands;
mod control_socket;

use anyhow::Result;
use clap::{Parser, Subcommand};
use clap_complete::Shell;
use mpu_core::config;
use std::path::PathBuf;

use commands::{
    run_completions, run_control, run_man, run_plan, run_upload, ControlAction, UploadArgs,
};

/// Top-level CLI for the MPU multipart uploader.
#[derive(Debug, Parser)]
#[command(name = "mpu")]
#[command(about = "MPU: resumable multipart uploads to presigned URLs", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Upload a file, one part per presigned URL, and print the ETags.
    Upload {
        /// File to upload.
        file: PathBuf,

        /// Upload identifier used by pause/resume/cancel/status (default: file name).
        #[arg(long)]
        id: Option<String>,

        /// Presigned PUT URL for the next part, in part order. Repeat once per part.
        #[arg(long = "url", value_name = "URL")]
        urls: Vec<String>,

        /// Read the part URLs from a file, one per line (blank lines and # comments skipped).
        #[arg(long, value_name = "PATH", conflicts_with = "urls")]
        urls_file: Option<PathBuf>,

        /// Concurrent part uploads (clamped to 1..=10; default from config).
        #[arg(long, value_name = "N")]
        parallel: Option<usize>,

        /// Print events and the final result as JSON lines.
        #[arg(long)]
        json: bool,

        /// Probe `host:port` for connectivity and pause while it is unreachable.
        #[arg(long, value_name = "HOST:PORT")]
        probe: Option<String>,
    },

    /// Pause a running upload.
    Pause {
        /// Upload identifier.
        id: String,
    },

    /// Resume a paused upload.
    Resume {
        /// Upload identifier.
        id: String,
    },

    /// Cancel a running upload.
    Cancel {
        /// Upload identifier.
        id: String,
    },

    /// Show progress of a running upload.
    Status {
        /// Upload identifier.
        id: String,
    },

    /// Show how a file of SIZE bytes would be split across COUNT URLs.
    Plan {
        /// Size in bytes; accepts K, M, G suffixes (binary units).
        size: String,
        /// Number of presigned URLs.
        count: usize,
    },

    /// Print shell completions to stdout.
    Completions {
        shell: Shell,
    },

    /// Print the man page to stdout.
    Man,
}

impl CliCommand {
    pub async fn run_from_args() -> Result<()> {
        let cli = Cli::parse();

        match cli.command {
            CliCommand::Upload {
                file,
                id,
                urls,
                urls_file,
                parallel,
                json,
                probe,
            } => {
                let cfg = config::load_or_init()?;
                tracing::debug!("loaded config: {:?}", cfg);
                let args = UploadArgs {
                    file,
                    id,
                    urls,
                    urls_file,
                    parallel,
                    json,
                    probe,
                };
                run_upload(&cfg, args).await?;
            }
            CliCommand::Pause { id } => run_control(ControlAction::Pause, &id).await?,
            CliCommand::Resume { id } => run_control(ControlAction::Resume, &id).await?,
            CliCommand::Cancel { id } => run_control(ControlAction::Cancel, &id).await?,
            CliCommand::Status { id } => run_control(ControlAction::Status, &id).await?,
            CliCommand::Plan { size, count } => run_plan(&size, count)?,
            CliCommand::Completions { shell } => run_completions(shell)?,
            CliCommand::Man => run_man()?,
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests;
