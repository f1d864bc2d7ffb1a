//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use fetchkit::engine::DEFAULT_CONCURRENT_CHUNKS;

/// Fetch files from arbitrary URLs and storage providers.
///
/// Fetchkit classifies a URL, picks the matching provider handler, and
/// transfers the target with chunked, resumable, concurrent range requests
/// where the origin allows it.
#[derive(Parser, Debug)]
#[command(name = "fetchkit")]
#[command(author, version, about)]
pub struct Args {
    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Data directory for the job database, scratch files, and artifacts
    #[arg(long, default_value = "./fetchkit-data", global = true)]
    pub data_dir: PathBuf,

    /// Owner id recorded on submitted jobs
    #[arg(long, default_value_t = 1, global = true)]
    pub owner: i64,

    #[command(subcommand)]
    pub command: Command,
}

/// Subcommands mapping to the service boundary operations.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Submit a URL and run the transfer to completion
    Get {
        /// The URL to fetch
        url: String,

        /// Maximum concurrent chunk connections (1-64)
        #[arg(short = 'c', long, default_value_t = DEFAULT_CONCURRENT_CHUNKS as u8, value_parser = clap::value_parser!(u8).range(1..=64))]
        concurrency: u8,
    },

    /// Probe a URL without creating a job
    Probe {
        /// The URL to inspect
        url: String,
    },

    /// Show a job's status snapshot
    Status {
        /// The job token
        job_id: String,
    },

    /// Cancel an active job
    Cancel {
        /// The job token
        job_id: String,
    },

    /// Re-queue a failed job and run it again from confirmed offsets
    Resume {
        /// The job token
        job_id: String,
    },

    /// List jobs for the owner
    List {
        /// Filter by status (pending, downloading, completed, failed, ...)
        #[arg(short, long)]
        status: Option<String>,
    },

    /// Follow a job's live event stream
    Watch {
        /// The job token
        job_id: String,
    },
}
