use super::app_config::LogLevel;
use clap::Parser;
use std::path::PathBuf;

/// Command line arguments.
#[derive(Debug, Parser)]
#[allow(missing_docs)]
#[command(
    name = "cellar-images",
    version,
    about = "Load wine label photos through the cellar photo cache",
    long_about = None
)]
pub struct CliArgs {
    /// Photo URLs to load. Pass "" to exercise the missing-URL path.
    #[arg(value_name = "URL")]
    pub urls: Vec<String>,

    /// Configuration file path.
    #[arg(short, long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Log file path.
    #[arg(long, value_name = "PATH")]
    pub log_path: Option<PathBuf>,

    /// Log verbosity level.
    #[arg(long, value_enum)]
    pub log_level: Option<LogLevel>,

    /// Maximum photos kept in memory.
    #[arg(long)]
    pub max_entries: Option<usize>,

    /// Maximum concurrent downloads.
    #[arg(long)]
    pub max_concurrent_downloads: Option<usize>,

    /// Request timeout in seconds.
    #[arg(long)]
    pub timeout_secs: Option<u64>,

    /// Share one download between concurrent requests for the same URL.
    #[arg(long)]
    pub coalesce_requests: Option<bool>,

    /// How many times to request the whole URL list.
    #[arg(long, default_value_t = 2)]
    pub passes: u32,

    /// Print results and statistics as JSON.
    #[arg(long)]
    pub json: bool,
}
