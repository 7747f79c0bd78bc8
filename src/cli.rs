use clap::Parser;
use std::path::PathBuf;

#[derive(Debug, Clone, Parser)]
#[command(
    name = "kube-traverse",
    version,
    about = "Drill through a Kubernetes cluster's resources from the terminal."
)]
pub struct CliArgs {
    /// Polling interval in seconds for resource types that cannot be watched
    #[arg(long)]
    pub poll_interval_secs: Option<u64>,

    /// Number of log lines to tail and to save
    #[arg(long)]
    pub tail_lines: Option<i64>,

    /// Directory saved log files are written to
    #[arg(long)]
    pub export_dir: Option<PathBuf>,

    /// Directory for the application's own log file
    #[arg(long)]
    pub log_dir: Option<PathBuf>,

    /// Ignore the cached resource catalog and run discovery again
    #[arg(long)]
    pub refresh_catalog: bool,

    /// tracing filter (for example: info,debug,trace)
    #[arg(long, default_value = "info")]
    pub log_filter: String,
}
