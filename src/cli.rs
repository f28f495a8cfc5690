use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "iptvcheck")]
#[command(author, version, about = "IPTV channel finder and stream health checker")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List channels from an Xtream Codes provider and check them
    Scan(ScanArgs),

    /// Check a single stream URL
    Probe {
        /// Stream URL
        #[arg(required = true)]
        url: String,

        #[command(flatten)]
        checks: StreamCheckArgs,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Check that required external tools are available
    CheckTools,

    /// Validate configuration file
    Validate {
        /// Config file to validate (uses default if not specified)
        config: Option<PathBuf>,
    },

    /// Display version information
    Version,
}

#[derive(Args, Debug, Default)]
pub struct StreamCheckArgs {
    /// Read codec, resolution and frame rate with ffprobe
    #[arg(long)]
    pub info: bool,

    /// Measure time to first frame
    #[arg(long)]
    pub conn: bool,

    /// Watch the stream and score its stability
    #[arg(long, visible_alias = "check")]
    pub quality: bool,

    /// Monitoring window in seconds
    #[arg(long)]
    pub duration: Option<f64>,

    /// Hard limit in seconds for each probe session and connection check
    #[arg(long)]
    pub timeout: Option<f64>,
}

#[derive(Args, Debug)]
pub struct ScanArgs {
    /// Provider host, e.g. line.example.com:8080
    #[arg(long)]
    pub server: Option<String>,

    /// Account username
    #[arg(long)]
    pub user: Option<String>,

    /// Account password
    #[arg(long)]
    pub pw: Option<String>,

    /// Only channels in this category (exact name)
    #[arg(long)]
    pub category: Option<String>,

    /// Only channels whose name contains this text (case-insensitive)
    #[arg(long)]
    pub search: Option<String>,

    /// Do not read or write the channel cache
    #[arg(long)]
    pub nocache: bool,

    /// Channel cache file
    #[arg(long)]
    pub cachefile: Option<PathBuf>,

    #[command(flatten)]
    pub checks: StreamCheckArgs,

    /// Count upcoming EPG entries per channel
    #[arg(long)]
    pub epg: bool,

    /// Channels checked in parallel
    #[arg(short, long)]
    pub jobs: Option<usize>,

    /// Also write the results to this CSV file
    #[arg(long)]
    pub save: Option<PathBuf>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}
