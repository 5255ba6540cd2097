//! CLI argument parsing using clap derive API
//!
//! Purely declarative: no I/O happens here.

use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand, ValueEnum};

/// Configuration file used when `--config` is not given.
pub const DEFAULT_CONFIG_PATH: &str = "netwarden.toml";

/// netwarden -- network intrusion detection with a mini-SIEM on top.
///
/// Use `netwarden <COMMAND> --help` for subcommand details.
#[derive(Parser, Debug)]
#[command(name = "netwarden", version, about, long_about = None)]
pub struct Cli {
    /// Path to the netwarden.toml configuration file [default: netwarden.toml].
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Override log level (trace, debug, info, warn, error).
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Output format.
    #[arg(long, global = true, default_value = "text")]
    pub output: OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Effective config path and whether it was given explicitly.
    pub fn config_path(&self) -> (&Path, bool) {
        match self.config.as_deref() {
            Some(path) => (path, true),
            None => (Path::new(DEFAULT_CONFIG_PATH), false),
        }
    }
}

/// Supported output formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output.
    Text,
    /// Machine-readable JSON.
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Replay a capture file (JSONL events) through the detectors.
    Capture(CaptureArgs),

    /// Run detection on a live feed while an interface is being captured.
    Live(LiveArgs),

    /// Reports and correlation over the detections log.
    Siem(SiemArgs),

    /// Manage configuration.
    Config(ConfigArgs),
}

// ---- capture ----

/// Offline replay of a capture file.
#[derive(Args, Debug)]
pub struct CaptureArgs {
    /// Capture file with one normalized event per line.
    pub file: PathBuf,
}

// ---- live ----

/// Live detection.
#[derive(Args, Debug)]
pub struct LiveArgs {
    /// Interface being captured. Must exist.
    #[arg(long)]
    pub iface: String,

    /// Event feed: a file or FIFO path, or `-` for stdin [default: stdin].
    #[arg(long)]
    pub feed: Option<String>,

    /// Open no feed; idle until interrupted and shut down cleanly.
    #[arg(long)]
    pub dry_run: bool,
}

// ---- siem ----

/// Mini-SIEM commands over the detections log.
#[derive(Args, Debug)]
pub struct SiemArgs {
    #[command(subcommand)]
    pub action: SiemAction,
}

#[derive(Subcommand, Debug)]
pub enum SiemAction {
    /// Detection count per rule.
    RuleStats,
    /// Detection count per UTC minute.
    Timeline,
    /// Source IPs with the most detections.
    TopTalkers {
        /// Number of source IPs to show.
        #[arg(long, default_value_t = netwarden_correlate::DEFAULT_TOP_TALKERS)]
        limit: usize,
    },
    /// Run the correlation rules and append alerts to the alerts log.
    Correlate {
        /// Keep tailing the detections log from the saved cursor until interrupted.
        #[arg(long)]
        follow: bool,
    },
}

// ---- config ----

/// Manage netwarden configuration.
#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: ConfigAction,
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Validate the configuration file and report errors.
    Validate,
    /// Show the effective configuration (defaults + file + env overrides).
    Show {
        /// Show only one section (general, thresholds, rules, correlation, limits, paths, live, metrics).
        #[arg(long)]
        section: Option<String>,
    },
}
