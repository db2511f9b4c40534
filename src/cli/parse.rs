//! CLI parse: clap types for certrun. No behavior; definitions only.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// certrun - end-to-end verification of a certificate-issuing deployment
#[derive(Parser, Debug)]
#[command(name = "certrun")]
#[command(about = "Deploy a certificate issuer into a throwaway namespace and verify it end to end")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Workspace root directory (config/ and relative paths are resolved here)
    #[arg(long, default_value = ".")]
    pub workspace: PathBuf,

    /// Configuration file path (layered on top of the global and workspace files)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging (default: off)
    #[arg(long, default_value = "false")]
    pub verbose: bool,

    /// Log level (trace, debug, info, warn, error, off)
    #[arg(long)]
    pub log_level: Option<String>,

    /// Log format (json, text)
    #[arg(long)]
    pub log_format: Option<String>,

    /// Log output (stdout, stderr, file)
    #[arg(long)]
    pub log_output: Option<String>,

    /// Log file path (if output is "file")
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run every verification stage, then tear down
    Run {
        /// Reuse the published image for the configured commit
        #[arg(long)]
        skip_build: bool,
        /// Leave the namespace, files and DNS record in place
        #[arg(long)]
        no_teardown: bool,
        /// Report format
        #[arg(long, value_enum, default_value = "text")]
        format: OutputFormat,
    },
    /// Materialize a manifest from a template without deploying it
    Render {
        /// Template containing *IMAGE_NAME*, *SUBDOMAIN* and *NODE_PORT*
        #[arg(long)]
        template: PathBuf,
        /// Image reference
        #[arg(long)]
        image: String,
        /// Subdomain (the run id in a real run)
        #[arg(long)]
        subdomain: String,
        /// Node port
        #[arg(long)]
        port: u16,
        /// Directory for the rendered file (default: next to the template)
        #[arg(long)]
        output_dir: Option<PathBuf>,
    },
    /// Print the effective configuration as TOML, credentials redacted
    Config,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}
