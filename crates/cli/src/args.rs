//! CLI argument definitions

use clap::{Args, Parser, Subcommand};
use everylot_domain::Platform;
use std::path::PathBuf;

/// everylot: post a street-level photo of every lot in a parcel database
#[derive(Parser, Debug)]
#[command(name = "everylot")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Post the next lot to every enabled platform
    Post(PostArgs),

    /// Load parcels from the ArcGIS FeatureServer into the lot database
    Ingest(IngestArgs),

    /// Configuration management
    Config(ConfigArgs),

    /// Validate configuration, database and credentials
    Doctor(DoctorArgs),
}

#[derive(Args, Debug)]
pub struct PostArgs {
    /// Post this parcel id instead of the next one
    #[arg(long)]
    pub id: Option<String>,

    /// Template for the Street View location query
    #[arg(short = 's', long)]
    pub search_format: Option<String>,

    /// Template for the post text
    #[arg(short = 'p', long)]
    pub print_format: Option<String>,

    /// Resolve and compose only; no image fetch, no posting
    #[arg(long)]
    pub dry_run: bool,

    /// Path to the SQLite lots database
    #[arg(long)]
    pub database: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct IngestArgs {
    /// Municipality to load (matched against the municipality field)
    #[arg(long)]
    pub city: Option<String>,

    /// Path to the SQLite lots database (created if missing)
    #[arg(long)]
    pub db: Option<PathBuf>,

    /// Mark every lot up to and including this id as already posted
    #[arg(long)]
    pub start_pin: Option<String>,

    /// Platform the start pin marks (bluesky, twitter)
    #[arg(long, default_value = "bluesky")]
    pub platform: Platform,

    /// Drop existing lots before loading
    #[arg(long)]
    pub reset: bool,
}

#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommands,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Generate example configuration file
    Init {
        /// Path to write config file
        #[arg(long, default_value = "./config.toml")]
        path: PathBuf,

        /// Overwrite existing file
        #[arg(long)]
        force: bool,
    },
}

#[derive(Args, Debug)]
pub struct DoctorArgs {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}
