use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "blockdb",
    about = "Inspect and edit a blockdb relational database",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Database URL (`sqlite:<path>` or `postgres://...`); overrides the config file
    #[arg(long, global = true)]
    pub db: Option<String>,

    /// TOML configuration file
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Command {
    /// Store a value under a key
    Put(PutArgs),
    /// Print the value stored under a key
    Get(KeyArgs),
    /// Check whether a key is present
    Has(KeyArgs),
    /// Remove a key
    Delete(KeyArgs),
    /// List keys in byte order
    Scan(ScanArgs),
    /// Report a database property
    Stat(StatArgs),
}

#[derive(Args)]
pub struct PutArgs {
    /// Hex-encoded key
    pub key: String,
    /// Hex-encoded value
    pub value: String,
}

#[derive(Args)]
pub struct KeyArgs {
    /// Hex-encoded key
    pub key: String,
}

#[derive(Args)]
pub struct ScanArgs {
    /// Hex-encoded key prefix
    #[arg(long, default_value = "")]
    pub prefix: String,
    /// Hex-encoded start position after the prefix
    #[arg(long, default_value = "")]
    pub start: String,
    #[arg(short = 'n', long, default_value = "20")]
    pub limit: usize,
    /// Print values next to keys
    #[arg(long)]
    pub values: bool,
}

#[derive(Args)]
pub struct StatArgs {
    /// Property name, e.g. `size`, `inuse` or `cache.hits`
    pub property: String,
}
