//! Command-line arguments for `namc-map`

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Default cap on `suggest` results
pub const DEFAULT_SUGGEST_LIMIT: usize = 50;

/// Build and query the NAMC → ICD-11 concept map
#[derive(Parser, Debug)]
#[command(name = "namc-map")]
#[command(about = "Build and query the NAMC to ICD-11 concept map", version)]
pub struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Configuration file (TOML, YAML or JSON)
    #[arg(short, long, global = true, env = "NAMC_MAP_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Command {
    /// Map every NAMC concept against ICD-11 and write the concept map
    Build {
        /// Concurrent lookup workers
        #[arg(short, long)]
        workers: Option<usize>,

        /// Process only the first N concepts
        #[arg(short, long)]
        limit: Option<usize>,

        /// Where to write the concept map
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Find ICD-11 targets for a composite key such as "Siddha: Jaundice"
    Lookup {
        key: String,

        /// Concept map to read
        #[arg(short, long)]
        map: Option<PathBuf>,

        /// Never fall back to a live ICD-11 search
        #[arg(long)]
        offline: bool,
    },

    /// List the NAMC concepts mapped onto an ICD-11 code
    Reverse {
        code: String,

        /// Concept map to read
        #[arg(short, long)]
        map: Option<PathBuf>,
    },

    /// Autocomplete NAMC concepts by display text or code
    Suggest {
        query: String,

        /// Maximum number of suggestions
        #[arg(short, long, default_value_t = DEFAULT_SUGGEST_LIMIT)]
        limit: usize,
    },

    /// Summarise a built concept map
    Stats {
        /// Concept map to read
        #[arg(short, long)]
        map: Option<PathBuf>,
    },
}
