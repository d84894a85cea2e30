//! `namc-map`: operator CLI for the NAMC → ICD-11 concept map
//!
//! ```bash
//! # Build the map (ICD_CLIENT_ID / ICD_CLIENT_SECRET from the environment or .env)
//! namc-map build --workers 8
//! namc-map build --limit 25 --output /tmp/namc-sample.json
//!
//! # Query it
//! namc-map lookup "Siddha: Jaundice"
//! namc-map reverse ME20.1
//! namc-map suggest jaun --limit 10
//! namc-map stats
//! ```

pub mod cli;
pub mod commands;

pub use cli::{Cli, Command};
