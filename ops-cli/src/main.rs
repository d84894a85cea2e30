use clap::Parser;
use colored::*;
use std::env;
use tracing::Level;
use tracing_subscriber::{
    fmt::{self, time::ChronoUtc},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

use namc_cli::{commands, Cli};

#[tokio::main]
async fn main() {
    // .env is optional
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(e) = commands::run(cli.command, cli.config.as_deref()).await {
        eprintln!("{} {:#}", "error:".bright_red().bold(), e);
        std::process::exit(1);
    }
}

fn init_tracing(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let use_colors = env::var("NO_COLOR").is_err() && atty::is(atty::Stream::Stderr);

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!(
            "namc_map={level},namc_cli={level},concept_map={level},icd_service={level},reqwest=info"
        )
        .into()
    });

    if use_colors {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(verbose)
                    .with_timer(ChronoUtc::rfc_3339())
                    .with_ansi(true),
            )
            .init();
    } else {
        // Structured JSON logging when not attached to a terminal
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(false)
                    .with_timer(ChronoUtc::rfc_3339())
                    .with_ansi(false)
                    .json(),
            )
            .init();
    }
}
