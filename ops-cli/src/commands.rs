//! Subcommand handlers

use anyhow::{Context, Result};
use colored::*;
use concept_map::{
    load_concept_map, BuildReport, ConceptCatalog, LookupService, MapBuilder, MapperConfig,
    RemoteFallback,
};
use icd_service::{ClientCredentialsTokenSource, CredentialManager, IcdApiConfig, IcdSearchClient};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use crate::cli::Command;

/// ICD-11 search client and the shared credential it authenticates with.
struct IcdClients {
    search: Arc<IcdSearchClient>,
    credentials: Arc<CredentialManager>,
}

impl IcdClients {
    fn from_env() -> Result<Self> {
        let api = IcdApiConfig::from_env().context("ICD API credentials are not configured")?;
        api.validate()?;
        let source = ClientCredentialsTokenSource::new(api.clone())?;
        Ok(Self {
            search: Arc::new(IcdSearchClient::new(api)?),
            credentials: Arc::new(CredentialManager::new(Arc::new(source))),
        })
    }
}

pub async fn run(command: Command, config_path: Option<&Path>) -> Result<()> {
    let config = MapperConfig::load(config_path)?;

    match command {
        Command::Build {
            workers,
            limit,
            output,
        } => {
            let config = with_build_overrides(config, workers, limit, output)?;
            let report = build(config).await?;
            print_report(&report);
        }
        Command::Lookup { key, map, offline } => {
            let fallback = if offline { None } else { remote_fallback() };
            let service = lookup_service(&config, map.as_deref(), fallback);
            let answer = service.forward_lookup(&key).await;
            print_json(&answer)?;
        }
        Command::Reverse { code, map } => {
            let service = lookup_service(&config, map.as_deref(), None);
            print_json(&service.reverse_lookup(&code))?;
        }
        Command::Suggest { query, limit } => {
            let service = LookupService::new(
                Default::default(),
                ConceptCatalog::load(&config.sources),
                None,
            );
            print_json(&service.suggest(&query, limit))?;
        }
        Command::Stats { map } => {
            let path = map.unwrap_or_else(|| config.output_path.clone());
            let stats = load_concept_map(&path).stats();
            println!("{} {}", "Concept map:".bright_cyan(), path.display());
            println!("  elements:         {}", stats.elements.to_string().bright_white());
            println!("  targets:          {}", stats.targets.to_string().bright_white());
            println!(
                "  distinct targets: {}",
                stats.distinct_targets.to_string().bright_white()
            );
        }
    }

    Ok(())
}

/// Apply command-line overrides on top of the loaded configuration.
pub fn with_build_overrides(
    mut config: MapperConfig,
    workers: Option<usize>,
    limit: Option<usize>,
    output: Option<PathBuf>,
) -> Result<MapperConfig> {
    if let Some(workers) = workers {
        config.max_workers = workers;
    }
    if limit.is_some() {
        config.test_limit = limit;
    }
    if let Some(output) = output {
        config.output_path = output;
    }
    config.validate()?;
    Ok(config)
}

async fn build(config: MapperConfig) -> Result<BuildReport> {
    let clients = IcdClients::from_env()?;
    info!(
        output = %config.output_path.display(),
        workers = config.max_workers,
        "Building concept map"
    );

    let report = MapBuilder::new(config, clients.search, clients.credentials)
        .build()
        .await
        .context("concept map build failed")?;
    Ok(report)
}

fn remote_fallback() -> Option<RemoteFallback> {
    match IcdClients::from_env() {
        Ok(clients) => Some(RemoteFallback::new(clients.search, clients.credentials)),
        Err(e) => {
            warn!("Remote search disabled: {:#}", e);
            None
        }
    }
}

fn lookup_service(
    config: &MapperConfig,
    map: Option<&Path>,
    fallback: Option<RemoteFallback>,
) -> LookupService {
    let path = map.unwrap_or(&config.output_path);
    LookupService::new(
        load_concept_map(path),
        ConceptCatalog::load(&config.sources),
        fallback,
    )
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_report(report: &BuildReport) {
    println!("{}", "Concept map written".bright_green());
    println!("  output:     {}", report.output_path.display().to_string().bright_white());
    println!("  submitted:  {}", report.submitted);
    println!("  mapped:     {}", report.mapped.to_string().bright_green());
    println!("  skipped:    {}", report.skipped.to_string().bright_yellow());
    println!("  failed:     {}", report.failed.to_string().bright_red());
    println!("  ineligible: {}", report.ineligible);
}
