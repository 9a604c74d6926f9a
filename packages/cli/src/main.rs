#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! CLI for inspecting datasets and rendering style documents.
//!
//! ```text
//! ecosensor_cli sources
//! ecosensor_cli pollutants
//! ecosensor_cli render [--pollutant PM25] [--bbox 11.2,43.2,11.4,43.4] [--output style.json]
//! ```
//!
//! The environment is read from `ECOSENSOR_*` variables, or from the TOML
//! file given with `--config`.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use ecosensor_fetch::{EnvironmentConfig, Fetcher};
use ecosensor_layer::{BoundingBox, CategoryFilter, StyleDocument};
use ecosensor_pipeline::{Pipeline, SourceOutcome, StaticContext};
use ecosensor_sensor_models::Pollutant;

#[derive(Parser)]
#[command(
    name = "ecosensor_cli",
    about = "Inspect EcoSensor datasets and render map styles"
)]
struct Cli {
    /// TOML environment file; defaults to `ECOSENSOR_*` variables
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the datasets in the manifest
    Sources,
    /// List the selectable pollutants
    Pollutants,
    /// Run the pipeline once and write the resulting style document
    Render {
        /// Pollutant to select readings for, by code or name (e.g. `2`,
        /// `PM25`, `NO2`); defaults to PM2.5
        #[arg(long, value_parser = parse_pollutant)]
        pollutant: Option<Pollutant>,
        /// Accept any reading carrying a color or value, regardless of pollutant
        #[arg(long, conflicts_with = "pollutant")]
        any_category: bool,
        /// Viewport as `minLng,minLat,maxLng,maxLat`
        #[arg(long)]
        bbox: Option<BoundingBox>,
        /// Output file; defaults to stdout
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    pretty_env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Pollutants => {
            println!("{:<6} {:<8} DEFAULT", "CODE", "NAME");
            for pollutant in Pollutant::all() {
                let marker = if *pollutant == Pollutant::default() {
                    "*"
                } else {
                    ""
                };
                let name = pollutant.to_string();
                println!("{:<6} {name:<8} {marker}", pollutant.code());
            }
        }
        Commands::Sources => {
            let config = load_config(cli.config.as_deref())?;
            let fetcher = Fetcher::new(config)?;
            let entries = fetcher.fetch_manifest().await?;

            println!("{:<32} {:<12} {:<24} NAME", "SOURCE", "KIND", "CENTER");
            println!("{}", "-".repeat(90));
            for entry in &entries {
                let center = format!("{:.4},{:.4}", entry.center[0], entry.center[1]);
                let kind = entry.monitoring_kind.to_string();
                println!(
                    "{:<32} {kind:<12} {center:<24} {}",
                    entry.source_name(&fetcher.config().source_prefix),
                    entry.name.as_deref().unwrap_or("-"),
                );
            }
            println!("\n{} dataset(s)", entries.len());
        }
        Commands::Render {
            pollutant,
            any_category,
            bbox,
            output,
        } => {
            let config = load_config(cli.config.as_deref())?;
            let filter = if any_category {
                CategoryFilter::AnyWithValue
            } else {
                CategoryFilter::Pollutant(pollutant.unwrap_or_default())
            };
            render(config, filter, bbox, output.as_deref()).await?;
        }
    }

    Ok(())
}

fn parse_pollutant(s: &str) -> Result<Pollutant, String> {
    Pollutant::from_code_or_name(s).ok_or_else(|| format!("unknown pollutant {s:?}"))
}

fn load_config(path: Option<&Path>) -> Result<EnvironmentConfig, Box<dyn std::error::Error>> {
    let config = match path {
        Some(path) => {
            log::info!("Reading environment from {}", path.display());
            EnvironmentConfig::from_toml_str(&std::fs::read_to_string(path)?)?
        }
        None => EnvironmentConfig::from_env()?,
    };
    log::debug!("Environment: {config:?}");
    Ok(config)
}

async fn render(
    config: EnvironmentConfig,
    filter: CategoryFilter,
    bbox: Option<BoundingBox>,
    output: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    let fetcher = Fetcher::new(config.clone())?;
    let entries = fetcher.fetch_manifest().await?;

    let mut pipeline = Pipeline::new(
        Arc::new(fetcher),
        config.schema_mode(),
        &config.source_prefix,
    );
    let mut document = StyleDocument::new();
    let ctx = StaticContext::new(filter).with_viewport(bbox);

    let reports = pipeline.refresh_all(&mut document, &entries, &ctx).await;

    let mut rendered = 0;
    for report in &reports {
        match &report.outcome {
            SourceOutcome::Rendered { layers, skipped, .. } => {
                rendered += 1;
                eprintln!("  {:<32} {layers} layers ({skipped} skipped)", report.source_name);
            }
            SourceOutcome::Failed(e) => eprintln!("  {:<32} failed: {e}", report.source_name),
            SourceOutcome::Superseded | SourceOutcome::Cancelled => {}
        }
    }
    eprintln!(
        "{rendered}/{} dataset(s) rendered, {} layer(s) total",
        reports.len(),
        document.layers().len()
    );

    let json = serde_json::to_string_pretty(&document.to_style()?)?;
    match output {
        Some(path) => {
            std::fs::write(path, json)?;
            eprintln!("Wrote {}", path.display());
        }
        None => println!("{json}"),
    }

    Ok(())
}
