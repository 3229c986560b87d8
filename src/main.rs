use clap::{Parser, Subcommand};
use std::path::Path;
use std::sync::Arc;
use tracing::{error, warn};

use salida_sync::apis::ticketmaster::TicketmasterImporter;
use salida_sync::config::Config;
#[cfg(feature = "db")]
use salida_sync::db::LibsqlStorage;
use salida_sync::dedupe;
use salida_sync::logging;
use salida_sync::metrics::init_metrics;
use salida_sync::pipeline::SyncPipeline;
use salida_sync::storage::{InMemoryStorage, Storage};

#[derive(Parser)]
#[command(name = "salida_sync")]
#[command(about = "External event sync and dedup for the Salida events app")]
#[command(version = "0.1.0")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch and normalize provider listings, writing a snapshot only
    Import {
        /// Cities to query (comma-separated); defaults to the configured list
        #[arg(long)]
        cities: Option<String>,
    },
    /// Fetch listings and reconcile them against the event store
    Sync {
        /// Cities to query (comma-separated); defaults to the configured list
        #[arg(long)]
        cities: Option<String>,
        /// Expose Prometheus metrics while the run is in progress
        #[arg(long)]
        metrics: bool,
        /// Use the libSQL store instead of the in-memory one
        #[arg(long)]
        db: bool,
    },
    /// Collapse near-duplicate listings in a JSON feed dump
    Dedupe {
        /// Path to a JSON file holding a listing array
        file: String,
        /// Write surviving listings here instead of stdout
        #[arg(long)]
        output: Option<String>,
    },
}

fn parse_cities(arg: Option<String>, config: &Config) -> Vec<String> {
    match arg {
        Some(list) => list.split(',').map(|s| s.trim().to_string()).collect(),
        None => config.ticketmaster.cities.clone(),
    }
}

#[cfg(feature = "db")]
async fn build_storage(use_db: bool) -> Result<Arc<dyn Storage>, Box<dyn std::error::Error>> {
    if use_db {
        println!("💽 Using libSQL storage");
        let storage = LibsqlStorage::new().await?;
        storage.run_migrations().await?;
        Ok(Arc::new(storage))
    } else {
        Ok(Arc::new(InMemoryStorage::new()))
    }
}

#[cfg(not(feature = "db"))]
async fn build_storage(use_db: bool) -> Result<Arc<dyn Storage>, Box<dyn std::error::Error>> {
    if use_db {
        return Err("The --db flag requires a build with --features db".into());
    }
    Ok(Arc::new(InMemoryStorage::new()))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();
    logging::init_logging();

    let cli = Cli::parse();
    let config = Config::load()?;
    let output_dir = "output";

    match cli.command {
        Commands::Import { cities } => {
            println!("🔄 Running import (no store writes)...");

            let cities = parse_cities(cities, &config);
            let importer = TicketmasterImporter::new(config.ticketmaster.clone());

            match SyncPipeline::import(&importer, &cities, output_dir).await {
                Ok(outcome) => {
                    println!("\n📊 Import results:");
                    println!("   Listings fetched: {}", outcome.records.len());
                    println!("   Snapshot: {}", outcome.output_file);
                }
                Err(e) => {
                    error!("Import failed: {}", e);
                    println!("❌ Import failed: {}", e);
                }
            }
        }
        Commands::Sync {
            cities,
            metrics,
            db,
        } => {
            println!("🚀 Running full sync...");

            if metrics {
                init_metrics();
            }

            let cities = parse_cities(cities, &config);
            let storage = build_storage(db).await?;
            let importer = TicketmasterImporter::new(config.ticketmaster.clone());

            match SyncPipeline::run(&importer, &cities, output_dir, storage).await {
                Ok(report) => {
                    println!("\n📊 Sync results for {}:", report.source);
                    println!("   Run id: {}", report.run_id);
                    println!("   Fetched: {}", report.fetched);
                    println!("   Created: {}", report.created);
                    println!("   Already linked: {}", report.existing);
                    println!("   Errors: {}", report.errors.len());
                    println!("   Snapshot: {}", report.output_file);

                    if !report.errors.is_empty() {
                        warn!("{} errors encountered during sync run", report.errors.len());
                        println!("\n⚠️  Errors encountered:");
                        for error in &report.errors {
                            println!("   - {}", error);
                        }
                    }
                }
                Err(e) => {
                    error!("Sync failed: {}", e);
                    println!("❌ Sync failed: {}", e);
                }
            }
        }
        Commands::Dedupe { file, output } => {
            println!("🧹 Deduplicating listings from {}...", file);

            match dedupe::read_listings(Path::new(&file)) {
                Ok(listings) => {
                    let kept = dedupe::dedupe(&listings);
                    println!("\n📊 Dedupe results:");
                    println!("   Input listings: {}", listings.len());
                    println!("   Kept: {}", kept.len());
                    println!("   Dropped: {}", listings.len() - kept.len());

                    let json = serde_json::to_string_pretty(&kept)?;
                    match output {
                        Some(path) => {
                            std::fs::write(&path, json)?;
                            println!("   Output file: {}", path);
                        }
                        None => println!("{}", json),
                    }
                }
                Err(e) => {
                    error!("Dedupe failed: {}", e);
                    println!("❌ Dedupe failed: {}", e);
                }
            }
        }
    }
    Ok(())
}
