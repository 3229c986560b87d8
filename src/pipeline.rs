use crate::error::Result;
use crate::resolver::{IdentityResolver, Resolution};
use crate::storage::Storage;
use crate::types::{EventSource, ExternalEventRecord};
use chrono::{DateTime, Utc};
use metrics::{counter, histogram};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, error, info, instrument};
use uuid::Uuid;

/// One run's worth of normalized listings, as written to disk.
#[derive(Debug, Serialize, Deserialize)]
pub struct Snapshot {
    pub run_id: Uuid,
    pub source: String,
    pub generated_at: DateTime<Utc>,
    pub records: Vec<ExternalEventRecord>,
}

/// Result of an import-only run (no store involved).
#[derive(Debug)]
pub struct ImportOutcome {
    pub records: Vec<ExternalEventRecord>,
    pub output_file: String,
}

/// Result of a complete sync run.
#[derive(Debug, Serialize)]
pub struct SyncReport {
    pub run_id: Uuid,
    pub source: String,
    pub fetched: usize,
    pub created: usize,
    pub existing: usize,
    pub errors: Vec<String>,
    pub output_file: String,
}

pub struct SyncPipeline;

impl SyncPipeline {
    /// Fetch and normalize listings and write a snapshot, without touching
    /// the store.
    #[instrument(skip(source), fields(source_name = %source.source_name()))]
    pub async fn import(
        source: &dyn EventSource,
        cities: &[String],
        output_dir: &str,
    ) -> Result<ImportOutcome> {
        let run_id = Uuid::new_v4();
        let source_name = source.source_name().to_string();
        info!("🚀 Starting import run {} for {}", run_id, source_name);
        println!("🚀 Starting import run {} for {}", run_id, source_name);

        info!("📡 Fetching listings for {} cities...", cities.len());
        println!("📡 Fetching listings for {} cities...", cities.len());
        let records = source.fetch_cities(cities).await;
        info!("✅ Fetched {} listings", records.len());
        println!("✅ Fetched {} listings", records.len());

        let output_file = Self::persist_snapshot(run_id, &source_name, &records, output_dir)?;
        info!("💾 Saved snapshot to {}", output_file);
        println!("💾 Saved snapshot to {}", output_file);

        Ok(ImportOutcome {
            records,
            output_file,
        })
    }

    /// Run a complete sync: fetch, snapshot, then resolve every record
    /// against the store. Per-record failures are collected in the report
    /// rather than aborting the run.
    #[instrument(skip(source, storage), fields(source_name = %source.source_name()))]
    pub async fn run(
        source: &dyn EventSource,
        cities: &[String],
        output_dir: &str,
        storage: Arc<dyn Storage>,
    ) -> Result<SyncReport> {
        let run_id = Uuid::new_v4();
        let source_name = source.source_name().to_string();
        info!("🚀 Starting sync run {} for {}", run_id, source_name);
        println!("🚀 Starting sync run {} for {}", run_id, source_name);
        counter!("salida_sync_runs_total", "source" => source_name.clone()).increment(1);
        let t_run = std::time::Instant::now();

        info!("📡 Fetching listings for {} cities...", cities.len());
        println!("📡 Fetching listings for {} cities...", cities.len());
        let t_fetch = std::time::Instant::now();
        let records = source.fetch_cities(cities).await;
        let fetch_secs = t_fetch.elapsed().as_secs_f64();
        histogram!("salida_fetch_duration_seconds", "source" => source_name.clone())
            .record(fetch_secs);
        info!("✅ Fetched {} listings", records.len());
        println!("✅ Fetched {} listings", records.len());
        histogram!("salida_records_per_run", "source" => source_name.clone())
            .record(records.len() as f64);

        let output_file = Self::persist_snapshot(run_id, &source_name, &records, output_dir)?;
        info!("💾 Saved snapshot to {}", output_file);
        println!("💾 Saved snapshot to {}", output_file);

        info!("🔗 Resolving listings against the store...");
        println!("🔗 Resolving listings against the store...");
        let resolver = IdentityResolver::new(storage);
        let mut created = 0;
        let mut existing = 0;
        let mut errors = Vec::new();

        for (i, record) in records.iter().enumerate() {
            match resolver.resolve(record).await {
                Ok(Resolution::Created(_)) => created += 1,
                Ok(Resolution::Existing(_)) => existing += 1,
                Err(e) => {
                    let error_msg = format!(
                        "Failed to resolve {}:{}: {}",
                        record.source, record.external_id, e
                    );
                    error!("Resolution failed for record {}: {}", i, e);
                    errors.push(error_msg);
                }
            }
            if (i + 1) % 25 == 0 {
                debug!("Resolved {}/{} listings", i + 1, records.len());
                println!("   Resolved {}/{} listings", i + 1, records.len());
            }
        }

        info!(
            "✅ Resolved {} listings ({} created, {} already linked, {} errors)",
            records.len(),
            created,
            existing,
            errors.len()
        );
        println!(
            "✅ Resolved {} listings ({} created, {} already linked, {} errors)",
            records.len(),
            created,
            existing,
            errors.len()
        );
        counter!("salida_events_created_total", "source" => source_name.clone())
            .increment(created as u64);
        counter!("salida_events_existing_total", "source" => source_name.clone())
            .increment(existing as u64);
        counter!("salida_sync_errors_total", "source" => source_name.clone())
            .increment(errors.len() as u64);

        let total_secs = t_run.elapsed().as_secs_f64();
        histogram!("salida_sync_duration_seconds", "source" => source_name.clone())
            .record(total_secs);

        Ok(SyncReport {
            run_id,
            source: source_name,
            fetched: records.len(),
            created,
            existing,
            errors,
            output_file,
        })
    }

    /// Persist a run snapshot to a timestamped JSON file.
    fn persist_snapshot(
        run_id: Uuid,
        source: &str,
        records: &[ExternalEventRecord],
        output_dir: &str,
    ) -> Result<String> {
        fs::create_dir_all(output_dir)?;

        let timestamp = Utc::now().format("%Y%m%d_%H%M%S");
        let filename = format!("{source}_{timestamp}.json");
        let filepath = Path::new(output_dir).join(&filename);

        let snapshot = Snapshot {
            run_id,
            source: source.to_string(),
            generated_at: Utc::now(),
            records: records.to_vec(),
        };
        let json_content = serde_json::to_string_pretty(&snapshot)?;
        fs::write(&filepath, json_content)?;

        Ok(filepath.to_string_lossy().to_string())
    }
}
