//! Station observation ingester.
//!
//! Reads observation snapshots from a directory or the upstream API and
//! merges them into the station store, one document per station.

mod config;
mod sources;

use anyhow::{Context, Result};
use clap::{ArgGroup, Parser, ValueEnum};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use config::IngesterConfig;
use ingestion::{Ingester, IngestionError};
use sources::{ApiSource, DirectorySource, SnapshotSource};
use storage::{MemoryStationStore, PgStationStore, StationStore};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Parser, Debug)]
#[command(name = "ingester")]
#[command(about = "Merge station observation snapshots into the station store")]
#[command(group(ArgGroup::new("source").required(true).args(["snapshot_dir", "fetch"])))]
struct Args {
    /// Configuration file path (environment variables are used when omitted)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Ingest every *.json snapshot under this directory
    #[arg(long)]
    snapshot_dir: Option<PathBuf>,

    /// Fetch snapshots from the upstream API
    #[arg(long)]
    fetch: bool,

    /// Station key to fetch (repeatable, overrides configured stations)
    #[arg(long = "station")]
    stations: Vec<String>,

    /// Use an in-memory store; nothing is persisted
    #[arg(long)]
    dry_run: bool,

    /// Stations processed concurrently
    #[arg(long, default_value_t = 4)]
    concurrency: usize,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    dotenvy::dotenv().ok();
    init_tracing(&args.log_level, args.log_format)?;

    info!("Starting station ingester");

    let config = match &args.config {
        Some(path) => IngesterConfig::from_yaml(path)?,
        None => IngesterConfig::from_env()?,
    };

    let source: Box<dyn SnapshotSource> = match &args.snapshot_dir {
        Some(dir) => Box::new(DirectorySource::new(dir)),
        None => {
            let mut source = ApiSource::new(&config.api)?;
            if !args.stations.is_empty() {
                source = source.with_stations(args.stations.clone());
            }
            Box::new(source)
        }
    };

    let store: Arc<dyn StationStore> = if args.dry_run {
        warn!("Dry run: using in-memory store, nothing will be persisted");
        Arc::new(MemoryStationStore::new())
    } else {
        let store = PgStationStore::connect(&config.store)
            .await
            .context("Failed to connect to station store")?;
        store
            .migrate()
            .await
            .context("Failed to migrate station store schema")?;
        Arc::new(store)
    };

    info!(source = %source.describe(), "Collecting snapshots");
    let inputs = source.fetch().await?;

    let ingester = Ingester::new(store.clone()).with_concurrency(args.concurrency);
    let summary = match ingester.run(inputs).await {
        Ok(summary) => summary,
        Err(e @ IngestionError::Aborted { .. }) => {
            error!(error = %e, "Ingestion aborted");
            return Err(e.into());
        }
    };

    for failure in &summary.failures {
        warn!(
            stage = ?failure.stage,
            subject = %failure.subject,
            message = %failure.message,
            "Run failure"
        );
    }

    let stored = stored_count(store.as_ref()).await;
    info!(
        records = summary.records_read,
        rejected = summary.records_rejected,
        stations = summary.stations_processed(),
        stored = ?stored,
        "Ingestion finished"
    );
    println!(
        "read {} record(s), rejected {}; stations: {} inserted, {} updated, {} unchanged, {} failed",
        summary.records_read,
        summary.records_rejected,
        summary.stations_inserted,
        summary.stations_updated,
        summary.stations_unchanged,
        summary.stations_failed,
    );

    Ok(())
}

/// Stations in the store after the run, `None` when the store cannot say.
async fn stored_count(store: &dyn StationStore) -> Option<u64> {
    match store.count().await {
        Ok(count) => Some(count),
        Err(e) => {
            warn!(error = %e, "Could not count stored stations");
            None
        }
    }
}

fn init_tracing(log_level: &str, format: LogFormat) -> Result<()> {
    let level = match log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let builder = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true);

    match format {
        LogFormat::Json => {
            tracing::subscriber::set_global_default(builder.json().with_thread_ids(true).finish())?
        }
        LogFormat::Text => tracing::subscriber::set_global_default(builder.finish())?,
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    struct UncountableStore;

    #[async_trait::async_trait]
    impl StationStore for UncountableStore {
        async fn find_by_key(
            &self,
            _station_key: &str,
        ) -> storage::StoreResult<Option<station_common::StationDocument>> {
            Ok(None)
        }

        async fn insert(&self, _document: &station_common::StationDocument) -> storage::StoreResult<()> {
            Ok(())
        }

        async fn update_metadata_and_append(
            &self,
            _station_key: &str,
            _update: &station_common::MetadataUpdate,
            _appends: &[station_common::AppendOp],
        ) -> storage::StoreResult<()> {
            Ok(())
        }

        async fn count(&self) -> storage::StoreResult<u64> {
            Err(storage::StoreError::Unavailable("connection reset".to_string()))
        }
    }

    #[tokio::test]
    async fn test_stored_count() {
        assert_eq!(stored_count(&MemoryStationStore::new()).await, Some(0));
        assert_eq!(stored_count(&UncountableStore).await, None);
    }

    #[test]
    fn test_args_are_consistent() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_source_is_required() {
        assert!(Args::try_parse_from(["ingester"]).is_err());
        assert!(Args::try_parse_from(["ingester", "--snapshot-dir", "a", "--fetch"]).is_err());
    }

    #[test]
    fn test_repeated_stations() {
        let args = Args::try_parse_from([
            "ingester",
            "--fetch",
            "--station",
            "188790",
            "--station",
            "98210",
            "--log-format",
            "json",
            "--dry-run",
        ])
        .unwrap();

        assert_eq!(args.stations, vec!["188790", "98210"]);
        assert!(args.dry_run);
        assert!(matches!(args.log_format, LogFormat::Json));
        assert_eq!(args.concurrency, 4);
    }
}
