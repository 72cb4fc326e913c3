//! Snapshot sources: local directories and the upstream observation API.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use reqwest::{Client, StatusCode};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, instrument, warn};
use walkdir::WalkDir;

use ingestion::SnapshotInput;

use crate::config::ApiConfig;

/// Parallel requests issued by [`ApiSource`].
const FETCH_CONCURRENCY: usize = 8;

/// Something that yields raw snapshot documents for one run.
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    /// Short description for logs.
    fn describe(&self) -> String;

    /// Collect every snapshot currently available.
    ///
    /// Individual unreadable snapshots are logged and skipped; an error means
    /// the source as a whole could not be read.
    async fn fetch(&self) -> Result<Vec<SnapshotInput>>;
}

/// Reads every `*.json` file under a directory, one snapshot per file.
pub struct DirectorySource {
    root: PathBuf,
}

impl DirectorySource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl SnapshotSource for DirectorySource {
    fn describe(&self) -> String {
        format!("directory {}", self.root.display())
    }

    #[instrument(skip(self), fields(root = %self.root.display()))]
    async fn fetch(&self) -> Result<Vec<SnapshotInput>> {
        let root = self.root.clone();
        let inputs = tokio::task::spawn_blocking(move || read_snapshot_dir(&root))
            .await
            .context("Snapshot directory reader panicked")??;

        info!(count = inputs.len(), "Read snapshot files");
        Ok(inputs)
    }
}

fn read_snapshot_dir(root: &Path) -> Result<Vec<SnapshotInput>> {
    if !root.is_dir() {
        return Err(anyhow!("Snapshot directory {:?} does not exist", root));
    }

    let mut paths: Vec<PathBuf> = WalkDir::new(root)
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!(error = %e, "Skipping unreadable directory entry");
                None
            }
        })
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| path.extension().is_some_and(|ext| ext == "json"))
        .collect();
    paths.sort();

    let mut inputs = Vec::with_capacity(paths.len());
    for path in paths {
        match std::fs::read_to_string(&path) {
            Ok(body) => inputs.push(SnapshotInput::new(path.display().to_string(), body)),
            Err(e) => warn!(path = %path.display(), error = %e, "Skipping unreadable snapshot"),
        }
    }
    Ok(inputs)
}

/// Fetches the latest data document for every station and parameter pair.
pub struct ApiSource {
    client: Client,
    base_url: String,
    stations: Vec<String>,
    parameters: Vec<String>,
    period: String,
}

impl ApiSource {
    pub fn new(config: &ApiConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(config.user_agent.clone())
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            stations: config.stations.clone(),
            parameters: config.parameters.clone(),
            period: config.period.clone(),
        })
    }

    /// Replace the configured station list.
    pub fn with_stations(mut self, stations: Vec<String>) -> Self {
        self.stations = stations;
        self
    }

    fn data_url(&self, station: &str, parameter: &str) -> String {
        format!(
            "{}/parameter/{}/station/{}/period/{}/data.json",
            self.base_url, parameter, station, self.period
        )
    }

    /// `Ok(None)` when the station does not measure the parameter.
    async fn fetch_one(&self, station: &str, parameter: &str) -> Result<Option<SnapshotInput>> {
        let url = self.data_url(station, parameter);
        debug!(url = %url, "Fetching snapshot");

        let response = self.client.get(&url).send().await?;

        if response.status() == StatusCode::NOT_FOUND {
            debug!(station = %station, parameter = %parameter, "No data for station/parameter");
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(anyhow!("GET {} failed: {}", url, response.status()));
        }

        let body = response.text().await?;
        Ok(Some(SnapshotInput::new(url, body)))
    }
}

#[async_trait]
impl SnapshotSource for ApiSource {
    fn describe(&self) -> String {
        format!("api {} ({})", self.base_url, self.period)
    }

    #[instrument(skip(self), fields(stations = self.stations.len(), parameters = self.parameters.len()))]
    async fn fetch(&self) -> Result<Vec<SnapshotInput>> {
        if self.stations.is_empty() {
            return Err(anyhow!("No stations configured for API fetch"));
        }

        let pairs: Vec<(String, String)> = self
            .stations
            .iter()
            .flat_map(|s| self.parameters.iter().map(move |p| (s.clone(), p.clone())))
            .collect();

        let results: Vec<_> = stream::iter(pairs)
            .map(|(station, parameter)| async move {
                let result = self.fetch_one(&station, &parameter).await;
                (station, parameter, result)
            })
            .buffer_unordered(FETCH_CONCURRENCY)
            .collect()
            .await;

        let mut inputs = Vec::new();
        for (station, parameter, result) in results {
            match result {
                Ok(Some(input)) => inputs.push(input),
                Ok(None) => {}
                Err(e) => {
                    warn!(station = %station, parameter = %parameter, error = %e, "Fetch failed, skipping")
                }
            }
        }

        info!(count = inputs.len(), "Fetched snapshots");
        Ok(inputs)
    }
}
