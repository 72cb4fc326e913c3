//! In-memory station store.
//!
//! Holds documents in a map behind a tokio `RwLock`. Each trait call takes
//! the lock once, so a call is atomic for the document it touches. Used for
//! dry runs and tests.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

use station_common::{AppendOp, ApplyError, MetadataUpdate, StationDocument};

use crate::error::{StoreError, StoreResult};
use crate::store::StationStore;

/// Station store backed by process memory.
#[derive(Clone, Default)]
pub struct MemoryStationStore {
    documents: Arc<RwLock<HashMap<String, StationDocument>>>,
}

impl MemoryStationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-populated with documents.
    pub fn with_documents(documents: impl IntoIterator<Item = StationDocument>) -> Self {
        let map = documents
            .into_iter()
            .map(|doc| (doc.key.clone(), doc))
            .collect();
        Self {
            documents: Arc::new(RwLock::new(map)),
        }
    }

    /// Remove a station, as an external administrative delete would.
    pub async fn remove(&self, station_key: &str) -> Option<StationDocument> {
        self.documents.write().await.remove(station_key)
    }

    /// Copy of every stored document, ordered by key.
    pub async fn snapshot(&self) -> Vec<StationDocument> {
        let documents = self.documents.read().await;
        let mut all: Vec<_> = documents.values().cloned().collect();
        all.sort_by(|a, b| a.key.cmp(&b.key));
        all
    }
}

#[async_trait]
impl StationStore for MemoryStationStore {
    async fn find_by_key(&self, station_key: &str) -> StoreResult<Option<StationDocument>> {
        Ok(self.documents.read().await.get(station_key).cloned())
    }

    async fn insert(&self, document: &StationDocument) -> StoreResult<()> {
        let mut documents = self.documents.write().await;
        if documents.contains_key(&document.key) {
            return Err(StoreError::DuplicateKey(document.key.clone()));
        }
        debug!(station = %document.key, parameters = document.parameter_count(), "Inserted station");
        documents.insert(document.key.clone(), document.clone());
        Ok(())
    }

    async fn update_metadata_and_append(
        &self,
        station_key: &str,
        update: &MetadataUpdate,
        appends: &[AppendOp],
    ) -> StoreResult<()> {
        let mut documents = self.documents.write().await;
        let stored = documents
            .get_mut(station_key)
            .ok_or_else(|| StoreError::NotFound(station_key.to_string()))?;

        // Work on a copy so a failed append leaves the document untouched.
        let mut next = stored.clone();
        next.apply(update, appends).map_err(|e| match e {
            ApplyError::MissingParameter(parameter) => StoreError::ParameterNotFound {
                station: station_key.to_string(),
                parameter,
            },
        })?;
        *stored = next;
        Ok(())
    }

    async fn count(&self) -> StoreResult<u64> {
        Ok(self.documents.read().await.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use station_common::{ParameterBlock, PeriodBlock, StationMetadata};

    fn period(day: u32) -> PeriodBlock {
        PeriodBlock {
            key: "latest-hour".to_string(),
            from: Utc.with_ymd_and_hms(2024, 1, day, 0, 0, 0).unwrap(),
            to: Utc.with_ymd_and_hms(2024, 1, day, 1, 0, 0).unwrap(),
            summary: String::new(),
            sampling: String::new(),
            values: vec![],
        }
    }

    fn document(key: &str) -> StationDocument {
        let mut doc = StationDocument::new(
            key,
            StationMetadata {
                name: "Abisko Aut".to_string(),
                ..Default::default()
            },
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        );
        doc.parameters.push(ParameterBlock {
            key: "1".to_string(),
            name: "Lufttemperatur".to_string(),
            summary: String::new(),
            unit: "degree celsius".to_string(),
            periods: vec![period(1)],
        });
        doc
    }

    fn update(name: &str) -> MetadataUpdate {
        MetadataUpdate {
            metadata: StationMetadata {
                name: name.to_string(),
                ..Default::default()
            },
            last_updated: Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap(),
        }
    }

    #[tokio::test]
    async fn test_insert_and_find() {
        let store = MemoryStationStore::new();
        assert!(store.find_by_key("188790").await.unwrap().is_none());

        store.insert(&document("188790")).await.unwrap();
        let found = store.find_by_key("188790").await.unwrap().unwrap();
        assert_eq!(found, document("188790"));
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_insert_duplicate_key() {
        let store = MemoryStationStore::with_documents([document("188790")]);
        let err = store.insert(&document("188790")).await.unwrap_err();
        assert!(matches!(err, StoreError::DuplicateKey(key) if key == "188790"));
    }

    #[tokio::test]
    async fn test_update_missing_station() {
        let store = MemoryStationStore::new();
        let err = store
            .update_metadata_and_append("188790", &update("x"), &[])
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_failed_append_leaves_document_untouched() {
        let store = MemoryStationStore::with_documents([document("188790")]);
        let appends = [AppendOp::AppendPeriod {
            parameter_key: "2".to_string(),
            period: period(2),
        }];

        let err = store
            .update_metadata_and_append("188790", &update("Renamed"), &appends)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::ParameterNotFound { .. }));

        let stored = store.find_by_key("188790").await.unwrap().unwrap();
        assert_eq!(stored.metadata.name, "Abisko Aut");
    }

    #[tokio::test]
    async fn test_update_appends_and_sets_metadata() {
        let store = MemoryStationStore::with_documents([document("188790")]);
        let appends = [AppendOp::AppendPeriod {
            parameter_key: "1".to_string(),
            period: period(2),
        }];

        store
            .update_metadata_and_append("188790", &update("Renamed"), &appends)
            .await
            .unwrap();
        // Re-applying is a no-op for the append.
        store
            .update_metadata_and_append("188790", &update("Renamed"), &appends)
            .await
            .unwrap();

        let stored = store.find_by_key("188790").await.unwrap().unwrap();
        assert_eq!(stored.metadata.name, "Renamed");
        assert_eq!(stored.period_count(), 2);
    }
}
