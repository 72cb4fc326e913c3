//! Store races and fatal store errors.

mod common;

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use common::{day, input, snapshot, STATION};
use ingestion::{aggregate_at, parse_snapshot_value, Ingester, IngestionError};
use station_common::{AppendOp, MetadataUpdate, StationDocument};
use storage::{MemoryStationStore, StationStore, StoreError, StoreResult};

fn document(parameter: &str, from_day: u32) -> StationDocument {
    let record = parse_snapshot_value(snapshot(STATION, parameter, from_day, "1.0")).unwrap();
    aggregate_at(vec![record], day(20))
        .remove(STATION)
        .unwrap()
        .unwrap()
}

/// Hides the stored document from the first lookup, as if another writer
/// inserted it between our read and our insert.
struct LateInsertStore {
    inner: MemoryStationStore,
    hidden: AtomicBool,
}

#[async_trait]
impl StationStore for LateInsertStore {
    async fn find_by_key(&self, key: &str) -> StoreResult<Option<StationDocument>> {
        if self.hidden.swap(false, Ordering::SeqCst) {
            return Ok(None);
        }
        self.inner.find_by_key(key).await
    }

    async fn insert(&self, document: &StationDocument) -> StoreResult<()> {
        self.inner.insert(document).await
    }

    async fn update_metadata_and_append(
        &self,
        key: &str,
        update: &MetadataUpdate,
        appends: &[AppendOp],
    ) -> StoreResult<()> {
        self.inner.update_metadata_and_append(key, update, appends).await
    }

    async fn count(&self) -> StoreResult<u64> {
        self.inner.count().await
    }
}

/// Returns a stale document from lookups although the station is gone.
struct StaleReadStore {
    inner: MemoryStationStore,
    stale: StationDocument,
    lookups: AtomicUsize,
}

#[async_trait]
impl StationStore for StaleReadStore {
    async fn find_by_key(&self, _key: &str) -> StoreResult<Option<StationDocument>> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        Ok(Some(self.stale.clone()))
    }

    async fn insert(&self, document: &StationDocument) -> StoreResult<()> {
        self.inner.insert(document).await
    }

    async fn update_metadata_and_append(
        &self,
        key: &str,
        update: &MetadataUpdate,
        appends: &[AppendOp],
    ) -> StoreResult<()> {
        self.inner.update_metadata_and_append(key, update, appends).await
    }

    async fn count(&self) -> StoreResult<u64> {
        self.inner.count().await
    }
}

struct DownStore;

#[async_trait]
impl StationStore for DownStore {
    async fn find_by_key(&self, _key: &str) -> StoreResult<Option<StationDocument>> {
        Err(StoreError::Unavailable("connection refused".to_string()))
    }

    async fn insert(&self, _document: &StationDocument) -> StoreResult<()> {
        Err(StoreError::Unavailable("connection refused".to_string()))
    }

    async fn update_metadata_and_append(
        &self,
        _key: &str,
        _update: &MetadataUpdate,
        _appends: &[AppendOp],
    ) -> StoreResult<()> {
        Err(StoreError::Unavailable("connection refused".to_string()))
    }

    async fn count(&self) -> StoreResult<u64> {
        Err(StoreError::Unavailable("connection refused".to_string()))
    }
}

#[tokio::test]
async fn lost_insert_race_falls_back_to_update() {
    let store = Arc::new(LateInsertStore {
        inner: MemoryStationStore::with_documents([document("1", 1)]),
        hidden: AtomicBool::new(true),
    });

    let summary = Ingester::new(store.clone())
        .run([input(snapshot(STATION, "1", 2, "2.0"))])
        .await
        .unwrap();

    assert_eq!(summary.stations_updated, 1);
    assert!(summary.is_clean());

    let stored = store.find_by_key(STATION).await.unwrap().unwrap();
    assert_eq!(stored.parameter_count(), 1);
    assert_eq!(stored.period_count(), 2);
}

#[tokio::test]
async fn vanished_station_is_inserted_again() {
    let store = Arc::new(StaleReadStore {
        inner: MemoryStationStore::new(),
        stale: document("1", 1),
        lookups: AtomicUsize::new(0),
    });

    let summary = Ingester::new(store.clone())
        .run([input(snapshot(STATION, "1", 2, "2.0"))])
        .await
        .unwrap();

    assert_eq!(summary.stations_inserted, 1);
    assert_eq!(store.lookups.load(Ordering::SeqCst), 1);

    let stored = store.inner.find_by_key(STATION).await.unwrap().unwrap();
    assert_eq!(stored.period_count(), 1);
    assert_eq!(stored.parameters[0].periods[0].from, day(2));
}

#[tokio::test]
async fn unavailable_store_aborts_the_run() {
    let result = Ingester::new(Arc::new(DownStore))
        .run([
            input(snapshot("1", "1", 1, "1.0")),
            input(snapshot("2", "1", 1, "1.0")),
        ])
        .await;

    match result {
        Err(IngestionError::Aborted { processed, source }) => {
            assert_eq!(processed, 0);
            assert!(source.is_fatal());
        }
        other => panic!("expected abort, got {:?}", other.map(|s| s.stations_processed())),
    }
}

#[tokio::test]
async fn trait_object_store_is_accepted() {
    let store: Arc<dyn StationStore> = Arc::new(MemoryStationStore::new());
    let summary = Ingester::new(store.clone())
        .run([input(snapshot(STATION, "7", 3, "0.5"))])
        .await
        .unwrap();

    assert_eq!(summary.stations_inserted, 1);
    assert_eq!(store.count().await.unwrap(), 1);
}
