//! The store boundary used by the ingestion engine.

use async_trait::async_trait;

use station_common::{AppendOp, MetadataUpdate, StationDocument};

use crate::error::StoreResult;

/// Document store keyed by station.
///
/// Uniqueness of the station key is enforced by the store. Each call is
/// atomic with respect to the one document it touches.
///
/// Implementations:
/// - [`PgStationStore`](crate::PgStationStore): PostgreSQL
/// - [`MemoryStationStore`](crate::MemoryStationStore): process memory
#[async_trait]
pub trait StationStore: Send + Sync {
    /// Load the persisted document for a station, if any.
    async fn find_by_key(&self, station_key: &str) -> StoreResult<Option<StationDocument>>;

    /// Insert a whole new document.
    ///
    /// Fails with `DuplicateKey` if the station already exists.
    async fn insert(&self, document: &StationDocument) -> StoreResult<()>;

    /// Apply `appends` then overwrite metadata, as one atomic change.
    ///
    /// Appends already present are skipped. Fails with `NotFound` if the
    /// station does not exist, and with `ParameterNotFound` if a period
    /// targets a parameter the station lacks.
    async fn update_metadata_and_append(
        &self,
        station_key: &str,
        update: &MetadataUpdate,
        appends: &[AppendOp],
    ) -> StoreResult<()>;

    /// Number of station documents.
    async fn count(&self) -> StoreResult<u64>;
}
