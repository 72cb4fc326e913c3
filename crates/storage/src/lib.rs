//! Persistence for station documents.
//!
//! Provides:
//! - [`StationStore`], the store boundary used by the ingestion engine
//! - [`PgStationStore`], PostgreSQL-backed documents (sqlx)
//! - [`MemoryStationStore`], process-local documents for dry runs and tests

pub mod config;
pub mod error;
pub mod memory;
pub mod postgres;
pub mod store;

pub use config::StoreConfig;
pub use error::{StoreError, StoreResult};
pub use memory::MemoryStationStore;
pub use postgres::PgStationStore;
pub use store::StationStore;
