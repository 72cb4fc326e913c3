//! Station store on PostgreSQL.
//!
//! Documents are normalised over three tables: `stations` (one row per
//! station key, metadata columns), `station_parameters` and
//! `parameter_periods` (samples as JSONB). Primary keys carry the
//! uniqueness rules: station key, `(station, parameter)` and
//! `(station, parameter, period key, period from)`, so appends are plain
//! `INSERT ... ON CONFLICT DO NOTHING` and never rewrite stored history.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgPoolOptions, types::Json, FromRow, PgConnection, PgPool};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info, instrument};

use station_common::{
    AppendOp, MetadataUpdate, ParameterBlock, PeriodBlock, Sample, StationDocument,
    StationMetadata,
};

use crate::config::StoreConfig;
use crate::error::{StoreError, StoreResult};
use crate::store::StationStore;

/// PostgreSQL connection pool and station document operations.
pub struct PgStationStore {
    pool: PgPool,
}

impl PgStationStore {
    /// Connect using the given configuration.
    pub async fn connect(config: &StoreConfig) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
            .connect(&config.database_url)
            .await
            .map_err(|e| StoreError::Unavailable(format!("Connection failed: {}", e)))?;

        info!(max_connections = config.max_connections, "Connected to station store");
        Ok(Self { pool })
    }

    /// Wrap an existing pool.
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create tables and indexes if they do not exist.
    pub async fn migrate(&self) -> StoreResult<()> {
        for statement in SCHEMA_SQL.split(';') {
            let trimmed = statement.trim();
            if !trimmed.is_empty() {
                sqlx::query(trimmed).execute(&self.pool).await?;
            }
        }

        Ok(())
    }
}

#[async_trait]
impl StationStore for PgStationStore {
    #[instrument(skip(self))]
    async fn find_by_key(&self, station_key: &str) -> StoreResult<Option<StationDocument>> {
        let mut tx = self.pool.begin().await?;
        // All three reads must see the same committed state.
        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ")
            .execute(&mut *tx)
            .await?;

        let station = sqlx::query_as::<_, StationRow>(
            "SELECT key, name, owner, owner_category, measuring_stations, \
             height, latitude, longitude, last_updated \
             FROM stations WHERE key = $1",
        )
        .bind(station_key)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(station) = station else {
            tx.commit().await?;
            return Ok(None);
        };

        let parameters = sqlx::query_as::<_, ParameterRow>(
            "SELECT key, name, summary, unit FROM station_parameters \
             WHERE station_key = $1 ORDER BY ordinal",
        )
        .bind(station_key)
        .fetch_all(&mut *tx)
        .await?;

        let periods = sqlx::query_as::<_, PeriodRow>(
            "SELECT parameter_key, key, period_from, period_to, summary, sampling, samples \
             FROM parameter_periods WHERE station_key = $1 ORDER BY ordinal",
        )
        .bind(station_key)
        .fetch_all(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(Some(assemble(station, parameters, periods)))
    }

    #[instrument(skip(self, document), fields(station = %document.key))]
    async fn insert(&self, document: &StationDocument) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;

        let meta = &document.metadata;
        sqlx::query(
            r#"
            INSERT INTO stations (
                key, name, owner, owner_category, measuring_stations,
                height, latitude, longitude, last_updated
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(&document.key)
        .bind(&meta.name)
        .bind(&meta.owner)
        .bind(&meta.owner_category)
        .bind(&meta.measuring_stations)
        .bind(meta.height)
        .bind(meta.latitude)
        .bind(meta.longitude)
        .bind(document.last_updated)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(db) = &e {
                if db.is_unique_violation() {
                    return StoreError::DuplicateKey(document.key.clone());
                }
            }
            StoreError::from(e)
        })?;

        for parameter in &document.parameters {
            insert_parameter(&mut *tx, &document.key, parameter).await?;
        }

        tx.commit().await?;

        debug!(
            parameters = document.parameter_count(),
            periods = document.period_count(),
            "Inserted station"
        );
        Ok(())
    }

    #[instrument(skip(self, update, appends), fields(appends = appends.len()))]
    async fn update_metadata_and_append(
        &self,
        station_key: &str,
        update: &MetadataUpdate,
        appends: &[AppendOp],
    ) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;

        // Row lock serialises concurrent writers on the same station.
        let locked: Option<String> =
            sqlx::query_scalar("SELECT key FROM stations WHERE key = $1 FOR UPDATE")
                .bind(station_key)
                .fetch_optional(&mut *tx)
                .await?;

        if locked.is_none() {
            return Err(StoreError::NotFound(station_key.to_string()));
        }

        for op in appends {
            match op {
                AppendOp::AppendParameter(block) => {
                    insert_parameter(&mut *tx, station_key, block).await?;
                }
                AppendOp::AppendPeriod {
                    parameter_key,
                    period,
                } => {
                    insert_period(&mut *tx, station_key, parameter_key, period).await?;
                }
            }
        }

        let meta = &update.metadata;
        sqlx::query(
            r#"
            UPDATE stations SET
                name = $2,
                owner = $3,
                owner_category = $4,
                measuring_stations = $5,
                height = $6,
                latitude = $7,
                longitude = $8,
                last_updated = $9
            WHERE key = $1
            "#,
        )
        .bind(station_key)
        .bind(&meta.name)
        .bind(&meta.owner)
        .bind(&meta.owner_category)
        .bind(&meta.measuring_stations)
        .bind(meta.height)
        .bind(meta.latitude)
        .bind(meta.longitude)
        .bind(update.last_updated)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn count(&self) -> StoreResult<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM stations")
            .fetch_one(&self.pool)
            .await?;
        Ok(count as u64)
    }
}

/// Insert a parameter and its periods, skipping whatever already exists.
async fn insert_parameter(
    conn: &mut PgConnection,
    station_key: &str,
    block: &ParameterBlock,
) -> StoreResult<()> {
    sqlx::query(
        r#"
        INSERT INTO station_parameters (station_key, key, name, summary, unit)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (station_key, key) DO NOTHING
        "#,
    )
    .bind(station_key)
    .bind(&block.key)
    .bind(&block.name)
    .bind(&block.summary)
    .bind(&block.unit)
    .execute(&mut *conn)
    .await?;

    for period in &block.periods {
        insert_period(&mut *conn, station_key, &block.key, period).await?;
    }

    Ok(())
}

async fn insert_period(
    conn: &mut PgConnection,
    station_key: &str,
    parameter_key: &str,
    period: &PeriodBlock,
) -> StoreResult<()> {
    sqlx::query(
        r#"
        INSERT INTO parameter_periods (
            station_key, parameter_key, key, period_from, period_to,
            summary, sampling, samples
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        ON CONFLICT (station_key, parameter_key, key, period_from) DO NOTHING
        "#,
    )
    .bind(station_key)
    .bind(parameter_key)
    .bind(&period.key)
    .bind(period.from)
    .bind(period.to)
    .bind(&period.summary)
    .bind(&period.sampling)
    .bind(Json(&period.values))
    .execute(&mut *conn)
    .await
    .map_err(|e| {
        if let sqlx::Error::Database(db) = &e {
            if db.is_foreign_key_violation() {
                return StoreError::ParameterNotFound {
                    station: station_key.to_string(),
                    parameter: parameter_key.to_string(),
                };
            }
        }
        StoreError::from(e)
    })?;

    Ok(())
}

/// Rebuild a document from its rows, keeping insertion order.
fn assemble(
    station: StationRow,
    parameters: Vec<ParameterRow>,
    periods: Vec<PeriodRow>,
) -> StationDocument {
    let mut by_parameter: HashMap<String, Vec<PeriodBlock>> = HashMap::new();
    for row in periods {
        by_parameter
            .entry(row.parameter_key)
            .or_default()
            .push(PeriodBlock {
                key: row.key,
                from: row.period_from,
                to: row.period_to,
                summary: row.summary,
                sampling: row.sampling,
                values: row.samples.0,
            });
    }

    let parameters = parameters
        .into_iter()
        .map(|row| ParameterBlock {
            periods: by_parameter.remove(&row.key).unwrap_or_default(),
            key: row.key,
            name: row.name,
            summary: row.summary,
            unit: row.unit,
        })
        .collect();

    StationDocument {
        key: station.key,
        metadata: StationMetadata {
            name: station.name,
            owner: station.owner,
            owner_category: station.owner_category,
            measuring_stations: station.measuring_stations,
            height: station.height,
            latitude: station.latitude,
            longitude: station.longitude,
        },
        last_updated: station.last_updated,
        parameters,
    }
}

#[derive(FromRow)]
struct StationRow {
    key: String,
    name: String,
    owner: String,
    owner_category: String,
    measuring_stations: String,
    height: Option<f64>,
    latitude: Option<f64>,
    longitude: Option<f64>,
    last_updated: DateTime<Utc>,
}

#[derive(FromRow)]
struct ParameterRow {
    key: String,
    name: String,
    summary: String,
    unit: String,
}

#[derive(FromRow)]
struct PeriodRow {
    parameter_key: String,
    key: String,
    period_from: DateTime<Utc>,
    period_to: DateTime<Utc>,
    summary: String,
    sampling: String,
    samples: Json<Vec<Sample>>,
}

/// Database schema SQL.
const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS stations (
    key TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    owner TEXT NOT NULL,
    owner_category TEXT NOT NULL,
    measuring_stations TEXT NOT NULL,
    height DOUBLE PRECISION,
    latitude DOUBLE PRECISION,
    longitude DOUBLE PRECISION,
    last_updated TIMESTAMPTZ NOT NULL
);

CREATE TABLE IF NOT EXISTS station_parameters (
    station_key TEXT NOT NULL REFERENCES stations(key) ON DELETE CASCADE,
    key TEXT NOT NULL,
    name TEXT NOT NULL,
    summary TEXT NOT NULL,
    unit TEXT NOT NULL,
    ordinal BIGSERIAL,

    PRIMARY KEY (station_key, key)
);

CREATE TABLE IF NOT EXISTS parameter_periods (
    station_key TEXT NOT NULL,
    parameter_key TEXT NOT NULL,
    key TEXT NOT NULL,
    period_from TIMESTAMPTZ NOT NULL,
    period_to TIMESTAMPTZ NOT NULL,
    summary TEXT NOT NULL,
    sampling TEXT NOT NULL,
    samples JSONB NOT NULL,
    ordinal BIGSERIAL,
    appended_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),

    PRIMARY KEY (station_key, parameter_key, key, period_from),
    FOREIGN KEY (station_key, parameter_key)
        REFERENCES station_parameters(station_key, key) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_parameter_periods_from
    ON parameter_periods(station_key, parameter_key, period_from)
"#;
