//! Provides PostgreSQL history store functionalities using `sqlx`.
//!
//! Includes capabilities for establishing connection pools, initializing the schema, appending
//! snapshots, executing range and aggregate queries, and age-based pruning. Concurrency between
//! appends and prunes is left to PostgreSQL row-level locking.
//! Also contains integration tests (requires the `integration-tests` feature).

use super::{prune_cutoff, HistoryStore};
use crate::error::{AppError, Result};
use crate::models::{HistoryStats, MetricStats, NewSnapshot, Period, Snapshot};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::{postgres::PgPoolOptions, Pool, Postgres};
use tracing::{debug, error, info};

const SNAPSHOT_COLUMNS: &str = r#"
    id, district_id, measured_at, pm25, pm10, no2, so2, co, o3, aqi, aqi_status,
    temperature, humidity, pressure, wind_speed, data_source AS source, is_forecast,
    confidence_level
"#;

/// Represents the database connection pool and provides the history store operations.
pub struct Database {
    pool: Pool<Postgres>,
}

/// One row of the aggregate query; every metric column is nullable because the window may be
/// empty.
#[derive(Debug, sqlx::FromRow)]
struct StatsRow {
    total_records: i64,
    min_aqi: Option<f64>,
    max_aqi: Option<f64>,
    avg_aqi: Option<f64>,
    min_pm25: Option<f64>,
    max_pm25: Option<f64>,
    avg_pm25: Option<f64>,
    min_pm10: Option<f64>,
    max_pm10: Option<f64>,
    avg_pm10: Option<f64>,
    min_temperature: Option<f64>,
    max_temperature: Option<f64>,
    avg_temperature: Option<f64>,
    min_humidity: Option<f64>,
    max_humidity: Option<f64>,
    avg_humidity: Option<f64>,
}

impl From<StatsRow> for HistoryStats {
    fn from(r: StatsRow) -> Self {
        HistoryStats {
            total_records: r.total_records,
            aqi: MetricStats::from_columns(r.min_aqi, r.max_aqi, r.avg_aqi),
            pm25: MetricStats::from_columns(r.min_pm25, r.max_pm25, r.avg_pm25),
            pm10: MetricStats::from_columns(r.min_pm10, r.max_pm10, r.avg_pm10),
            temperature: MetricStats::from_columns(
                r.min_temperature,
                r.max_temperature,
                r.avg_temperature,
            ),
            humidity: MetricStats::from_columns(r.min_humidity, r.max_humidity, r.avg_humidity),
        }
    }
}

impl Database {
    /// Creates a new `Database` instance by establishing a connection pool.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the connection pool cannot be established.
    pub async fn new(database_url: &str) -> Result<Self> {
        info!("Connecting to database...");

        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await
            .map_err(|e| {
                error!("Failed to connect to database: {}", e);
                AppError::Db(e.into())
            })?;

        info!("Connected to database successfully");
        Ok(Self { pool })
    }

    /// Checks if the `air_quality_history` table exists.
    pub async fn is_schema_initialized(&self) -> Result<bool> {
        debug!("Checking if database schema is initialized...");
        let initialized = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT FROM information_schema.tables
             WHERE table_schema = 'public' AND table_name = 'air_quality_history')",
        )
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            error!("Failed to check schema existence: {}", e);
            AppError::Db(e.into())
        })?;
        debug!("Schema initialized status: {}", initialized);
        Ok(initialized)
    }
}

#[async_trait]
impl HistoryStore for Database {
    /// Uses `CREATE TABLE IF NOT EXISTS` and `CREATE INDEX IF NOT EXISTS`, so it is safe to run
    /// on every start.
    async fn init_schema(&self) -> Result<()> {
        if self.is_schema_initialized().await? {
            info!("Table air_quality_history exists, ensuring indexes...");
        } else {
            info!("Creating air_quality_history table...");
        }

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS air_quality_history (
                id BIGSERIAL PRIMARY KEY,
                district_id INTEGER NOT NULL,
                measured_at TIMESTAMPTZ NOT NULL,
                pm25 DOUBLE PRECISION NOT NULL CHECK (pm25 >= 0),
                pm10 DOUBLE PRECISION NOT NULL CHECK (pm10 >= 0),
                no2 DOUBLE PRECISION NOT NULL CHECK (no2 >= 0),
                so2 DOUBLE PRECISION NOT NULL CHECK (so2 >= 0),
                co DOUBLE PRECISION NOT NULL CHECK (co >= 0),
                o3 DOUBLE PRECISION NOT NULL CHECK (o3 >= 0),
                aqi INTEGER NOT NULL CHECK (aqi BETWEEN 0 AND 500),
                aqi_status TEXT NOT NULL,
                temperature DOUBLE PRECISION,
                humidity DOUBLE PRECISION,
                pressure DOUBLE PRECISION,
                wind_speed DOUBLE PRECISION,
                data_source TEXT NOT NULL,
                is_forecast BOOLEAN NOT NULL DEFAULT FALSE,
                confidence_level DOUBLE PRECISION,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| {
            error!("Failed to create air_quality_history table: {}", e);
            AppError::Db(e.into())
        })?;

        let indexes = [
            "CREATE INDEX IF NOT EXISTS idx_history_district_measured
             ON air_quality_history(district_id, measured_at)",
            "CREATE INDEX IF NOT EXISTS idx_history_measured ON air_quality_history(measured_at)",
            "CREATE INDEX IF NOT EXISTS idx_history_forecast
             ON air_quality_history(district_id, measured_at) WHERE is_forecast",
        ];
        for statement in indexes {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(|e| {
                    error!("Failed to create index: {}", e);
                    AppError::Db(e.into())
                })?;
        }

        info!("Database schema initialized successfully");
        Ok(())
    }

    async fn append(&self, s: &NewSnapshot) -> Result<i64> {
        let id = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO air_quality_history
            (district_id, measured_at, pm25, pm10, no2, so2, co, o3, aqi, aqi_status,
             temperature, humidity, pressure, wind_speed, data_source, is_forecast)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, FALSE)
            RETURNING id
            "#,
        )
        .bind(s.district_id)
        .bind(s.measured_at)
        .bind(s.pollutants.pm25)
        .bind(s.pollutants.pm10)
        .bind(s.pollutants.no2)
        .bind(s.pollutants.so2)
        .bind(s.pollutants.co)
        .bind(s.pollutants.o3)
        .bind(s.aqi.value)
        .bind(s.aqi.category.label())
        .bind(s.weather.temperature)
        .bind(s.weather.humidity)
        .bind(s.weather.pressure)
        .bind(s.weather.wind_speed)
        .bind(s.source.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            error!(
                "Failed to append snapshot for district {}: {}",
                s.district_id, e
            );
            AppError::Db(e.into())
        })?;

        debug!("Appended snapshot {} for district {}", id, s.district_id);
        Ok(id)
    }

    async fn range_query(&self, district_id: i32, period: Period) -> Result<Vec<Snapshot>> {
        let since = Utc::now() - period.duration();
        let query = format!(
            r#"
            SELECT {SNAPSHOT_COLUMNS}
            FROM air_quality_history
            WHERE district_id = $1
              AND measured_at >= $2
              AND is_forecast = FALSE
            ORDER BY measured_at ASC, id ASC
            "#
        );
        let rows = sqlx::query_as::<_, Snapshot>(&query)
            .bind(district_id)
            .bind(since)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| {
                error!("Failed to query history for district {}: {}", district_id, e);
                AppError::Db(e.into())
            })?;

        info!(
            "Retrieved {} history rows for district {} (period: {})",
            rows.len(),
            district_id,
            period
        );
        Ok(rows)
    }

    /// Uses a single aggregate query; casts keep every column `DOUBLE PRECISION` so the row maps
    /// onto `StatsRow` regardless of the underlying column types.
    async fn aggregate(&self, district_id: i32, period: Period) -> Result<HistoryStats> {
        let since = Utc::now() - period.duration();
        let row = sqlx::query_as::<_, StatsRow>(
            r#"
            SELECT
                COUNT(*) AS total_records,
                MIN(aqi)::DOUBLE PRECISION AS min_aqi,
                MAX(aqi)::DOUBLE PRECISION AS max_aqi,
                AVG(aqi)::DOUBLE PRECISION AS avg_aqi,
                MIN(pm25) AS min_pm25,
                MAX(pm25) AS max_pm25,
                AVG(pm25) AS avg_pm25,
                MIN(pm10) AS min_pm10,
                MAX(pm10) AS max_pm10,
                AVG(pm10) AS avg_pm10,
                MIN(temperature) AS min_temperature,
                MAX(temperature) AS max_temperature,
                AVG(temperature) AS avg_temperature,
                MIN(humidity) AS min_humidity,
                MAX(humidity) AS max_humidity,
                AVG(humidity) AS avg_humidity
            FROM air_quality_history
            WHERE district_id = $1
              AND measured_at >= $2
              AND is_forecast = FALSE
            "#,
        )
        .bind(district_id)
        .bind(since)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            error!("Failed to aggregate history for district {}: {}", district_id, e);
            AppError::Db(e.into())
        })?;

        Ok(row.into())
    }

    async fn readings_between(
        &self,
        district_id: i32,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Snapshot>> {
        let query = format!(
            r#"
            SELECT {SNAPSHOT_COLUMNS}
            FROM air_quality_history
            WHERE district_id = $1
              AND measured_at >= $2
              AND measured_at < $3
              AND is_forecast = FALSE
            ORDER BY measured_at ASC, id ASC
            "#
        );
        sqlx::query_as::<_, Snapshot>(&query)
            .bind(district_id)
            .bind(from)
            .bind(to)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| {
                error!("Failed to query readings for district {}: {}", district_id, e);
                AppError::Db(e.into())
            })
    }

    async fn latest(&self, district_id: i32) -> Result<Option<Snapshot>> {
        let query = format!(
            r#"
            SELECT {SNAPSHOT_COLUMNS}
            FROM air_quality_history
            WHERE district_id = $1 AND is_forecast = FALSE
            ORDER BY measured_at DESC, id DESC
            LIMIT 1
            "#
        );
        sqlx::query_as::<_, Snapshot>(&query)
            .bind(district_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                error!("Failed to fetch latest snapshot for district {}: {}", district_id, e);
                AppError::Db(e.into())
            })
    }

    async fn prune(&self, horizon: Duration) -> Result<u64> {
        let cutoff = prune_cutoff(horizon)?;
        info!("Pruning snapshots measured before {}", cutoff);
        let result = sqlx::query("DELETE FROM air_quality_history WHERE measured_at < $1")
            .bind(cutoff)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                error!("Failed to prune history: {}", e);
                AppError::Db(e.into())
            })?;
        Ok(result.rows_affected())
    }

    async fn upcoming_forecasts(&self, district_id: i32, hours: i64) -> Result<Vec<Snapshot>> {
        let now = Utc::now();
        let query = format!(
            r#"
            SELECT {SNAPSHOT_COLUMNS}
            FROM air_quality_history
            WHERE district_id = $1
              AND is_forecast = TRUE
              AND measured_at >= $2
              AND measured_at <= $3
            ORDER BY measured_at ASC, id ASC
            "#
        );
        let rows = sqlx::query_as::<_, Snapshot>(&query)
            .bind(district_id)
            .bind(now)
            .bind(now + Duration::hours(hours))
            .fetch_all(&self.pool)
            .await
            .map_err(|e| {
                error!("Failed to query forecasts for district {}: {}", district_id, e);
                AppError::Db(e.into())
            })?;
        info!("Retrieved {} forecasts for district {}", rows.len(), district_id);
        Ok(rows)
    }

    async fn prune_past_forecasts(&self) -> Result<u64> {
        let result = sqlx::query(
            "DELETE FROM air_quality_history WHERE is_forecast = TRUE AND measured_at < $1",
        )
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(|e| {
            error!("Failed to prune past forecasts: {}", e);
            AppError::Db(e.into())
        })?;
        Ok(result.rows_affected())
    }
}
