//! Provides the append-only air quality history store.
//!
//! `HistoryStore` is the capability the scheduler, collector and query paths depend on.
//! Two backends implement it:
//! - `postgres`: the production store, via `sqlx`.
//! - `memory`: a process-local store for dry runs and tests.

mod memory;
mod postgres;

pub use memory::*;
pub use postgres::*;

use crate::error::{AppError, Result};
use crate::models::{HistoryStats, NewSnapshot, Period, Snapshot};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

/// Durable log of per-district timestamped snapshots.
///
/// Rows are immutable once written: there is no update operation, only bulk deletion by age.
/// Implementations must be safe to share across concurrent appends and prunes.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Creates the backing schema if it does not exist yet.
    async fn init_schema(&self) -> Result<()>;

    /// Inserts one real (non-forecast) row and returns its id.
    ///
    /// Duplicate `(district_id, measured_at)` pairs are accepted as-is.
    async fn append(&self, snapshot: &NewSnapshot) -> Result<i64>;

    /// Real snapshots within the trailing `period`, ascending by `measured_at`.
    async fn range_query(&self, district_id: i32, period: Period) -> Result<Vec<Snapshot>>;

    /// Min/max/avg of the real snapshots within the trailing `period`.
    async fn aggregate(&self, district_id: i32, period: Period) -> Result<HistoryStats>;

    /// Real snapshots with `from <= measured_at < to`, ascending.
    async fn readings_between(
        &self,
        district_id: i32,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Snapshot>>;

    /// The most recent real snapshot of the district, if any.
    async fn latest(&self, district_id: i32) -> Result<Option<Snapshot>>;

    /// Deletes every snapshot (real or forecast) older than `horizon` and returns the count.
    async fn prune(&self, horizon: Duration) -> Result<u64>;

    /// Forecast rows dated within the next `hours`, ascending.
    async fn upcoming_forecasts(&self, district_id: i32, hours: i64) -> Result<Vec<Snapshot>>;

    /// Deletes forecast rows whose date has already passed.
    async fn prune_past_forecasts(&self) -> Result<u64>;
}

/// Instant before which `prune(horizon)` deletes rows.
pub(crate) fn prune_cutoff(horizon: Duration) -> Result<DateTime<Utc>> {
    Utc::now().checked_sub_signed(horizon).ok_or_else(|| {
        AppError::Validation(format!(
            "Retention horizon of {} days is out of range",
            horizon.num_days()
        ))
    })
}
