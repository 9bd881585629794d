//! Process-local history store.
//!
//! Backs `--in-memory` runs and unit tests. Rows live in a `Vec` behind a `tokio` `RwLock`, so
//! appends and prunes serialize on the lock while queries share it.

use super::{prune_cutoff, HistoryStore};
use crate::error::Result;
use crate::models::{HistoryStats, NewSnapshot, Period, Snapshot};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::sync::atomic::{AtomicI64, Ordering};
use tokio::sync::RwLock;
use tracing::{debug, info};

#[derive(Debug, Default)]
pub struct MemoryStore {
    rows: RwLock<Vec<Snapshot>>,
    next_id: AtomicI64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored rows, forecasts included.
    #[cfg(test)]
    pub(crate) async fn len(&self) -> usize {
        self.rows.read().await.len()
    }

    /// Inserts a fully formed row, including forecast rows the pipeline never writes itself.
    #[cfg(test)]
    pub(crate) async fn insert_raw(&self, mut snapshot: Snapshot) -> i64 {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        snapshot.id = id;
        self.rows.write().await.push(snapshot);
        id
    }

    async fn select<F>(&self, filter: F) -> Vec<Snapshot>
    where
        F: Fn(&Snapshot) -> bool,
    {
        let mut rows: Vec<Snapshot> = self
            .rows
            .read()
            .await
            .iter()
            .filter(|row| filter(row))
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.measured_at.cmp(&b.measured_at).then(a.id.cmp(&b.id)));
        rows
    }

    async fn delete_where<F>(&self, filter: F) -> u64
    where
        F: Fn(&Snapshot) -> bool,
    {
        let mut rows = self.rows.write().await;
        let before = rows.len();
        rows.retain(|row| !filter(row));
        (before - rows.len()) as u64
    }
}

#[async_trait]
impl HistoryStore for MemoryStore {
    async fn init_schema(&self) -> Result<()> {
        debug!("In-memory store needs no schema");
        Ok(())
    }

    async fn append(&self, snapshot: &NewSnapshot) -> Result<i64> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        self.rows
            .write()
            .await
            .push(Snapshot::from_new(id, snapshot));
        debug!(
            "Appended snapshot {} for district {}",
            id,
            snapshot.district_id()
        );
        Ok(id)
    }

    async fn range_query(&self, district_id: i32, period: Period) -> Result<Vec<Snapshot>> {
        let since = Utc::now() - period.duration();
        Ok(self
            .select(|r| r.district_id == district_id && !r.is_forecast && r.measured_at >= since)
            .await)
    }

    async fn aggregate(&self, district_id: i32, period: Period) -> Result<HistoryStats> {
        let rows = self.range_query(district_id, period).await?;
        Ok(HistoryStats::from_snapshots(&rows))
    }

    async fn readings_between(
        &self,
        district_id: i32,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Snapshot>> {
        Ok(self
            .select(|r| {
                r.district_id == district_id
                    && !r.is_forecast
                    && r.measured_at >= from
                    && r.measured_at < to
            })
            .await)
    }

    async fn latest(&self, district_id: i32) -> Result<Option<Snapshot>> {
        Ok(self
            .select(|r| r.district_id == district_id && !r.is_forecast)
            .await
            .pop())
    }

    async fn prune(&self, horizon: Duration) -> Result<u64> {
        let cutoff = prune_cutoff(horizon)?;
        let deleted = self.delete_where(|r| r.measured_at < cutoff).await;
        info!("Pruned {} in-memory snapshots older than {}", deleted, cutoff);
        Ok(deleted)
    }

    async fn upcoming_forecasts(&self, district_id: i32, hours: i64) -> Result<Vec<Snapshot>> {
        let now = Utc::now();
        let until = now + Duration::hours(hours);
        Ok(self
            .select(|r| {
                r.district_id == district_id
                    && r.is_forecast
                    && r.measured_at >= now
                    && r.measured_at <= until
            })
            .await)
    }

    async fn prune_past_forecasts(&self) -> Result<u64> {
        let now = Utc::now();
        Ok(self
            .delete_where(|r| r.is_forecast && r.measured_at < now)
            .await)
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::{forecast, new_snapshot};
    use super::*;
    use crate::error::AppError;
    use std::sync::Arc;

    fn hours_ago(h: i64) -> DateTime<Utc> {
        Utc::now() - Duration::hours(h)
    }

    #[tokio::test]
    async fn test_range_query_is_ascending_and_excludes_forecasts() {
        let store = MemoryStore::new();
        store.append(&new_snapshot(1, 20.0, hours_ago(2))).await.unwrap();
        store.append(&new_snapshot(1, 10.0, hours_ago(5))).await.unwrap();
        store.append(&new_snapshot(1, 30.0, hours_ago(30))).await.unwrap();
        store.append(&new_snapshot(2, 40.0, hours_ago(1))).await.unwrap();
        store.insert_raw(forecast(1, 60, hours_ago(1))).await;

        let rows = store.range_query(1, Period::Day).await.unwrap();
        assert_eq!(rows.iter().map(|r| r.pm25).collect::<Vec<_>>(), vec![10.0, 20.0]);
        assert!(rows.iter().all(|r| !r.is_forecast));

        let week = store.range_query(1, Period::Week).await.unwrap();
        assert_eq!(week.len(), 3);
    }

    #[tokio::test]
    async fn test_duplicates_are_kept() {
        let store = MemoryStore::new();
        let at = hours_ago(1);
        let a = store.append(&new_snapshot(3, 8.0, at)).await.unwrap();
        let b = store.append(&new_snapshot(3, 8.0, at)).await.unwrap();
        assert_ne!(a, b);
        assert_eq!(store.range_query(3, Period::Day).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_aggregate() {
        let store = MemoryStore::new();
        store.append(&new_snapshot(4, 12.0, hours_ago(1))).await.unwrap();
        store.append(&new_snapshot(4, 35.4, hours_ago(3))).await.unwrap();

        let stats = store.aggregate(4, Period::Day).await.unwrap();
        assert_eq!(stats.total_records, 2);
        let aqi = stats.aqi.unwrap();
        assert_eq!((aqi.min, aqi.max, aqi.avg), (50.0, 100.0, 75.0));

        let empty = store.aggregate(4, Period::Hour).await.unwrap();
        assert_eq!(empty.total_records, 0);
        assert!(empty.aqi.is_none());
    }

    #[tokio::test]
    async fn test_prune_twice() {
        let store = MemoryStore::new();
        store.append(&new_snapshot(1, 5.0, hours_ago(24 * 100))).await.unwrap();
        store.append(&new_snapshot(1, 5.0, hours_ago(24 * 91))).await.unwrap();
        store.append(&new_snapshot(1, 5.0, hours_ago(1))).await.unwrap();

        assert_eq!(store.prune(Duration::days(90)).await.unwrap(), 2);
        assert_eq!(store.prune(Duration::days(90)).await.unwrap(), 0);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_prune_out_of_range_horizon() {
        let store = MemoryStore::new();
        store.append(&new_snapshot(1, 5.0, hours_ago(1))).await.unwrap();
        let result = store.prune(Duration::days(100_000_000)).await;
        assert!(matches!(result, Err(AppError::Validation(_))));
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_latest_and_window() {
        let store = MemoryStore::new();
        assert!(store.latest(1).await.unwrap().is_none());
        store.append(&new_snapshot(1, 5.0, hours_ago(3))).await.unwrap();
        store.append(&new_snapshot(1, 9.0, hours_ago(1))).await.unwrap();
        store.insert_raw(forecast(1, 90, Utc::now() + Duration::hours(2))).await;

        assert_eq!(store.latest(1).await.unwrap().unwrap().pm25, 9.0);
        let window = store
            .readings_between(1, hours_ago(4), hours_ago(2))
            .await
            .unwrap();
        assert_eq!(window.len(), 1);
        assert_eq!(window[0].pm25, 5.0);
    }

    #[tokio::test]
    async fn test_forecast_rows() {
        let store = MemoryStore::new();
        store.insert_raw(forecast(2, 40, hours_ago(2))).await;
        store.insert_raw(forecast(2, 50, Utc::now() + Duration::hours(3))).await;
        store.insert_raw(forecast(2, 60, Utc::now() + Duration::hours(30))).await;
        store.append(&new_snapshot(2, 5.0, hours_ago(2))).await.unwrap();

        let upcoming = store.upcoming_forecasts(2, 24).await.unwrap();
        assert_eq!(upcoming.iter().map(|r| r.aqi).collect::<Vec<_>>(), vec![50]);

        assert_eq!(store.prune_past_forecasts().await.unwrap(), 1);
        assert_eq!(store.len().await, 3);
    }

    #[tokio::test]
    async fn test_concurrent_append_and_prune() {
        let store = Arc::new(MemoryStore::new());
        for _ in 0..10 {
            store.append(&new_snapshot(1, 5.0, hours_ago(24 * 120))).await.unwrap();
        }

        let mut handles = Vec::new();
        for i in 0..20 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                store.append(&new_snapshot(1, i as f64, hours_ago(1))).await
            }));
        }
        let pruned = store.prune(Duration::days(90)).await.unwrap();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(pruned, 10);
        assert_eq!(store.range_query(1, Period::Day).await.unwrap().len(), 20);
    }
}
