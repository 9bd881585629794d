//! One collection cycle: fetch every district concurrently, derive the AQI, append.

use crate::api::ProviderChain;
use crate::aqi::Aqi;
use crate::db::HistoryStore;
use crate::error::{AppError, Result};
use crate::models::{DataSource, District, NewSnapshot};
use serde::Serialize;
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{error, info};

/// A snapshot that made it into the store.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredReading {
    pub id: i64,
    pub district_id: i32,
    pub aqi: Aqi,
    pub source: DataSource,
}

#[derive(Debug, Clone, Serialize)]
pub struct CycleFailure {
    pub district_id: i32,
    pub reason: String,
}

/// Outcome of one settle-all cycle. Failures never abort the rest of the batch.
#[derive(Debug, Default, Clone, Serialize)]
pub struct CycleReport {
    pub stored: Vec<StoredReading>,
    pub failed: Vec<CycleFailure>,
}

impl CycleReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

pub struct Collector {
    chain: Arc<ProviderChain>,
    store: Arc<dyn HistoryStore>,
    districts: Arc<Vec<District>>,
}

impl Collector {
    pub fn new(
        chain: Arc<ProviderChain>,
        store: Arc<dyn HistoryStore>,
        districts: Vec<District>,
    ) -> Self {
        Self {
            chain,
            store,
            districts: Arc::new(districts),
        }
    }

    async fn collect_one(
        chain: Arc<ProviderChain>,
        store: Arc<dyn HistoryStore>,
        district: District,
    ) -> Result<StoredReading> {
        let reading = chain.fetch(&district).await;
        let snapshot = NewSnapshot::from_reading(district.id, &reading);
        let id = store.append(&snapshot).await?;
        Ok(StoredReading {
            id,
            district_id: district.id,
            aqi: snapshot.aqi(),
            source: reading.source,
        })
    }

    /// Fans out one task per district and waits for all of them.
    ///
    /// The batch is not transactional: each district is appended as soon as its reading
    /// arrives, so a crash mid-cycle leaves a partial batch.
    pub async fn run_cycle(&self) -> CycleReport {
        info!("Starting collection cycle for {} districts", self.districts.len());

        let mut join_set = JoinSet::new();
        for district in self.districts.iter().cloned() {
            let chain = Arc::clone(&self.chain);
            let store = Arc::clone(&self.store);
            let district_id = district.id;
            join_set.spawn(async move {
                (district_id, Self::collect_one(chain, store, district).await)
            });
        }

        let mut report = CycleReport::default();
        while let Some(result) = join_set.join_next().await {
            match result {
                Ok((_, Ok(stored))) => report.stored.push(stored),
                Ok((district_id, Err(e))) => {
                    error!("Failed to store reading for district {}: {}", district_id, e);
                    report.failed.push(CycleFailure {
                        district_id,
                        reason: e.to_string(),
                    });
                },
                Err(e) => {
                    let e = AppError::from(e);
                    error!("Collection task failed: {}", e);
                    report.failed.push(CycleFailure {
                        district_id: 0,
                        reason: e.to_string(),
                    });
                },
            }
        }
        report.stored.sort_by_key(|s| s.district_id);

        info!(
            "Collection cycle finished: {} stored, {} failed",
            report.stored.len(),
            report.failed.len()
        );
        report
    }
}
