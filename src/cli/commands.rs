//! Application state and the handlers behind each CLI command.

use super::render;
use super::{Commands, DistrictArgs, ForecastArgs, HistoryArgs, PruneArgs};
use crate::api::ProviderChain;
use crate::aqi::{aqi_from_pm25, Aqi};
use crate::config::{Config, MAX_RETENTION_DAYS};
use crate::db::{Database, HistoryStore, MemoryStore};
use crate::error::{AppError, Result};
use crate::forecast::{weekly_timeline, TimelinePoint};
use crate::jobs::{Collector, CycleReport, Scheduler, SchedulerSettings};
use crate::models::{
    find_district, lviv_districts, ApiResponse, District, HistoryStats, Period, Reading, Snapshot,
};
use chrono::Local;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Longest forecast lookahead accepted by `forecasts`.
const MAX_FORECAST_HOURS: i64 = 168;

/// A live reading with its derived index.
#[derive(Debug, Clone, Serialize)]
pub struct CurrentReading {
    pub district_id: i32,
    pub district: String,
    #[serde(flatten)]
    pub reading: Reading,
    pub aqi: Aqi,
    /// Display colour of the category.
    pub color: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct HistoryReport {
    pub district_id: i32,
    pub period: Period,
    pub snapshots: Vec<Snapshot>,
    pub stats: HistoryStats,
}

/// CLI application
pub struct App {
    config: Config,
    store: Arc<dyn HistoryStore>,
    chain: Arc<ProviderChain>,
    districts: Vec<District>,
    json: bool,
}

impl App {
    /// Create a new CLI application, connecting to PostgreSQL unless `in_memory` is set.
    pub async fn new(config: Config, in_memory: bool, json: bool) -> Result<Self> {
        let store: Arc<dyn HistoryStore> = if in_memory {
            warn!("Using in-memory store; collected data is discarded on exit");
            Arc::new(MemoryStore::new())
        } else {
            Arc::new(Database::new(&config.database_url).await?)
        };
        let chain = Arc::new(ProviderChain::from_config(&config));
        Ok(Self::with_parts(config, store, chain, json))
    }

    pub fn with_parts(
        config: Config,
        store: Arc<dyn HistoryStore>,
        chain: Arc<ProviderChain>,
        json: bool,
    ) -> Self {
        Self {
            config,
            store,
            chain,
            districts: lviv_districts(),
            json,
        }
    }

    pub fn districts(&self) -> &[District] {
        &self.districts
    }

    pub fn retention_days(&self) -> i64 {
        self.config.retention_days
    }

    fn district(&self, id: i32) -> Result<&District> {
        find_district(&self.districts, id).ok_or_else(|| {
            AppError::Validation(format!(
                "Unknown district id {}. Must be one of: {:?}",
                id,
                self.districts.iter().map(|d| d.id).collect::<Vec<_>>()
            ))
        })
    }

    fn collector(&self) -> Collector {
        Collector::new(
            Arc::clone(&self.chain),
            Arc::clone(&self.store),
            self.districts.clone(),
        )
    }

    /// Fetches a live reading through the provider chain. The reading is not stored.
    pub async fn current_reading(&self, district_id: i32) -> Result<CurrentReading> {
        let district = self.district(district_id)?;
        let reading = self.chain.fetch(district).await;
        let aqi = aqi_from_pm25(reading.pollutants.clamped().pm25);
        Ok(CurrentReading {
            district_id,
            district: district.name.clone(),
            reading,
            aqi,
            color: aqi.category.color(),
        })
    }

    pub async fn history(&self, district_id: i32, period: &str) -> Result<HistoryReport> {
        self.district(district_id)?;
        let period: Period = period.parse()?;
        let snapshots = self.store.range_query(district_id, period).await?;
        let stats = self.store.aggregate(district_id, period).await?;
        info!(
            "History for district {} ({}): {} snapshots",
            district_id,
            period,
            snapshots.len()
        );
        Ok(HistoryReport {
            district_id,
            period,
            snapshots,
            stats,
        })
    }

    pub async fn weekly(&self, district_id: i32) -> Result<Vec<TimelinePoint>> {
        self.district(district_id)?;
        weekly_timeline(self.store.as_ref(), district_id, Local::now()).await
    }

    pub async fn forecasts(&self, district_id: i32, hours: i64) -> Result<Vec<Snapshot>> {
        self.district(district_id)?;
        if !(1..=MAX_FORECAST_HOURS).contains(&hours) {
            return Err(AppError::Validation(format!(
                "Hours must be between 1 and {}, got {}",
                MAX_FORECAST_HOURS, hours
            )));
        }
        self.store.upcoming_forecasts(district_id, hours).await
    }

    pub async fn collect(&self) -> Result<CycleReport> {
        self.store.init_schema().await?;
        Ok(self.collector().run_cycle().await)
    }

    /// Prunes with `days`, or the configured retention when `None`.
    pub async fn prune(&self, days: Option<i64>) -> Result<u64> {
        let days = days.unwrap_or(self.config.retention_days);
        if !(1..=MAX_RETENTION_DAYS).contains(&days) {
            return Err(AppError::Validation(format!(
                "Retention horizon must be between 1 and {} days, got {}",
                MAX_RETENTION_DAYS, days
            )));
        }
        let removed = self.store.prune(chrono::Duration::days(days)).await?;
        info!("Pruned {} snapshots older than {} days", removed, days);
        Ok(removed)
    }

    pub async fn prune_forecasts(&self) -> Result<u64> {
        self.store.prune_past_forecasts().await
    }

    /// Runs the scheduler until Ctrl-C.
    pub async fn serve(&self) -> Result<()> {
        self.store.init_schema().await?;
        let scheduler = Scheduler::new(
            Arc::new(self.collector()),
            Arc::clone(&self.store),
            SchedulerSettings {
                collect_interval: self.config.collect_interval,
                cleanup_time: self.config.cleanup_time,
                retention: chrono::Duration::days(self.config.retention_days),
            },
        );
        scheduler.start()?;
        info!("Press Ctrl-C to stop");
        tokio::signal::ctrl_c().await?;
        scheduler.stop()?;
        Ok(())
    }

    /// Prints `result` as a JSON envelope or through `render`, then passes any error on.
    fn emit<T: Serialize>(&self, result: Result<T>, render: impl FnOnce(&T)) -> Result<()> {
        if self.json {
            let failure = result.as_ref().err().cloned();
            let envelope = ApiResponse::from(result);
            println!("{}", serde_json::to_string_pretty(&envelope)?);
            return failure.map_or(Ok(()), Err);
        }
        let value = result?;
        render(&value);
        Ok(())
    }

    async fn collect_with_spinner(&self) -> Result<CycleReport> {
        if self.json {
            return self.collect().await;
        }
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(ProgressStyle::with_template("{spinner:.green} {msg}")?);
        spinner.enable_steady_tick(Duration::from_millis(100));
        spinner.set_message(format!("Collecting {} districts...", self.districts.len()));
        let result = self.collect().await;
        spinner.finish_and_clear();
        result
    }

    /// Run a single command
    pub async fn run_command(&self, command: Commands) -> Result<()> {
        match command {
            Commands::InitDb => {
                let result = self.store.init_schema().await.map(|_| "Schema initialized");
                self.emit(result, |msg| render::print_message(msg))
            },
            Commands::Serve => self.serve().await,
            Commands::Collect => {
                let result = self.collect_with_spinner().await;
                self.emit(result, render::print_cycle)
            },
            Commands::Prune(PruneArgs { days }) => {
                let result = self.prune(days).await;
                self.emit(result, |n| {
                    render::print_message(&format!("Removed {} snapshots", n))
                })
            },
            Commands::PruneForecasts => {
                let result = self.prune_forecasts().await;
                self.emit(result, |n| {
                    render::print_message(&format!("Removed {} past forecasts", n))
                })
            },
            Commands::Current(DistrictArgs { district }) => {
                let result = self.current_reading(district).await;
                self.emit(result, render::print_current)
            },
            Commands::History(HistoryArgs { district, period }) => {
                let result = self.history(district, &period).await;
                self.emit(result, render::print_history)
            },
            Commands::Weekly(DistrictArgs { district }) => {
                let result = self.weekly(district).await;
                self.emit(result, |t| render::print_timeline(t))
            },
            Commands::Forecasts(ForecastArgs { district, hours }) => {
                let result = self.forecasts(district, hours).await;
                self.emit(result, |rows| render::print_snapshots(rows))
            },
            Commands::Districts => {
                let result = Ok(self.districts.clone());
                self.emit(result, |d| render::print_districts(d))
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::test_support::StubProvider;
    use crate::api::AirQualityProvider;
    use crate::db::test_support::{forecast, new_snapshot};
    use crate::models::DataSource;
    use chrono::Utc;

    fn app_with(
        links: Vec<Arc<dyn AirQualityProvider>>,
        json: bool,
    ) -> (App, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let chain = Arc::new(ProviderChain::new(links, Duration::from_secs(5)));
        let app = App::with_parts(Config::default(), store.clone(), chain, json);
        (app, store)
    }

    fn app() -> (App, Arc<MemoryStore>) {
        app_with(vec![StubProvider::ok(DataSource::Primary, 35.4)], false)
    }

    #[tokio::test]
    async fn test_unknown_district_is_validation_error() {
        let (app, _) = app();
        for result in [
            app.history(7, "24h").await.map(|_| ()),
            app.weekly(0).await.map(|_| ()),
            app.current_reading(-1).await.map(|_| ()),
            app.forecasts(9, 24).await.map(|_| ()),
        ] {
            assert!(matches!(result, Err(AppError::Validation(_))));
        }
    }

    #[tokio::test]
    async fn test_bad_period_and_hours() {
        let (app, _) = app();
        let err = app.history(1, "2w").await.unwrap_err();
        assert!(err.is_client_error());
        assert!(matches!(app.forecasts(1, 0).await, Err(AppError::Validation(_))));
        assert!(matches!(app.forecasts(1, 169).await, Err(AppError::Validation(_))));
        assert!(matches!(app.prune(Some(0)).await, Err(AppError::Validation(_))));
    }

    #[tokio::test]
    async fn test_prune_rejects_huge_horizon() {
        let (app, store) = app();
        store.append(&new_snapshot(1, 10.0, Utc::now())).await.unwrap();
        for days in [MAX_RETENTION_DAYS + 1, 100_000_000, i64::MAX / 1000, i64::MAX] {
            assert!(
                matches!(app.prune(Some(days)).await, Err(AppError::Validation(_))),
                "{}",
                days
            );
        }
        assert_eq!(app.prune(Some(MAX_RETENTION_DAYS)).await.unwrap(), 0);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_current_reading_is_not_stored() {
        let (app, store) = app_with(vec![StubProvider::failing()], false);
        let current = app.current_reading(2).await.unwrap();
        assert_eq!(current.reading.source, DataSource::Mock);
        assert_eq!(current.district, "Frankivskyi");
        assert_eq!(current.aqi, aqi_from_pm25(current.reading.pollutants.pm25));
        assert_eq!(store.len().await, 0);
    }

    #[tokio::test]
    async fn test_collect_then_history() {
        let (app, _) = app();
        let report = app.collect().await.unwrap();
        assert_eq!(report.stored.len(), 6);

        let history = app.history(4, "1h").await.unwrap();
        assert_eq!(history.snapshots.len(), 1);
        assert_eq!(history.snapshots[0].aqi, 100);
        assert_eq!(history.snapshots[0].aqi_status, "Moderate");
        assert_eq!(history.stats.total_records, 1);

        let timeline = app.weekly(4).await.unwrap();
        assert!(timeline.iter().any(|p| p.is_current && p.aqi == 100));
    }

    #[tokio::test]
    async fn test_forecasts_and_prune() {
        let (app, store) = app();
        store
            .insert_raw(forecast(1, 70, Utc::now() + chrono::Duration::hours(5)))
            .await;
        store
            .insert_raw(forecast(1, 70, Utc::now() - chrono::Duration::hours(5)))
            .await;
        store
            .append(&new_snapshot(1, 10.0, Utc::now() - chrono::Duration::days(120)))
            .await
            .unwrap();

        assert_eq!(app.forecasts(1, 24).await.unwrap().len(), 1);
        assert_eq!(app.prune_forecasts().await.unwrap(), 1);
        assert_eq!(app.prune(None).await.unwrap(), 1);
        assert_eq!(app.prune(None).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_json_mode_passes_error_through() {
        let (app, _) = app_with(vec![StubProvider::failing()], true);
        let result = app
            .run_command(Commands::History(HistoryArgs {
                district: 42,
                period: "24h".to_string(),
            }))
            .await;
        assert!(matches!(result, Err(AppError::Validation(_))));
        assert!(app.run_command(Commands::Districts).await.is_ok());
    }
}
