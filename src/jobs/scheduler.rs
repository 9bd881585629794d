//! Background lifecycle driving the collect and cleanup ticks.
//!
//! Two independent loops run on the tokio runtime: a fixed-interval collect loop and a daily
//! cleanup loop firing at a local wall-clock time. Each tick is spawned as its own task and
//! guarded so that a tick still running when the next one fires causes the new one to be
//! skipped. Tick failures are logged and never stop the loops.

use super::Collector;
use crate::db::HistoryStore;
use crate::error::{AppError, Result};
use chrono::{DateTime, Local, NaiveTime, TimeZone};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

/// Time from `now` until the next occurrence of `at` on the local wall clock.
///
/// An `at` equal to the current time schedules for tomorrow.
pub fn until_next_daily<Tz: TimeZone>(now: &DateTime<Tz>, at: NaiveTime) -> Duration {
    let local = now.naive_local();
    let mut next = local.date().and_time(at);
    if next <= local {
        next += chrono::Duration::days(1);
    }
    (next - local).to_std().unwrap_or(Duration::ZERO)
}

/// Marks a tick kind as running until dropped.
struct BusyGuard(Arc<AtomicBool>);

impl BusyGuard {
    fn try_acquire(flag: &Arc<AtomicBool>) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| BusyGuard(Arc::clone(flag)))
    }
}

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Spawns `tick` unless the previous tick of the same kind is still running.
fn spawn_guarded<F>(kind: &'static str, busy: &Arc<AtomicBool>, tick: F)
where
    F: Future<Output = Result<()>> + Send + 'static,
{
    let Some(guard) = BusyGuard::try_acquire(busy) else {
        warn!("Previous {} tick still running, skipping", kind);
        return;
    };
    tokio::spawn(async move {
        let _guard = guard;
        if let Err(e) = tick.await {
            error!("{} tick failed: {}", kind, e);
        }
    });
}

#[derive(Debug, Clone)]
pub struct SchedulerSettings {
    pub collect_interval: Duration,
    pub cleanup_time: NaiveTime,
    pub retention: chrono::Duration,
}

pub struct Scheduler {
    collector: Arc<Collector>,
    store: Arc<dyn HistoryStore>,
    settings: SchedulerSettings,
    handles: Mutex<Vec<JoinHandle<()>>>,
    collect_busy: Arc<AtomicBool>,
    cleanup_busy: Arc<AtomicBool>,
}

impl Scheduler {
    pub fn new(
        collector: Arc<Collector>,
        store: Arc<dyn HistoryStore>,
        settings: SchedulerSettings,
    ) -> Self {
        Self {
            collector,
            store,
            settings,
            handles: Mutex::new(Vec::new()),
            collect_busy: Arc::new(AtomicBool::new(false)),
            cleanup_busy: Arc::new(AtomicBool::new(false)),
        }
    }

    fn lock_handles(&self) -> Result<std::sync::MutexGuard<'_, Vec<JoinHandle<()>>>> {
        self.handles
            .lock()
            .map_err(|_| AppError::TaskJoin("scheduler state poisoned".to_string()))
    }

    /// Starts both loops. Returns `false` without scheduling anything if already running.
    ///
    /// The first collect tick fires immediately.
    pub fn start(&self) -> Result<bool> {
        let mut handles = self.lock_handles()?;
        if !handles.is_empty() {
            warn!("Scheduler already running, ignoring start");
            return Ok(false);
        }

        handles.push(self.spawn_collect_loop());
        handles.push(self.spawn_cleanup_loop());
        info!(
            "Scheduler started: collect every {:?}, cleanup daily at {}",
            self.settings.collect_interval, self.settings.cleanup_time
        );
        Ok(true)
    }

    /// Stops both loops. Ticks already in flight run to completion.
    pub fn stop(&self) -> Result<bool> {
        let mut handles = self.lock_handles()?;
        if handles.is_empty() {
            return Ok(false);
        }
        for handle in handles.drain(..) {
            handle.abort();
        }
        info!("Scheduler stopped");
        Ok(true)
    }

    pub fn is_running(&self) -> bool {
        self.lock_handles().map(|h| !h.is_empty()).unwrap_or(false)
    }

    fn spawn_collect_loop(&self) -> JoinHandle<()> {
        let collector = Arc::clone(&self.collector);
        let busy = Arc::clone(&self.collect_busy);
        let period = self.settings.collect_interval;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                let collector = Arc::clone(&collector);
                spawn_guarded("collect", &busy, async move {
                    let report = collector.run_cycle().await;
                    if !report.is_complete() {
                        warn!("{} districts not stored this cycle", report.failed.len());
                    }
                    Ok(())
                });
            }
        })
    }

    fn spawn_cleanup_loop(&self) -> JoinHandle<()> {
        let store = Arc::clone(&self.store);
        let busy = Arc::clone(&self.cleanup_busy);
        let at = self.settings.cleanup_time;
        let retention = self.settings.retention;

        tokio::spawn(async move {
            loop {
                let wait = until_next_daily(&Local::now(), at);
                info!("Next cleanup in {} minutes", wait.as_secs() / 60);
                tokio::time::sleep(wait).await;
                let store = Arc::clone(&store);
                spawn_guarded("cleanup", &busy, async move {
                    let removed = store.prune(retention).await?;
                    let forecasts = store.prune_past_forecasts().await?;
                    info!(
                        "Cleanup removed {} expired snapshots and {} past forecasts",
                        removed, forecasts
                    );
                    Ok(())
                });
            }
        })
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        if let Ok(mut handles) = self.handles.lock() {
            for handle in handles.drain(..) {
                handle.abort();
            }
        }
    }
}
