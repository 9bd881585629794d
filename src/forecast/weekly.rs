//! Weekly AQI timeline: up to three past days, today, and three extrapolated days.
//!
//! The extrapolation is a decaying linear trend, not a statistical model:
//! `forecast_i = round(today + trend * i * (1 - DECAY * i))`, clamped to
//! [`FORECAST_MIN`, `FORECAST_MAX`].

use crate::db::HistoryStore;
use crate::error::Result;
use crate::models::Snapshot;
use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::debug;

/// Per-day damping of the trend. Frozen; changing it changes every forecast.
pub const DECAY: f64 = 0.2;
pub const FORECAST_MIN: i32 = 10;
pub const FORECAST_MAX: i32 = 150;
/// Used for today when the district has no readings at all.
pub const DEFAULT_AQI: i32 = 50;

const PAST_DAYS: usize = 3;
/// Calendar days before today scanned for past averages.
const LOOKBACK_DAYS: i64 = 4;
const FUTURE_DAYS: i32 = 3;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimelinePoint {
    pub date: NaiveDate,
    pub aqi: i32,
    pub is_past: bool,
    pub is_current: bool,
    pub is_future: bool,
}

impl TimelinePoint {
    fn past(date: NaiveDate, aqi: i32) -> Self {
        Self {
            date,
            aqi,
            is_past: true,
            is_current: false,
            is_future: false,
        }
    }

    fn current(date: NaiveDate, aqi: i32) -> Self {
        Self {
            date,
            aqi,
            is_past: false,
            is_current: true,
            is_future: false,
        }
    }

    fn future(date: NaiveDate, aqi: i32) -> Self {
        Self {
            date,
            aqi,
            is_past: false,
            is_current: false,
            is_future: true,
        }
    }
}

fn rounded_mean(values: &[i32]) -> Option<i32> {
    if values.is_empty() {
        return None;
    }
    let sum: i64 = values.iter().map(|v| *v as i64).sum();
    Some((sum as f64 / values.len() as f64).round() as i32)
}

/// `trend` is half the change from the last past day to today; zero with fewer than two past
/// days.
pub fn trend(past: &[i32], today: i32) -> f64 {
    match past.last() {
        Some(last) if past.len() >= 2 => (today - last) as f64 / 2.0,
        _ => 0.0,
    }
}

/// Extrapolated AQI `days_ahead` days after today.
pub fn extrapolate(today: i32, trend: f64, days_ahead: i32) -> i32 {
    let i = days_ahead as f64;
    let value = (today as f64 + trend * i * (1.0 - DECAY * i)).round() as i32;
    value.clamp(FORECAST_MIN, FORECAST_MAX)
}

/// Builds the timeline from real snapshots, grouping by calendar day in `now`'s time zone.
///
/// `latest_aqi` is only consulted when there are no snapshots for today.
pub fn build_timeline<Tz: TimeZone>(
    rows: &[Snapshot],
    latest_aqi: Option<i32>,
    now: &DateTime<Tz>,
) -> Vec<TimelinePoint> {
    let tz = now.timezone();
    let today = now.date_naive();
    let oldest = today - Duration::days(LOOKBACK_DAYS);

    let mut by_day: BTreeMap<NaiveDate, Vec<i32>> = BTreeMap::new();
    for row in rows.iter().filter(|r| !r.is_forecast) {
        let day = row.measured_at.with_timezone(&tz).date_naive();
        if day >= oldest && day <= today {
            by_day.entry(day).or_default().push(row.aqi);
        }
    }

    let today_values = by_day.remove(&today).unwrap_or_default();
    let past: Vec<(NaiveDate, i32)> = by_day
        .iter()
        .rev()
        .take(PAST_DAYS)
        .filter_map(|(day, values)| rounded_mean(values).map(|avg| (*day, avg)))
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();

    let today_aqi = rounded_mean(&today_values)
        .or(latest_aqi)
        .unwrap_or(DEFAULT_AQI);
    let past_values: Vec<i32> = past.iter().map(|(_, aqi)| *aqi).collect();
    let trend = trend(&past_values, today_aqi);

    debug!(
        "Timeline: {} past days, today={} trend={:.2}",
        past.len(),
        today_aqi,
        trend
    );

    let mut timeline: Vec<TimelinePoint> = past
        .into_iter()
        .map(|(day, aqi)| TimelinePoint::past(day, aqi))
        .collect();
    timeline.push(TimelinePoint::current(today, today_aqi));
    for i in 1..=FUTURE_DAYS {
        timeline.push(TimelinePoint::future(
            today + Duration::days(i as i64),
            extrapolate(today_aqi, trend, i),
        ));
    }
    timeline
}

/// Reads recent history of the district and builds its weekly timeline.
pub async fn weekly_timeline<Tz: TimeZone>(
    store: &dyn HistoryStore,
    district_id: i32,
    now: DateTime<Tz>,
) -> Result<Vec<TimelinePoint>> {
    let now_utc = now.with_timezone(&Utc);
    // One extra day covers the partial first local day; `build_timeline` trims by date.
    let from = now_utc - Duration::days(LOOKBACK_DAYS + 1);
    let to = now_utc + Duration::seconds(1);
    let rows = store.readings_between(district_id, from, to).await?;
    let latest = store.latest(district_id).await?.map(|s| s.aqi);

    Ok(build_timeline(&rows, latest, &now))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::{forecast, new_snapshot};
    use crate::db::MemoryStore;
    use chrono::FixedOffset;
    use rstest::rstest;

    fn row(at: DateTime<Utc>, aqi: i32) -> Snapshot {
        let mut s = Snapshot::from_new(0, &new_snapshot(1, 0.0, at));
        s.aqi = aqi;
        s
    }

    fn noon() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 10, 12, 0, 0).unwrap()
    }

    fn aqis(timeline: &[TimelinePoint]) -> Vec<i32> {
        timeline.iter().map(|p| p.aqi).collect()
    }

    #[test]
    fn test_documented_example() {
        let now = noon();
        let rows = vec![
            row(now - Duration::days(3), 40),
            row(now - Duration::days(2), 50),
            row(now - Duration::days(1), 60),
            row(now - Duration::hours(2), 70),
        ];
        assert_eq!(trend(&[40, 50, 60], 70), 5.0);

        let timeline = build_timeline(&rows, None, &now);
        assert_eq!(aqis(&timeline), vec![40, 50, 60, 70, 74, 76, 76]);
        assert!(timeline[..3].iter().all(|p| p.is_past));
        assert!(timeline[3].is_current);
        assert!(timeline[4..].iter().all(|p| p.is_future));
        assert_eq!(
            timeline[0].date,
            NaiveDate::from_ymd_opt(2024, 3, 7).unwrap()
        );
        assert_eq!(
            timeline[6].date,
            NaiveDate::from_ymd_opt(2024, 3, 13).unwrap()
        );
    }

    #[test]
    fn test_daily_average_and_window() {
        let now = noon();
        let rows = vec![
            row(now - Duration::days(5), 200), // outside lookback
            row(now - Duration::days(4), 10),
            row(now - Duration::days(3), 20),
            row(now - Duration::days(2), 30),
            row(now - Duration::days(1), 41),
            row(now - Duration::days(1) + Duration::hours(1), 44),
            row(now - Duration::hours(1), 60),
        ];
        let timeline = build_timeline(&rows, None, &now);
        // Four past days found, three most recent kept; 42.5 rounds to 43.
        assert_eq!(aqis(&timeline)[..4], [20, 30, 43, 60]);
    }

    #[test]
    fn test_today_falls_back_to_latest_then_default() {
        let now = noon();
        let past = vec![row(now - Duration::days(1), 80)];

        let timeline = build_timeline(&past, Some(90), &now);
        assert_eq!(aqis(&timeline), vec![80, 90, 90, 90, 90]);

        let empty = build_timeline(&[], None, &now);
        assert_eq!(aqis(&empty), vec![50, 50, 50, 50]);
        assert!(empty[0].is_current);
    }

    #[test]
    fn test_forecast_rows_ignored() {
        let now = noon();
        let rows = vec![forecast(1, 140, now - Duration::hours(1)), row(now, 30)];
        let timeline = build_timeline(&rows, None, &now);
        assert_eq!(timeline[0].aqi, 30);
    }

    #[test]
    fn test_groups_by_local_day() {
        // 23:30 UTC on the 9th is already the 10th in UTC+2.
        let kyiv = FixedOffset::east_opt(2 * 3600).unwrap();
        let now = Utc.with_ymd_and_hms(2024, 3, 10, 8, 0, 0).unwrap().with_timezone(&kyiv);
        let rows = vec![
            row(Utc.with_ymd_and_hms(2024, 3, 9, 23, 30, 0).unwrap(), 100),
            row(Utc.with_ymd_and_hms(2024, 3, 9, 10, 0, 0).unwrap(), 20),
        ];
        let timeline = build_timeline(&rows, None, &now);
        assert_eq!(aqis(&timeline)[..2], [20, 100]);
        assert!(timeline[1].is_current);
    }

    #[rstest]
    #[case(70, 5.0, 1, 74)]
    #[case(70, 5.0, 2, 76)]
    #[case(70, 5.0, 3, 76)]
    #[case(148, 40.0, 1, 150)]
    #[case(12, -20.0, 1, 10)]
    #[case(60, -10.0, 2, 48)]
    fn test_extrapolate(
        #[case] today: i32,
        #[case] trend: f64,
        #[case] day: i32,
        #[case] expected: i32,
    ) {
        assert_eq!(extrapolate(today, trend, day), expected);
    }

    #[test]
    fn test_extrapolate_bounds() {
        for today in [0, 10, 50, 150, 500] {
            for trend in [-250.0, -5.0, 0.0, 5.0, 250.0] {
                for day in 1..=3 {
                    let v = extrapolate(today, trend, day);
                    assert!((FORECAST_MIN..=FORECAST_MAX).contains(&v));
                }
            }
        }
    }

    #[tokio::test]
    async fn test_weekly_timeline_from_store() {
        let store = MemoryStore::new();
        let now = Utc::now();
        for (days_ago, pm25) in [(3, 12.0), (2, 12.0), (1, 35.4)] {
            store
                .append(&new_snapshot(2, pm25, now - Duration::days(days_ago)))
                .await
                .unwrap();
        }
        store.append(&new_snapshot(2, 35.4, now)).await.unwrap();

        let timeline = weekly_timeline(&store, 2, now).await.unwrap();
        assert_eq!(aqis(&timeline), vec![50, 50, 100, 100, 100, 100, 100]);

        let unknown = weekly_timeline(&store, 6, now).await.unwrap();
        assert_eq!(unknown.len(), 4);
        assert_eq!(unknown[0].aqi, DEFAULT_AQI);
    }
}
