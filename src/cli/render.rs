//! Human-readable terminal output.

use super::{CurrentReading, HistoryReport};
use crate::aqi::AqiCategory;
use crate::forecast::TimelinePoint;
use crate::jobs::CycleReport;
use crate::models::{District, MetricStats, Snapshot};
use colored::*;
use comfy_table::presets::UTF8_FULL;
use comfy_table::{Cell, Color, ContentArrangement, Table};

fn table(header: Vec<&str>) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(header);
    table
}

fn category_color(category: AqiCategory) -> Color {
    match category {
        AqiCategory::Good => Color::Green,
        AqiCategory::Moderate => Color::Yellow,
        AqiCategory::UnhealthySensitive => Color::DarkYellow,
        AqiCategory::Unhealthy => Color::Red,
        AqiCategory::VeryUnhealthy => Color::Magenta,
        AqiCategory::Hazardous => Color::DarkRed,
    }
}

fn aqi_cell(aqi: i32) -> Cell {
    aqi_cell_with(aqi, AqiCategory::from_index(aqi))
}

fn aqi_cell_with(aqi: i32, category: AqiCategory) -> Cell {
    Cell::new(aqi).fg(category_color(category))
}

fn optional(value: Option<f64>) -> String {
    value.map(|v| format!("{:.1}", v)).unwrap_or_else(|| "-".to_string())
}

pub fn print_message(message: &str) {
    println!("{}", message.green());
}

pub fn print_current(current: &CurrentReading) {
    let p = &current.reading.pollutants;
    println!(
        "{} {} ({})",
        "Current air quality for".cyan().bold(),
        current.district.bold(),
        current.reading.source
    );
    println!(
        "AQI {} - {}",
        current.aqi.value.to_string().bold(),
        current.aqi.category.label()
    );

    let mut t = table(vec!["PM2.5", "PM10", "NO2", "SO2", "CO", "O3"]);
    t.add_row(vec![
        format!("{:.1}", p.pm25),
        format!("{:.1}", p.pm10),
        format!("{:.1}", p.no2),
        format!("{:.1}", p.so2),
        format!("{:.1}", p.co),
        format!("{:.1}", p.o3),
    ]);
    println!("{t}");

    if let Some(w) = &current.reading.weather {
        println!(
            "Temperature {} °C, humidity {} %, pressure {} hPa, wind {} m/s",
            optional(w.temperature),
            optional(w.humidity),
            optional(w.pressure),
            optional(w.wind_speed)
        );
    }
}

pub fn print_snapshots(rows: &[Snapshot]) {
    if rows.is_empty() {
        println!("{}", "No rows in this window".yellow());
        return;
    }
    let mut t = table(vec!["Measured at", "AQI", "Status", "PM2.5", "PM10", "Temp", "Source"]);
    for row in rows {
        t.add_row(vec![
            Cell::new(row.measured_at.format("%Y-%m-%d %H:%M")),
            aqi_cell_with(row.aqi, row.category()),
            Cell::new(&row.aqi_status),
            Cell::new(format!("{:.1}", row.pm25)),
            Cell::new(format!("{:.1}", row.pm10)),
            Cell::new(optional(row.temperature)),
            Cell::new(&row.source),
        ]);
    }
    println!("{t}");
}

pub fn print_history(report: &HistoryReport) {
    println!(
        "{} {} ({})",
        "History for district".cyan().bold(),
        report.district_id,
        report.period
    );
    print_snapshots(&report.snapshots);

    let stats = &report.stats;
    println!("Based on {} records", stats.total_records);
    let mut t = table(vec!["Metric", "Min", "Max", "Avg"]);
    let metrics: [(&str, Option<MetricStats>); 5] = [
        ("AQI", stats.aqi),
        ("PM2.5", stats.pm25),
        ("PM10", stats.pm10),
        ("Temperature", stats.temperature),
        ("Humidity", stats.humidity),
    ];
    for (name, m) in metrics {
        match m {
            Some(m) => t.add_row(vec![
                name.to_string(),
                format!("{:.1}", m.min),
                format!("{:.1}", m.max),
                format!("{:.1}", m.avg),
            ]),
            None => t.add_row(vec![name, "-", "-", "-"]),
        };
    }
    println!("{t}");
}

pub fn print_timeline(points: &[TimelinePoint]) {
    let mut t = table(vec!["Date", "AQI", ""]);
    for p in points {
        let marker = if p.is_current {
            "today"
        } else if p.is_future {
            "trend"
        } else {
            ""
        };
        t.add_row(vec![
            Cell::new(p.date.format("%a %d %b")),
            aqi_cell(p.aqi),
            Cell::new(marker),
        ]);
    }
    println!("{t}");
}

pub fn print_cycle(report: &CycleReport) {
    let mut t = table(vec!["District", "AQI", "Source"]);
    for s in &report.stored {
        t.add_row(vec![
            Cell::new(s.district_id),
            aqi_cell(s.aqi.value),
            Cell::new(s.source),
        ]);
    }
    println!("{t}");
    if report.is_complete() {
        println!("{}", format!("Stored {} readings", report.stored.len()).green());
    } else {
        for f in &report.failed {
            println!(
                "{} district {}: {}",
                "Failed".red(),
                f.district_id,
                f.reason
            );
        }
    }
}

pub fn print_districts(districts: &[District]) {
    let mut t = table(vec![
        "Id",
        "Name",
        "Lat",
        "Lon",
        "Population",
        "Trees %",
        "Traffic",
        "Industrial zones",
    ]);
    for d in districts {
        t.add_row(vec![
            d.id.to_string(),
            d.name.clone(),
            format!("{:.4}", d.latitude),
            format!("{:.4}", d.longitude),
            d.population.to_string(),
            format!("{:.0}", d.tree_coverage_percent),
            format!("{:.0}", d.traffic_level),
            d.industrial_zones.to_string(),
        ]);
    }
    println!("{t}");
}
