//! Handles Command Line Interface (CLI) related functionalities.
//!
//! Includes defining commands, parsing arguments, handling user interaction (prompts, menus),
//! and the `App` that wires configuration, the history store and the provider chain together.

mod commands;
mod render;

pub use commands::*;
use crate::error::{AppError, Result};
use crate::models::{District, Period};
use clap::{Args, Parser, Subcommand};
use dialoguer::{theme::ColorfulTheme, FuzzySelect, Input, Select};

/// Air quality pipeline for the districts of Lviv
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Use a process-local store instead of PostgreSQL (data is lost on exit)
    #[arg(long, global = true)]
    pub in_memory: bool,

    /// Print results as a JSON success/failure envelope
    #[arg(long, global = true)]
    pub json: bool,

    /// Runs the interactive menu when omitted
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Initialize the database schema
    InitDb,

    /// Run the collect and cleanup scheduler until Ctrl-C
    Serve,

    /// Run one collection cycle across all districts
    Collect,

    /// Delete snapshots older than the retention horizon
    Prune(PruneArgs),

    /// Delete forecast rows dated in the past
    PruneForecasts,

    /// Fetch a live reading for a district (not stored)
    Current(DistrictArgs),

    /// Show stored snapshots and aggregate stats for a district
    History(HistoryArgs),

    /// Show the 7-day AQI timeline for a district
    Weekly(DistrictArgs),

    /// Show upcoming forecast rows for a district
    Forecasts(ForecastArgs),

    /// List the monitored districts
    Districts,
}

#[derive(Args, Debug, Clone)]
pub struct DistrictArgs {
    /// District id (1-6)
    #[arg(short, long)]
    pub district: i32,
}

#[derive(Args, Debug, Clone)]
pub struct HistoryArgs {
    /// District id (1-6)
    #[arg(short, long)]
    pub district: i32,

    /// Trailing window: 1h, 24h, 7d or 30d
    #[arg(short, long, default_value = "24h")]
    pub period: String,
}

#[derive(Args, Debug, Clone)]
pub struct ForecastArgs {
    /// District id (1-6)
    #[arg(short, long)]
    pub district: i32,

    /// How many hours ahead to show (1-168)
    #[arg(long, default_value = "24")]
    pub hours: i64,
}

#[derive(Args, Debug, Clone)]
pub struct PruneArgs {
    /// Retention horizon in days (default: RETENTION_DAYS)
    #[arg(short, long)]
    pub days: Option<i64>,
}

/// Prompts for a district with fuzzy search over its name.
pub fn prompt_district(districts: &[District]) -> Result<i32> {
    let items: Vec<String> = districts
        .iter()
        .map(|d| format!("{} ({})", d.name, d.id))
        .collect();
    let index = FuzzySelect::with_theme(&ColorfulTheme::default())
        .with_prompt("Select a district")
        .items(&items)
        .default(0)
        .interact_opt()?
        .ok_or_else(|| AppError::Cli("District selection cancelled".to_string()))?;
    Ok(districts[index].id)
}

pub fn prompt_period() -> Result<String> {
    let items: Vec<&str> = Period::ALL.iter().map(|p| p.as_str()).collect();
    let index = Select::with_theme(&ColorfulTheme::default())
        .with_prompt("Select a period")
        .items(&items)
        .default(1)
        .interact_opt()?
        .ok_or_else(|| AppError::Cli("Period selection cancelled".to_string()))?;
    Ok(items[index].to_string())
}

pub fn prompt_hours() -> Result<i64> {
    Input::<i64>::with_theme(&ColorfulTheme::default())
        .with_prompt("Hours ahead")
        .default(24)
        .interact_text()
        .map_err(AppError::from)
}

pub fn prompt_days(default: i64) -> Result<i64> {
    Input::<i64>::with_theme(&ColorfulTheme::default())
        .with_prompt("Retention horizon (days)")
        .default(default)
        .interact_text()
        .map_err(AppError::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_subcommands() {
        let cli = Cli::parse_from(["ecolviv-pipeline", "history", "-d", "3", "-p", "7d"]);
        match cli.command {
            Some(Commands::History(args)) => {
                assert_eq!(args.district, 3);
                assert_eq!(args.period, "7d");
            },
            other => panic!("unexpected command: {:?}", other),
        }

        let cli = Cli::parse_from([
            "ecolviv-pipeline",
            "--in-memory",
            "--json",
            "forecasts",
            "-d",
            "1",
        ]);
        assert!(cli.in_memory && cli.json);
        assert!(matches!(cli.command, Some(Commands::Forecasts(ForecastArgs { hours: 24, .. }))));

        let cli = Cli::parse_from(["ecolviv-pipeline", "prune"]);
        assert!(matches!(cli.command, Some(Commands::Prune(PruneArgs { days: None }))));
    }

    #[test]
    fn test_no_subcommand_means_menu() {
        let cli = Cli::parse_from(["ecolviv-pipeline"]);
        assert!(cli.command.is_none());
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::parse_from(["ecolviv-pipeline", "weekly", "--district", "2", "--json"]);
        assert!(cli.json);
        assert!(!cli.in_memory);
    }
}
