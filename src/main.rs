mod api;
mod aqi;
mod cli;
mod config;
mod db;
mod error;
mod forecast;
mod jobs;
mod logging;
mod models;

use clap::Parser;
use cli::{App, Cli, Commands, DistrictArgs, ForecastArgs, HistoryArgs, PruneArgs};
use colored::*;
use config::Config;
use dialoguer::{theme::ColorfulTheme, Select};
use error::Result;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env()?;
    let _log_guard = logging::init(&config)?;
    let cli = Cli::parse();

    info!("Initializing air quality pipeline...");

    let app = match App::new(config, cli.in_memory, cli.json).await {
        Ok(app) => app,
        Err(e) => {
            error!("Failed to initialize application: {:?}", e);
            eprintln!(
                "{}",
                "Error: Failed to initialize application. Check logs.".red()
            );
            return Err(e);
        },
    };

    if let Some(command) = cli.command {
        return app.run_command(command).await;
    }

    println!("{}", "Welcome to the EcoLviv air quality pipeline!".cyan().bold());
    run_menu(&app).await
}

/// Builds the command for a menu entry, prompting for its arguments.
fn menu_command(app: &App, selection: usize) -> Result<Option<Commands>> {
    let command = match selection {
        0 => Commands::InitDb,
        1 => Commands::Collect,
        2 => Commands::Current(DistrictArgs {
            district: cli::prompt_district(app.districts())?,
        }),
        3 => Commands::History(HistoryArgs {
            district: cli::prompt_district(app.districts())?,
            period: cli::prompt_period()?,
        }),
        4 => Commands::Weekly(DistrictArgs {
            district: cli::prompt_district(app.districts())?,
        }),
        5 => Commands::Forecasts(ForecastArgs {
            district: cli::prompt_district(app.districts())?,
            hours: cli::prompt_hours()?,
        }),
        6 => Commands::Prune(PruneArgs {
            days: Some(cli::prompt_days(app.retention_days())?),
        }),
        7 => Commands::Districts,
        8 => Commands::Serve,
        _ => return Ok(None),
    };
    Ok(Some(command))
}

async fn run_menu(app: &App) -> Result<()> {
    let options = &[
        "Initialize Database Schema",
        "Collect Readings Now",
        "Current Reading for a District",
        "History for a District",
        "Weekly Timeline for a District",
        "Upcoming Forecasts for a District",
        "Prune Old Snapshots",
        "List Districts",
        "Start Scheduler (Ctrl-C to stop)",
        "Exit",
    ];

    loop {
        let selection = Select::with_theme(&ColorfulTheme::default())
            .with_prompt("What would you like to do?")
            .items(options)
            .default(0)
            .interact_opt()?
            .unwrap_or(options.len() - 1);

        println!("\n---\n");

        let command = match menu_command(app, selection) {
            Ok(Some(command)) => command,
            Ok(None) => {
                println!("{}", "Exiting application. Goodbye!".green());
                break;
            },
            Err(e) => {
                println!("{} {}", "Failed to get input:".red(), e);
                continue;
            },
        };

        if let Err(e) = app.run_command(command).await {
            error!("Command execution failed: {:?}", e);
            println!(
                "{} {}",
                "Error executing command:".red(),
                e.to_string().red()
            );
        }

        println!("\n---\n");
    }

    Ok(())
}
