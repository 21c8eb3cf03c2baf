use std::{path::PathBuf, time::Duration};

use anyhow::{Context, Result};
use chrono::{DateTime, FixedOffset, Utc};
use clap::{Parser, Subcommand};
use cuaca_core::{
    Config, CsvLog, CycleState, PersistMode, RecordLog, Source, Station,
    secondary::{CsvFeed, SecondaryFeed, prepare_forecast_table},
};
use inquire::{Confirm, CustomType, Password, Select, Text};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

use crate::render;

/// Top-level CLI struct.
#[derive(Debug, Parser)]
#[command(name = "cuaca", version, about = "Live weather history for a fixed point")]
pub struct Cli {
    /// Use this config file instead of the platform default.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Interactively write the config file.
    Configure,

    /// Run one refresh cycle now and print the result.
    Once,

    /// Refresh periodically; press Enter to refresh immediately, Ctrl-C to stop.
    Watch {
        /// Minutes between refreshes; defaults to the configured interval.
        #[arg(long)]
        interval: Option<u64>,
    },

    /// Print the persisted primary history.
    History {
        /// Show only the most recent N readings.
        #[arg(long)]
        tail: Option<usize>,
    },

    /// Print the OCR bulletin's hourly forecast table.
    Forecast,
}

impl Cli {
    pub async fn run(self) -> Result<()> {
        let config = match &self.config {
            Some(path) => Config::load_from(path)?,
            None => Config::load()?,
        };

        match self.command {
            Command::Configure => configure(config, self.config),
            Command::Once => once(&config).await,
            Command::Watch { interval } => {
                let interval = interval
                    .map(|mins| Duration::from_secs(mins.max(1) * 60))
                    .unwrap_or_else(|| config.refresh_interval());
                watch(&config, interval).await
            }
            Command::History { tail } => history(&config, tail),
            Command::Forecast => forecast(&config),
        }
    }
}

fn configure(mut config: Config, path: Option<PathBuf>) -> Result<()> {
    let api_key = Password::new("OpenWeather API key:")
        .without_confirmation()
        .prompt()
        .context("Failed to read API key")?;
    if !api_key.trim().is_empty() {
        config.set_api_key(api_key.trim().to_string());
    }

    config.location.latitude = CustomType::<f64>::new("Latitude:")
        .with_default(config.location.latitude)
        .prompt()?;
    config.location.longitude = CustomType::<f64>::new("Longitude:")
        .with_default(config.location.longitude)
        .prompt()?;
    config.location.name = Text::new("Location name:")
        .with_default(&config.location.name)
        .prompt()?;

    let mode = Select::new("History persistence:", vec!["incremental", "rewrite"]).prompt()?;
    config.history.mode = match mode {
        "rewrite" => PersistMode::Rewrite,
        _ => PersistMode::Incremental,
    };

    if Confirm::new("Configure the OCR bulletin feed?").with_default(false).prompt()? {
        let obs = Text::new("Observations CSV path:").prompt()?;
        config.secondary.observations_path = Some(PathBuf::from(obs.trim()));

        let fc = Text::new("Hourly forecast CSV path (blank for none):").prompt()?;
        config.secondary.forecast_path =
            (!fc.trim().is_empty()).then(|| PathBuf::from(fc.trim()));
    }

    match &path {
        Some(path) => config.save_to(path)?,
        None => config.save()?,
    }
    println!("Configuration saved.");
    Ok(())
}

fn now_in(zone: FixedOffset) -> DateTime<FixedOffset> {
    Utc::now().with_timezone(&zone)
}

async fn once(config: &Config) -> Result<()> {
    let zone = config.zone()?;
    let mut station = Station::from_config(config)?;

    station.run_cycle(now_in(zone)).await;
    println!("{}", render::state(station.state(), station.history(), config));
    print_secondary_forecast(&station);
    Ok(())
}

async fn watch(config: &Config, interval: Duration) -> Result<()> {
    let zone = config.zone()?;
    let mut station = Station::from_config(config)?;
    println!("{}", render::state(station.state(), station.history(), config));

    let mut ticker = tokio::time::interval(interval);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;

    info!(interval_secs = interval.as_secs(), "watching");
    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            line = lines.next_line(), if stdin_open => match line {
                Ok(Some(_)) => ticker.reset(),
                Ok(None) => {
                    stdin_open = false;
                    continue;
                }
                Err(err) => {
                    warn!(%err, "manual trigger disabled");
                    stdin_open = false;
                    continue;
                }
            },
            _ = tokio::signal::ctrl_c() => break,
        }

        println!("{}", render::state(&CycleState::Fetching, station.history(), config));
        station.run_cycle(now_in(zone)).await;
        println!("{}", render::state(station.state(), station.history(), config));
        print_secondary_forecast(&station);
    }

    Ok(())
}

fn print_secondary_forecast(station: &Station) {
    match station.secondary_forecast() {
        Ok(Some((table, dropped))) => println!("{}", render::forecast_table(&table, dropped)),
        Ok(None) => {}
        Err(err) => println!("{}", render::notice_line(&err.to_string())),
    }
}

fn history(config: &Config, tail: Option<usize>) -> Result<()> {
    let path = config.history_path()?;
    let loaded = CsvLog::new(&path)
        .with_zone(config.zone()?)
        .load(Source::PrimaryApi)
        .with_context(|| format!("Failed to read history from {}", path.display()))?;
    if loaded.skipped > 0 {
        let skipped = format!("{} unreadable row(s) left out", loaded.skipped);
        println!("{}", render::notice_line(&skipped));
    }
    let samples = loaded.samples;

    let shown = match tail {
        Some(n) => &samples[samples.len().saturating_sub(n)..],
        None => &samples[..],
    };
    println!("{}", render::history(shown));
    Ok(())
}

fn forecast(config: &Config) -> Result<()> {
    let Some(obs) = &config.secondary.observations_path else {
        println!("No OCR bulletin feed configured.");
        return Ok(());
    };
    let feed = CsvFeed::new(obs, config.secondary.forecast_path.clone());

    match feed.forecast() {
        Ok(Some(table)) => {
            let (table, dropped) = prepare_forecast_table(table, &config.clock.zone_label);
            println!("{}", render::forecast_table(&table, dropped));
        }
        Ok(None) => println!("No OCR forecast table configured."),
        Err(err) => println!("{}", render::notice_line(&err.to_string())),
    }
    Ok(())
}
