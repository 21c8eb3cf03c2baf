//! One fetch → normalize → append → persist → forecast → reconcile cycle per trigger.
//!
//! The [`Station`] owns the [`HistoryStore`]. [`Station::run_cycle`] takes `&mut self`,
//! so two triggers can never append concurrently.

use std::{fmt, mem};

use anyhow::{Context, Result};
use chrono::{DateTime, FixedOffset};
use tracing::{info, warn};

use crate::{
    Config,
    classify::{Category, classify},
    error::{CycleError, ParseError, PersistenceError, SecondarySourceError},
    forecast::extract_window,
    history::{CsvLog, HistoryStore},
    model::{ForecastWindow, Source, WeatherSample},
    normalize::{icon_url, normalize},
    provider::{WeatherProvider, provider_from_config},
    reconcile::{ReconciledView, reconcile},
    secondary::{CsvFeed, SecondaryFeed, Table, prepare_forecast_table, samples_from_rows},
};

/// Knobs the cycle needs besides its collaborators.
#[derive(Debug, Clone)]
pub struct StationSettings {
    pub icon_base_url: String,
    pub forecast_window: usize,
    pub reconcile_tail: usize,
    pub secondary_zone: FixedOffset,
    pub zone_label: String,
}

impl StationSettings {
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self {
            icon_base_url: config.provider.icon_base_url.clone(),
            forecast_window: config.display.forecast_window,
            reconcile_tail: config.display.reconcile_tail,
            secondary_zone: config.secondary_zone()?,
            zone_label: config.clock.zone_label.clone(),
        })
    }
}

/// Non-fatal problems raised while a cycle still produced a sample.
#[derive(Debug)]
pub enum Notice {
    NotPersisted(PersistenceError),
    HistoryUnreadable(PersistenceError),
    ForecastMalformed(ParseError),
    ForecastRowsDropped(usize),
    SecondaryUnavailable(SecondarySourceError),
    SecondaryRowsDropped { count: usize, first: ParseError },
    SecondaryShrank { seen: usize, now: usize },
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Notice::NotPersisted(err) => {
                write!(f, "Reading kept for this session but not saved: {err}")
            }
            Notice::HistoryUnreadable(err) => {
                write!(f, "Saved history could not be loaded, new readings still go to it: {err}")
            }
            Notice::ForecastMalformed(err) => {
                write!(f, "Forecast unavailable, the provider sent a malformed forecast: {err}")
            }
            Notice::ForecastRowsDropped(count) => {
                write!(f, "{count} forecast hour(s) were unreadable and skipped")
            }
            Notice::SecondaryUnavailable(err) => {
                write!(f, "OCR bulletin feed unavailable, showing primary data only: {err}")
            }
            Notice::SecondaryRowsDropped { count, first } => {
                write!(f, "{count} OCR bulletin row(s) could not be charted (first: {first})")
            }
            Notice::SecondaryShrank { seen, now } => write!(
                f,
                "OCR bulletin feed shrank to {now} rows after {seen} were read; \
                 reading it again from the start"
            ),
        }
    }
}

/// What the forecast part of a cycle produced.
#[derive(Debug, Clone, PartialEq)]
pub enum ForecastOutcome {
    /// The provider sent no hourly data.
    NotProvided,
    /// The hourly data was not usable at all.
    Malformed,
    Ready(ForecastWindow),
}

/// Everything a successful cycle hands to presentation.
#[derive(Debug)]
pub struct Snapshot {
    pub sample: WeatherSample,
    pub category: Category,
    pub icon_url: Option<String>,
    pub forecast: ForecastOutcome,
    pub comparison: ReconciledView,
    pub notices: Vec<Notice>,
}

#[derive(Debug, Default)]
pub enum CycleState {
    #[default]
    Idle,
    Fetching,
    Ready(Box<Snapshot>),
    Failed(CycleError),
}

impl CycleState {
    pub fn label(&self) -> &'static str {
        match self {
            CycleState::Idle => "idle",
            CycleState::Fetching => "fetching",
            CycleState::Ready(_) => "ready",
            CycleState::Failed(_) => "failed",
        }
    }
}

#[derive(Debug)]
pub struct Station {
    provider: Box<dyn WeatherProvider>,
    secondary: Option<Box<dyn SecondaryFeed>>,
    history: HistoryStore,
    settings: StationSettings,
    state: CycleState,
    /// Observation rows of the secondary feed already ingested.
    secondary_cursor: usize,
    pending: Vec<Notice>,
}

impl Station {
    pub fn new(
        provider: Box<dyn WeatherProvider>,
        secondary: Option<Box<dyn SecondaryFeed>>,
        history: HistoryStore,
        settings: StationSettings,
    ) -> Self {
        Self {
            provider,
            secondary,
            history,
            settings,
            state: CycleState::Idle,
            secondary_cursor: 0,
            pending: Vec::new(),
        }
    }

    /// Build the provider and feed from config and hydrate the primary history.
    ///
    /// A history file that cannot be read is reported on the first snapshot; it
    /// does not prevent the station from starting.
    pub fn from_config(config: &Config) -> Result<Self> {
        let provider = provider_from_config(config).context("Failed to set up weather provider")?;

        let secondary = config.secondary.observations_path.as_ref().map(|obs| {
            Box::new(CsvFeed::new(obs, config.secondary.forecast_path.clone()))
                as Box<dyn SecondaryFeed>
        });

        let mut history = HistoryStore::new(config.history.mode);
        let log = CsvLog::new(config.history_path()?).with_zone(config.zone()?);
        let hydrated = history.hydrate(Source::PrimaryApi, Box::new(log));

        let settings = StationSettings::from_config(config)?;
        let mut station = Self::new(provider, secondary, history, settings);
        if let Err(err) = hydrated {
            warn!(%err, "starting with empty primary history");
            station.pending.push(Notice::HistoryUnreadable(err));
        }

        Ok(station)
    }

    pub fn state(&self) -> &CycleState {
        &self.state
    }

    pub fn history(&self) -> &HistoryStore {
        &self.history
    }

    /// Run one full cycle stamped with `now` and return the resulting state.
    pub async fn run_cycle(&mut self, now: DateTime<FixedOffset>) -> &CycleState {
        self.state = CycleState::Fetching;

        self.state = match self.cycle(now).await {
            Ok(snapshot) => CycleState::Ready(Box::new(snapshot)),
            Err(err) => {
                warn!(%err, "cycle abandoned, history unchanged");
                CycleState::Failed(err)
            }
        };

        &self.state
    }

    async fn cycle(&mut self, now: DateTime<FixedOffset>) -> Result<Snapshot, CycleError> {
        let payload = self.provider.fetch().await?;
        let sample = normalize(&payload, Source::PrimaryApi, now)?;

        let mut notices = mem::take(&mut self.pending);

        if let Err(err) = self.history.append(sample.clone()) {
            notices.push(Notice::NotPersisted(err));
        }
        info!(
            temp = sample.temperature_c(),
            condition = sample.condition_text(),
            total = self.history.len(Source::PrimaryApi),
            "primary sample recorded"
        );

        let forecast = match extract_window(&payload, now, self.settings.forecast_window) {
            Ok(window) if window.is_empty() && window.dropped == 0 => ForecastOutcome::NotProvided,
            Ok(window) => {
                if window.dropped > 0 {
                    notices.push(Notice::ForecastRowsDropped(window.dropped));
                }
                ForecastOutcome::Ready(window)
            }
            Err(err) => {
                notices.push(Notice::ForecastMalformed(err));
                ForecastOutcome::Malformed
            }
        };

        self.ingest_secondary(&mut notices);

        let tail = self.settings.reconcile_tail;
        let comparison = reconcile(
            self.history.tail(Source::PrimaryApi, tail),
            self.history.tail(Source::SecondaryOcr, tail),
        );

        Ok(Snapshot {
            category: classify(sample.condition_text()),
            icon_url: icon_url(&payload, &self.settings.icon_base_url),
            sample,
            forecast,
            comparison,
            notices,
        })
    }

    /// Append observation rows the secondary feed gained since the last cycle.
    fn ingest_secondary(&mut self, notices: &mut Vec<Notice>) {
        let Some(feed) = &self.secondary else {
            return;
        };

        let table = match feed.observations() {
            Ok(table) => table,
            Err(err) => {
                warn!(%err, "secondary feed skipped this cycle");
                notices.push(Notice::SecondaryUnavailable(err));
                return;
            }
        };

        let total = table.rows.len();
        if total < self.secondary_cursor {
            // A shorter feed is a replaced one; its rows are all new.
            warn!(seen = self.secondary_cursor, now = total, "secondary feed restarted");
            notices.push(Notice::SecondaryShrank {
                seen: self.secondary_cursor,
                now: total,
            });
            self.secondary_cursor = 0;
        }

        let (samples, errors) =
            samples_from_rows(&table.rows[self.secondary_cursor..], self.settings.secondary_zone);
        self.secondary_cursor = total;

        for sample in samples {
            if let Err(err) = self.history.append(sample) {
                notices.push(Notice::NotPersisted(err));
            }
        }

        let count = errors.len();
        if let Some(first) = errors.into_iter().next() {
            notices.push(Notice::SecondaryRowsDropped { count, first });
        }
    }

    /// The secondary feed's hourly forecast, ready for display.
    ///
    /// `Ok(None)` when no feed or no forecast table is configured. The second
    /// element counts rows filtered out for an unreadable `Time`.
    pub fn secondary_forecast(&self) -> Result<Option<(Table, usize)>, SecondarySourceError> {
        let Some(feed) = &self.secondary else {
            return Ok(None);
        };

        Ok(feed
            .forecast()?
            .map(|table| prepare_forecast_table(table, &self.settings.zone_label)))
    }
}
