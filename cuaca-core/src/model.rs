use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

/// Where a sample came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    /// Live HTTP weather API.
    PrimaryApi,
    /// Readings captured by OCR from the agency bulletin.
    SecondaryOcr,
}

impl Source {
    pub fn as_str(&self) -> &'static str {
        match self {
            Source::PrimaryApi => "primary_api",
            Source::SecondaryOcr => "secondary_ocr",
        }
    }
}

impl std::fmt::Display for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One observation at one instant.
///
/// Fields are private so a sample cannot change after construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherSample {
    timestamp: DateTime<FixedOffset>,
    temperature_c: f64,
    humidity_pct: f64,
    condition_text: String,
    wind_kmh: f64,
    source: Source,
}

impl WeatherSample {
    pub fn new(
        timestamp: DateTime<FixedOffset>,
        temperature_c: f64,
        humidity_pct: f64,
        condition_text: impl Into<String>,
        wind_kmh: f64,
        source: Source,
    ) -> Self {
        Self {
            timestamp,
            temperature_c,
            humidity_pct,
            condition_text: condition_text.into(),
            wind_kmh,
            source,
        }
    }

    pub fn timestamp(&self) -> DateTime<FixedOffset> {
        self.timestamp
    }

    pub fn temperature_c(&self) -> f64 {
        self.temperature_c
    }

    pub fn humidity_pct(&self) -> f64 {
        self.humidity_pct
    }

    pub fn condition_text(&self) -> &str {
        &self.condition_text
    }

    pub fn wind_kmh(&self) -> f64 {
        self.wind_kmh
    }

    pub fn source(&self) -> Source {
        self.source
    }
}

/// One entry of the forward-looking forecast window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastPoint {
    pub at: DateTime<FixedOffset>,
    /// `HH:MM` in the zone of the extraction clock.
    pub local_time_of_day: String,
    pub temperature_c: f64,
    pub condition_text: String,
}

/// Result of one forecast extraction.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ForecastWindow {
    pub points: Vec<ForecastPoint>,
    /// Entries inside the window that were malformed and skipped.
    pub dropped: usize,
}

impl ForecastWindow {
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}
