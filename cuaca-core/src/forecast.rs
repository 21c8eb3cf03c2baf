//! Forward-looking forecast window taken from the provider's hourly array.

use chrono::{DateTime, FixedOffset};
use serde_json::Value;
use tracing::warn;

use crate::{
    error::ParseError,
    model::{ForecastPoint, ForecastWindow},
};

pub const DEFAULT_WINDOW_SIZE: usize = 12;

/// Take the first `window_size` hourly entries, localized to `now`'s zone.
///
/// The provider delivers entries in chronological order, so nothing is sorted here.
/// A payload without `hourly` yields an empty window; a malformed entry is skipped
/// and counted in [`ForecastWindow::dropped`].
pub fn extract_window(
    raw_payload: &Value,
    now: DateTime<FixedOffset>,
    window_size: usize,
) -> Result<ForecastWindow, ParseError> {
    let hourly = match raw_payload.get("hourly") {
        None | Some(Value::Null) => return Ok(ForecastWindow::default()),
        Some(Value::Array(entries)) => entries,
        Some(other) => {
            return Err(ParseError::new("hourly", other.to_string(), "expected an array"));
        }
    };

    let zone = *now.offset();
    let mut window = ForecastWindow::default();

    for entry in hourly.iter().take(window_size) {
        match forecast_point(entry, zone) {
            Ok(point) => window.points.push(point),
            Err(err) => {
                warn!(%err, "dropping malformed forecast entry");
                window.dropped += 1;
            }
        }
    }

    Ok(window)
}

fn forecast_point(entry: &Value, zone: FixedOffset) -> Result<ForecastPoint, ParseError> {
    let dt = entry
        .get("dt")
        .and_then(Value::as_i64)
        .ok_or_else(|| {
            ParseError::new("hourly.dt", entry_field(entry, "dt"), "expected epoch seconds")
        })?;
    let at = DateTime::from_timestamp(dt, 0)
        .ok_or_else(|| ParseError::new("hourly.dt", dt.to_string(), "timestamp out of range"))?
        .with_timezone(&zone);

    let temperature_c = entry
        .get("temp")
        .and_then(Value::as_f64)
        .ok_or_else(|| {
            ParseError::new("hourly.temp", entry_field(entry, "temp"), "expected a number")
        })?;

    let condition_text = entry
        .pointer("/weather/0/description")
        .and_then(Value::as_str)
        .map(capitalize)
        .unwrap_or_default();

    Ok(ForecastPoint {
        at,
        local_time_of_day: at.format("%H:%M").to_string(),
        temperature_c,
        condition_text,
    })
}

fn entry_field(entry: &Value, key: &str) -> String {
    entry.get(key).map(Value::to_string).unwrap_or_default()
}

/// Upper-case the first character and lower-case the rest.
pub fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}
