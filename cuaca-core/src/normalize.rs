//! Mapping of raw provider payloads into [`WeatherSample`]s.

use chrono::{DateTime, FixedOffset};
use serde_json::Value;

use crate::{
    error::NormalizationError,
    model::{Source, WeatherSample},
};

/// Build a sample from a "current conditions" document.
///
/// Only the first entry of `current.weather` is used. `now` becomes the sample
/// timestamp, so callers decide which clock and zone apply.
pub fn normalize(
    raw_payload: &Value,
    source: Source,
    now: DateTime<FixedOffset>,
) -> Result<WeatherSample, NormalizationError> {
    let current = raw_payload
        .get("current")
        .ok_or(NormalizationError::MissingField("current"))?;
    if !current.is_object() {
        return Err(NormalizationError::WrongType {
            field: "current",
            expected: "an object",
        });
    }

    let temperature_c = required_number(current, "temp", "current.temp")?;
    let humidity_pct = required_number(current, "humidity", "current.humidity")?;

    let conditions = current
        .get("weather")
        .ok_or(NormalizationError::MissingField("current.weather"))?
        .as_array()
        .ok_or(NormalizationError::WrongType {
            field: "current.weather",
            expected: "an array",
        })?;
    let first = conditions
        .first()
        .ok_or(NormalizationError::MissingField("current.weather[0]"))?;
    let condition_text = first
        .get("description")
        .ok_or(NormalizationError::MissingField("current.weather[0].description"))?
        .as_str()
        .ok_or(NormalizationError::WrongType {
            field: "current.weather[0].description",
            expected: "a string",
        })?;

    let wind_kmh = match current.get("wind_speed") {
        None | Some(Value::Null) => 0.0,
        Some(v) => v.as_f64().ok_or(NormalizationError::WrongType {
            field: "current.wind_speed",
            expected: "a number",
        })?,
    };

    Ok(WeatherSample::new(
        now,
        temperature_c,
        humidity_pct,
        condition_text,
        wind_kmh,
        source,
    ))
}

/// Display URL for the first condition's icon, e.g. `<base>/10d@2x.png`.
pub fn icon_url(raw_payload: &Value, icon_base: &str) -> Option<String> {
    let icon = raw_payload
        .pointer("/current/weather/0/icon")
        .and_then(Value::as_str)
        .filter(|icon| !icon.is_empty())?;

    Some(format!("{}/{icon}@2x.png", icon_base.trim_end_matches('/')))
}

fn required_number(
    object: &Value,
    key: &str,
    field: &'static str,
) -> Result<f64, NormalizationError> {
    object
        .get(key)
        .ok_or(NormalizationError::MissingField(field))?
        .as_f64()
        .ok_or(NormalizationError::WrongType {
            field,
            expected: "a number",
        })
}
