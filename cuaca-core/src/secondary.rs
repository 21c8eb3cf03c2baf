//! OCR-derived secondary feed, delivered as append-only tables.
//!
//! The observations table carries `Time, Temperature, Humidity, Weather, Wind_kmh`.
//! The optional hourly forecast table carries a `Time` column in `HH.MM` or
//! `HH:MM` form and sometimes a `Capture Time` column that is never displayed.

use std::{
    collections::HashMap,
    fmt::Debug,
    path::{Path, PathBuf},
    sync::LazyLock,
};

use chrono::{DateTime, FixedOffset, NaiveDateTime};
use regex::Regex;
use tracing::{debug, warn};

use crate::{
    error::{ParseError, SecondarySourceError},
    model::{Source, WeatherSample},
};

pub const CAPTURE_TIME_COLUMN: &str = "Capture Time";

static FORECAST_TIME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d{2})[.:](\d{2})$").expect("static pattern is valid"));

const NAIVE_TIME_FORMATS: &[&str] =
    &["%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M", "%Y-%m-%dT%H:%M:%S"];

pub type Row = HashMap<String, String>;

/// Rows of one table, each a column-name to cell mapping, plus the header order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    pub headers: Vec<String>,
    pub rows: Vec<Row>,
}

impl Table {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Cells of `row` in header order, blank where the row has no value.
    pub fn cells<'a>(&'a self, row: &'a Row) -> impl Iterator<Item = &'a str> + 'a {
        self.headers
            .iter()
            .map(move |h| row.get(h).map(String::as_str).unwrap_or(""))
    }
}

/// Read access to the secondary feed's tables.
pub trait SecondaryFeed: Send + Debug {
    /// All observation records, oldest first.
    fn observations(&self) -> Result<Table, SecondarySourceError>;

    /// The hourly forecast table, if the feed publishes one.
    fn forecast(&self) -> Result<Option<Table>, SecondarySourceError>;
}

/// Secondary feed exported as CSV files with header rows.
#[derive(Debug, Clone)]
pub struct CsvFeed {
    observations_path: PathBuf,
    forecast_path: Option<PathBuf>,
}

impl CsvFeed {
    pub fn new(observations_path: impl Into<PathBuf>, forecast_path: Option<PathBuf>) -> Self {
        Self {
            observations_path: observations_path.into(),
            forecast_path,
        }
    }
}

impl SecondaryFeed for CsvFeed {
    fn observations(&self) -> Result<Table, SecondarySourceError> {
        let table = read_table(&self.observations_path)?;
        if table.is_empty() {
            return Err(SecondarySourceError::Empty(self.observations_path.clone()));
        }
        Ok(table)
    }

    fn forecast(&self) -> Result<Option<Table>, SecondarySourceError> {
        self.forecast_path.as_deref().map(read_table).transpose()
    }
}

fn read_table(path: &Path) -> Result<Table, SecondarySourceError> {
    let unreachable = |source| SecondarySourceError::Unreachable {
        path: path.to_path_buf(),
        source,
    };

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(unreachable)?;

    // OCR output is not guaranteed to be UTF-8; a bad cell should cost one row at most.
    let headers: Vec<String> = reader
        .byte_headers()
        .map_err(unreachable)?
        .iter()
        .map(lossy)
        .collect();

    let mut rows = Vec::new();
    for record in reader.byte_records() {
        let record = record.map_err(unreachable)?;
        let row: Row = headers.iter().cloned().zip(record.iter().map(lossy)).collect();
        rows.push(row);
    }

    debug!(path = %path.display(), rows = rows.len(), "secondary table read");
    Ok(Table { headers, rows })
}

fn lossy(field: &[u8]) -> String {
    String::from_utf8_lossy(field).into_owned()
}

/// Convert observation rows into samples, zoned with the feed's own offset.
///
/// `Time` and `Temperature` must parse or the row is dropped and reported.
/// `Humidity` and `Wind_kmh` fall back to 0 when blank or unreadable.
pub fn samples_from_rows(
    rows: &[Row],
    zone: FixedOffset,
) -> (Vec<WeatherSample>, Vec<ParseError>) {
    let mut samples = Vec::with_capacity(rows.len());
    let mut errors = Vec::new();

    for row in rows {
        match sample_from_row(row, zone) {
            Ok(sample) => samples.push(sample),
            Err(err) => {
                warn!(%err, "dropping secondary observation");
                errors.push(err);
            }
        }
    }

    (samples, errors)
}

fn sample_from_row(row: &Row, zone: FixedOffset) -> Result<WeatherSample, ParseError> {
    let time = cell(row, "Time");
    let timestamp = parse_timestamp(time, zone)?;

    let temperature = cell(row, "Temperature");
    let temperature_c = parse_number(temperature)
        .ok_or_else(|| ParseError::new("Temperature", temperature, "not a number"))?;

    let humidity_pct = parse_number(cell(row, "Humidity")).unwrap_or(0.0);
    let wind_kmh = parse_number(cell(row, "Wind_kmh")).unwrap_or(0.0);

    Ok(WeatherSample::new(
        timestamp,
        temperature_c,
        humidity_pct,
        cell(row, "Weather"),
        wind_kmh,
        Source::SecondaryOcr,
    ))
}

fn cell<'a>(row: &'a Row, column: &str) -> &'a str {
    row.get(column).map(|v| v.trim()).unwrap_or("")
}

/// Parse an RFC 3339 instant, or a naive local time interpreted in `zone`.
pub fn parse_timestamp(
    value: &str,
    zone: FixedOffset,
) -> Result<DateTime<FixedOffset>, ParseError> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Ok(ts);
    }

    NAIVE_TIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
        .and_then(|naive| naive.and_local_timezone(zone).single())
        .ok_or_else(|| ParseError::new("Time", value, "not a recognised date-time"))
}

/// Lenient number parsing for OCR output: `24,5`, `24.5 °C`, `80%`, `5 km/h`.
pub fn parse_number(value: &str) -> Option<f64> {
    let trimmed = value
        .trim()
        .trim_end_matches("km/h")
        .trim_end_matches('%')
        .trim_end_matches("°C")
        .trim_end_matches('C')
        .trim_end_matches('°')
        .trim();
    if trimmed.is_empty() {
        return None;
    }

    trimmed
        .replace(',', ".")
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
}

/// Prepare the hourly forecast table for display.
///
/// Drops the `Capture Time` column, keeps only rows whose `Time` looks like
/// `HH.MM`/`HH:MM`, rewrites it as `HH:MM <zone_label>` and sorts by time of day.
/// Returns the table and the number of rows filtered out.
pub fn prepare_forecast_table(table: Table, zone_label: &str) -> (Table, usize) {
    let headers: Vec<String> = table
        .headers
        .into_iter()
        .filter(|h| h != CAPTURE_TIME_COLUMN)
        .collect();

    let total = table.rows.len();
    let mut keyed: Vec<((u32, u32), Row)> = table
        .rows
        .into_iter()
        .filter_map(|mut row| {
            row.remove(CAPTURE_TIME_COLUMN);
            let (hour, minute) = forecast_time(cell(&row, "Time"))?;
            row.insert("Time".to_string(), format!("{hour:02}:{minute:02} {zone_label}"));
            Some(((hour, minute), row))
        })
        .collect();
    let dropped = total - keyed.len();
    if dropped > 0 {
        warn!(dropped, "forecast rows with unreadable Time filtered out");
    }

    keyed.sort_by_key(|(key, _)| *key);

    let rows = keyed.into_iter().map(|(_, row)| row).collect();
    (Table { headers, rows }, dropped)
}

fn forecast_time(value: &str) -> Option<(u32, u32)> {
    let caps = FORECAST_TIME.captures(value)?;
    let hour = caps[1].parse().ok()?;
    let minute = caps[2].parse().ok()?;
    Some((hour, minute))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn wib() -> FixedOffset {
        FixedOffset::east_opt(7 * 3600).unwrap()
    }

    fn row(pairs: &[(&str, &str)]) -> Row {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn forecast_rows_are_normalized_and_sorted() {
        let table = Table {
            headers: vec!["Time".into(), "Weather".into(), CAPTURE_TIME_COLUMN.into()],
            rows: vec![
                row(&[("Time", "14.00"), ("Weather", "Hujan"), (CAPTURE_TIME_COLUMN, "x")]),
                row(&[("Time", "09:15"), ("Weather", "Cerah"), (CAPTURE_TIME_COLUMN, "y")]),
            ],
        };

        let (prepared, dropped) = prepare_forecast_table(table, "WIB");

        assert_eq!(dropped, 0);
        assert_eq!(prepared.headers, vec!["Time".to_string(), "Weather".to_string()]);
        let times: Vec<&str> = prepared.rows.iter().map(|r| r["Time"].as_str()).collect();
        assert_eq!(times, vec!["09:15 WIB", "14:00 WIB"]);
        assert!(prepared.rows.iter().all(|r| !r.contains_key(CAPTURE_TIME_COLUMN)));
    }

    #[test]
    fn forecast_rows_with_odd_time_are_filtered() {
        let table = Table {
            headers: vec!["Time".into()],
            rows: vec![
                row(&[("Time", "9.00")]),
                row(&[("Time", "Pagi")]),
                row(&[("Time", "21:00 WIB")]),
                row(&[("Time", "")]),
                row(&[("Time", "06.30")]),
            ],
        };

        let (prepared, dropped) = prepare_forecast_table(table, "WIB");
        assert_eq!(dropped, 4);
        assert_eq!(prepared.rows.len(), 1);
        assert_eq!(prepared.rows[0]["Time"], "06:30 WIB");
    }

    #[test]
    fn observation_rows_become_secondary_samples() {
        let rows = vec![
            row(&[
                ("Time", "2024-01-01 08:00:00"),
                ("Temperature", "24,5 °C"),
                ("Humidity", "80%"),
                ("Weather", "Hujan Ringan"),
                ("Wind_kmh", "5 km/h"),
            ]),
            row(&[("Time", "2024-01-01T09:00:00+08:00"), ("Temperature", "25")]),
        ];

        let (samples, errors) = samples_from_rows(&rows, wib());

        assert!(errors.is_empty());
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[0].temperature_c(), 24.5);
        assert_eq!(samples[0].humidity_pct(), 80.0);
        assert_eq!(samples[0].wind_kmh(), 5.0);
        assert_eq!(samples[0].source(), Source::SecondaryOcr);
        assert_eq!(samples[0].timestamp().to_rfc3339(), "2024-01-01T08:00:00+07:00");
        assert_eq!(samples[1].timestamp().offset().local_minus_utc(), 8 * 3600);
        assert_eq!(samples[1].wind_kmh(), 0.0);
    }

    #[test]
    fn unparseable_rows_are_dropped_and_reported() {
        let rows = vec![
            row(&[("Time", "kemarin"), ("Temperature", "24")]),
            row(&[("Time", "2024-01-01 10:00"), ("Temperature", "??")]),
            row(&[("Time", "2024-01-01 11:00"), ("Temperature", "26.1")]),
        ];

        let (samples, errors) = samples_from_rows(&rows, wib());
        assert_eq!(samples.len(), 1);
        assert_eq!(errors.len(), 2);
        assert_eq!(errors[0].field, "Time");
        assert_eq!(errors[1].field, "Temperature");
    }

    #[test]
    fn parse_number_rejects_garbage() {
        assert_eq!(parse_number(" 23.4C "), Some(23.4));
        assert_eq!(parse_number(""), None);
        assert_eq!(parse_number("NaN"), None);
        assert_eq!(parse_number("abc"), None);
    }

    #[test]
    fn csv_feed_reads_tables() {
        let dir = tempfile::tempdir().unwrap();
        let obs = dir.path().join("obs.csv");
        let fc = dir.path().join("forecast.csv");
        fs::write(
            &obs,
            "Time,Temperature,Humidity,Weather,Wind_kmh\n2024-01-01 08:00,24.0,81,Berawan,3\n",
        )
        .unwrap();
        fs::write(&fc, "Time,Weather,Capture Time\n14.00,Hujan,2024-01-01 07:55\n").unwrap();

        let feed = CsvFeed::new(&obs, Some(fc));
        let table = feed.observations().unwrap();
        assert_eq!(table.rows.len(), 1);
        assert_eq!(table.rows[0]["Weather"], "Berawan");
        assert_eq!(table.cells(&table.rows[0]).collect::<Vec<_>>()[0], "2024-01-01 08:00");

        let forecast = feed.forecast().unwrap().unwrap();
        assert_eq!(forecast.headers.len(), 3);
    }

    #[test]
    fn undecodable_bytes_cost_only_their_row() {
        let dir = tempfile::tempdir().unwrap();
        let obs = dir.path().join("obs.csv");
        let mut bytes = b"Time,Temperature,Humidity,Weather,Wind_kmh\n\
                          2024-01-01 08:00,24.0,81,Berawan,3\n\
                          2024-01-01 09:00,"
            .to_vec();
        bytes.extend_from_slice(&[0xff, 0xfe]);
        bytes.extend_from_slice(b",80,Hujan,2\n2024-01-01 10:00,25.5,77,Cer\xe1h,1\n");
        fs::write(&obs, bytes).unwrap();

        let table = CsvFeed::new(&obs, None).observations().unwrap();
        assert_eq!(table.rows.len(), 3);

        let (samples, errors) = samples_from_rows(&table.rows, wib());
        assert_eq!(samples.len(), 2);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "Temperature");
        assert_eq!(samples[1].temperature_c(), 25.5);
        assert_eq!(samples[1].condition_text(), "Cer\u{fffd}h");
    }

    #[test]
    fn csv_feed_errors_are_distinct() {
        let dir = tempfile::tempdir().unwrap();
        let missing = CsvFeed::new(dir.path().join("missing.csv"), None);
        assert!(matches!(
            missing.observations(),
            Err(SecondarySourceError::Unreachable { .. })
        ));
        assert!(missing.forecast().unwrap().is_none());

        let empty_path = dir.path().join("empty.csv");
        fs::write(&empty_path, "Time,Temperature,Humidity,Weather,Wind_kmh\n").unwrap();
        let empty = CsvFeed::new(&empty_path, None);
        assert!(matches!(empty.observations(), Err(SecondarySourceError::Empty(_))));
    }
}
