//! Plain-text presentation. Every function here is a pure mapping to a `String`.

use std::fmt::Write;

use cuaca_core::{
    Config, CycleError, FetchError, HistoryStore, NormalizationError, Source, WeatherSample,
    secondary::Table,
    station::{CycleState, ForecastOutcome, Snapshot},
};

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub fn state(state: &CycleState, history: &HistoryStore, config: &Config) -> String {
    let label = &config.clock.zone_label;

    match state {
        CycleState::Idle => match history.latest(Source::PrimaryApi) {
            Some(last) => format!(
                "Waiting for the next refresh. Last saved reading: {:.1} °C, {} at {}",
                last.temperature_c(),
                last.condition_text(),
                last.timestamp().format(TIME_FORMAT),
            ),
            None => no_data(),
        },
        CycleState::Fetching => {
            format!("Fetching current conditions for {}...", config.location.name)
        }
        CycleState::Failed(err) => {
            let mut out = notice_line(&describe_failure(err));
            match history.latest(Source::PrimaryApi) {
                Some(last) => {
                    let _ = write!(
                        out,
                        "\nLast good reading: {:.1} °C, {} at {} {label}",
                        last.temperature_c(),
                        last.condition_text(),
                        last.timestamp().format(TIME_FORMAT),
                    );
                }
                None => {
                    out.push('\n');
                    out.push_str(&no_data());
                }
            }
            out
        }
        CycleState::Ready(snapshot) => ready(snapshot, config),
    }
}

fn no_data() -> String {
    "No data yet.".to_string()
}

pub fn notice_line(text: &str) -> String {
    format!("⚠️  {text}")
}

/// One message per failure kind, so the reader can tell them apart.
pub fn describe_failure(err: &CycleError) -> String {
    match err {
        CycleError::Fetch(FetchError::Timeout) => {
            "Weather provider did not answer in time; will retry on the next refresh.".to_string()
        }
        CycleError::Fetch(FetchError::MissingApiKey) => {
            "No API key configured. Run `cuaca configure` or set OPENWEATHER_API_KEY.".to_string()
        }
        CycleError::Fetch(FetchError::Status { status, .. }) => {
            format!("Weather provider refused the request ({status}).")
        }
        CycleError::Fetch(FetchError::MalformedJson(_)) => {
            "Weather provider sent a response that is not valid JSON.".to_string()
        }
        CycleError::Fetch(FetchError::Transport(err)) => {
            format!("Could not reach the weather provider: {err}")
        }
        CycleError::Normalization(NormalizationError::MissingField(field)) => {
            format!("Provider data is incomplete: `{field}` is missing.")
        }
        CycleError::Normalization(err @ NormalizationError::WrongType { .. }) => {
            format!("Provider data has an unexpected shape: {err}.")
        }
    }
}

fn ready(snapshot: &Snapshot, config: &Config) -> String {
    let label = &config.clock.zone_label;
    let sample = &snapshot.sample;
    let mut out = String::new();

    let emoji = snapshot.category.emoji();
    let _ = writeln!(out, "{emoji} Real-time weather, {}", config.location.name);
    let _ = writeln!(out, "  {} ({})", sample.condition_text(), snapshot.category);
    let _ = writeln!(out, "  Temperature  {:.1} °C", sample.temperature_c());
    let _ = writeln!(out, "  Humidity     {:.0}%", sample.humidity_pct());
    let _ = writeln!(out, "  Wind speed   {:.1} km/h", sample.wind_kmh());
    if let Some(url) = &snapshot.icon_url {
        let _ = writeln!(out, "  Icon         {url}");
    }
    let _ = writeln!(out, "  Last updated {} {label}", sample.timestamp().format(TIME_FORMAT));

    match &snapshot.forecast {
        ForecastOutcome::Ready(window) if !window.is_empty() => {
            let _ = writeln!(out, "\nNext {} hours", window.points.len());
            for point in &window.points {
                let _ = writeln!(
                    out,
                    "  {} {label}  {:>5.1} °C  {}",
                    point.local_time_of_day, point.temperature_c, point.condition_text
                );
            }
        }
        ForecastOutcome::Ready(_) | ForecastOutcome::NotProvided => {
            let _ = writeln!(out, "\nNo forecast available.");
        }
        ForecastOutcome::Malformed => {}
    }

    let view = &snapshot.comparison;
    let _ = writeln!(out, "\nAPI vs OCR bulletin (last {})", config.display.reconcile_tail);
    if view.secondary.is_empty() {
        let _ = writeln!(out, "  No OCR bulletin data yet.");
    }
    let _ = writeln!(out, "  {:<22} {:>7} {:>7}", "Time", "API", "OCR");
    for row in view.axis() {
        let _ = writeln!(
            out,
            "  {:<22} {:>7} {:>7}",
            row.at.format("%m-%d %H:%M %:z"),
            reading(row.primary),
            reading(row.secondary),
        );
    }

    for notice in &snapshot.notices {
        let _ = writeln!(out, "{}", notice_line(&notice.to_string()));
    }

    out.trim_end().to_string()
}

fn reading(value: Option<f64>) -> String {
    value.map_or_else(|| "-".to_string(), |v| format!("{v:.1}"))
}

pub fn history(samples: &[WeatherSample]) -> String {
    if samples.is_empty() {
        return no_data();
    }

    let mut out = format!(
        "{:<26} {:>11} {:>8} {:>8}  {}",
        "Time", "Temperature", "Humidity", "Wind_kmh", "Weather"
    );
    for sample in samples {
        let _ = write!(
            out,
            "\n{:<26} {:>11.1} {:>8.0} {:>8.1}  {}",
            sample.timestamp().to_rfc3339(),
            sample.temperature_c(),
            sample.humidity_pct(),
            sample.wind_kmh(),
            sample.condition_text(),
        );
    }
    out
}

pub fn forecast_table(table: &Table, dropped: usize) -> String {
    if table.is_empty() {
        return "OCR bulletin forecast: no data yet.".to_string();
    }

    let mut out = format!("OCR bulletin forecast\n  {}", table.headers.join(" | "));
    for row in &table.rows {
        let cells: Vec<&str> = table.cells(row).collect();
        let _ = write!(out, "\n  {}", cells.join(" | "));
    }
    if dropped > 0 {
        let skipped = format!("{dropped} row(s) with an unreadable time were skipped");
        let _ = write!(out, "\n{}", notice_line(&skipped));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::DateTime;
    use cuaca_core::{
        Category, ForecastPoint, ForecastWindow, ReconciledView, reconcile, station::Notice,
    };

    fn sample() -> WeatherSample {
        let ts = DateTime::parse_from_rfc3339("2024-01-01T08:00:00+07:00").unwrap();
        WeatherSample::new(ts, 24.5, 80.0, "light rain", 5.2, Source::PrimaryApi)
    }

    #[test]
    fn idle_without_history_says_no_data() {
        let out = state(&CycleState::Idle, &HistoryStore::default(), &Config::default());
        assert_eq!(out, "No data yet.");
    }

    #[test]
    fn failure_without_history_shows_notice_and_no_data() {
        let err = CycleError::Fetch(FetchError::Timeout);
        let out = state(&CycleState::Failed(err), &HistoryStore::default(), &Config::default());

        assert!(out.contains("did not answer in time"));
        assert!(out.ends_with("No data yet."));
    }

    #[test]
    fn failure_with_history_shows_last_reading() {
        let mut history = HistoryStore::default();
        history.append(sample()).unwrap();
        let err = CycleError::Normalization(NormalizationError::MissingField("current.temp"));

        let out = state(&CycleState::Failed(err), &history, &Config::default());
        assert!(out.contains("`current.temp` is missing"));
        assert!(out.contains("Last good reading: 24.5 °C, light rain"));
    }

    #[test]
    fn failure_kinds_read_differently() {
        let messages = [
            describe_failure(&CycleError::Fetch(FetchError::Timeout)),
            describe_failure(&CycleError::Fetch(FetchError::MissingApiKey)),
            describe_failure(&CycleError::Normalization(NormalizationError::MissingField(
                "current",
            ))),
            describe_failure(&CycleError::Normalization(NormalizationError::WrongType {
                field: "current.temp",
                expected: "a number",
            })),
        ];

        for (i, a) in messages.iter().enumerate() {
            for b in &messages[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn ready_snapshot_lists_reading_forecast_and_notices() {
        let at = sample().timestamp();
        let snapshot = Snapshot {
            sample: sample(),
            category: Category::Rain,
            icon_url: Some("https://openweathermap.org/img/wn/10d@2x.png".into()),
            forecast: ForecastOutcome::Ready(ForecastWindow {
                points: vec![ForecastPoint {
                    at,
                    local_time_of_day: "08:00".into(),
                    temperature_c: 22.0,
                    condition_text: "Scattered clouds".into(),
                }],
                dropped: 0,
            }),
            comparison: reconcile(&[sample()], &[]),
            notices: vec![Notice::ForecastRowsDropped(1)],
        };

        let out = state(
            &CycleState::Ready(Box::new(snapshot)),
            &HistoryStore::default(),
            &Config::default(),
        );

        assert!(out.contains("light rain (Rain)"));
        assert!(out.contains("Temperature  24.5 °C"));
        assert!(out.contains("Last updated 2024-01-01 08:00:00 WIB"));
        assert!(out.contains("08:00 WIB   22.0 °C  Scattered clouds"));
        assert!(out.contains("No OCR bulletin data yet."));
        assert!(out.contains("1 forecast hour(s) were unreadable"));
    }

    #[test]
    fn ready_snapshot_without_forecast_says_so() {
        let snapshot = Snapshot {
            sample: sample(),
            category: Category::Rain,
            icon_url: None,
            forecast: ForecastOutcome::NotProvided,
            comparison: ReconciledView::default(),
            notices: Vec::new(),
        };

        let out = state(
            &CycleState::Ready(Box::new(snapshot)),
            &HistoryStore::default(),
            &Config::default(),
        );
        assert!(out.contains("No forecast available."));
        assert!(!out.contains("Icon"));
    }

    #[test]
    fn empty_tables_render_no_data() {
        assert_eq!(history(&[]), "No data yet.");
        assert!(forecast_table(&Table::default(), 0).contains("no data yet"));
    }

    #[test]
    fn history_lists_one_line_per_sample() {
        let out = history(&[sample(), sample()]);
        assert_eq!(out.lines().count(), 3);
        assert!(out.contains("2024-01-01T08:00:00+07:00"));
    }
}
