//! Append-only sample history with a pluggable durable log.

use std::{
    collections::{HashMap, HashSet},
    fmt::Debug,
    fs::{self, File, OpenOptions},
    io::ErrorKind,
    path::{Path, PathBuf},
};

use chrono::{FixedOffset, Offset, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::{
    error::PersistenceError,
    model::{Source, WeatherSample},
    secondary::parse_timestamp,
};

/// Column names of the persisted history table.
pub const COLUMNS: [&str; 5] = ["Time", "Temperature", "Humidity", "Weather", "Wind_kmh"];

/// How the history reaches its durable log on every append.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PersistMode {
    /// Write only the newest sample, plus the header when the log is empty.
    #[default]
    Incremental,
    /// Overwrite the log with the whole in-memory history.
    ///
    /// Only used while memory holds every stored record; otherwise appends are
    /// written incrementally.
    Rewrite,
}

/// Records read back from a [`RecordLog`].
#[derive(Debug, Default)]
pub struct LoadedHistory {
    pub samples: Vec<WeatherSample>,
    /// Stored records that could not be read back and stay only on disk.
    pub skipped: usize,
}

/// Durable tabular storage for one source's history.
pub trait RecordLog: Send + Debug {
    /// Read every stored record back as samples of `source`.
    fn load(&self, source: Source) -> Result<LoadedHistory, PersistenceError>;

    /// Add one record at the end, writing the header first if the log is empty.
    fn append(&mut self, sample: &WeatherSample) -> Result<(), PersistenceError>;

    /// Replace the whole log with `samples`.
    fn rewrite(&mut self, samples: &[WeatherSample]) -> Result<(), PersistenceError>;
}

/// In-memory histories, one per source, each optionally backed by a [`RecordLog`].
#[derive(Debug, Default)]
pub struct HistoryStore {
    samples: HashMap<Source, Vec<WeatherSample>>,
    sinks: HashMap<Source, Box<dyn RecordLog>>,
    /// Sources whose log holds records missing from memory; never rewritten.
    append_only: HashSet<Source>,
    mode: PersistMode,
}

impl HistoryStore {
    pub fn new(mode: PersistMode) -> Self {
        Self {
            mode,
            ..Self::default()
        }
    }

    /// Seed `source` from `log` and persist its future appends there.
    ///
    /// The log stays registered even when loading fails, so later cycles keep trying
    /// to write. A log that failed to load or had unreadable records is only ever
    /// appended to, never rewritten. Returns the number of hydrated samples.
    pub fn hydrate(
        &mut self,
        source: Source,
        log: Box<dyn RecordLog>,
    ) -> Result<usize, PersistenceError> {
        let loaded = log.load(source);
        self.sinks.insert(source, log);

        let loaded = match loaded {
            Ok(loaded) => loaded,
            Err(err) => {
                self.append_only.insert(source);
                return Err(err);
            }
        };
        if loaded.skipped > 0 {
            warn!(%source, skipped = loaded.skipped, "history log will only be appended to");
            self.append_only.insert(source);
        }

        let count = loaded.samples.len();
        self.samples.entry(source).or_default().extend(loaded.samples);
        info!(%source, count, "history hydrated");
        Ok(count)
    }

    /// Whether appends to `source` rewrite its whole log.
    pub fn rewrites(&self, source: Source) -> bool {
        self.mode == PersistMode::Rewrite && !self.append_only.contains(&source)
    }

    /// Append `sample` to its source's history, then persist it.
    ///
    /// A persistence failure is returned but the in-memory append is kept.
    pub fn append(&mut self, sample: WeatherSample) -> Result<(), PersistenceError> {
        let source = sample.source();
        let rewrite = self.rewrites(source);
        let history = self.samples.entry(source).or_default();
        history.push(sample);
        debug!(%source, len = history.len(), "sample appended");

        let Some(sink) = self.sinks.get_mut(&source) else {
            return Ok(());
        };

        let result = if rewrite {
            sink.rewrite(history)
        } else {
            match history.last() {
                Some(newest) => sink.append(newest),
                None => Ok(()),
            }
        };

        if let Err(err) = &result {
            warn!(%source, %err, "sample kept in memory but not persisted");
        }
        result
    }

    pub fn latest(&self, source: Source) -> Option<&WeatherSample> {
        self.samples.get(&source).and_then(|h| h.last())
    }

    /// Up to `n` most recent samples of `source`, oldest first.
    pub fn tail(&self, source: Source, n: usize) -> &[WeatherSample] {
        match self.samples.get(&source) {
            Some(history) => &history[history.len().saturating_sub(n)..],
            None => &[],
        }
    }

    pub fn len(&self, source: Source) -> usize {
        self.samples.get(&source).map_or(0, Vec::len)
    }

    pub fn is_empty(&self, source: Source) -> bool {
        self.len(source) == 0
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct HistoryRow {
    #[serde(rename = "Time")]
    time: String,
    #[serde(rename = "Temperature")]
    temperature: f64,
    #[serde(rename = "Humidity")]
    humidity: f64,
    #[serde(rename = "Weather")]
    weather: String,
    #[serde(rename = "Wind_kmh")]
    wind_kmh: f64,
}

impl From<&WeatherSample> for HistoryRow {
    fn from(sample: &WeatherSample) -> Self {
        Self {
            time: sample.timestamp().to_rfc3339(),
            temperature: sample.temperature_c(),
            humidity: sample.humidity_pct(),
            weather: sample.condition_text().to_string(),
            wind_kmh: sample.wind_kmh(),
        }
    }
}

/// History log kept in a CSV file with a single header row.
///
/// `Time` is written as RFC 3339. Naive times from older tables are read in
/// the log's zone, UTC unless set with [`CsvLog::with_zone`].
#[derive(Debug, Clone)]
pub struct CsvLog {
    path: PathBuf,
    zone: FixedOffset,
}

impl CsvLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            zone: Utc.fix(),
        }
    }

    pub fn with_zone(mut self, zone: FixedOffset) -> Self {
        self.zone = zone;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: std::io::Error) -> PersistenceError {
        PersistenceError::Io {
            path: self.path.clone(),
            source,
        }
    }

    fn csv_error(&self, source: csv::Error) -> PersistenceError {
        PersistenceError::Csv {
            path: self.path.clone(),
            source,
        }
    }

    fn ensure_parent(&self) -> Result<(), PersistenceError> {
        match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => {
                fs::create_dir_all(parent).map_err(|e| self.io_error(e))
            }
            _ => Ok(()),
        }
    }

    fn sample_from_row(&self, row: HistoryRow, source: Source) -> Result<WeatherSample, String> {
        let ts = parse_timestamp(&row.time, self.zone).map_err(|e| e.to_string())?;
        Ok(WeatherSample::new(
            ts,
            row.temperature,
            row.humidity,
            row.weather,
            row.wind_kmh,
            source,
        ))
    }

    fn write_rows<'a>(
        &self,
        file: File,
        with_header: bool,
        samples: impl IntoIterator<Item = &'a WeatherSample>,
    ) -> Result<(), PersistenceError> {
        let mut writer = csv::WriterBuilder::new().has_headers(false).from_writer(file);

        if with_header {
            writer.write_record(COLUMNS).map_err(|e| self.csv_error(e))?;
        }
        for sample in samples {
            writer
                .serialize(HistoryRow::from(sample))
                .map_err(|e| self.csv_error(e))?;
        }

        writer.flush().map_err(|e| self.io_error(e))
    }
}

impl RecordLog for CsvLog {
    fn load(&self, source: Source) -> Result<LoadedHistory, PersistenceError> {
        let file = match File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(LoadedHistory::default()),
            Err(e) => return Err(self.io_error(e)),
        };

        let mut reader = csv::ReaderBuilder::new().has_headers(true).from_reader(file);
        let mut loaded = LoadedHistory::default();

        for (index, row) in reader.deserialize::<HistoryRow>().enumerate() {
            let parsed = match row {
                Ok(row) => self.sample_from_row(row, source),
                Err(e) if matches!(e.kind(), csv::ErrorKind::Io(_)) => {
                    return Err(self.csv_error(e));
                }
                Err(e) => Err(e.to_string()),
            };

            match parsed {
                Ok(sample) => loaded.samples.push(sample),
                Err(reason) => {
                    let err = PersistenceError::Corrupt {
                        path: self.path.clone(),
                        reason,
                    };
                    warn!(row = index + 1, %err, "skipping unreadable history row");
                    loaded.skipped += 1;
                }
            }
        }

        Ok(loaded)
    }

    fn append(&mut self, sample: &WeatherSample) -> Result<(), PersistenceError> {
        self.ensure_parent()?;

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| self.io_error(e))?;
        let is_empty = file.metadata().map_err(|e| self.io_error(e))?.len() == 0;

        self.write_rows(file, is_empty, [sample])
    }

    fn rewrite(&mut self, samples: &[WeatherSample]) -> Result<(), PersistenceError> {
        self.ensure_parent()?;

        // Write beside the target and swap, so a crash never leaves half a table.
        let staging = self.path.with_extension("csv.tmp");
        let file = File::create(&staging).map_err(|e| self.io_error(e))?;
        self.write_rows(file, true, samples)?;

        fs::rename(&staging, &self.path).map_err(|e| self.io_error(e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::DateTime;
    use std::sync::{Arc, Mutex};

    fn sample(hour: u32, temp: f64) -> WeatherSample {
        let ts = DateTime::parse_from_rfc3339(&format!("2024-01-01T{hour:02}:00:00+07:00"))
            .unwrap();
        WeatherSample::new(ts, temp, 80.0, "light rain, heavy at times", 5.2, Source::PrimaryApi)
    }

    fn wib() -> FixedOffset {
        FixedOffset::east_opt(7 * 3600).unwrap()
    }

    fn lines(path: &Path) -> Vec<String> {
        fs::read_to_string(path).unwrap().lines().map(str::to_string).collect()
    }

    #[derive(Debug)]
    struct FailingLog;

    fn unavailable(reason: &str) -> PersistenceError {
        PersistenceError::Corrupt {
            path: "remote".into(),
            reason: reason.into(),
        }
    }

    impl RecordLog for FailingLog {
        fn load(&self, _source: Source) -> Result<LoadedHistory, PersistenceError> {
            Ok(LoadedHistory::default())
        }

        fn append(&mut self, _sample: &WeatherSample) -> Result<(), PersistenceError> {
            Err(unavailable("down"))
        }

        fn rewrite(&mut self, _samples: &[WeatherSample]) -> Result<(), PersistenceError> {
            Err(unavailable("down"))
        }
    }

    /// Cannot be read, but records every write it is asked for.
    #[derive(Debug, Default)]
    struct UnreadableLog(Arc<Mutex<Vec<&'static str>>>);

    impl RecordLog for UnreadableLog {
        fn load(&self, _source: Source) -> Result<LoadedHistory, PersistenceError> {
            Err(unavailable("busy"))
        }

        fn append(&mut self, _sample: &WeatherSample) -> Result<(), PersistenceError> {
            self.0.lock().unwrap().push("append");
            Ok(())
        }

        fn rewrite(&mut self, _samples: &[WeatherSample]) -> Result<(), PersistenceError> {
            self.0.lock().unwrap().push("rewrite");
            Ok(())
        }
    }

    #[test]
    fn empty_store_has_no_latest() {
        let store = HistoryStore::default();
        assert!(store.latest(Source::PrimaryApi).is_none());
        assert!(store.tail(Source::PrimaryApi, 12).is_empty());
        assert!(store.is_empty(Source::SecondaryOcr));
    }

    #[test]
    fn tail_returns_most_recent_oldest_first() {
        let mut store = HistoryStore::default();
        for hour in 0..5 {
            store.append(sample(hour, hour as f64)).unwrap();
        }

        let temps: Vec<f64> = store
            .tail(Source::PrimaryApi, 3)
            .iter()
            .map(WeatherSample::temperature_c)
            .collect();
        assert_eq!(temps, vec![2.0, 3.0, 4.0]);
        assert_eq!(store.tail(Source::PrimaryApi, 50).len(), 5);
        assert_eq!(store.latest(Source::PrimaryApi).map(|s| s.temperature_c()), Some(4.0));
    }

    #[test]
    fn sources_are_kept_apart() {
        let mut store = HistoryStore::default();
        store.append(sample(1, 20.0)).unwrap();
        let ocr = WeatherSample::new(
            sample(2, 0.0).timestamp(),
            21.0,
            70.0,
            "Cerah",
            0.0,
            Source::SecondaryOcr,
        );
        store.append(ocr).unwrap();

        assert_eq!(store.len(Source::PrimaryApi), 1);
        assert_eq!(store.len(Source::SecondaryOcr), 1);
        assert_eq!(store.latest(Source::SecondaryOcr).map(|s| s.condition_text()), Some("Cerah"));
    }

    #[test]
    fn persistence_failure_keeps_memory_append() {
        let mut store = HistoryStore::default();
        store.hydrate(Source::PrimaryApi, Box::new(FailingLog)).unwrap();

        assert!(store.append(sample(8, 24.5)).is_err());
        assert_eq!(store.len(Source::PrimaryApi), 1);
    }

    #[test]
    fn incremental_append_writes_one_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("history.csv");

        let mut store = HistoryStore::new(PersistMode::Incremental);
        store.hydrate(Source::PrimaryApi, Box::new(CsvLog::new(&path))).unwrap();
        for hour in 0..4 {
            store.append(sample(hour, 20.0 + hour as f64)).unwrap();
        }

        let lines = lines(&path);
        assert_eq!(lines.len(), 5);
        assert_eq!(lines[0], "Time,Temperature,Humidity,Weather,Wind_kmh");
        assert!(lines[1].starts_with("2024-01-01T00:00:00+07:00,20.0,"));
        assert!(lines[4].starts_with("2024-01-01T03:00:00+07:00,23.0,"));
    }

    #[test]
    fn rewrite_mode_matches_incremental_layout() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.csv");

        let mut store = HistoryStore::new(PersistMode::Rewrite);
        store.hydrate(Source::PrimaryApi, Box::new(CsvLog::new(&path))).unwrap();
        assert!(store.rewrites(Source::PrimaryApi));
        for hour in 0..3 {
            store.append(sample(hour, 20.0)).unwrap();
        }

        assert_eq!(lines(&path).len(), 4);
        assert!(!path.with_extension("csv.tmp").exists());
    }

    #[test]
    fn reload_reproduces_history() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.csv");

        let mut store = HistoryStore::new(PersistMode::Incremental);
        store.hydrate(Source::PrimaryApi, Box::new(CsvLog::new(&path))).unwrap();
        store.append(sample(6, 19.25)).unwrap();
        store.append(sample(7, 21.1)).unwrap();
        let later = sample(8, 24.5)
            .timestamp()
            .with_timezone(&FixedOffset::east_opt(0).unwrap());
        store
            .append(WeatherSample::new(later, -3.3, 55.5, "mist", 0.0, Source::PrimaryApi))
            .unwrap();

        let mut reloaded = HistoryStore::default();
        let count = reloaded
            .hydrate(Source::PrimaryApi, Box::new(CsvLog::new(&path)))
            .unwrap();

        assert_eq!(count, 3);
        assert_eq!(
            reloaded.tail(Source::PrimaryApi, 10),
            store.tail(Source::PrimaryApi, 10)
        );
    }

    #[test]
    fn hydrate_then_append_continues_the_table() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.csv");

        let mut first = HistoryStore::default();
        first.hydrate(Source::PrimaryApi, Box::new(CsvLog::new(&path))).unwrap();
        first.append(sample(1, 20.0)).unwrap();

        let mut second = HistoryStore::default();
        second.hydrate(Source::PrimaryApi, Box::new(CsvLog::new(&path))).unwrap();
        second.append(sample(2, 21.0)).unwrap();

        assert_eq!(second.len(Source::PrimaryApi), 2);
        assert_eq!(lines(&path).len(), 3);
    }

    #[test]
    fn unreadable_rows_are_skipped_on_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.csv");
        fs::write(
            &path,
            "Time,Temperature,Humidity,Weather,Wind_kmh\n\
             yesterday,24.5,80,light rain,5.2\n\
             2024-01-01T09:00:00+07:00,hot,80,light rain,5.2\n\
             2024-01-01T10:00:00+07:00,25.0,78,clear sky,1.0\n",
        )
        .unwrap();

        let loaded = CsvLog::new(&path).load(Source::PrimaryApi).unwrap();
        assert_eq!(loaded.samples.len(), 1);
        assert_eq!(loaded.skipped, 2);
        assert_eq!(loaded.samples[0].condition_text(), "clear sky");
    }

    #[test]
    fn naive_times_are_read_in_the_log_zone() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.csv");
        fs::write(
            &path,
            "Time,Temperature,Humidity,Weather,Wind_kmh\n\
             2024-01-01 08:00:00,24.5,80,light rain,5.2\n",
        )
        .unwrap();

        let loaded = CsvLog::new(&path).with_zone(wib()).load(Source::PrimaryApi).unwrap();
        assert_eq!(loaded.skipped, 0);
        assert_eq!(loaded.samples[0].timestamp(), sample(8, 24.5).timestamp());

        let utc = CsvLog::new(&path).load(Source::PrimaryApi).unwrap();
        assert_eq!(utc.samples[0].timestamp().to_rfc3339(), "2024-01-01T08:00:00+00:00");
    }

    #[test]
    fn rewrite_mode_keeps_rows_it_could_not_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.csv");
        fs::write(
            &path,
            "Time,Temperature,Humidity,Weather,Wind_kmh\n\
             legacy row,24.5,80,light rain,5.2\n\
             2024-01-01T08:00:00+07:00,24.5,80,light rain,5.2\n",
        )
        .unwrap();

        let mut store = HistoryStore::new(PersistMode::Rewrite);
        let count = store
            .hydrate(Source::PrimaryApi, Box::new(CsvLog::new(&path).with_zone(wib())))
            .unwrap();
        assert_eq!(count, 1);
        assert!(!store.rewrites(Source::PrimaryApi));

        store.append(sample(9, 25.0)).unwrap();

        let lines = lines(&path);
        assert_eq!(lines.len(), 4);
        assert!(lines[1].starts_with("legacy row,"));
        assert!(lines[2].starts_with("2024-01-01T08:00:00+07:00,"));
        assert!(lines[3].starts_with("2024-01-01T09:00:00+07:00,25.0,"));
    }

    #[test]
    fn rewrite_mode_never_rewrites_a_log_that_failed_to_load() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let mut store = HistoryStore::new(PersistMode::Rewrite);

        let hydrated = store.hydrate(Source::PrimaryApi, Box::new(UnreadableLog(calls.clone())));
        assert!(hydrated.is_err());
        assert!(!store.rewrites(Source::PrimaryApi));
        store.append(sample(8, 24.5)).unwrap();
        store.append(sample(9, 25.0)).unwrap();

        assert_eq!(*calls.lock().unwrap(), vec!["append", "append"]);
    }

    #[test]
    fn missing_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = CsvLog::new(dir.path().join("absent.csv"))
            .load(Source::PrimaryApi)
            .unwrap();
        assert!(loaded.samples.is_empty());
    }
}
