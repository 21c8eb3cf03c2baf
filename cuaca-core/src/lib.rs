//! Core library for the `cuaca` weather station.
//!
//! This crate defines:
//! - Configuration & credentials handling
//! - The primary provider client and the OCR-derived secondary feed
//! - Normalization, classification and the append-only sample history
//! - The forecast window and the dual-source comparison view
//! - The [`Station`] that runs one cycle per trigger
//!
//! It is used by `cuaca-cli`, but can also be reused by other binaries or services.

pub mod classify;
pub mod config;
pub mod error;
pub mod forecast;
pub mod history;
pub mod model;
pub mod normalize;
pub mod provider;
pub mod reconcile;
pub mod secondary;
pub mod station;

pub use classify::{Category, classify};
pub use config::Config;
pub use error::{
    CycleError, FetchError, NormalizationError, ParseError, PersistenceError, SecondarySourceError,
};
pub use forecast::extract_window;
pub use history::{CsvLog, HistoryStore, LoadedHistory, PersistMode, RecordLog};
pub use model::{ForecastPoint, ForecastWindow, Source, WeatherSample};
pub use normalize::normalize;
pub use provider::WeatherProvider;
pub use reconcile::{ReconciledView, reconcile};
pub use station::{CycleState, Notice, Snapshot, Station};
