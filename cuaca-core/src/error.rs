//! Error kinds raised while running a weather cycle.
//!
//! Each kind is reported at the boundary of the cycle it occurs in; none of them
//! is allowed to stop the process.

use std::path::PathBuf;

use thiserror::Error;

/// The primary provider could not deliver a usable document.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request to weather provider timed out")]
    Timeout,

    #[error("failed to reach weather provider: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("weather provider answered with status {status}: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("weather provider returned malformed JSON")]
    MalformedJson(#[source] serde_json::Error),

    #[error("no API key configured for the weather provider")]
    MissingApiKey,
}

impl From<reqwest::Error> for FetchError {
    /// The request URL carries the API key in its query, so it is stripped here.
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FetchError::Timeout
        } else {
            FetchError::Transport(err.without_url())
        }
    }
}

/// A provider payload did not match the current-conditions contract.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NormalizationError {
    #[error("missing field `{0}` in provider payload")]
    MissingField(&'static str),

    #[error("field `{field}` should be {expected}")]
    WrongType {
        field: &'static str,
        expected: &'static str,
    },
}

/// The durable log refused or could not take a write.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("history log {path} is unreachable")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("history log {path} rejected the record")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("history log {path} has a record that cannot be read back: {reason}")]
    Corrupt { path: PathBuf, reason: String },
}

/// The OCR-derived feed could not be read.
#[derive(Debug, Error)]
pub enum SecondarySourceError {
    #[error("secondary feed {path} is unreachable")]
    Unreachable {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("secondary feed {0} has no records")]
    Empty(PathBuf),
}

/// A timestamp or number could not be coerced for charting or reconciliation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("cannot parse {field} value {value:?}: {reason}")]
pub struct ParseError {
    pub field: String,
    pub value: String,
    pub reason: String,
}

impl ParseError {
    pub fn new(
        field: impl Into<String>,
        value: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            field: field.into(),
            value: value.into(),
            reason: reason.into(),
        }
    }
}

/// Errors that abandon a whole cycle.
#[derive(Debug, Error)]
pub enum CycleError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Normalization(#[from] NormalizationError),
}
