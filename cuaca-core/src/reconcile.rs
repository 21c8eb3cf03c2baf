//! Side-by-side view of the primary and secondary histories.
//!
//! The two series keep their own timestamps. Nothing is interpolated or snapped:
//! the shared axis is just the union of both series' instants.

use std::cmp::Ordering;

use chrono::{DateTime, FixedOffset};

use crate::model::WeatherSample;

pub const DEFAULT_TAIL: usize = 12;

/// One plotted reading.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SeriesPoint {
    pub at: DateTime<FixedOffset>,
    pub temperature_c: f64,
}

/// One tick of the shared axis with whichever readings fall exactly on it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AxisRow {
    pub at: DateTime<FixedOffset>,
    pub primary: Option<f64>,
    pub secondary: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReconciledView {
    pub primary: Vec<SeriesPoint>,
    pub secondary: Vec<SeriesPoint>,
    /// Records left out because their temperature could not be charted.
    pub discarded: usize,
}

impl ReconciledView {
    pub fn is_empty(&self) -> bool {
        self.primary.is_empty() && self.secondary.is_empty()
    }

    /// Both series merged on one chronological axis.
    ///
    /// Instants present in only one series leave the other column empty.
    pub fn axis(&self) -> Vec<AxisRow> {
        let mut rows: Vec<AxisRow> = Vec::with_capacity(self.primary.len() + self.secondary.len());
        let (mut p, mut s) = (self.primary.iter().peekable(), self.secondary.iter().peekable());

        loop {
            let row = match (p.peek(), s.peek()) {
                (None, None) => break,
                (Some(a), None) => primary_only(*a),
                (None, Some(b)) => secondary_only(*b),
                (Some(a), Some(b)) => match a.at.cmp(&b.at) {
                    Ordering::Less => primary_only(*a),
                    Ordering::Greater => secondary_only(*b),
                    Ordering::Equal => AxisRow {
                        at: a.at,
                        primary: Some(a.temperature_c),
                        secondary: Some(b.temperature_c),
                    },
                },
            };

            if row.primary.is_some() {
                p.next();
            }
            if row.secondary.is_some() {
                s.next();
            }
            rows.push(row);
        }

        rows
    }
}

fn primary_only(point: &SeriesPoint) -> AxisRow {
    AxisRow {
        at: point.at,
        primary: Some(point.temperature_c),
        secondary: None,
    }
}

fn secondary_only(point: &SeriesPoint) -> AxisRow {
    AxisRow {
        at: point.at,
        primary: None,
        secondary: Some(point.temperature_c),
    }
}

/// Pair the two tails for display.
///
/// Each tail is coerced on its own; a record whose temperature is not a finite
/// number is dropped rather than failing the whole view. Each series is ordered
/// by time for plotting.
pub fn reconcile(
    primary_tail: &[WeatherSample],
    secondary_tail: &[WeatherSample],
) -> ReconciledView {
    let (primary, dropped_primary) = series(primary_tail);
    let (secondary, dropped_secondary) = series(secondary_tail);

    ReconciledView {
        primary,
        secondary,
        discarded: dropped_primary + dropped_secondary,
    }
}

fn series(tail: &[WeatherSample]) -> (Vec<SeriesPoint>, usize) {
    let mut points: Vec<SeriesPoint> = tail
        .iter()
        .filter(|s| s.temperature_c().is_finite())
        .map(|s| SeriesPoint {
            at: s.timestamp(),
            temperature_c: s.temperature_c(),
        })
        .collect();
    let dropped = tail.len() - points.len();

    points.sort_by_key(|p| p.at);
    (points, dropped)
}
