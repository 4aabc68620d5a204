//! Reference-limit validity of a record for one analyte.
//!
//! Presence of both reference limits is the sole criterion. Values are never
//! range-checked against the limits here; that is left to the renderer.

use crate::{AnalyteReading, Record};
use serde::Serialize;

/// Whether the record carries both reference limits for `analyte`
pub fn is_valid(record: &Record, analyte: &str) -> bool {
    record.reading(analyte).is_some_and(AnalyteReading::has_limits)
}

/// Classification of a plotted point
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Flag {
    Valid,
    MissingLimits,
}

impl Flag {
    pub fn of(reading: &AnalyteReading) -> Self {
        if reading.has_limits() {
            Flag::Valid
        } else {
            Flag::MissingLimits
        }
    }
}
