//! Core domain types for the blood-panel engine.
//!
//! This module defines the fundamental types shared by every component:
//! - Analyte readings and measurement records
//! - The per-query selection

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::catalog::FeatureFamily;

// ============================================================================
// Measurement Types
// ============================================================================

/// The three numeric fields recorded for one analyte on one record.
///
/// Every field may be missing independently. NaN is treated as missing.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalyteReading {
    pub value: Option<f64>,
    pub low_limit: Option<f64>,
    pub high_limit: Option<f64>,
}

impl AnalyteReading {
    pub fn new(value: Option<f64>, low_limit: Option<f64>, high_limit: Option<f64>) -> Self {
        Self {
            value: value.filter(|v| !v.is_nan()),
            low_limit: low_limit.filter(|v| !v.is_nan()),
            high_limit: high_limit.filter(|v| !v.is_nan()),
        }
    }

    /// A reading with a value and both reference limits.
    pub fn full(value: f64, low_limit: f64, high_limit: f64) -> Self {
        Self::new(Some(value), Some(low_limit), Some(high_limit))
    }

    /// True when none of the three fields carries a number.
    pub fn is_empty(&self) -> bool {
        self.value.is_none() && self.low_limit.is_none() && self.high_limit.is_none()
    }

    /// True when both reference limits are present.
    pub fn has_limits(&self) -> bool {
        self.low_limit.is_some() && self.high_limit.is_some()
    }
}

/// One measurement event: a subject sampled on one blood source at one time.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub subject_id: String,
    pub blood_source: String,
    pub analysis_date: NaiveDateTime,
    /// Analyte code → reading. Codes without a reading are entirely missing.
    pub analytes: BTreeMap<String, AnalyteReading>,
}

impl Record {
    pub fn new(
        subject_id: impl Into<String>,
        blood_source: impl Into<String>,
        analysis_date: NaiveDateTime,
    ) -> Self {
        Self {
            subject_id: subject_id.into(),
            blood_source: blood_source.into(),
            analysis_date,
            analytes: BTreeMap::new(),
        }
    }

    /// Builder-style insertion of an analyte reading.
    ///
    /// Empty readings are not stored, so "absent" has a single representation.
    pub fn with_analyte(mut self, code: impl Into<String>, reading: AnalyteReading) -> Self {
        self.set_analyte(code, reading);
        self
    }

    pub fn set_analyte(&mut self, code: impl Into<String>, reading: AnalyteReading) {
        let code = code.into();
        let reading = AnalyteReading::new(reading.value, reading.low_limit, reading.high_limit);
        if reading.is_empty() {
            self.analytes.remove(&code);
        } else {
            self.analytes.insert(code, reading);
        }
    }

    /// The reading for an analyte, if any field of it was recorded.
    pub fn reading(&self, code: &str) -> Option<&AnalyteReading> {
        self.analytes.get(code)
    }

    /// Calendar day of the sample; the time of day is discarded.
    pub fn day(&self) -> NaiveDate {
        self.analysis_date.date()
    }
}

// ============================================================================
// Selection
// ============================================================================

/// The cohort a user narrowed the dataset to for one query.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Selection {
    /// Subject ids in the order results should be reported.
    pub subject_ids: Vec<String>,
    pub blood_source: String,
    pub family: FeatureFamily,
}

impl Selection {
    pub fn new<I, S>(subject_ids: I, blood_source: impl Into<String>, family: FeatureFamily) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            subject_ids: subject_ids.into_iter().map(Into::into).collect(),
            blood_source: blood_source.into(),
            family,
        }
    }
}
