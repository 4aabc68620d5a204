//! Per-subject warnings raised while filtering.

use crate::catalog::FeatureFamily;
use serde::Serialize;

/// Subjects lacking valid data for a family on a blood source.
///
/// Ids are deduplicated and kept in the order they were first raised.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct WarningList {
    pub family: FeatureFamily,
    pub blood_source: String,
    subject_ids: Vec<String>,
}

impl WarningList {
    pub fn new(family: FeatureFamily, blood_source: impl Into<String>) -> Self {
        Self {
            family,
            blood_source: blood_source.into(),
            subject_ids: Vec::new(),
        }
    }

    /// Add a subject; returns false if it was already warned.
    pub fn push(&mut self, subject_id: &str) -> bool {
        if self.contains(subject_id) {
            return false;
        }
        self.subject_ids.push(subject_id.to_string());
        true
    }

    pub fn contains(&self, subject_id: &str) -> bool {
        self.subject_ids.iter().any(|s| s == subject_id)
    }

    pub fn subject_ids(&self) -> &[String] {
        &self.subject_ids
    }

    pub fn len(&self) -> usize {
        self.subject_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subject_ids.is_empty()
    }

    /// Human-readable summary, see [`format`]
    pub fn summary(&self) -> Option<String> {
        format(&self.subject_ids, &self.blood_source)
    }
}

/// Format a warning list for display.
///
/// Returns `None` when there is nothing to report.
pub fn format(warnings: &[String], blood_source: &str) -> Option<String> {
    match warnings {
        [] => None,
        [single] => Some(format!(
            "Subject ID #{} has no {} samples.\nTry with another subject ID.",
            single, blood_source
        )),
        many => Some(format!(
            "Subject IDs #{} have no {} samples.\nTry with other subject IDs.",
            many.join(","),
            blood_source
        )),
    }
}
