//! Per-subject sample-date exclusions.
//!
//! A date present in the store for a subject is either included (the default)
//! or excluded. Moving it between the two is the only mutation, and both
//! directions are idempotent.

use crate::store::RecordStore;
use chrono::NaiveDate;
use std::collections::{BTreeSet, HashMap};

#[derive(Clone, Debug, Default)]
pub struct DateExclusionSet {
    excluded: HashMap<String, BTreeSet<NaiveDate>>,
}

impl DateExclusionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Excluded dates of a subject (empty for unknown subjects)
    pub fn excluded(&self, subject_id: &str) -> BTreeSet<NaiveDate> {
        self.excluded.get(subject_id).cloned().unwrap_or_default()
    }

    /// Move a date from included to excluded.
    ///
    /// Returns false (no-op) if the date is already excluded or the subject has
    /// no record on that day in the store.
    pub fn exclude(&mut self, store: &RecordStore, subject_id: &str, date: NaiveDate) -> bool {
        if !store.has_date(subject_id, date) {
            tracing::debug!("Subject {} has no sample on {}, not excluding", subject_id, date);
            return false;
        }
        let inserted = self
            .excluded
            .entry(subject_id.to_string())
            .or_default()
            .insert(date);
        if inserted {
            tracing::debug!("Excluded {} for subject {}", date, subject_id);
        }
        inserted
    }

    /// Move a date back from excluded to included. No-op if not excluded.
    pub fn restore(&mut self, subject_id: &str, date: NaiveDate) -> bool {
        let Some(dates) = self.excluded.get_mut(subject_id) else {
            return false;
        };
        let removed = dates.remove(&date);
        if dates.is_empty() {
            self.excluded.remove(subject_id);
        }
        if removed {
            tracing::debug!("Restored {} for subject {}", date, subject_id);
        }
        removed
    }

    pub fn is_included(&self, subject_id: &str, date: NaiveDate) -> bool {
        self.excluded
            .get(subject_id)
            .map_or(true, |dates| !dates.contains(&date))
    }

    /// Included dates of a subject on one blood source
    pub fn included(
        &self,
        store: &RecordStore,
        subject_id: &str,
        blood_source: &str,
    ) -> BTreeSet<NaiveDate> {
        store
            .dates_for(subject_id, blood_source)
            .into_iter()
            .filter(|date| self.is_included(subject_id, *date))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.excluded.is_empty()
    }

    /// Restore every excluded date
    pub fn clear(&mut self) {
        self.excluded.clear();
    }
}
