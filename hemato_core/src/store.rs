//! In-memory canonical record table.
//!
//! The store owns every [`Record`] of a session. It only grows: appends never
//! reorder, deduplicate or discard records, and consumers must not assume
//! (subject, source, date) is unique.

use crate::catalog::AnalyteSchema;
use crate::{Error, Record, Result};
use chrono::NaiveDate;
use std::collections::{BTreeSet, HashMap};

#[derive(Clone, Debug, Default)]
pub struct RecordStore {
    records: Vec<Record>,
    /// subject_id → indices into `records`, in ingestion order
    by_subject: HashMap<String, Vec<usize>>,
}

impl RecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store from already-ingested records.
    pub fn from_records(records: Vec<Record>) -> Result<Self> {
        let mut store = Self::new();
        store.append(records)?;
        Ok(store)
    }

    /// Merge new records into the store.
    ///
    /// Every record is validated against the analyte schema first; if any is
    /// rejected nothing is appended. Returns the number of records added.
    pub fn append(&mut self, records: Vec<Record>) -> Result<usize> {
        let schema = AnalyteSchema::current();
        for record in &records {
            validate_record(schema, record)?;
        }

        let added = records.len();
        for record in records {
            let index = self.records.len();
            self.by_subject
                .entry(record.subject_id.clone())
                .or_default()
                .push(index);
            self.records.push(record);
        }

        tracing::debug!("Appended {} records ({} total)", added, self.records.len());
        Ok(added)
    }

    /// Subject ids present in the store
    pub fn subjects(&self) -> BTreeSet<String> {
        self.by_subject.keys().cloned().collect()
    }

    pub fn contains_subject(&self, subject_id: &str) -> bool {
        self.by_subject.contains_key(subject_id)
    }

    /// Distinct blood sources across all records
    pub fn blood_sources(&self) -> BTreeSet<String> {
        self.records.iter().map(|r| r.blood_source.clone()).collect()
    }

    /// Records of one subject on one blood source, oldest first.
    ///
    /// Matching is exact on both keys. Records sharing a timestamp keep their
    /// ingestion order.
    pub fn records_for(&self, subject_id: &str, blood_source: &str) -> Vec<&Record> {
        let mut records: Vec<&Record> = self
            .subject_records(subject_id)
            .filter(|r| r.blood_source == blood_source)
            .collect();
        // sort_by_key is stable
        records.sort_by_key(|r| r.analysis_date);
        records
    }

    /// Distinct sample days of a subject on one blood source
    pub fn dates_for(&self, subject_id: &str, blood_source: &str) -> BTreeSet<NaiveDate> {
        self.subject_records(subject_id)
            .filter(|r| r.blood_source == blood_source)
            .map(Record::day)
            .collect()
    }

    /// Whether the subject has any record on the given day, on any source
    pub fn has_date(&self, subject_id: &str, date: NaiveDate) -> bool {
        self.subject_records(subject_id).any(|r| r.day() == date)
    }

    /// All records in ingestion order
    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn subject_records<'a>(&'a self, subject_id: &str) -> impl Iterator<Item = &'a Record> + 'a {
        self.by_subject
            .get(subject_id)
            .into_iter()
            .flatten()
            .map(move |&i| &self.records[i])
    }
}

fn validate_record(schema: &AnalyteSchema, record: &Record) -> Result<()> {
    if record.subject_id.trim().is_empty() {
        return Err(Error::InvalidRecord(format!(
            "record dated {} has an empty subject id",
            record.analysis_date
        )));
    }
    if record.blood_source.trim().is_empty() {
        return Err(Error::InvalidRecord(format!(
            "record of subject '{}' dated {} has an empty blood source",
            record.subject_id, record.analysis_date
        )));
    }
    for (field, value) in [
        ("subject id", &record.subject_id),
        ("blood source", &record.blood_source),
    ] {
        if value.trim() != value.as_str() {
            return Err(Error::InvalidRecord(format!(
                "record dated {} has surrounding whitespace in its {} '{}'",
                record.analysis_date, field, value
            )));
        }
    }
    if let Some(code) = record.analytes.keys().find(|code| !schema.is_known(code)) {
        return Err(Error::Schema(format!(
            "record of subject '{}' carries unknown analyte '{}' (schema v{})",
            record.subject_id, code, schema.version
        )));
    }
    Ok(())
}
