//! Subject metadata joined into aggregation.
//!
//! Each subject has at most one row of named columns. Values are opaque
//! strings: they are compared for equality when grouping and never coerced.

use crate::{Error, Result};
use csv::ReaderBuilder;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

/// Default name of the subject id column in imported metadata files
pub const DEFAULT_ID_COLUMN: &str = "animal_id";

#[derive(Clone, Debug, Default)]
pub struct MetadataTable {
    /// Column names in import order (id column excluded)
    columns: Vec<String>,
    /// Subject ids in insertion order
    order: Vec<String>,
    rows: HashMap<String, BTreeMap<String, String>>,
}

impl MetadataTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert the row of one subject.
    ///
    /// Fails if the subject already has a row.
    pub fn insert<I, K, V>(&mut self, subject_id: impl Into<String>, row: I) -> Result<()>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let subject_id = subject_id.into();
        if self.rows.contains_key(&subject_id) {
            return Err(Error::Metadata(format!(
                "duplicate metadata row for subject '{}'",
                subject_id
            )));
        }

        let row: BTreeMap<String, String> =
            row.into_iter().map(|(k, v)| (k.into(), v.into())).collect();
        for column in row.keys() {
            if !self.columns.contains(column) {
                self.columns.push(column.clone());
            }
        }
        self.order.push(subject_id.clone());
        self.rows.insert(subject_id, row);
        Ok(())
    }

    pub fn has_row(&self, subject_id: &str) -> bool {
        self.rows.contains_key(subject_id)
    }

    pub fn value(&self, subject_id: &str, column: &str) -> Option<&str> {
        self.rows.get(subject_id)?.get(column).map(String::as_str)
    }

    /// Group label of a subject: the values of `columns` joined by `separator`
    /// in the given order. `None` if the subject lacks any of the columns.
    pub fn group_label(&self, subject_id: &str, columns: &[String], separator: &str) -> Option<String> {
        let values = columns
            .iter()
            .map(|c| self.value(subject_id, c))
            .collect::<Option<Vec<_>>>()?;
        Some(values.join(separator))
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Subject ids with a row, in the order they were inserted (file row
    /// order for imported tables)
    pub fn subject_ids(&self) -> &[String] {
        &self.order
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Import a metadata CSV with one row per subject.
    ///
    /// Cells are trimmed; empty cells are left out of the row so the subject
    /// counts as missing that column.
    pub fn from_csv_path(path: &Path, id_column: &str) -> Result<Self> {
        let mut reader = ReaderBuilder::new().has_headers(true).from_path(path)?;
        let headers = reader.headers()?.clone();

        let id_index = headers
            .iter()
            .position(|h| h.trim() == id_column)
            .ok_or_else(|| {
                Error::Metadata(format!("{:?} has no '{}' column", path, id_column))
            })?;

        let mut table = Self::new();
        for header in headers.iter().map(str::trim) {
            if header != id_column && !table.columns.iter().any(|c| c == header) {
                table.columns.push(header.to_string());
            }
        }

        for (line, result) in reader.records().enumerate() {
            let record = result?;
            let subject_id = record.get(id_index).map(str::trim).unwrap_or_default();
            if subject_id.is_empty() {
                tracing::warn!("Metadata row {} has no subject id, skipping", line + 2);
                continue;
            }

            let row: Vec<(String, String)> = headers
                .iter()
                .zip(record.iter())
                .enumerate()
                .filter(|(i, (_, cell))| *i != id_index && !cell.trim().is_empty())
                .map(|(_, (header, cell))| (header.trim().to_string(), cell.trim().to_string()))
                .collect();
            table.insert(subject_id, row)?;
        }

        tracing::info!(
            "Loaded metadata for {} subjects ({} columns) from {:?}",
            table.len(),
            table.columns.len(),
            path
        );
        Ok(table)
    }
}
