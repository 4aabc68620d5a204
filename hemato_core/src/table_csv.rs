//! Flat CSV persistence of the canonical record table.
//!
//! One row per record: `subject_id,blood_source,analysis_date` followed by
//! `<code>_Value,<code>_LowLimit,<code>_HighLimit` for every schema analyte.
//! Missing numbers are empty fields and cells are trimmed on read. The store
//! refuses ids with surrounding whitespace, so a write/read round trip
//! reproduces its records exactly.

use crate::catalog::{AnalyteSchema, FIELD_SUFFIXES};
use crate::store::RecordStore;
use crate::{AnalyteReading, Error, Record, Result};
use chrono::{NaiveDate, NaiveDateTime};
use fs2::FileExt;
use std::collections::BTreeMap;
use std::fs::File;
use std::path::Path;
use tempfile::NamedTempFile;

pub const SUBJECT_COLUMN: &str = "subject_id";
pub const SOURCE_COLUMN: &str = "blood_source";
pub const DATE_COLUMN: &str = "analysis_date";

/// Header names used by analyzer exports prior to the canonical format
const LEGACY_SUBJECT_COLUMN: &str = "FIELD_SID_PATIENT_ID";
const LEGACY_SOURCE_COLUMN: &str = "FIELD_SID_ANIMAL_NAME";
const LEGACY_DATE_COLUMN: &str = "ANALYSIS_DATE";

const DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

/// Header row of the canonical table
pub fn header() -> Vec<String> {
    let mut columns = vec![
        SUBJECT_COLUMN.to_string(),
        SOURCE_COLUMN.to_string(),
        DATE_COLUMN.to_string(),
    ];
    for code in AnalyteSchema::current().codes() {
        for suffix in FIELD_SUFFIXES {
            columns.push(AnalyteSchema::column_name(code, suffix));
        }
    }
    columns
}

/// Write records to `path`, replacing it atomically.
///
/// The table is written to a temp file in the same directory, synced, and
/// renamed over the target.
pub fn write_table(path: &Path, records: &[Record]) -> Result<()> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(parent)?;

    let temp = NamedTempFile::new_in(parent)?;
    temp.as_file().lock_exclusive()?;

    {
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(temp.as_file());
        writer.write_record(header())?;

        let codes = AnalyteSchema::current().codes();
        for record in records {
            let mut row = vec![
                record.subject_id.clone(),
                record.blood_source.clone(),
                record.analysis_date.format(DATE_FORMAT).to_string(),
            ];
            for code in codes {
                let reading = record.reading(code).copied().unwrap_or_default();
                for field in [reading.value, reading.low_limit, reading.high_limit] {
                    row.push(field.map(|v| v.to_string()).unwrap_or_default());
                }
            }
            writer.write_record(&row)?;
        }
        writer.flush()?;
    }

    temp.as_file().sync_all()?;
    temp.as_file().unlock()?;
    temp.persist(path).map_err(|e| Error::Io(e.error))?;

    tracing::info!("Wrote {} records to {:?}", records.len(), path);
    Ok(())
}

/// Column positions resolved from a header row
struct Layout {
    subject: usize,
    source: usize,
    date: usize,
    /// (column index, analyte code, field suffix)
    fields: Vec<(usize, String, String)>,
}

impl Layout {
    fn from_headers(headers: &csv::StringRecord) -> Result<Self> {
        let find = |names: [&str; 2]| {
            headers
                .iter()
                .position(|h| names.contains(&h.trim()))
                .ok_or_else(|| Error::Schema(format!("table has no '{}' column", names[0])))
        };
        let subject = find([SUBJECT_COLUMN, LEGACY_SUBJECT_COLUMN])?;
        let source = find([SOURCE_COLUMN, LEGACY_SOURCE_COLUMN])?;
        let date = find([DATE_COLUMN, LEGACY_DATE_COLUMN])?;

        let schema = AnalyteSchema::current();
        let mut fields = Vec::new();
        for (index, header) in headers.iter().enumerate() {
            if [subject, source, date].contains(&index) {
                continue;
            }
            match AnalyteSchema::split_column(header.trim()) {
                Some((code, suffix)) if schema.is_known(code) => {
                    fields.push((index, code.to_string(), suffix.to_string()));
                }
                Some((code, _)) => {
                    return Err(Error::Schema(format!(
                        "column '{}' names unknown analyte '{}' (schema v{})",
                        header, code, schema.version
                    )));
                }
                None => tracing::debug!("Ignoring non-analyte column '{}'", header),
            }
        }

        Ok(Self {
            subject,
            source,
            date,
            fields,
        })
    }

    fn parse_row(&self, row: &csv::StringRecord, line: usize) -> Result<Record> {
        let cell = |index: usize| row.get(index).map(str::trim).unwrap_or_default();

        let analysis_date = parse_date(cell(self.date)).ok_or_else(|| {
            Error::InvalidRecord(format!("line {}: bad analysis date '{}'", line, cell(self.date)))
        })?;
        let mut record = Record::new(cell(self.subject), cell(self.source), analysis_date);

        let mut readings: BTreeMap<&str, AnalyteReading> = BTreeMap::new();
        for (index, code, suffix) in &self.fields {
            let value = parse_number(cell(*index)).map_err(|_| {
                Error::InvalidRecord(format!(
                    "line {}: bad number '{}' in {}_{}",
                    line,
                    cell(*index),
                    code,
                    suffix
                ))
            })?;
            let reading = readings.entry(code.as_str()).or_default();
            match suffix.as_str() {
                "Value" => reading.value = value,
                "LowLimit" => reading.low_limit = value,
                _ => reading.high_limit = value,
            }
        }
        for (code, reading) in readings {
            record.set_analyte(code, reading);
        }
        Ok(record)
    }
}

fn parse_date(s: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s, DATE_FORMAT)
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f"))
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

fn parse_number(s: &str) -> std::result::Result<Option<f64>, std::num::ParseFloatError> {
    if s.is_empty() || s.eq_ignore_ascii_case("nan") {
        return Ok(None);
    }
    s.parse::<f64>().map(Some)
}

/// Read every record of a table file, in file order.
pub fn read_table(path: &Path) -> Result<Vec<Record>> {
    let file = File::open(path)?;
    file.lock_shared()?;

    let result = read_records(&file);
    file.unlock()?;

    let records = result?;
    tracing::info!("Read {} records from {:?}", records.len(), path);
    Ok(records)
}

fn read_records(file: &File) -> Result<Vec<Record>> {
    let mut reader = csv::ReaderBuilder::new().has_headers(true).from_reader(file);
    let layout = Layout::from_headers(reader.headers()?)?;

    let mut records = Vec::new();
    for (i, row) in reader.records().enumerate() {
        // header is line 1
        records.push(layout.parse_row(&row?, i + 2)?);
    }
    Ok(records)
}

/// Load a table file into a new store
pub fn load_store(path: &Path) -> Result<RecordStore> {
    RecordStore::from_records(read_table(path)?)
}

/// Save every record of the store, in ingestion order
pub fn save_store(path: &Path, store: &RecordStore) -> Result<()> {
    write_table(path, store.records())
}
