//! Filter engine: selection → exclusion-applied series plus warnings.
//!
//! For every selected subject the engine walks its records on the selected
//! blood source, drops excluded days, and builds one ordered series per
//! analyte of the family. Subjects lacking valid reference limits are
//! reported through a [`WarningList`].

use crate::exclusion::DateExclusionSet;
use crate::store::RecordStore;
use crate::validity::{self, Flag};
use crate::warnings::WarningList;
use crate::{Error, FeatureFamily, Result, Selection};
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// When a subject missing valid data for part of a family gets warned
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningPolicy {
    /// Warn if any analyte of the family has zero valid records
    #[default]
    AnyAnalyte,
    /// Warn only if every analyte of the family has zero valid records
    AllAnalytes,
}

/// One plotted measurement
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SeriesPoint {
    pub analysis_date: NaiveDateTime,
    pub value: f64,
    pub low_limit: Option<f64>,
    pub high_limit: Option<f64>,
    pub flag: Flag,
}

impl SeriesPoint {
    /// Calendar day used for display and bucketing
    pub fn day(&self) -> NaiveDate {
        self.analysis_date.date()
    }
}

/// Points of one subject for one analyte, oldest first
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SubjectSeries {
    pub subject_id: String,
    pub points: Vec<SeriesPoint>,
}

/// All subject series for one analyte, in selection order
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AnalyteSeries {
    pub analyte: String,
    pub subjects: Vec<SubjectSeries>,
}

impl AnalyteSeries {
    pub fn subject(&self, subject_id: &str) -> Option<&SubjectSeries> {
        self.subjects.iter().find(|s| s.subject_id == subject_id)
    }
}

/// Output of [`filter`]
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct FilteredResult {
    pub family: FeatureFamily,
    pub blood_source: String,
    /// Selected subjects found in the store, in selection order
    pub subjects: Vec<String>,
    /// One entry per family analyte, in family order
    pub series: Vec<AnalyteSeries>,
    /// Selected ids with no record at all in the store
    pub unknown_subjects: Vec<String>,
}

impl FilteredResult {
    pub fn analyte(&self, analyte: &str) -> Option<&AnalyteSeries> {
        self.series.iter().find(|s| s.analyte == analyte)
    }

    /// Total number of points across all analytes and subjects
    pub fn point_count(&self) -> usize {
        self.series
            .iter()
            .flat_map(|a| &a.subjects)
            .map(|s| s.points.len())
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.point_count() == 0
    }
}

/// Narrow the store to a selection, honouring exclusions.
///
/// Fails with [`Error::EmptySelection`] if no subject id is given. An empty
/// result is not an error.
pub fn filter(
    store: &RecordStore,
    selection: &Selection,
    exclusions: &DateExclusionSet,
    policy: WarningPolicy,
) -> Result<(FilteredResult, WarningList)> {
    if selection.subject_ids.is_empty() {
        return Err(Error::EmptySelection);
    }

    let family = selection.family;
    let source = selection.blood_source.as_str();
    let analytes = family.analytes();

    let mut warnings = WarningList::new(family, source);
    let mut subjects = Vec::new();
    let mut unknown_subjects = Vec::new();
    let mut series: Vec<AnalyteSeries> = analytes
        .iter()
        .map(|code| AnalyteSeries {
            analyte: code.to_string(),
            subjects: Vec::new(),
        })
        .collect();

    let mut seen = HashSet::new();
    for subject_id in &selection.subject_ids {
        if !seen.insert(subject_id.as_str()) {
            continue;
        }
        if !store.contains_subject(subject_id) {
            tracing::debug!("Subject {} not in store, skipping", subject_id);
            unknown_subjects.push(subject_id.clone());
            continue;
        }
        subjects.push(subject_id.clone());

        let records: Vec<_> = store
            .records_for(subject_id, source)
            .into_iter()
            .filter(|r| exclusions.is_included(subject_id, r.day()))
            .collect();

        let mut missing = 0;
        for (code, analyte_series) in analytes.iter().zip(series.iter_mut()) {
            let points: Vec<SeriesPoint> = records
                .iter()
                .filter_map(|r| {
                    let reading = r.reading(code)?;
                    Some(SeriesPoint {
                        analysis_date: r.analysis_date,
                        value: reading.value?,
                        low_limit: reading.low_limit,
                        high_limit: reading.high_limit,
                        flag: Flag::of(reading),
                    })
                })
                .collect();

            let valid = records.iter().filter(|r| validity::is_valid(r, code)).count();
            if valid == 0 {
                tracing::debug!("Subject {} has no valid {} on {}", subject_id, code, source);
                missing += 1;
            }

            analyte_series.subjects.push(SubjectSeries {
                subject_id: subject_id.clone(),
                points,
            });
        }

        let warn = match policy {
            WarningPolicy::AnyAnalyte => missing > 0,
            WarningPolicy::AllAnalytes => missing == analytes.len(),
        };
        if warn {
            warnings.push(subject_id);
        }
    }

    let result = FilteredResult {
        family,
        blood_source: source.to_string(),
        subjects,
        series,
        unknown_subjects,
    };

    tracing::info!(
        "Filtered {} subjects on {} / {}: {} points, {} warned",
        result.subjects.len(),
        source,
        family,
        result.point_count(),
        warnings.len()
    );

    Ok((result, warnings))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{AnalyteReading, Record};

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
    }

    fn at(d: u32) -> NaiveDateTime {
        day(d).and_hms_opt(10, 0, 0).unwrap()
    }

    /// A has one valid PLT point on Serum and no MPV; B only has Blood records.
    fn scenario_store() -> RecordStore {
        RecordStore::from_records(vec![
            Record::new("A", "Serum", at(1))
                .with_analyte("PLT", AnalyteReading::full(250.0, 100.0, 400.0)),
            Record::new("B", "Blood", at(1))
                .with_analyte("PLT", AnalyteReading::full(300.0, 100.0, 400.0)),
        ])
        .unwrap()
    }

    fn plt_selection(ids: &[&str]) -> Selection {
        Selection::new(ids.iter().copied(), "Serum", FeatureFamily::Plt)
    }

    #[test]
    fn test_scenario_any_analyte_policy() {
        let store = scenario_store();
        let (result, warnings) = filter(
            &store,
            &plt_selection(&["A", "B"]),
            &DateExclusionSet::new(),
            WarningPolicy::AnyAnalyte,
        )
        .unwrap();

        let plt = result.analyte("PLT").unwrap();
        let a_points = &plt.subject("A").unwrap().points;
        assert_eq!(a_points.len(), 1);
        assert_eq!(a_points[0].value, 250.0);
        assert_eq!(a_points[0].day(), day(1));
        assert_eq!(a_points[0].flag, Flag::Valid);

        let mpv = result.analyte("MPV").unwrap();
        assert!(mpv.subject("A").unwrap().points.is_empty());

        // A lacks MPV entirely, so the default policy warns it too
        assert_eq!(warnings.subject_ids(), &["A".to_string(), "B".to_string()]);
    }

    #[test]
    fn test_scenario_all_analytes_policy() {
        let store = scenario_store();
        let (result, warnings) = filter(
            &store,
            &plt_selection(&["A", "B"]),
            &DateExclusionSet::new(),
            WarningPolicy::AllAnalytes,
        )
        .unwrap();

        assert_eq!(warnings.subject_ids(), &["B".to_string()]);
        assert!(result.analyte("PLT").unwrap().subject("B").unwrap().points.is_empty());
    }

    #[test]
    fn test_empty_selection() {
        let result = filter(
            &scenario_store(),
            &plt_selection(&[]),
            &DateExclusionSet::new(),
            WarningPolicy::default(),
        );
        assert!(matches!(result, Err(Error::EmptySelection)));
    }

    #[test]
    fn test_unknown_subjects_dropped_but_reported() {
        let (result, warnings) = filter(
            &scenario_store(),
            &plt_selection(&["Z", "A"]),
            &DateExclusionSet::new(),
            WarningPolicy::AllAnalytes,
        )
        .unwrap();

        assert_eq!(result.subjects, vec!["A".to_string()]);
        assert_eq!(result.unknown_subjects, vec!["Z".to_string()]);
        assert!(warnings.is_empty());
    }

    #[test]
    fn test_empty_result_is_valid() {
        let (result, warnings) = filter(
            &scenario_store(),
            &plt_selection(&["B"]),
            &DateExclusionSet::new(),
            WarningPolicy::AnyAnalyte,
        )
        .unwrap();

        assert!(result.is_empty());
        assert_eq!(warnings.len(), 1);
    }

    #[test]
    fn test_excluded_dates_are_dropped() {
        let store = RecordStore::from_records(vec![
            Record::new("A", "Serum", at(1))
                .with_analyte("PLT", AnalyteReading::full(250.0, 100.0, 400.0)),
            Record::new("A", "Serum", at(2))
                .with_analyte("PLT", AnalyteReading::full(260.0, 100.0, 400.0)),
        ])
        .unwrap();
        let mut exclusions = DateExclusionSet::new();
        exclusions.exclude(&store, "A", day(1));

        let (result, _) = filter(
            &store,
            &plt_selection(&["A"]),
            &exclusions,
            WarningPolicy::AllAnalytes,
        )
        .unwrap();

        let points = &result.analyte("PLT").unwrap().subject("A").unwrap().points;
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].value, 260.0);
    }

    #[test]
    fn test_excluding_only_valid_date_raises_warning() {
        let store = scenario_store();
        let mut exclusions = DateExclusionSet::new();
        exclusions.exclude(&store, "A", day(1));

        let (_, warnings) = filter(
            &store,
            &plt_selection(&["A"]),
            &exclusions,
            WarningPolicy::AllAnalytes,
        )
        .unwrap();
        assert_eq!(warnings.subject_ids(), &["A".to_string()]);
    }

    #[test]
    fn test_points_without_limits_are_flagged_and_warned() {
        let store = RecordStore::from_records(vec![Record::new("A", "Serum", at(1))
            .with_analyte("PLT", AnalyteReading::new(Some(250.0), None, Some(400.0)))
            .with_analyte("MPV", AnalyteReading::full(9.0, 7.0, 11.0))])
        .unwrap();

        let (result, warnings) = filter(
            &store,
            &plt_selection(&["A"]),
            &DateExclusionSet::new(),
            WarningPolicy::AnyAnalyte,
        )
        .unwrap();

        let points = &result.analyte("PLT").unwrap().subject("A").unwrap().points;
        assert_eq!(points.len(), 1, "point without limits is still plotted");
        assert_eq!(points[0].flag, Flag::MissingLimits);
        assert_eq!(warnings.subject_ids(), &["A".to_string()]);
    }

    #[test]
    fn test_selection_order_and_duplicates() {
        let store = RecordStore::from_records(vec![
            Record::new("10", "Serum", at(1))
                .with_analyte("PLT", AnalyteReading::full(1.0, 0.0, 2.0)),
            Record::new("2", "Serum", at(1))
                .with_analyte("PLT", AnalyteReading::full(1.0, 0.0, 2.0)),
        ])
        .unwrap();

        let (result, _) = filter(
            &store,
            &plt_selection(&["2", "10", "2"]),
            &DateExclusionSet::new(),
            WarningPolicy::AllAnalytes,
        )
        .unwrap();

        assert_eq!(result.subjects, vec!["2".to_string(), "10".to_string()]);
        let ids: Vec<_> = result.series[1]
            .subjects
            .iter()
            .map(|s| s.subject_id.as_str())
            .collect();
        assert_eq!(ids, vec!["2", "10"]);
    }
}
