//! Session context bundling the mutable state of one interactive session.
//!
//! Engine calls borrow the session immutably, so every filter or aggregation
//! sees one consistent view of the store, the exclusions and the metadata.
//! Appending records or editing exclusions needs `&mut self` and therefore
//! happens strictly between calls.

use crate::aggregate::{Aggregation, AggregationMode, Aggregator};
use crate::exclusion::DateExclusionSet;
use crate::filter::{self, FilteredResult, WarningPolicy};
use crate::metadata::MetadataTable;
use crate::store::RecordStore;
use crate::warnings::WarningList;
use crate::{Record, Result, Selection};
use chrono::NaiveDate;

#[derive(Clone, Debug, Default)]
pub struct Session {
    pub store: RecordStore,
    pub exclusions: DateExclusionSet,
    pub metadata: MetadataTable,
}

impl Session {
    pub fn new(store: RecordStore) -> Self {
        Self {
            store,
            ..Self::default()
        }
    }

    /// Ingest more records (see [`RecordStore::append`])
    pub fn append_records(&mut self, records: Vec<Record>) -> Result<usize> {
        self.store.append(records)
    }

    /// Replace the imported metadata
    pub fn set_metadata(&mut self, metadata: MetadataTable) {
        self.metadata = metadata;
    }

    pub fn exclude(&mut self, subject_id: &str, date: NaiveDate) -> bool {
        self.exclusions.exclude(&self.store, subject_id, date)
    }

    pub fn restore(&mut self, subject_id: &str, date: NaiveDate) -> bool {
        self.exclusions.restore(subject_id, date)
    }

    pub fn filter(
        &self,
        selection: &Selection,
        policy: WarningPolicy,
    ) -> Result<(FilteredResult, WarningList)> {
        filter::filter(&self.store, selection, &self.exclusions, policy)
    }

    /// Filter then aggregate the selection by metadata group
    pub fn aggregate(
        &self,
        selection: &Selection,
        group_columns: &[String],
        mode: AggregationMode,
        policy: WarningPolicy,
        aggregator: &Aggregator,
    ) -> Result<(Aggregation, WarningList)> {
        let (filtered, warnings) = self.filter(selection, policy)?;
        let aggregation = aggregator.aggregate(&filtered, &self.metadata, group_columns, mode)?;
        Ok((aggregation, warnings))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{AnalyteReading, FeatureFamily};

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
    }

    fn session() -> Session {
        crate::logging::init_test();

        let records = vec![
            Record::new("1", "Serum", day(1).and_hms_opt(8, 0, 0).unwrap())
                .with_analyte("PLT", AnalyteReading::full(10.0, 1.0, 100.0)),
            Record::new("1", "Serum", day(2).and_hms_opt(8, 0, 0).unwrap())
                .with_analyte("PLT", AnalyteReading::full(30.0, 1.0, 100.0)),
            Record::new("2", "Serum", day(1).and_hms_opt(8, 0, 0).unwrap())
                .with_analyte("PLT", AnalyteReading::full(50.0, 1.0, 100.0)),
        ];
        let mut session = Session::new(RecordStore::from_records(records).unwrap());

        let mut metadata = MetadataTable::new();
        metadata.insert("1", [("arm", "a")]).unwrap();
        metadata.insert("2", [("arm", "b")]).unwrap();
        session.set_metadata(metadata);
        session
    }

    #[test]
    fn test_exclusion_changes_aggregation() {
        let mut session = session();
        let selection = Selection::new(["1", "2"], "Serum", FeatureFamily::Plt);
        let columns = vec!["arm".to_string()];
        let aggregator = Aggregator::default();

        let (before, _) = session
            .aggregate(
                &selection,
                &columns,
                AggregationMode::Global,
                WarningPolicy::AllAnalytes,
                &aggregator,
            )
            .unwrap();
        assert_eq!(before.get("PLT", "a", None).unwrap().center(), Some(20.0));

        assert!(session.exclude("1", day(2)));
        let (after, _) = session
            .aggregate(
                &selection,
                &columns,
                AggregationMode::Global,
                WarningPolicy::AllAnalytes,
                &aggregator,
            )
            .unwrap();
        assert_eq!(after.get("PLT", "a", None).unwrap().center(), Some(10.0));

        assert!(session.restore("1", day(2)));
        let (restored, _) = session
            .aggregate(
                &selection,
                &columns,
                AggregationMode::Global,
                WarningPolicy::AllAnalytes,
                &aggregator,
            )
            .unwrap();
        assert_eq!(restored, before);
    }

    #[test]
    fn test_append_between_calls() {
        let mut session = session();
        let selection = Selection::new(["3"], "Serum", FeatureFamily::Plt);

        let (result, _) = session.filter(&selection, WarningPolicy::default()).unwrap();
        assert_eq!(result.unknown_subjects, vec!["3".to_string()]);

        session
            .append_records(vec![Record::new(
                "3",
                "Serum",
                day(3).and_hms_opt(8, 0, 0).unwrap(),
            )
            .with_analyte("PLT", AnalyteReading::full(5.0, 1.0, 100.0))])
            .unwrap();

        let (result, _) = session.filter(&selection, WarningPolicy::AllAnalytes).unwrap();
        assert_eq!(result.subjects, vec!["3".to_string()]);
        assert_eq!(result.point_count(), 1);
    }
}
