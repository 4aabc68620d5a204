//! Aggregation engine: grouped statistics over a filtered subset.
//!
//! Subjects are grouped by a label built from imported metadata columns.
//! Two modes are supported:
//! - **Global**: mean and standard deviation per (analyte, group)
//! - **Time series**: median and standard deviation per (analyte, day, group)
//!
//! Every combination that has no data yields an explicit [`Summary::NoData`].

use crate::filter::FilteredResult;
use crate::metadata::MetadataTable;
use crate::stats::{self, Dispersion};
use crate::{Error, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

/// Default separator between column values of a composite group label
pub const DEFAULT_SEPARATOR: &str = "_";

/// Aggregation mode
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregationMode {
    Global,
    Timeseries,
}

/// Central tendency and dispersion of one group, or an explicit gap
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Summary {
    Computed {
        center: f64,
        dispersion: f64,
        count: usize,
    },
    NoData,
}

impl Summary {
    pub fn is_no_data(&self) -> bool {
        matches!(self, Summary::NoData)
    }

    pub fn center(&self) -> Option<f64> {
        match self {
            Summary::Computed { center, .. } => Some(*center),
            Summary::NoData => None,
        }
    }

    pub fn dispersion(&self) -> Option<f64> {
        match self {
            Summary::Computed { dispersion, .. } => Some(*dispersion),
            Summary::NoData => None,
        }
    }
}

/// One cell of the aggregation output
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct GroupedStatistic {
    pub group: String,
    pub analyte: String,
    /// Day bucket; `None` for global aggregation
    pub bucket: Option<NaiveDate>,
    pub summary: Summary,
}

/// Output of an aggregation call
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Aggregation {
    pub mode: AggregationMode,
    pub group_columns: Vec<String>,
    /// Group labels in first-appearance order
    pub groups: Vec<String>,
    /// Sorted day buckets (empty for global aggregation)
    pub buckets: Vec<NaiveDate>,
    /// Ordered by analyte, then bucket, then group
    pub statistics: Vec<GroupedStatistic>,
    /// Subjects left out for lacking a metadata row or a group column
    pub dropped_subjects: Vec<String>,
}

impl Aggregation {
    pub fn get(&self, analyte: &str, group: &str, bucket: Option<NaiveDate>) -> Option<&Summary> {
        self.statistics
            .iter()
            .find(|s| s.analyte == analyte && s.group == group && s.bucket == bucket)
            .map(|s| &s.summary)
    }
}

/// Aggregation settings
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AggregationConfig {
    #[serde(default = "default_separator")]
    pub separator: String,

    #[serde(default)]
    pub dispersion: Dispersion,
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            separator: default_separator(),
            dispersion: Dispersion::default(),
        }
    }
}

fn default_separator() -> String {
    DEFAULT_SEPARATOR.to_string()
}

/// Aggregation engine with fixed settings
#[derive(Clone, Debug, Default)]
pub struct Aggregator {
    config: AggregationConfig,
}

impl Aggregator {
    pub fn new(config: AggregationConfig) -> Self {
        Self { config }
    }

    pub fn aggregate(
        &self,
        filtered: &FilteredResult,
        metadata: &MetadataTable,
        group_columns: &[String],
        mode: AggregationMode,
    ) -> Result<Aggregation> {
        match mode {
            AggregationMode::Global => self.aggregate_global(filtered, metadata, group_columns),
            AggregationMode::Timeseries => {
                self.aggregate_timeseries(filtered, metadata, group_columns)
            }
        }
    }

    /// Mean and standard deviation per (analyte, group) over all points.
    pub fn aggregate_global(
        &self,
        filtered: &FilteredResult,
        metadata: &MetadataTable,
        group_columns: &[String],
    ) -> Result<Aggregation> {
        let grouping = self.group_subjects(filtered, metadata, group_columns)?;
        let mut statistics = Vec::new();

        for analyte in &filtered.series {
            let mut values: HashMap<&str, Vec<f64>> = HashMap::new();
            for subject in &analyte.subjects {
                if let Some(group) = grouping.label_of(&subject.subject_id) {
                    values
                        .entry(group)
                        .or_default()
                        .extend(subject.points.iter().map(|p| p.value));
                }
            }

            for group in &grouping.groups {
                let group_values = values.get(group.as_str()).map(Vec::as_slice).unwrap_or(&[]);
                statistics.push(GroupedStatistic {
                    group: group.clone(),
                    analyte: analyte.analyte.clone(),
                    bucket: None,
                    summary: self.summarize(group_values, stats::mean),
                });
            }
        }

        tracing::info!(
            "Global aggregation: {} groups, {} statistics",
            grouping.groups.len(),
            statistics.len()
        );

        Ok(Aggregation {
            mode: AggregationMode::Global,
            group_columns: group_columns.to_vec(),
            groups: grouping.groups,
            buckets: Vec::new(),
            statistics,
            dropped_subjects: grouping.dropped,
        })
    }

    /// Median and standard deviation per (analyte, day, group).
    ///
    /// Buckets are the sorted distinct days of every point in the subset.
    pub fn aggregate_timeseries(
        &self,
        filtered: &FilteredResult,
        metadata: &MetadataTable,
        group_columns: &[String],
    ) -> Result<Aggregation> {
        let grouping = self.group_subjects(filtered, metadata, group_columns)?;

        let buckets: Vec<NaiveDate> = filtered
            .series
            .iter()
            .flat_map(|a| &a.subjects)
            .flat_map(|s| &s.points)
            .map(|p| p.day())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let mut statistics = Vec::new();
        for analyte in &filtered.series {
            let mut values: HashMap<(NaiveDate, &str), Vec<f64>> = HashMap::new();
            for subject in &analyte.subjects {
                let Some(group) = grouping.label_of(&subject.subject_id) else {
                    continue;
                };
                for point in &subject.points {
                    values.entry((point.day(), group)).or_default().push(point.value);
                }
            }

            for bucket in &buckets {
                for group in &grouping.groups {
                    let cell = values
                        .get(&(*bucket, group.as_str()))
                        .map(Vec::as_slice)
                        .unwrap_or(&[]);
                    statistics.push(GroupedStatistic {
                        group: group.clone(),
                        analyte: analyte.analyte.clone(),
                        bucket: Some(*bucket),
                        summary: self.summarize(cell, stats::median),
                    });
                }
            }
        }

        tracing::info!(
            "Time-series aggregation: {} groups x {} buckets, {} statistics",
            grouping.groups.len(),
            buckets.len(),
            statistics.len()
        );

        Ok(Aggregation {
            mode: AggregationMode::Timeseries,
            group_columns: group_columns.to_vec(),
            groups: grouping.groups,
            buckets,
            statistics,
            dropped_subjects: grouping.dropped,
        })
    }

    fn summarize(&self, values: &[f64], center: fn(&[f64]) -> Option<f64>) -> Summary {
        match (center(values), stats::std_dev(values, self.config.dispersion)) {
            (Some(center), Some(dispersion)) => Summary::Computed {
                center,
                dispersion,
                count: values.len(),
            },
            _ => Summary::NoData,
        }
    }

    fn group_subjects(
        &self,
        filtered: &FilteredResult,
        metadata: &MetadataTable,
        group_columns: &[String],
    ) -> Result<Grouping> {
        if group_columns.is_empty() {
            return Err(Error::NoGroupingColumn);
        }
        if !filtered.subjects.iter().any(|s| metadata.has_row(s)) {
            return Err(Error::InsufficientMetadata);
        }

        let mut grouping = Grouping::default();
        for subject_id in &filtered.subjects {
            match metadata.group_label(subject_id, group_columns, &self.config.separator) {
                Some(label) => {
                    if !grouping.groups.contains(&label) {
                        grouping.groups.push(label.clone());
                    }
                    grouping.labels.insert(subject_id.clone(), label);
                }
                None => {
                    tracing::debug!("Subject {} lacks metadata for grouping, dropped", subject_id);
                    grouping.dropped.push(subject_id.clone());
                }
            }
        }
        Ok(grouping)
    }
}

#[derive(Debug, Default)]
struct Grouping {
    groups: Vec<String>,
    labels: HashMap<String, String>,
    dropped: Vec<String>,
}

impl Grouping {
    fn label_of(&self, subject_id: &str) -> Option<&str> {
        self.labels.get(subject_id).map(String::as_str)
    }
}

/// Global aggregation with default settings
pub fn aggregate_global(
    filtered: &FilteredResult,
    metadata: &MetadataTable,
    group_columns: &[String],
) -> Result<Aggregation> {
    Aggregator::default().aggregate_global(filtered, metadata, group_columns)
}

/// Time-series aggregation with default settings
pub fn aggregate_timeseries(
    filtered: &FilteredResult,
    metadata: &MetadataTable,
    group_columns: &[String],
) -> Result<Aggregation> {
    Aggregator::default().aggregate_timeseries(filtered, metadata, group_columns)
}
