#![forbid(unsafe_code)]

//! Core filtering, exclusion and aggregation engine for longitudinal
//! blood-panel measurements.
//!
//! This crate provides:
//! - Domain types (records, analyte readings, selections)
//! - The static feature-family catalog and analyte schema
//! - The record store, date exclusions and metadata join
//! - Filter and aggregation engines
//! - Canonical table persistence (CSV)

pub mod types;
pub mod error;
pub mod catalog;
pub mod config;
pub mod logging;
pub mod store;
pub mod exclusion;
pub mod validity;
pub mod warnings;
pub mod filter;
pub mod stats;
pub mod metadata;
pub mod aggregate;
pub mod table_csv;
pub mod session;

// Re-export commonly used types
pub use error::{Error, Result};
pub use types::*;
pub use catalog::{analytes_for, AnalyteSchema, FeatureFamily};
pub use config::Config;
pub use store::RecordStore;
pub use exclusion::DateExclusionSet;
pub use filter::{filter, FilteredResult, WarningPolicy};
pub use metadata::MetadataTable;
pub use aggregate::{
    aggregate_global, aggregate_timeseries, Aggregation, AggregationMode, Aggregator,
    GroupedStatistic, Summary,
};
pub use warnings::WarningList;
pub use session::Session;
