//! Static catalog of feature families and the analyte schema.
//!
//! Families partition the analyte universe. The schema enumerates every
//! analyte code with its three stored fields and is versioned so persisted
//! tables can be checked against it.

use crate::{Error, Result};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

const PLT_ANALYTES: &[&str] = &["MPV", "PLT"];
const RBC_ANALYTES: &[&str] = &["HCT", "HGB", "MCH", "MCHC", "MCV", "RBC", "RDW"];
const WBC_ANALYTES: &[&str] = &[
    "EOS%", "EOS#", "GRA%", "GRA#", "LYM%", "LYM#", "MON%", "MON#", "WBC",
];

/// Current version of the analyte schema.
pub const SCHEMA_VERSION: u32 = 1;

/// Suffixes of the three per-analyte columns, in storage order.
pub const FIELD_SUFFIXES: [&str; 3] = ["Value", "LowLimit", "HighLimit"];

// ============================================================================
// Feature Families
// ============================================================================

/// A physiological grouping of analytes
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum FeatureFamily {
    #[serde(rename = "PLT FAMILY")]
    Plt,
    #[serde(rename = "RBC FAMILY")]
    Rbc,
    #[serde(rename = "WBC FAMILY")]
    Wbc,
}

impl FeatureFamily {
    pub const ALL: [FeatureFamily; 3] = [FeatureFamily::Plt, FeatureFamily::Rbc, FeatureFamily::Wbc];

    /// Display name, e.g. `PLT FAMILY`
    pub fn name(self) -> &'static str {
        match self {
            FeatureFamily::Plt => "PLT FAMILY",
            FeatureFamily::Rbc => "RBC FAMILY",
            FeatureFamily::Wbc => "WBC FAMILY",
        }
    }

    /// Ordered analyte codes of this family
    pub fn analytes(self) -> &'static [&'static str] {
        match self {
            FeatureFamily::Plt => PLT_ANALYTES,
            FeatureFamily::Rbc => RBC_ANALYTES,
            FeatureFamily::Wbc => WBC_ANALYTES,
        }
    }
}

impl fmt::Display for FeatureFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for FeatureFamily {
    type Err = Error;

    /// Accepts the exact family names and the short aliases `plt`, `rbc`, `wbc`.
    fn from_str(s: &str) -> Result<Self> {
        if let Some(family) = FeatureFamily::ALL.iter().find(|f| f.name() == s) {
            return Ok(*family);
        }
        match s.to_lowercase().as_str() {
            "plt" => Ok(FeatureFamily::Plt),
            "rbc" => Ok(FeatureFamily::Rbc),
            "wbc" => Ok(FeatureFamily::Wbc),
            _ => Err(Error::UnknownFamily(s.to_string())),
        }
    }
}

/// Ordered analyte codes for a family given by name.
///
/// Fails with [`Error::UnknownFamily`] for anything but the three fixed names.
pub fn analytes_for(family_name: &str) -> Result<&'static [&'static str]> {
    FeatureFamily::ALL
        .iter()
        .find(|f| f.name() == family_name)
        .map(|f| f.analytes())
        .ok_or_else(|| Error::UnknownFamily(family_name.to_string()))
}

// ============================================================================
// Analyte Schema
// ============================================================================

/// Explicit enumeration of analyte codes accepted at ingestion
#[derive(Clone, Debug)]
pub struct AnalyteSchema {
    pub version: u32,
    codes: Vec<&'static str>,
    families: HashMap<&'static str, FeatureFamily>,
}

/// Cached schema - built once and reused
static CURRENT_SCHEMA: Lazy<AnalyteSchema> = Lazy::new(|| AnalyteSchema::build(SCHEMA_VERSION));

impl AnalyteSchema {
    /// Get a reference to the cached current schema
    pub fn current() -> &'static AnalyteSchema {
        &CURRENT_SCHEMA
    }

    fn build(version: u32) -> Self {
        let mut codes = Vec::new();
        let mut families = HashMap::new();
        for family in FeatureFamily::ALL {
            for code in family.analytes() {
                codes.push(*code);
                families.insert(*code, family);
            }
        }
        Self {
            version,
            codes,
            families,
        }
    }

    /// All analyte codes, family by family
    pub fn codes(&self) -> &[&'static str] {
        &self.codes
    }

    pub fn is_known(&self, code: &str) -> bool {
        self.families.contains_key(code)
    }

    pub fn family_of(&self, code: &str) -> Option<FeatureFamily> {
        self.families.get(code).copied()
    }

    /// Column name of one analyte field, e.g. `PLT_LowLimit`
    pub fn column_name(code: &str, suffix: &str) -> String {
        format!("{}_{}", code, suffix)
    }

    /// Split a column name into (code, field suffix) if it names an analyte field.
    ///
    /// The code itself is not checked against the schema.
    pub fn split_column(column: &str) -> Option<(&str, &str)> {
        let (code, suffix) = column.rsplit_once('_')?;
        if code.is_empty() || !FIELD_SUFFIXES.contains(&suffix) {
            return None;
        }
        Some((code, suffix))
    }

    /// Validate the schema for consistency
    ///
    /// Returns a list of validation errors, or empty Vec if valid.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        let mut seen: HashMap<&str, FeatureFamily> = HashMap::new();

        for family in FeatureFamily::ALL {
            if family.analytes().is_empty() {
                errors.push(format!("Family '{}' has no analytes", family));
            }
            for code in family.analytes() {
                if code.is_empty() {
                    errors.push(format!("Family '{}' has an empty analyte code", family));
                }
                if code.contains('_') {
                    errors.push(format!(
                        "Analyte code '{}' contains the column separator '_'",
                        code
                    ));
                }
                if let Some(previous) = seen.insert(code, family) {
                    errors.push(format!(
                        "Analyte '{}' belongs to both '{}' and '{}'",
                        code, previous, family
                    ));
                }
            }
        }

        if self.codes.len() != seen.len() {
            errors.push("Schema codes do not match family membership".to_string());
        }

        errors
    }
}
