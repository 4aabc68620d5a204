//! Descriptive statistics used by the aggregation engine.

use serde::{Deserialize, Serialize};

/// Divisor used for the standard deviation
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dispersion {
    /// Divide by N
    #[default]
    Population,
    /// Divide by N - 1
    Sample,
}

/// Arithmetic mean, `None` for an empty slice
pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Median, averaging the two middle values for even lengths
pub fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    } else {
        Some(sorted[mid])
    }
}

/// Standard deviation around the mean.
///
/// The sample deviation of a single value is reported as 0.
pub fn std_dev(values: &[f64], dispersion: Dispersion) -> Option<f64> {
    let mean = mean(values)?;
    let n = values.len() as f64;
    let divisor = match dispersion {
        Dispersion::Population => n,
        Dispersion::Sample if values.len() < 2 => return Some(0.0),
        Dispersion::Sample => n - 1.0,
    };
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / divisor;
    Some(variance.sqrt())
}
