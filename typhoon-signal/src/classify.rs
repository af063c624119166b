use crate::ladder::ThresholdLadder;
use serde::{Serialize, Serializer};
use std::fmt;

/// How one timestamp's station speeds are reduced to a signal label.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AggregationMethod {
    /// A rung passes when enough stations meet it. `min_count`, when set,
    /// overrides the `fraction` of valid stations.
    Coverage { fraction: f64, min_count: Option<usize> },
    /// A rung passes when the `rank` percentile (0-1) of speeds meets it.
    Percentile { rank: f64 },
    /// A rung passes when the arithmetic mean meets it.
    Mean,
}

impl AggregationMethod {
    pub fn name(&self) -> &'static str {
        match self {
            AggregationMethod::Coverage { .. } => "coverage",
            AggregationMethod::Percentile { .. } => "percentile",
            AggregationMethod::Mean => "mean",
        }
    }
}

/// Instantaneous signal label of one snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignalLabel {
    /// Too few valid stations to decide, the classifier did not run.
    Indeterminate,
    /// The classifier ran and no rung passed.
    BelowMinimum,
    Level { rank: usize, label: String },
}

impl SignalLabel {
    /// Ordering key: both sentinels rank below every rung.
    pub fn severity(&self) -> usize {
        match self {
            SignalLabel::Indeterminate | SignalLabel::BelowMinimum => 0,
            SignalLabel::Level { rank, .. } => rank + 1,
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            SignalLabel::Indeterminate => "Indeterminate",
            SignalLabel::BelowMinimum => "Below minimum",
            SignalLabel::Level { label, .. } => label,
        }
    }
}

impl fmt::Display for SignalLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for SignalLabel {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Highest rung satisfied by `speeds` under `method`.
///
/// `speeds` must already be restricted to valid readings. Rungs are walked in
/// ascending order and the last passing one wins, so a higher rung passing
/// after a lower one failed still counts.
pub fn classify_snapshot(
    speeds: &[f64],
    ladder: &ThresholdLadder,
    method: &AggregationMethod,
) -> SignalLabel {
    if speeds.is_empty() {
        return SignalLabel::Indeterminate;
    }

    let reference = match method {
        AggregationMethod::Coverage { .. } => None,
        AggregationMethod::Percentile { rank } => Some(percentile(speeds, *rank)),
        AggregationMethod::Mean => Some(mean(speeds)),
    };

    let mut chosen = SignalLabel::BelowMinimum;
    for (rank, rung) in ladder.rungs().iter().enumerate() {
        let passed = match (method, reference) {
            (AggregationMethod::Coverage { fraction, min_count }, _) => {
                let count = count_at_or_above(speeds, rung.threshold);
                match min_count {
                    Some(min) => count >= *min,
                    None => count as f64 / speeds.len() as f64 >= *fraction,
                }
            }
            (_, Some(value)) => value >= rung.threshold,
            (_, None) => false,
        };

        if passed {
            chosen = SignalLabel::Level {
                rank,
                label: rung.label.clone(),
            };
        }
    }
    chosen
}

pub fn count_at_or_above(speeds: &[f64], threshold: f64) -> usize {
    speeds.iter().filter(|&&s| s >= threshold).count()
}

/// Arithmetic mean, NaN for an empty slice.
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

pub fn median(values: &[f64]) -> f64 {
    percentile(values, 0.5)
}

/// Percentile with linear interpolation between closest ranks, `rank` in [0, 1].
/// NaN for an empty slice.
pub fn percentile(values: &[f64], rank: f64) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));

    let pos = rank.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lower = pos.floor() as usize;
    let upper = pos.ceil() as usize;
    if lower == upper {
        return sorted[lower];
    }
    let weight = pos - lower as f64;
    sorted[lower] + (sorted[upper] - sorted[lower]) * weight
}
