use serde::Serialize;
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum LadderError {
    #[error("Threshold ladder is empty")]
    Empty,
    #[error("Threshold ladder needs at least two rungs, got {0}")]
    TooShort(usize),
    #[error("Invalid threshold for {label}: {value}")]
    InvalidThreshold { label: String, value: f64 },
    #[error("Duplicate threshold {value} shared by {first} and {second}")]
    DuplicateThreshold {
        first: String,
        second: String,
        value: f64,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Rung {
    pub label: String,
    pub threshold: f64,
}

/// Signal thresholds (km/h), strictly ascending.
///
/// The second-highest rung is the "severe" reference point used by the
/// persistence and pattern scans, the highest rung is the "extreme" reference
/// point used by the eye-passage detector.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ThresholdLadder {
    rungs: Vec<Rung>,
}

impl ThresholdLadder {
    /// Build the ladder from a label -> threshold map, sorting by threshold.
    ///
    /// Labels are unique by construction of the map. Two equal thresholds would
    /// leave "highest satisfied" ambiguous and are rejected.
    pub fn from_map(thresholds: &BTreeMap<String, f64>) -> Result<Self, LadderError> {
        if thresholds.is_empty() {
            return Err(LadderError::Empty);
        }

        let mut rungs = Vec::with_capacity(thresholds.len());
        for (label, &value) in thresholds {
            if !value.is_finite() || value < 0.0 {
                return Err(LadderError::InvalidThreshold {
                    label: label.clone(),
                    value,
                });
            }
            rungs.push(Rung {
                label: label.clone(),
                threshold: value,
            });
        }

        rungs.sort_by(|a, b| a.threshold.total_cmp(&b.threshold));

        for pair in rungs.windows(2) {
            if pair[0].threshold == pair[1].threshold {
                return Err(LadderError::DuplicateThreshold {
                    first: pair[0].label.clone(),
                    second: pair[1].label.clone(),
                    value: pair[0].threshold,
                });
            }
        }

        if rungs.len() < 2 {
            return Err(LadderError::TooShort(rungs.len()));
        }

        Ok(Self { rungs })
    }

    pub fn rungs(&self) -> &[Rung] {
        &self.rungs
    }

    pub fn len(&self) -> usize {
        self.rungs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rungs.is_empty()
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.rungs.iter().map(|r| r.label.as_str())
    }

    pub fn severe(&self) -> &Rung {
        &self.rungs[self.rungs.len() - 2]
    }

    pub fn extreme(&self) -> &Rung {
        &self.rungs[self.rungs.len() - 1]
    }

    pub fn severe_rank(&self) -> usize {
        self.rungs.len() - 2
    }

    pub fn extreme_rank(&self) -> usize {
        self.rungs.len() - 1
    }
}

/// Reference ladder for Hong Kong tropical cyclone signals (10-minute mean, km/h).
impl Default for ThresholdLadder {
    fn default() -> Self {
        let rungs = [
            ("T1", 22.0),
            ("T3", 41.0),
            ("T7", 50.0),
            ("T8", 63.0),
            ("T10", 118.0),
        ]
        .into_iter()
        .map(|(label, threshold)| Rung {
            label: label.to_string(),
            threshold,
        })
        .collect();
        Self { rungs }
    }
}
