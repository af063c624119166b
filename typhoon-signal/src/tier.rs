use crate::ladder::ThresholdLadder;
use crate::timeseries::Snapshot;
use crate::window::SignalWindows;
use chrono::NaiveDateTime;
use serde::Serialize;
use std::fmt;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct PatternConfig {
    /// Stations at/above the severe rung for an interval to count as "met".
    pub severe_min_count: usize,
    /// Non-met intervals needed between two met intervals.
    pub min_lull_intervals: usize,
}

impl Default for PatternConfig {
    fn default() -> Self {
        Self {
            severe_min_count: 4,
            min_lull_intervals: 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PatternState {
    Pre,
    Armed {
        first_met: NaiveDateTime,
        lull: usize,
        lull_start: Option<NaiveDateTime>,
    },
}

/// Where the first wind / lull / wind cycle was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PatternMatch {
    pub first_met: NaiveDateTime,
    pub lull_start: NaiveDateTime,
    pub lull_intervals: usize,
    pub re_emergence: NaiveDateTime,
}

/// Scan severe-window snapshots for met, lull, met.
///
/// A met interval after a lull that is too short restarts the lull count and
/// keeps the scan armed. The scan stops at the first confirmed cycle.
pub fn detect_pattern<'a>(
    snapshots: impl IntoIterator<Item = &'a Snapshot>,
    ladder: &ThresholdLadder,
    config: &PatternConfig,
) -> Option<PatternMatch> {
    let severe_rank = ladder.severe_rank();
    let mut state = PatternState::Pre;

    for snapshot in snapshots.into_iter().filter(|s| s.in_severe_window) {
        let met = snapshot.count_at(severe_rank) >= config.severe_min_count;
        state = match (state, met) {
            (PatternState::Pre, false) => PatternState::Pre,
            (PatternState::Pre, true) => PatternState::Armed {
                first_met: snapshot.timestamp,
                lull: 0,
                lull_start: None,
            },
            (
                PatternState::Armed {
                    first_met,
                    lull,
                    lull_start,
                },
                false,
            ) => PatternState::Armed {
                first_met,
                lull: lull + 1,
                lull_start: lull_start.or(Some(snapshot.timestamp)),
            },
            (
                PatternState::Armed {
                    first_met,
                    lull,
                    lull_start: Some(lull_start),
                },
                true,
            ) if lull >= config.min_lull_intervals => {
                debug!(
                    "Wind re-emerged at {} after {} lull intervals from {}",
                    snapshot.timestamp, lull, lull_start
                );
                return Some(PatternMatch {
                    first_met,
                    lull_start,
                    lull_intervals: lull,
                    re_emergence: snapshot.timestamp,
                });
            }
            (PatternState::Armed { first_met, .. }, true) => PatternState::Armed {
                first_met,
                lull: 0,
                lull_start: None,
            },
        };
    }
    None
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Verified,
    PatternValidated,
    Unverified,
    NoSignal,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Verified => "verified",
            Tier::PatternValidated => "pattern_validated",
            Tier::Unverified => "unverified",
            Tier::NoSignal => "no_signal",
        }
    }

    /// Human-readable verdict. `start_delta_min` is only used for `Verified`.
    pub fn verdict(&self, start_delta_min: Option<i64>) -> String {
        match self {
            Tier::Verified => match start_delta_min {
                Some(delta) if delta > 0 => format!(
                    "Verified: sustained T8-level winds detected after issuance (+{} min advance).",
                    delta
                ),
                _ => "Verified: sustained T8-level winds met 30-min requirement.".to_string(),
            },
            Tier::PatternValidated => concat!(
                "Pattern-validated: wind met >=4 stations, dipped (<4 for >=2 intervals), ",
                "then met again - structured wind re-emergence."
            )
            .to_string(),
            Tier::Unverified => concat!(
                "Unverified by observation: no sustained (>=30 min) nor wind-lull-wind ",
                "pattern detected during official Signal 8 period."
            )
            .to_string(),
            Tier::NoSignal => "No Signal 8 issued".to_string(),
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Facts the tier rules look at.
#[derive(Debug, Clone, Copy)]
pub struct TierEvidence {
    pub has_severe_window: bool,
    pub persistent_in_window: bool,
    pub pattern_fired: bool,
}

type TierRule = (Tier, fn(&TierEvidence) -> bool);

/// Ordered rules, first match wins.
const TIER_RULES: [TierRule; 4] = [
    (Tier::NoSignal, |e| !e.has_severe_window),
    (Tier::Verified, |e| e.persistent_in_window),
    (Tier::PatternValidated, |e| e.pattern_fired),
    (Tier::Unverified, |_| true),
];

pub fn resolve_tier(evidence: &TierEvidence) -> Tier {
    TIER_RULES
        .iter()
        .find(|(_, rule)| rule(evidence))
        .map(|(tier, _)| *tier)
        .unwrap_or(Tier::Unverified)
}

/// Result of the pattern stage plus the resolved tier.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TierOutcome {
    pub tier: Tier,
    pub pattern: Option<PatternMatch>,
}

/// Resolve the event tier from window-tagged, persistence-annotated snapshots.
///
/// Snapshots reporting more than `max_reference_stations` are left out of both
/// the persistence check and the pattern scan, matching the detection summary.
/// The pattern scan only runs when a severe window exists and nothing in it
/// was persistent.
pub fn classify_tier(
    snapshots: &[Snapshot],
    ladder: &ThresholdLadder,
    windows: &SignalWindows,
    config: &PatternConfig,
    max_reference_stations: Option<usize>,
) -> TierOutcome {
    let reference = || {
        snapshots
            .iter()
            .filter(move |s| s.within_reference(max_reference_stations))
    };
    let has_severe_window = windows.severe().is_some();
    let persistent_in_window = reference().any(|s| s.in_severe_window && s.is_persistent);

    let pattern = if has_severe_window && !persistent_in_window {
        detect_pattern(reference(), ladder, config)
    } else {
        None
    };

    let tier = resolve_tier(&TierEvidence {
        has_severe_window,
        persistent_in_window,
        pattern_fired: pattern.is_some(),
    });
    TierOutcome { tier, pattern }
}
