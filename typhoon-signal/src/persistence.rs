use crate::ladder::ThresholdLadder;
use crate::timeseries::Snapshot;
use crate::window::SignalWindows;
use serde::Serialize;

/// How many severe stations a snapshot needs.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum CoverageRule {
    MinCount(usize),
    /// Fraction of valid stations, in (0, 1].
    Fraction(f64),
}

impl CoverageRule {
    pub fn is_met(&self, count: usize, n_valid: usize) -> bool {
        match *self {
            CoverageRule::MinCount(min) => count >= min,
            CoverageRule::Fraction(fraction) => {
                n_valid > 0 && count as f64 / n_valid as f64 >= fraction
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct PersistenceConfig {
    /// Consecutive qualifying snapshots before a run counts as sustained.
    /// 1 makes every qualifying snapshot persistent.
    pub periods: usize,
    pub min_stations: usize,
    pub rule: CoverageRule,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunState {
    Idle,
    Running(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PersistenceStep {
    pub run_length: usize,
    pub is_persistent: bool,
    pub is_transient_spike: bool,
}

/// Run-length state machine over chronologically ordered snapshots.
///
/// Feed one qualification decision per snapshot, in order; the tracker is the
/// only owner of the run counter.
#[derive(Debug, Clone)]
pub struct PersistenceTracker {
    periods: usize,
    state: RunState,
}

impl PersistenceTracker {
    pub fn new(periods: usize) -> Self {
        Self {
            periods: periods.max(1),
            state: RunState::Idle,
        }
    }

    pub fn step(&mut self, qualifying: bool) -> PersistenceStep {
        self.state = match (self.state, qualifying) {
            (_, false) => RunState::Idle,
            (RunState::Idle, true) => RunState::Running(1),
            (RunState::Running(n), true) => RunState::Running(n + 1),
        };

        let run_length = match self.state {
            RunState::Idle => 0,
            RunState::Running(n) => n,
        };
        let is_persistent = qualifying && run_length >= self.periods;
        PersistenceStep {
            run_length,
            is_persistent,
            is_transient_spike: qualifying && !is_persistent,
        }
    }
}

/// Whether a snapshot counts toward a sustained severe run.
///
/// Uses the raw severe count, not the instantaneous label, so a low area mean
/// cannot hide enough individually severe stations.
pub fn qualifies(
    snapshot: &Snapshot,
    ladder: &ThresholdLadder,
    windows: &SignalWindows,
    config: &PersistenceConfig,
) -> bool {
    let n_valid = snapshot.valid_station_count;
    let in_scope = windows.severe().is_none() || snapshot.in_severe_window;
    in_scope
        && n_valid >= config.min_stations
        && config
            .rule
            .is_met(snapshot.count_at(ladder.severe_rank()), n_valid)
}

/// Fill `run_length`, `is_persistent` and `is_transient_spike` in place.
///
/// `snapshots` must be ascending by timestamp and already window-tagged.
pub fn apply_persistence(
    snapshots: &mut [Snapshot],
    ladder: &ThresholdLadder,
    windows: &SignalWindows,
    config: &PersistenceConfig,
) {
    let mut tracker = PersistenceTracker::new(config.periods);
    for snapshot in snapshots.iter_mut() {
        let step = tracker.step(qualifies(snapshot, ladder, windows, config));
        snapshot.run_length = step.run_length;
        snapshot.is_persistent = step.is_persistent;
        snapshot.is_transient_spike = step.is_transient_spike;
    }
}
