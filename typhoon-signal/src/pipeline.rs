use crate::eye::{detect_eye_passages, mark_transparency, runs, EyeAnalysis};
use crate::persistence::apply_persistence;
use crate::settings::EngineConfig;
use crate::tier::{classify_tier, PatternMatch, Tier};
use crate::timeseries::{
    summarize_by_station, summarize_over_time, Observation, Snapshot, StationSummary,
};
use crate::window::SignalWindows;
use chrono::NaiveDateTime;
use serde::Serialize;
use tracing::{debug, info};

/// Sustained severe-wind detection over the persistent snapshots.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetectionSummary {
    pub detected: bool,
    pub start: Option<NaiveDateTime>,
    pub end: Option<NaiveDateTime>,
    /// Persistent snapshot count times the observation interval.
    pub duration_min: i64,
    pub peak_stations: Option<usize>,
    pub mean_wind_peak: Option<f64>,
    /// Minutes from the official severe start to the first persistent snapshot.
    pub start_delta_min: Option<i64>,
    /// Detected duration as a share of the official severe duration, one decimal.
    pub coverage_percent: Option<f64>,
}

/// Runs of snapshots meeting the severe station count, over the whole event.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GaleRuns {
    pub run_lengths: Vec<usize>,
    pub total_intervals: usize,
    pub total_hours: f64,
    pub longest_intervals: usize,
    pub longest_hours: f64,
}

/// Counts over the snapshots inside the extreme window.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransparencySummary {
    pub intervals: usize,
    pub severe_coverage_intervals: usize,
    pub extreme_coverage_intervals: usize,
    pub low_wind_intervals: usize,
    pub first_interval: NaiveDateTime,
    pub last_interval: NaiveDateTime,
}

#[derive(Debug, Clone, Serialize)]
pub struct EventReport {
    pub method: &'static str,
    pub windows: SignalWindows,
    pub official_duration_min: Option<i64>,
    pub tier: Tier,
    pub verdict: String,
    pub pattern: Option<PatternMatch>,
    pub detection: DetectionSummary,
    pub gale_runs: GaleRuns,
    pub transparency: Option<TransparencySummary>,
    pub eye: EyeAnalysis,
    pub stations: Vec<StationSummary>,
    pub snapshots: Vec<Snapshot>,
}

impl EventReport {
    pub fn latest(&self) -> Option<&Snapshot> {
        self.snapshots.last()
    }

    /// Highest instantaneous label, earliest first on ties.
    pub fn peak(&self) -> Option<&Snapshot> {
        self.snapshots.iter().fold(None, |best: Option<&Snapshot>, s| match best {
            Some(b) if b.label.severity() >= s.label.severity() => Some(b),
            _ => Some(s),
        })
    }
}

/// Copy window membership onto each snapshot. Nothing else is touched.
pub fn tag_windows(snapshots: &mut [Snapshot], windows: &SignalWindows) {
    for snapshot in snapshots.iter_mut() {
        let (severe, extreme) = windows.tag(snapshot.timestamp);
        snapshot.in_severe_window = severe;
        snapshot.in_extreme_window = extreme;
    }
}

pub fn detection_summary(
    snapshots: &[Snapshot],
    severe_rank: usize,
    windows: &SignalWindows,
    interval_minutes: u32,
    max_reference_stations: Option<usize>,
) -> DetectionSummary {
    let persistent: Vec<&Snapshot> = snapshots
        .iter()
        .filter(|s| s.is_persistent && s.within_reference(max_reference_stations))
        .collect();

    let start = persistent.first().map(|s| s.timestamp);
    let duration_min = persistent.len() as i64 * i64::from(interval_minutes);

    let (start_delta_min, coverage_percent) = match (windows.severe(), start) {
        (Some(official), Some(start)) => {
            let official_min = official.duration_minutes();
            let coverage = (official_min > 0)
                .then(|| (duration_min as f64 / official_min as f64 * 1000.0).round() / 10.0);
            (Some((start - official.start).num_minutes()), coverage)
        }
        _ => (None, None),
    };

    DetectionSummary {
        detected: !persistent.is_empty(),
        start,
        end: persistent.last().map(|s| s.timestamp),
        duration_min,
        peak_stations: persistent.iter().map(|s| s.count_at(severe_rank)).max(),
        mean_wind_peak: persistent
            .iter()
            .map(|s| s.area_mean)
            .filter(|m| !m.is_nan())
            .reduce(f64::max),
        start_delta_min,
        coverage_percent,
    }
}

pub fn gale_runs(
    snapshots: &[Snapshot],
    severe_rank: usize,
    min_count: usize,
    interval_minutes: u32,
) -> GaleRuns {
    let flags: Vec<bool> = snapshots
        .iter()
        .map(|s| s.count_at(severe_rank) >= min_count)
        .collect();
    let run_lengths: Vec<usize> = runs(&flags).into_iter().map(|(_, len)| len).collect();
    let total_intervals: usize = run_lengths.iter().sum();
    let longest_intervals = run_lengths.iter().copied().max().unwrap_or(0);
    let hours = |intervals: usize| intervals as f64 * f64::from(interval_minutes) / 60.0;

    GaleRuns {
        total_hours: hours(total_intervals),
        longest_hours: hours(longest_intervals),
        run_lengths,
        total_intervals,
        longest_intervals,
    }
}

pub fn transparency_summary(snapshots: &[Snapshot]) -> Option<TransparencySummary> {
    let flagged: Vec<(NaiveDateTime, _)> = snapshots
        .iter()
        .filter_map(|s| s.transparency.map(|t| (s.timestamp, t)))
        .collect();
    let (first, _) = flagged.first()?;
    let (last, _) = flagged.last()?;
    Some(TransparencySummary {
        intervals: flagged.len(),
        severe_coverage_intervals: flagged.iter().filter(|(_, t)| t.meets_severe_coverage).count(),
        extreme_coverage_intervals: flagged
            .iter()
            .filter(|(_, t)| t.meets_extreme_coverage)
            .count(),
        low_wind_intervals: flagged.iter().filter(|(_, t)| t.low_wind).count(),
        first_interval: *first,
        last_interval: *last,
    })
}

/// Runs every analysis stage for one event.
pub struct EventAnalyzer {
    config: EngineConfig,
}

impl EventAnalyzer {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn analyze(&self, observations: &[Observation], windows: &SignalWindows) -> EventReport {
        let config = &self.config;
        let ladder = &config.ladder;
        let severe_rank = ladder.severe_rank();

        let mut snapshots = summarize_over_time(observations, ladder, &config.aggregator);
        info!(
            "Aggregated {} observations into {} snapshots using {}",
            observations.len(),
            snapshots.len(),
            config.aggregator.method.name()
        );

        tag_windows(&mut snapshots, windows);
        apply_persistence(&mut snapshots, ladder, windows, &config.persistence);
        let persistent = snapshots.iter().filter(|s| s.is_persistent).count();
        let transient = snapshots.iter().filter(|s| s.is_transient_spike).count();
        info!("Persistence: {} persistent, {} transient snapshots", persistent, transient);

        let eye = if windows.extreme().is_some() {
            mark_transparency(&mut snapshots, ladder, &config.eye);
            detect_eye_passages(&snapshots, ladder, windows, &config.eye)
        } else {
            EyeAnalysis::default()
        };

        let outcome = classify_tier(
            &snapshots,
            ladder,
            windows,
            &config.pattern,
            config.max_reference_stations,
        );
        let detection = detection_summary(
            &snapshots,
            severe_rank,
            windows,
            config.interval_minutes,
            config.max_reference_stations,
        );
        let verdict = outcome.tier.verdict(detection.start_delta_min);
        info!("Tier: {} ({})", outcome.tier, verdict);

        let gale_runs = gale_runs(
            &snapshots,
            severe_rank,
            config.pattern.severe_min_count,
            config.interval_minutes,
        );
        debug!("Gale runs: {:?}", gale_runs.run_lengths);

        EventReport {
            method: config.aggregator.method.name(),
            windows: *windows,
            official_duration_min: windows.severe().map(|w| w.duration_minutes()),
            tier: outcome.tier,
            verdict,
            pattern: outcome.pattern,
            detection,
            gale_runs,
            transparency: transparency_summary(&snapshots),
            eye,
            stations: summarize_by_station(observations),
            snapshots,
        }
    }
}
