use crate::classify::{
    classify_snapshot, count_at_or_above, mean, median, percentile, AggregationMethod, SignalLabel,
};
use crate::ladder::ThresholdLadder;
use chrono::NaiveDateTime;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::debug;

/// One station's 10-minute reading.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub timestamp: NaiveDateTime,
    pub station: String,
    pub direction: Option<String>,
    pub mean_speed: Option<f64>,
    pub gust_speed: Option<f64>,
}

impl Observation {
    pub fn new(timestamp: NaiveDateTime, station: &str, mean_speed: Option<f64>) -> Self {
        Self {
            timestamp,
            station: station.to_string(),
            direction: None,
            mean_speed,
            gust_speed: None,
        }
    }

    /// Mean speed if present, finite and non-negative.
    pub fn valid_mean(&self) -> Option<f64> {
        self.mean_speed.filter(|s| s.is_finite() && *s >= 0.0)
    }

    pub fn valid_gust(&self) -> Option<f64> {
        self.gust_speed.filter(|s| s.is_finite() && *s >= 0.0)
    }
}

#[derive(Debug, Clone)]
pub struct AggregatorConfig {
    pub method: AggregationMethod,
    /// Fewer valid stations than this leaves the snapshot indeterminate.
    pub min_stations: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ThresholdStat {
    pub label: String,
    pub count: usize,
    /// count / valid stations, NaN when no station is valid.
    pub coverage: f64,
}

/// Per-snapshot flags written by the eye-passage detector inside the extreme window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TransparencyFlags {
    pub meets_severe_coverage: bool,
    pub meets_extreme_coverage: bool,
    pub low_wind: bool,
}

/// Aggregated multi-station reading for one timestamp.
///
/// The aggregator fills the statistics; window tags, persistence fields and
/// transparency flags are filled by later stages and default to "unset".
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Snapshot {
    pub timestamp: NaiveDateTime,
    pub valid_station_count: usize,
    pub area_mean: f64,
    pub area_median: f64,
    pub area_p90: f64,
    /// One entry per ladder rung, ascending.
    pub thresholds: Vec<ThresholdStat>,
    pub label: SignalLabel,
    pub in_severe_window: bool,
    pub in_extreme_window: bool,
    pub run_length: usize,
    pub is_persistent: bool,
    pub is_transient_spike: bool,
    pub transparency: Option<TransparencyFlags>,
}

impl Snapshot {
    /// Stations at or above the rung at `rank`.
    pub fn count_at(&self, rank: usize) -> usize {
        self.thresholds.get(rank).map(|t| t.count).unwrap_or(0)
    }

    /// False when the snapshot reports more stations than the reference network.
    pub fn within_reference(&self, max_stations: Option<usize>) -> bool {
        max_stations.is_none_or(|max| self.valid_station_count <= max)
    }
}

/// Build one snapshot from the valid speeds observed at `timestamp`.
pub fn build_snapshot(
    timestamp: NaiveDateTime,
    speeds: &[f64],
    ladder: &ThresholdLadder,
    config: &AggregatorConfig,
) -> Snapshot {
    let n_valid = speeds.len();

    let label = if n_valid < config.min_stations || n_valid == 0 {
        SignalLabel::Indeterminate
    } else {
        classify_snapshot(speeds, ladder, &config.method)
    };

    let thresholds = ladder
        .rungs()
        .iter()
        .map(|rung| {
            let count = count_at_or_above(speeds, rung.threshold);
            let coverage = if n_valid > 0 {
                count as f64 / n_valid as f64
            } else {
                f64::NAN
            };
            ThresholdStat {
                label: rung.label.clone(),
                count,
                coverage,
            }
        })
        .collect();

    Snapshot {
        timestamp,
        valid_station_count: n_valid,
        area_mean: mean(speeds),
        area_median: median(speeds),
        area_p90: percentile(speeds, 0.9),
        thresholds,
        label,
        in_severe_window: false,
        in_extreme_window: false,
        run_length: 0,
        is_persistent: false,
        is_transient_spike: false,
        transparency: None,
    }
}

/// Group observations by timestamp and classify each group.
///
/// Input order does not matter; output is ascending by timestamp with one row
/// per distinct timestamp, including timestamps where no reading is valid.
pub fn summarize_over_time(
    observations: &[Observation],
    ladder: &ThresholdLadder,
    config: &AggregatorConfig,
) -> Vec<Snapshot> {
    let mut groups: BTreeMap<NaiveDateTime, Vec<f64>> = BTreeMap::new();
    for obs in observations {
        let speeds = groups.entry(obs.timestamp).or_default();
        if let Some(speed) = obs.valid_mean() {
            speeds.push(speed);
        }
    }

    let snapshots: Vec<Snapshot> = groups
        .into_iter()
        .map(|(ts, speeds)| build_snapshot(ts, &speeds, ladder, config))
        .collect();

    debug!(
        "Aggregated {} observations into {} snapshots (method={})",
        observations.len(),
        snapshots.len(),
        config.method.name()
    );
    snapshots
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StationSummary {
    pub station: String,
    pub n_observations: usize,
    pub mean: f64,
    pub p90: f64,
    pub max: f64,
    pub max_gust: f64,
}

/// Per-station statistics over the whole event, strongest mean first.
pub fn summarize_by_station(observations: &[Observation]) -> Vec<StationSummary> {
    let mut by_station: BTreeMap<&str, (Vec<f64>, Vec<f64>)> = BTreeMap::new();
    for obs in observations {
        let (means, gusts) = by_station.entry(obs.station.as_str()).or_default();
        if let Some(m) = obs.valid_mean() {
            means.push(m);
        }
        if let Some(g) = obs.valid_gust() {
            gusts.push(g);
        }
    }

    let mut rows: Vec<StationSummary> = by_station
        .into_iter()
        .map(|(station, (means, gusts))| StationSummary {
            station: station.to_string(),
            n_observations: means.len(),
            mean: mean(&means),
            p90: percentile(&means, 0.9),
            max: max_or_nan(&means),
            max_gust: max_or_nan(&gusts),
        })
        .collect();

    // NaN means sort last; BTreeMap order breaks ties by name.
    rows.sort_by(|a, b| match (a.mean.is_nan(), b.mean.is_nan()) {
        (false, false) => b.mean.total_cmp(&a.mean),
        (x, y) => x.cmp(&y),
    });
    rows
}

fn max_or_nan(values: &[f64]) -> f64 {
    values.iter().copied().fold(f64::NAN, f64::max)
}
