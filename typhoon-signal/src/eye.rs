//! Calm-segment and eye-passage detection inside the extreme signal window.
//!
//! A lull in the middle of an extreme period is only read as an eye passage
//! when extreme winds are seen on both sides of it. Everything here looks at
//! the snapshots tagged `in_extreme_window` and nothing else.

use crate::ladder::ThresholdLadder;
use crate::timeseries::{Snapshot, TransparencyFlags};
use crate::window::SignalWindows;
use chrono::NaiveDateTime;
use serde::Serialize;
use tracing::{debug, info};

#[derive(Debug, Clone)]
pub struct EyeConfig {
    /// Area mean (km/h) below which a snapshot can be calm.
    pub calm_threshold: f64,
    pub min_calm_intervals: usize,
    /// Snapshots inspected on each side of a calm segment.
    pub prepost_window: usize,
    /// Extreme-coverage intervals required on each side to confirm.
    pub min_extreme_intervals: usize,
    /// Stations at/above the severe rung for severe coverage.
    pub severe_min_count: usize,
    /// Stations at/above the extreme rung for extreme coverage.
    pub extreme_min_count: usize,
}

impl Default for EyeConfig {
    fn default() -> Self {
        Self {
            calm_threshold: 41.0,
            min_calm_intervals: 2,
            prepost_window: 3,
            min_extreme_intervals: 1,
            severe_min_count: 4,
            extreme_min_count: 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CalmSegment {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    pub length: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EyeTag {
    EyePassageConfirmed,
    CalmWithoutExtremeCoverage,
}

impl EyeTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            EyeTag::EyePassageConfirmed => "eye_passage_confirmed",
            EyeTag::CalmWithoutExtremeCoverage => "calm_without_extreme_coverage",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EyePassageVerdict {
    pub segment_start: NaiveDateTime,
    pub segment_end: NaiveDateTime,
    pub n_calm_intervals: usize,
    /// Snapshots actually available before the segment (may be < configured).
    pub pre_window: usize,
    pub post_window: usize,
    pub pre_severe_intervals: usize,
    pub pre_extreme_intervals: usize,
    pub post_severe_intervals: usize,
    pub post_extreme_intervals: usize,
    pub confirmed: bool,
    pub tag: EyeTag,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EyeAnalysis {
    pub segments: Vec<CalmSegment>,
    pub verdicts: Vec<EyePassageVerdict>,
}

impl EyeAnalysis {
    pub fn any_confirmed(&self) -> bool {
        self.verdicts.iter().any(|v| v.confirmed)
    }
}

fn flags_for(
    snapshot: &Snapshot,
    ladder: &ThresholdLadder,
    config: &EyeConfig,
) -> TransparencyFlags {
    let severe = snapshot.count_at(ladder.severe_rank());
    let extreme = snapshot.count_at(ladder.extreme_rank());
    let meets_severe_coverage = severe >= config.severe_min_count;
    TransparencyFlags {
        meets_severe_coverage,
        meets_extreme_coverage: extreme >= config.extreme_min_count,
        // NaN compares false, so a snapshot without valid readings is never calm
        low_wind: snapshot.area_mean < config.calm_threshold && !meets_severe_coverage,
    }
}

/// Write transparency flags on every snapshot inside the extreme window.
pub fn mark_transparency(snapshots: &mut [Snapshot], ladder: &ThresholdLadder, config: &EyeConfig) {
    for snapshot in snapshots.iter_mut().filter(|s| s.in_extreme_window) {
        snapshot.transparency = Some(flags_for(snapshot, ladder, config));
    }
}

/// Maximal runs of `true`, as (first index, length).
pub(crate) fn runs(flags: &[bool]) -> Vec<(usize, usize)> {
    let (mut found, open) = flags.iter().enumerate().fold(
        (Vec::new(), None::<usize>),
        |(mut found, open), (i, &flag)| match (open, flag) {
            (None, true) => (found, Some(i)),
            (Some(start), false) => {
                found.push((start, i - start));
                (found, None)
            }
            (open, _) => (found, open),
        },
    );
    if let Some(start) = open {
        found.push((start, flags.len() - start));
    }
    found
}

/// Find calm segments in the extreme window and judge each as an eye passage.
///
/// Returns an empty analysis when no extreme window is annotated.
pub fn detect_eye_passages(
    snapshots: &[Snapshot],
    ladder: &ThresholdLadder,
    windows: &SignalWindows,
    config: &EyeConfig,
) -> EyeAnalysis {
    if windows.extreme().is_none() {
        return EyeAnalysis::default();
    }

    let inside: Vec<&Snapshot> = snapshots.iter().filter(|s| s.in_extreme_window).collect();
    let flags: Vec<TransparencyFlags> = inside
        .iter()
        .map(|s| flags_for(s, ladder, config))
        .collect();
    let low: Vec<bool> = flags.iter().map(|f| f.low_wind).collect();

    let mut analysis = EyeAnalysis::default();
    for (first, length) in runs(&low) {
        if length < config.min_calm_intervals {
            debug!("Discarding calm run of {} at {}", length, inside[first].timestamp);
            continue;
        }
        let last = first + length - 1;

        let pre = &flags[first.saturating_sub(config.prepost_window)..first];
        let post_end = (last + 1 + config.prepost_window).min(flags.len());
        let post = &flags[last + 1..post_end];

        let pre_extreme = pre.iter().filter(|f| f.meets_extreme_coverage).count();
        let post_extreme = post.iter().filter(|f| f.meets_extreme_coverage).count();
        let confirmed = pre_extreme >= config.min_extreme_intervals
            && post_extreme >= config.min_extreme_intervals;

        let segment = CalmSegment {
            start: inside[first].timestamp,
            end: inside[last].timestamp,
            length,
        };
        analysis.verdicts.push(EyePassageVerdict {
            segment_start: segment.start,
            segment_end: segment.end,
            n_calm_intervals: length,
            pre_window: pre.len(),
            post_window: post.len(),
            pre_severe_intervals: pre.iter().filter(|f| f.meets_severe_coverage).count(),
            pre_extreme_intervals: pre_extreme,
            post_severe_intervals: post.iter().filter(|f| f.meets_severe_coverage).count(),
            post_extreme_intervals: post_extreme,
            confirmed,
            tag: if confirmed {
                EyeTag::EyePassageConfirmed
            } else {
                EyeTag::CalmWithoutExtremeCoverage
            },
        });
        analysis.segments.push(segment);
    }

    info!(
        "Extreme window: {} snapshots, {} calm segments, {} confirmed eye passages",
        inside.len(),
        analysis.segments.len(),
        analysis.verdicts.iter().filter(|v| v.confirmed).count()
    );
    analysis
}
