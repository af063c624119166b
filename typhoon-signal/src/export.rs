use crate::eye::EyeAnalysis;
use crate::ladder::ThresholdLadder;
use crate::pipeline::EventReport;
use crate::timeseries::{Snapshot, StationSummary};
use chrono::NaiveDateTime;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub const TIME_SUMMARY: &str = "time_summary.csv";
pub const STATION_SUMMARY: &str = "station_summary.csv";
pub const CALM_SEGMENTS: &str = "calm_segments.csv";
pub const EYE_PASSAGE: &str = "eye_passage_analysis.csv";
pub const EVENT_JSON: &str = "event.json";

const TS_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

fn ts(t: NaiveDateTime) -> String {
    t.format(TS_FORMAT).to_string()
}

/// NaN is written as an empty cell.
fn num(v: f64) -> String {
    if v.is_nan() { String::new() } else { format!("{}", v) }
}

fn time_summary_header(ladder: &ThresholdLadder, with_transparency: bool) -> Vec<String> {
    let mut header: Vec<String> = [
        "datetime",
        "n_stations",
        "area_mean_kmh",
        "area_median_kmh",
        "area_p90_kmh",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();
    header.extend(ladder.labels().map(|l| format!("count_ge_{}", l)));
    header.extend(ladder.labels().map(|l| format!("pct_ge_{}", l)));
    header.extend(
        [
            "signal",
            "in_severe_window",
            "in_extreme_window",
            "run_length",
            "is_persistent",
            "is_transient_spike",
        ]
        .iter()
        .map(|s| s.to_string()),
    );
    if with_transparency {
        let severe = ladder.severe().label.to_lowercase();
        let extreme = ladder.extreme().label.to_lowercase();
        header.push(format!("{}_meets_{}_coverage", extreme, severe));
        header.push(format!("{}_meets_{}_coverage", extreme, extreme));
        header.push(format!("{}_low_wind_flag", extreme));
    }
    header
}

fn time_summary_row(s: &Snapshot, with_transparency: bool) -> Vec<String> {
    let mut row = vec![
        ts(s.timestamp),
        s.valid_station_count.to_string(),
        num(s.area_mean),
        num(s.area_median),
        num(s.area_p90),
    ];
    row.extend(s.thresholds.iter().map(|t| t.count.to_string()));
    row.extend(s.thresholds.iter().map(|t| num(t.coverage)));
    row.extend([
        s.label.to_string(),
        s.in_severe_window.to_string(),
        s.in_extreme_window.to_string(),
        s.run_length.to_string(),
        s.is_persistent.to_string(),
        s.is_transient_spike.to_string(),
    ]);
    if with_transparency {
        match s.transparency {
            Some(t) => row.extend([
                t.meets_severe_coverage.to_string(),
                t.meets_extreme_coverage.to_string(),
                t.low_wind.to_string(),
            ]),
            None => row.extend([String::new(), String::new(), String::new()]),
        }
    }
    row
}

/// Per-timestamp table. Transparency columns are present only when an
/// extreme window was annotated.
pub fn write_time_summary<W: Write>(
    writer: W,
    snapshots: &[Snapshot],
    ladder: &ThresholdLadder,
    with_transparency: bool,
) -> Result<(), ExportError> {
    let mut wtr = csv::Writer::from_writer(writer);
    wtr.write_record(time_summary_header(ladder, with_transparency))?;
    for s in snapshots {
        wtr.write_record(time_summary_row(s, with_transparency))?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn write_station_summary<W: Write>(
    writer: W,
    stations: &[StationSummary],
) -> Result<(), ExportError> {
    let mut wtr = csv::Writer::from_writer(writer);
    wtr.write_record(["station", "n_obs", "mean_kmh", "p90_kmh", "max_kmh", "max_gust_kmh"])?;
    for st in stations {
        wtr.write_record([
            st.station.clone(),
            st.n_observations.to_string(),
            num(st.mean),
            num(st.p90),
            num(st.max),
            num(st.max_gust),
        ])?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn write_calm_segments<W: Write>(writer: W, eye: &EyeAnalysis) -> Result<(), ExportError> {
    let mut wtr = csv::Writer::from_writer(writer);
    wtr.write_record(["segment_start", "segment_end", "n_calm_intervals"])?;
    for seg in &eye.segments {
        wtr.write_record([ts(seg.start), ts(seg.end), seg.length.to_string()])?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn write_eye_verdicts<W: Write>(writer: W, eye: &EyeAnalysis) -> Result<(), ExportError> {
    let mut wtr = csv::Writer::from_writer(writer);
    wtr.write_record([
        "segment_start",
        "segment_end",
        "n_calm_intervals",
        "pre_window",
        "post_window",
        "pre_severe_intervals",
        "pre_extreme_intervals",
        "post_severe_intervals",
        "post_extreme_intervals",
        "qualifies_eye_passage",
        "tag",
    ])?;
    for v in &eye.verdicts {
        wtr.write_record([
            ts(v.segment_start),
            ts(v.segment_end),
            v.n_calm_intervals.to_string(),
            v.pre_window.to_string(),
            v.post_window.to_string(),
            v.pre_severe_intervals.to_string(),
            v.pre_extreme_intervals.to_string(),
            v.post_severe_intervals.to_string(),
            v.post_extreme_intervals.to_string(),
            v.confirmed.to_string(),
            v.tag.as_str().to_string(),
        ])?;
    }
    wtr.flush()?;
    Ok(())
}

fn create(dir: &Path, name: &str) -> Result<(std::fs::File, PathBuf), ExportError> {
    let path = dir.join(name);
    Ok((std::fs::File::create(&path)?, path))
}

/// Write every table of `report` into `dir`, creating it if needed.
/// Returns the paths written.
pub fn write_report(
    dir: &Path,
    report: &EventReport,
    ladder: &ThresholdLadder,
) -> Result<Vec<PathBuf>, ExportError> {
    std::fs::create_dir_all(dir)?;
    let with_extreme = report.windows.extreme().is_some();
    let mut written = Vec::new();

    let (file, path) = create(dir, TIME_SUMMARY)?;
    write_time_summary(file, &report.snapshots, ladder, with_extreme)?;
    written.push(path);

    let (file, path) = create(dir, STATION_SUMMARY)?;
    write_station_summary(file, &report.stations)?;
    written.push(path);

    if with_extreme {
        let (file, path) = create(dir, CALM_SEGMENTS)?;
        write_calm_segments(file, &report.eye)?;
        written.push(path);

        let (file, path) = create(dir, EYE_PASSAGE)?;
        write_eye_verdicts(file, &report.eye)?;
        written.push(path);
    }

    let (file, path) = create(dir, EVENT_JSON)?;
    serde_json::to_writer_pretty(file, report)?;
    written.push(path);

    info!("Wrote {} files to {:?}", written.len(), dir);
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::SignalLabel;
    use crate::settings::EngineConfig;
    use crate::timeseries::build_snapshot;
    use chrono::NaiveDate;

    #[test]
    fn test_time_summary_columns_follow_ladder() {
        let ladder = ThresholdLadder::default();
        let header = time_summary_header(&ladder, true);
        assert!(header.contains(&"count_ge_T8".to_string()));
        assert!(header.contains(&"pct_ge_T10".to_string()));
        assert!(header.contains(&"t10_meets_t8_coverage".to_string()));
        assert!(header.contains(&"t10_low_wind_flag".to_string()));
        let without = time_summary_header(&ladder, false);
        assert!(!without.contains(&"t10_low_wind_flag".to_string()));
    }

    #[test]
    fn test_nan_cells_are_empty() {
        let ladder = ThresholdLadder::default();
        let ts = NaiveDate::from_ymd_opt(2025, 7, 20)
            .unwrap()
            .and_hms_opt(6, 0, 0)
            .unwrap();
        let snap = build_snapshot(ts, &[], &ladder, &EngineConfig::default().aggregator);
        assert_eq!(snap.label, SignalLabel::Indeterminate);

        let mut out = Vec::new();
        write_time_summary(&mut out, &[snap], &ladder, false).unwrap();
        let text = String::from_utf8(out).unwrap();
        let row = text.lines().nth(1).unwrap();
        assert!(row.starts_with("2025-07-20 06:00:00,0,,,,0,"));
        assert!(row.contains("Indeterminate"));
    }
}
