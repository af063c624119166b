use chrono::{Duration, NaiveDate, NaiveDateTime};
use std::fs;
use std::path::Path;
use tempfile::tempdir;
use typhoon_signal::export::{
    write_report, CALM_SEGMENTS, EVENT_JSON, EYE_PASSAGE, STATION_SUMMARY, TIME_SUMMARY,
};
use typhoon_signal::parser::load_folder;
use typhoon_signal::parser::stations::StationSelection;
use typhoon_signal::pipeline::EventAnalyzer;
use typhoon_signal::settings::{EngineConfig, Settings};
use typhoon_signal::tier::Tier;
use typhoon_signal::window::{SignalTimes, SignalWindows};

const HEADER: &str = "Date time,Automatic Weather Station,10-Minute Mean Wind Direction(Compass points),10-Minute Mean Speed(km/hour),10-Minute Maximum Gust(km/hour)";

fn start() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2023, 9, 1)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap()
}

/// Ten stations per interval, 00:00 to 03:00.
///
/// 00:00-00:50 gale, 01:00-01:10 hurricane, 01:20-01:40 calm eye,
/// 01:50-02:00 hurricane again, then everything dies down.
fn speeds_at(i: usize) -> Vec<f64> {
    let gale = [70.0, 70.0, 70.0, 70.0, 70.0, 70.0, 30.0, 30.0, 30.0, 30.0];
    let hurricane = [125.0, 125.0, 125.0, 70.0, 70.0, 70.0, 30.0, 30.0, 30.0, 30.0];
    let calm = [20.0; 10];
    match i {
        0..=5 => gale.to_vec(),
        6 | 7 | 11 | 12 => hurricane.to_vec(),
        _ => calm.to_vec(),
    }
}

fn write_event(dir: &Path) {
    for i in 0..19 {
        let ts = start() + Duration::minutes(10 * i as i64);
        let stamp = ts.format("%Y%m%d%H%M").to_string();
        let mut text = String::from(HEADER);
        text.push('\n');
        for (n, speed) in speeds_at(i).iter().enumerate() {
            text.push_str(&format!("{},Station {:02},East,{},{}\n", stamp, n, speed, speed * 1.4));
        }
        fs::write(dir.join(format!("{}-latest_10min_wind.csv", stamp)), text).unwrap();
    }
}

fn windows() -> SignalWindows {
    let times: SignalTimes = serde_json::from_str(
        r#"{"signal8_start": "2023-09-01 00:00", "signal8_end": "2023-09-01 03:00",
            "signal10_start": "2023-09-01 01:00", "signal10_end": "2023-09-01 02:00"}"#,
    )
    .unwrap();
    times.into_windows().unwrap()
}

// ============================================================================
// Full event: load, analyze, export
// ============================================================================

#[test]
fn test_event_with_eye_passage() {
    let input = tempdir().unwrap();
    write_event(input.path());

    let observations = load_folder(input.path(), &StationSelection::default()).unwrap();
    assert_eq!(observations.len(), 190);

    let analyzer = EventAnalyzer::new(EngineConfig::default());
    let report = analyzer.analyze(&observations, &windows());

    assert_eq!(report.snapshots.len(), 19);
    assert_eq!(report.tier, Tier::Verified);
    assert_eq!(report.detection.start, Some(start() + Duration::minutes(20)));
    assert_eq!(report.detection.start_delta_min, Some(20));
    assert_eq!(report.detection.duration_min, 60);
    assert_eq!(report.detection.coverage_percent, Some(33.3));
    assert!(report.verdict.contains("+20 min advance"));
    assert_eq!(report.gale_runs.run_lengths, vec![8, 2]);

    // the second gale run is too short to persist
    assert!(report.snapshots[11].is_transient_spike);
    assert!(report.snapshots[12].is_transient_spike);

    assert_eq!(report.eye.segments.len(), 1);
    let verdict = &report.eye.verdicts[0];
    assert_eq!(verdict.segment_start, start() + Duration::minutes(80));
    assert_eq!(verdict.n_calm_intervals, 3);
    assert_eq!((verdict.pre_window, verdict.post_window), (2, 2));
    assert_eq!((verdict.pre_extreme_intervals, verdict.post_extreme_intervals), (2, 2));
    assert!(verdict.confirmed);

    let transparency = report.transparency.as_ref().unwrap();
    assert_eq!(transparency.intervals, 7);
    assert_eq!(transparency.extreme_coverage_intervals, 4);
    assert_eq!(transparency.low_wind_intervals, 3);

    let out = tempdir().unwrap();
    let written = write_report(out.path(), &report, &analyzer.config().ladder).unwrap();
    assert_eq!(written.len(), 5);

    let mut rdr = csv::Reader::from_path(out.path().join(TIME_SUMMARY)).unwrap();
    let headers = rdr.headers().unwrap().clone();
    let persistent_col = headers.iter().position(|h| h == "is_persistent").unwrap();
    let low_wind_col = headers.iter().position(|h| h == "t10_low_wind_flag").unwrap();
    let rows: Vec<csv::StringRecord> = rdr.records().map(|r| r.unwrap()).collect();
    assert_eq!(rows.len(), 19);
    assert_eq!(&rows[2][persistent_col], "true");
    assert_eq!(&rows[8][low_wind_col], "true");
    assert_eq!(&rows[0][low_wind_col], "");

    let mut rdr = csv::Reader::from_path(out.path().join(EYE_PASSAGE)).unwrap();
    let eye_rows: Vec<csv::StringRecord> = rdr.records().map(|r| r.unwrap()).collect();
    assert_eq!(eye_rows.len(), 1);
    assert_eq!(&eye_rows[0][0], "2023-09-01 01:20:00");

    assert!(out.path().join(CALM_SEGMENTS).exists());

    let mut rdr = csv::Reader::from_path(out.path().join(STATION_SUMMARY)).unwrap();
    assert_eq!(rdr.records().count(), 10);

    let json: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(out.path().join(EVENT_JSON)).unwrap()).unwrap();
    assert_eq!(json["tier"], "verified");
    assert_eq!(json["detection"]["duration_min"], 60);
    assert_eq!(json["eye"]["verdicts"][0]["tag"], "eye_passage_confirmed");
    assert_eq!(json["snapshots"][0]["label"], "T8");
}

#[test]
fn test_event_without_windows() {
    let input = tempdir().unwrap();
    write_event(input.path());
    let observations = load_folder(input.path(), &StationSelection::default()).unwrap();

    let analyzer = EventAnalyzer::new(EngineConfig::default());
    let report = analyzer.analyze(&observations, &SignalWindows::none());
    assert_eq!(report.tier, Tier::NoSignal);
    assert_eq!(report.verdict, "No Signal 8 issued");
    // without a window persistence runs over the whole table
    assert!(report.detection.detected);
    assert!(report.eye.verdicts.is_empty());
    assert!(report.snapshots.iter().all(|s| s.transparency.is_none()));

    let out = tempdir().unwrap();
    let written = write_report(out.path(), &report, &analyzer.config().ladder).unwrap();
    assert_eq!(written.len(), 3);
    assert!(!out.path().join(EYE_PASSAGE).exists());
}

#[test]
fn test_stricter_settings_change_the_verdict() {
    let input = tempdir().unwrap();
    write_event(input.path());
    let observations = load_folder(input.path(), &StationSelection::default()).unwrap();

    // the gale run is 8 intervals long, so 9 periods never persist
    let mut settings = Settings::default();
    settings.persistence.periods = 9;
    let analyzer = EventAnalyzer::new(settings.engine_config().unwrap());
    let report = analyzer.analyze(&observations, &windows());
    assert!(!report.detection.detected);
    // 8 gale intervals, 3 calm, then 2 gale: wind, lull, wind
    assert_eq!(report.tier, Tier::PatternValidated);
    assert!(report.verdict.starts_with("Pattern-validated"));
}

#[test]
fn test_too_few_stations_is_indeterminate() {
    let input = tempdir().unwrap();
    write_event(input.path());
    let selection = StationSelection::default().with_filter("station 0");
    let observations = load_folder(input.path(), &selection).unwrap();
    assert_eq!(observations.len(), 190);

    let selection = StationSelection::default().with_filter("station 01");
    let observations = load_folder(input.path(), &selection).unwrap();
    assert_eq!(observations.len(), 19);

    let report = EventAnalyzer::new(EngineConfig::default()).analyze(&observations, &windows());
    assert!(report.snapshots.iter().all(|s| s.label.as_str() == "Indeterminate"));
    assert_eq!(report.tier, Tier::Unverified);
}
