//! Loader for 10-minute station wind CSV files.

pub mod columns;
pub mod stations;

use crate::timeseries::Observation;
use columns::{parse_speed, parse_timestamp, ColumnMap};
use std::io::Read;
use std::path::{Path, PathBuf};
use stations::StationSelection;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
pub enum LoadError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("Input folder not found: {0:?}")]
    FolderNotFound(PathBuf),
    #[error("No CSV files found in {0:?}")]
    NoFiles(PathBuf),
    #[error("No CSV files could be loaded from {0:?}")]
    NothingLoaded(PathBuf),
}

const SNAPSHOT_SUFFIX: &str = "latest_10min_wind.csv";

/// CSV files to read from `folder`, sorted by name.
///
/// Snapshot files named `*latest_10min_wind.csv` are preferred; any `*.csv`
/// is used when there are none.
pub fn list_csv_files(folder: &Path) -> Result<Vec<PathBuf>, LoadError> {
    if !folder.is_dir() {
        return Err(LoadError::FolderNotFound(folder.to_path_buf()));
    }

    let mut all_csv = Vec::new();
    for entry in std::fs::read_dir(folder)? {
        let path = entry?.path();
        let is_csv = path.is_file()
            && path
                .extension()
                .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"));
        if is_csv {
            all_csv.push(path);
        }
    }
    all_csv.sort();

    let snapshots: Vec<PathBuf> = all_csv
        .iter()
        .filter(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.ends_with(SNAPSHOT_SUFFIX))
        })
        .cloned()
        .collect();

    let chosen = if snapshots.is_empty() { all_csv } else { snapshots };
    if chosen.is_empty() {
        return Err(LoadError::NoFiles(folder.to_path_buf()));
    }
    Ok(chosen)
}

/// Parse observations from any CSV source.
///
/// Rows without a parseable timestamp are dropped. Blank station names become
/// `Unknown`. Speeds that do not parse are kept as absent.
pub fn read_observations<R: Read>(reader: R) -> Result<Vec<Observation>, LoadError> {
    let mut rdr = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(reader);
    let map = ColumnMap::from_headers(rdr.headers()?.iter());

    let mut observations = Vec::new();
    let mut dropped = 0usize;
    for record in rdr.records() {
        let record = record?;
        let cell = |idx: Option<usize>| idx.and_then(|i| record.get(i));

        let Some(timestamp) = cell(map.timestamp).and_then(parse_timestamp) else {
            dropped += 1;
            continue;
        };
        let station = cell(map.station).map(str::trim).unwrap_or("");
        let station = if station.is_empty() { "Unknown" } else { station };

        observations.push(Observation {
            timestamp,
            station: station.to_string(),
            direction: cell(map.direction)
                .map(str::trim)
                .filter(|d| !d.is_empty())
                .map(str::to_string),
            mean_speed: cell(map.mean_speed).and_then(parse_speed),
            gust_speed: cell(map.gust).and_then(parse_speed),
        });
    }

    if dropped > 0 {
        debug!("Dropped {} rows without a valid timestamp", dropped);
    }
    Ok(observations)
}

pub fn load_csv(path: &Path) -> Result<Vec<Observation>, LoadError> {
    let file = std::fs::File::open(path)?;
    read_observations(file)
}

/// Load every station CSV in `folder`, apply the station selection and drop
/// rows without a mean speed.
///
/// Output is sorted by (timestamp, station). A file that fails to load is
/// skipped with a warning.
pub fn load_folder(
    folder: &Path,
    selection: &StationSelection,
) -> Result<Vec<Observation>, LoadError> {
    let paths = list_csv_files(folder)?;
    info!("Loading {} CSV files from {:?}", paths.len(), folder);

    let mut observations = Vec::new();
    let mut loaded = 0usize;
    for path in &paths {
        match load_csv(path) {
            Ok(mut rows) => {
                debug!("{:?}: {} rows", path, rows.len());
                observations.append(&mut rows);
                loaded += 1;
            }
            Err(e) => warn!("Failed to load {:?}: {}", path, e),
        }
    }
    if loaded == 0 {
        return Err(LoadError::NothingLoaded(folder.to_path_buf()));
    }

    selection.apply(&mut observations);
    observations.retain(|o| o.mean_speed.is_some());
    observations.sort_by(|a, b| {
        a.timestamp
            .cmp(&b.timestamp)
            .then_with(|| a.station.cmp(&b.station))
    });

    info!("Loaded {} observations from {} files", observations.len(), loaded);
    Ok(observations)
}
