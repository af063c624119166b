use crate::timeseries::Observation;
use std::collections::HashSet;
use std::path::Path;
use tracing::{info, warn};

/// Which stations to keep after loading.
#[derive(Debug, Clone, Default)]
pub struct StationSelection {
    /// Case-insensitive substring of the station name.
    pub name_filter: Option<String>,
    /// Exact station names; `None` or an empty set keeps everything.
    pub whitelist: Option<HashSet<String>>,
}

impl StationSelection {
    pub fn with_filter(mut self, needle: &str) -> Self {
        self.name_filter = Some(needle.to_string());
        self
    }

    /// Read the whitelist from a file. A file that cannot be read is logged
    /// and ignored.
    pub fn with_whitelist_file(mut self, path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(text) => self.whitelist = Some(parse_whitelist(&text)),
            Err(e) => warn!("Failed to read stations file {:?}: {}", path, e),
        }
        self
    }

    pub fn apply(&self, observations: &mut Vec<Observation>) {
        let before = observations.len();
        if let Some(needle) = &self.name_filter {
            let needle = needle.to_lowercase();
            observations.retain(|o| o.station.to_lowercase().contains(&needle));
        }
        if let Some(whitelist) = self.whitelist.as_ref().filter(|w| !w.is_empty()) {
            observations.retain(|o| whitelist.contains(&o.station));
        }
        if observations.len() != before {
            info!("Station selection kept {} of {} rows", observations.len(), before);
        }
    }
}

/// One station per line; blank lines and `#` comments are skipped.
pub fn parse_whitelist(text: &str) -> HashSet<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn rows(names: &[&str]) -> Vec<Observation> {
        let ts = NaiveDate::from_ymd_opt(2025, 7, 20)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        names.iter().map(|n| Observation::new(ts, n, Some(10.0))).collect()
    }

    #[test]
    fn test_whitelist_parsing() {
        let list = parse_whitelist("# reference network\nCheung Chau\n\n  Sha Tin  \n#Kai Tak\n");
        assert_eq!(list.len(), 2);
        assert!(list.contains("Sha Tin"));
        assert!(!list.contains("Kai Tak"));
    }

    #[test]
    fn test_filter_is_case_insensitive_substring() {
        let mut obs = rows(&["Cheung Chau", "Cheung Chau Beach", "Sha Tin"]);
        StationSelection::default().with_filter("cheung").apply(&mut obs);
        assert_eq!(obs.len(), 2);
    }

    #[test]
    fn test_empty_whitelist_keeps_everything() {
        let mut obs = rows(&["Cheung Chau", "Sha Tin"]);
        let selection = StationSelection {
            whitelist: Some(parse_whitelist("# nothing\n")),
            ..Default::default()
        };
        selection.apply(&mut obs);
        assert_eq!(obs.len(), 2);

        let selection = StationSelection {
            whitelist: Some(parse_whitelist("Sha Tin")),
            ..Default::default()
        };
        selection.apply(&mut obs);
        assert_eq!(obs.len(), 1);
        assert_eq!(obs[0].station, "Sha Tin");
    }

    #[test]
    fn test_missing_whitelist_file_is_ignored() {
        let missing = Path::new("/nonexistent/stations.txt");
        let selection = StationSelection::default().with_whitelist_file(missing);
        assert!(selection.whitelist.is_none());
    }
}
