use crate::classify::AggregationMethod;
use crate::eye::EyeConfig;
use crate::ladder::{LadderError, ThresholdLadder};
use crate::persistence::{CoverageRule, PersistenceConfig};
use crate::tier::PatternConfig;
use crate::timeseries::AggregatorConfig;
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use thiserror::Error;
use tracing::warn;

#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("Unknown aggregation method '{0}', expected coverage, percentile or mean")]
    UnknownMethod(String),
    #[error("Coverage fraction must be in (0, 1], got {0}")]
    Coverage(f64),
    #[error("Percentile must be in [0, 1], got {0}")]
    Percentile(f64),
    #[error("Persistence periods must be at least 1")]
    PersistencePeriods,
    #[error("Interval minutes must be at least 1")]
    IntervalMinutes,
    #[error("Calm segments need at least 1 interval")]
    CalmIntervals,
    #[error("A lull needs at least 1 interval")]
    LullIntervals,
    #[error("Threshold label '{0}' appears more than once")]
    DuplicateLabel(String),
    #[error("Threshold ladder: {0}")]
    Ladder(#[from] LadderError),
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(rename_all = "lowercase")]
pub struct Settings {
    #[serde(alias = "ANALYSIS")]
    pub analysis: AnalysisSettings,
    #[serde(alias = "THRESHOLDS")]
    pub thresholds: ThresholdSettings,
    #[serde(alias = "PERSISTENCE")]
    pub persistence: PersistenceSettings,
    #[serde(alias = "EYE")]
    pub eye: EyeSettings,
    #[serde(alias = "COVERAGE")]
    pub coverage: CoverageSettings,
    #[serde(alias = "PATTERN")]
    pub pattern: PatternSettings,
    #[serde(alias = "OUTPUT")]
    pub output: OutputSettings,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "lowercase")]
pub struct AnalysisSettings {
    /// coverage | percentile | mean
    #[serde(alias = "METHOD")]
    pub method: String,
    #[serde(alias = "COVERAGE")]
    pub coverage: f64,
    /// Overrides the coverage fraction when set.
    #[serde(alias = "MIN_COUNT", default, skip_serializing_if = "Option::is_none")]
    pub min_count: Option<usize>,
    #[serde(alias = "PERCENTILE")]
    pub percentile: f64,
    #[serde(alias = "MIN_STATIONS")]
    pub min_stations: usize,
    #[serde(alias = "INTERVAL_MINUTES")]
    pub interval_minutes: u32,
    /// Ignore snapshots reporting more stations than this in the detection
    /// summary, for comparing events against a fixed reference network.
    #[serde(alias = "MAX_REFERENCE_STATIONS", default, skip_serializing_if = "Option::is_none")]
    pub max_reference_stations: Option<usize>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "lowercase")]
pub struct ThresholdLevel {
    #[serde(alias = "LABEL")]
    pub label: String,
    /// km/h
    #[serde(alias = "SPEED")]
    pub speed: f64,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "lowercase")]
pub struct ThresholdSettings {
    #[serde(alias = "LEVELS")]
    pub levels: Vec<ThresholdLevel>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "lowercase")]
pub struct PersistenceSettings {
    #[serde(alias = "PERIODS")]
    pub periods: usize,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "lowercase")]
pub struct EyeSettings {
    #[serde(alias = "CALM_THRESHOLD")]
    pub calm_threshold: f64,
    #[serde(alias = "MIN_CALM_INTERVALS")]
    pub min_calm_intervals: usize,
    #[serde(alias = "PREPOST_WINDOW")]
    pub prepost_window: usize,
    #[serde(alias = "MIN_T10_COVERAGE_INTERVALS")]
    pub min_t10_coverage_intervals: usize,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "lowercase")]
pub struct CoverageSettings {
    #[serde(alias = "SEVERE_MIN_COUNT")]
    pub severe_min_count: usize,
    #[serde(alias = "EXTREME_MIN_COUNT")]
    pub extreme_min_count: usize,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "lowercase")]
pub struct PatternSettings {
    #[serde(alias = "MIN_LULL_INTERVALS")]
    pub min_lull_intervals: usize,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "lowercase")]
pub struct OutputSettings {
    #[serde(alias = "DIR")]
    pub dir: PathBuf,
    #[serde(alias = "PLOT")]
    pub plot: bool,
}

impl Default for AnalysisSettings {
    fn default() -> Self {
        Self {
            method: "coverage".to_string(),
            coverage: 0.40,
            min_count: Some(4),
            percentile: 0.5,
            min_stations: 8,
            interval_minutes: 10,
            max_reference_stations: None,
        }
    }
}

impl Default for ThresholdSettings {
    fn default() -> Self {
        Self {
            levels: ThresholdLadder::default()
                .rungs()
                .iter()
                .map(|rung| ThresholdLevel {
                    label: rung.label.clone(),
                    speed: rung.threshold,
                })
                .collect(),
        }
    }
}

impl Default for PersistenceSettings {
    fn default() -> Self {
        Self { periods: 3 }
    }
}

impl Default for EyeSettings {
    fn default() -> Self {
        let eye = EyeConfig::default();
        Self {
            calm_threshold: eye.calm_threshold,
            min_calm_intervals: eye.min_calm_intervals,
            prepost_window: eye.prepost_window,
            min_t10_coverage_intervals: eye.min_extreme_intervals,
        }
    }
}

impl Default for CoverageSettings {
    fn default() -> Self {
        Self {
            severe_min_count: 4,
            extreme_min_count: 2,
        }
    }
}

impl Default for PatternSettings {
    fn default() -> Self {
        Self {
            min_lull_intervals: PatternConfig::default().min_lull_intervals,
        }
    }
}

impl Default for OutputSettings {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("output"),
            plot: true,
        }
    }
}

/// Validated, immutable parameters for one analysis run.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub ladder: ThresholdLadder,
    pub aggregator: AggregatorConfig,
    pub persistence: PersistenceConfig,
    pub eye: EyeConfig,
    pub pattern: PatternConfig,
    pub interval_minutes: u32,
    pub max_reference_stations: Option<usize>,
}

impl Default for EngineConfig {
    /// Same values as `Settings::default().engine_config()`.
    fn default() -> Self {
        let analysis = AnalysisSettings::default();
        Self {
            ladder: ThresholdLadder::default(),
            aggregator: AggregatorConfig {
                method: AggregationMethod::Coverage {
                    fraction: analysis.coverage,
                    min_count: analysis.min_count,
                },
                min_stations: analysis.min_stations,
            },
            persistence: PersistenceConfig {
                periods: PersistenceSettings::default().periods,
                min_stations: analysis.min_stations,
                rule: analysis
                    .min_count
                    .map_or(CoverageRule::Fraction(analysis.coverage), CoverageRule::MinCount),
            },
            eye: EyeConfig::default(),
            pattern: PatternConfig::default(),
            interval_minutes: analysis.interval_minutes,
            max_reference_stations: None,
        }
    }
}

impl Settings {
    pub fn new(config_path: Option<PathBuf>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();

        // 1. Load defaults
        let default_settings = Settings::default();
        builder = builder.add_source(config::Config::try_from(&default_settings)?);

        // 2. Load from file if specified
        if let Some(path) = config_path {
            if path.exists() {
                builder = builder.add_source(File::from(path));
            } else {
                warn!("Configuration file not found: {:?}", path);
            }
        } else if let Some(home) = dirs::home_dir() {
            let toml_path = home.join(".typhoon-signal").join("settings.toml");
            let yaml_path = home.join(".typhoon-signal").join("settings.yaml");

            if toml_path.exists() {
                builder = builder.add_source(File::from(toml_path));
            } else if yaml_path.exists() {
                builder = builder.add_source(File::from(yaml_path));
            }
        }

        // 3. Environment variables
        builder = builder.add_source(
            Environment::with_prefix("TYPHOON_SIGNAL")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;

        if let Ok(table) = config.clone().try_deserialize::<serde_json::Value>()
            && let Some(map) = table.as_object()
        {
            let known_sections = [
                "analysis",
                "thresholds",
                "persistence",
                "eye",
                "coverage",
                "pattern",
                "output",
            ];
            for key in map.keys() {
                if !known_sections.contains(&key.to_lowercase().as_str()) {
                    warn!("Unknown configuration section: {}", key);
                }
            }
        }

        config.try_deserialize()
    }

    pub fn dump(&self, format: &str) -> Result<String, Box<dyn std::error::Error>> {
        match format.to_lowercase().as_str() {
            "toml" => Ok(toml::to_string_pretty(self)?),
            "yaml" | "yml" => Ok(serde_yaml::to_string(self)?),
            _ => Err("Unsupported format".into()),
        }
    }

    pub fn aggregation_method(&self) -> Result<AggregationMethod, SettingsError> {
        let analysis = &self.analysis;
        match analysis.method.to_lowercase().as_str() {
            "coverage" => {
                if !(analysis.coverage > 0.0 && analysis.coverage <= 1.0) {
                    return Err(SettingsError::Coverage(analysis.coverage));
                }
                Ok(AggregationMethod::Coverage {
                    fraction: analysis.coverage,
                    min_count: analysis.min_count,
                })
            }
            "percentile" => {
                if !(0.0..=1.0).contains(&analysis.percentile) {
                    return Err(SettingsError::Percentile(analysis.percentile));
                }
                Ok(AggregationMethod::Percentile {
                    rank: analysis.percentile,
                })
            }
            "mean" => Ok(AggregationMethod::Mean),
            other => Err(SettingsError::UnknownMethod(other.to_string())),
        }
    }

    pub fn ladder(&self) -> Result<ThresholdLadder, SettingsError> {
        let mut map = BTreeMap::new();
        for level in &self.thresholds.levels {
            if map.insert(level.label.clone(), level.speed).is_some() {
                return Err(SettingsError::DuplicateLabel(level.label.clone()));
            }
        }
        Ok(ThresholdLadder::from_map(&map)?)
    }

    /// Validate everything up front so no row is processed with a bad config.
    pub fn engine_config(&self) -> Result<EngineConfig, SettingsError> {
        let method = self.aggregation_method()?;
        let ladder = self.ladder()?;
        if self.persistence.periods < 1 {
            return Err(SettingsError::PersistencePeriods);
        }
        if self.analysis.interval_minutes < 1 {
            return Err(SettingsError::IntervalMinutes);
        }
        if self.eye.min_calm_intervals < 1 {
            return Err(SettingsError::CalmIntervals);
        }
        if self.pattern.min_lull_intervals < 1 {
            return Err(SettingsError::LullIntervals);
        }
        // The coverage fraction is still checked when another method is
        // selected, since persistence qualification uses it.
        if self.analysis.min_count.is_none()
            && !(self.analysis.coverage > 0.0 && self.analysis.coverage <= 1.0)
        {
            return Err(SettingsError::Coverage(self.analysis.coverage));
        }

        let rule = match self.analysis.min_count {
            Some(min) => CoverageRule::MinCount(min),
            None => CoverageRule::Fraction(self.analysis.coverage),
        };

        Ok(EngineConfig {
            ladder,
            aggregator: AggregatorConfig {
                method,
                min_stations: self.analysis.min_stations,
            },
            persistence: PersistenceConfig {
                periods: self.persistence.periods,
                min_stations: self.analysis.min_stations,
                rule,
            },
            eye: EyeConfig {
                calm_threshold: self.eye.calm_threshold,
                min_calm_intervals: self.eye.min_calm_intervals,
                prepost_window: self.eye.prepost_window,
                min_extreme_intervals: self.eye.min_t10_coverage_intervals,
                severe_min_count: self.coverage.severe_min_count,
                extreme_min_count: self.coverage.extreme_min_count,
            },
            pattern: PatternConfig {
                severe_min_count: self.coverage.severe_min_count,
                min_lull_intervals: self.pattern.min_lull_intervals,
            },
            interval_minutes: self.analysis.interval_minutes,
            max_reference_stations: self.analysis.max_reference_stations,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File as StdFile;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.analysis.method, "coverage");
        assert_eq!(settings.analysis.min_count, Some(4));
        assert_eq!(settings.analysis.min_stations, 8);
        assert_eq!(settings.persistence.periods, 3);
        assert_eq!(settings.thresholds.levels.len(), 5);
    }

    #[test]
    fn test_load_toml() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("settings.toml");
        let mut file = StdFile::create(&config_path).unwrap();
        writeln!(
            file,
            "[analysis]\nmethod = \"percentile\"\npercentile = 0.9\n[persistence]\nperiods = 2"
        )
        .unwrap();

        let settings = Settings::new(Some(config_path)).unwrap();
        assert_eq!(settings.analysis.method, "percentile");
        assert_eq!(settings.persistence.periods, 2);
        assert_eq!(settings.eye.calm_threshold, 41.0);

        let engine = settings.engine_config().unwrap();
        assert_eq!(engine.aggregator.method, AggregationMethod::Percentile { rank: 0.9 });
    }

    #[test]
    fn test_load_yaml() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("settings.yaml");
        let mut file = StdFile::create(&config_path).unwrap();
        writeln!(file, "eye:\n  calm_threshold: 35.5\n  prepost_window: 6").unwrap();

        let settings = Settings::new(Some(config_path)).unwrap();
        assert_eq!(settings.eye.calm_threshold, 35.5);
        assert_eq!(settings.eye.prepost_window, 6);
        assert_eq!(settings.eye.min_calm_intervals, 2);
    }

    #[test]
    fn test_custom_levels_keep_label_case() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("settings.toml");
        let mut file = StdFile::create(&config_path).unwrap();
        writeln!(
            file,
            "[thresholds]\nlevels = [{{ label = \"Strong\", speed = 41.0 }}, {{ label = \"Gale\", speed = 63.0 }}, {{ label = \"Hurricane\", speed = 118.0 }}]"
        )
        .unwrap();

        let engine = Settings::new(Some(config_path)).unwrap().engine_config().unwrap();
        let labels: Vec<&str> = engine.ladder.labels().collect();
        assert_eq!(labels, vec!["Strong", "Gale", "Hurricane"]);
        assert_eq!(engine.ladder.severe().label, "Gale");
    }

    #[test]
    fn test_dump_toml() {
        let settings = Settings::default();
        let dumped = settings.dump("toml").unwrap();
        assert!(dumped.contains("method = \"coverage\""));
        assert!(dumped.contains("calm_threshold = 41.0"));
        assert!(settings.dump("ini").is_err());
    }

    #[test]
    fn test_validation_errors() {
        let mut settings = Settings::default();
        settings.analysis.method = "median".to_string();
        assert!(matches!(settings.engine_config(), Err(SettingsError::UnknownMethod(_))));

        let mut settings = Settings::default();
        settings.analysis.min_count = None;
        settings.analysis.coverage = 0.0;
        assert!(matches!(settings.engine_config(), Err(SettingsError::Coverage(_))));

        let mut settings = Settings::default();
        settings.analysis.method = "percentile".to_string();
        settings.analysis.percentile = 1.5;
        assert!(matches!(settings.engine_config(), Err(SettingsError::Percentile(_))));

        let mut settings = Settings::default();
        settings.persistence.periods = 0;
        assert!(matches!(settings.engine_config(), Err(SettingsError::PersistencePeriods)));

        let mut settings = Settings::default();
        settings.eye.min_calm_intervals = 0;
        assert!(matches!(settings.engine_config(), Err(SettingsError::CalmIntervals)));

        let mut settings = Settings::default();
        settings.pattern.min_lull_intervals = 0;
        assert!(matches!(settings.engine_config(), Err(SettingsError::LullIntervals)));
        settings.pattern.min_lull_intervals = 1;
        assert_eq!(settings.engine_config().unwrap().pattern.min_lull_intervals, 1);

        let mut settings = Settings::default();
        settings.thresholds.levels.truncate(1);
        assert!(matches!(settings.engine_config(), Err(SettingsError::Ladder(_))));

        let mut settings = Settings::default();
        let dup = settings.thresholds.levels[0].clone();
        settings.thresholds.levels.push(dup);
        assert!(matches!(settings.engine_config(), Err(SettingsError::DuplicateLabel(_))));
    }

    #[test]
    fn test_min_count_selects_count_rule() {
        let engine = Settings::default().engine_config().unwrap();
        assert_eq!(engine.persistence.rule, EngineConfig::default().persistence.rule);
        assert_eq!(engine.persistence.rule, CoverageRule::MinCount(4));
        assert_eq!(engine.persistence.min_stations, 8);

        let mut settings = Settings::default();
        settings.analysis.min_count = None;
        let engine = settings.engine_config().unwrap();
        assert_eq!(engine.persistence.rule, CoverageRule::Fraction(0.40));
    }
}
