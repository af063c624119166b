use clap::Parser;
use std::path::PathBuf;
use typhoon_signal::export::write_report;
use typhoon_signal::parser::load_folder;
use typhoon_signal::parser::stations::StationSelection;
use typhoon_signal::pipeline::EventAnalyzer;
use typhoon_signal::plot::{draw_event_plot, PLOT_FILE};
use typhoon_signal::settings::Settings;
use typhoon_signal::window::{SignalTimes, SignalWindows};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Folder containing the 10-minute wind CSV snapshots
    #[arg(short, long, required_unless_present = "dump_config")]
    input_folder: Option<PathBuf>,

    /// Output directory (overrides [output] dir)
    #[arg(short, long)]
    out_dir: Option<PathBuf>,

    /// Settings file (TOML or YAML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Write the effective settings to this path (.toml or .yaml) and exit
    #[arg(long)]
    dump_config: Option<PathBuf>,

    /// Aggregation method: coverage, percentile or mean
    #[arg(long)]
    method: Option<String>,

    /// Coverage fraction for the coverage method
    #[arg(long)]
    coverage: Option<f64>,

    /// Minimum station count per level, overrides --coverage
    #[arg(long)]
    min_count: Option<usize>,

    /// Percentile (0-1) for the percentile method
    #[arg(long)]
    percentile: Option<f64>,

    /// Minimum valid stations for a snapshot to be classified
    #[arg(long)]
    min_stations: Option<usize>,

    /// Consecutive qualifying intervals for sustained winds
    #[arg(long)]
    persistence_periods: Option<usize>,

    /// Keep stations whose name contains this text (case-insensitive)
    #[arg(long)]
    station_filter: Option<String>,

    /// File with one station name per line to keep
    #[arg(long)]
    stations_file: Option<PathBuf>,

    /// JSON file with signal8_start/end and optional signal10_start/end
    #[arg(long)]
    signal_times: Option<PathBuf>,

    /// Skip the PNG plot
    #[arg(long, default_value_t = false)]
    no_plot: bool,
}

impl Args {
    fn apply_overrides(&self, settings: &mut Settings) {
        if let Some(method) = &self.method {
            settings.analysis.method = method.clone();
        }
        if let Some(coverage) = self.coverage {
            settings.analysis.coverage = coverage;
            // an explicit fraction wins over a configured count
            if self.min_count.is_none() {
                settings.analysis.min_count = None;
            }
        }
        if let Some(min_count) = self.min_count {
            settings.analysis.min_count = Some(min_count);
        }
        if let Some(percentile) = self.percentile {
            settings.analysis.percentile = percentile;
        }
        if let Some(min_stations) = self.min_stations {
            settings.analysis.min_stations = min_stations;
        }
        if let Some(periods) = self.persistence_periods {
            settings.persistence.periods = periods;
        }
        if let Some(dir) = &self.out_dir {
            settings.output.dir = dir.clone();
        }
        if self.no_plot {
            settings.output.plot = false;
        }
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();
    let args = Args::parse();

    let mut settings = Settings::new(args.config.clone())?;
    args.apply_overrides(&mut settings);

    if let Some(path) = &args.dump_config {
        let format = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("toml");
        std::fs::write(path, settings.dump(format)?)?;
        tracing::info!("Settings written to {:?}", path);
        return Ok(());
    }

    // Validate everything before touching the data
    let engine = settings.engine_config()?;
    let windows = match &args.signal_times {
        Some(path) => SignalTimes::from_file(path)?.into_windows()?,
        None => SignalWindows::none(),
    };

    let Some(folder) = &args.input_folder else {
        return Err("--input-folder is required".into());
    };
    let mut selection = StationSelection::default();
    if let Some(needle) = &args.station_filter {
        selection = selection.with_filter(needle);
    }
    if let Some(path) = &args.stations_file {
        selection = selection.with_whitelist_file(path);
    }
    let observations = load_folder(folder, &selection)?;
    if observations.is_empty() {
        tracing::warn!("No observations left after filtering");
    }

    let analyzer = EventAnalyzer::new(engine);
    let report = analyzer.analyze(&observations, &windows);
    let ladder = &analyzer.config().ladder;

    let out_dir = &settings.output.dir;
    write_report(out_dir, &report, ladder)?;

    if settings.output.plot && !report.snapshots.is_empty() {
        let title = folder
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "event".to_string());
        let path = out_dir.join(PLOT_FILE);
        let interval = analyzer.config().interval_minutes;
        if let Err(e) = draw_event_plot(&path, &title, &report.snapshots, ladder, interval) {
            tracing::warn!("Failed to draw plot: {}", e);
        }
    }

    if let Some(latest) = report.latest() {
        tracing::info!(
            "Latest {}: {} ({} stations, mean {:.1} km/h)",
            latest.timestamp,
            latest.label,
            latest.valid_station_count,
            latest.area_mean
        );
    }
    if let Some(peak) = report.peak() {
        tracing::info!("Peak {}: {}", peak.timestamp, peak.label);
    }
    tracing::info!("Verification tier: {} - {}", report.tier, report.verdict);
    Ok(())
}
