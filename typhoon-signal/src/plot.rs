use crate::ladder::ThresholdLadder;
use crate::timeseries::Snapshot;
use chrono::NaiveDateTime;
use plotters::prelude::*;
use std::path::Path;
use tracing::info;

pub const PLOT_FILE: &str = "area_speed_and_signal.png";

/// Area mean wind and the instantaneous signal level over time.
///
/// Top panel: area mean and p90 with one dashed line per ladder rung, shaded
/// where the official windows apply. Bottom panel: signal rank as a step, each
/// level held for `interval_minutes`.
pub fn draw_event_plot(
    path: &Path,
    title: &str,
    snapshots: &[Snapshot],
    ladder: &ThresholdLadder,
    interval_minutes: u32,
) -> Result<(), Box<dyn std::error::Error>> {
    let (Some(first), Some(last)) = (snapshots.first(), snapshots.last()) else {
        return Err("No snapshots to plot".into());
    };
    info!("Drawing {} snapshots to {:?}", snapshots.len(), path);

    let step = i64::from(interval_minutes.max(1)) * 60;
    let half_step = step / 2;
    let start = first.timestamp.and_utc().timestamp();
    let end = last.timestamp.and_utc().timestamp().max(start + step);
    let secs = |t: NaiveDateTime| t.and_utc().timestamp();

    let y_max = snapshots
        .iter()
        .map(|s| s.area_p90)
        .filter(|v| v.is_finite())
        .fold(ladder.extreme().threshold, f64::max)
        * 1.1;

    let bg_color = RGBColor(32, 37, 48);
    let fg_color = RGBColor(204, 204, 204);
    let mean_color = RGBColor(194, 130, 133);
    let p90_color = RGBColor(120, 160, 200);
    let severe_shade = RGBColor(90, 70, 40).mix(0.4);
    let extreme_shade = RGBColor(130, 40, 40).mix(0.4);

    let root = BitMapBackend::new(path, (1200, 700)).into_drawing_area();
    root.fill(&bg_color)?;
    let (upper, lower) = root.split_vertically(480);

    let label_font = ("sans-serif", 12).into_font().color(&fg_color);
    let title_font = ("sans-serif", 18).into_font().color(&fg_color);

    let mut chart = ChartBuilder::on(&upper)
        .caption(title, title_font)
        .margin_left(20)
        .margin_right(20)
        .margin_top(10)
        .set_label_area_size(LabelAreaPosition::Left, 60)
        .build_cartesian_2d(start..end, 0.0..y_max)?;

    chart
        .configure_mesh()
        .disable_x_mesh()
        .disable_x_axis()
        .y_desc("km/h")
        .axis_desc_style(label_font.clone())
        .label_style(label_font.clone())
        .draw()?;

    let shaded = |in_window: fn(&Snapshot) -> bool, shade: RGBAColor| {
        snapshots.iter().filter(move |s| in_window(s)).map(move |s| {
            let t = secs(s.timestamp);
            Rectangle::new([(t - half_step, 0.0), (t + half_step, y_max)], shade.filled())
        })
    };
    chart.draw_series(shaded(|s| s.in_severe_window, severe_shade))?;
    chart.draw_series(shaded(|s| s.in_extreme_window, extreme_shade))?;

    for rung in ladder.rungs() {
        chart.draw_series(DashedLineSeries::new(
            [(start, rung.threshold), (end, rung.threshold)],
            6,
            4,
            fg_color.mix(0.5).stroke_width(1),
        ))?;
    }

    let series = |pick: fn(&Snapshot) -> f64| {
        snapshots
            .iter()
            .filter(move |s| pick(s).is_finite())
            .map(move |s| (secs(s.timestamp), pick(s)))
    };
    chart.draw_series(LineSeries::new(series(|s| s.area_mean), mean_color.stroke_width(2)))?;
    chart.draw_series(LineSeries::new(series(|s| s.area_p90), p90_color.stroke_width(1)))?;

    let top_rank = ladder.len() as i32;
    let mut step_chart = ChartBuilder::on(&lower)
        .margin_left(20)
        .margin_right(20)
        .margin_bottom(20)
        .set_label_area_size(LabelAreaPosition::Left, 60)
        .set_label_area_size(LabelAreaPosition::Bottom, 30)
        .build_cartesian_2d(start..end, 0..top_rank)?;

    let labels: Vec<String> = ladder.labels().map(str::to_string).collect();
    step_chart
        .configure_mesh()
        .disable_mesh()
        .axis_style(ShapeStyle::from(&fg_color).stroke_width(1))
        .y_desc("Signal")
        .x_desc("Time")
        .axis_desc_style(label_font.clone())
        .label_style(label_font)
        .x_labels(8)
        .y_labels(labels.len() + 1)
        .x_label_formatter(&|t| {
            chrono::DateTime::from_timestamp(*t, 0)
                .map(|dt| dt.format("%m-%d %H:%M").to_string())
                .unwrap_or_default()
        })
        .y_label_formatter(&|r| match *r {
            0 => "-".to_string(),
            r => labels.get(r as usize - 1).cloned().unwrap_or_default(),
        })
        .draw()?;

    let steps = signal_steps(snapshots, step);
    step_chart.draw_series(LineSeries::new(steps, mean_color.stroke_width(2)))?;
    step_chart.draw_series(snapshots.iter().filter(|s| s.is_persistent).map(|s| {
        let point = (secs(s.timestamp), s.label.severity() as i32);
        Circle::new(point, 3, fg_color.filled())
    }))?;

    root.present()?;
    Ok(())
}

/// Step outline of the signal level, each level held for `step` seconds.
fn signal_steps(snapshots: &[Snapshot], step: i64) -> Vec<(i64, i32)> {
    snapshots
        .iter()
        .flat_map(|s| {
            let t = s.timestamp.and_utc().timestamp();
            let level = s.label.severity() as i32;
            [(t, level), (t + step, level)]
        })
        .collect()
}
