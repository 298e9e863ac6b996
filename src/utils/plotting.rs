use anyhow::{anyhow, Result};
use log::warn;
use plotters::prelude::*;
use std::path::Path;

use crate::utils::tables::{MappingRow, TrimmingRow};


/// Draws one bar per sample on a 0–100 percent axis.
///
/// # Arguments
/// * `bars` - (sample, percent) pairs in table order.
/// * `caption` - Chart title.
/// * `y_desc` - Y axis label.
/// * `output_path` - SVG destination.
pub fn plot_percent_bars(bars: &[(String, f64)], caption: &str, y_desc: &str, output_path: &Path) -> Result<()> {
    if bars.is_empty() {
        return Err(anyhow!("No data available for plotting {}", caption));
    }

    let width = (120 + 80 * bars.len() as u32).max(640);
    let root = SVGBackend::new(output_path, (width, 480)).into_drawing_area();
    root.fill(&WHITE)?;

    let n = bars.len();
    let mut chart = ChartBuilder::on(&root)
        .caption(caption, ("sans-serif", 20))
        .margin(10)
        .x_label_area_size(60)
        .y_label_area_size(50)
        .build_cartesian_2d(0f64..n as f64, 0f64..100f64)?;

    chart.configure_mesh()
        .disable_x_mesh()
        .x_label_formatter(&|_: &f64| String::new())
        .x_desc("sample")
        .y_desc(y_desc)
        .draw()?;

    chart.draw_series(bars.iter().enumerate().map(|(i, (_, value))| {
        let x0 = i as f64 + 0.15;
        let x1 = i as f64 + 0.85;
        Rectangle::new([(x0, 0.0), (x1, value.clamp(0.0, 100.0))], BLUE.mix(0.7).filled())
    }))?;

    let label_font = ("sans-serif", 12.0).into_font();
    for (i, (sample, value)) in bars.iter().enumerate() {
        chart.draw_series(std::iter::once(Text::new(
            format!("{:.2}", value),
            (i as f64 + 0.3, (value + 2.0).min(98.0)),
            label_font.clone(),
        )))?;
        // Sample names go just under the x axis, in pixel space.
        let (px, py) = chart.backend_coord(&(i as f64 + 0.2, 0.0));
        root.draw(&Text::new(sample.clone(), (px, py + 8), label_font.clone()))?;
    }

    root.present()?;
    Ok(())
}


fn collect_bars<'a>(rows: impl Iterator<Item = (&'a str, Option<f64>)>, column: &str) -> Vec<(String, f64)> {
    rows.filter_map(|(sample, value)| match value {
        Some(v) => Some((sample.to_string(), v)),
        None => {
            warn!("Skipping {} in {} plot: value is NA", sample, column);
            None
        }
    })
    .collect()
}


pub fn plot_mapping_rates(rows: &[MappingRow], output_path: &Path) -> Result<()> {
    let bars = collect_bars(
        rows.iter().map(|r| (r.sample.as_str(), r.stats.mapping_percent)),
        "mapping_percent",
    );
    plot_percent_bars(&bars, "HISAT2 mapping rate", "mapped reads (%)", output_path)
}


pub fn plot_kept_reads(rows: &[TrimmingRow], output_path: &Path) -> Result<()> {
    let bars = collect_bars(
        rows.iter().map(|r| (r.sample.as_str(), r.stats.kept_percent)),
        "kept_percent",
    );
    plot_percent_bars(&bars, "Read pairs kept after fastp", "kept read pairs (%)", output_path)
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::metrics::TrimmingSummary;
    use crate::utils::sambam::FlagstatSummary;

    #[test]
    fn test_plot_mapping_rates_writes_svg() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("mapping_rate.svg");
        let rows = vec![
            MappingRow {
                sample: "SRR1".to_string(),
                stats: FlagstatSummary { total_reads: Some(10), mapped_reads: Some(9), mapping_percent: Some(90.0) },
            },
            MappingRow { sample: "SRR2".to_string(), stats: FlagstatSummary::default() },
        ];
        plot_mapping_rates(&rows, &path)?;
        let svg = std::fs::read_to_string(&path)?;
        assert!(svg.contains("<svg"));
        assert!(svg.contains("SRR1"));
        assert!(!svg.contains("SRR2"), "NA rows are not drawn");
        Ok(())
    }

    #[test]
    fn test_plot_requires_data() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let rows = vec![TrimmingRow { sample: "SRR1".to_string(), stats: TrimmingSummary::default() }];
        assert!(plot_kept_reads(&rows, &dir.path().join("kept.svg")).is_err());
        Ok(())
    }
}
