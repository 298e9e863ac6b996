use std::collections::BTreeSet;
use std::sync::Arc;

use log::{info, warn};

use crate::config::defs::{
    Mate, PipelineError, RunConfig, KEPT_READS_PLOT, MAPPING_PLOT, MAPPING_SUMMARY_TSV,
    RAW_DUPLICATION_TSV, TRIMMING_SUMMARY_TSV,
};
use crate::utils::download::resolve_samples;
use crate::utils::file::OutputLayout;
use crate::utils::metrics::{duplication_summary, read_fastp_report, read_fastqc_data};
use crate::utils::plotting::{plot_kept_reads, plot_mapping_rates};
use crate::utils::sambam::read_flagstat;
use crate::utils::tables::{
    read_mapping_table, read_trimming_table, write_duplication_table, write_mapping_table,
    write_trimming_table, DuplicationRow, MappingRow, TrimmingRow,
};


/// Scrapes flagstat, fastp and FastQC outputs into the three summary tables.
///
/// # Arguments
///
/// * `layout` - Output tree of the run.
/// * `samples` - Samples in table order.
///
/// # Returns
/// Result<(), PipelineError>
pub async fn write_summary_tables(layout: &OutputLayout, samples: &[String]) -> Result<(), PipelineError> {
    let mut mapping_rows = Vec::with_capacity(samples.len());
    let mut trimming_rows = Vec::with_capacity(samples.len());
    let mut duplication_rows = Vec::with_capacity(samples.len());

    for sample in samples {
        let flagstat = read_flagstat(&layout.flagstat(sample)).await?;
        mapping_rows.push(MappingRow { sample: sample.clone(), stats: flagstat });

        let trimming = read_fastp_report(&layout.fastp_json(sample)).await?;
        trimming_rows.push(TrimmingRow { sample: sample.clone(), stats: trimming });

        let r1 = read_fastqc_data(&layout.raw_fastqc_data(sample, Mate::R1)).await?;
        let r2 = read_fastqc_data(&layout.raw_fastqc_data(sample, Mate::R2)).await?;
        duplication_rows.push(DuplicationRow { sample: sample.clone(), stats: duplication_summary(&r1, &r2) });
    }

    let mapping_path = layout.summary_file(MAPPING_SUMMARY_TSV);
    write_mapping_table(&mapping_path, &mapping_rows)
        .await
        .map_err(|e| PipelineError::IOError(e.to_string()))?;
    info!("Wrote {}", mapping_path.display());

    let trimming_path = layout.summary_file(TRIMMING_SUMMARY_TSV);
    write_trimming_table(&trimming_path, &trimming_rows)
        .await
        .map_err(|e| PipelineError::IOError(e.to_string()))?;
    info!("Wrote {}", trimming_path.display());

    let duplication_path = layout.summary_file(RAW_DUPLICATION_TSV);
    write_duplication_table(&duplication_path, &duplication_rows)
        .await
        .map_err(|e| PipelineError::IOError(e.to_string()))?;
    info!("Wrote {}", duplication_path.display());

    Ok(())
}


/// Reads the mapping and trimming tables back and renders one bar chart each.
/// A chart with no plottable rows is skipped with a warning.
pub async fn render_plots(layout: &OutputLayout) -> Result<(), PipelineError> {
    let mapping_path = layout.summary_file(MAPPING_SUMMARY_TSV);
    let mapping_rows = read_mapping_table(&mapping_path)
        .await
        .map_err(|e| PipelineError::ReportParse { path: mapping_path.clone(), error: e.to_string() })?;
    let mapping_plot = layout.summary_file(MAPPING_PLOT);
    match plot_mapping_rates(&mapping_rows, &mapping_plot) {
        Ok(()) => info!("Wrote {}", mapping_plot.display()),
        Err(e) => warn!("Mapping rate plot skipped: {}", e),
    }

    let trimming_path = layout.summary_file(TRIMMING_SUMMARY_TSV);
    let trimming_rows = read_trimming_table(&trimming_path)
        .await
        .map_err(|e| PipelineError::ReportParse { path: trimming_path.clone(), error: e.to_string() })?;
    let kept_plot = layout.summary_file(KEPT_READS_PLOT);
    match plot_kept_reads(&trimming_rows, &kept_plot) {
        Ok(()) => info!("Wrote {}", kept_plot.display()),
        Err(e) => warn!("Kept reads plot skipped: {}", e),
    }

    Ok(())
}


/// Sample names inferred from `<sample>_fastp.json` and `<sample>_flagstat.txt` files.
pub fn discover_samples(layout: &OutputLayout) -> Vec<String> {
    let mut found = BTreeSet::new();
    for (dir, suffix) in [
        (&layout.trimmed_dir, "_fastp.json"),
        (&layout.align_dir, "_flagstat.txt"),
    ] {
        let entries = match std::fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(_) => continue,
        };
        for entry in entries.flatten() {
            let name = entry.file_name().to_string_lossy().into_owned();
            if let Some(sample) = name.strip_suffix(suffix) {
                if !sample.is_empty() {
                    found.insert(sample.to_string());
                }
            }
        }
    }
    found.into_iter().collect()
}


/// Run function for rebuilding tables and plots from an existing output directory
///
/// # Arguments
///
/// * `config` - RunConfig struct from main.
///
/// # Returns
/// Result<(), PipelineError>
pub async fn run(config: Arc<RunConfig>) -> Result<(), PipelineError> {
    println!("\n-------------\n Summarize\n-------------\n");
    let layout = OutputLayout::from_config(&config);

    let samples = if config.args.samples.is_empty() && config.args.sample_sheet.is_none() {
        let discovered = discover_samples(&layout);
        if discovered.is_empty() {
            return Err(PipelineError::InvalidConfig(format!(
                "No samples given and no fastp/flagstat reports found under {}",
                layout.root.display()
            )));
        }
        info!("Discovered {} samples: {}", discovered.len(), discovered.join(", "));
        discovered
    } else {
        resolve_samples(&config.args, &config.cwd)?
    };

    std::fs::create_dir_all(&layout.summary_dir)?;
    write_summary_tables(&layout, &samples).await?;
    if !config.args.no_plots {
        render_plots(&layout).await?;
    }

    println!("Finished summarize.");
    Ok(())
}

