use std::sync::Arc;

use log::info;

use crate::config::defs::{Mate, PipelineError, RunConfig, WGET_TAG};
use crate::utils::command::check_versions;
use crate::utils::download::{download_sample, resolve_samples, validate_accessions};
use crate::utils::file::{require_file, OutputLayout};


/// Downloads every sample pair into the raw directory and checks that both mates landed.
pub async fn fetch_samples(
    config: &RunConfig,
    layout: &OutputLayout,
    samples: &[String],
) -> Result<(), PipelineError> {
    for (i, sample) in samples.iter().enumerate() {
        info!("[{}/{}] Fetching {}", i + 1, samples.len(), sample);
        download_sample(config, layout, sample).await?;
    }
    require_raw_pairs(layout, samples)
}


/// Fails on the first missing raw FASTQ.
pub fn require_raw_pairs(layout: &OutputLayout, samples: &[String]) -> Result<(), PipelineError> {
    for sample in samples {
        for mate in Mate::BOTH {
            require_file(&layout.raw_fastq(sample, mate))?;
        }
    }
    Ok(())
}


/// Run function for the download-only module
///
/// # Arguments
///
/// * `config` - RunConfig struct from main.
///
/// # Returns
/// Result<(), PipelineError>
pub async fn run(config: Arc<RunConfig>) -> Result<(), PipelineError> {
    println!("\n-------------\n Fetch\n-------------\n");
    let samples = resolve_samples(&config.args, &config.cwd)?;
    validate_accessions(&config.args.ena_base, &samples)?;
    let layout = OutputLayout::from_config(&config);
    std::fs::create_dir_all(&layout.raw_dir)?;

    check_versions(vec![WGET_TAG]).await?;
    fetch_samples(&config, &layout, &samples).await?;

    println!("Fetched {} samples into {}", samples.len(), layout.raw_dir.display());
    Ok(())
}
