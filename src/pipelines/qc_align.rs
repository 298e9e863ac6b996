use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{debug, info};

use crate::config::defs::{
    Mate, PipelineError, RunConfig, SamtoolsSubcommand, FASTP_TAG, FASTQC_TAG, HISAT2_BUILD_TAG,
    HISAT2_TAG, MULTIQC_TAG, SAMTOOLS_TAG, WGET_TAG,
};
use crate::pipelines::fetch::{fetch_samples, require_raw_pairs};
use crate::pipelines::summarize::{render_plots, write_summary_tables};
use crate::utils::command::fastp::FastpConfig;
use crate::utils::command::fastqc::FastqcConfig;
use crate::utils::command::hisat2::Hisat2Config;
use crate::utils::command::hisat2_build::Hisat2BuildConfig;
use crate::utils::command::multiqc::MultiqcConfig;
use crate::utils::command::samtools::SamtoolsConfig;
use crate::utils::command::{check_versions, generate_cli};
use crate::utils::download::{resolve_samples, validate_accessions};
use crate::utils::fastq::verify_pair_counts;
use crate::utils::file::{hisat2_index_exists, require_file, resolve_path, OutputLayout};
use crate::utils::streams::{pipe_cmds, run_cmd, run_cmd_to_file};


/// Reference inputs for alignment: an index prefix plus, when the index still has to
/// be built, the FASTA it is built from.
#[derive(Debug, Clone)]
pub struct AlignmentTarget {
    pub index_prefix: PathBuf,
    pub reference: Option<PathBuf>,
}


fn cli_for<T: std::any::Any>(tool: &str, config: &RunConfig, view: &T) -> Result<Vec<String>, PipelineError> {
    generate_cli(tool, config, Some(view)).map_err(|e| PipelineError::ToolExecution {
        tool: tool.to_string(),
        error: e.to_string(),
    })
}


/// Picks the HISAT2 index and checks the reference when the index must be built.
///
/// # Arguments
///
/// * `config` - RunConfig struct from main.
/// * `layout` - Output tree of the run.
///
/// # Returns
/// AlignmentTarget, or `MissingInput` for an absent reference.
pub fn resolve_alignment_target(config: &RunConfig, layout: &OutputLayout) -> Result<AlignmentTarget, PipelineError> {
    let index_prefix = match &config.args.hisat2_index {
        Some(prefix) => resolve_path(prefix, &config.cwd),
        None => layout.hisat2_index_prefix(),
    };
    if hisat2_index_exists(&index_prefix) {
        info!("Using existing HISAT2 index {}", index_prefix.display());
        return Ok(AlignmentTarget { index_prefix, reference: None });
    }

    let reference = config
        .args
        .reference
        .as_ref()
        .map(|r| resolve_path(r, &config.cwd))
        .ok_or_else(|| {
            PipelineError::InvalidConfig(format!(
                "No HISAT2 index at {} and no --reference to build one",
                index_prefix.display()
            ))
        })?;
    require_file(&reference)?;
    Ok(AlignmentTarget { index_prefix, reference: Some(reference) })
}


async fn run_fastqc(config: &RunConfig, inputs: Vec<PathBuf>, out_dir: &Path) -> Result<(), PipelineError> {
    let fastqc_config = FastqcConfig { out_dir: out_dir.to_path_buf(), inputs };
    let args = cli_for(FASTQC_TAG, config, &fastqc_config)?;
    run_cmd(FASTQC_TAG, args).await?;
    Ok(())
}


async fn run_multiqc(config: &RunConfig, in_dir: &Path, out_dir: &Path, title: &str) -> Result<(), PipelineError> {
    let multiqc_config = MultiqcConfig {
        in_dir: in_dir.to_path_buf(),
        out_dir: out_dir.to_path_buf(),
        title: Some(title.to_string()),
    };
    let args = cli_for(MULTIQC_TAG, config, &multiqc_config)?;
    run_cmd(MULTIQC_TAG, args).await?;
    Ok(())
}


/// FastQC over every file of `samples`, then one MultiQC report for the directory.
pub async fn quality_report(
    config: &RunConfig,
    samples: &[String],
    fastq_for: impl Fn(&str, Mate) -> PathBuf,
    fastqc_dir: &Path,
    multiqc_dir: &Path,
    title: &str,
) -> Result<(), PipelineError> {
    let inputs: Vec<PathBuf> = samples
        .iter()
        .flat_map(|s| Mate::BOTH.into_iter().map(|mate| fastq_for(s.as_str(), mate)).collect::<Vec<_>>())
        .collect();
    info!("FastQC on {} files -> {}", inputs.len(), fastqc_dir.display());
    run_fastqc(config, inputs, fastqc_dir).await?;
    info!("MultiQC ({}) -> {}", title, multiqc_dir.display());
    run_multiqc(config, fastqc_dir, multiqc_dir, title).await
}


/// Adapter and quality trimming of one pair with fastp.
pub async fn trim_sample(config: &RunConfig, layout: &OutputLayout, sample: &str) -> Result<(), PipelineError> {
    let fastp_config = FastpConfig {
        in1: layout.raw_fastq(sample, Mate::R1),
        in2: layout.raw_fastq(sample, Mate::R2),
        out1: layout.trimmed_fastq(sample, Mate::R1),
        out2: layout.trimmed_fastq(sample, Mate::R2),
        json: layout.fastp_json(sample),
        html: layout.fastp_html(sample),
        command_fields: vec![
            ("--detect_adapter_for_pe".to_string(), None),
            ("--report_title".to_string(), Some(sample.to_string())),
        ],
    };
    let args = cli_for(FASTP_TAG, config, &fastp_config)?;
    run_cmd(FASTP_TAG, args).await?;
    require_file(&fastp_config.json)?;
    Ok(())
}


/// Builds the HISAT2 index unless one already exists at the target prefix.
pub async fn ensure_index(config: &RunConfig, target: &AlignmentTarget) -> Result<(), PipelineError> {
    if hisat2_index_exists(&target.index_prefix) {
        return Ok(());
    }
    let reference = target
        .reference
        .clone()
        .ok_or_else(|| PipelineError::MissingInput(target.index_prefix.clone()))?;
    if let Some(parent) = target.index_prefix.parent() {
        std::fs::create_dir_all(parent)?;
    }

    info!("Building HISAT2 index {} from {}", target.index_prefix.display(), reference.display());
    let build_config = Hisat2BuildConfig { reference, index_prefix: target.index_prefix.clone() };
    let args = cli_for(HISAT2_BUILD_TAG, config, &build_config)?;
    run_cmd(HISAT2_BUILD_TAG, args).await?;

    if !hisat2_index_exists(&target.index_prefix) {
        return Err(PipelineError::ToolExecution {
            tool: HISAT2_BUILD_TAG.to_string(),
            error: format!("no index files written at {}", target.index_prefix.display()),
        });
    }
    Ok(())
}


/// hisat2 | samtools sort, then samtools index and samtools flagstat.
///
/// # Arguments
///
/// * `config` - RunConfig struct from main.
/// * `layout` - Output tree of the run.
/// * `index_prefix` - HISAT2 index.
/// * `sample` - Sample name.
///
/// # Returns
/// Result<(), PipelineError>
pub async fn align_sample(
    config: &RunConfig,
    layout: &OutputLayout,
    index_prefix: &Path,
    sample: &str,
) -> Result<(), PipelineError> {
    let bam = layout.bam(sample);
    let bam_str = bam.to_string_lossy().to_string();

    let hisat2_config = Hisat2Config {
        index_prefix: index_prefix.to_path_buf(),
        r1: layout.trimmed_fastq(sample, Mate::R1),
        r2: layout.trimmed_fastq(sample, Mate::R2),
        option_fields: vec![
            ("--rg-id".to_string(), Some(sample.to_string())),
            ("--rg".to_string(), Some(format!("SM:{}", sample))),
        ],
    };
    let hisat2_args = cli_for(HISAT2_TAG, config, &hisat2_config)?;

    let sort_config = SamtoolsConfig {
        subcommand: SamtoolsSubcommand::Sort,
        subcommand_fields: vec![
            ("-o".to_string(), Some(bam_str.clone())),
            ("-".to_string(), None),
        ],
    };
    let sort_args = cli_for(SAMTOOLS_TAG, config, &sort_config)?;

    info!("Aligning {} -> {}", sample, bam.display());
    pipe_cmds((HISAT2_TAG, hisat2_args), (SAMTOOLS_TAG, sort_args)).await?;
    require_file(&bam)?;

    let index_config = SamtoolsConfig {
        subcommand: SamtoolsSubcommand::Index,
        subcommand_fields: vec![(bam_str.clone(), None)],
    };
    run_cmd(SAMTOOLS_TAG, cli_for(SAMTOOLS_TAG, config, &index_config)?).await?;

    let flagstat_config = SamtoolsConfig {
        subcommand: SamtoolsSubcommand::Flagstat,
        subcommand_fields: vec![(bam_str, None)],
    };
    let flagstat_path = layout.flagstat(sample);
    run_cmd_to_file(SAMTOOLS_TAG, cli_for(SAMTOOLS_TAG, config, &flagstat_config)?, &flagstat_path).await?;
    debug!("Wrote {}", flagstat_path.display());
    Ok(())
}


/// Run function for paired-end QC, trimming and alignment
///
/// # Arguments
///
/// * `config` - RunConfig struct from main.
///
/// # Returns
/// Result<(), PipelineError>
pub async fn run(config: Arc<RunConfig>) -> Result<(), PipelineError> {
    println!("\n-------------\n QC + Align\n-------------\n");

    // Inputs are validated before any tool is spawned or directory created.
    let samples = resolve_samples(&config.args, &config.cwd)?;
    if !config.args.skip_download {
        validate_accessions(&config.args.ena_base, &samples)?;
    }
    let layout = OutputLayout::from_config(&config);
    let target = resolve_alignment_target(&config, &layout)?;
    if config.args.skip_download {
        require_raw_pairs(&layout, &samples)?;
    }
    info!("{} samples: {}", samples.len(), samples.join(", "));

    let mut tools = vec![FASTQC_TAG, MULTIQC_TAG, FASTP_TAG, HISAT2_TAG, SAMTOOLS_TAG];
    if target.reference.is_some() {
        tools.push(HISAT2_BUILD_TAG);
    }
    if !config.args.skip_download {
        tools.push(WGET_TAG);
    }
    check_versions(tools).await?;

    layout.create_all()?;

    if config.args.skip_download {
        info!("Skipping download; using reads in {}", layout.raw_dir.display());
    } else {
        fetch_samples(&config, &layout, &samples).await?;
    }

    if config.args.verify_pairs {
        for sample in &samples {
            verify_pair_counts(layout.raw_fastq(sample, Mate::R1), layout.raw_fastq(sample, Mate::R2)).await?;
        }
    }

    quality_report(
        &config,
        &samples,
        |s, mate| layout.raw_fastq(s, mate),
        &layout.fastqc_raw_dir,
        &layout.multiqc_raw_dir,
        "Raw reads",
    )
    .await?;

    for (i, sample) in samples.iter().enumerate() {
        info!("[{}/{}] Trimming {}", i + 1, samples.len(), sample);
        trim_sample(&config, &layout, sample).await?;
    }

    quality_report(
        &config,
        &samples,
        |s, mate| layout.trimmed_fastq(s, mate),
        &layout.fastqc_trimmed_dir,
        &layout.multiqc_trimmed_dir,
        "Trimmed reads",
    )
    .await?;

    ensure_index(&config, &target).await?;

    for (i, sample) in samples.iter().enumerate() {
        info!("[{}/{}] Aligning {}", i + 1, samples.len(), sample);
        align_sample(&config, &layout, &target.index_prefix, sample).await?;
    }

    write_summary_tables(&layout, &samples).await?;
    if !config.args.no_plots {
        render_plots(&layout).await?;
    }

    println!("Finished qc_align: outputs in {}", layout.root.display());
    Ok(())
}


#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use clap::Parser;
    use crate::cli::Arguments;

    fn config_in(dir: &Path, extra: &[&str]) -> RunConfig {
        let mut argv = vec!["readqc-pipelines", "-m", "qc_align", "-s", "SRR000001"];
        argv.extend_from_slice(extra);
        let args = Arguments::try_parse_from(argv).expect("valid test arguments");
        RunConfig {
            cwd: dir.to_path_buf(),
            out_dir: dir.join("out"),
            threads: 2,
            args,
        }
    }

    #[test]
    fn test_target_requires_reference() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let config = config_in(dir.path(), &["-r", "missing.fa"]);
        let layout = OutputLayout::from_config(&config);
        match resolve_alignment_target(&config, &layout) {
            Err(PipelineError::MissingInput(path)) => assert_eq!(path, dir.path().join("missing.fa")),
            other => panic!("Expected MissingInput, got {:?}", other),
        }

        let config = config_in(dir.path(), &[]);
        assert!(matches!(
            resolve_alignment_target(&config, &layout),
            Err(PipelineError::InvalidConfig(_))
        ));
        Ok(())
    }

    #[test]
    fn test_target_prefers_existing_index() -> Result<()> {
        let dir = tempfile::tempdir()?;
        std::fs::create_dir_all(dir.path().join("idx"))?;
        for part in 1..=8 {
            std::fs::write(dir.path().join(format!("idx/hg.{}.ht2", part)), b"index")?;
        }

        let config = config_in(dir.path(), &["--hisat2-index", "idx/hg"]);
        let layout = OutputLayout::from_config(&config);
        let target = resolve_alignment_target(&config, &layout)?;
        assert_eq!(target.index_prefix, dir.path().join("idx/hg"));
        assert!(target.reference.is_none());
        Ok(())
    }

    #[test]
    fn test_partial_index_needs_reference() -> Result<()> {
        let dir = tempfile::tempdir()?;
        std::fs::create_dir_all(dir.path().join("idx"))?;
        std::fs::write(dir.path().join("idx/hg.1.ht2"), b"index")?;
        std::fs::write(dir.path().join("ref.fa"), b">chr1\nACGT\n")?;

        let config = config_in(dir.path(), &["--hisat2-index", "idx/hg", "-r", "ref.fa"]);
        let layout = OutputLayout::from_config(&config);
        let target = resolve_alignment_target(&config, &layout)?;
        assert_eq!(target.reference, Some(dir.path().join("ref.fa")), "A partial index is rebuilt");
        Ok(())
    }

    #[test]
    fn test_target_builds_into_layout() -> Result<()> {
        let dir = tempfile::tempdir()?;
        std::fs::write(dir.path().join("ref.fa"), b">chr1\nACGT\n")?;
        let config = config_in(dir.path(), &["-r", "ref.fa"]);
        let layout = OutputLayout::from_config(&config);
        let target = resolve_alignment_target(&config, &layout)?;
        assert_eq!(target.index_prefix, dir.path().join("out/index/genome"));
        assert_eq!(target.reference, Some(dir.path().join("ref.fa")));
        Ok(())
    }

    #[tokio::test]
    async fn test_run_aborts_on_missing_raw_reads() -> Result<()> {
        let dir = tempfile::tempdir()?;
        std::fs::write(dir.path().join("ref.fa"), b">chr1\nACGT\n")?;
        let config = Arc::new(config_in(dir.path(), &["-r", "ref.fa", "--skip-download"]));
        match run(config).await {
            Err(PipelineError::MissingInput(path)) => {
                assert!(path.ends_with("raw/SRR000001_1.fastq.gz"), "unexpected path {:?}", path)
            }
            other => panic!("Expected MissingInput, got {:?}", other),
        }
        assert!(!dir.path().join("out/summary").exists(), "No outputs before validation passes");
        Ok(())
    }
}
