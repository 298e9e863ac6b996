// Sample resolution and ENA FASTQ downloads
use std::path::Path;

use anyhow::{anyhow, Result};
use lazy_static::lazy_static;
use log::{info, warn};
use regex::Regex;

use crate::cli::Arguments;
use crate::config::defs::{Mate, PipelineError, RunConfig, WGET_TAG};
use crate::utils::command::generate_cli;
use crate::utils::command::wget::WgetConfig;
use crate::utils::file::{non_empty_file, resolve_path, OutputLayout};
use crate::utils::streams::run_cmd;

lazy_static! {
    static ref RUN_ACCESSION_RE: Regex = Regex::new(r"^[SED]RR(\d{6,9})$").unwrap();
}


/// Collects samples from `--samples` and `--sample-sheet`, keeping first-seen order.
///
/// # Arguments
///
/// * `args` - Parsed CLI arguments.
/// * `cwd` - Directory relative sheet paths are resolved against.
///
/// # Returns
/// Non-empty list of unique sample names.
pub fn resolve_samples(args: &Arguments, cwd: &Path) -> Result<Vec<String>, PipelineError> {
    let mut candidates: Vec<String> = args.samples.iter().map(|s| s.trim().to_string()).collect();

    if let Some(sheet) = &args.sample_sheet {
        let sheet_path = resolve_path(sheet, cwd);
        let text = std::fs::read_to_string(&sheet_path)
            .map_err(|_| PipelineError::MissingInput(sheet_path.clone()))?;
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            // First column only; sheets often carry extra metadata.
            if let Some(sample) = line.split(|c: char| c == '\t' || c == ',').next() {
                candidates.push(sample.trim().to_string());
            }
        }
    }

    let mut samples: Vec<String> = Vec::new();
    for sample in candidates {
        if sample.is_empty() {
            continue;
        }
        if sample.contains('/') || sample.contains('\\') || sample.chars().any(char::is_whitespace) {
            return Err(PipelineError::InvalidConfig(format!("Invalid sample name: '{}'", sample)));
        }
        if !samples.contains(&sample) {
            samples.push(sample);
        }
    }

    if samples.is_empty() {
        return Err(PipelineError::InvalidConfig(
            "No samples given; use --samples or --sample-sheet".to_string(),
        ));
    }
    Ok(samples)
}


/// ENA FASTQ URL for a run accession and mate.
///
/// ENA groups runs by the first six characters, then (for accessions with more than
/// six digits) by a sub-directory built from the trailing digits.
pub fn ena_fastq_url(base: &str, accession: &str, mate: Mate) -> Result<String> {
    let caps = RUN_ACCESSION_RE
        .captures(accession)
        .ok_or_else(|| anyhow!("'{}' is not an SRA/ENA/DDBJ run accession", accession))?;
    let digits = &caps[1];
    let prefix = &accession[..6];

    let sub_dir = match digits.len() {
        6 => None,
        7 => Some(format!("00{}", &digits[6..])),
        8 => Some(format!("0{}", &digits[6..])),
        _ => Some(digits[6..].to_string()),
    };

    let base = base.trim_end_matches('/');
    let file = format!("{}_{}.fastq.gz", accession, mate.suffix());
    Ok(match sub_dir {
        Some(sub) => format!("{}/{}/{}/{}/{}", base, prefix, sub, accession, file),
        None => format!("{}/{}/{}/{}", base, prefix, accession, file),
    })
}


/// Checks every sample is a run accession ENA can serve, before anything is fetched.
pub fn validate_accessions(base: &str, samples: &[String]) -> Result<(), PipelineError> {
    for sample in samples {
        ena_fastq_url(base, sample, Mate::R1)
            .map_err(|e| PipelineError::InvalidConfig(e.to_string()))?;
    }
    Ok(())
}


/// Downloads both mates of a sample into the raw directory unless already present.
pub async fn download_sample(
    config: &RunConfig,
    layout: &OutputLayout,
    sample: &str,
) -> Result<(), PipelineError> {
    for mate in Mate::BOTH {
        let dest = layout.raw_fastq(sample, mate);
        if non_empty_file(&dest) {
            info!("{} already present, skipping download", dest.display());
            continue;
        }

        let url = ena_fastq_url(&config.args.ena_base, sample, mate)
            .map_err(|e| PipelineError::InvalidConfig(e.to_string()))?;
        info!("Downloading {} -> {}", url, dest.display());

        let wget_config = WgetConfig { url, dest: dest.clone() };
        let wget_args = generate_cli(WGET_TAG, config, Some(&wget_config))
            .map_err(|e| PipelineError::ToolExecution {
                tool: WGET_TAG.to_string(),
                error: e.to_string(),
            })?;
        if let Err(e) = run_cmd(WGET_TAG, wget_args).await {
            // wget -O leaves an empty file behind on failure
            if dest.exists() && !non_empty_file(&dest) {
                if let Err(rm) = std::fs::remove_file(&dest) {
                    warn!("Could not remove partial download {}: {}", dest.display(), rm);
                }
            }
            return Err(e);
        }
    }
    Ok(())
}


#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    const ENA: &str = "ftp://ftp.sra.ebi.ac.uk/vol1/fastq";

    #[test]
    fn test_ena_fastq_url_layouts() -> Result<()> {
        assert_eq!(
            ena_fastq_url(ENA, "SRR123456", Mate::R1)?,
            "ftp://ftp.sra.ebi.ac.uk/vol1/fastq/SRR123/SRR123456/SRR123456_1.fastq.gz"
        );
        assert_eq!(
            ena_fastq_url(ENA, "SRR1234567", Mate::R2)?,
            "ftp://ftp.sra.ebi.ac.uk/vol1/fastq/SRR123/007/SRR1234567/SRR1234567_2.fastq.gz"
        );
        assert_eq!(
            ena_fastq_url(&format!("{}/", ENA), "ERR12345678", Mate::R1)?,
            "ftp://ftp.sra.ebi.ac.uk/vol1/fastq/ERR123/078/ERR12345678/ERR12345678_1.fastq.gz"
        );
        assert_eq!(
            ena_fastq_url(ENA, "DRR123456789", Mate::R1)?,
            "ftp://ftp.sra.ebi.ac.uk/vol1/fastq/DRR123/789/DRR123456789/DRR123456789_1.fastq.gz"
        );
        Ok(())
    }

    #[test]
    fn test_ena_fastq_url_rejects_non_runs() {
        assert!(ena_fastq_url(ENA, "SRX123456", Mate::R1).is_err());
        assert!(ena_fastq_url(ENA, "SRR12345", Mate::R1).is_err());
        assert!(ena_fastq_url(ENA, "sample_A", Mate::R1).is_err());
    }

    #[test]
    fn test_validate_accessions() {
        let good = vec!["SRR000001".to_string(), "ERR1234567".to_string()];
        assert!(validate_accessions(ENA, &good).is_ok());

        let mixed = vec!["SRR000001".to_string(), "SRR000002".to_string(), "not_an_accession".to_string()];
        match validate_accessions(ENA, &mixed) {
            Err(PipelineError::InvalidConfig(msg)) => assert!(msg.contains("not_an_accession"), "{}", msg),
            other => panic!("Expected InvalidConfig, got {:?}", other),
        }
    }

    #[test]
    fn test_resolve_samples_merges_and_dedups() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let sheet = dir.path().join("samples.txt");
        std::fs::write(&sheet, "# accession\tcondition\nSRR2\tcontrol\n\nSRR3,treated\nSRR1\n")?;

        let args = Arguments::try_parse_from([
            "readqc-pipelines", "-m", "fetch", "-s", "SRR1,SRR2", "--sample-sheet", "samples.txt",
        ])?;
        let samples = resolve_samples(&args, dir.path())?;
        assert_eq!(samples, vec!["SRR1", "SRR2", "SRR3"]);
        Ok(())
    }

    #[test]
    fn test_resolve_samples_errors() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let args = Arguments::try_parse_from(["readqc-pipelines", "-m", "fetch"])?;
        assert!(matches!(resolve_samples(&args, dir.path()), Err(PipelineError::InvalidConfig(_))));

        let args = Arguments::try_parse_from(["readqc-pipelines", "-m", "fetch", "-s", "../etc"])?;
        assert!(matches!(resolve_samples(&args, dir.path()), Err(PipelineError::InvalidConfig(_))));

        let args = Arguments::try_parse_from(["readqc-pipelines", "-m", "fetch", "--sample-sheet", "nope.txt"])?;
        assert!(matches!(resolve_samples(&args, dir.path()), Err(PipelineError::MissingInput(_))));
        Ok(())
    }
}
