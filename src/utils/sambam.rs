/// Scraping of samtools text reports
use std::path::Path;

use anyhow::Result;
use lazy_static::lazy_static;
use log::warn;
use regex::Regex;

lazy_static! {
    // 2000 + 0 in total (QC-passed reads + QC-failed reads)
    static ref TOTAL_RE: Regex = Regex::new(r"^(\d+) \+ \d+ in total").unwrap();
    // 1900 + 0 mapped (95.00% : N/A)   (older releases: "mapped (95.00%:-nan%)")
    static ref MAPPED_RE: Regex = Regex::new(r"^(\d+) \+ \d+ mapped \(([^%:)]*)").unwrap();
}


/// Values pulled from a `samtools flagstat` report. `None` marks a missing field.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FlagstatSummary {
    pub total_reads: Option<u64>,
    pub mapped_reads: Option<u64>,
    pub mapping_percent: Option<f64>,
}


/// Parses flagstat text.
///
/// # Arguments
///
/// * `text` - Entire flagstat output.
///
/// # Returns
/// FlagstatSummary with each field present only if its line was found.
pub fn parse_flagstat(text: &str) -> FlagstatSummary {
    let mut summary = FlagstatSummary::default();

    for line in text.lines() {
        let line = line.trim();
        if summary.total_reads.is_none() {
            if let Some(caps) = TOTAL_RE.captures(line) {
                summary.total_reads = caps[1].parse().ok();
                continue;
            }
        }
        // The first "mapped (" line is the overall count; "primary mapped" follows it.
        if summary.mapped_reads.is_none() {
            if let Some(caps) = MAPPED_RE.captures(line) {
                summary.mapped_reads = caps[1].parse().ok();
                summary.mapping_percent = caps[2].trim().parse::<f64>().ok().filter(|p| p.is_finite());
            }
        }
    }

    summary
}


/// Reads and parses a flagstat file. An unreadable file yields an all-`None` summary.
pub async fn read_flagstat(path: &Path) -> Result<FlagstatSummary> {
    match tokio::fs::read_to_string(path).await {
        Ok(text) => Ok(parse_flagstat(&text)),
        Err(e) => {
            warn!("Could not read flagstat report {}: {}", path.display(), e);
            Ok(FlagstatSummary::default())
        }
    }
}
