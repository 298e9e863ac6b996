use std::path::Path;

use anyhow::Result;
use log::warn;
use serde::Deserialize;


/// Subset of the fastp JSON report that the trimming table needs.
#[derive(Debug, Deserialize, Default)]
pub struct FastpReport {
    #[serde(default)]
    pub summary: Option<FastpSummary>,
}

#[derive(Debug, Deserialize, Default)]
pub struct FastpSummary {
    #[serde(default)]
    pub before_filtering: Option<FilteringStats>,
    #[serde(default)]
    pub after_filtering: Option<FilteringStats>,
}

#[derive(Debug, Deserialize, Default)]
pub struct FilteringStats {
    #[serde(default)]
    pub total_reads: Option<u64>,
    #[serde(default)]
    pub total_bases: Option<u64>,
    #[serde(default)]
    pub q30_rate: Option<f64>,
}


#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrimmingSummary {
    pub raw_read_pairs: Option<u64>,
    pub cleaned_read_pairs: Option<u64>,
    pub kept_percent: Option<f64>,
}


#[derive(Debug, Clone, Default, PartialEq)]
pub struct FastqcData {
    pub total_sequences: Option<u64>,
    pub total_deduplicated_percentage: Option<f64>,
}


#[derive(Debug, Clone, Default, PartialEq)]
pub struct DuplicationSummary {
    pub r1_dedup_percent: Option<f64>,
    pub r2_dedup_percent: Option<f64>,
    pub duplication_rate: Option<f64>,
}


/// Rounds to two decimal places, the precision of every percentage column.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}


/// 100 × cleaned / raw, rounded to two decimals. `None` when raw is zero.
pub fn kept_percent(raw: u64, cleaned: u64) -> Option<f64> {
    if raw == 0 {
        return None;
    }
    Some(round2(100.0 * cleaned as f64 / raw as f64))
}


/// Converts a parsed fastp report into read-pair counts.
/// fastp counts both mates in `total_reads`, so pairs are half of it.
pub fn trimming_summary(report: &FastpReport) -> TrimmingSummary {
    let summary = match &report.summary {
        Some(s) => s,
        None => return TrimmingSummary::default(),
    };
    let raw_read_pairs = summary
        .before_filtering
        .as_ref()
        .and_then(|b| b.total_reads)
        .map(|reads| reads / 2);
    let cleaned_read_pairs = summary
        .after_filtering
        .as_ref()
        .and_then(|a| a.total_reads)
        .map(|reads| reads / 2);
    let kept = match (raw_read_pairs, cleaned_read_pairs) {
        (Some(raw), Some(cleaned)) => kept_percent(raw, cleaned),
        _ => None,
    };

    TrimmingSummary {
        raw_read_pairs,
        cleaned_read_pairs,
        kept_percent: kept,
    }
}


/// Parses fastp JSON text. Malformed JSON is reported and treated as an empty report.
pub fn parse_fastp_report(json: &str) -> TrimmingSummary {
    match serde_json::from_str::<FastpReport>(json) {
        Ok(report) => trimming_summary(&report),
        Err(e) => {
            warn!("Malformed fastp report: {}", e);
            TrimmingSummary::default()
        }
    }
}


pub async fn read_fastp_report(path: &Path) -> Result<TrimmingSummary> {
    match tokio::fs::read_to_string(path).await {
        Ok(json) => Ok(parse_fastp_report(&json)),
        Err(e) => {
            warn!("Could not read fastp report {}: {}", path.display(), e);
            Ok(TrimmingSummary::default())
        }
    }
}


/// Pulls `Total Sequences` and `#Total Deduplicated Percentage` from a FastQC
/// `fastqc_data.txt` dump.
pub fn parse_fastqc_data(text: &str) -> FastqcData {
    let mut data = FastqcData::default();
    for line in text.lines() {
        let mut fields = line.split('\t');
        let key = fields.next().unwrap_or("").trim();
        let value = fields.next().map(str::trim);
        match (key, value) {
            ("Total Sequences", Some(v)) if data.total_sequences.is_none() => {
                data.total_sequences = v.parse().ok();
            }
            ("#Total Deduplicated Percentage", Some(v)) if data.total_deduplicated_percentage.is_none() => {
                data.total_deduplicated_percentage = v.parse::<f64>().ok().filter(|p| p.is_finite());
            }
            _ => {}
        }
    }
    data
}


pub async fn read_fastqc_data(path: &Path) -> Result<FastqcData> {
    match tokio::fs::read_to_string(path).await {
        Ok(text) => Ok(parse_fastqc_data(&text)),
        Err(e) => {
            warn!("Could not read FastQC data {}: {}", path.display(), e);
            Ok(FastqcData::default())
        }
    }
}


/// Duplication rate = 100 − mean of the per-mate deduplicated percentages.
pub fn duplication_summary(r1: &FastqcData, r2: &FastqcData) -> DuplicationSummary {
    let r1_dedup = r1.total_deduplicated_percentage;
    let r2_dedup = r2.total_deduplicated_percentage;
    let duplication_rate = match (r1_dedup, r2_dedup) {
        (Some(a), Some(b)) => Some(round2(100.0 - (a + b) / 2.0)),
        _ => None,
    };
    DuplicationSummary {
        r1_dedup_percent: r1_dedup,
        r2_dedup_percent: r2_dedup,
        duplication_rate,
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    const FASTP_JSON: &str = r#"{
        "summary": {
            "fastp_version": "0.23.4",
            "sequencing": "paired end (151 cycles + 151 cycles)",
            "before_filtering": {"total_reads": 2000, "total_bases": 302000, "q30_rate": 0.91},
            "after_filtering": {"total_reads": 1910, "total_bases": 280000, "q30_rate": 0.95}
        },
        "filtering_result": {"passed_filter_reads": 1910}
    }"#;

    #[test]
    fn test_trimming_summary_from_fastp() {
        let summary = parse_fastp_report(FASTP_JSON);
        assert_eq!(summary.raw_read_pairs, Some(1000));
        assert_eq!(summary.cleaned_read_pairs, Some(955));
        assert_eq!(summary.kept_percent, Some(95.5));
    }

    #[test]
    fn test_kept_percent_two_decimals() {
        assert_eq!(kept_percent(3, 2), Some(66.67));
        assert_eq!(kept_percent(7, 7), Some(100.0));
        assert_eq!(kept_percent(0, 0), None);
        assert_eq!(format!("{:.2}", kept_percent(1000, 955).unwrap()), "95.50");
    }

    #[test]
    fn test_fastp_missing_fields_are_absent() {
        let summary = parse_fastp_report(r#"{"summary": {"before_filtering": {"total_reads": 10}}}"#);
        assert_eq!(summary.raw_read_pairs, Some(5));
        assert_eq!(summary.cleaned_read_pairs, None);
        assert_eq!(summary.kept_percent, None);

        assert_eq!(parse_fastp_report("{not json"), TrimmingSummary::default());
        assert_eq!(parse_fastp_report("{}"), TrimmingSummary::default());
    }

    const FASTQC_DATA: &str = "\
##FastQC\t0.12.1
>>Basic Statistics\tpass
#Measure\tValue
Filename\tSRR1_1.fastq.gz
File type\tConventional base calls
Total Sequences\t250000
Sequence length\t151
%GC\t48
>>END_MODULE
>>Sequence Duplication Levels\twarn
#Total Deduplicated Percentage\t72.34
#Duplication Level\tPercentage of deduplicated\tPercentage of total
1\t85.1\t61.5
>>END_MODULE
";

    #[test]
    fn test_parse_fastqc_data() {
        let data = parse_fastqc_data(FASTQC_DATA);
        assert_eq!(data.total_sequences, Some(250000));
        assert_eq!(data.total_deduplicated_percentage, Some(72.34));
        assert_eq!(parse_fastqc_data(""), FastqcData::default());
    }

    #[test]
    fn test_duplication_rate_is_100_minus_mean() {
        let r1 = FastqcData { total_sequences: None, total_deduplicated_percentage: Some(72.34) };
        let r2 = FastqcData { total_sequences: None, total_deduplicated_percentage: Some(70.10) };
        let summary = duplication_summary(&r1, &r2);
        assert_eq!(summary.duplication_rate, Some(28.78));

        let missing = duplication_summary(&r1, &FastqcData::default());
        assert_eq!(missing.r1_dedup_percent, Some(72.34));
        assert_eq!(missing.duplication_rate, None);
    }
}
