// Summary TSVs: one row per sample, `NA` for anything the reports did not contain.
use std::fmt::Display;
use std::path::Path;

use anyhow::{anyhow, Result};
use tokio::fs::File;
use tokio::io::AsyncWriteExt;

use crate::config::defs::NA;
use crate::utils::metrics::{DuplicationSummary, TrimmingSummary};
use crate::utils::sambam::FlagstatSummary;

pub const MAPPING_HEADER: &str = "sample\ttotal_reads\tmapped_reads\tmapping_percent";
pub const TRIMMING_HEADER: &str = "sample\traw_read_pairs\tcleaned_read_pairs\tkept_percent";
pub const DUPLICATION_HEADER: &str = "sample\tr1_dedup_percent\tr2_dedup_percent\tduplication_rate";


#[derive(Debug, Clone, PartialEq)]
pub struct MappingRow {
    pub sample: String,
    pub stats: FlagstatSummary,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrimmingRow {
    pub sample: String,
    pub stats: TrimmingSummary,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DuplicationRow {
    pub sample: String,
    pub stats: DuplicationSummary,
}


fn count_cell<T: Display>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_else(|| NA.to_string())
}

fn percent_cell(value: Option<f64>) -> String {
    value.map(|v| format!("{:.2}", v)).unwrap_or_else(|| NA.to_string())
}


impl MappingRow {
    pub fn to_tsv_line(&self) -> String {
        format!(
            "{}\t{}\t{}\t{}",
            self.sample,
            count_cell(self.stats.total_reads),
            count_cell(self.stats.mapped_reads),
            percent_cell(self.stats.mapping_percent)
        )
    }
}

impl TrimmingRow {
    pub fn to_tsv_line(&self) -> String {
        format!(
            "{}\t{}\t{}\t{}",
            self.sample,
            count_cell(self.stats.raw_read_pairs),
            count_cell(self.stats.cleaned_read_pairs),
            percent_cell(self.stats.kept_percent)
        )
    }
}

impl DuplicationRow {
    pub fn to_tsv_line(&self) -> String {
        format!(
            "{}\t{}\t{}\t{}",
            self.sample,
            percent_cell(self.stats.r1_dedup_percent),
            percent_cell(self.stats.r2_dedup_percent),
            percent_cell(self.stats.duplication_rate)
        )
    }
}


async fn write_tsv(path: &Path, header: &str, lines: Vec<String>) -> Result<()> {
    let mut content = String::with_capacity(64 * (lines.len() + 1));
    content.push_str(header);
    content.push('\n');
    for line in lines {
        content.push_str(&line);
        content.push('\n');
    }

    let mut file = File::create(path).await
        .map_err(|e| anyhow!("Failed to create output file {}: {}", path.display(), e))?;
    file.write_all(content.as_bytes()).await
        .map_err(|e| anyhow!("Failed to write to output file {}: {}", path.display(), e))?;
    file.flush().await
        .map_err(|e| anyhow!("Failed to flush output file {}: {}", path.display(), e))?;
    Ok(())
}

pub async fn write_mapping_table(path: &Path, rows: &[MappingRow]) -> Result<()> {
    write_tsv(path, MAPPING_HEADER, rows.iter().map(MappingRow::to_tsv_line).collect()).await
}

pub async fn write_trimming_table(path: &Path, rows: &[TrimmingRow]) -> Result<()> {
    write_tsv(path, TRIMMING_HEADER, rows.iter().map(TrimmingRow::to_tsv_line).collect()).await
}

pub async fn write_duplication_table(path: &Path, rows: &[DuplicationRow]) -> Result<()> {
    write_tsv(path, DUPLICATION_HEADER, rows.iter().map(DuplicationRow::to_tsv_line).collect()).await
}


fn parse_cell<T: std::str::FromStr>(cell: &str, column: &str, line_no: usize) -> Result<Option<T>> {
    let cell = cell.trim();
    if cell == NA {
        return Ok(None);
    }
    cell.parse::<T>()
        .map(Some)
        .map_err(|_| anyhow!("Invalid {} value '{}' on line {}", column, cell, line_no))
}

/// Splits a table into data rows of exactly four cells, checking the header.
fn table_rows<'a>(text: &'a str, header: &str) -> Result<Vec<(usize, [&'a str; 4])>> {
    let mut lines = text.lines().enumerate();
    match lines.next() {
        Some((_, first)) if first.trim_end() == header => {}
        Some((_, first)) => return Err(anyhow!("Unexpected table header: {}", first)),
        None => return Err(anyhow!("Empty table")),
    }

    let mut rows = Vec::new();
    for (idx, line) in lines {
        if line.trim().is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() != 4 {
            return Err(anyhow!(
                "Expected 4 columns, found {} on line {}: '{}'",
                fields.len(),
                idx + 1,
                line
            ));
        }
        rows.push((idx + 1, [fields[0], fields[1], fields[2], fields[3]]));
    }
    Ok(rows)
}

pub fn parse_mapping_table(text: &str) -> Result<Vec<MappingRow>> {
    table_rows(text, MAPPING_HEADER)?
        .into_iter()
        .map(|(line_no, [sample, total, mapped, percent])| -> Result<MappingRow> {
            Ok(MappingRow {
                sample: sample.to_string(),
                stats: FlagstatSummary {
                    total_reads: parse_cell(total, "total_reads", line_no)?,
                    mapped_reads: parse_cell(mapped, "mapped_reads", line_no)?,
                    mapping_percent: parse_cell(percent, "mapping_percent", line_no)?,
                },
            })
        })
        .collect()
}

pub fn parse_trimming_table(text: &str) -> Result<Vec<TrimmingRow>> {
    table_rows(text, TRIMMING_HEADER)?
        .into_iter()
        .map(|(line_no, [sample, raw, cleaned, kept])| -> Result<TrimmingRow> {
            Ok(TrimmingRow {
                sample: sample.to_string(),
                stats: TrimmingSummary {
                    raw_read_pairs: parse_cell(raw, "raw_read_pairs", line_no)?,
                    cleaned_read_pairs: parse_cell(cleaned, "cleaned_read_pairs", line_no)?,
                    kept_percent: parse_cell(kept, "kept_percent", line_no)?,
                },
            })
        })
        .collect()
}

pub async fn read_mapping_table(path: &Path) -> Result<Vec<MappingRow>> {
    let text = tokio::fs::read_to_string(path).await
        .map_err(|e| anyhow!("Failed to read {}: {}", path.display(), e))?;
    parse_mapping_table(&text)
}

pub async fn read_trimming_table(path: &Path) -> Result<Vec<TrimmingRow>> {
    let text = tokio::fs::read_to_string(path).await
        .map_err(|e| anyhow!("Failed to read {}: {}", path.display(), e))?;
    parse_trimming_table(&text)
}
