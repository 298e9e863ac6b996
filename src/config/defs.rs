use std::fmt;
use std::path::PathBuf;
use crate::cli::Arguments;
use lazy_static::lazy_static;
use std::collections::HashMap;

// External software
pub const FASTQC_TAG: &str = "fastqc";
pub const MULTIQC_TAG: &str = "multiqc";
pub const FASTP_TAG: &str = "fastp";
pub const HISAT2_TAG: &str = "hisat2";
pub const HISAT2_BUILD_TAG: &str = "hisat2-build";
pub const SAMTOOLS_TAG: &str = "samtools";
pub const WGET_TAG: &str = "wget";


lazy_static! {
    /// Minimum (major, minor) accepted for each external tool.
    pub static ref TOOL_VERSIONS: HashMap<&'static str, (u32, u32)> = {
        let mut m = HashMap::new();
        m.insert(FASTQC_TAG, (0, 11));
        m.insert(MULTIQC_TAG, (1, 9));
        m.insert(FASTP_TAG, (0, 20));
        m.insert(HISAT2_TAG, (2, 1));
        m.insert(HISAT2_BUILD_TAG, (2, 1));
        m.insert(SAMTOOLS_TAG, (1, 10)); // flagstat layout with "primary mapped" lines
        m.insert(WGET_TAG, (1, 0));

        m
    };
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SamtoolsSubcommand {
    Sort,
    Index,
    Flagstat,
}

impl SamtoolsSubcommand {
    pub fn as_str(&self) -> &'static str {
        match self {
            SamtoolsSubcommand::Sort => "sort",
            SamtoolsSubcommand::Index => "index",
            SamtoolsSubcommand::Flagstat => "flagstat",
        }
    }
}

/// Read direction of a paired-end sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mate {
    R1,
    R2,
}

impl Mate {
    pub const BOTH: [Mate; 2] = [Mate::R1, Mate::R2];

    /// Suffix used in file names, e.g. `SRR1_1.fastq.gz`.
    pub fn suffix(&self) -> &'static str {
        match self {
            Mate::R1 => "1",
            Mate::R2 => "2",
        }
    }
}

// Static Filenames
pub const RAW_FASTQ_EXT: &str = "fastq.gz";
pub const TRIMMED_FASTQ_EXT: &str = "trimmed.fastq.gz";
pub const MAPPING_SUMMARY_TSV: &str = "mapping_summary.tsv";
pub const TRIMMING_SUMMARY_TSV: &str = "trimming_summary.tsv";
pub const RAW_DUPLICATION_TSV: &str = "raw_duplication.tsv";
pub const MAPPING_PLOT: &str = "mapping_rate.svg";
pub const KEPT_READS_PLOT: &str = "kept_reads.svg";
pub const FASTQC_DATA_TXT: &str = "fastqc_data.txt";
pub const HISAT2_INDEX_BASE: &str = "genome";
pub const HISAT2_INDEX_PARTS: usize = 8;

// Static Parameters
pub const NA: &str = "NA";
pub const HIGH_LOAD_PERCENT: f32 = 80.0;

pub const FASTQ_EXTS: &[&'static str] = &["fastq", "fq"];
pub const COMPRESSION_EXTS: &[&'static str] = &["gz", "bz2"];


pub struct RunConfig  {
    pub cwd: PathBuf,
    pub out_dir: PathBuf,
    pub threads: usize,
    pub args: Arguments,
}


#[derive(Debug)]
pub enum PipelineError {
    InvalidConfig(String),
    MissingInput(PathBuf),
    ToolExecution { tool: String, error: String },
    ToolVersion { tool: String, found: String, required: String },
    IOError(String),
    InvalidFastqFormat(String),
    ReportParse { path: PathBuf, error: String },
    Other(anyhow::Error),
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineError::InvalidConfig(msg) => write!(f, "Invalid configuration: {}", msg),
            PipelineError::MissingInput(path) => write!(f, "Required input not found: {}", path.display()),
            PipelineError::ToolExecution { tool, error } => write!(f, "{} failed: {}", tool, error),
            PipelineError::ToolVersion { tool, found, required } => {
                write!(f, "{} version {} is older than required {}", tool, found, required)
            }
            PipelineError::IOError(msg) => write!(f, "I/O error: {}", msg),
            PipelineError::InvalidFastqFormat(msg) => write!(f, "Invalid FASTQ: {}", msg),
            PipelineError::ReportParse { path, error } => {
                write!(f, "Could not parse report {}: {}", path.display(), error)
            }
            PipelineError::Other(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for PipelineError {}

impl From<std::io::Error> for PipelineError {
    fn from(e: std::io::Error) -> Self {
        PipelineError::IOError(e.to_string())
    }
}

impl From<anyhow::Error> for PipelineError {
    fn from(e: anyhow::Error) -> Self {
        match e.downcast::<PipelineError>() {
            Ok(pipeline_error) => pipeline_error,
            Err(other) => PipelineError::Other(other),
        }
    }
}
