use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use anyhow::Result;
use log::debug;

use crate::config::defs::{
    Mate, PipelineError, RunConfig, COMPRESSION_EXTS, FASTQC_DATA_TXT, FASTQ_EXTS, HISAT2_INDEX_BASE, HISAT2_INDEX_PARTS,
    RAW_FASTQ_EXT, TRIMMED_FASTQ_EXT,
};

pub fn is_gzipped(path: &Path) -> io::Result<bool> {
    let mut file = File::open(path)?;
    let mut buffer = [0u8; 2];
    match file.read_exact(&mut buffer) {
        Ok(()) => Ok(buffer == [0x1F, 0x8B]), // Gzip magic bytes
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(e),
    }
}


/// Builds `<dir>/<prefix><delimiter><stem><delimiter><suffix>`.
///
/// # Arguments
/// * `base` - File or stem to decorate. Absolute paths ignore `dir`.
/// * `dir` - Optional parent directory.
/// * `prefix` - Optional prefix joined with `delimiter`.
/// * `suffix` - Optional suffix joined with `delimiter`.
/// * `delimiter` - Joiner, usually "_".
///
/// # Returns
/// the assembled PathBuf
pub fn file_path_manipulator(
    base: &Path,
    dir: Option<&Path>,
    prefix: Option<&str>,
    suffix: Option<&str>,
    delimiter: &str,
) -> PathBuf {
    let file_name = base
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();

    let mut decorated = String::new();
    if let Some(prefix) = prefix {
        decorated.push_str(prefix);
        decorated.push_str(delimiter);
    }
    decorated.push_str(&file_name);
    if let Some(suffix) = suffix {
        decorated.push_str(delimiter);
        decorated.push_str(suffix);
    }

    let parent = match dir {
        Some(d) if !base.is_absolute() => d.to_path_buf(),
        _ => base.parent().map(Path::to_path_buf).unwrap_or_default(),
    };
    parent.join(decorated)
}


/// Resolves a user-supplied path against the working directory.
pub fn resolve_path(path: &str, cwd: &Path) -> PathBuf {
    let path = PathBuf::from(path);
    if path.is_absolute() {
        path
    } else {
        cwd.join(path)
    }
}


/// Fails with `MissingInput` unless `path` is an existing, non-empty file.
pub fn require_file(path: &Path) -> Result<(), PipelineError> {
    match fs::metadata(path) {
        Ok(meta) if meta.is_file() && meta.len() > 0 => Ok(()),
        _ => Err(PipelineError::MissingInput(path.to_path_buf())),
    }
}


/// True if the file exists with some content. Used to skip work already done.
pub fn non_empty_file(path: &Path) -> bool {
    fs::metadata(path).map(|m| m.is_file() && m.len() > 0).unwrap_or(false)
}


/// Name of the directory FastQC creates for an input file: compression and FASTQ
/// extensions are stripped, then `_fastqc` appended.
pub fn fastqc_output_stem(fastq: &Path) -> String {
    let mut name = fastq
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    for ext in COMPRESSION_EXTS {
        if let Some(stripped) = name.strip_suffix(&format!(".{}", ext)) {
            name = stripped.to_string();
            break;
        }
    }
    for ext in FASTQ_EXTS {
        if let Some(stripped) = name.strip_suffix(&format!(".{}", ext)) {
            name = stripped.to_string();
            break;
        }
    }
    format!("{}_fastqc", name)
}


/// Directory tree of a run rooted at the output directory.
#[derive(Debug, Clone)]
pub struct OutputLayout {
    pub root: PathBuf,
    pub raw_dir: PathBuf,
    pub fastqc_raw_dir: PathBuf,
    pub multiqc_raw_dir: PathBuf,
    pub trimmed_dir: PathBuf,
    pub fastqc_trimmed_dir: PathBuf,
    pub multiqc_trimmed_dir: PathBuf,
    pub index_dir: PathBuf,
    pub align_dir: PathBuf,
    pub summary_dir: PathBuf,
}

impl OutputLayout {
    pub fn new(root: &Path, raw_dir: Option<PathBuf>) -> Self {
        OutputLayout {
            root: root.to_path_buf(),
            raw_dir: raw_dir.unwrap_or_else(|| root.join("raw")),
            fastqc_raw_dir: root.join("fastqc_raw"),
            multiqc_raw_dir: root.join("multiqc_raw"),
            trimmed_dir: root.join("trimmed"),
            fastqc_trimmed_dir: root.join("fastqc_trimmed"),
            multiqc_trimmed_dir: root.join("multiqc_trimmed"),
            index_dir: root.join("index"),
            align_dir: root.join("align"),
            summary_dir: root.join("summary"),
        }
    }

    /// Layout under `config.out_dir`, honouring `--raw-dir`.
    pub fn from_config(config: &RunConfig) -> Self {
        let raw_dir = config.args.raw_dir.as_ref().map(|d| resolve_path(d, &config.cwd));
        OutputLayout::new(&config.out_dir, raw_dir)
    }

    pub fn create_all(&self) -> io::Result<()> {
        for dir in [
            &self.raw_dir,
            &self.fastqc_raw_dir,
            &self.multiqc_raw_dir,
            &self.trimmed_dir,
            &self.fastqc_trimmed_dir,
            &self.multiqc_trimmed_dir,
            &self.index_dir,
            &self.align_dir,
            &self.summary_dir,
        ] {
            fs::create_dir_all(dir)?;
            debug!("Ensured directory {}", dir.display());
        }
        Ok(())
    }

    pub fn raw_fastq(&self, sample: &str, mate: Mate) -> PathBuf {
        self.raw_dir.join(format!("{}_{}.{}", sample, mate.suffix(), RAW_FASTQ_EXT))
    }

    pub fn trimmed_fastq(&self, sample: &str, mate: Mate) -> PathBuf {
        self.trimmed_dir.join(format!("{}_{}.{}", sample, mate.suffix(), TRIMMED_FASTQ_EXT))
    }

    pub fn fastp_json(&self, sample: &str) -> PathBuf {
        file_path_manipulator(Path::new(sample), Some(&self.trimmed_dir), None, Some("fastp.json"), "_")
    }

    pub fn fastp_html(&self, sample: &str) -> PathBuf {
        file_path_manipulator(Path::new(sample), Some(&self.trimmed_dir), None, Some("fastp.html"), "_")
    }

    pub fn bam(&self, sample: &str) -> PathBuf {
        file_path_manipulator(Path::new(sample), Some(&self.align_dir), None, Some("sorted.bam"), "_")
    }

    pub fn flagstat(&self, sample: &str) -> PathBuf {
        file_path_manipulator(Path::new(sample), Some(&self.align_dir), None, Some("flagstat.txt"), "_")
    }

    /// `fastqc_data.txt` FastQC writes (with `--extract`) for a raw FASTQ.
    pub fn raw_fastqc_data(&self, sample: &str, mate: Mate) -> PathBuf {
        let fastq = self.raw_fastq(sample, mate);
        self.fastqc_raw_dir.join(fastqc_output_stem(&fastq)).join(FASTQC_DATA_TXT)
    }

    /// Index prefix handed to hisat2 / hisat2-build.
    pub fn hisat2_index_prefix(&self) -> PathBuf {
        self.index_dir.join(HISAT2_INDEX_BASE)
    }

    pub fn summary_file(&self, name: &str) -> PathBuf {
        self.summary_dir.join(name)
    }
}


/// HISAT2 writes `<prefix>.1.ht2` .. `<prefix>.8.ht2` (`.ht2l` for large genomes).
/// The index counts only when all eight files of one kind are present and non-empty.
pub fn hisat2_index_exists(prefix: &Path) -> bool {
    ["ht2", "ht2l"].iter().any(|ext| {
        (1..=HISAT2_INDEX_PARTS).all(|part| {
            let mut name = prefix.as_os_str().to_owned();
            name.push(format!(".{}.{}", part, ext));
            non_empty_file(Path::new(&name))
        })
    })
}
