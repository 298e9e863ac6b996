use std::fs;
use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;

use readqc_pipelines::Arguments;
use readqc_pipelines::config::defs::{PipelineError, RunConfig};
use readqc_pipelines::pipelines::{fetch, qc_align, summarize};

const FLAGSTAT_A: &str = "\
2000 + 0 in total (QC-passed reads + QC-failed reads)
2000 + 0 primary
0 + 0 secondary
0 + 0 supplementary
0 + 0 duplicates
0 + 0 primary duplicates
1900 + 0 mapped (95.00% : N/A)
1900 + 0 primary mapped (95.00% : N/A)
2000 + 0 paired in sequencing
";

const FLAGSTAT_B: &str = "\
1500 + 0 in total (QC-passed reads + QC-failed reads)
1234 + 0 mapped (82.27% : N/A)
";

fn fastp_json(before: u64, after: u64) -> String {
    format!(
        r#"{{"summary": {{"fastp_version": "0.23.4",
            "before_filtering": {{"total_reads": {}, "total_bases": 150000}},
            "after_filtering": {{"total_reads": {}, "total_bases": 140000}}}}}}"#,
        before, after
    )
}

fn fastqc_data(dedup: f64) -> String {
    format!(
        "##FastQC\t0.12.1\n>>Basic Statistics\tpass\n#Measure\tValue\nTotal Sequences\t1000\n>>END_MODULE\n\
         >>Sequence Duplication Levels\tpass\n#Total Deduplicated Percentage\t{}\n>>END_MODULE\n",
        dedup
    )
}

fn config(dir: &Path, argv: &[&str]) -> Result<Arc<RunConfig>> {
    let mut full = vec!["readqc-pipelines"];
    full.extend_from_slice(argv);
    let args = Arguments::try_parse_from(full)?;
    Ok(Arc::new(RunConfig {
        cwd: dir.to_path_buf(),
        out_dir: dir.join("run"),
        threads: 2,
        args,
    }))
}

fn write(path: &Path, content: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, content)?;
    Ok(())
}

fn seed_reports(run: &Path) -> Result<()> {
    write(&run.join("align/A_flagstat.txt"), FLAGSTAT_A)?;
    write(&run.join("align/B_flagstat.txt"), FLAGSTAT_B)?;
    write(&run.join("trimmed/A_fastp.json"), &fastp_json(2000, 1910))?;
    write(&run.join("trimmed/B_fastp.json"), "{ not json")?;
    write(&run.join("fastqc_raw/A_1_fastqc/fastqc_data.txt"), &fastqc_data(72.34))?;
    write(&run.join("fastqc_raw/A_2_fastqc/fastqc_data.txt"), &fastqc_data(70.10))?;
    write(&run.join("fastqc_raw/B_1_fastqc/fastqc_data.txt"), &fastqc_data(88.0))?;
    Ok(())
}

fn table_lines(path: &Path) -> Result<Vec<String>> {
    Ok(fs::read_to_string(path)?.lines().map(str::to_string).collect())
}


#[tokio::test]
async fn qc_align_rejects_missing_reference() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let config = config(dir.path(), &["-m", "qc_align", "-s", "SRR000001", "-r", "absent.fa"])?;
    match qc_align::run(config).await {
        Err(PipelineError::MissingInput(path)) => assert_eq!(path, dir.path().join("absent.fa")),
        other => panic!("Expected MissingInput, got {:?}", other),
    }
    assert!(!dir.path().join("run/raw").exists());
    Ok(())
}

#[tokio::test]
async fn qc_align_rejects_missing_raw_reads() -> Result<()> {
    let dir = tempfile::tempdir()?;
    write(&dir.path().join("ref.fa"), ">chr1\nACGTACGT\n")?;
    write(&dir.path().join("reads/S1_1.fastq.gz"), "@r\nA\n+\nI\n")?;
    let config = config(
        dir.path(),
        &["-m", "qc_align", "-s", "S1", "-r", "ref.fa", "--skip-download", "--raw-dir", "reads"],
    )?;
    match qc_align::run(config).await {
        Err(PipelineError::MissingInput(path)) => assert_eq!(path, dir.path().join("reads/S1_2.fastq.gz")),
        other => panic!("Expected MissingInput, got {:?}", other),
    }
    Ok(())
}

#[tokio::test]
async fn qc_align_rejects_bad_accession_before_tools() -> Result<()> {
    let dir = tempfile::tempdir()?;
    write(&dir.path().join("ref.fa"), ">chr1\nACGTACGT\n")?;
    let config = config(dir.path(), &["-m", "qc_align", "-s", "SRR000001,not_an_accession", "-r", "ref.fa"])?;
    match qc_align::run(config).await {
        Err(PipelineError::InvalidConfig(msg)) => assert!(msg.contains("not_an_accession"), "{}", msg),
        other => panic!("Expected InvalidConfig, got {:?}", other),
    }
    assert!(!dir.path().join("run").exists(), "Nothing is created before validation passes");
    Ok(())
}

#[tokio::test]
async fn qc_align_accepts_local_names_with_skip_download() -> Result<()> {
    let dir = tempfile::tempdir()?;
    write(&dir.path().join("ref.fa"), ">chr1\nACGTACGT\n")?;
    let config = config(
        dir.path(),
        &["-m", "qc_align", "-s", "liver_rep1", "-r", "ref.fa", "--skip-download"],
    )?;
    // Local names pass the accession check and fail later on the absent reads.
    match qc_align::run(config).await {
        Err(PipelineError::MissingInput(path)) => assert!(path.ends_with("raw/liver_rep1_1.fastq.gz")),
        other => panic!("Expected MissingInput, got {:?}", other),
    }
    Ok(())
}

#[tokio::test]
async fn fetch_rejects_bad_accession_before_download() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let config = config(dir.path(), &["-m", "fetch", "-s", "SRR000001,SRX000002"])?;
    assert!(matches!(fetch::run(config).await, Err(PipelineError::InvalidConfig(_))));
    assert!(!dir.path().join("run/raw").exists());
    Ok(())
}

#[tokio::test]
async fn fetch_rejects_bad_sample_names() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let config = config(dir.path(), &["-m", "fetch", "-s", "../escape"])?;
    assert!(matches!(fetch::run(config).await, Err(PipelineError::InvalidConfig(_))));
    Ok(())
}

#[tokio::test]
async fn summarize_writes_tables_from_reports() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let run = dir.path().join("run");
    seed_reports(&run)?;

    let config = config(dir.path(), &["-m", "summarize", "-s", "A,B"])?;
    summarize::run(config).await?;

    let mapping = table_lines(&run.join("summary/mapping_summary.tsv"))?;
    assert_eq!(mapping[0], "sample\ttotal_reads\tmapped_reads\tmapping_percent");
    assert_eq!(mapping[1], "A\t2000\t1900\t95.00");
    assert_eq!(mapping[2], "B\t1500\t1234\t82.27");

    let trimming = table_lines(&run.join("summary/trimming_summary.tsv"))?;
    assert_eq!(trimming[1], "A\t1000\t955\t95.50");
    assert_eq!(trimming[2], "B\tNA\tNA\tNA");

    let duplication = table_lines(&run.join("summary/raw_duplication.tsv"))?;
    assert_eq!(duplication[1], "A\t72.34\t70.10\t28.78");
    assert_eq!(duplication[2], "B\t88.00\tNA\tNA");

    assert!(run.join("summary/mapping_rate.svg").exists());
    assert!(run.join("summary/kept_reads.svg").exists());
    Ok(())
}

#[tokio::test]
async fn summarize_discovers_samples_without_plots() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let run = dir.path().join("run");
    seed_reports(&run)?;

    let config = config(dir.path(), &["-m", "summarize", "--no-plots"])?;
    summarize::run(config).await?;

    let mapping = table_lines(&run.join("summary/mapping_summary.tsv"))?;
    let samples: Vec<&str> = mapping[1..].iter().filter_map(|l| l.split('\t').next()).collect();
    assert_eq!(samples, vec!["A", "B"]);
    assert!(!run.join("summary/mapping_rate.svg").exists());
    Ok(())
}

#[tokio::test]
async fn summarize_without_reports_is_an_error() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let config = config(dir.path(), &["-m", "summarize"])?;
    assert!(matches!(summarize::run(config).await, Err(PipelineError::InvalidConfig(_))));
    Ok(())
}
