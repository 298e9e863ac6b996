use seq_io::fastq::Reader;
use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::{Path, PathBuf};
use anyhow::{anyhow, Result};
use flate2::read::MultiGzDecoder;
use log::{debug, info};
use crate::config::defs::PipelineError;
use crate::utils::file::is_gzipped;

pub enum FastqReader {
    Uncompressed(BufReader<File>),
    Gzipped(MultiGzDecoder<BufReader<File>>),
}

impl Read for FastqReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            FastqReader::Uncompressed(r) => r.read(buf),
            FastqReader::Gzipped(r) => r.read(buf),
        }
    }
}

pub fn fastq_reader(path: &Path) -> io::Result<Reader<FastqReader>> {
    let file = File::open(path)?;
    // bgzip / concatenated gzip members are common in ENA downloads
    let reader = if is_gzipped(path)? {
        Reader::new(FastqReader::Gzipped(MultiGzDecoder::new(BufReader::new(file))))
    } else {
        Reader::new(FastqReader::Uncompressed(BufReader::new(file)))
    };
    Ok(reader)
}


/// Counts FASTQ records, failing on the first malformed record.
pub fn count_fastq_records(path: &Path) -> Result<u64> {
    let mut reader = fastq_reader(path)
        .map_err(|e| anyhow!("Failed to open {}: {}", path.display(), e))?;
    let mut count: u64 = 0;
    while let Some(record) = reader.next() {
        record.map_err(|e| anyhow!("Invalid FASTQ record in {}: {}", path.display(), e))?;
        count += 1;
    }
    debug!("{}: {} records", path.display(), count);
    Ok(count)
}


/// Counts both mates on blocking threads and requires equal record counts.
///
/// # Arguments
///
/// * `r1` - Forward reads.
/// * `r2` - Reverse reads.
///
/// # Returns
/// Number of read pairs.
pub async fn verify_pair_counts(r1: PathBuf, r2: PathBuf) -> Result<u64, PipelineError> {
    let r1_display = r1.display().to_string();
    let r2_display = r2.display().to_string();

    let r1_task = tokio::task::spawn_blocking(move || count_fastq_records(&r1));
    let r2_task = tokio::task::spawn_blocking(move || count_fastq_records(&r2));
    let (r1_count, r2_count) = tokio::try_join!(r1_task, r2_task)
        .map_err(|e| PipelineError::Other(e.into()))?;
    let r1_count = r1_count.map_err(|e| PipelineError::InvalidFastqFormat(e.to_string()))?;
    let r2_count = r2_count.map_err(|e| PipelineError::InvalidFastqFormat(e.to_string()))?;

    if r1_count != r2_count {
        return Err(PipelineError::InvalidFastqFormat(format!(
            "Mate files disagree: {} has {} reads, {} has {}",
            r1_display, r1_count, r2_display, r2_count
        )));
    }
    info!("{} and {}: {} read pairs", r1_display, r2_display, r1_count);
    Ok(r1_count)
}


#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;

    fn fastq_text(n: usize) -> String {
        (0..n).map(|i| format!("@read{}\nACGTACGT\n+\nIIIIIIII\n", i)).collect()
    }

    #[test]
    fn test_count_plain_and_gzipped() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let plain = dir.path().join("a_1.fastq");
        std::fs::write(&plain, fastq_text(3))?;
        assert_eq!(count_fastq_records(&plain)?, 3);

        let gz = dir.path().join("a_1.fastq.gz");
        let mut encoder = GzEncoder::new(File::create(&gz)?, Compression::default());
        encoder.write_all(fastq_text(5).as_bytes())?;
        encoder.finish()?;
        assert_eq!(count_fastq_records(&gz)?, 5);
        Ok(())
    }

    #[test]
    fn test_count_rejects_malformed() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let bad = dir.path().join("bad.fastq");
        std::fs::write(&bad, "read-without-at\nACGT\n+\nIIII\n")?;
        assert!(count_fastq_records(&bad).is_err());
        Ok(())
    }

    #[tokio::test]
    async fn test_verify_pair_counts() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let r1 = dir.path().join("s_1.fastq");
        let r2 = dir.path().join("s_2.fastq");
        std::fs::write(&r1, fastq_text(4))?;
        std::fs::write(&r2, fastq_text(4))?;
        assert_eq!(verify_pair_counts(r1.clone(), r2.clone()).await?, 4);

        std::fs::write(&r2, fastq_text(3))?;
        assert!(matches!(
            verify_pair_counts(r1, r2).await,
            Err(PipelineError::InvalidFastqFormat(_))
        ));
        Ok(())
    }
}
