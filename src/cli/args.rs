use clap::Parser;

#[derive(Parser, Debug, Clone, Default)]
#[command(name = "readqc-pipelines", version = "0.1")]
pub struct Arguments {

    #[arg(short, long, help = "Pipeline module: qc_align, fetch or summarize")]
    pub module: String,

    #[arg(short = 'v', long = "verbose", action)]
    pub verbose: bool,

    #[clap(
        short = 's',
        long,
        value_delimiter = ',',
        help = "Comma-separated list of run accessions / sample names (e.g., SRR1234567,SRR1234568)"
    )]
    pub samples: Vec<String>,

    #[arg(long, help = "File with one sample per line; blank lines and '#' comments are ignored")]
    pub sample_sheet: Option<String>,

    #[arg(short = 'r', long)] // For alignment
    pub reference: Option<String>,

    #[arg(long, help = "Optional prefix of a pre-built HISAT2 index (e.g., index/genome)")]
    pub hisat2_index: Option<String>,

    #[arg(short = 'o', long = "out", help = "Output directory for all generated files. If not specified, a directory named 'readqc_YYYYMMDD' will be created in the current working directory.")]
    pub out_dir: Option<String>,

    #[arg(long, help = "Directory holding <sample>_1.fastq.gz / <sample>_2.fastq.gz; defaults to <out>/raw")]
    pub raw_dir: Option<String>,

    #[arg(long, default_value = "ftp://ftp.sra.ebi.ac.uk/vol1/fastq")]
    pub ena_base: String,

    #[arg(long, default_value_t = false)]
    pub skip_download: bool,

    #[arg(long, default_value_t = false)]
    pub verify_pairs: bool,

    #[arg(long, default_value_t = false)]
    pub no_plots: bool,

    #[arg(short = 't', long, default_value_t = 8)]
    pub threads: usize,

    #[arg(short = 'q', long = "quality", default_value_t = 20)]
    pub quality: u8,

    #[arg(short = 'l', long, default_value_t = 50)]
    pub length_required: usize,
}
