mod pipelines;
mod utils;
mod config;
mod cli;

use std::env;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use env_logger::Builder;
use log::{LevelFilter, debug, error, info};

use crate::cli::parse;
use crate::config::defs::{PipelineError, RunConfig};
use crate::utils::file::resolve_path;
use crate::utils::system::{compute_tool_threads, detect_cores_and_load};
use pipelines::{fetch, qc_align, summarize};


#[tokio::main]
async fn main() -> Result<()> {
    let run_start = Instant::now();

    let args = parse();

    let log_level = if args.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    Builder::new()
        .filter_level(log_level)
        .format(|buf, record| {
            writeln!(
                buf,
                "[{}] {}: {}",
                chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
                record.level(),
                record.args()
            )
        })
        .init();

    println!("\n-------------\n ReadQC\n-------------\n");

    let dir = env::current_dir()?;
    info!("The current directory is {:?}\n", dir);

    let (max_cores, cpu_load) = detect_cores_and_load(args.threads).await?;
    let threads = compute_tool_threads(max_cores, cpu_load, args.threads);
    debug!("Detected {} usable cores; CPU load {}%; using {} threads per tool",
              max_cores, cpu_load, threads);

    let out_dir = setup_output_dir(&args, &dir)?;
    info!("Output directory: {}", out_dir.display());

    let module = args.module.clone();
    let run_config = Arc::new(RunConfig {
        cwd: dir,
        out_dir,
        threads,
        args,
    });

    if let Err(e) = match module.as_str() {
        "qc_align" => qc_align::run(run_config).await,
        "fetch" => fetch::run(run_config).await,
        "summarize" => summarize::run(run_config).await,
        _ => Err(PipelineError::InvalidConfig(format!("Invalid module: {}", module))),
    } {
        error!("Pipeline failed: {} at {} milliseconds.", e, run_start.elapsed().as_millis());
        std::process::exit(1);
    }

    println!("Run complete: {} milliseconds.", run_start.elapsed().as_millis());
    Ok(())
}


/// Sets up output directory
/// If `out_dir` is specified from args, uses it;
/// otherwise, creates a directory named `readqc_YYYYMMDD`.
/// Ensures the directory exists.
///
/// # Arguments
/// * `args` - The parsed command-line arguments.
/// * `cwd` - The current working directory.
/// # Returns
/// path to the output directory.
fn setup_output_dir(args: &cli::args::Arguments, cwd: &Path) -> Result<PathBuf> {
    let out_dir = match &args.out_dir {
        Some(out) => resolve_path(out, cwd),
        None => {
            let timestamp = chrono::Local::now().format("%Y%m%d").to_string();
            cwd.join(format!("readqc_{}", timestamp))
        }
    };
    fs::create_dir_all(&out_dir)?;
    Ok(out_dir)
}
