/// Functions and structs for working with creating command-line arguments

use std::any::Any;
use std::collections::HashMap;

use anyhow::{anyhow, Result};
use log::{debug, info};
use crate::config::defs::{
    PipelineError, RunConfig, FASTP_TAG, FASTQC_TAG, HISAT2_BUILD_TAG, HISAT2_TAG, MULTIQC_TAG,
    SAMTOOLS_TAG, TOOL_VERSIONS, WGET_TAG,
};
use crate::utils::streams::{read_child_output_to_vec, ChildStream};


/// Spawns `<tool> <args>` and returns the requested whitespace token of the first
/// non-empty line.
async fn version_token(tool: &str, args: &[&str], stream: ChildStream, nth: usize) -> Result<String> {
    let invocation = format!("{} {}", tool, args.join(" "));
    let mut child = tokio::process::Command::new(tool)
        .args(args)
        .stdin(std::process::Stdio::null())
        .stdout(std::process::Stdio::piped())
        .stderr(std::process::Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| anyhow!("Failed to spawn {}: {}. Is {} installed?", tool, e, tool))?;

    let lines = read_child_output_to_vec(&mut child, stream).await?;
    let status = child
        .wait()
        .await
        .map_err(|e| anyhow!("Failed to wait for {}: {}", invocation, e))?;
    debug!("{} exited with {}", invocation, status);

    let first_line = lines
        .iter()
        .find(|l| !l.trim().is_empty())
        .ok_or_else(|| anyhow!("No output from {}", invocation))?;
    let version = first_line
        .split_whitespace()
        .nth(nth)
        .ok_or_else(|| anyhow!("Invalid {} output: {}", invocation, first_line))?
        .trim_start_matches('v')
        .to_string();
    if version.is_empty() {
        return Err(anyhow!("Empty version number in {} output: {}", invocation, first_line));
    }
    Ok(version)
}


/// Leading `major.minor` of a version string such as `1.20`, `0.23.4` or `2.2.1-beta`.
pub fn parse_major_minor(version: &str) -> Option<(u32, u32)> {
    let mut parts = version.split(|c: char| c == '.' || c == '-');
    let major = parts.next()?.trim().parse().ok()?;
    let minor = parts
        .next()
        .map(|m| m.chars().take_while(|c| c.is_ascii_digit()).collect::<String>())
        .and_then(|m| m.parse().ok())
        .unwrap_or(0);
    Some((major, minor))
}


pub mod fastqc {
    use std::path::PathBuf;
    use crate::config::defs::RunConfig;

    #[derive(Debug, Clone)]
    pub struct FastqcConfig {
        pub out_dir: PathBuf,
        pub inputs: Vec<PathBuf>,
    }

    pub fn arg_generator(run_config: &RunConfig, config: &FastqcConfig) -> Vec<String> {
        let mut args_vec: Vec<String> = Vec::new();
        args_vec.push("--extract".to_string()); // fastqc_data.txt is scraped later
        args_vec.push("--quiet".to_string());
        args_vec.push("-t".to_string());
        args_vec.push(run_config.threads.to_string());
        args_vec.push("-o".to_string());
        args_vec.push(config.out_dir.to_string_lossy().to_string());
        for input in &config.inputs {
            args_vec.push(input.to_string_lossy().to_string());
        }
        args_vec
    }
}

pub mod multiqc {
    use std::path::PathBuf;

    #[derive(Debug, Clone)]
    pub struct MultiqcConfig {
        pub in_dir: PathBuf,
        pub out_dir: PathBuf,
        pub title: Option<String>,
    }

    pub fn arg_generator(config: &MultiqcConfig) -> Vec<String> {
        let mut args_vec: Vec<String> = Vec::new();
        args_vec.push("-f".to_string());
        args_vec.push("-q".to_string());
        if let Some(title) = &config.title {
            args_vec.push("--title".to_string());
            args_vec.push(title.clone());
        }
        args_vec.push("-o".to_string());
        args_vec.push(config.out_dir.to_string_lossy().to_string());
        args_vec.push(config.in_dir.to_string_lossy().to_string());
        args_vec
    }
}

pub mod fastp {
    use std::path::PathBuf;
    use crate::config::defs::RunConfig;

    #[derive(Debug, Clone)]
    pub struct FastpConfig {
        pub in1: PathBuf,
        pub in2: PathBuf,
        pub out1: PathBuf,
        pub out2: PathBuf,
        pub json: PathBuf,
        pub html: PathBuf,
        pub command_fields: Vec<(String, Option<String>)>,
    }

    pub fn arg_generator(run_config: &RunConfig, config: &FastpConfig) -> Vec<String> {
        let mut args_vec: Vec<String> = Vec::new();
        for (flag, path) in [
            ("-i", &config.in1),
            ("-I", &config.in2),
            ("-o", &config.out1),
            ("-O", &config.out2),
        ] {
            args_vec.push(flag.to_string());
            args_vec.push(path.to_string_lossy().to_string());
        }
        args_vec.push("-q".to_string());
        args_vec.push(run_config.args.quality.to_string());
        args_vec.push("-l".to_string());
        args_vec.push(run_config.args.length_required.to_string());
        args_vec.push("-w".to_string());
        args_vec.push(run_config.threads.min(16).to_string()); // fastp caps workers at 16
        args_vec.push("-j".to_string());
        args_vec.push(config.json.to_string_lossy().to_string());
        args_vec.push("-h".to_string());
        args_vec.push(config.html.to_string_lossy().to_string());
        for (key, value) in &config.command_fields {
            args_vec.push(key.clone());
            if let Some(v) = value {
                args_vec.push(v.clone());
            }
        }
        args_vec
    }
}

pub mod hisat2 {
    use std::path::PathBuf;
    use crate::config::defs::RunConfig;

    #[derive(Debug, Clone)]
    pub struct Hisat2Config {
        pub index_prefix: PathBuf,
        pub r1: PathBuf,
        pub r2: PathBuf,
        pub option_fields: Vec<(String, Option<String>)>,
    }

    pub fn arg_generator(run_config: &RunConfig, config: &Hisat2Config) -> Vec<String> {
        let mut args_vec: Vec<String> = Vec::new();
        args_vec.push("-p".to_string());
        args_vec.push(run_config.threads.to_string());
        args_vec.push("-x".to_string());
        args_vec.push(config.index_prefix.to_string_lossy().to_string());
        args_vec.push("-1".to_string());
        args_vec.push(config.r1.to_string_lossy().to_string());
        args_vec.push("-2".to_string());
        args_vec.push(config.r2.to_string_lossy().to_string());
        for (key, value) in &config.option_fields {
            args_vec.push(key.clone());
            if let Some(v) = value {
                args_vec.push(v.clone());
            }
        }
        args_vec
    }
}

pub mod hisat2_build {
    use std::path::PathBuf;
    use crate::config::defs::RunConfig;

    #[derive(Debug, Clone)]
    pub struct Hisat2BuildConfig {
        pub reference: PathBuf,
        pub index_prefix: PathBuf,
    }

    pub fn arg_generator(run_config: &RunConfig, config: &Hisat2BuildConfig) -> Vec<String> {
        vec![
            "-p".to_string(),
            run_config.threads.to_string(),
            config.reference.to_string_lossy().to_string(),
            config.index_prefix.to_string_lossy().to_string(),
        ]
    }
}

pub mod samtools {
    use crate::config::defs::{RunConfig, SamtoolsSubcommand};

    #[derive(Debug, Clone)]
    pub struct SamtoolsConfig {
        pub subcommand: SamtoolsSubcommand,
        /// Flags in order; positional arguments are keys with no value.
        pub subcommand_fields: Vec<(String, Option<String>)>,
    }

    pub fn arg_generator(run_config: &RunConfig, config: &SamtoolsConfig) -> Vec<String> {
        let mut args_vec: Vec<String> = Vec::new();
        args_vec.push(config.subcommand.as_str().to_string());

        match config.subcommand {
            SamtoolsSubcommand::Sort | SamtoolsSubcommand::Index | SamtoolsSubcommand::Flagstat => {
                args_vec.push("-@".to_string());
                args_vec.push(run_config.threads.to_string());
            }
        }

        for (key, value) in &config.subcommand_fields {
            args_vec.push(key.clone());
            if let Some(v) = value {
                args_vec.push(v.clone());
            }
        }
        args_vec
    }
}

pub mod wget {
    use std::path::PathBuf;

    #[derive(Debug, Clone)]
    pub struct WgetConfig {
        pub url: String,
        pub dest: PathBuf,
    }

    pub fn arg_generator(config: &WgetConfig) -> Vec<String> {
        vec![
            "-q".to_string(),
            "-c".to_string(), // resume partial downloads
            "-O".to_string(),
            config.dest.to_string_lossy().to_string(),
            config.url.clone(),
        ]
    }
}


fn view<'a, T: 'static>(tool: &str, config_view: Option<&'a dyn Any>) -> Result<&'a T> {
    config_view
        .and_then(|v| v.downcast_ref::<T>())
        .ok_or_else(|| anyhow!("Missing or mismatched config for {}", tool))
}

/// Builds the argument vector for `tool` from the run config and a tool-specific view.
pub fn generate_cli<T: Any>(tool: &str, run_config: &RunConfig, config_view: Option<&T>) -> Result<Vec<String>> {
    let config_view = config_view.map(|v| v as &dyn Any);
    let cmd = match tool {
        FASTQC_TAG => fastqc::arg_generator(run_config, view(tool, config_view)?),
        MULTIQC_TAG => multiqc::arg_generator(view(tool, config_view)?),
        FASTP_TAG => fastp::arg_generator(run_config, view(tool, config_view)?),
        HISAT2_TAG => hisat2::arg_generator(run_config, view(tool, config_view)?),
        HISAT2_BUILD_TAG => hisat2_build::arg_generator(run_config, view(tool, config_view)?),
        SAMTOOLS_TAG => samtools::arg_generator(run_config, view(tool, config_view)?),
        WGET_TAG => wget::arg_generator(view(tool, config_view)?),
        _ => return Err(anyhow!("Unknown tool: {}", tool)),
    };

    Ok(cmd)
}


/// Returns the version string reported by `tool`.
pub async fn check_version(tool: &str) -> Result<String> {
    match tool {
        // FastQC v0.12.1
        FASTQC_TAG => version_token(tool, &["--version"], ChildStream::Stdout, 1).await,
        // multiqc, version 1.21
        MULTIQC_TAG => version_token(tool, &["--version"], ChildStream::Stdout, 2).await,
        // fastp 0.23.4 (on stderr)
        FASTP_TAG => version_token(tool, &["--version"], ChildStream::Stderr, 1).await,
        // /usr/bin/hisat2-align-s version 2.2.1
        HISAT2_TAG | HISAT2_BUILD_TAG => version_token(tool, &["--version"], ChildStream::Stdout, 2).await,
        // samtools 1.20
        SAMTOOLS_TAG => version_token(tool, &["--version"], ChildStream::Stdout, 1).await,
        // GNU Wget 1.21.3 built on linux-gnu.
        WGET_TAG => version_token(tool, &["--version"], ChildStream::Stdout, 2).await,
        _ => Err(anyhow!("Unknown tool: {}", tool)),
    }
}


/// Checks that every tool is installed and recent enough.
///
/// # Arguments
///
/// * `tools` - Tags from config::defs.
///
/// # Returns
/// Map of tool tag to reported version.
pub async fn check_versions(tools: Vec<&str>) -> Result<HashMap<String, String>, PipelineError> {
    let mut found = HashMap::new();
    for tool in tools {
        let version = check_version(tool).await.map_err(|e| PipelineError::ToolExecution {
            tool: tool.to_string(),
            error: e.to_string(),
        })?;

        if let Some(&(min_major, min_minor)) = TOOL_VERSIONS.get(tool) {
            let parsed = parse_major_minor(&version).ok_or_else(|| PipelineError::ToolVersion {
                tool: tool.to_string(),
                found: version.clone(),
                required: format!("{}.{}", min_major, min_minor),
            })?;
            if parsed < (min_major, min_minor) {
                return Err(PipelineError::ToolVersion {
                    tool: tool.to_string(),
                    found: version,
                    required: format!("{}.{}", min_major, min_minor),
                });
            }
        }
        info!("{} version {}", tool, version);
        found.insert(tool.to_string(), version);
    }
    Ok(found)
}
