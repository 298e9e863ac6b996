// src/utils/streams.rs
use std::collections::VecDeque;
use std::path::Path;
use std::process::{ExitStatus, Stdio};

use anyhow::{anyhow, Result};
use log::debug;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStderr, Command};
use tokio::task::JoinHandle;

use crate::config::defs::PipelineError;


#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ChildStream {
    Stdout,
    Stderr,
}


/// Reads all lines from a child's stdout or stderr.
///
/// # Arguments
///
/// * `child` - Spawned process with the requested stream piped.
/// * `stream` - Which stream to drain.
///
/// # Returns
/// Vec of lines (no trailing newlines).
pub async fn read_child_output_to_vec(child: &mut Child, stream: ChildStream) -> Result<Vec<String>> {
    let mut lines = Vec::new();
    match stream {
        ChildStream::Stdout => {
            let stdout = child.stdout.take().ok_or_else(|| anyhow!("Child stdout not available"))?;
            let mut reader = BufReader::new(stdout).lines();
            while let Some(line) = reader.next_line().await? {
                lines.push(line);
            }
        }
        ChildStream::Stderr => {
            let stderr = child.stderr.take().ok_or_else(|| anyhow!("Child stderr not available"))?;
            let mut reader = BufReader::new(stderr).lines();
            while let Some(line) = reader.next_line().await? {
                lines.push(line);
            }
        }
    }
    Ok(lines)
}


const STDERR_TAIL_LINES: usize = 20;


/// Forwards a child's stderr to the debug log so tools never block on a full pipe.
/// The last lines are kept for error messages.
fn spawn_stderr_task(tool: String, stderr: ChildStderr) -> JoinHandle<Vec<String>> {
    tokio::spawn(async move {
        let mut tail: VecDeque<String> = VecDeque::with_capacity(STDERR_TAIL_LINES + 1);
        let mut reader = BufReader::new(stderr).lines();
        while let Ok(Some(line)) = reader.next_line().await {
            debug!("[{}] {}", tool, line);
            tail.push_back(line);
            if tail.len() > STDERR_TAIL_LINES {
                tail.pop_front();
            }
        }
        Vec::from(tail)
    })
}


fn spawn_cmd(tool: &str, args: &[String], stdin: Stdio, stdout: Stdio) -> Result<Child, PipelineError> {
    debug!("Running: {} {}", tool, args.join(" "));
    Command::new(tool)
        .args(args)
        .stdin(stdin)
        .stdout(stdout)
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| PipelineError::ToolExecution {
            tool: tool.to_string(),
            error: format!("Failed to spawn: {}. Is {} installed?", e, tool),
        })
}


fn check_status(tool: &str, status: ExitStatus, stderr_tail: &[String]) -> Result<(), PipelineError> {
    if status.success() {
        return Ok(());
    }
    let detail = stderr_tail.last().map(String::as_str).unwrap_or("no stderr output");
    Err(PipelineError::ToolExecution {
        tool: tool.to_string(),
        error: format!("exited with {} ({})", status, detail),
    })
}


async fn join_stderr(tool: &str, task: JoinHandle<Vec<String>>) -> Result<Vec<String>, PipelineError> {
    task.await.map_err(|e| PipelineError::ToolExecution {
        tool: tool.to_string(),
        error: format!("stderr task failed: {}", e),
    })
}


/// Runs a tool to completion.
///
/// # Arguments
///
/// * `tool` - Executable name (tag).
/// * `args` - Argument vector from `generate_cli`.
///
/// # Returns
/// stdout lines; a non-zero exit status is a `ToolExecution` error.
pub async fn run_cmd(tool: &str, args: Vec<String>) -> Result<Vec<String>, PipelineError> {
    let mut child = spawn_cmd(tool, &args, Stdio::null(), Stdio::piped())?;
    let stderr = child.stderr.take().ok_or_else(|| PipelineError::ToolExecution {
        tool: tool.to_string(),
        error: "stderr not captured".to_string(),
    })?;
    let err_task = spawn_stderr_task(tool.to_string(), stderr);

    let lines = read_child_output_to_vec(&mut child, ChildStream::Stdout)
        .await
        .map_err(|e| PipelineError::ToolExecution { tool: tool.to_string(), error: e.to_string() })?;
    let status = child.wait().await?;
    let tail = join_stderr(tool, err_task).await?;
    check_status(tool, status, &tail)?;
    Ok(lines)
}


/// Runs a tool and writes its stdout to `out_path`.
pub async fn run_cmd_to_file(tool: &str, args: Vec<String>, out_path: &Path) -> Result<(), PipelineError> {
    let mut child = spawn_cmd(tool, &args, Stdio::null(), Stdio::piped())?;
    let stderr = child.stderr.take().ok_or_else(|| PipelineError::ToolExecution {
        tool: tool.to_string(),
        error: "stderr not captured".to_string(),
    })?;
    let err_task = spawn_stderr_task(tool.to_string(), stderr);

    let mut stdout = child.stdout.take().ok_or_else(|| PipelineError::ToolExecution {
        tool: tool.to_string(),
        error: "stdout not captured".to_string(),
    })?;
    let mut file = File::create(out_path)
        .await
        .map_err(|e| PipelineError::IOError(format!("Failed to create {}: {}", out_path.display(), e)))?;
    tokio::io::copy(&mut stdout, &mut file).await?;
    file.flush().await?;

    let status = child.wait().await?;
    let tail = join_stderr(tool, err_task).await?;
    check_status(tool, status, &tail)
}


/// Pipes stdout of `upstream` into stdin of `downstream`, e.g. `hisat2 | samtools sort`.
/// Both exit statuses are checked. A failed downstream is reported first: once it exits,
/// upstream dies on a broken pipe and its status says nothing about the cause.
pub async fn pipe_cmds(
    upstream: (&str, Vec<String>),
    downstream: (&str, Vec<String>),
) -> Result<(), PipelineError> {
    let (up_tool, up_args) = upstream;
    let (down_tool, down_args) = downstream;

    let mut up_child = spawn_cmd(up_tool, &up_args, Stdio::null(), Stdio::piped())?;
    let mut down_child = spawn_cmd(down_tool, &down_args, Stdio::piped(), Stdio::null())?;

    let up_err = up_child.stderr.take().ok_or_else(|| PipelineError::ToolExecution {
        tool: up_tool.to_string(),
        error: "stderr not captured".to_string(),
    })?;
    let down_err = down_child.stderr.take().ok_or_else(|| PipelineError::ToolExecution {
        tool: down_tool.to_string(),
        error: "stderr not captured".to_string(),
    })?;
    let up_err_task = spawn_stderr_task(up_tool.to_string(), up_err);
    let down_err_task = spawn_stderr_task(down_tool.to_string(), down_err);

    let mut up_stdout = up_child.stdout.take().ok_or_else(|| PipelineError::ToolExecution {
        tool: up_tool.to_string(),
        error: "stdout not captured".to_string(),
    })?;
    let mut down_stdin = down_child.stdin.take().ok_or_else(|| PipelineError::ToolExecution {
        tool: down_tool.to_string(),
        error: "stdin not captured".to_string(),
    })?;

    let copy_task: JoinHandle<std::io::Result<u64>> = tokio::spawn(async move {
        let copied = tokio::io::copy(&mut up_stdout, &mut down_stdin).await?;
        down_stdin.shutdown().await?;
        Ok(copied)
    });

    let up_status = up_child.wait().await?;
    let copy_result = copy_task.await.map_err(|e| PipelineError::Other(e.into()))?;
    let down_status = down_child.wait().await?;

    let up_tail = join_stderr(up_tool, up_err_task).await?;
    let down_tail = join_stderr(down_tool, down_err_task).await?;

    check_status(down_tool, down_status, &down_tail)?;
    check_status(up_tool, up_status, &up_tail)?;
    let copied = copy_result.map_err(|e| PipelineError::ToolExecution {
        tool: down_tool.to_string(),
        error: format!("broken pipe from {}: {}", up_tool, e),
    })?;
    debug!("Piped {} bytes from {} to {}", copied, up_tool, down_tool);
    Ok(())
}
