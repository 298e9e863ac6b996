// src/utils/system.rs: System functions

use std::time::Duration;

use sysinfo::{CpuRefreshKind, RefreshKind, System};
use tokio::time::sleep;
use anyhow::Result;

use crate::config::defs::HIGH_LOAD_PERCENT;


/// Determines number of cores that can be used for CPU based tasks
///
/// # Arguments
///
/// * `args_threads` - Thread count requested on the command line
///
/// # Returns
///
/// Result<(usize, f32)> maximum cores, current cpu usage
pub async fn detect_cores_and_load(args_threads: usize) -> Result<(usize, f32)> {
    let refresh_kind = RefreshKind::nothing().with_cpu(CpuRefreshKind::nothing().with_cpu_usage());
    let mut system = System::new_with_specifics(refresh_kind);
    system.refresh_cpu_usage();
    let physical_cores = System::physical_core_count().unwrap_or(1);
    // Usage is a delta between two refreshes.
    sleep(Duration::from_millis(200)).await;
    system.refresh_cpu_usage();
    let cpu_load = system.global_cpu_usage();
    let max_cores = physical_cores.min(args_threads.max(1));
    Ok((max_cores, cpu_load))
}


/// Thread count handed to the external tools.
///
/// # Arguments
///
/// * `max_cores` - Cores available from detect_cores_and_load
/// * `cpu_load` - Current global CPU usage in percent
/// * `args_threads` - Requested thread count
///
/// # Returns
///
/// requested threads capped at cores, halved under heavy load, at least 1
pub fn compute_tool_threads(max_cores: usize, cpu_load: f32, args_threads: usize) -> usize {
    let threads = args_threads.min(max_cores).max(1);
    if cpu_load > HIGH_LOAD_PERCENT {
        (threads / 2).max(1)
    } else {
        threads
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compute_tool_threads() {
        assert_eq!(compute_tool_threads(16, 10.0, 8), 8);
        assert_eq!(compute_tool_threads(4, 10.0, 8), 4);
        assert_eq!(compute_tool_threads(16, 95.0, 8), 4);
        assert_eq!(compute_tool_threads(16, 95.0, 1), 1);
        assert_eq!(compute_tool_threads(16, 0.0, 0), 1);
    }

    #[tokio::test]
    async fn test_detect_cores_and_load() -> Result<()> {
        let (cores, load) = detect_cores_and_load(2).await?;
        assert!(cores >= 1 && cores <= 2);
        assert!(load >= 0.0);
        Ok(())
    }
}
