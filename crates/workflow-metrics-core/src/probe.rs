//! Instantaneous CPU and memory readings.
//!
//! The sampler only talks to the [`MetricsProbe`] trait. [`ProcfsProbe`] is
//! the production implementation and reads `/proc/stat` and `/proc/meminfo`;
//! tests substitute their own probes.

use std::future::Future;
use std::sync::Mutex;

use serde::Serialize;
use thiserror::Error;

/// CPU time share since the previous reading, in percent.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CpuLoad {
    pub user_percent: f64,
    pub system_percent: f64,
}

/// Point-in-time memory usage in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MemoryUsage {
    pub active_bytes: u64,
    pub available_bytes: u64,
}

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: &'static str,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed {path}: {reason}")]
    Malformed { path: &'static str, reason: String },
    #[error("metrics probe is not supported on {0}")]
    Unsupported(&'static str),
}

/// Source of CPU and memory readings.
///
/// Either call may fail; the sampler records the failure and moves on.
pub trait MetricsProbe: Send + Sync {
    fn cpu_load(&self) -> impl Future<Output = Result<CpuLoad, ProbeError>> + Send;

    fn memory_usage(&self) -> impl Future<Output = Result<MemoryUsage, ProbeError>> + Send;
}

const PROC_STAT: &str = "/proc/stat";
const PROC_MEMINFO: &str = "/proc/meminfo";

/// Aggregate jiffy counters from the `cpu` line of `/proc/stat`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct CpuTimes {
    user: u64,
    system: u64,
    total: u64,
}

/// Probe backed by Linux procfs.
#[derive(Debug, Default)]
pub struct ProcfsProbe {
    last_cpu: Mutex<Option<CpuTimes>>,
}

impl ProcfsProbe {
    pub fn new() -> Self {
        Self::default()
    }
}

impl MetricsProbe for ProcfsProbe {
    async fn cpu_load(&self) -> Result<CpuLoad, ProbeError> {
        let raw = read_proc(PROC_STAT).await?;
        let now = parse_proc_stat(&raw)?;
        let mut last = self
            .last_cpu
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let load = cpu_load_between(last.unwrap_or_default(), now);
        *last = Some(now);
        Ok(load)
    }

    async fn memory_usage(&self) -> Result<MemoryUsage, ProbeError> {
        let raw = read_proc(PROC_MEMINFO).await?;
        parse_meminfo(&raw)
    }
}

#[cfg(target_os = "linux")]
async fn read_proc(path: &'static str) -> Result<String, ProbeError> {
    tokio::fs::read_to_string(path)
        .await
        .map_err(|source| ProbeError::Io { path, source })
}

#[cfg(not(target_os = "linux"))]
async fn read_proc(_path: &'static str) -> Result<String, ProbeError> {
    Err(ProbeError::Unsupported(std::env::consts::OS))
}

fn parse_proc_stat(raw: &str) -> Result<CpuTimes, ProbeError> {
    let malformed = |reason: &str| ProbeError::Malformed {
        path: PROC_STAT,
        reason: reason.to_string(),
    };

    let line = raw
        .lines()
        .find_map(|l| l.strip_prefix("cpu "))
        .ok_or_else(|| malformed("missing aggregate cpu line"))?;
    let fields: Vec<u64> = line
        .split_whitespace()
        .map(str::parse::<u64>)
        .collect::<Result<_, _>>()
        .map_err(|e| malformed(&format!("bad counter: {e}")))?;
    if fields.len() < 4 {
        return Err(malformed("fewer than 4 cpu counters"));
    }

    // user nice system idle iowait irq softirq steal; guest time is already
    // folded into user/nice by the kernel.
    let total = fields.iter().take(8).sum();
    Ok(CpuTimes {
        user: fields[0],
        system: fields[2],
        total,
    })
}

fn cpu_load_between(prev: CpuTimes, now: CpuTimes) -> CpuLoad {
    let total = now.total.saturating_sub(prev.total);
    if total == 0 {
        return CpuLoad {
            user_percent: 0.0,
            system_percent: 0.0,
        };
    }
    let pct = |delta: u64| (delta as f64 / total as f64 * 100.0).clamp(0.0, 100.0);
    CpuLoad {
        user_percent: pct(now.user.saturating_sub(prev.user)),
        system_percent: pct(now.system.saturating_sub(prev.system)),
    }
}

fn parse_meminfo(raw: &str) -> Result<MemoryUsage, ProbeError> {
    let mut total_kb = None;
    let mut available_kb = None;

    for line in raw.lines() {
        let Some((key, rest)) = line.split_once(':') else {
            continue;
        };
        let value = rest
            .split_whitespace()
            .next()
            .and_then(|v| v.parse::<u64>().ok());
        match key {
            "MemTotal" => total_kb = value,
            "MemAvailable" => available_kb = value,
            _ => {}
        }
    }

    match (total_kb, available_kb) {
        (Some(total), Some(available)) => Ok(MemoryUsage {
            active_bytes: total.saturating_sub(available) * 1024,
            available_bytes: available * 1024,
        }),
        _ => Err(ProbeError::Malformed {
            path: PROC_MEMINFO,
            reason: "MemTotal or MemAvailable missing".to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const STAT: &str = "cpu  4705 150 1120 16250 520 0 30 0 0 0\n\
                        cpu0 2355 75 560 8125 260 0 15 0 0 0\n\
                        intr 12345\n";

    const MEMINFO: &str = "MemTotal:       16384000 kB\n\
                           MemFree:         1024000 kB\n\
                           MemAvailable:    8192000 kB\n\
                           Buffers:          204800 kB\n";

    #[test]
    fn test_parse_proc_stat_aggregate_line() {
        let t = parse_proc_stat(STAT).unwrap();
        assert_eq!(t.user, 4705);
        assert_eq!(t.system, 1120);
        assert_eq!(t.total, 4705 + 150 + 1120 + 16250 + 520 + 30);
    }

    #[test]
    fn test_parse_proc_stat_missing_line() {
        let err = parse_proc_stat("intr 1\nctxt 2\n").unwrap_err();
        assert!(matches!(err, ProbeError::Malformed { .. }));
    }

    #[test]
    fn test_parse_proc_stat_short_line() {
        assert!(parse_proc_stat("cpu  1 2\n").is_err());
    }

    #[test]
    fn test_cpu_load_between_readings() {
        let prev = CpuTimes {
            user: 100,
            system: 50,
            total: 1000,
        };
        let now = CpuTimes {
            user: 125,
            system: 60,
            total: 1100,
        };
        let load = cpu_load_between(prev, now);
        assert!((load.user_percent - 25.0).abs() < 1e-9);
        assert!((load.system_percent - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_cpu_load_without_progress_is_zero() {
        let t = CpuTimes {
            user: 1,
            system: 1,
            total: 10,
        };
        let load = cpu_load_between(t, t);
        assert_eq!(load.user_percent, 0.0);
        assert_eq!(load.system_percent, 0.0);
    }

    #[test]
    fn test_parse_meminfo() {
        let m = parse_meminfo(MEMINFO).unwrap();
        assert_eq!(m.available_bytes, 8_192_000 * 1024);
        assert_eq!(m.active_bytes, (16_384_000 - 8_192_000) * 1024);
    }

    #[test]
    fn test_parse_meminfo_missing_available() {
        assert!(parse_meminfo("MemTotal: 10 kB\n").is_err());
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_procfs_probe_reads_host() {
        let probe = ProcfsProbe::new();
        let cpu = probe.cpu_load().await.unwrap();
        assert!((0.0..=100.0).contains(&cpu.user_percent));
        assert!((0.0..=100.0).contains(&cpu.system_percent));
        let mem = probe.memory_usage().await.unwrap();
        assert!(mem.available_bytes > 0);
    }
}
