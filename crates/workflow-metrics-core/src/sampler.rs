//! Periodic CPU/memory sampler.
//!
//! Collection `n` is scheduled at `origin + n * interval`, not `interval`
//! after the previous collection finished, so slow probe calls never push
//! the timeline back. When a collection overruns its slot the next one
//! starts immediately. Samples carry the scheduled target time, which keeps
//! timestamps strictly increasing and exactly one interval apart.
//!
//! The sampler never stops on its own: probe failures are counted, logged
//! and the schedule continues.

use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use log::{debug, warn};
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::probe::{MetricsProbe, ProbeError};
use crate::series::{CpuLoadSample, MemoryUsageSample, MetricsSeries};

/// Interval used when no valid override is configured.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(5);

/// Environment variable carrying the interval override, in whole seconds.
pub const INTERVAL_ENV: &str = "METRICS_INTERVAL_SECONDS";

/// Sampler configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SamplerConfig {
    pub interval: Duration,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_INTERVAL,
        }
    }
}

impl SamplerConfig {
    /// Parse an interval override given in seconds.
    ///
    /// Never fails: absent, blank, non-numeric or zero input falls back to
    /// [`DEFAULT_INTERVAL`].
    pub fn from_interval_seconds(raw: Option<&str>) -> Self {
        let parsed = raw
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .and_then(|s| s.parse::<u64>().ok())
            .filter(|&secs| secs > 0);
        match parsed {
            Some(secs) => Self {
                interval: Duration::from_secs(secs),
            },
            None => {
                if let Some(raw) = raw {
                    debug!("ignoring invalid interval {raw:?}, using default");
                }
                Self::default()
            }
        }
    }

    /// Read the override from [`INTERVAL_ENV`].
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl FnOnce(&str) -> Option<String>) -> Self {
        Self::from_interval_seconds(lookup(INTERVAL_ENV).as_deref())
    }
}

/// Counters reported by the health endpoint.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SamplerHealth {
    pub interval_ms: u64,
    pub cpu_samples: usize,
    pub memory_samples: usize,
    pub failures: u64,
    /// Error of the most recent collection, if it failed.
    pub last_error: Option<String>,
}

struct SamplerState {
    series: MetricsSeries,
    failures: u64,
    last_error: Option<String>,
}

/// Owns the accumulated series for the lifetime of the process.
pub struct Sampler {
    config: SamplerConfig,
    state: RwLock<SamplerState>,
}

pub(crate) fn unix_ms_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

impl Sampler {
    pub fn new(config: SamplerConfig) -> Self {
        Self {
            config,
            state: RwLock::new(SamplerState {
                series: MetricsSeries::new(),
                failures: 0,
                last_error: None,
            }),
        }
    }

    pub fn interval(&self) -> Duration {
        self.config.interval
    }

    fn read(&self) -> RwLockReadGuard<'_, SamplerState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, SamplerState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Owned copy of everything collected so far.
    pub fn snapshot(&self) -> MetricsSeries {
        self.read().series.clone()
    }

    pub fn health(&self) -> SamplerHealth {
        let state = self.read();
        SamplerHealth {
            interval_ms: self.config.interval.as_millis() as u64,
            cpu_samples: state.series.cpu_load_percentages.len(),
            memory_samples: state.series.memory_usage_mbs.len(),
            failures: state.failures,
            last_error: state.last_error.clone(),
        }
    }

    /// Run one collection stamped with `target_ms`.
    ///
    /// Both samples are appended under a single write lock, so readers see
    /// either neither or both. On failure nothing is appended.
    pub async fn collect<P: MetricsProbe>(
        &self,
        probe: &P,
        target_ms: i64,
    ) -> Result<(), ProbeError> {
        let readings = async {
            let cpu = probe.cpu_load().await?;
            let mem = probe.memory_usage().await?;
            Ok::<_, ProbeError>((cpu, mem))
        }
        .await;

        match readings {
            Ok((cpu, mem)) => {
                let mut state = self.write();
                state.series.cpu_load_percentages.push(CpuLoadSample {
                    unix_time_ms: target_ms,
                    user: cpu.user_percent,
                    system: cpu.system_percent,
                });
                state.series.memory_usage_mbs.push(MemoryUsageSample::from_bytes(
                    target_ms,
                    mem.active_bytes,
                    mem.available_bytes,
                ));
                state.last_error = None;
                Ok(())
            }
            Err(e) => {
                warn!("error collecting metrics for {target_ms}: {e}");
                let mut state = self.write();
                state.failures += 1;
                state.last_error = Some(e.to_string());
                Err(e)
            }
        }
    }

    /// Collect forever on the fixed timeline starting now.
    pub async fn run<P: MetricsProbe>(&self, probe: P) {
        let interval = self.config.interval;
        let interval_ms = interval.as_millis() as i64;
        let mut target_ms = unix_ms_now();
        let mut deadline = Instant::now();

        loop {
            tokio::time::sleep_until(deadline).await;
            // Failures are already recorded; the schedule carries on.
            let _ = self.collect(&probe, target_ms).await;
            target_ms += interval_ms;
            deadline += interval;
        }
    }

    /// Start [`Sampler::run`] on the current tokio runtime.
    pub fn spawn<P: MetricsProbe + 'static>(self: Arc<Self>, probe: P) -> JoinHandle<()> {
        tokio::spawn(async move { self.run(probe).await })
    }
}
