//! Slice a run's series into per-step sub-series by time window.
//!
//! Window bounds are inclusive on both ends and either may be open. The
//! correlator is a pure partition: it never drops windows, even when they
//! select nothing.

use chrono::DateTime;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::series::{MetricsSeries, Timestamped};

/// Named, optionally bounded time range in unix milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub name: String,
    pub start_inclusive_ms: Option<i64>,
    pub end_inclusive_ms: Option<i64>,
}

/// Sub-series selected by one window.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepSeries {
    pub name: String,
    pub series: MetricsSeries,
}

#[derive(Debug, Error)]
pub enum WindowError {
    #[error("step {step:?}: invalid timestamp {value:?}: {source}")]
    Timestamp {
        step: String,
        value: String,
        #[source]
        source: chrono::ParseError,
    },
    #[error("malformed step listing: {0}")]
    Decode(#[from] serde_json::Error),
}

impl TimeWindow {
    pub fn new(name: impl Into<String>, start: Option<i64>, end: Option<i64>) -> Self {
        Self {
            name: name.into(),
            start_inclusive_ms: start,
            end_inclusive_ms: end,
        }
    }

    /// Window from RFC 3339 bounds as reported by the workflow job API.
    pub fn from_rfc3339(
        name: impl Into<String>,
        started_at: Option<&str>,
        completed_at: Option<&str>,
    ) -> Result<Self, WindowError> {
        let name = name.into();
        let start = parse_bound(&name, started_at)?;
        let end = parse_bound(&name, completed_at)?;
        Ok(Self::new(name, start, end))
    }

    /// Inclusive membership test.
    pub fn contains(&self, unix_time_ms: i64) -> bool {
        self.start_inclusive_ms.is_none_or(|start| start <= unix_time_ms)
            && self.end_inclusive_ms.is_none_or(|end| unix_time_ms <= end)
    }
}

fn parse_bound(step: &str, raw: Option<&str>) -> Result<Option<i64>, WindowError> {
    let Some(raw) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
        return Ok(None);
    };
    DateTime::parse_from_rfc3339(raw)
        .map(|t| Some(t.timestamp_millis()))
        .map_err(|source| WindowError::Timestamp {
            step: step.to_string(),
            value: raw.to_string(),
            source,
        })
}

fn filter_samples<T: Timestamped + Clone>(samples: &[T], window: &TimeWindow) -> Vec<T> {
    samples
        .iter()
        .filter(|s| window.contains(s.unix_time_ms()))
        .cloned()
        .collect()
}

/// Samples of both series that fall inside `window`.
pub fn filter_window(series: &MetricsSeries, window: &TimeWindow) -> MetricsSeries {
    MetricsSeries {
        cpu_load_percentages: filter_samples(&series.cpu_load_percentages, window),
        memory_usage_mbs: filter_samples(&series.memory_usage_mbs, window),
    }
}

/// One sub-series per window, in window order.
pub fn correlate(series: &MetricsSeries, windows: &[TimeWindow]) -> Vec<StepSeries> {
    windows
        .iter()
        .map(|w| StepSeries {
            name: w.name.clone(),
            series: filter_window(series, w),
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Step listings
// ---------------------------------------------------------------------------

/// One step as listed by the workflow jobs API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepRecord {
    pub name: String,
    #[serde(default, alias = "startedAt")]
    pub started_at: Option<String>,
    #[serde(default, alias = "completedAt")]
    pub completed_at: Option<String>,
}

impl StepRecord {
    pub fn to_window(&self) -> Result<TimeWindow, WindowError> {
        TimeWindow::from_rfc3339(
            self.name.clone(),
            self.started_at.as_deref(),
            self.completed_at.as_deref(),
        )
    }
}

#[derive(Deserialize)]
struct JobRecord {
    #[serde(default)]
    steps: Vec<StepRecord>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StepListing {
    Steps(Vec<StepRecord>),
    Jobs { jobs: Vec<JobRecord> },
    Job { steps: Vec<StepRecord> },
}

/// Parse a step listing into windows.
///
/// Accepts a bare array of steps, a single job object (`{"steps": [...]}`)
/// or a jobs listing (`{"jobs": [{"steps": [...]}, ...]}`). Jobs are
/// flattened in order.
pub fn load_step_windows(json: &str) -> Result<Vec<TimeWindow>, WindowError> {
    let steps = match serde_json::from_str::<StepListing>(json)? {
        StepListing::Steps(steps) | StepListing::Job { steps } => steps,
        StepListing::Jobs { jobs } => jobs.into_iter().flat_map(|j| j.steps).collect(),
    };
    steps.iter().map(StepRecord::to_window).collect()
}
