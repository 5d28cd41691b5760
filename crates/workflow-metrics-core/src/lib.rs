//! # workflow-metrics-core
//!
//! **CPU and memory charts for a CI workflow run.**
//!
//! A background [`Sampler`] records CPU load and memory usage on a fixed
//! timeline. After the run, the accumulated [`MetricsSeries`] is sliced per
//! workflow step with [`correlate`] and rendered as stacked mermaid bar
//! charts for the job summary.
//!
//! ## Quick Start
//!
//! ```
//! use workflow_metrics_core::{
//!     CpuLoadSample, MemoryUsageSample, MetricsSeries, TimeWindow, render_metrics_report,
//! };
//!
//! let series = MetricsSeries {
//!     cpu_load_percentages: vec![CpuLoadSample { unix_time_ms: 1_000, user: 20.0, system: 5.0 }],
//!     memory_usage_mbs: vec![MemoryUsageSample { unix_time_ms: 1_000, used: 512.0, free: 1024.0 }],
//! };
//! let steps = vec![TimeWindow::new("Build", Some(0), None)];
//!
//! let report = render_metrics_report(&series, &steps, "run-42").unwrap();
//! assert!(report.contains("#### Step `Build`"));
//! ```
//!
//! ## Architecture
//!
//! Probe → Sampler → (HTTP snapshot) → Correlate → Chart groups → Report

pub mod chart;
pub mod correlate;
pub mod probe;
pub mod report;
pub mod sampler;
pub mod series;

pub use chart::{
    ChartData, ChartGroup, ChartRenderer, Legend, MAX_VISIBLE_LABELS, RenderError, YAxis,
    format_time_label, render, stack_layers, thin_labels,
};
pub use correlate::{
    StepRecord, StepSeries, TimeWindow, WindowError, correlate, filter_window, load_step_windows,
};
pub use probe::{CpuLoad, MemoryUsage, MetricsProbe, ProbeError, ProcfsProbe};
pub use report::{build_chart_groups, render_metrics_report};
pub use sampler::{DEFAULT_INTERVAL, INTERVAL_ENV, Sampler, SamplerConfig, SamplerHealth};
pub use series::{
    BYTES_PER_MB, CpuLoadSample, MemoryUsageSample, MetricsSeries, SnapshotError, Timestamped,
    parse_snapshot,
};

/// Library version (from Cargo.toml).
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
