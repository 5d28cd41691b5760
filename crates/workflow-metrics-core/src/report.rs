//! Map a run's series and its step windows onto chart groups.

use chrono::{DateTime, Utc};

use crate::chart::{ChartData, ChartGroup, Legend, RenderError, YAxis, render};
use crate::correlate::{StepSeries, TimeWindow, correlate};
use crate::series::{CpuLoadSample, MemoryUsageSample, MetricsSeries, Timestamped};

pub const CPU_TITLE: &str = "CPU Loads";
pub const MEMORY_TITLE: &str = "Memory Usages";

// Series from `parse_snapshot` are range-checked; only hand-built ones can
// reach the epoch fallback.
fn to_times<T: Timestamped>(samples: &[T]) -> Vec<DateTime<Utc>> {
    samples
        .iter()
        .map(|s| DateTime::from_timestamp_millis(s.unix_time_ms()).unwrap_or_default())
        .collect()
}

fn cpu_chart(step_name: Option<&str>, samples: &[CpuLoadSample]) -> ChartData {
    ChartData {
        step_name: step_name.map(str::to_string),
        layers: vec![
            samples.iter().map(|s| s.system).collect(),
            samples.iter().map(|s| s.user).collect(),
        ],
        times: to_times(samples),
        y_axis: YAxis {
            title: "%".to_string(),
            range: Some("0 --> 100".to_string()),
        },
    }
}

fn memory_chart(step_name: Option<&str>, samples: &[MemoryUsageSample]) -> ChartData {
    ChartData {
        step_name: step_name.map(str::to_string),
        layers: vec![
            samples.iter().map(|s| s.free).collect(),
            samples.iter().map(|s| s.used).collect(),
        ],
        times: to_times(samples),
        y_axis: YAxis {
            title: "MB".to_string(),
            range: None,
        },
    }
}

/// CPU and memory groups, whole-run chart first, then one chart per step.
///
/// Steps that selected no samples are passed through; the renderer drops
/// their empty charts.
pub fn build_chart_groups(all: &MetricsSeries, steps: &[StepSeries]) -> Vec<ChartGroup> {
    let cpu_charts = std::iter::once(cpu_chart(None, &all.cpu_load_percentages))
        .chain(
            steps
                .iter()
                .map(|s| cpu_chart(Some(&s.name), &s.series.cpu_load_percentages)),
        )
        .collect();
    let memory_charts = std::iter::once(memory_chart(None, &all.memory_usage_mbs))
        .chain(
            steps
                .iter()
                .map(|s| memory_chart(Some(&s.name), &s.series.memory_usage_mbs)),
        )
        .collect();

    vec![
        ChartGroup {
            title: CPU_TITLE.to_string(),
            legends: vec![Legend::new("Orange", "System"), Legend::new("Red", "User")],
            charts: cpu_charts,
        },
        ChartGroup {
            title: MEMORY_TITLE.to_string(),
            legends: vec![Legend::new("Green", "Free"), Legend::new("Blue", "Used")],
            charts: memory_charts,
        },
    ]
}

/// Correlate, group and render in one go.
pub fn render_metrics_report(
    series: &MetricsSeries,
    windows: &[TimeWindow],
    metrics_id: &str,
) -> Result<String, RenderError> {
    let steps = correlate(series, windows);
    render(&build_chart_groups(series, &steps), metrics_id)
}
