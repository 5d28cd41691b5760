//! Stacked bar charts as mermaid `xychart` blocks.
//!
//! Mermaid has no native stacking, so each layer is drawn as its own bar
//! series holding the cumulative sum of itself and every layer after it.
//! The first layer is the tallest and is drawn first; later layers overdraw
//! it from the bottom up.
//!
//! Dense time axes keep every bar but blank most category labels so that at
//! most [`MAX_VISIBLE_LABELS`] remain readable.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Visible x-axis label budget per chart.
pub const MAX_VISIBLE_LABELS: usize = 12;

/// Color and display name of one series.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Legend {
    pub color: String,
    pub name: String,
}

impl Legend {
    pub fn new(color: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            color: color.into(),
            name: name.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct YAxis {
    pub title: String,
    /// Appended verbatim after the title, e.g. `0 --> 100`.
    pub range: Option<String>,
}

/// One chart: parallel layers sharing a time axis.
///
/// `layers[i]` belongs to `legends[i]` of the enclosing group.
#[derive(Debug, Clone, PartialEq)]
pub struct ChartData {
    /// `None` for the whole-run chart.
    pub step_name: Option<String>,
    pub layers: Vec<Vec<f64>>,
    pub times: Vec<DateTime<Utc>>,
    pub y_axis: YAxis,
}

impl ChartData {
    fn is_empty(&self) -> bool {
        self.layers.is_empty() || (self.times.is_empty() && self.layers.iter().all(Vec::is_empty))
    }

    fn label(&self) -> &str {
        self.step_name.as_deref().unwrap_or("All")
    }
}

/// A titled section with a shared legend and one or more charts.
#[derive(Debug, Clone, PartialEq)]
pub struct ChartGroup {
    pub title: String,
    pub legends: Vec<Legend>,
    pub charts: Vec<ChartData>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RenderError {
    #[error("chart {chart:?} has {layers} layers but {legends} legends")]
    LayerCount {
        chart: String,
        layers: usize,
        legends: usize,
    },
    #[error("chart {chart:?} layer {layer} has {len} points but the time axis has {times}")]
    LayerLength {
        chart: String,
        layer: usize,
        len: usize,
        times: usize,
    },
}

/// Cumulative layers, bottom-up from the last series.
///
/// `out[K-1] == layers[K-1]` and `out[k][t] == layers[k][t] + out[k+1][t]`.
/// Negative inputs are summed as-is.
pub fn stack_layers(layers: &[Vec<f64>]) -> Vec<Vec<f64>> {
    let mut stacked: Vec<Vec<f64>> = Vec::with_capacity(layers.len());
    for layer in layers.iter().rev() {
        let next = match stacked.last() {
            Some(below) => layer.iter().zip(below).map(|(v, b)| v + b).collect(),
            None => layer.clone(),
        };
        stacked.push(next);
    }
    stacked.reverse();
    stacked
}

/// `HH:MM:SS`, 24-hour, UTC.
pub fn format_time_label(t: &DateTime<Utc>) -> String {
    t.format("%H:%M:%S").to_string()
}

/// Blank all but `budget` labels; first and last always stay visible.
///
/// Interior survivors are spread evenly over `[1, n-2]`. The output keeps
/// the input length.
pub fn thin_labels(labels: Vec<String>, budget: usize) -> Vec<String> {
    let n = labels.len();
    if n <= budget {
        return labels;
    }
    let keep = visible_indices(n, budget);
    labels
        .into_iter()
        .enumerate()
        .map(|(i, l)| if keep.contains(&i) { l } else { String::new() })
        .collect()
}

fn visible_indices(n: usize, budget: usize) -> BTreeSet<usize> {
    let mut keep = BTreeSet::from([0, n - 1]);
    let slots = budget.saturating_sub(2);
    if slots == 0 || n < 3 {
        return keep;
    }

    let first = 1.0;
    let last = (n - 2) as f64;
    for i in 0..slots {
        let pos = if slots == 1 {
            (first + last) / 2.0
        } else {
            first + (last - first) * i as f64 / (slots - 1) as f64
        };
        keep.insert((pos.round() as usize).clamp(1, n - 2));
    }
    keep
}

/// Shortest form that round-trips, integers without a fraction.
fn format_number(v: f64) -> String {
    if !v.is_finite() {
        return "null".to_string();
    }
    if v == v.trunc() && v.abs() < 1e15 {
        format!("{}", v as i64)
    } else {
        format!("{v}")
    }
}

fn number_array(values: &[f64]) -> String {
    let items: Vec<String> = values.iter().map(|v| format_number(*v)).collect();
    format!("[{}]", items.join(","))
}

/// Renders [`ChartGroup`]s into a markdown report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChartRenderer {
    pub label_budget: usize,
}

impl Default for ChartRenderer {
    fn default() -> Self {
        Self {
            label_budget: MAX_VISIBLE_LABELS,
        }
    }
}

impl ChartRenderer {
    pub fn new(label_budget: usize) -> Self {
        Self {
            label_budget: label_budget.max(1),
        }
    }

    fn check(&self, chart: &ChartData, legends: &[Legend]) -> Result<(), RenderError> {
        if chart.layers.len() != legends.len() {
            return Err(RenderError::LayerCount {
                chart: chart.label().to_string(),
                layers: chart.layers.len(),
                legends: legends.len(),
            });
        }
        for (layer, values) in chart.layers.iter().enumerate() {
            if values.len() != chart.times.len() {
                return Err(RenderError::LayerLength {
                    chart: chart.label().to_string(),
                    layer,
                    len: values.len(),
                    times: chart.times.len(),
                });
            }
        }
        Ok(())
    }

    /// Mermaid block for one chart, or `None` when it has nothing to draw.
    pub fn render_chart(
        &self,
        chart: &ChartData,
        legends: &[Legend],
    ) -> Result<Option<String>, RenderError> {
        if chart.is_empty() {
            return Ok(None);
        }
        self.check(chart, legends)?;

        let palette: Vec<&str> = legends.iter().map(|l| l.color.as_str()).collect();
        let labels = thin_labels(
            chart.times.iter().map(format_time_label).collect(),
            self.label_budget,
        );

        let mut out = String::new();
        match &chart.step_name {
            None => out.push_str("#### All"),
            Some(name) => {
                out.push_str(&format!(
                    "#### Step `{name}`\n\n<details>\n<summary>Chart</summary>"
                ));
            }
        }
        out.push_str("\n\n```mermaid\n");
        out.push_str(&format!(
            "%%{{\n  init: {{\n    \"themeVariables\": {{\n      \"xyChart\": {{\n        \"plotColorPalette\": \"{}\"\n      }}\n    }}\n  }}\n}}%%\n",
            palette.join(", ")
        ));
        out.push_str("xychart\n\n");
        out.push_str(&format!("x-axis \"Time\" {}\n", serde_json::Value::from(labels)));
        out.push_str(&format!("y-axis \"{}\"", chart.y_axis.title));
        if let Some(range) = chart.y_axis.range.as_deref().filter(|r| !r.is_empty()) {
            out.push_str(&format!(" {range}"));
        }
        out.push('\n');
        for layer in stack_layers(&chart.layers) {
            out.push_str(&format!("bar {}\n", number_array(&layer)));
        }
        out.push_str("```");
        if chart.step_name.is_some() {
            out.push_str("\n\n</details>");
        }
        Ok(Some(out))
    }

    /// Full report: header, then per group its legend and non-empty charts.
    ///
    /// Groups with nothing to draw are left out entirely.
    pub fn render(&self, groups: &[ChartGroup], metrics_id: &str) -> Result<String, RenderError> {
        let mut sections: Vec<String> = Vec::new();

        for group in groups {
            let mut charts = Vec::with_capacity(group.charts.len());
            for chart in &group.charts {
                if let Some(body) = self.render_chart(chart, &group.legends)? {
                    charts.push(body);
                }
            }
            if charts.is_empty() {
                continue;
            }

            let legend_lines: Vec<String> = group
                .legends
                .iter()
                .map(|l| format!("* $${{\\color{{{c}}} \\verb|{c}: {n}|}}$$", c = l.color, n = l.name))
                .collect();
            sections.push(format!(
                "### {}\n\n#### Legends\n\n{}",
                group.title,
                legend_lines.join("\n")
            ));
            sections.extend(charts);
        }

        let mut out = format!("## Workflow Metrics\n\n### Metrics ID\n\n{metrics_id}");
        for section in sections {
            out.push_str("\n\n");
            out.push_str(&section);
        }
        Ok(out)
    }
}

/// [`ChartRenderer::render`] with the default label budget.
pub fn render(groups: &[ChartGroup], metrics_id: &str) -> Result<String, RenderError> {
    ChartRenderer::default().render(groups, metrics_id)
}
