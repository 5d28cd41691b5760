use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

use workflow_metrics_core::{
    MetricsSeries, TimeWindow, load_step_windows, parse_snapshot, render_metrics_report,
};

pub struct RenderCommandConfig<'a> {
    pub url: &'a str,
    pub input: Option<&'a Path>,
    pub steps: Option<&'a Path>,
    pub metrics_id: &'a str,
    pub output: Option<&'a Path>,
    pub step_summary: Option<&'a Path>,
    pub timeout_sec: u64,
}

/// Where the rendered report goes.
#[derive(Debug, PartialEq, Eq)]
enum Destination<'a> {
    /// Replace the file contents.
    Overwrite(&'a Path),
    /// Append to the job summary.
    Append(&'a Path),
    Stdout,
}

impl<'a> Destination<'a> {
    fn pick(output: Option<&'a Path>, step_summary: Option<&'a Path>) -> Self {
        match (output, step_summary) {
            (Some(p), _) => Destination::Overwrite(p),
            (None, Some(p)) => Destination::Append(p),
            (None, None) => Destination::Stdout,
        }
    }
}

fn read_snapshot_file(path: &Path) -> Result<MetricsSeries, String> {
    let json = std::fs::read_to_string(path)
        .map_err(|e| format!("cannot read {}: {e}", path.display()))?;
    parse_snapshot(&json).map_err(|e| format!("{}: {e}", path.display()))
}

fn read_steps_file(path: &Path) -> Result<Vec<TimeWindow>, String> {
    let json = std::fs::read_to_string(path)
        .map_err(|e| format!("cannot read {}: {e}", path.display()))?;
    load_step_windows(&json).map_err(|e| format!("{}: {e}", path.display()))
}

fn write_report(report: &str, dest: &Destination<'_>) -> std::io::Result<()> {
    match dest {
        Destination::Overwrite(path) => std::fs::write(path, format!("{report}\n")),
        Destination::Append(path) => {
            let mut file = OpenOptions::new().create(true).append(true).open(path)?;
            writeln!(file, "{report}")
        }
        Destination::Stdout => {
            println!("{report}");
            Ok(())
        }
    }
}

fn load_series(config: &RenderCommandConfig<'_>) -> Result<MetricsSeries, String> {
    match config.input {
        Some(path) => read_snapshot_file(path),
        None => super::runtime()
            .block_on(super::fetch_snapshot(config.url, config.timeout_sec))
            .map_err(|e| e.to_string()),
    }
}

/// Render and write the report, returning the process exit code.
///
/// Load failures do not stop the report: a missing snapshot renders the
/// header only and a bad step listing renders the whole-run charts only.
/// Either still yields a non-zero exit code.
fn execute(config: &RenderCommandConfig<'_>) -> i32 {
    let mut failed = false;

    let series = match load_series(config) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error: failed to load metrics: {e}");
            failed = true;
            MetricsSeries::new()
        }
    };

    let windows = match config.steps.map(read_steps_file).transpose() {
        Ok(w) => w.unwrap_or_default(),
        Err(e) => {
            eprintln!("Error: invalid step listing {e}");
            failed = true;
            Vec::new()
        }
    };

    let report = match render_metrics_report(&series, &windows, config.metrics_id) {
        Ok(r) => r,
        Err(e) => {
            eprintln!("Error: failed to render metrics: {e}");
            return 1;
        }
    };

    let dest = Destination::pick(config.output, config.step_summary);
    if let Err(e) = write_report(&report, &dest) {
        eprintln!("Error: cannot write report: {e}");
        return 1;
    }

    if failed { 1 } else { 0 }
}

pub fn run(config: RenderCommandConfig<'_>) {
    let code = execute(&config);
    if code != 0 {
        std::process::exit(code);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SNAPSHOT: &str = r#"{"cpuLoadPercentages":[
        {"unixTimeMs":1704067200000,"user":25.5,"system":10.5},
        {"unixTimeMs":1704067205000,"user":30,"system":12}
    ],"memoryUsageMBs":[
        {"unixTimeMs":1704067200000,"used":4096,"free":8192},
        {"unixTimeMs":1704067205000,"used":4200,"free":8000}
    ]}"#;

    // -----------------------------------------------------------------------
    // Destination
    // -----------------------------------------------------------------------

    #[test]
    fn test_output_wins_over_step_summary() {
        let out = Path::new("out.md");
        let summary = Path::new("summary.md");
        assert_eq!(
            Destination::pick(Some(out), Some(summary)),
            Destination::Overwrite(out)
        );
        assert_eq!(
            Destination::pick(None, Some(summary)),
            Destination::Append(summary)
        );
        assert_eq!(Destination::pick(None, None), Destination::Stdout);
    }

    #[test]
    fn test_step_summary_is_appended() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("summary.md");
        std::fs::write(&path, "# Earlier step\n").unwrap();

        write_report("## Workflow Metrics", &Destination::Append(&path)).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text, "# Earlier step\n## Workflow Metrics\n");
    }

    #[test]
    fn test_output_is_overwritten() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.md");
        std::fs::write(&path, "stale").unwrap();

        write_report("fresh", &Destination::Overwrite(&path)).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "fresh\n");
    }

    // -----------------------------------------------------------------------
    // Inputs
    // -----------------------------------------------------------------------

    #[test]
    fn test_render_from_files() {
        let dir = tempfile::tempdir().unwrap();
        let snapshot = dir.path().join("metrics.json");
        let steps = dir.path().join("steps.json");
        std::fs::write(&snapshot, SNAPSHOT).unwrap();
        std::fs::write(
            &steps,
            r#"[{"name":"Build","started_at":"2024-01-01T00:00:04Z","completed_at":null}]"#,
        )
        .unwrap();

        let series = read_snapshot_file(&snapshot).unwrap();
        let windows = read_steps_file(&steps).unwrap();
        let report = render_metrics_report(&series, &windows, "42").unwrap();

        assert!(report.starts_with("## Workflow Metrics\n\n### Metrics ID\n\n42"));
        assert!(report.contains("#### Step `Build`"));
        assert!(report.contains("bar [36,42]"));
        assert!(report.contains("bar [42]"));
    }

    #[test]
    fn test_missing_snapshot_file_names_path() {
        let err = read_snapshot_file(Path::new("/nonexistent/metrics.json")).unwrap_err();
        assert!(err.contains("/nonexistent/metrics.json"));
    }

    #[test]
    fn test_invalid_snapshot_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metrics.json");
        std::fs::write(
            &path,
            r#"{"cpuLoadPercentages":[{"unixTimeMs":1,"user":150,"system":0}],"memoryUsageMBs":[]}"#,
        )
        .unwrap();
        assert!(read_snapshot_file(&path).is_err());
    }

    // -----------------------------------------------------------------------
    // Best-effort output
    // -----------------------------------------------------------------------

    fn config_for<'a>(
        url: &'a str,
        input: Option<&'a Path>,
        steps: Option<&'a Path>,
        output: &'a Path,
    ) -> RenderCommandConfig<'a> {
        RenderCommandConfig {
            url,
            input,
            steps,
            metrics_id: "run-7",
            output: Some(output),
            step_summary: None,
            timeout_sec: 1,
        }
    }

    #[test]
    fn test_unreachable_sampler_writes_header_and_fails() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("report.md");
        // Bind then drop to get a port nobody listens on.
        let port = std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();
        let url = format!("http://127.0.0.1:{port}");

        let code = execute(&config_for(&url, None, None, &output));

        assert_ne!(code, 0);
        assert_eq!(
            std::fs::read_to_string(&output).unwrap(),
            "## Workflow Metrics\n\n### Metrics ID\n\nrun-7\n"
        );
    }

    #[test]
    fn test_bad_step_listing_still_renders_whole_run() {
        let dir = tempfile::tempdir().unwrap();
        let snapshot = dir.path().join("metrics.json");
        let steps = dir.path().join("steps.json");
        let output = dir.path().join("report.md");
        std::fs::write(&snapshot, SNAPSHOT).unwrap();
        std::fs::write(&steps, r#"[{"name":"Build","started_at":"not-a-date"}]"#).unwrap();

        let code = execute(&config_for(
            "http://127.0.0.1:1",
            Some(snapshot.as_path()),
            Some(steps.as_path()),
            &output,
        ));

        assert_ne!(code, 0);
        let report = std::fs::read_to_string(&output).unwrap();
        assert!(report.contains("#### All"));
        assert!(report.contains("bar [36,42]"));
        assert!(!report.contains("#### Step"));
    }

    #[test]
    fn test_successful_render_exits_zero() {
        let dir = tempfile::tempdir().unwrap();
        let snapshot = dir.path().join("metrics.json");
        let output = dir.path().join("report.md");
        std::fs::write(&snapshot, SNAPSHOT).unwrap();

        let code = execute(&config_for(
            "http://127.0.0.1:1",
            Some(snapshot.as_path()),
            None,
            &output,
        ));

        assert_eq!(code, 0);
        assert!(std::fs::read_to_string(&output)
            .unwrap()
            .starts_with("## Workflow Metrics\n\n### Metrics ID\n\nrun-7"));
    }

    #[test]
    fn test_load_series_prefers_input() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metrics.json");
        std::fs::write(&path, SNAPSHOT).unwrap();

        let config = RenderCommandConfig {
            // Nothing listens here; the input file must be used instead.
            url: "http://127.0.0.1:1",
            input: Some(path.as_path()),
            steps: None,
            metrics_id: "id",
            output: None,
            step_summary: None,
            timeout_sec: 1,
        };
        let series = load_series(&config).unwrap();
        assert_eq!(series.cpu_load_percentages.len(), 2);
    }
}
