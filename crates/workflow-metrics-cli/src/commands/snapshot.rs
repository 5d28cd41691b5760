use std::path::Path;

use workflow_metrics_core::MetricsSeries;

fn snapshot_json(series: &MetricsSeries) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(series)
}

pub fn run(url: &str, output: Option<&Path>, timeout_sec: u64) {
    let rt = super::runtime();
    let series = match rt.block_on(super::fetch_snapshot(url, timeout_sec)) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };

    let json = match snapshot_json(&series) {
        Ok(j) => j,
        Err(e) => {
            eprintln!("Error: cannot encode snapshot: {e}");
            std::process::exit(1);
        }
    };

    match output {
        Some(path) => {
            if let Err(e) = std::fs::write(path, json + "\n") {
                eprintln!("Error: cannot write {}: {e}", path.display());
                std::process::exit(1);
            }
            eprintln!(
                "Saved {} CPU and {} memory samples to {}",
                series.cpu_load_percentages.len(),
                series.memory_usage_mbs.len(),
                path.display()
            );
        }
        None => println!("{json}"),
    }
}
