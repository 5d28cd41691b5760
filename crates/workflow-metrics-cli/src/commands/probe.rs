use std::time::Duration;

use workflow_metrics_core::{BYTES_PER_MB, MetricsProbe, ProbeError, ProcfsProbe};

async fn read(probe: &ProcfsProbe, window: Duration) -> Result<serde_json::Value, ProbeError> {
    // First CPU read only primes the counters.
    probe.cpu_load().await?;
    tokio::time::sleep(window).await;
    let cpu = probe.cpu_load().await?;
    let mem = probe.memory_usage().await?;

    Ok(serde_json::json!({
        "cpu": cpu,
        "memory": mem,
        "memory_mb": {
            "used": mem.active_bytes as f64 / BYTES_PER_MB,
            "free": mem.available_bytes as f64 / BYTES_PER_MB,
        },
    }))
}

pub fn run(window_ms: u64) {
    let rt = super::runtime();
    let probe = ProcfsProbe::new();
    match rt.block_on(read(&probe, Duration::from_millis(window_ms))) {
        Ok(v) => match serde_json::to_string_pretty(&v) {
            Ok(s) => println!("{s}"),
            Err(e) => {
                eprintln!("Error: {e}");
                std::process::exit(1);
            }
        },
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    }
}
