use std::sync::Arc;

use log::{info, warn};
use workflow_metrics_core::{ProcfsProbe, Sampler, SamplerConfig};

/// Flag first, then the environment; invalid values fall back to the default.
fn sampler_config(interval_seconds: Option<&str>) -> SamplerConfig {
    match interval_seconds {
        Some(raw) => SamplerConfig::from_interval_seconds(Some(raw)),
        None => SamplerConfig::from_env(),
    }
}

pub fn run(host: &str, port: u16, interval_seconds: Option<&str>) {
    let config = sampler_config(interval_seconds);
    let sampler = Arc::new(Sampler::new(config));

    let base = format!("http://{host}:{port}");
    println!("Workflow Metrics Sampler v{}", workflow_metrics_core::VERSION);
    println!("   {base}");
    println!("   sampling every {:?}", config.interval);
    println!();
    println!("   Endpoints:");
    println!("     GET /          API index");
    println!("     GET /metrics   Snapshot of all samples (try: curl {base}/metrics)");
    println!("     GET /health    Sampler health");
    println!();

    let rt = super::runtime();
    let result = rt.block_on(async {
        let sampling = Arc::clone(&sampler).spawn(ProcfsProbe::new());
        let served =
            workflow_metrics_server::run_server(sampler, host, port, shutdown_signal()).await;
        sampling.abort();
        served
    });

    if let Err(e) = result {
        eprintln!("Error: cannot serve on {host}:{port}: {e}");
        std::process::exit(1);
    }
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("received Ctrl+C, shutting down"),
        Err(e) => {
            warn!("cannot listen for Ctrl+C: {e}");
            std::future::pending::<()>().await;
        }
    }
}
