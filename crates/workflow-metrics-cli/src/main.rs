//! CLI for workflow-metrics: sample a CI run, then chart it in the job summary.

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "workflow-metrics")]
#[command(about = "Sample CPU and memory during a workflow run and chart them per step")]
#[command(version = workflow_metrics_core::VERSION)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the sampler and serve its snapshot over HTTP until Ctrl+C
    Serve {
        /// Bind address
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        /// Port to listen on
        #[arg(long, default_value_t = workflow_metrics_server::DEFAULT_PORT)]
        port: u16,

        /// Seconds between samples; defaults to $METRICS_INTERVAL_SECONDS, then 5
        #[arg(long)]
        interval_seconds: Option<String>,
    },

    /// Launch `serve` as a detached background process and print its PID
    Start {
        /// Bind address
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        /// Port to listen on
        #[arg(long, default_value_t = workflow_metrics_server::DEFAULT_PORT)]
        port: u16,

        /// Seconds between samples, forwarded to the background sampler
        /// (which otherwise inherits $METRICS_INTERVAL_SECONDS)
        #[arg(long)]
        interval_seconds: Option<String>,
    },

    /// Fetch the current snapshot from a running sampler as JSON
    Snapshot {
        /// Base URL of the sampler
        #[arg(long, default_value = commands::DEFAULT_URL)]
        url: String,

        /// Write the JSON here instead of stdout
        #[arg(long)]
        output: Option<PathBuf>,

        /// Per-request timeout in seconds
        #[arg(long, default_value_t = 10)]
        timeout_sec: u64,
    },

    /// Render the metrics report (whole run plus one chart per step)
    Render {
        /// Base URL of the sampler
        #[arg(long, default_value = commands::DEFAULT_URL)]
        url: String,

        /// Read a saved snapshot instead of fetching from --url
        #[arg(long)]
        input: Option<PathBuf>,

        /// Step listing JSON (array of steps, {"steps": [...]} or {"jobs": [...]})
        #[arg(long)]
        steps: Option<PathBuf>,

        /// Identifier shown in the report header
        #[arg(long, env = "GITHUB_RUN_ID", default_value = "local")]
        metrics_id: String,

        /// Write the report here (overwrites)
        #[arg(long)]
        output: Option<PathBuf>,

        /// Job summary file the report is appended to when --output is absent
        #[arg(long, env = "GITHUB_STEP_SUMMARY")]
        step_summary: Option<PathBuf>,

        /// Per-request timeout in seconds
        #[arg(long, default_value_t = 10)]
        timeout_sec: u64,
    },

    /// Take one CPU/memory reading from this host and print it as JSON
    Probe {
        /// Milliseconds between the two CPU counter reads
        #[arg(long, default_value_t = 1000)]
        window_ms: u64,
    },
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve {
            host,
            port,
            interval_seconds,
        } => commands::serve::run(&host, port, interval_seconds.as_deref()),
        Commands::Start {
            host,
            port,
            interval_seconds,
        } => commands::start::run(&host, port, interval_seconds.as_deref()),
        Commands::Snapshot {
            url,
            output,
            timeout_sec,
        } => commands::snapshot::run(&url, output.as_deref(), timeout_sec),
        Commands::Render {
            url,
            input,
            steps,
            metrics_id,
            output,
            step_summary,
            timeout_sec,
        } => commands::render::run(commands::render::RenderCommandConfig {
            url: &url,
            input: input.as_deref(),
            steps: steps.as_deref(),
            metrics_id: &metrics_id,
            output: output.as_deref(),
            step_summary: step_summary.as_deref(),
            timeout_sec,
        }),
        Commands::Probe { window_ms } => commands::probe::run(window_ms),
    }
}
