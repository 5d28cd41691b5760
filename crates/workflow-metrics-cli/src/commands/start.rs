use std::path::Path;
use std::process::{Command, Stdio};

use workflow_metrics_core::INTERVAL_ENV;

/// `<exe> serve ...` detached from our stdio so the caller can exit.
fn serve_command(exe: &Path, host: &str, port: u16, interval_seconds: Option<&str>) -> Command {
    let mut cmd = Command::new(exe);
    cmd.arg("serve")
        .arg("--host")
        .arg(host)
        .arg("--port")
        .arg(port.to_string())
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null());
    if let Some(secs) = interval_seconds {
        cmd.env(INTERVAL_ENV, secs);
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        // Own process group: a Ctrl+C aimed at the launcher leaves the sampler alone.
        cmd.process_group(0);
    }
    cmd
}

pub fn run(host: &str, port: u16, interval_seconds: Option<&str>) {
    let exe = match std::env::current_exe() {
        Ok(p) => p,
        Err(e) => {
            eprintln!("Error: cannot locate own executable: {e}");
            std::process::exit(1);
        }
    };

    match serve_command(&exe, host, port, interval_seconds).spawn() {
        // Dropping the handle neither waits for nor kills the child.
        Ok(child) => println!("Server started with PID: {}", child.id()),
        Err(e) => {
            eprintln!("Error: failed to start sampler: {e}");
            std::process::exit(1);
        }
    }
}
