//! # Content Host
//!
//! Runs one content host process outside a mobile shell. Lines on stdin
//! stand in for the host's activity callbacks:
//!
//! | Command | Callback |
//! |---------|----------|
//! | `pause` | stopped + save instance state |
//! | `resume` | resumed |
//! | `status` | print bus states and ports |
//! | `metrics` | print Prometheus metrics |
//! | `quit` | destroyed |
//!
//! Ctrl+C is treated as `quit`.
//!
//! ## Startup Sequence
//!
//! 1. Initialize logging and metrics
//! 2. Load configuration from the environment
//! 3. Build the host context (locks the home directory)
//! 4. Start both buses and wait for SERVING
//! 5. Serve host commands until `quit`

use std::io::BufRead;
use std::str::FromStr;
use std::sync::Arc;
use std::thread;

use anyhow::{Context, Result};
use tokio::sync::mpsc;
use tracing::{info, warn};

use host_runtime::adapters::{default_runners, LoggingHostAdapter};
use host_runtime::{HostActivity, HostConfig, HostContext};
use host_telemetry::{gather_text, init_logging, register_metrics, TelemetryConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HostCommand {
    Pause,
    Resume,
    Status,
    Metrics,
    Quit,
}

impl FromStr for HostCommand {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pause" | "stop" => Ok(HostCommand::Pause),
            "resume" | "start" => Ok(HostCommand::Resume),
            "status" => Ok(HostCommand::Status),
            "metrics" => Ok(HostCommand::Metrics),
            "quit" | "exit" => Ok(HostCommand::Quit),
            other => Err(format!("unknown command '{other}'")),
        }
    }
}

fn main() -> Result<()> {
    let _telemetry =
        init_logging(&TelemetryConfig::from_env()).context("Failed to initialize logging")?;
    register_metrics().context("Failed to register metrics")?;

    let config = HostConfig::from_env().context("Invalid configuration")?;
    info!(home = %config.paths.home.display(), "Starting content host");

    let adapter = Arc::new(LoggingHostAdapter::new());
    let context = HostContext::new(config, adapter.clone(), adapter, default_runners())
        .context("Failed to build host context")?;
    let activity = HostActivity::new(Arc::new(context));

    let (commands, mut inbox) = mpsc::unbounded_channel();
    spawn_stdin_reader(commands.clone()).context("Failed to read stdin")?;
    if let Some(runtime) = activity.context().runtime_handle() {
        let commands = commands.clone();
        runtime.spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                let _ = commands.send(HostCommand::Quit);
            }
        });
    }
    drop(commands);

    let outcome = activity
        .on_created()
        .context("Failed to spawn starter threads")?
        .join();
    if let Err(e) = &outcome.worker {
        warn!(error = %e, "Background jobs unavailable");
    }
    let payload = outcome.server.context("Server bus failed to start")?;
    info!(port = payload.port, zip_port = ?payload.zip_port, "Content host ready");

    while let Some(command) = inbox.blocking_recv() {
        match command {
            HostCommand::Pause => {
                activity.on_stopped();
                activity.on_save_instance_state();
            }
            HostCommand::Resume => activity.on_resumed(),
            HostCommand::Status => print_status(&activity),
            HostCommand::Metrics => match gather_text() {
                Ok(text) => print!("{text}"),
                Err(e) => warn!(error = %e, "Cannot gather metrics"),
            },
            HostCommand::Quit => break,
        }
    }

    activity.on_destroyed().context("Shutdown did not complete")?;
    info!("Content host stopped");
    Ok(())
}

fn spawn_stdin_reader(commands: mpsc::UnboundedSender<HostCommand>) -> std::io::Result<()> {
    thread::Builder::new()
        .name("stdin-commands".into())
        .spawn(move || {
            for line in std::io::stdin().lock().lines() {
                let Ok(line) = line else { break };
                if line.trim().is_empty() {
                    continue;
                }
                match line.parse::<HostCommand>() {
                    Ok(command) => {
                        if commands.send(command).is_err() {
                            break;
                        }
                    }
                    Err(e) => warn!(error = %e, "Ignoring input"),
                }
            }
        })?;
    Ok(())
}

fn print_status(activity: &HostActivity) {
    let context = activity.context();
    let server = context.server();
    println!(
        "server: {} port={:?} zip_port={:?}",
        server.current_state(),
        server.bound_port(),
        server.zip_port()
    );
    let worker = context.worker();
    let in_flight = context.worker_pool().map_or(0, |pool| pool.in_flight());
    println!("worker: {} in_flight={in_flight}", worker.current_state());
}
