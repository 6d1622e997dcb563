//! Vitrine Daemon - Display broadcast server
//!
//! Serves the object media over HTTP and pushes the currently displayed
//! object to every connected screen over `/ws`.
//!
//! # Usage
//!
//! ```bash
//! # Start the server (foreground, ./config.json if present)
//! vitrined start
//!
//! # Start with an explicit config file, in the background
//! vitrined start -d --config /etc/vitrine/config.toml
//!
//! # Stop the server
//! vitrined stop
//!
//! # Check server status
//! vitrined status
//!
//! # Override the configured log level
//! RUST_LOG=vitrined=debug vitrined start
//! ```
//!
//! # Signal Handling
//!
//! - SIGTERM/SIGINT: Graceful shutdown, every screen connection is closed

use std::env;
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::process;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use vitrined::config::Config;
use vitrined::server::{default_config_path, VitrineServer};

/// vitrine - educational object display server
#[derive(Parser, Debug)]
#[command(name = "vitrined", version, about)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the server
    Start {
        /// Run as a background daemon (fork to background)
        #[arg(short = 'd', long)]
        daemon: bool,

        /// Config file (.toml or .json)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Stop the running server
    Stop,
    /// Show server status
    Status,
}

fn state_dir() -> PathBuf {
    dirs::state_dir()
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join("vitrine")
}

/// Returns the path to the PID file.
fn pid_file_path() -> PathBuf {
    state_dir().join("vitrined.pid")
}

/// Returns the path to the log file used in daemon mode.
fn log_file_path() -> PathBuf {
    state_dir().join("vitrined.log")
}

/// Reads the PID from the PID file, if it exists.
fn read_pid() -> Option<u32> {
    let path = pid_file_path();
    let mut file = File::open(&path).ok()?;
    let mut contents = String::new();
    file.read_to_string(&mut contents).ok()?;
    contents.trim().parse().ok()
}

/// Writes the current PID to the PID file.
fn write_pid() -> Result<()> {
    let path = pid_file_path();
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).context("Failed to create state directory")?;
    }
    let mut file = File::create(&path).context("Failed to create PID file")?;
    write!(file, "{}", process::id()).context("Failed to write PID")?;
    Ok(())
}

fn remove_pid_file() {
    let _ = fs::remove_file(pid_file_path());
}

/// Checks if a process with the given PID is running.
fn is_process_running(pid: u32) -> bool {
    PathBuf::from(format!("/proc/{pid}")).exists()
}

/// Checks if the server is already running, clearing a stale PID file.
fn is_server_running() -> Option<u32> {
    if let Some(pid) = read_pid() {
        if is_process_running(pid) {
            return Some(pid);
        }
        remove_pid_file();
    }
    None
}

/// Sends SIGTERM to the server process.
fn stop_server(pid: u32) -> Result<()> {
    #[cfg(unix)]
    {
        let pid = i32::try_from(pid).context("PID out of range")?;
        // SAFETY: kill has no memory safety preconditions
        let result = unsafe { libc::kill(pid, libc::SIGTERM) };
        if result != 0 {
            bail!("Failed to send SIGTERM to process {}", pid);
        }
    }
    #[cfg(not(unix))]
    {
        bail!("Stop command is only supported on Unix systems");
    }
    Ok(())
}

/// Loads the explicit config file, or `./config.json` when present.
fn load_config(explicit: Option<&Path>) -> Result<Config> {
    match explicit {
        Some(path) => Config::load(path)
            .with_context(|| format!("Failed to load config from {}", path.display())),
        None => {
            let fallback = default_config_path();
            if fallback.exists() {
                Config::load(&fallback)
                    .with_context(|| format!("Failed to load config from {}", fallback.display()))
            } else {
                Ok(Config::default())
            }
        }
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    let command = args.command.unwrap_or(Command::Start {
        daemon: false,
        config: None,
    });

    match command {
        Command::Start { daemon, config } => {
            if let Some(pid) = is_server_running() {
                eprintln!("Server is already running (PID {pid})");
                eprintln!("Use 'vitrined stop' to stop it first.");
                process::exit(1);
            }

            let config = load_config(config.as_deref())?;

            if daemon {
                // Daemonize before starting tokio runtime
                daemonize()?;
            }

            write_pid()?;
            let result = run_server(config);
            remove_pid_file();
            result
        }
        Command::Stop => {
            if let Some(pid) = is_server_running() {
                println!("Stopping server (PID {pid})...");
                stop_server(pid)?;

                for _ in 0..50 {
                    if !is_process_running(pid) {
                        println!("Server stopped.");
                        return Ok(());
                    }
                    std::thread::sleep(std::time::Duration::from_millis(100));
                }

                eprintln!("Server did not stop within 5 seconds.");
                process::exit(1);
            } else {
                println!("Server is not running.");
                Ok(())
            }
        }
        Command::Status => {
            if let Some(pid) = is_server_running() {
                println!("Server is running (PID {pid})");
                println!("Log: {}", log_file_path().display());
                Ok(())
            } else {
                println!("Server is not running.");
                process::exit(1);
            }
        }
    }
}

/// Daemonizes the current process.
///
/// The working directory is kept so relative media paths still resolve.
fn daemonize() -> Result<()> {
    use daemonize::Daemonize;

    let log_path = log_file_path();
    if let Some(parent) = log_path.parent() {
        fs::create_dir_all(parent).context("Failed to create log directory")?;
    }

    let stdout = File::create(&log_path).context("Failed to create log file for stdout")?;
    let stderr = stdout
        .try_clone()
        .context("Failed to create log file for stderr")?;
    let working_directory = env::current_dir().context("Failed to read working directory")?;

    Daemonize::new()
        .working_directory(working_directory)
        .stdout(stdout)
        .stderr(stderr)
        .start()
        .context("Failed to daemonize")?;

    Ok(())
}

/// Runs the server (async entry point).
#[tokio::main]
async fn run_server(config: Config) -> Result<()> {
    let directive = config.log_directive()?;
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directive));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        pid = process::id(),
        "vitrine server starting"
    );

    let cancel_token = CancellationToken::new();

    let shutdown_token = cancel_token.clone();
    tokio::spawn(async move {
        if let Err(e) = wait_for_shutdown_signal().await {
            error!(error = %e, "Error waiting for shutdown signal");
        }
        info!("Shutdown signal received");
        shutdown_token.cancel();
    });

    let server = VitrineServer::new(config, cancel_token);
    if let Err(e) = server.run().await {
        error!(error = %e, "Server error");
        return Err(e.into());
    }

    info!("vitrine server stopped");
    Ok(())
}

/// Waits for a shutdown signal (SIGTERM or SIGINT).
async fn wait_for_shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;

        tokio::select! {
            _ = sigterm.recv() => {
                info!("Received SIGTERM");
            }
            _ = sigint.recv() => {
                info!("Received SIGINT");
            }
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        info!("Received Ctrl+C");
    }

    Ok(())
}
