//! WebSDR Daemon - multi-client receiver control server
//!
//! This binary runs the WebSocket control plane: clients connect, drive
//! their own receiver, and receive state updates.
//!
//! # Usage
//!
//! ```bash
//! # Start the daemon (foreground)
//! websdrd start
//!
//! # Start the daemon with a config file, in the background
//! websdrd --config /etc/websdr.toml start -d
//!
//! # Stop the daemon
//! websdrd stop
//!
//! # Check daemon status
//! websdrd status
//!
//! # Validate a config file
//! websdrd --config /etc/websdr.toml check-config
//! ```

use std::env;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::process;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use daemonize::Daemonize;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use websdrd::config::{Config, CONFIG_ENV, LISTEN_ENV};
use websdrd::monitor::spawn_monitor_task;
use websdrd::registry::spawn_registry;
use websdrd::server::SdrServer;

/// WebSDR daemon - multi-client receiver control server
#[derive(Parser, Debug)]
#[command(name = "websdrd", version, about)]
struct Args {
    /// Config file (TOML). Falls back to $WEBSDR_CONFIG, then built-in defaults
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

/// How long `stop` waits for the daemon to exit
const STOP_TIMEOUT: Duration = Duration::from_secs(5);
const STOP_POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the daemon
    Start {
        /// Run as a background daemon (fork to background)
        #[arg(short = 'd', long)]
        daemon: bool,
    },
    /// Stop the running daemon
    Stop,
    /// Show daemon status
    Status,
    /// Validate the configuration and print a summary
    CheckConfig,
}

/// Files belonging to one daemon instance, keyed by its listen port.
struct Instance {
    port: u16,
    pid_file: PathBuf,
    log_file: PathBuf,
}

impl Instance {
    fn for_config(config: &Config) -> Result<Self> {
        let port = config.listen_addr()?.port();
        let dir = dirs::state_dir()
            .unwrap_or_else(|| PathBuf::from("/tmp"))
            .join("websdr");
        Ok(Self {
            port,
            pid_file: dir.join(format!("websdrd-{port}.pid")),
            log_file: dir.join(format!("websdrd-{port}.log")),
        })
    }

    /// PID of a live daemon for this port. Stale PID files are removed.
    fn running_pid(&self) -> Option<u32> {
        let pid = fs::read_to_string(&self.pid_file).ok()?.trim().parse().ok()?;
        if process_alive(pid) {
            Some(pid)
        } else {
            self.remove_pid_file();
            None
        }
    }

    fn write_pid_file(&self) -> Result<()> {
        if let Some(parent) = self.pid_file.parent() {
            fs::create_dir_all(parent).context("Failed to create state directory")?;
        }
        fs::write(&self.pid_file, process::id().to_string()).context("Failed to write PID file")
    }

    fn remove_pid_file(&self) {
        let _ = fs::remove_file(&self.pid_file);
    }

    /// Detaches from the terminal, sending stdout and stderr to the log file.
    fn daemonize(&self) -> Result<()> {
        if let Some(parent) = self.log_file.parent() {
            fs::create_dir_all(parent).context("Failed to create log directory")?;
        }
        let stdout = File::create(&self.log_file).context("Failed to create log file")?;
        let stderr = stdout.try_clone().context("Failed to clone log file handle")?;

        Daemonize::new()
            .working_directory("/")
            .stdout(stdout)
            .stderr(stderr)
            .start()
            .context("Failed to daemonize")
    }
}

#[cfg(unix)]
fn process_alive(pid: u32) -> bool {
    let Ok(pid) = i32::try_from(pid) else {
        return false;
    };
    // Signal 0 checks existence without delivering anything
    unsafe { libc::kill(pid, 0) == 0 }
}

#[cfg(not(unix))]
fn process_alive(_pid: u32) -> bool {
    false
}

#[cfg(unix)]
fn send_sigterm(pid: u32) -> Result<()> {
    let pid = i32::try_from(pid).context("PID out of range")?;
    if unsafe { libc::kill(pid, libc::SIGTERM) } != 0 {
        bail!("Failed to send SIGTERM to process {pid}");
    }
    Ok(())
}

#[cfg(not(unix))]
fn send_sigterm(_pid: u32) -> Result<()> {
    bail!("Stop command is only supported on Unix systems")
}

/// Polls until `pid` exits or `limit` elapses. Returns true if it exited.
fn wait_for_exit(pid: u32, limit: Duration) -> bool {
    let deadline = Instant::now() + limit;
    while Instant::now() < deadline {
        if !process_alive(pid) {
            return true;
        }
        thread::sleep(STOP_POLL_INTERVAL);
    }
    !process_alive(pid)
}

/// Resolves the config path from the flag or environment, then loads it.
fn load_config(flag: Option<&Path>) -> Result<Config> {
    let from_env = env::var_os(CONFIG_ENV).map(PathBuf::from);
    let path = flag.map(Path::to_path_buf).or(from_env);

    let mut config = Config::load_or_default(path.as_deref())
        .with_context(|| match &path {
            Some(p) => format!("Failed to load config from {}", p.display()),
            None => "Invalid built-in config".to_string(),
        })?;
    config
        .apply_listen_override(env::var(LISTEN_ENV).ok())
        .with_context(|| format!("Invalid {LISTEN_ENV}"))?;
    Ok(config)
}

fn main() -> Result<()> {
    let args = Args::parse();
    let config = load_config(args.config.as_deref())?;

    match args.command.unwrap_or(Command::Start { daemon: false }) {
        Command::Start { daemon } => start(config, daemon),
        Command::Stop => stop(&config),
        Command::Status => status(&config),
        Command::CheckConfig => {
            print_summary(&config);
            Ok(())
        }
    }
}

fn start(config: Config, daemon: bool) -> Result<()> {
    let instance = Instance::for_config(&config)?;
    if let Some(pid) = instance.running_pid() {
        bail!(
            "A daemon is already serving port {} (PID {pid}); run 'websdrd stop' first",
            instance.port
        );
    }

    if daemon {
        instance.daemonize()?;
    }
    instance.write_pid_file()?;

    let result = run_daemon(config);
    instance.remove_pid_file();
    result
}

fn stop(config: &Config) -> Result<()> {
    let instance = Instance::for_config(config)?;
    let Some(pid) = instance.running_pid() else {
        println!("No daemon on port {}.", instance.port);
        return Ok(());
    };

    println!("Stopping daemon on port {} (PID {pid})...", instance.port);
    send_sigterm(pid)?;
    if !wait_for_exit(pid, STOP_TIMEOUT) {
        bail!("Daemon did not stop within {}s", STOP_TIMEOUT.as_secs());
    }
    instance.remove_pid_file();
    println!("Daemon stopped.");
    Ok(())
}

fn status(config: &Config) -> Result<()> {
    let instance = Instance::for_config(config)?;
    match instance.running_pid() {
        Some(pid) => {
            println!("Daemon is running on {} (PID {pid})", config.listen);
            println!("Sources:     {}", config.sources.len());
            println!("Max clients: {}", config.max_clients);
            Ok(())
        }
        None => {
            println!("No daemon on port {}.", instance.port);
            process::exit(1);
        }
    }
}

fn print_summary(config: &Config) {
    println!("Config OK");
    println!("Listen:      {}", config.listen);
    println!("Max clients: {}", config.max_clients);
    println!("Heartbeat:   {}s", config.heartbeat_secs);
    println!("Auth:        {}", if config.auth.is_some() { "static" } else { "disabled" });
    for (ix, source) in config.sources.iter().enumerate() {
        println!(
            "Source {ix}:    {} ({}) {} Hz @ {} S/s",
            source.label, source.description, source.center_freq, source.sample_rate
        );
    }
}

#[tokio::main]
async fn run_daemon(config: Config) -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("websdrd=info".parse()?)
                .add_directive("websdr_core=info".parse()?)
                .add_directive("websdr_protocol=info".parse()?),
        )
        .init();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        pid = process::id(),
        sources = config.sources.len(),
        "WebSDR daemon starting"
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

    let registry = spawn_registry(config.loopback_backend(), config.registry_options())
        .context("Failed to start session registry")?;
    info!(max_clients = config.max_clients, "Session registry started");

    if let Some(period) = config.monitor_interval() {
        let _monitor_handle = spawn_monitor_task(registry.clone(), period, cancel_token.clone());
    }

    let server = SdrServer::bind(config.listen_addr()?, registry, cancel_token).await?;

    if let Err(e) = server.run().await {
        error!(error = %e, "Server error");
        return Err(e.into());
    }

    info!("WebSDR daemon stopped");
    Ok(())
}

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
