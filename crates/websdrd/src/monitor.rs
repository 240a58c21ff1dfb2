//! Resource monitor for the WebSDR daemon.
//!
//! Periodically samples process CPU and memory together with the registry
//! counters (clients, running receivers, graph state) and logs them,
//! warning when a threshold is crossed.
//!
//! # Panic-Free Guarantees
//!
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - A missing process entry yields a zeroed sample

use std::process;
use std::time::Duration;

use sysinfo::{Pid, System};
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::registry::{RegistryHandle, RegistryStats};

/// Memory usage warning threshold in MB.
pub const HIGH_MEMORY_THRESHOLD_MB: u64 = 512;

/// CPU usage warning threshold (percentage).
pub const HIGH_CPU_THRESHOLD_PERCENT: f32 = 90.0;

/// Process resource usage at one instant.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ProcessSample {
    pub memory_mb: u64,
    pub cpu_percent: f32,
}

/// Reads this process's resource usage via `sysinfo`.
///
/// CPU usage is computed between consecutive refreshes, so the first
/// sample reports 0%.
pub struct ProcessMonitor {
    system: System,
    pid: Pid,
}

impl ProcessMonitor {
    pub fn new() -> Self {
        Self {
            system: System::new(),
            pid: Pid::from_u32(process::id()),
        }
    }

    /// Refreshes and returns the current sample.
    pub fn sample(&mut self) -> ProcessSample {
        // A single-process refresh does not compute CPU usage
        self.system.refresh_all();

        self.system
            .process(self.pid)
            .map(|p| ProcessSample {
                memory_mb: p.memory() / 1024 / 1024,
                cpu_percent: p.cpu_usage(),
            })
            .unwrap_or_default()
    }
}

impl Default for ProcessMonitor {
    fn default() -> Self {
        Self::new()
    }
}

/// Spawns the monitoring task.
///
/// Runs until `cancel_token` fires or the registry stops answering.
pub fn spawn_monitor_task(
    registry: RegistryHandle,
    period: Duration,
    cancel_token: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut monitor = ProcessMonitor::new();
        let mut tick = interval(period);
        tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

        // Baseline for CPU calculation
        let _ = monitor.sample();

        info!(interval_secs = period.as_secs(), "Resource monitor started");

        loop {
            tokio::select! {
                biased;

                _ = cancel_token.cancelled() => {
                    info!("Resource monitor shutting down");
                    break;
                }

                _ = tick.tick() => {
                    let Some(stats) = registry.stats().await else {
                        debug!("Resource monitor stopping: registry gone");
                        break;
                    };
                    log_sample(&monitor.sample(), &stats);
                }
            }
        }
    })
}

fn log_sample(sample: &ProcessSample, stats: &RegistryStats) {
    let cpu_percent = format!("{:.1}", sample.cpu_percent);

    if sample.memory_mb > HIGH_MEMORY_THRESHOLD_MB {
        warn!(
            memory_mb = sample.memory_mb,
            threshold_mb = HIGH_MEMORY_THRESHOLD_MB,
            cpu_percent,
            num_clients = stats.num_clients,
            "HIGH MEMORY: daemon memory usage above threshold"
        );
    } else if sample.cpu_percent > HIGH_CPU_THRESHOLD_PERCENT {
        warn!(
            cpu_percent,
            threshold_percent = HIGH_CPU_THRESHOLD_PERCENT,
            num_clients = stats.num_clients,
            running_receivers = stats.running_receivers,
            "HIGH CPU: daemon CPU usage above threshold"
        );
    } else {
        info!(
            memory_mb = sample.memory_mb,
            cpu_percent,
            num_clients = stats.num_clients,
            running_receivers = stats.running_receivers,
            graph = %stats.graph_state,
            "Daemon status"
        );
    }
}
