//! Host and process facts for the diagnostic endpoints and pages.

use std::sync::Mutex;
use std::time::Instant;

use anyhow::{Result, anyhow};
use chrono::{DateTime, Local, Utc};
use sysinfo::{Pid, System};

use crate::config::UNKNOWN;

/// Point-in-time read of process and host state.
#[derive(Debug, Clone)]
pub struct DiagnosticsSnapshot {
    pub host_name: String,
    pub os_version: String,
    pub process_id: u32,
    /// Resident set size in bytes
    pub memory_bytes: u64,
    pub thread_count: usize,
    pub processor_count: usize,
    pub host_uptime_secs: u64,
    pub process_uptime_secs: u64,
    pub collected_at: DateTime<Utc>,
}

impl DiagnosticsSnapshot {
    /// Resident memory in whole megabytes.
    pub fn memory_mb(&self) -> u64 {
        self.memory_bytes / 1024 / 1024
    }
}

/// Reads process statistics through a shared `sysinfo::System`.
pub struct DiagnosticsCollector {
    system: Mutex<System>,
    pid: Pid,
    started: Instant,
}

impl DiagnosticsCollector {
    pub fn new() -> Result<Self> {
        let pid = sysinfo::get_current_pid()
            .map_err(|e| anyhow!("Failed to resolve current process id: {e}"))?;

        Ok(Self {
            system: Mutex::new(System::new()),
            pid,
            started: Instant::now(),
        })
    }

    /// Refresh and read the current process.
    pub fn snapshot(&self) -> Result<DiagnosticsSnapshot> {
        let mut system = self
            .system
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        if !system.refresh_process(self.pid) {
            return Err(anyhow!("Process {} not found while refreshing", self.pid));
        }
        let process = system
            .process(self.pid)
            .ok_or_else(|| anyhow!("Process {} disappeared after refresh", self.pid))?;

        Ok(DiagnosticsSnapshot {
            host_name: host_name(),
            os_version: os_version(),
            process_id: std::process::id(),
            memory_bytes: process.memory(),
            // Task lists are only available on Linux; elsewhere report the main thread.
            thread_count: process.tasks().map_or(1, |tasks| tasks.len().max(1)),
            processor_count: processor_count(),
            host_uptime_secs: System::uptime(),
            process_uptime_secs: self.started.elapsed().as_secs(),
            collected_at: Utc::now(),
        })
    }
}

/// Facts shown on the landing page and dashboard.
#[derive(Debug, Clone)]
pub struct HostFacts {
    pub server_time: String,
    pub machine_name: String,
    pub user_name: String,
    pub os_version: String,
    pub app_version: &'static str,
}

impl HostFacts {
    pub fn gather() -> Self {
        Self {
            server_time: Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
            machine_name: host_name(),
            user_name: os_user_name(),
            os_version: os_version(),
            app_version: env!("CARGO_PKG_VERSION"),
        }
    }
}

pub fn host_name() -> String {
    System::host_name().unwrap_or_else(|| UNKNOWN.to_string())
}

pub fn os_version() -> String {
    System::long_os_version().unwrap_or_else(|| std::env::consts::OS.to_string())
}

fn processor_count() -> usize {
    std::thread::available_parallelism().map_or(1, |n| n.get())
}

fn os_user_name() -> String {
    std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_else(|_| UNKNOWN.to_string())
}
