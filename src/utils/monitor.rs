use std::fmt;
#[cfg(feature = "cli")]
use std::sync::Mutex;
use std::time::{Duration, Instant};
#[cfg(feature = "cli")]
use sysinfo::{Pid, RefreshKind, System};

/// Stages of a CLI run that get their own timing line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Load,
    Fit,
    Predict,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Load => "load",
            Phase::Fit => "fit",
            Phase::Predict => "predict",
        };
        f.write_str(name)
    }
}

/// Rows handled per second, `None` when no time was measured.
pub fn rows_per_second(rows: usize, elapsed: Duration) -> Option<f64> {
    let secs = elapsed.as_secs_f64();
    (secs > 0.0).then(|| rows as f64 / secs)
}

#[cfg(feature = "cli")]
#[derive(Debug, Clone)]
pub struct ProcessStats {
    pub cpu_usage: f32,
    pub memory_usage_mb: u64,
    pub peak_memory_mb: u64,
}

/// Times each phase of a run and, when enabled, samples process CPU and
/// memory at the phase boundary.
#[cfg(feature = "cli")]
pub struct SystemMonitor {
    system: Mutex<System>,
    pid: Option<Pid>,
    start_time: Instant,
    phase_start: Mutex<Instant>,
    peak_memory: Mutex<u64>,
    enabled: bool,
}

#[cfg(feature = "cli")]
impl SystemMonitor {
    pub fn new(enabled: bool) -> Self {
        let mut system = System::new_with_specifics(RefreshKind::everything());

        let pid = match sysinfo::get_current_pid() {
            Ok(pid) => Some(pid),
            Err(e) => {
                if enabled {
                    tracing::warn!("System monitoring unavailable: {}", e);
                }
                None
            }
        };

        if enabled {
            system.refresh_all();
        }

        let now = Instant::now();
        Self {
            system: Mutex::new(system),
            pid,
            start_time: now,
            phase_start: Mutex::new(now),
            peak_memory: Mutex::new(0),
            enabled: enabled && pid.is_some(),
        }
    }

    pub fn process_stats(&self) -> Option<ProcessStats> {
        if !self.enabled {
            return None;
        }

        let mut system = self.system.lock().ok()?;
        system.refresh_all();
        let process = system.process(self.pid?)?;
        let memory_mb = process.memory() / 1024 / 1024;

        let mut peak = self.peak_memory.lock().ok()?;
        *peak = (*peak).max(memory_mb);

        Some(ProcessStats {
            cpu_usage: process.cpu_usage(),
            memory_usage_mb: memory_mb,
            peak_memory_mb: *peak,
        })
    }

    /// Ends `phase`, which handled `rows` rows, and starts timing the next one.
    pub fn finish_phase(&self, phase: Phase, rows: usize) -> Duration {
        let elapsed = match self.phase_start.lock() {
            Ok(mut start) => {
                let elapsed = start.elapsed();
                *start = Instant::now();
                elapsed
            }
            Err(_) => Duration::ZERO,
        };

        if let Some(stats) = self.process_stats() {
            let throughput = rows_per_second(rows, elapsed)
                .map(|r| format!("{:.0} rows/s", r))
                .unwrap_or_else(|| "n/a".to_string());
            tracing::info!(
                "📊 {} - {} rows in {:?} ({}), CPU: {:.1}%, Memory: {}MB, Peak: {}MB",
                phase,
                rows,
                elapsed,
                throughput,
                stats.cpu_usage,
                stats.memory_usage_mb,
                stats.peak_memory_mb
            );
        }
        elapsed
    }

    pub fn log_final_stats(&self) {
        if let Some(stats) = self.process_stats() {
            tracing::info!(
                "📊 Final Stats - Total Time: {:?}, Peak Memory: {}MB",
                self.start_time.elapsed(),
                stats.peak_memory_mb
            );
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }
}

// 為非CLI環境提供空實現
#[cfg(not(feature = "cli"))]
pub struct SystemMonitor {
    phase_start: std::cell::Cell<Instant>,
}

#[cfg(not(feature = "cli"))]
impl SystemMonitor {
    pub fn new(_enabled: bool) -> Self {
        Self {
            phase_start: std::cell::Cell::new(Instant::now()),
        }
    }

    pub fn finish_phase(&self, _phase: Phase, _rows: usize) -> Duration {
        let elapsed = self.phase_start.get().elapsed();
        self.phase_start.set(Instant::now());
        elapsed
    }

    pub fn log_final_stats(&self) {}

    pub fn is_enabled(&self) -> bool {
        false
    }
}
