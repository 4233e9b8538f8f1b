//! Resource monitoring: peak resident memory and wall-clock time of one
//! conversion.
//!
//! ## Lifecycle
//!
//! ```text
//! start ──▶ sampler thread: probe → peak = max(peak, rss) → wait(poll) ─┐
//!   │                         ▲                                          │
//!   │                         └──────────────────────────────────────────┘
//!   ▼
//! finish / drop ──▶ signal stop ──▶ join ──▶ read peak ──▶ log summary
//! ```
//!
//! The sampler waits on a channel with the poll interval as timeout, so a stop
//! signal is observed within one interval. The peak accumulator has exactly
//! one writer (the sampler) and is read only after the sampler has been
//! joined.
//!
//! [`MonitorSession`] stops its sampler in `Drop` as well as in
//! [`MonitorSession::finish`]. A conversion that returns early, panics, or
//! whose future is dropped still gets its summary logged and never leaves a
//! sampler thread behind.
//!
//! The peak is an approximation: an allocation spike shorter than the poll
//! interval can fall between two samples.

use crate::error::BenchError;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System};
use tracing::{debug, info, warn};

/// Default sampling period.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// A source of resident-memory readings.
///
/// Called only from the sampler thread. Returning `None` skips the sample.
pub trait MemoryProbe: Send + 'static {
    fn resident_bytes(&mut self) -> Option<u64>;
}

/// How often the whole process table is rescanned for new descendants.
pub const TREE_RESCAN_INTERVAL: Duration = Duration::from_millis(100);

/// Reads the resident set size of the current process, optionally adding all
/// of its descendant processes.
///
/// On Linux the process table also lists every thread as its own entry, with
/// the owning process as parent and the whole process RSS as its memory.
/// Thread entries are skipped, otherwise each thread would add the process
/// RSS again.
///
/// Discovering descendants needs a scan of every process on the host, which
/// is far too slow for a 10 ms poll. The full scan runs at most once per
/// [`TREE_RESCAN_INTERVAL`]; samples in between refresh only the known tree.
/// A child that starts and exits between two scans is not counted.
pub struct ProcessMemoryProbe {
    system: System,
    pid: Pid,
    include_children: bool,
    tree: Vec<Pid>,
    last_scan: Option<Instant>,
    rescan_every: Duration,
    full_scans: u64,
}

impl ProcessMemoryProbe {
    /// Probe for the running process.
    pub fn current(include_children: bool) -> Result<Self, BenchError> {
        let pid = sysinfo::get_current_pid()
            .map_err(|e| BenchError::Internal(format!("cannot determine own pid: {e}")))?;
        Ok(Self {
            system: System::new(),
            pid,
            include_children,
            tree: vec![pid],
            last_scan: None,
            rescan_every: TREE_RESCAN_INTERVAL,
            full_scans: 0,
        })
    }

    fn rescan_due(&self) -> bool {
        self.last_scan
            .map_or(true, |at| at.elapsed() >= self.rescan_every)
    }

    fn refresh_tree(&mut self, refresh: ProcessRefreshKind) {
        if self.rescan_due() {
            self.system
                .refresh_processes_specifics(ProcessesToUpdate::All, true, refresh);
            let entries = self
                .system
                .processes()
                .iter()
                .filter(|(_, process)| process.thread_kind().is_none())
                .map(|(pid, process)| (*pid, process.parent()));
            self.tree = descendants(self.pid, entries);
            self.last_scan = Some(Instant::now());
            self.full_scans += 1;
        } else {
            self.system
                .refresh_processes_specifics(ProcessesToUpdate::Some(&self.tree), true, refresh);
        }
    }

    fn tree_rss(&self) -> Option<u64> {
        let root = self.system.process(self.pid)?;
        let children: u64 = self
            .tree
            .iter()
            .filter(|pid| **pid != self.pid)
            .filter_map(|pid| self.system.process(*pid))
            .filter(|process| process.thread_kind().is_none())
            .map(|process| process.memory())
            .sum();
        Some(root.memory() + children)
    }
}

/// `root` followed by every process whose parent chain leads to it.
///
/// `entries` are `(pid, parent)` pairs for processes only, never threads.
fn descendants(root: Pid, entries: impl Iterator<Item = (Pid, Option<Pid>)>) -> Vec<Pid> {
    let mut children: HashMap<Pid, Vec<Pid>> = HashMap::new();
    for (pid, parent) in entries {
        if let Some(parent) = parent {
            children.entry(parent).or_default().push(pid);
        }
    }

    let mut tree = vec![root];
    let mut seen: HashSet<Pid> = HashSet::from([root]);
    let mut stack: Vec<Pid> = children.get(&root).cloned().unwrap_or_default();
    while let Some(pid) = stack.pop() {
        if !seen.insert(pid) {
            continue;
        }
        tree.push(pid);
        if let Some(grandchildren) = children.get(&pid) {
            stack.extend(grandchildren.iter().copied());
        }
    }
    tree
}

impl MemoryProbe for ProcessMemoryProbe {
    fn resident_bytes(&mut self) -> Option<u64> {
        let refresh = ProcessRefreshKind::new().with_memory();
        if self.include_children {
            self.refresh_tree(refresh);
            self.tree_rss()
        } else {
            self.system.refresh_processes_specifics(
                ProcessesToUpdate::Some(&[self.pid]),
                true,
                refresh,
            );
            self.system.process(self.pid).map(|p| p.memory())
        }
    }
}

// ── Usage summary ────────────────────────────────────────────────────────

/// What one monitoring session measured.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceUsage {
    /// Highest resident memory seen across all samples, in bytes.
    pub peak_rss_bytes: u64,
    /// Wall-clock time between session start and shutdown.
    pub elapsed: Duration,
    /// Number of successful samples taken.
    pub samples: u64,
}

impl ResourceUsage {
    pub fn peak_rss_mb(&self) -> f64 {
        self.peak_rss_bytes as f64 / (1024.0 * 1024.0)
    }

    pub fn elapsed_secs(&self) -> f64 {
        self.elapsed.as_secs_f64()
    }
}

// ── Monitor ──────────────────────────────────────────────────────────────

/// Factory for monitoring sessions.
#[derive(Debug, Clone, Copy)]
pub struct ResourceMonitor {
    poll_interval: Duration,
}

impl Default for ResourceMonitor {
    fn default() -> Self {
        Self::new(DEFAULT_POLL_INTERVAL)
    }
}

impl ResourceMonitor {
    pub fn new(poll_interval: Duration) -> Self {
        Self {
            poll_interval: poll_interval.max(Duration::from_millis(1)),
        }
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Start sampling with `probe`. The returned session must be kept alive
    /// for as long as the monitored operation runs.
    pub fn start<P: MemoryProbe>(&self, mut probe: P) -> MonitorSession {
        let peak = Arc::new(AtomicU64::new(0));
        let samples = Arc::new(AtomicU64::new(0));
        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let poll = self.poll_interval;

        let sampler_peak = Arc::clone(&peak);
        let sampler_samples = Arc::clone(&samples);
        let spawned = thread::Builder::new()
            .name("rss-sampler".into())
            .spawn(move || loop {
                if let Some(rss) = probe.resident_bytes() {
                    sampler_peak.fetch_max(rss, Ordering::Relaxed);
                    sampler_samples.fetch_add(1, Ordering::Relaxed);
                }
                match stop_rx.recv_timeout(poll) {
                    Err(RecvTimeoutError::Timeout) => continue,
                    // Explicit stop or the session was dropped.
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                }
            });

        let sampler = match spawned {
            Ok(handle) => Some(handle),
            Err(e) => {
                warn!("Could not start memory sampler, peak RSS will read 0: {}", e);
                None
            }
        };
        debug!("Memory sampler started ({}ms interval)", poll.as_millis());

        MonitorSession {
            started: Instant::now(),
            stop_tx: Some(stop_tx),
            sampler,
            peak,
            samples,
            usage: None,
        }
    }

    /// Start sampling the current process (and its children when asked).
    pub fn start_process(&self, include_children: bool) -> Result<MonitorSession, BenchError> {
        Ok(self.start(ProcessMemoryProbe::current(include_children)?))
    }

    /// Run `f` under a session and return its value with the usage summary.
    ///
    /// If `f` panics the session is still shut down and its summary logged
    /// before the panic continues unwinding.
    pub fn scoped<P, T, F>(&self, probe: P, f: F) -> (T, ResourceUsage)
    where
        P: MemoryProbe,
        F: FnOnce() -> T,
    {
        let session = self.start(probe);
        let value = f();
        (value, session.finish())
    }
}

/// A running monitoring session. See the module docs for the lifecycle.
#[must_use = "dropping the session stops monitoring immediately"]
pub struct MonitorSession {
    started: Instant,
    stop_tx: Option<mpsc::Sender<()>>,
    sampler: Option<JoinHandle<()>>,
    peak: Arc<AtomicU64>,
    samples: Arc<AtomicU64>,
    usage: Option<ResourceUsage>,
}

impl MonitorSession {
    /// Stop sampling, log the summary and return it.
    pub fn finish(mut self) -> ResourceUsage {
        self.shutdown()
    }

    /// True while the sampler thread has not been joined.
    pub fn is_sampling(&self) -> bool {
        self.sampler.is_some()
    }

    fn shutdown(&mut self) -> ResourceUsage {
        if let Some(usage) = self.usage {
            return usage;
        }

        if let Some(tx) = self.stop_tx.take() {
            // A send error means the sampler already exited.
            let _ = tx.send(());
        }
        if let Some(handle) = self.sampler.take() {
            if handle.join().is_err() {
                warn!("Memory sampler panicked; reporting the last peak it recorded");
            }
        }

        let usage = ResourceUsage {
            peak_rss_bytes: self.peak.load(Ordering::Relaxed),
            elapsed: self.started.elapsed(),
            samples: self.samples.load(Ordering::Relaxed),
        };

        info!("Peak RSS: {:.2} MB", usage.peak_rss_mb());
        info!(
            "Processing completed. Time taken: {:.2} seconds",
            usage.elapsed_secs()
        );
        debug!("Memory sampler stopped after {} samples", usage.samples);

        self.usage = Some(usage);
        usage
    }
}

impl Drop for MonitorSession {
    fn drop(&mut self) {
        self.shutdown();
    }
}
