//! Process memory probes
//!
//! Two collaborators feed memory data into the profiler and the monitor:
//! - [`MemoryProbe`]: current and peak resident set size of this process
//! - [`MemoryLimit`]: the memory cap the process runs under, if any
//!
//! Peak RSS is a process-wide high-water mark. Operations running
//! concurrently in one process share it.

use std::fs;

const BYTES_PER_MB: f64 = 1_048_576.0;

/// Cgroup limits at or above this are treated as unlimited (v1 reports
/// `PAGE_COUNTER_MAX` rounded to pages instead of a sentinel)
const CGROUP_UNLIMITED_FLOOR: u64 = 1 << 60;

/// Convert bytes to megabytes rounded to 2 decimals
pub fn bytes_to_mb(bytes: i64) -> f64 {
    round_to(bytes as f64 / BYTES_PER_MB, 2)
}

/// Round to a fixed number of decimal places
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

/// Point-in-time memory reading
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MemorySample {
    /// Current resident set size in bytes
    pub current: u64,
    /// Peak resident set size in bytes
    pub peak: u64,
}

/// Source of current / peak resident memory
pub trait MemoryProbe: Send + Sync {
    /// Read memory usage, `None` when the platform offers no reading
    fn sample(&self) -> Option<MemorySample>;
}

/// Source of the process memory cap
pub trait MemoryLimit: Send + Sync {
    /// Byte cap, `None` meaning unbounded
    fn limit_bytes(&self) -> Option<u64>;
}

/// Reads RSS of the current process from the operating system
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessMemory;

impl MemoryProbe for ProcessMemory {
    fn sample(&self) -> Option<MemorySample> {
        let current = current_rss_bytes()?;
        let peak = peak_rss_bytes().unwrap_or(current).max(current);
        Some(MemorySample { current, peak })
    }
}

/// Resolves the memory cap from rlimit and cgroup settings
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessMemoryLimit;

impl MemoryLimit for ProcessMemoryLimit {
    fn limit_bytes(&self) -> Option<u64> {
        let rlimit = get_address_space_limit();
        let cgroup = get_cgroup_limit();
        match (rlimit, cgroup) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }
}

/// A fixed cap, mostly useful for tests and explicit configuration
#[derive(Debug, Clone, Copy, Default)]
pub struct FixedMemoryLimit(pub Option<u64>);

impl MemoryLimit for FixedMemoryLimit {
    fn limit_bytes(&self) -> Option<u64> {
        self.0
    }
}

// ============================================================================
// Platform readers
// ============================================================================

fn current_rss_bytes() -> Option<u64> {
    #[cfg(target_os = "linux")]
    {
        let raw = fs::read_to_string("/proc/self/statm").ok()?;
        parse_statm_rss(&raw, page_size()?)
    }

    #[cfg(target_os = "macos")]
    {
        let pid = std::process::id().to_string();
        let output = std::process::Command::new("ps")
            .args(["-o", "rss=", "-p", pid.as_str()])
            .output()
            .ok()?;
        parse_kib(&String::from_utf8_lossy(&output.stdout))
    }

    #[cfg(not(any(target_os = "linux", target_os = "macos")))]
    {
        None
    }
}

#[cfg(target_os = "linux")]
fn page_size() -> Option<u64> {
    let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    u64::try_from(size).ok().filter(|s| *s > 0)
}

/// Resident bytes from `/proc/<pid>/statm` (second field, in pages)
#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
fn parse_statm_rss(raw: &str, page_size: u64) -> Option<u64> {
    let pages: u64 = raw.split_whitespace().nth(1)?.parse().ok()?;
    pages.checked_mul(page_size)
}

/// Bytes from a KiB count as printed by `ps -o rss=`
#[cfg_attr(not(target_os = "macos"), allow(dead_code))]
fn parse_kib(raw: &str) -> Option<u64> {
    raw.trim().parse::<u64>().ok()?.checked_mul(1024)
}

/// Peak RSS bytes from `getrusage`
fn peak_rss_bytes() -> Option<u64> {
    #[cfg(unix)]
    {
        let mut usage: libc::rusage = unsafe { std::mem::zeroed() };
        let rc = unsafe { libc::getrusage(libc::RUSAGE_SELF, &mut usage) };
        if rc != 0 || usage.ru_maxrss <= 0 {
            return None;
        }
        let max_rss = usage.ru_maxrss as u64;

        // macOS reports bytes, Linux reports kilobytes
        if cfg!(target_os = "macos") {
            Some(max_rss)
        } else {
            Some(max_rss * 1024)
        }
    }

    #[cfg(not(unix))]
    {
        None
    }
}

fn get_address_space_limit() -> Option<u64> {
    #[cfg(unix)]
    {
        let mut limit = libc::rlimit {
            rlim_cur: 0,
            rlim_max: 0,
        };
        let rc = unsafe { libc::getrlimit(libc::RLIMIT_AS, &mut limit) };
        if rc != 0 || limit.rlim_cur == libc::RLIM_INFINITY {
            return None;
        }
        Some(limit.rlim_cur as u64)
    }

    #[cfg(not(unix))]
    {
        None
    }
}

fn get_cgroup_limit() -> Option<u64> {
    // cgroup v2 first, then v1
    for path in [
        "/sys/fs/cgroup/memory.max",
        "/sys/fs/cgroup/memory/memory.limit_in_bytes",
    ] {
        if let Ok(raw) = fs::read_to_string(path) {
            return parse_cgroup_limit(&raw);
        }
    }
    None
}

fn parse_cgroup_limit(raw: &str) -> Option<u64> {
    let raw = raw.trim();
    if raw == "max" {
        return None;
    }
    let bytes: u64 = raw.parse().ok()?;
    if bytes == 0 || bytes >= CGROUP_UNLIMITED_FLOOR {
        None
    } else {
        Some(bytes)
    }
}
