// Host capability queries
use sysinfo::{CpuRefreshKind, RefreshKind, System};

/// Ceiling applied to explicit parallelism when the core count is unknown.
pub const FALLBACK_MAX_PARALLELISM: usize = 64;

/// Logical core count, or `None` if the platform does not report one.
pub fn host_parallelism() -> Option<usize> {
    let system = System::new_with_specifics(RefreshKind::new().with_cpu(CpuRefreshKind::new()));
    match system.cpus().len() {
        0 => None,
        n => Some(n),
    }
}
