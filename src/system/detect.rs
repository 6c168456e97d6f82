use crate::core::profile::HostCapabilities;
use std::path::Path;

const MEMINFO: &str = "/proc/meminfo";

/// Snapshot what the auto profile needs to know about this machine.
pub fn detect_capabilities() -> HostCapabilities {
    let cpu_count = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    let memory_mb = available_memory_mb(Path::new(MEMINFO));
    let privileged = is_running_as_root();

    tracing::debug!(
        "Host capabilities: {} CPUs, {:?} MB available, privileged={}",
        cpu_count,
        memory_mb,
        privileged
    );

    HostCapabilities {
        cpu_count,
        memory_mb,
        privileged,
    }
}

pub fn is_running_as_root() -> bool {
    #[cfg(unix)]
    {
        // SAFETY: geteuid has no preconditions and cannot fail.
        unsafe { libc::geteuid() == 0 }
    }

    #[cfg(not(unix))]
    {
        false
    }
}

/// `MemAvailable` when the kernel reports it, otherwise `MemTotal`.
fn available_memory_mb(path: &Path) -> Option<u64> {
    let content = std::fs::read_to_string(path).ok()?;
    parse_meminfo(&content)
}

fn parse_meminfo(content: &str) -> Option<u64> {
    let field = |name: &str| {
        content.lines().find_map(|line| {
            let rest = line.strip_prefix(name)?.strip_prefix(':')?;
            rest.split_whitespace().next()?.parse::<u64>().ok()
        })
    };
    field("MemAvailable").or_else(|| field("MemTotal")).map(|kb| kb / 1024)
}
