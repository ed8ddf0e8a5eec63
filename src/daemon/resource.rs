//! Process memory reporting for daemon status.

use std::fs;

use tracing::debug;

/// Resource monitor for tracking daemon resource usage.
#[derive(Debug, Default)]
pub struct ResourceMonitor;

impl ResourceMonitor {
    pub fn new() -> Self {
        Self
    }

    /// Get current process memory usage in bytes.
    ///
    /// Reads from /proc/self/statm on Linux. Returns 0 on error or non-Linux.
    pub fn memory_usage(&self) -> u64 {
        #[cfg(target_os = "linux")]
        {
            self.linux_memory_usage()
        }
        #[cfg(not(target_os = "linux"))]
        {
            0
        }
    }

    #[cfg(target_os = "linux")]
    fn linux_memory_usage(&self) -> u64 {
        // /proc/self/statm format: size resident share text lib data dt (in pages)
        const PAGE_SIZE: u64 = 4096;

        match fs::read_to_string("/proc/self/statm") {
            Ok(content) => content
                .split_whitespace()
                .nth(1)
                .and_then(|rss| rss.parse::<u64>().ok())
                .map(|pages| pages * PAGE_SIZE)
                .unwrap_or(0),
            Err(e) => {
                debug!(error = %e, "Failed to read /proc/self/statm");
                0
            }
        }
    }

    /// Get memory usage as a human-readable string.
    pub fn memory_usage_human(&self) -> String {
        format_bytes(self.memory_usage())
    }
}

pub fn format_bytes(bytes: u64) -> String {
    if bytes == 0 {
        return "unknown".to_string();
    }

    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}
