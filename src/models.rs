//! Normalized statistics schema exported for every cgroup node.
//!
//! Every category is optional: `None` means "not collected" (the subsystem is
//! not watched or did not produce the record), which is distinct from a
//! collected value of zero.
use std::collections::HashMap;

/// Data on CPU throttling.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct ThrottlingData {
    /// Number of periods with throttling active.
    pub periods: u64,
    /// Number of periods when the cgroup hit its throttling limit.
    pub throttled_periods: u64,
    /// Aggregate time the cgroup was throttled for, in nanoseconds.
    pub throttled_time: u64,
}

/// CPU time consumed since cgroup creation. All units are nanoseconds.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct CpuUsage {
    pub total_usage: u64,
    pub percpu_usage: Vec<u64>,
    pub usage_in_kernelmode: u64,
    pub usage_in_usermode: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct CpuStats {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cpu_usage: Option<CpuUsage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub throttling_data: Option<ThrottlingData>,
}

/// Current, peak and failure count of a memory counter, in bytes.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct MemoryData {
    pub usage: u64,
    pub max_usage: u64,
    pub failcnt: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct MemoryStats {
    /// Page cache, in bytes.
    pub cache: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<MemoryData>,
    /// Memory plus swap.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub swap_usage: Option<MemoryData>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kernel_usage: Option<MemoryData>,
    /// Every counter of `memory.stat`, keyed by its name.
    pub stats: HashMap<String, u64>,
}

/// A single per-device, per-operation block I/O counter.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct BlkioStatEntry {
    pub major: u64,
    pub minor: u64,
    /// Operation (`Read`, `Write`, `Sync`, ...). Empty for counters without an operation.
    pub op: String,
    pub value: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct BlkioStats {
    pub io_service_bytes_recursive: Vec<BlkioStatEntry>,
    pub io_serviced_recursive: Vec<BlkioStatEntry>,
    pub io_queued_recursive: Vec<BlkioStatEntry>,
    pub io_service_time_recursive: Vec<BlkioStatEntry>,
    pub io_wait_time_recursive: Vec<BlkioStatEntry>,
    pub io_merged_recursive: Vec<BlkioStatEntry>,
    pub io_time_recursive: Vec<BlkioStatEntry>,
    pub sectors_recursive: Vec<BlkioStatEntry>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct HugetlbStats {
    pub usage: u64,
    pub max_usage: u64,
    pub failcnt: u64,
}

/// Snapshot of all collected statistics of a single cgroup node.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct Stats {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cpu_stats: Option<CpuStats>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory_stats: Option<MemoryStats>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blkio_stats: Option<BlkioStats>,
    /// Keyed by huge page size, e.g. `2MB`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hugetlb_stats: Option<HashMap<String, HugetlbStats>>,
}

impl Stats {
    /// Replaces every category `fresh` carries, leaving the others untouched.
    ///
    /// Co-mounted subsystems share nodes; each one overlays only what it
    /// collected so `cpu` and `cpuacct` never erase each other.
    pub fn overlay(&mut self, fresh: Stats) {
        if let Some(cpu) = fresh.cpu_stats {
            let current = self.cpu_stats.get_or_insert_with(CpuStats::default);
            if cpu.cpu_usage.is_some() {
                current.cpu_usage = cpu.cpu_usage;
            }
            if cpu.throttling_data.is_some() {
                current.throttling_data = cpu.throttling_data;
            }
        }
        if fresh.memory_stats.is_some() {
            self.memory_stats = fresh.memory_stats;
        }
        if fresh.blkio_stats.is_some() {
            self.blkio_stats = fresh.blkio_stats;
        }
        if fresh.hugetlb_stats.is_some() {
            self.hugetlb_stats = fresh.hugetlb_stats;
        }
    }

    pub fn is_empty(&self) -> bool {
        self.cpu_stats.is_none()
            && self.memory_stats.is_none()
            && self.blkio_stats.is_none()
            && self.hugetlb_stats.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn throttling(periods: u64) -> Stats {
        Stats {
            cpu_stats: Some(CpuStats {
                cpu_usage: None,
                throttling_data: Some(ThrottlingData {
                    periods,
                    ..Default::default()
                }),
            }),
            ..Default::default()
        }
    }

    #[test]
    fn test_overlay_keeps_other_cpu_half() {
        let mut stats = Stats {
            cpu_stats: Some(CpuStats {
                cpu_usage: Some(CpuUsage {
                    total_usage: 42,
                    ..Default::default()
                }),
                throttling_data: None,
            }),
            ..Default::default()
        };

        stats.overlay(throttling(7));

        let cpu = stats.cpu_stats.unwrap();
        assert_eq!(cpu.cpu_usage.unwrap().total_usage, 42);
        assert_eq!(cpu.throttling_data.unwrap().periods, 7);
    }

    #[test]
    fn test_overlay_replaces_previous_snapshot() {
        let mut stats = throttling(1);
        stats.overlay(throttling(2));
        assert_eq!(stats, throttling(2));
    }

    #[test]
    fn test_absent_categories_are_not_serialized() {
        let json = serde_json::to_value(throttling(3)).unwrap();
        let obj = json.as_object().unwrap();
        assert!(obj.contains_key("cpu_stats"));
        assert!(!obj.contains_key("memory_stats"));
        assert!(!obj.contains_key("hugetlb_stats"));
        assert!(json["cpu_stats"].get("cpu_usage").is_none());
    }

    #[test]
    fn test_is_empty() {
        assert!(Stats::default().is_empty());
        assert!(!throttling(0).is_empty());
    }
}
