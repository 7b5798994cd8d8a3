//! Mapping from raw subsystem records to the exported [`Stats`] schema.
//!
//! Fields are copied 1:1. Units are those of the raw record, which already
//! reports nanoseconds for CPU time and bytes for memory and I/O.

use std::collections::HashMap;

use super::stats::{
    BlkioEntry, BlkioRecord, CpuThrottlingStat, CpuacctUsage, HugetlbRecord, MemoryCounter,
    MemoryRecord, RawStats,
};
use crate::models::{
    BlkioStatEntry, BlkioStats, CpuStats, CpuUsage, HugetlbStats, MemoryData, MemoryStats, Stats,
    ThrottlingData,
};

/// Converts one raw record. Only the category of the record's subsystem is
/// present in the result.
pub fn convert(raw: RawStats) -> Stats {
    match raw {
        RawStats::Cpu(stat) => Stats {
            cpu_stats: Some(CpuStats {
                cpu_usage: None,
                throttling_data: Some(convert_throttling(stat)),
            }),
            ..Default::default()
        },
        RawStats::Cpuacct(usage) => Stats {
            cpu_stats: Some(CpuStats {
                cpu_usage: Some(convert_cpu_usage(usage)),
                throttling_data: None,
            }),
            ..Default::default()
        },
        RawStats::Memory(record) => Stats {
            memory_stats: Some(convert_memory(record)),
            ..Default::default()
        },
        RawStats::Blkio(record) => Stats {
            blkio_stats: Some(convert_blkio(record)),
            ..Default::default()
        },
        RawStats::Hugetlb(record) => Stats {
            hugetlb_stats: Some(convert_hugetlb(record)),
            ..Default::default()
        },
        RawStats::Empty => Stats::default(),
    }
}

fn convert_throttling(stat: CpuThrottlingStat) -> ThrottlingData {
    ThrottlingData {
        periods: stat.nr_periods,
        throttled_periods: stat.nr_throttled,
        throttled_time: stat.throttled_time,
    }
}

fn convert_cpu_usage(usage: CpuacctUsage) -> CpuUsage {
    CpuUsage {
        total_usage: usage.total,
        percpu_usage: usage.percpu,
        usage_in_kernelmode: usage.kernel,
        usage_in_usermode: usage.user,
    }
}

fn convert_memory_data(counter: MemoryCounter) -> MemoryData {
    MemoryData {
        usage: counter.usage,
        max_usage: counter.max_usage,
        failcnt: counter.failcnt,
    }
}

fn convert_memory(record: MemoryRecord) -> MemoryStats {
    MemoryStats {
        cache: record.cache(),
        usage: record.usage.map(convert_memory_data),
        swap_usage: record.swap.map(convert_memory_data),
        kernel_usage: record.kernel.map(convert_memory_data),
        stats: record.stat,
    }
}

fn convert_blkio_entries(entries: Vec<BlkioEntry>) -> Vec<BlkioStatEntry> {
    entries
        .into_iter()
        .map(|entry| BlkioStatEntry {
            major: entry.major,
            minor: entry.minor,
            op: entry.op,
            value: entry.value,
        })
        .collect()
}

fn convert_blkio(record: BlkioRecord) -> BlkioStats {
    BlkioStats {
        io_service_bytes_recursive: convert_blkio_entries(record.io_service_bytes_recursive),
        io_serviced_recursive: convert_blkio_entries(record.io_serviced_recursive),
        io_queued_recursive: convert_blkio_entries(record.io_queued_recursive),
        io_service_time_recursive: convert_blkio_entries(record.io_service_time_recursive),
        io_wait_time_recursive: convert_blkio_entries(record.io_wait_time_recursive),
        io_merged_recursive: convert_blkio_entries(record.io_merged_recursive),
        io_time_recursive: convert_blkio_entries(record.io_time_recursive),
        sectors_recursive: convert_blkio_entries(record.sectors_recursive),
    }
}

fn convert_hugetlb(record: HugetlbRecord) -> HashMap<String, HugetlbStats> {
    record
        .into_iter()
        .map(|(page_size, counter)| {
            (
                page_size,
                HugetlbStats {
                    usage: counter.usage,
                    max_usage: counter.max_usage,
                    failcnt: counter.failcnt,
                },
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cgroup::stats::HugetlbCounter;

    #[test]
    fn test_convert_cpu_throttling() {
        let stats = convert(RawStats::Cpu(CpuThrottlingStat {
            nr_periods: 100,
            nr_throttled: 7,
            throttled_time: u64::MAX,
        }));

        let cpu = stats.cpu_stats.unwrap();
        assert_eq!(cpu.cpu_usage, None);
        assert_eq!(
            cpu.throttling_data,
            Some(ThrottlingData {
                periods: 100,
                throttled_periods: 7,
                throttled_time: u64::MAX,
            })
        );
        assert!(stats.memory_stats.is_none());
        assert!(stats.blkio_stats.is_none());
        assert!(stats.hugetlb_stats.is_none());
    }

    #[test]
    fn test_convert_cpuacct_usage() {
        let stats = convert(RawStats::Cpuacct(CpuacctUsage {
            total: 18_446_744_073_709_551_000,
            percpu: vec![1, 2, 3],
            kernel: 40_000_000,
            user: 90_000_000,
        }));

        let cpu = stats.cpu_stats.unwrap();
        assert_eq!(cpu.throttling_data, None);
        assert_eq!(
            cpu.cpu_usage,
            Some(CpuUsage {
                total_usage: 18_446_744_073_709_551_000,
                percpu_usage: vec![1, 2, 3],
                usage_in_kernelmode: 40_000_000,
                usage_in_usermode: 90_000_000,
            })
        );
    }

    #[test]
    fn test_convert_memory_keeps_absent_counters_absent() {
        let record = MemoryRecord {
            usage: Some(MemoryCounter {
                usage: 10,
                max_usage: 20,
                failcnt: 3,
            }),
            swap: None,
            kernel: Some(MemoryCounter::default()),
            stat: HashMap::from([("cache".to_owned(), 4096), ("rss".to_owned(), 8192)]),
        };

        let memory = convert(RawStats::Memory(record)).memory_stats.unwrap();
        assert_eq!(memory.cache, 4096);
        assert_eq!(
            memory.usage,
            Some(MemoryData {
                usage: 10,
                max_usage: 20,
                failcnt: 3,
            })
        );
        assert_eq!(memory.swap_usage, None);
        assert_eq!(memory.kernel_usage, Some(MemoryData::default()));
        assert_eq!(memory.stats.len(), 2);
        assert_eq!(memory.stats["rss"], 8192);
    }

    #[test]
    fn test_convert_blkio() {
        let entry = |op: &str, value| BlkioEntry {
            major: 8,
            minor: 16,
            op: op.to_owned(),
            value,
        };
        let record = BlkioRecord {
            io_service_bytes_recursive: vec![entry("Read", 4096), entry("Write", 512)],
            io_time_recursive: vec![entry("", 77)],
            ..Default::default()
        };

        let blkio = convert(RawStats::Blkio(record)).blkio_stats.unwrap();
        assert_eq!(
            blkio.io_service_bytes_recursive,
            vec![
                BlkioStatEntry {
                    major: 8,
                    minor: 16,
                    op: "Read".to_owned(),
                    value: 4096,
                },
                BlkioStatEntry {
                    major: 8,
                    minor: 16,
                    op: "Write".to_owned(),
                    value: 512,
                },
            ]
        );
        assert_eq!(blkio.io_time_recursive[0].value, 77);
        assert!(blkio.io_serviced_recursive.is_empty());
    }

    #[test]
    fn test_convert_hugetlb() {
        let record = HugetlbRecord::from([(
            "2MB".to_owned(),
            HugetlbCounter {
                usage: 2_097_152,
                max_usage: 4_194_304,
                failcnt: 9,
            },
        )]);

        let hugetlb = convert(RawStats::Hugetlb(record)).hugetlb_stats.unwrap();
        assert_eq!(
            hugetlb["2MB"],
            HugetlbStats {
                usage: 2_097_152,
                max_usage: 4_194_304,
                failcnt: 9,
            }
        );
    }

    #[test]
    fn test_convert_empty() {
        assert!(convert(RawStats::Empty).is_empty());
    }
}
