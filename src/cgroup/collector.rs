//! Built-in [`Collector`] implementations, one per cgroup v1 subsystem.
//!
//! Every collector first checks that the cgroup directory still exists, so a
//! removed cgroup is reported as `NotFound` rather than as a set of missing
//! files. Optional files inside an existing directory fall back to zero.

use std::io;
use std::path::Path;

use super::Collector;
use super::stats::{
    BlkioRecord, CpuThrottlingStat, CpuacctTicks, CpuacctUsage, HugetlbCounter, HugetlbRecord,
    KeyValueStat, MemoryCounter, MemoryCounterKind, MemoryRecord, RawStats, hugetlb,
    parse_blkio_entries, parse_flat_keyed, parse_single_value, parse_value_list,
};
use super::utils::{ensure_dir, read_optional_file};

/// `cpu` subsystem: throttling counters from `cpu.stat`.
#[derive(Debug, Default)]
pub struct CpuCollector;

impl Collector for CpuCollector {
    fn get_stats(&self, path: &Path) -> io::Result<RawStats> {
        ensure_dir(path)?;
        let stat = read_optional_file(path, "cpu.stat", CpuThrottlingStat::from_reader)?;
        Ok(RawStats::Cpu(stat.unwrap_or_default()))
    }
}

/// `cpuacct` subsystem: consumed CPU time.
#[derive(Debug, Default)]
pub struct CpuacctCollector;

impl Collector for CpuacctCollector {
    fn get_stats(&self, path: &Path) -> io::Result<RawStats> {
        ensure_dir(path)?;
        let total = read_optional_file(path, "cpuacct.usage", parse_single_value)?;
        let percpu = read_optional_file(path, "cpuacct.usage_percpu", parse_value_list)?;
        let ticks = read_optional_file(path, "cpuacct.stat", CpuacctTicks::from_reader)?
            .unwrap_or_default();

        Ok(RawStats::Cpuacct(CpuacctUsage {
            total: total.unwrap_or_default(),
            percpu: percpu.unwrap_or_default(),
            kernel: ticks.system_nanos(),
            user: ticks.user_nanos(),
        }))
    }
}

/// `memory` subsystem: usage triples and `memory.stat`.
#[derive(Debug, Default)]
pub struct MemoryCollector;

impl MemoryCollector {
    fn read_counter(path: &Path, kind: MemoryCounterKind) -> io::Result<Option<MemoryCounter>> {
        let Some(usage) = read_optional_file(path, &kind.usage_file(), parse_single_value)? else {
            return Ok(None);
        };
        let max_usage = read_optional_file(path, &kind.max_usage_file(), parse_single_value)?;
        let failcnt = read_optional_file(path, &kind.failcnt_file(), parse_single_value)?;

        Ok(Some(MemoryCounter {
            usage,
            max_usage: max_usage.unwrap_or_default(),
            failcnt: failcnt.unwrap_or_default(),
        }))
    }
}

impl Collector for MemoryCollector {
    fn get_stats(&self, path: &Path) -> io::Result<RawStats> {
        ensure_dir(path)?;
        Ok(RawStats::Memory(MemoryRecord {
            usage: Self::read_counter(path, MemoryCounterKind::Memory)?,
            swap: Self::read_counter(path, MemoryCounterKind::Swap)?,
            kernel: Self::read_counter(path, MemoryCounterKind::Kernel)?,
            stat: read_optional_file(path, "memory.stat", parse_flat_keyed)?.unwrap_or_default(),
        }))
    }
}

/// `blkio` subsystem: the eight recursive per-device statistics files.
#[derive(Debug, Default)]
pub struct BlkioCollector;

impl Collector for BlkioCollector {
    fn get_stats(&self, path: &Path) -> io::Result<RawStats> {
        ensure_dir(path)?;
        let read = |name: &str| -> io::Result<_> {
            Ok(read_optional_file(path, name, parse_blkio_entries)?.unwrap_or_default())
        };

        let mut record = BlkioRecord {
            io_service_bytes_recursive: read("blkio.io_service_bytes_recursive")?,
            io_serviced_recursive: read("blkio.io_serviced_recursive")?,
            io_queued_recursive: read("blkio.io_queued_recursive")?,
            io_service_time_recursive: read("blkio.io_service_time_recursive")?,
            io_wait_time_recursive: read("blkio.io_wait_time_recursive")?,
            io_merged_recursive: read("blkio.io_merged_recursive")?,
            io_time_recursive: read("blkio.time_recursive")?,
            sectors_recursive: read("blkio.sectors_recursive")?,
        };

        // Without the CFQ scheduler only the throttling policy accounts I/O.
        if record.io_serviced_recursive.is_empty() {
            record.io_service_bytes_recursive = read("blkio.throttle.io_service_bytes")?;
            record.io_serviced_recursive = read("blkio.throttle.io_serviced")?;
        }

        Ok(RawStats::Blkio(record))
    }
}

/// `hugetlb` subsystem: usage per supported huge page size.
#[derive(Debug, Default)]
pub struct HugetlbCollector;

impl Collector for HugetlbCollector {
    fn get_stats(&self, path: &Path) -> io::Result<RawStats> {
        ensure_dir(path)?;
        let mut record = HugetlbRecord::new();

        for entry in std::fs::read_dir(path)? {
            let entry = entry?;
            let file_name = entry.file_name();
            let Some(page_size) = file_name.to_str().and_then(hugetlb::page_size_from_file_name)
            else {
                continue;
            };

            let usage =
                read_optional_file(path, &hugetlb::usage_file(page_size), parse_single_value)?;
            let max_usage =
                read_optional_file(path, &hugetlb::max_usage_file(page_size), parse_single_value)?;
            let failcnt =
                read_optional_file(path, &hugetlb::failcnt_file(page_size), parse_single_value)?;

            record.insert(
                page_size.to_owned(),
                HugetlbCounter {
                    usage: usage.unwrap_or_default(),
                    max_usage: max_usage.unwrap_or_default(),
                    failcnt: failcnt.unwrap_or_default(),
                },
            );
        }

        Ok(RawStats::Hugetlb(record))
    }
}

/// Subsystems without accounting files (`cpuset`, `devices`, `freezer`,
/// `net_cls`, `net_prio`, `perf_event`).
#[derive(Debug, Default)]
pub struct NoopCollector;

impl Collector for NoopCollector {
    fn get_stats(&self, _path: &Path) -> io::Result<RawStats> {
        Ok(RawStats::Empty)
    }
}
