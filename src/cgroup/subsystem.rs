use std::fmt;
use std::path::Path;
use std::sync::Arc;

use super::collector::{
    BlkioCollector, CpuCollector, CpuacctCollector, HugetlbCollector, MemoryCollector,
    NoopCollector,
};
use super::stats::RawStats;

/// A cgroup v1 subsystem (controller).
///
/// Names the kernel exposes but this crate has no collector for are kept as
/// [`SubsystemKind::Unsupported`] so they can still be mirrored as trees.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SubsystemKind {
    Blkio,
    Cpu,
    Cpuacct,
    Cpuset,
    Devices,
    Freezer,
    Hugetlb,
    Memory,
    NetCls,
    NetPrio,
    PerfEvent,
    Unsupported(String),
}

impl SubsystemKind {
    /// Every subsystem with a built-in collector, in the default watch order.
    pub const ALL: [SubsystemKind; 11] = [
        SubsystemKind::Blkio,
        SubsystemKind::Cpu,
        SubsystemKind::Cpuacct,
        SubsystemKind::Cpuset,
        SubsystemKind::Devices,
        SubsystemKind::Freezer,
        SubsystemKind::Hugetlb,
        SubsystemKind::Memory,
        SubsystemKind::NetCls,
        SubsystemKind::NetPrio,
        SubsystemKind::PerfEvent,
    ];

    pub fn from_name(name: &str) -> Self {
        match name {
            "blkio" => SubsystemKind::Blkio,
            "cpu" => SubsystemKind::Cpu,
            "cpuacct" => SubsystemKind::Cpuacct,
            "cpuset" => SubsystemKind::Cpuset,
            "devices" => SubsystemKind::Devices,
            "freezer" => SubsystemKind::Freezer,
            "hugetlb" => SubsystemKind::Hugetlb,
            "memory" => SubsystemKind::Memory,
            "net_cls" => SubsystemKind::NetCls,
            "net_prio" => SubsystemKind::NetPrio,
            "perf_event" => SubsystemKind::PerfEvent,
            other => SubsystemKind::Unsupported(other.to_owned()),
        }
    }

    /// The name the kernel uses in mount options and `/proc/<pid>/cgroup`.
    pub fn name(&self) -> &str {
        match self {
            SubsystemKind::Blkio => "blkio",
            SubsystemKind::Cpu => "cpu",
            SubsystemKind::Cpuacct => "cpuacct",
            SubsystemKind::Cpuset => "cpuset",
            SubsystemKind::Devices => "devices",
            SubsystemKind::Freezer => "freezer",
            SubsystemKind::Hugetlb => "hugetlb",
            SubsystemKind::Memory => "memory",
            SubsystemKind::NetCls => "net_cls",
            SubsystemKind::NetPrio => "net_prio",
            SubsystemKind::PerfEvent => "perf_event",
            SubsystemKind::Unsupported(name) => name,
        }
    }
}

impl fmt::Display for SubsystemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Reads the accounting pseudo-files of one subsystem for a cgroup directory.
pub trait Collector: Send + Sync {
    /// # Errors
    ///
    /// Returns an `io::Error` of kind `NotFound` if the cgroup directory no
    /// longer exists, `InvalidData` if a pseudo-file cannot be parsed, or any
    /// other I/O error raised while reading.
    fn get_stats(&self, path: &Path) -> std::io::Result<RawStats>;
}

/// What a collection pass does with the nodes of a subsystem tree.
#[derive(Clone)]
pub enum CollectorDispatch {
    Collect(Arc<dyn Collector>),
    /// The subsystem is mirrored, but its nodes are skipped during collection.
    NoCollector,
}

impl CollectorDispatch {
    /// Built-in mapping from subsystem to collector.
    pub fn for_kind(kind: &SubsystemKind) -> Self {
        match kind {
            SubsystemKind::Blkio => CollectorDispatch::Collect(Arc::new(BlkioCollector)),
            SubsystemKind::Cpu => CollectorDispatch::Collect(Arc::new(CpuCollector)),
            SubsystemKind::Cpuacct => CollectorDispatch::Collect(Arc::new(CpuacctCollector)),
            SubsystemKind::Hugetlb => CollectorDispatch::Collect(Arc::new(HugetlbCollector)),
            SubsystemKind::Memory => CollectorDispatch::Collect(Arc::new(MemoryCollector)),
            SubsystemKind::Cpuset
            | SubsystemKind::Devices
            | SubsystemKind::Freezer
            | SubsystemKind::NetCls
            | SubsystemKind::NetPrio
            | SubsystemKind::PerfEvent => CollectorDispatch::Collect(Arc::new(NoopCollector)),
            SubsystemKind::Unsupported(_) => CollectorDispatch::NoCollector,
        }
    }
}

impl fmt::Debug for CollectorDispatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CollectorDispatch::Collect(_) => f.write_str("Collect(..)"),
            CollectorDispatch::NoCollector => f.write_str("NoCollector"),
        }
    }
}
