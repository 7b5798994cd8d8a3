//! Raw, subsystem-specific statistics records and the parsers for the cgroup
//! v1 pseudo-files they are read from.
//!
//! A [`RawStats`] value is what a [`Collector`](super::Collector) returns for
//! one cgroup directory. It is turned into the exported
//! [`Stats`](crate::models::Stats) schema by [`convert`](super::convert).
//!
//! # Main types
//!
//! - [`CpuThrottlingStat`]: `cpu.stat` of the `cpu` subsystem.
//! - [`CpuacctUsage`]: consumed CPU time of the `cpuacct` subsystem.
//! - [`MemoryRecord`]: usage triples and `memory.stat` of the `memory` subsystem.
//! - [`BlkioRecord`]: per-device counters of the `blkio` subsystem.
//! - [`HugetlbRecord`]: per page size usage of the `hugetlb` subsystem.

mod blkio;
mod cpu;
mod error;
pub(crate) mod hugetlb;
mod memory;
mod parser;

pub use blkio::{BlkioEntry, BlkioRecord, parse_blkio_entries};
pub use cpu::{CpuThrottlingStat, CpuacctTicks, CpuacctUsage, USER_HZ};
pub use error::StatParseError;
pub use hugetlb::{HugetlbCounter, HugetlbRecord};
pub use memory::{MemoryCounter, MemoryCounterKind, MemoryRecord};
pub use parser::{KeyValueStat, parse_flat_keyed, parse_single_value, parse_value_list};

use super::SubsystemKind;

/// Raw statistics read for one cgroup directory by one subsystem collector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawStats {
    Blkio(BlkioRecord),
    Cpu(CpuThrottlingStat),
    Cpuacct(CpuacctUsage),
    Hugetlb(HugetlbRecord),
    Memory(MemoryRecord),
    /// Subsystems that expose no accounting data.
    Empty,
}

impl RawStats {
    /// The zero-valued record a collector of `kind` produces for a cgroup
    /// without data, e.g. one that was removed before it could be read.
    pub fn zero(kind: &SubsystemKind) -> Self {
        match kind {
            SubsystemKind::Blkio => RawStats::Blkio(BlkioRecord::default()),
            SubsystemKind::Cpu => RawStats::Cpu(CpuThrottlingStat::default()),
            SubsystemKind::Cpuacct => RawStats::Cpuacct(CpuacctUsage::default()),
            SubsystemKind::Hugetlb => RawStats::Hugetlb(HugetlbRecord::default()),
            SubsystemKind::Memory => RawStats::Memory(MemoryRecord::default()),
            _ => RawStats::Empty,
        }
    }
}
