//! Raw records of the `memory` subsystem.
//!
//! Each accounted counter is exposed as a triple of files sharing a prefix:
//!
//! | counter | prefix           |
//! |---------|------------------|
//! | memory  | `memory.`        |
//! | swap    | `memory.memsw.`  |
//! | kernel  | `memory.kmem.`   |
//!
//! with the suffixes `usage_in_bytes`, `max_usage_in_bytes` and `failcnt`.
//! `memory.stat` is kept whole as a counter map.

use std::collections::HashMap;

/// One `usage` / `max_usage` / `failcnt` triple. Bytes, except `failcnt`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MemoryCounter {
    pub usage: u64,
    pub max_usage: u64,
    pub failcnt: u64,
}

/// Which memory counter a triple of files belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryCounterKind {
    Memory,
    Swap,
    Kernel,
}

impl MemoryCounterKind {
    fn prefix(self) -> &'static str {
        match self {
            MemoryCounterKind::Memory => "memory",
            MemoryCounterKind::Swap => "memory.memsw",
            MemoryCounterKind::Kernel => "memory.kmem",
        }
    }

    pub fn usage_file(self) -> String {
        format!("{}.usage_in_bytes", self.prefix())
    }

    pub fn max_usage_file(self) -> String {
        format!("{}.max_usage_in_bytes", self.prefix())
    }

    pub fn failcnt_file(self) -> String {
        format!("{}.failcnt", self.prefix())
    }
}

/// Raw record of the `memory` subsystem.
///
/// A counter is `None` when its files do not exist, e.g. `memsw` on kernels
/// booted without swap accounting.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MemoryRecord {
    pub usage: Option<MemoryCounter>,
    pub swap: Option<MemoryCounter>,
    pub kernel: Option<MemoryCounter>,
    /// Every counter of `memory.stat`.
    pub stat: HashMap<String, u64>,
}

impl MemoryRecord {
    /// Page cache in bytes, as reported by the `cache` counter of `memory.stat`.
    pub fn cache(&self) -> u64 {
        self.stat.get("cache").copied().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counter_file_names() {
        assert_eq!(
            MemoryCounterKind::Memory.usage_file(),
            "memory.usage_in_bytes"
        );
        assert_eq!(
            MemoryCounterKind::Swap.max_usage_file(),
            "memory.memsw.max_usage_in_bytes"
        );
        assert_eq!(MemoryCounterKind::Kernel.failcnt_file(), "memory.kmem.failcnt");
    }

    #[test]
    fn test_cache_defaults_to_zero() {
        let mut record = MemoryRecord::default();
        assert_eq!(record.cache(), 0);
        record.stat.insert("cache".to_owned(), 8192);
        assert_eq!(record.cache(), 8192);
    }
}
