//! Raw CPU records of the `cpu` and `cpuacct` subsystems.
//!
//! - `cpu.stat` carries throttling counters: `nr_periods`, `nr_throttled` and
//!   `throttled_time` (nanoseconds).
//! - `cpuacct.usage` and `cpuacct.usage_percpu` carry consumed CPU time in
//!   nanoseconds.
//! - `cpuacct.stat` carries `user` and `system` time in `USER_HZ` ticks.
//!
//! # Examples
//!
//! ```rust
//! use cgwatch::cgroup::stats::{CpuThrottlingStat, KeyValueStat};
//!
//! let data = "nr_periods 10\nnr_throttled 2\nthrottled_time 50000\n";
//! let stat = CpuThrottlingStat::from_reader(&mut data.as_bytes()).unwrap();
//! assert_eq!(stat.nr_throttled, 2);
//! ```

use std::collections::HashMap;
use std::sync::LazyLock;

use super::KeyValueStat;

/// Kernel `USER_HZ`, fixed at 100 on every architecture exposing cgroup v1.
pub const USER_HZ: u64 = 100;

const NANOS_PER_SECOND: u64 = 1_000_000_000;

/// Parsed `cpu.stat` of the `cpu` subsystem.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CpuThrottlingStat {
    /// Number of enforcement periods that elapsed.
    pub nr_periods: u64,
    /// Number of periods in which the cgroup was throttled.
    pub nr_throttled: u64,
    /// Total time (in nanoseconds) the cgroup was throttled.
    pub throttled_time: u64,
}

type ThrottlingSetter = fn(&mut CpuThrottlingStat, u64);

static THROTTLING_SETTERS: LazyLock<HashMap<&'static str, ThrottlingSetter>> =
    LazyLock::new(|| {
        let mut m: HashMap<&'static str, ThrottlingSetter> = HashMap::with_capacity(3);

        m.insert("nr_periods", |s, v| s.nr_periods = v);
        m.insert("nr_throttled", |s, v| s.nr_throttled = v);
        m.insert("throttled_time", |s, v| s.throttled_time = v);

        m
    });

impl KeyValueStat for CpuThrottlingStat {
    const ALLOW_DUPLICATE_KEYS: bool = false;

    fn field_handlers() -> &'static HashMap<&'static str, fn(&mut Self, u64)> {
        &THROTTLING_SETTERS
    }
}

/// Parsed `cpuacct.stat`, still in `USER_HZ` ticks.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CpuacctTicks {
    pub user: u64,
    pub system: u64,
}

impl CpuacctTicks {
    pub fn user_nanos(&self) -> u64 {
        ticks_to_nanos(self.user)
    }

    pub fn system_nanos(&self) -> u64 {
        ticks_to_nanos(self.system)
    }
}

#[inline]
fn ticks_to_nanos(ticks: u64) -> u64 {
    ticks.saturating_mul(NANOS_PER_SECOND / USER_HZ)
}

type TicksSetter = fn(&mut CpuacctTicks, u64);

static TICKS_SETTERS: LazyLock<HashMap<&'static str, TicksSetter>> = LazyLock::new(|| {
    let mut m: HashMap<&'static str, TicksSetter> = HashMap::with_capacity(2);

    m.insert("user", |s, v| s.user = v);
    m.insert("system", |s, v| s.system = v);

    m
});

impl KeyValueStat for CpuacctTicks {
    const ALLOW_DUPLICATE_KEYS: bool = false;

    fn field_handlers() -> &'static HashMap<&'static str, fn(&mut Self, u64)> {
        &TICKS_SETTERS
    }
}

/// Raw record of the `cpuacct` subsystem. All values in nanoseconds.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CpuacctUsage {
    pub total: u64,
    pub percpu: Vec<u64>,
    pub kernel: u64,
    pub user: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cgroup::stats::error::{StatParseError, extract_stat_parse_error};

    #[test]
    fn test_parse_empty_cpu_stat() {
        let stat = CpuThrottlingStat::from_reader(&mut "".as_bytes()).unwrap();
        assert_eq!(stat, CpuThrottlingStat::default());
    }

    #[test]
    fn test_parse_complete_cpu_stat() {
        let data = "\
nr_periods 1523
nr_throttled 87
throttled_time 9311502948
";
        let stat = CpuThrottlingStat::from_reader(&mut data.as_bytes()).unwrap();

        assert_eq!(stat.nr_periods, 1523);
        assert_eq!(stat.nr_throttled, 87);
        assert_eq!(stat.throttled_time, 9_311_502_948);
    }

    #[test]
    fn test_parse_cpu_stat_ignores_unknown_keys() {
        let data = "\
nr_periods 4
nr_bursts 3
burst_time 100
";
        let stat = CpuThrottlingStat::from_reader(&mut data.as_bytes()).unwrap();
        assert_eq!(stat.nr_periods, 4);
        assert_eq!(stat.nr_throttled, 0);
    }

    #[test]
    fn test_parse_invalid_cpu_stat() {
        let data = "\
nr_periods 4
nr_throttled abc
";
        let err = CpuThrottlingStat::from_reader(&mut data.as_bytes()).unwrap_err();

        assert_eq!(err.kind(), std::io::ErrorKind::InvalidData);
        match extract_stat_parse_error(&err) {
            StatParseError::InvalidKeyValue {
                key, value, line, ..
            } => {
                assert_eq!(key, "nr_throttled");
                assert_eq!(value, "abc");
                assert_eq!(*line, 2);
            }
            _ => panic!("Expected InvalidKeyValue error"),
        }
    }

    #[test]
    fn test_duplicate_field_errors() {
        let data = "\
nr_periods 100
nr_periods 200
";
        let err = CpuThrottlingStat::from_reader(&mut data.as_bytes()).unwrap_err();
        match extract_stat_parse_error(&err) {
            StatParseError::DuplicateField { field, line } => {
                assert_eq!(field, "nr_periods");
                assert_eq!(*line, 2);
            }
            _ => panic!("Expected DuplicateField error"),
        }
    }

    #[test]
    fn test_parse_cpuacct_stat_to_nanos() {
        let data = "user 250\nsystem 75\n";
        let ticks = CpuacctTicks::from_reader(&mut data.as_bytes()).unwrap();
        assert_eq!(ticks, CpuacctTicks { user: 250, system: 75 });
        assert_eq!(ticks.user_nanos(), 2_500_000_000);
        assert_eq!(ticks.system_nanos(), 750_000_000);
    }
}
