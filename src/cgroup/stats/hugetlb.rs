//! Raw records of the `hugetlb` subsystem.
//!
//! The kernel creates one file triple per supported huge page size, e.g.
//! `hugetlb.2MB.usage_in_bytes`, `hugetlb.2MB.max_usage_in_bytes` and
//! `hugetlb.2MB.failcnt`. The supported sizes are discovered from the
//! `usage_in_bytes` file names of the cgroup itself.

use std::collections::HashMap;

/// Usage of a single huge page size.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct HugetlbCounter {
    pub usage: u64,
    pub max_usage: u64,
    pub failcnt: u64,
}

/// Raw record of the `hugetlb` subsystem, keyed by page size (`2MB`, `1GB`).
pub type HugetlbRecord = HashMap<String, HugetlbCounter>;

const PREFIX: &str = "hugetlb.";
const USAGE_SUFFIX: &str = ".usage_in_bytes";

/// Extracts the page size from a `hugetlb.<size>.usage_in_bytes` file name.
pub fn page_size_from_file_name(name: &str) -> Option<&str> {
    let size = name.strip_prefix(PREFIX)?.strip_suffix(USAGE_SUFFIX)?;
    // `hugetlb.2MB.rsvd.usage_in_bytes` tracks reservations, not usage.
    if size.is_empty() || size.contains('.') {
        return None;
    }
    Some(size)
}

pub fn usage_file(page_size: &str) -> String {
    format!("{PREFIX}{page_size}{USAGE_SUFFIX}")
}

pub fn max_usage_file(page_size: &str) -> String {
    format!("{PREFIX}{page_size}.max_usage_in_bytes")
}

pub fn failcnt_file(page_size: &str) -> String {
    format!("{PREFIX}{page_size}.failcnt")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_size_from_file_name() {
        assert_eq!(page_size_from_file_name("hugetlb.2MB.usage_in_bytes"), Some("2MB"));
        assert_eq!(page_size_from_file_name("hugetlb.1GB.usage_in_bytes"), Some("1GB"));
        assert_eq!(page_size_from_file_name("hugetlb.2MB.rsvd.usage_in_bytes"), None);
        assert_eq!(page_size_from_file_name("hugetlb.2MB.failcnt"), None);
        assert_eq!(page_size_from_file_name("memory.usage_in_bytes"), None);
    }

    #[test]
    fn test_file_names_round_trip_page_size() {
        assert_eq!(page_size_from_file_name(&usage_file("64KB")), Some("64KB"));
        assert_eq!(max_usage_file("2MB"), "hugetlb.2MB.max_usage_in_bytes");
        assert_eq!(failcnt_file("2MB"), "hugetlb.2MB.failcnt");
    }
}
