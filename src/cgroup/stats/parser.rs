//! Generic parsers for cgroup v1 pseudo-files.
//!
//! - [`KeyValueStat`]: multi-line files with a fixed set of known keys such as
//!   `cpu.stat` or `cpuacct.stat`.
//! - [`parse_flat_keyed`]: multi-line `key value` files whose keys are not
//!   known in advance (`memory.stat`).
//! - [`parse_single_value`]: single numeric value files (`cpuacct.usage`,
//!   `memory.usage_in_bytes`, ...).
//! - [`parse_value_list`]: single-line whitespace separated lists
//!   (`cpuacct.usage_percpu`).
//!
//! # Example: Implementing `KeyValueStat`
//!
//! ```rust
//! use std::collections::HashMap;
//! use std::sync::LazyLock;
//! use cgwatch::cgroup::stats::KeyValueStat;
//!
//! #[derive(Default)]
//! struct MyStat {
//!     foo: u64,
//! }
//!
//! static HANDLERS: LazyLock<HashMap<&'static str, fn(&mut MyStat, u64)>> = LazyLock::new(|| {
//!     let mut map: HashMap<&'static str, fn(&mut MyStat, u64)> = HashMap::new();
//!     map.insert("foo", |s: &mut MyStat, v: u64| s.foo = v);
//!     map
//! });
//!
//! impl KeyValueStat for MyStat {
//!     const ALLOW_DUPLICATE_KEYS: bool = false;
//!
//!     fn field_handlers() -> &'static HashMap<&'static str, fn(&mut Self, u64)> {
//!         &HANDLERS
//!     }
//! }
//!
//! let stat = MyStat::from_reader(&mut "foo 42\nbar 1\n".as_bytes()).unwrap();
//! assert_eq!(stat.foo, 42);
//! ```

use std::collections::{HashMap, HashSet};
use std::io::BufRead;

use super::StatParseError;

/// A trait for parsing `key value` style files with a fixed set of known keys.
///
/// Implementors define the known keys and how each value is applied. Unknown
/// keys and lines without a value are ignored.
pub trait KeyValueStat: Default
where
    Self: 'static,
{
    /// If `false`, encountering the same known key twice is an error.
    const ALLOW_DUPLICATE_KEYS: bool;

    /// Map of known field names to the function applying the parsed value.
    fn field_handlers() -> &'static HashMap<&'static str, fn(&mut Self, u64)>;

    /// Parses a buffer line by line into `Self`.
    ///
    /// # Errors
    ///
    /// Returns an `io::Error` if reading fails, or a [`StatParseError`] wrapped in
    /// an `io::Error` of kind `InvalidData` if a known key has an invalid value
    /// or is duplicated.
    fn from_reader<R: BufRead>(buf: &mut R) -> std::io::Result<Self> {
        let mut stat = Self::default();
        let handlers = Self::field_handlers();
        let mut seen_keys = HashSet::with_capacity(handlers.len());

        let mut line = String::new();
        let mut lineno = 0;
        while buf.read_line(&mut line)? != 0 {
            lineno += 1;
            let mut parts = line.split_whitespace();
            if let (Some(key), Some(val)) = (parts.next(), parts.next()) {
                if let Some((k, handler)) = handlers.get_key_value(key) {
                    let parsed = parse_u64(val).map_err(|source| {
                        StatParseError::InvalidKeyValue {
                            key: key.to_string(),
                            value: val.to_string(),
                            line: lineno,
                            source,
                        }
                    })?;
                    if !Self::ALLOW_DUPLICATE_KEYS && !seen_keys.insert(*k) {
                        return Err(StatParseError::DuplicateField {
                            field: key.to_string(),
                            line: lineno,
                        }
                        .into());
                    }
                    handler(&mut stat, parsed);
                }
            }

            line.clear();
        }

        Ok(stat)
    }
}

/// Parses every `key value` line into a map.
///
/// Lines with a missing value are skipped; later duplicates overwrite earlier ones.
///
/// # Errors
///
/// Returns [`StatParseError::InvalidKeyValue`] (as `InvalidData`) on a non-numeric value.
pub fn parse_flat_keyed<R: BufRead>(buf: &mut R) -> std::io::Result<HashMap<String, u64>> {
    let mut out = HashMap::new();
    let mut line = String::new();
    let mut lineno = 0;
    while buf.read_line(&mut line)? != 0 {
        lineno += 1;
        let mut parts = line.split_whitespace();
        if let (Some(key), Some(val)) = (parts.next(), parts.next()) {
            let parsed = parse_u64(val).map_err(|source| StatParseError::InvalidKeyValue {
                key: key.to_string(),
                value: val.to_string(),
                line: lineno,
                source,
            })?;
            out.insert(key.to_owned(), parsed);
        }
        line.clear();
    }
    Ok(out)
}

/// Parses a file holding a single unsigned value. An empty file yields `0`.
///
/// # Errors
///
/// Returns [`StatParseError::InvalidValue`] (as `InvalidData`) on a non-numeric value.
pub fn parse_single_value<R: BufRead>(buf: &mut R) -> std::io::Result<u64> {
    let mut line = String::new();
    buf.read_line(&mut line)?;
    let value = line.trim();
    if value.is_empty() {
        return Ok(0);
    }
    Ok(parse_u64(value).map_err(|source| StatParseError::InvalidValue {
        value: value.to_string(),
        line: 1,
        source,
    })?)
}

/// Parses a whitespace separated list of unsigned values, e.g. `cpuacct.usage_percpu`.
///
/// # Errors
///
/// Returns [`StatParseError::InvalidValue`] (as `InvalidData`) on a non-numeric entry.
pub fn parse_value_list<R: BufRead>(buf: &mut R) -> std::io::Result<Vec<u64>> {
    let mut out = Vec::new();
    let mut line = String::new();
    let mut lineno = 0;
    while buf.read_line(&mut line)? != 0 {
        lineno += 1;
        for value in line.split_whitespace() {
            out.push(
                parse_u64(value).map_err(|source| StatParseError::InvalidValue {
                    value: value.to_string(),
                    line: lineno,
                    source,
                })?,
            );
        }
        line.clear();
    }
    Ok(out)
}

/// Parses a counter value. The kernel reports unlimited values of some
/// counters as `-1`, which saturates to `0` like every other negative value.
#[inline]
pub(super) fn parse_u64(value: &str) -> Result<u64, std::num::ParseIntError> {
    match value.parse::<u64>() {
        Ok(v) => Ok(v),
        Err(err) => match value.parse::<i64>() {
            Ok(v) if v < 0 => Ok(0),
            _ => Err(err),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cgroup::stats::error::extract_stat_parse_error;

    #[test]
    fn test_parse_flat_keyed() {
        let data = "cache 4096\nrss 8192\n\nbroken\n";
        let map = parse_flat_keyed(&mut data.as_bytes()).unwrap();
        assert_eq!(map.len(), 2);
        assert_eq!(map["cache"], 4096);
        assert_eq!(map["rss"], 8192);
    }

    #[test]
    fn test_parse_flat_keyed_invalid_value() {
        let data = "cache 4096\nrss lots\n";
        let err = parse_flat_keyed(&mut data.as_bytes()).unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::InvalidData);
        match extract_stat_parse_error(&err) {
            StatParseError::InvalidKeyValue { key, line, .. } => {
                assert_eq!(key, "rss");
                assert_eq!(*line, 2);
            }
            _ => panic!("Expected InvalidKeyValue error"),
        }
    }

    #[test]
    fn test_parse_single_value() {
        assert_eq!(parse_single_value(&mut "123456\n".as_bytes()).unwrap(), 123456);
        assert_eq!(parse_single_value(&mut "".as_bytes()).unwrap(), 0);
        let err = parse_single_value(&mut "max\n".as_bytes()).unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::InvalidData);
    }

    #[test]
    fn test_parse_value_list() {
        let list = parse_value_list(&mut "10 20 30 \n".as_bytes()).unwrap();
        assert_eq!(list, vec![10, 20, 30]);
        assert!(parse_value_list(&mut "".as_bytes()).unwrap().is_empty());
    }

    #[test]
    fn test_parse_u64_negative_saturates() {
        assert_eq!(parse_u64("-1").unwrap(), 0);
        assert_eq!(parse_u64("18446744073709551615").unwrap(), u64::MAX);
        assert!(parse_u64("abc").is_err());
    }
}
