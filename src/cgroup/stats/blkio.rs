//! Raw records of the `blkio` subsystem.
//!
//! Every `blkio.*` statistics file lists one counter per line:
//!
//! ```text
//! 8:0 Read 4096
//! 8:0 Write 512
//! 8:0 Sync 0
//! Total 4608
//! ```
//!
//! `blkio.sectors_recursive` and `blkio.time_recursive` omit the operation
//! column (`8:0 1024`). `Total` lines are aggregates and are skipped.

use std::io::BufRead;

use super::StatParseError;
use super::parser::parse_u64;

/// A single per-device counter.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BlkioEntry {
    pub major: u64,
    pub minor: u64,
    /// Empty for files without an operation column.
    pub op: String,
    pub value: u64,
}

/// Raw record of the `blkio` subsystem, one list per statistics file.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BlkioRecord {
    pub io_service_bytes_recursive: Vec<BlkioEntry>,
    pub io_serviced_recursive: Vec<BlkioEntry>,
    pub io_queued_recursive: Vec<BlkioEntry>,
    pub io_service_time_recursive: Vec<BlkioEntry>,
    pub io_wait_time_recursive: Vec<BlkioEntry>,
    pub io_merged_recursive: Vec<BlkioEntry>,
    pub io_time_recursive: Vec<BlkioEntry>,
    pub sectors_recursive: Vec<BlkioEntry>,
}

/// Parses a `blkio.*` statistics file.
///
/// # Errors
///
/// Returns [`StatParseError::InvalidBlkioEntry`] (as `InvalidData`) when a
/// device field is not `MAJOR:MINOR` or a number does not parse.
pub fn parse_blkio_entries<R: BufRead>(buf: &mut R) -> std::io::Result<Vec<BlkioEntry>> {
    let mut entries = Vec::new();
    let mut line = String::new();
    let mut lineno = 0;
    while buf.read_line(&mut line)? != 0 {
        lineno += 1;
        let fields: Vec<&str> = line.split_whitespace().collect();
        let invalid = || StatParseError::InvalidBlkioEntry {
            entry: line.trim().to_owned(),
            line: lineno,
        };

        let (device, op, value) = match fields.as_slice() {
            [] | ["Total", ..] => {
                line.clear();
                continue;
            }
            [device, value] => (*device, "", *value),
            [device, op, value] => (*device, *op, *value),
            _ => return Err(invalid().into()),
        };
        let (major, minor) = device.split_once(':').ok_or_else(invalid)?;

        entries.push(BlkioEntry {
            major: parse_u64(major).map_err(|_| invalid())?,
            minor: parse_u64(minor).map_err(|_| invalid())?,
            op: op.to_owned(),
            value: parse_u64(value).map_err(|_| invalid())?,
        });
        line.clear();
    }
    Ok(entries)
}
