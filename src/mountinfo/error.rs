use std::path::PathBuf;

use crate::fsutil;

/// Errors raised while resolving cgroup mounts from a mountinfo file.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    FileOpen(#[from] fsutil::FileOpenError),
    /// The mountinfo file could not be read to the end.
    #[error("failed to read mountinfo `{path}`: {source}")]
    ReadLine {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// A line of the mountinfo file is malformed.
    #[error("malformed mount entry in `{path}`: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: super::parser::ParseError,
    },
}

pub type Result<T> = std::result::Result<T, Error>;
