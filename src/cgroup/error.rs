use std::path::PathBuf;
use std::time::Duration;

use super::tree::TreeError;
use crate::fsutil;
use crate::mountinfo::{self, Mount};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("cgroup subsystem `{name}` is not mounted (discovered mounts: [{}])", list_mounts(.mounts))]
    UnknownSubsystem { name: String, mounts: Vec<Mount> },
    #[error("collection interval must be greater than zero, got {0:?}")]
    InvalidInterval(Duration),
    #[error("failed to query cgroup mounts: {0}")]
    MountQuery(#[from] mountinfo::Error),
    #[error("failed to create filesystem watcher: {0}")]
    WatcherInit(#[source] notify::Error),
    #[error("failed to update filesystem watch on `{path}`: {source}")]
    FilesystemWatch {
        path: PathBuf,
        #[source]
        source: notify::Error,
    },
    #[error("failed to read process list `{path}`: {source}")]
    ReadPids {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Tree(#[from] TreeError),
    #[error("watcher is already started")]
    AlreadyStarted,
    #[error("watcher is not started")]
    NotStarted,
    #[error("watcher task failed: {0}")]
    TaskJoin(#[from] tokio::task::JoinError),
}

impl Error {
    /// Returns `true` if the error only means that the path it names was
    /// removed while it was being processed.
    pub fn is_vanished_path(&self) -> bool {
        match self {
            Error::FilesystemWatch { source, .. } => match &source.kind {
                notify::ErrorKind::PathNotFound => true,
                notify::ErrorKind::Io(err) => fsutil::is_not_found(err),
                _ => false,
            },
            Error::ReadPids { source, .. } => fsutil::is_not_found(source),
            _ => false,
        }
    }
}

fn list_mounts(mounts: &[Mount]) -> String {
    mounts
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_subsystem_lists_mounts() {
        let err = Error::UnknownSubsystem {
            name: "hugetlb".to_owned(),
            mounts: vec![
                Mount::new("/sys/fs/cgroup/memory", ["memory"]),
                Mount::new("/sys/fs/cgroup/cpu,cpuacct", ["cpu", "cpuacct"]),
            ],
        };
        assert_eq!(
            err.to_string(),
            "cgroup subsystem `hugetlb` is not mounted (discovered mounts: \
             [/sys/fs/cgroup/memory (memory), /sys/fs/cgroup/cpu,cpuacct (cpu,cpuacct)])"
        );
    }

    #[test]
    fn test_is_vanished_path() {
        let watch_error = |source| Error::FilesystemWatch {
            path: PathBuf::from("/cg/cpu/a"),
            source,
        };
        assert!(watch_error(notify::Error::path_not_found()).is_vanished_path());
        assert!(
            watch_error(notify::Error::io(std::io::ErrorKind::NotFound.into())).is_vanished_path()
        );
        assert!(!watch_error(notify::Error::new(notify::ErrorKind::MaxFilesWatch)).is_vanished_path());
        assert!(!watch_error(notify::Error::generic("device busy")).is_vanished_path());
        assert!(!Error::InvalidInterval(Duration::ZERO).is_vanished_path());
    }
}
