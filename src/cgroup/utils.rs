use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;

use crate::fsutil;

/// Name of the pseudo-file listing the processes of a cgroup.
pub const PROCS_FILE: &str = "cgroup.procs";

/// Fails with `NotFound` if the cgroup directory is gone.
pub fn ensure_dir(path: &Path) -> io::Result<()> {
    let metadata = std::fs::metadata(path)?;
    if !metadata.is_dir() {
        return Err(io::Error::new(
            io::ErrorKind::NotADirectory,
            format!("`{}` is not a cgroup directory", path.display()),
        ));
    }
    Ok(())
}

/// Opens `dir/name` and applies the given reader function.
///
/// The error keeps the kind of the underlying open error so `NotFound` can be
/// told apart by the caller.
pub fn read_file<T>(
    dir: &Path,
    name: &str,
    reader: impl FnOnce(&mut BufReader<File>) -> io::Result<T>,
) -> io::Result<T> {
    let mut buf =
        fsutil::open_file_reader(dir.join(name)).map_err(|err| io::Error::new(err.source.kind(), err))?;
    reader(&mut buf)
}

/// Like [`read_file`], but a missing file yields `Ok(None)`.
pub fn read_optional_file<T>(
    dir: &Path,
    name: &str,
    reader: impl FnOnce(&mut BufReader<File>) -> io::Result<T>,
) -> io::Result<Option<T>> {
    match read_file(dir, name, reader) {
        Ok(value) => Ok(Some(value)),
        Err(err) if fsutil::is_not_found(&err) => Ok(None),
        Err(err) => Err(err),
    }
}

/// Reads the process IDs listed in a `cgroup.procs` file.
///
/// Lines that are not a valid PID are skipped.
pub fn read_pids(procs_file: &Path) -> io::Result<Vec<u32>> {
    let reader = BufReader::new(File::open(procs_file)?);
    let mut pids = Vec::new();

    for line in reader.lines() {
        if let Ok(pid) = line?.trim().parse::<u32>() {
            pids.push(pid);
        }
    }

    Ok(pids)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_pids() {
        let dir = tempfile::tempdir().unwrap();
        let procs = dir.path().join(PROCS_FILE);
        std::fs::write(&procs, "101\n202\n\n").unwrap();
        assert_eq!(read_pids(&procs).unwrap(), vec![101, 202]);

        std::fs::write(&procs, "").unwrap();
        assert!(read_pids(&procs).unwrap().is_empty());
    }

    #[test]
    fn test_read_pids_missing_file() {
        let err = read_pids(Path::new("/definitely/does/not/exist/cgroup.procs")).unwrap_err();
        assert!(fsutil::is_not_found(&err));
    }

    #[test]
    fn test_read_optional_file_missing() {
        let dir = tempfile::tempdir().unwrap();
        let value = read_optional_file(dir.path(), "memory.memsw.failcnt", |_| Ok(1)).unwrap();
        assert_eq!(value, None);
    }

    #[test]
    fn test_ensure_dir() {
        let dir = tempfile::tempdir().unwrap();
        assert!(ensure_dir(dir.path()).is_ok());
        let err = ensure_dir(&dir.path().join("gone")).unwrap_err();
        assert!(fsutil::is_not_found(&err));
    }
}
