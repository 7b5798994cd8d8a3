use crate::fsutil;

use super::parser::parse_mount_info_line;
use super::{Error, Mount, Result};
use std::collections::BTreeSet;
use std::io::BufRead;
use std::path::{Path, PathBuf};

/// Controller names the kernel may list in the super options of a cgroup v1 mount.
///
/// Anything else in the super options (`rw`, `xattr`, `name=systemd`, ...) is a
/// mount flag, not a subsystem.
const KNOWN_CONTROLLERS: &[&str] = &[
    "blkio",
    "cpu",
    "cpuacct",
    "cpuset",
    "devices",
    "freezer",
    "hugetlb",
    "memory",
    "misc",
    "net_cls",
    "net_prio",
    "perf_event",
    "pids",
    "rdma",
];

/// Detects all cgroup v1 hierarchies listed in the given `mountinfo` file.
///
/// # Arguments
///
/// * `path` - Path to a Linux mountinfo file (e.g., `/proc/self/mountinfo`).
///
/// # Errors
///
/// - [`Error::FileOpen`] if the file can't be opened.
/// - [`Error::ReadLine`] if reading from the file fails.
/// - [`Error::Parse`] if parsing any line fails.
///
/// # Example
///
/// ```no_run
/// use cgwatch::mountinfo::detect_cgroup_mounts;
///
/// for mount in detect_cgroup_mounts("/proc/self/mountinfo").unwrap() {
///     println!("{} -> {:?}", mount.mountpoint.display(), mount.subsystems);
/// }
/// ```
pub fn detect_cgroup_mounts(path: impl AsRef<Path>) -> Result<Vec<Mount>> {
    let path = path.as_ref();
    let buf = fsutil::open_file_reader(path)?;

    detect_cgroup_mounts_from_reader(buf, path)
}

/// Internal implementation for detecting cgroup v1 mounts from a reader.
///
/// Bind mounts of an already seen mountpoint are skipped, the first
/// occurrence wins.
fn detect_cgroup_mounts_from_reader<R: BufRead>(mut reader: R, origin: &Path) -> Result<Vec<Mount>> {
    let mut line = String::with_capacity(256);
    let mut mounts: Vec<Mount> = Vec::new();

    while reader
        .read_line(&mut line)
        .map_err(|source| Error::ReadLine {
            path: origin.to_path_buf(),
            source,
        })?
        != 0
    {
        let mount_info = parse_mount_info_line(line.as_str()).map_err(|source| Error::Parse {
            path: origin.to_path_buf(),
            source,
        })?;

        if mount_info.fs_type == "cgroup" {
            let subsystems: BTreeSet<String> = mount_info
                .super_options()
                .filter(|opt| KNOWN_CONTROLLERS.contains(opt))
                .map(str::to_owned)
                .collect();
            let mountpoint = PathBuf::from(mount_info.mount_point);

            if subsystems.is_empty() {
                log::trace!(
                    "Skipping named cgroup hierarchy without controllers at `{}`",
                    mountpoint.display()
                );
            } else if mounts.iter().any(|m| m.mountpoint == mountpoint) {
                log::trace!("Skipping duplicate cgroup mount `{}`", mountpoint.display());
            } else {
                log::debug!(
                    "Found cgroup mount point `{}` for {:?}",
                    mountpoint.display(),
                    subsystems
                );
                mounts.push(Mount {
                    mountpoint,
                    subsystems,
                });
            }
        }

        line.clear();
    }

    Ok(mounts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const MOUNTINFO: &str = "\
25 1 0:24 / /proc rw,relatime - proc proc rw
28 25 0:25 / /sys/fs/cgroup ro,nosuid shared:9 - tmpfs tmpfs ro,mode=755
29 28 0:26 / /sys/fs/cgroup/systemd rw,nosuid shared:10 - cgroup cgroup rw,xattr,name=systemd
30 28 0:27 / /sys/fs/cgroup/cpu,cpuacct rw,nosuid shared:11 - cgroup cgroup rw,cpu,cpuacct
31 28 0:28 / /sys/fs/cgroup/memory rw,nosuid shared:12 - cgroup cgroup rw,memory
32 28 0:29 / /sys/fs/cgroup/unified rw,nosuid shared:13 - cgroup2 cgroup2 rw,nsdelegate
";

    fn set(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_detect_cgroup_v1_mounts() {
        let reader = Cursor::new(MOUNTINFO.as_bytes().to_vec());
        let mounts = detect_cgroup_mounts_from_reader(reader, Path::new("/dummy")).unwrap();

        assert_eq!(
            mounts,
            vec![
                Mount {
                    mountpoint: PathBuf::from("/sys/fs/cgroup/cpu,cpuacct"),
                    subsystems: set(&["cpu", "cpuacct"]),
                },
                Mount {
                    mountpoint: PathBuf::from("/sys/fs/cgroup/memory"),
                    subsystems: set(&["memory"]),
                },
            ]
        );
    }

    #[test]
    fn test_detect_skips_duplicate_mountpoint() {
        let input = "\
31 28 0:28 / /cg/memory rw - cgroup cgroup rw,memory
41 28 0:28 / /cg/memory rw - cgroup cgroup rw,memory
";
        let reader = Cursor::new(input.as_bytes().to_vec());
        let mounts = detect_cgroup_mounts_from_reader(reader, Path::new("/dummy")).unwrap();
        assert_eq!(mounts.len(), 1);
    }

    #[test]
    fn test_detect_no_cgroup_mounts() {
        let input = "25 1 0:24 / /proc rw,relatime - proc proc rw\n";
        let reader = Cursor::new(input.as_bytes().to_vec());
        let mounts = detect_cgroup_mounts_from_reader(reader, Path::new("/dummy")).unwrap();
        assert!(mounts.is_empty());
    }

    #[test]
    fn test_detect_invalid_line() {
        let input = "invalid mountinfo line";
        let path = Path::new("/dummy");
        let reader = Cursor::new(input.as_bytes().to_vec());

        let err = detect_cgroup_mounts_from_reader(reader, path).unwrap_err();
        match err {
            Error::Parse { path: err_path, .. } => assert_eq!(err_path, path),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_detect_from_tempfile() {
        let mut tmp = NamedTempFile::new().unwrap();
        writeln!(
            tmp,
            "31 28 0:28 / /sys/fs/cgroup/blkio rw,nosuid - cgroup cgroup rw,blkio"
        )
        .unwrap();

        let mounts = detect_cgroup_mounts(tmp.path()).unwrap();
        assert_eq!(mounts[0].mountpoint, PathBuf::from("/sys/fs/cgroup/blkio"));
        assert_eq!(mounts[0].subsystems, set(&["blkio"]));
    }

    #[test]
    fn test_detect_missing_file() {
        let err = detect_cgroup_mounts("/definitely/does/not/exist").unwrap_err();
        assert!(matches!(err, Error::FileOpen(_)));
    }
}
