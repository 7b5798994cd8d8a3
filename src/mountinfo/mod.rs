//! Cgroup mount resolution.
//!
//! Finds the mountpoint of every cgroup v1 hierarchy together with the
//! subsystems attached to it. The watcher only consumes the resulting
//! [`Mount`] list through the [`MountResolver`] trait.
use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;

mod detect;
mod error;
mod parser;

pub use detect::detect_cgroup_mounts;
pub use error::{Error, Result};

/// A mounted cgroup hierarchy and the subsystems attached to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mount {
    pub mountpoint: PathBuf,
    pub subsystems: BTreeSet<String>,
}

impl Mount {
    pub fn new<I, S>(mountpoint: impl Into<PathBuf>, subsystems: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            mountpoint: mountpoint.into(),
            subsystems: subsystems.into_iter().map(Into::into).collect(),
        }
    }

    pub fn has_subsystem(&self, name: &str) -> bool {
        self.subsystems.contains(name)
    }
}

impl fmt::Display for Mount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.subsystems.iter().map(String::as_str).collect();
        write!(f, "{} ({})", self.mountpoint.display(), names.join(","))
    }
}

/// Supplies the cgroup mounts currently exposed by the kernel.
pub trait MountResolver: Send + Sync {
    /// # Errors
    ///
    /// Returns an [`Error`] if the mount table cannot be read.
    fn resolve(&self) -> Result<Vec<Mount>>;
}

/// [`MountResolver`] backed by a `mountinfo` file, usually `/proc/self/mountinfo`.
#[derive(Debug, Clone)]
pub struct MountinfoResolver {
    path: PathBuf,
}

impl MountinfoResolver {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl Default for MountinfoResolver {
    fn default() -> Self {
        Self::new("/proc/self/mountinfo")
    }
}

impl MountResolver for MountinfoResolver {
    fn resolve(&self) -> Result<Vec<Mount>> {
        detect_cgroup_mounts(&self.path)
    }
}

/// [`MountResolver`] returning a fixed mount list.
#[derive(Debug, Clone, Default)]
pub struct StaticMounts(pub Vec<Mount>);

impl MountResolver for StaticMounts {
    fn resolve(&self) -> Result<Vec<Mount>> {
        Ok(self.0.clone())
    }
}
