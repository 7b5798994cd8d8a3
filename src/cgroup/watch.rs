//! Filesystem watches and the synchronous application of watch events to the
//! cgroup tree.
//!
//! [`WatchState`] is the single value shared between the event path and the
//! collection loop. It pairs the [`CgroupTree`] with the bookkeeping of every
//! registered watch, so that both always change under the same lock.

use std::collections::BTreeSet;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use notify::event::{AccessKind, AccessMode, ModifyKind, RenameMode};
use notify::{EventKind, RecursiveMode};

use super::SubsystemKind;
use super::error::{Error, Result};
use super::tree::CgroupTree;
use super::utils::{PROCS_FILE, read_pids};
use crate::error::ResultOkLogExt;
use crate::fsutil;

/// A filesystem change relevant to the cgroup tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FsEvent {
    Create(PathBuf),
    Remove(PathBuf),
    Write(PathBuf),
}

impl FsEvent {
    /// Translates a `notify` event. Events that do not change the tree yield
    /// nothing.
    pub fn from_notify(event: &notify::Event) -> Vec<FsEvent> {
        match event.kind {
            EventKind::Create(_) => event.paths.iter().cloned().map(FsEvent::Create).collect(),
            EventKind::Remove(_) => event.paths.iter().cloned().map(FsEvent::Remove).collect(),
            EventKind::Modify(ModifyKind::Name(RenameMode::From)) => {
                event.paths.iter().cloned().map(FsEvent::Remove).collect()
            }
            EventKind::Modify(ModifyKind::Name(RenameMode::To)) => {
                event.paths.iter().cloned().map(FsEvent::Create).collect()
            }
            EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => match event.paths.as_slice() {
                [from, to] => vec![FsEvent::Remove(from.clone()), FsEvent::Create(to.clone())],
                _ => Vec::new(),
            },
            EventKind::Modify(_) | EventKind::Access(AccessKind::Close(AccessMode::Write)) => event
                .paths
                .iter()
                .filter(|path| is_procs_file(path))
                .cloned()
                .map(FsEvent::Write)
                .collect(),
            _ => Vec::new(),
        }
    }

    pub fn path(&self) -> &Path {
        match self {
            FsEvent::Create(path) | FsEvent::Remove(path) | FsEvent::Write(path) => path,
        }
    }
}

fn is_procs_file(path: &Path) -> bool {
    path.file_name() == Some(OsStr::new(PROCS_FILE))
}

/// The low-level watch primitive.
pub trait WatchRegistry: Send {
    fn add_watch(&mut self, path: &Path) -> notify::Result<()>;
    fn remove_watch(&mut self, path: &Path) -> notify::Result<()>;
}

/// [`WatchRegistry`] backed by a `notify` watcher (inotify on Linux).
pub struct NotifyRegistry<W = notify::RecommendedWatcher> {
    watcher: W,
}

impl<W: notify::Watcher> NotifyRegistry<W> {
    pub fn new(watcher: W) -> Self {
        Self { watcher }
    }
}

impl<W: notify::Watcher + Send> WatchRegistry for NotifyRegistry<W> {
    fn add_watch(&mut self, path: &Path) -> notify::Result<()> {
        self.watcher.watch(path, RecursiveMode::NonRecursive)
    }

    fn remove_watch(&mut self, path: &Path) -> notify::Result<()> {
        self.watcher.unwatch(path)
    }
}

fn is_watch_not_found(err: &notify::Error) -> bool {
    matches!(err.kind, notify::ErrorKind::WatchNotFound)
}

/// The cgroup tree together with the set of watched paths.
pub struct WatchState {
    tree: CgroupTree,
    registry: Box<dyn WatchRegistry>,
    watches: BTreeSet<PathBuf>,
}

impl WatchState {
    pub fn new(tree: CgroupTree, registry: Box<dyn WatchRegistry>) -> Self {
        Self {
            tree,
            registry,
            watches: BTreeSet::new(),
        }
    }

    pub fn tree(&self) -> &CgroupTree {
        &self.tree
    }

    pub fn tree_mut(&mut self) -> &mut CgroupTree {
        &mut self.tree
    }

    pub fn watches(&self) -> impl Iterator<Item = &Path> {
        self.watches.iter().map(PathBuf::as_path)
    }

    /// Number of watches registered inside the hierarchy of `kind`.
    pub fn watch_count(&self, kind: &SubsystemKind) -> usize {
        match self.tree.mountpoint(kind) {
            Some(mountpoint) => self
                .watches
                .iter()
                .filter(|path| path.starts_with(mountpoint))
                .count(),
            None => 0,
        }
    }

    /// Watch count of every subsystem.
    pub fn watch_counts(&self) -> Vec<(SubsystemKind, usize)> {
        self.tree
            .subsystems()
            .map(|(kind, _)| (kind.clone(), self.watch_count(kind)))
            .collect()
    }

    fn add_watch(&mut self, path: &Path) -> Result<()> {
        if self.watches.contains(path) {
            return Ok(());
        }
        self.registry
            .add_watch(path)
            .map_err(|source| Error::FilesystemWatch {
                path: path.to_path_buf(),
                source,
            })?;
        self.watches.insert(path.to_path_buf());
        log::trace!("watching `{}`", path.display());
        Ok(())
    }

    fn remove_watch(&mut self, path: &Path) -> Result<()> {
        if !self.watches.remove(path) {
            return Ok(());
        }
        match self.registry.remove_watch(path) {
            Err(err) if !is_watch_not_found(&err) => Err(Error::FilesystemWatch {
                path: path.to_path_buf(),
                source: err,
            }),
            _ => {
                log::trace!("released watch on `{}`", path.display());
                Ok(())
            }
        }
    }

    /// Mirrors the directory tree below `dir`, registering a watch on every
    /// directory and every `cgroup.procs` file found.
    ///
    /// Nodes that already exist are kept as they are. A cgroup removed while
    /// the walk is running is pruned and the walk goes on with its siblings;
    /// its remove event, if any, then finds nothing left to do.
    pub fn seed(&mut self, dir: &Path) -> Result<()> {
        let mut stack = vec![dir.to_path_buf()];
        while let Some(dir) = stack.pop() {
            match self.mirror_dir(&dir) {
                Ok(()) => {}
                Err(err) if err.is_vanished_path() && !self.tree.is_mountpoint(&dir) => {
                    log::debug!("cgroup `{}` vanished while mirroring: {err}", dir.display());
                    self.handle_remove(&dir).ok_log();
                    continue;
                }
                Err(err) => return Err(err),
            }

            let entries = match std::fs::read_dir(&dir) {
                Ok(entries) => entries,
                Err(err) if fsutil::is_not_found(&err) => continue,
                Err(err) => {
                    log::warn!("failed to list cgroup directory `{}`: {err}", dir.display());
                    continue;
                }
            };
            for entry in entries {
                match entry {
                    Ok(entry) if entry.file_type().is_ok_and(|ty| ty.is_dir()) => {
                        stack.push(entry.path());
                    }
                    Ok(_) => {}
                    Err(err) => {
                        log::warn!("failed to read entry of `{}`: {err}", dir.display());
                    }
                }
            }
        }
        Ok(())
    }

    /// Adds one directory to the tree and watches it and its process list.
    fn mirror_dir(&mut self, dir: &Path) -> Result<()> {
        if !self.tree.is_mountpoint(dir) {
            self.tree.insert(dir)?;
        }
        self.add_watch(dir)?;

        let procs = dir.join(PROCS_FILE);
        if procs.exists() {
            self.add_watch(&procs)?;
            self.refresh_pids(&procs)?;
        }
        Ok(())
    }

    /// Re-reads a `cgroup.procs` file. A file that no longer exists is an
    /// empty process list.
    fn refresh_pids(&mut self, procs: &Path) -> Result<()> {
        let pids = match read_pids(procs) {
            Ok(pids) => pids,
            Err(err) if fsutil::is_not_found(&err) => Vec::new(),
            Err(source) => {
                return Err(Error::ReadPids {
                    path: procs.to_path_buf(),
                    source,
                });
            }
        };
        let dir = procs.parent().unwrap_or(procs);
        self.tree.set_pids(dir, Some(pids))?;
        Ok(())
    }

    /// Applies one filesystem event.
    ///
    /// # Errors
    ///
    /// Fails if the event's path cannot be resolved in the tree, or if a
    /// watch or a process list cannot be updated. The tree stays consistent
    /// in every case.
    pub fn apply(&mut self, event: FsEvent) -> Result<()> {
        log::debug!("applying {event:?}");
        match event {
            FsEvent::Create(path) => self.handle_create(&path),
            FsEvent::Remove(path) => self.handle_remove(&path),
            FsEvent::Write(path) if is_procs_file(&path) => self.refresh_pids(&path),
            FsEvent::Write(_) => Ok(()),
        }
    }

    fn handle_create(&mut self, path: &Path) -> Result<()> {
        if fsutil::is_dir(path) {
            return self.seed(path);
        }
        if is_procs_file(path) && path.exists() {
            self.add_watch(path)?;
            return self.refresh_pids(path);
        }
        log::trace!("ignoring created file `{}`", path.display());
        Ok(())
    }

    fn handle_remove(&mut self, path: &Path) -> Result<()> {
        if is_procs_file(path) {
            self.remove_watch(path)?;
            let dir = path.parent().unwrap_or(path);
            self.tree.set_pids(dir, None)?;
            return Ok(());
        }

        let Some(removed) = self.tree.remove(path)? else {
            // Already pruned, e.g. by the remove event of the directory's own watch.
            self.remove_watch(path).ok_log();
            self.remove_watch(&path.join(PROCS_FILE)).ok_log();
            return Ok(());
        };

        if !removed.children.is_empty() {
            log::warn!(
                "cgroup `{}` was removed with {} live descendants, releasing their watches",
                path.display(),
                removed.node_count() - 1
            );
        }

        let mut paths = Vec::new();
        removed.walk(&mut |node| paths.push(node.path.clone()));
        for dir in paths {
            self.remove_watch(&dir.join(PROCS_FILE)).ok_log();
            self.remove_watch(&dir).ok_log();
        }
        Ok(())
    }

    /// Releases every registered watch.
    ///
    /// All watches are attempted; the first failure is returned.
    pub fn release_all(&mut self) -> Result<()> {
        let mut result = Ok(());
        for path in std::mem::take(&mut self.watches) {
            if let Err(err) = self.registry.remove_watch(&path) {
                if is_watch_not_found(&err) {
                    continue;
                }
                log::error!("failed to release watch on `{}`: {err}", path.display());
                if result.is_ok() {
                    result = Err(Error::FilesystemWatch { path, source: err });
                }
            }
        }
        result
    }
}

/// Locks the shared state. The tree is structurally valid after any single
/// mutation, so a poisoned lock is recovered.
pub fn lock(state: &Mutex<WatchState>) -> MutexGuard<'_, WatchState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// In-memory [`WatchRegistry`] for tests.
#[cfg(test)]
#[derive(Debug, Clone, Default)]
pub(crate) struct RecordingRegistry {
    pub active: std::sync::Arc<Mutex<BTreeSet<PathBuf>>>,
}

#[cfg(test)]
impl WatchRegistry for RecordingRegistry {
    fn add_watch(&mut self, path: &Path) -> notify::Result<()> {
        self.active.lock().unwrap().insert(path.to_path_buf());
        Ok(())
    }

    fn remove_watch(&mut self, path: &Path) -> notify::Result<()> {
        if self.active.lock().unwrap().remove(path) {
            Ok(())
        } else {
            Err(notify::Error::watch_not_found())
        }
    }
}
