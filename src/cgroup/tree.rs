//! In-memory mirror of the mounted cgroup hierarchies.
//!
//! The tree owns one hierarchy per mountpoint. Subsystems are views: each
//! [`SubsystemKind`] maps to the mountpoint whose hierarchy it reads, so
//! co-mounted subsystems such as `cpu` and `cpuacct` share a single set of
//! nodes.

use std::collections::{BTreeMap, HashMap};
use std::path::{Component, Path, PathBuf};

use super::SubsystemKind;
use crate::models::Stats;

#[derive(Debug, thiserror::Error)]
pub enum TreeError {
    #[error("path `{path}` does not resolve to a node of the cgroup tree")]
    UnresolvedPath { path: PathBuf },
    #[error("path `{path}` is outside every watched cgroup hierarchy")]
    OutsideHierarchy { path: PathBuf },
}

pub type Result<T> = std::result::Result<T, TreeError>;

/// A cgroup directory.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct CgroupNode {
    pub name: String,
    pub path: PathBuf,
    pub children: HashMap<String, CgroupNode>,
    /// Content of `cgroup.procs`; `None` while the file is not watched.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pids: Option<Vec<u32>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stats: Option<Stats>,
}

impl CgroupNode {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            children: HashMap::new(),
            pids: None,
            stats: None,
        }
    }

    fn root(mountpoint: &Path) -> Self {
        let name = mountpoint
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self::new(name, mountpoint)
    }

    /// Visits this node and all of its descendants, parents before children.
    pub fn walk(&self, f: &mut dyn FnMut(&CgroupNode)) {
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            f(node);
            stack.extend(node.children.values());
        }
    }

    /// Mutable counterpart of [`CgroupNode::walk`].
    pub fn walk_mut(&mut self, f: &mut dyn FnMut(&mut CgroupNode)) {
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            f(&mut *node);
            stack.extend(node.children.values_mut());
        }
    }

    /// Number of nodes in this subtree, including `self`.
    pub fn node_count(&self) -> usize {
        let mut count = 0;
        self.walk(&mut |_| count += 1);
        count
    }

    /// Looks up a descendant by its path relative to this node.
    pub fn find(&self, relative: impl AsRef<Path>) -> Option<&CgroupNode> {
        segments(relative.as_ref())
            .try_fold(self, |node, segment| node.children.get(&segment))
    }
}

/// Directory segments of a relative path; `.` segments are skipped.
fn segments(relative: &Path) -> impl Iterator<Item = String> + '_ {
    relative.components().filter_map(|component| match component {
        Component::Normal(segment) => Some(segment.to_string_lossy().into_owned()),
        _ => None,
    })
}

#[derive(Debug, Default)]
pub struct CgroupTree {
    hierarchies: BTreeMap<PathBuf, CgroupNode>,
    subsystems: BTreeMap<SubsystemKind, PathBuf>,
}

impl CgroupTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attaches `kind` to the hierarchy mounted at `mountpoint`.
    ///
    /// Returns `true` if the hierarchy was created by this call, `false` if
    /// another subsystem already shares it.
    pub fn add_subsystem(&mut self, kind: SubsystemKind, mountpoint: impl Into<PathBuf>) -> bool {
        let mountpoint = mountpoint.into();
        let created = !self.hierarchies.contains_key(&mountpoint);
        if created {
            self.hierarchies
                .insert(mountpoint.clone(), CgroupNode::root(&mountpoint));
        }
        self.subsystems.insert(kind, mountpoint);
        created
    }

    /// Watched subsystems and their mountpoints.
    pub fn subsystems(&self) -> impl Iterator<Item = (&SubsystemKind, &Path)> {
        self.subsystems
            .iter()
            .map(|(kind, mountpoint)| (kind, mountpoint.as_path()))
    }

    pub fn mountpoint(&self, kind: &SubsystemKind) -> Option<&Path> {
        self.subsystems.get(kind).map(PathBuf::as_path)
    }

    pub fn mountpoints(&self) -> impl Iterator<Item = &Path> {
        self.hierarchies.keys().map(PathBuf::as_path)
    }

    pub fn is_mountpoint(&self, path: &Path) -> bool {
        self.hierarchies.contains_key(path)
    }

    pub fn root(&self, kind: &SubsystemKind) -> Option<&CgroupNode> {
        self.hierarchies.get(self.subsystems.get(kind)?)
    }

    pub fn root_mut(&mut self, kind: &SubsystemKind) -> Option<&mut CgroupNode> {
        self.hierarchies.get_mut(self.subsystems.get(kind)?)
    }

    /// Finds the hierarchy containing `path` and the path relative to it.
    fn locate<'p>(&mut self, path: &'p Path) -> Result<(&mut CgroupNode, &'p Path)> {
        self.hierarchies
            .iter_mut()
            .filter(|(mountpoint, _)| path.starts_with(mountpoint))
            .max_by_key(|(mountpoint, _)| mountpoint.components().count())
            .and_then(|(mountpoint, root)| Some((root, path.strip_prefix(mountpoint).ok()?)))
            .ok_or_else(|| TreeError::OutsideHierarchy {
                path: path.to_path_buf(),
            })
    }

    /// Resolves the node at `path`.
    pub fn node_mut(&mut self, path: &Path) -> Result<&mut CgroupNode> {
        let (mut node, relative) = self.locate(path)?;
        for segment in segments(relative) {
            node = node
                .children
                .get_mut(&segment)
                .ok_or_else(|| TreeError::UnresolvedPath {
                    path: path.to_path_buf(),
                })?;
        }
        Ok(node)
    }

    /// Resolves the parent node of `path` and the name `path` has in it.
    fn parent_mut(&mut self, path: &Path) -> Result<(&mut CgroupNode, String)> {
        let unresolved = || TreeError::UnresolvedPath {
            path: path.to_path_buf(),
        };
        let (mut node, relative) = self.locate(path)?;
        let mut names: Vec<String> = segments(relative).collect();
        // A hierarchy root has no parent.
        let name = names.pop().ok_or_else(unresolved)?;
        for segment in names {
            node = node.children.get_mut(&segment).ok_or_else(unresolved)?;
        }
        Ok((node, name))
    }

    /// Inserts a node for the directory at `path`.
    ///
    /// Returns `false` if the node already exists, which leaves it untouched.
    pub fn insert(&mut self, path: &Path) -> Result<bool> {
        let (parent, name) = self.parent_mut(path)?;
        if parent.children.contains_key(&name) {
            return Ok(false);
        }
        let child = CgroupNode::new(name.clone(), parent.path.join(&name));
        parent.children.insert(name, child);
        Ok(true)
    }

    /// Detaches the node at `path` and returns it with its subtree.
    pub fn remove(&mut self, path: &Path) -> Result<Option<CgroupNode>> {
        let (parent, name) = self.parent_mut(path)?;
        Ok(parent.children.remove(&name))
    }

    /// Stores the PID list of the directory at `dir`.
    pub fn set_pids(&mut self, dir: &Path, pids: Option<Vec<u32>>) -> Result<()> {
        self.node_mut(dir)?.pids = pids;
        Ok(())
    }

    /// Copy of every subsystem's tree, keyed by subsystem name.
    pub fn snapshot(&self) -> BTreeMap<String, CgroupNode> {
        self.subsystems
            .iter()
            .filter_map(|(kind, mountpoint)| {
                let root = self.hierarchies.get(mountpoint)?;
                Some((kind.name().to_owned(), root.clone()))
            })
            .collect()
    }
}
