//! Cgroup v1 tree watcher and periodic stats collection.
//!
//! The [`Watcher`] keeps an in-memory mirror of every requested subsystem
//! hierarchy, kept in sync through filesystem notifications, and refreshes
//! the stats of every node on a fixed interval.
//!
//! # Key Components
//!
//! - [`CgroupTree`]: one hierarchy per mountpoint; co-mounted subsystems
//!   share their nodes.
//! - [`WatchState`]: the tree plus its watch bookkeeping, mutated only under
//!   a single lock by the event loop and the collection loop.
//! - [`Collector`]: per-subsystem reader of the accounting pseudo-files,
//!   selected through [`CollectorDispatch`].
//! - [`convert()`]: maps raw records onto the exported
//!   [`Stats`](crate::models::Stats) schema.
//!
//! # Platform Requirements
//!
//! - Linux with cgroup v1 hierarchies mounted.
//! - Read access to the cgroup mountpoints.
mod collect;
mod collector;
mod convert;
mod error;
pub mod stats;
mod subsystem;
mod tree;
mod utils;
mod watch;
mod watcher;

pub use collect::{CollectionLoop, DispatchTable, PassGuard, collect_pass};
pub use collector::{
    BlkioCollector, CpuCollector, CpuacctCollector, HugetlbCollector, MemoryCollector,
    NoopCollector,
};
pub use convert::convert;
pub use error::{Error, Result};
pub use subsystem::{Collector, CollectorDispatch, SubsystemKind};
pub use tree::{CgroupNode, CgroupTree, TreeError};
pub use utils::PROCS_FILE;
pub use watch::{FsEvent, NotifyRegistry, WatchRegistry, WatchState};
#[cfg(test)]
pub(crate) use watch::RecordingRegistry;
pub use watcher::{EventReceiver, TreeHandle, Watcher};
