use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;

use super::collect::{CollectionLoop, DispatchTable};
use super::error::{Error, Result};
use super::tree::{CgroupNode, CgroupTree};
use super::watch::{FsEvent, NotifyRegistry, WatchRegistry, WatchState, lock};
use super::{CollectorDispatch, SubsystemKind};
use crate::metrics::MetricsSink;
use crate::mountinfo::MountResolver;

/// Raw events delivered by the filesystem watch primitive.
pub type EventReceiver = mpsc::UnboundedReceiver<notify::Result<notify::Event>>;

enum Lifecycle {
    Idle(EventReceiver),
    Running {
        shutdown: watch::Sender<bool>,
        tasks: JoinSet<()>,
    },
    Stopped,
}

/// Mirrors the requested cgroup subsystems and periodically collects their
/// stats.
///
/// ```no_run
/// # async fn example() -> Result<(), cgwatch::cgroup::Error> {
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// use cgwatch::cgroup::Watcher;
/// use cgwatch::metrics::NoopSink;
/// use cgwatch::mountinfo::MountinfoResolver;
///
/// let mut watcher = Watcher::new(
///     Duration::from_secs(1),
///     ["cpu", "memory"],
///     &MountinfoResolver::default(),
///     Arc::new(NoopSink),
/// )?;
/// watcher.start().await?;
/// // ...
/// watcher.stop().await?;
/// # Ok(())
/// # }
/// ```
pub struct Watcher {
    interval: Duration,
    state: Arc<Mutex<WatchState>>,
    dispatch: DispatchTable,
    sink: Arc<dyn MetricsSink>,
    lifecycle: Lifecycle,
}

impl Watcher {
    /// Resolves the mount of every requested subsystem and creates the
    /// `notify` watcher.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::InvalidInterval`] for a zero interval,
    /// [`Error::UnknownSubsystem`] if a subsystem is not mounted,
    /// [`Error::MountQuery`] if the mounts cannot be listed and
    /// [`Error::WatcherInit`] if the watch primitive cannot be created.
    pub fn new<I>(
        interval: Duration,
        subsystems: I,
        resolver: &dyn MountResolver,
        sink: Arc<dyn MetricsSink>,
    ) -> Result<Self>
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        check_interval(interval)?;
        let tree = build_tree(subsystems, resolver)?;

        let (tx, rx) = mpsc::unbounded_channel();
        let watcher = notify::recommended_watcher(move |event: notify::Result<notify::Event>| {
            // The receiver is gone once the watcher is stopped.
            let _ = tx.send(event);
        })
        .map_err(Error::WatcherInit)?;

        Ok(Self::from_parts(
            interval,
            tree,
            Box::new(NotifyRegistry::new(watcher)),
            rx,
            sink,
        ))
    }

    /// Like [`Watcher::new`], with a caller-provided watch primitive and the
    /// channel it delivers events on.
    pub fn with_registry<I>(
        interval: Duration,
        subsystems: I,
        resolver: &dyn MountResolver,
        sink: Arc<dyn MetricsSink>,
        registry: Box<dyn WatchRegistry>,
        events: EventReceiver,
    ) -> Result<Self>
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        check_interval(interval)?;
        let tree = build_tree(subsystems, resolver)?;
        Ok(Self::from_parts(interval, tree, registry, events, sink))
    }

    fn from_parts(
        interval: Duration,
        tree: CgroupTree,
        registry: Box<dyn WatchRegistry>,
        events: EventReceiver,
        sink: Arc<dyn MetricsSink>,
    ) -> Self {
        let dispatch: DispatchTable = tree
            .subsystems()
            .map(|(kind, _)| (kind.clone(), CollectorDispatch::for_kind(kind)))
            .collect();

        for kind in &SubsystemKind::ALL {
            sink.set_subsystem_enabled(kind.name(), tree.mountpoint(kind).is_some());
        }
        for (kind, _) in tree.subsystems() {
            if let SubsystemKind::Unsupported(name) = kind {
                sink.set_subsystem_enabled(name, true);
            }
        }

        Self {
            interval,
            state: Arc::new(Mutex::new(WatchState::new(tree, registry))),
            dispatch,
            sink,
            lifecycle: Lifecycle::Idle(events),
        }
    }

    /// Replaces the collector used for `kind`.
    pub fn with_collector(mut self, kind: SubsystemKind, dispatch: CollectorDispatch) -> Self {
        self.dispatch.insert(kind, dispatch);
        self
    }

    pub fn tree(&self) -> TreeHandle {
        TreeHandle(self.state.clone())
    }

    /// Seeds the tree from the filesystem and spawns the event and
    /// collection loops. The initial walk runs on the blocking pool.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::FilesystemWatch`] if a watch cannot be registered
    /// during the initial walk, and with [`Error::AlreadyStarted`] if called
    /// more than once.
    pub async fn start(&mut self) -> Result<()> {
        if !matches!(self.lifecycle, Lifecycle::Idle(_)) {
            return Err(Error::AlreadyStarted);
        }

        let state = self.state.clone();
        let sink = self.sink.clone();
        tokio::task::spawn_blocking(move || seed_all(&state, sink.as_ref())).await??;

        let Lifecycle::Idle(events) = std::mem::replace(&mut self.lifecycle, Lifecycle::Stopped)
        else {
            return Err(Error::AlreadyStarted);
        };

        let (shutdown, shutdown_rx) = watch::channel(false);
        let mut tasks = JoinSet::new();
        tasks.spawn(run_event_loop(
            events,
            self.state.clone(),
            self.sink.clone(),
            shutdown_rx.clone(),
        ));
        tasks.spawn(
            CollectionLoop::new(
                self.interval,
                self.state.clone(),
                Arc::new(self.dispatch.clone()),
                self.sink.clone(),
            )
            .run(shutdown_rx),
        );

        self.lifecycle = Lifecycle::Running { shutdown, tasks };
        log::info!(
            "cgroup watcher started, collecting every {:?}",
            self.interval
        );
        Ok(())
    }

    /// Signals both loops to stop, waits for them and releases every
    /// filesystem watch.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::FilesystemWatch`] if a watch cannot be released,
    /// [`Error::TaskJoin`] if a loop panicked and [`Error::NotStarted`] if
    /// the watcher is not running.
    pub async fn stop(&mut self) -> Result<()> {
        let (shutdown, mut tasks) =
            match std::mem::replace(&mut self.lifecycle, Lifecycle::Stopped) {
                Lifecycle::Running { shutdown, tasks } => (shutdown, tasks),
                other => {
                    self.lifecycle = other;
                    return Err(Error::NotStarted);
                }
            };

        // Both loops may already have exited.
        let _ = shutdown.send(true);
        let mut joined = Ok(());
        while let Some(result) = tasks.join_next().await {
            if let Err(err) = result {
                log::error!("cgroup watcher task failed: {err}");
                if joined.is_ok() {
                    joined = Err(Error::TaskJoin(err));
                }
            }
        }

        let state = self.state.clone();
        let sink = self.sink.clone();
        let released = tokio::task::spawn_blocking(move || {
            let mut state = lock(&state);
            let released = state.release_all();
            report_watch_counts(&state, sink.as_ref());
            released
        })
        .await?;

        log::info!("cgroup watcher stopped");
        released.and(joined)
    }
}

/// Shared read access to the mirrored tree.
#[derive(Clone)]
pub struct TreeHandle(Arc<Mutex<WatchState>>);

impl TreeHandle {
    /// Copy of every subsystem's tree, keyed by subsystem name.
    pub fn snapshot(&self) -> BTreeMap<String, CgroupNode> {
        lock(&self.0).tree().snapshot()
    }

    pub fn watch_count(&self, kind: &SubsystemKind) -> usize {
        lock(&self.0).watch_count(kind)
    }
}

fn check_interval(interval: Duration) -> Result<()> {
    if interval.is_zero() {
        return Err(Error::InvalidInterval(interval));
    }
    Ok(())
}

/// Mirrors every hierarchy. On failure the watches registered so far are
/// released.
fn seed_all(state: &Mutex<WatchState>, sink: &dyn MetricsSink) -> Result<()> {
    let mut state = lock(state);
    let mountpoints: Vec<PathBuf> = state.tree().mountpoints().map(Path::to_path_buf).collect();
    for mountpoint in mountpoints {
        log::info!("mirroring cgroup hierarchy `{}`", mountpoint.display());
        if let Err(err) = state.seed(&mountpoint) {
            if let Err(release_err) = state.release_all() {
                log::error!("{release_err}");
            }
            return Err(err);
        }
    }
    report_watch_counts(&state, sink);
    Ok(())
}

fn build_tree<I>(subsystems: I, resolver: &dyn MountResolver) -> Result<CgroupTree>
where
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    let mounts = resolver.resolve()?;
    let mut tree = CgroupTree::new();

    for name in subsystems {
        let name = name.as_ref();
        let Some(mount) = mounts.iter().find(|mount| mount.has_subsystem(name)) else {
            return Err(Error::UnknownSubsystem {
                name: name.to_owned(),
                mounts,
            });
        };

        if tree.add_subsystem(SubsystemKind::from_name(name), &mount.mountpoint) {
            log::debug!("cgroup subsystem `{name}` mounted at `{mount}`");
        } else {
            log::debug!("cgroup subsystem `{name}` shares the hierarchy at `{mount}`");
        }
    }

    Ok(tree)
}

fn report_watch_counts(state: &WatchState, sink: &dyn MetricsSink) {
    for (kind, count) in state.watch_counts() {
        sink.set_watch_count(kind.name(), count);
    }
}

/// Applies filesystem events one at a time until shutdown.
async fn run_event_loop(
    mut events: EventReceiver,
    state: Arc<Mutex<WatchState>>,
    sink: Arc<dyn MetricsSink>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        let event = tokio::select! {
            _ = shutdown.changed() => break,
            event = events.recv() => match event {
                Some(event) => event,
                None => break,
            },
        };

        let event = match event {
            Ok(event) => event,
            Err(err) => {
                log::error!("filesystem watch error: {err}");
                continue;
            }
        };
        if event.need_rescan() {
            log::warn!("filesystem events were dropped, the cgroup tree may be stale");
        }

        let fs_events = FsEvent::from_notify(&event);
        if fs_events.is_empty() {
            continue;
        }

        let state = state.clone();
        let sink = sink.clone();
        let applied = tokio::task::spawn_blocking(move || {
            let mut state = lock(&state);
            for event in fs_events {
                let path = event.path().to_path_buf();
                if let Err(err) = state.apply(event) {
                    log::warn!("dropping event for `{}`: {err}", path.display());
                }
            }
            report_watch_counts(&state, sink.as_ref());
        })
        .await;

        if let Err(err) = applied {
            log::error!("failed to apply filesystem event: {err}");
        }
    }
    log::debug!("filesystem event loop stopped");
}
