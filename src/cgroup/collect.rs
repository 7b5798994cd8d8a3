//! Periodic stats collection over every watched subsystem tree.
//!
//! At most one pass runs at a time. A tick that fires while a pass is still
//! in flight is skipped and reported, so slow collection throttles itself
//! instead of queueing passes behind the tree lock.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;

use super::convert::convert;
use super::stats::RawStats;
use super::watch::{WatchState, lock};
use super::{CollectorDispatch, SubsystemKind};
use crate::fsutil;
use crate::metrics::{MetricsSink, as_micros};

/// Collector of every subsystem. Missing entries are treated as
/// [`CollectorDispatch::NoCollector`].
pub type DispatchTable = BTreeMap<SubsystemKind, CollectorDispatch>;

/// Marks a pass as running; the flag is released on drop, also when the pass
/// panics.
#[derive(Debug)]
pub struct PassGuard {
    flag: Arc<AtomicBool>,
}

impl PassGuard {
    pub fn try_acquire(flag: &Arc<AtomicBool>) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { flag: flag.clone() })
    }
}

impl Drop for PassGuard {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

/// Refreshes the stats of every node of every watched subsystem.
///
/// Holds the tree lock for the whole pass so every node is visited in a
/// structurally consistent tree.
pub fn collect_pass(state: &Mutex<WatchState>, dispatch: &DispatchTable, sink: &dyn MetricsSink) {
    let pass_start = Instant::now();
    let mut state = lock(state);
    let tree = state.tree_mut();
    let kinds: Vec<SubsystemKind> = tree.subsystems().map(|(kind, _)| kind.clone()).collect();

    for kind in kinds {
        let Some(CollectorDispatch::Collect(collector)) = dispatch.get(&kind) else {
            log::debug!("no collector for subsystem `{kind}`, skipping its nodes");
            continue;
        };
        let Some(root) = tree.root_mut(&kind) else {
            continue;
        };

        let start = Instant::now();
        root.walk_mut(&mut |node| {
            let raw = match collector.get_stats(&node.path) {
                Ok(raw) => raw,
                // Removed since the last tree update; its remove event will prune it.
                Err(err) if fsutil::is_not_found(&err) => RawStats::zero(&kind),
                Err(err) => {
                    log::warn!(
                        "failed to collect `{kind}` stats of `{}`: {err}",
                        node.path.display()
                    );
                    RawStats::zero(&kind)
                }
            };
            node.stats.get_or_insert_default().overlay(convert(raw));
        });
        sink.observe_collection_duration(kind.name(), as_micros(start.elapsed()));
    }

    sink.observe_total_collection_duration(as_micros(pass_start.elapsed()));
}

/// Ticker-driven loop starting one [`collect_pass`] per interval.
pub struct CollectionLoop {
    interval: Duration,
    state: Arc<Mutex<WatchState>>,
    dispatch: Arc<DispatchTable>,
    sink: Arc<dyn MetricsSink>,
    collecting: Arc<AtomicBool>,
    passes: JoinSet<()>,
}

impl CollectionLoop {
    pub fn new(
        interval: Duration,
        state: Arc<Mutex<WatchState>>,
        dispatch: Arc<DispatchTable>,
        sink: Arc<dyn MetricsSink>,
    ) -> Self {
        Self {
            interval,
            state,
            dispatch,
            sink,
            collecting: Arc::new(AtomicBool::new(false)),
            passes: JoinSet::new(),
        }
    }

    /// Starts a pass unless one is already running. Returns whether a pass
    /// was started.
    fn on_tick(&mut self) -> bool {
        let Some(guard) = PassGuard::try_acquire(&self.collecting) else {
            log::warn!(
                "skipping stats collection, the previous pass is still running: \
                 collection interval ({:?}) is shorter than collection latency",
                self.interval
            );
            self.sink.record_skipped_collection();
            return false;
        };

        let state = self.state.clone();
        let dispatch = self.dispatch.clone();
        let sink = self.sink.clone();
        self.passes.spawn_blocking(move || {
            let _guard = guard;
            collect_pass(&state, &dispatch, sink.as_ref());
        });
        true
    }

    /// Runs until `shutdown` changes, then waits for the pass in flight.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                _ = ticker.tick() => {
                    self.on_tick();
                }
                Some(result) = self.passes.join_next(), if !self.passes.is_empty() => {
                    if let Err(err) = result {
                        log::error!("stats collection pass failed: {err}");
                    }
                }
            }
        }

        while let Some(result) = self.passes.join_next().await {
            if let Err(err) = result {
                log::error!("stats collection pass failed: {err}");
            }
        }
        log::debug!("stats collection loop stopped");
    }
}
