//! Index writer fed by a pool of worker threads.
//!
//! Records are queued on a bounded channel. Workers analyze them without
//! holding the writer, then lock it only to append. When the queue is full
//! the submitting thread runs the task itself, which throttles producers to
//! the speed of the pool instead of growing the queue.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, Sender, TrySendError, bounded};
use log::{debug, warn};
use parking_lot::Mutex;
use serde::Serialize;

use crate::analysis::Analyzer;
use crate::error::{QuarryError, Result};
use crate::index::record::IndexRecord;
use crate::index::writer::{IndexWriter, PreparedRecord, WriterStats};

/// One queued add operation.
struct Task {
    record: IndexRecord,
    replace: bool,
    label: String,
}

/// Outcome of a pooled indexing run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    /// Records added.
    pub succeeded: usize,
    /// Records that failed to analyze or add.
    pub failed: usize,
    /// Tasks executed on the submitting thread because the queue was full.
    pub caller_runs: usize,
}

#[derive(Default)]
struct Counters {
    succeeded: AtomicUsize,
    failed: AtomicUsize,
    caller_runs: AtomicUsize,
}

struct Shared {
    writer: Mutex<IndexWriter>,
    analyzer: Arc<dyn Analyzer>,
    train_dictionary: bool,
    counters: Counters,
}

impl Shared {
    fn execute(&self, task: Task) {
        match self.apply(&task) {
            Ok(()) => {
                self.counters.succeeded.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                self.counters.failed.fetch_add(1, Ordering::Relaxed);
                warn!("failed to index {}: {e}", task.label);
            }
        }
    }

    fn apply(&self, task: &Task) -> Result<()> {
        let prepared =
            PreparedRecord::analyze(self.analyzer.as_ref(), &task.record, self.train_dictionary)?;
        let key = prepared
            .key()
            .map(|(database, id)| (database.to_string(), id.to_string()));

        let mut writer = self.writer.lock();
        if task.replace
            && let Some((database, id)) = key
        {
            writer.delete_by_key(&database, &id)?;
        }
        writer.add_prepared(prepared)?;
        Ok(())
    }
}

/// Multi-threaded front end of one [`IndexWriter`].
///
/// Replacing adds of the same key are serialized by the writer lock, so an
/// index never ends up with two records for one key; which of two concurrent
/// versions wins is unspecified.
pub struct PooledIndexWriter {
    shared: Arc<Shared>,
    sender: Option<Sender<Task>>,
    workers: Vec<JoinHandle<()>>,
}

impl std::fmt::Debug for PooledIndexWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledIndexWriter")
            .field("workers", &self.workers.len())
            .field("open", &self.sender.is_some())
            .finish()
    }
}

impl PooledIndexWriter {
    /// Start `threads` workers over a queue of `queue_capacity` tasks.
    pub fn new(writer: IndexWriter, threads: usize, queue_capacity: usize) -> Result<Self> {
        if threads == 0 || queue_capacity == 0 {
            return Err(QuarryError::config(
                "pooled writer needs at least one thread and one queue slot",
            ));
        }

        let shared = Arc::new(Shared {
            analyzer: Arc::clone(writer.analyzer()),
            train_dictionary: writer.trains_dictionary(),
            writer: Mutex::new(writer),
            counters: Counters::default(),
        });
        let (sender, receiver) = bounded::<Task>(queue_capacity);

        let mut workers = Vec::with_capacity(threads);
        for n in 0..threads {
            let shared = Arc::clone(&shared);
            let receiver: Receiver<Task> = receiver.clone();
            let handle = thread::Builder::new()
                .name(format!("quarry-writer-{n}"))
                .spawn(move || {
                    for task in receiver.iter() {
                        shared.execute(task);
                    }
                })?;
            workers.push(handle);
        }
        debug!("started pooled writer with {threads} workers, queue {queue_capacity}");

        Ok(PooledIndexWriter {
            shared,
            sender: Some(sender),
            workers,
        })
    }

    /// Queue a record; runs it on the calling thread when the queue is full.
    ///
    /// `replace` deletes any record with the same `(database, id)` first.
    /// Failures of individual records are counted, not returned.
    pub fn submit<S: Into<String>>(&self, record: IndexRecord, replace: bool, label: S) -> Result<()> {
        let sender = self
            .sender
            .as_ref()
            .ok_or_else(|| QuarryError::index("pooled writer is finished"))?;
        let task = Task {
            record,
            replace,
            label: label.into(),
        };

        match sender.try_send(task) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(task)) => {
                self.shared
                    .counters
                    .caller_runs
                    .fetch_add(1, Ordering::Relaxed);
                self.shared.execute(task);
                Ok(())
            }
            Err(TrySendError::Disconnected(_)) => {
                Err(QuarryError::index("pooled writer workers have stopped"))
            }
        }
    }

    /// Counters so far.
    pub fn stats(&self) -> PoolStats {
        let counters = &self.shared.counters;
        PoolStats {
            succeeded: counters.succeeded.load(Ordering::Relaxed),
            failed: counters.failed.load(Ordering::Relaxed),
            caller_runs: counters.caller_runs.load(Ordering::Relaxed),
        }
    }

    fn stop_workers(&mut self) -> Result<()> {
        self.sender.take();
        let mut panicked = 0;
        for worker in self.workers.drain(..) {
            if worker.join().is_err() {
                panicked += 1;
            }
        }
        if panicked > 0 {
            return Err(QuarryError::index(format!("{panicked} writer workers panicked")));
        }
        Ok(())
    }

    /// Drain the queue, stop the workers, then commit and close the writer once.
    pub fn finish(mut self) -> Result<(PoolStats, WriterStats)> {
        self.stop_workers()?;
        let stats = self.stats();

        let shared = Arc::clone(&self.shared);
        drop(self);
        let shared = Arc::try_unwrap(shared)
            .map_err(|_| QuarryError::index("pooled writer is still shared"))?;
        let writer_stats = shared.writer.into_inner().close()?;
        Ok((stats, writer_stats))
    }
}

impl Drop for PooledIndexWriter {
    fn drop(&mut self) {
        if self.sender.is_some()
            && let Err(e) = self.stop_workers()
        {
            warn!("pooled writer dropped without finish: {e}");
        }
    }
}
