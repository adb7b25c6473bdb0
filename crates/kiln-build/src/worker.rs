//! Background build worker.
//!
//! # Design
//! - Stale descriptors are regenerated sequentially on one dedicated thread.
//! - Progress travels back over a channel as [`BuildNotice`] values so the
//!   caller's thread applies them with no locking of its own.
//! - Cancellation is a shared flag checked before each item; an item already
//!   being generated always runs to completion.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};

use kiln_events::{Event, EventBus};
use kiln_telemetry::Metrics;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{info, warn};

use crate::descriptor::{BuildDescriptor, BuildDescriptorSet};
use crate::error::{BuildError, BuildResult};
use crate::generate::ArtifactGenerator;
use crate::stamp::write_stamp;

/// Notification sent from the worker thread.
#[derive(Debug)]
pub enum BuildNotice {
    /// The batch began with this many stale items.
    BatchStarted {
        /// Items queued.
        pending: usize,
    },
    /// Generation of descriptor `index` began.
    ItemStarted {
        /// Position in the descriptor set.
        index: usize,
    },
    /// A source file of descriptor `index` was consumed.
    Progress {
        /// Position in the descriptor set.
        index: usize,
        /// Source file.
        file: PathBuf,
    },
    /// Descriptor `index` finished; on success its stamp is already written.
    ItemFinished {
        /// Position in the descriptor set.
        index: usize,
        /// Generation result.
        result: BuildResult<()>,
    },
    /// The batch ended.
    BatchFinished(BatchSummary),
}

/// Totals for one batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchSummary {
    /// Items regenerated and stamped.
    pub succeeded: usize,
    /// Items whose generation failed.
    pub failed: usize,
    /// Whether cancellation stopped the batch before every item started.
    pub cancelled: bool,
}

/// Callbacks applied on the caller's thread by [`BuildHandle::dispatch`].
pub trait BuildObserver {
    /// Generation of `descriptor` began.
    fn on_item_start(&mut self, index: usize, descriptor: &BuildDescriptor);

    /// A source file of `descriptor` was consumed.
    fn on_progress(&mut self, index: usize, descriptor: &BuildDescriptor, file: &Path) {
        let _ = (index, descriptor, file);
    }

    /// `descriptor` finished.
    fn on_item_finished(&mut self, index: usize, descriptor: &BuildDescriptor, ok: bool);

    /// The batch ended.
    fn on_batch_finished(&mut self, summary: &BatchSummary);
}

/// Clonable handle that stops a running batch before its next item.
#[derive(Debug, Clone)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// Request cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation was requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Batch of stale descriptors waiting to be regenerated.
pub struct BuildWorker {
    descriptors: Vec<BuildDescriptor>,
    pending: Vec<usize>,
    events: Option<EventBus>,
    metrics: Option<Metrics>,
}

impl BuildWorker {
    /// Snapshot the stale descriptors of `set`, in list order.
    #[must_use]
    pub fn new(set: &BuildDescriptorSet) -> Self {
        Self {
            descriptors: set.descriptors().to_vec(),
            pending: set.pending().map(|(index, _)| index).collect(),
            events: None,
            metrics: None,
        }
    }

    /// Publish progress on `events`.
    #[must_use]
    pub fn events(mut self, events: EventBus) -> Self {
        self.events = Some(events);
        self
    }

    /// Record counters in `metrics`.
    #[must_use]
    pub fn metrics(mut self, metrics: Metrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Number of items the batch will attempt.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Start the batch on a background thread.
    ///
    /// # Errors
    ///
    /// Returns [`BuildError::WorkerSpawn`] when the thread cannot be created.
    pub fn start<G>(self, generator: G) -> BuildResult<BuildHandle>
    where
        G: ArtifactGenerator + 'static,
    {
        let cancel = CancelToken(Arc::new(AtomicBool::new(false)));
        let (tx, rx) = mpsc::unbounded_channel();
        let descriptors: Arc<[BuildDescriptor]> = self.descriptors.into();
        let run = Batch {
            descriptors: Arc::clone(&descriptors),
            pending: self.pending,
            events: self.events,
            metrics: self.metrics,
            cancel: cancel.clone(),
            notices: tx,
        };
        let thread = thread::Builder::new()
            .name("kiln-build".to_string())
            .spawn(move || run.execute(generator))
            .map_err(|source| BuildError::WorkerSpawn { source })?;
        Ok(BuildHandle {
            descriptors,
            cancel,
            notices: rx,
            thread: Some(thread),
        })
    }
}

/// Caller-side view of a running batch.
pub struct BuildHandle {
    descriptors: Arc<[BuildDescriptor]>,
    cancel: CancelToken,
    notices: UnboundedReceiver<BuildNotice>,
    thread: Option<JoinHandle<BatchSummary>>,
}

impl BuildHandle {
    /// Stop before the next item starts.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Token that can cancel the batch from elsewhere.
    #[must_use]
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Descriptors the notice indices refer to.
    #[must_use]
    pub fn descriptors(&self) -> &[BuildDescriptor] {
        &self.descriptors
    }

    /// Next notice if one is queued.
    pub fn try_next(&mut self) -> Option<BuildNotice> {
        self.notices.try_recv().ok()
    }

    /// Block until the next notice; `None` once the worker is done.
    ///
    /// Must not be called from inside an async runtime.
    pub fn next_blocking(&mut self) -> Option<BuildNotice> {
        self.notices.blocking_recv()
    }

    /// Apply every notice to `observer` until the batch finishes, then join the worker.
    ///
    /// # Errors
    ///
    /// Returns [`BuildError::WorkerPanicked`] when the worker thread panicked.
    pub fn dispatch(mut self, observer: &mut dyn BuildObserver) -> BuildResult<BatchSummary> {
        while let Some(notice) = self.next_blocking() {
            match notice {
                BuildNotice::BatchStarted { .. } => {}
                BuildNotice::ItemStarted { index } => {
                    if let Some(descriptor) = self.descriptors.get(index) {
                        observer.on_item_start(index, descriptor);
                    }
                }
                BuildNotice::Progress { index, file } => {
                    if let Some(descriptor) = self.descriptors.get(index) {
                        observer.on_progress(index, descriptor, &file);
                    }
                }
                BuildNotice::ItemFinished { index, result } => {
                    if let Some(descriptor) = self.descriptors.get(index) {
                        observer.on_item_finished(index, descriptor, result.is_ok());
                    }
                }
                BuildNotice::BatchFinished(summary) => {
                    observer.on_batch_finished(&summary);
                    break;
                }
            }
        }
        self.join()
    }

    /// Wait for the worker thread and return its summary.
    ///
    /// # Errors
    ///
    /// Returns [`BuildError::WorkerPanicked`] when the worker thread panicked.
    pub fn join(mut self) -> BuildResult<BatchSummary> {
        let Some(thread) = self.thread.take() else {
            return Ok(BatchSummary::default());
        };
        thread.join().map_err(|_| BuildError::WorkerPanicked)
    }
}

struct Batch {
    descriptors: Arc<[BuildDescriptor]>,
    pending: Vec<usize>,
    events: Option<EventBus>,
    metrics: Option<Metrics>,
    cancel: CancelToken,
    notices: UnboundedSender<BuildNotice>,
}

impl Batch {
    fn execute<G: ArtifactGenerator>(self, mut generator: G) -> BatchSummary {
        let mut summary = BatchSummary::default();
        let total = self.pending.len();
        info!(pending = total, "build batch started");
        self.notify(BuildNotice::BatchStarted { pending: total });
        self.publish(Event::BuildStarted { pending: total });
        self.set_pending(total);

        for (position, &index) in self.pending.iter().enumerate() {
            if self.cancel.is_cancelled() {
                warn!(remaining = total - position, "build batch cancelled");
                summary.cancelled = true;
                break;
            }
            let descriptor = &self.descriptors[index];
            let artifact = descriptor.label();
            info!(artifact = %artifact, "generating artifact");
            self.notify(BuildNotice::ItemStarted { index });
            self.publish(Event::BuildItemStarted {
                artifact: artifact.clone(),
            });

            let notices = &self.notices;
            let mut progress = |file: &Path| {
                let _ = notices.send(BuildNotice::Progress {
                    index,
                    file: file.to_path_buf(),
                });
            };
            let result = generator
                .generate(descriptor, &mut progress)
                .and_then(|()| write_stamp(&descriptor.output, &descriptor.source_checksum));

            let succeeded = result.is_ok();
            if let Err(err) = &result {
                warn!(artifact = %artifact, error = %err, "artifact generation failed");
                summary.failed += 1;
            } else {
                info!(artifact = %artifact, "artifact generated");
                summary.succeeded += 1;
            }
            if let Some(metrics) = &self.metrics {
                metrics.inc_build_item(if succeeded { "succeeded" } else { "failed" });
            }
            self.set_pending(total - position - 1);
            self.notify(BuildNotice::ItemFinished { index, result });
            self.publish(Event::BuildItemFinished {
                artifact,
                succeeded,
            });
        }

        info!(
            succeeded = summary.succeeded,
            failed = summary.failed,
            cancelled = summary.cancelled,
            "build batch finished"
        );
        self.publish(Event::BuildFinished {
            succeeded: summary.succeeded,
            failed: summary.failed,
            cancelled: summary.cancelled,
        });
        self.notify(BuildNotice::BatchFinished(summary));
        summary
    }

    fn notify(&self, notice: BuildNotice) {
        // The caller may have dropped its receiver; the batch still completes.
        let _ = self.notices.send(notice);
    }

    fn publish(&self, event: Event) {
        if let Some(events) = &self.events {
            let _ = events.publish(event);
        }
    }

    fn set_pending(&self, pending: usize) {
        if let Some(metrics) = &self.metrics {
            metrics.set_build_pending(i64::try_from(pending).unwrap_or(i64::MAX));
        }
    }
}
