//! Upload orchestrator: drives one multipart upload from session start to
//! completion.
//!
//! Parts are transferred by concurrent tasks bounded by a semaphore. Every
//! part task reports to a single coordinator task, which owns the etag map,
//! the abort record and the progress counter. Completion is only attempted
//! after all part tasks finished and the coordinator drained their events.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use cloudpart_protocol::{Credentials, UploadProgress, UploadStatus};
use cloudpart_transfer::{Part, ProgressCounter, UploadSource, plan_parts, resolve_source};
use tokio::runtime::Handle;
use tokio::sync::{Semaphore, mpsc, watch};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::delivery::Delivery;
use crate::error::{AbortReason, UploadError};
use crate::part::{PartContext, PartEvent, PartTransferTask};
use crate::retry::completion_backoff;
use crate::steps::{CompletionAttempt, Steps};
use crate::transport::UploadTransport;
use crate::types::{
    FinalResponse, PartOutcome, ProgressCallback, UploadOptions, UploadResult, UploadSession,
};

/// Handle to one multipart upload.
///
/// Cloning the handle does not start a second upload; all clones observe and
/// control the same lifecycle.
#[derive(Clone)]
pub struct UploadOrchestrator {
    shared: Arc<Shared>,
}

struct Shared {
    steps: Arc<Steps>,
    source: Arc<dyn UploadSource>,
    options: UploadOptions,
    cancel: CancellationToken,
    started: AtomicBool,
    status: watch::Sender<UploadStatus>,
    progress: RwLock<Option<ProgressCallback>>,
    last_progress: Mutex<UploadProgress>,
    delivery: Delivery<UploadResult>,
}

impl UploadOrchestrator {
    /// Creates an idle upload of `source`. Nothing is sent until [`start`].
    ///
    /// [`start`]: UploadOrchestrator::start
    pub fn new(
        transport: Arc<dyn UploadTransport>,
        credentials: Credentials,
        source: Arc<dyn UploadSource>,
        options: UploadOptions,
    ) -> Self {
        let (status, _) = watch::channel(UploadStatus::Idle);
        Self {
            shared: Arc::new(Shared {
                steps: Arc::new(Steps::new(transport, credentials)),
                source,
                options: options.normalized(),
                cancel: CancellationToken::new(),
                started: AtomicBool::new(false),
                status,
                progress: RwLock::new(None),
                last_progress: Mutex::new(UploadProgress::default()),
                delivery: Delivery::new(),
            }),
        }
    }

    /// Starts the upload on the current tokio runtime.
    ///
    /// Returns immediately; the outcome is delivered to the completion
    /// callback. A second call fails with [`UploadError::AlreadyStarted`];
    /// a call outside a runtime fails with [`UploadError::NoRuntime`] and
    /// leaves the upload idle.
    pub fn start(&self) -> Result<(), UploadError> {
        let runtime = Handle::try_current().map_err(|_| UploadError::NoRuntime)?;
        if self.shared.started.swap(true, Ordering::AcqRel) {
            return Err(UploadError::AlreadyStarted);
        }
        let shared = Arc::clone(&self.shared);
        runtime.spawn(shared.run());
        Ok(())
    }

    /// Cancels the upload.
    ///
    /// The completion callback receives `Aborted(Cancelled)` right away;
    /// whatever the in-flight work produces afterwards is discarded.
    pub fn cancel(&self) {
        self.shared.cancel.cancel();
        let accepted = self.shared.finish(
            UploadStatus::Aborted,
            Err(UploadError::Aborted(AbortReason::Cancelled)),
        );
        if accepted {
            info!("upload cancelled");
        }
    }

    /// Registers the progress callback, replacing any previous one.
    ///
    /// Snapshots arrive in order and never go backwards.
    pub fn on_progress<F>(&self, callback: F)
    where
        F: Fn(UploadProgress) + Send + Sync + 'static,
    {
        if let Ok(mut slot) = self.shared.progress.write() {
            *slot = Some(Arc::new(callback));
        }
    }

    /// Registers the completion callback.
    ///
    /// It is invoked exactly once per upload. If the upload already finished,
    /// it is invoked immediately with the stored result.
    pub fn on_complete<F>(&self, callback: F)
    where
        F: FnOnce(UploadResult) + Send + 'static,
    {
        self.shared.delivery.set_callback(Box::new(callback));
    }

    /// Current lifecycle state.
    pub fn state(&self) -> UploadStatus {
        *self.shared.status.borrow()
    }

    /// Subscribes to lifecycle state changes.
    pub fn subscribe(&self) -> watch::Receiver<UploadStatus> {
        self.shared.status.subscribe()
    }

    /// Waits until the upload reaches a terminal state and returns it.
    pub async fn wait(&self) -> UploadStatus {
        let mut rx = self.shared.status.subscribe();
        match rx.wait_for(|status| status.is_terminal()).await {
            Ok(status) => *status,
            Err(_) => self.state(),
        }
    }

    /// Last progress snapshot delivered.
    pub fn progress(&self) -> UploadProgress {
        self.shared
            .last_progress
            .lock()
            .map(|p| *p)
            .unwrap_or_default()
    }

    /// Effective options, with zero values replaced by defaults.
    pub fn options(&self) -> &UploadOptions {
        &self.shared.options
    }
}

// ---------------------------------------------------------------------------
// Lifecycle
// ---------------------------------------------------------------------------

impl Shared {
    async fn run(self: Arc<Self>) {
        let (status, result) = match self.drive().await {
            Ok(resp) => {
                info!(status = resp.status, "upload completed");
                (UploadStatus::Succeeded, Ok(resp))
            }
            Err(e) => {
                let status = terminal_status(&e);
                if status == UploadStatus::Aborted {
                    warn!(error = %e, "upload aborted");
                } else {
                    error!(error = %e, "upload failed");
                }
                (status, Err(e))
            }
        };
        if !self.finish(status, result) {
            debug!("upload result discarded after cancellation");
        }
    }

    async fn drive(self: &Arc<Self>) -> Result<FinalResponse, UploadError> {
        self.set_status(UploadStatus::Starting);
        let info = resolve_source(self.source.as_ref(), &self.options.store)?;
        let parts = plan_parts(info.file_size, self.options.chunk_size)?;
        self.check_cancelled()?;

        let session = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Err(cancelled()),
            session = self.steps.start(&info, &self.options) => session?,
        };
        info!(
            upload_id = %session.upload_id,
            file = %session.file_name,
            size = session.file_size,
            parts = parts.len(),
            intelligent = session.intelligent,
            "upload session started"
        );
        let session = Arc::new(session);

        self.set_status(UploadStatus::SubmittingParts);
        let checkpoint = self.submit_parts(&session, &parts).await;

        self.set_status(UploadStatus::AwaitingCompletion);
        self.check_cancelled()?;
        checkpoint.verdict(&parts).map_err(UploadError::Aborted)?;

        self.set_status(UploadStatus::Completing);
        let etags = (!session.intelligent).then_some(&checkpoint.etags);
        self.complete(&session, etags).await
    }

    /// Runs every part through the pool and returns the coordinator's record
    /// once all part tasks finished.
    async fn submit_parts(
        self: &Arc<Self>,
        session: &Arc<UploadSession>,
        parts: &[Part],
    ) -> Checkpoint {
        let work = self.cancel.child_token();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let coordinator = tokio::spawn(coordinate(
            Arc::clone(self),
            events_rx,
            work.clone(),
            session.intelligent,
            session.file_size,
        ));

        let ctx = PartContext {
            steps: Arc::clone(&self.steps),
            session: Arc::clone(session),
            source: Arc::clone(&self.source),
            events: events_tx,
            retries: self.options.part_retries,
            chunk_size: self.options.intelligent_chunk_size,
            chunk_concurrency: self.options.chunk_upload_concurrency,
        };
        let pool = Arc::new(Semaphore::new(self.options.part_upload_concurrency));
        let mut tasks = JoinSet::new();

        for part in parts.iter().copied() {
            let permit = tokio::select! {
                biased;
                _ = work.cancelled() => break,
                permit = Arc::clone(&pool).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };
            if work.is_cancelled() {
                break;
            }

            debug!(part = part.index, offset = part.offset, size = part.size, "submitting part");
            let task = PartTransferTask::new(ctx.clone(), part, work.child_token());
            let events = ctx.events.clone();
            tasks.spawn(async move {
                let _permit = permit;
                let outcome = task.run().await;
                let _ = events.send(PartEvent::Finished(outcome));
            });
        }

        // A part whose task died never reports; the verdict treats it as failed.
        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                warn!(error = %e, "part task died");
                work.cancel();
            }
        }

        // Last sender gone: the coordinator drains and returns.
        drop(ctx);
        match coordinator.await {
            Ok(checkpoint) => checkpoint,
            Err(e) => {
                error!(error = %e, "upload coordinator died");
                Checkpoint::default()
            }
        }
    }

    async fn complete(
        &self,
        session: &UploadSession,
        etags: Option<&BTreeMap<u32, String>>,
    ) -> Result<FinalResponse, UploadError> {
        let max_retries = self.options.max_completion_retries;
        let mut retry = 0u32;
        loop {
            let attempt = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(cancelled()),
                attempt = self.steps.complete(session, etags) => attempt,
            };

            let network_error = match attempt {
                CompletionAttempt::Accepted(resp) => return Ok(resp),
                CompletionAttempt::Rejected { status } => {
                    warn!(upload_id = %session.upload_id, status, retry, "completion rejected");
                    false
                }
                CompletionAttempt::NetworkError(e) => {
                    warn!(upload_id = %session.upload_id, error = %e, retry, "completion request failed");
                    true
                }
            };

            if retry >= max_retries {
                return Err(UploadError::Aborted(AbortReason::CompletionFailed));
            }
            retry += 1;

            let delay = completion_backoff(retry, network_error);
            debug!(retry, delay_ms = delay.as_millis() as u64, "retrying completion");
            if !delay.is_zero() {
                tokio::select! {
                    biased;
                    _ = self.cancel.cancelled() => return Err(cancelled()),
                    _ = tokio::time::sleep(delay) => {}
                }
            }
        }
    }

    // ----- State -----

    fn set_status(&self, next: UploadStatus) {
        let changed = self.status.send_if_modified(|current| {
            if current.is_terminal() || *current == next {
                return false;
            }
            *current = next;
            true
        });
        if changed {
            debug!(status = ?next, "upload state changed");
        }
    }

    /// Delivers the terminal result. Returns `false` if one was already
    /// delivered.
    fn finish(&self, status: UploadStatus, result: UploadResult) -> bool {
        self.delivery.deliver(result, || {
            self.status.send_replace(status);
        })
    }

    fn emit_progress(&self, progress: UploadProgress) {
        if self.delivery.is_finished() {
            return;
        }
        if let Ok(mut last) = self.last_progress.lock() {
            *last = progress;
        }
        let callback = self.progress.read().ok().and_then(|slot| slot.clone());
        if let Some(callback) = callback {
            callback(progress);
        }
    }

    fn check_cancelled(&self) -> Result<(), UploadError> {
        if self.cancel.is_cancelled() {
            Err(cancelled())
        } else {
            Ok(())
        }
    }
}

fn cancelled() -> UploadError {
    UploadError::Aborted(AbortReason::Cancelled)
}

fn terminal_status(e: &UploadError) -> UploadStatus {
    match e {
        UploadError::Aborted(AbortReason::PartTransferFailed { .. })
        | UploadError::Aborted(AbortReason::Cancelled) => UploadStatus::Aborted,
        _ => UploadStatus::Failed,
    }
}

// ---------------------------------------------------------------------------
// Coordinator
// ---------------------------------------------------------------------------

/// Part bookkeeping owned by the coordinator task.
#[derive(Debug, Default)]
struct Checkpoint {
    etags: BTreeMap<u32, String>,
    completed: BTreeSet<u32>,
    failed_part: Option<u32>,
    aborted: bool,
}

impl Checkpoint {
    /// Records a part outcome. Returns `true` if this outcome is the one that
    /// aborts the upload.
    fn record(&mut self, outcome: PartOutcome, intelligent: bool) -> bool {
        let was_aborted = self.aborted;
        let index = outcome.index;

        if outcome.failed {
            self.fail(index);
        } else if outcome.cancelled {
            self.aborted = true;
        } else if intelligent {
            self.completed.insert(index);
        } else {
            match outcome.etag {
                Some(etag) => {
                    self.etags.insert(index, etag);
                    self.completed.insert(index);
                }
                None => self.fail(index),
            }
        }

        self.aborted && !was_aborted
    }

    fn fail(&mut self, index: u32) {
        self.failed_part.get_or_insert(index);
        self.aborted = true;
    }

    /// Every part must have completed for the upload to be completed.
    fn verdict(&self, parts: &[Part]) -> Result<(), AbortReason> {
        if let Some(part) = self.failed_part {
            return Err(AbortReason::PartTransferFailed { part });
        }
        match parts.iter().find(|p| !self.completed.contains(&p.index)) {
            Some(missing) => Err(AbortReason::PartTransferFailed {
                part: missing.index,
            }),
            None => Ok(()),
        }
    }
}

async fn coordinate(
    shared: Arc<Shared>,
    mut events: mpsc::UnboundedReceiver<PartEvent>,
    work: CancellationToken,
    intelligent: bool,
    total_bytes: u64,
) -> Checkpoint {
    let mut counter = ProgressCounter::new(total_bytes);
    let mut checkpoint = Checkpoint::default();

    while let Some(event) = events.recv().await {
        match event {
            PartEvent::Progress(bytes) => shared.emit_progress(counter.advance(bytes)),
            PartEvent::Finished(outcome) => {
                if checkpoint.record(outcome, intelligent) {
                    if let Some(part) = checkpoint.failed_part {
                        warn!(part, "part failed, cancelling remaining parts");
                    }
                    work.cancel();
                }
            }
        }
    }

    debug!(
        completed = checkpoint.completed.len(),
        uploaded = counter.uploaded_bytes(),
        "all part events processed"
    );
    checkpoint
}
