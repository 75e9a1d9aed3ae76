//! Transfer of a single part.
//!
//! Regular mode sends the part in one request and keeps the returned etag.
//! Intelligent mode splits the part into sub-chunks sent concurrently and
//! then commits the part; no etag is involved.

use std::sync::Arc;

use cloudpart_transfer::{Part, SubChunk, UploadSource, plan_sub_chunks};
use tokio::sync::{Semaphore, mpsc};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::UploadError;
use crate::retry::{RetryError, RetryingStep};
use crate::steps::Steps;
use crate::types::{PartOutcome, UploadSession};

/// Messages sent from part tasks to the upload coordinator.
#[derive(Debug)]
pub(crate) enum PartEvent {
    /// Bytes confirmed by the backend.
    Progress(u64),
    /// A part reached its final outcome.
    Finished(PartOutcome),
}

/// Everything a part or sub-chunk task needs, cheaply cloneable.
#[derive(Clone)]
pub(crate) struct PartContext {
    pub steps: Arc<Steps>,
    pub session: Arc<UploadSession>,
    pub source: Arc<dyn UploadSource>,
    pub events: mpsc::UnboundedSender<PartEvent>,
    pub retries: u32,
    pub chunk_size: u64,
    pub chunk_concurrency: usize,
}

/// Transfers one part and reports its outcome.
pub(crate) struct PartTransferTask {
    ctx: PartContext,
    part: Part,
    cancel: CancellationToken,
}

impl PartTransferTask {
    pub fn new(ctx: PartContext, part: Part, cancel: CancellationToken) -> Self {
        Self { ctx, part, cancel }
    }

    /// Runs the transfer to its outcome. Never panics on backend errors.
    pub async fn run(self) -> PartOutcome {
        let outcome = if self.ctx.session.intelligent {
            self.run_intelligent().await
        } else {
            self.run_regular().await
        };
        debug!(
            part = outcome.index,
            success = outcome.is_success(),
            cancelled = outcome.cancelled,
            "part finished"
        );
        outcome
    }

    async fn run_regular(&self) -> PartOutcome {
        let index = self.part.index;
        let data = match read_range(&self.ctx.source, self.part.offset, self.part.size).await {
            Ok(data) => data,
            Err(e) => {
                warn!(part = index, error = %e, "failed to read part");
                return PartOutcome::failed(index);
            }
        };

        let steps = &self.ctx.steps;
        let session = &self.ctx.session;
        let part = &self.part;
        let data = &data[..];
        let step = RetryingStep::new(
            format!("upload part {index}"),
            self.ctx.retries,
            self.cancel.clone(),
        );

        match step
            .run(move |_| steps.upload_part(session, part, data))
            .await
        {
            Ok(etag) => {
                let _ = self.ctx.events.send(PartEvent::Progress(part.size));
                PartOutcome::uploaded(index, Some(etag))
            }
            Err(RetryError::Cancelled { .. }) => PartOutcome::cancelled(index),
            Err(RetryError::Exhausted { .. }) => PartOutcome::failed(index),
        }
    }

    async fn run_intelligent(&self) -> PartOutcome {
        let index = self.part.index;
        let chunks = plan_sub_chunks(self.part.size, self.ctx.chunk_size);

        // Siblings stop as soon as one sub-chunk fails.
        let part_cancel = self.cancel.child_token();
        let pool = Arc::new(Semaphore::new(self.ctx.chunk_concurrency.max(1)));
        let mut tasks = JoinSet::new();

        for chunk in chunks {
            let permit = tokio::select! {
                biased;
                _ = part_cancel.cancelled() => break,
                permit = pool.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };
            let job = SubChunkTask {
                ctx: self.ctx.clone(),
                part: self.part,
                chunk,
                cancel: part_cancel.clone(),
            };
            tasks.spawn(async move {
                let _permit = permit;
                job.run().await
            });
        }

        let mut failed = false;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(ChunkResult::Uploaded) | Ok(ChunkResult::Cancelled) => {}
                Ok(ChunkResult::Failed) => failed = true,
                Err(e) => {
                    warn!(part = index, error = %e, "sub-chunk task failed");
                    failed = true;
                    part_cancel.cancel();
                }
            }
        }

        if failed {
            return PartOutcome::failed(index);
        }
        if part_cancel.is_cancelled() {
            return PartOutcome::cancelled(index);
        }

        let steps = &self.ctx.steps;
        let session = &self.ctx.session;
        let part = &self.part;
        let commit = RetryingStep::new(
            format!("commit part {index}"),
            self.ctx.retries,
            self.cancel.clone(),
        );
        match commit.run(move |_| steps.commit_part(session, part)).await {
            Ok(()) => PartOutcome::uploaded(index, None),
            Err(RetryError::Cancelled { .. }) => PartOutcome::cancelled(index),
            Err(RetryError::Exhausted { .. }) => PartOutcome::failed(index),
        }
    }
}

// ---------------------------------------------------------------------------
// Sub-chunks
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChunkResult {
    Uploaded,
    Failed,
    Cancelled,
}

struct SubChunkTask {
    ctx: PartContext,
    part: Part,
    chunk: SubChunk,
    cancel: CancellationToken,
}

impl SubChunkTask {
    async fn run(self) -> ChunkResult {
        let index = self.part.index;
        let offset = self.part.offset + self.chunk.offset_in_part;
        let data = match read_range(&self.ctx.source, offset, self.chunk.size).await {
            Ok(data) => data,
            Err(e) => {
                warn!(part = index, offset, error = %e, "failed to read sub-chunk");
                self.cancel.cancel();
                return ChunkResult::Failed;
            }
        };

        let steps = &self.ctx.steps;
        let session = &self.ctx.session;
        let part = &self.part;
        let chunk = &self.chunk;
        let data = &data[..];
        let step = RetryingStep::new(
            format!("upload part {index} at {}", chunk.offset_in_part),
            self.ctx.retries,
            self.cancel.clone(),
        );

        match step
            .run(move |_| steps.upload_chunk(session, part, chunk, data))
            .await
        {
            Ok(()) => {
                let _ = self.ctx.events.send(PartEvent::Progress(chunk.size));
                ChunkResult::Uploaded
            }
            Err(RetryError::Cancelled { .. }) => ChunkResult::Cancelled,
            Err(RetryError::Exhausted { .. }) => {
                self.cancel.cancel();
                ChunkResult::Failed
            }
        }
    }
}

/// Reads a byte range off the async runtime.
async fn read_range(
    source: &Arc<dyn UploadSource>,
    offset: u64,
    len: u64,
) -> Result<Vec<u8>, UploadError> {
    let source = Arc::clone(source);
    tokio::task::spawn_blocking(move || source.read_at(offset, len))
        .await
        .map_err(|e| UploadError::Io(std::io::Error::other(e)))?
        .map_err(UploadError::from)
}
