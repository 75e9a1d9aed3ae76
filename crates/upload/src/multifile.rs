//! Sequential upload of several sources with aggregated progress.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use cloudpart_protocol::{Credentials, UploadProgress};
use cloudpart_transfer::UploadSource;
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::delivery::Delivery;
use crate::error::{AbortReason, UploadError};
use crate::orchestrator::UploadOrchestrator;
use crate::transport::UploadTransport;
use crate::types::{ProgressCallback, UploadOptions, UploadResult};

/// Uploads several sources one after another with shared options.
///
/// Progress covers all sources (total = sum of their sizes). The completion
/// callback receives one result per source, in source order.
pub struct MultifileUpload {
    shared: Arc<MultiShared>,
}

struct MultiShared {
    uploads: Vec<UploadOrchestrator>,
    cancel: CancellationToken,
    started: AtomicBool,
    progress: Arc<RwLock<Option<ProgressCallback>>>,
    delivery: Delivery<Vec<UploadResult>>,
}

impl MultifileUpload {
    /// Creates an idle multi-file upload.
    pub fn new(
        transport: Arc<dyn UploadTransport>,
        credentials: Credentials,
        sources: Vec<Arc<dyn UploadSource>>,
        options: UploadOptions,
    ) -> Self {
        let sizes: Vec<u64> = sources
            .iter()
            .map(|s| s.size().unwrap_or_default())
            .collect();
        let total_bytes: u64 = sizes.iter().sum();
        let progress: Arc<RwLock<Option<ProgressCallback>>> = Arc::new(RwLock::new(None));

        let mut offset = 0u64;
        let mut uploads = Vec::with_capacity(sources.len());
        for (source, size) in sources.into_iter().zip(sizes) {
            let upload = UploadOrchestrator::new(
                Arc::clone(&transport),
                credentials.clone(),
                source,
                options.clone(),
            );

            let sink = Arc::clone(&progress);
            let base = offset;
            upload.on_progress(move |p| {
                let callback = sink.read().ok().and_then(|slot| slot.clone());
                if let Some(callback) = callback {
                    callback(UploadProgress {
                        total_bytes,
                        uploaded_bytes: (base + p.uploaded_bytes).min(total_bytes),
                        bytes_per_second: p.bytes_per_second,
                    });
                }
            });

            offset += size;
            uploads.push(upload);
        }

        Self {
            shared: Arc::new(MultiShared {
                uploads,
                cancel: CancellationToken::new(),
                started: AtomicBool::new(false),
                progress,
                delivery: Delivery::new(),
            }),
        }
    }

    /// Starts uploading on the current tokio runtime.
    pub fn start(&self) -> Result<(), UploadError> {
        let runtime = Handle::try_current().map_err(|_| UploadError::NoRuntime)?;
        if self.shared.started.swap(true, Ordering::AcqRel) {
            return Err(UploadError::AlreadyStarted);
        }
        runtime.spawn(Arc::clone(&self.shared).run());
        Ok(())
    }

    /// Cancels the upload in progress; the remaining ones end as
    /// `Aborted(Cancelled)` without any request.
    pub fn cancel(&self) {
        self.shared.cancel.cancel();
        for upload in &self.shared.uploads {
            upload.cancel();
        }
        if !self.shared.started.swap(true, Ordering::AcqRel) {
            let results = self.shared.uploads.iter().map(|_| cancelled()).collect();
            self.shared.delivery.deliver(results, || {});
        }
    }

    /// Registers the aggregated progress callback.
    pub fn on_progress<F>(&self, callback: F)
    where
        F: Fn(UploadProgress) + Send + Sync + 'static,
    {
        if let Ok(mut slot) = self.shared.progress.write() {
            *slot = Some(Arc::new(callback));
        }
    }

    /// Registers the completion callback, invoked once with every result.
    pub fn on_complete<F>(&self, callback: F)
    where
        F: FnOnce(Vec<UploadResult>) + Send + 'static,
    {
        self.shared.delivery.set_callback(Box::new(callback));
    }

    /// Per-source upload handles, in source order.
    pub fn uploads(&self) -> &[UploadOrchestrator] {
        &self.shared.uploads
    }
}

impl MultiShared {
    async fn run(self: Arc<Self>) {
        let mut results = Vec::with_capacity(self.uploads.len());
        for (i, upload) in self.uploads.iter().enumerate() {
            let (tx, rx) = oneshot::channel();
            upload.on_complete(move |result| {
                let _ = tx.send(result);
            });

            if self.cancel.is_cancelled() {
                upload.cancel();
            } else if let Err(e) = upload.start() {
                warn!(file = i, error = %e, "failed to start file upload");
                results.push(Err(e));
                continue;
            }

            results.push(rx.await.unwrap_or_else(|_| cancelled()));
        }

        let succeeded = results.iter().filter(|r| r.is_ok()).count();
        info!(files = results.len(), succeeded, "multi-file upload finished");
        self.delivery.deliver(results, || {});
    }
}

fn cancelled() -> UploadResult {
    Err(UploadError::Aborted(AbortReason::Cancelled))
}
