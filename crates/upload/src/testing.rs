//! In-memory transport used by the unit tests.

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use cloudpart_protocol::Endpoint;
use cloudpart_protocol::constants::INTELLIGENT_INGESTION;
use serde_json::{Value, json};
use tokio::time::Instant;

use crate::error::TransportError;
use crate::transport::{TransportFuture, TransportResponse, UploadTransport};

#[derive(Debug, Clone)]
pub(crate) struct RecordedUpload {
    pub form: Value,
    pub data: Vec<u8>,
}

#[derive(Default)]
struct Log {
    requests: Vec<(Endpoint, Value)>,
    uploads: Vec<RecordedUpload>,
    part_attempts: HashMap<u32, u32>,
    started_parts: Vec<u32>,
    complete_times: Vec<Instant>,
}

/// Scripted backend: every request succeeds unless configured otherwise.
pub(crate) struct MockTransport {
    start_reply: Result<TransportResponse, TransportError>,
    etags: bool,
    failing_parts: HashSet<u32>,
    flaky_parts: HashMap<u32, u32>,
    failing_chunk_offsets: HashSet<u64>,
    reject_commits: bool,
    complete_script: Mutex<VecDeque<Result<TransportResponse, TransportError>>>,
    upload_delay: Option<Duration>,
    hang_except: Option<u32>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    log: Mutex<Log>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self {
            start_reply: Ok(TransportResponse::new(
                200,
                json!({"uri": "/bucket/key", "region": "us-east-1", "upload_id": "up-1"}),
            )),
            etags: true,
            failing_parts: HashSet::new(),
            flaky_parts: HashMap::new(),
            failing_chunk_offsets: HashSet::new(),
            reject_commits: false,
            complete_script: Mutex::new(VecDeque::new()),
            upload_delay: None,
            hang_except: None,
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            log: Mutex::new(Log::default()),
        }
    }

    /// Start replies select intelligent ingestion.
    pub fn intelligent(mut self) -> Self {
        self.start_reply = Ok(TransportResponse::new(
            200,
            json!({
                "uri": "/bucket/key",
                "region": "us-east-1",
                "upload_id": "up-1",
                "upload_type": INTELLIGENT_INGESTION,
            }),
        ));
        self
    }

    pub fn start_reply(mut self, reply: Result<TransportResponse, TransportError>) -> Self {
        self.start_reply = reply;
        self
    }

    /// Part uploads succeed without an etag header.
    pub fn without_etags(mut self) -> Self {
        self.etags = false;
        self
    }

    /// Every attempt for `part` gets a 500.
    pub fn fail_part(mut self, part: u32) -> Self {
        self.failing_parts.insert(part);
        self
    }

    /// The first `attempts` attempts for `part` get a 500.
    pub fn fail_part_attempts(mut self, part: u32, attempts: u32) -> Self {
        self.flaky_parts.insert(part, attempts);
        self
    }

    /// Every sub-chunk at `offset` within its part gets a 500.
    pub fn fail_chunk_at(mut self, offset: u64) -> Self {
        self.failing_chunk_offsets.insert(offset);
        self
    }

    pub fn rejecting_commits(mut self) -> Self {
        self.reject_commits = true;
        self
    }

    /// Replies used for completion attempts, in order; afterwards a 200.
    pub fn complete_replies(self, replies: Vec<Result<TransportResponse, TransportError>>) -> Self {
        if let Ok(mut script) = self.complete_script.lock() {
            script.extend(replies);
        }
        self
    }

    /// Every upload request takes `delay` before replying.
    pub fn upload_delay(mut self, delay: Duration) -> Self {
        self.upload_delay = Some(delay);
        self
    }

    /// Upload requests for every part other than `part` never reply.
    pub fn hang_parts_except(mut self, part: u32) -> Self {
        self.hang_except = Some(part);
        self
    }

    // ----- Inspection -----

    /// Upload requests sent so far, including unanswered ones.
    pub fn started_uploads(&self) -> usize {
        self.log.lock().unwrap().started_parts.len()
    }

    /// Distinct parts with at least one upload request sent.
    pub fn started_parts(&self) -> BTreeSet<u32> {
        self.log
            .lock()
            .unwrap()
            .started_parts
            .iter()
            .copied()
            .collect()
    }

    /// Upload requests currently awaiting a reply.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    pub fn uploads(&self) -> Vec<RecordedUpload> {
        self.log.lock().unwrap().uploads.clone()
    }

    pub fn uploads_for_part(&self, part: u32) -> usize {
        self.uploads()
            .iter()
            .filter(|u| u.form["part"] == part)
            .count()
    }

    pub fn requests_to(&self, endpoint: Endpoint) -> Vec<Value> {
        self.log
            .lock()
            .unwrap()
            .requests
            .iter()
            .filter(|(e, _)| *e == endpoint)
            .map(|(_, form)| form.clone())
            .collect()
    }

    pub fn complete_times(&self) -> Vec<Instant> {
        self.log.lock().unwrap().complete_times.clone()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    // ----- Replies -----

    fn reply_request(
        &self,
        endpoint: Endpoint,
        form: Value,
    ) -> Result<TransportResponse, TransportError> {
        let mut log = self.log.lock().unwrap();
        log.requests.push((endpoint, form));
        match endpoint {
            Endpoint::Start => self.start_reply.clone(),
            Endpoint::Commit if self.reject_commits => {
                Ok(TransportResponse::new(500, Value::Null))
            }
            Endpoint::Commit => Ok(TransportResponse::new(200, json!({}))),
            Endpoint::Complete => {
                log.complete_times.push(Instant::now());
                let scripted = self.complete_script.lock().unwrap().pop_front();
                scripted.unwrap_or_else(|| {
                    Ok(TransportResponse::new(
                        200,
                        json!({"handle": "file-handle", "url": "https://cdn.example/file-handle"}),
                    ))
                })
            }
            Endpoint::Upload => Ok(TransportResponse::new(400, Value::Null)),
        }
    }

    fn reply_upload(&self, form: Value, data: Vec<u8>) -> TransportResponse {
        let part = form["part"].as_u64().unwrap_or(0) as u32;
        let offset = form["offset"].as_u64();

        let mut log = self.log.lock().unwrap();
        log.uploads.push(RecordedUpload {
            form: form.clone(),
            data,
        });
        log.requests.push((Endpoint::Upload, form));
        let attempt = {
            let n = log.part_attempts.entry(part).or_insert(0);
            *n += 1;
            *n
        };

        let flaky = self
            .flaky_parts
            .get(&part)
            .is_some_and(|failures| attempt <= *failures);
        let chunk_fails = offset.is_some_and(|o| self.failing_chunk_offsets.contains(&o));
        if self.failing_parts.contains(&part) || flaky || chunk_fails {
            return TransportResponse::new(500, Value::Null);
        }

        let resp = TransportResponse::new(200, json!({}));
        if self.etags && offset.is_none() {
            resp.with_etag(format!("etag-{part}"))
        } else {
            resp
        }
    }
}

impl UploadTransport for MockTransport {
    fn send_request(&self, endpoint: Endpoint, form: &Value) -> TransportFuture<'_> {
        let form = form.clone();
        Box::pin(async move { self.reply_request(endpoint, form) })
    }

    fn send_data(&self, _endpoint: Endpoint, form: &Value, data: &[u8]) -> TransportFuture<'_> {
        let form = form.clone();
        let data = data.to_vec();
        Box::pin(async move {
            let _guard = InFlight::enter(&self.in_flight, &self.max_in_flight);
            let part = form["part"].as_u64().unwrap_or(0) as u32;
            self.log.lock().unwrap().started_parts.push(part);

            if self.hang_except.is_some_and(|keep| keep != part) {
                std::future::pending::<()>().await;
            }
            if let Some(delay) = self.upload_delay {
                tokio::time::sleep(delay).await;
            }
            Ok(self.reply_upload(form, data))
        })
    }
}

/// Counts an upload request as in flight until its future completes or is
/// dropped.
struct InFlight<'a>(&'a AtomicUsize);

impl<'a> InFlight<'a> {
    fn enter(in_flight: &'a AtomicUsize, max: &AtomicUsize) -> Self {
        let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        max.fetch_max(now, Ordering::SeqCst);
        Self(in_flight)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}
