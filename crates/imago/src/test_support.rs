//! Scripted transport and helpers shared by the unit tests.

use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use bytes::{BufMut, BytesMut};
use parking_lot::Mutex;
use reqwest::StatusCode;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderValue};
use tokio::sync::oneshot;
use url::Url;

use crate::error::TransportError;
use crate::request::ImageRequest;
use crate::transport::{ProgressReporter, ResponseInfo, Transport, TransportResponse};

type Outcome = Result<TransportResponse, TransportError>;

pub const PNG_SIGNATURE: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

#[inline]
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer() // Write to test output
        .try_init();
}

/// A 200 `image/png` response whose body starts with a PNG signature
pub fn png_response(url: &str, payload: &[u8]) -> Outcome {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("image/png"));

    let mut body = BytesMut::with_capacity(PNG_SIGNATURE.len() + payload.len());
    body.put_slice(PNG_SIGNATURE);
    body.put_slice(payload);

    Ok(TransportResponse {
        info: ResponseInfo {
            url: Url::parse(url).map_err(|e| TransportError::Other(e.to_string()))?,
            status: StatusCode::OK,
            headers,
        },
        body: body.freeze(),
    })
}

/// Poll `condition` until it holds, failing the test after five seconds
pub async fn wait_until(condition: impl Fn() -> bool) {
    let reached = tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::task::yield_now().await;
        }
    })
    .await;
    assert!(reached.is_ok(), "condition not reached in time");
}

struct Parked {
    id: u64,
    tx: oneshot::Sender<Outcome>,
    progress: ProgressReporter,
}

#[derive(Default)]
struct MockState {
    submits: Vec<String>,
    parked: HashMap<String, Parked>,
    next_id: u64,
    running: usize,
    max_concurrent: usize,
    cancelled: usize,
}

/// Transport whose fetches stay pending until the test completes them by URL
#[derive(Default)]
pub struct MockTransport {
    state: Mutex<MockState>,
}

impl MockTransport {
    /// URLs in the order their fetch started
    pub fn submits(&self) -> Vec<String> {
        self.state.lock().submits.clone()
    }

    pub fn submit_count(&self) -> usize {
        self.state.lock().submits.len()
    }

    pub fn max_concurrent(&self) -> usize {
        self.state.lock().max_concurrent
    }

    /// Fetches dropped before they produced an outcome
    pub fn cancelled(&self) -> usize {
        self.state.lock().cancelled
    }

    /// Resolve the running fetch for `url`. Returns false if none is waiting.
    pub fn complete(&self, url: &str, outcome: Outcome) -> bool {
        let parked = self.state.lock().parked.remove(url);
        match parked {
            Some(parked) => parked.tx.send(outcome).is_ok(),
            None => false,
        }
    }

    pub fn report_progress(&self, url: &str, received: u64, expected: Option<u64>) {
        if let Some(parked) = self.state.lock().parked.get(url) {
            parked.progress.report(received, expected);
        }
    }

    pub fn wait_for_submits(&self, count: usize) -> impl Future<Output = ()> + '_ {
        wait_until(move || self.submit_count() >= count)
    }
}

/// Tracks one running fetch and notices when it is dropped early
struct RunningGuard<'a> {
    transport: &'a MockTransport,
    url: String,
    id: u64,
    finished: bool,
}

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        let mut state = self.transport.state.lock();
        state.running -= 1;
        if !self.finished {
            state.cancelled += 1;
            if state.parked.get(&self.url).is_some_and(|p| p.id == self.id) {
                state.parked.remove(&self.url);
            }
        }
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn fetch(
        &self,
        request: &ImageRequest,
        progress: &ProgressReporter,
    ) -> Result<TransportResponse, TransportError> {
        let url = request.url().to_string();
        let (tx, rx) = oneshot::channel();

        let id = {
            let mut state = self.state.lock();
            state.next_id += 1;
            let id = state.next_id;
            state.submits.push(url.clone());
            state.parked.insert(
                url.clone(),
                Parked {
                    id,
                    tx,
                    progress: progress.clone(),
                },
            );
            state.running += 1;
            state.max_concurrent = state.max_concurrent.max(state.running);
            id
        };

        let mut guard = RunningGuard {
            transport: self,
            url,
            id,
            finished: false,
        };
        let outcome = rx
            .await
            .unwrap_or_else(|_| Err(TransportError::Other("mock fetch abandoned".into())));
        guard.finished = true;
        outcome
    }
}
