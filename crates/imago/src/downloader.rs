//! # Image Downloader
//!
//! Coordinates image downloads on top of a [`Transport`] and an optional
//! [`ImageRequestCache`].
//!
//! - A cache hit is answered synchronously with [`Fetch::Cached`].
//! - Concurrent requests for the same key share a single transport operation;
//!   each caller gets its own [`DownloadHandle`] and all of them observe the
//!   same outcome, in the order they attached.
//! - At most `max_active_downloads` operations run at once. Further downloads
//!   wait in an admission queue ordered by [`DownloadPrioritization`].
//! - Cancelling a [`Receipt`] detaches one waiter. The transport operation is
//!   only aborted (or the queued download dropped) once no waiter is left.
//!
//! Bookkeeping lives behind one mutex, the cache behind its own; the two are
//! never held together and waiters are resolved after both are released.

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Weak};
use std::task::{Context, Poll};

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::oneshot::error::TryRecvError;
use tokio::sync::{oneshot, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

use crate::builder::ImageDownloaderBuilder;
use crate::cache::{ImageCache, ImageRequestCache};
use crate::config::{DownloadPrioritization, DownloaderConfig};
use crate::decode::ImageDecoder;
use crate::error::{ConfigError, DownloadError, TransportError};
use crate::image::Image;
use crate::key::cache_key;
use crate::request::{CachePolicy, ImageRequest};
use crate::transport::{
    DownloadProgress, ProgressReporter, ResponseInfo, Transport, TransportResponse,
};

/// A successfully downloaded image
#[derive(Debug, Clone)]
pub struct Downloaded {
    pub image: Image,
    /// Response the image was decoded from, shared by all waiters
    pub response: Arc<ResponseInfo>,
}

pub type DownloadResult = Result<Downloaded, DownloadError>;

/// Identifies one waiter of one download
///
/// A receipt is bound to the download it was issued for. Once that download
/// has finished, the receipt no longer matches a later download of the same
/// key, even one reusing the receipt id.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Receipt {
    key: String,
    receipt_id: Uuid,
    generation: u64,
}

impl Receipt {
    /// Key of the download this receipt waits on
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn receipt_id(&self) -> Uuid {
        self.receipt_id
    }
}

/// What [`ImageDownloader::cancel`] did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    /// The waiter was removed; other waiters keep the download alive, or the
    /// download had already produced its outcome
    Detached,
    /// The last waiter of a queued download left; the download was dropped
    Dequeued,
    /// The last waiter of an active download left; the transport operation was aborted
    Aborted,
    /// No download or waiter matched the receipt
    NotFound,
}

/// Result of [`ImageDownloader::request_download`]
#[derive(Debug)]
pub enum Fetch {
    /// Served from the memory cache. There is nothing to cancel.
    Cached(Image),
    /// A download is queued or running
    Pending(DownloadHandle),
}

impl Fetch {
    pub fn is_cached(&self) -> bool {
        matches!(self, Fetch::Cached(_))
    }

    pub fn receipt(&self) -> Option<&Receipt> {
        match self {
            Fetch::Cached(_) => None,
            Fetch::Pending(handle) => Some(handle.receipt()),
        }
    }

    /// Wait for the image, whichever way it is delivered
    pub async fn image(self) -> Result<Image, DownloadError> {
        match self {
            Fetch::Cached(image) => Ok(image),
            Fetch::Pending(handle) => handle.await.map(|downloaded| downloaded.image),
        }
    }
}

/// Completion handle of one waiter
///
/// Resolves once the shared download finishes. Dropping an unresolved handle
/// cancels its receipt.
#[derive(Debug)]
pub struct DownloadHandle {
    receipt: Receipt,
    rx: oneshot::Receiver<DownloadResult>,
    progress: watch::Receiver<DownloadProgress>,
    downloader: Weak<Inner>,
    resolved: bool,
}

impl DownloadHandle {
    pub fn receipt(&self) -> &Receipt {
        &self.receipt
    }

    /// Progress of the shared download
    pub fn progress(&self) -> watch::Receiver<DownloadProgress> {
        self.progress.clone()
    }
}

impl Future for DownloadHandle {
    type Output = DownloadResult;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = &mut *self;
        if this.resolved {
            return Poll::Ready(Err(DownloadError::Cancelled));
        }
        let result = match Pin::new(&mut this.rx).poll(cx) {
            Poll::Pending => return Poll::Pending,
            Poll::Ready(Ok(result)) => result,
            // The sender went away without an outcome
            Poll::Ready(Err(_)) => Err(DownloadError::Shutdown),
        };
        this.resolved = true;
        Poll::Ready(result)
    }
}

impl Drop for DownloadHandle {
    fn drop(&mut self) {
        if self.resolved {
            return;
        }
        // An outcome already delivered but never polled leaves nothing to cancel
        if !matches!(self.rx.try_recv(), Err(TryRecvError::Empty)) {
            return;
        }
        if let Some(inner) = self.downloader.upgrade() {
            inner.cancel(&self.receipt);
        }
    }
}

struct Waiter {
    receipt_id: Uuid,
    tx: oneshot::Sender<DownloadResult>,
}

enum Phase {
    Queued,
    Active(CancellationToken),
    /// The transport produced an outcome that is being delivered
    Completing,
}

struct InFlightDownload {
    /// Distinguishes this download from later ones under the same key
    generation: u64,
    request: ImageRequest,
    waiters: Vec<Waiter>,
    progress: Arc<watch::Sender<DownloadProgress>>,
    phase: Phase,
}

/// Everything needed to launch the transport operation of an admitted download
struct StartJob {
    key: String,
    generation: u64,
    request: ImageRequest,
    token: CancellationToken,
    progress: ProgressReporter,
}

impl StartJob {
    /// Mark `download` active and describe how to run it
    fn activate(key: &str, download: &mut InFlightDownload) -> Self {
        let token = CancellationToken::new();
        download.phase = Phase::Active(token.clone());
        Self {
            key: key.to_owned(),
            generation: download.generation,
            request: download.request.clone(),
            token,
            progress: ProgressReporter::new(Arc::clone(&download.progress)),
        }
    }
}

struct ShutdownGuard {
    inner: Arc<Inner>,
    key: String,
    generation: u64,
    armed: bool,
}

impl Drop for ShutdownGuard {
    fn drop(&mut self) {
        if self.armed {
            warn!(key = %self.key, "Download task dropped before completing");
            self.inner
                .finish(&self.key, self.generation, Err(DownloadError::Shutdown));
        }
    }
}

struct DownloaderState {
    downloads: HashMap<String, InFlightDownload>,
    /// Keys of queued downloads, next to be admitted at the front
    queue: VecDeque<String>,
    active: usize,
    max_active: usize,
    prioritization: DownloadPrioritization,
    next_generation: u64,
}

impl DownloaderState {
    /// Attach a waiter to the download for `key`, creating the download if needed.
    /// Returns a job when a new download was admitted right away.
    fn attach(
        &mut self,
        key: &str,
        request: ImageRequest,
        waiter: Waiter,
    ) -> (watch::Receiver<DownloadProgress>, u64, Option<StartJob>) {
        if let Some(download) = self.downloads.get_mut(key) {
            download.waiters.push(waiter);
            debug!(key = %key, waiters = download.waiters.len(), "Attached to in-flight download");
            return (download.progress.subscribe(), download.generation, None);
        }

        self.next_generation += 1;
        let generation = self.next_generation;
        let (progress_tx, progress_rx) = watch::channel(DownloadProgress::default());
        let mut download = InFlightDownload {
            generation,
            request,
            waiters: vec![waiter],
            progress: Arc::new(progress_tx),
            phase: Phase::Queued,
        };

        let job = if self.active < self.max_active {
            self.active += 1;
            Some(StartJob::activate(key, &mut download))
        } else {
            match self.prioritization {
                DownloadPrioritization::Fifo => self.queue.push_back(key.to_owned()),
                DownloadPrioritization::Lifo => self.queue.push_front(key.to_owned()),
            }
            debug!(
                key = %key,
                queued = self.queue.len(),
                active = self.active,
                "Download queued"
            );
            None
        };

        self.downloads.insert(key.to_owned(), download);
        (progress_rx, generation, job)
    }

    /// Admit queued downloads while slots are free
    fn promote(&mut self) -> Vec<StartJob> {
        let mut jobs = Vec::new();
        while self.active < self.max_active {
            let Some(key) = self.queue.pop_front() else {
                break;
            };
            let Some(download) = self.downloads.get_mut(&key) else {
                continue;
            };
            jobs.push(StartJob::activate(&key, download));
            self.active += 1;
            debug!(key = %key, active = self.active, "Promoted queued download");
        }
        jobs
    }

    fn is_current(&self, key: &str, generation: u64) -> bool {
        self.downloads
            .get(key)
            .is_some_and(|download| download.generation == generation)
    }
}

struct Inner {
    image_cache: Option<Arc<dyn ImageRequestCache>>,
    transport: Arc<dyn Transport>,
    decoder: Arc<dyn ImageDecoder>,
    runtime: Handle,
    state: Mutex<DownloaderState>,
}

impl std::fmt::Debug for Inner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("ImageDownloader")
            .field("cached", &self.image_cache.is_some())
            .field("active", &state.active)
            .field("queued", &state.queue.len())
            .field("max_active", &state.max_active)
            .field("prioritization", &state.prioritization)
            .finish()
    }
}

impl Inner {
    fn start(self: &Arc<Self>, job: StartJob) {
        debug!(key = %job.key, generation = job.generation, "Starting image download");

        let StartJob {
            key,
            generation,
            request,
            token,
            progress,
        } = job;
        // Resolves the waiters if the task is dropped without running to
        // completion, e.g. when the runtime has shut down
        let mut guard = ShutdownGuard {
            inner: Arc::clone(self),
            key,
            generation,
            armed: true,
        };

        let inner = Arc::clone(self);

        self.runtime.spawn(async move {
            let outcome = tokio::select! {
                biased;

                _ = token.cancelled() => {
                    debug!(key = %guard.key, "Image download aborted");
                    guard.armed = false;
                    return;
                }
                outcome = inner.transport.fetch(&request, &progress) => outcome,
            };

            guard.armed = false;
            inner.complete(&guard.key, guard.generation, outcome);
        });
    }

    /// Decode the transport outcome of a download and deliver it
    fn complete(
        self: &Arc<Self>,
        key: &str,
        generation: u64,
        outcome: Result<TransportResponse, TransportError>,
    ) {
        let result = match outcome {
            Ok(response) => {
                let info = Arc::new(response.info);
                self.decoder
                    .decode(&info, response.body)
                    .map(|image| Downloaded {
                        image,
                        response: info,
                    })
                    .map_err(DownloadError::from)
            }
            Err(e) => Err(DownloadError::from(e)),
        };
        self.finish(key, generation, result);
    }

    /// Deliver the terminal result of a download to all of its waiters
    fn finish(self: &Arc<Self>, key: &str, generation: u64, result: DownloadResult) {
        // From here on cancellation only detaches waiters, so nothing can abort
        // the download between populating the cache and removing the record
        {
            let mut state = self.state.lock();
            let Some(download) = state
                .downloads
                .get_mut(key)
                .filter(|d| d.generation == generation)
            else {
                debug!(key = %key, "Discarding outcome of a cancelled download");
                return;
            };
            download.phase = Phase::Completing;
        }

        // Populate the cache while the record still exists, so a request
        // arriving in between finds one or the other
        if let (Ok(downloaded), Some(cache)) = (&result, &self.image_cache) {
            cache.add(key, downloaded.image.clone());
        }

        let (waiters, jobs) = {
            let mut state = self.state.lock();
            if !state.is_current(key, generation) {
                return;
            }
            let Some(download) = state.downloads.remove(key) else {
                return;
            };
            state.active = state.active.saturating_sub(1);
            (download.waiters, state.promote())
        };

        match &result {
            Ok(downloaded) => debug!(
                key = %key,
                waiters = waiters.len(),
                size = downloaded.image.byte_size(),
                "Image download finished"
            ),
            Err(e) => warn!(key = %key, waiters = waiters.len(), error = %e, "Image download failed"),
        }

        for waiter in waiters {
            let _ = waiter.tx.send(result.clone());
        }
        for job in jobs {
            self.start(job);
        }
    }

    fn cancel(self: &Arc<Self>, receipt: &Receipt) -> CancelOutcome {
        let (outcome, waiter, jobs) = {
            let mut guard = self.state.lock();
            let state = &mut *guard;

            let Some(download) = state
                .downloads
                .get_mut(&receipt.key)
                .filter(|d| d.generation == receipt.generation)
            else {
                debug!(key = %receipt.key, receipt_id = %receipt.receipt_id, "Cancel for unknown download ignored");
                return CancelOutcome::NotFound;
            };
            let Some(position) = download
                .waiters
                .iter()
                .position(|w| w.receipt_id == receipt.receipt_id)
            else {
                debug!(key = %receipt.key, receipt_id = %receipt.receipt_id, "Cancel for unknown receipt ignored");
                return CancelOutcome::NotFound;
            };

            let waiter = download.waiters.remove(position);
            if !download.waiters.is_empty() || matches!(download.phase, Phase::Completing) {
                debug!(
                    key = %receipt.key,
                    remaining = download.waiters.len(),
                    "Waiter detached from download"
                );
                (CancelOutcome::Detached, waiter, Vec::new())
            } else {
                match state.downloads.remove(&receipt.key).map(|d| d.phase) {
                    Some(Phase::Active(token)) => {
                        token.cancel();
                        state.active = state.active.saturating_sub(1);
                        debug!(key = %receipt.key, "Last waiter left, aborting download");
                        (CancelOutcome::Aborted, waiter, state.promote())
                    }
                    _ => {
                        state.queue.retain(|k| k != &receipt.key);
                        debug!(key = %receipt.key, "Last waiter left, dropping queued download");
                        (CancelOutcome::Dequeued, waiter, Vec::new())
                    }
                }
            }
        };

        let _ = waiter.tx.send(Err(DownloadError::Cancelled));
        for job in jobs {
            self.start(job);
        }
        outcome
    }
}

/// Downloads images with request coalescing, bounded concurrency and a memory cache
#[derive(Debug, Clone)]
pub struct ImageDownloader {
    inner: Arc<Inner>,
}

impl ImageDownloader {
    pub fn builder() -> ImageDownloaderBuilder {
        ImageDownloaderBuilder::new()
    }

    /// Create a downloader with the given configuration and transport
    pub fn new(
        config: DownloaderConfig,
        transport: Arc<dyn Transport>,
    ) -> Result<Self, ConfigError> {
        ImageDownloaderBuilder::new()
            .with_config(config)
            .with_transport(transport)
            .build()
    }

    /// Create a downloader with the default configuration: four concurrent
    /// downloads, FIFO admission and a 100MB memory cache
    pub fn with_defaults(transport: Arc<dyn Transport>) -> Result<Self, ConfigError> {
        Self::new(DownloaderConfig::default(), transport)
    }

    pub(crate) fn from_parts(
        config: &DownloaderConfig,
        image_cache: Option<Arc<dyn ImageRequestCache>>,
        transport: Arc<dyn Transport>,
        decoder: Arc<dyn ImageDecoder>,
        runtime: Handle,
    ) -> Self {
        info!(
            max_active_downloads = config.max_active_downloads,
            prioritization = %config.prioritization,
            cached = image_cache.is_some(),
            "Image downloader created"
        );

        Self {
            inner: Arc::new(Inner {
                image_cache,
                transport,
                decoder,
                runtime,
                state: Mutex::new(DownloaderState {
                    downloads: HashMap::new(),
                    queue: VecDeque::new(),
                    active: 0,
                    max_active: config.max_active_downloads,
                    prioritization: config.prioritization,
                    next_generation: 0,
                }),
            }),
        }
    }

    /// Request an image, with a freshly generated receipt id
    pub fn request_download(&self, request: ImageRequest, identifier: Option<&str>) -> Fetch {
        self.request_download_with_receipt_id(request, identifier, Uuid::new_v4())
    }

    /// Request an image using a caller chosen receipt id.
    ///
    /// The id must not be in use by another waiter of the same download.
    pub fn request_download_with_receipt_id(
        &self,
        request: ImageRequest,
        identifier: Option<&str>,
        receipt_id: Uuid,
    ) -> Fetch {
        let key = cache_key(&request, identifier);

        if request.cache_policy() == CachePolicy::UseCache {
            if let Some(image) = self.inner.image_cache.as_ref().and_then(|c| c.lookup(&key)) {
                trace!(key = %key, "Serving image from memory cache");
                return Fetch::Cached(image);
            }
        }

        let (tx, rx) = oneshot::channel();
        let waiter = Waiter { receipt_id, tx };
        let (progress, generation, job) = self.inner.state.lock().attach(&key, request, waiter);

        if let Some(job) = job {
            self.inner.start(job);
        }

        Fetch::Pending(DownloadHandle {
            receipt: Receipt {
                key,
                receipt_id,
                generation,
            },
            rx,
            progress,
            downloader: Arc::downgrade(&self.inner),
            resolved: false,
        })
    }

    /// Detach the waiter identified by `receipt` from its download
    pub fn cancel(&self, receipt: &Receipt) -> CancelOutcome {
        self.inner.cancel(receipt)
    }

    /// Change the concurrency ceiling. Raising it admits queued downloads right
    /// away; lowering it lets running downloads finish.
    pub fn set_max_active_downloads(&self, max_active: usize) -> Result<(), ConfigError> {
        if max_active == 0 {
            return Err(ConfigError::ZeroActiveDownloads);
        }
        let jobs = {
            let mut state = self.inner.state.lock();
            state.max_active = max_active;
            state.promote()
        };
        for job in jobs {
            self.inner.start(job);
        }
        Ok(())
    }

    /// Change where newly queued downloads are inserted. Already queued ones keep their order.
    pub fn set_prioritization(&self, prioritization: DownloadPrioritization) {
        self.inner.state.lock().prioritization = prioritization;
    }

    pub fn max_active_downloads(&self) -> usize {
        self.inner.state.lock().max_active
    }

    pub fn prioritization(&self) -> DownloadPrioritization {
        self.inner.state.lock().prioritization
    }

    /// Number of downloads whose transport operation is running
    pub fn active_downloads(&self) -> usize {
        self.inner.state.lock().active
    }

    /// Number of downloads waiting for a free slot
    pub fn queued_downloads(&self) -> usize {
        self.inner.state.lock().queue.len()
    }

    pub fn image_cache(&self) -> Option<&Arc<dyn ImageRequestCache>> {
        self.inner.image_cache.as_ref()
    }
}
