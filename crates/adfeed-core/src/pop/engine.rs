//! Delivery engine: first attempt inline, retries on two background workers.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use super::classify::{classify_status, Disposition};
use super::request::{DeliveryRequest, Outcome};
use crate::ad::{now_epoch_secs, Advertisement};
use crate::error::DeliveryError;
use crate::events::{EventLevel, EventSink};
use crate::http::{self, HttpRequest, Transport};
use crate::stats::BandwidthStats;

#[derive(Debug, Clone, Copy)]
pub struct EngineSettings {
    /// Timeout for a single proof-of-play or expiration call.
    pub request_timeout: Duration,
    /// Minimum spacing between a failed attempt and its retry.
    pub retry_interval: Duration,
    /// Capacity of the retry and submission queues.
    pub queue_capacity: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            retry_interval: Duration::from_secs(60),
            queue_capacity: 100,
        }
    }
}

/// Delivers confirmations and expirations to the ad service.
///
/// Must be created inside a Tokio runtime; the workers are spawned in `new`.
pub struct ProofOfPlayEngine {
    shared: Arc<Shared>,
    shutdown: watch::Sender<bool>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    stopped: AtomicBool,
}

impl ProofOfPlayEngine {
    pub fn new(
        transport: Arc<dyn Transport>,
        events: EventSink,
        stats: Arc<BandwidthStats>,
        settings: EngineSettings,
    ) -> Self {
        let capacity = settings.queue_capacity.max(1);
        let (retry_tx, retry_rx) = mpsc::channel(capacity);
        let (submit_tx, submit_rx) = mpsc::channel(capacity);
        let (shutdown, shutdown_rx) = watch::channel(false);

        let shared = Arc::new(Shared {
            transport,
            events,
            stats,
            settings,
            retry_tx,
        });
        let workers = vec![
            tokio::spawn(run_submission_loop(
                Arc::clone(&shared),
                submit_rx,
                shutdown_rx.clone(),
            )),
            tokio::spawn(run_retry_loop(
                Arc::clone(&shared),
                retry_rx,
                submit_tx,
                shutdown_rx,
            )),
        ];

        Self {
            shared,
            shutdown,
            workers: Mutex::new(workers),
            stopped: AtomicBool::new(false),
        }
    }

    /// Report that `ad` was displayed for `display_time` seconds.
    ///
    /// Returns the ad's original (remote) asset URL when the first attempt
    /// succeeds. A retriable failure is returned as-is and retried in the
    /// background.
    pub async fn confirm(
        &self,
        ad: Advertisement,
        display_time: i64,
    ) -> Result<Option<String>, DeliveryError> {
        self.deliver(DeliveryRequest::confirmed(ad, display_time))
            .await
    }

    /// Report that `ad` will not be displayed.
    pub async fn expire(&self, ad: Advertisement) -> Result<(), DeliveryError> {
        self.deliver(DeliveryRequest::expired(ad)).await.map(|_| ())
    }

    async fn deliver(&self, request: DeliveryRequest) -> Result<Option<String>, DeliveryError> {
        if self.is_stopped() {
            return Err(DeliveryError::Stopped);
        }
        match self.shared.attempt(&request).await {
            Ok(()) => Ok(request.ad.original_asset_url),
            Err(e) => {
                if e.is_retriable() {
                    self.shared.schedule_retry(request, &e);
                }
                Err(e)
            }
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    /// Stop both workers and drop whatever is still queued. An attempt already
    /// in flight runs to completion first. Safe to call more than once.
    pub async fn stop(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        self.shutdown.send_replace(true);
        let workers = std::mem::take(
            &mut *self
                .workers
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        );
        for worker in workers {
            if let Err(e) = worker.await {
                tracing::warn!("delivery worker ended abnormally: {}", e);
            }
        }
        tracing::info!("proof-of-play engine stopped");
    }
}

impl Drop for ProofOfPlayEngine {
    fn drop(&mut self) {
        self.shutdown.send_replace(true);
    }
}

struct Shared {
    transport: Arc<dyn Transport>,
    events: EventSink,
    stats: Arc<BandwidthStats>,
    settings: EngineSettings,
    retry_tx: mpsc::Sender<DeliveryRequest>,
}

impl Shared {
    fn build_request(&self, request: &DeliveryRequest) -> Result<HttpRequest, DeliveryError> {
        let ad = &request.ad;
        let missing = || DeliveryError::MissingUrl {
            ad_id: ad.id.clone(),
            kind: request.kind(),
        };
        let timeout = self.settings.request_timeout;
        match request.outcome {
            Outcome::Confirmed { display_time } => {
                let url = non_empty(ad.proof_of_play_url.as_deref()).ok_or_else(missing)?;
                let body = serde_json::json!({ "display_time": display_time }).to_string();
                Ok(HttpRequest::post_json(url, body.into_bytes(), timeout))
            }
            Outcome::Expired => {
                let url = non_empty(ad.expiration_url.as_deref()).ok_or_else(missing)?;
                Ok(HttpRequest::get(url, timeout))
            }
        }
    }

    /// One delivery attempt, classified.
    async fn attempt(&self, request: &DeliveryRequest) -> Result<(), DeliveryError> {
        let kind = request.kind();
        let ad_id = request.ad_id().to_string();
        let http_request = self.build_request(request)?;
        let bytes_sent = http_request.bytes_sent();
        tracing::debug!(%ad_id, %kind, url = %http_request.url, "delivery attempt");

        let response = http::send(Arc::clone(&self.transport), http_request)
            .await
            .map_err(|source| {
                // Retriable failures are reported by `schedule_retry` instead.
                if !source.is_retriable() {
                    self.events.publish(
                        &kind.event_name("failed"),
                        &format!("adId: {}, error: {}", ad_id, source),
                        EventLevel::Warning,
                    );
                }
                DeliveryError::Transport {
                    ad_id: ad_id.clone(),
                    kind,
                    source,
                }
            })?;
        self.stats
            .record(kind.endpoint_key(), bytes_sent, response.bytes_received());

        let status = response.status;
        match classify_status(status) {
            Disposition::Delivered => {
                tracing::debug!(%ad_id, %kind, status, "delivered");
                Ok(())
            }
            Disposition::Rejected => {
                let body = response.body_text();
                self.events.publish(
                    &kind.event_name("failed"),
                    &format!("adId: {}, status: {}, error: {}", ad_id, status, body),
                    EventLevel::Warning,
                );
                Err(DeliveryError::Rejected {
                    ad_id,
                    kind,
                    status,
                    body,
                })
            }
            Disposition::Retry => Err(DeliveryError::ServerError {
                ad_id,
                kind,
                status,
            }),
        }
    }

    /// Queue a retriable failure. Only the first failure of a request is
    /// published; the queue is never waited on.
    fn schedule_retry(&self, mut request: DeliveryRequest, error: &DeliveryError) {
        let kind = request.kind();
        if request.requested_at.is_none() {
            self.events.publish(
                &kind.event_name("failed"),
                &format!("adId: {}, error: {}", request.ad_id(), error),
                EventLevel::Warning,
            );
        }
        request.requested_at = Some(Instant::now());
        match self.retry_tx.try_send(request) {
            Ok(()) => {}
            Err(TrySendError::Full(request)) => self.events.publish(
                &kind.event_name("retry-queue-full"),
                &format!("adId: {}", request.ad_id()),
                EventLevel::Critical,
            ),
            Err(TrySendError::Closed(request)) => {
                tracing::debug!(ad_id = %request.ad_id(), %kind, "engine stopped, retry dropped");
            }
        }
    }

    /// Lease gate applied as a request leaves the retry queue.
    fn lease_allows_retry(&self, request: &DeliveryRequest, now: i64) -> bool {
        if !request.ad.lease_elapsed(now) {
            return true;
        }
        let expiry = request
            .ad
            .lease_expiry
            .map_or_else(|| "none".to_string(), |e| e.to_string());
        self.events.publish(
            &request.kind().event_name("already-expired"),
            &format!("ad: {}, expiry: {}", request.ad_id(), expiry),
            EventLevel::Critical,
        );
        false
    }

    async fn resubmit(&self, request: DeliveryRequest) {
        match self.attempt(&request).await {
            Ok(()) => {
                tracing::info!(
                    ad_id = %request.ad_id(),
                    kind = %request.kind(),
                    "delivered on retry"
                );
            }
            Err(e) if e.is_retriable() => self.schedule_retry(request, &e),
            Err(e) => tracing::warn!("retry not accepted: {}", e),
        }
    }
}

fn non_empty(url: Option<&str>) -> Option<&str> {
    url.filter(|u| !u.trim().is_empty())
}

async fn run_submission_loop(
    shared: Arc<Shared>,
    mut submit_rx: mpsc::Receiver<DeliveryRequest>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        let request = tokio::select! {
            biased;
            _ = shutdown_requested(&mut shutdown) => break,
            next = submit_rx.recv() => match next {
                Some(request) => request,
                None => break,
            },
        };
        shared.resubmit(request).await;
    }
    drain(&mut submit_rx, "submission");
}

async fn run_retry_loop(
    shared: Arc<Shared>,
    mut retry_rx: mpsc::Receiver<DeliveryRequest>,
    submit_tx: mpsc::Sender<DeliveryRequest>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        let request = tokio::select! {
            biased;
            _ = shutdown_requested(&mut shutdown) => break,
            next = retry_rx.recv() => match next {
                Some(request) => request,
                None => break,
            },
        };

        if !shared.lease_allows_retry(&request, now_epoch_secs()) {
            continue;
        }

        let due = request
            .requested_at
            .map_or_else(Instant::now, |at| at + shared.settings.retry_interval);
        tokio::select! {
            biased;
            _ = shutdown_requested(&mut shutdown) => {
                tracing::debug!(ad_id = %request.ad_id(), "shutdown while waiting to retry");
                break;
            }
            _ = tokio::time::sleep_until(due) => {}
        }

        tokio::select! {
            biased;
            _ = shutdown_requested(&mut shutdown) => break,
            sent = submit_tx.send(request) => {
                if sent.is_err() {
                    break;
                }
            }
        }
    }
    drain(&mut retry_rx, "retry");
}

pub(crate) async fn shutdown_requested(shutdown: &mut watch::Receiver<bool>) {
    // Also resolves once the sender is dropped.
    let _ = shutdown.wait_for(|stopped| *stopped).await;
}

fn drain(rx: &mut mpsc::Receiver<DeliveryRequest>, queue: &'static str) {
    rx.close();
    while let Ok(request) = rx.try_recv() {
        tracing::debug!(
            ad_id = %request.ad_id(),
            kind = %request.kind(),
            queue,
            "dropping queued delivery at shutdown"
        );
    }
}
