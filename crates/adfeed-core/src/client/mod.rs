//! The ad delivery client: request ads, cache their assets, track them until
//! the player confirms or expires them.
//!
//! Owns the in-progress registry, the lease sweep task, the asset cache
//! fan-out and the proof-of-play engine. Must be created inside a Tokio
//! runtime.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::ad::{now_epoch_secs, AdRequest, Advertisement};
use crate::config::ClientConfig;
use crate::error::{ClientError, DeliveryError};
use crate::events::{EventFn, EventLevel, EventSink};
use crate::fanout::{AssetCacheFanout, CacheFn};
use crate::http::{self, CurlTransport, HttpRequest, HttpResponse, Transport};
use crate::pop::{shutdown_requested, ProofOfPlayEngine};
use crate::registry::InProgressRegistry;
use crate::stats::{endpoint_key, BandwidthSample, BandwidthStats};

/// Collaborators injected into the client. All optional: without a cache
/// function ads are tracked uncached, without an event function events are
/// only logged, and without a transport libcurl is used.
#[derive(Clone, Default)]
pub struct ClientHooks {
    pub cache: Option<CacheFn>,
    pub events: Option<EventFn>,
    pub transport: Option<Arc<dyn Transport>>,
}

#[derive(Debug, Deserialize)]
struct DecisionResponse {
    #[serde(default)]
    advertisement: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct AssetResponse {
    #[serde(default)]
    asset: Vec<Value>,
}

pub struct AdDeliveryClient {
    config: ClientConfig,
    transport: Arc<dyn Transport>,
    events: EventSink,
    registry: Arc<InProgressRegistry>,
    stats: Arc<BandwidthStats>,
    fanout: AssetCacheFanout,
    engine: ProofOfPlayEngine,
    shutdown: watch::Sender<bool>,
    sweeper: Mutex<Option<JoinHandle<()>>>,
    closed: AtomicBool,
}

impl AdDeliveryClient {
    pub fn new(config: ClientConfig, hooks: ClientHooks) -> Self {
        let transport = hooks
            .transport
            .unwrap_or_else(|| Arc::new(CurlTransport::new(config.user_agent.clone())));
        let events = EventSink::new(hooks.events, &config.event_source);
        let registry = Arc::new(InProgressRegistry::new());
        let stats = Arc::new(BandwidthStats::new());

        let fanout = AssetCacheFanout::new(
            hooks.cache,
            config.asset_ttl(),
            Arc::clone(&registry),
            events.clone(),
            config.max_parallel_cache,
        );
        let engine = ProofOfPlayEngine::new(
            Arc::clone(&transport),
            events.clone(),
            Arc::clone(&stats),
            config.engine_settings(),
        );

        let (shutdown, shutdown_rx) = watch::channel(false);
        let sweeper = tokio::spawn(run_lease_sweep(
            Arc::clone(&registry),
            config.lease_sweep_interval(),
            shutdown_rx,
        ));

        tracing::info!(decision_url = %config.decision_url, "ad delivery client started");
        Self {
            config,
            transport,
            events,
            registry,
            stats,
            fanout,
            engine,
            shutdown,
            sweeper: Mutex::new(Some(sweeper)),
            closed: AtomicBool::new(false),
        }
    }

    /// Request ads for `request` from the decision service.
    ///
    /// Returned ads are tracked as in progress, with `asset_url` pointing at
    /// the local cache when a cache function is configured. Ads whose asset
    /// could not be cached are expired with the service and left out.
    pub async fn get_ad(&self, request: &AdRequest) -> Result<Vec<Advertisement>, ClientError> {
        self.ensure_open()?;
        if self.config.decision_url.trim().is_empty() {
            return Err(ClientError::NotConfigured("decision_url"));
        }
        let url = self.config.decision_url.clone();
        let body = serde_json::to_vec(request).map_err(ClientError::Encode)?;
        let response = self.post(&url, body, "ad-server-request-failed").await?;

        let decision: DecisionResponse =
            serde_json::from_slice(&response.body).map_err(|source| ClientError::Decode {
                url: url.clone(),
                source,
            })?;
        if decision.advertisement.is_empty() {
            self.events
                .publish("ad-server-returned-no-ads", "", EventLevel::Warning);
            return Ok(Vec::new());
        }

        let ads = self.ingest(decision.advertisement);
        let ads = self.fanout.run(ads).await;

        let mut kept = Vec::with_capacity(ads.len());
        for ad in ads {
            if !ad.should_expire {
                kept.push(ad);
                continue;
            }
            let ad_id = ad.id.clone();
            if let Err(e) = self.engine.expire(ad).await {
                tracing::warn!(%ad_id, "expiring uncached ad: {}", e);
            }
        }
        tracing::debug!(count = kept.len(), "ads ready");
        Ok(kept)
    }

    fn ingest(&self, entries: Vec<Value>) -> Vec<Advertisement> {
        entries
            .into_iter()
            .filter_map(|entry| match Advertisement::from_value(entry) {
                Ok(ad) => Some(ad),
                Err(e) => {
                    self.events.publish(
                        "ad-server-returned-invalid-ad",
                        &e.to_string(),
                        EventLevel::Warning,
                    );
                    None
                }
            })
            .collect()
    }

    /// Request the asset list for `request`. Nothing is cached or tracked.
    pub async fn get_assets(&self, request: &AdRequest) -> Result<Vec<Value>, ClientError> {
        self.ensure_open()?;
        let url = self
            .config
            .asset_endpoint_url
            .clone()
            .filter(|u| !u.trim().is_empty())
            .ok_or(ClientError::NotConfigured("asset_endpoint_url"))?;
        let body = serde_json::to_vec(request).map_err(ClientError::Encode)?;
        let response = self.post(&url, body, "asset-endpoint-request-failed").await?;

        let assets: AssetResponse =
            serde_json::from_slice(&response.body).map_err(|source| ClientError::Decode {
                url: url.clone(),
                source,
            })?;
        if assets.asset.is_empty() {
            self.events
                .publish("asset-endpoint-returned-no-assets", "", EventLevel::Warning);
        }
        Ok(assets.asset)
    }

    /// Report that the in-progress ad `ad_id` was displayed for
    /// `display_time` seconds. Returns the ad's remote asset URL when the
    /// first delivery attempt succeeds.
    pub async fn confirm(
        &self,
        ad_id: &str,
        display_time: i64,
    ) -> Result<Option<String>, ClientError> {
        self.ensure_open()?;
        let ad = self.take_in_progress(ad_id)?;
        Ok(self.engine.confirm(ad, display_time).await?)
    }

    /// Report that the in-progress ad `ad_id` will not be displayed.
    pub async fn expire(&self, ad_id: &str) -> Result<(), ClientError> {
        self.ensure_open()?;
        let ad = self.take_in_progress(ad_id)?;
        Ok(self.engine.expire(ad).await?)
    }

    fn take_in_progress(&self, ad_id: &str) -> Result<Advertisement, ClientError> {
        self.registry
            .remove(ad_id)
            .ok_or_else(|| ClientError::NotFound {
                ad_id: ad_id.to_string(),
            })
    }

    pub fn in_progress_ads(&self) -> HashMap<String, Advertisement> {
        self.registry.snapshot()
    }

    pub fn stats(&self) -> HashMap<String, BandwidthSample> {
        self.stats.snapshot()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Stop the lease sweep and the delivery workers. Pending retries are
    /// dropped. Safe to call more than once.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.shutdown.send_replace(true);
        let sweeper = self
            .sweeper
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(sweeper) = sweeper {
            if let Err(e) = sweeper.await {
                tracing::warn!("lease sweep ended abnormally: {}", e);
            }
        }
        self.engine.stop().await;
        tracing::info!("ad delivery client closed");
    }

    fn ensure_open(&self) -> Result<(), ClientError> {
        if self.is_closed() {
            return Err(ClientError::Delivery(DeliveryError::Stopped));
        }
        Ok(())
    }

    /// POST a JSON body, account for it, and turn an error status into
    /// [`ClientError::Server`] after publishing `fail_event`.
    async fn post(
        &self,
        url: &str,
        body: Vec<u8>,
        fail_event: &str,
    ) -> Result<HttpResponse, ClientError> {
        let request = HttpRequest::post_json(url, body, self.config.request_timeout());
        let bytes_sent = request.bytes_sent();
        let response = http::send(Arc::clone(&self.transport), request)
            .await
            .map_err(|e| {
                tracing::warn!("{}", e);
                ClientError::Transport(e)
            })?;
        self.stats
            .record(&endpoint_key(url), bytes_sent, response.bytes_received());

        if response.status >= 400 {
            let body = response.body_text();
            self.events.publish(
                fail_event,
                &format!("code: {}, body: {}", response.status, body),
                EventLevel::Warning,
            );
            return Err(ClientError::Server {
                url: url.to_string(),
                status: response.status,
                body,
            });
        }
        Ok(response)
    }
}

impl Drop for AdDeliveryClient {
    fn drop(&mut self) {
        self.shutdown.send_replace(true);
    }
}

/// Drop in-progress ads whose lease has elapsed. The service has already
/// expired them, so nothing is sent.
async fn run_lease_sweep(
    registry: Arc<InProgressRegistry>,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately.
    ticker.tick().await;
    loop {
        tokio::select! {
            biased;
            _ = shutdown_requested(&mut shutdown) => break,
            _ = ticker.tick() => {}
        }
        let removed = registry.sweep(now_epoch_secs());
        if !removed.is_empty() {
            tracing::info!(count = removed.len(), ids = ?removed, "lease sweep removed ads");
        }
    }
    tracing::debug!("lease sweep stopped");
}
