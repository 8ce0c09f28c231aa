//! Per-endpoint bandwidth accounting.
//!
//! Every HTTP exchange the client makes (decision, asset endpoint,
//! proof-of-play, expiration) records the bytes it sent and received here.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};

/// Traffic totals for one endpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BandwidthSample {
    pub count: u64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
    #[serde(rename = "total_bytes")]
    pub total: u64,
    #[serde(rename = "average_per_request")]
    pub average: f64,
}

impl BandwidthSample {
    fn record(&mut self, bytes_sent: u64, bytes_received: u64) {
        self.bytes_sent += bytes_sent;
        self.bytes_received += bytes_received;
        self.count += 1;
        self.total = self.bytes_sent + self.bytes_received;
        self.average = self.total as f64 / self.count as f64;
    }
}

#[derive(Debug, Default)]
pub struct BandwidthStats {
    samples: Mutex<HashMap<String, BandwidthSample>>,
}

impl BandwidthStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, endpoint: &str, bytes_sent: u64, bytes_received: u64) {
        self.lock()
            .entry(endpoint.to_string())
            .or_default()
            .record(bytes_sent, bytes_received);
    }

    pub fn get(&self, endpoint: &str) -> Option<BandwidthSample> {
        self.lock().get(endpoint).copied()
    }

    pub fn snapshot(&self) -> HashMap<String, BandwidthSample> {
        self.lock().clone()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, BandwidthSample>> {
        self.samples.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Stats key for a fixed endpoint URL: scheme, host, port and path, without
/// query or fragment. Unparseable input is used verbatim.
pub fn endpoint_key(url: &str) -> String {
    match url::Url::parse(url) {
        Ok(parsed) => {
            let mut key = format!("{}://{}", parsed.scheme(), parsed.host_str().unwrap_or(""));
            if let Some(port) = parsed.port() {
                key.push_str(&format!(":{}", port));
            }
            key.push_str(parsed.path());
            key
        }
        Err(_) => url.to_string(),
    }
}
