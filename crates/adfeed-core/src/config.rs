use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::pop::EngineSettings;

/// Client configuration loaded from `~/.config/adfeed/config.toml`.
///
/// Interval fields are seconds and accept fractions (`0.25` = 250ms).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Ad-decision endpoint; `get_ad` posts the request payload here.
    pub decision_url: String,
    /// Asset endpoint for `get_assets`. Optional.
    pub asset_endpoint_url: Option<String>,
    pub user_agent: String,
    /// Source string passed to the event function with every event.
    pub event_source: String,
    /// Timeout for decision and asset calls.
    pub request_timeout_secs: f64,
    /// Timeout for a single proof-of-play or expiration call.
    pub pop_request_timeout_secs: f64,
    /// Time-to-live handed to the cache function.
    pub asset_ttl_secs: f64,
    pub lease_sweep_interval_secs: f64,
    /// Minimum spacing between a failed delivery and its retry.
    pub retry_interval_secs: f64,
    /// Capacity of each delivery queue.
    pub queue_capacity: usize,
    /// Upper bound on concurrent cache calls per batch (0 = one per ad).
    pub max_parallel_cache: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            decision_url: String::new(),
            asset_endpoint_url: None,
            user_agent: "AdfeedClient".to_string(),
            event_source: "adfeed".to_string(),
            request_timeout_secs: 10.0,
            pop_request_timeout_secs: 30.0,
            asset_ttl_secs: 86_400.0,
            lease_sweep_interval_secs: 60.0,
            retry_interval_secs: 60.0,
            queue_capacity: 100,
            max_parallel_cache: 0,
        }
    }
}

impl ClientConfig {
    pub fn request_timeout(&self) -> Duration {
        secs(self.request_timeout_secs)
    }

    pub fn pop_request_timeout(&self) -> Duration {
        secs(self.pop_request_timeout_secs)
    }

    pub fn asset_ttl(&self) -> Duration {
        secs(self.asset_ttl_secs)
    }

    pub fn lease_sweep_interval(&self) -> Duration {
        secs(self.lease_sweep_interval_secs)
    }

    pub fn retry_interval(&self) -> Duration {
        secs(self.retry_interval_secs)
    }

    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            request_timeout: self.pop_request_timeout(),
            retry_interval: self.retry_interval(),
            queue_capacity: self.queue_capacity.max(1),
        }
    }
}

// Zero, negative and NaN clamp to 1ms (tokio intervals panic on zero); huge
// values clamp to a year so deadline arithmetic cannot overflow.
fn secs(value: f64) -> Duration {
    const MIN: Duration = Duration::from_millis(1);
    const MAX: Duration = Duration::from_secs(365 * 24 * 3600);
    if value.is_nan() || value <= MIN.as_secs_f64() {
        MIN
    } else if value >= MAX.as_secs_f64() {
        MAX
    } else {
        Duration::from_secs_f64(value)
    }
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("adfeed")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// Load configuration from disk, creating a default file if none exists.
pub fn load_or_init() -> Result<ClientConfig> {
    let path = config_path()?;
    if !path.exists() {
        let default_cfg = ClientConfig::default();
        let toml = toml::to_string_pretty(&default_cfg)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, toml)?;
        tracing::info!("created default config at {}", path.display());
        return Ok(default_cfg);
    }
    load_from(&path)
}

/// Load configuration from an explicit file. Missing keys take defaults.
pub fn load_from(path: &Path) -> Result<ClientConfig> {
    let data = fs::read_to_string(path)
        .with_context(|| format!("reading config {}", path.display()))?;
    let cfg: ClientConfig =
        toml::from_str(&data).with_context(|| format!("parsing config {}", path.display()))?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_values() {
        let cfg = ClientConfig::default();
        assert_eq!(cfg.user_agent, "AdfeedClient");
        assert_eq!(cfg.request_timeout(), Duration::from_secs(10));
        assert_eq!(cfg.pop_request_timeout(), Duration::from_secs(30));
        assert_eq!(cfg.asset_ttl(), Duration::from_secs(86_400));
        assert_eq!(cfg.lease_sweep_interval(), Duration::from_secs(60));
        assert_eq!(cfg.retry_interval(), Duration::from_secs(60));
        assert_eq!(cfg.queue_capacity, 100);
        assert!(cfg.asset_endpoint_url.is_none());
    }

    #[test]
    fn config_toml_roundtrip() {
        let cfg = ClientConfig {
            decision_url: "http://ads.test/decision".into(),
            asset_endpoint_url: Some("http://ads.test/assets".into()),
            ..ClientConfig::default()
        };
        let toml = toml::to_string_pretty(&cfg).unwrap();
        let parsed: ClientConfig = toml::from_str(&toml).unwrap();
        assert_eq!(parsed, cfg);
    }

    #[test]
    fn partial_toml_takes_defaults() {
        let toml = r#"
            decision_url = "http://ads.test/decision"
            retry_interval_secs = 0.25
            max_parallel_cache = 4
        "#;
        let cfg: ClientConfig = toml::from_str(toml).unwrap();
        assert_eq!(cfg.decision_url, "http://ads.test/decision");
        assert_eq!(cfg.retry_interval(), Duration::from_millis(250));
        assert_eq!(cfg.max_parallel_cache, 4);
        assert_eq!(cfg.event_source, "adfeed");
        assert_eq!(cfg.queue_capacity, 100);
    }

    #[test]
    fn durations_clamp_nonsense_to_a_millisecond() {
        assert_eq!(secs(0.0), Duration::from_millis(1));
        assert_eq!(secs(-5.0), Duration::from_millis(1));
        assert_eq!(secs(f64::NAN), Duration::from_millis(1));
        assert_eq!(secs(0.0001), Duration::from_millis(1));
        assert_eq!(secs(1.5), Duration::from_millis(1500));
        assert_eq!(secs(f64::INFINITY), Duration::from_secs(365 * 24 * 3600));
    }

    #[test]
    fn engine_settings_never_have_zero_capacity() {
        let cfg = ClientConfig {
            queue_capacity: 0,
            ..ClientConfig::default()
        };
        assert_eq!(cfg.engine_settings().queue_capacity, 1);
    }

    #[test]
    fn load_from_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "decision_url = \"http://x/d\"\nqueue_capacity = 7\n").unwrap();
        let cfg = load_from(&path).unwrap();
        assert_eq!(cfg.decision_url, "http://x/d");
        assert_eq!(cfg.queue_capacity, 7);

        fs::write(&path, "queue_capacity = \"many\"").unwrap();
        let err = load_from(&path).unwrap_err();
        assert!(format!("{:#}", err).contains("parsing config"));
        assert!(load_from(&dir.path().join("missing.toml")).is_err());
    }
}
