//! CLI command handlers, one file per command, plus the client wiring they share.

mod assets;
mod config;
mod get_ad;
mod play;

use adfeed_core::{AdDeliveryClient, AdRequest, ClientConfig, ClientHooks, EventFn, EventLevel};
use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;

pub use assets::run_assets;
pub use config::run_config;
pub use get_ad::run_get_ad;
pub use play::run_play;

fn load_request(path: &Path) -> Result<AdRequest> {
    let data = std::fs::read_to_string(path)
        .with_context(|| format!("reading request {}", path.display()))?;
    serde_json::from_str(&data).with_context(|| format!("parsing request {}", path.display()))
}

/// Client with events echoed to stderr. Ads are tracked uncached.
fn build_client(cfg: ClientConfig) -> AdDeliveryClient {
    let events: EventFn = Arc::new(|name: &str, message: &str, source: &str, level: EventLevel| {
        if message.is_empty() {
            eprintln!("[{}] {}: {}", level, source, name);
        } else {
            eprintln!("[{}] {}: {} ({})", level, source, name, message);
        }
    });
    AdDeliveryClient::new(
        cfg,
        ClientHooks {
            events: Some(events),
            ..ClientHooks::default()
        },
    )
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
