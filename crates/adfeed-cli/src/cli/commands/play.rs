//! `adfeed play` – request ads and confirm each one as displayed.

use adfeed_core::ClientConfig;
use anyhow::Result;
use std::path::Path;

use super::{build_client, load_request};

pub async fn run_play(cfg: ClientConfig, request_path: &Path, display_time: i64) -> Result<()> {
    let request = load_request(request_path)?;
    let client = build_client(cfg);
    let ads = match client.get_ad(&request).await {
        Ok(ads) => ads,
        Err(e) => {
            client.close().await;
            return Err(e.into());
        }
    };
    if ads.is_empty() {
        println!("No ads returned.");
    }

    let mut failed = 0usize;
    println!("{:<24} {:<10} {}", "AD", "RESULT", "ASSET");
    for ad in &ads {
        match client.confirm(&ad.id, display_time).await {
            Ok(original) => println!(
                "{:<24} {:<10} {}",
                ad.id,
                "confirmed",
                original.as_deref().or(ad.asset_url.as_deref()).unwrap_or("-")
            ),
            Err(e) => {
                failed += 1;
                println!("{:<24} {:<10} {}", ad.id, "failed", e);
            }
        }
    }
    // Closing drops any retries still pending.
    client.close().await;

    if failed > 0 {
        anyhow::bail!("{} of {} confirmations failed", failed, ads.len());
    }
    Ok(())
}
