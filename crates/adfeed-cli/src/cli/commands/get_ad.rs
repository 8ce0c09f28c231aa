//! `adfeed get-ad` – request ads and print them.

use adfeed_core::ClientConfig;
use anyhow::Result;
use std::path::Path;

use super::{build_client, load_request, print_json};

pub async fn run_get_ad(cfg: ClientConfig, request_path: &Path) -> Result<()> {
    let request = load_request(request_path)?;
    let client = build_client(cfg);
    let result = client.get_ad(&request).await;
    client.close().await;
    let ads = result?;
    if ads.is_empty() {
        eprintln!("No ads returned.");
    }
    print_json(&ads)
}
