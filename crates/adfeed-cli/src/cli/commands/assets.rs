//! `adfeed assets` – print the asset list for a request.

use adfeed_core::ClientConfig;
use anyhow::Result;
use std::path::Path;

use super::{build_client, load_request, print_json};

pub async fn run_assets(cfg: ClientConfig, request_path: &Path) -> Result<()> {
    let request = load_request(request_path)?;
    let client = build_client(cfg);
    let result = client.get_assets(&request).await;
    client.close().await;
    print_json(&result?)
}
