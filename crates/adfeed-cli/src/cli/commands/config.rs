//! `adfeed config` – print the effective configuration as JSON.

use adfeed_core::ClientConfig;
use anyhow::Result;

use super::print_json;

pub fn run_config(cfg: &ClientConfig) -> Result<()> {
    print_json(cfg)
}
