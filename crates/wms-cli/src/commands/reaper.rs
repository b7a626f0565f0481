//! `wms reaper sweep`

use anyhow::{bail, Result};
use tracing::info;
use wms_config::FulfillmentConfig;

use super::load_config;

pub async fn sweep(stale_after_secs: Option<i64>, config_paths: &[String]) -> Result<()> {
    let loaded = load_config(config_paths)?;
    let config = FulfillmentConfig::from_config_json(&loaded.config_json)?;

    let secs = stale_after_secs.unwrap_or(config.claims.stale_after_secs);
    if secs <= 0 {
        bail!("stale-after-secs must be > 0, got {}", secs);
    }

    let pool = wms_db::connect_from_env().await?;
    let reaped = wms_db::reap_stale_claims(&pool, chrono::Duration::seconds(secs)).await?;
    for r in &reaped {
        println!("{}", serde_json::to_string(r)?);
    }
    info!(reaped = reaped.len(), stale_after_secs = secs, "reaper sweep finished");
    Ok(())
}
