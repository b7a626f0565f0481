//! `wms config-hash`

use anyhow::Result;
use tracing::info;
use wms_config::{report_unused_keys, FulfillmentConfig, UnusedKeyPolicy};

use super::{load_config, print_unused_keys};

pub fn config_hash(paths: &[String], strict: bool) -> Result<()> {
    let loaded = load_config(paths)?;

    // Typed parse surfaces invalid values before anything is printed.
    FulfillmentConfig::from_config_json(&loaded.config_json)?;

    let policy = if strict {
        UnusedKeyPolicy::Fail
    } else {
        UnusedKeyPolicy::Warn
    };
    let report = report_unused_keys(&loaded.config_json, policy)?;
    if !report.is_clean() {
        print_unused_keys(&report.unused_leaf_pointers);
    }

    info!(
        layers = paths.len(),
        config_hash = %loaded.config_hash,
        unused_keys = report.unused_leaf_pointers.len(),
        "config hash computed"
    );
    println!("config_hash={}", loaded.config_hash);
    println!("{}", loaded.canonical_json);
    Ok(())
}
