//! Command handler modules for wms-cli.
//!
//! Shared utilities used by multiple command paths live here.
//! Command-specific logic lives in the submodules.

pub mod config;
pub mod inventory;
pub mod reaper;

use anyhow::Result;
use wms_config::LoadedConfig;

// ---------------------------------------------------------------------------
// Shared helpers
// ---------------------------------------------------------------------------

/// Layered config from explicit paths; defaults when none are given.
pub fn load_config(paths: &[String]) -> Result<LoadedConfig> {
    if paths.is_empty() {
        return LoadedConfig::empty();
    }
    let path_refs: Vec<&str> = paths.iter().map(|s| s.as_str()).collect();
    wms_config::load_layered_yaml(&path_refs)
}

/// Print unused config keys to stderr, capped at 50 lines.
pub fn print_unused_keys(unused: &[String]) {
    eprintln!("WARN: CONFIG_UNUSED_KEYS unused_leaf_keys={}", unused.len());
    for p in unused.iter().take(50) {
        eprintln!("  unused={}", p);
    }
    let extra = unused.len().saturating_sub(50);
    if extra > 0 {
        eprintln!("  ... and {} more", extra);
    }
}
