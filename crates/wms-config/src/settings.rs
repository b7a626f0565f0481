use std::collections::BTreeMap;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use wms_fulfillment::{AllocationPolicy, ShortPickTolerance, SplitMode};
use wms_presence::PresencePolicy;
use wms_schemas::UserRole;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimSettings {
    /// PICKING orders idle longer than this are unclaimed by the reaper.
    pub stale_after_secs: i64,
    pub reaper_interval_secs: u64,
}

impl Default for ClaimSettings {
    fn default() -> Self {
        Self {
            stale_after_secs: 900,
            reaper_interval_secs: 60,
        }
    }
}

/// Typed view of the settings the fulfillment services read.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FulfillmentConfig {
    pub presence: PresencePolicy,
    pub claims: ClaimSettings,
    pub short_pick_tolerance: ShortPickTolerance,
    pub allocation: AllocationPolicy,
    pub max_connections: u32,
}

impl Default for FulfillmentConfig {
    fn default() -> Self {
        Self {
            presence: PresencePolicy::default(),
            claims: ClaimSettings::default(),
            short_pick_tolerance: ShortPickTolerance::never(),
            allocation: AllocationPolicy::default(),
            max_connections: 10,
        }
    }
}

impl FulfillmentConfig {
    /// Absent keys take their defaults; present keys of the wrong type or out
    /// of range are errors.
    pub fn from_config_json(v: &Value) -> Result<Self> {
        let mut cfg = Self::default();

        if let Some(secs) = read_i64(v, "/presence/activity_window_secs")? {
            if secs <= 0 {
                bail!("CONFIG_INVALID /presence/activity_window_secs must be > 0, got {secs}");
            }
            cfg.presence.activity_window_secs = secs;
        }
        if let Some(views) = v.pointer("/presence/working_views") {
            cfg.presence.working_views = parse_working_views(views)?;
        }

        if let Some(secs) = read_i64(v, "/claims/stale_after_secs")? {
            if secs <= 0 {
                bail!("CONFIG_INVALID /claims/stale_after_secs must be > 0, got {secs}");
            }
            cfg.claims.stale_after_secs = secs;
        }
        if let Some(secs) = read_i64(v, "/claims/reaper_interval_secs")? {
            if secs <= 0 {
                bail!("CONFIG_INVALID /claims/reaper_interval_secs must be > 0, got {secs}");
            }
            cfg.claims.reaper_interval_secs = secs as u64;
        }

        if let Some(units) = read_i64(v, "/exceptions/short_pick_tolerance/max_short_units")? {
            if units < 0 {
                bail!("CONFIG_INVALID max_short_units must be >= 0, got {units}");
            }
            cfg.short_pick_tolerance.max_short_units = Some(units);
        }
        if let Some(pct) = read_i64(v, "/exceptions/short_pick_tolerance/max_short_percent")? {
            let pct = u8::try_from(pct)
                .ok()
                .filter(|p| *p <= 100)
                .with_context(|| format!("CONFIG_INVALID max_short_percent must be 0..=100, got {pct}"))?;
            cfg.short_pick_tolerance.max_short_percent = Some(pct);
        }

        if let Some(mode) = v.pointer("/allocation/split_mode") {
            cfg.allocation.split_mode = serde_json::from_value::<SplitMode>(mode.clone())
                .with_context(|| {
                    format!("CONFIG_INVALID /allocation/split_mode: {mode} (expected per_line | per_unit)")
                })?;
        }
        if let Some(flag) = v.pointer("/allocation/alternate_bins") {
            cfg.allocation.alternate_bins = flag
                .as_bool()
                .with_context(|| format!("CONFIG_INVALID /allocation/alternate_bins: {flag}"))?;
        }

        if let Some(n) = read_i64(v, "/database/max_connections")? {
            cfg.max_connections = u32::try_from(n)
                .ok()
                .filter(|n| *n > 0)
                .with_context(|| format!("CONFIG_INVALID /database/max_connections: {n}"))?;
        }

        Ok(cfg)
    }
}

fn read_i64(v: &Value, pointer: &str) -> Result<Option<i64>> {
    match v.pointer(pointer) {
        None | Some(Value::Null) => Ok(None),
        Some(x) => x
            .as_i64()
            .map(Some)
            .with_context(|| format!("CONFIG_INVALID {pointer} must be an integer, got {x}")),
    }
}

fn parse_working_views(v: &Value) -> Result<BTreeMap<UserRole, Vec<String>>> {
    let map = v
        .as_object()
        .context("CONFIG_INVALID /presence/working_views must be a map of role -> [view]")?;
    let mut out = BTreeMap::new();
    for (role, views) in map {
        let role = UserRole::parse(&role.to_ascii_uppercase())
            .with_context(|| format!("CONFIG_INVALID /presence/working_views/{role}"))?;
        let list = views
            .as_array()
            .with_context(|| format!("CONFIG_INVALID /presence/working_views/{role} must be a list"))?;
        let mut prefixes = Vec::with_capacity(list.len());
        for item in list {
            let s = item
                .as_str()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .with_context(|| {
                    format!("CONFIG_INVALID /presence/working_views/{role} entries must be non-empty strings")
                })?;
            prefixes.push(s.to_string());
        }
        out.insert(role, prefixes);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::load_layered_yaml_from_strings;

    #[test]
    fn empty_config_is_all_defaults() {
        let cfg = FulfillmentConfig::from_config_json(&serde_json::json!({})).unwrap();
        assert_eq!(cfg, FulfillmentConfig::default());
        assert_eq!(cfg.presence.activity_window_secs, 300);
        assert_eq!(cfg.claims.stale_after_secs, 900);
        assert_eq!(cfg.short_pick_tolerance, ShortPickTolerance::never());
    }

    #[test]
    fn yaml_overrides_are_typed() {
        let loaded = load_layered_yaml_from_strings(&[r#"
presence:
  activity_window_secs: 120
  working_views:
    picker: ["scan", "picking"]
claims:
  stale_after_secs: 600
exceptions:
  short_pick_tolerance:
    max_short_units: 2
    max_short_percent: 25
allocation:
  split_mode: per_unit
  alternate_bins: false
database:
  max_connections: 4
"#])
        .unwrap();
        let cfg = FulfillmentConfig::from_config_json(&loaded.config_json).unwrap();

        assert_eq!(cfg.presence.activity_window_secs, 120);
        assert_eq!(
            cfg.presence.working_views.get(&UserRole::Picker).unwrap(),
            &vec!["scan".to_string(), "picking".to_string()]
        );
        // replacing the map drops the default entries for other roles
        assert!(cfg.presence.working_views.get(&UserRole::Packer).is_none());
        assert_eq!(cfg.claims.stale_after_secs, 600);
        assert_eq!(cfg.claims.reaper_interval_secs, 60);
        assert_eq!(cfg.short_pick_tolerance.max_short_units, Some(2));
        assert_eq!(cfg.short_pick_tolerance.max_short_percent, Some(25));
        assert_eq!(cfg.allocation.split_mode, SplitMode::PerUnit);
        assert!(!cfg.allocation.alternate_bins);
        assert_eq!(cfg.max_connections, 4);
    }

    #[test]
    fn bad_values_are_rejected() {
        for bad in [
            serde_json::json!({ "claims": { "stale_after_secs": 0 } }),
            serde_json::json!({ "claims": { "stale_after_secs": "soon" } }),
            serde_json::json!({ "allocation": { "split_mode": "per_pallet" } }),
            serde_json::json!({ "exceptions": { "short_pick_tolerance": { "max_short_percent": 150 } } }),
            serde_json::json!({ "presence": { "working_views": { "forklift": ["yard"] } } }),
            serde_json::json!({ "database": { "max_connections": -1 } }),
        ] {
            assert!(
                FulfillmentConfig::from_config_json(&bad).is_err(),
                "accepted {bad}"
            );
        }
    }
}
