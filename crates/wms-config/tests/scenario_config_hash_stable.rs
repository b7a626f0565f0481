use wms_config::load_layered_yaml_from_strings;

const BASE_YAML: &str = r#"
claims:
  stale_after_secs: 900
  reaper_interval_secs: 60
allocation:
  split_mode: per_line
  alternate_bins: true
database:
  url_env: "WMS_DATABASE_URL"
"#;

const BASE_YAML_REORDERED: &str = r#"
database:
  url_env: "WMS_DATABASE_URL"
allocation:
  alternate_bins: true
  split_mode: per_line
claims:
  reaper_interval_secs: 60
  stale_after_secs: 900
"#;

const OVERLAY_YAML: &str = r#"
claims:
  stale_after_secs: 300
"#;

#[test]
fn same_input_produces_identical_hash() {
    let a = load_layered_yaml_from_strings(&[BASE_YAML]).unwrap();
    let b = load_layered_yaml_from_strings(&[BASE_YAML]).unwrap();
    assert_eq!(a.config_hash, b.config_hash);
    assert_eq!(a.canonical_json, b.canonical_json);
    assert_eq!(a.config_hash.len(), 64);
}

#[test]
fn reordered_keys_produce_same_hash() {
    let a = load_layered_yaml_from_strings(&[BASE_YAML]).unwrap();
    let b = load_layered_yaml_from_strings(&[BASE_YAML_REORDERED]).unwrap();
    assert_eq!(
        a.config_hash, b.config_hash,
        "key order in the source must not change the hash"
    );
}

#[test]
fn overlay_changes_value_and_hash_but_keeps_siblings() {
    let base = load_layered_yaml_from_strings(&[BASE_YAML]).unwrap();
    let merged = load_layered_yaml_from_strings(&[BASE_YAML, OVERLAY_YAML]).unwrap();

    assert_ne!(base.config_hash, merged.config_hash);
    assert_eq!(
        merged
            .config_json
            .pointer("/claims/stale_after_secs")
            .and_then(|v| v.as_i64()),
        Some(300)
    );
    assert_eq!(
        merged
            .config_json
            .pointer("/claims/reaper_interval_secs")
            .and_then(|v| v.as_i64()),
        Some(60),
        "deep merge must keep keys the overlay does not mention"
    );
}
