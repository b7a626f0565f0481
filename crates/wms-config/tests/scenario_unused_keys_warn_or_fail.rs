use wms_config::{load_layered_yaml_from_strings, report_unused_keys, UnusedKeyPolicy};

const YAML: &str = r#"
claims:
  stale_after_secs: 900
presence:
  working_views:
    picker: ["picking"]
allocation:
  strategy: "nearest"
legacy:
  ml_scoring: true
"#;

#[test]
fn warn_policy_lists_unread_leaves() {
    let loaded = load_layered_yaml_from_strings(&[YAML]).unwrap();
    let report = report_unused_keys(&loaded.config_json, UnusedKeyPolicy::Warn).unwrap();

    assert!(!report.is_clean());
    assert_eq!(
        report.unused_leaf_pointers,
        vec![
            "/allocation/strategy".to_string(),
            "/legacy/ml_scoring".to_string(),
        ]
    );
}

#[test]
fn fail_policy_errors_with_stable_code() {
    let loaded = load_layered_yaml_from_strings(&[YAML]).unwrap();
    let err = report_unused_keys(&loaded.config_json, UnusedKeyPolicy::Fail)
        .unwrap_err()
        .to_string();
    assert!(err.starts_with("CONFIG_UNUSED_KEYS"), "got: {err}");
    assert!(err.contains("2 unused"));
}

#[test]
fn fully_consumed_config_is_clean() {
    let loaded = load_layered_yaml_from_strings(&["claims:\n  stale_after_secs: 60\n"]).unwrap();
    let report = report_unused_keys(&loaded.config_json, UnusedKeyPolicy::Fail).unwrap();
    assert!(report.is_clean());
}
