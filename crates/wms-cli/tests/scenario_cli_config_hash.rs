//! `wms config-hash` needs no database.

use predicates::prelude::*;

fn write_layer(name: &str, body: &str) -> std::path::PathBuf {
    let dir = std::env::temp_dir().join(format!("wms-cli-test-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let p = dir.join(name);
    std::fs::write(&p, body).unwrap();
    p
}

#[allow(deprecated)]
#[test]
fn config_hash_is_stable_across_key_order() {
    let a = write_layer("a.yaml", "claims:\n  stale_after_secs: 600\n  reaper_interval_secs: 30\n");
    let b = write_layer("b.yaml", "claims:\n  reaper_interval_secs: 30\n  stale_after_secs: 600\n");

    let out_a = assert_cmd::Command::cargo_bin("wms-cli")
        .unwrap()
        .args(["config-hash", a.to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicate::str::starts_with("config_hash="))
        .get_output()
        .stdout
        .clone();
    let out_b = assert_cmd::Command::cargo_bin("wms-cli")
        .unwrap()
        .args(["config-hash", b.to_str().unwrap()])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    assert_eq!(out_a, out_b);
}

#[allow(deprecated)]
#[test]
fn later_layer_changes_the_hash() {
    let base = write_layer("base.yaml", "claims:\n  stale_after_secs: 600\n");
    let site = write_layer("site.yaml", "claims:\n  stale_after_secs: 120\n");

    let only_base = assert_cmd::Command::cargo_bin("wms-cli")
        .unwrap()
        .args(["config-hash", base.to_str().unwrap()])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let layered = assert_cmd::Command::cargo_bin("wms-cli")
        .unwrap()
        .args(["config-hash", base.to_str().unwrap(), site.to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicate::str::contains("120"))
        .get_output()
        .stdout
        .clone();

    assert_ne!(only_base, layered);
}

#[allow(deprecated)]
#[test]
fn strict_mode_fails_on_unconsumed_keys() {
    let p = write_layer("typo.yaml", "claims:\n  stale_afterr_secs: 600\n");

    assert_cmd::Command::cargo_bin("wms-cli")
        .unwrap()
        .args(["config-hash", "--strict", p.to_str().unwrap()])
        .assert()
        .failure();

    assert_cmd::Command::cargo_bin("wms-cli")
        .unwrap()
        .args(["config-hash", p.to_str().unwrap()])
        .assert()
        .success()
        .stderr(predicate::str::contains("unused=/claims/stale_afterr_secs"));
}

#[allow(deprecated)]
#[test]
fn invalid_typed_value_is_rejected() {
    let p = write_layer("bad.yaml", "allocation:\n  split_mode: sideways\n");

    assert_cmd::Command::cargo_bin("wms-cli")
        .unwrap()
        .args(["config-hash", p.to_str().unwrap()])
        .assert()
        .failure()
        .stderr(predicate::str::contains("CONFIG_INVALID"));
}

#[allow(deprecated)]
#[test]
fn config_hash_requires_a_path() {
    assert_cmd::Command::cargo_bin("wms-cli")
        .unwrap()
        .arg("config-hash")
        .assert()
        .failure();
}

#[allow(deprecated)]
#[test]
fn outcome_is_logged_to_stderr_not_stdout() {
    let layer = write_layer("logged.yaml", "claims:\n  stale_after_secs: 300\n");
    assert_cmd::Command::cargo_bin("wms-cli")
        .unwrap()
        .env_remove("RUST_LOG")
        .args(["config-hash", layer.to_str().unwrap()])
        .assert()
        .success()
        .stderr(predicate::str::contains("config hash computed"))
        .stdout(predicate::str::contains("config hash computed").not());
}
