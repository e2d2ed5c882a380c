//! Integration tests for the `liveplug` binary

#![allow(deprecated)]

use assert_cmd::Command;
use predicates::str::contains;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::{TempDir, tempdir};

fn fixture() -> (TempDir, PathBuf) {
    let root = tempdir().expect("tempdir");
    let config = root.path().join("liveplug.toml");
    fs::write(
        &config,
        format!(
            "global_plugins_dir = \"{}\"\ncompiled_dir = \"{}\"\n",
            root.path().join("live-plugins").display(),
            root.path().join("compiled").display()
        ),
    )
    .unwrap();
    (root, config)
}

fn write_plugin(root: &Path, id: &str, script: &str) -> PathBuf {
    let dir = root.join("live-plugins").join(id);
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join("plugin.rhai"), script).unwrap();
    dir
}

fn liveplug(config: &Path) -> Command {
    let mut cmd = Command::cargo_bin("liveplug").unwrap();
    cmd.arg("--config").arg(config);
    cmd
}

#[test]
fn test_check_reports_compile_errors() {
    let (root, config) = fixture();
    let good = write_plugin(root.path(), "good", r#"register_action("Good", || 1);"#);
    let bad = write_plugin(root.path(), "bad", "let = ;");

    liveplug(&config)
        .arg("check")
        .arg(&good)
        .assert()
        .success()
        .stdout(contains("good"));

    liveplug(&config)
        .arg("check")
        .arg(&good)
        .arg(bad.join("plugin.rhai"))
        .assert()
        .failure()
        .stdout(contains("Error compiling script"))
        .stderr(contains("1 of 2 plugins failed the check"));
}

#[test]
fn test_list_shows_entry_scripts() {
    let (root, config) = fixture();
    write_plugin(root.path(), "hello", "let x = 1;");
    fs::create_dir_all(root.path().join("live-plugins/empty")).unwrap();

    let output = liveplug(&config)
        .arg("--json")
        .arg("list")
        .output()
        .unwrap();
    assert!(output.status.success());

    let rows: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let rows = rows.as_array().unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0]["id"], "empty");
    assert!(rows[0]["entry"].is_null());
    assert_eq!(rows[1]["id"], "hello");
    assert_eq!(rows[1]["entry"], "plugin.rhai");
}

#[test]
fn test_load_fails_when_a_plugin_throws() {
    let (root, config) = fixture();
    write_plugin(root.path(), "fine", r#"register_command("fine", || 1);"#);
    write_plugin(root.path(), "throws", r#"throw "nope";"#);

    liveplug(&config)
        .arg("load")
        .assert()
        .failure()
        .stdout(contains("fine"))
        .stdout(contains("running error"))
        .stderr(contains("1 plugins failed to load"));
}

#[test]
fn test_clean_removes_compile_output() {
    let (root, config) = fixture();
    write_plugin(root.path(), "cached", "let x = 1;");

    liveplug(&config).arg("load").assert().success();
    assert!(root.path().join("compiled/cached/compiled.json").exists());

    liveplug(&config)
        .args(["clean", "cached"])
        .assert()
        .success()
        .stdout(contains("Deleted compile output of 'cached'"));
    assert!(!root.path().join("compiled/cached").exists());
}
