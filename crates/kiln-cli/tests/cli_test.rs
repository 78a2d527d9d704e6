//! Exit-code and output contract of the `kiln` binary.
#![allow(deprecated)]

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

fn kiln() -> Command {
    let mut cmd = Command::cargo_bin("kiln").unwrap();
    cmd.env_remove("RUST_LOG").env_remove("SHELL_VERBOSITY");
    cmd
}

fn project() -> TempDir {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    fs::create_dir_all(root.join("bin")).unwrap();
    fs::create_dir_all(root.join("src")).unwrap();
    fs::write(root.join("bin/app.php"), "<?php\n// main\nrequire 'src/A.php';\n").unwrap();
    fs::write(root.join("src/A.php"), "<?php class A {}\n").unwrap();
    fs::write(
        root.join("kiln.json"),
        r#"{
            "main": "bin/app.php",
            "directories": ["src"],
            "compactors": ["source"],
            "output": "app.kiln"
        }"#,
    )
    .unwrap();
    dir
}

fn compile_in(dir: &Path, extra: &[&str]) {
    kiln()
        .current_dir(dir)
        .arg("compile")
        .args(extra)
        .assert()
        .success();
}

#[test]
fn test_compile_writes_archive_and_reports_summary() {
    let dir = project();
    kiln()
        .current_dir(dir.path())
        .arg("compile")
        .assert()
        .success()
        .stdout(predicate::str::contains("Compiled"))
        .stdout(predicate::str::contains("members:     2"));
    assert!(dir.path().join("app.kiln").is_file());
}

#[test]
fn test_compile_json_output() {
    let dir = project();
    let out = kiln()
        .current_dir(dir.path())
        .args(["compile", "--format", "json", "--compression", "gzip"])
        .output()
        .unwrap();
    assert!(out.status.success());
    let v: Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(v["members"], 2);
    assert_eq!(v["compression"], "gzip");
    assert_eq!(v["entry-point"], "bin/app.php");
    assert_eq!(v["signed"], false);
}

#[test]
fn test_unknown_compression_is_a_usage_error() {
    let dir = project();
    kiln()
        .current_dir(dir.path())
        .args(["compile", "--compression", "bzip2"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("error[UnsupportedOption]"));
    assert!(!dir.path().join("app.kiln").exists());
}

#[test]
fn test_missing_source_fails_with_kind() {
    let dir = project();
    fs::remove_file(dir.path().join("bin/app.php")).unwrap();
    kiln()
        .current_dir(dir.path())
        .arg("compile")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("error[SourceUnavailable]"))
        .stderr(predicate::str::contains("bin/app.php"));
}

#[test]
fn test_build_alias_is_deprecated() {
    let dir = project();
    kiln()
        .current_dir(dir.path())
        .arg("build")
        .assert()
        .success()
        .stderr(predicate::str::contains("deprecated"));
    assert!(dir.path().join("app.kiln").is_file());
}

#[test]
fn test_quiet_compile_prints_nothing() {
    let dir = project();
    kiln()
        .current_dir(dir.path())
        .args(["-q", "compile"])
        .assert()
        .success()
        .stdout(predicate::str::is_empty());
}

#[test]
fn test_diff_exit_codes() {
    let dir = project();
    compile_in(dir.path(), &["-o", "a.kiln"]);
    compile_in(dir.path(), &["-o", "b.kiln", "--compression", "zstd"]);

    kiln()
        .current_dir(dir.path())
        .args(["diff", "a.kiln", "b.kiln"])
        .assert()
        .code(0)
        .stdout(predicate::str::contains("No differences"));

    fs::write(dir.path().join("src/B.php"), "<?php class B {}\n").unwrap();
    compile_in(dir.path(), &["-o", "c.kiln"]);
    kiln()
        .current_dir(dir.path())
        .args(["diff", "a.kiln", "c.kiln"])
        .assert()
        .code(1)
        .stdout(predicate::str::contains("+ src/B.php"));

    let out = kiln()
        .current_dir(dir.path())
        .args(["diff", "a.kiln", "c.kiln", "--format", "json"])
        .output()
        .unwrap();
    let v: Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(v["added"][0], "src/B.php");

    kiln()
        .current_dir(dir.path())
        .args(["diff", "a.kiln", "missing.kiln"])
        .assert()
        .code(2);
}

#[test]
fn test_keygen_sign_and_verify() {
    let dir = project();
    let keys = dir.path().join("keys");
    kiln()
        .args(["keygen", "--out"])
        .arg(&keys)
        .assert()
        .success()
        .stdout(predicate::str::contains("key_id:      sha256:"));

    // Refuses to overwrite without --force when not interactive.
    kiln()
        .args(["-n", "keygen", "--out"])
        .arg(&keys)
        .assert()
        .failure()
        .stderr(predicate::str::contains("--force"));

    compile_in(dir.path(), &["--key", "keys/kiln-signing.pem", "-o", "signed.kiln"]);

    kiln()
        .current_dir(dir.path())
        .args(["verify", "signed.kiln", "--public-key", "keys/kiln-signing.pub.pem"])
        .assert()
        .code(0)
        .stdout(predicate::str::contains("signature valid"))
        .stdout(predicate::str::contains("trusted:   yes"));

    let other = dir.path().join("other");
    kiln().args(["keygen", "--out"]).arg(&other).assert().success();
    kiln()
        .current_dir(dir.path())
        .args(["verify", "signed.kiln", "--public-key", "other/kiln-signing.pub.pem"])
        .assert()
        .code(3);
}

#[test]
fn test_verify_tampered_archive_fails() {
    let dir = project();
    let keys = dir.path().join("keys");
    kiln().args(["keygen", "--out"]).arg(&keys).assert().success();
    compile_in(dir.path(), &["--key", "keys/kiln-signing.pem", "-o", "signed.kiln"]);

    let path = dir.path().join("signed.kiln");
    let mut bytes = fs::read(&path).unwrap();
    bytes[20] ^= 0x01;
    fs::write(&path, bytes).unwrap();

    let out = kiln()
        .current_dir(dir.path())
        .args(["verify", "signed.kiln", "--format", "json"])
        .output()
        .unwrap();
    assert_eq!(out.status.code(), Some(3));
    let v: Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(v["signed"], true);
    assert_eq!(v["valid"], false);
    assert_eq!(v["kind"], "SignatureMismatch");
}

#[test]
fn test_unsigned_archive_verifies_without_key() {
    let dir = project();
    compile_in(dir.path(), &[]);
    kiln()
        .current_dir(dir.path())
        .args(["verify", "app.kiln"])
        .assert()
        .code(0)
        .stdout(predicate::str::contains("not signed"));
}

#[test]
fn test_info_describes_archive_and_tool() {
    let dir = project();
    compile_in(dir.path(), &[]);
    kiln()
        .current_dir(dir.path())
        .args(["info", "app.kiln", "--list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("entry point: bin/app.php"))
        .stdout(predicate::str::contains("src/A.php"));

    let out = kiln().args(["info", "--format", "json"]).output().unwrap();
    let v: Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(v["compressions"], serde_json::json!(["none", "gzip", "zstd"]));
    assert_eq!(v["signature_algorithms"], serde_json::json!(["ed25519"]));
}

#[cfg(unix)]
#[test]
fn test_info_check_runs_runtime_with_stub_arguments() {
    use std::os::unix::fs::PermissionsExt;
    let dir = project();
    let runtime = dir.path().join("fake-php");
    fs::write(
        &runtime,
        "#!/bin/sh\ncase \"$1\" in\n  --kiln-version) echo 'FakePHP 8.3.1' ;;\n  --kiln-modules) printf 'Core\\njson\\n' ;;\nesac\n",
    )
    .unwrap();
    fs::set_permissions(&runtime, fs::Permissions::from_mode(0o755)).unwrap();
    fs::write(
        dir.path().join("deps.json"),
        r#"[{"name": "acme/lib", "constraint": "^8.1", "require-extensions": ["json"]}]"#,
    )
    .unwrap();
    let config = serde_json::json!({
        "main": "bin/app.php",
        "directories": ["src"],
        "dependencies": "deps.json",
        "output": "app.kiln",
        "runtime": {
            "command": runtime,
            "version-probe": ["--kiln-version"],
            "extensions-probe": ["--kiln-modules"]
        }
    });
    fs::write(dir.path().join("kiln.json"), config.to_string()).unwrap();
    compile_in(dir.path(), &[]);

    kiln()
        .current_dir(dir.path())
        .args(["info", "app.kiln", "--check"])
        .assert()
        .success()
        .stdout(predicate::str::contains("all requirements satisfied"));
}

#[test]
fn test_validate_reports_problems() {
    let dir = project();
    kiln()
        .current_dir(dir.path())
        .arg("validate")
        .assert()
        .success()
        .stdout(predicate::str::contains("is valid: 2 files"));

    fs::write(
        dir.path().join("kiln.json"),
        r#"{"main": "bin/missing.php", "compression": "rar"}"#,
    )
    .unwrap();
    kiln()
        .current_dir(dir.path())
        .arg("validate")
        .assert()
        .code(2)
        .stderr(predicate::str::contains("main:"))
        .stderr(predicate::str::contains("compression:"));

    fs::write(dir.path().join("kiln.json"), r#"{"main": "a.php", "typo": 1}"#).unwrap();
    kiln()
        .current_dir(dir.path())
        .arg("validate")
        .assert()
        .code(2)
        .stderr(predicate::str::contains("error[Config]"));
}

#[test]
fn test_version_flag() {
    kiln()
        .arg("-V")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}
