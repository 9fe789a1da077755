use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;
use std::fs;
use std::path::PathBuf;
use tempfile::tempdir;

/// Helper to get the path to the fixtures directory
fn fixtures_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
}

fn fixture(name: &str) -> PathBuf {
    fixtures_dir().join(name)
}

fn ovaleval_cmd() -> Command {
    Command::new(env!("CARGO_BIN_EXE_ovaleval"))
}

fn read_json(path: &PathBuf) -> Value {
    serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap()
}

fn definition<'a>(doc: &'a Value, system: &str, id: &str) -> Option<&'a Value> {
    doc["systems"]
        .as_array()?
        .iter()
        .find(|s| s["snapshot_id"] == system)?["definitions"]
        .as_array()?
        .iter()
        .find(|d| d["id"] == id)
}

// =============================================================================
// BASIC CLI FUNCTIONALITY
// =============================================================================

#[test]
fn help_works() {
    ovaleval_cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("ovaleval"));
}

#[test]
fn version_works() {
    ovaleval_cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("ovaleval"));
}

#[test]
fn eval_help_shows_options() {
    ovaleval_cmd()
        .arg("eval")
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--catalog"))
        .stdout(predicate::str::contains("--snapshot"))
        .stdout(predicate::str::contains("--debug"))
        .stdout(predicate::str::contains("--log-file"))
        .stdout(predicate::str::contains("OVALEVAL_DEBUG_LOG"));
}

// =============================================================================
// EVAL
// =============================================================================

#[test]
fn eval_clean_run_exits_zero() {
    let tmp = tempdir().unwrap();
    let out = tmp.path().join("results.json");
    let md = tmp.path().join("summary.md");

    ovaleval_cmd()
        .arg("eval")
        .arg("--catalog")
        .arg(fixture("catalog.json"))
        .arg("--snapshot")
        .arg(fixture("host-a.json"))
        .arg("--snapshot")
        .arg(fixture("host-b.json"))
        .arg("--out")
        .arg(&out)
        .arg("--md")
        .arg(&md)
        .assert()
        .code(0)
        .stderr(predicate::str::contains("2 system(s), 0 problem(s)"));

    let doc = read_json(&out);
    assert_eq!(doc["schema"], "ovaleval.results.v1");
    assert_eq!(
        definition(&doc, "host-a", "oval:org.example:def:1").unwrap()["result"],
        "true"
    );
    assert_eq!(
        definition(&doc, "host-b", "oval:org.example:def:1").unwrap()["result"],
        "false"
    );
    assert_eq!(
        definition(&doc, "host-b", "oval:org.example:def:2").unwrap()["result"],
        "false"
    );

    let summary = fs::read_to_string(&md).unwrap();
    assert!(summary.contains("ovaleval: FAIL"));
    assert!(summary.contains("### System `host-b`"));
}

#[test]
fn eval_cycle_exits_two_and_still_writes_results() {
    let tmp = tempdir().unwrap();
    let out = tmp.path().join("results.json");

    ovaleval_cmd()
        .arg("eval")
        .arg("--catalog")
        .arg(fixture("cycle_catalog.json"))
        .arg("--snapshot")
        .arg(fixture("host-a.json"))
        .arg("--out")
        .arg(&out)
        .assert()
        .code(2)
        .stderr(predicate::str::contains("results.extend_cycle"));

    let doc = read_json(&out);
    for id in ["oval:org.example:def:10", "oval:org.example:def:11"] {
        assert_eq!(definition(&doc, "host-a", id).unwrap()["result"], "error");
    }
}

#[test]
fn eval_missing_catalog_is_runtime_error() {
    let tmp = tempdir().unwrap();
    ovaleval_cmd()
        .arg("eval")
        .arg("--catalog")
        .arg(tmp.path().join("nope.json"))
        .arg("--snapshot")
        .arg(fixture("host-a.json"))
        .arg("--out")
        .arg(tmp.path().join("results.json"))
        .assert()
        .code(1)
        .stderr(predicate::str::contains("definition catalog"));
}

#[test]
fn eval_config_directives_filter_output() {
    let tmp = tempdir().unwrap();
    let out = tmp.path().join("results.json");

    ovaleval_cmd()
        .arg("eval")
        .arg("--catalog")
        .arg(fixture("catalog.json"))
        .arg("--snapshot")
        .arg(fixture("host-b.json"))
        .arg("--config")
        .arg(fixture("thin.toml"))
        .arg("--out")
        .arg(&out)
        .assert()
        .code(0);

    let doc = read_json(&out);
    let defs = doc["systems"][0]["definitions"].as_array().unwrap();
    assert!(defs.iter().all(|d| d["result"] != "false"));
    let tests = doc["systems"][0]["tests"].as_array().unwrap();
    let pkg = tests
        .iter()
        .find(|t| t["id"] == "oval:org.example:tst:2")
        .unwrap();
    assert!(pkg.get("items").map_or(true, |i| i.as_array().unwrap().is_empty()));
}

#[test]
fn eval_import_round_trip() {
    let tmp = tempdir().unwrap();
    let first = tmp.path().join("first.json");
    let second = tmp.path().join("second.json");

    ovaleval_cmd()
        .arg("eval")
        .arg("--catalog")
        .arg(fixture("catalog.json"))
        .arg("--snapshot")
        .arg(fixture("host-a.json"))
        .arg("--out")
        .arg(&first)
        .assert()
        .code(0);

    // host-a comes back from the import; host-b is new.
    ovaleval_cmd()
        .arg("eval")
        .arg("--catalog")
        .arg(fixture("catalog.json"))
        .arg("--snapshot")
        .arg(fixture("host-b.json"))
        .arg("--import")
        .arg(&first)
        .arg("--out")
        .arg(&second)
        .assert()
        .code(0);

    let doc = read_json(&second);
    assert_eq!(doc["systems"].as_array().unwrap().len(), 2);
    assert_eq!(
        definition(&doc, "host-a", "oval:org.example:def:1").unwrap()["result"],
        "true"
    );
}

#[test]
fn debug_log_does_not_affect_results() {
    let tmp = tempdir().unwrap();
    let out1 = tmp.path().join("one.json");
    let out2 = tmp.path().join("two.json");
    let log = tmp.path().join("debug.log");

    ovaleval_cmd()
        .arg("eval")
        .arg("--catalog")
        .arg(fixture("catalog.json"))
        .arg("--snapshot")
        .arg(fixture("host-a.json"))
        .arg("--out")
        .arg(&out1)
        .arg("--log-file")
        .arg(&log)
        .assert()
        .code(0);

    ovaleval_cmd()
        .arg("eval")
        .arg("--catalog")
        .arg(fixture("catalog.json"))
        .arg("--snapshot")
        .arg(fixture("host-a.json"))
        .arg("--out")
        .arg(&out2)
        .assert()
        .code(0);

    let log_text = fs::read_to_string(&log).unwrap();
    assert!(log_text.contains("# ovaleval debug log"));
    assert!(log_text.contains("# started:"));
    assert!(log_text.contains("evaluating system"));

    let a = read_json(&out1);
    let b = read_json(&out2);
    assert_eq!(a["systems"], b["systems"]);
}

// =============================================================================
// MD
// =============================================================================

#[test]
fn md_renders_existing_results() {
    let tmp = tempdir().unwrap();
    let out = tmp.path().join("results.json");
    let md = tmp.path().join("summary.md");

    ovaleval_cmd()
        .arg("eval")
        .arg("--catalog")
        .arg(fixture("catalog.json"))
        .arg("--snapshot")
        .arg(fixture("host-a.json"))
        .arg("--out")
        .arg(&out)
        .assert()
        .code(0);

    ovaleval_cmd()
        .arg("md")
        .arg(&out)
        .arg("--out")
        .arg(&md)
        .assert()
        .success();

    let text = fs::read_to_string(&md).unwrap();
    assert!(text.contains("ovaleval: PASS"));
}

#[test]
fn md_requires_a_report() {
    ovaleval_cmd()
        .arg("md")
        .assert()
        .failure()
        .stderr(predicate::str::contains("REPORT"));
}

// =============================================================================
// SUBSTITUTE
// =============================================================================

#[test]
fn substitute_plain_text() {
    ovaleval_cmd()
        .arg("substitute")
        .arg("--benchmark")
        .arg(fixture("benchmark.json"))
        .arg("--text")
        .arg(r#"<sub idref="NOTE1"/> for access."#)
        .assert()
        .success()
        .stdout("Contact admin for access.\n");
}

#[test]
fn substitute_profile_values() {
    ovaleval_cmd()
        .arg("substitute")
        .arg("--benchmark")
        .arg(fixture("benchmark.json"))
        .arg("--profile")
        .arg("xccdf_org.example_profile_strict")
        .arg("--text")
        .arg(r#"MaxAuthTries <sub idref="xccdf_org.example_value_max_auth_tries" use="value"/>"#)
        .assert()
        .success()
        .stdout("MaxAuthTries 2\n");
}

#[test]
fn substitute_tailoring_uses_title() {
    ovaleval_cmd()
        .arg("substitute")
        .arg("--benchmark")
        .arg(fixture("benchmark.json"))
        .arg("--mode")
        .arg("tailoring")
        .write_stdin(r#"<sub idref="xccdf_org.example_value_max_auth_tries"/>"#)
        .assert()
        .success()
        .stdout("Maximum authentication attempts\n");
}

#[test]
fn substitute_non_empty_marker_warns() {
    ovaleval_cmd()
        .arg("substitute")
        .arg("--benchmark")
        .arg(fixture("benchmark.json"))
        .arg("--text")
        .arg(r#"<sub idref="NOTE1">ignored</sub>"#)
        .assert()
        .success()
        .stdout("Contact admin\n")
        .stderr(predicate::str::contains("warning:"));
}

#[test]
fn substitute_missing_idref_fails() {
    ovaleval_cmd()
        .arg("substitute")
        .arg("--benchmark")
        .arg(fixture("benchmark.json"))
        .arg("--text")
        .arg("a <sub/> b")
        .assert()
        .failure()
        .stdout("")
        .stderr(predicate::str::contains("sub.missing_idref"));
}

#[test]
fn substitute_unknown_profile_fails() {
    ovaleval_cmd()
        .arg("substitute")
        .arg("--benchmark")
        .arg(fixture("benchmark.json"))
        .arg("--profile")
        .arg("nope")
        .arg("--text")
        .arg("x")
        .assert()
        .failure()
        .stderr(predicate::str::contains("profile 'nope' not found"));
}

// =============================================================================
// EXPLAIN
// =============================================================================

#[test]
fn explain_known_code() {
    ovaleval_cmd()
        .arg("explain")
        .arg("results.extend_cycle")
        .assert()
        .success()
        .stdout(predicate::str::contains("loop"));
}

#[test]
fn explain_covers_every_code() {
    for code in ovaleval_types::codes::ALL {
        ovaleval_cmd()
            .arg("explain")
            .arg(code)
            .assert()
            .success()
            .stdout(predicate::str::contains("Unknown code").not());
    }
}

#[test]
fn explain_unknown_code() {
    ovaleval_cmd()
        .arg("explain")
        .arg("nope.nope")
        .assert()
        .success()
        .stdout(predicate::str::contains("Unknown code"));
}
