// Integration tests for the regmerge binary: exit codes, the --json stdout
// contract, and credential reporting.
//
// Run with: cargo test -p regmerge-cli --test cli_tests

use std::io::Write;
use std::process::{Command, Output};

use httpmock::prelude::*;

const ENV_VARS: &[&str] = &[
    "REGMERGE_CONFIG",
    "REGMERGE_API_TOKEN",
    "REGMERGE_BASE_URL",
    "REGMERGE_DA_API_TOKEN",
    "REGMERGE_DOCUMENT_API_URL",
    "REGMERGE_OPENAI_KEY",
    "REGMERGE_OPENAI_ENDPOINT",
    "REGMERGE_OPENAI_DEPLOYMENT",
    "REGMERGE_SIMILARITY_THRESHOLD",
    "REGMERGE_REQUEST_TIMEOUT",
    "REGMERGE_ENABLE_NOTIFICATIONS",
];

fn regmerge() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_regmerge"));
    for var in ENV_VARS {
        cmd.env_remove(var);
    }
    cmd.env("RUST_LOG", "error");
    cmd
}

fn run(cmd: &mut Command) -> (i32, String, String) {
    let Output { status, stdout, stderr } = cmd.output().expect("failed to run regmerge");
    (
        status.code().unwrap_or(-1),
        String::from_utf8_lossy(&stdout).into_owned(),
        String::from_utf8_lossy(&stderr).into_owned(),
    )
}

fn settings_file(base_url: &str, registry_token: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
    write!(
        file,
        r#"
[registry]
base_url = "{base_url}"
token = "{registry_token}"

[documents]
api_url = "{base_url}/document/getfile"
token = "doc-secret-456"

[openai]
endpoint = "{base_url}"
key = "ai-secret-789"

[extract]
ocr = false

[recon]
request_timeout_seconds = 5

[recon.retry]
max_attempts = 2
initial_backoff_ms = 0
max_backoff_ms = 0
"#
    )
    .unwrap();
    file
}

fn parse_json(stdout: &str) -> serde_json::Value {
    serde_json::from_str(stdout.trim())
        .unwrap_or_else(|e| panic!("stdout must be one JSON value: {e}\n{stdout}"))
}

// ── score ───────────────────────────────────────────────────────────

#[test]
fn score_spelling_variants_match() {
    let (code, stdout, _) = run(regmerge().args([
        "score",
        "John Smith",
        "Jonathan Smith",
        "--threshold",
        "85",
        "--json",
    ]));
    assert_eq!(code, 0);
    let json = parse_json(&stdout);
    assert_eq!(json["match"], true);
    assert!(json["score"].as_u64().unwrap() >= 85);
    assert_eq!(json["threshold"], 85);
}

#[test]
fn score_different_people_do_not_match() {
    let (code, stdout, _) =
        run(regmerge().args(["score", "John Smith", "Mary Jones", "--threshold", "85"]));
    assert_eq!(code, 0);
    assert!(stdout.contains("no match at threshold 85"), "{stdout}");
}

#[test]
fn score_shared_last_name_is_not_enough() {
    let (code, stdout, _) = run(regmerge().args([
        "score",
        "Mary Smith",
        "Mark Smith",
        "--threshold",
        "85",
        "--json",
    ]));
    assert_eq!(code, 0);
    let json = parse_json(&stdout);
    assert_eq!(json["match"], false);
    assert!(json["score"].as_u64().unwrap() < 85);
}

#[test]
fn score_rejects_blank_name() {
    let (code, _, stderr) = run(regmerge().args(["score", " ", "Mary Jones", "--threshold", "85"]));
    assert_eq!(code, 2);
    assert!(stderr.contains("non-empty"));
}

#[test]
fn threshold_above_100_is_a_usage_error() {
    let (code, _, _) = run(regmerge().args(["score", "a b", "c d", "--threshold", "101"]));
    assert_eq!(code, 2);
}

// ── config check ────────────────────────────────────────────────────

#[test]
fn config_check_reports_sources_not_values() {
    let file = settings_file("https://registry.example.test", "reg-secret-123");
    let (code, stdout, _) = run(regmerge()
        .arg("--config")
        .arg(file.path())
        .args(["config", "check", "--json"])
        .env("REGMERGE_OPENAI_KEY", "env-secret-000"));

    assert_eq!(code, 0, "{stdout}");
    assert!(!stdout.contains("reg-secret-123"));
    assert!(!stdout.contains("env-secret-000"));
    let json = parse_json(&stdout);
    assert_eq!(json["valid"], true);
    assert_eq!(json["secrets"]["registry.token"], "settings file");
    assert_eq!(json["secrets"]["openai.key"], "environment");
}

#[test]
fn config_check_rejects_placeholder_token() {
    let file = settings_file("https://registry.example.test", "YOUR_API_TOKEN_HERE");
    let (code, _, stderr) = run(regmerge()
        .arg("--config")
        .arg(file.path())
        .args(["config", "check"]));
    assert_eq!(code, 3);
    assert!(stderr.contains("registry.token"), "{stderr}");
}

#[test]
fn missing_config_file_is_a_config_error() {
    let dir = tempfile::tempdir().unwrap();
    let (code, _, stderr) = run(regmerge()
        .arg("--config")
        .arg(dir.path().join("absent.toml"))
        .args(["run", "--pg-company-id", "PG1"]));
    assert_eq!(code, 3);
    assert!(stderr.contains("not found"));
}

// ── run / single against a mock registry ────────────────────────────

#[test]
fn rejected_token_cannot_start_run() {
    let server = MockServer::start();
    let patients = server.mock(|when, then| {
        when.method(GET).path("/api/Patient/company/pg/PG1");
        then.status(401).body("unauthorized");
    });
    let file = settings_file(&server.base_url(), "reg-secret-123");

    let (code, _, stderr) = run(regmerge()
        .arg("--config")
        .arg(file.path())
        .args(["run", "--pg-company-id", "PG1"]));

    assert_eq!(code, 4, "{stderr}");
    // auth failures are not retried
    patients.assert_hits(1);
}

#[test]
fn empty_pg_reports_no_groups() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET)
            .path("/api/Patient/company/pg/PG1")
            .header("authorization", "Bearer reg-secret-123");
        then.status(200).json_body(serde_json::json!([]));
    });
    let file = settings_file(&server.base_url(), "reg-secret-123");

    let (code, stdout, _) = run(regmerge()
        .arg("--config")
        .arg(file.path())
        .args(["run", "--pg-company-id", "PG1", "--json", "--dry-run"]));

    assert_eq!(code, 0);
    let json = parse_json(&stdout);
    assert_eq!(json["pg_company_id"], "PG1");
    assert_eq!(json["groups_found"], 0);
    assert_eq!(json["dry_run"], true);
    assert_eq!(json["outcomes"], serde_json::json!([]));
}

#[test]
fn unwritable_output_exits_6() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/api/Patient/company/pg/PG1");
        then.status(200).json_body(serde_json::json!([]));
    });
    let file = settings_file(&server.base_url(), "reg-secret-123");
    let dir = tempfile::tempdir().unwrap();

    let (code, _, _) = run(regmerge()
        .arg("--config")
        .arg(file.path())
        .args(["run", "--pg-company-id", "PG1", "--output"])
        .arg(dir.path().join("missing-dir").join("report.json")));
    assert_eq!(code, 6);
}

#[test]
fn single_with_unknown_patient_exits_5() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/api/Patient/company/pg/PG1");
        then.status(200).json_body(serde_json::json!([
            {"id": 101, "agencyInfo": {
                "patientFName": "Mary", "patientLName": "Jones",
                "medicalRecordNo": "M9", "pgcompanyID": "PG1"
            }}
        ]));
    });
    let file = settings_file(&server.base_url(), "reg-secret-123");

    let (code, _, stderr) = run(regmerge()
        .arg("--config")
        .arg(file.path())
        .args(["single", "--pg-company-id", "PG1", "--patient-id", "999"]));
    assert_eq!(code, 5, "{stderr}");
}

#[test]
fn single_without_duplicates_prints_null_outcome() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/api/Patient/company/pg/PG1");
        then.status(200).json_body(serde_json::json!([
            {"id": 101, "agencyInfo": {
                "patientFName": "Mary", "patientLName": "Jones",
                "medicalRecordNo": "M9", "pgcompanyID": "PG1"
            }}
        ]));
    });
    let file = settings_file(&server.base_url(), "reg-secret-123");

    let (code, stdout, _) = run(regmerge()
        .arg("--config")
        .arg(file.path())
        .args(["single", "--pg-company-id", "PG1", "--patient-id", "101", "--json"]));
    assert_eq!(code, 0);
    let json = parse_json(&stdout);
    assert_eq!(json["patient_id"], "101");
    assert!(json["outcome"].is_null());
}

#[cfg(unix)]
#[test]
fn interrupt_stops_after_the_group_in_flight() {
    use std::process::Stdio;
    use std::time::{Duration, Instant};

    let server = MockServer::start();
    let patients = server.mock(|when, then| {
        when.method(GET).path("/api/Patient/company/pg/PG1");
        then.status(200).json_body(serde_json::json!([
            {"id": "a", "agencyInfo": {"patientFName": "Ann", "patientLName": "Lee",
                "medicalRecordNo": "M1", "pgcompanyID": "PG1"}},
            {"id": "b", "agencyInfo": {"patientFName": "Ann", "patientLName": "Lee",
                "medicalRecordNo": "M1", "pgcompanyID": "PG1"}},
            {"id": "t1", "agencyInfo": {"patientFName": "Tom", "patientLName": "Hart",
                "medicalRecordNo": "T1", "pgcompanyID": "PG1"}},
            {"id": "t2", "agencyInfo": {"patientFName": "Tom", "patientLName": "Hart",
                "medicalRecordNo": "T1", "pgcompanyID": "PG1"}}
        ]));
    });
    for id in ["a", "b"] {
        server.mock(|when, then| {
            when.method(GET).path(format!("/api/Order/patient/{id}"));
            then.status(200)
                .json_body(serde_json::json!([]))
                .delay(Duration::from_millis(1500));
        });
        server.mock(|when, then| {
            when.method(GET).path(format!("/api/CCNotes/patient/{id}"));
            then.status(200).json_body(serde_json::json!([]));
        });
    }
    let file = settings_file(&server.base_url(), "reg-secret-123");

    let child = regmerge()
        .arg("--config")
        .arg(file.path())
        .args(["run", "--pg-company-id", "PG1", "--json", "--dry-run", "--parallel", "1"])
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("failed to spawn regmerge");

    // the handler is installed before the patient list is requested
    let started = Instant::now();
    while patients.hits() == 0 {
        assert!(started.elapsed() < Duration::from_secs(10), "patients never fetched");
        std::thread::sleep(Duration::from_millis(20));
    }
    std::thread::sleep(Duration::from_millis(200));
    let status = Command::new("kill")
        .args(["-INT", &child.id().to_string()])
        .status()
        .expect("failed to run kill");
    assert!(status.success());

    let output = child.wait_with_output().expect("regmerge did not exit");
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert_eq!(output.status.code(), Some(0), "{stderr}");
    let json = parse_json(&stdout);
    assert_eq!(json["cancelled"], true);
    assert_eq!(json["groups_found"], 2);
    assert_eq!(json["groups_processed"], 1);
    assert!(stderr.contains("run cancelled"), "{stderr}");
}
