use httpmock::prelude::*;
use serde_json::{json, Value};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

const TOKEN_ENV: &str = "DEDUP_TEST_TOKEN";
const SEARCH_PATH: &str = "/crm/v3/objects/contacts/search";
const MERGE_PATH: &str = "/crm/v3/objects/contacts/merge";

fn dedup_binary() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_dedup"))
}

fn setup_test_env(base_url: &str) -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    let config_content = format!(
        r#"[crm]
base_url = "{}"
token_env = "{}"
rate_limit_per_sec = 1000
max_retries = 0

[merge]
step_pause_ms = 0
group_pause_ms = 0

[export]
dir = "{}/exports"
"#,
        base_url,
        TOKEN_ENV,
        root.display()
    );

    let config_path = config_dir.join("dedup.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_dedup(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = dedup_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .arg("--progress")
        .arg("off")
        .args(args)
        .env(TOKEN_ENV, "test-token")
        .env_remove("RUST_LOG")
        .output()
        .unwrap_or_else(|e| panic!("Failed to run dedup binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

/// Contacts 1 and 2 share a phone number, 1 and 3 share an email.
fn mock_search(server: &MockServer) -> httpmock::Mock<'_> {
    server.mock(|when, then| {
        when.method(POST)
            .path(SEARCH_PATH)
            .header("authorization", "Bearer test-token");
        then.status(200).json_body(json!({
            "results": [
                {
                    "id": "1",
                    "createdAt": "2025-08-14T01:00:00Z",
                    "properties": {
                        "phone": "9876543210",
                        "email": "asha@example.com",
                        "firstname": "Asha",
                        "createdate": "2025-08-14T01:00:00Z"
                    }
                },
                {
                    "id": "2",
                    "createdAt": "2025-08-14T02:00:00Z",
                    "properties": {
                        "phone": "+91 98765 43210",
                        "email": "asha.k@example.com",
                        "createdate": "2025-08-14T02:00:00Z"
                    }
                },
                {
                    "id": "3",
                    "createdAt": "2025-08-14T03:00:00Z",
                    "properties": {
                        "email": " Asha@Example.com",
                        "createdate": "2025-08-14T03:00:00Z"
                    }
                }
            ]
        }));
    })
}

#[test]
fn test_normalize_needs_no_config() {
    let missing = Path::new("/nonexistent/dedup.toml");

    let (stdout, _, success) = run_dedup(missing, &["normalize", "+91 98765 43210"]);
    assert!(success);
    assert_eq!(stdout.trim(), "9876543210");

    let (stdout, _, success) = run_dedup(missing, &["normalize", "--kind", "email", " A@B.com "]);
    assert!(success);
    assert_eq!(stdout.trim(), "a@b.com");

    let (stdout, _, success) = run_dedup(missing, &["normalize", "12345"]);
    assert!(success);
    assert_eq!(stdout.trim(), "(none)");
}

#[test]
fn test_check_reports_token() {
    let (_tmp, config_path) = setup_test_env("http://127.0.0.1:1");

    let (stdout, stderr, success) = run_dedup(&config_path, &["check"]);
    assert!(success, "check failed: {}", stderr);
    assert!(stdout.contains("DEDUP_TEST_TOKEN is set"));
    assert!(stdout.trim_end().ends_with("ok"));

    let output = Command::new(dedup_binary())
        .arg("--config")
        .arg(&config_path)
        .arg("check")
        .env_remove(TOKEN_ENV)
        .output()
        .unwrap();
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains(TOKEN_ENV));
}

#[test]
fn test_invalid_config_is_rejected() {
    let tmp = TempDir::new().unwrap();
    let config_path = tmp.path().join("dedup.toml");
    fs::write(&config_path, "[crm]\npage_size = 500\n").unwrap();

    let (_, stderr, success) = run_dedup(&config_path, &["check"]);
    assert!(!success);
    assert!(stderr.contains("page_size"), "stderr: {}", stderr);
}

#[test]
fn test_scan_plans_without_merging() {
    let server = MockServer::start();
    let search = mock_search(&server);
    let merge = server.mock(|when, then| {
        when.method(POST).path(MERGE_PATH);
        then.status(200).json_body(json!({ "id": "2" }));
    });
    let (_tmp, config_path) = setup_test_env(&server.base_url());

    let (stdout, stderr, success) =
        run_dedup(&config_path, &["scan", "--date", "2025-08-14", "--json"]);
    assert!(success, "scan failed: {}", stderr);

    search.assert_calls(1);
    merge.assert_calls(0);

    let report: Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(report["dry_run"], true);
    assert_eq!(report["summary"]["total_contacts"], 3);
    assert_eq!(report["summary"]["phone_groups"], 1);
    assert_eq!(report["summary"]["email_groups"], 1);
    assert_eq!(report["summary"]["groups_planned"], 2);
    assert_eq!(report["outcomes"][0]["key"]["kind"], "phone");
    assert_eq!(report["outcomes"][0]["status"]["status"], "planned");
}

#[test]
fn test_scan_export_writes_csv() {
    let server = MockServer::start();
    mock_search(&server);
    let (tmp, config_path) = setup_test_env(&server.base_url());
    let csv_path = tmp.path().join("out").join("groups.csv");

    let (stdout, stderr, success) = run_dedup(
        &config_path,
        &[
            "scan",
            "--date",
            "2025-08-14",
            "--export",
            csv_path.to_str().unwrap(),
        ],
    );
    assert!(success, "scan failed: {}", stderr);
    assert!(stdout.contains("exported 4 rows"));

    let csv = fs::read_to_string(&csv_path).unwrap();
    let lines: Vec<&str> = csv.lines().collect();
    assert_eq!(lines.len(), 5);
    assert!(lines[1].starts_with("phone,9876543210,1,Asha"));
    assert!(lines[2].contains(",survivor,planned"));
}

#[test]
fn test_merge_requires_yes() {
    let server = MockServer::start();
    let search = mock_search(&server);
    let (_tmp, config_path) = setup_test_env(&server.base_url());

    let (_, stderr, success) = run_dedup(&config_path, &["merge", "--date", "2025-08-14"]);
    assert!(!success);
    assert!(stderr.contains("--yes"));
    search.assert_calls(0);
}

#[test]
fn test_merge_executes_plans() {
    let server = MockServer::start();
    mock_search(&server);
    let phone_merge = server.mock(|when, then| {
        when.method(POST)
            .path(MERGE_PATH)
            .json_body(json!({ "primaryObjectId": "2", "objectIdToMerge": "1" }));
        then.status(200).json_body(json!({ "id": "2" }));
    });
    let email_merge = server.mock(|when, then| {
        when.method(POST)
            .path(MERGE_PATH)
            .json_body(json!({ "primaryObjectId": "3", "objectIdToMerge": "1" }));
        then.status(400).body("contact 1 was already merged");
    });
    let (_tmp, config_path) = setup_test_env(&server.base_url());

    let (stdout, stderr, success) =
        run_dedup(&config_path, &["merge", "--date", "2025-08-14", "--yes"]);
    assert!(success, "merge failed: {}", stderr);

    phone_merge.assert_calls(1);
    email_merge.assert_calls(1);
    assert!(stdout.contains("merged"));
    assert!(stdout.contains("FAILED"));
    assert!(stdout.contains("already merged"));
    assert!(stdout.contains("Groups:      1 merged, 1 failed, 0 manual review"));
    assert!(stdout.contains("Success:     50.0%"));
}

#[test]
fn test_fetch_failure_exits_nonzero() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(POST).path(SEARCH_PATH);
        then.status(403).body("{\"message\":\"missing scopes\"}");
    });
    let (_tmp, config_path) = setup_test_env(&server.base_url());

    let (_, stderr, success) = run_dedup(&config_path, &["scan", "--date", "2025-08-14"]);
    assert!(!success);
    assert!(stderr.contains("Failed to fetch contacts"), "stderr: {}", stderr);
}
