use securepilot_core::ScanResult;
use serde_json::json;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn mock_backends() -> MockServer {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/repos/octo/app/pulls/7/files"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "filename": "app/db.py", "status": "modified", "patch": "+cur.execute(\"SELECT \" + q)" },
            { "filename": "app/util.py", "status": "added", "patch": "+def add(a, b): return a + b" },
            { "filename": "docs/logo.png", "status": "added" }
        ])))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(body_string_contains("app/db.py"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion(
            r#"{"issues":[{"severity":"high","line":1,"description":"SQL injection"}]}"#,
        )))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion(r#"{"issues":[]}"#)))
        .mount(&server)
        .await;

    server
}

fn completion(content: &str) -> serde_json::Value {
    json!({ "choices": [{ "message": { "role": "assistant", "content": content } }] })
}

fn write_config(dir: &std::path::Path, server: &MockServer) {
    let config = format!(
        r#"
[github]
token = "t0k"
api_url = "{uri}"

[llm]
model = "test-model"
api_key = "sk-test"
base_url = "{uri}"

[scan]
deadline_secs = 30
"#,
        uri = server.uri()
    );
    std::fs::write(dir.join(".securepilot.toml"), config).unwrap();
}

fn securepilot(dir: &std::path::Path) -> tokio::process::Command {
    let mut cmd = tokio::process::Command::new(env!("CARGO_BIN_EXE_securepilot"));
    cmd.current_dir(dir)
        .env_remove("GITHUB_TOKEN")
        .env_remove("GH_TOKEN")
        .env_remove("OPENAI_API_KEY")
        .env_remove("RUST_LOG");
    cmd
}

#[tokio::test(flavor = "multi_thread")]
async fn scan_reports_findings_as_json() {
    let server = mock_backends().await;
    let dir = tempfile::tempdir().unwrap();
    write_config(dir.path(), &server);

    let output = securepilot(dir.path())
        .args(["--format", "json", "scan", "octo/app#7"])
        .output()
        .await
        .unwrap();

    assert!(
        output.status.success(),
        "scan failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let result: ScanResult = serde_json::from_slice(&output.stdout).unwrap();
    let files: Vec<&str> = result.results.iter().map(|f| f.file.as_str()).collect();
    assert_eq!(files, vec!["app/db.py", "app/util.py"]);
    assert_eq!(result.results[0].issues, vec!["[high] line 1: SQL injection"]);
    assert!(result.results[1].is_clean());
    assert_eq!(result.stats.files_changed, 3);
    assert_eq!(result.stats.skipped.len(), 1);
    assert_eq!(result.stats.model_used, "test-model");
}

#[tokio::test(flavor = "multi_thread")]
async fn fail_on_issues_sets_exit_code() {
    let server = mock_backends().await;
    let dir = tempfile::tempdir().unwrap();
    write_config(dir.path(), &server);

    let output = securepilot(dir.path())
        .args(["scan", "octo/app", "7", "--fail-on-issues"])
        .output()
        .await
        .unwrap();

    assert_eq!(output.status.code(), Some(1));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("[ISSUES] app/db.py (1)"));
    assert!(stdout.contains("[OK] app/util.py"));
}

#[tokio::test(flavor = "multi_thread")]
async fn unbounded_deadline_flag_still_scans() {
    let server = mock_backends().await;
    let dir = tempfile::tempdir().unwrap();
    write_config(dir.path(), &server);

    let output = securepilot(dir.path())
        .args(["--format", "json", "scan", "octo/app#7", "--deadline", "18446744073709551615"])
        .output()
        .await
        .unwrap();

    assert!(
        output.status.success(),
        "scan failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let result: ScanResult = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(result.results.len(), 2);
}

#[tokio::test(flavor = "multi_thread")]
async fn missing_pull_request_fails_the_command() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/repos/octo/app/pulls/7/files"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({ "message": "Not Found" })))
        .mount(&server)
        .await;
    let dir = tempfile::tempdir().unwrap();
    write_config(dir.path(), &server);

    let output = securepilot(dir.path())
        .args(["scan", "octo/app#7"])
        .output()
        .await
        .unwrap();

    assert!(!output.status.success());
    assert!(output.stdout.is_empty());
    assert!(String::from_utf8_lossy(&output.stderr).contains("octo/app#7"));
}

#[tokio::test(flavor = "multi_thread")]
async fn doctor_reports_checks_as_json() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    write_config(dir.path(), &server);

    let output = securepilot(dir.path())
        .args(["--format", "json", "doctor"])
        .output()
        .await
        .unwrap();

    assert!(output.status.success());
    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let checks = report["checks"].as_array().unwrap();
    let status_of = |name: &str| {
        checks
            .iter()
            .find(|c| c["name"] == name)
            .map(|c| c["status"].as_str().unwrap().to_string())
    };
    assert_eq!(status_of("config_file").as_deref(), Some("pass"));
    assert_eq!(status_of("github_token").as_deref(), Some("pass"));
    assert_eq!(status_of("llm_api_key").as_deref(), Some("pass"));
}
