//! End-to-end CLI tests for the fetchbind binary.

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const PAGE: &str = r#"<html><head><title>Docs</title></head><body>
<ul><li class="item">alpha</li><li class="item">beta</li></ul>
<p class="count">2 items</p>
</body></html>"#;

fn fetchbind() -> Command {
    Command::cargo_bin("fetchbind").unwrap()
}

async fn page_server() -> MockServer {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/page"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(PAGE, "text/html; charset=utf-8"))
        .mount(&mock_server)
        .await;
    mock_server
}

/// Test that --help displays usage information and exits with code 0.
#[test]
fn test_binary_help_displays_usage() {
    fetchbind()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--rules"));
}

/// Test that --version displays version and exits with code 0.
#[test]
fn test_binary_version_displays_version() {
    fetchbind()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("fetchbind"));
}

/// Test that a missing URL causes a non-zero exit.
#[test]
fn test_binary_requires_url() {
    fetchbind()
        .assert()
        .failure()
        .stderr(predicate::str::contains("<URL>"));
}

#[test]
fn test_binary_rejects_out_of_range_retries() {
    fetchbind()
        .args(["-r", "11", "http://127.0.0.1:9/"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("error"));
}

#[test]
fn test_binary_rejects_bad_timeout() {
    fetchbind()
        .args(["-t", "soon", "http://127.0.0.1:9/"])
        .assert()
        .failure();
}

// ==================== Request Tests ====================

#[tokio::test(flavor = "multi_thread")]
async fn test_binary_prints_body() {
    let mock_server = page_server().await;
    fetchbind()
        .arg(format!("{}/page", mock_server.uri()))
        .assert()
        .success()
        .stdout(predicate::str::contains("<title>Docs</title>"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_binary_sends_query_and_headers() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(query_param("q", "rust"))
        .respond_with(ResponseTemplate::new(200).set_body_string("matched"))
        .expect(1)
        .mount(&mock_server)
        .await;

    fetchbind()
        .args(["--query", "q=rust", "-H", "X-Token: abc", "-b", "sid=1"])
        .arg(mock_server.uri())
        .assert()
        .success()
        .stdout("matched");

    let received = mock_server.received_requests().await.unwrap();
    assert_eq!(received[0].headers["x-token"].to_str().unwrap(), "abc");
    assert_eq!(received[0].headers["cookie"].to_str().unwrap(), "sid=1");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_binary_fails_on_http_error() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&mock_server)
        .await;

    fetchbind()
        .arg(mock_server.uri())
        .assert()
        .failure()
        .stderr(predicate::str::contains("404"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_binary_select_prints_matches() {
    let mock_server = page_server().await;
    fetchbind()
        .args(["--select", "li.item"])
        .arg(format!("{}/page", mock_server.uri()))
        .assert()
        .success()
        .stdout("alpha\nbeta\n");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_binary_binds_yaml_rules() {
    let mock_server = page_server().await;
    let temp_dir = TempDir::new().unwrap();
    let rules = temp_dir.path().join("rules.yaml");
    std::fs::write(
        &rules,
        r#"
- name: title
  select: title
- name: items
  select: li.item
  list: true
- name: count
  select: .count
  find: '(\d+)'
  type: int
- name: site
  value: "{site}"
"#,
    )
    .unwrap();

    let output = fetchbind()
        .arg("--rules")
        .arg(&rules)
        .args(["-p", "site=docs"])
        .arg(format!("{}/page", mock_server.uri()))
        .output()
        .unwrap();
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));

    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(
        value,
        serde_json::json!({
            "title": "Docs",
            "items": ["alpha", "beta"],
            "count": 2,
            "site": "docs",
        })
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn test_binary_downloads_to_file() {
    let mock_server = page_server().await;
    let temp_dir = TempDir::new().unwrap();
    let target = temp_dir.path().join("page.html");

    fetchbind()
        .arg("-q")
        .arg("-o")
        .arg(&target)
        .arg(format!("{}/page", mock_server.uri()))
        .assert()
        .success();
    assert_eq!(std::fs::read_to_string(&target).unwrap(), PAGE);

    fetchbind()
        .arg("-o")
        .arg(&target)
        .arg(format!("{}/page", mock_server.uri()))
        .assert()
        .failure()
        .stderr(predicate::str::contains("already exists"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_binary_dump_writes_response_head_to_stderr() {
    let mock_server = page_server().await;
    fetchbind()
        .arg("--dump")
        .arg(format!("{}/page", mock_server.uri()))
        .assert()
        .success()
        .stdout(predicate::str::contains("<title>Docs</title>"))
        .stderr(predicate::str::contains("200 OK"))
        .stderr(predicate::str::contains("content-type: text/html; charset=utf-8"));
}
