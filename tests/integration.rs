use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn qah_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("qah");
    path
}

/// An archive page with one entry per `(date, text)` pair.
fn archive_page(entries: &[(&str, &str)], nav: &str) -> String {
    let mut html = format!(
        "<html><head><title>questions</title></head><body><h1>questions</h1>{}",
        nav
    );
    for (date, text) in entries {
        html.push_str(&format!(
            "</br></br><h3><dco>{}</dco></h3> <qco>{}</qco>",
            date, text
        ));
    }
    html.push_str("\n<a name=\"bottom\"></a><p>end of page</p></body></html>");
    html
}

fn setup_test_env(server_url: &str, start: &str) -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    let config_content = format!(
        r#"[archive]
latest_url = "{server}/questions/questions.html"
monthly_url = "{server}/questions/questions-{{year}}-{{month}}.html"
base_url = "{server}/questions/"

[http]
timeout_secs = 5

[cache]
dir = "{root}/cache"

[parser]
max_year = 2030

[crawl]
start = "{start}"

[index]
backend = "sqlite"
path = "{root}/data/qa.sqlite"
"#,
        server = server_url,
        root = root.display(),
        start = start,
    );

    let config_path = config_dir.join("qah.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_qah(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = qah_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run qah binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let success = output.status.success();
    (stdout, stderr, success)
}

/// Serves latest (2 entries), 2021-01 (2 entries), 2020-12 (1 entry) and
/// answers 404 for 2020-11.
fn mock_archive(server: &mut mockito::Server, december_status: usize) -> Vec<mockito::Mock> {
    let latest = archive_page(
        &[
            ("2.14.21 10:02 am", "is a frog a <a href=\"frog.html\">toad</a>?"),
            ("2.15.21 9:30 pm", "what time is it"),
        ],
        "<a href=\"questions-2021-01.html\">previous questions</a>",
    );
    let january = archive_page(
        &[
            ("1.3.21 1:00 pm", "favorite frog species"),
            ("1.32.21 12:15 am", "what is the best month"),
        ],
        "",
    );
    let december = archive_page(&[("12.24.20 11:59 pm", "will santa visit")], "");

    let mut mocks = vec![
        server
            .mock("GET", "/questions/questions.html")
            .with_status(200)
            .with_body(latest)
            .create(),
        server
            .mock("GET", "/questions/questions-2021-01.html")
            .with_status(200)
            .with_body(january)
            .create(),
    ];
    let dec = server
        .mock("GET", "/questions/questions-2020-12.html")
        .with_status(december_status);
    mocks.push(if december_status == 200 {
        dec.with_body(december).create()
    } else {
        dec.create()
    });
    mocks.push(
        server
            .mock("GET", "/questions/questions-2020-11.html")
            .with_status(404)
            .create(),
    );
    mocks
}

fn count_hits(stdout: &str) -> usize {
    stdout.lines().filter(|l| l.trim_start().starts_with("id: ")).count()
}

#[test]
fn test_cache_key_is_stable_hex() {
    let (_tmp, config_path) = setup_test_env("http://127.0.0.1:1", "adaptive");
    let url = "https://billwurtz.com/questions/questions-2020-01.html";

    let (first, _, ok1) = run_qah(&config_path, &["cache-key", url]);
    let (second, _, ok2) = run_qah(&config_path, &["cache-key", url]);
    assert!(ok1 && ok2);
    assert_eq!(first, second);
    let key = first.trim();
    assert_eq!(key.len(), 64);
    assert!(key.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
}

#[test]
fn test_parse_saved_page() {
    let tmp = TempDir::new().unwrap();
    let page = tmp.path().join("page.html");
    fs::write(
        &page,
        archive_page(
            &[
                ("6.1.19 4:20 pm", "one"),
                ("6.2.19 4:21&nbsp;pm", "two"),
                ("6.3.19 4:22 om", "three"),
            ],
            "",
        ),
    )
    .unwrap();
    // No config file: falls back to the built-in defaults.
    let missing = tmp.path().join("missing.toml");

    let (stdout, stderr, success) = run_qah(&missing, &["parse", page.to_str().unwrap()]);
    assert!(success, "parse failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("3 records"));
    assert!(stdout.contains("2019-06-03 16:22"));

    let (stdout, _, success) =
        run_qah(&missing, &["parse", page.to_str().unwrap(), "--json"]);
    assert!(success);
    let lines: Vec<serde_json::Value> = stdout
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    assert_eq!(lines.len(), 3);
    assert!(lines[0]["content_html"].as_str().unwrap().starts_with("</br></br>"));
}

#[test]
fn test_parse_rejects_page_without_markers() {
    let tmp = TempDir::new().unwrap();
    let page = tmp.path().join("page.html");
    fs::write(&page, "<html>nothing to see</html>").unwrap();

    let (_, stderr, success) = run_qah(
        &tmp.path().join("missing.toml"),
        &["parse", page.to_str().unwrap()],
    );
    assert!(!success);
    assert!(stderr.contains("end-of-content marker"), "stderr: {}", stderr);
}

#[test]
fn test_init_idempotent() {
    let (_tmp, config_path) = setup_test_env("http://127.0.0.1:1", "adaptive");

    let (stdout, stderr, success1) = run_qah(&config_path, &["init"]);
    assert!(success1, "First init failed: {}", stderr);
    assert!(stdout.contains("initialized"));

    let (_, _, success2) = run_qah(&config_path, &["init"]);
    assert!(success2, "Second init failed (not idempotent)");
}

#[test]
fn test_search_before_first_sync() {
    let (_tmp, config_path) = setup_test_env("http://127.0.0.1:1", "adaptive");

    let (stdout, stderr, success) = run_qah(&config_path, &["search", "frog"]);
    assert!(success, "search failed: stderr={}", stderr);
    assert!(stdout.contains("No results."));
}

#[test]
fn test_sync_walks_to_boundary_then_search() {
    let mut server = mockito::Server::new();
    let _mocks = mock_archive(&mut server, 200);
    let (_tmp, config_path) = setup_test_env(&server.url(), "2021-01");

    let (stdout, stderr, success) = run_qah(&config_path, &["sync", "--progress", "json"]);
    assert!(success, "sync failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("pages synced: 3"));
    assert!(stdout.contains("records upserted: 5"));
    assert!(stdout.contains("stopped at: 2020-11"));
    assert!(stdout.contains("ok"));
    assert!(stderr.contains("\"phase\":\"boundary\""));

    let (stdout, _, success) = run_qah(&config_path, &["search", "frog"]);
    assert!(success);
    assert_eq!(count_hits(&stdout), 2);

    let (stdout, _, success) = run_qah(&config_path, &["search", "", "--size", "50"]);
    assert!(success);
    assert_eq!(count_hits(&stdout), 5);
    // Newest first; the day typo 1.32.21 lands on 2021-01-12.
    let first_date = stdout.lines().next().unwrap();
    assert!(first_date.contains("2021-02-15 21:30"), "got: {}", first_date);
    assert!(stdout.contains("2021-01-12 00:15"));
}

#[test]
fn test_sync_twice_does_not_duplicate() {
    let mut server = mockito::Server::new();
    let _mocks = mock_archive(&mut server, 200);
    let (_tmp, config_path) = setup_test_env(&server.url(), "adaptive");

    let (_, stderr, success) = run_qah(&config_path, &["sync"]);
    assert!(success, "first sync failed: {}", stderr);
    let (stdout, stderr, success) = run_qah(&config_path, &["sync"]);
    assert!(success, "second sync failed: {}", stderr);
    assert!(stdout.contains("records upserted: 5"));

    let (stdout, _, _) = run_qah(&config_path, &["search", "", "--size", "50"]);
    assert_eq!(count_hits(&stdout), 5);
}

#[test]
fn test_sync_fails_on_server_error() {
    let mut server = mockito::Server::new();
    let _mocks = mock_archive(&mut server, 503);
    let (_tmp, config_path) = setup_test_env(&server.url(), "2021-01");

    let (stdout, stderr, success) = run_qah(&config_path, &["sync"]);
    assert!(!success, "sync should fail: stdout={}", stdout);
    assert!(!stdout.contains("ok"));
    assert!(stderr.contains("sync failed at 2020-12"), "stderr: {}", stderr);
}

#[test]
fn test_sync_latest_only() {
    let mut server = mockito::Server::new();
    let _mocks = mock_archive(&mut server, 200);
    let (_tmp, config_path) = setup_test_env(&server.url(), "2021-01");

    let (stdout, stderr, success) = run_qah(&config_path, &["sync", "--latest-only"]);
    assert!(success, "sync failed: {}", stderr);
    assert!(stdout.contains("pages synced: 1"));
    assert!(stdout.contains("records upserted: 2"));
    assert!(stdout.contains("stopped at: latest"));
}

#[test]
fn test_dry_run_leaves_no_index() {
    let mut server = mockito::Server::new();
    let _mocks = mock_archive(&mut server, 200);
    let (tmp, config_path) = setup_test_env(&server.url(), "2021-01");

    let (stdout, stderr, success) = run_qah(&config_path, &["sync", "--dry-run"]);
    assert!(success, "dry-run failed: {}", stderr);
    assert!(stdout.contains("(dry-run)"));
    assert!(stdout.contains("records upserted: 5"));
    assert!(!tmp.path().join("data/qa.sqlite").exists());
}

#[test]
fn test_bad_start_flag_rejected() {
    let (_tmp, config_path) = setup_test_env("http://127.0.0.1:1", "adaptive");
    let (_, stderr, success) = run_qah(&config_path, &["sync", "--start", "2021-13"]);
    assert!(!success);
    assert!(stderr.contains("YYYY-MM"), "stderr: {}", stderr);
}
