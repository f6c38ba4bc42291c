use std::io::Write;
use std::process::{Command, Stdio};

const BANNER_DOCUMENT: &str = r#"{"event":"content_loaded","html":"<html><body><div class=\"shl_info_title\">Wow, you do love Kagi</div></body></html>"}"#;
const NORMAL_DOCUMENT: &str = r#"{"event":"content_loaded","html":"<html><body><div class=\"results\">ten blue links</div></body></html>"}"#;
const BANNER_MUTATION: &str = r#"{"event":"nodes_added","nodes":[{"kind":"text","html":"loading"},{"kind":"element","html":"<div class=\"shl_desc\">Searches will be paused until your subscription renews.</div>"}]}"#;
const NOISE_MUTATION: &str = r#"{"event":"nodes_added","nodes":[{"kind":"element","html":"<div class=\"more-results\"></div>"}]}"#;

fn run_watch(page_url: &str, store_dir: &std::path::Path, stdin_lines: &[&str]) -> serde_json::Value {
    let bin = assert_cmd::cargo::cargo_bin!("limitwatch");
    let mut child = Command::new(bin)
        .args(["watch", "--page-url", page_url, "--store-dir"])
        .arg(store_dir)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("spawn limitwatch watch");

    {
        let mut stdin = child.stdin.take().expect("stdin handle");
        for line in stdin_lines {
            // The child may have triggered and exited already; a broken pipe
            // here is part of the contract, not a test failure.
            let _ = writeln!(stdin, "{line}");
        }
        // Dropping stdin closes the event source (page unload).
    }

    let out = child.wait_with_output().expect("wait for watch");
    assert!(
        out.status.success(),
        "watch failed: {}",
        String::from_utf8_lossy(&out.stderr)
    );
    serde_json::from_str(&String::from_utf8_lossy(&out.stdout)).expect("parse watch json")
}

#[test]
fn watch_redirects_when_document_already_carries_the_banner() {
    let tmp = tempfile::tempdir().unwrap();

    let v = run_watch(
        "https://kagi.com/?q=rust",
        tmp.path(),
        &[BANNER_DOCUMENT, BANNER_MUTATION],
    );

    assert_eq!(v["schema_version"].as_u64(), Some(1));
    assert_eq!(v["kind"].as_str(), Some("watch"));
    assert_eq!(v["state"].as_str(), Some("triggered"));
    assert_eq!(v["trigger"].as_str(), Some("content_loaded"));
    assert_eq!(
        v["target"].as_str(),
        Some("https://search.brave.com/search?q=rust")
    );
    assert_eq!(v["dry_run"].as_bool(), Some(true));
    assert_eq!(v["navigated"].as_bool(), Some(false));
}

#[test]
fn watch_uses_stored_query_when_banner_arrives_by_mutation() {
    let tmp = tempfile::tempdir().unwrap();

    // Prior visit: normal results page; its query is persisted at start.
    let v = run_watch("https://kagi.com/?q=rust", tmp.path(), &[NORMAL_DOCUMENT]);
    assert_eq!(v["state"].as_str(), Some("watching"));
    assert!(v["target"].is_null());

    // New load without a query; the banner is injected later.
    let v = run_watch(
        "https://kagi.com/",
        tmp.path(),
        &[NORMAL_DOCUMENT, NOISE_MUTATION, BANNER_MUTATION],
    );
    assert_eq!(v["state"].as_str(), Some("triggered"));
    assert_eq!(v["trigger"].as_str(), Some("mutation"));
    assert_eq!(
        v["target"].as_str(),
        Some("https://search.brave.com/search?q=rust")
    );
}

#[test]
fn watch_stays_watching_when_no_banner_ever_appears() {
    let tmp = tempfile::tempdir().unwrap();

    let v = run_watch(
        "https://kagi.com/?q=test",
        tmp.path(),
        &[NORMAL_DOCUMENT, NOISE_MUTATION],
    );

    assert_eq!(v["state"].as_str(), Some("watching"));
    assert!(v["trigger"].is_null());
    assert!(v["target"].is_null());
    assert_eq!(v["navigated"].as_bool(), Some(false));
}

#[test]
fn watch_transitions_without_redirect_when_no_query_is_resolvable() {
    let tmp = tempfile::tempdir().unwrap();

    // Fresh store, no query in the URL: detection still terminates the
    // session, but there is nothing to carry to the fallback.
    let v = run_watch("https://kagi.com/", tmp.path(), &[BANNER_DOCUMENT]);

    assert_eq!(v["state"].as_str(), Some("triggered"));
    assert!(v["target"].is_null());
    assert_eq!(v["navigated"].as_bool(), Some(false));
}

#[test]
fn watch_skips_malformed_event_lines() {
    let tmp = tempfile::tempdir().unwrap();

    let v = run_watch(
        "https://kagi.com/?q=rust",
        tmp.path(),
        &["this is not json", BANNER_DOCUMENT],
    );

    assert_eq!(v["state"].as_str(), Some("triggered"));
    assert_eq!(
        v["target"].as_str(),
        Some("https://search.brave.com/search?q=rust")
    );
}
