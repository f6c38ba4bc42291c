use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use limitwatch_core::{Navigator, PageEvent, Query, WatchState};
use limitwatch_local::redirect::{self, OpenNavigator, RecordingNavigator, FALLBACK_ENDPOINT};
use limitwatch_local::watch::{self, WatchController};
use limitwatch_local::{fetch, query, FsQueryStore, STORAGE_KEY};
use tokio::io::AsyncBufReadExt;
use tokio::sync::mpsc;
use tracing::warn;

#[derive(Parser, Debug)]
#[command(name = "limitwatch")]
#[command(about = "Search quota-limit watcher (check / watch / doctor)", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// One-shot page check: persist its query, detect the limit banner, report the redirect decision (json).
    Check(CheckCmd),
    /// Drive a watch session from newline-delimited page events on stdin (json report on trigger or EOF).
    Watch(WatchCmd),
    /// Diagnose configuration/launch issues (json; no secrets).
    Doctor(DoctorCmd),
    /// Print version info.
    Version(VersionCmd),
}

#[derive(clap::Args, Debug)]
struct CheckCmd {
    /// Page URL to fetch and inspect.
    #[arg(long, required_unless_present = "html_file", conflicts_with = "html_file")]
    url: Option<String>,
    /// Read the document from a file instead of fetching (offline checks).
    #[arg(long, requires = "page_url")]
    html_file: Option<std::path::PathBuf>,
    /// Page URL the document belongs to (defaults to the fetched final URL).
    #[arg(long)]
    page_url: Option<String>,
    /// Store root (default: platform data dir).
    #[arg(long)]
    store_dir: Option<std::path::PathBuf>,
    /// Fallback search endpoint.
    #[arg(long, default_value = FALLBACK_ENDPOINT)]
    fallback_endpoint: String,
    /// If true, actually open the fallback URL; the default is a dry run.
    #[arg(long, action = clap::ArgAction::Set, default_value_t = false)]
    navigate: bool,
    #[arg(long, default_value_t = 20_000)]
    timeout_ms: u64,
    #[arg(long, default_value_t = 5_000_000)]
    max_bytes: u64,
    /// Output format. Allowed: json, text
    #[arg(long, default_value = "json")]
    output: String,
}

#[derive(clap::Args, Debug)]
struct WatchCmd {
    /// Page URL of the load being observed.
    #[arg(long)]
    page_url: String,
    /// Store root (default: platform data dir).
    #[arg(long)]
    store_dir: Option<std::path::PathBuf>,
    /// Fallback search endpoint.
    #[arg(long, default_value = FALLBACK_ENDPOINT)]
    fallback_endpoint: String,
    /// If true, actually open the fallback URL; the default is a dry run.
    #[arg(long, action = clap::ArgAction::Set, default_value_t = false)]
    navigate: bool,
    /// Output format. Allowed: json, text
    #[arg(long, default_value = "json")]
    output: String,
}

#[derive(clap::Args, Debug)]
struct DoctorCmd {
    /// Store root (default: platform data dir).
    #[arg(long)]
    store_dir: Option<std::path::PathBuf>,
    /// Fallback search endpoint.
    #[arg(long, default_value = FALLBACK_ENDPOINT)]
    fallback_endpoint: String,
    /// Output format. Allowed: json, text
    #[arg(long, default_value = "json")]
    output: String,
}

#[derive(clap::Args, Debug)]
struct VersionCmd {
    /// Output format. Allowed: json, text
    #[arg(long, default_value = "json")]
    output: String,
}

fn default_store_dir() -> std::path::PathBuf {
    // Keep it local + user-owned; caller can override.
    dirs::data_local_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("limitwatch")
}

fn navigator_for(dry_run: bool, recorder: &RecordingNavigator) -> Box<dyn Navigator> {
    if dry_run {
        Box::new(recorder.clone())
    } else {
        Box::new(OpenNavigator)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Diagnostics go to stderr; stdout carries only the JSON payloads.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "limitwatch=info,limitwatch_local=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Check(args) => {
            let t0 = std::time::Instant::now();

            let (page_url, html, fetched) = if let Some(u) = &args.url {
                let doc = fetch::fetch_document(u, args.timeout_ms, args.max_bytes)
                    .await
                    .with_context(|| format!("fetch {u}"))?;
                let page_url = args
                    .page_url
                    .clone()
                    .unwrap_or_else(|| doc.final_url.clone());
                (page_url, doc.html.clone(), Some(doc))
            } else {
                let Some(path) = args.html_file.as_ref() else {
                    anyhow::bail!("either --url or --html-file is required");
                };
                let Some(page_url) = args.page_url.clone() else {
                    anyhow::bail!("--page-url is required with --html-file");
                };
                let html = std::fs::read_to_string(path)
                    .with_context(|| format!("read {}", path.display()))?;
                (page_url, html, None)
            };

            let store_dir = args.store_dir.clone().unwrap_or_else(default_store_dir);
            let store = FsQueryStore::new(store_dir, FsQueryStore::origin_for(&page_url));

            let dry_run = !args.navigate;
            let recorder = RecordingNavigator::default();
            let mut controller =
                WatchController::new(&page_url, store, navigator_for(dry_run, &recorder))
                    .with_fallback_endpoint(&args.fallback_endpoint);

            controller.observe_navigation();
            let outcome = controller.on_content_loaded(&html);

            let (state, trigger, target, navigated) = match &outcome {
                Some(o) => (o.state, o.trigger, o.target.clone(), o.navigated),
                None => (controller.state(), None, None, false),
            };

            let payload = serde_json::json!({
                "schema_version": 1,
                "kind": "check",
                "ok": true,
                "page_url": page_url,
                "fetched": fetched.map(|d| serde_json::json!({
                    "final_url": d.final_url,
                    "status": d.status,
                    "truncated": d.truncated,
                })),
                "limit_page": outcome.is_some(),
                "state": state,
                "trigger": trigger,
                "target": target,
                "navigated": !dry_run && navigated,
                "dry_run": dry_run,
                "elapsed_ms": t0.elapsed().as_millis(),
            });
            match args.output.to_ascii_lowercase().as_str() {
                "text" => {
                    println!(
                        "limit_page={} target={}",
                        payload["limit_page"].as_bool().unwrap_or(false),
                        payload["target"].as_str().unwrap_or("-"),
                    );
                }
                _ => println!("{payload}"),
            }
        }
        Commands::Watch(args) => {
            let t0 = std::time::Instant::now();

            let store_dir = args.store_dir.clone().unwrap_or_else(default_store_dir);
            let store = FsQueryStore::new(store_dir, FsQueryStore::origin_for(&args.page_url));

            let dry_run = !args.navigate;
            let recorder = RecordingNavigator::default();
            let controller =
                WatchController::new(&args.page_url, store, navigator_for(dry_run, &recorder))
                    .with_fallback_endpoint(&args.fallback_endpoint);

            let (tx, rx) = mpsc::channel::<PageEvent>(16);
            tokio::spawn(async move {
                let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();
                loop {
                    match lines.next_line().await {
                        Ok(Some(line)) => {
                            let s = line.trim();
                            if s.is_empty() {
                                continue;
                            }
                            match serde_json::from_str::<PageEvent>(s) {
                                Ok(event) => {
                                    if tx.send(event).await.is_err() {
                                        // Watch triggered; the observer is disconnected.
                                        break;
                                    }
                                }
                                Err(e) => warn!(error = %e, "skipping malformed event line"),
                            }
                        }
                        Ok(None) => break,
                        Err(e) => {
                            warn!(error = %e, "stdin read failed");
                            break;
                        }
                    }
                }
            });

            let outcome = watch::run(controller, rx).await;

            let payload = serde_json::json!({
                "schema_version": 1,
                "kind": "watch",
                "ok": true,
                "page_url": args.page_url,
                "state": outcome.state,
                "trigger": outcome.trigger,
                "target": outcome.target,
                "navigated": !dry_run && outcome.navigated,
                "dry_run": dry_run,
                "elapsed_ms": t0.elapsed().as_millis(),
            });
            match args.output.to_ascii_lowercase().as_str() {
                "text" => {
                    println!(
                        "state={} target={}",
                        if outcome.state == WatchState::Triggered {
                            "triggered"
                        } else {
                            "watching"
                        },
                        payload["target"].as_str().unwrap_or("-"),
                    );
                }
                _ => println!("{payload}"),
            }

            // Exit without waiting on the stdin reader: its blocking read
            // can outlive the session when the event source stays open, and
            // runtime shutdown would wait for it.
            use std::io::Write as _;
            let _ = std::io::stdout().flush();
            std::process::exit(0);
        }
        Commands::Doctor(args) => {
            let t0 = std::time::Instant::now();

            let store_dir = args.store_dir.clone().unwrap_or_else(default_store_dir);

            let mut checks: Vec<serde_json::Value> = Vec::new();

            // Check: store dir is creatable + writable.
            let store_ok = (|| -> anyhow::Result<()> {
                std::fs::create_dir_all(&store_dir)?;
                let probe = store_dir.join(format!(
                    "limitwatch-doctor-{}.probe",
                    std::time::SystemTime::now()
                        .duration_since(std::time::UNIX_EPOCH)
                        .unwrap_or_default()
                        .as_millis()
                ));
                std::fs::write(&probe, b"ok")?;
                let _ = std::fs::remove_file(&probe);
                Ok(())
            })()
            .is_ok();
            checks.push(serde_json::json!({
                "name": "store_dir_writable",
                "ok": store_ok,
                "message": if store_ok { "store dir is writable" } else { "store dir is not writable" },
                "hint": if store_ok { "" } else { "Pass --store-dir pointing at a writable directory." },
            }));

            // Check: fallback endpoint produces a usable redirect URL.
            let endpoint_ok = Query::new("probe")
                .map(|q| redirect::fallback_url(&args.fallback_endpoint, &q).is_ok())
                .unwrap_or(false);
            checks.push(serde_json::json!({
                "name": "fallback_endpoint_parses",
                "ok": endpoint_ok,
                "message": if endpoint_ok { "fallback endpoint is a valid URL" } else { "fallback endpoint does not parse" },
                "hint": if endpoint_ok { "" } else { "Pass --fallback-endpoint with an absolute http(s) URL." },
            }));

            let ok = store_ok && endpoint_ok;
            let payload = serde_json::json!({
                "schema_version": 1,
                "kind": "doctor",
                "ok": ok,
                "name": "limitwatch",
                "version": env!("CARGO_PKG_VERSION"),
                "platform": {
                    "os": std::env::consts::OS,
                    "arch": std::env::consts::ARCH,
                },
                "elapsed_ms": t0.elapsed().as_millis(),
                "configured": {
                    "store_dir": store_dir.to_string_lossy().to_string(),
                    "storage_key": STORAGE_KEY,
                    "fallback_endpoint": args.fallback_endpoint,
                    "target_origin": query::TARGET_ORIGIN,
                },
                "checks": checks,
            });
            match args.output.to_ascii_lowercase().as_str() {
                "text" => {
                    println!("limitwatch {} (ok={})", env!("CARGO_PKG_VERSION"), ok);
                    println!(
                        "store_dir: {}",
                        payload["configured"]["store_dir"].as_str().unwrap_or("")
                    );
                    println!(
                        "fallback_endpoint: {}",
                        payload["configured"]["fallback_endpoint"]
                            .as_str()
                            .unwrap_or("")
                    );
                    println!("checks:");
                    if let Some(arr) = payload["checks"].as_array() {
                        for c in arr {
                            let name = c["name"].as_str().unwrap_or("?");
                            let ok = c["ok"].as_bool().unwrap_or(false);
                            println!("- {}: {}", name, if ok { "ok" } else { "fail" });
                        }
                    }
                }
                _ => println!("{payload}"),
            }
        }
        Commands::Version(args) => {
            let v = serde_json::json!({
                "schema_version": 1,
                "kind": "version",
                "ok": true,
                "name": "limitwatch",
                "version": env!("CARGO_PKG_VERSION"),
            });
            match args.output.to_ascii_lowercase().as_str() {
                "text" => println!("limitwatch {}", env!("CARGO_PKG_VERSION")),
                _ => println!("{}", v),
            }
        }
    }

    Ok(())
}
