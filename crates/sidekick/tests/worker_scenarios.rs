//! End-to-end scenarios for the code-intelligence worker.
//!
//! Every scenario runs against the bundled symbol-index engine with an
//! in-process fetcher, so nothing here touches the network. Debounce timing
//! runs on tokio's paused clock.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;

use sidekick::config::{BaselineDeclaration, WorkerConfig};
use sidekick::declaration_cache::{DeclarationCache, DiskDeclarationCache, MemoryDeclarationCache};
use sidekick::engine::SymbolIndexEngine;
use sidekick::env::{build_environment, EnvironmentDescriptor, Services};
use sidekick::error::{FetchError, WorkerError};
use sidekick::fetch::DeclarationFetcher;
use sidekick::loader::{DeclarationLoader, LoaderConfig};
use sidekick::patch::ChangeSet;
use sidekick::state::StateStore;
use sidekick::{spawn_worker, CodeWorker, InitRequest};

// ---------------------------------------------------------------------------
// Harness helpers
// ---------------------------------------------------------------------------

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Serves a small declaration file for every path
#[derive(Default)]
struct StaticFetcher {
    calls: AtomicUsize,
}

#[async_trait]
impl DeclarationFetcher for StaticFetcher {
    async fn fetch(&self, url_path: &str) -> Result<String, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if url_path.ends_with("package.json") {
            Ok("{ \"types\": \"index.d.ts\" }".to_string())
        } else {
            Ok("export declare function helper(): void;\n".to_string())
        }
    }
}

/// Answers every request with a server error
struct FailingFetcher;

#[async_trait]
impl DeclarationFetcher for FailingFetcher {
    async fn fetch(&self, url_path: &str) -> Result<String, FetchError> {
        Err(FetchError::Status(url_path.to_string(), 503))
    }
}

fn services_with(fetcher: Arc<dyn DeclarationFetcher>, cache: Arc<dyn DeclarationCache>) -> Services {
    Services {
        engine: Arc::new(SymbolIndexEngine),
        cache,
        fetcher,
    }
}

fn services() -> Services {
    services_with(
        Arc::new(StaticFetcher::default()),
        Arc::new(MemoryDeclarationCache::new()),
    )
}

fn request(lines: &[&str]) -> InitRequest {
    InitRequest {
        id: "scenario".to_string(),
        content: lines.iter().map(|l| l.to_string()).collect(),
        known_references: None,
        settings: None,
    }
}

fn with_packages(names: &[&str]) -> WorkerConfig {
    let mut config = WorkerConfig::default();
    for name in names {
        config.baseline_declarations.push(BaselineDeclaration {
            url_path: format!("{name}@1.0.0/index.d.ts"),
            virtual_path: format!("/node_modules/{name}/index.d.ts"),
        });
    }
    config
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

#[tokio::test]
async fn empty_document_offers_global_completions() {
    init_logging();
    let handle = spawn_worker(request(&[""]), services(), WorkerConfig::default()).await;

    let envelope = handle.get_completions_at_pos(0).await.unwrap().unwrap();
    assert!(envelope.is_global);
    assert_eq!(envelope.result.from, 0);
    assert!(envelope.result.options.iter().any(|o| o.label == "console"));
    handle.terminate();
}

#[tokio::test]
async fn import_path_offers_module_names() {
    init_logging();
    let text = "import { a } from \"r\"";
    let handle = spawn_worker(
        request(&[text]),
        services(),
        with_packages(&["rxjs", "error-reporter"]),
    )
    .await;

    let after_quote = "import { a } from \"".chars().count();
    let envelope = handle
        .get_completions_at_pos(after_quote)
        .await
        .unwrap()
        .unwrap();
    assert!(!envelope.is_global);
    assert_eq!(envelope.result.from, after_quote);
    assert!(envelope.result.options.iter().any(|o| o.label == "rxjs"));

    let after_r = after_quote + 1;
    let envelope = handle.get_completions_at_pos(after_r).await.unwrap().unwrap();
    let labels: Vec<_> = envelope.result.options.iter().map(|o| o.label.as_str()).collect();
    assert_eq!(labels, vec!["rxjs", "error-reporter"]);
    assert!(envelope.result.options[0].boost > envelope.result.options[1].boost);
    assert_eq!(envelope.result.from, after_quote);

    let names = handle.get_module_names().await.unwrap();
    assert_eq!(names, vec!["error-reporter", "lodash", "luxon", "rxjs"]);
    handle.terminate();
}

#[tokio::test(start_paused = true)]
async fn rapid_edits_coalesce_into_one_flush() {
    init_logging();
    let worker = CodeWorker::init(request(&[""]), services(), WorkerConfig::default()).await;

    let mut last = None;
    for len in 0..500 {
        let done = worker
            .update_file(ChangeSet::replace(len, len, len, "x").unwrap())
            .unwrap();
        last = Some(done);
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    assert_eq!(worker.flush_count(), 0);

    last.unwrap().await;
    assert_eq!(worker.flush_count(), 1);
    assert_eq!(worker.document_text().await, "x".repeat(500));
    assert!(!worker.has_pending());
}

#[tokio::test]
async fn failed_fetches_degrade_without_failing_init() {
    init_logging();
    let handle = spawn_worker(
        request(&["const a = ;"]),
        services_with(Arc::new(FailingFetcher), Arc::new(MemoryDeclarationCache::new())),
        WorkerConfig::default(),
    )
    .await;

    let diagnostics = handle.get_diagnostics().await.unwrap();
    assert!(!diagnostics.is_empty());
    assert!(handle.state().ready);
    assert!(handle.get_module_names().await.unwrap().is_empty());
    handle.terminate();
}

#[tokio::test]
async fn refresh_twice_loads_nothing_new() {
    init_logging();
    let services = services();
    let config = WorkerConfig::default();
    let env = build_environment(
        &services,
        &EnvironmentDescriptor::for_config(&config),
        &[],
        "/doc.ts",
        "const a = $(\"Read Sheet\").first();\nconst b = $(\"Read Sheet\").last();",
    )
    .await;
    let env = RwLock::new(env);
    let state = Arc::new(StateStore::new());
    let loader = DeclarationLoader::new(
        LoaderConfig::new(&config, None),
        services.cache.clone(),
        services.fetcher.clone(),
        state.clone(),
    );

    loader.refresh(&env).await;
    let first = state.get_state().loaded_declarations;
    loader.refresh(&env).await;
    let second = state.get_state().loaded_declarations;

    assert_eq!(first.len(), 1);
    assert_eq!(first, second);
}

#[tokio::test(start_paused = true)]
async fn query_before_flush_sees_previous_document() {
    init_logging();
    let handle = spawn_worker(request(&["const a = 1;"]), services(), WorkerConfig::default()).await;

    handle
        .update_file(ChangeSet::replace(12, 6, 7, "b").unwrap())
        .unwrap();
    let before = handle.get_hover_tooltip(6).await.unwrap().unwrap();
    assert_eq!(before.info.display, "const a = 1");

    handle
        .update_file_and_wait(ChangeSet::replace(12, 10, 11, "2").unwrap())
        .await
        .unwrap();
    let after = handle.get_hover_tooltip(6).await.unwrap().unwrap();
    assert_eq!(after.info.display, "const b = 2");
    handle.terminate();
}

#[tokio::test]
async fn declarations_survive_across_sessions() {
    init_logging();
    let dir = tempfile::tempdir().unwrap();
    let fetcher = Arc::new(StaticFetcher::default());

    let cache: Arc<dyn DeclarationCache> = Arc::new(DiskDeclarationCache::open(dir.path()).unwrap());
    let first = spawn_worker(
        request(&[""]),
        services_with(fetcher.clone(), cache),
        WorkerConfig::default(),
    )
    .await;
    assert!(fetcher.calls.load(Ordering::SeqCst) > 0);
    let names = first.get_module_names().await.unwrap();
    first.terminate();

    let cache: Arc<dyn DeclarationCache> = Arc::new(DiskDeclarationCache::open(dir.path()).unwrap());
    let second = spawn_worker(
        request(&[""]),
        services_with(Arc::new(FailingFetcher), cache),
        WorkerConfig::default(),
    )
    .await;
    assert_eq!(second.get_module_names().await.unwrap(), names);
    assert_eq!(names, vec!["lodash", "luxon"]);
    second.terminate();
}

#[tokio::test]
async fn terminated_worker_reports_closed() {
    init_logging();
    let handle = spawn_worker(request(&["const a = 1;"]), services(), WorkerConfig::default()).await;
    handle.terminate();
    tokio::task::yield_now().await;

    assert!(matches!(handle.get_diagnostics().await, Err(WorkerError::Closed)));
    assert!(matches!(handle.update_node_types().await, Err(WorkerError::Closed)));
}
