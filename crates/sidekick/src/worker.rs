//
// worker.rs
//
// The in-worker object: one document, one environment, every host operation
//

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::{watch, RwLock};
use tokio_util::sync::CancellationToken;

use crate::adapters::{completion, diagnostics, hover, module_names};
use crate::adapters::{CompletionConfig, CompletionEnvelope, Diagnostic, HoverInfo};
use crate::buffer::{ChangeBuffer, DebounceConfig, FlushTarget};
use crate::config::{apply_settings, WorkerConfig};
use crate::declaration_cache::DiskDeclarationCache;
use crate::engine::SymbolIndexEngine;
use crate::env::{build_environment, Environment, EnvironmentDescriptor, Services};
use crate::error::WorkerError;
use crate::fetch::HttpFetcher;
use crate::loader::{DeclarationLoader, LoaderConfig};
use crate::patch::ChangeSet;
use crate::perf::{self, Phase, PhaseTimer};
use crate::state::{StateStore, StateUpdate, WorkerState};

/// Payload the host sends to instantiate a worker
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitRequest {
    /// Seeds the virtual document's file name
    pub id: String,
    /// Initial buffer, one entry per line
    pub content: Vec<String>,
    /// Node names the loader accepts; absent accepts every name
    #[serde(default)]
    pub known_references: Option<Vec<String>>,
    /// Settings object applied over the host's configuration
    #[serde(default)]
    pub settings: Option<serde_json::Value>,
}

impl InitRequest {
    pub fn document_path(&self) -> String {
        format!("/{}.ts", self.id)
    }

    pub fn initial_content(&self) -> String {
        self.content.join("\n")
    }
}

/// Production collaborators: the bundled engine, the durable cache in the temp
/// directory and the CDN fetcher from `config`
pub fn default_services(config: &WorkerConfig) -> anyhow::Result<Services> {
    let fetcher = HttpFetcher::new(
        &config.cdn_base_url,
        Duration::from_millis(config.fetch_timeout_ms),
    )?;
    Ok(Services {
        engine: Arc::new(SymbolIndexEngine),
        cache: Arc::new(DiskDeclarationCache::open_default("declarations")?),
        fetcher: Arc::new(fetcher),
    })
}

/// State shared by the worker handle and the flush path
struct WorkerCore {
    config: WorkerConfig,
    completion: CompletionConfig,
    env: RwLock<Environment>,
    state: Arc<StateStore>,
    loader: DeclarationLoader,
}

impl WorkerCore {
    async fn wait_until_ready(&self) {
        let interval = Duration::from_millis(self.config.ready_poll_interval_ms);
        self.state
            .wait_until_ready(interval, self.config.ready_poll_attempts)
            .await;
    }
}

#[async_trait]
impl FlushTarget for WorkerCore {
    async fn flush(&self, patch: ChangeSet) {
        let _timer = PhaseTimer::start(Phase::Flush);
        self.state.set_ready(false);

        {
            let mut env = self.env.write().await;
            if let Err(e) = env.apply_patch(&patch) {
                log::error!("Dropping patch that does not fit the document: {}", e);
            }
        }

        self.loader.refresh(&self.env).await;
        self.state.set_ready(true);
    }
}

/// Code-intelligence worker for a single document.
///
/// Cloning yields another handle to the same worker.
#[derive(Clone)]
pub struct CodeWorker {
    core: Arc<WorkerCore>,
    buffer: ChangeBuffer,
}

impl CodeWorker {
    /// Build the environment, load the declarations the initial document
    /// references and mark the worker ready. Never fails: setup problems only
    /// degrade the results.
    pub async fn init(request: InitRequest, services: Services, mut config: WorkerConfig) -> Self {
        if let Some(settings) = &request.settings {
            apply_settings(&mut config, settings);
        }
        let descriptor = EnvironmentDescriptor::for_config(&config);
        let env = build_environment(
            &services,
            &descriptor,
            &config.baseline_declarations,
            &request.document_path(),
            &request.initial_content(),
        )
        .await;

        let state = Arc::new(StateStore::new());
        let loader = DeclarationLoader::new(
            LoaderConfig::new(&config, request.known_references.clone()),
            services.cache.clone(),
            services.fetcher.clone(),
            state.clone(),
        );

        let core = Arc::new(WorkerCore {
            completion: CompletionConfig::from(&config),
            config,
            env: RwLock::new(env),
            state,
            loader,
        });

        core.loader.refresh(&core.env).await;
        core.state.set_ready(true);

        let buffer = ChangeBuffer::new(DebounceConfig::from(&core.config), core.clone());
        log::info!("Worker ready for {}", request.document_path());
        perf::log_summary();

        Self { core, buffer }
    }

    /// Fold an edit into the pending patch.
    ///
    /// Fails immediately when `changes` does not compose with the edits
    /// already pending; otherwise the returned future resolves once the edit
    /// has been flushed.
    pub fn update_file(&self, changes: ChangeSet) -> Result<impl Future<Output = ()> + Send + 'static, WorkerError> {
        Ok(self.buffer.submit(changes)?)
    }

    pub async fn get_completions_at_pos(&self, offset: usize) -> Option<CompletionEnvelope> {
        self.core.wait_until_ready().await;
        let env = self.core.env.read().await;
        completion::complete(&env, offset, &self.core.completion)
    }

    pub async fn get_diagnostics(&self) -> Vec<Diagnostic> {
        self.core.wait_until_ready().await;
        let env = self.core.env.read().await;
        diagnostics::diagnostics(&env)
    }

    pub async fn get_hover_tooltip(&self, offset: usize) -> Option<HoverInfo> {
        self.core.wait_until_ready().await;
        let env = self.core.env.read().await;
        hover::hover(&env, offset)
    }

    pub async fn get_module_names(&self) -> Vec<String> {
        self.core.wait_until_ready().await;
        let env = self.core.env.read().await;
        module_names::module_names(env.files())
    }

    /// Re-synthesize every loaded node declaration
    pub async fn update_node_types(&self) {
        self.core.loader.reload_all(&self.core.env).await;
    }

    pub fn state(&self) -> WorkerState {
        self.core.state.get_state()
    }

    pub fn subscribe(&self) -> watch::Receiver<WorkerState> {
        self.core.state.subscribe()
    }

    /// Register a callback run synchronously after every state change
    pub fn add_state_listener<F>(&self, listener: F)
    where
        F: Fn(&WorkerState, &StateUpdate) + Send + Sync + 'static,
    {
        self.core.state.add_listener(listener);
    }

    /// Document text as the environment currently holds it
    pub async fn document_text(&self) -> String {
        self.core.env.read().await.files().document_text()
    }

    pub fn has_pending(&self) -> bool {
        self.buffer.has_pending()
    }

    /// Number of flushes that applied a patch
    pub fn flush_count(&self) -> u64 {
        self.buffer.flush_count()
    }

    /// Flush pending edits without waiting for the quiet period
    pub async fn flush_now(&self) {
        self.buffer.flush_now().await;
    }

    /// Cancel scheduled flushes and release everyone waiting on one
    pub fn shutdown(&self) {
        self.buffer.shutdown();
    }

    /// Token cancelled by [`CodeWorker::shutdown`]
    pub fn shutdown_token(&self) -> CancellationToken {
        self.buffer.shutdown_token()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::declaration_cache::MemoryDeclarationCache;
    use crate::fetch::OfflineFetcher;

    fn services() -> Services {
        Services {
            engine: Arc::new(SymbolIndexEngine),
            cache: Arc::new(MemoryDeclarationCache::new()),
            fetcher: Arc::new(OfflineFetcher),
        }
    }

    fn request(lines: &[&str]) -> InitRequest {
        InitRequest {
            id: "code".to_string(),
            content: lines.iter().map(|l| l.to_string()).collect(),
            known_references: None,
            settings: None,
        }
    }

    #[test]
    fn test_init_request_from_json() {
        let request: InitRequest = serde_json::from_value(serde_json::json!({
            "id": "abc",
            "content": ["const a = 1;", "a"],
            "knownReferences": ["Fetch Orders"]
        }))
        .unwrap();
        assert_eq!(request.document_path(), "/abc.ts");
        assert_eq!(request.initial_content(), "const a = 1;\na");
        assert_eq!(request.known_references, Some(vec!["Fetch Orders".to_string()]));

        let minimal: InitRequest =
            serde_json::from_value(serde_json::json!({ "id": "x", "content": [""] })).unwrap();
        assert!(minimal.known_references.is_none());
        assert!(minimal.settings.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_init_applies_request_settings() {
        let request: InitRequest = serde_json::from_value(serde_json::json!({
            "id": "tuned",
            "content": [""],
            "settings": { "debounce": { "minDelayMs": 5, "maxDelayMs": 5 } }
        }))
        .unwrap();
        let worker = CodeWorker::init(request, services(), WorkerConfig::default()).await;

        let started = tokio::time::Instant::now();
        worker
            .update_file(ChangeSet::replace(0, 0, 0, &"x".repeat(2000)).unwrap())
            .unwrap()
            .await;

        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(5));
        assert!(elapsed < Duration::from_millis(50));
        assert_eq!(worker.flush_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_flush_is_timed_as_a_phase() {
        let before = perf::phase_stats(Phase::Flush).count;
        let worker = CodeWorker::init(request(&[""]), services(), WorkerConfig::default()).await;
        worker
            .update_file(ChangeSet::replace(0, 0, 0, "a").unwrap())
            .unwrap()
            .await;

        assert!(perf::phase_stats(Phase::Flush).count > before);
        assert!(perf::phase_stats(Phase::EnvironmentBuild).count >= 1);
    }

    #[tokio::test]
    async fn test_init_marks_ready_and_loads_initial_references() {
        let worker = CodeWorker::init(
            request(&["const rows = $(\"Fetch Orders\").all();"]),
            services(),
            WorkerConfig::default(),
        )
        .await;

        let state = worker.state();
        assert!(state.ready);
        assert_eq!(
            state.loaded_declarations.keys().collect::<Vec<_>>(),
            vec!["Fetch Orders"]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_edit_is_applied_after_flush() {
        let worker = CodeWorker::init(request(&["const a = 1;"]), services(), WorkerConfig::default()).await;

        let done = worker
            .update_file(ChangeSet::replace(12, 12, 12, "\nconst b = a;").unwrap())
            .unwrap();
        assert!(worker.has_pending());
        done.await;

        assert_eq!(worker.document_text().await, "const a = 1;\nconst b = a;");
        assert_eq!(worker.flush_count(), 1);
        assert!(worker.state().ready);
    }

    #[tokio::test(start_paused = true)]
    async fn test_edit_triggers_loader() {
        let worker = CodeWorker::init(request(&[""]), services(), WorkerConfig::default()).await;
        worker
            .update_file(ChangeSet::replace(0, 0, 0, "$('Send Mail')").unwrap())
            .unwrap()
            .await;

        assert!(worker.state().loaded_declarations.contains_key("Send Mail"));
    }

    #[tokio::test]
    async fn test_incompatible_edit_is_rejected_up_front() {
        let worker = CodeWorker::init(request(&["abc"]), services(), WorkerConfig::default()).await;
        let _pending = worker.update_file(ChangeSet::replace(3, 0, 0, "x").unwrap()).unwrap();

        let result = worker.update_file(ChangeSet::replace(3, 0, 0, "y").unwrap());
        assert!(matches!(result, Err(WorkerError::Patch(_))));
        worker.shutdown();
    }

    #[tokio::test(start_paused = true)]
    async fn test_patch_for_wrong_document_leaves_worker_usable() {
        let worker = CodeWorker::init(request(&["abc"]), services(), WorkerConfig::default()).await;
        worker
            .update_file(ChangeSet::replace(10, 0, 0, "x").unwrap())
            .unwrap()
            .await;

        assert_eq!(worker.document_text().await, "abc");
        assert!(worker.state().ready);
        assert!(worker.get_completions_at_pos(0).await.is_some());
    }

    #[tokio::test]
    async fn test_queries_answer_from_environment() {
        let worker = CodeWorker::init(
            request(&["const total = 1;", "tot"]),
            services(),
            WorkerConfig::default(),
        )
        .await;

        let envelope = worker.get_completions_at_pos(20).await.unwrap();
        assert!(envelope.result.options.iter().any(|o| o.label == "total"));
        assert_eq!(envelope.result.from, 17);

        let hover = worker.get_hover_tooltip(7).await.unwrap();
        assert_eq!((hover.start, hover.end), (6, 11));

        assert!(worker.get_diagnostics().await.is_empty());
    }

    #[tokio::test]
    async fn test_update_node_types_keeps_loaded_set() {
        let worker = CodeWorker::init(request(&["$(\"A\"); $(\"B\");"]), services(), WorkerConfig::default()).await;
        let before = worker.state().loaded_declarations;

        worker.update_node_types().await;
        assert_eq!(worker.state().loaded_declarations, before);
    }

    #[tokio::test]
    async fn test_module_names_include_cached_package() {
        let cache = Arc::new(MemoryDeclarationCache::new());
        let package = WorkerConfig::default().third_party_package;
        let mut files = BTreeMap::new();
        files.insert(package.marker_path(), "{}".to_string());
        files.insert(format!("{}index.d.ts", package.virtual_prefix()), String::new());
        for (path, content) in &files {
            crate::declaration_cache::DeclarationCache::set_item(cache.as_ref(), path, content)
                .await
                .unwrap();
        }

        let worker = CodeWorker::init(
            request(&[""]),
            Services {
                cache,
                ..services()
            },
            WorkerConfig::default(),
        )
        .await;
        assert!(worker.get_module_names().await.contains(&"luxon".to_string()));
    }
}
