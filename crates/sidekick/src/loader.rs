//
// loader.rs
//
// Lazy declaration loading: per-node type fragments synthesized from the
// references found in the document, and one third-party package fetched on
// first use
//

use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use heck::{ToSnakeCase, ToUpperCamelCase};
use tokio::sync::RwLock;
use tree_sitter::Node;

use crate::config::{ThirdPartyPackage, WorkerConfig};
use crate::declaration_cache::DeclarationCache;
use crate::env::Environment;
use crate::fetch::DeclarationFetcher;
use crate::parser_pool::{self, node_text};
use crate::perf::{self, Phase, PhaseTimer};
use crate::state::{StateStore, StateUpdate};

/// What the loader recognises and fetches
#[derive(Debug, Clone)]
pub struct LoaderConfig {
    /// Callee whose first string argument names a node
    pub reference_function: String,
    /// Accepted node names; `None` accepts every name
    pub known_references: Option<HashSet<String>>,
    pub package: ThirdPartyPackage,
}

impl LoaderConfig {
    pub fn new(config: &WorkerConfig, known_references: Option<Vec<String>>) -> Self {
        Self {
            reference_function: config.reference_function.clone(),
            known_references: known_references.map(|names| names.into_iter().collect()),
            package: config.third_party_package.clone(),
        }
    }
}

/// Names passed as the first string-literal argument to `reference_function`,
/// deduplicated in order of first appearance
pub fn scan_references(text: &str, reference_function: &str) -> Vec<String> {
    let Some(tree) = parser_pool::parse(text) else {
        return Vec::new();
    };
    let mut names = Vec::new();
    collect_references(tree.root_node(), text, reference_function, &mut names);

    let mut seen = HashSet::new();
    names.retain(|name| seen.insert(name.clone()));
    log::trace!("Found {} node references", names.len());
    names
}

fn collect_references(node: Node<'_>, text: &str, callee: &str, out: &mut Vec<String>) {
    if node.kind() == "call_expression" {
        let matches_callee = node
            .child_by_field_name("function")
            .is_some_and(|f| f.kind() == "identifier" && node_text(f, text) == callee);
        if matches_callee {
            if let Some(name) = node
                .child_by_field_name("arguments")
                .and_then(|args| args.named_child(0))
                .and_then(|arg| string_literal_value(arg, text))
            {
                out.push(name);
            }
        }
    }

    let mut cursor = node.walk();
    let children: Vec<Node<'_>> = node.named_children(&mut cursor).collect();
    for child in children {
        collect_references(child, text, callee, out);
    }
}

fn string_literal_value(node: Node<'_>, text: &str) -> Option<String> {
    match node.kind() {
        "string" => {
            let raw = node_text(node, text);
            let inner = raw.get(1..raw.len().saturating_sub(1))?;
            Some(inner.to_string())
        }
        "template_string" => {
            let mut cursor = node.walk();
            let has_substitution = node
                .named_children(&mut cursor)
                .any(|c| c.kind() == "template_substitution");
            if has_substitution {
                return None;
            }
            let raw = node_text(node, text);
            raw.get(1..raw.len().saturating_sub(1)).map(str::to_string)
        }
        _ => None,
    }
}

/// Virtual path of the fragment for `name`
pub fn declaration_path(name: &str) -> String {
    let snake = name.to_snake_case();
    let snake = if snake.is_empty() { "node".to_string() } else { snake };
    format!("/types/nodes/{snake}.d.ts")
}

/// Type-name stem for `name`, always a valid identifier start
fn type_stem(name: &str) -> String {
    let pascal = name.to_upper_camel_case();
    match pascal.chars().next() {
        Some(c) if !c.is_ascii_digit() => pascal,
        _ => format!("Node{pascal}"),
    }
}

/// Ambient fragment describing the node `name`
pub fn synthesize_fragment(name: &str) -> String {
    let stem = type_stem(name);
    let key = serde_json::Value::String(name.to_string()).to_string();
    format!(
        "declare namespace NodeTypes {{\n    \
         type {stem}Json = Record<string, any>;\n    \
         type {stem}Binary = Record<string, BinaryFile>;\n    \
         type {stem}Params = Record<string, any>;\n    \
         type {stem}Context = Record<string, any>;\n\
         }}\n\n\
         interface NodeReferences {{\n    \
         {key}: NodeTypes.{stem}Json;\n\
         }}\n"
    )
}

/// Loads declaration fragments into the environment as the document needs them
pub struct DeclarationLoader {
    config: LoaderConfig,
    cache: Arc<dyn DeclarationCache>,
    fetcher: Arc<dyn DeclarationFetcher>,
    state: Arc<StateStore>,
    package_attempted: AtomicBool,
}

impl DeclarationLoader {
    pub fn new(
        config: LoaderConfig,
        cache: Arc<dyn DeclarationCache>,
        fetcher: Arc<dyn DeclarationFetcher>,
        state: Arc<StateStore>,
    ) -> Self {
        Self {
            config,
            cache,
            fetcher,
            state,
            package_attempted: AtomicBool::new(false),
        }
    }

    fn accepts(&self, name: &str) -> bool {
        self.config
            .known_references
            .as_ref()
            .map_or(true, |known| known.contains(name))
    }

    /// Load fragments for every newly referenced node
    pub async fn refresh(&self, env: &RwLock<Environment>) {
        let _timer = PhaseTimer::start(Phase::LoaderRefresh);

        self.ensure_package(env).await;

        let text = env.read().await.files().document_text();
        let fresh: Vec<String> = scan_references(&text, &self.config.reference_function)
            .into_iter()
            .filter(|name| self.accepts(name) && !self.state.is_loaded(name))
            .collect();
        if fresh.is_empty() {
            return;
        }

        let mut env = env.write().await;
        for name in fresh {
            let fragment = synthesize_fragment(&name);
            env.create_or_update_file(&declaration_path(&name), &fragment);
            log::trace!("Loaded declarations for node {:?}", name);
            self.state.set_state(StateUpdate::Declaration {
                identifier: name,
                fragment,
            });
        }
    }

    /// Re-synthesize every loaded fragment
    pub async fn reload_all(&self, env: &RwLock<Environment>) {
        let identifiers = self.state.loaded_identifiers();
        let mut env = env.write().await;
        for name in identifiers {
            let fragment = synthesize_fragment(&name);
            env.create_or_update_file(&declaration_path(&name), &fragment);
            self.state.set_state(StateUpdate::Declaration {
                identifier: name,
                fragment,
            });
        }
    }

    /// Load the third-party package once per loader, from the cache when its
    /// marker is present and from the network otherwise
    pub async fn ensure_package(&self, env: &RwLock<Environment>) {
        if self.package_attempted.swap(true, Ordering::SeqCst) {
            return;
        }

        let package = &self.config.package;
        let files = if self.cache.get_item(&package.marker_path()).await.is_some() {
            let cached = self.cache.get_all_with_prefix(&package.virtual_prefix()).await;
            perf::increment_declarations_from_cache(cached.len());
            cached
        } else {
            match self.fetch_package().await {
                Some(files) => files,
                None => return,
            }
        };

        let mut env = env.write().await;
        for (path, content) in &files {
            env.create_or_update_file(path, content);
        }
        log::info!(
            "Loaded {} declaration files for {}@{}",
            files.len(),
            package.name,
            package.version
        );
    }

    async fn fetch_package(&self) -> Option<BTreeMap<String, String>> {
        let package = &self.config.package;
        let (marker, rest): (Vec<&String>, Vec<&String>) = package
            .files
            .iter()
            .partition(|f| f.as_str() == ThirdPartyPackage::MARKER_FILE);

        let mut fetched = Vec::new();
        for file in rest.into_iter().chain(marker) {
            match self.fetcher.fetch(&package.url_path(file)).await {
                Ok(content) => {
                    perf::increment_declarations_fetched();
                    fetched.push((format!("{}{}", package.virtual_prefix(), file), content));
                }
                Err(e) => {
                    perf::increment_fetch_failures();
                    log::warn!(
                        "Failed to fetch declarations for {} ({}); continuing without them",
                        package.name,
                        e
                    );
                    return None;
                }
            }
        }

        // Marker last, so an interrupted write is refetched next session
        for (path, content) in &fetched {
            if let Err(e) = self.cache.set_item(path, content).await {
                log::warn!("Failed to cache {}: {}", path, e);
            }
        }
        Some(fetched.into_iter().collect())
    }
}
