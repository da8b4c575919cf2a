//
// adapters/completion.rs
//
// Completion adapter: filters, ranks and labels engine completions
//

use serde::Serialize;

use super::module_names;
use crate::config::WorkerConfig;
use crate::coords::host_position_to_engine;
use crate::engine::{RawCompletionEntry, RawCompletionInfo};
use crate::env::Environment;

/// A completion item as the host editor consumes it
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionOption {
    pub label: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub commit_characters: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    pub boost: i32,
}

/// Options replacing the text from `from` up to the cursor
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionResult {
    pub from: usize,
    pub options: Vec<CompletionOption>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionEnvelope {
    pub is_global: bool,
    pub result: CompletionResult,
}

/// Filtering and fallback settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionConfig {
    pub rank_threshold: i32,
    pub excluded_kinds: Vec<String>,
    pub default_commit_characters: Vec<String>,
}

impl From<&WorkerConfig> for CompletionConfig {
    fn from(config: &WorkerConfig) -> Self {
        Self {
            rank_threshold: config.completion_rank_threshold,
            excluded_kinds: config.excluded_completion_kinds.clone(),
            default_commit_characters: config.default_commit_characters.clone(),
        }
    }
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self::from(&WorkerConfig::default())
    }
}

/// Completions at a host offset in the document.
///
/// Import paths short-circuit to module-name completion; everything else goes
/// through the engine.
pub fn complete(env: &Environment, offset: usize, config: &CompletionConfig) -> Option<CompletionEnvelope> {
    if let Some(envelope) = module_names::complete_import_path(env.files(), offset) {
        return Some(envelope);
    }

    let document = env.files().document();
    if offset > document.len_chars() {
        return None;
    }

    let info = env
        .session()
        .completions_at(env.document_path(), host_position_to_engine(offset))?;
    Some(translate(&info, word_start(env, offset), config))
}

/// Start of the identifier that ends at `offset`
fn word_start(env: &Environment, offset: usize) -> usize {
    let mut chars = env.files().document().chars_at(offset);
    let mut start = offset;
    while let Some(c) = chars.prev() {
        if c.is_alphanumeric() || c == '_' || c == '$' {
            start -= 1;
        } else {
            break;
        }
    }
    start
}

/// Numeric rank of an entry; unparseable ranks sort last
fn rank(entry: &RawCompletionEntry) -> Option<i32> {
    entry.sort_text.trim().parse().ok()
}

fn keep(entry: &RawCompletionEntry, config: &CompletionConfig) -> bool {
    if config.excluded_kinds.iter().any(|k| k == &entry.kind) {
        return false;
    }
    let ranked_in = rank(entry).is_some_and(|r| r < config.rank_threshold);
    let has_replacement = entry.replacement_span.is_some_and(|s| s.length > 0);
    ranked_in || has_replacement
}

/// Editor completion type for an engine element kind
fn option_kind(kind: &str) -> &'static str {
    match kind {
        "function" | "local function" => "function",
        "method" | "construct" | "call" => "method",
        "class" | "local class" => "class",
        "interface" | "type" | "type parameter" | "primitive type" | "alias" => "type",
        "enum" | "enum member" => "enum",
        "const" | "let" | "var" | "local var" | "parameter" => "variable",
        "property" | "getter" | "setter" | "accessor" => "property",
        "module" | "external module name" => "namespace",
        "keyword" => "keyword",
        _ => "text",
    }
}

/// Translate an engine completion result
pub fn translate(info: &RawCompletionInfo, from: usize, config: &CompletionConfig) -> CompletionEnvelope {
    let session_default = info
        .default_commit_characters
        .clone()
        .unwrap_or_else(|| config.default_commit_characters.clone());

    let mut options: Vec<CompletionOption> = info
        .entries
        .iter()
        .filter(|entry| keep(entry, config))
        .map(|entry| CompletionOption {
            label: entry.name.clone(),
            kind: option_kind(&entry.kind).to_string(),
            commit_characters: entry
                .commit_characters
                .clone()
                .unwrap_or_else(|| session_default.clone()),
            detail: entry.source.clone(),
            boost: -rank(entry).unwrap_or(config.rank_threshold),
        })
        .collect();

    options.sort_by(|a, b| b.boost.cmp(&a.boost).then_with(|| a.label.cmp(&b.label)));

    CompletionEnvelope {
        is_global: info.is_global_completion,
        result: CompletionResult { from, options },
    }
}
