//
// engine/mod.rs
//
// Interface to the source-analysis engine the worker drives
//
// The worker never type-checks anything itself. It hands a virtual file set
// to an `AnalysisEngine`, receives an `AnalysisSession`, keeps that session's
// view of the files in sync, and translates the raw results it returns.
//

pub mod lib_stubs;
pub mod symbols;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::config::LibTarget;
use crate::error::EngineError;

pub use symbols::SymbolIndexEngine;

/// A span in engine coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TextSpan {
    pub start: usize,
    pub length: usize,
}

impl TextSpan {
    pub fn new(start: usize, length: usize) -> Self {
        Self { start, length }
    }

    pub fn end(&self) -> usize {
        self.start + self.length
    }
}

/// One completion candidate as the engine reports it
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RawCompletionEntry {
    pub name: String,
    /// Engine element kind (`"const"`, `"function"`, `"keyword"`, `"warning"`, ...)
    pub kind: String,
    /// Comma separated modifiers (`"declare"`, `"export"`, ...)
    pub kind_modifiers: String,
    /// Numeric ordering rank encoded as text; lower sorts first
    pub sort_text: String,
    /// Span the engine wants replaced instead of the default word range
    pub replacement_span: Option<TextSpan>,
    pub commit_characters: Option<Vec<String>>,
    /// Module the entry would be imported from
    pub source: Option<String>,
}

/// Result of a completion query
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RawCompletionInfo {
    pub is_global_completion: bool,
    pub is_member_completion: bool,
    pub entries: Vec<RawCompletionEntry>,
    pub default_commit_characters: Option<Vec<String>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiagnosticCategory {
    Error,
    Warning,
    Suggestion,
    Message,
}

/// A diagnostic as the engine reports it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawDiagnostic {
    pub file: Option<String>,
    pub start: Option<usize>,
    pub length: Option<usize>,
    pub message: String,
    pub category: DiagnosticCategory,
    pub code: u32,
}

/// Hover information as the engine reports it
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RawQuickInfo {
    pub kind: String,
    pub kind_modifiers: String,
    pub text_span: TextSpan,
    pub display: String,
    pub documentation: String,
}

/// Options passed to a new session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOptions {
    pub target: LibTarget,
    pub current_directory: String,
    /// Files the engine should treat as program roots
    pub root_files: Vec<String>,
}

/// Module specifier that resolves to a file under `/node_modules/`.
///
/// `@types/{name}` maps to `name` and DefinitelyTyped's `@types/{scope}__{name}`
/// to `@{scope}/{name}`. Returns `None` for paths outside `/node_modules/` and
/// for paths that name a package directory without a file in it.
pub fn package_name(path: &str) -> Option<String> {
    let rest = path.strip_prefix("/node_modules/")?;
    let mut parts = rest.split('/');
    let first = parts.next().filter(|s| !s.is_empty())?;

    let name = if first == "@types" {
        let typed = parts.next().filter(|s| !s.is_empty())?;
        match typed.split_once("__") {
            Some((scope, name)) => format!("@{scope}/{name}"),
            None => typed.to_string(),
        }
    } else if first.starts_with('@') {
        let second = parts.next().filter(|s| !s.is_empty())?;
        format!("{first}/{second}")
    } else {
        first.to_string()
    };

    parts.next().filter(|s| !s.is_empty())?;
    Some(name)
}

/// Factory for analysis sessions
pub trait AnalysisEngine: Send + Sync {
    /// Baseline standard-library declaration files for `target`, keyed by virtual path
    fn lib_files(&self, target: LibTarget) -> BTreeMap<String, String>;

    /// Create a session over the given files
    fn create_session(
        &self,
        files: &BTreeMap<String, String>,
        options: &SessionOptions,
    ) -> Box<dyn AnalysisSession>;
}

/// A live analysis session over a virtual file set.
///
/// Offsets are engine coordinates; callers convert through [`crate::coords`].
pub trait AnalysisSession: Send + Sync {
    /// Create or replace a file
    fn set_file(&mut self, path: &str, content: &str);

    /// Replace `from..to` in an existing file
    fn edit_file(&mut self, path: &str, from: usize, to: usize, text: &str) -> Result<(), EngineError>;

    fn completions_at(&self, path: &str, offset: usize) -> Option<RawCompletionInfo>;

    fn diagnostics(&self, path: &str) -> Vec<RawDiagnostic>;

    fn quick_info_at(&self, path: &str, offset: usize) -> Option<RawQuickInfo>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_package_name() {
        assert_eq!(package_name("/node_modules/@types/luxon/index.d.ts").as_deref(), Some("luxon"));
        assert_eq!(
            package_name("/node_modules/@types/luxon/src/datetime.d.ts").as_deref(),
            Some("luxon")
        );
        assert_eq!(package_name("/node_modules/@scope/pkg/a.d.ts").as_deref(), Some("@scope/pkg"));
        assert_eq!(
            package_name("/node_modules/@types/babel__core/index.d.ts").as_deref(),
            Some("@babel/core")
        );
        assert_eq!(package_name("/node_modules/lodash/index.d.ts").as_deref(), Some("lodash"));
    }

    #[test]
    fn test_package_name_rejects_other_paths() {
        assert_eq!(package_name("/globals.d.ts"), None);
        assert_eq!(package_name("/node_modules/lodash"), None);
        assert_eq!(package_name("/node_modules/@types/luxon/"), None);
        assert_eq!(package_name("/node_modules/"), None);
    }

    #[test]
    fn test_text_span_end() {
        assert_eq!(TextSpan::new(3, 4).end(), 7);
    }
}
