//
// adapters/diagnostics.rs
//
// Diagnostic adapter: engine diagnostics in document coordinates
//

use serde::Serialize;

use crate::coords::engine_span_to_host;
use crate::engine::{DiagnosticCategory, RawDiagnostic};
use crate::env::Environment;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
    Info,
    Hint,
}

impl From<DiagnosticCategory> for Severity {
    fn from(category: DiagnosticCategory) -> Self {
        match category {
            DiagnosticCategory::Error => Severity::Error,
            DiagnosticCategory::Warning => Severity::Warning,
            DiagnosticCategory::Suggestion => Severity::Hint,
            DiagnosticCategory::Message => Severity::Info,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Diagnostic {
    pub from: usize,
    pub to: usize,
    pub severity: Severity,
    pub message: String,
    pub code: u32,
}

/// Diagnostics for the document
pub fn diagnostics(env: &Environment) -> Vec<Diagnostic> {
    let raw = env.session().diagnostics(env.document_path());
    translate(&raw, env.document_path(), env.files().document_len())
}

/// Keep the document's diagnostics and clamp them to its text, so anything
/// reported against the scope suffix lands at the end of the document
pub fn translate(raw: &[RawDiagnostic], document_path: &str, document_len: usize) -> Vec<Diagnostic> {
    raw.iter()
        .filter(|d| d.file.as_deref().map_or(true, |f| f == document_path))
        .map(|d| {
            let (from, to) = engine_span_to_host(d.start.unwrap_or(0), d.length.unwrap_or(0));
            Diagnostic {
                from: from.min(document_len),
                to: to.min(document_len),
                severity: d.category.into(),
                message: d.message.clone(),
                code: d.code,
            }
        })
        .collect()
}
