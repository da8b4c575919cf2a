//
// engine/symbols.rs
//
// Symbol-index analysis engine backed by tree-sitter
//
// Indexes top-level declarations of every virtual file and resolves simple
// member access through declared types. Diagnostics cover syntax errors and
// block-scoped redeclarations only; there is no type checker.
//

use std::collections::{BTreeMap, HashMap, HashSet};

use tree_sitter::{Node, Tree};

use super::{
    lib_stubs, package_name, AnalysisEngine, AnalysisSession, DiagnosticCategory, RawCompletionEntry,
    RawCompletionInfo, RawDiagnostic, RawQuickInfo, SessionOptions, TextSpan,
};
use crate::config::LibTarget;
use crate::error::EngineError;
use crate::parser_pool::{self, node_text};

/// Rank for declarations of the queried file
const RANK_LOCAL: &str = "11";
/// Rank for ambient globals and keywords
const RANK_GLOBAL: &str = "15";
/// Rank for exports of packages that would need an import
const RANK_AUTO_IMPORT: &str = "16";
/// Rank for bare identifiers seen in the file but declared nowhere
const RANK_WORD: &str = "18";

const KEYWORDS: &[&str] = &[
    "as", "async", "await", "break", "case", "catch", "class", "const", "continue", "debugger",
    "default", "delete", "do", "else", "enum", "export", "extends", "false", "finally", "for",
    "function", "if", "import", "in", "instanceof", "interface", "let", "new", "null", "return",
    "switch", "this", "throw", "true", "try", "type", "typeof", "undefined", "var", "void",
    "while", "yield",
];

const IDENTIFIER_KINDS: &[&str] = &[
    "identifier",
    "property_identifier",
    "type_identifier",
    "shorthand_property_identifier",
];

const ENGINE_COMMIT_CHARACTERS: &[&str] = &[".", ",", ";"];

/// Engine that answers queries from a per-file declaration index
#[derive(Debug, Clone, Copy, Default)]
pub struct SymbolIndexEngine;

impl AnalysisEngine for SymbolIndexEngine {
    fn lib_files(&self, target: LibTarget) -> BTreeMap<String, String> {
        lib_stubs::lib_files(target)
    }

    fn create_session(
        &self,
        files: &BTreeMap<String, String>,
        options: &SessionOptions,
    ) -> Box<dyn AnalysisSession> {
        let files = files
            .iter()
            .map(|(path, content)| (path.clone(), FileIndex::build(content.clone())))
            .collect();
        log::trace!(
            "Created symbol-index session (target {:?}, {} roots)",
            options.target,
            options.root_files.len()
        );
        Box::new(SymbolIndexSession { files })
    }
}

#[derive(Debug, Clone)]
struct Symbol {
    name: String,
    kind: &'static str,
    modifiers: &'static str,
    display: String,
    documentation: String,
    /// Simple named type from an annotation, used to resolve member access
    type_name: Option<String>,
    members: Vec<Symbol>,
    exported: bool,
}

struct FileIndex {
    text: String,
    tree: Option<Tree>,
    symbols: Vec<Symbol>,
    is_module: bool,
}

impl FileIndex {
    fn build(text: String) -> Self {
        let tree = parser_pool::parse(&text);
        let (symbols, is_module) = match &tree {
            Some(tree) => index_program(tree.root_node(), &text),
            None => (Vec::new(), false),
        };
        Self {
            text,
            tree,
            symbols,
            is_module,
        }
    }
}

/// A live session over a set of indexed files
pub struct SymbolIndexSession {
    files: BTreeMap<String, FileIndex>,
}

impl SymbolIndexSession {
    /// Every symbol visible under `name`, the queried file first
    fn lookup<'a>(&'a self, path: &str, name: &str) -> Vec<&'a Symbol> {
        let own = self.files.get(path).into_iter().flat_map(|f| f.symbols.iter());
        let others = self
            .files
            .iter()
            .filter(|(p, _)| p.as_str() != path)
            .flat_map(|(_, f)| f.symbols.iter());
        own.chain(others).filter(|s| s.name == name).collect()
    }

    /// Members reachable through `object`: its own members, or the members of
    /// every interface/class named by its type annotation
    fn members_of<'a>(&'a self, path: &str, object: &str) -> Vec<&'a Symbol> {
        let mut members = Vec::new();
        for symbol in self.lookup(path, object) {
            members.extend(symbol.members.iter());
            if let Some(type_name) = &symbol.type_name {
                for ty in self.lookup(path, type_name) {
                    members.extend(ty.members.iter());
                }
            }
        }
        let mut seen = HashSet::new();
        members.retain(|m| seen.insert(m.name.clone()));
        members
    }

    fn global_entries(&self, path: &str, file: &FileIndex, word_span: Option<TextSpan>) -> Vec<RawCompletionEntry> {
        let mut seen = HashSet::new();
        let mut entries = Vec::new();

        for symbol in &file.symbols {
            if seen.insert(symbol.name.clone()) {
                entries.push(entry_for(symbol, RANK_LOCAL, "", None, None));
            }
        }

        let mut auto_imports = Vec::new();
        for (other_path, other) in self.files.iter().filter(|(p, _)| p.as_str() != path) {
            if other.is_module {
                let Some(package) = package_name(other_path) else {
                    continue;
                };
                for symbol in other.symbols.iter().filter(|s| s.exported) {
                    auto_imports.push(entry_for(
                        symbol,
                        RANK_AUTO_IMPORT,
                        "export",
                        Some(package.clone()),
                        word_span,
                    ));
                }
            } else {
                for symbol in &other.symbols {
                    if seen.insert(symbol.name.clone()) {
                        entries.push(entry_for(symbol, RANK_GLOBAL, "declare", None, None));
                    }
                }
            }
        }

        for keyword in KEYWORDS {
            if seen.insert((*keyword).to_string()) {
                entries.push(RawCompletionEntry {
                    name: (*keyword).to_string(),
                    kind: "keyword".to_string(),
                    sort_text: RANK_GLOBAL.to_string(),
                    ..Default::default()
                });
            }
        }

        for entry in auto_imports {
            if seen.insert(entry.name.clone()) {
                entries.push(entry);
            }
        }

        if let Some(tree) = &file.tree {
            let mut words = Vec::new();
            collect_identifiers(tree.root_node(), &file.text, &mut words);
            for word in words {
                if seen.insert(word.clone()) {
                    entries.push(RawCompletionEntry {
                        name: word,
                        kind: "warning".to_string(),
                        sort_text: RANK_WORD.to_string(),
                        ..Default::default()
                    });
                }
            }
        }

        entries
    }
}

impl AnalysisSession for SymbolIndexSession {
    fn set_file(&mut self, path: &str, content: &str) {
        self.files
            .insert(path.to_string(), FileIndex::build(content.to_string()));
    }

    fn edit_file(&mut self, path: &str, from: usize, to: usize, text: &str) -> Result<(), EngineError> {
        let file = self
            .files
            .get_mut(path)
            .ok_or_else(|| EngineError::UnknownFile(path.to_string()))?;

        let len = file.text.chars().count();
        let out_of_range = |offset| EngineError::OffsetOutOfRange {
            path: path.to_string(),
            offset,
            len,
        };
        if from > to {
            return Err(out_of_range(from));
        }
        let start = char_to_byte(&file.text, from).ok_or_else(|| out_of_range(from))?;
        let end = char_to_byte(&file.text, to).ok_or_else(|| out_of_range(to))?;

        let mut updated = file.text.clone();
        updated.replace_range(start..end, text);
        *file = FileIndex::build(updated);
        Ok(())
    }

    fn completions_at(&self, path: &str, offset: usize) -> Option<RawCompletionInfo> {
        let file = self.files.get(path)?;
        let byte = char_to_byte(&file.text, offset)?;
        if inside_comment_or_string(file, byte) {
            return None;
        }

        let before = &file.text[..byte];
        let word_start = before.len() - trailing_identifier(before).len();
        let word = &before[word_start..];
        let word_chars = word.chars().count();
        let default_commit_characters =
            Some(ENGINE_COMMIT_CHARACTERS.iter().map(|c| c.to_string()).collect());

        let head = &before[..word_start];
        if let Some(object_part) = head.strip_suffix('.') {
            let object = trailing_identifier(object_part);
            if object.is_empty() {
                return None;
            }
            let entries = self
                .members_of(path, object)
                .into_iter()
                .map(|m| entry_for(m, RANK_LOCAL, "", None, None))
                .collect();
            return Some(RawCompletionInfo {
                is_global_completion: false,
                is_member_completion: true,
                entries,
                default_commit_characters,
            });
        }

        let word_span = (word_chars > 0).then(|| TextSpan::new(offset - word_chars, word_chars));
        Some(RawCompletionInfo {
            is_global_completion: true,
            is_member_completion: false,
            entries: self.global_entries(path, file, word_span),
            default_commit_characters,
        })
    }

    fn diagnostics(&self, path: &str) -> Vec<RawDiagnostic> {
        let Some(file) = self.files.get(path) else {
            return Vec::new();
        };
        let Some(tree) = &file.tree else {
            return Vec::new();
        };

        let mut diagnostics = Vec::new();
        collect_syntax_errors(tree.root_node(), &file.text, path, &mut diagnostics);
        collect_redeclarations(tree.root_node(), &file.text, path, &mut diagnostics);
        diagnostics.sort_by_key(|d| d.start);
        diagnostics
    }

    fn quick_info_at(&self, path: &str, offset: usize) -> Option<RawQuickInfo> {
        let file = self.files.get(path)?;
        let byte = char_to_byte(&file.text, offset)?;
        let tree = file.tree.as_ref()?;
        let node = identifier_at(tree.root_node(), byte)?;
        let name = node_text(node, &file.text);

        let symbol = if node.kind() == "property_identifier" {
            let object = node
                .parent()
                .filter(|p| p.kind() == "member_expression")
                .and_then(|p| p.child_by_field_name("object"))
                .filter(|o| o.kind() == "identifier")
                .map(|o| node_text(o, &file.text))?;
            self.members_of(path, object).into_iter().find(|m| m.name == name)?
        } else {
            self.lookup(path, name).into_iter().next()?
        };

        Some(RawQuickInfo {
            kind: symbol.kind.to_string(),
            kind_modifiers: symbol.modifiers.to_string(),
            text_span: TextSpan::new(
                char_index(&file.text, node.start_byte()),
                name.chars().count(),
            ),
            display: symbol.display.clone(),
            documentation: symbol.documentation.clone(),
        })
    }
}

fn entry_for(
    symbol: &Symbol,
    rank: &str,
    modifiers: &str,
    source: Option<String>,
    replacement_span: Option<TextSpan>,
) -> RawCompletionEntry {
    RawCompletionEntry {
        name: symbol.name.clone(),
        kind: symbol.kind.to_string(),
        kind_modifiers: modifiers.to_string(),
        sort_text: rank.to_string(),
        replacement_span,
        commit_characters: None,
        source,
    }
}

// ============================================================================
// Indexing
// ============================================================================

fn named_children(node: Node<'_>) -> Vec<Node<'_>> {
    let mut cursor = node.walk();
    node.named_children(&mut cursor).collect()
}

fn index_program(root: Node<'_>, text: &str) -> (Vec<Symbol>, bool) {
    let mut symbols = Vec::new();
    let mut is_module = false;
    for child in named_children(root) {
        match child.kind() {
            "import_statement" => is_module = true,
            "export_statement" => {
                is_module = true;
                collect_declarations(child, text, true, &mut symbols);
            }
            _ => collect_declarations(child, text, false, &mut symbols),
        }
    }
    (symbols, is_module)
}

fn collect_declarations(node: Node<'_>, text: &str, exported: bool, out: &mut Vec<Symbol>) {
    match node.kind() {
        "export_statement" | "ambient_declaration" | "expression_statement" => {
            let exported = exported || node.kind() == "export_statement";
            for child in named_children(node) {
                collect_declarations(child, text, exported, out);
            }
        }
        "lexical_declaration" | "variable_declaration" => {
            let keyword = match node.child(0).map(|c| node_text(c, text)) {
                Some("const") => "const",
                Some("let") => "let",
                _ => "var",
            };
            let documentation = doc_comment(node, text);
            for declarator in named_children(node) {
                if declarator.kind() != "variable_declarator" {
                    continue;
                }
                let Some(name) = declarator.child_by_field_name("name") else {
                    continue;
                };
                if name.kind() != "identifier" {
                    continue;
                }
                let type_name = declarator
                    .child_by_field_name("type")
                    .and_then(|annotation| named_children(annotation).into_iter().next())
                    .filter(|ty| ty.kind() == "type_identifier")
                    .map(|ty| node_text(ty, text).to_string());
                out.push(Symbol {
                    name: node_text(name, text).to_string(),
                    kind: keyword,
                    modifiers: modifiers_of(node),
                    display: format!("{keyword} {}", header(declarator, text)),
                    documentation: documentation.clone(),
                    type_name,
                    members: Vec::new(),
                    exported,
                });
            }
        }
        "function_declaration" | "function_signature" | "generator_function_declaration" => {
            push_named(node, text, "function", Vec::new(), exported, out);
        }
        "class_declaration" | "abstract_class_declaration" | "class" => {
            let members = node
                .child_by_field_name("body")
                .map(|body| collect_members(body, text))
                .unwrap_or_default();
            push_named(node, text, "class", members, exported, out);
        }
        "interface_declaration" => {
            let members = node
                .child_by_field_name("body")
                .map(|body| collect_members(body, text))
                .unwrap_or_default();
            push_named(node, text, "interface", members, exported, out);
        }
        "type_alias_declaration" => {
            push_named(node, text, "type", Vec::new(), exported, out);
        }
        "enum_declaration" => {
            let members = node
                .child_by_field_name("body")
                .map(|body| collect_members(body, text))
                .unwrap_or_default();
            push_named(node, text, "enum", members, exported, out);
        }
        "internal_module" | "module" => {
            let mut members = Vec::new();
            if let Some(body) = node.child_by_field_name("body") {
                for child in named_children(body) {
                    collect_declarations(child, text, false, &mut members);
                }
            }
            push_named(node, text, "module", members, exported, out);
        }
        _ => {}
    }
}

fn push_named(
    node: Node<'_>,
    text: &str,
    kind: &'static str,
    members: Vec<Symbol>,
    exported: bool,
    out: &mut Vec<Symbol>,
) {
    let Some(name) = node.child_by_field_name("name") else {
        return;
    };
    let name = node_text(name, text).trim_matches(|c| c == '"' || c == '\'');
    if name.is_empty() {
        return;
    }
    out.push(Symbol {
        name: name.to_string(),
        kind,
        modifiers: modifiers_of(node),
        display: header(node, text),
        documentation: doc_comment(node, text),
        type_name: None,
        members,
        exported,
    });
}

fn collect_members(body: Node<'_>, text: &str) -> Vec<Symbol> {
    let mut members = Vec::new();
    for child in named_children(body) {
        let kind = match child.kind() {
            "method_signature" | "method_definition" | "abstract_method_signature" => "method",
            "property_signature" | "public_field_definition" | "enum_assignment" => "property",
            "property_identifier" => {
                // Bare enum member
                members.push(Symbol {
                    name: node_text(child, text).to_string(),
                    kind: "property",
                    modifiers: "",
                    display: node_text(child, text).to_string(),
                    documentation: String::new(),
                    type_name: None,
                    members: Vec::new(),
                    exported: false,
                });
                continue;
            }
            _ => continue,
        };
        let Some(name) = child.child_by_field_name("name") else {
            continue;
        };
        let type_name = child
            .child_by_field_name("type")
            .and_then(|annotation| named_children(annotation).into_iter().next())
            .filter(|ty| ty.kind() == "type_identifier")
            .map(|ty| node_text(ty, text).to_string());
        members.push(Symbol {
            name: node_text(name, text).to_string(),
            kind,
            modifiers: "",
            display: header(child, text),
            documentation: doc_comment(child, text),
            type_name,
            members: Vec::new(),
            exported: false,
        });
    }
    members
}

/// `declare` or `export` when the declaration sits under such a wrapper
fn modifiers_of(node: Node<'_>) -> &'static str {
    let mut current = node.parent();
    while let Some(parent) = current {
        match parent.kind() {
            "export_statement" => return "export",
            "ambient_declaration" => return "declare",
            _ => current = parent.parent(),
        }
    }
    ""
}

/// First line of a declaration, without its body or trailing semicolon
fn header(node: Node<'_>, text: &str) -> String {
    let source = node_text(node, text);
    let first_line = source.lines().next().unwrap_or("");
    let without_body = first_line.split('{').next().unwrap_or(first_line);
    without_body.trim().trim_end_matches(';').trim_end().to_string()
}

/// Text of a `/** */` comment directly above the declaration
fn doc_comment(node: Node<'_>, text: &str) -> String {
    let mut target = node;
    while let Some(parent) = target.parent() {
        if matches!(parent.kind(), "ambient_declaration" | "export_statement") {
            target = parent;
        } else {
            break;
        }
    }

    let Some(comment) = target.prev_named_sibling() else {
        return String::new();
    };
    if comment.kind() != "comment" || comment.end_position().row + 1 < target.start_position().row {
        return String::new();
    }
    let raw = node_text(comment, text);
    let Some(body) = raw.strip_prefix("/**").and_then(|s| s.strip_suffix("*/")) else {
        return String::new();
    };
    body.lines()
        .map(|line| line.trim().trim_start_matches('*').trim())
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

fn collect_identifiers(node: Node<'_>, text: &str, out: &mut Vec<String>) {
    if node.kind() == "identifier" {
        out.push(node_text(node, text).to_string());
        return;
    }
    for child in named_children(node) {
        collect_identifiers(child, text, out);
    }
}

// ============================================================================
// Diagnostics
// ============================================================================

fn collect_syntax_errors(node: Node<'_>, text: &str, path: &str, out: &mut Vec<RawDiagnostic>) {
    if node.is_missing() {
        out.push(RawDiagnostic {
            file: Some(path.to_string()),
            start: Some(char_index(text, node.start_byte())),
            length: Some(0),
            message: format!("'{}' expected.", node.kind()),
            category: DiagnosticCategory::Error,
            code: 1005,
        });
        return;
    }
    if node.is_error() {
        let start = char_index(text, node.start_byte());
        let end = char_index(text, node.end_byte());
        out.push(RawDiagnostic {
            file: Some(path.to_string()),
            start: Some(start),
            length: Some(end - start),
            message: "Declaration or statement expected.".to_string(),
            category: DiagnosticCategory::Error,
            code: 1128,
        });
        return;
    }
    if !node.has_error() {
        return;
    }
    let mut cursor = node.walk();
    let children: Vec<Node<'_>> = node.children(&mut cursor).collect();
    for child in children {
        collect_syntax_errors(child, text, path, out);
    }
}

fn collect_redeclarations(root: Node<'_>, text: &str, path: &str, out: &mut Vec<RawDiagnostic>) {
    let mut names: HashMap<String, Vec<Node<'_>>> = HashMap::new();
    for statement in named_children(root) {
        if statement.kind() != "lexical_declaration" {
            continue;
        }
        for declarator in named_children(statement) {
            if let Some(name) = declarator
                .child_by_field_name("name")
                .filter(|n| n.kind() == "identifier")
            {
                names.entry(node_text(name, text).to_string()).or_default().push(name);
            }
        }
    }

    for (name, nodes) in names {
        if nodes.len() < 2 {
            continue;
        }
        for node in nodes {
            out.push(RawDiagnostic {
                file: Some(path.to_string()),
                start: Some(char_index(text, node.start_byte())),
                length: Some(name.chars().count()),
                message: format!("Cannot redeclare block-scoped variable '{name}'."),
                category: DiagnosticCategory::Error,
                code: 2451,
            });
        }
    }
}

// ============================================================================
// Position helpers
// ============================================================================

fn char_index(text: &str, byte: usize) -> usize {
    text.get(..byte).map(|s| s.chars().count()).unwrap_or(0)
}

fn char_to_byte(text: &str, offset: usize) -> Option<usize> {
    match text.char_indices().nth(offset) {
        Some((byte, _)) => Some(byte),
        None if text.chars().count() == offset => Some(text.len()),
        None => None,
    }
}

fn is_identifier_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}

fn trailing_identifier(s: &str) -> &str {
    let start = s
        .char_indices()
        .rev()
        .take_while(|(_, c)| is_identifier_char(*c))
        .last()
        .map(|(i, _)| i)
        .unwrap_or(s.len());
    &s[start..]
}

fn inside_comment_or_string(file: &FileIndex, byte: usize) -> bool {
    let (Some(tree), true) = (&file.tree, byte > 0) else {
        return false;
    };
    let Some(node) = tree.root_node().descendant_for_byte_range(byte - 1, byte - 1) else {
        return false;
    };
    match node.kind() {
        "comment" => node_text(node, &file.text).starts_with("//") || byte < node.end_byte(),
        "string" | "string_fragment" | "template_string" | "escape_sequence" => {
            byte < node.end_byte() || node.kind() == "string_fragment"
        }
        _ => false,
    }
}

fn identifier_at(root: Node<'_>, byte: usize) -> Option<Node<'_>> {
    let candidates = [Some(byte), byte.checked_sub(1)];
    candidates.into_iter().flatten().find_map(|b| {
        root.descendant_for_byte_range(b, b)
            .filter(|n| IDENTIFIER_KINDS.contains(&n.kind()))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = "/doc.ts";

    fn session_with(doc: &str) -> Box<dyn AnalysisSession> {
        let mut files = BTreeMap::new();
        files.insert(
            "/globals.d.ts".to_string(),
            "/** Write to the log */\ndeclare var console: Console;\ninterface Console {\n    log(...data: any[]): void;\n    warn(...data: any[]): void;\n}\n".to_string(),
        );
        files.insert(
            "/node_modules/@types/luxon/index.d.ts".to_string(),
            "export declare class DateTime {\n    static now(): DateTime;\n}\n".to_string(),
        );
        files.insert(DOC.to_string(), doc.to_string());
        SymbolIndexEngine.create_session(
            &files,
            &SessionOptions {
                target: LibTarget::Es2022,
                current_directory: "/".to_string(),
                root_files: vec![DOC.to_string()],
            },
        )
    }

    fn entry<'a>(info: &'a RawCompletionInfo, name: &str) -> Option<&'a RawCompletionEntry> {
        info.entries.iter().find(|e| e.name == name)
    }

    #[test]
    fn test_global_completion_ranks_locals_before_globals() {
        let session = session_with("const total = 1;\n");
        let info = session.completions_at(DOC, 17).unwrap();
        assert!(info.is_global_completion);
        assert_eq!(entry(&info, "total").unwrap().sort_text, RANK_LOCAL);
        assert_eq!(entry(&info, "console").unwrap().sort_text, RANK_GLOBAL);
        assert_eq!(entry(&info, "return").unwrap().kind, "keyword");
    }

    #[test]
    fn test_auto_import_entries_get_span_only_when_word_typed() {
        let session = session_with("Date");
        let info = session.completions_at(DOC, 4).unwrap();
        let date_time = entry(&info, "DateTime").unwrap();
        assert_eq!(date_time.sort_text, RANK_AUTO_IMPORT);
        assert_eq!(date_time.source.as_deref(), Some("luxon"));
        assert_eq!(date_time.replacement_span, Some(TextSpan::new(0, 4)));

        let session = session_with("");
        let info = session.completions_at(DOC, 0).unwrap();
        assert_eq!(entry(&info, "DateTime").unwrap().replacement_span, None);
    }

    #[test]
    fn test_undeclared_words_are_warnings() {
        let session = session_with("foo();\n");
        let info = session.completions_at(DOC, 7).unwrap();
        assert_eq!(entry(&info, "foo").unwrap().kind, "warning");
    }

    #[test]
    fn test_member_completion_through_type_annotation() {
        let session = session_with("console.");
        let info = session.completions_at(DOC, 8).unwrap();
        assert!(!info.is_global_completion);
        assert!(info.is_member_completion);
        let names: Vec<_> = info.entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["log", "warn"]);
    }

    #[test]
    fn test_no_completions_inside_comment() {
        let session = session_with("// note\nx");
        assert!(session.completions_at(DOC, 5).is_none());
        assert!(session.completions_at(DOC, 9).is_some());
    }

    #[test]
    fn test_offset_past_end_yields_none() {
        let session = session_with("abc");
        assert!(session.completions_at(DOC, 4).is_none());
        assert!(session.completions_at("/missing.ts", 0).is_none());
    }

    #[test]
    fn test_edit_file_reindexes() {
        let mut session = session_with("const a = 1;");
        session.edit_file(DOC, 6, 7, "renamed").unwrap();
        let info = session.completions_at(DOC, 0).unwrap();
        assert!(entry(&info, "renamed").is_some());
        assert!(entry(&info, "a").is_none());
    }

    #[test]
    fn test_edit_file_rejects_bad_ranges() {
        let mut session = session_with("abc");
        assert!(matches!(
            session.edit_file(DOC, 2, 9, ""),
            Err(EngineError::OffsetOutOfRange { offset: 9, len: 3, .. })
        ));
        assert!(matches!(
            session.edit_file("/nope.ts", 0, 0, ""),
            Err(EngineError::UnknownFile(_))
        ));
    }

    #[test]
    fn test_edit_file_uses_char_offsets() {
        let mut session = session_with("const é = 1;");
        session.edit_file(DOC, 6, 7, "e").unwrap();
        let info = session.completions_at(DOC, 0).unwrap();
        assert!(entry(&info, "e").is_some());
    }

    #[test]
    fn test_redeclaration_is_reported() {
        let session = session_with("const a = 1;\nconst a = 2;\n");
        let diagnostics = session.diagnostics(DOC);
        assert_eq!(diagnostics.len(), 2);
        assert!(diagnostics.iter().all(|d| d.code == 2451));
        assert_eq!(diagnostics[0].start, Some(6));
        assert_eq!(diagnostics[1].start, Some(19));
    }

    #[test]
    fn test_syntax_error_is_reported() {
        let session = session_with("const = ;");
        let diagnostics = session.diagnostics(DOC);
        assert!(!diagnostics.is_empty());
        assert!(diagnostics
            .iter()
            .all(|d| d.category == DiagnosticCategory::Error));
    }

    #[test]
    fn test_clean_file_has_no_diagnostics() {
        let session = session_with("const a = 1;\nlet b = a;\n");
        assert!(session.diagnostics(DOC).is_empty());
    }

    #[test]
    fn test_quick_info_for_global_with_documentation() {
        let session = session_with("console.log(1);");
        let info = session.quick_info_at(DOC, 3).unwrap();
        assert_eq!(info.kind, "var");
        assert_eq!(info.kind_modifiers, "declare");
        assert_eq!(info.display, "var console: Console");
        assert_eq!(info.documentation, "Write to the log");
        assert_eq!(info.text_span, TextSpan::new(0, 7));
    }

    #[test]
    fn test_quick_info_for_member() {
        let session = session_with("console.log(1);");
        let info = session.quick_info_at(DOC, 9).unwrap();
        assert_eq!(info.kind, "method");
        assert_eq!(info.display, "log(...data: any[]): void");
        assert_eq!(info.text_span, TextSpan::new(8, 3));
    }

    #[test]
    fn test_quick_info_at_end_of_identifier() {
        let session = session_with("const value = 1;");
        let info = session.quick_info_at(DOC, 11).unwrap();
        assert_eq!(info.display, "const value = 1");
    }

    #[test]
    fn test_quick_info_on_unknown_name_is_none() {
        let session = session_with("mystery;");
        assert!(session.quick_info_at(DOC, 2).is_none());
    }

    #[test]
    fn test_namespace_members() {
        let doc = "declare namespace NodeTypes {\n    type FooJson = {};\n}\nNodeTypes.";
        let session = session_with(doc);
        let info = session.completions_at(DOC, doc.chars().count()).unwrap();
        assert!(info.is_member_completion);
        assert!(entry(&info, "FooJson").is_some());
    }

    #[test]
    fn test_trailing_identifier() {
        assert_eq!(trailing_identifier("foo.ba"), "ba");
        assert_eq!(trailing_identifier("x = $json"), "$json");
        assert_eq!(trailing_identifier("a."), "");
        assert_eq!(trailing_identifier(""), "");
    }
}
