//
// adapters/module_names.rs
//
// Import-path completion from the packages present in the virtual file set
//

use std::collections::BTreeSet;
use std::sync::OnceLock;

use regex::Regex;

use super::completion::{CompletionEnvelope, CompletionOption, CompletionResult};
use crate::engine::package_name;
use crate::env::VirtualFileSet;

/// Boost for candidates the partial path is a prefix of
const PREFIX_BOOST: i32 = 10;

fn import_path_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    // An unterminated quoted specifier after from / import / require( / import(
    PATTERN.get_or_init(|| {
        Regex::new(r#"(?:\bfrom\s*|\bimport\s*(?:\(\s*)?|\brequire\s*\(\s*)["']([^"']*)$"#).unwrap()
    })
}

/// Package names importable from the file set, sorted and deduplicated
pub fn module_names(files: &VirtualFileSet) -> Vec<String> {
    files
        .declaration_paths()
        .filter_map(package_name)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// The partial module specifier being typed when `line_prefix` (the current
/// line up to the cursor) ends inside an import path
pub fn partial_import_path(line_prefix: &str) -> Option<&str> {
    import_path_pattern()
        .captures(line_prefix)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

/// Module-name completions when the cursor sits in an import path
pub fn complete_import_path(files: &VirtualFileSet, offset: usize) -> Option<CompletionEnvelope> {
    let document = files.document();
    if offset > document.len_chars() {
        return None;
    }
    let line_start = document.line_to_char(document.char_to_line(offset));
    let line_prefix = document.slice(line_start..offset).to_string();
    let partial = partial_import_path(&line_prefix)?;

    let needle = partial.to_lowercase();
    let mut options: Vec<CompletionOption> = module_names(files)
        .into_iter()
        .filter_map(|name| {
            let lower = name.to_lowercase();
            if !lower.contains(&needle) {
                return None;
            }
            let boost = if lower.starts_with(&needle) { PREFIX_BOOST } else { 0 };
            Some(CompletionOption {
                label: name,
                kind: "namespace".to_string(),
                commit_characters: Vec::new(),
                detail: None,
                boost,
            })
        })
        .collect();
    options.sort_by(|a, b| b.boost.cmp(&a.boost).then_with(|| a.label.cmp(&b.label)));

    Some(CompletionEnvelope {
        is_global: false,
        result: CompletionResult {
            from: offset - partial.chars().count(),
            options,
        },
    })
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;

    fn files(text: &str) -> VirtualFileSet {
        let mut declarations = BTreeMap::new();
        for path in [
            "/node_modules/@types/luxon/index.d.ts",
            "/node_modules/@types/luxon/package.json",
            "/node_modules/@types/lodash/index.d.ts",
            "/node_modules/rxjs/index.d.ts",
            "/node_modules/@scope/router/index.d.ts",
            "/node_modules/error-reporter/index.d.ts",
            "/lib.es5.d.ts",
            "/globals.d.ts",
        ] {
            declarations.insert(path.to_string(), String::new());
        }
        VirtualFileSet::new("/doc.ts", text, declarations)
    }

    fn labels(envelope: &CompletionEnvelope) -> Vec<&str> {
        envelope
            .result
            .options
            .iter()
            .map(|o| o.label.as_str())
            .collect()
    }

    #[test]
    fn test_module_names_sorted_and_deduplicated() {
        assert_eq!(
            module_names(&files("")),
            vec!["@scope/router", "error-reporter", "lodash", "luxon", "rxjs"]
        );
    }

    #[test]
    fn test_partial_import_path_patterns() {
        assert_eq!(partial_import_path("import { a } from \"r"), Some("r"));
        assert_eq!(partial_import_path("import { a } from 'lu"), Some("lu"));
        assert_eq!(partial_import_path("import \"lo"), Some("lo"));
        assert_eq!(partial_import_path("const x = require(\"rx"), Some("rx"));
        assert_eq!(partial_import_path("const x = await import('"), Some(""));
        assert_eq!(partial_import_path("import { a } from \"r\""), None);
        assert_eq!(partial_import_path("const s = \"r"), None);
        assert_eq!(partial_import_path("fromage(\"r"), None);
    }

    #[test]
    fn test_prefix_matches_rank_above_substring_matches() {
        let text = "import { a } from \"r";
        let envelope = complete_import_path(&files(text), text.chars().count()).unwrap();
        assert!(!envelope.is_global);
        assert_eq!(envelope.result.from, text.chars().count() - 1);
        assert_eq!(
            labels(&envelope),
            vec!["rxjs", "@scope/router", "error-reporter"]
        );
        assert_eq!(envelope.result.options[0].boost, PREFIX_BOOST);
        assert_eq!(envelope.result.options[1].boost, 0);
    }

    #[test]
    fn test_cursor_right_after_quote_offers_everything() {
        let text = "import { a } from \"r\"";
        let offset = "import { a } from \"".chars().count();
        let envelope = complete_import_path(&files(text), offset).unwrap();
        assert_eq!(envelope.result.from, offset);
        assert_eq!(envelope.result.options.len(), 5);
    }

    #[test]
    fn test_matching_is_case_insensitive() {
        let text = "import x from \"LUX";
        let envelope = complete_import_path(&files(text), text.chars().count()).unwrap();
        assert_eq!(labels(&envelope), vec!["luxon"]);
    }

    #[test]
    fn test_only_the_current_line_is_considered() {
        let text = "import { a } from \"r\nconst b = ";
        assert!(complete_import_path(&files(text), text.chars().count()).is_none());
    }

    #[test]
    fn test_outside_import_path_is_none() {
        let text = "const a = 1;";
        assert!(complete_import_path(&files(text), 5).is_none());
        assert!(complete_import_path(&files(text), 100).is_none());
    }
}
