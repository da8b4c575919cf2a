//
// env/mod.rs
//
// Virtual environment: the in-memory file set and the analysis session over it
//

mod builder;
mod globals;

use std::collections::BTreeMap;
use std::sync::Arc;

use ropey::Rope;

use crate::config::{LibTarget, WorkerConfig};
use crate::coords::host_position_to_engine;
use crate::declaration_cache::DeclarationCache;
use crate::engine::{AnalysisEngine, AnalysisSession, SessionOptions};
use crate::error::PatchError;
use crate::fetch::DeclarationFetcher;
use crate::patch::ChangeSet;

pub use builder::{build_environment, is_stripped_lib, strip_baseline};
pub use globals::{GLOBALS_PATH, GLOBALS_SOURCE};

/// Appended to the document so the engine treats it as a module and its
/// top-level bindings stay local. Appended rather than prepended so document
/// offsets and engine offsets coincide.
pub const DOCUMENT_SCOPE_SUFFIX: &str = "\nexport {};\n";

/// Shared collaborators of a worker
#[derive(Clone)]
pub struct Services {
    pub engine: Arc<dyn AnalysisEngine>,
    pub cache: Arc<dyn DeclarationCache>,
    pub fetcher: Arc<dyn DeclarationFetcher>,
}

/// Explicit description of the execution context the environment is built for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvironmentDescriptor {
    pub target: LibTarget,
    pub current_directory: String,
    pub globals_path: String,
    pub globals_source: String,
}

impl Default for EnvironmentDescriptor {
    fn default() -> Self {
        Self {
            target: LibTarget::default(),
            current_directory: "/".to_string(),
            globals_path: GLOBALS_PATH.to_string(),
            globals_source: GLOBALS_SOURCE.to_string(),
        }
    }
}

impl EnvironmentDescriptor {
    pub fn for_config(config: &WorkerConfig) -> Self {
        Self {
            target: config.target,
            ..Self::default()
        }
    }
}

/// Mapping from virtual path to file content with exactly one document.
///
/// The document is held as a rope without its scope suffix; every other path
/// is a read-only declaration source.
#[derive(Debug, Clone)]
pub struct VirtualFileSet {
    document_path: String,
    document: Rope,
    declarations: BTreeMap<String, String>,
}

impl VirtualFileSet {
    pub fn new(
        document_path: impl Into<String>,
        document_text: &str,
        declarations: BTreeMap<String, String>,
    ) -> Self {
        let document_path = document_path.into();
        let mut declarations = declarations;
        declarations.remove(&document_path);
        Self {
            document_path,
            document: Rope::from_str(document_text),
            declarations,
        }
    }

    pub fn document_path(&self) -> &str {
        &self.document_path
    }

    /// Document text as the host sees it
    pub fn document_text(&self) -> String {
        self.document.to_string()
    }

    pub fn document(&self) -> &Rope {
        &self.document
    }

    /// Document length in chars
    pub fn document_len(&self) -> usize {
        self.document.len_chars()
    }

    /// Document text as the engine sees it
    pub fn wrapped_document(&self) -> String {
        let mut text = self.document.to_string();
        text.push_str(DOCUMENT_SCOPE_SUFFIX);
        text
    }

    pub fn declaration(&self, path: &str) -> Option<&str> {
        self.declarations.get(path).map(String::as_str)
    }

    pub fn contains(&self, path: &str) -> bool {
        path == self.document_path || self.declarations.contains_key(path)
    }

    pub fn declaration_paths(&self) -> impl Iterator<Item = &str> {
        self.declarations.keys().map(String::as_str)
    }

    /// Number of files, the document included
    pub fn len(&self) -> usize {
        self.declarations.len() + 1
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    /// Every file as the engine sees it
    pub fn snapshot(&self) -> BTreeMap<String, String> {
        let mut files = self.declarations.clone();
        files.insert(self.document_path.clone(), self.wrapped_document());
        files
    }
}

/// The file set plus the one analysis session built over it
pub struct Environment {
    files: VirtualFileSet,
    session: Box<dyn AnalysisSession>,
    descriptor: EnvironmentDescriptor,
}

impl Environment {
    pub fn new(
        files: VirtualFileSet,
        engine: &dyn AnalysisEngine,
        descriptor: EnvironmentDescriptor,
    ) -> Self {
        let options = SessionOptions {
            target: descriptor.target,
            current_directory: descriptor.current_directory.clone(),
            root_files: vec![
                files.document_path().to_string(),
                descriptor.globals_path.clone(),
            ],
        };
        let session = engine.create_session(&files.snapshot(), &options);
        Self {
            files,
            session,
            descriptor,
        }
    }

    pub fn files(&self) -> &VirtualFileSet {
        &self.files
    }

    pub fn session(&self) -> &dyn AnalysisSession {
        self.session.as_ref()
    }

    pub fn descriptor(&self) -> &EnvironmentDescriptor {
        &self.descriptor
    }

    pub fn document_path(&self) -> &str {
        self.files.document_path()
    }

    /// Create or replace a file. Writing the document path replaces the whole
    /// document text.
    pub fn create_or_update_file(&mut self, path: &str, content: &str) {
        if path == self.files.document_path {
            self.files.document = Rope::from_str(content);
            let wrapped = self.files.wrapped_document();
            self.session.set_file(path, &wrapped);
            return;
        }

        if self.files.declaration(path) == Some(content) {
            return;
        }
        self.files
            .declarations
            .insert(path.to_string(), content.to_string());
        self.session.set_file(path, content);
    }

    /// Apply a change set to the document as positional replacements.
    ///
    /// The change set must describe the current document; edits never reach
    /// the scope suffix.
    pub fn apply_patch(&mut self, patch: &ChangeSet) -> Result<(), PatchError> {
        patch.apply_to_rope(&mut self.files.document)?;

        let path = self.files.document_path.clone();
        for replacement in patch.replacements() {
            let from = host_position_to_engine(replacement.from);
            let to = host_position_to_engine(replacement.to);
            if let Err(err) = self.session.edit_file(&path, from, to, &replacement.text) {
                log::warn!("Incremental edit rejected ({}); resynchronising {}", err, path);
                let wrapped = self.files.wrapped_document();
                self.session.set_file(&path, &wrapped);
                break;
            }
        }
        Ok(())
    }
}
