//
// adapters/mod.rs
//
// Translation of raw engine results into host-facing shapes
//

pub mod completion;
pub mod diagnostics;
pub mod hover;
pub mod module_names;

pub use completion::{CompletionConfig, CompletionEnvelope, CompletionOption, CompletionResult};
pub use diagnostics::{Diagnostic, Severity};
pub use hover::{HoverBlock, HoverInfo};
