//
// parser_pool.rs
//
// Thread-local parser pool for efficient parser reuse
//

use std::cell::RefCell;
use tree_sitter::{Parser, Tree};

thread_local! {
    static PARSER: RefCell<Option<Parser>> = RefCell::new(new_parser());
}

fn new_parser() -> Option<Parser> {
    let mut parser = Parser::new();
    match parser.set_language(&tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into()) {
        Ok(()) => Some(parser),
        Err(e) => {
            log::error!("Failed to load TypeScript grammar: {}", e);
            None
        }
    }
}

/// Execute a function with a thread-local parser instance.
/// The parser is reused across calls on the same thread.
/// Returns `None` when the grammar could not be loaded.
pub fn with_parser<F, R>(f: F) -> Option<R>
where
    F: FnOnce(&mut Parser) -> R,
{
    PARSER.with(|parser| parser.borrow_mut().as_mut().map(f))
}

/// Parse a source text with the pooled parser
pub fn parse(text: &str) -> Option<Tree> {
    with_parser(|parser| parser.parse(text, None)).flatten()
}

/// Text of a node, empty when the byte range is not a char boundary
pub(crate) fn node_text<'a>(node: tree_sitter::Node<'_>, text: &'a str) -> &'a str {
    text.get(node.byte_range()).unwrap_or("")
}
